use crate::geometry;
use crate::hash::HashBytes;

/// A full skip-ledger row: input hash plus the row hashes its skip pointers
/// reference. Self-contained: [`Row::hash`] needs no other row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row {
    rn: u64,
    input_hash: HashBytes,
    prev_hashes: Vec<HashBytes>,
}

impl Row {
    /// # Panics
    ///
    /// Panics if `rn == 0` or `prev_hashes.len() != skip_count(rn)`, or if
    /// a top-level pointer reaching row 0 does not carry the sentinel.
    pub fn new(rn: u64, input_hash: HashBytes, prev_hashes: Vec<HashBytes>) -> Self {
        assert_eq!(
            prev_hashes.len(),
            geometry::skip_count(rn),
            "wrong pointer count for row {rn}"
        );
        for (level, hash) in prev_hashes.iter().enumerate() {
            if geometry::referenced_row(rn, level) == 0 {
                assert!(hash.is_sentinel(), "row {rn} must reference the sentinel");
            }
        }
        Self {
            rn,
            input_hash,
            prev_hashes,
        }
    }

    pub fn no(&self) -> u64 {
        self.rn
    }

    pub fn input_hash(&self) -> HashBytes {
        self.input_hash
    }

    pub fn prev_hash(&self, level: usize) -> HashBytes {
        self.prev_hashes[level]
    }

    pub fn prev_hashes(&self) -> &[HashBytes] {
        &self.prev_hashes
    }

    /// `SHA-256(inputHash ‖ prevHash(0) ‖ … ‖ prevHash(skipCount − 1))`.
    pub fn hash(&self) -> HashBytes {
        let mut parts = Vec::with_capacity(1 + self.prev_hashes.len());
        parts.push(self.input_hash.as_slice());
        for prev in &self.prev_hashes {
            parts.push(prev.as_slice());
        }
        HashBytes::digest(&parts)
    }

    /// Row numbers this row's pointers reference, highest level last.
    pub fn referenced_rows(&self) -> impl Iterator<Item = u64> + '_ {
        (0..self.prev_hashes.len()).map(|level| geometry::referenced_row(self.rn, level))
    }

    /// Hash this row claims for row `rn`, if one of its pointers targets it.
    pub fn referenced_hash(&self, rn: u64) -> Option<HashBytes> {
        let level = geometry::link_level(rn, self.rn)?;
        Some(self.prev_hashes[level])
    }
}
