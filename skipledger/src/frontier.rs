//! Minimal per-level state for replaying or extending a ledger forward from
//! input hashes alone.
//!
//! A frontier at row `rn` retains one hash per level: level `i` holds the
//! row hash of the highest committed row divisible by `2^i`. Those are
//! exactly the rows any future row's skip pointers can reference, so the
//! next row hash is computable without touching storage.

use bytes::Bytes;

use crate::geometry;
use crate::hash::HashBytes;
use crate::ledger::{LedgerError, SkipLedger};
use crate::table::SkipTable;
use crate::wire::{Reader, WireError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HashFrontier {
    rn: u64,
    levels: Vec<HashBytes>,
}

impl HashFrontier {
    /// The stateless frontier of an empty ledger.
    pub const SENTINEL: Self = Self {
        rn: 0,
        levels: Vec::new(),
    };

    /// Frontier at row 1.
    pub fn first_row(input_hash: HashBytes) -> Self {
        Self::SENTINEL.next(input_hash)
    }

    /// Materializes the frontier at `rn` by reading at most
    /// `level_count(rn)` row hashes from the ledger.
    ///
    /// # Panics
    ///
    /// Panics if `rn > ledger.size()`.
    pub fn load<T: SkipTable>(ledger: &SkipLedger<T>, rn: u64) -> Result<Self, LedgerError> {
        let mut levels = Vec::with_capacity(geometry::level_count(rn));
        for level in 0..geometry::level_count(rn) {
            levels.push(ledger.row_hash(geometry::level_row_number(rn, level))?);
        }
        Ok(Self { rn, levels })
    }

    pub fn lead_row_no(&self) -> u64 {
        self.rn
    }

    /// Row hash of the lead row; the sentinel at `rn == 0`.
    pub fn row_hash(&self) -> HashBytes {
        self.levels.first().copied().unwrap_or(HashBytes::SENTINEL)
    }

    pub fn level_hashes(&self) -> &[HashBytes] {
        &self.levels
    }

    /// Row numbers retained per level, level 0 first.
    pub fn level_row_numbers(&self) -> impl Iterator<Item = u64> + '_ {
        (0..self.levels.len()).map(|level| geometry::level_row_number(self.rn, level))
    }

    /// Frontier after appending `input_hash` as row `rn + 1`.
    pub fn next(&self, input_hash: HashBytes) -> Self {
        let mut next = self.clone();
        next.push(input_hash);
        next
    }

    /// Advances in place; returns the new lead row's hash.
    pub fn push(&mut self, input_hash: HashBytes) -> HashBytes {
        let rn = self.rn + 1;
        let skip_count = geometry::skip_count(rn);

        let mut parts = Vec::with_capacity(1 + skip_count);
        parts.push(input_hash.as_slice());
        for level in 0..skip_count {
            parts.push(if rn == 1 << level {
                HashBytes::SENTINEL.as_slice()
            } else {
                self.levels[level].as_slice()
            });
        }
        let row_hash = HashBytes::digest(&parts);

        if geometry::level_count(rn) > self.levels.len() {
            self.levels.push(row_hash);
        }
        for level in 0..skip_count {
            self.levels[level] = row_hash;
        }
        self.rn = rn;
        row_hash
    }

    /// Serial form: 8-byte row number, then `level_count(rn)` hashes.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(8 + 32 * self.levels.len());
        out.extend_from_slice(&self.rn.to_be_bytes());
        for level in &self.levels {
            out.extend_from_slice(level.as_slice());
        }
        out
    }

    pub fn decode(data: Bytes) -> Result<Self, WireError> {
        let mut reader = Reader::new(data);
        let frontier = Self::read_from(&mut reader)?;
        reader.expect_end()?;
        Ok(frontier)
    }

    pub fn read_from(reader: &mut Reader) -> Result<Self, WireError> {
        let rn = reader.read_u64()?;
        if rn > i64::MAX as u64 {
            return Err(reader.bad("negative row number"));
        }
        if rn == 0 {
            return Ok(Self::SENTINEL);
        }
        let mut levels = Vec::with_capacity(geometry::level_count(rn));
        for _ in 0..geometry::level_count(rn) {
            levels.push(reader.read_hash()?);
        }
        Ok(Self { rn, levels })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(fill: u8) -> HashBytes {
        HashBytes([fill; 32])
    }

    #[test]
    fn incremental_matches_ledger() -> anyhow::Result<()> {
        let inputs: Vec<_> = (1..=40u8).map(input).collect();
        let ledger = SkipLedger::in_memory();
        ledger.append_rows(&inputs)?;

        let mut frontier = HashFrontier::SENTINEL;
        for (i, h) in inputs.iter().enumerate() {
            let row_hash = frontier.push(*h);
            assert_eq!(row_hash, ledger.row_hash(i as u64 + 1)?);
        }
        assert_eq!(frontier.lead_row_no(), 40);
        assert_eq!(frontier.row_hash(), ledger.row_hash(40)?);
        Ok(())
    }

    #[test]
    fn level_expansion_at_powers_of_two() {
        let mut frontier = HashFrontier::first_row(input(1));
        assert_eq!(frontier.level_hashes().len(), 1);
        frontier.push(input(2));
        assert_eq!(frontier.level_hashes().len(), 2);
        frontier.push(input(3));
        assert_eq!(frontier.level_hashes().len(), 2);
        frontier.push(input(4));
        assert_eq!(frontier.level_hashes().len(), 3);
        assert_eq!(
            frontier.level_row_numbers().collect::<Vec<_>>(),
            vec![4, 4, 4]
        );
    }

    #[test]
    fn load_matches_replay() -> anyhow::Result<()> {
        let inputs: Vec<_> = (1..=13u8).map(input).collect();
        let ledger = SkipLedger::in_memory();
        ledger.append_rows(&inputs)?;

        let loaded = HashFrontier::load(&ledger, 13)?;
        let mut replayed = HashFrontier::SENTINEL;
        for h in &inputs {
            replayed.push(*h);
        }
        assert_eq!(loaded, replayed);
        Ok(())
    }

    #[test]
    fn extend_beyond_a_loaded_frontier() -> anyhow::Result<()> {
        let inputs: Vec<_> = (1..=20u8).map(input).collect();
        let ledger = SkipLedger::in_memory();
        ledger.append_rows(&inputs[..12])?;

        let mut frontier = HashFrontier::load(&ledger, 12)?;
        for h in &inputs[12..] {
            frontier.push(*h);
        }

        ledger.append_rows(&inputs[12..])?;
        assert_eq!(frontier.row_hash(), ledger.row_hash(20)?);
        Ok(())
    }

    #[test]
    fn serial_round_trip() -> anyhow::Result<()> {
        let mut frontier = HashFrontier::SENTINEL;
        for i in 1..=11u8 {
            frontier.push(input(i));
        }
        let bytes = frontier.encode();
        assert_eq!(bytes.len(), 8 + 32 * geometry::level_count(11));
        assert_eq!(HashFrontier::decode(Bytes::from(bytes))?, frontier);

        assert_eq!(
            HashFrontier::decode(Bytes::from(vec![0u8; 8]))?,
            HashFrontier::SENTINEL
        );
        Ok(())
    }

    #[test]
    fn negative_row_number_is_bad_format() {
        let mut bytes = vec![0xffu8; 8];
        bytes[0] = 0x80;
        assert!(matches!(
            HashFrontier::decode(Bytes::from(bytes)),
            Err(WireError::BadFormat { .. })
        ));
    }
}
