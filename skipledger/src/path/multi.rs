//! Sets of paths over the same ledger, merged into one hash-consistent
//! row store.

use std::collections::BTreeMap;

use bytes::Bytes;

use crate::hash::HashBytes;
use crate::path::bag::RowBag;
use crate::path::{Path, PathError};
use crate::row::Row;
use crate::wire::Reader;

/// Accumulates paths connected to a common spine.
///
/// A path is accepted only if it shares at least one covered row number
/// with the paths already accumulated, with agreeing hashes. A
/// disconnected path is an island and is rejected: nothing would tie its
/// hashes to the rest of the evidence.
#[derive(Clone)]
pub struct MultiPathBuilder {
    paths: Vec<Path>,
    known: BTreeMap<u64, HashBytes>,
    partial: bool,
}

impl MultiPathBuilder {
    pub fn new(seed: Path) -> Self {
        let known = seed.known_hashes();
        Self {
            paths: vec![seed],
            known,
            partial: false,
        }
    }

    /// Declares the final multi-path partial: it need not reach row 1.
    pub fn partial(&mut self) -> &mut Self {
        self.partial = true;
        self
    }

    /// Merges `path`; returns the highest row number at which it
    /// intersects the accumulated spine.
    pub fn add_path(&mut self, path: Path) -> Result<u64, PathError> {
        let candidate = path.known_hashes();
        let mut highest = 0u64;
        for (&rn, &hash) in &candidate {
            if rn == 0 {
                continue;
            }
            let Some(&held) = self.known.get(&rn) else {
                continue;
            };
            if held != hash {
                return Err(PathError::HashConflict { rn });
            }
            highest = rn;
        }
        if highest == 0 {
            return Err(PathError::IslandRejected {
                lo: path.lo(),
                hi: path.hi(),
            });
        }

        // Every shared key agreed above, so merge order is immaterial.
        self.known.extend(candidate);
        if !self.paths.contains(&path) {
            self.paths.push(path);
        }
        Ok(highest)
    }

    pub fn is_anchored(&self) -> bool {
        self.paths.iter().any(Path::is_state_path)
    }

    /// Highest full row number accumulated so far.
    pub fn max_row_no(&self) -> u64 {
        self.paths.iter().map(Path::hi).max().unwrap_or(0)
    }

    pub fn has_full_row(&self, rn: u64) -> bool {
        self.paths.iter().any(|p| p.full_row(rn).is_some())
    }

    /// Hash of any covered row, full or referenced.
    pub fn row_hash(&self, rn: u64) -> Option<HashBytes> {
        if rn == 0 {
            return Some(HashBytes::SENTINEL);
        }
        self.known.get(&rn).copied()
    }

    /// Input hash of a full row.
    pub fn input_hash(&self, rn: u64) -> Option<HashBytes> {
        self.paths
            .iter()
            .find_map(|p| p.full_row(rn))
            .map(Row::input_hash)
    }

    /// Freezes the accumulated paths, ordered by descending `hi`.
    ///
    /// Fails with [`PathError::NotAnchored`] unless some path reaches
    /// row 1 or [`Self::partial`] was declared.
    pub fn build(self) -> Result<MultiPath, PathError> {
        if !self.partial && !self.is_anchored() {
            return Err(PathError::NotAnchored);
        }
        let mut paths = self.paths;
        paths.sort_by(|a, b| b.hi().cmp(&a.hi()).then(a.lo().cmp(&b.lo())));
        Ok(MultiPath {
            paths,
            known: self.known,
            partial: self.partial,
        })
    }
}

impl From<MultiPath> for MultiPathBuilder {
    /// Reopens a frozen multi-path for further accumulation.
    fn from(multi: MultiPath) -> Self {
        Self {
            paths: multi.paths,
            known: multi.known,
            partial: multi.partial,
        }
    }
}

/// Frozen, hash-consistent set of connected paths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultiPath {
    /// Ordered by descending `hi`.
    paths: Vec<Path>,
    known: BTreeMap<u64, HashBytes>,
    partial: bool,
}

impl MultiPath {
    pub fn paths(&self) -> &[Path] {
        &self.paths
    }

    pub fn is_partial(&self) -> bool {
        self.partial
    }

    pub fn is_anchored(&self) -> bool {
        self.paths.iter().any(Path::is_state_path)
    }

    /// Highest full row number.
    pub fn max_row_no(&self) -> u64 {
        self.paths[0].hi()
    }

    /// Serial form: u8 flags (bit 0 = partial), u32 path count, then each
    /// path in stored order.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        self.write_to(&mut out);
        out
    }

    pub fn write_to(&self, out: &mut Vec<u8>) {
        out.push(u8::from(self.partial));
        out.extend_from_slice(&(self.paths.len() as u32).to_be_bytes());
        for path in &self.paths {
            path.write_to(out);
        }
    }

    pub fn decode(data: Bytes) -> Result<Self, PathError> {
        let mut reader = Reader::new(data);
        let multi = Self::read_from(&mut reader)?;
        reader.expect_end().map_err(PathError::Wire)?;
        Ok(multi)
    }

    /// Re-validates everything on read: linkage per path, connectivity and
    /// hash agreement across paths. Stored order need not be an insertion
    /// order that keeps every prefix connected, so pending paths are
    /// retried until a pass adds none.
    pub fn read_from(reader: &mut Reader) -> Result<Self, PathError> {
        let flags = reader.read_u8()?;
        if flags > 1 {
            return Err(PathError::Wire(reader.bad(format!("bad flags {flags:#x}"))));
        }
        let count = reader.read_u32()?;
        if count == 0 {
            return Err(PathError::Empty);
        }
        let mut pending = Vec::with_capacity(count as usize);
        for _ in 0..count {
            pending.push(Path::read_from(reader)?);
        }

        let mut builder = MultiPathBuilder::new(pending.remove(0));
        if flags & 1 != 0 {
            builder.partial();
        }
        while !pending.is_empty() {
            let before = pending.len();
            let mut rest = Vec::new();
            for path in pending {
                match builder.add_path(path.clone()) {
                    Ok(_) => {}
                    Err(PathError::IslandRejected { .. }) => rest.push(path),
                    Err(e) => return Err(e),
                }
            }
            if rest.len() == before {
                return Err(PathError::IslandRejected {
                    lo: rest[0].lo(),
                    hi: rest[0].hi(),
                });
            }
            pending = rest;
        }
        builder.build()
    }
}

impl RowBag for MultiPath {
    fn full_row_numbers(&self) -> Vec<u64> {
        let mut numbers: Vec<u64> = self
            .paths
            .iter()
            .flat_map(|p| p.rows().iter().map(Row::no))
            .collect();
        numbers.sort_unstable();
        numbers.dedup();
        numbers
    }

    fn full_row(&self, rn: u64) -> Option<&Row> {
        self.paths.iter().find_map(|p| p.full_row(rn))
    }

    fn ref_only_hash(&self, rn: u64) -> Option<HashBytes> {
        if self.has_full_row(rn) {
            return None;
        }
        self.known.get(&rn).copied()
    }
}
