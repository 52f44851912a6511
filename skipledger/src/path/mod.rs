//! Verified sequences of linked rows.

use std::collections::BTreeMap;

use bytes::Bytes;

use crate::geometry;
use crate::hash::HashBytes;
use crate::row::Row;
use crate::wire::{Reader, WireError};

pub mod bag;
pub mod multi;

use self::bag::RowBag;

#[derive(Debug, thiserror::Error)]
pub enum PathError {
    #[error("empty path")]
    Empty,
    #[error("rows {lo} and {hi} are not linked by a skip pointer")]
    NotLinked { lo: u64, hi: u64 },
    #[error("hash conflict at row {rn}")]
    HashConflict { rn: u64 },
    #[error("path [{lo}, {hi}] does not intersect the accumulated spine")]
    IslandRejected { lo: u64, hi: u64 },
    #[error("multi-path reaches no state anchor (row 1) and is not declared partial")]
    NotAnchored,
    #[error(transparent)]
    Wire(#[from] WireError),
    #[error("i/o failure")]
    Io(#[from] std::io::Error),
}

/// Non-empty sequence of full rows, strictly ascending, each consecutive
/// pair linked by an exact skip pointer with matching hashes. Immutable
/// once constructed; construction is the proof of linkage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Path {
    rows: Vec<Row>,
}

impl Path {
    /// Conventional file extension for a serialized (state) path.
    pub const FILE_EXT: &'static str = "spath";

    pub fn new(rows: Vec<Row>) -> Result<Self, PathError> {
        if rows.is_empty() {
            return Err(PathError::Empty);
        }
        for pair in rows.windows(2) {
            let (lo, hi) = (&pair[0], &pair[1]);
            let Some(level) = geometry::link_level(lo.no(), hi.no()) else {
                return Err(PathError::NotLinked {
                    lo: lo.no(),
                    hi: hi.no(),
                });
            };
            if hi.prev_hash(level) != lo.hash() {
                return Err(PathError::HashConflict { rn: lo.no() });
            }
        }
        Ok(Self { rows })
    }

    pub fn lo(&self) -> u64 {
        self.rows[0].no()
    }

    pub fn hi(&self) -> u64 {
        self.rows[self.rows.len() - 1].no()
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn row_numbers(&self) -> Vec<u64> {
        self.rows.iter().map(Row::no).collect()
    }

    pub fn first(&self) -> &Row {
        &self.rows[0]
    }

    pub fn last(&self) -> &Row {
        &self.rows[self.rows.len() - 1]
    }

    /// Hash of the highest row: the path's fingerprint of ledger state.
    pub fn head_hash(&self) -> HashBytes {
        self.last().hash()
    }

    /// Whether this path starts at row 1 and therefore anchors ledger state.
    pub fn is_state_path(&self) -> bool {
        self.lo() == 1
    }

    /// Row-number intersections with `other`, ascending. See
    /// [`Intersection`].
    pub fn intersections(&self, other: &Path) -> Vec<Intersection> {
        let ours = self.known_hashes();
        let theirs = other.known_hashes();
        let mut out = Vec::new();
        for (&rn, &hash) in &ours {
            if rn == 0 {
                continue;
            }
            let Some(&other_hash) = theirs.get(&rn) else {
                continue;
            };
            let kind = if hash != other_hash {
                IntersectKind::Conflict
            } else {
                match (self.full_row(rn).is_some(), other.full_row(rn).is_some()) {
                    (true, true) => IntersectKind::Direct,
                    (true, false) | (false, true) => IntersectKind::ByLineage,
                    (false, false) => IntersectKind::ByReference,
                }
            };
            out.push(Intersection { rn, kind });
        }
        out
    }

    /// Largest row number common to both paths under skip linkage with
    /// agreeing hashes; 0 if none.
    pub fn highest_common_no(&self, other: &Path) -> u64 {
        self.intersections(other)
            .iter()
            .rev()
            .find(|x| x.kind != IntersectKind::Conflict)
            .map(|x| x.rn)
            .unwrap_or(0)
    }

    /// Every row number whose hash this path knows, with the hash: full
    /// rows plus everything their pointers reference.
    pub(crate) fn known_hashes(&self) -> BTreeMap<u64, HashBytes> {
        let mut known = BTreeMap::new();
        for row in &self.rows {
            for (level, &hash) in row.prev_hashes().iter().enumerate() {
                known.insert(geometry::referenced_row(row.no(), level), hash);
            }
        }
        // Full rows win over references to them.
        for row in &self.rows {
            known.insert(row.no(), row.hash());
        }
        known
    }

    /// Serial form: u32 row count, then each row as
    /// `(rn: u64, inputHash, prevHash × skipCount(rn))`.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        self.write_to(&mut out);
        out
    }

    pub(crate) fn write_to(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&(self.rows.len() as u32).to_be_bytes());
        for row in &self.rows {
            out.extend_from_slice(&row.no().to_be_bytes());
            out.extend_from_slice(row.input_hash().as_slice());
            for prev in row.prev_hashes() {
                out.extend_from_slice(prev.as_slice());
            }
        }
    }

    pub fn decode(data: Bytes) -> Result<Self, PathError> {
        let mut reader = Reader::new(data);
        let path = Self::read_from(&mut reader)?;
        reader.expect_end().map_err(PathError::Wire)?;
        Ok(path)
    }

    pub fn save(&self, file: &std::path::Path) -> Result<(), PathError> {
        std::fs::write(file, self.encode())?;
        Ok(())
    }

    pub fn load(file: &std::path::Path) -> Result<Self, PathError> {
        Self::decode(Bytes::from(std::fs::read(file)?))
    }

    pub fn read_from(reader: &mut Reader) -> Result<Self, PathError> {
        let count = reader.read_u32()?;
        let mut rows = Vec::with_capacity(count as usize);
        let mut prev_rn = 0u64;
        for _ in 0..count {
            let rn = reader.read_u64()?;
            if rn == 0 || rn <= prev_rn {
                return Err(PathError::Wire(
                    reader.bad(format!("row numbers must strictly ascend, got {rn}")),
                ));
            }
            prev_rn = rn;
            let input_hash = reader.read_hash()?;
            let mut prev_hashes = Vec::with_capacity(geometry::skip_count(rn));
            for _ in 0..geometry::skip_count(rn) {
                prev_hashes.push(reader.read_hash()?);
            }
            if geometry::referenced_row(rn, geometry::skip_count(rn) - 1) == 0
                && !prev_hashes[geometry::skip_count(rn) - 1].is_sentinel()
            {
                return Err(PathError::Wire(
                    reader.bad(format!("row {rn} must reference the sentinel")),
                ));
            }
            rows.push(Row::new(rn, input_hash, prev_hashes));
        }
        Self::new(rows)
    }
}

impl RowBag for Path {
    fn full_row_numbers(&self) -> Vec<u64> {
        self.row_numbers()
    }

    fn full_row(&self, rn: u64) -> Option<&Row> {
        let index = self.rows.binary_search_by_key(&rn, Row::no).ok()?;
        Some(&self.rows[index])
    }

    fn ref_only_hash(&self, rn: u64) -> Option<HashBytes> {
        self.rows.iter().find_map(|row| row.referenced_hash(rn))
    }
}

/// How two paths touch at a row number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Intersection {
    pub rn: u64,
    pub kind: IntersectKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntersectKind {
    /// Both paths hold the full row.
    Direct,
    /// One path holds the full row, the other references its hash.
    ByLineage,
    /// Both paths only reference the hash.
    ByReference,
    /// The paths disagree on the row's hash.
    Conflict,
}
