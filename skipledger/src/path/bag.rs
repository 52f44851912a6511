//! Abstract row store over path-derived rows.

use crate::hash::HashBytes;
use crate::row::Row;

/// A bag of full rows that can answer `row_hash` for every row number in
/// the transitive coverage of its full rows, without storing any hash
/// twice at the interface level.
///
/// Two sources back the answer: a full row recomputes its own hash from
/// its input hash and pointer hashes, and a covered-only row's hash is the
/// pointer value some deeper full row carries for it.
pub trait RowBag {
    /// Ascending numbers of the full rows held.
    fn full_row_numbers(&self) -> Vec<u64>;

    fn full_row(&self, rn: u64) -> Option<&Row>;

    /// Hash known for `rn` only through another row's skip pointer.
    fn ref_only_hash(&self, rn: u64) -> Option<HashBytes>;

    fn has_full_row(&self, rn: u64) -> bool {
        self.full_row(rn).is_some()
    }

    /// Input hash of a full row.
    fn input_hash(&self, rn: u64) -> Option<HashBytes> {
        self.full_row(rn).map(Row::input_hash)
    }

    /// Hash of any row in the bag's coverage; the sentinel for `rn == 0`.
    fn row_hash(&self, rn: u64) -> Option<HashBytes> {
        if rn == 0 {
            return Some(HashBytes::SENTINEL);
        }
        match self.full_row(rn) {
            Some(row) => Some(row.hash()),
            None => self.ref_only_hash(rn),
        }
    }

    fn lo(&self) -> u64 {
        self.full_row_numbers().first().copied().unwrap_or(0)
    }

    fn hi(&self) -> u64 {
        self.full_row_numbers().last().copied().unwrap_or(0)
    }
}
