//! The append-only skip-ledger engine.

use parking_lot::Mutex;

use crate::geometry;
use crate::hash::HashBytes;
use crate::path::{Path, PathError};
use crate::row::Row;
use crate::table::{MemTable, SkipTable, TableError, TableTransaction, ROW_WIDTH};

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error(transparent)]
    Table(#[from] TableError),
    #[error(transparent)]
    Path(#[from] PathError),
}

/// Append-only store of per-row hash data over a backing [`SkipTable`].
///
/// One mutex guards the table and the cached size; readers across ledger
/// instances are independent. Row-number contract violations panic, I/O
/// failures propagate.
pub struct SkipLedger<T> {
    inner: Mutex<Inner<T>>,
}

struct Inner<T> {
    table: T,
    size: u64,
}

impl SkipLedger<MemTable> {
    pub fn in_memory() -> Self {
        Self {
            inner: Mutex::new(Inner {
                table: MemTable::new(),
                size: 0,
            }),
        }
    }
}

impl<T: SkipTable> SkipLedger<T> {
    pub fn new(table: T) -> Result<Self, LedgerError> {
        let size = table.size()?;
        Ok(Self {
            inner: Mutex::new(Inner { table, size }),
        })
    }

    /// Number of committed rows.
    pub fn size(&self) -> u64 {
        self.inner.lock().size
    }

    /// Appends one row per input hash; returns the new size.
    ///
    /// The whole batch commits atomically: on failure the ledger is
    /// unchanged.
    pub fn append_rows(&self, input_hashes: &[HashBytes]) -> Result<u64, LedgerError> {
        if input_hashes.is_empty() {
            return Ok(self.size());
        }
        let mut inner = self.inner.lock();
        let mut tx = TableTransaction::new(&mut inner.table)?;
        for input_hash in input_hashes {
            let rn = tx.size() + 1;
            let row_hash = compute_row_hash(&tx, rn, *input_hash)?;
            let mut row = [0; ROW_WIDTH];
            row[..32].copy_from_slice(input_hash.as_slice());
            row[32..].copy_from_slice(row_hash.as_slice());
            tx.push(&row)?;
        }
        let new_size = tx.commit()?;
        inner.size = new_size;
        tracing::debug!(new_size, appended = input_hashes.len(), "appended rows");
        Ok(new_size)
    }

    /// Committed hash of row `rn`; the sentinel for `rn == 0`.
    ///
    /// # Panics
    ///
    /// Panics if `rn > size()`.
    pub fn row_hash(&self, rn: u64) -> Result<HashBytes, LedgerError> {
        let inner = self.inner.lock();
        inner.row_hash(rn)
    }

    /// Input hash of row `rn`.
    ///
    /// # Panics
    ///
    /// Panics if `rn < 1` or `rn > size()`.
    pub fn input_hash(&self, rn: u64) -> Result<HashBytes, LedgerError> {
        let inner = self.inner.lock();
        assert!(rn >= 1, "row numbers start at 1");
        assert!(rn <= inner.size, "row {rn} beyond size {}", inner.size);
        let stored = inner.table.read_row(rn - 1)?;
        Ok(read_cell(&stored, 0))
    }

    /// Full row `rn` with its input hash and skip-pointer hashes.
    ///
    /// # Panics
    ///
    /// Panics if `rn < 1` or `rn > size()`.
    pub fn get_row(&self, rn: u64) -> Result<Row, LedgerError> {
        let inner = self.inner.lock();
        inner.get_row(rn)
    }

    /// Path stitching all `targets` together, `lo = min(targets)`,
    /// `hi = max(targets)`.
    ///
    /// # Panics
    ///
    /// Panics if `targets` is empty or reaches beyond `size()`.
    pub fn get_path(&self, targets: &[u64]) -> Result<Path, LedgerError> {
        assert!(!targets.is_empty(), "no path targets");
        let mut targets = targets.to_vec();
        targets.sort_unstable();
        targets.dedup();

        let inner = self.inner.lock();
        assert!(
            targets[targets.len() - 1] <= inner.size,
            "path target beyond size {}",
            inner.size
        );
        let mut rows = Vec::new();
        for rn in geometry::stitch(&targets) {
            rows.push(inner.get_row(rn)?);
        }
        Ok(Path::new(rows)?)
    }

    /// The skip path from row 1 to the last row: the ledger's compact
    /// fingerprint.
    ///
    /// # Panics
    ///
    /// Panics on an empty ledger.
    pub fn state_path(&self) -> Result<Path, LedgerError> {
        let size = self.size();
        assert!(size >= 1, "empty ledger has no state path");
        self.get_path(&[1, size])
    }

    /// Discards rows `(new_size, size()]`. Fix-mode only; not part of the
    /// normal append-only contract.
    pub fn trim_size(&self, new_size: u64) -> Result<(), LedgerError> {
        let mut inner = self.inner.lock();
        assert!(new_size <= inner.size, "trim cannot grow the ledger");
        inner.table.truncate(new_size)?;
        let trimmed = inner.size - new_size;
        inner.size = new_size;
        tracing::warn!(new_size, trimmed, "trimmed ledger");
        Ok(())
    }
}

impl<T: SkipTable> Inner<T> {
    fn row_hash(&self, rn: u64) -> Result<HashBytes, LedgerError> {
        if rn == 0 {
            return Ok(HashBytes::SENTINEL);
        }
        assert!(rn <= self.size, "row {rn} beyond size {}", self.size);
        let stored = self.table.read_row(rn - 1)?;
        Ok(read_cell(&stored, 1))
    }

    fn get_row(&self, rn: u64) -> Result<Row, LedgerError> {
        assert!(rn >= 1, "row numbers start at 1");
        assert!(rn <= self.size, "row {rn} beyond size {}", self.size);
        let stored = self.table.read_row(rn - 1)?;
        let input_hash = read_cell(&stored, 0);
        let mut prev_hashes = Vec::with_capacity(geometry::skip_count(rn));
        for level in 0..geometry::skip_count(rn) {
            prev_hashes.push(self.row_hash(geometry::referenced_row(rn, level))?);
        }
        Ok(Row::new(rn, input_hash, prev_hashes))
    }
}

fn read_cell(stored: &[u8; ROW_WIDTH], cell: usize) -> HashBytes {
    let mut hash = [0; 32];
    hash.copy_from_slice(&stored[cell * 32..(cell + 1) * 32]);
    HashBytes(hash)
}

/// Row hash of `rn` given the (possibly pending) rows below it.
fn compute_row_hash<T: SkipTable + ?Sized>(
    tx: &TableTransaction<'_, T>,
    rn: u64,
    input_hash: HashBytes,
) -> Result<HashBytes, TableError> {
    let mut parts: Vec<HashBytes> = Vec::with_capacity(1 + geometry::skip_count(rn));
    parts.push(input_hash);
    for level in 0..geometry::skip_count(rn) {
        let prev_rn = geometry::referenced_row(rn, level);
        let prev_hash = if prev_rn == 0 {
            HashBytes::SENTINEL
        } else {
            read_cell(&tx.read_row(prev_rn - 1)?, 1)
        };
        parts.push(prev_hash);
    }
    let slices: Vec<&[u8]> = parts.iter().map(HashBytes::as_slice).collect();
    Ok(HashBytes::digest(&slices))
}
