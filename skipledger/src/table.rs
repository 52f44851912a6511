//! Abstract backing store for the skip-ledger engine.
//!
//! A table row is two 32-byte cells: the row's input hash followed by its
//! committed row hash. The engine never stores skip pointers; they are
//! recomputed from row numbers.

use crate::hash::HashBytes;

/// Cells per stored row.
pub const ROW_CELLS: usize = 2;
/// Serialized width of one stored row.
pub const ROW_WIDTH: usize = ROW_CELLS * HashBytes::SIZE;

#[derive(Debug, thiserror::Error)]
pub enum TableError {
    #[error("table size moved underneath the writer: expected {expected}, found {actual}")]
    ConcurrentModification { expected: u64, actual: u64 },
    #[error("backing store refused {count} more row(s) at size {size}")]
    StorageFull { size: u64, count: u64 },
    #[error("i/o failure in backing store")]
    Io(#[from] std::io::Error),
}

/// Backing store contract. Row `rn` of the ledger lives at index `rn - 1`.
///
/// Implementations only store and fetch fixed-width byte rows; hashing and
/// linkage are the engine's business.
pub trait SkipTable {
    fn size(&self) -> Result<u64, TableError>;

    fn read_row(&self, index: u64) -> Result<[u8; ROW_WIDTH], TableError>;

    /// Appends `rows` (a multiple of [`ROW_WIDTH`] bytes) atomically.
    ///
    /// Fails with [`TableError::ConcurrentModification`] if the current size
    /// disagrees with `expected_index`; in that case nothing is written.
    /// Returns the new size.
    fn add_rows(&mut self, rows: &[u8], expected_index: u64) -> Result<u64, TableError>;

    /// Removes rows at indices `>= new_size`. Fix-mode only.
    fn truncate(&mut self, new_size: u64) -> Result<(), TableError>;
}

/// Reference in-memory table.
#[derive(Default)]
pub struct MemTable {
    rows: Vec<[u8; ROW_WIDTH]>,
}

impl MemTable {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SkipTable for MemTable {
    fn size(&self) -> Result<u64, TableError> {
        Ok(self.rows.len() as u64)
    }

    fn read_row(&self, index: u64) -> Result<[u8; ROW_WIDTH], TableError> {
        Ok(self.rows[index as usize])
    }

    fn add_rows(&mut self, rows: &[u8], expected_index: u64) -> Result<u64, TableError> {
        assert_eq!(rows.len() % ROW_WIDTH, 0, "misaligned row buffer");
        let actual = self.rows.len() as u64;
        if actual != expected_index {
            return Err(TableError::ConcurrentModification {
                expected: expected_index,
                actual,
            });
        }
        for chunk in rows.chunks_exact(ROW_WIDTH) {
            let mut row = [0; ROW_WIDTH];
            row.copy_from_slice(chunk);
            self.rows.push(row);
        }
        Ok(self.rows.len() as u64)
    }

    fn truncate(&mut self, new_size: u64) -> Result<(), TableError> {
        self.rows.truncate(new_size as usize);
        Ok(())
    }
}

/// All-or-nothing write view over a backing table.
///
/// Buffers appended rows up to a fixed bound and commits them with a single
/// `add_rows` call, so a failed append leaves the base table untouched.
/// Reads see the pending rows.
pub struct TableTransaction<'a, T: ?Sized> {
    base: &'a mut T,
    base_size: u64,
    pending: Vec<u8>,
    max_pending: usize,
}

impl<'a, T: SkipTable + ?Sized> TableTransaction<'a, T> {
    pub const DEFAULT_MAX_PENDING: usize = 64 * 1024;

    pub fn new(base: &'a mut T) -> Result<Self, TableError> {
        Self::with_capacity(base, Self::DEFAULT_MAX_PENDING)
    }

    pub fn with_capacity(base: &'a mut T, max_pending: usize) -> Result<Self, TableError> {
        let base_size = base.size()?;
        Ok(Self {
            base,
            base_size,
            pending: Vec::new(),
            max_pending,
        })
    }

    pub fn size(&self) -> u64 {
        self.base_size + self.pending_count()
    }

    pub fn pending_count(&self) -> u64 {
        (self.pending.len() / ROW_WIDTH) as u64
    }

    pub fn read_row(&self, index: u64) -> Result<[u8; ROW_WIDTH], TableError> {
        if index < self.base_size {
            return self.base.read_row(index);
        }
        let offset = (index - self.base_size) as usize * ROW_WIDTH;
        let mut row = [0; ROW_WIDTH];
        row.copy_from_slice(&self.pending[offset..offset + ROW_WIDTH]);
        Ok(row)
    }

    pub fn push(&mut self, row: &[u8; ROW_WIDTH]) -> Result<(), TableError> {
        if self.pending.len() / ROW_WIDTH >= self.max_pending {
            return Err(TableError::StorageFull {
                size: self.size(),
                count: 1,
            });
        }
        self.pending.extend_from_slice(row);
        Ok(())
    }

    /// Commits all pending rows; returns the new base size.
    pub fn commit(self) -> Result<u64, TableError> {
        if self.pending.is_empty() {
            return Ok(self.base_size);
        }
        self.base.add_rows(&self.pending, self.base_size)
    }
}
