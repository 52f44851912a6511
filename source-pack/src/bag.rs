//! Ascending collections of source rows under one salt scheme.

use skipledger::RowBag;

use crate::row::{SourceError, SourceRow};
use crate::scheme::SaltScheme;

/// Ascending-by-row-number list of [`SourceRow`]s sharing a single
/// [`SaltScheme`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceBag {
    scheme: SaltScheme,
    rows: Vec<SourceRow>,
}

impl SourceBag {
    pub fn new(scheme: SaltScheme) -> Self {
        Self {
            scheme,
            rows: Vec::new(),
        }
    }

    pub fn scheme(&self) -> &SaltScheme {
        &self.scheme
    }

    pub fn rows(&self) -> &[SourceRow] {
        &self.rows
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn row(&self, rn: u64) -> Option<&SourceRow> {
        let index = self.rows.binary_search_by_key(&rn, SourceRow::no).ok()?;
        Some(&self.rows[index])
    }

    /// Inserts `row`, keeping ascending order. Returns `false` on a
    /// duplicate row number (the held row wins); fails if the row
    /// violates the bag's salt scheme.
    pub fn add_row(&mut self, row: SourceRow) -> Result<bool, SourceError> {
        row.check_scheme(&self.scheme)?;
        match self.rows.binary_search_by_key(&row.no(), SourceRow::no) {
            Ok(_) => Ok(false),
            Err(at) => {
                self.rows.insert(at, row);
                Ok(true)
            }
        }
    }

    /// Checks every row's hash against the input hash the row bag holds
    /// for its row number.
    pub fn verify_against<B: RowBag>(&self, bag: &B) -> Result<(), SourceError> {
        for row in &self.rows {
            match bag.input_hash(row.no()) {
                Some(input) if input == row.hash() => {}
                _ => return Err(SourceError::HashConflict { rn: row.no() }),
            }
        }
        Ok(())
    }
}
