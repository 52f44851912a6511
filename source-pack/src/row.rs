//! Source rows: the ledger-independent content whose hash becomes a
//! skip-ledger row's input hash.

use skipledger::HashBytes;

use crate::cell::{Cell, Salt};
use crate::scheme::SaltScheme;

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("row {rn}: {reason}")]
    SchemaMismatch { rn: u64, reason: String },
    #[error("unsupported value: {0}")]
    Unsupported(String),
    #[error("row builder needs a table salt for salted columns")]
    SaltRequired,
    #[error("hash conflict at row {rn}")]
    HashConflict { rn: u64 },
}

/// Immutable ordered list of cells with a positive row number.
///
/// Invariants, checked at construction:
/// - at least one cell, and not all of them null;
/// - a row without redactions is uniformly row-salted: every salted cell
///   derives from one shared row salt (an explicit per-cell salt only
///   appears once a sibling cell has been redacted, since revealing the
///   row salt would expose the redacted cells to a dictionary walk).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceRow {
    rn: u64,
    cells: Vec<Cell>,
}

impl SourceRow {
    pub fn new(rn: u64, cells: Vec<Cell>) -> Result<Self, SourceError> {
        let mismatch = |reason: String| SourceError::SchemaMismatch { rn, reason };
        if rn == 0 {
            return Err(mismatch("row numbers start at 1".into()));
        }
        if cells.is_empty() {
            return Err(mismatch("no cells".into()));
        }
        if cells.iter().all(Cell::is_null) {
            return Err(mismatch("all cells null".into()));
        }

        let redacted = cells.iter().any(Cell::is_redacted);
        let mut row_salt = None;
        for (col, cell) in cells.iter().enumerate() {
            let Cell::Reveal {
                salt: Some(salt), ..
            } = cell
            else {
                continue;
            };
            match (redacted, salt) {
                (false, Salt::Explicit(_)) => {
                    return Err(mismatch(format!(
                        "cell {col} carries an explicit salt in an unredacted row"
                    )));
                }
                (false, Salt::Row { row_salt: rs, col: salt_col }) => {
                    if *salt_col != col as u64 {
                        return Err(mismatch(format!(
                            "cell {col} salted for column {salt_col}"
                        )));
                    }
                    if *row_salt.get_or_insert(*rs) != *rs {
                        return Err(mismatch(format!("cell {col} uses a foreign row salt")));
                    }
                }
                (true, _) => {}
            }
        }
        Ok(Self { rn, cells })
    }

    pub fn no(&self) -> u64 {
        self.rn
    }

    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    pub fn cell(&self, col: usize) -> &Cell {
        &self.cells[col]
    }

    pub fn has_redaction(&self) -> bool {
        self.cells.iter().any(Cell::is_redacted)
    }

    /// The shared row salt, if this row is row-salted and unredacted.
    pub fn row_salt(&self) -> Option<HashBytes> {
        if self.has_redaction() {
            return None;
        }
        self.cells.iter().find_map(|cell| match cell {
            Cell::Reveal {
                salt: Some(Salt::Row { row_salt, .. }),
                ..
            } => Some(*row_salt),
            _ => None,
        })
    }

    /// The row's input hash: the single cell's hash, or SHA-256 over the
    /// concatenated cell hashes.
    pub fn hash(&self) -> HashBytes {
        if self.cells.len() == 1 {
            return self.cells[0].hash();
        }
        let hashes: Vec<HashBytes> = self.cells.iter().map(Cell::hash).collect();
        let parts: Vec<&[u8]> = hashes.iter().map(HashBytes::as_slice).collect();
        HashBytes::digest(&parts)
    }

    /// Copy of this row with cell `col` reduced to its hash. The row hash
    /// is unchanged. Remaining salted cells switch to explicit salts so
    /// the row salt itself can be withheld.
    ///
    /// # Panics
    ///
    /// Panics if `col` is out of bounds.
    pub fn redact(&self, col: usize) -> SourceRow {
        let cells = self
            .cells
            .iter()
            .enumerate()
            .map(|(i, cell)| {
                if i == col {
                    cell.redacted()
                } else if let Cell::Reveal {
                    dtype,
                    data,
                    salt: Some(salt),
                } = cell
                {
                    Cell::Reveal {
                        dtype: *dtype,
                        data: data.clone(),
                        salt: Some(Salt::Explicit(salt.resolve())),
                    }
                } else {
                    cell.clone()
                }
            })
            .collect();
        Self { rn: self.rn, cells }
    }

    /// Checks every revealed cell's salted-ness against `scheme`.
    pub fn check_scheme(&self, scheme: &SaltScheme) -> Result<(), SourceError> {
        for (col, cell) in self.cells.iter().enumerate() {
            if cell.is_redacted() {
                continue;
            }
            if cell.has_salt() != scheme.is_salted(col) {
                return Err(SourceError::SchemaMismatch {
                    rn: self.rn,
                    reason: format!(
                        "cell {col} {} salted where the scheme says {}",
                        if cell.has_salt() { "is" } else { "is not" },
                        if scheme.is_salted(col) { "salted" } else { "unsalted" },
                    ),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::CellValue;
    use crate::salt::TableSalt;

    fn sample_row(rn: u64) -> SourceRow {
        let salt = TableSalt::new([9; 32]);
        let row_salt = salt.row_salt(rn);
        SourceRow::new(
            rn,
            vec![
                Cell::unsalted(&CellValue::Long(7)),
                Cell::row_salted(row_salt, 1, &CellValue::String("acme".into())),
                Cell::row_salted(row_salt, 2, &CellValue::Null),
            ],
        )
        .unwrap()
    }

    #[test]
    fn multi_cell_hash_concatenates_cell_hashes() {
        let row = sample_row(3);
        let hashes: Vec<_> = row.cells().iter().map(Cell::hash).collect();
        let parts: Vec<&[u8]> = hashes.iter().map(HashBytes::as_slice).collect();
        assert_eq!(row.hash(), HashBytes::digest(&parts));
    }

    #[test]
    fn single_cell_row_hashes_to_the_cell() {
        let cell = Cell::unsalted(&CellValue::Bytes(vec![1, 2, 3]));
        let row = SourceRow::new(1, vec![cell.clone()]).unwrap();
        assert_eq!(row.hash(), cell.hash());
    }

    #[test]
    fn redaction_keeps_row_hash_and_drops_row_salt() {
        let row = sample_row(5);
        assert!(row.row_salt().is_some());

        for col in 0..3 {
            let redacted = row.redact(col);
            assert_eq!(redacted.hash(), row.hash(), "col {col}");
            assert!(redacted.has_redaction());
            assert_eq!(redacted.row_salt(), None);
        }
    }

    #[test]
    fn redacted_row_still_verifies_revealed_salted_cells() {
        let row = sample_row(5);
        let redacted = row.redact(0);
        // Cell 1 kept its (now explicit) salt, so its hash is intact.
        assert_eq!(redacted.cell(1).hash(), row.cell(1).hash());
        assert!(matches!(
            redacted.cell(1),
            Cell::Reveal {
                salt: Some(Salt::Explicit(_)),
                ..
            }
        ));
    }

    #[test]
    fn all_null_rows_are_rejected() {
        let err = SourceRow::new(2, vec![Cell::unsalted(&CellValue::Null)]).unwrap_err();
        assert!(matches!(err, SourceError::SchemaMismatch { rn: 2, .. }));
    }

    #[test]
    fn explicit_salt_without_redaction_is_rejected() {
        let err = SourceRow::new(
            1,
            vec![
                Cell::salted(HashBytes([4; 32]), &CellValue::Bool(true)),
                Cell::unsalted(&CellValue::Long(1)),
            ],
        )
        .unwrap_err();
        assert!(matches!(err, SourceError::SchemaMismatch { .. }));
    }

    #[test]
    fn scheme_check() {
        let row = sample_row(4);
        assert!(row.check_scheme(&SaltScheme::negative(vec![0])).is_ok());
        assert!(row.check_scheme(&SaltScheme::SALT_ALL).is_err());
        assert!(row.check_scheme(&SaltScheme::NO_SALT).is_err());
        // Redacted cells are exempt from the scheme.
        let redacted = row.redact(1).redact(2);
        assert!(redacted
            .check_scheme(&SaltScheme::negative(vec![0]))
            .is_ok());
    }
}
