//! Assembles salted source rows from typed values.

use crate::cell::{Cell, CellValue, DataType};
use crate::row::{SourceError, SourceRow};
use crate::salt::TableSalt;
use crate::scheme::SaltScheme;

/// Builds [`SourceRow`]s under a fixed [`SaltScheme`].
///
/// If the scheme salts any column the builder must own the ledger's
/// [`TableSalt`]; per-row salts are derived from it on demand. The salt
/// handle lives and dies with the builder.
pub struct SourceRowBuilder {
    scheme: SaltScheme,
    salt: Option<TableSalt>,
}

impl SourceRowBuilder {
    pub fn new(scheme: SaltScheme) -> Self {
        Self { scheme, salt: None }
    }

    pub fn with_salt(scheme: SaltScheme, salt: TableSalt) -> Self {
        Self {
            scheme,
            salt: Some(salt),
        }
    }

    pub fn scheme(&self) -> &SaltScheme {
        &self.scheme
    }

    /// Builds row `rn` from `values`, declared under `types`.
    ///
    /// Cell count must match the declared types; each value must be of
    /// its declared type or null. Salted columns require the table salt.
    pub fn build(
        &self,
        rn: u64,
        types: &[DataType],
        values: &[CellValue],
    ) -> Result<SourceRow, SourceError> {
        if values.len() != types.len() {
            return Err(SourceError::SchemaMismatch {
                rn,
                reason: format!("{} values for {} columns", values.len(), types.len()),
            });
        }
        for (col, (value, &dtype)) in values.iter().zip(types).enumerate() {
            let actual = value.data_type();
            if actual != dtype && actual != DataType::Null {
                return Err(SourceError::SchemaMismatch {
                    rn,
                    reason: format!("cell {col} is {actual:?}, declared {dtype:?}"),
                });
            }
        }

        let row_salt = if self.scheme.any_salted(values.len()) {
            match &self.salt {
                Some(salt) => Some(salt.row_salt(rn)),
                None => return Err(SourceError::SaltRequired),
            }
        } else {
            None
        };

        let cells = values
            .iter()
            .enumerate()
            .map(|(col, value)| match row_salt {
                // row_salt is present whenever any column is salted.
                Some(rs) if self.scheme.is_salted(col) => Cell::row_salted(rs, col as u64, value),
                _ => Cell::unsalted(value),
            })
            .collect();
        SourceRow::new(rn, cells)
    }

    /// Like [`Self::build`] with values bridged from JSON. Integral
    /// numbers become longs; fractional numbers are unsupported (callers
    /// pre-scale to integers).
    pub fn build_json(
        &self,
        rn: u64,
        types: &[DataType],
        values: &[serde_json::Value],
    ) -> Result<SourceRow, SourceError> {
        let values = values
            .iter()
            .map(cell_value_from_json)
            .collect::<Result<Vec<_>, _>>()?;
        self.build(rn, types, &values)
    }
}

fn cell_value_from_json(value: &serde_json::Value) -> Result<CellValue, SourceError> {
    use serde_json::Value;
    Ok(match value {
        Value::Null => CellValue::Null,
        Value::Bool(b) => CellValue::Bool(*b),
        Value::Number(n) => match n.as_i64() {
            Some(v) => CellValue::Long(v),
            None => return Err(SourceError::Unsupported(format!("number {n}"))),
        },
        Value::String(s) => CellValue::String(s.clone()),
        Value::Array(_) | Value::Object(_) => {
            return Err(SourceError::Unsupported("nested json value".into()))
        }
    })
}
