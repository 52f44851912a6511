//! The source-pack wire format.
//!
//! Big-endian throughout. The header's framing parameters (cell-count
//! width, var-size width) adapt to the maxima actually present in the
//! bag; the decoder applies them as read and re-validates every content
//! invariant, so a decoded bag is as trustworthy as a built one.

use bytes::Bytes;
use skipledger::wire::{put_uint, uint_width, Reader, WireError};

use crate::bag::SourceBag;
use crate::cell::{Cell, DataType, Salt};
use crate::row::{SourceError, SourceRow};
use crate::scheme::SaltScheme;

const FLAG_ISO_COUNT: u64 = 1;
const SALT_MASK: u64 = 6;
const SALT_NONE: u64 = 0;
const SALT_LISTED: u64 = 2;
const SALT_EXCEPT: u64 = 4;
const SALT_FULL: u64 = 6;

const STATUS_REDACTED: u8 = 1;

const MAX_CELL_COUNT_SIZE: usize = 3;
const MAX_VAR_SIZE_LEN: usize = 4;

#[derive(Debug, thiserror::Error)]
pub enum PackError {
    #[error(transparent)]
    Wire(#[from] WireError),
    #[error("bad source pack: {reason} at byte {offset}")]
    BadSourcePack { offset: usize, reason: String },
    #[error(transparent)]
    Source(#[from] SourceError),
    #[error("unencodable source bag: {0}")]
    Unencodable(String),
}

fn bad(reader: &Reader, reason: impl Into<String>) -> PackError {
    PackError::BadSourcePack {
        offset: reader.offset(),
        reason: reason.into(),
    }
}

impl SourceBag {
    /// Conventional file extension for a serialized source pack.
    pub const FILE_EXT: &'static str = "spack";

    pub fn encode(&self) -> Result<Vec<u8>, PackError> {
        let rows = self.rows();
        let scheme = self.scheme();

        let iso_count = match rows.first() {
            None => Some(0u64),
            Some(first) => {
                let count = first.cells().len() as u64;
                (rows.iter().all(|r| r.cells().len() as u64 == count)
                    && count <= u64::from(u16::MAX))
                .then_some(count)
            }
        };
        let max_count = rows.iter().map(|r| r.cells().len() as u64).max().unwrap_or(0);
        let cell_count_size = uint_width(max_count);
        if cell_count_size > MAX_CELL_COUNT_SIZE {
            return Err(PackError::Unencodable(format!("{max_count} cells in a row")));
        }

        let max_var = rows
            .iter()
            .flat_map(|r| r.cells().iter())
            .filter_map(|cell| match cell {
                Cell::Reveal { dtype, data, .. } if dtype.is_var_size() => Some(data.len() as u64),
                _ => None,
            })
            .max()
            .unwrap_or(0);
        let var_size_len = uint_width(max_var);
        if var_size_len > MAX_VAR_SIZE_LEN {
            return Err(PackError::Unencodable(format!("{max_var}-byte cell value")));
        }

        let mut flag = 0u64;
        if iso_count.is_some() {
            flag |= FLAG_ISO_COUNT;
        }
        flag |= match (scheme.indices().is_empty(), scheme.is_positive()) {
            (true, true) => SALT_NONE,
            (true, false) => SALT_FULL,
            (false, true) => SALT_LISTED,
            (false, false) => SALT_EXCEPT,
        };

        let mut out = Vec::new();
        out.extend_from_slice(&flag.to_be_bytes());
        if !scheme.indices().is_empty() {
            out.extend_from_slice(&(scheme.indices().len() as u16).to_be_bytes());
            for &index in scheme.indices() {
                out.extend_from_slice(&index.to_be_bytes());
            }
        }
        match iso_count {
            Some(count) => out.extend_from_slice(&(count as u16).to_be_bytes()),
            None => out.push(cell_count_size as u8),
        }
        out.push(var_size_len as u8);

        out.extend_from_slice(&(rows.len() as u32).to_be_bytes());
        for row in rows {
            self.encode_row(row, &mut out, iso_count.is_none(), cell_count_size, var_size_len)?;
        }
        Ok(out)
    }

    fn encode_row(
        &self,
        row: &SourceRow,
        out: &mut Vec<u8>,
        explicit_count: bool,
        cell_count_size: usize,
        var_size_len: usize,
    ) -> Result<(), PackError> {
        let scheme = self.scheme();
        let count = row.cells().len();
        let redacted = row.has_redaction();

        out.extend_from_slice(&row.no().to_be_bytes());
        if explicit_count {
            put_uint(out, count as u64, cell_count_size);
        }
        out.push(if redacted { STATUS_REDACTED } else { 0 });

        if !redacted && scheme.any_salted(count) {
            let Some(row_salt) = row.row_salt() else {
                return Err(PackError::Unencodable(format!(
                    "row {} has salted columns but no row salt",
                    row.no()
                )));
            };
            out.extend_from_slice(row_salt.as_slice());
        }

        for (col, cell) in row.cells().iter().enumerate() {
            match cell {
                Cell::Redacted(hash) => {
                    out.push(0);
                    out.extend_from_slice(hash.as_slice());
                }
                Cell::Reveal { dtype, data, salt } => {
                    out.push(dtype.code());
                    if dtype.is_var_size() {
                        put_uint(out, data.len() as u64, var_size_len);
                    }
                    if redacted && scheme.is_salted(col) {
                        let Some(salt) = salt else {
                            return Err(PackError::Unencodable(format!(
                                "row {} cell {col} misses its salt",
                                row.no()
                            )));
                        };
                        out.extend_from_slice(salt.resolve().as_slice());
                    }
                    out.extend_from_slice(data);
                }
            }
        }
        Ok(())
    }

    pub fn decode(data: Bytes) -> Result<Self, PackError> {
        let mut reader = Reader::new(data);
        let bag = Self::read_from(&mut reader)?;
        reader.expect_end().map_err(PackError::Wire)?;
        Ok(bag)
    }

    pub fn read_from(reader: &mut Reader) -> Result<Self, PackError> {
        let flag = reader.read_u64()?;
        if flag & !(FLAG_ISO_COUNT | SALT_MASK) != 0 {
            return Err(bad(reader, format!("unknown schema flag bits {flag:#x}")));
        }

        let scheme = match flag & SALT_MASK {
            SALT_NONE => SaltScheme::NO_SALT,
            SALT_FULL => SaltScheme::SALT_ALL,
            listed_or_except => {
                let count = reader.read_u16()?;
                if count == 0 {
                    return Err(bad(reader, "empty salt index list"));
                }
                let mut indices = Vec::with_capacity(count as usize);
                for _ in 0..count {
                    indices.push(reader.read_u16()?);
                }
                if !indices.windows(2).all(|w| w[0] < w[1]) {
                    return Err(bad(reader, "salt indices must strictly ascend"));
                }
                if listed_or_except == SALT_LISTED {
                    SaltScheme::positive(indices)
                } else {
                    SaltScheme::negative(indices)
                }
            }
        };

        let iso_count = if flag & FLAG_ISO_COUNT != 0 {
            Some(u64::from(reader.read_u16()?))
        } else {
            None
        };
        let cell_count_size = match iso_count {
            Some(_) => 0,
            None => {
                let size = usize::from(reader.read_u8()?);
                if !(1..=MAX_CELL_COUNT_SIZE).contains(&size) {
                    return Err(bad(reader, format!("cell count size {size}")));
                }
                size
            }
        };
        let var_size_len = usize::from(reader.read_u8()?);
        if !(1..=MAX_VAR_SIZE_LEN).contains(&var_size_len) {
            return Err(bad(reader, format!("var size length {var_size_len}")));
        }

        let row_count = reader.read_u32()?;
        let mut bag = SourceBag::new(scheme.clone());
        let mut prev_rn = 0u64;
        for _ in 0..row_count {
            let row = read_row(reader, &scheme, iso_count, cell_count_size, var_size_len)?;
            if row.no() <= prev_rn {
                return Err(bad(reader, "row numbers must strictly ascend"));
            }
            prev_rn = row.no();
            if !bag.add_row(row)? {
                return Err(bad(reader, "duplicate row number"));
            }
        }
        tracing::debug!(rows = bag.len(), "decoded source pack");
        Ok(bag)
    }
}

fn read_row(
    reader: &mut Reader,
    scheme: &SaltScheme,
    iso_count: Option<u64>,
    cell_count_size: usize,
    var_size_len: usize,
) -> Result<SourceRow, PackError> {
    let rn = reader.read_u64()?;
    let count = match iso_count {
        Some(count) => count,
        None => reader.read_uint(cell_count_size)?,
    };
    if count == 0 {
        return Err(bad(reader, format!("row {rn} has no cells")));
    }

    let status = reader.read_u8()?;
    if status & !STATUS_REDACTED != 0 {
        return Err(bad(reader, format!("unknown row status bits {status:#x}")));
    }
    let redacted = status & STATUS_REDACTED != 0;

    let row_salt = if !redacted && scheme.any_salted(count as usize) {
        Some(reader.read_hash()?)
    } else {
        None
    };

    let mut cells = Vec::with_capacity(count as usize);
    let mut saw_redacted = false;
    for col in 0..count as usize {
        let code = reader.read_u8()?;
        if code == 0 {
            saw_redacted = true;
            cells.push(Cell::Redacted(reader.read_hash()?));
            continue;
        }
        let Some(dtype) = DataType::from_code(code) else {
            return Err(bad(reader, format!("unknown cell code {code}")));
        };
        let size = match dtype.fixed_size() {
            Some(size) => size,
            None => reader.read_uint(var_size_len)? as usize,
        };
        let salt = if scheme.is_salted(col) {
            if redacted {
                Some(Salt::Explicit(reader.read_hash()?))
            } else {
                // row_salt was read above whenever the scheme salts a column.
                row_salt.map(|row_salt| Salt::Row {
                    row_salt,
                    col: col as u64,
                })
            }
        } else {
            None
        };
        let data = reader.take(size)?;
        check_payload(reader, dtype, &data)?;
        cells.push(Cell::Reveal { dtype, data, salt });
    }

    if redacted != saw_redacted {
        return Err(bad(
            reader,
            format!("row {rn} status disagrees with its cells"),
        ));
    }
    Ok(SourceRow::new(rn, cells)?)
}

fn check_payload(reader: &Reader, dtype: DataType, data: &Bytes) -> Result<(), PackError> {
    match dtype {
        DataType::Null if data.as_ref() != [0] => Err(bad(reader, "null cell payload")),
        DataType::Bool if data.as_ref() != [0] && data.as_ref() != [1] => {
            Err(bad(reader, "bool cell payload"))
        }
        DataType::String if std::str::from_utf8(data).is_err() => {
            Err(bad(reader, "string cell is not utf-8"))
        }
        _ => Ok(()),
    }
}
