//! Typed cells and their hashing.

use bytes::Bytes;
use skipledger::HashBytes;

use crate::salt::cell_salt;

/// Wire codes are 1-based; 0 marks a redacted cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum DataType {
    String = 1,
    Long = 2,
    Date = 3,
    Bool = 4,
    Bytes = 5,
    Hash = 6,
    Null = 7,
}

impl DataType {
    pub const fn code(self) -> u8 {
        self as u8
    }

    pub fn from_code(code: u8) -> Option<Self> {
        Some(match code {
            1 => Self::String,
            2 => Self::Long,
            3 => Self::Date,
            4 => Self::Bool,
            5 => Self::Bytes,
            6 => Self::Hash,
            7 => Self::Null,
            _ => return None,
        })
    }

    /// Serialized payload width; `None` for variable-size types.
    pub const fn fixed_size(self) -> Option<usize> {
        match self {
            Self::String | Self::Bytes => None,
            Self::Long | Self::Date => Some(8),
            Self::Bool | Self::Null => Some(1),
            Self::Hash => Some(32),
        }
    }

    pub const fn is_var_size(self) -> bool {
        self.fixed_size().is_none()
    }
}

/// A user-facing cell value. No floating point: callers pre-scale
/// fractional values to integers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CellValue {
    String(String),
    /// 8-byte big-endian signed integer.
    Long(i64),
    /// UTC milliseconds, stored like [`CellValue::Long`].
    Date(i64),
    Bool(bool),
    Bytes(Vec<u8>),
    /// 32 raw bytes. Hashed like bytes, not passed through.
    Hash(HashBytes),
    Null,
}

impl CellValue {
    pub fn data_type(&self) -> DataType {
        match self {
            Self::String(_) => DataType::String,
            Self::Long(_) => DataType::Long,
            Self::Date(_) => DataType::Date,
            Self::Bool(_) => DataType::Bool,
            Self::Bytes(_) => DataType::Bytes,
            Self::Hash(_) => DataType::Hash,
            Self::Null => DataType::Null,
        }
    }

    /// Canonical byte payload, the unit of hashing and serialization.
    pub fn encode(&self) -> Bytes {
        match self {
            Self::String(s) => Bytes::copy_from_slice(s.as_bytes()),
            Self::Long(v) | Self::Date(v) => Bytes::copy_from_slice(&v.to_be_bytes()),
            Self::Bool(v) => Bytes::copy_from_slice(&[u8::from(*v)]),
            Self::Bytes(v) => Bytes::copy_from_slice(v),
            Self::Hash(v) => Bytes::copy_from_slice(v.as_slice()),
            Self::Null => Bytes::from_static(&[0]),
        }
    }
}

/// Where a revealed cell's salt comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Salt {
    /// Explicit 32-byte cell salt, carried when the row salt is withheld.
    Explicit(HashBytes),
    /// Derived: `SHA-256(rowSalt ‖ bigEndian(col))`.
    Row { row_salt: HashBytes, col: u64 },
}

impl Salt {
    pub fn resolve(&self) -> HashBytes {
        match *self {
            Self::Explicit(salt) => salt,
            Self::Row { row_salt, col } => cell_salt(&row_salt, col),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cell {
    /// Only the hash survives redaction; the type is erased too.
    Redacted(HashBytes),
    Reveal {
        dtype: DataType,
        /// Canonical payload; the single byte `0x00` for nulls.
        data: Bytes,
        salt: Option<Salt>,
    },
}

impl Cell {
    pub fn unsalted(value: &CellValue) -> Self {
        Self::Reveal {
            dtype: value.data_type(),
            data: value.encode(),
            salt: None,
        }
    }

    pub fn row_salted(row_salt: HashBytes, col: u64, value: &CellValue) -> Self {
        Self::Reveal {
            dtype: value.data_type(),
            data: value.encode(),
            salt: Some(Salt::Row { row_salt, col }),
        }
    }

    pub fn salted(salt: HashBytes, value: &CellValue) -> Self {
        Self::Reveal {
            dtype: value.data_type(),
            data: value.encode(),
            salt: Some(Salt::Explicit(salt)),
        }
    }

    pub fn is_redacted(&self) -> bool {
        matches!(self, Self::Redacted(_))
    }

    pub fn has_salt(&self) -> bool {
        matches!(self, Self::Reveal { salt: Some(_), .. })
    }

    pub fn is_null(&self) -> bool {
        matches!(
            self,
            Self::Reveal {
                dtype: DataType::Null,
                ..
            }
        )
    }

    pub fn data_type(&self) -> Option<DataType> {
        match self {
            Self::Redacted(_) => None,
            Self::Reveal { dtype, .. } => Some(*dtype),
        }
    }

    pub fn data(&self) -> Option<&Bytes> {
        match self {
            Self::Redacted(_) => None,
            Self::Reveal { data, .. } => Some(data),
        }
    }

    /// Typed read-back of the payload; `None` for redacted cells or a
    /// payload that does not parse as its declared type.
    pub fn value(&self) -> Option<CellValue> {
        let Self::Reveal { dtype, data, .. } = self else {
            return None;
        };
        Some(match dtype {
            DataType::String => CellValue::String(std::str::from_utf8(data).ok()?.to_owned()),
            DataType::Long => CellValue::Long(i64::from_be_bytes(data.as_ref().try_into().ok()?)),
            DataType::Date => CellValue::Date(i64::from_be_bytes(data.as_ref().try_into().ok()?)),
            DataType::Bool => match data.as_ref() {
                [0] => CellValue::Bool(false),
                [1] => CellValue::Bool(true),
                _ => return None,
            },
            DataType::Bytes => CellValue::Bytes(data.to_vec()),
            DataType::Hash => {
                CellValue::Hash(HashBytes(data.as_ref().try_into().ok()?))
            }
            DataType::Null => CellValue::Null,
        })
    }

    /// `SHA-256(data)` unsalted, `SHA-256(salt ‖ data)` salted, or the
    /// stored hash when redacted.
    pub fn hash(&self) -> HashBytes {
        match self {
            Self::Redacted(hash) => *hash,
            Self::Reveal { data, salt, .. } => match salt {
                None => HashBytes::digest(&[data]),
                Some(salt) => HashBytes::digest(&[salt.resolve().as_slice(), data]),
            },
        }
    }

    /// The cell with everything but its hash erased.
    pub fn redacted(&self) -> Cell {
        Cell::Redacted(self.hash())
    }
}
