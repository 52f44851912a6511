//! Ledger identities inside a bindle.

use serde::{Deserialize, Serialize};
use skipledger::wire::{Reader, WireError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerType {
    /// An ordinary source-backed ledger.
    Log = 1,
    /// A ledger of timechain block roots.
    Timechain = 2,
}

impl LedgerType {
    pub const fn code(self) -> u8 {
        self as u8
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(Self::Log),
            2 => Some(Self::Timechain),
            _ => None,
        }
    }
}

/// Identity of one ledger declared in a bindle. Unique by `id` and by
/// `(ledger_type, alias)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerId {
    pub id: u32,
    pub ledger_type: LedgerType,
    pub alias: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl LedgerId {
    pub(crate) fn write_to(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.id.to_be_bytes());
        out.push(self.ledger_type.code());
        write_str(out, &self.alias);
        write_str(out, self.uri.as_deref().unwrap_or(""));
        write_str(out, self.description.as_deref().unwrap_or(""));
    }

    pub(crate) fn read_from(reader: &mut Reader) -> Result<Self, WireError> {
        let id = reader.read_u32()?;
        let code = reader.read_u8()?;
        let Some(ledger_type) = LedgerType::from_code(code) else {
            return Err(reader.bad(format!("unknown ledger type {code}")));
        };
        let alias = read_str(reader)?;
        if alias.is_empty() {
            return Err(reader.bad("empty ledger alias"));
        }
        let uri = read_str(reader)?;
        let description = read_str(reader)?;
        Ok(Self {
            id,
            ledger_type,
            alias,
            uri: (!uri.is_empty()).then_some(uri),
            description: (!description.is_empty()).then_some(description),
        })
    }
}

fn write_str(out: &mut Vec<u8>, s: &str) {
    out.extend_from_slice(&(s.len() as u16).to_be_bytes());
    out.extend_from_slice(s.as_bytes());
}

fn read_str(reader: &mut Reader) -> Result<String, WireError> {
    let len = reader.read_u16()?;
    let bytes = reader.take(usize::from(len))?;
    match std::str::from_utf8(&bytes) {
        Ok(s) => Ok(s.to_owned()),
        Err(_) => Err(reader.bad("string field is not utf-8")),
    }
}
