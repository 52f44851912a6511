pub use self::frontier::HashFrontier;
pub use self::hash::HashBytes;
pub use self::ledger::{LedgerError, SkipLedger};
pub use self::path::bag::RowBag;
pub use self::path::multi::{MultiPath, MultiPathBuilder};
pub use self::path::{Intersection, IntersectKind, Path, PathError};
pub use self::row::Row;
pub use self::table::{MemTable, SkipTable, TableError, TableTransaction};

pub mod frontier;
pub mod geometry;
pub mod hash;
pub mod ledger;
pub mod path;
pub mod row;
pub mod table;
pub mod wire;
