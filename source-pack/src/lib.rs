pub use self::bag::SourceBag;
pub use self::builder::SourceRowBuilder;
pub use self::cell::{Cell, CellValue, DataType, Salt};
pub use self::codec::PackError;
pub use self::row::{SourceError, SourceRow};
pub use self::salt::{cell_salt, TableSalt};
pub use self::scheme::SaltScheme;

pub mod bag;
pub mod builder;
pub mod cell;
pub mod codec;
pub mod row;
pub mod salt;
pub mod scheme;
