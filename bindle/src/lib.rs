pub use self::bindle::{Bindle, BindleError};
pub use self::id::{LedgerId, LedgerType};
pub use self::notary::{CargoProof, Crum, NotarizedRow, NotaryError, NotaryPack};
pub use self::nugget::{ForeignRefs, Nugget, NuggetError, Reference};
pub use self::timechain::{BlockProof, ChainParams};

mod bindle;
pub mod id;
pub mod notary;
pub mod nugget;
pub mod timechain;
