//! The ledger's secret salt seed and the two derivations built on it.

use std::fmt;

use skipledger::HashBytes;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Cell salt for `col`, derived from a row salt:
/// `SHA-256(rowSalt ‖ bigEndian(col))`.
pub fn cell_salt(row_salt: &HashBytes, col: u64) -> HashBytes {
    HashBytes::digest(&[row_salt.as_slice(), &col.to_be_bytes()])
}

/// Holder of the 32-byte secret seed all row salts derive from.
///
/// The seed never leaves this type: it is not serialized, not printed,
/// and its bytes are overwritten with zeros on drop. One live handle per
/// owning row builder.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct TableSalt {
    seed: [u8; 32],
}

impl TableSalt {
    pub fn new(seed: [u8; 32]) -> Self {
        Self { seed }
    }

    pub fn generate<R: rand::Rng>(rng: &mut R) -> Self {
        let mut seed = [0; 32];
        rng.fill(&mut seed);
        Self { seed }
    }

    /// `SHA-256(seed ‖ bigEndian(rowNo))`.
    pub fn row_salt(&self, rn: u64) -> HashBytes {
        HashBytes::digest(&[&self.seed, &rn.to_be_bytes()])
    }

    /// Cell salt for `(rowNo, colNo)`.
    pub fn salt(&self, rn: u64, col: u64) -> HashBytes {
        cell_salt(&self.row_salt(rn), col)
    }
}

impl fmt::Debug for TableSalt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("TableSalt(..)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derivations_are_deterministic() {
        let salt = TableSalt::new([7; 32]);
        assert_eq!(salt.row_salt(1), salt.row_salt(1));
        assert_ne!(salt.row_salt(1), salt.row_salt(2));
        assert_eq!(salt.salt(5, 2), cell_salt(&salt.row_salt(5), 2));
        assert_ne!(salt.salt(5, 2), salt.salt(5, 3));
    }

    #[test]
    fn row_salt_matches_manual_digest() {
        let salt = TableSalt::new([7; 32]);
        let expected = HashBytes::digest(&[&[7; 32], &4u64.to_be_bytes()]);
        assert_eq!(salt.row_salt(4), expected);
    }

    #[test]
    fn debug_never_reveals_seed() {
        let salt = TableSalt::new([0xab; 32]);
        assert_eq!(format!("{salt:?}"), "TableSalt(..)");
    }
}
