//! Block proofs: a skip-ledger over timechain block roots, binned by time.

use skipledger::{Path, RowBag};

use crate::notary::{NotarizedRow, NotaryError};

/// Time-binning parameters of a timechain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChainParams {
    /// UTC milliseconds of the chain's first bin boundary.
    pub inception_utc: u64,
    /// Bin width in milliseconds.
    pub bin_duration: u64,
}

impl ChainParams {
    pub fn new(inception_utc: u64, bin_duration: u64) -> Self {
        assert!(bin_duration > 0, "zero bin duration");
        Self {
            inception_utc,
            bin_duration,
        }
    }

    /// Block (row) number covering `utc`.
    pub fn block_no_for_utc(&self, utc: u64) -> Result<u64, NotaryError> {
        if utc < self.inception_utc {
            return Err(NotaryError::BeforeInception {
                utc,
                inception: self.inception_utc,
            });
        }
        Ok((utc - self.inception_utc) / self.bin_duration + 1)
    }
}

/// A skip-ledger path over block root hashes plus the chain parameters
/// that map a UTC instant to its block number.
///
/// A block row's *input* hash is the Merkle root of that block's crum
/// tree, so a cargo proof whose recomputed root equals the input hash at
/// the crum's bin is anchored in the chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockProof {
    params: ChainParams,
    path: Path,
}

impl BlockProof {
    pub fn new(params: ChainParams, path: Path) -> Self {
        Self { params, path }
    }

    pub fn params(&self) -> &ChainParams {
        &self.params
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Verifies a notarized row against `expected_row_hash`, the hash the
    /// host ledger derives for that row:
    ///
    /// 1. the crum wraps exactly that row hash;
    /// 2. the crum's UTC falls in a block this proof holds in full;
    /// 3. the cargo proof's recomputed Merkle root equals that block's
    ///    input hash.
    pub fn verify_row(
        &self,
        row: &NotarizedRow,
        expected_row_hash: skipledger::HashBytes,
    ) -> Result<(), NotaryError> {
        let crum = row.proof.crum();
        if crum.hash != expected_row_hash {
            return Err(NotaryError::HashConflict { rn: row.row_no });
        }
        let block_no = self.params.block_no_for_utc(crum.utc)?;
        let Some(root) = self.path.input_hash(block_no) else {
            return Err(NotaryError::BlockNotFound { block_no });
        };
        if root != row.proof.root() {
            return Err(NotaryError::HashConflict { rn: row.row_no });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use skipledger::{HashBytes, SkipLedger};

    use super::*;
    use crate::notary::testing::MerkleTree;
    use crate::notary::Crum;

    const INCEPTION: u64 = 1_600_000_000_000;
    const BIN: u64 = 60_000;

    #[test]
    fn block_numbering() {
        let params = ChainParams::new(INCEPTION, BIN);
        assert_eq!(params.block_no_for_utc(INCEPTION).unwrap(), 1);
        assert_eq!(params.block_no_for_utc(INCEPTION + BIN - 1).unwrap(), 1);
        assert_eq!(params.block_no_for_utc(INCEPTION + BIN).unwrap(), 2);
        assert_eq!(
            params.block_no_for_utc(INCEPTION + 999 * BIN + 17).unwrap(),
            1000
        );
        assert!(matches!(
            params.block_no_for_utc(INCEPTION - 1),
            Err(NotaryError::BeforeInception { .. })
        ));
    }

    #[test]
    fn verify_round_trip() -> anyhow::Result<()> {
        let row_hash = HashBytes([0x42; 32]);
        let utc = INCEPTION + 499 * BIN + 30_000; // block 500
        let crum = Crum {
            hash: row_hash,
            utc,
        };
        let tree = MerkleTree::new(vec![crum.leaf_hash(), HashBytes([9; 32])]);
        let cargo = tree.prove(crum, 0);

        // A 1000-block chain whose block 500 commits the tree root.
        let chain = SkipLedger::in_memory();
        let mut roots = vec![HashBytes([0xcc; 32]); 1000];
        roots[499] = tree.root();
        chain.append_rows(&roots)?;
        let proof = BlockProof::new(
            ChainParams::new(INCEPTION, BIN),
            chain.get_path(&[1, 500, 1000])?,
        );

        let notarized = NotarizedRow::new(4, cargo);
        proof.verify_row(&notarized, row_hash)?;

        // Wrong expected row hash.
        assert!(matches!(
            proof.verify_row(&notarized, HashBytes([0x43; 32])),
            Err(NotaryError::HashConflict { rn: 4 })
        ));
        Ok(())
    }

    #[test]
    fn missing_block_is_reported() -> anyhow::Result<()> {
        let row_hash = HashBytes([0x42; 32]);
        let crum = Crum {
            hash: row_hash,
            utc: INCEPTION + 2 * BIN, // block 3
        };
        let tree = MerkleTree::new(vec![crum.leaf_hash()]);
        let cargo = tree.prove(crum, 0);

        let chain = SkipLedger::in_memory();
        chain.append_rows(&vec![HashBytes([0xcc; 32]); 16])?;
        // The state path holds blocks 1, 2, 4, 8, 16 in full; block 3 is
        // only referenced.
        let proof = BlockProof::new(
            ChainParams::new(INCEPTION, BIN),
            chain.get_path(&[1, 16])?,
        );
        assert!(matches!(
            proof.verify_row(&NotarizedRow::new(2, cargo), row_hash),
            Err(NotaryError::BlockNotFound { block_no: 3 })
        ));
        Ok(())
    }
}
