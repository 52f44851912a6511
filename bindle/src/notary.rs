//! Crumtrails: Merkle inclusion proofs binding a row hash to a witnessed
//! UTC time.

use skipledger::wire::{Reader, WireError};
use skipledger::HashBytes;

#[derive(Debug, thiserror::Error)]
pub enum NotaryError {
    #[error("cargo proof leaf {leaf_index} out of range for {leaf_count} leaves")]
    LeafOutOfRange { leaf_index: u64, leaf_count: u64 },
    #[error("cargo proof has {got} siblings, tree of {leaf_count} needs {need}")]
    WrongProofLength {
        leaf_count: u64,
        need: usize,
        got: usize,
    },
    #[error("hash conflict at row {rn}")]
    HashConflict { rn: u64 },
    #[error("crum utc {utc} predates the timechain inception {inception}")]
    BeforeInception { utc: u64, inception: u64 },
    #[error("block {block_no} is not a full row of the block proof")]
    BlockNotFound { block_no: u64 },
}

/// The witnessed pair: a row hash and the UTC milliseconds it was seen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Crum {
    pub hash: HashBytes,
    pub utc: u64,
}

impl Crum {
    pub const SERIAL_SIZE: usize = 40;

    /// Hash bytes followed by the big-endian UTC.
    pub fn serial_form(&self) -> [u8; Self::SERIAL_SIZE] {
        let mut out = [0; Self::SERIAL_SIZE];
        out[..32].copy_from_slice(self.hash.as_slice());
        out[32..].copy_from_slice(&self.utc.to_be_bytes());
        out
    }

    /// The Merkle leaf committed for this crum.
    pub fn leaf_hash(&self) -> HashBytes {
        HashBytes::digest(&[&self.serial_form()])
    }
}

/// Merkle inclusion proof of a crum's leaf in a timechain block tree.
///
/// The leaf layer is padded with zero hashes to the next power of two;
/// parents are `SHA-256(left ‖ right)`; `siblings` runs bottom-up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CargoProof {
    crum: Crum,
    leaf_index: u64,
    leaf_count: u64,
    siblings: Vec<HashBytes>,
}

impl CargoProof {
    pub fn new(
        crum: Crum,
        leaf_index: u64,
        leaf_count: u64,
        siblings: Vec<HashBytes>,
    ) -> Result<Self, NotaryError> {
        if leaf_count == 0 || leaf_index >= leaf_count {
            return Err(NotaryError::LeafOutOfRange {
                leaf_index,
                leaf_count,
            });
        }
        let need = tree_height(leaf_count);
        if siblings.len() != need {
            return Err(NotaryError::WrongProofLength {
                leaf_count,
                need,
                got: siblings.len(),
            });
        }
        Ok(Self {
            crum,
            leaf_index,
            leaf_count,
            siblings,
        })
    }

    pub fn crum(&self) -> &Crum {
        &self.crum
    }

    pub fn leaf_index(&self) -> u64 {
        self.leaf_index
    }

    pub fn leaf_count(&self) -> u64 {
        self.leaf_count
    }

    /// Merkle root recomputed from the crum's leaf and the sibling chain.
    pub fn root(&self) -> HashBytes {
        let mut node = self.crum.leaf_hash();
        let mut index = self.leaf_index;
        for sibling in &self.siblings {
            node = if index & 1 == 0 {
                hash_pair(&node, sibling)
            } else {
                hash_pair(sibling, &node)
            };
            index >>= 1;
        }
        node
    }

    pub(crate) fn write_to(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.crum.serial_form());
        out.extend_from_slice(&self.leaf_index.to_be_bytes());
        out.extend_from_slice(&self.leaf_count.to_be_bytes());
        out.extend_from_slice(&(self.siblings.len() as u16).to_be_bytes());
        for sibling in &self.siblings {
            out.extend_from_slice(sibling.as_slice());
        }
    }

    pub(crate) fn read_from(reader: &mut Reader) -> Result<Self, WireError> {
        let hash = reader.read_hash()?;
        let utc = reader.read_u64()?;
        let leaf_index = reader.read_u64()?;
        let leaf_count = reader.read_u64()?;
        let sibling_count = reader.read_u16()?;
        let mut siblings = Vec::with_capacity(usize::from(sibling_count));
        for _ in 0..sibling_count {
            siblings.push(reader.read_hash()?);
        }
        Self::new(Crum { hash, utc }, leaf_index, leaf_count, siblings)
            .map_err(|e| reader.bad(e.to_string()))
    }
}

/// A row bound to its crumtrail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotarizedRow {
    pub row_no: u64,
    pub proof: CargoProof,
}

impl NotarizedRow {
    pub fn new(row_no: u64, proof: CargoProof) -> Self {
        Self { row_no, proof }
    }

    pub(crate) fn write_to(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.row_no.to_be_bytes());
        self.proof.write_to(out);
    }

    pub(crate) fn read_from(reader: &mut Reader) -> Result<Self, WireError> {
        let row_no = reader.read_u64()?;
        let proof = CargoProof::read_from(reader)?;
        Ok(Self { row_no, proof })
    }
}

/// Notarized rows under one declared timechain, ascending by row number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotaryPack {
    pub chain_id: u32,
    pub rows: Vec<NotarizedRow>,
}

impl NotaryPack {
    pub fn new(chain_id: u32) -> Self {
        Self {
            chain_id,
            rows: Vec::new(),
        }
    }

    /// `false` on a duplicate row number.
    pub fn add(&mut self, row: NotarizedRow) -> bool {
        match self
            .rows
            .binary_search_by_key(&row.row_no, |r| r.row_no)
        {
            Ok(_) => false,
            Err(at) => {
                self.rows.insert(at, row);
                true
            }
        }
    }

    pub(crate) fn write_to(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.chain_id.to_be_bytes());
        out.extend_from_slice(&(self.rows.len() as u16).to_be_bytes());
        for row in &self.rows {
            row.write_to(out);
        }
    }

    pub(crate) fn read_from(reader: &mut Reader) -> Result<Self, WireError> {
        let chain_id = reader.read_u32()?;
        let count = reader.read_u16()?;
        let mut pack = Self::new(chain_id);
        for _ in 0..count {
            let row = NotarizedRow::read_from(reader)?;
            if !pack.add(row) {
                return Err(reader.bad("duplicate notarized row"));
            }
        }
        Ok(pack)
    }
}

fn hash_pair(left: &HashBytes, right: &HashBytes) -> HashBytes {
    HashBytes::digest(&[left.as_slice(), right.as_slice()])
}

/// Levels above the (padded) leaf layer.
fn tree_height(leaf_count: u64) -> usize {
    leaf_count.next_power_of_two().trailing_zeros() as usize
}

/// Full Merkle tree over crum leaves. Test-side only: production code
/// verifies proofs, the timechain service builds them.
#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    pub struct MerkleTree {
        levels: Vec<Vec<HashBytes>>,
        leaf_count: u64,
    }

    impl MerkleTree {
        pub fn new(mut leaves: Vec<HashBytes>) -> Self {
            assert!(!leaves.is_empty());
            let leaf_count = leaves.len() as u64;
            leaves.resize(leaves.len().next_power_of_two(), HashBytes::SENTINEL);

            let mut levels = vec![leaves];
            while levels[levels.len() - 1].len() > 1 {
                let last = &levels[levels.len() - 1];
                let next = last
                    .chunks(2)
                    .map(|pair| hash_pair(&pair[0], &pair[1]))
                    .collect();
                levels.push(next);
            }
            Self { levels, leaf_count }
        }

        pub fn root(&self) -> HashBytes {
            self.levels[self.levels.len() - 1][0]
        }

        pub fn prove(&self, crum: Crum, leaf_index: u64) -> CargoProof {
            let mut siblings = Vec::new();
            let mut index = leaf_index as usize;
            for level in &self.levels[..self.levels.len() - 1] {
                siblings.push(level[index ^ 1]);
                index >>= 1;
            }
            CargoProof::new(crum, leaf_index, self.leaf_count, siblings).unwrap()
        }
    }
}
