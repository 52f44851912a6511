//! Per-ledger proof packages.

use bytes::Bytes;
use skipledger::wire::{Reader, WireError};
use skipledger::{HashBytes, MultiPath, MultiPathBuilder, Path, PathError};
use source_pack::codec::PackError;
use source_pack::{SaltScheme, SourceBag, SourceError, SourceRow};

use crate::id::{LedgerId, LedgerType};
use crate::notary::{NotarizedRow, NotaryPack};
use crate::timechain::{BlockProof, ChainParams};

#[derive(Debug, thiserror::Error)]
pub enum NuggetError {
    #[error("hash conflict at row {rn}")]
    HashConflict { rn: u64 },
    #[error("row {rn} is not a full row of the nugget's paths")]
    RowNotInPath { rn: u64 },
    #[error("salt scheme already set")]
    SchemeAlreadySet,
    #[error("no salt scheme declared")]
    SchemeNotSet,
    #[error("ledger {0} declares no chain parameters")]
    MissingChainParams(u32),
    #[error(transparent)]
    Path(#[from] PathError),
    #[error(transparent)]
    Source(#[from] SourceError),
    #[error(transparent)]
    Pack(#[from] PackError),
    #[error(transparent)]
    Wire(#[from] WireError),
    #[error("i/o failure")]
    Io(#[from] std::io::Error),
}

/// Claim that local row `local_no` corresponds to row `foreign_no` of
/// another ledger, pinned by the foreign row's hash. At most one claim
/// per (local row, foreign ledger).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reference {
    pub local_no: u64,
    pub foreign_no: u64,
    /// Row hash the foreign ledger is claimed to hold at `foreign_no`.
    pub foreign_hash: HashBytes,
}

/// References into one foreign ledger, ascending by local row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignRefs {
    pub foreign_id: u32,
    pub refs: Vec<Reference>,
}

/// Everything a verifier needs about one ledger: linked paths, source
/// rows, notarizations, and claims into other ledgers.
///
/// Built incrementally; frozen by [`Nugget::encode`]. Every mutating
/// operation validates against the accumulated paths, so a nugget is
/// internally consistent at all times.
pub struct Nugget {
    id: LedgerId,
    paths: MultiPathBuilder,
    chain_params: Option<ChainParams>,
    source: Option<SourceBag>,
    notary: Vec<NotaryPack>,
    foreign: Vec<ForeignRefs>,
}

impl Nugget {
    /// Conventional file extension for a serialized nugget.
    pub const FILE_EXT: &'static str = "nug";

    /// Log-type nugget seeded with the ledger's state path.
    ///
    /// # Panics
    ///
    /// Panics if `id` is not log-typed.
    pub fn new(id: LedgerId, seed_path: Path) -> Self {
        assert_eq!(id.ledger_type, LedgerType::Log, "log nugget for {id:?}");
        Self {
            id,
            paths: MultiPathBuilder::new(seed_path),
            chain_params: None,
            source: None,
            notary: Vec::new(),
            foreign: Vec::new(),
        }
    }

    /// Timechain-typed nugget carrying its block proof.
    ///
    /// # Panics
    ///
    /// Panics if `id` is not timechain-typed.
    pub fn new_timechain(id: LedgerId, block_proof: BlockProof) -> Self {
        assert_eq!(
            id.ledger_type,
            LedgerType::Timechain,
            "timechain nugget for {id:?}"
        );
        Self {
            id,
            paths: MultiPathBuilder::new(block_proof.path().clone()),
            chain_params: Some(*block_proof.params()),
            source: None,
            notary: Vec::new(),
            foreign: Vec::new(),
        }
    }

    pub fn id(&self) -> &LedgerId {
        &self.id
    }

    pub fn chain_params(&self) -> Option<&ChainParams> {
        self.chain_params.as_ref()
    }

    pub fn source(&self) -> Option<&SourceBag> {
        self.source.as_ref()
    }

    pub fn notary_packs(&self) -> &[NotaryPack] {
        &self.notary
    }

    pub fn foreign_refs(&self) -> &[ForeignRefs] {
        &self.foreign
    }

    pub fn has_full_row(&self, rn: u64) -> bool {
        self.paths.has_full_row(rn)
    }

    pub fn row_hash(&self, rn: u64) -> Option<HashBytes> {
        self.paths.row_hash(rn)
    }

    pub fn input_hash(&self, rn: u64) -> Option<HashBytes> {
        self.paths.input_hash(rn)
    }

    pub fn max_row_no(&self) -> u64 {
        self.paths.max_row_no()
    }

    /// Frozen view of the accumulated paths. Declared partial if nothing
    /// reaches row 1.
    pub fn multi_path(&self) -> Result<MultiPath, PathError> {
        let mut builder = self.paths.clone();
        if !builder.is_anchored() {
            builder.partial();
        }
        builder.build()
    }

    /// Declares the salt scheme of the source rows to come. Once, before
    /// the first [`Self::add_source_row`].
    pub fn set_salt_scheme(&mut self, scheme: SaltScheme) -> Result<(), NuggetError> {
        if self.source.is_some() {
            return Err(NuggetError::SchemeAlreadySet);
        }
        self.source = Some(SourceBag::new(scheme));
        Ok(())
    }

    /// Merges another path; returns the highest row number at which it
    /// intersects the paths already held.
    pub fn add_path(&mut self, path: Path) -> Result<u64, NuggetError> {
        Ok(self.paths.add_path(path)?)
    }

    /// Adds a source row after checking it hashes to the input hash the
    /// paths hold for its row number. `false` on duplicate.
    pub fn add_source_row(&mut self, row: SourceRow) -> Result<bool, NuggetError> {
        let Some(bag) = self.source.as_mut() else {
            return Err(NuggetError::SchemeNotSet);
        };
        let Some(input_hash) = self.paths.input_hash(row.no()) else {
            return Err(NuggetError::RowNotInPath { rn: row.no() });
        };
        if input_hash != row.hash() {
            return Err(NuggetError::HashConflict { rn: row.no() });
        }
        Ok(bag.add_row(row)?)
    }

    /// Adds a notarization under the declared timechain `chain_id` after
    /// checking the crum wraps the row's hash. `false` on duplicate.
    pub fn add_notarized_row(
        &mut self,
        chain_id: u32,
        row: NotarizedRow,
    ) -> Result<bool, NuggetError> {
        if !self.paths.has_full_row(row.row_no) {
            return Err(NuggetError::RowNotInPath { rn: row.row_no });
        }
        let row_hash = self.paths.row_hash(row.row_no);
        if row_hash != Some(row.proof.crum().hash) {
            return Err(NuggetError::HashConflict { rn: row.row_no });
        }
        let pos = match self.notary.binary_search_by_key(&chain_id, |p| p.chain_id) {
            Ok(pos) => pos,
            Err(pos) => {
                self.notary.insert(pos, NotaryPack::new(chain_id));
                pos
            }
        };
        Ok(self.notary[pos].add(row))
    }

    /// Records a claim into `foreign_id`. Only the local side is
    /// validated here; the foreign side is the bindle's business.
    /// `false` if the local row already references that ledger.
    pub fn add_foreign_ref(
        &mut self,
        foreign_id: u32,
        reference: Reference,
    ) -> Result<bool, NuggetError> {
        if !self.paths.has_full_row(reference.local_no) {
            return Err(NuggetError::RowNotInPath {
                rn: reference.local_no,
            });
        }
        let pos = match self.foreign.binary_search_by_key(&foreign_id, |f| f.foreign_id) {
            Ok(pos) => pos,
            Err(pos) => {
                self.foreign.insert(
                    pos,
                    ForeignRefs {
                        foreign_id,
                        refs: Vec::new(),
                    },
                );
                pos
            }
        };
        let refs = &mut self.foreign[pos].refs;
        match refs.binary_search_by_key(&reference.local_no, |r| r.local_no) {
            Ok(_) => Ok(false),
            Err(at) => {
                refs.insert(at, reference);
                Ok(true)
            }
        }
    }

    /// Serial form:
    /// `(ledgerId, [chainParams], multiPath, [sourcePack], notaryPacks,
    /// refPacks)`, each section self-delimited.
    pub fn encode(&self) -> Result<Vec<u8>, NuggetError> {
        let mut out = Vec::new();
        self.id.write_to(&mut out);
        if let Some(params) = &self.chain_params {
            out.extend_from_slice(&params.inception_utc.to_be_bytes());
            out.extend_from_slice(&params.bin_duration.to_be_bytes());
        }
        self.multi_path()?.write_to(&mut out);
        match &self.source {
            None => out.push(0),
            Some(bag) => {
                out.push(1);
                let pack = bag.encode()?;
                out.extend_from_slice(&(pack.len() as u32).to_be_bytes());
                out.extend_from_slice(&pack);
            }
        }
        out.extend_from_slice(&(self.notary.len() as u16).to_be_bytes());
        for pack in &self.notary {
            pack.write_to(&mut out);
        }
        out.extend_from_slice(&(self.foreign.len() as u16).to_be_bytes());
        for refs in &self.foreign {
            out.extend_from_slice(&refs.foreign_id.to_be_bytes());
            out.extend_from_slice(&(refs.refs.len() as u16).to_be_bytes());
            for r in &refs.refs {
                out.extend_from_slice(&r.local_no.to_be_bytes());
                out.extend_from_slice(&r.foreign_no.to_be_bytes());
                out.extend_from_slice(r.foreign_hash.as_slice());
            }
        }
        Ok(out)
    }

    pub fn decode(data: Bytes) -> Result<Self, NuggetError> {
        let mut reader = Reader::new(data);
        let nugget = Self::read_from(&mut reader)?;
        reader.expect_end().map_err(NuggetError::Wire)?;
        Ok(nugget)
    }

    pub fn save(&self, file: &std::path::Path) -> Result<(), NuggetError> {
        std::fs::write(file, self.encode()?)?;
        Ok(())
    }

    pub fn load(file: &std::path::Path) -> Result<Self, NuggetError> {
        Self::decode(Bytes::from(std::fs::read(file)?))
    }

    /// Rebuilds the nugget through its own mutating operations, so every
    /// content check a builder runs also runs on load.
    pub fn read_from(reader: &mut Reader) -> Result<Self, NuggetError> {
        let id = LedgerId::read_from(reader)?;
        let chain_params = match id.ledger_type {
            LedgerType::Log => None,
            LedgerType::Timechain => {
                let inception_utc = reader.read_u64()?;
                let bin_duration = reader.read_u64()?;
                if bin_duration == 0 {
                    return Err(NuggetError::Wire(reader.bad("zero bin duration")));
                }
                Some(ChainParams::new(inception_utc, bin_duration))
            }
        };
        let multi = MultiPath::read_from(reader)?;

        let mut nugget = Self {
            id,
            paths: MultiPathBuilder::from(multi),
            chain_params,
            source: None,
            notary: Vec::new(),
            foreign: Vec::new(),
        };

        match reader.read_u8()? {
            0 => {}
            1 => {
                let len = reader.read_u32()? as usize;
                let bag = SourceBag::decode(reader.take(len)?)?;
                nugget.set_salt_scheme(bag.scheme().clone())?;
                for row in bag.rows() {
                    nugget.add_source_row(row.clone())?;
                }
            }
            flag => {
                return Err(NuggetError::Wire(
                    reader.bad(format!("bad source pack flag {flag}")),
                ))
            }
        }

        let pack_count = reader.read_u16()?;
        for _ in 0..pack_count {
            let pack = NotaryPack::read_from(reader)?;
            let chain_id = pack.chain_id;
            for row in pack.rows {
                nugget.add_notarized_row(chain_id, row)?;
            }
        }

        let ref_count = reader.read_u16()?;
        for _ in 0..ref_count {
            let foreign_id = reader.read_u32()?;
            let count = reader.read_u16()?;
            for _ in 0..count {
                let local_no = reader.read_u64()?;
                let foreign_no = reader.read_u64()?;
                let foreign_hash = reader.read_hash()?;
                let reference = Reference {
                    local_no,
                    foreign_no,
                    foreign_hash,
                };
                if !nugget.add_foreign_ref(foreign_id, reference)? {
                    return Err(NuggetError::Wire(reader.bad("duplicate foreign reference")));
                }
            }
        }
        Ok(nugget)
    }
}

#[cfg(test)]
mod tests {
    use skipledger::{MemTable, SkipLedger};
    use source_pack::{CellValue, DataType, SourceRowBuilder, TableSalt};

    use super::*;
    use crate::notary::testing::MerkleTree;
    use crate::notary::Crum;

    const TYPES: &[DataType] = &[DataType::Long, DataType::String];

    fn log_id(id: u32, alias: &str) -> LedgerId {
        LedgerId {
            id,
            ledger_type: LedgerType::Log,
            alias: alias.into(),
            uri: None,
            description: None,
        }
    }

    fn builder() -> SourceRowBuilder {
        SourceRowBuilder::with_salt(SaltScheme::SALT_ALL, TableSalt::new([0x2f; 32]))
    }

    fn source_rows(n: u64) -> Vec<SourceRow> {
        let builder = builder();
        (1..=n)
            .map(|rn| {
                builder
                    .build(
                        rn,
                        TYPES,
                        &[
                            CellValue::Long(rn as i64),
                            CellValue::String(format!("event-{rn}")),
                        ],
                    )
                    .unwrap()
            })
            .collect()
    }

    fn ledger_of(rows: &[SourceRow]) -> SkipLedger<MemTable> {
        let ledger = SkipLedger::in_memory();
        let inputs: Vec<_> = rows.iter().map(SourceRow::hash).collect();
        ledger.append_rows(&inputs).unwrap();
        ledger
    }

    #[test]
    fn source_rows_validate_against_paths() -> anyhow::Result<()> {
        let rows = source_rows(8);
        let ledger = ledger_of(&rows);
        let mut nugget = Nugget::new(log_id(1, "events"), ledger.state_path()?);
        nugget.set_salt_scheme(SaltScheme::SALT_ALL)?;

        // Row 4 is on the state path [1, 2, 4, 8].
        assert!(nugget.add_source_row(rows[3].clone())?);
        assert!(!nugget.add_source_row(rows[3].clone())?);

        // Row 3 is merely referenced, not held in full.
        assert!(matches!(
            nugget.add_source_row(rows[2].clone()),
            Err(NuggetError::RowNotInPath { rn: 3 })
        ));

        // A forged row 2 hashes differently.
        let forged = builder().build(
            2,
            TYPES,
            &[CellValue::Long(666), CellValue::String("forged".into())],
        )?;
        assert!(matches!(
            nugget.add_source_row(forged),
            Err(NuggetError::HashConflict { rn: 2 })
        ));
        Ok(())
    }

    #[test]
    fn scheme_is_set_once_before_rows() -> anyhow::Result<()> {
        let rows = source_rows(4);
        let ledger = ledger_of(&rows);
        let mut nugget = Nugget::new(log_id(1, "events"), ledger.state_path()?);

        assert!(matches!(
            nugget.add_source_row(rows[0].clone()),
            Err(NuggetError::SchemeNotSet)
        ));
        nugget.set_salt_scheme(SaltScheme::SALT_ALL)?;
        assert!(matches!(
            nugget.set_salt_scheme(SaltScheme::NO_SALT),
            Err(NuggetError::SchemeAlreadySet)
        ));
        Ok(())
    }

    #[test]
    fn added_paths_must_touch_the_spine() -> anyhow::Result<()> {
        let rows = source_rows(64);
        let ledger = ledger_of(&rows);
        let mut nugget = Nugget::new(log_id(1, "events"), ledger.state_path()?);

        let met = nugget.add_path(ledger.get_path(&[30, 32])?)?;
        assert_eq!(met, 32);
        assert!(nugget.has_full_row(30));
        Ok(())
    }

    #[test]
    fn notarized_rows_bind_the_row_hash() -> anyhow::Result<()> {
        let rows = source_rows(4);
        let ledger = ledger_of(&rows);
        let mut nugget = Nugget::new(log_id(1, "events"), ledger.state_path()?);

        let crum = Crum {
            hash: ledger.row_hash(4)?,
            utc: 1_700_000_000_000,
        };
        let tree = MerkleTree::new(vec![crum.leaf_hash()]);
        let notarized = NotarizedRow::new(4, tree.prove(crum, 0));
        assert!(nugget.add_notarized_row(9, notarized.clone())?);
        assert!(!nugget.add_notarized_row(9, notarized.clone())?);

        let bad_crum = Crum {
            hash: HashBytes([1; 32]),
            utc: crum.utc,
        };
        let bad_tree = MerkleTree::new(vec![bad_crum.leaf_hash()]);
        assert!(matches!(
            nugget.add_notarized_row(9, NotarizedRow::new(2, bad_tree.prove(bad_crum, 0))),
            Err(NuggetError::HashConflict { rn: 2 })
        ));
        Ok(())
    }

    #[test]
    fn foreign_refs_validate_the_local_side() -> anyhow::Result<()> {
        let rows = source_rows(8);
        let ledger = ledger_of(&rows);
        let mut nugget = Nugget::new(log_id(1, "events"), ledger.state_path()?);

        let r = Reference {
            local_no: 4,
            foreign_no: 28,
            foreign_hash: HashBytes([8; 32]),
        };
        assert!(nugget.add_foreign_ref(2, r)?);
        // One claim per (local row, foreign ledger).
        assert!(!nugget.add_foreign_ref(
            2,
            Reference {
                local_no: 4,
                foreign_no: 33,
                foreign_hash: HashBytes([9; 32]),
            }
        )?);
        assert!(matches!(
            nugget.add_foreign_ref(
                2,
                Reference {
                    local_no: 5,
                    foreign_no: 1,
                    foreign_hash: HashBytes([1; 32]),
                }
            ),
            Err(NuggetError::RowNotInPath { rn: 5 })
        ));
        Ok(())
    }

    #[test]
    fn serialize_load_serialize_is_byte_identical() -> anyhow::Result<()> {
        let rows = source_rows(16);
        let ledger = ledger_of(&rows);
        let mut nugget = Nugget::new(log_id(4, "events"), ledger.state_path()?);
        nugget.add_path(ledger.get_path(&[5, 11])?)?;
        nugget.set_salt_scheme(SaltScheme::SALT_ALL)?;
        for rn in [1u64, 5, 8, 16] {
            nugget.add_source_row(rows[rn as usize - 1].clone())?;
        }
        let crum = Crum {
            hash: ledger.row_hash(16)?,
            utc: 1_700_000_000_000,
        };
        let tree = MerkleTree::new(vec![crum.leaf_hash(), HashBytes([3; 32])]);
        nugget.add_notarized_row(9, NotarizedRow::new(16, tree.prove(crum, 0)))?;
        nugget.add_foreign_ref(
            7,
            Reference {
                local_no: 8,
                foreign_no: 2,
                foreign_hash: HashBytes([0x77; 32]),
            },
        )?;

        let bytes = nugget.encode()?;
        let decoded = Nugget::decode(Bytes::from(bytes.clone()))?;
        assert_eq!(decoded.encode()?, bytes);
        assert_eq!(decoded.source().unwrap().len(), 4);
        assert_eq!(decoded.notary_packs().len(), 1);
        assert_eq!(decoded.foreign_refs().len(), 1);
        Ok(())
    }

    #[test]
    fn tampered_nugget_fails_to_load() -> anyhow::Result<()> {
        let rows = source_rows(8);
        let ledger = ledger_of(&rows);
        let mut nugget = Nugget::new(log_id(4, "events"), ledger.state_path()?);
        nugget.set_salt_scheme(SaltScheme::SALT_ALL)?;
        nugget.add_source_row(rows[7].clone())?;

        let bytes = nugget.encode()?;
        // Flip one byte of the embedded source pack (the tail of the
        // buffer is ref/notary counts; aim just before them).
        let mut tampered = bytes.clone();
        let at = bytes.len() - 5;
        tampered[at] ^= 0x01;
        assert!(Nugget::decode(Bytes::from(tampered)).is_err());
        Ok(())
    }
}
