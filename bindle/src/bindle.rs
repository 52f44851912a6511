//! The distributable unit: a set of nuggets keyed by ledger id.

use std::collections::BTreeMap;
use std::path::Path as FsPath;

use ahash::HashSet;
use bytes::Bytes;
use skipledger::wire::{Reader, WireError};
use skipledger::Path;

use crate::id::{LedgerId, LedgerType};
use crate::nugget::{Nugget, NuggetError, Reference};
use crate::timechain::BlockProof;

const MAGIC: &[u8; 4] = b"BNDL";
const VERSION: u16 = 1;

#[derive(Debug, thiserror::Error)]
pub enum BindleError {
    #[error("alias {alias:?} already declared for a {ledger_type:?} ledger")]
    DuplicateAlias {
        ledger_type: LedgerType,
        alias: String,
    },
    #[error("ledger {0} is not declared")]
    UnknownLedger(u32),
    #[error("ledger {0} is not a timechain")]
    NotATimechain(u32),
    #[error("ledger {from} row {local_no} references ledger {to} row {foreign_no}, which does not resolve")]
    UnresolvedReference {
        from: u32,
        to: u32,
        local_no: u64,
        foreign_no: u64,
    },
    #[error("ledger {ledger} row {rn} fails notarization: {reason}")]
    BadNotarization {
        ledger: u32,
        rn: u64,
        reason: String,
    },
    #[error(transparent)]
    Nugget(#[from] NuggetError),
    #[error(transparent)]
    Wire(#[from] WireError),
    #[error("i/o failure")]
    Io(#[from] std::io::Error),
}

/// Mapping `ledger id → nugget`, plus the declared timechains the
/// notarizations lean on. Ids are assigned on declaration, starting at 1.
#[derive(Default)]
pub struct Bindle {
    nuggets: BTreeMap<u32, Nugget>,
    next_id: u32,
}

impl Bindle {
    /// Conventional file extension.
    pub const FILE_EXT: &'static str = "bndl";

    pub fn new() -> Self {
        Self {
            nuggets: BTreeMap::new(),
            next_id: 1,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.nuggets.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = &LedgerId> + '_ {
        self.nuggets.values().map(Nugget::id)
    }

    pub fn nugget(&self, id: u32) -> Option<&Nugget> {
        self.nuggets.get(&id)
    }

    pub fn nugget_mut(&mut self, id: u32) -> Option<&mut Nugget> {
        self.nuggets.get_mut(&id)
    }

    pub fn find_by_alias(&self, ledger_type: LedgerType, alias: &str) -> Option<&Nugget> {
        self.nuggets
            .values()
            .find(|n| n.id().ledger_type == ledger_type && n.id().alias == alias)
    }

    /// Declares an ordinary ledger seeded with its state path.
    pub fn declare_log(
        &mut self,
        alias: &str,
        state_path: Path,
        uri: Option<String>,
        description: Option<String>,
    ) -> Result<LedgerId, BindleError> {
        let id = self.new_id(LedgerType::Log, alias, uri, description)?;
        self.nuggets
            .insert(id.id, Nugget::new(id.clone(), state_path));
        Ok(id)
    }

    /// Declares a timechain with its block proof attached.
    pub fn declare_timechain(
        &mut self,
        alias: &str,
        block_proof: BlockProof,
        uri: Option<String>,
        description: Option<String>,
    ) -> Result<LedgerId, BindleError> {
        let id = self.new_id(LedgerType::Timechain, alias, uri, description)?;
        self.nuggets
            .insert(id.id, Nugget::new_timechain(id.clone(), block_proof));
        Ok(id)
    }

    fn new_id(
        &mut self,
        ledger_type: LedgerType,
        alias: &str,
        uri: Option<String>,
        description: Option<String>,
    ) -> Result<LedgerId, BindleError> {
        if self
            .nuggets
            .values()
            .any(|n| n.id().ledger_type == ledger_type && n.id().alias == alias)
        {
            return Err(BindleError::DuplicateAlias {
                ledger_type,
                alias: alias.to_owned(),
            });
        }
        let id = LedgerId {
            id: self.next_id,
            ledger_type,
            alias: alias.to_owned(),
            uri,
            description,
        };
        self.next_id += 1;
        Ok(id)
    }

    /// Records that row `local_no` of ledger `from` corresponds to row
    /// `foreign_no` of ledger `to`, pinning the foreign row's current
    /// hash as the claim.
    ///
    /// Both ledgers must be declared and both rows present; a second
    /// claim from the same local row into the same foreign ledger
    /// returns `false`.
    pub fn add_reference(
        &mut self,
        from: u32,
        to: u32,
        local_no: u64,
        foreign_no: u64,
    ) -> Result<bool, BindleError> {
        if !self.nuggets.contains_key(&from) {
            return Err(BindleError::UnknownLedger(from));
        }
        let Some(foreign) = self.nuggets.get(&to) else {
            return Err(BindleError::UnknownLedger(to));
        };
        let Some(foreign_hash) =
            foreign.has_full_row(foreign_no).then(|| foreign.row_hash(foreign_no)).flatten()
        else {
            return Err(BindleError::UnresolvedReference {
                from,
                to,
                local_no,
                foreign_no,
            });
        };
        let reference = Reference {
            local_no,
            foreign_no,
            foreign_hash,
        };
        let nugget = self.nuggets.get_mut(&from).ok_or(BindleError::UnknownLedger(from))?;
        Ok(nugget.add_foreign_ref(to, reference)?)
    }

    /// Checks every cross-nugget invariant:
    ///
    /// - foreign references resolve to full rows with matching hashes;
    /// - notary packs point at declared timechains, and each crumtrail's
    ///   Merkle root is the root committed by the block covering its
    ///   crum's UTC.
    ///
    /// Within-nugget consistency holds by construction.
    pub fn verify(&self) -> Result<(), BindleError> {
        for (&id, nugget) in &self.nuggets {
            for refs in nugget.foreign_refs() {
                let foreign = self
                    .nuggets
                    .get(&refs.foreign_id)
                    .ok_or(BindleError::UnknownLedger(refs.foreign_id))?;
                for r in &refs.refs {
                    let resolved = foreign
                        .has_full_row(r.foreign_no)
                        .then(|| foreign.row_hash(r.foreign_no))
                        .flatten();
                    if resolved != Some(r.foreign_hash) {
                        return Err(BindleError::UnresolvedReference {
                            from: id,
                            to: refs.foreign_id,
                            local_no: r.local_no,
                            foreign_no: r.foreign_no,
                        });
                    }
                }
            }

            for pack in nugget.notary_packs() {
                let chain = self
                    .nuggets
                    .get(&pack.chain_id)
                    .ok_or(BindleError::UnknownLedger(pack.chain_id))?;
                if chain.id().ledger_type != LedgerType::Timechain {
                    return Err(BindleError::NotATimechain(pack.chain_id));
                }
                let params = chain
                    .chain_params()
                    .ok_or(NuggetError::MissingChainParams(pack.chain_id))?;
                for row in &pack.rows {
                    let bad = |reason: String| BindleError::BadNotarization {
                        ledger: id,
                        rn: row.row_no,
                        reason,
                    };
                    let crum = row.proof.crum();
                    if nugget.row_hash(row.row_no) != Some(crum.hash) {
                        return Err(bad("crum does not wrap the row hash".into()));
                    }
                    let block_no = params
                        .block_no_for_utc(crum.utc)
                        .map_err(|e| bad(e.to_string()))?;
                    match chain.input_hash(block_no) {
                        Some(root) if root == row.proof.root() => {}
                        Some(_) => return Err(bad(format!("root mismatch in block {block_no}"))),
                        None => return Err(bad(format!("block {block_no} not in the proof"))),
                    }
                }
            }
        }
        Ok(())
    }

    /// Freezes and serializes: magic, version, id table, then each nugget
    /// in id order, length-delimited. Verification runs first; a bindle
    /// that does not verify does not serialize.
    pub fn encode(&self) -> Result<Vec<u8>, BindleError> {
        self.verify()?;

        let mut id_table = Vec::new();
        id_table.extend_from_slice(&(self.nuggets.len() as u16).to_be_bytes());
        for nugget in self.nuggets.values() {
            nugget.id().write_to(&mut id_table);
        }

        let mut out = Vec::new();
        out.extend_from_slice(MAGIC);
        out.extend_from_slice(&VERSION.to_be_bytes());
        out.extend_from_slice(&(id_table.len() as u32).to_be_bytes());
        out.extend_from_slice(&id_table);
        for nugget in self.nuggets.values() {
            let bytes = nugget.encode()?;
            out.extend_from_slice(&(bytes.len() as u32).to_be_bytes());
            out.extend_from_slice(&bytes);
        }
        tracing::debug!(
            nuggets = self.nuggets.len(),
            bytes = out.len(),
            "encoded bindle"
        );
        Ok(out)
    }

    /// Parses and fully re-verifies a serialized bindle.
    pub fn decode(data: Bytes) -> Result<Self, BindleError> {
        let mut reader = Reader::new(data);
        if reader.take(4)?.as_ref() != MAGIC {
            return Err(BindleError::Wire(reader.bad("bad magic")));
        }
        let version = reader.read_u16()?;
        if version != VERSION {
            return Err(BindleError::Wire(
                reader.bad(format!("unsupported version {version}")),
            ));
        }

        let table_size = reader.read_u32()? as usize;
        let mut table = Reader::new(reader.take(table_size)?);
        let count = table.read_u16()?;
        let mut declared = Vec::with_capacity(usize::from(count));
        for _ in 0..count {
            declared.push(LedgerId::read_from(&mut table)?);
        }
        table.expect_end()?;

        let mut bindle = Self::new();
        let mut seen_aliases = HashSet::default();
        for expected in &declared {
            let len = reader.read_u32()? as usize;
            let nugget = Nugget::decode(reader.take(len)?)?;
            if nugget.id() != expected {
                return Err(BindleError::Wire(
                    reader.bad("nugget does not match the id table"),
                ));
            }
            if !seen_aliases.insert((expected.ledger_type, expected.alias.clone())) {
                return Err(BindleError::DuplicateAlias {
                    ledger_type: expected.ledger_type,
                    alias: expected.alias.clone(),
                });
            }
            if bindle.nuggets.insert(expected.id, nugget).is_some() {
                return Err(BindleError::Wire(reader.bad("duplicate ledger id")));
            }
            bindle.next_id = bindle.next_id.max(expected.id + 1);
        }
        reader.expect_end()?;

        bindle.verify()?;
        Ok(bindle)
    }

    pub fn save(&self, path: &FsPath) -> Result<(), BindleError> {
        let bytes = self.encode()?;
        std::fs::write(path, bytes)?;
        Ok(())
    }

    pub fn load(path: &FsPath) -> Result<Self, BindleError> {
        let bytes = std::fs::read(path)?;
        Self::decode(Bytes::from(bytes))
    }
}

#[cfg(test)]
mod tests {
    use skipledger::{HashBytes, MemTable, SkipLedger};

    use super::*;
    use crate::notary::testing::MerkleTree;
    use crate::notary::{Crum, NotarizedRow};
    use crate::timechain::ChainParams;

    fn ledger_of(n: u64, tag: u8) -> SkipLedger<MemTable> {
        let ledger = SkipLedger::in_memory();
        let inputs: Vec<_> = (1..=n)
            .map(|rn| HashBytes::digest(&[&[tag], &rn.to_be_bytes()]))
            .collect();
        ledger.append_rows(&inputs).unwrap();
        ledger
    }

    #[test]
    fn cross_ledger_references() -> anyhow::Result<()> {
        let ledger_a = ledger_of(4, 0xa);
        let ledger_b = ledger_of(33, 0xb);

        let mut bindle = Bindle::new();
        let a = bindle.declare_log("a", ledger_a.state_path()?, None, None)?;
        let b = bindle.declare_log("b", ledger_b.state_path()?, None, None)?;
        bindle
            .nugget_mut(b.id)
            .unwrap()
            .add_path(ledger_b.get_path(&[28, 33])?)?;

        assert!(bindle.add_reference(a.id, b.id, 1, 28)?);
        // A local row claims at most one row per foreign ledger.
        assert!(!bindle.add_reference(a.id, b.id, 1, 33)?);
        assert!(matches!(
            bindle.add_reference(a.id, b.id, 4, 999),
            Err(BindleError::UnresolvedReference {
                foreign_no: 999,
                ..
            })
        ));
        assert!(matches!(
            bindle.add_reference(a.id, 77, 1, 1),
            Err(BindleError::UnknownLedger(77))
        ));

        bindle.verify()?;
        let reloaded = Bindle::decode(Bytes::from(bindle.encode()?))?;
        assert_eq!(reloaded.ids().count(), 2);
        assert_eq!(
            reloaded.nugget(a.id).unwrap().foreign_refs()[0].refs[0].foreign_no,
            28
        );
        Ok(())
    }

    #[test]
    fn aliases_are_unique_per_type() -> anyhow::Result<()> {
        let ledger = ledger_of(4, 1);
        let mut bindle = Bindle::new();
        bindle.declare_log("audit", ledger.state_path()?, None, None)?;
        assert!(matches!(
            bindle.declare_log("audit", ledger.state_path()?, None, None),
            Err(BindleError::DuplicateAlias { .. })
        ));
        Ok(())
    }

    #[test]
    fn notarization_round_trip() -> anyhow::Result<()> {
        const INCEPTION: u64 = 1_600_000_000_000;
        const BIN: u64 = 60_000;
        let utc = INCEPTION + 499 * BIN + 1; // block 500

        let ledger = ledger_of(4, 2);
        let crum = Crum {
            hash: ledger.row_hash(4)?,
            utc,
        };
        let tree = MerkleTree::new(vec![crum.leaf_hash(), HashBytes([0xee; 32])]);

        // A 1000-block timechain committing the tree root at block 500.
        let chain = SkipLedger::in_memory();
        let mut roots = vec![HashBytes([0xcc; 32]); 1000];
        roots[499] = tree.root();
        chain.append_rows(&roots)?;
        let block_proof = BlockProof::new(
            ChainParams::new(INCEPTION, BIN),
            chain.get_path(&[1, 500, 1000])?,
        );

        let mut bindle = Bindle::new();
        let log = bindle.declare_log("events", ledger.state_path()?, None, None)?;
        let tc = bindle.declare_timechain("crums", block_proof, None, None)?;
        assert!(bindle
            .nugget_mut(log.id)
            .unwrap()
            .add_notarized_row(tc.id, NotarizedRow::new(4, tree.prove(crum, 0)))?);

        let reloaded = Bindle::decode(Bytes::from(bindle.encode()?))?;
        let pack = &reloaded.nugget(log.id).unwrap().notary_packs()[0];
        assert_eq!(pack.chain_id, tc.id);
        assert_eq!(pack.rows[0].row_no, 4);
        assert_eq!(pack.rows[0].proof.crum().hash, ledger.row_hash(4)?);
        Ok(())
    }

    #[test]
    fn notary_pack_against_a_missing_chain_fails_verification() -> anyhow::Result<()> {
        let ledger = ledger_of(4, 3);
        let crum = Crum {
            hash: ledger.row_hash(4)?,
            utc: 1_700_000_000_000,
        };
        let tree = MerkleTree::new(vec![crum.leaf_hash()]);

        let mut bindle = Bindle::new();
        let log = bindle.declare_log("events", ledger.state_path()?, None, None)?;
        bindle
            .nugget_mut(log.id)
            .unwrap()
            .add_notarized_row(42, NotarizedRow::new(4, tree.prove(crum, 0)))?;
        assert!(matches!(
            bindle.verify(),
            Err(BindleError::UnknownLedger(42))
        ));
        Ok(())
    }

    #[test]
    fn tampered_bytes_fail_to_load() -> anyhow::Result<()> {
        let ledger = ledger_of(8, 4);
        let mut bindle = Bindle::new();
        bindle.declare_log("events", ledger.state_path()?, None, None)?;
        let bytes = bindle.encode()?;

        assert!(Bindle::decode(Bytes::from_static(b"NOPE")).is_err());

        let mut truncated = bytes.clone();
        truncated.truncate(bytes.len() - 3);
        assert!(Bindle::decode(Bytes::from(truncated)).is_err());

        let mut flipped = bytes.clone();
        let last = flipped.len() - 1;
        flipped[last] ^= 0xff;
        assert!(Bindle::decode(Bytes::from(flipped)).is_err());
        Ok(())
    }

    /// The whole build-and-verify flow: salted source rows feed a ledger,
    /// the ledger's paths feed a nugget with its source pack and a
    /// notarization, the bindle ships, and the reader re-derives every
    /// hash from the bytes alone.
    #[test]
    fn end_to_end_package() -> anyhow::Result<()> {
        use source_pack::{CellValue, DataType, SaltScheme, SourceRowBuilder, TableSalt};

        const INCEPTION: u64 = 1_650_000_000_000;
        const BIN: u64 = 10_000;

        let builder =
            SourceRowBuilder::with_salt(SaltScheme::negative(vec![0]), TableSalt::new([6; 32]));
        let rows: Vec<_> = (1..=12u64)
            .map(|rn| {
                builder.build(
                    rn,
                    &[DataType::Long, DataType::String],
                    &[
                        CellValue::Long(rn as i64 * 10),
                        CellValue::String(format!("shipment {rn}")),
                    ],
                )
            })
            .collect::<Result<_, _>>()?;

        let ledger = SkipLedger::in_memory();
        ledger.append_rows(&rows.iter().map(source_pack::SourceRow::hash).collect::<Vec<_>>())?;

        let crum = Crum {
            hash: ledger.row_hash(12)?,
            utc: INCEPTION + 41 * BIN, // block 42
        };
        let tree = MerkleTree::new(vec![crum.leaf_hash(), HashBytes([1; 32])]);
        let chain = SkipLedger::in_memory();
        let mut roots = vec![HashBytes([2; 32]); 100];
        roots[41] = tree.root();
        chain.append_rows(&roots)?;

        let mut bindle = Bindle::new();
        let log = bindle.declare_log(
            "shipments",
            ledger.state_path()?,
            Some("https://ledgers.acme.example/shipments".into()),
            None,
        )?;
        let tc = bindle.declare_timechain(
            "crums",
            BlockProof::new(ChainParams::new(INCEPTION, BIN), chain.get_path(&[1, 42, 100])?),
            None,
            None,
        )?;
        {
            let nugget = bindle.nugget_mut(log.id).unwrap();
            nugget.add_path(ledger.get_path(&[5, 7])?)?;
            nugget.set_salt_scheme(SaltScheme::negative(vec![0]))?;
            // Reveal two rows, one with a column redacted.
            nugget.add_source_row(rows[6].clone())?;
            nugget.add_source_row(rows[11].clone().redact(1))?;
            nugget.add_notarized_row(tc.id, NotarizedRow::new(12, tree.prove(crum, 0)))?;
        }

        let bytes = bindle.encode()?;
        let reloaded = Bindle::decode(Bytes::from(bytes.clone()))?;
        assert_eq!(reloaded.encode()?, bytes);

        let nugget = reloaded.nugget(log.id).unwrap();
        let source = nugget.source().unwrap();
        assert_eq!(source.len(), 2);
        // The redacted row still hash-verifies against the ledger path.
        let redacted = source.row(12).unwrap();
        assert!(redacted.has_redaction());
        assert_eq!(Some(redacted.hash()), nugget.input_hash(12));
        assert_eq!(
            source.row(7).unwrap().cell(1).value(),
            Some(CellValue::String("shipment 7".into()))
        );
        Ok(())
    }

    #[test]
    fn save_and_load() -> anyhow::Result<()> {
        let dir = std::env::temp_dir().join("bindle-save-test");
        std::fs::create_dir_all(&dir)?;
        let file = dir.join(format!("events.{}", Bindle::FILE_EXT));

        let ledger = ledger_of(4, 5);
        let mut bindle = Bindle::new();
        bindle.declare_log("events", ledger.state_path()?, None, None)?;
        bindle.save(&file)?;

        let reloaded = Bindle::load(&file)?;
        assert_eq!(reloaded.encode()?, bindle.encode()?);
        std::fs::remove_file(&file)?;
        Ok(())
    }
}
