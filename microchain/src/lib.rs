//! Keeps a skip-ledger in step with the source ledger it commits.
//!
//! The chain is the committed record; the source is the live feed. The
//! synchronizer compares the two at their common frontier, classifies the
//! pair, and (outside of error states) appends what the source has that
//! the chain does not. A historical disagreement is a fork: nothing is
//! appended past it, and only fix-mode rollback may rewrite the chain.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use skipledger::{HashBytes, LedgerError, SkipLedger, SkipTable};
use source_pack::{SaltScheme, SourceRow};

/// The live feed a chain commits. Implementations wrap whatever actually
/// holds the rows (a log file, a database table); the synchronizer only
/// needs sizes and rows.
pub trait SourceLedger {
    fn size(&self) -> anyhow::Result<u64>;

    fn source_row(&self, rn: u64) -> anyhow::Result<SourceRow>;

    fn salt_scheme(&self) -> &SaltScheme;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStatus {
    /// Chain and source agree row for row.
    Complete,
    /// The source has rows the chain has not committed yet.
    Pending { behind: u64 },
    /// The source shrank; the committed prefix still matches.
    Trimmed { excess: u64 },
    /// A committed row disagrees with the source's row.
    Forked { first_bad: u64 },
}

impl SyncStatus {
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Forked { .. })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("chain is forked from its source at row {first_bad}")]
    Forked { first_bad: u64 },
    #[error("operation requires fix mode")]
    FixModeRequired,
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    #[error("source ledger failure")]
    Source(#[source] anyhow::Error),
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MicrochainConfig {
    /// Rows walked backward from an observed mismatch to locate the fork
    /// point.
    #[serde(default = "default_lookback")]
    pub lookback: u64,
    /// Allows destructive rollback of miscommitted rows.
    #[serde(default)]
    pub fix_mode: bool,
}

fn default_lookback() -> u64 {
    10
}

impl Default for MicrochainConfig {
    fn default() -> Self {
        Self {
            lookback: default_lookback(),
            fix_mode: false,
        }
    }
}

pub struct Microchain<S, T> {
    source: S,
    chain: SkipLedger<T>,
    config: MicrochainConfig,
    status: Mutex<SyncStatus>,
}

impl<S: SourceLedger, T: SkipTable> Microchain<S, T> {
    pub fn new(
        source: S,
        chain: SkipLedger<T>,
        config: MicrochainConfig,
    ) -> Result<Self, SyncError> {
        let microchain = Self {
            source,
            chain,
            config,
            status: Mutex::new(SyncStatus::Complete),
        };
        microchain.update_status()?;
        Ok(microchain)
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn chain(&self) -> &SkipLedger<T> {
        &self.chain
    }

    /// Last computed status; see [`Self::update_status`].
    pub fn status(&self) -> SyncStatus {
        *self.status.lock()
    }

    /// Recomputes the pair's status by comparing the highest row both
    /// sides hold. On a mismatch, walks backward up to the lookback
    /// budget for the true fork point.
    pub fn update_status(&self) -> Result<SyncStatus, SyncError> {
        let committed = self.chain.size();
        let source_size = self.source.size().map_err(SyncError::Source)?;
        let frontier = committed.min(source_size);

        let status = if frontier > 0 && !self.rows_agree(frontier)? {
            let first_bad = self.find_fork_point(frontier)?;
            tracing::warn!(first_bad, committed, source_size, "chain fork detected");
            SyncStatus::Forked { first_bad }
        } else if committed < source_size {
            SyncStatus::Pending {
                behind: source_size - committed,
            }
        } else if committed > source_size {
            SyncStatus::Trimmed {
                excess: committed - source_size,
            }
        } else {
            SyncStatus::Complete
        };

        *self.status.lock() = status;
        Ok(status)
    }

    /// Commits up to `max_rows` source rows beyond the current chain
    /// size; returns how many were appended. `update(0)` is a no-op.
    ///
    /// Fails without touching the chain if the pair is forked.
    #[tracing::instrument(skip(self))]
    pub fn update(&self, max_rows: u64) -> Result<u64, SyncError> {
        if let SyncStatus::Forked { first_bad } = self.update_status()? {
            return Err(SyncError::Forked { first_bad });
        }
        if max_rows == 0 {
            return Ok(0);
        }

        let committed = self.chain.size();
        let source_size = self.source.size().map_err(SyncError::Source)?;
        let take = max_rows.min(source_size.saturating_sub(committed));
        if take == 0 {
            return Ok(0);
        }

        let mut inputs = Vec::with_capacity(take as usize);
        for rn in committed + 1..=committed + take {
            inputs.push(self.source_hash(rn)?);
        }
        self.chain.append_rows(&inputs)?;
        tracing::debug!(appended = take, new_size = self.chain.size(), "chain updated");

        self.update_status()?;
        Ok(take)
    }

    /// Trims the chain back to the last row that agrees with the source.
    /// Fix-mode only; this is the single operation that rewrites
    /// committed state.
    pub fn rollback(&self) -> Result<u64, SyncError> {
        if !self.config.fix_mode {
            return Err(SyncError::FixModeRequired);
        }
        let source_size = self.source.size().map_err(SyncError::Source)?;
        let mut last_valid = self.chain.size().min(source_size);
        while last_valid > 0 && !self.rows_agree(last_valid)? {
            last_valid -= 1;
        }
        self.chain.trim_size(last_valid)?;
        self.update_status()?;
        Ok(last_valid)
    }

    fn source_hash(&self, rn: u64) -> Result<HashBytes, SyncError> {
        let row = self.source.source_row(rn).map_err(SyncError::Source)?;
        Ok(row.hash())
    }

    fn rows_agree(&self, rn: u64) -> Result<bool, SyncError> {
        Ok(self.source_hash(rn)? == self.chain.input_hash(rn)?)
    }

    /// Lowest mismatching row within the lookback budget below `from`.
    fn find_fork_point(&self, from: u64) -> Result<u64, SyncError> {
        let mut first_bad = from;
        let floor = from.saturating_sub(self.config.lookback).max(1);
        for rn in (floor..from).rev() {
            if self.rows_agree(rn)? {
                break;
            }
            first_bad = rn;
        }
        Ok(first_bad)
    }
}
