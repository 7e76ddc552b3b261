//! Per-chain scanner state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::chain::Chain;

/// Scanner state machine for one chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ScanState {
    /// No scan in flight.
    #[default]
    Idle,
    /// A scan task is running.
    Scanning,
    /// The last scan aborted; the checkpoint is preserved for retry.
    Failed,
}

/// Observable progress of one chain's scanner.
///
/// `fraction` is monotone non-decreasing within a scan. Only `last_scan_at`
/// and `checkpoint` survive a completed pass; the rest resets when the next
/// scan starts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanProgress {
    /// Chain this progress belongs to.
    pub chain: Chain,
    /// Current state machine position.
    pub state: ScanState,
    /// Fraction of the targeted block range processed, in `[0, 1]`.
    pub fraction: f64,
    /// Blocks processed so far in the current scan.
    pub blocks_scanned: u64,
    /// Payments detected so far in the current scan.
    pub discoveries: u64,
    /// Last block height fully ingested across all scans.
    pub checkpoint: u64,
    /// Completion time of the last successful scan.
    pub last_scan_at: Option<DateTime<Utc>>,
}

impl ScanProgress {
    /// Initial idle progress for a chain.
    pub fn idle(chain: Chain) -> Self {
        Self {
            chain,
            state: ScanState::Idle,
            fraction: 0.0,
            blocks_scanned: 0,
            discoveries: 0,
            checkpoint: 0,
            last_scan_at: None,
        }
    }

    /// Progress as a percentage, for display.
    pub fn percent(&self) -> f64 {
        self.fraction * 100.0
    }
}
