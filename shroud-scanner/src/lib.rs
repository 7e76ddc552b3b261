//! # SHROUD Scanner
//!
//! Per-chain background scanning for incoming stealth payments.
//!
//! ## Features
//!
//! - **Batched block ranges**: candidates are fetched in bounded batches
//!   from the injected [`TransactionSource`]
//! - **Checkpoint resume**: the last fully ingested block height is kept per
//!   chain; failed or cancelled scans pick up where they stopped
//! - **Live progress**: every scan publishes [`ScanProgress`] through a
//!   `tokio::sync::watch` channel
//! - **Spend detection**: optional pass that flips detected payments to
//!   spent when their outputs are consumed
//!
//! ## Example
//!
//! ```rust,ignore
//! use shroud_scanner::{Scanner, ScannerConfig};
//!
//! let scanner = Scanner::new(keyring, source, ledger, activity, ScannerConfig::default())?;
//!
//! let handle = scanner.start_scan(Chain::Bitcoin);
//! let progress = handle.wait().await?;
//!
//! println!("{} payments found", progress.discoveries);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::{debug, info, instrument, warn};

use shroud_core::chain::Chain;
use shroud_core::constants::{DEFAULT_SCAN_BATCH_BLOCKS, MAX_SCAN_BATCH_BLOCKS};
use shroud_core::error::{Result, ShroudError};
use shroud_core::traits::{PaymentStore, TransactionSource};
use shroud_core::types::{
    IngestOutcome, PaymentKey, SecretScalar, SpendOutcome, StealthKeyPair, StealthPayment,
};
use shroud_crypto::{address_matches, match_candidate};
use shroud_wallet::Keyring;

pub use shroud_core::types::{ScanProgress, ScanState};
pub use shroud_wallet::ScanActivity;

// ═══════════════════════════════════════════════════════════════════════════════
// CONFIGURATION
// ═══════════════════════════════════════════════════════════════════════════════

/// Scanner configuration.
#[derive(Clone, Debug)]
pub struct ScannerConfig {
    /// Blocks fetched from the data source per batch.
    pub batch_blocks: u64,
    /// Whether to run spend detection over each batch.
    pub detect_spends: bool,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            batch_blocks: DEFAULT_SCAN_BATCH_BLOCKS,
            detect_spends: true,
        }
    }
}

impl ScannerConfig {
    /// Creates a new default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the per-batch block range size.
    pub fn batch_blocks(mut self, blocks: u64) -> Self {
        self.batch_blocks = blocks;
        self
    }

    /// Enables or disables spend detection.
    pub fn spend_detection(mut self, enabled: bool) -> Self {
        self.detect_spends = enabled;
        self
    }

    /// Checks the configuration bounds.
    pub fn validate(&self) -> Result<()> {
        if self.batch_blocks == 0 {
            return Err(ShroudError::ConfigError(
                "batch_blocks must be at least 1".into(),
            ));
        }
        if self.batch_blocks > MAX_SCAN_BATCH_BLOCKS {
            return Err(ShroudError::ConfigError(format!(
                "batch_blocks {} exceeds the maximum of {}",
                self.batch_blocks, MAX_SCAN_BATCH_BLOCKS
            )));
        }
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// SCAN HANDLE
// ═══════════════════════════════════════════════════════════════════════════════

/// Observer handle for one chain's scan.
///
/// Handles are cheap to clone; every caller that starts or attaches to the
/// same scan shares the same underlying progress channel.
#[derive(Debug, Clone)]
pub struct ScanHandle {
    progress: watch::Receiver<ScanProgress>,
    cancel: Arc<AtomicBool>,
    error: Arc<Mutex<Option<String>>>,
}

impl ScanHandle {
    /// Current progress snapshot.
    pub fn progress(&self) -> ScanProgress {
        self.progress.borrow().clone()
    }

    /// A receiver over every progress update the scan publishes.
    pub fn subscribe(&self) -> watch::Receiver<ScanProgress> {
        self.progress.clone()
    }

    /// Requests cooperative cancellation; the scan stops after the batch in
    /// flight.
    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::Relaxed);
    }

    /// Awaits the end of the scan.
    ///
    /// Returns the final progress on completion or cancellation. A failed
    /// scan surfaces as `ScanUnavailable` carrying the data-source error;
    /// its checkpoint stays queryable through the scanner.
    pub async fn wait(mut self) -> Result<ScanProgress> {
        let done = self
            .progress
            .wait_for(|p| p.state != ScanState::Scanning)
            .await
            .map_err(|_| {
                ShroudError::ScanUnavailable("scan task ended without a final state".into())
            })?
            .clone();

        if done.state == ScanState::Failed {
            let reason = self
                .error
                .lock()
                .clone()
                .unwrap_or_else(|| "data source error".into());
            return Err(ShroudError::ScanUnavailable(reason));
        }
        Ok(done)
    }
}

/// Book-keeping for a spawned scan task.
struct ActiveScan {
    progress: watch::Receiver<ScanProgress>,
    cancel: Arc<AtomicBool>,
    error: Arc<Mutex<Option<String>>>,
}

impl ActiveScan {
    fn handle(&self) -> ScanHandle {
        ScanHandle {
            progress: self.progress.clone(),
            cancel: self.cancel.clone(),
            error: self.error.clone(),
        }
    }

    fn is_running(&self) -> bool {
        self.progress.borrow().state == ScanState::Scanning
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// SCANNER
// ═══════════════════════════════════════════════════════════════════════════════

/// Per-chain background scanner.
///
/// Explicitly constructed with its collaborators. Each chain gets at most one
/// scan task at a time; scans on different chains run independently. Viewing
/// secrets are acquired through the keyring for the duration of a pass and
/// dropped when it ends.
pub struct Scanner {
    keyring: Arc<Keyring>,
    source: Arc<dyn TransactionSource>,
    ledger: Arc<dyn PaymentStore>,
    activity: ScanActivity,
    config: ScannerConfig,
    scans: DashMap<Chain, ActiveScan>,
    checkpoints: Arc<DashMap<Chain, u64>>,
}

impl Scanner {
    /// Creates a scanner over the given collaborators.
    pub fn new(
        keyring: Arc<Keyring>,
        source: Arc<dyn TransactionSource>,
        ledger: Arc<dyn PaymentStore>,
        activity: ScanActivity,
        config: ScannerConfig,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            keyring,
            source,
            ledger,
            activity,
            config,
            scans: DashMap::new(),
            checkpoints: Arc::new(DashMap::new()),
        })
    }

    /// Starts a scan on a chain, or attaches to the one already in flight.
    ///
    /// Idempotent: while a chain is scanning, every caller gets a handle to
    /// the same task. Once it settles, the next call starts a fresh scan
    /// from the stored checkpoint.
    #[instrument(skip(self))]
    pub fn start_scan(&self, chain: Chain) -> ScanHandle {
        match self.scans.entry(chain) {
            Entry::Occupied(mut entry) => {
                if entry.get().is_running() {
                    debug!(%chain, "Attaching to scan already in flight");
                    return entry.get().handle();
                }
                let last_scan_at = entry.get().progress.borrow().last_scan_at;
                let active = self.spawn_scan(chain, last_scan_at);
                let handle = active.handle();
                entry.insert(active);
                handle
            }
            Entry::Vacant(entry) => {
                let active = self.spawn_scan(chain, None);
                let handle = active.handle();
                entry.insert(active);
                handle
            }
        }
    }

    /// Requests cooperative cancellation of the chain's scan.
    ///
    /// Returns true if a scan was in flight. The task stops after the batch
    /// currently being ingested; the checkpoint keeps everything completed.
    #[instrument(skip(self))]
    pub fn cancel_scan(&self, chain: Chain) -> bool {
        match self.scans.get(&chain) {
            Some(active) if active.is_running() => {
                active.cancel.store(true, Ordering::Relaxed);
                info!(%chain, "Scan cancellation requested");
                true
            }
            _ => false,
        }
    }

    /// Requests cancellation of every scan in flight.
    pub fn shutdown(&self) {
        for entry in self.scans.iter() {
            entry.cancel.store(true, Ordering::Relaxed);
        }
    }

    /// Returns true if a scan is in flight on the chain.
    pub fn is_scanning(&self, chain: Chain) -> bool {
        self.scans
            .get(&chain)
            .map(|active| active.is_running())
            .unwrap_or(false)
    }

    /// Current progress for a chain; idle progress if it never scanned.
    pub fn progress(&self, chain: Chain) -> ScanProgress {
        if let Some(active) = self.scans.get(&chain) {
            return active.progress.borrow().clone();
        }
        let mut progress = ScanProgress::idle(chain);
        progress.checkpoint = self.checkpoint(chain);
        progress
    }

    /// Last fully ingested block height for a chain.
    pub fn checkpoint(&self, chain: Chain) -> u64 {
        self.checkpoints.get(&chain).map(|entry| *entry).unwrap_or(0)
    }

    /// Moves the chain's checkpoint, for hosts restoring a persisted height.
    ///
    /// Refused while a scan is in flight on the chain.
    pub fn set_checkpoint(&self, chain: Chain, height: u64) -> Result<()> {
        if self.is_scanning(chain) {
            return Err(ShroudError::ValidationError(format!(
                "cannot move the {} checkpoint while a scan is in flight",
                chain
            )));
        }
        self.checkpoints.insert(chain, height);
        Ok(())
    }

    fn spawn_scan(&self, chain: Chain, last_scan_at: Option<DateTime<Utc>>) -> ActiveScan {
        let initial = ScanProgress {
            chain,
            state: ScanState::Scanning,
            fraction: 0.0,
            blocks_scanned: 0,
            discoveries: 0,
            checkpoint: self.checkpoint(chain),
            last_scan_at,
        };

        let (progress_tx, progress_rx) = watch::channel(initial.clone());
        let cancel = Arc::new(AtomicBool::new(false));
        let error = Arc::new(Mutex::new(None));

        let task = ScanTask {
            chain,
            keyring: self.keyring.clone(),
            source: self.source.clone(),
            ledger: self.ledger.clone(),
            config: self.config.clone(),
            checkpoints: self.checkpoints.clone(),
            cancel: cancel.clone(),
            error: error.clone(),
            progress_tx,
        };
        // Marked before the spawn: the deletion gate must see the scan as
        // soon as a handle to it exists.
        self.activity.begin(chain);
        tokio::spawn(task.run(initial, self.activity.clone()));

        ActiveScan {
            progress: progress_rx,
            cancel,
            error,
        }
    }
}

impl std::fmt::Debug for Scanner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scanner")
            .field("config", &self.config)
            .field("chains", &self.scans.len())
            .finish()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// SCAN TASK
// ═══════════════════════════════════════════════════════════════════════════════

/// Clears the chain's scan-activity mark on every exit path.
struct ActivityGuard {
    activity: ScanActivity,
    chain: Chain,
}

impl Drop for ActivityGuard {
    fn drop(&mut self) {
        self.activity.end(self.chain);
    }
}

/// One spawned scan over a single chain.
struct ScanTask {
    chain: Chain,
    keyring: Arc<Keyring>,
    source: Arc<dyn TransactionSource>,
    ledger: Arc<dyn PaymentStore>,
    config: ScannerConfig,
    checkpoints: Arc<DashMap<Chain, u64>>,
    cancel: Arc<AtomicBool>,
    error: Arc<Mutex<Option<String>>>,
    progress_tx: watch::Sender<ScanProgress>,
}

impl ScanTask {
    async fn run(self, mut progress: ScanProgress, activity: ScanActivity) {
        // The spawner set the scanning mark; this guard owns clearing it.
        let _active = ActivityGuard {
            activity,
            chain: self.chain,
        };

        info!(chain = %self.chain, checkpoint = progress.checkpoint, "Scan started");

        match self.pass(&mut progress).await {
            Ok(true) => {
                progress.state = ScanState::Idle;
                progress.fraction = 1.0;
                progress.last_scan_at = Some(Utc::now());
                info!(
                    chain = %self.chain,
                    checkpoint = progress.checkpoint,
                    blocks = progress.blocks_scanned,
                    discoveries = progress.discoveries,
                    "Scan complete"
                );
            }
            Ok(false) => {
                progress.state = ScanState::Idle;
                info!(chain = %self.chain, checkpoint = progress.checkpoint, "Scan cancelled");
            }
            Err(e) => {
                *self.error.lock() = Some(e.to_string());
                progress.state = ScanState::Failed;
                warn!(
                    chain = %self.chain,
                    checkpoint = progress.checkpoint,
                    error = %e,
                    "Scan aborted"
                );
            }
        }

        self.progress_tx.send_replace(progress);
    }

    /// Scans from the checkpoint to the tip. Returns false when cancelled.
    async fn pass(&self, progress: &mut ScanProgress) -> Result<bool> {
        let tip = self.source.tip_height(self.chain).await?;
        if tip <= progress.checkpoint {
            debug!(chain = %self.chain, tip, "Nothing beyond the checkpoint");
            return Ok(true);
        }

        let total = tip - progress.checkpoint;
        let scalars = self.keyring.viewing_scalars(self.chain).await?;
        debug!(
            chain = %self.chain,
            tip,
            key_pairs = scalars.len(),
            "Scanning toward tip"
        );

        while progress.checkpoint < tip {
            if self.cancel.load(Ordering::Relaxed) {
                return Ok(false);
            }

            let from = progress.checkpoint + 1;
            let to = (progress.checkpoint + self.config.batch_blocks).min(tip);
            self.scan_batch(from, to, &scalars, progress).await?;

            // Advance only after the batch is fully ingested
            progress.checkpoint = to;
            self.checkpoints.insert(self.chain, to);
            progress.blocks_scanned += to - from + 1;
            progress.fraction = progress.blocks_scanned as f64 / total as f64;
            self.progress_tx.send_replace(progress.clone());
        }

        Ok(true)
    }

    /// Ingests one inclusive block range.
    async fn scan_batch(
        &self,
        from: u64,
        to: u64,
        scalars: &[(StealthKeyPair, SecretScalar)],
        progress: &mut ScanProgress,
    ) -> Result<()> {
        let candidates = self.source.candidates_in_range(self.chain, from, to).await?;
        debug!(chain = %self.chain, from, to, candidates = candidates.len(), "Scanning batch");

        'candidates: for candidate in &candidates {
            for output in &candidate.outputs {
                // Every owned pair is evaluated; no early exit on a match
                let mut matched = None;
                for (pair, viewing) in scalars {
                    let derived = match match_candidate(
                        self.chain,
                        &pair.spending_public,
                        viewing,
                        &candidate.ephemeral_public_key,
                        output.index,
                    ) {
                        Ok(address) => address,
                        Err(e) => {
                            debug!(
                                tx_hash = %candidate.tx_hash,
                                error = %e,
                                "Skipping malformed candidate"
                            );
                            continue 'candidates;
                        }
                    };
                    let hit = address_matches(&derived, &output.address);
                    if hit && matched.is_none() {
                        matched = Some(pair.id);
                    }
                }

                if let Some(key_pair_id) = matched {
                    let payment = StealthPayment {
                        key: PaymentKey::new(
                            self.chain,
                            output.address.clone(),
                            candidate.tx_hash.clone(),
                        ),
                        amount: output.amount,
                        ephemeral_public_key: candidate.ephemeral_public_key.clone(),
                        output_index: output.index,
                        key_pair_id,
                        block_height: candidate.block_height,
                        detected_at: Utc::now(),
                        is_spent: false,
                        note: None,
                    };
                    if self.ledger.record_incoming(payment).await? == IngestOutcome::Recorded {
                        progress.discoveries += 1;
                        info!(
                            chain = %self.chain,
                            tx_hash = %candidate.tx_hash,
                            block = candidate.block_height,
                            "Detected incoming stealth payment"
                        );
                    }
                }
            }
        }

        if self.config.detect_spends {
            let notices = self.source.spends_in_range(self.chain, from, to).await?;
            for notice in notices {
                match self.ledger.mark_spent(&notice.payment_key()).await {
                    Ok(SpendOutcome::MarkedSpent) => {
                        debug!(
                            chain = %self.chain,
                            spent_in = %notice.spent_in_tx,
                            "Marked payment spent"
                        );
                    }
                    Ok(SpendOutcome::AlreadySpent) => {}
                    // Spends of outputs we never tracked are expected
                    Err(ShroudError::PaymentNotFound(_)) => {}
                    Err(e) => return Err(e),
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicU64;
    use tokio::sync::Notify;

    use shroud_core::types::{CandidateOutput, MetaAddress, SpendNotice, TxCandidate};
    use shroud_crypto::{compute_one_time_address, decode_meta_address, generate_key_pair};
    use shroud_ledger::MemoryLedger;
    use shroud_wallet::MemoryKeystore;

    struct MockSource {
        tips: DashMap<Chain, u64>,
        candidates: DashMap<Chain, Vec<TxCandidate>>,
        spends: DashMap<Chain, Vec<SpendNotice>>,
        gate: Option<Arc<Notify>>,
        fail_from: AtomicU64,
        tip_calls: AtomicU64,
        spend_calls: AtomicU64,
        ranges: Mutex<Vec<(u64, u64)>>,
    }

    impl MockSource {
        fn new() -> Self {
            Self {
                tips: DashMap::new(),
                candidates: DashMap::new(),
                spends: DashMap::new(),
                gate: None,
                fail_from: AtomicU64::new(0),
                tip_calls: AtomicU64::new(0),
                spend_calls: AtomicU64::new(0),
                ranges: Mutex::new(Vec::new()),
            }
        }

        fn gated(gate: Arc<Notify>) -> Self {
            let mut source = Self::new();
            source.gate = Some(gate);
            source
        }

        fn set_tip(&self, chain: Chain, tip: u64) {
            self.tips.insert(chain, tip);
        }

        fn add_candidate(&self, chain: Chain, candidate: TxCandidate) {
            self.candidates.entry(chain).or_default().push(candidate);
        }

        fn add_spend(&self, chain: Chain, notice: SpendNotice) {
            self.spends.entry(chain).or_default().push(notice);
        }

        fn fail_ranges_reaching(&self, height: u64) {
            self.fail_from.store(height, Ordering::SeqCst);
        }

        fn recover(&self) {
            self.fail_from.store(0, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl TransactionSource for MockSource {
        async fn tip_height(&self, chain: Chain) -> Result<u64> {
            self.tip_calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.tips.get(&chain).map(|tip| *tip).unwrap_or(0))
        }

        async fn candidates_in_range(
            &self,
            chain: Chain,
            from: u64,
            to: u64,
        ) -> Result<Vec<TxCandidate>> {
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            let fail_from = self.fail_from.load(Ordering::SeqCst);
            if fail_from != 0 && to >= fail_from {
                return Err(ShroudError::ScanUnavailable("node connection reset".into()));
            }
            self.ranges.lock().push((from, to));
            Ok(self
                .candidates
                .get(&chain)
                .map(|txs| {
                    txs.iter()
                        .filter(|tx| tx.block_height >= from && tx.block_height <= to)
                        .cloned()
                        .collect()
                })
                .unwrap_or_default())
        }

        async fn spends_in_range(
            &self,
            chain: Chain,
            from: u64,
            to: u64,
        ) -> Result<Vec<SpendNotice>> {
            self.spend_calls.fetch_add(1, Ordering::SeqCst);
            Ok(self
                .spends
                .get(&chain)
                .map(|notices| {
                    notices
                        .iter()
                        .filter(|n| n.block_height >= from && n.block_height <= to)
                        .cloned()
                        .collect()
                })
                .unwrap_or_default())
        }
    }

    struct Fixture {
        keyring: Arc<Keyring>,
        ledger: Arc<MemoryLedger>,
        source: Arc<MockSource>,
        activity: ScanActivity,
    }

    impl Fixture {
        fn new() -> Self {
            Self::with_source(MockSource::new())
        }

        fn gated(gate: Arc<Notify>) -> Self {
            Self::with_source(MockSource::gated(gate))
        }

        fn with_source(source: MockSource) -> Self {
            let ledger = Arc::new(MemoryLedger::new());
            let activity = ScanActivity::new();
            let keyring = Arc::new(Keyring::new(
                Arc::new(MemoryKeystore::new()),
                ledger.clone(),
                activity.clone(),
            ));
            Self {
                keyring,
                ledger,
                source: Arc::new(source),
                activity,
            }
        }

        fn scanner(&self, config: ScannerConfig) -> Scanner {
            Scanner::new(
                self.keyring.clone(),
                self.source.clone(),
                self.ledger.clone(),
                self.activity.clone(),
                config,
            )
            .unwrap()
        }
    }

    /// A candidate transaction paying the given owned pair.
    fn candidate_paying(
        pair: &StealthKeyPair,
        index: u32,
        tx_hash: &str,
        height: u64,
        amount: u128,
    ) -> TxCandidate {
        let meta = decode_meta_address(&pair.meta_address).unwrap();
        let destination = compute_one_time_address(&meta, index).unwrap();
        TxCandidate {
            tx_hash: tx_hash.into(),
            block_height: height,
            ephemeral_public_key: destination.ephemeral_public_key,
            outputs: vec![CandidateOutput {
                index,
                address: destination.address,
                amount,
            }],
        }
    }

    /// A candidate paying some unrelated identity.
    fn candidate_for_stranger(chain: Chain, tx_hash: &str, height: u64) -> TxCandidate {
        let generated = generate_key_pair().unwrap();
        let meta = MetaAddress::new(chain, generated.spending_public, generated.viewing_public);
        let destination = compute_one_time_address(&meta, 0).unwrap();
        TxCandidate {
            tx_hash: tx_hash.into(),
            block_height: height,
            ephemeral_public_key: destination.ephemeral_public_key,
            outputs: vec![CandidateOutput {
                index: 0,
                address: destination.address,
                amount: 42,
            }],
        }
    }

    #[tokio::test]
    async fn test_scan_with_no_new_blocks() {
        let fixture = Fixture::new();
        let scanner = fixture.scanner(ScannerConfig::default());

        let done = scanner.start_scan(Chain::Bitcoin).wait().await.unwrap();

        assert_eq!(done.state, ScanState::Idle);
        assert_eq!(done.fraction, 1.0);
        assert_eq!(done.discoveries, 0);
        assert!(done.last_scan_at.is_some());
    }

    #[tokio::test]
    async fn test_scan_detects_own_payment() {
        let fixture = Fixture::new();
        let pair = fixture.keyring.generate(Chain::Bitcoin, None).await.unwrap();

        let candidate = candidate_paying(&pair, 0, "tx-a", 3, 50_000);
        let address = candidate.outputs[0].address.clone();
        fixture.source.set_tip(Chain::Bitcoin, 5);
        fixture.source.add_candidate(Chain::Bitcoin, candidate);

        let scanner = fixture.scanner(ScannerConfig::default());
        let done = scanner.start_scan(Chain::Bitcoin).wait().await.unwrap();

        assert_eq!(done.discoveries, 1);
        assert_eq!(done.checkpoint, 5);
        assert_eq!(scanner.checkpoint(Chain::Bitcoin), 5);

        let unspent = fixture.ledger.unspent(Chain::Bitcoin).await.unwrap();
        assert_eq!(unspent.len(), 1);
        assert_eq!(unspent[0].key.one_time_address, address);
        assert_eq!(unspent[0].key_pair_id, pair.id);
        assert_eq!(unspent[0].output_index, 0);
        assert_eq!(unspent[0].block_height, 3);
        assert_eq!(unspent[0].amount, 50_000);
    }

    #[tokio::test]
    async fn test_scan_matches_every_owned_pair() {
        let fixture = Fixture::new();
        let first = fixture.keyring.generate(Chain::Ethereum, None).await.unwrap();
        let second = fixture.keyring.generate(Chain::Ethereum, None).await.unwrap();
        assert!(!second.is_default);

        // One payment per pair; the non-default one at a non-zero index
        fixture
            .source
            .add_candidate(Chain::Ethereum, candidate_paying(&first, 0, "tx-a", 1, 4));
        fixture
            .source
            .add_candidate(Chain::Ethereum, candidate_paying(&second, 2, "tx-b", 1, 9));
        fixture.source.set_tip(Chain::Ethereum, 1);

        let scanner = fixture.scanner(ScannerConfig::default());
        let done = scanner.start_scan(Chain::Ethereum).wait().await.unwrap();

        assert_eq!(done.discoveries, 2);
        let unspent = fixture.ledger.unspent(Chain::Ethereum).await.unwrap();
        assert_eq!(unspent.len(), 2);

        let to_first = unspent.iter().find(|p| p.key.tx_hash == "tx-a").unwrap();
        assert_eq!(to_first.key_pair_id, first.id);
        assert_eq!(to_first.output_index, 0);

        let to_second = unspent.iter().find(|p| p.key.tx_hash == "tx-b").unwrap();
        assert_eq!(to_second.key_pair_id, second.id);
        assert_eq!(to_second.output_index, 2);
    }

    #[tokio::test]
    async fn test_scan_ignores_unrelated_payments() {
        let fixture = Fixture::new();
        let pair = fixture.keyring.generate(Chain::Bitcoin, None).await.unwrap();

        fixture
            .source
            .add_candidate(Chain::Bitcoin, candidate_paying(&pair, 0, "ours", 2, 7));
        fixture
            .source
            .add_candidate(Chain::Bitcoin, candidate_for_stranger(Chain::Bitcoin, "theirs-1", 2));
        fixture
            .source
            .add_candidate(Chain::Bitcoin, candidate_for_stranger(Chain::Bitcoin, "theirs-2", 3));
        fixture.source.set_tip(Chain::Bitcoin, 3);

        let scanner = fixture.scanner(ScannerConfig::default());
        let done = scanner.start_scan(Chain::Bitcoin).wait().await.unwrap();

        assert_eq!(done.discoveries, 1);
        let incoming = fixture.ledger.incoming(Chain::Bitcoin).await.unwrap();
        assert_eq!(incoming.len(), 1);
        assert_eq!(incoming[0].key.tx_hash, "ours");
    }

    #[tokio::test]
    async fn test_rescan_after_checkpoint_reset_is_idempotent() {
        let fixture = Fixture::new();
        let pair = fixture.keyring.generate(Chain::Bitcoin, None).await.unwrap();
        fixture
            .source
            .add_candidate(Chain::Bitcoin, candidate_paying(&pair, 0, "tx-a", 2, 10));
        fixture.source.set_tip(Chain::Bitcoin, 4);

        let scanner = fixture.scanner(ScannerConfig::default());
        let first = scanner.start_scan(Chain::Bitcoin).wait().await.unwrap();
        assert_eq!(first.discoveries, 1);

        // Replay the whole range: the ledger collapses the duplicate
        scanner.set_checkpoint(Chain::Bitcoin, 0).unwrap();
        let second = scanner.start_scan(Chain::Bitcoin).wait().await.unwrap();

        assert_eq!(second.discoveries, 0);
        assert_eq!(fixture.ledger.incoming(Chain::Bitcoin).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_failure_retains_checkpoint_and_payments() {
        let fixture = Fixture::new();
        let pair = fixture.keyring.generate(Chain::Bitcoin, None).await.unwrap();
        fixture
            .source
            .add_candidate(Chain::Bitcoin, candidate_paying(&pair, 0, "early", 2, 10));
        fixture.source.set_tip(Chain::Bitcoin, 10);
        fixture.source.fail_ranges_reaching(6);

        let scanner = fixture.scanner(ScannerConfig::new().batch_blocks(5));
        let err = scanner.start_scan(Chain::Bitcoin).wait().await.unwrap_err();
        assert!(matches!(err, ShroudError::ScanUnavailable(_)));

        // First batch landed, second did not
        let progress = scanner.progress(Chain::Bitcoin);
        assert_eq!(progress.state, ScanState::Failed);
        assert_eq!(progress.checkpoint, 5);
        assert_eq!(fixture.ledger.incoming(Chain::Bitcoin).await.unwrap().len(), 1);

        // Recovery resumes from the checkpoint, not from zero
        fixture.source.recover();
        let resumed = scanner.start_scan(Chain::Bitcoin).wait().await.unwrap();
        assert_eq!(resumed.state, ScanState::Idle);
        assert_eq!(resumed.checkpoint, 10);
        assert_eq!(*fixture.source.ranges.lock(), vec![(1, 5), (6, 10)]);
    }

    #[tokio::test]
    async fn test_batches_cover_range_inclusively() {
        let fixture = Fixture::new();
        fixture.source.set_tip(Chain::Ethereum, 12);

        let scanner = fixture.scanner(ScannerConfig::new().batch_blocks(5));
        let done = scanner.start_scan(Chain::Ethereum).wait().await.unwrap();

        assert_eq!(done.blocks_scanned, 12);
        assert_eq!(*fixture.source.ranges.lock(), vec![(1, 5), (6, 10), (11, 12)]);
    }

    #[tokio::test]
    async fn test_second_start_attaches_to_running_scan() {
        let gate = Arc::new(Notify::new());
        let fixture = Fixture::gated(gate.clone());
        fixture.source.set_tip(Chain::Ethereum, 4);

        let scanner = fixture.scanner(ScannerConfig::default());
        let first = scanner.start_scan(Chain::Ethereum);
        let second = scanner.start_scan(Chain::Ethereum);
        assert!(first.subscribe().same_channel(&second.subscribe()));

        gate.notify_one();
        let (a, b) = futures::join!(first.wait(), second.wait());
        assert_eq!(a.unwrap().checkpoint, 4);
        assert_eq!(b.unwrap().checkpoint, 4);

        // One task served both handles
        assert_eq!(fixture.source.tip_calls.load(Ordering::SeqCst), 1);

        // After completion a new start spawns a fresh task
        scanner.start_scan(Chain::Ethereum).wait().await.unwrap();
        assert_eq!(fixture.source.tip_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_cancel_stops_between_batches() {
        let gate = Arc::new(Notify::new());
        let fixture = Fixture::gated(gate.clone());
        fixture.source.set_tip(Chain::Bitcoin, 20);

        let scanner = fixture.scanner(ScannerConfig::new().batch_blocks(5));
        let handle = scanner.start_scan(Chain::Bitcoin);
        let mut updates = handle.subscribe();

        // Let the first batch through, then cancel
        gate.notify_one();
        while updates.borrow().blocks_scanned < 5 {
            updates.changed().await.unwrap();
        }
        assert!(scanner.cancel_scan(Chain::Bitcoin));

        // Unblock the task if it was already waiting on the next batch
        gate.notify_one();

        let done = handle.wait().await.unwrap();
        assert_eq!(done.state, ScanState::Idle);
        assert!(done.checkpoint >= 5 && done.checkpoint < 20);
        assert!(done.last_scan_at.is_none());
        assert_eq!(scanner.checkpoint(Chain::Bitcoin), done.checkpoint);
        assert!(!fixture.activity.is_scanning(Chain::Bitcoin));
    }

    #[tokio::test]
    async fn test_spend_notice_flips_payment() {
        let fixture = Fixture::new();
        let pair = fixture.keyring.generate(Chain::Bitcoin, None).await.unwrap();

        let candidate = candidate_paying(&pair, 0, "fund", 2, 800);
        let address = candidate.outputs[0].address.clone();
        fixture.source.set_tip(Chain::Bitcoin, 5);
        fixture.source.add_candidate(Chain::Bitcoin, candidate);
        fixture.source.add_spend(
            Chain::Bitcoin,
            SpendNotice {
                chain: Chain::Bitcoin,
                one_time_address: address.clone(),
                tx_hash: "fund".into(),
                spent_in_tx: "drain".into(),
                block_height: 4,
            },
        );
        // A spend of an output we never tracked is tolerated
        fixture.source.add_spend(
            Chain::Bitcoin,
            SpendNotice {
                chain: Chain::Bitcoin,
                one_time_address: "1unknown".into(),
                tx_hash: "other".into(),
                spent_in_tx: "drain2".into(),
                block_height: 4,
            },
        );

        let scanner = fixture.scanner(ScannerConfig::default());
        scanner.start_scan(Chain::Bitcoin).wait().await.unwrap();

        let key = PaymentKey::new(Chain::Bitcoin, address, "fund");
        let payment = fixture.ledger.find_incoming(&key).await.unwrap().unwrap();
        assert!(payment.is_spent);
        assert!(fixture.ledger.unspent(Chain::Bitcoin).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_spend_detection_can_be_disabled() {
        let fixture = Fixture::new();
        let pair = fixture.keyring.generate(Chain::Bitcoin, None).await.unwrap();

        let candidate = candidate_paying(&pair, 0, "fund", 2, 800);
        let address = candidate.outputs[0].address.clone();
        fixture.source.set_tip(Chain::Bitcoin, 5);
        fixture.source.add_candidate(Chain::Bitcoin, candidate);
        fixture.source.add_spend(
            Chain::Bitcoin,
            SpendNotice {
                chain: Chain::Bitcoin,
                one_time_address: address.clone(),
                tx_hash: "fund".into(),
                spent_in_tx: "drain".into(),
                block_height: 4,
            },
        );

        let scanner = fixture.scanner(ScannerConfig::new().spend_detection(false));
        scanner.start_scan(Chain::Bitcoin).wait().await.unwrap();

        let key = PaymentKey::new(Chain::Bitcoin, address, "fund");
        let payment = fixture.ledger.find_incoming(&key).await.unwrap().unwrap();
        assert!(!payment.is_spent);
        assert_eq!(fixture.source.spend_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_progress_fraction_is_monotone() {
        let fixture = Fixture::new();
        fixture.source.set_tip(Chain::Ethereum, 20);

        let scanner = fixture.scanner(ScannerConfig::new().batch_blocks(5));
        let handle = scanner.start_scan(Chain::Ethereum);
        let mut updates = handle.subscribe();

        let mut fractions = vec![updates.borrow().fraction];
        while updates.changed().await.is_ok() {
            let progress = updates.borrow().clone();
            fractions.push(progress.fraction);
            if progress.state != ScanState::Scanning {
                break;
            }
        }

        for pair in fractions.windows(2) {
            assert!(pair[1] >= pair[0]);
        }
        assert_eq!(*fractions.last().unwrap(), 1.0);
    }

    #[tokio::test]
    async fn test_chains_scan_independently() {
        let gate = Arc::new(Notify::new());
        let fixture = Fixture::gated(gate.clone());
        fixture.source.set_tip(Chain::Bitcoin, 5);
        // Ethereum has nothing beyond the checkpoint and never hits the gate

        let scanner = fixture.scanner(ScannerConfig::default());
        let bitcoin = scanner.start_scan(Chain::Bitcoin);

        let ethereum = scanner.start_scan(Chain::Ethereum).wait().await.unwrap();
        assert_eq!(ethereum.state, ScanState::Idle);
        assert!(scanner.is_scanning(Chain::Bitcoin));
        assert!(fixture.activity.is_scanning(Chain::Bitcoin));
        assert!(!fixture.activity.is_scanning(Chain::Ethereum));

        gate.notify_one();
        bitcoin.wait().await.unwrap();
        assert!(!fixture.activity.is_scanning(Chain::Bitcoin));
    }

    #[tokio::test]
    async fn test_delete_blocked_while_scan_in_flight() {
        let gate = Arc::new(Notify::new());
        let fixture = Fixture::gated(gate.clone());
        let pair = fixture.keyring.generate(Chain::Ethereum, None).await.unwrap();
        fixture.source.set_tip(Chain::Ethereum, 3);

        let scanner = fixture.scanner(ScannerConfig::default());
        let handle = scanner.start_scan(Chain::Ethereum);

        // The mark is set before the task is spawned, so the gate holds
        // without yielding to the scan even once
        assert!(fixture.activity.is_scanning(Chain::Ethereum));
        let err = fixture.keyring.delete(pair.id).await.unwrap_err();
        assert!(matches!(err, ShroudError::DeletionBlocked(_)));

        gate.notify_one();
        handle.wait().await.unwrap();
        fixture.keyring.delete(pair.id).await.unwrap();
    }

    #[tokio::test]
    async fn test_set_checkpoint_refused_while_scanning() {
        let gate = Arc::new(Notify::new());
        let fixture = Fixture::gated(gate.clone());
        fixture.source.set_tip(Chain::Bitcoin, 5);

        let scanner = fixture.scanner(ScannerConfig::default());
        let handle = scanner.start_scan(Chain::Bitcoin);

        let result = scanner.set_checkpoint(Chain::Bitcoin, 99);
        assert!(matches!(result, Err(ShroudError::ValidationError(_))));

        gate.notify_one();
        handle.wait().await.unwrap();
        scanner.set_checkpoint(Chain::Bitcoin, 99).unwrap();
        assert_eq!(scanner.checkpoint(Chain::Bitcoin), 99);
    }

    #[tokio::test]
    async fn test_config_bounds() {
        assert!(ScannerConfig::default().validate().is_ok());
        assert!(ScannerConfig::new().batch_blocks(0).validate().is_err());
        assert!(ScannerConfig::new()
            .batch_blocks(MAX_SCAN_BATCH_BLOCKS + 1)
            .validate()
            .is_err());

        let fixture = Fixture::new();
        let result = Scanner::new(
            fixture.keyring.clone(),
            fixture.source.clone(),
            fixture.ledger.clone(),
            fixture.activity.clone(),
            ScannerConfig::new().batch_blocks(0),
        );
        assert!(matches!(result.err(), Some(ShroudError::ConfigError(_))));
    }
}
