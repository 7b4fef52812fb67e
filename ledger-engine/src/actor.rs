//! Actor-based concurrency for the ledger
//!
//! The engine is a single-writer actor. Every call runs to completion inside
//! the actor without awaiting, so appends are totally ordered and queries
//! see a consistent snapshot. The only asynchronous work, a migration pass
//! talking to archive units, runs in a spawned task and reports back through
//! the mailbox.
//!
//! # Architecture
//!
//! ```text
//!   LedgerHandle (Clone) ──mpsc (bounded)──► LedgerActor
//!                                              │  plan()
//!                                              ▼
//!                                     tokio::spawn(run_pass)
//!                                              │  awaits provisioner / unit
//!                                              ▼
//!                          MigrationFinished ──► LedgerActor::apply()
//! ```

use crate::{
    archive::{ArchiveIndex, UnitProvisioner},
    certification::{CertificateStore, Certifier},
    config::{Setting, Settings},
    listeners::{Listener, Listeners},
    metrics::Metrics,
    migration::{self, MigrationReport, MigrationState, PassOutcome, PendingUnit},
    query,
    state::LedgerState,
    store::LedgerStore,
    types::{
        ArchiveInfo, BlockRange, BlockTypeDescriptor, GetBlocksResult, Tip, TipCertificate,
        UnitId, Value,
    },
    Error, Result,
};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::Duration;

type Reply<T> = oneshot::Sender<Result<T>>;

/// Message sent to the ledger actor
pub enum LedgerMessage {
    /// Append a record
    Append {
        /// Caller record, stored under `tx`
        record: Value,
        /// Fields merged into the block map
        extra: Option<Value>,
        /// Index of the new block
        response: Reply<u64>,
    },

    /// Plan a range query
    GetRange {
        /// Requested windows
        ranges: Vec<BlockRange>,
        /// Inline blocks and delegations
        response: Reply<GetBlocksResult>,
    },

    /// List archive units
    GetArchiveUnits {
        /// First unit to list
        from: Option<UnitId>,
        /// Units ordered by start
        response: Reply<Vec<ArchiveInfo>>,
    },

    /// Tip certificate, if certified
    GetTipCertificate {
        /// Certificate and witness
        response: Reply<Option<TipCertificate>>,
    },

    /// Tip leaves plus witness
    GetTip {
        /// Tip leaves and witness
        response: Reply<Tip>,
    },

    /// Declared block types
    ListBlockTypes {
        /// Declared types
        response: Reply<Vec<BlockTypeDescriptor>>,
    },

    /// Replace declared block types
    UpdateBlockTypes {
        /// New declaration list
        block_types: Vec<BlockTypeDescriptor>,
        /// Completion
        response: Reply<()>,
    },

    /// Apply settings changes
    UpdateSettings {
        /// Changes, applied in order
        settings: Vec<Setting>,
        /// One applied flag per change
        response: Reply<Vec<bool>>,
    },

    /// Add or replace a listener
    RegisterListener {
        /// Listener name, unique
        name: String,
        /// Callback
        listener: Listener,
        /// Whether an existing listener was replaced
        response: Reply<bool>,
    },

    /// Remove a listener
    RemoveListener {
        /// Listener name
        name: String,
        /// Whether a listener was removed
        response: Reply<bool>,
    },

    /// Attach a certificate store
    ConfigureCertification {
        /// Certified-data capability
        store: Arc<dyn CertificateStore>,
        /// Completion
        response: Reply<()>,
    },

    /// Snapshot of the persisted state
    ExportState {
        /// Current state
        response: Reply<LedgerState>,
    },

    /// Start a migration pass if one is due
    RunMigration,

    /// A migration body finished
    MigrationFinished {
        /// What the pass did
        report: MigrationReport,
    },

    /// Shutdown actor
    Shutdown,
}

impl std::fmt::Debug for LedgerMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LedgerMessage::Append { record, extra, .. } => f
                .debug_struct("Append")
                .field("record", record)
                .field("extra", extra)
                .finish_non_exhaustive(),
            LedgerMessage::GetRange { ranges, .. } => f
                .debug_struct("GetRange")
                .field("ranges", ranges)
                .finish_non_exhaustive(),
            LedgerMessage::GetArchiveUnits { from, .. } => f
                .debug_struct("GetArchiveUnits")
                .field("from", from)
                .finish_non_exhaustive(),
            LedgerMessage::GetTipCertificate { .. } => f.write_str("GetTipCertificate"),
            LedgerMessage::GetTip { .. } => f.write_str("GetTip"),
            LedgerMessage::ListBlockTypes { .. } => f.write_str("ListBlockTypes"),
            LedgerMessage::UpdateBlockTypes { block_types, .. } => f
                .debug_struct("UpdateBlockTypes")
                .field("block_types", block_types)
                .finish_non_exhaustive(),
            LedgerMessage::UpdateSettings { settings, .. } => f
                .debug_struct("UpdateSettings")
                .field("settings", settings)
                .finish_non_exhaustive(),
            LedgerMessage::RegisterListener { name, .. } => f
                .debug_struct("RegisterListener")
                .field("name", name)
                .finish_non_exhaustive(),
            LedgerMessage::RemoveListener { name, .. } => f
                .debug_struct("RemoveListener")
                .field("name", name)
                .finish_non_exhaustive(),
            LedgerMessage::ConfigureCertification { .. } => f.write_str("ConfigureCertification"),
            LedgerMessage::ExportState { .. } => f.write_str("ExportState"),
            LedgerMessage::RunMigration => f.write_str("RunMigration"),
            LedgerMessage::MigrationFinished { report } => f
                .debug_struct("MigrationFinished")
                .field("report", report)
                .finish(),
            LedgerMessage::Shutdown => f.write_str("Shutdown"),
        }
    }
}

/// Migration progress as observed from outside the actor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationStatus {
    /// Coordinator state
    pub state: MigrationState,
    /// A follow-up pass is queued
    pub scheduled: bool,
    /// Index of the oldest live block
    pub first_index: u64,
    /// Total number of blocks
    pub log_length: u64,
    /// Number of registered archive units
    pub archive_units: usize,
    /// Provisioned but unregistered unit
    pub pending_unit: Option<UnitId>,
}

impl MigrationStatus {
    /// No pass running and none queued
    pub fn is_idle(&self) -> bool {
        self.state == MigrationState::Idle && !self.scheduled
    }
}

/// Actor that processes ledger messages
pub struct LedgerActor {
    store: LedgerStore,
    index: ArchiveIndex,
    pending_unit: Option<PendingUnit>,
    settings: Settings,
    block_types: Vec<BlockTypeDescriptor>,
    owner: String,
    blocks_appended: u64,

    certifier: Certifier,
    listeners: Listeners,
    metrics: Metrics,
    provisioner: Arc<dyn UnitProvisioner>,

    migration: MigrationState,
    scheduled: bool,

    /// Mailbox for incoming messages
    mailbox: mpsc::Receiver<LedgerMessage>,

    /// Own address, for follow-up messages; weak so handles control shutdown
    sender: mpsc::WeakSender<LedgerMessage>,

    status: watch::Sender<MigrationStatus>,
}

impl std::fmt::Debug for LedgerActor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LedgerActor")
            .field("first_index", &self.store.first_index())
            .field("log_length", &self.store.log_length())
            .field("archive_units", &self.index.len())
            .field("pending_unit", &self.pending_unit)
            .field("migration", &self.migration)
            .field("scheduled", &self.scheduled)
            .field("listeners", &self.listeners)
            .finish_non_exhaustive()
    }
}

impl LedgerActor {
    /// Run the actor event loop
    pub async fn run(mut self) {
        while let Some(msg) = self.mailbox.recv().await {
            if let LedgerMessage::Shutdown = msg {
                break;
            }
            self.handle_message(msg);
            self.publish_status();
        }

        tracing::info!(
            log_length = self.store.log_length(),
            first_index = self.store.first_index(),
            "Ledger actor stopped"
        );
    }

    fn handle_message(&mut self, msg: LedgerMessage) {
        match msg {
            LedgerMessage::Append {
                record,
                extra,
                response,
            } => {
                let index = self.append(record, extra);
                // Status first, so a caller waiting on the reply sees the queued pass.
                self.publish_status();
                let _ = response.send(Ok(index));
            }

            LedgerMessage::GetRange { ranges, response } => {
                let result = query::plan_range(&self.store, &self.index, &ranges);
                let _ = response.send(result);
            }

            LedgerMessage::GetArchiveUnits { from, response } => {
                let _ = response.send(Ok(self.index.units_from(from.as_ref())));
            }

            LedgerMessage::GetTipCertificate { response } => {
                let _ = response.send(self.certifier.tip_certificate());
            }

            LedgerMessage::GetTip { response } => {
                let _ = response.send(self.certifier.tip());
            }

            LedgerMessage::ListBlockTypes { response } => {
                let _ = response.send(Ok(self.block_types.clone()));
            }

            LedgerMessage::UpdateBlockTypes {
                block_types,
                response,
            } => {
                tracing::info!(count = block_types.len(), "Supported block types updated");
                self.block_types = block_types;
                let _ = response.send(Ok(()));
            }

            LedgerMessage::UpdateSettings { settings, response } => {
                let applied: Vec<bool> = settings
                    .into_iter()
                    .map(|setting| self.settings.apply(setting))
                    .collect();
                tracing::info!(?applied, settings = ?self.settings, "Settings updated");

                if self.store.live_len() > self.settings.max_active_records {
                    self.schedule_migration(Duration::ZERO);
                }
                self.publish_status();
                let _ = response.send(Ok(applied));
            }

            LedgerMessage::RegisterListener {
                name,
                listener,
                response,
            } => {
                let replaced = self.listeners.register(name, listener);
                let _ = response.send(Ok(replaced));
            }

            LedgerMessage::RemoveListener { name, response } => {
                let _ = response.send(Ok(self.listeners.remove(&name)));
            }

            LedgerMessage::ConfigureCertification { store, response } => {
                self.certifier.set_store(store);
                tracing::info!("Certificate store configured");
                let _ = response.send(Ok(()));
            }

            LedgerMessage::ExportState { response } => {
                let _ = response.send(Ok(self.export_state()));
            }

            LedgerMessage::RunMigration => {
                self.scheduled = false;
                self.start_migration();
            }

            LedgerMessage::MigrationFinished { report } => {
                self.finish_migration(report);
            }

            LedgerMessage::Shutdown => {
                // Handled in main loop
            }
        }
    }

    fn append(&mut self, record: Value, extra: Option<Value>) -> u64 {
        let (index, hash) = self.store.append(record, extra);
        self.certifier.certify(index, &hash);
        self.blocks_appended += 1;
        self.metrics.record_append(self.store.live_len());

        if let Some(block) = self.store.get(index) {
            let panics = self.listeners.notify(block, index);
            if panics > 0 {
                self.metrics.record_listener_panics(panics);
            }
        }

        if self.store.live_len() > self.settings.max_active_records {
            self.schedule_migration(Duration::ZERO);
        }
        index
    }

    /// Queue a `RunMigration` unless a pass is running or already queued
    fn schedule_migration(&mut self, delay: Duration) {
        if self.migration == MigrationState::Migrating || self.scheduled {
            return;
        }
        let Some(sender) = self.sender.upgrade() else {
            return;
        };
        self.scheduled = true;

        tokio::spawn(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            let _ = sender.send(LedgerMessage::RunMigration).await;
        });
    }

    fn start_migration(&mut self) {
        if self.migration == MigrationState::Migrating {
            return;
        }

        let plan = match migration::plan(&self.store, &self.index, self.pending_unit, &self.settings)
        {
            Ok(Some(plan)) => plan,
            Ok(None) => return,
            Err(e) => {
                tracing::error!(error = %e, "Migration aborted");
                self.metrics.record_migration_failure();
                return;
            }
        };
        let Some(sender) = self.sender.upgrade() else {
            return;
        };

        tracing::info!(
            destination = ?plan.destination,
            start = plan.start,
            count = plan.blocks.len(),
            "Migration started"
        );
        self.migration = MigrationState::Migrating;

        let body = tokio::spawn(migration::run_pass(plan, self.provisioner.clone()));
        tokio::spawn(async move {
            // A panicking body still reports, so the in-flight flag is released.
            let report = match body.await {
                Ok(report) => report,
                Err(e) => MigrationReport::failed(None, format!("migration task failed: {}", e)),
            };
            let _ = sender
                .send(LedgerMessage::MigrationFinished { report })
                .await;
        });
    }

    fn finish_migration(&mut self, report: MigrationReport) {
        self.migration = MigrationState::Idle;

        let archived = match &report.outcome {
            PassOutcome::Transferred { count, .. } => Some(*count),
            PassOutcome::Failed { .. } => None,
        };

        match migration::apply(report, &mut self.store, &mut self.index, self.pending_unit) {
            Ok(pending) => {
                self.pending_unit = pending;
                match archived {
                    Some(count) => self.metrics.record_migration(count, self.store.live_len()),
                    None => self.metrics.record_migration_failure(),
                }
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to apply migration report");
                self.metrics.record_migration_failure();
                return;
            }
        }

        if archived.is_some() && self.store.live_len() > self.settings.max_active_records {
            let delay = Duration::from_millis(self.settings.migration_retry_delay_ms);
            self.schedule_migration(delay);
        }
    }

    fn export_state(&self) -> LedgerState {
        LedgerState {
            blocks: self.store.iter().cloned().collect(),
            first_index: self.store.first_index(),
            latest_hash: self.store.latest_hash(),
            archives: self.index.to_ranges(),
            pending_unit: self.pending_unit,
            settings: self.settings.clone(),
            block_types: self.block_types.clone(),
            owner: self.owner.clone(),
            blocks_appended: self.blocks_appended,
        }
    }

    fn status(&self) -> MigrationStatus {
        MigrationStatus {
            state: self.migration,
            scheduled: self.scheduled,
            first_index: self.store.first_index(),
            log_length: self.store.log_length(),
            archive_units: self.index.len(),
            pending_unit: self.pending_unit.map(|p| p.unit),
        }
    }

    fn publish_status(&self) {
        let status = self.status();
        self.status.send_if_modified(|current| {
            if *current == status {
                false
            } else {
                *current = status;
                true
            }
        });
    }
}

/// Handle for sending messages to the actor
#[derive(Debug, Clone)]
pub struct LedgerHandle {
    sender: mpsc::Sender<LedgerMessage>,
    status: watch::Receiver<MigrationStatus>,
    metrics: Metrics,
}

impl LedgerHandle {
    async fn call<T>(&self, message: impl FnOnce(Reply<T>) -> LedgerMessage) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(message(tx))
            .await
            .map_err(|_| Error::Concurrency("Actor mailbox closed".to_string()))?;

        rx.await
            .map_err(|_| Error::Concurrency("Response channel closed".to_string()))?
    }

    /// Append a record, returning its index
    pub async fn append(&self, record: Value, extra: Option<Value>) -> Result<u64> {
        self.call(|response| LedgerMessage::Append {
            record,
            extra,
            response,
        })
        .await
    }

    /// Plan a range query
    pub async fn get_range(&self, ranges: Vec<BlockRange>) -> Result<GetBlocksResult> {
        self.call(|response| LedgerMessage::GetRange { ranges, response })
            .await
    }

    /// List archive units, optionally starting at `from`
    pub async fn get_archive_units(&self, from: Option<UnitId>) -> Result<Vec<ArchiveInfo>> {
        self.call(|response| LedgerMessage::GetArchiveUnits { from, response })
            .await
    }

    /// Tip certificate, `None` when uncertified
    pub async fn get_tip_certificate(&self) -> Result<Option<TipCertificate>> {
        self.call(|response| LedgerMessage::GetTipCertificate { response })
            .await
    }

    /// Tip leaves plus witness
    pub async fn get_tip(&self) -> Result<Tip> {
        self.call(|response| LedgerMessage::GetTip { response }).await
    }

    /// Declared block types
    pub async fn list_block_types(&self) -> Result<Vec<BlockTypeDescriptor>> {
        self.call(|response| LedgerMessage::ListBlockTypes { response })
            .await
    }

    /// Replace declared block types
    pub async fn update_block_types(&self, block_types: Vec<BlockTypeDescriptor>) -> Result<()> {
        self.call(|response| LedgerMessage::UpdateBlockTypes {
            block_types,
            response,
        })
        .await
    }

    /// Apply settings; one flag per entry
    pub async fn update_settings(&self, settings: Vec<Setting>) -> Result<Vec<bool>> {
        self.call(|response| LedgerMessage::UpdateSettings { settings, response })
            .await
    }

    /// Add or replace a listener
    pub async fn register_listener(&self, name: String, listener: Listener) -> Result<bool> {
        self.call(|response| LedgerMessage::RegisterListener {
            name,
            listener,
            response,
        })
        .await
    }

    /// Remove a listener
    pub async fn remove_listener(&self, name: String) -> Result<bool> {
        self.call(|response| LedgerMessage::RemoveListener { name, response })
            .await
    }

    /// Attach a certificate store
    pub async fn configure_certification(&self, store: Arc<dyn CertificateStore>) -> Result<()> {
        self.call(|response| LedgerMessage::ConfigureCertification { store, response })
            .await
    }

    /// Snapshot of the persisted state
    pub async fn export_state(&self) -> Result<LedgerState> {
        self.call(|response| LedgerMessage::ExportState { response })
            .await
    }

    /// Latest published migration status
    pub fn migration_status(&self) -> MigrationStatus {
        self.status.borrow().clone()
    }

    /// Wait until no migration pass is running or queued
    pub async fn wait_idle(&self) -> Result<()> {
        let mut status = self.status.clone();
        status
            .wait_for(MigrationStatus::is_idle)
            .await
            .map_err(|_| Error::Concurrency("Actor stopped".to_string()))?;
        Ok(())
    }

    /// Engine metrics
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Shutdown actor
    pub async fn shutdown(&self) -> Result<()> {
        self.sender
            .send(LedgerMessage::Shutdown)
            .await
            .map_err(|_| Error::Concurrency("Actor mailbox closed".to_string()))?;
        Ok(())
    }
}

/// Spawn the ledger actor over a validated state
pub fn spawn_ledger_actor(
    state: LedgerState,
    mut certifier: Certifier,
    provisioner: Arc<dyn UnitProvisioner>,
    mailbox_capacity: usize,
) -> Result<LedgerHandle> {
    let restored = state.restore()?;
    let metrics = Metrics::new()?;
    metrics.live_blocks.set(restored.store.live_len() as i64);

    if let (Some(last), Some(hash)) = (restored.store.last_index(), restored.store.latest_hash()) {
        certifier.certify(last, &hash);
    }

    let (tx, rx) = mpsc::channel(mailbox_capacity.max(1));
    let (status_tx, status_rx) = watch::channel(MigrationStatus {
        state: MigrationState::Idle,
        scheduled: false,
        first_index: restored.store.first_index(),
        log_length: restored.store.log_length(),
        archive_units: restored.index.len(),
        pending_unit: restored.pending_unit.map(|p| p.unit),
    });

    let mut actor = LedgerActor {
        store: restored.store,
        index: restored.index,
        pending_unit: restored.pending_unit,
        settings: restored.settings,
        block_types: restored.block_types,
        owner: restored.owner,
        blocks_appended: restored.blocks_appended,
        certifier,
        listeners: Listeners::new(),
        metrics: metrics.clone(),
        provisioner,
        migration: MigrationState::Idle,
        scheduled: false,
        mailbox: rx,
        sender: tx.downgrade(),
        status: status_tx,
    };

    // A restored ledger may already sit above the high-water mark.
    if actor.store.live_len() > actor.settings.max_active_records {
        actor.schedule_migration(Duration::ZERO);
        actor.publish_status();
    }

    tokio::spawn(actor.run());

    Ok(LedgerHandle {
        sender: tx,
        status: status_rx,
        metrics,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::MemoryProvisioner;
    use crate::certification::LocalCertifier;
    use crate::crypto::KeyPair;

    fn settings(max: u64, settle: u64) -> Settings {
        Settings {
            max_active_records: max,
            settle_to_records: settle,
            max_records_in_archive_instance: 100,
            max_records_to_archive: 100,
            archive_funding: 10,
            ..Settings::default()
        }
    }

    fn spawn(settings: Settings, provisioner: Arc<MemoryProvisioner>) -> LedgerHandle {
        spawn_ledger_actor(
            LedgerState::new("owner", settings),
            Certifier::default(),
            provisioner,
            16,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_actor_spawn_and_shutdown() {
        let handle = spawn(settings(4, 2), Arc::new(MemoryProvisioner::new(100)));
        handle.shutdown().await.unwrap();
    }

    #[test]
    fn test_message_debug_skips_reply_channels() {
        let (response, _rx) = oneshot::channel();
        let message = LedgerMessage::Append {
            record: Value::Nat(7),
            extra: None,
            response,
        };
        let rendered = format!("{:?}", message);
        assert!(rendered.starts_with("Append"));
        assert!(rendered.contains("Nat(7)"));
        assert!(!rendered.contains("response"));

        assert_eq!(format!("{:?}", LedgerMessage::RunMigration), "RunMigration");
    }

    #[tokio::test]
    async fn test_append_returns_sequential_indices() {
        let handle = spawn(settings(100, 50), Arc::new(MemoryProvisioner::new(100)));

        for expected in 0..3 {
            let index = handle.append(Value::Nat(expected), None).await.unwrap();
            assert_eq!(index, expected);
        }
        assert_eq!(handle.metrics().blocks_total.get(), 3);

        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_append_triggers_migration() {
        let provisioner = Arc::new(MemoryProvisioner::new(100));
        let handle = spawn(settings(4, 2), provisioner.clone());

        for i in 0..5 {
            handle.append(Value::Nat(i), None).await.unwrap();
        }
        handle.wait_idle().await.unwrap();

        let status = handle.migration_status();
        assert_eq!(status.first_index, 3);
        assert_eq!(status.archive_units, 1);
        assert_eq!(provisioner.units()[0].len(), 3);
        assert_eq!(handle.metrics().archived_blocks_total.get(), 3);
    }

    #[tokio::test]
    async fn test_listener_sees_every_append() {
        let handle = spawn(settings(100, 50), Arc::new(MemoryProvisioner::new(100)));
        let (tx, mut rx) = mpsc::unbounded_channel();

        handle
            .register_listener(
                "collector".to_string(),
                Box::new(move |_: &Value, index: u64| {
                    let _ = tx.send(index);
                }),
            )
            .await
            .unwrap();
        handle
            .register_listener(
                "faulty".to_string(),
                Box::new(|_: &Value, _: u64| panic!("listener failure")),
            )
            .await
            .unwrap();

        handle.append(Value::Nat(1), None).await.unwrap();
        handle.append(Value::Nat(2), None).await.unwrap();

        assert_eq!(rx.recv().await, Some(0));
        assert_eq!(rx.recv().await, Some(1));
        assert_eq!(handle.metrics().listener_panics_total.get(), 2);
        assert!(handle.remove_listener("faulty".to_string()).await.unwrap());
    }

    #[tokio::test]
    async fn test_update_settings_reports_each_entry() {
        let handle = spawn(settings(4, 2), Arc::new(MemoryProvisioner::new(100)));

        let applied = handle
            .update_settings(vec![
                Setting::SettleToRecords(10),
                Setting::MaxActiveRecords(20),
                Setting::SettleToRecords(10),
            ])
            .await
            .unwrap();

        assert_eq!(applied, vec![false, true, true]);
        let state = handle.export_state().await.unwrap();
        assert_eq!(state.settings.settle_to_records, 10);
    }

    #[tokio::test]
    async fn test_block_types_roundtrip() {
        let handle = spawn(settings(4, 2), Arc::new(MemoryProvisioner::new(100)));
        let types = vec![BlockTypeDescriptor {
            block_type: "1xfer".to_string(),
            url: "https://example.org/xfer".to_string(),
        }];

        assert!(handle.list_block_types().await.unwrap().is_empty());
        handle.update_block_types(types.clone()).await.unwrap();
        assert_eq!(handle.list_block_types().await.unwrap(), types);
    }

    #[tokio::test]
    async fn test_certification_configured_late() {
        let handle = spawn(settings(4, 2), Arc::new(MemoryProvisioner::new(100)));
        handle.append(Value::Nat(1), None).await.unwrap();

        assert!(matches!(handle.get_tip().await, Err(Error::Uncertified(_))));

        let store = Arc::new(LocalCertifier::new(KeyPair::from_seed(&[3u8; 32])));
        handle.configure_certification(store).await.unwrap();

        let tip = handle.get_tip().await.unwrap();
        assert_eq!(tip.last_block_index, vec![0x00]);
        assert!(handle.get_tip_certificate().await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_calls_after_shutdown_fail() {
        let handle = spawn(settings(4, 2), Arc::new(MemoryProvisioner::new(100)));
        handle.shutdown().await.unwrap();

        // Give the actor a chance to drop its mailbox.
        tokio::task::yield_now().await;
        let result = handle.append(Value::Nat(1), None).await;
        assert!(matches!(result, Err(Error::Concurrency(_))));
    }
}
