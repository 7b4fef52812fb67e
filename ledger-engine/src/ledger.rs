//! Main ledger orchestration layer
//!
//! This module ties together the actor, certification and the archive
//! provisioner into a high-level API.
//!
//! # Example
//!
//! ```no_run
//! use ledger_engine::{archive::MemoryProvisioner, types::Value, Config, Ledger};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> ledger_engine::Result<()> {
//!     let config = Config::default();
//!     let provisioner = Arc::new(MemoryProvisioner::new(config.provisioner.budget));
//!     let ledger = Ledger::open(config, provisioner).await?;
//!
//!     let index = ledger.append(Value::text("hello"), None).await?;
//!     assert_eq!(index, 0);
//!
//!     ledger.shutdown().await
//! }
//! ```

use crate::{
    actor::{spawn_ledger_actor, LedgerHandle, MigrationStatus},
    archive::UnitProvisioner,
    certification::{CertificateStore, Certifier, LocalCertifier},
    config::Setting,
    crypto::KeyPair,
    listeners::Listener,
    metrics::Metrics,
    state::LedgerState,
    types::{
        ArchiveInfo, BlockRange, BlockTypeDescriptor, BlockWithId, GetBlocksResult, Tip,
        TipCertificate, UnitId, Value,
    },
    Config, Error, Result,
};
use std::sync::Arc;

/// Main ledger interface
pub struct Ledger {
    /// Actor handle for async operations
    handle: LedgerHandle,

    /// Resolves archive unit addresses for follow-up reads
    provisioner: Arc<dyn UnitProvisioner>,

    /// Local certificate store, when certification is enabled in config
    local_certifier: Option<Arc<LocalCertifier>>,

    /// Configuration
    config: Config,
}

impl std::fmt::Debug for Ledger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ledger")
            .field("service_name", &self.config.service_name)
            .field("owner", &self.config.owner)
            .field("certified", &self.local_certifier.is_some())
            .finish()
    }
}

impl Ledger {
    /// Open an empty ledger
    pub async fn open(config: Config, provisioner: Arc<dyn UnitProvisioner>) -> Result<Self> {
        let mut settings = config.settings.clone();
        if settings.controllers.is_empty() {
            settings.controllers = vec![config.owner.clone()];
        }
        let state = LedgerState::new(config.owner.clone(), settings);
        Self::open_with_state(config, provisioner, state).await
    }

    /// Open a ledger over previously exported state
    pub async fn open_with_state(
        config: Config,
        provisioner: Arc<dyn UnitProvisioner>,
        state: LedgerState,
    ) -> Result<Self> {
        let local_certifier = if config.certification.enabled {
            let keypair = match config.certification.seed()? {
                Some(seed) => KeyPair::from_seed(&seed),
                None => KeyPair::generate(),
            };
            Some(Arc::new(LocalCertifier::new(keypair)))
        } else {
            None
        };
        let certifier = Certifier::new(
            local_certifier
                .clone()
                .map(|c| c as Arc<dyn CertificateStore>),
        );

        tracing::info!(
            service = %config.service_name,
            version = %config.service_version,
            log_length = state.log_length(),
            first_index = state.first_index,
            archive_units = state.archives.len(),
            certified = certifier.is_configured(),
            "Opening ledger"
        );

        let handle = spawn_ledger_actor(
            state,
            certifier,
            provisioner.clone(),
            config.mailbox_capacity,
        )?;

        Ok(Self {
            handle,
            provisioner,
            local_certifier,
            config,
        })
    }

    /// Open a ledger from bytes produced by [`Ledger::export_state_bytes`]
    pub async fn restore(
        config: Config,
        provisioner: Arc<dyn UnitProvisioner>,
        bytes: &[u8],
    ) -> Result<Self> {
        let state = LedgerState::decode(bytes, &config.owner)?;
        Self::open_with_state(config, provisioner, state).await
    }

    /// Append a record, returning its index
    pub async fn append(&self, record: Value, extra: Option<Value>) -> Result<u64> {
        self.handle.append(record, extra).await
    }

    /// Plan a range query
    pub async fn get_range(&self, ranges: Vec<BlockRange>) -> Result<GetBlocksResult> {
        self.handle.get_range(ranges).await
    }

    /// Fetch a range, following delegations to archive units
    ///
    /// Returns blocks in index order. Follow-up reads go to each unit in turn.
    pub async fn resolve_range(&self, ranges: Vec<BlockRange>) -> Result<Vec<BlockWithId>> {
        let result = self.handle.get_range(ranges).await?;
        let mut blocks = result.blocks;

        for delegation in &result.archived_blocks {
            let unit = self.provisioner.unit(&delegation.unit).ok_or_else(|| {
                Error::Other(format!("archive unit {} is unreachable", delegation.unit))
            })?;
            let archived = unit.get_range(&delegation.ranges).await?;
            tracing::debug!(
                unit = %delegation.unit,
                requested = delegation.length,
                received = archived.len(),
                "Resolved archived blocks"
            );
            blocks.extend(archived);
        }

        blocks.sort_by_key(|b| b.id);
        Ok(blocks)
    }

    /// List archive units ordered by start
    ///
    /// With `from`, the listing starts at that unit and includes it; an
    /// unknown unit yields an empty list. Each `end` is exclusive, so
    /// consecutive units satisfy `a.end == b.start`.
    pub async fn get_archive_units(&self, from: Option<UnitId>) -> Result<Vec<ArchiveInfo>> {
        self.handle.get_archive_units(from).await
    }

    /// Tip certificate, `None` when uncertified
    pub async fn get_tip_certificate(&self) -> Result<Option<TipCertificate>> {
        self.handle.get_tip_certificate().await
    }

    /// Tip leaves plus witness; fails when no certificate store is configured
    pub async fn get_tip(&self) -> Result<Tip> {
        self.handle.get_tip().await
    }

    /// Declared block types
    pub async fn list_supported_block_types(&self) -> Result<Vec<BlockTypeDescriptor>> {
        self.handle.list_block_types().await
    }

    /// Replace declared block types
    pub async fn update_supported_block_types(
        &self,
        block_types: Vec<BlockTypeDescriptor>,
    ) -> Result<()> {
        self.handle.update_block_types(block_types).await
    }

    /// Apply settings; one flag per entry telling whether it was applied
    pub async fn update_settings(&self, settings: Vec<Setting>) -> Result<Vec<bool>> {
        self.handle.update_settings(settings).await
    }

    /// Add or replace a "record added" listener
    pub async fn register_listener(
        &self,
        name: impl Into<String>,
        listener: Listener,
    ) -> Result<bool> {
        self.handle.register_listener(name.into(), listener).await
    }

    /// Remove a listener
    pub async fn remove_listener(&self, name: impl Into<String>) -> Result<bool> {
        self.handle.remove_listener(name.into()).await
    }

    /// Attach a certificate store
    pub async fn configure_certification(&self, store: Arc<dyn CertificateStore>) -> Result<()> {
        self.handle.configure_certification(store).await
    }

    /// Local certificate store created from config, if any
    pub fn local_certifier(&self) -> Option<&Arc<LocalCertifier>> {
        self.local_certifier.as_ref()
    }

    /// Snapshot of the persisted state
    pub async fn export_state(&self) -> Result<LedgerState> {
        self.handle.export_state().await
    }

    /// Snapshot encoded for storage
    pub async fn export_state_bytes(&self) -> Result<Vec<u8>> {
        self.export_state().await?.encode()
    }

    /// Latest migration status
    pub fn migration_status(&self) -> MigrationStatus {
        self.handle.migration_status()
    }

    /// Wait until no migration pass is running or queued
    pub async fn wait_idle(&self) -> Result<()> {
        self.handle.wait_idle().await
    }

    /// Engine metrics
    pub fn metrics(&self) -> &Metrics {
        self.handle.metrics()
    }

    /// Get configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Get actor handle
    pub fn handle(&self) -> &LedgerHandle {
        &self.handle
    }

    /// Shutdown ledger
    pub async fn shutdown(&self) -> Result<()> {
        self.handle.shutdown().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::{ArchiveUnit, MemoryProvisioner};
    use crate::config::Settings;

    fn config(max: u64, settle: u64, per_unit: u64) -> Config {
        Config {
            settings: Settings {
                max_active_records: max,
                settle_to_records: settle,
                max_records_in_archive_instance: per_unit,
                max_records_to_archive: 1000,
                archive_funding: 10,
                ..Settings::default()
            },
            ..Config::default()
        }
    }

    #[tokio::test]
    async fn test_open_grants_owner_control() {
        let provisioner = Arc::new(MemoryProvisioner::new(100));
        let ledger = Ledger::open(config(2, 1, 10), provisioner.clone())
            .await
            .unwrap();

        for i in 0..3 {
            ledger.append(Value::Nat(i), None).await.unwrap();
        }
        ledger.wait_idle().await.unwrap();

        let unit = provisioner.units()[0].id();
        assert_eq!(
            provisioner.controllers_of(&unit),
            vec![ledger.config().owner.clone()]
        );
    }

    #[tokio::test]
    async fn test_resolve_range_across_units() {
        let provisioner = Arc::new(MemoryProvisioner::new(1000));
        let ledger = Ledger::open(config(4, 2, 3), provisioner).await.unwrap();

        for i in 0..12 {
            ledger.append(Value::Nat(i), None).await.unwrap();
            ledger.wait_idle().await.unwrap();
        }
        assert!(ledger.get_archive_units(None).await.unwrap().len() > 1);

        let blocks = ledger.resolve_range(vec![BlockRange::new(0, 12)]).await.unwrap();
        let ids: Vec<u64> = blocks.iter().map(|b| b.id).collect();
        assert_eq!(ids, (0..12).collect::<Vec<_>>());
        for b in &blocks {
            assert_eq!(b.block.get("tx"), Some(&Value::Nat(b.id)));
        }
    }

    #[tokio::test]
    async fn test_export_and_restore() {
        let provisioner = Arc::new(MemoryProvisioner::new(100));
        let ledger = Ledger::open(config(4, 2, 10), provisioner.clone())
            .await
            .unwrap();
        for i in 0..6 {
            ledger.append(Value::Nat(i), None).await.unwrap();
        }
        ledger.wait_idle().await.unwrap();
        let bytes = ledger.export_state_bytes().await.unwrap();
        ledger.shutdown().await.unwrap();

        let restored = Ledger::restore(config(4, 2, 10), provisioner, &bytes)
            .await
            .unwrap();
        assert_eq!(restored.append(Value::Nat(6), None).await.unwrap(), 6);

        let blocks = restored
            .resolve_range(vec![BlockRange::new(0, 7)])
            .await
            .unwrap();
        assert_eq!(blocks.len(), 7);
    }

    #[tokio::test]
    async fn test_certification_from_config() {
        let mut cfg = config(4, 2, 10);
        cfg.certification.enabled = true;
        cfg.certification.signing_seed = Some(vec![5u8; 32]);

        let ledger = Ledger::open(cfg, Arc::new(MemoryProvisioner::new(100)))
            .await
            .unwrap();
        ledger.append(Value::Nat(1), None).await.unwrap();

        let cert = ledger.get_tip_certificate().await.unwrap().unwrap();
        let public_key = ledger.local_certifier().unwrap().public_key();
        assert!(crate::certification::verify_certificate(&cert.certificate, &public_key).is_ok());
    }
}
