//! Configuration for the ledger

use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// Ledger configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Service name
    pub service_name: String,

    /// Service version
    pub service_version: String,

    /// Identity granted control over the engine and its archive units
    pub owner: String,

    /// Actor mailbox capacity
    pub mailbox_capacity: usize,

    /// Archiving settings
    pub settings: Settings,

    /// Certification configuration
    pub certification: CertificationConfig,

    /// In-process provisioner configuration (used by the server binary)
    pub provisioner: ProvisionerConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            service_name: "ledger-engine".to_string(),
            service_version: env!("CARGO_PKG_VERSION").to_string(),
            owner: "ledger-operator".to_string(),
            mailbox_capacity: 1000,
            settings: Settings::default(),
            certification: CertificationConfig::default(),
            provisioner: ProvisionerConfig::default(),
        }
    }
}

/// Archiving settings, changeable at runtime via [`Setting`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    /// High-water mark: live length that triggers migration
    pub max_active_records: u64,

    /// Live length to migrate down to
    pub settle_to_records: u64,

    /// Capacity of a single archive unit
    pub max_records_in_archive_instance: u64,

    /// Cap on the number of blocks moved by one pass
    pub max_records_to_archive: u64,

    /// Budget handed to each newly provisioned unit
    pub archive_funding: u64,

    /// Delay before a follow-up pass when one pass could not settle the log
    pub migration_retry_delay_ms: u64,

    /// Identities granted control over archive units
    #[serde(default)]
    pub controllers: Vec<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            max_active_records: 2000,
            settle_to_records: 1000,
            max_records_in_archive_instance: 1_000_000,
            max_records_to_archive: 1000,
            archive_funding: 2_000_000_000_000,
            migration_retry_delay_ms: 0,
            controllers: Vec::new(),
        }
    }
}

impl Settings {
    /// Reject combinations that would make migration ill-defined
    pub fn validate(&self) -> Result<()> {
        if self.settle_to_records > self.max_active_records {
            return Err(Error::Config(format!(
                "settle_to_records ({}) exceeds max_active_records ({})",
                self.settle_to_records, self.max_active_records
            )));
        }
        if self.max_records_in_archive_instance == 0 {
            return Err(Error::Config(
                "max_records_in_archive_instance must be positive".to_string(),
            ));
        }
        if self.max_records_to_archive == 0 {
            return Err(Error::Config(
                "max_records_to_archive must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Apply one setting if the result stays valid. Returns whether it was applied.
    pub fn apply(&mut self, setting: Setting) -> bool {
        let mut next = self.clone();
        match setting {
            Setting::MaxActiveRecords(v) => next.max_active_records = v,
            Setting::SettleToRecords(v) => next.settle_to_records = v,
            Setting::MaxRecordsInArchiveInstance(v) => next.max_records_in_archive_instance = v,
            Setting::MaxRecordsToArchive(v) => next.max_records_to_archive = v,
            Setting::ArchiveFunding(v) => next.archive_funding = v,
            Setting::MigrationRetryDelayMs(v) => next.migration_retry_delay_ms = v,
            Setting::Controllers(v) => next.controllers = v,
        }

        match next.validate() {
            Ok(()) => {
                *self = next;
                true
            }
            Err(e) => {
                tracing::warn!(error = %e, "Setting rejected");
                false
            }
        }
    }
}

/// A single runtime settings change
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Setting {
    /// Set the high-water mark
    MaxActiveRecords(u64),
    /// Set the settle target
    SettleToRecords(u64),
    /// Set per-unit capacity
    MaxRecordsInArchiveInstance(u64),
    /// Set the per-pass batch cap
    MaxRecordsToArchive(u64),
    /// Set funding for new units
    ArchiveFunding(u64),
    /// Set the follow-up pass delay
    MigrationRetryDelayMs(u64),
    /// Replace archive unit controllers
    Controllers(Vec<String>),
}

/// Certification configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CertificationConfig {
    /// Attach a local certificate store at startup
    pub enabled: bool,

    /// Ed25519 seed for the local certifier (random when absent)
    pub signing_seed: Option<Vec<u8>>,
}

impl CertificationConfig {
    /// Seed as a fixed-size array
    pub fn seed(&self) -> Result<Option<[u8; 32]>> {
        self.signing_seed
            .as_deref()
            .map(|bytes| {
                bytes.try_into().map_err(|_| {
                    Error::Config(format!(
                        "signing_seed must be 32 bytes, got {}",
                        bytes.len()
                    ))
                })
            })
            .transpose()
    }
}

/// In-process provisioner configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvisionerConfig {
    /// Total budget available for funding archive units
    pub budget: u64,
}

impl Default for ProvisionerConfig {
    fn default() -> Self {
        Self {
            budget: 100_000_000_000_000,
        }
    }
}

impl Config {
    /// Load from file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("Failed to parse config: {}", e)))?;
        config.settings.validate()?;
        Ok(config)
    }

    /// Load from environment variables
    pub fn from_env() -> Result<Self> {
        let mut config = Config::default();

        if let Ok(owner) = std::env::var("LEDGER_OWNER") {
            config.owner = owner;
        }

        if let Some(v) = env_u64("LEDGER_MAX_ACTIVE_RECORDS")? {
            config.settings.max_active_records = v;
        }

        if let Some(v) = env_u64("LEDGER_SETTLE_TO_RECORDS")? {
            config.settings.settle_to_records = v;
        }

        if let Some(v) = env_u64("LEDGER_MAX_RECORDS_IN_ARCHIVE_INSTANCE")? {
            config.settings.max_records_in_archive_instance = v;
        }

        if let Some(v) = env_u64("LEDGER_MAX_RECORDS_TO_ARCHIVE")? {
            config.settings.max_records_to_archive = v;
        }

        if let Some(v) = env_u64("LEDGER_PROVISIONER_BUDGET")? {
            config.provisioner.budget = v;
        }

        if let Ok(flag) = std::env::var("LEDGER_CERTIFICATION") {
            config.certification.enabled = matches!(flag.as_str(), "1" | "true" | "yes");
        }

        config.settings.validate()?;
        Ok(config)
    }
}

fn env_u64(name: &str) -> Result<Option<u64>> {
    match std::env::var(name) {
        Ok(raw) => raw
            .parse()
            .map(Some)
            .map_err(|e| Error::Config(format!("{} is not a number: {}", name, e))),
        Err(_) => Ok(None),
    }
}
