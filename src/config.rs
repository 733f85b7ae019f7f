use crate::error::Result;
use crate::reload::ReloadEvent;
use config::{Config, ConfigError, Environment, File};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Section id of [`GeneralConfig`]
pub const SECTION_GENERAL: &str = "general";
/// Section id of [`DataDbConfig`]
pub const SECTION_DATA_DB: &str = "data_db";
/// Section id of [`CachesConfig`]
pub const SECTION_CACHES: &str = "caches";
/// Section id of [`FiltersConfig`]
pub const SECTION_FILTERS: &str = "filters";
/// Section id of [`ChargersConfig`]
pub const SECTION_CHARGERS: &str = "chargers";

const SUPPORTED_DB_TYPES: &[&str] = &["internal", "redis", "mongo"];

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ChargeflowConfig {
    pub general: GeneralConfig,
    pub data_db: DataDbConfig,
    pub caches: CachesConfig,
    pub filters: FiltersConfig,
    pub chargers: ChargersConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct GeneralConfig {
    /// Identifier of this node in logs and status reports
    #[serde(default = "default_node_id")]
    pub node_id: String,

    /// Upper bound for every dependency wait during startup
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    /// Total wall-clock budget for shutting every service down
    #[serde(default = "default_shutdown_timeout_ms")]
    pub shutdown_timeout_ms: u64,

    /// Capacity of the reload event channel
    #[serde(default = "default_reload_channel_capacity")]
    pub reload_channel_capacity: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct DataDbConfig {
    /// Storage backend (internal, redis, mongo)
    #[serde(default = "default_db_type")]
    pub db_type: String,

    #[serde(default = "default_db_host")]
    pub host: String,

    #[serde(default = "default_db_port")]
    pub port: u16,

    #[serde(default = "default_db_name")]
    pub name: String,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct CachesConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Cache partitions preloaded on start, each announced as its own state
    #[serde(default = "default_cache_partitions")]
    pub partitions: Vec<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct FiltersConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Use filter indexes when selecting profiles
    #[serde(default = "default_indexed_selects")]
    pub indexed_selects: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ChargersConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Connections towards the attribute subsystem
    #[serde(default)]
    pub attributes_conns: Vec<String>,
}

impl GeneralConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }
}

impl DataDbConfig {
    /// Connection address of the configured backend
    pub fn address(&self) -> String {
        format!("{}://{}:{}/{}", self.db_type, self.host, self.port, self.name)
    }
}

impl ChargeflowConfig {
    /// Load configuration from default sources (file + environment variables)
    pub fn load() -> std::result::Result<Self, ConfigError> {
        Self::load_from_file("chargeflow.toml")
    }

    /// Load configuration from a specific file path
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> std::result::Result<Self, ConfigError> {
        let path_str = path.as_ref().to_string_lossy();
        debug!("Loading configuration from: {}", path_str);

        let settings = Config::builder()
            .set_default("general.node_id", default_node_id())?
            .set_default("general.connect_timeout_ms", default_connect_timeout_ms())?
            .set_default("general.shutdown_timeout_ms", default_shutdown_timeout_ms())?
            .set_default(
                "general.reload_channel_capacity",
                default_reload_channel_capacity() as i64,
            )?
            .set_default("data_db.db_type", default_db_type())?
            .set_default("data_db.host", default_db_host())?
            .set_default("data_db.port", default_db_port())?
            .set_default("data_db.name", default_db_name())?
            .set_default("caches.enabled", default_enabled())?
            .set_default("caches.partitions", default_cache_partitions())?
            .set_default("filters.enabled", default_enabled())?
            .set_default("filters.indexed_selects", default_indexed_selects())?
            .set_default("chargers.enabled", default_enabled())?
            .set_default("chargers.attributes_conns", Vec::<String>::new())?
            .add_source(File::with_name(&path_str).required(false))
            // e.g. CHARGEFLOW_CHARGERS__ENABLED=false
            .add_source(
                Environment::with_prefix("CHARGEFLOW")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?;

        let config: ChargeflowConfig = settings.try_deserialize()?;

        info!("Configuration loaded successfully");
        debug!("Final configuration: {:#?}", config);

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        if self.general.node_id.trim().is_empty() {
            return Err(ConfigError::Message(
                "General node_id must not be empty".to_string(),
            ));
        }

        if self.general.connect_timeout_ms == 0 {
            return Err(ConfigError::Message(
                "General connect_timeout_ms must be greater than 0".to_string(),
            ));
        }

        if self.general.shutdown_timeout_ms == 0 {
            return Err(ConfigError::Message(
                "General shutdown_timeout_ms must be greater than 0".to_string(),
            ));
        }

        if self.general.reload_channel_capacity == 0 {
            return Err(ConfigError::Message(
                "General reload_channel_capacity must be greater than 0".to_string(),
            ));
        }

        if !SUPPORTED_DB_TYPES.contains(&self.data_db.db_type.as_str()) {
            return Err(ConfigError::Message(format!(
                "Unsupported data_db db_type '{}', expected one of: {}",
                self.data_db.db_type,
                SUPPORTED_DB_TYPES.join(", ")
            )));
        }

        Ok(())
    }

    /// Ids of the sections whose values differ between `self` and `other`
    pub fn changed_sections(&self, other: &ChargeflowConfig) -> Vec<&'static str> {
        let mut changed = Vec::new();
        if self.general != other.general {
            changed.push(SECTION_GENERAL);
        }
        if self.data_db != other.data_db {
            changed.push(SECTION_DATA_DB);
        }
        if self.caches != other.caches {
            changed.push(SECTION_CACHES);
        }
        if self.filters != other.filters {
            changed.push(SECTION_FILTERS);
        }
        if self.chargers != other.chargers {
            changed.push(SECTION_CHARGERS);
        }
        changed
    }
}

impl Default for ChargeflowConfig {
    fn default() -> Self {
        Self {
            general: GeneralConfig {
                node_id: default_node_id(),
                connect_timeout_ms: default_connect_timeout_ms(),
                shutdown_timeout_ms: default_shutdown_timeout_ms(),
                reload_channel_capacity: default_reload_channel_capacity(),
            },
            data_db: DataDbConfig {
                db_type: default_db_type(),
                host: default_db_host(),
                port: default_db_port(),
                name: default_db_name(),
            },
            caches: CachesConfig {
                enabled: default_enabled(),
                partitions: default_cache_partitions(),
            },
            filters: FiltersConfig {
                enabled: default_enabled(),
                indexed_selects: default_indexed_selects(),
            },
            chargers: ChargersConfig {
                enabled: default_enabled(),
                attributes_conns: Vec::new(),
            },
        }
    }
}

/// Live configuration shared by the manager and every service.
///
/// Readers get a cheap snapshot; writers swap the whole config atomically and
/// announce the changed sections on the reload channel.
pub struct ConfigStore {
    current: RwLock<Arc<ChargeflowConfig>>,
    reload_sender: Option<mpsc::Sender<ReloadEvent>>,
}

impl ConfigStore {
    /// Create a store that does not announce changes
    pub fn new(config: ChargeflowConfig) -> Self {
        Self {
            current: RwLock::new(Arc::new(config)),
            reload_sender: None,
        }
    }

    /// Create a store that sends one [`ReloadEvent`] per changed section
    pub fn with_reload_sender(config: ChargeflowConfig, sender: mpsc::Sender<ReloadEvent>) -> Self {
        Self {
            current: RwLock::new(Arc::new(config)),
            reload_sender: Some(sender),
        }
    }

    /// Snapshot of the live configuration
    pub fn current(&self) -> Arc<ChargeflowConfig> {
        Arc::clone(&self.current.read())
    }

    /// Swap in a new configuration and return the changed section ids
    pub fn replace(&self, config: ChargeflowConfig) -> Vec<&'static str> {
        let mut current = self.current.write();
        let changed = current.changed_sections(&config);
        *current = Arc::new(config);
        changed
    }

    /// Apply `update` to a copy of the live configuration, swap it in and
    /// announce the changed sections.
    pub async fn update<F>(&self, update: F) -> Result<Vec<&'static str>>
    where
        F: FnOnce(&mut ChargeflowConfig),
    {
        let mut next = (*self.current()).clone();
        update(&mut next);
        next.validate()?;

        let changed = self.replace(next);
        self.announce(&changed).await;
        Ok(changed)
    }

    /// Re-read `path`, swap the result in and announce the changed sections
    pub async fn reload_from_file<P: AsRef<Path>>(&self, path: P) -> Result<Vec<&'static str>> {
        let next = ChargeflowConfig::load_from_file(path)?;
        next.validate()?;

        let changed = self.replace(next);
        if changed.is_empty() {
            info!("Configuration reloaded, no sections changed");
        } else {
            info!("Configuration reloaded, changed sections: {:?}", changed);
        }
        self.announce(&changed).await;
        Ok(changed)
    }

    async fn announce(&self, sections: &[&'static str]) {
        let Some(sender) = &self.reload_sender else {
            return;
        };

        for section in sections {
            if sender.send(ReloadEvent::new(*section)).await.is_err() {
                warn!("Reload channel closed, dropping event for section {}", section);
                return;
            }
        }
    }
}

// Default value functions
fn default_node_id() -> String {
    "chargeflow-1".to_string()
}
fn default_connect_timeout_ms() -> u64 {
    3000
}
fn default_shutdown_timeout_ms() -> u64 {
    10000
}
fn default_reload_channel_capacity() -> usize {
    64
}

fn default_db_type() -> String {
    "internal".to_string()
}
fn default_db_host() -> String {
    "127.0.0.1".to_string()
}
fn default_db_port() -> u16 {
    6379
}
fn default_db_name() -> String {
    "10".to_string()
}

fn default_enabled() -> bool {
    true
}
fn default_cache_partitions() -> Vec<String> {
    vec![
        "destinations".to_string(),
        "rating_plans".to_string(),
        "filter_indexes".to_string(),
    ]
}
fn default_indexed_selects() -> bool {
    true
}
