//! Configuration management for stakeflow.
//!
//! # Configuration Sources
//!
//! Configuration can be loaded from:
//! - A JSON file (`from_json_file`)
//! - Environment variables (prefixed with `STAKEFLOW_`)
//! - Programmatic defaults
//!
//! # Example
//!
//! ```rust,ignore
//! use stakeflow_core::config::StakeflowConfig;
//!
//! let config = StakeflowConfig::builder()
//!     .rpc_url("http://127.0.0.1:8545")
//!     .chain_id(80002)
//!     .build()?;
//! ```

use crate::amount::AmountCodec;
use crate::gateway::{NetworkConfig, NetworkRegistry};
use crate::{PoolClass, Result, StakeflowError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Polygon Amoy testnet.
pub const DEFAULT_CHAIN_ID: u64 = 80002;

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Complete stakeflow configuration.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StakeflowConfig {
    /// JSON-RPC endpoint and receipt polling.
    pub rpc: RpcConfig,

    /// Active network and pool selection.
    pub network: NetworkSelection,

    /// Static table of known networks.
    pub networks: Vec<NetworkConfig>,

    /// Local persisted state.
    pub storage: StorageConfig,

    /// Countdown ticking.
    pub countdown: CountdownConfig,

    /// Logging configuration.
    pub logging: LoggingConfig,

    /// What happens after a confirmed stake, unstake or claim.
    pub post_action: PostActionConfig,
}

impl StakeflowConfig {
    /// Create a new configuration builder.
    pub fn builder() -> StakeflowConfigBuilder {
        StakeflowConfigBuilder::default()
    }

    /// Load configuration from environment variables over defaults.
    ///
    /// Looks for variables prefixed with `STAKEFLOW_`:
    /// - `STAKEFLOW_RPC_URL` - JSON-RPC endpoint
    /// - `STAKEFLOW_CHAIN_ID` - Active chain id
    /// - `STAKEFLOW_STORAGE_DIR` - Directory for the transaction ledger and user cache
    /// - `STAKEFLOW_LOG_LEVEL` - Logging level (trace, debug, info, warn, error)
    /// - `STAKEFLOW_RESULTS_URL` - Results page announced after a confirmed action
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Load a JSON configuration file. Missing sections take their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            StakeflowError::ConfigError(format!("cannot read {}: {e}", path.display()))
        })?;
        let config: Self = serde_json::from_str(&raw).map_err(|e| {
            StakeflowError::ConfigError(format!("invalid config {}: {e}", path.display()))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Overlay `STAKEFLOW_*` values obtained through `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("STAKEFLOW_RPC_URL") {
            self.rpc.url = url;
        }

        if let Some(chain_id) = lookup("STAKEFLOW_CHAIN_ID") {
            self.network.chain_id = chain_id.parse().map_err(|e| {
                StakeflowError::ConfigError(format!("Invalid STAKEFLOW_CHAIN_ID: {}", e))
            })?;
        }

        if let Some(dir) = lookup("STAKEFLOW_STORAGE_DIR") {
            self.storage.dir = Some(PathBuf::from(dir));
        }

        if let Some(level) = lookup("STAKEFLOW_LOG_LEVEL") {
            self.logging.level = level;
        }

        if let Some(url) = lookup("STAKEFLOW_RESULTS_URL") {
            self.post_action.results_url = Some(url);
        }

        Ok(())
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<()> {
        if self.rpc.url.trim().is_empty() {
            return Err(StakeflowError::ConfigError("rpc.url must not be empty".into()));
        }

        if self.rpc.timeout_ms == 0 {
            return Err(StakeflowError::ConfigError(
                "rpc.timeout_ms must be greater than 0".into(),
            ));
        }

        if self.rpc.receipt_poll_interval_ms == 0
            || self.rpc.receipt_poll_interval_ms > self.rpc.receipt_timeout_ms
        {
            return Err(StakeflowError::ConfigError(
                "rpc.receipt_poll_interval_ms must be between 1 and rpc.receipt_timeout_ms".into(),
            ));
        }

        if self.countdown.tick_ms == 0 {
            return Err(StakeflowError::ConfigError(
                "countdown.tick_ms must be greater than 0".into(),
            ));
        }

        if !LOG_LEVELS.contains(&self.logging.level.to_ascii_lowercase().as_str()) {
            return Err(StakeflowError::ConfigError(format!(
                "logging.level must be one of {}",
                LOG_LEVELS.join(", ")
            )));
        }

        for network in &self.networks {
            if network.name.trim().is_empty() {
                return Err(StakeflowError::ConfigError(format!(
                    "network {} has an empty name",
                    network.chain_id
                )));
            }
            AmountCodec::new(network.token.decimals)?;
        }
        self.registry()?;

        Ok(())
    }

    /// Network table keyed by chain id.
    pub fn registry(&self) -> Result<NetworkRegistry> {
        NetworkRegistry::new(self.networks.iter().cloned())
    }
}

/// JSON-RPC configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RpcConfig {
    /// Node endpoint. Accounts are managed by the node.
    pub url: String,

    /// Per-request timeout in milliseconds.
    pub timeout_ms: u64,

    /// Delay between `eth_getTransactionReceipt` polls.
    pub receipt_poll_interval_ms: u64,

    /// Give up waiting for a receipt after this long.
    pub receipt_timeout_ms: u64,
}

impl RpcConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn receipt_poll_interval(&self) -> Duration {
        Duration::from_millis(self.receipt_poll_interval_ms)
    }

    pub fn receipt_timeout(&self) -> Duration {
        Duration::from_millis(self.receipt_timeout_ms)
    }
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:8545".into(),
            timeout_ms: 30_000,
            receipt_poll_interval_ms: 2_000,
            receipt_timeout_ms: 300_000, // 5 minutes
        }
    }
}

/// Active network selection.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkSelection {
    pub chain_id: u64,

    /// Pool used when none is given on the command line.
    pub default_pool: PoolClass,
}

impl Default for NetworkSelection {
    fn default() -> Self {
        Self {
            chain_id: DEFAULT_CHAIN_ID,
            default_pool: PoolClass::SevenDays,
        }
    }
}

/// Local persisted state.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory holding one JSON document per key. `None` uses the platform data dir.
    pub dir: Option<PathBuf>,
}

/// Countdown configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CountdownConfig {
    /// Tick period in milliseconds.
    pub tick_ms: u64,
}

impl CountdownConfig {
    pub fn period(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }
}

impl Default for CountdownConfig {
    fn default() -> Self {
        Self { tick_ms: 1_000 }
    }
}

/// Logging configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    pub level: String,

    /// JSON output format.
    pub json_output: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            json_output: false,
        }
    }
}

/// Post-confirmation behaviour.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PostActionConfig {
    /// Results page announced after a confirmed stake, unstake or claim.
    pub results_url: Option<String>,
}

/// Builder for StakeflowConfig.
#[derive(Default)]
pub struct StakeflowConfigBuilder {
    config: StakeflowConfig,
}

impl StakeflowConfigBuilder {
    /// Set the JSON-RPC endpoint.
    pub fn rpc_url(mut self, url: impl Into<String>) -> Self {
        self.config.rpc.url = url.into();
        self
    }

    /// Set the per-request timeout.
    pub fn rpc_timeout(mut self, timeout: Duration) -> Self {
        self.config.rpc.timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Set the active chain id.
    pub fn chain_id(mut self, chain_id: u64) -> Self {
        self.config.network.chain_id = chain_id;
        self
    }

    /// Set the default pool.
    pub fn default_pool(mut self, pool: PoolClass) -> Self {
        self.config.network.default_pool = pool;
        self
    }

    /// Add a network table entry.
    pub fn network(mut self, network: NetworkConfig) -> Self {
        self.config.networks.push(network);
        self
    }

    /// Set the storage directory.
    pub fn storage_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.storage.dir = Some(dir.into());
        self
    }

    /// Set the countdown tick period.
    pub fn countdown_tick(mut self, period: Duration) -> Self {
        self.config.countdown.tick_ms = period.as_millis() as u64;
        self
    }

    /// Set log level.
    pub fn log_level(mut self, level: impl Into<String>) -> Self {
        self.config.logging.level = level.into();
        self
    }

    /// Enable JSON log output.
    pub fn json_logs(mut self, enabled: bool) -> Self {
        self.config.logging.json_output = enabled;
        self
    }

    /// Set the results page announced after confirmation.
    pub fn results_url(mut self, url: impl Into<String>) -> Self {
        self.config.post_action.results_url = Some(url.into());
        self
    }

    /// Build and validate the configuration.
    pub fn build(self) -> Result<StakeflowConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::TokenConfig;
    use crate::Address;
    use std::collections::{BTreeMap, HashMap};

    fn amoy() -> NetworkConfig {
        NetworkConfig {
            chain_id: DEFAULT_CHAIN_ID,
            name: "Polygon Amoy".into(),
            token: TokenConfig {
                address: Address([0xaa; 20]),
                symbol: "STK".into(),
                decimals: 18,
            },
            pools: BTreeMap::from([(PoolClass::SevenDays, Address([0x07; 20]))]),
        }
    }

    #[test]
    fn default_config_is_valid() {
        let config = StakeflowConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.network.chain_id, 80002);
        assert!(config.networks.is_empty());
        assert_eq!(config.countdown.period(), Duration::from_secs(1));
    }

    #[test]
    fn builder_creates_valid_config() {
        let config = StakeflowConfig::builder()
            .rpc_url("https://rpc-amoy.polygon.technology")
            .network(amoy())
            .default_pool(PoolClass::ThirtyDays)
            .log_level("debug")
            .results_url("https://127.0.0.1:5500/analytic.html")
            .build()
            .expect("should build");

        assert_eq!(config.network.default_pool, PoolClass::ThirtyDays);
        assert_eq!(config.registry().unwrap().len(), 1);
        assert_eq!(
            config.post_action.results_url.as_deref(),
            Some("https://127.0.0.1:5500/analytic.html")
        );
    }

    #[test]
    fn duplicate_networks_rejected() {
        let result = StakeflowConfig::builder()
            .network(amoy())
            .network(amoy())
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn invalid_values_rejected() {
        assert!(StakeflowConfig::builder().rpc_url(" ").build().is_err());
        assert!(StakeflowConfig::builder().log_level("loud").build().is_err());
        assert!(StakeflowConfig::builder()
            .countdown_tick(Duration::ZERO)
            .build()
            .is_err());
        assert!(StakeflowConfig::builder()
            .rpc_timeout(Duration::ZERO)
            .build()
            .is_err());
    }

    #[test]
    fn env_overrides_apply() {
        let vars = HashMap::from([
            ("STAKEFLOW_RPC_URL", "http://localhost:9545"),
            ("STAKEFLOW_CHAIN_ID", "31337"),
            ("STAKEFLOW_STORAGE_DIR", "/tmp/stakeflow"),
            ("STAKEFLOW_LOG_LEVEL", "warn"),
        ]);
        let mut config = StakeflowConfig::default();
        config
            .apply_env(|key| vars.get(key).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.rpc.url, "http://localhost:9545");
        assert_eq!(config.network.chain_id, 31337);
        assert_eq!(config.storage.dir, Some(PathBuf::from("/tmp/stakeflow")));
        assert_eq!(config.logging.level, "warn");
    }

    #[test]
    fn bad_chain_id_env_rejected() {
        let mut config = StakeflowConfig::default();
        let result = config.apply_env(|key| (key == "STAKEFLOW_CHAIN_ID").then(|| "amoy".to_string()));
        assert!(matches!(result, Err(StakeflowError::ConfigError(_))));
    }

    #[test]
    fn partial_json_file_takes_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{"network": {"chain_id": 80002, "default_pool": "sevenDays"}, "logging": {"level": "debug"}}"#,
        )
        .unwrap();

        let config = StakeflowConfig::from_json_file(&path).unwrap();
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.rpc, RpcConfig::default());
    }
}
