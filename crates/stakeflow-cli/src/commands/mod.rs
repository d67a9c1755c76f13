//! CLI command implementations

pub mod accounts;
pub mod actions;
pub mod countdown;
pub mod history;
pub mod overview;

use anyhow::{Context, Result};
use stakeflow_adapters::{FileStore, JsonRpcTransport};
use stakeflow_core::flows::StakingClient;
use stakeflow_core::gateway::ContractGateway;
use stakeflow_core::ledger::{KeyValueStore, TransactionLedger, UserPositionCache};
use stakeflow_core::notify::{FnEffect, Notifier};
use stakeflow_core::orchestrator::TransactionOrchestrator;
use stakeflow_core::reader::ContractReader;
use stakeflow_core::session::WalletSession;
use stakeflow_core::{Address, ChainTransport, PoolClass, StakeflowConfig, TransactionRecord};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::warn;

/// Options shared by every subcommand.
#[derive(Clone, Debug, Default)]
pub struct Globals {
    pub config: Option<PathBuf>,
    pub rpc_url: Option<String>,
    pub from: Option<Address>,
    pub pool: Option<PoolClass>,
}

fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("stakeflow")
        .join("config.json")
}

/// Load config from file (or defaults), then `STAKEFLOW_*` variables, then flags.
pub fn load_config(globals: &Globals) -> Result<StakeflowConfig> {
    let path = globals.config.clone().unwrap_or_else(default_config_path);

    let mut config = if path.exists() {
        StakeflowConfig::from_json_file(&path)
            .with_context(|| format!("Failed to load config {}", path.display()))?
    } else if globals.config.is_some() {
        anyhow::bail!("Config file not found: {}", path.display());
    } else {
        StakeflowConfig::default()
    };

    config.apply_env(|key| std::env::var(key).ok())?;
    if let Some(url) = &globals.rpc_url {
        config.rpc.url = url.clone();
    }
    config.validate()?;

    Ok(config)
}

fn storage_dir(config: &StakeflowConfig) -> PathBuf {
    config.storage.dir.clone().unwrap_or_else(|| {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("stakeflow")
    })
}

pub fn runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")
}

/// Prints notifications as they would appear in a toast.
pub struct ConsoleNotifier;

impl Notifier for ConsoleNotifier {
    fn success(&self, message: &str) {
        println!("✅ {message}");
    }

    fn error(&self, message: &str) {
        eprintln!("❌ {message}");
    }
}

/// Everything a command needs, wired from config.
pub struct App {
    pub config: StakeflowConfig,
    pub transport: Arc<dyn ChainTransport>,
    pub store: Arc<dyn KeyValueStore>,
}

impl App {
    pub fn new(config: StakeflowConfig) -> Result<Self> {
        let transport =
            JsonRpcTransport::new(&config.rpc).context("Failed to create RPC transport")?;
        let dir = storage_dir(&config);
        let store = FileStore::new(&dir)
            .with_context(|| format!("Failed to open storage {}", dir.display()))?;

        Ok(Self {
            config,
            transport: Arc::new(transport),
            store: Arc::new(store),
        })
    }

    /// Ledger-only wiring; never touches the network.
    pub fn ledger_only(config: &StakeflowConfig) -> Result<TransactionLedger> {
        let dir = storage_dir(config);
        let store = FileStore::new(&dir)
            .with_context(|| format!("Failed to open storage {}", dir.display()))?;
        Ok(TransactionLedger::new(Arc::new(store)))
    }

    pub async fn session(&self, globals: &Globals) -> Result<WalletSession> {
        let pool = globals.pool.unwrap_or(self.config.network.default_pool);
        let session = WalletSession::connect(self.transport.as_ref(), globals.from, pool).await?;

        if session.chain_id() != self.config.network.chain_id {
            warn!(
                provider = session.chain_id(),
                configured = self.config.network.chain_id,
                "provider is on a different chain than configured"
            );
        }
        Ok(session)
    }

    pub fn gateway(&self, chain_id: u64) -> Result<ContractGateway> {
        Ok(ContractGateway::for_chain(&self.config.registry()?, chain_id)?)
    }

    pub fn reader(&self) -> ContractReader {
        ContractReader::new(self.transport.clone())
    }

    pub fn positions(&self) -> UserPositionCache {
        UserPositionCache::new(self.store.clone())
    }

    pub fn staking_client(&self, gateway: ContractGateway) -> StakingClient {
        let ledger = Arc::new(TransactionLedger::new(self.store.clone()));
        let results_url = self.config.post_action.results_url.clone();
        let effect = FnEffect(move |record: &TransactionRecord| {
            println!(
                "📒 Recorded {} in block {} (gas used {})",
                record.kind, record.block_number, record.gas_used
            );
            if let Some(url) = &results_url {
                println!("🔗 Results: {url}");
            }
        });
        let orchestrator = Arc::new(
            TransactionOrchestrator::new(self.transport.clone(), ledger)
                .with_effect(Arc::new(effect)),
        );

        StakingClient::new(gateway, self.reader(), orchestrator, Arc::new(ConsoleNotifier))
    }
}

/// Render unix seconds as a UTC timestamp.
pub fn format_timestamp(secs: u64) -> String {
    i64::try_from(secs)
        .ok()
        .and_then(|secs| chrono::DateTime::from_timestamp(secs, 0))
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| secs.to_string())
}

/// First and last few characters of a hex string.
pub fn short_hex(full: &str) -> String {
    if full.len() <= 14 {
        return full.to_string();
    }
    format!("{}…{}", &full[..8], &full[full.len() - 4..])
}
