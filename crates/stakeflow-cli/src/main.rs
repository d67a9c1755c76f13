//! Stakeflow CLI
//!
//! Command-line front end for token staking pools: read a pool overview, stake, unstake,
//! claim rewards, initialize a pool and inspect the local transaction history.

use anyhow::Result;
use clap::{Parser, Subcommand};
use stakeflow_core::{Address, PoolClass};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;

use commands::Globals;

/// Stakeflow: stake, unstake and claim against staking pools through a JSON-RPC node.
///
/// The node signs transactions for its own accounts; pick one with `--from`.
#[derive(Parser)]
#[command(name = "stakeflow")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file path
    #[arg(short, long, global = true, env = "STAKEFLOW_CONFIG")]
    config: Option<PathBuf>,

    /// JSON-RPC endpoint (overrides config)
    #[arg(long, global = true)]
    rpc_url: Option<String>,

    /// Account to act as (defaults to the node's first account)
    #[arg(long, global = true)]
    from: Option<Address>,

    /// Pool tier: sevenDays, fourteenDays, thirtyDays, ninetyDays
    #[arg(short, long, global = true)]
    pool: Option<PoolClass>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the accounts the node can sign for
    Accounts,

    /// Show pool figures and your position
    Overview {
        /// Output format (table, json)
        #[arg(short, long, default_value = "table")]
        format: String,
    },

    /// Stake tokens, approving the pool first if the allowance is short
    Stake {
        /// Amount in whole tokens, e.g. 12.5
        amount: String,
    },

    /// Withdraw staked tokens
    Unstake {
        /// Amount in whole tokens
        amount: String,
    },

    /// Claim accrued rewards
    Claim,

    /// Initialize a staking pool (owner only)
    Initialize {
        /// Contract owner address
        #[arg(long)]
        owner: Address,

        /// Staking token address
        #[arg(long)]
        token: Address,

        /// APY rate as the contract expects it
        #[arg(long)]
        apy_rate: u64,

        /// Minimum stake in whole tokens
        #[arg(long)]
        min_stake: String,

        /// Maximum stake in whole tokens
        #[arg(long)]
        max_stake: String,

        /// Staking start (unix seconds)
        #[arg(long)]
        start_date: u64,

        /// Staking end (unix seconds)
        #[arg(long)]
        end_date: u64,

        /// Lock duration as the contract expects it
        #[arg(long)]
        stake_days: u64,

        /// Early unstake fee in basis points
        #[arg(long)]
        early_unstake_fee: u64,
    },

    /// Show locally recorded transactions
    History {
        /// Output format (table, json)
        #[arg(short, long, default_value = "table")]
        format: String,
    },

    /// Live countdown to the pool's end date
    Countdown {
        /// Print a single tick and exit
        #[arg(long)]
        once: bool,
    },
}

fn init_tracing(verbose: bool, level: &str, json: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
    };

    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let globals = Globals {
        config: cli.config,
        rpc_url: cli.rpc_url,
        from: cli.from,
        pool: cli.pool,
    };
    let config = commands::load_config(&globals)?;

    init_tracing(cli.verbose, &config.logging.level, config.logging.json_output);

    match cli.command {
        Commands::Accounts => commands::accounts::run(config, &globals),
        Commands::Overview { format } => commands::overview::run(config, &globals, format),
        Commands::Stake { amount } => commands::actions::stake(config, &globals, amount),
        Commands::Unstake { amount } => commands::actions::unstake(config, &globals, amount),
        Commands::Claim => commands::actions::claim(config, &globals),
        Commands::Initialize {
            owner,
            token,
            apy_rate,
            min_stake,
            max_stake,
            start_date,
            end_date,
            stake_days,
            early_unstake_fee,
        } => commands::actions::initialize(
            config,
            &globals,
            stakeflow_core::flows::InitializeParams {
                owner,
                token,
                apy_rate,
                min_stake,
                max_stake,
                start_date,
                end_date,
                stake_days,
                early_unstake_fee_percentage: early_unstake_fee,
            },
        ),
        Commands::History { format } => commands::history::run(config, format),
        Commands::Countdown { once } => commands::countdown::run(config, &globals, once),
    }
}
