//! `stakeflow accounts` command implementation

use anyhow::Result;
use stakeflow_core::StakeflowConfig;

use super::{runtime, App, Globals};

pub fn run(config: StakeflowConfig, globals: &Globals) -> Result<()> {
    let app = App::new(config)?;
    let rt = runtime()?;
    let session = rt.block_on(app.session(globals))?;

    let network = app
        .config
        .registry()?
        .get(session.chain_id())
        .map(|n| n.name.clone())
        .unwrap_or_else(|_| "unconfigured network".into());

    println!("🔑 Accounts on {} (chain {})", network, session.chain_id());
    println!();
    for account in session.accounts() {
        let marker = if *account == session.caller() { "→" } else { " " };
        println!("  {marker} {account}");
    }
    println!();
    println!("   Pool: {}", session.pool());

    Ok(())
}
