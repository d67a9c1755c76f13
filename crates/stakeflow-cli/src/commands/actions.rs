//! `stakeflow stake | unstake | claim | initialize` command implementations

use anyhow::Result;
use stakeflow_core::flows::InitializeParams;
use stakeflow_core::orchestrator::Confirmation;
use stakeflow_core::StakeflowConfig;

use super::{runtime, short_hex, App, Globals};

fn print_confirmation(confirmation: &Confirmation) {
    let record = &confirmation.record;
    println!();
    println!("   Tx:     {}", record.transaction_hash);
    println!("   Block:  {} ({})", record.block_number, short_hex(&record.block_hash.to_string()));
    println!("   From:   {}", record.from);
    println!("   Gas:    {}", record.gas_used);
    if !confirmation.persisted {
        println!("   ⚠️ Not saved to local history");
    }
}

pub fn stake(config: StakeflowConfig, globals: &Globals, amount: String) -> Result<()> {
    let app = App::new(config)?;
    let rt = runtime()?;

    let confirmation = rt.block_on(async {
        let session = app.session(globals).await?;
        let client = app.staking_client(app.gateway(session.chain_id())?);
        println!("⏳ Staking {amount} on {}...", session.pool());
        Ok::<_, anyhow::Error>(client.stake(&session.context(), &amount).await?)
    })?;

    print_confirmation(&confirmation);
    Ok(())
}

pub fn unstake(config: StakeflowConfig, globals: &Globals, amount: String) -> Result<()> {
    let app = App::new(config)?;
    let rt = runtime()?;

    let confirmation = rt.block_on(async {
        let session = app.session(globals).await?;
        let client = app.staking_client(app.gateway(session.chain_id())?);
        println!("⏳ Unstaking {amount} from {}...", session.pool());
        Ok::<_, anyhow::Error>(client.unstake(&session.context(), &amount).await?)
    })?;

    print_confirmation(&confirmation);
    Ok(())
}

pub fn claim(config: StakeflowConfig, globals: &Globals) -> Result<()> {
    let app = App::new(config)?;
    let rt = runtime()?;

    let confirmation = rt.block_on(async {
        let session = app.session(globals).await?;
        let client = app.staking_client(app.gateway(session.chain_id())?);
        println!("⏳ Claiming rewards from {}...", session.pool());
        Ok::<_, anyhow::Error>(client.claim(&session.context()).await?)
    })?;

    print_confirmation(&confirmation);
    Ok(())
}

pub fn initialize(config: StakeflowConfig, globals: &Globals, params: InitializeParams) -> Result<()> {
    if params.end_date <= params.start_date {
        anyhow::bail!("--end-date must be after --start-date");
    }

    let app = App::new(config)?;
    let rt = runtime()?;

    let confirmation = rt.block_on(async {
        let session = app.session(globals).await?;
        let client = app.staking_client(app.gateway(session.chain_id())?);
        println!("⏳ Initializing {} with owner {}...", session.pool(), params.owner);
        Ok::<_, anyhow::Error>(client.initialize(&session.context(), &params).await?)
    })?;

    print_confirmation(&confirmation);
    Ok(())
}
