//! `stakeflow overview` command implementation

use anyhow::Result;
use stakeflow_core::overview::{OverviewLoader, PoolOverview};
use stakeflow_core::status::{Remaining, SystemClock};
use stakeflow_core::StakeflowConfig;
use std::sync::Arc;

use super::{format_timestamp, runtime, App, Globals};

pub fn run(config: StakeflowConfig, globals: &Globals, format: String) -> Result<()> {
    let app = App::new(config)?;
    let rt = runtime()?;

    let overview = rt.block_on(async {
        let session = app.session(globals).await?;
        let loader = OverviewLoader::new(
            app.gateway(session.chain_id())?,
            app.reader(),
            app.positions(),
            Arc::new(SystemClock),
        );
        Ok::<_, anyhow::Error>(loader.load(&session.context()).await?)
    })?;

    if format == "json" {
        println!("{}", serde_json::to_string_pretty(&overview)?);
        return Ok(());
    }

    print_table(&overview);
    Ok(())
}

fn print_table(o: &PoolOverview) {
    println!("📊 {} pool on {}", o.pool, o.network_name);
    println!();
    println!("   Status:              {}", o.status);
    println!("   APY:                 {}%", o.apy);
    println!("   Lock period:         {} days", o.lock_days());
    println!("   Total users:         {}", o.total_users);
    println!("   Total staked:        {}", o.amount_display(o.total_staked));
    println!("   Early unstake fee:   {}", o.early_unstake_fee_display());
    println!("   Minimum stake:       {}", o.minimum_stake_display());
    println!("   Maximum stake:       {}", o.maximum_stake_display());
    println!("   Starts:              {}", format_timestamp(o.start_date));
    println!("   Ends:                {}", format_timestamp(o.end_date));
    println!();

    println!("👤 Your position");
    println!("   Staked:              {}", o.amount_display(o.position.stake_amount));
    println!("   Estimated reward:    {}", o.amount_display(o.estimated_reward));
    println!(
        "   Claimed so far:      {}",
        o.amount_display(o.position.reward_claimed_so_far)
    );
    println!("   Wallet balance:      {}", o.amount_display(o.wallet_balance));
    if o.position.last_stake_time > 0 {
        println!(
            "   Last stake:          {}",
            format_timestamp(o.position.last_stake_time)
        );
    }
    println!();

    match o.countdown {
        Some(plan) => match Remaining::until(plan.target, o.observed_at) {
            Some(remaining) => println!("⏱️  {}: {}", plan.title, remaining),
            None => println!("⏱️  Staking has ended"),
        },
        None => println!("⏱️  Staking has ended"),
    }
}
