//! `stakeflow countdown` command implementation

use anyhow::Result;
use stakeflow_core::status::{Clock, CountdownPlan, CountdownTick, CountdownTimer, SystemClock};
use stakeflow_core::StakeflowConfig;
use std::sync::Arc;

use super::{format_timestamp, runtime, App, Globals};

pub fn run(config: StakeflowConfig, globals: &Globals, once: bool) -> Result<()> {
    let app = App::new(config)?;
    let rt = runtime()?;

    rt.block_on(async {
        let session = app.session(globals).await?;
        let gateway = app.gateway(session.chain_id())?;
        let pool = gateway.resolve_pool(session.pool())?;
        let reader = app.reader();
        let start = reader.start_date(&pool).await?;
        let end = reader.end_date(&pool).await?;

        let clock = Arc::new(SystemClock);
        if CountdownPlan::select(clock.now(), start, end).is_none() {
            println!("⏱️  Staking ended {}", format_timestamp(end));
            return Ok::<_, anyhow::Error>(());
        }

        println!(
            "⏱️  {} ({} → {})",
            session.pool(),
            format_timestamp(start),
            format_timestamp(end)
        );
        let timer = CountdownTimer::new(clock, app.config.countdown.period());
        let mut ticks = timer.start(start, end);
        while let Some(tick) = ticks.recv().await {
            match tick {
                CountdownTick::Remaining { title, remaining } => {
                    println!("   {title}: {remaining}");
                    if once {
                        break;
                    }
                }
                CountdownTick::Expired => {
                    println!("   Staking has ended");
                    break;
                }
            }
        }
        Ok::<_, anyhow::Error>(())
    })
}
