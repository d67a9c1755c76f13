//! `stakeflow history` command implementation

use anyhow::Result;
use stakeflow_core::{StakeflowConfig, TxStatus};

use super::{short_hex, App};

pub fn run(config: StakeflowConfig, format: String) -> Result<()> {
    let ledger = App::ledger_only(&config)?;
    let records = ledger.all()?;

    if format == "json" {
        println!("{}", serde_json::to_string_pretty(&records)?);
        return Ok(());
    }

    if records.is_empty() {
        println!("No transactions recorded yet.");
        println!();
        println!("Stake with: stakeflow stake <amount>");
        return Ok(());
    }

    println!("📜 Transaction history ({} total)", records.len());
    println!();
    println!(
        "   {:<4} {:<11} {:<13} {:>10} {:>9}  {}",
        "#", "KIND", "POOL", "BLOCK", "GAS", "TX"
    );
    for (i, record) in records.iter().enumerate() {
        let status = match record.status {
            TxStatus::Success => "",
            TxStatus::Failure => " (failed)",
        };
        println!(
            "   {:<4} {:<11} {:<13} {:>10} {:>9}  {}{}",
            i + 1,
            record.kind.to_string(),
            record.pool.to_string(),
            record.block_number,
            record.gas_used,
            short_hex(&record.transaction_hash.to_string()),
            status
        );
    }

    Ok(())
}
