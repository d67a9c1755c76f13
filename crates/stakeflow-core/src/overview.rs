//! One-shot snapshot of a pool and the caller's position in it.

use crate::amount::AmountCodec;
use crate::gateway::ContractGateway;
use crate::ledger::{UserPositionCache, UserSnapshot};
use crate::reader::ContractReader;
use crate::session::FlowContext;
use crate::status::{derive_status, Clock, CountdownPlan, StakingStatus};
use crate::{Amount, PoolClass, Result, UserPosition};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, warn};

/// Maximum stake shown to users, in whole tokens. Not read from the contract.
pub const MAX_STAKE_DISPLAY_TOKENS: u64 = 10_000_000;

const SECONDS_PER_DAY: u64 = 86_400;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PoolOverview {
    pub pool: PoolClass,
    pub network_name: String,
    pub token_symbol: String,
    #[serde(skip)]
    pub codec: AmountCodec,
    pub total_users: u64,
    /// Percent as reported by the contract.
    pub apy: u64,
    pub position: UserPosition,
    #[serde(with = "crate::amount::decimal_string")]
    pub total_staked: Amount,
    /// Basis points.
    pub early_unstake_fee: u64,
    #[serde(with = "crate::amount::decimal_string")]
    pub minimum_stake: Amount,
    pub paused: bool,
    pub start_date: u64,
    pub end_date: u64,
    /// Lock duration in seconds.
    pub stake_days: u64,
    #[serde(with = "crate::amount::decimal_string")]
    pub estimated_reward: Amount,
    #[serde(with = "crate::amount::decimal_string")]
    pub wallet_balance: Amount,
    pub observed_at: u64,
    pub status: StakingStatus,
    pub countdown: Option<CountdownPlan>,
}

impl PoolOverview {
    pub fn lock_days(&self) -> u64 {
        self.stake_days / SECONDS_PER_DAY
    }

    /// Early-unstake fee as a percent string, e.g. `250` bps -> `"2.5%"`.
    pub fn early_unstake_fee_display(&self) -> String {
        let whole = self.early_unstake_fee / 100;
        let fraction = self.early_unstake_fee % 100;
        if fraction == 0 {
            format!("{whole}%")
        } else {
            let digits = format!("{fraction:02}");
            format!("{whole}.{}%", digits.trim_end_matches('0'))
        }
    }

    pub fn minimum_stake_display(&self) -> String {
        if self.minimum_stake == 0 {
            "N/A".into()
        } else {
            format!(
                "{} {}",
                self.codec.to_display_units(self.minimum_stake),
                self.token_symbol
            )
        }
    }

    pub fn maximum_stake_display(&self) -> String {
        format!("{MAX_STAKE_DISPLAY_TOKENS} {}", self.token_symbol)
    }

    pub fn amount_display(&self, amount: Amount) -> String {
        format!("{} {}", self.codec.to_display_units(amount), self.token_symbol)
    }
}

pub struct OverviewLoader {
    gateway: ContractGateway,
    reader: ContractReader,
    positions: UserPositionCache,
    clock: Arc<dyn Clock>,
}

impl OverviewLoader {
    pub fn new(
        gateway: ContractGateway,
        reader: ContractReader,
        positions: UserPositionCache,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            gateway,
            reader,
            positions,
            clock,
        }
    }

    /// Read every figure for the context's pool. The first failing read aborts the load.
    pub async fn load(&self, ctx: &FlowContext) -> Result<PoolOverview> {
        self.gateway.ensure_chain(ctx.chain_id)?;
        let pool = self.gateway.resolve_pool(ctx.pool)?;
        let token = self.gateway.resolve_token()?;

        let total_users = self.reader.total_users(&pool).await?;
        let apy = self.reader.apy(&pool).await?;
        let position = self.reader.user(&pool, ctx.caller).await?;
        let total_staked = self.reader.total_staked(&pool).await?;
        let early_unstake_fee = self.reader.early_unstake_fee(&pool).await?;
        let minimum_stake = self.reader.minimum_stake(&pool).await?;
        let paused = self.reader.paused(&pool).await?;
        let start_date = self.reader.start_date(&pool).await?;
        let end_date = self.reader.end_date(&pool).await?;
        let stake_days = self.reader.stake_days(&pool).await?;
        let estimated_reward = self.reader.estimated_rewards(&pool, ctx.caller).await?;
        let wallet_balance = self.reader.balance_of(&token, ctx.caller).await?;

        if let Err(e) = self.positions.save(&UserSnapshot {
            address: ctx.caller,
            pool: ctx.pool,
            position,
        }) {
            warn!(error = %e, "could not cache user position");
        }

        let now = self.clock.now();
        let status = derive_status(now, paused, start_date, end_date);
        let countdown = CountdownPlan::select(now, start_date, end_date);
        debug!(pool = %ctx.pool, %status, ?countdown, "pool overview loaded");

        Ok(PoolOverview {
            pool: ctx.pool,
            network_name: self.gateway.network_name().to_string(),
            token_symbol: token.symbol().to_string(),
            codec: token.codec(),
            total_users,
            apy,
            position,
            total_staked,
            early_unstake_fee,
            minimum_stake,
            paused,
            start_date,
            end_date,
            stake_days,
            estimated_reward,
            wallet_balance,
            observed_at: now,
            status,
            countdown,
        })
    }
}
