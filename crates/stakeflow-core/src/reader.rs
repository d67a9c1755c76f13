//! Typed contract reads. Every failure degrades to `GatewayUnavailable`.

use crate::abi;
use crate::gateway::{PoolHandle, TokenHandle};
use crate::transport::{ChainTransport, MethodCall};
use crate::{Address, Amount, Result, StakeflowError, UserPosition};
use std::sync::Arc;
use tracing::debug;

#[derive(Clone)]
pub struct ContractReader {
    transport: Arc<dyn ChainTransport>,
}

impl ContractReader {
    pub fn new(transport: Arc<dyn ChainTransport>) -> Self {
        Self { transport }
    }

    pub fn transport(&self) -> &Arc<dyn ChainTransport> {
        &self.transport
    }

    async fn raw(&self, call: MethodCall) -> Result<Vec<u8>> {
        let name = call.method.name();
        debug!(method = name, to = %call.to, "contract read");
        self.transport.call(&call).await.map_err(|e| {
            StakeflowError::GatewayUnavailable(format!("{name}: {}", e.user_message()))
        })
    }

    async fn uint(&self, call: MethodCall) -> Result<Amount> {
        let name = call.method.name();
        let data = self.raw(call).await?;
        abi::decode_uint(&data).map_err(|e| unavailable(name, e))
    }

    /// Token amounts that may legitimately sit at `uint256` max.
    async fn saturating_uint(&self, call: MethodCall) -> Result<Amount> {
        let name = call.method.name();
        let data = self.raw(call).await?;
        abi::decode_uint_saturating(&data).map_err(|e| unavailable(name, e))
    }

    async fn u64(&self, call: MethodCall) -> Result<u64> {
        let name = call.method.name();
        let data = self.raw(call).await?;
        abi::decode_u64(&data).map_err(|e| unavailable(name, e))
    }

    pub async fn total_users(&self, pool: &PoolHandle) -> Result<u64> {
        self.u64(pool.total_users()).await
    }

    pub async fn apy(&self, pool: &PoolHandle) -> Result<u64> {
        self.u64(pool.apy()).await
    }

    /// `getUser` returns `(stakeAmount, rewardAmount, lastStakeTime,
    /// lastRewardCalculationTime, rewardClaimedSoFar)`.
    pub async fn user(&self, pool: &PoolHandle, user: Address) -> Result<UserPosition> {
        let data = self.raw(pool.get_user(user)).await?;
        decode_position(&data).map_err(|e| unavailable("getUser", e))
    }

    pub async fn total_staked(&self, pool: &PoolHandle) -> Result<Amount> {
        self.uint(pool.total_staked()).await
    }

    /// Early-unstake fee in basis points.
    pub async fn early_unstake_fee(&self, pool: &PoolHandle) -> Result<u64> {
        self.u64(pool.early_unstake_fee()).await
    }

    pub async fn minimum_stake(&self, pool: &PoolHandle) -> Result<Amount> {
        self.uint(pool.minimum_stake()).await
    }

    /// `true` when the pool is paused.
    pub async fn paused(&self, pool: &PoolHandle) -> Result<bool> {
        let data = self.raw(pool.staking_status()).await?;
        abi::decode_bool(&data).map_err(|e| unavailable("getStakingStatus", e))
    }

    pub async fn start_date(&self, pool: &PoolHandle) -> Result<u64> {
        self.u64(pool.start_date()).await
    }

    pub async fn end_date(&self, pool: &PoolHandle) -> Result<u64> {
        self.u64(pool.end_date()).await
    }

    /// Lock duration in seconds.
    pub async fn stake_days(&self, pool: &PoolHandle) -> Result<u64> {
        self.u64(pool.stake_days()).await
    }

    pub async fn estimated_rewards(&self, pool: &PoolHandle, caller: Address) -> Result<Amount> {
        self.saturating_uint(pool.estimated_rewards(caller)).await
    }

    pub async fn balance_of(&self, token: &TokenHandle, owner: Address) -> Result<Amount> {
        self.saturating_uint(token.balance_of(owner)).await
    }

    pub async fn allowance(
        &self,
        token: &TokenHandle,
        owner: Address,
        spender: Address,
    ) -> Result<Amount> {
        self.saturating_uint(token.allowance(owner, spender)).await
    }
}

fn unavailable(method: &str, err: StakeflowError) -> StakeflowError {
    StakeflowError::GatewayUnavailable(format!("{method}: {err}"))
}

fn decode_position(data: &[u8]) -> Result<UserPosition> {
    let words = abi::decode_words(data, 5)?;
    Ok(UserPosition {
        stake_amount: abi::word_to_uint(&words[0])?,
        reward_amount: abi::word_to_uint(&words[1])?,
        last_stake_time: abi::word_to_u64(&words[2])?,
        last_reward_calculation_time: abi::word_to_u64(&words[3])?,
        reward_claimed_so_far: abi::word_to_uint(&words[4])?,
    })
}
