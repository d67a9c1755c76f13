//! Pre-spend allowance check.

use crate::gateway::{PoolHandle, TokenHandle};
use crate::reader::ContractReader;
use crate::{Address, Amount, Result};
use tracing::debug;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AllowanceDecision {
    AlreadySufficient,
    /// Approve exactly `required`; no incremental top-up.
    NeedsApproval { current: Amount, required: Amount },
}

/// Any shortfall, however small, requires a fresh approval.
pub fn decide(current: Amount, required: Amount) -> AllowanceDecision {
    if current < required {
        AllowanceDecision::NeedsApproval { current, required }
    } else {
        AllowanceDecision::AlreadySufficient
    }
}

pub struct AllowanceGuard {
    reader: ContractReader,
}

impl AllowanceGuard {
    pub fn new(reader: ContractReader) -> Self {
        Self { reader }
    }

    /// Read errors propagate as `GatewayUnavailable`; no retry.
    pub async fn ensure_allowance(
        &self,
        token: &TokenHandle,
        owner: Address,
        pool: &PoolHandle,
        required: Amount,
    ) -> Result<AllowanceDecision> {
        let current = self.reader.allowance(token, owner, pool.address()).await?;
        let decision = decide(current, required);
        debug!(%owner, spender = %pool.address(), current, required, ?decision, "allowance checked");
        Ok(decision)
    }
}
