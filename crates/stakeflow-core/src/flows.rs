//! Stake, unstake, claim and initialize bound to the orchestrator.
//!
//! Each flow checks its precondition against chain state, then drives its write through
//! [`TransactionOrchestrator`]. Errors are logged and surfaced through the [`Notifier`] at the
//! flow boundary and returned to the caller.

use crate::allowance::{AllowanceDecision, AllowanceGuard};
use crate::amount::AmountCodec;
use crate::gateway::ContractGateway;
use crate::notify::Notifier;
use crate::orchestrator::{Confirmation, TransactionOrchestrator};
use crate::reader::ContractReader;
use crate::session::FlowContext;
use crate::transport::InitializeArgs;
use crate::{ActionKind, Address, PendingAction, Result, StakeflowError};
use std::sync::Arc;
use tracing::{info, warn};

/// Pool initialization parameters. Stake limits are display amounts.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InitializeParams {
    pub owner: Address,
    pub token: Address,
    pub apy_rate: u64,
    pub min_stake: String,
    pub max_stake: String,
    pub start_date: u64,
    pub end_date: u64,
    /// Lock duration in seconds.
    pub stake_days: u64,
    /// Basis points.
    pub early_unstake_fee_percentage: u64,
}

pub struct StakingClient {
    gateway: ContractGateway,
    reader: ContractReader,
    orchestrator: Arc<TransactionOrchestrator>,
    notifier: Arc<dyn Notifier>,
}

impl StakingClient {
    pub fn new(
        gateway: ContractGateway,
        reader: ContractReader,
        orchestrator: Arc<TransactionOrchestrator>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            gateway,
            reader,
            orchestrator,
            notifier,
        }
    }

    pub fn gateway(&self) -> &ContractGateway {
        &self.gateway
    }

    pub fn orchestrator(&self) -> &Arc<TransactionOrchestrator> {
        &self.orchestrator
    }

    /// Stake `amount` (display units) into the context's pool, approving first if needed.
    pub async fn stake(&self, ctx: &FlowContext, amount: &str) -> Result<Confirmation> {
        let outcome = self.stake_inner(ctx, amount).await;
        self.report(ActionKind::Stake, outcome)
    }

    pub async fn unstake(&self, ctx: &FlowContext, amount: &str) -> Result<Confirmation> {
        let outcome = self.unstake_inner(ctx, amount).await;
        self.report(ActionKind::Unstake, outcome)
    }

    pub async fn claim(&self, ctx: &FlowContext) -> Result<Confirmation> {
        let outcome = self.claim_inner(ctx).await;
        self.report(ActionKind::Claim, outcome)
    }

    pub async fn initialize(
        &self,
        ctx: &FlowContext,
        params: &InitializeParams,
    ) -> Result<Confirmation> {
        let outcome = self.initialize_inner(ctx, params).await;
        self.report(ActionKind::Initialize, outcome)
    }

    async fn stake_inner(&self, ctx: &FlowContext, amount: &str) -> Result<Confirmation> {
        self.gateway.ensure_chain(ctx.chain_id)?;
        let pool = self.gateway.resolve_pool(ctx.pool)?;
        let token = self.gateway.resolve_token()?;
        let required = token.codec().to_base_units(amount)?;
        let guard = self.orchestrator.begin(ctx, ActionKind::Stake)?;

        let available = self.reader.balance_of(&token, ctx.caller).await?;
        if available < required {
            return Err(StakeflowError::InsufficientBalance {
                required,
                available,
            });
        }

        let allowance = AllowanceGuard::new(self.reader.clone());
        if let AllowanceDecision::NeedsApproval { current, required } = allowance
            .ensure_allowance(&token, ctx.caller, &pool, required)
            .await?
        {
            info!(current, required, spender = %pool.address(), "approval required before stake");
            self.orchestrator
                .execute(
                    ctx,
                    PendingAction::approve(ctx.pool, required),
                    token.approve(pool.address(), required),
                )
                .await?;
        }

        self.orchestrator
            .run(
                &guard,
                ctx,
                PendingAction::stake(ctx.pool, required),
                pool.stake(required),
            )
            .await
    }

    async fn unstake_inner(&self, ctx: &FlowContext, amount: &str) -> Result<Confirmation> {
        self.gateway.ensure_chain(ctx.chain_id)?;
        let pool = self.gateway.resolve_pool(ctx.pool)?;
        let requested = self.gateway.resolve_token()?.codec().to_base_units(amount)?;
        let guard = self.orchestrator.begin(ctx, ActionKind::Unstake)?;

        let staked = self.reader.user(&pool, ctx.caller).await?.stake_amount;
        if staked < requested {
            return Err(StakeflowError::InsufficientStake { requested, staked });
        }

        self.orchestrator
            .run(
                &guard,
                ctx,
                PendingAction::unstake(ctx.pool, requested),
                pool.unstake(requested),
            )
            .await
    }

    async fn claim_inner(&self, ctx: &FlowContext) -> Result<Confirmation> {
        self.gateway.ensure_chain(ctx.chain_id)?;
        let pool = self.gateway.resolve_pool(ctx.pool)?;
        let guard = self.orchestrator.begin(ctx, ActionKind::Claim)?;

        // An unreadable estimate aborts the same way a zero estimate does.
        let reward = match self.reader.estimated_rewards(&pool, ctx.caller).await {
            Ok(reward) => reward,
            Err(e) => {
                warn!(error = %e, "estimated reward unreadable");
                0
            }
        };
        if reward == 0 {
            return Err(StakeflowError::NoRewardAvailable);
        }

        self.orchestrator
            .run(
                &guard,
                ctx,
                PendingAction::claim(ctx.pool),
                pool.claim_reward(),
            )
            .await
    }

    async fn initialize_inner(
        &self,
        ctx: &FlowContext,
        params: &InitializeParams,
    ) -> Result<Confirmation> {
        self.gateway.ensure_chain(ctx.chain_id)?;
        let pool = self.gateway.resolve_pool(ctx.pool)?;
        let codec = self.gateway.resolve_token()?.codec();
        let args = InitializeArgs {
            owner: params.owner,
            token: params.token,
            apy_rate: params.apy_rate,
            min_stake: codec.parse(&params.min_stake)?,
            max_stake: codec.parse(&params.max_stake)?,
            start_date: params.start_date,
            end_date: params.end_date,
            stake_days: params.stake_days,
            early_unstake_fee_percentage: params.early_unstake_fee_percentage,
        };

        self.orchestrator
            .execute(ctx, PendingAction::initialize(ctx.pool), pool.initialize(args))
            .await
    }

    fn report(&self, kind: ActionKind, outcome: Result<Confirmation>) -> Result<Confirmation> {
        match &outcome {
            Ok(confirmation) => {
                self.notifier.success(&self.success_message(kind, confirmation));
                if !confirmation.persisted {
                    self.notifier
                        .error("Transaction confirmed but could not be saved to local history.");
                }
            }
            Err(e) => {
                warn!(%kind, error = %e, "flow aborted");
                self.notifier
                    .error(&e.user_message(self.gateway.network_name()));
            }
        }
        outcome
    }

    fn success_message(&self, kind: ActionKind, confirmation: &Confirmation) -> String {
        let token = &self.gateway.network().token;
        let codec = AmountCodec::new(token.decimals).unwrap_or_default();
        let amount = confirmation
            .record
            .amount
            .map(|a| format!("{} {}", codec.to_display_units(a), token.symbol))
            .unwrap_or_default();
        let hash = confirmation.record.transaction_hash;
        match kind {
            ActionKind::Approve => format!("Approved {amount} (tx {hash})"),
            ActionKind::Stake => format!("Staked {amount} (tx {hash})"),
            ActionKind::Unstake => format!("Unstaked {amount} (tx {hash})"),
            ActionKind::Claim => format!("Reward claimed (tx {hash})"),
            ActionKind::Initialize => format!("Pool initialized (tx {hash})"),
        }
    }
}
