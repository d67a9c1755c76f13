//! Uniform state machine for on-chain writes.
//!
//! `Idle -> Estimating -> {EstimationFailed | Submitting} -> AwaitingHash -> {Confirmed | Failed}`
//!
//! Nothing is retried. Once `send` has been issued the flow runs to a terminal state; only the
//! transport can abandon it.

use crate::inflight::{FlowKey, InFlightGuard, InFlightRegistry};
use crate::ledger::TransactionLedger;
use crate::notify::{NoEffect, PostActionEffect};
use crate::session::FlowContext;
use crate::transport::{ChainTransport, MethodCall, TxEvent};
use crate::{ActionKind, PendingAction, Result, StakeflowError, TransactionRecord, TxStatus};
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FlowState {
    Idle,
    Estimating,
    EstimationFailed,
    Submitting,
    AwaitingHash,
    Confirmed,
    Failed,
}

impl FlowState {
    pub fn can_transition_to(self, next: FlowState) -> bool {
        use FlowState::*;
        matches!(
            (self, next),
            (Idle, Estimating)
                | (Estimating, EstimationFailed)
                | (Estimating, Submitting)
                | (Submitting, AwaitingHash)
                | (Submitting, Failed)
                | (AwaitingHash, Confirmed)
                | (AwaitingHash, Failed)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            FlowState::EstimationFailed | FlowState::Confirmed | FlowState::Failed
        )
    }
}

struct FlowTracker {
    state: FlowState,
    transitions: Vec<FlowState>,
}

impl FlowTracker {
    fn new() -> Self {
        Self {
            state: FlowState::Idle,
            transitions: vec![FlowState::Idle],
        }
    }

    fn advance(&mut self, next: FlowState) -> Result<()> {
        if !self.state.can_transition_to(next) {
            error!(from = ?self.state, to = ?next, "illegal flow transition");
            return Err(StakeflowError::IllegalTransition(format!(
                "{:?} -> {:?}",
                self.state, next
            )));
        }
        debug!(from = ?self.state, to = ?next, "flow transition");
        self.state = next;
        self.transitions.push(next);
        Ok(())
    }
}

/// Outcome of a flow that reached `Confirmed`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Confirmation {
    pub record: TransactionRecord,
    /// Every state visited, starting at `Idle`.
    pub transitions: Vec<FlowState>,
    /// `false` when the ledger write after confirmation failed.
    pub persisted: bool,
}

pub struct TransactionOrchestrator {
    transport: Arc<dyn ChainTransport>,
    ledger: Arc<TransactionLedger>,
    effect: Arc<dyn PostActionEffect>,
    in_flight: InFlightRegistry,
}

impl TransactionOrchestrator {
    pub fn new(transport: Arc<dyn ChainTransport>, ledger: Arc<TransactionLedger>) -> Self {
        Self {
            transport,
            ledger,
            effect: Arc::new(NoEffect),
            in_flight: InFlightRegistry::new(),
        }
    }

    pub fn with_effect(mut self, effect: Arc<dyn PostActionEffect>) -> Self {
        self.effect = effect;
        self
    }

    pub fn ledger(&self) -> &Arc<TransactionLedger> {
        &self.ledger
    }

    pub fn in_flight(&self) -> &InFlightRegistry {
        &self.in_flight
    }

    /// Claim the (caller, pool, kind) slot for the lifetime of the returned guard.
    pub fn begin(&self, ctx: &FlowContext, kind: ActionKind) -> Result<InFlightGuard> {
        self.in_flight.try_acquire(FlowKey {
            caller: ctx.caller,
            pool: ctx.pool,
            kind,
        })
    }

    /// Acquire the flow lock for `action` and drive `call` to a terminal state.
    pub async fn execute(
        &self,
        ctx: &FlowContext,
        action: PendingAction,
        call: MethodCall,
    ) -> Result<Confirmation> {
        let guard = self.begin(ctx, action.kind)?;
        self.run(&guard, ctx, action, call).await
    }

    /// Drive `call` through estimate, submit, confirm and finalize while `_guard` is held.
    #[instrument(skip_all, fields(kind = %action.kind, pool = %action.pool, caller = %ctx.caller))]
    pub async fn run(
        &self,
        _guard: &InFlightGuard,
        ctx: &FlowContext,
        action: PendingAction,
        call: MethodCall,
    ) -> Result<Confirmation> {
        let call = call.from(ctx.caller);
        let method = call.method.name();
        let mut flow = FlowTracker::new();

        flow.advance(FlowState::Estimating)?;
        let gas = match self.transport.estimate_gas(&call).await {
            Ok(gas) => gas,
            Err(e) => {
                flow.advance(FlowState::EstimationFailed)?;
                warn!(method, error = %e, "gas estimation failed");
                return Err(StakeflowError::EstimationFailed(e.user_message()));
            }
        };

        flow.advance(FlowState::Submitting)?;
        info!(method, gas, to = %call.to, "submitting transaction");
        let mut events = match self.transport.send(&call, gas).await {
            Ok(events) => events,
            Err(e) => {
                flow.advance(FlowState::Failed)?;
                warn!(method, error = %e, "submission failed");
                return Err(StakeflowError::SubmissionFailed(e.user_message()));
            }
        };
        flow.advance(FlowState::AwaitingHash)?;

        let receipt = loop {
            match events.next().await {
                Some(Ok(TxEvent::Hash(hash))) => info!(method, %hash, "transaction hash received"),
                Some(Ok(TxEvent::Receipt(receipt))) => break receipt,
                Some(Err(e)) => {
                    flow.advance(FlowState::Failed)?;
                    warn!(method, error = %e, "confirmation failed");
                    return Err(StakeflowError::TransactionFailed(e.user_message()));
                }
                None => {
                    flow.advance(FlowState::Failed)?;
                    warn!(method, "transport closed before a receipt arrived");
                    return Err(StakeflowError::TransactionFailed(
                        "transaction stream closed before a receipt arrived".into(),
                    ));
                }
            }
        };

        if receipt.status == TxStatus::Failure {
            flow.advance(FlowState::Failed)?;
            warn!(method, hash = %receipt.transaction_hash, "transaction reverted");
            return Err(StakeflowError::TransactionFailed(format!(
                "transaction {} reverted in block {}",
                receipt.transaction_hash, receipt.block_number
            )));
        }

        flow.advance(FlowState::Confirmed)?;
        info!(
            method,
            hash = %receipt.transaction_hash,
            block = receipt.block_number,
            gas_used = receipt.gas_used,
            "transaction confirmed"
        );

        let record = TransactionRecord::from_receipt(&action, &receipt);
        let persisted = match self.ledger.append(record.clone()) {
            Ok(()) => true,
            Err(e) => {
                error!(method, hash = %record.transaction_hash, error = %e, "failed to record confirmed transaction");
                false
            }
        };

        if action.kind.triggers_post_action() {
            self.effect.on_confirmed(&record);
        }

        Ok(Confirmation {
            record,
            transitions: flow.transitions,
            persisted,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::{KeyValueStore, MemoryStore};
    use crate::stub::{RecordingEffect, ScriptedTransport, TransportCall, DEFAULT_ACCOUNT};
    use crate::transport::ContractMethod;
    use crate::{Address, PoolClass};

    const POOL: Address = Address([0x07; 20]);

    fn ctx() -> FlowContext {
        FlowContext {
            caller: DEFAULT_ACCOUNT,
            pool: PoolClass::SevenDays,
            chain_id: 80002,
        }
    }

    fn setup() -> (Arc<ScriptedTransport>, Arc<TransactionLedger>, Arc<RecordingEffect>, TransactionOrchestrator) {
        let transport = Arc::new(ScriptedTransport::new(80002));
        let ledger = Arc::new(TransactionLedger::new(Arc::new(MemoryStore::new())));
        let effect = Arc::new(RecordingEffect::new());
        let orchestrator = TransactionOrchestrator::new(transport.clone(), ledger.clone())
            .with_effect(effect.clone());
        (transport, ledger, effect, orchestrator)
    }

    fn stake_call(amount: u128) -> MethodCall {
        MethodCall::new(POOL, ContractMethod::Stake(amount))
    }

    struct ReadOnlyStore;

    impl KeyValueStore for ReadOnlyStore {
        fn get(&self, _key: &str) -> Result<Option<String>> {
            Ok(None)
        }

        fn put(&self, _key: &str, _value: &str) -> Result<()> {
            Err(StakeflowError::StorageError("read-only".into()))
        }
    }

    #[test]
    fn transition_graph() {
        use FlowState::*;
        assert!(Idle.can_transition_to(Estimating));
        assert!(Estimating.can_transition_to(EstimationFailed));
        assert!(AwaitingHash.can_transition_to(Confirmed));
        assert!(!Idle.can_transition_to(Submitting));
        assert!(!EstimationFailed.can_transition_to(Submitting));
        assert!(!Confirmed.can_transition_to(Failed));
        assert!(Failed.is_terminal() && EstimationFailed.is_terminal() && Confirmed.is_terminal());
    }

    #[test]
    fn tracker_refuses_illegal_transitions() {
        let mut flow = FlowTracker::new();
        assert!(matches!(
            flow.advance(FlowState::Submitting),
            Err(StakeflowError::IllegalTransition(_))
        ));
        assert_eq!(flow.state, FlowState::Idle);

        flow.advance(FlowState::Estimating).unwrap();
        flow.advance(FlowState::EstimationFailed).unwrap();
        assert!(flow.advance(FlowState::Submitting).is_err());
        assert_eq!(
            flow.transitions,
            vec![FlowState::Idle, FlowState::Estimating, FlowState::EstimationFailed]
        );
    }

    #[tokio::test]
    async fn confirmed_flow_records_and_fires_effect() {
        let (transport, ledger, effect, orchestrator) = setup();
        let confirmation = orchestrator
            .execute(&ctx(), PendingAction::stake(PoolClass::SevenDays, 5), stake_call(5))
            .await
            .unwrap();

        assert_eq!(
            confirmation.transitions,
            vec![
                FlowState::Idle,
                FlowState::Estimating,
                FlowState::Submitting,
                FlowState::AwaitingHash,
                FlowState::Confirmed
            ]
        );
        assert!(confirmation.persisted);
        assert_eq!(confirmation.record.from, DEFAULT_ACCOUNT);
        assert_eq!(confirmation.record.amount, Some(5));
        assert_eq!(ledger.all().unwrap(), vec![confirmation.record.clone()]);
        assert_eq!(effect.fired(), vec![confirmation.record]);

        let calls = transport.calls();
        assert!(matches!(&calls[0], TransportCall::EstimateGas(call) if call.from == Some(DEFAULT_ACCOUNT)));
        assert!(matches!(&calls[1], TransportCall::Send { gas, .. } if *gas == crate::stub::DEFAULT_GAS));
    }

    #[tokio::test]
    async fn estimation_failure_never_submits() {
        let (transport, ledger, effect, orchestrator) = setup();
        transport.fail_estimate("stake", "execution reverted: amount below minimum");

        let err = orchestrator
            .execute(&ctx(), PendingAction::stake(PoolClass::SevenDays, 5), stake_call(5))
            .await
            .unwrap_err();

        assert!(matches!(err, StakeflowError::EstimationFailed(ref msg) if msg.contains("below minimum")));
        assert!(transport.sent_methods().is_empty());
        assert!(ledger.is_empty().unwrap());
        assert!(effect.fired().is_empty());
    }

    #[tokio::test]
    async fn rejected_send_is_submission_failure() {
        let (transport, ledger, _, orchestrator) = setup();
        transport.fail_send("stake", "User denied transaction signature");

        let err = orchestrator
            .execute(&ctx(), PendingAction::stake(PoolClass::SevenDays, 5), stake_call(5))
            .await
            .unwrap_err();
        assert!(matches!(err, StakeflowError::SubmissionFailed(ref msg) if msg == "User denied transaction signature"));
        assert!(ledger.is_empty().unwrap());
    }

    #[tokio::test]
    async fn reverted_or_missing_receipt_fails_without_record() {
        let (transport, ledger, effect, orchestrator) = setup();
        transport.revert("unstake");
        transport.withhold_receipt("claimReward");

        let unstake = orchestrator
            .execute(
                &ctx(),
                PendingAction::unstake(PoolClass::SevenDays, 1),
                MethodCall::new(POOL, ContractMethod::Unstake(1)),
            )
            .await;
        assert!(matches!(unstake, Err(StakeflowError::TransactionFailed(_))));

        let claim = orchestrator
            .execute(
                &ctx(),
                PendingAction::claim(PoolClass::SevenDays),
                MethodCall::new(POOL, ContractMethod::ClaimReward),
            )
            .await;
        assert!(matches!(claim, Err(StakeflowError::TransactionFailed(_))));

        assert!(ledger.is_empty().unwrap());
        assert!(effect.fired().is_empty());
    }

    #[tokio::test]
    async fn confirmation_error_event_fails_flow() {
        let (transport, _, _, orchestrator) = setup();
        transport.fail_confirmation("stake", "replacement transaction underpriced");
        let err = orchestrator
            .execute(&ctx(), PendingAction::stake(PoolClass::SevenDays, 5), stake_call(5))
            .await
            .unwrap_err();
        assert!(matches!(err, StakeflowError::TransactionFailed(ref msg) if msg.contains("underpriced")));
    }

    #[tokio::test]
    async fn approvals_are_recorded_without_post_action() {
        let (_, ledger, effect, orchestrator) = setup();
        orchestrator
            .execute(
                &ctx(),
                PendingAction::approve(PoolClass::SevenDays, 5),
                MethodCall::new(
                    Address([0xaa; 20]),
                    ContractMethod::Approve {
                        spender: POOL,
                        amount: 5,
                    },
                ),
            )
            .await
            .unwrap();
        assert_eq!(ledger.len().unwrap(), 1);
        assert!(effect.fired().is_empty());
    }

    #[tokio::test]
    async fn ledger_failure_keeps_confirmation() {
        let transport = Arc::new(ScriptedTransport::new(80002));
        let ledger = Arc::new(TransactionLedger::new(Arc::new(ReadOnlyStore)));
        let orchestrator = TransactionOrchestrator::new(transport, ledger);

        let confirmation = orchestrator
            .execute(&ctx(), PendingAction::stake(PoolClass::SevenDays, 5), stake_call(5))
            .await
            .unwrap();
        assert!(!confirmation.persisted);
        assert_eq!(confirmation.transitions.last(), Some(&FlowState::Confirmed));
    }

    #[tokio::test]
    async fn duplicate_intent_is_rejected_while_in_flight() {
        let (transport, _, _, orchestrator) = setup();
        let _held = orchestrator.begin(&ctx(), ActionKind::Stake).unwrap();

        let err = orchestrator
            .execute(&ctx(), PendingAction::stake(PoolClass::SevenDays, 5), stake_call(5))
            .await
            .unwrap_err();
        assert!(matches!(err, StakeflowError::AlreadyInProgress { kind: ActionKind::Stake, .. }));
        assert!(transport.calls().is_empty());
    }
}
