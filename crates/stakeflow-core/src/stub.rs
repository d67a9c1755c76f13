//! Scripted in-memory collaborators for tests and dry runs.
//!
//! `ScriptedTransport` answers reads from a table, records every call/estimate/send in order,
//! and emits hash + receipt events for each send unless scripted otherwise.

use crate::abi::{self, Token};
use crate::notify::{Notifier, PostActionEffect};
use crate::transport::{
    tx_channel, ChainTransport, MethodCall, TransportError, TransportResult, TxEvents,
};
use crate::{Address, Hash32, Receipt, TransactionRecord, TxStatus};
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

pub const DEFAULT_ACCOUNT: Address = Address([0x11; 20]);
pub const DEFAULT_GAS: u64 = 120_000;
pub const DEFAULT_GAS_PRICE: u128 = 30_000_000_000;

/// One interaction observed by the scripted transport.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransportCall {
    Call(MethodCall),
    EstimateGas(MethodCall),
    Send { call: MethodCall, gas: u64 },
}

#[derive(Default)]
struct Script {
    reads: HashMap<(Address, String), TransportResult<Vec<u8>>>,
    estimate_failures: HashMap<String, String>,
    send_failures: HashMap<String, String>,
    confirmation_failures: HashMap<String, String>,
    reverts: HashSet<String>,
    withheld: HashSet<String>,
    log: Vec<TransportCall>,
    sends: u64,
}

pub struct ScriptedTransport {
    chain_id: u64,
    accounts: Vec<Address>,
    accounts_error: Option<String>,
    script: Mutex<Script>,
}

impl ScriptedTransport {
    pub fn new(chain_id: u64) -> Self {
        Self {
            chain_id,
            accounts: vec![DEFAULT_ACCOUNT],
            accounts_error: None,
            script: Mutex::new(Script::default()),
        }
    }

    pub fn with_accounts(mut self, accounts: Vec<Address>) -> Self {
        self.accounts = accounts;
        self
    }

    /// Make `accounts()` fail as a missing or locked provider would.
    pub fn without_provider(mut self, message: &str) -> Self {
        self.accounts_error = Some(message.to_string());
        self
    }

    fn script(&self) -> MutexGuard<'_, Script> {
        match self.script.lock() {
            Ok(script) => script,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Answer reads of `method` on `to` with the given words.
    pub fn set_read(&self, to: Address, method: &str, words: &[Token]) {
        self.script()
            .reads
            .insert((to, method.to_string()), Ok(abi::encode_words(words)));
    }

    /// Answer reads of `method` on `to` with raw return data.
    pub fn set_raw_read(&self, to: Address, method: &str, data: Vec<u8>) {
        self.script().reads.insert((to, method.to_string()), Ok(data));
    }

    pub fn fail_read(&self, to: Address, method: &str, message: &str) {
        self.script().reads.insert(
            (to, method.to_string()),
            Err(TransportError::Rpc {
                code: -32000,
                message: message.to_string(),
            }),
        );
    }

    pub fn fail_estimate(&self, method: &str, message: &str) {
        self.script()
            .estimate_failures
            .insert(method.to_string(), message.to_string());
    }

    pub fn fail_send(&self, method: &str, message: &str) {
        self.script()
            .send_failures
            .insert(method.to_string(), message.to_string());
    }

    /// Deliver a transport error instead of a receipt.
    pub fn fail_confirmation(&self, method: &str, message: &str) {
        self.script()
            .confirmation_failures
            .insert(method.to_string(), message.to_string());
    }

    /// Deliver a receipt with failure status.
    pub fn revert(&self, method: &str) {
        self.script().reverts.insert(method.to_string());
    }

    /// Emit the hash, then close the stream without a receipt.
    pub fn withhold_receipt(&self, method: &str) {
        self.script().withheld.insert(method.to_string());
    }

    pub fn calls(&self) -> Vec<TransportCall> {
        self.script().log.clone()
    }

    /// Names of submitted methods, in submission order.
    pub fn sent_methods(&self) -> Vec<&'static str> {
        self.script()
            .log
            .iter()
            .filter_map(|entry| match entry {
                TransportCall::Send { call, .. } => Some(call.method.name()),
                _ => None,
            })
            .collect()
    }

    pub fn estimated_methods(&self) -> Vec<&'static str> {
        self.script()
            .log
            .iter()
            .filter_map(|entry| match entry {
                TransportCall::EstimateGas(call) => Some(call.method.name()),
                _ => None,
            })
            .collect()
    }
}

enum Outcome {
    Receipt(Receipt),
    Error(TransportError),
    Withheld,
}

#[async_trait::async_trait]
impl ChainTransport for ScriptedTransport {
    async fn chain_id(&self) -> TransportResult<u64> {
        Ok(self.chain_id)
    }

    async fn accounts(&self) -> TransportResult<Vec<Address>> {
        match &self.accounts_error {
            Some(message) => Err(TransportError::Rejected(message.clone())),
            None => Ok(self.accounts.clone()),
        }
    }

    async fn call(&self, call: &MethodCall) -> TransportResult<Vec<u8>> {
        let mut script = self.script();
        script.log.push(TransportCall::Call(*call));
        // Unscripted reads behave like a call to an address without code.
        script
            .reads
            .get(&(call.to, call.method.name().to_string()))
            .cloned()
            .unwrap_or_else(|| Ok(Vec::new()))
    }

    async fn estimate_gas(&self, call: &MethodCall) -> TransportResult<u64> {
        let mut script = self.script();
        script.log.push(TransportCall::EstimateGas(*call));
        match script.estimate_failures.get(call.method.name()) {
            Some(message) => Err(TransportError::Rpc {
                code: 3,
                message: message.clone(),
            }),
            None => Ok(DEFAULT_GAS),
        }
    }

    async fn send(&self, call: &MethodCall, gas: u64) -> TransportResult<TxEvents> {
        let name = call.method.name();
        let (hash, outcome) = {
            let mut script = self.script();
            script.log.push(TransportCall::Send { call: *call, gas });
            if let Some(message) = script.send_failures.get(name) {
                return Err(TransportError::Rpc {
                    code: 4001,
                    message: message.clone(),
                });
            }

            script.sends += 1;
            let n = script.sends;
            let mut hash = [0u8; 32];
            hash[24..].copy_from_slice(&n.to_be_bytes());
            let hash = Hash32(hash);

            let outcome = if script.withheld.contains(name) {
                Outcome::Withheld
            } else if let Some(message) = script.confirmation_failures.get(name) {
                Outcome::Error(TransportError::Rpc {
                    code: -32000,
                    message: message.clone(),
                })
            } else {
                let status = if script.reverts.contains(name) {
                    TxStatus::Failure
                } else {
                    TxStatus::Success
                };
                let mut block_hash = hash.0;
                block_hash[0] = 0xb0;
                Outcome::Receipt(Receipt {
                    transaction_hash: hash,
                    block_hash: Hash32(block_hash),
                    block_number: 1_000 + n,
                    from: call.from.unwrap_or(Address::ZERO),
                    to: Some(call.to),
                    cumulative_gas_used: gas * n,
                    gas_used: gas,
                    effective_gas_price: Some(DEFAULT_GAS_PRICE),
                    status,
                    tx_type: 2,
                })
            };
            (hash, outcome)
        };

        let (sender, events) = tx_channel();
        sender.hash(hash).await;
        match outcome {
            Outcome::Receipt(receipt) => {
                sender.receipt(receipt).await;
            }
            Outcome::Error(err) => {
                sender.fail(err).await;
            }
            Outcome::Withheld => {}
        }
        Ok(events)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Notification {
    Success(String),
    Error(String),
}

/// Notifier that keeps every message for later assertion.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    messages: Mutex<Vec<Notification>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, notification: Notification) {
        match self.messages.lock() {
            Ok(mut messages) => messages.push(notification),
            Err(poisoned) => poisoned.into_inner().push(notification),
        }
    }

    pub fn messages(&self) -> Vec<Notification> {
        match self.messages.lock() {
            Ok(messages) => messages.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn errors(&self) -> Vec<String> {
        self.messages()
            .into_iter()
            .filter_map(|n| match n {
                Notification::Error(message) => Some(message),
                Notification::Success(_) => None,
            })
            .collect()
    }
}

impl Notifier for RecordingNotifier {
    fn success(&self, message: &str) {
        self.push(Notification::Success(message.to_string()));
    }

    fn error(&self, message: &str) {
        self.push(Notification::Error(message.to_string()));
    }
}

/// Post-action effect that records every record it is handed.
#[derive(Debug, Default)]
pub struct RecordingEffect {
    fired: Mutex<Vec<TransactionRecord>>,
}

impl RecordingEffect {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fired(&self) -> Vec<TransactionRecord> {
        match self.fired.lock() {
            Ok(fired) => fired.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl PostActionEffect for RecordingEffect {
    fn on_confirmed(&self, record: &TransactionRecord) {
        match self.fired.lock() {
            Ok(mut fired) => fired.push(record.clone()),
            Err(poisoned) => poisoned.into_inner().push(record.clone()),
        }
    }
}
