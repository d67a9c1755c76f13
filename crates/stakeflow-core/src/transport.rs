//! Chain transport seam.
//!
//! The core depends only on this shape: `call`, `estimate_gas` and `send`, where `send`
//! resolves to a stream of tagged transaction events instead of registered callbacks.

use crate::abi::{self, Token};
use crate::{Address, Amount, Hash32, Receipt};
use thiserror::Error;
use tokio::sync::mpsc;

/// Failure reported by a chain transport.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Rejected by provider: {0}")]
    Rejected(String),
}

impl TransportError {
    /// Node-provided reason when there is one, otherwise the full error text.
    pub fn user_message(&self) -> String {
        match self {
            TransportError::Rpc { message, .. } | TransportError::Rejected(message) => {
                message.clone()
            }
            other => other.to_string(),
        }
    }
}

pub type TransportResult<T> = std::result::Result<T, TransportError>;

/// Nine `initialize` parameters, amounts already in base units.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct InitializeArgs {
    pub owner: Address,
    pub token: Address,
    pub apy_rate: u64,
    pub min_stake: Amount,
    pub max_stake: Amount,
    pub start_date: u64,
    pub end_date: u64,
    pub stake_days: u64,
    pub early_unstake_fee_percentage: u64,
}

/// Staking and token contract methods used by this client.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ContractMethod {
    // staking reads
    GetTotalUsers,
    GetApy,
    GetUser(Address),
    GetTotalStakedTokens,
    GetEarlyUnstakeFeePercentage,
    GetMinimumStakingAmount,
    GetStakingStatus,
    GetStakeStartDate,
    GetStakeEndDate,
    GetStakeDays,
    GetUserEstimatedRewards,
    // token reads
    BalanceOf(Address),
    Allowance { owner: Address, spender: Address },
    // writes
    Approve { spender: Address, amount: Amount },
    Stake(Amount),
    Unstake(Amount),
    ClaimReward,
    Initialize(InitializeArgs),
}

impl ContractMethod {
    pub fn signature(&self) -> &'static str {
        match self {
            ContractMethod::GetTotalUsers => "getTotalUsers()",
            ContractMethod::GetApy => "getAPY()",
            ContractMethod::GetUser(_) => "getUser(address)",
            ContractMethod::GetTotalStakedTokens => "getTotalStakedTokens()",
            ContractMethod::GetEarlyUnstakeFeePercentage => "getEarlyUnstakeFeePercentage()",
            ContractMethod::GetMinimumStakingAmount => "getMinimumStakingAmount()",
            ContractMethod::GetStakingStatus => "getStakingStatus()",
            ContractMethod::GetStakeStartDate => "getStakeStartDate()",
            ContractMethod::GetStakeEndDate => "getStakeEndDate()",
            ContractMethod::GetStakeDays => "getStakeDays()",
            ContractMethod::GetUserEstimatedRewards => "getUserEstimatedRewards()",
            ContractMethod::BalanceOf(_) => "balanceOf(address)",
            ContractMethod::Allowance { .. } => "allowance(address,address)",
            ContractMethod::Approve { .. } => "approve(address,uint256)",
            ContractMethod::Stake(_) => "stake(uint256)",
            ContractMethod::Unstake(_) => "unstake(uint256)",
            ContractMethod::ClaimReward => "claimReward()",
            ContractMethod::Initialize(_) => {
                "initialize(address,address,uint256,uint256,uint256,uint256,uint256,uint256,uint256)"
            }
        }
    }

    /// Method name without the parameter list.
    pub fn name(&self) -> &'static str {
        let signature = self.signature();
        signature
            .split_once('(')
            .map_or(signature, |(name, _)| name)
    }

    pub fn args(&self) -> Vec<Token> {
        match *self {
            ContractMethod::GetUser(addr) | ContractMethod::BalanceOf(addr) => {
                vec![Token::Address(addr)]
            }
            ContractMethod::Allowance { owner, spender } => {
                vec![Token::Address(owner), Token::Address(spender)]
            }
            ContractMethod::Approve { spender, amount } => {
                vec![Token::Address(spender), Token::Uint(amount)]
            }
            ContractMethod::Stake(amount) | ContractMethod::Unstake(amount) => {
                vec![Token::Uint(amount)]
            }
            ContractMethod::Initialize(a) => vec![
                Token::Address(a.owner),
                Token::Address(a.token),
                Token::Uint(a.apy_rate.into()),
                Token::Uint(a.min_stake),
                Token::Uint(a.max_stake),
                Token::Uint(a.start_date.into()),
                Token::Uint(a.end_date.into()),
                Token::Uint(a.stake_days.into()),
                Token::Uint(a.early_unstake_fee_percentage.into()),
            ],
            _ => Vec::new(),
        }
    }

    pub fn calldata(&self) -> Vec<u8> {
        abi::encode_call(self.signature(), &self.args())
    }

    pub fn is_write(&self) -> bool {
        matches!(
            self,
            ContractMethod::Approve { .. }
                | ContractMethod::Stake(_)
                | ContractMethod::Unstake(_)
                | ContractMethod::ClaimReward
                | ContractMethod::Initialize(_)
        )
    }
}

/// A method bound to a contract address and, optionally, a caller.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MethodCall {
    pub to: Address,
    pub method: ContractMethod,
    pub from: Option<Address>,
}

impl MethodCall {
    pub fn new(to: Address, method: ContractMethod) -> Self {
        Self {
            to,
            method,
            from: None,
        }
    }

    pub fn from(mut self, caller: Address) -> Self {
        self.from = Some(caller);
        self
    }
}

/// Tagged event emitted by a submitted transaction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TxEvent {
    /// Informational: the provider accepted the transaction.
    Hash(Hash32),
    /// Authoritative completion.
    Receipt(Receipt),
}

const EVENT_BUFFER: usize = 8;

/// Create a connected event sender/receiver pair.
pub fn tx_channel() -> (TxEventSender, TxEvents) {
    let (tx, rx) = mpsc::channel(EVENT_BUFFER);
    (TxEventSender { tx }, TxEvents { rx })
}

/// Producer half, held by the transport.
#[derive(Clone, Debug)]
pub struct TxEventSender {
    tx: mpsc::Sender<TransportResult<TxEvent>>,
}

impl TxEventSender {
    /// Returns `false` once the consumer has gone away.
    pub async fn hash(&self, hash: Hash32) -> bool {
        self.tx.send(Ok(TxEvent::Hash(hash))).await.is_ok()
    }

    pub async fn receipt(&self, receipt: Receipt) -> bool {
        self.tx.send(Ok(TxEvent::Receipt(receipt))).await.is_ok()
    }

    pub async fn fail(&self, err: TransportError) -> bool {
        self.tx.send(Err(err)).await.is_ok()
    }
}

/// Consumer half, awaited by the orchestrator.
#[derive(Debug)]
pub struct TxEvents {
    rx: mpsc::Receiver<TransportResult<TxEvent>>,
}

impl TxEvents {
    /// Next event, or `None` when the transport closed the stream.
    pub async fn next(&mut self) -> Option<TransportResult<TxEvent>> {
        self.rx.recv().await
    }
}

/// Wallet-injected provider equivalent.
#[async_trait::async_trait]
pub trait ChainTransport: Send + Sync {
    /// Chain id of the connected network.
    async fn chain_id(&self) -> TransportResult<u64>;

    /// Accounts the provider can sign for.
    async fn accounts(&self) -> TransportResult<Vec<Address>>;

    /// Execute a read-only call and return the raw ABI return data.
    async fn call(&self, call: &MethodCall) -> TransportResult<Vec<u8>>;

    /// Gas estimate for a write with the caller bound.
    async fn estimate_gas(&self, call: &MethodCall) -> TransportResult<u64>;

    /// Submit a write; hash and receipt arrive on the returned stream.
    async fn send(&self, call: &MethodCall, gas: u64) -> TransportResult<TxEvents>;
}
