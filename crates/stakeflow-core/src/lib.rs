//! Staking-lifecycle client core.
//!
//! Reads staking-pool state through a [`ChainTransport`], derives the pool status, and drives
//! every on-chain write (approve, stake, unstake, claim, initialize) through one
//! estimate → submit → confirm → finalize state machine.
//!
//! The staking contract is an opaque external collaborator: interest accrual, fees and reward
//! accounting happen on chain. This crate only orchestrates calls against its method surface.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

pub mod abi;
pub mod allowance;
pub mod amount;
pub mod config;
pub mod flows;
pub mod gateway;
pub mod inflight;
pub mod ledger;
pub mod notify;
pub mod orchestrator;
pub mod overview;
pub mod reader;
pub mod session;
pub mod status;
pub mod stub;
pub mod transport;

pub use config::StakeflowConfig;
pub use transport::{
    ChainTransport, ContractMethod, InitializeArgs, MethodCall, TransportError, TransportResult,
    TxEvent, TxEventSender, TxEvents, tx_channel,
};

/// On-chain integer amount in base units (18-decimal fixed point for the staking token).
pub type Amount = u128;

fn parse_fixed_hex<const N: usize>(raw: &str, what: &str) -> Result<[u8; N]> {
    let trimmed = raw.trim();
    let digits = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    let bytes = hex::decode(digits)
        .map_err(|e| StakeflowError::ConfigError(format!("invalid {what} hex '{raw}': {e}")))?;
    if bytes.len() != N {
        return Err(StakeflowError::ConfigError(format!(
            "{what} must be {N} bytes, got {}",
            bytes.len()
        )));
    }
    let mut out = [0u8; N];
    out.copy_from_slice(&bytes);
    Ok(out)
}

macro_rules! hex_string_serde {
    ($ty:ty) => {
        impl Serialize for $ty {
            fn serialize<S: Serializer>(
                &self,
                serializer: S,
            ) -> std::result::Result<S::Ok, S::Error> {
                serializer.serialize_str(&self.to_string())
            }
        }

        impl<'de> Deserialize<'de> for $ty {
            fn deserialize<D: Deserializer<'de>>(
                deserializer: D,
            ) -> std::result::Result<Self, D::Error> {
                let raw = String::deserialize(deserializer)?;
                raw.parse().map_err(serde::de::Error::custom)
            }
        }
    };
}

/// 32-byte hash newtype (transaction and block hashes).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Hash32(pub [u8; 32]);

impl fmt::Display for Hash32 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl FromStr for Hash32 {
    type Err = StakeflowError;

    fn from_str(s: &str) -> Result<Self> {
        parse_fixed_hex::<32>(s, "hash").map(Hash32)
    }
}

hex_string_serde!(Hash32);

/// 20-byte account or contract address.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address(pub [u8; 20]);

impl Address {
    pub const ZERO: Address = Address([0u8; 20]);

    pub fn is_zero(&self) -> bool {
        *self == Self::ZERO
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl FromStr for Address {
    type Err = StakeflowError;

    fn from_str(s: &str) -> Result<Self> {
        parse_fixed_hex::<20>(s, "address").map(Address)
    }
}

hex_string_serde!(Address);

/// Named staking tier; selects which staking-contract instance is addressed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PoolClass {
    SevenDays,
    FourteenDays,
    ThirtyDays,
    NinetyDays,
}

impl PoolClass {
    pub const ALL: [PoolClass; 4] = [
        PoolClass::SevenDays,
        PoolClass::FourteenDays,
        PoolClass::ThirtyDays,
        PoolClass::NinetyDays,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PoolClass::SevenDays => "sevenDays",
            PoolClass::FourteenDays => "fourteenDays",
            PoolClass::ThirtyDays => "thirtyDays",
            PoolClass::NinetyDays => "ninetyDays",
        }
    }
}

impl fmt::Display for PoolClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PoolClass {
    type Err = StakeflowError;

    fn from_str(s: &str) -> Result<Self> {
        PoolClass::ALL
            .into_iter()
            .find(|class| class.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| StakeflowError::ConfigError(format!("unknown pool selector '{s}'")))
    }
}

/// Kind of on-chain write driven by the orchestrator.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ActionKind {
    Approve,
    Stake,
    Unstake,
    Claim,
    Initialize,
}

impl ActionKind {
    /// Whether a confirmed action of this kind fires the configured post-action effect.
    ///
    /// Approvals are sub-steps of a stake and initialization is administrative, so neither
    /// leaves the user on a results view.
    pub fn triggers_post_action(&self) -> bool {
        matches!(
            self,
            ActionKind::Stake | ActionKind::Unstake | ActionKind::Claim
        )
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ActionKind::Approve => "approve",
            ActionKind::Stake => "stake",
            ActionKind::Unstake => "unstake",
            ActionKind::Claim => "claim",
            ActionKind::Initialize => "initialize",
        };
        f.write_str(name)
    }
}

/// In-flight user intent. Lives only for the duration of one orchestrated flow.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PendingAction {
    pub kind: ActionKind,
    /// Base-unit amount; `None` for claims and initialization.
    pub amount: Option<Amount>,
    pub pool: PoolClass,
}

impl PendingAction {
    pub fn approve(pool: PoolClass, amount: Amount) -> Self {
        Self {
            kind: ActionKind::Approve,
            amount: Some(amount),
            pool,
        }
    }

    pub fn stake(pool: PoolClass, amount: Amount) -> Self {
        Self {
            kind: ActionKind::Stake,
            amount: Some(amount),
            pool,
        }
    }

    pub fn unstake(pool: PoolClass, amount: Amount) -> Self {
        Self {
            kind: ActionKind::Unstake,
            amount: Some(amount),
            pool,
        }
    }

    pub fn claim(pool: PoolClass) -> Self {
        Self {
            kind: ActionKind::Claim,
            amount: None,
            pool,
        }
    }

    pub fn initialize(pool: PoolClass) -> Self {
        Self {
            kind: ActionKind::Initialize,
            amount: None,
            pool,
        }
    }
}

/// Per-address position in one pool, as reported by `getUser`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserPosition {
    #[serde(with = "amount::decimal_string")]
    pub stake_amount: Amount,
    #[serde(with = "amount::decimal_string")]
    pub reward_amount: Amount,
    pub last_stake_time: u64,
    pub last_reward_calculation_time: u64,
    #[serde(with = "amount::decimal_string")]
    pub reward_claimed_so_far: Amount,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TxStatus {
    Success,
    Failure,
}

/// Confirmation record delivered by the transport once a transaction is in a block.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Receipt {
    pub transaction_hash: Hash32,
    pub block_hash: Hash32,
    pub block_number: u64,
    pub from: Address,
    pub to: Option<Address>,
    pub cumulative_gas_used: u64,
    pub gas_used: u64,
    pub effective_gas_price: Option<u128>,
    pub status: TxStatus,
    pub tx_type: u8,
}

/// Ledger entry for one confirmed write. Never mutated after creation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionRecord {
    pub kind: ActionKind,
    pub pool: PoolClass,
    #[serde(with = "amount::optional_decimal_string")]
    pub amount: Option<Amount>,
    pub from: Address,
    pub to: Option<Address>,
    pub block_hash: Hash32,
    pub block_number: u64,
    pub cumulative_gas_used: u64,
    #[serde(with = "amount::optional_decimal_string")]
    pub effective_gas_price: Option<u128>,
    pub gas_used: u64,
    pub status: TxStatus,
    pub transaction_hash: Hash32,
    #[serde(rename = "type")]
    pub tx_type: u8,
}

impl TransactionRecord {
    pub fn from_receipt(action: &PendingAction, receipt: &Receipt) -> Self {
        Self {
            kind: action.kind,
            pool: action.pool,
            amount: action.amount,
            from: receipt.from,
            to: receipt.to,
            block_hash: receipt.block_hash,
            block_number: receipt.block_number,
            cumulative_gas_used: receipt.cumulative_gas_used,
            effective_gas_price: receipt.effective_gas_price,
            gas_used: receipt.gas_used,
            status: receipt.status,
            transaction_hash: receipt.transaction_hash,
            tx_type: receipt.tx_type,
        }
    }
}

/// Unified error type for stakeflow operations.
#[derive(Debug, Error)]
pub enum StakeflowError {
    // User input
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    // Preconditions
    #[error("Insufficient balance: required {required}, available {available}")]
    InsufficientBalance { required: Amount, available: Amount },

    #[error("Insufficient stake: requested {requested}, staked {staked}")]
    InsufficientStake { requested: Amount, staked: Amount },

    #[error("No reward available to claim")]
    NoRewardAvailable,

    // Gateway lookups
    #[error("Pool {pool} is not configured for chain {chain_id}")]
    UnknownPool { pool: PoolClass, chain_id: u64 },

    #[error("Network {0} is not configured")]
    UnknownNetwork(u64),

    // Transport stages
    #[error("Gateway unavailable: {0}")]
    GatewayUnavailable(String),

    #[error("Gas estimation failed: {0}")]
    EstimationFailed(String),

    #[error("Submission failed: {0}")]
    SubmissionFailed(String),

    #[error("Transaction failed: {0}")]
    TransactionFailed(String),

    #[error("Unknown provider: {0}")]
    UnknownProvider(String),

    #[error("{kind} already in progress on {pool} for {caller}")]
    AlreadyInProgress {
        kind: ActionKind,
        pool: PoolClass,
        caller: Address,
    },

    #[error("Illegal flow transition: {0}")]
    IllegalTransition(String),

    #[error("ABI error: {0}")]
    AbiError(String),

    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl StakeflowError {
    /// Short text surfaced to the user as a transient notification.
    pub fn user_message(&self, network_name: &str) -> String {
        match self {
            StakeflowError::InvalidAmount(_) => "Invalid token amount!".into(),
            StakeflowError::InsufficientBalance { .. } => {
                format!("Insufficient tokens on {network_name}. Please buy some tokens first!")
            }
            StakeflowError::InsufficientStake { .. } => {
                format!("Insufficient staked tokens on {network_name}!")
            }
            StakeflowError::NoRewardAvailable => "Insufficient reward tokens to claim!".into(),
            StakeflowError::GatewayUnavailable(_) => {
                format!("Unable to fetch data from {network_name}! Please refresh.")
            }
            StakeflowError::EstimationFailed(msg)
            | StakeflowError::SubmissionFailed(msg)
            | StakeflowError::TransactionFailed(msg) => msg.clone(),
            other => other.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, StakeflowError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_round_trips_through_hex() {
        let addr: Address = "0x00000000000000000000000000000000000000aB".parse().unwrap();
        assert_eq!(addr.0[19], 0xab);
        assert_eq!(
            addr.to_string(),
            "0x00000000000000000000000000000000000000ab"
        );
    }

    #[test]
    fn address_rejects_wrong_length() {
        assert!(matches!(
            "0x1234".parse::<Address>(),
            Err(StakeflowError::ConfigError(_))
        ));
    }

    #[test]
    fn pool_class_parses_case_insensitively() {
        assert_eq!("sevendays".parse::<PoolClass>().unwrap(), PoolClass::SevenDays);
        assert_eq!("ninetyDays".parse::<PoolClass>().unwrap(), PoolClass::NinetyDays);
        assert!("weekly".parse::<PoolClass>().is_err());
    }

    #[test]
    fn record_serializes_with_hex_hashes_and_type_field() {
        let receipt = Receipt {
            transaction_hash: Hash32([1u8; 32]),
            block_hash: Hash32([2u8; 32]),
            block_number: 7,
            from: Address([3u8; 20]),
            to: Some(Address([4u8; 20])),
            cumulative_gas_used: 100,
            gas_used: 50,
            effective_gas_price: Some(30_000_000_000),
            status: TxStatus::Success,
            tx_type: 2,
        };
        let record =
            TransactionRecord::from_receipt(&PendingAction::stake(PoolClass::SevenDays, 5), &receipt);
        let json = serde_json::to_value(&record).unwrap();

        assert_eq!(json["kind"], "stake");
        assert_eq!(json["pool"], "sevenDays");
        assert_eq!(json["type"], 2);
        assert_eq!(json["amount"], "5");
        assert_eq!(json["effectiveGasPrice"], "30000000000");
        assert_eq!(json["transactionHash"], Hash32([1u8; 32]).to_string());

        let back: TransactionRecord = serde_json::from_value(json).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn only_user_facing_actions_trigger_post_action() {
        assert!(ActionKind::Stake.triggers_post_action());
        assert!(ActionKind::Unstake.triggers_post_action());
        assert!(ActionKind::Claim.triggers_post_action());
        assert!(!ActionKind::Approve.triggers_post_action());
        assert!(!ActionKind::Initialize.triggers_post_action());
    }

    #[test]
    fn user_message_prefers_node_reason_for_stage_failures() {
        let err = StakeflowError::EstimationFailed("execution reverted: paused".into());
        assert_eq!(err.user_message("Amoy"), "execution reverted: paused");

        let err = StakeflowError::GatewayUnavailable("timeout".into());
        assert!(err.user_message("Amoy").contains("Amoy"));
    }
}
