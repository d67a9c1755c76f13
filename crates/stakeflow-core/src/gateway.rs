//! Capability-typed contract lookup keyed by (chain id, pool selector).

use crate::amount::AmountCodec;
use crate::transport::{ContractMethod, InitializeArgs, MethodCall};
use crate::{Address, Amount, PoolClass, Result, StakeflowError};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Staking token deployed on one network.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenConfig {
    pub address: Address,
    pub symbol: String,
    #[serde(default = "default_decimals")]
    pub decimals: u32,
}

fn default_decimals() -> u32 {
    crate::amount::TOKEN_DECIMALS
}

/// Static configuration for one chain.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub chain_id: u64,
    pub name: String,
    pub token: TokenConfig,
    #[serde(default)]
    pub pools: BTreeMap<PoolClass, Address>,
}

/// Lookup table of configured networks.
#[derive(Clone, Debug, Default)]
pub struct NetworkRegistry {
    networks: HashMap<u64, NetworkConfig>,
}

impl NetworkRegistry {
    pub fn new(networks: impl IntoIterator<Item = NetworkConfig>) -> Result<Self> {
        let mut map = HashMap::new();
        for network in networks {
            let chain_id = network.chain_id;
            if map.insert(chain_id, network).is_some() {
                return Err(StakeflowError::ConfigError(format!(
                    "duplicate network entry for chain {chain_id}"
                )));
            }
        }
        Ok(Self { networks: map })
    }

    pub fn get(&self, chain_id: u64) -> Result<&NetworkConfig> {
        self.networks
            .get(&chain_id)
            .ok_or(StakeflowError::UnknownNetwork(chain_id))
    }

    pub fn len(&self) -> usize {
        self.networks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.networks.is_empty()
    }
}

/// Resolves pool and token handles for the active network.
#[derive(Clone, Debug)]
pub struct ContractGateway {
    network: NetworkConfig,
}

impl ContractGateway {
    pub fn new(network: NetworkConfig) -> Self {
        Self { network }
    }

    pub fn for_chain(registry: &NetworkRegistry, chain_id: u64) -> Result<Self> {
        registry.get(chain_id).cloned().map(Self::new)
    }

    pub fn chain_id(&self) -> u64 {
        self.network.chain_id
    }

    /// Fail with `UnknownNetwork` unless `chain_id` is the chain this gateway was built for.
    pub fn ensure_chain(&self, chain_id: u64) -> Result<()> {
        if chain_id != self.network.chain_id {
            return Err(StakeflowError::UnknownNetwork(chain_id));
        }
        Ok(())
    }

    pub fn network_name(&self) -> &str {
        &self.network.name
    }

    pub fn network(&self) -> &NetworkConfig {
        &self.network
    }

    pub fn resolve_pool(&self, selector: PoolClass) -> Result<PoolHandle> {
        self.network
            .pools
            .get(&selector)
            .map(|&address| PoolHandle {
                class: selector,
                address,
            })
            .ok_or(StakeflowError::UnknownPool {
                pool: selector,
                chain_id: self.network.chain_id,
            })
    }

    pub fn resolve_token(&self) -> Result<TokenHandle> {
        let token = &self.network.token;
        Ok(TokenHandle {
            address: token.address,
            symbol: token.symbol.clone(),
            codec: AmountCodec::new(token.decimals)?,
        })
    }
}

/// Staking-contract handle. Builds only staking calls.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PoolHandle {
    class: PoolClass,
    address: Address,
}

impl PoolHandle {
    pub fn class(&self) -> PoolClass {
        self.class
    }

    pub fn address(&self) -> Address {
        self.address
    }

    fn call(&self, method: ContractMethod) -> MethodCall {
        MethodCall::new(self.address, method)
    }

    pub fn total_users(&self) -> MethodCall {
        self.call(ContractMethod::GetTotalUsers)
    }

    pub fn apy(&self) -> MethodCall {
        self.call(ContractMethod::GetApy)
    }

    pub fn get_user(&self, user: Address) -> MethodCall {
        self.call(ContractMethod::GetUser(user))
    }

    pub fn total_staked(&self) -> MethodCall {
        self.call(ContractMethod::GetTotalStakedTokens)
    }

    pub fn early_unstake_fee(&self) -> MethodCall {
        self.call(ContractMethod::GetEarlyUnstakeFeePercentage)
    }

    pub fn minimum_stake(&self) -> MethodCall {
        self.call(ContractMethod::GetMinimumStakingAmount)
    }

    pub fn staking_status(&self) -> MethodCall {
        self.call(ContractMethod::GetStakingStatus)
    }

    pub fn start_date(&self) -> MethodCall {
        self.call(ContractMethod::GetStakeStartDate)
    }

    pub fn end_date(&self) -> MethodCall {
        self.call(ContractMethod::GetStakeEndDate)
    }

    pub fn stake_days(&self) -> MethodCall {
        self.call(ContractMethod::GetStakeDays)
    }

    /// Reward estimate for `caller` (the contract keys it on `msg.sender`).
    pub fn estimated_rewards(&self, caller: Address) -> MethodCall {
        self.call(ContractMethod::GetUserEstimatedRewards)
            .from(caller)
    }

    pub fn stake(&self, amount: Amount) -> MethodCall {
        self.call(ContractMethod::Stake(amount))
    }

    pub fn unstake(&self, amount: Amount) -> MethodCall {
        self.call(ContractMethod::Unstake(amount))
    }

    pub fn claim_reward(&self) -> MethodCall {
        self.call(ContractMethod::ClaimReward)
    }

    pub fn initialize(&self, args: InitializeArgs) -> MethodCall {
        self.call(ContractMethod::Initialize(args))
    }
}

/// Token-contract handle. Builds only ERC-20 calls.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TokenHandle {
    address: Address,
    symbol: String,
    codec: AmountCodec,
}

impl TokenHandle {
    pub fn address(&self) -> Address {
        self.address
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn codec(&self) -> AmountCodec {
        self.codec
    }

    pub fn balance_of(&self, owner: Address) -> MethodCall {
        MethodCall::new(self.address, ContractMethod::BalanceOf(owner))
    }

    pub fn allowance(&self, owner: Address, spender: Address) -> MethodCall {
        MethodCall::new(self.address, ContractMethod::Allowance { owner, spender })
    }

    pub fn approve(&self, spender: Address, amount: Amount) -> MethodCall {
        MethodCall::new(self.address, ContractMethod::Approve { spender, amount })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn amoy() -> NetworkConfig {
        NetworkConfig {
            chain_id: 80002,
            name: "Polygon Amoy".into(),
            token: TokenConfig {
                address: Address([0xaa; 20]),
                symbol: "STK".into(),
                decimals: 18,
            },
            pools: BTreeMap::from([(PoolClass::SevenDays, Address([0x07; 20]))]),
        }
    }

    #[test]
    fn resolves_configured_pool_and_token() {
        let registry = NetworkRegistry::new([amoy()]).unwrap();
        let gateway = ContractGateway::for_chain(&registry, 80002).unwrap();

        let pool = gateway.resolve_pool(PoolClass::SevenDays).unwrap();
        assert_eq!(pool.address(), Address([0x07; 20]));
        assert_eq!(pool.stake(1).to, Address([0x07; 20]));

        let token = gateway.resolve_token().unwrap();
        assert_eq!(token.symbol(), "STK");
        assert_eq!(token.approve(pool.address(), 1).to, Address([0xaa; 20]));
    }

    #[test]
    fn unknown_pool_and_network_are_reported() {
        let registry = NetworkRegistry::new([amoy()]).unwrap();
        let gateway = ContractGateway::for_chain(&registry, 80002).unwrap();
        assert!(matches!(
            gateway.resolve_pool(PoolClass::NinetyDays),
            Err(StakeflowError::UnknownPool {
                pool: PoolClass::NinetyDays,
                chain_id: 80002
            })
        ));
        assert!(matches!(
            ContractGateway::for_chain(&registry, 1),
            Err(StakeflowError::UnknownNetwork(1))
        ));
    }

    #[test]
    fn duplicate_chain_ids_are_rejected() {
        assert!(NetworkRegistry::new([amoy(), amoy()]).is_err());
    }

    #[test]
    fn network_config_deserializes_pool_map() {
        let json = r#"{
            "chain_id": 80002,
            "name": "Polygon Amoy",
            "token": {"address": "0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa", "symbol": "STK"},
            "pools": {"sevenDays": "0x0707070707070707070707070707070707070707"}
        }"#;
        let network: NetworkConfig = serde_json::from_str(json).unwrap();
        assert_eq!(network, amoy());
    }

    #[test]
    fn reward_estimate_binds_caller() {
        let pool = ContractGateway::new(amoy())
            .resolve_pool(PoolClass::SevenDays)
            .unwrap();
        let call = pool.estimated_rewards(Address([1; 20]));
        assert_eq!(call.from, Some(Address([1; 20])));
    }
}
