//! Wallet session and the explicit per-flow context derived from it.

use crate::transport::ChainTransport;
use crate::{Address, PoolClass, Result, StakeflowError};
use tracing::info;

/// Immutable snapshot handed to every flow; later session changes never reach a running flow.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FlowContext {
    pub caller: Address,
    pub pool: PoolClass,
    pub chain_id: u64,
}

#[derive(Clone, Debug)]
pub struct WalletSession {
    accounts: Vec<Address>,
    caller: Address,
    pool: PoolClass,
    chain_id: u64,
}

impl WalletSession {
    /// Ask the provider for its accounts and chain id.
    ///
    /// Uses `preferred` when the provider exposes it, otherwise the first account.
    pub async fn connect(
        transport: &dyn ChainTransport,
        preferred: Option<Address>,
        pool: PoolClass,
    ) -> Result<Self> {
        let accounts = transport
            .accounts()
            .await
            .map_err(|e| StakeflowError::UnknownProvider(e.user_message()))?;
        let chain_id = transport
            .chain_id()
            .await
            .map_err(|e| StakeflowError::UnknownProvider(e.user_message()))?;

        let caller = match preferred {
            Some(wanted) if accounts.contains(&wanted) => wanted,
            Some(wanted) => {
                return Err(StakeflowError::UnknownProvider(format!(
                    "account {wanted} is not available from the provider"
                )))
            }
            None => *accounts.first().ok_or_else(|| {
                StakeflowError::UnknownProvider("provider exposes no accounts".into())
            })?,
        };

        info!(%caller, chain_id, "wallet connected");
        Ok(Self {
            accounts,
            caller,
            pool,
            chain_id,
        })
    }

    pub fn accounts(&self) -> &[Address] {
        &self.accounts
    }

    pub fn caller(&self) -> Address {
        self.caller
    }

    pub fn pool(&self) -> PoolClass {
        self.pool
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    pub fn select_pool(&mut self, pool: PoolClass) {
        self.pool = pool;
    }

    pub fn switch_account(&mut self, account: Address) -> Result<()> {
        if !self.accounts.contains(&account) {
            return Err(StakeflowError::UnknownProvider(format!(
                "account {account} is not available from the provider"
            )));
        }
        self.caller = account;
        Ok(())
    }

    pub fn context(&self) -> FlowContext {
        FlowContext {
            caller: self.caller,
            pool: self.pool,
            chain_id: self.chain_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stub::ScriptedTransport;

    #[tokio::test]
    async fn connects_to_first_account_by_default() {
        let transport = ScriptedTransport::new(80002).with_accounts(vec![Address([1; 20]), Address([2; 20])]);
        let session = WalletSession::connect(&transport, None, PoolClass::SevenDays)
            .await
            .unwrap();
        assert_eq!(
            session.context(),
            FlowContext {
                caller: Address([1; 20]),
                pool: PoolClass::SevenDays,
                chain_id: 80002
            }
        );
    }

    #[tokio::test]
    async fn no_accounts_is_unknown_provider() {
        let transport = ScriptedTransport::new(80002).with_accounts(Vec::new());
        assert!(matches!(
            WalletSession::connect(&transport, None, PoolClass::SevenDays).await,
            Err(StakeflowError::UnknownProvider(_))
        ));
    }

    #[tokio::test]
    async fn context_is_a_snapshot() {
        let transport = ScriptedTransport::new(80002).with_accounts(vec![Address([1; 20]), Address([2; 20])]);
        let mut session = WalletSession::connect(&transport, Some(Address([2; 20])), PoolClass::SevenDays)
            .await
            .unwrap();
        let before = session.context();

        session.select_pool(PoolClass::ThirtyDays);
        session.switch_account(Address([1; 20])).unwrap();

        assert_eq!(before.pool, PoolClass::SevenDays);
        assert_eq!(before.caller, Address([2; 20]));
        assert_eq!(session.context().pool, PoolClass::ThirtyDays);
        assert!(session.switch_account(Address([9; 20])).is_err());
    }
}
