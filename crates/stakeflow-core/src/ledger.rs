//! Local persisted state: the transaction ledger and the cached user position.
//!
//! Both live in a [`KeyValueStore`] as whole serialized documents, overwritten on every update.

use crate::{Address, PoolClass, Result, StakeflowError, TransactionRecord, UserPosition};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

pub const TRANSACTIONS_KEY: &str = "transactions";
pub const CURRENT_USER_KEY: &str = "current_user";

/// Keyed store of whole serialized values (the browser-profile equivalent).
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Replace the value stored under `key`.
    fn put(&self, key: &str, value: &str) -> Result<()>;
}

/// In-memory store for tests and ephemeral sessions.
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: RwLock<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let values = self
            .values
            .read()
            .map_err(|_| StakeflowError::StorageError("memory store lock poisoned".into()))?;
        Ok(values.get(key).cloned())
    }

    fn put(&self, key: &str, value: &str) -> Result<()> {
        let mut values = self
            .values
            .write()
            .map_err(|_| StakeflowError::StorageError("memory store lock poisoned".into()))?;
        values.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// Append-only sequence of confirmed transaction records.
///
/// Appends from this process are serialized; other processes sharing the store remain
/// last-write-wins.
pub struct TransactionLedger {
    store: Arc<dyn KeyValueStore>,
    lock: Mutex<()>,
}

impl TransactionLedger {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            store,
            lock: Mutex::new(()),
        }
    }

    fn read(&self) -> Result<Vec<TransactionRecord>> {
        match self.store.get(TRANSACTIONS_KEY)? {
            Some(raw) => serde_json::from_str(&raw).map_err(|e| {
                StakeflowError::StorageError(format!("corrupt transaction ledger: {e}"))
            }),
            None => Ok(Vec::new()),
        }
    }

    /// Read the persisted sequence, append `record`, write the whole sequence back.
    pub fn append(&self, record: TransactionRecord) -> Result<()> {
        let _guard = self
            .lock
            .lock()
            .map_err(|_| StakeflowError::StorageError("ledger lock poisoned".into()))?;
        let mut records = self.read()?;
        records.push(record);
        let raw = serde_json::to_string(&records)
            .map_err(|e| StakeflowError::StorageError(format!("encode ledger: {e}")))?;
        self.store.put(TRANSACTIONS_KEY, &raw)
    }

    /// Records in append order.
    pub fn all(&self) -> Result<Vec<TransactionRecord>> {
        self.read()
    }

    pub fn len(&self) -> Result<usize> {
        self.read().map(|records| records.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        self.len().map(|len| len == 0)
    }
}

/// Position snapshot cached under [`CURRENT_USER_KEY`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSnapshot {
    pub address: Address,
    pub pool: PoolClass,
    pub position: UserPosition,
}

pub struct UserPositionCache {
    store: Arc<dyn KeyValueStore>,
}

impl UserPositionCache {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    pub fn save(&self, snapshot: &UserSnapshot) -> Result<()> {
        let raw = serde_json::to_string(snapshot)
            .map_err(|e| StakeflowError::StorageError(format!("encode user snapshot: {e}")))?;
        self.store.put(CURRENT_USER_KEY, &raw)
    }

    pub fn load(&self) -> Result<Option<UserSnapshot>> {
        self.store
            .get(CURRENT_USER_KEY)?
            .map(|raw| {
                serde_json::from_str(&raw).map_err(|e| {
                    StakeflowError::StorageError(format!("corrupt user snapshot: {e}"))
                })
            })
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ActionKind, Hash32, TxStatus};
    use proptest::prelude::*;

    fn record(n: u64) -> TransactionRecord {
        TransactionRecord {
            kind: ActionKind::Stake,
            pool: PoolClass::SevenDays,
            amount: Some(u128::from(n) * 1_000_000_000_000_000_000),
            from: Address([1; 20]),
            to: Some(Address([7; 20])),
            block_hash: Hash32([2; 32]),
            block_number: n,
            cumulative_gas_used: 21_000,
            effective_gas_price: Some(30_000_000_000),
            gas_used: 21_000,
            status: TxStatus::Success,
            transaction_hash: Hash32([n as u8; 32]),
            tx_type: 2,
        }
    }

    #[test]
    fn empty_store_reads_as_empty_ledger() {
        let ledger = TransactionLedger::new(Arc::new(MemoryStore::new()));
        assert!(ledger.all().unwrap().is_empty());
        assert!(ledger.is_empty().unwrap());
    }

    #[test]
    fn corrupt_ledger_is_a_storage_error() {
        let store = Arc::new(MemoryStore::new());
        store.put(TRANSACTIONS_KEY, "{not json").unwrap();
        let ledger = TransactionLedger::new(store);
        assert!(matches!(ledger.all(), Err(StakeflowError::StorageError(_))));
        assert!(ledger.append(record(1)).is_err());
    }

    #[test]
    fn user_snapshot_round_trips() {
        let cache = UserPositionCache::new(Arc::new(MemoryStore::new()));
        assert_eq!(cache.load().unwrap(), None);

        let snapshot = UserSnapshot {
            address: Address([1; 20]),
            pool: PoolClass::SevenDays,
            position: UserPosition {
                stake_amount: u128::MAX,
                reward_amount: 5,
                last_stake_time: 10,
                last_reward_calculation_time: 11,
                reward_claimed_so_far: 0,
            },
        };
        cache.save(&snapshot).unwrap();
        assert_eq!(cache.load().unwrap(), Some(snapshot));
    }

    proptest! {
        #[test]
        fn appends_grow_by_one_and_preserve_prefix(count in 1usize..20) {
            let ledger = TransactionLedger::new(Arc::new(MemoryStore::new()));
            let mut previous: Vec<TransactionRecord> = Vec::new();
            for n in 0..count {
                ledger.append(record(n as u64)).unwrap();
                let all = ledger.all().unwrap();
                prop_assert_eq!(all.len(), previous.len() + 1);
                prop_assert_eq!(&all[..previous.len()], &previous[..]);
                previous = all;
            }
        }
    }
}
