//! File-backed key-value store.
//!
//! Each key is one JSON document named `<key>.json` in the storage directory. Writes go to a
//! temporary sibling first and are renamed into place, so a reader never sees a torn document.

use stakeflow_core::ledger::KeyValueStore;
use stakeflow_core::{Result, StakeflowError};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

pub struct FileStore {
    base_dir: PathBuf,
}

impl FileStore {
    /// Open (and create if needed) a store at `base_dir`.
    pub fn new(base_dir: impl Into<PathBuf>) -> Result<Self> {
        let base_dir = base_dir.into();
        fs::create_dir_all(&base_dir).map_err(|e| {
            StakeflowError::StorageError(format!(
                "Failed to create storage dir {}: {}",
                base_dir.display(),
                e
            ))
        })?;

        Ok(Self { base_dir })
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    fn path_for(&self, key: &str) -> Result<PathBuf> {
        let valid = !key.is_empty()
            && key
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-');
        if !valid {
            return Err(StakeflowError::StorageError(format!(
                "invalid storage key '{key}'"
            )));
        }
        Ok(self.base_dir.join(format!("{key}.json")))
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let path = self.path_for(key)?;
        if !path.exists() {
            return Ok(None);
        }

        fs::read_to_string(&path).map(Some).map_err(|e| {
            StakeflowError::StorageError(format!("Failed to read {}: {}", path.display(), e))
        })
    }

    fn put(&self, key: &str, value: &str) -> Result<()> {
        let path = self.path_for(key)?;
        let tmp = self.base_dir.join(format!(".{key}.json.tmp"));

        fs::write(&tmp, value).map_err(|e| {
            StakeflowError::StorageError(format!("Failed to write {}: {}", tmp.display(), e))
        })?;
        fs::rename(&tmp, &path).map_err(|e| {
            StakeflowError::StorageError(format!(
                "Failed to move {} into place: {}",
                path.display(),
                e
            ))
        })?;

        debug!(key, bytes = value.len(), "stored document");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stakeflow_core::ledger::{TransactionLedger, TRANSACTIONS_KEY};
    use stakeflow_core::{
        ActionKind, Address, Hash32, PoolClass, TransactionRecord, TxStatus,
    };
    use std::sync::Arc;
    use tempfile::TempDir;

    #[test]
    fn missing_key_reads_as_none() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::new(dir.path()).unwrap();
        assert_eq!(store.get("transactions").unwrap(), None);
    }

    #[test]
    fn put_overwrites_whole_document() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::new(dir.path()).unwrap();

        store.put("current_user", "{\"a\":1}").unwrap();
        store.put("current_user", "{\"b\":2}").unwrap();

        assert_eq!(store.get("current_user").unwrap().as_deref(), Some("{\"b\":2}"));
        assert!(!dir.path().join(".current_user.json.tmp").exists());
    }

    #[test]
    fn rejects_path_like_keys() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::new(dir.path()).unwrap();
        assert!(store.put("../escape", "x").is_err());
        assert!(store.get("").is_err());
    }

    #[test]
    fn ledger_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let record = TransactionRecord {
            kind: ActionKind::Unstake,
            pool: PoolClass::SevenDays,
            amount: Some(1),
            from: Address([1; 20]),
            to: Some(Address([7; 20])),
            block_hash: Hash32([2; 32]),
            block_number: 9,
            cumulative_gas_used: 1,
            effective_gas_price: None,
            gas_used: 1,
            status: TxStatus::Success,
            transaction_hash: Hash32([3; 32]),
            tx_type: 0,
        };

        {
            let ledger = TransactionLedger::new(Arc::new(FileStore::new(dir.path()).unwrap()));
            ledger.append(record.clone()).unwrap();
        }

        let reopened = TransactionLedger::new(Arc::new(FileStore::new(dir.path()).unwrap()));
        assert_eq!(reopened.all().unwrap(), vec![record]);
        assert!(dir.path().join(format!("{TRANSACTIONS_KEY}.json")).exists());
    }
}
