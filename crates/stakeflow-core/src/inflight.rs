//! Per-(caller, pool, action) mutual exclusion for orchestrated flows.
//!
//! A duplicate submission of the same intent while one is still running is rejected with
//! `AlreadyInProgress` instead of racing a second estimate/submit cycle.

use crate::{ActionKind, Address, PoolClass, Result, StakeflowError};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tracing::debug;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct FlowKey {
    pub caller: Address,
    pub pool: PoolClass,
    pub kind: ActionKind,
}

#[derive(Clone, Debug, Default)]
pub struct InFlightRegistry {
    active: Arc<Mutex<HashSet<FlowKey>>>,
}

impl InFlightRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `key` until the returned guard is dropped.
    pub fn try_acquire(&self, key: FlowKey) -> Result<InFlightGuard> {
        let mut active = self
            .active
            .lock()
            .map_err(|_| StakeflowError::StorageError("in-flight registry lock poisoned".into()))?;
        if !active.insert(key) {
            return Err(StakeflowError::AlreadyInProgress {
                kind: key.kind,
                pool: key.pool,
                caller: key.caller,
            });
        }
        debug!(kind = %key.kind, pool = %key.pool, caller = %key.caller, "flow lock acquired");
        Ok(InFlightGuard {
            key,
            registry: Arc::clone(&self.active),
        })
    }

    pub fn is_active(&self, key: &FlowKey) -> bool {
        self.active
            .lock()
            .map(|active| active.contains(key))
            .unwrap_or(false)
    }
}

/// Releases its key on drop, i.e. when the flow reaches a terminal state.
#[derive(Debug)]
pub struct InFlightGuard {
    key: FlowKey,
    registry: Arc<Mutex<HashSet<FlowKey>>>,
}

impl InFlightGuard {
    pub fn key(&self) -> FlowKey {
        self.key
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        let mut active = match self.registry.lock() {
            Ok(active) => active,
            Err(poisoned) => poisoned.into_inner(),
        };
        active.remove(&self.key);
        debug!(kind = %self.key.kind, pool = %self.key.pool, "flow lock released");
    }
}
