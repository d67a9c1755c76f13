//! User-facing notification channel and the post-confirmation effect.

use crate::TransactionRecord;
use tracing::{error, info};

/// Transient notification surface (toast equivalent).
pub trait Notifier: Send + Sync {
    fn success(&self, message: &str);
    fn error(&self, message: &str);
}

/// Routes notifications into the log.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn success(&self, message: &str) {
        info!(target: "stakeflow::notify", "{message}");
    }

    fn error(&self, message: &str) {
        error!(target: "stakeflow::notify", "{message}");
    }
}

/// Runs after a stake, unstake or claim is confirmed and recorded.
pub trait PostActionEffect: Send + Sync {
    fn on_confirmed(&self, record: &TransactionRecord);
}

#[derive(Clone, Copy, Debug, Default)]
pub struct NoEffect;

impl PostActionEffect for NoEffect {
    fn on_confirmed(&self, _record: &TransactionRecord) {}
}

/// Adapts a closure into a [`PostActionEffect`].
pub struct FnEffect<F>(pub F);

impl<F> PostActionEffect for FnEffect<F>
where
    F: Fn(&TransactionRecord) + Send + Sync,
{
    fn on_confirmed(&self, record: &TransactionRecord) {
        (self.0)(record)
    }
}
