//! Staking status and countdown derivation from the pool's three timestamps.

use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

/// Source of the current time in unix seconds.
pub trait Clock: Send + Sync {
    fn now(&self) -> u64;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs()
    }
}

/// Settable clock for tests and replays.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    pub fn new(now: u64) -> Self {
        Self {
            now: AtomicU64::new(now),
        }
    }

    pub fn set(&self, now: u64) {
        self.now.store(now, Ordering::SeqCst);
    }

    pub fn advance(&self, secs: u64) {
        self.now.fetch_add(secs, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum StakingStatus {
    Paused,
    Locked,
    Active,
    Ended,
}

impl fmt::Display for StakingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            StakingStatus::Paused => "Paused",
            StakingStatus::Locked => "Locked",
            StakingStatus::Active => "Active",
            StakingStatus::Ended => "Ended",
        };
        f.write_str(label)
    }
}

/// Paused wins over every time-based check.
pub fn derive_status(now: u64, paused: bool, start: u64, end: u64) -> StakingStatus {
    if paused {
        StakingStatus::Paused
    } else if now < start {
        StakingStatus::Locked
    } else if now > end {
        StakingStatus::Ended
    } else {
        StakingStatus::Active
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Remaining {
    pub days: u64,
    pub hours: u64,
    pub minutes: u64,
    pub seconds: u64,
}

impl Remaining {
    /// `None` once the distance is negative.
    pub fn from_seconds(distance: i64) -> Option<Self> {
        let total = u64::try_from(distance).ok()?;
        Some(Self {
            days: total / 86_400,
            hours: (total % 86_400) / 3_600,
            minutes: (total % 3_600) / 60,
            seconds: total % 60,
        })
    }

    pub fn until(target: u64, now: u64) -> Option<Self> {
        let distance = i128::from(target) - i128::from(now);
        Self::from_seconds(i64::try_from(distance).ok()?)
    }
}

impl fmt::Display for Remaining {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}d {}h {}m {}s",
            self.days, self.hours, self.minutes, self.seconds
        )
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum CountdownTitle {
    StartsIn,
    EndsIn,
}

impl CountdownTitle {
    pub fn label(&self) -> &'static str {
        match self {
            CountdownTitle::StartsIn => "Staking Starts In",
            CountdownTitle::EndsIn => "Staking Ends In",
        }
    }
}

impl fmt::Display for CountdownTitle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Which countdown to show. Both titles count down to the end date.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct CountdownPlan {
    pub title: CountdownTitle,
    pub target: u64,
}

impl CountdownPlan {
    pub fn select(now: u64, start: u64, end: u64) -> Option<Self> {
        if now < start {
            Some(Self {
                title: CountdownTitle::StartsIn,
                target: end,
            })
        } else if now < end {
            Some(Self {
                title: CountdownTitle::EndsIn,
                target: end,
            })
        } else {
            None
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CountdownTick {
    Remaining {
        title: CountdownTitle,
        remaining: Remaining,
    },
    /// Terminal marker; the timer stops after sending it.
    Expired,
}

fn tick_at(now: u64, start: u64, end: u64) -> CountdownTick {
    match Remaining::until(end, now) {
        Some(remaining) => CountdownTick::Remaining {
            title: if now < start {
                CountdownTitle::StartsIn
            } else {
                CountdownTitle::EndsIn
            },
            remaining,
        },
        None => CountdownTick::Expired,
    }
}

const TICK_BUFFER: usize = 16;

/// Single live countdown. Starting a new one cancels the previous.
pub struct CountdownTimer {
    clock: Arc<dyn Clock>,
    period: Duration,
    active: Mutex<Option<JoinHandle<()>>>,
}

impl CountdownTimer {
    pub fn new(clock: Arc<dyn Clock>, period: Duration) -> Self {
        Self {
            clock,
            period,
            active: Mutex::new(None),
        }
    }

    /// Tick once per period (first tick one period from now) until the end date passes.
    ///
    /// Must be called within a tokio runtime.
    pub fn start(&self, start: u64, end: u64) -> mpsc::Receiver<CountdownTick> {
        let mut active = match self.active.lock() {
            Ok(active) => active,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(previous) = active.take() {
            previous.abort();
            debug!("previous countdown cancelled");
        }

        let (tx, rx) = mpsc::channel(TICK_BUFFER);
        let clock = Arc::clone(&self.clock);
        let period = self.period;
        let handle = tokio::spawn(async move {
            let mut interval =
                tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            loop {
                interval.tick().await;
                let tick = tick_at(clock.now(), start, end);
                let expired = tick == CountdownTick::Expired;
                if tx.send(tick).await.is_err() || expired {
                    break;
                }
            }
        });
        *active = Some(handle);
        rx
    }

    pub fn cancel(&self) {
        let mut active = match self.active.lock() {
            Ok(active) => active,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(handle) = active.take() {
            handle.abort();
        }
    }

    pub fn is_running(&self) -> bool {
        self.active
            .lock()
            .map(|active| active.as_ref().is_some_and(|h| !h.is_finished()))
            .unwrap_or(false)
    }
}

impl Drop for CountdownTimer {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    /// Unix clock that follows tokio's (pausable) time.
    struct TokioClock {
        base: u64,
        origin: tokio::time::Instant,
    }

    impl TokioClock {
        fn at(base: u64) -> Arc<Self> {
            Arc::new(Self {
                base,
                origin: tokio::time::Instant::now(),
            })
        }
    }

    impl Clock for TokioClock {
        fn now(&self) -> u64 {
            self.base + self.origin.elapsed().as_secs()
        }
    }

    #[test]
    fn status_boundaries() {
        assert_eq!(derive_status(99, false, 100, 200), StakingStatus::Locked);
        assert_eq!(derive_status(100, false, 100, 200), StakingStatus::Active);
        assert_eq!(derive_status(200, false, 100, 200), StakingStatus::Active);
        assert_eq!(derive_status(201, false, 100, 200), StakingStatus::Ended);
    }

    #[test]
    fn remaining_splits_units() {
        let r = Remaining::from_seconds(90_061).unwrap();
        assert_eq!(
            r,
            Remaining {
                days: 1,
                hours: 1,
                minutes: 1,
                seconds: 1
            }
        );
        assert_eq!(r.to_string(), "1d 1h 1m 1s");
        assert_eq!(Remaining::from_seconds(-1), None);
        assert_eq!(Remaining::until(10, 10), Some(Remaining::default()));
    }

    #[test]
    fn plan_before_start_targets_end_date() {
        let plan = CountdownPlan::select(50, 100, 200).unwrap();
        assert_eq!(plan.title.label(), "Staking Starts In");
        assert_eq!(plan.target, 200);

        let plan = CountdownPlan::select(150, 100, 200).unwrap();
        assert_eq!(plan.title, CountdownTitle::EndsIn);
        assert_eq!(plan.target, 200);

        assert_eq!(CountdownPlan::select(200, 100, 200), None);
    }

    #[tokio::test(start_paused = true)]
    async fn ticks_each_second_and_expires_after_end() {
        let timer = CountdownTimer::new(TokioClock::at(1_000), Duration::from_secs(1));
        let mut ticks = timer.start(1_003, 1_005);

        let mut seen = Vec::new();
        while let Some(tick) = ticks.recv().await {
            seen.push(tick);
        }

        assert_eq!(seen.len(), 6);
        assert_eq!(
            seen[0],
            CountdownTick::Remaining {
                title: CountdownTitle::StartsIn,
                remaining: Remaining {
                    seconds: 4,
                    ..Remaining::default()
                }
            }
        );
        assert!(matches!(
            seen[2],
            CountdownTick::Remaining {
                title: CountdownTitle::EndsIn,
                ..
            }
        ));
        assert_eq!(seen[5], CountdownTick::Expired);
        assert!(!timer.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn starting_again_cancels_previous_timer() {
        let timer = CountdownTimer::new(TokioClock::at(0), Duration::from_secs(1));
        let mut first = timer.start(10, 100);
        let mut second = timer.start(10, 100);

        assert_eq!(first.recv().await, None);
        assert!(matches!(
            second.recv().await,
            Some(CountdownTick::Remaining { .. })
        ));
        assert!(timer.is_running());

        timer.cancel();
        assert!(!timer.is_running());
    }

    proptest! {
        #[test]
        fn paused_takes_precedence(now: u64, start: u64, end: u64) {
            prop_assert_eq!(derive_status(now, true, start, end), StakingStatus::Paused);
        }

        #[test]
        fn unpaused_status_matches_window(now: u64, start: u64, end: u64) {
            let status = derive_status(now, false, start, end);
            let expected = if now < start {
                StakingStatus::Locked
            } else if now > end {
                StakingStatus::Ended
            } else {
                StakingStatus::Active
            };
            prop_assert_eq!(status, expected);
        }
    }
}
