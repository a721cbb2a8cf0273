//! Admission control for scheduled work.
//!
//! A [`Meter`] is an immutable policy. At the start of every run each meter
//! produces a fresh [`MeterState`], which is owned by that run alone and
//! decides when the next task may start.
//!
//! Two policies are built in:
//! - [`MaxMeter`] caps the number of tasks running at the same time.
//! - [`TokenBucketMeter`] caps the start rate, allowing short bursts.
//!
//! Custom policies implement the same pair of traits and can be added to a
//! run with [`RunOptions::meter`](crate::RunOptions::meter).

use std::{
    fmt,
    sync::{Mutex, PoisonError},
    time::{Duration, Instant},
};

use async_io::Timer;
use futures::future::BoxFuture;
use tokio::sync::Semaphore;
use tracing::trace;

use crate::ConfigError;

/// An admission policy that can be instantiated once per run.
pub trait Meter: Send + Sync {
    /// Creates the mutable state enforcing this policy for a single run.
    fn new_state(&self) -> Box<dyn MeterState>;
}

/// The per-run state of a [`Meter`].
///
/// The scheduler calls [`wait_can_start`](MeterState::wait_can_start) and
/// [`notify_started`](MeterState::notify_started) for one input at a time, in
/// configuration order. Workers call
/// [`notify_finished`](MeterState::notify_finished) when their task is done,
/// possibly while the scheduler is suspended in `wait_can_start`.
pub trait MeterState: Send + Sync {
    /// Suspends until this meter would admit one more task.
    ///
    /// Must complete eventually without outside help, unless the run is
    /// canceled.
    fn wait_can_start(&self) -> BoxFuture<'_, ()>;

    /// Claims the admission granted by `wait_can_start`.
    fn notify_started(&self);

    /// Releases whatever the finished task was holding.
    fn notify_finished(&self);
}

fn check_positive(name: &'static str, value: f64) -> Result<(), ConfigError> {
    // Written this way round so that NaN is rejected too.
    if value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::NonPositive { name, value })
    }
}

/// Limits how many tasks may run at once.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MaxMeter {
    max_at_once: usize,
}

impl MaxMeter {
    /// Creates a meter admitting at most `max_at_once` simultaneous tasks.
    ///
    /// # Errors
    ///
    /// - `ConfigError::NonPositive` if `max_at_once` is zero.
    /// - `ConfigError::TooLarge` if it exceeds the permit pool capacity.
    pub fn new(max_at_once: usize) -> Result<Self, ConfigError> {
        if max_at_once == 0 {
            return Err(ConfigError::NonPositive {
                name: "max_at_once",
                value: 0.0,
            });
        }
        if max_at_once > Semaphore::MAX_PERMITS {
            return Err(ConfigError::TooLarge {
                name: "max_at_once",
                value: max_at_once,
                max: Semaphore::MAX_PERMITS,
            });
        }
        Ok(MaxMeter { max_at_once })
    }

    #[must_use]
    pub fn max_at_once(&self) -> usize {
        self.max_at_once
    }
}

impl Meter for MaxMeter {
    fn new_state(&self) -> Box<dyn MeterState> {
        Box::new(MaxState {
            permits: Semaphore::new(self.max_at_once),
        })
    }
}

/// Run state of a [`MaxMeter`]: a pool of permits, one per running task.
pub struct MaxState {
    permits: Semaphore,
}

impl MaxState {
    /// Number of tasks that could start right now.
    #[must_use]
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }
}

impl fmt::Debug for MaxState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MaxState")
            .field("available", &self.available())
            .finish()
    }
}

impl MeterState for MaxState {
    fn wait_can_start(&self) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            // The pool is never closed, so acquiring only fails if it were.
            if let Ok(permit) = self.permits.acquire().await {
                // Handed back explicitly in `notify_finished`.
                permit.forget();
            }
        })
    }

    fn notify_started(&self) {
        // The permit was already taken in `wait_can_start`.
    }

    fn notify_finished(&self) {
        self.permits.add_permits(1);
    }
}

/// Limits the rate at which tasks start.
///
/// Tokens accumulate at `max_per_second` up to `max_burst`; every task start
/// consumes one. The bucket starts with a single token.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TokenBucketMeter {
    max_per_second: f64,
    max_burst: usize,
}

impl TokenBucketMeter {
    /// Creates a token bucket allowing `max_per_second` starts per second on
    /// average and at most `max_burst` back-to-back starts.
    ///
    /// # Errors
    ///
    /// `ConfigError::NonPositive` if either parameter is not strictly positive.
    pub fn new(max_per_second: f64, max_burst: usize) -> Result<Self, ConfigError> {
        check_positive("max_per_second", max_per_second)?;
        check_positive("max_burst", max_burst as f64)?;
        Ok(TokenBucketMeter {
            max_per_second,
            max_burst,
        })
    }

    #[must_use]
    pub fn max_per_second(&self) -> f64 {
        self.max_per_second
    }

    #[must_use]
    pub fn max_burst(&self) -> usize {
        self.max_burst
    }
}

impl Meter for TokenBucketMeter {
    fn new_state(&self) -> Box<dyn MeterState> {
        Box::new(TokenBucketState {
            bucket: Mutex::new(Bucket::new(
                self.max_per_second,
                self.max_burst as f64,
                Instant::now(),
            )),
        })
    }
}

#[derive(Debug)]
struct Bucket {
    tokens: f64,
    last_refill: Instant,
    max_per_second: f64,
    max_burst: f64,
}

impl Bucket {
    fn new(max_per_second: f64, max_burst: f64, now: Instant) -> Self {
        Bucket {
            tokens: 1.0,
            last_refill: now,
            max_per_second,
            max_burst,
        }
    }

    fn refill(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_refill);
        self.tokens =
            (self.tokens + elapsed.as_secs_f64() * self.max_per_second).min(self.max_burst);
        self.last_refill = now;
    }

    // Time until a whole token is available, `None` if one already is.
    fn wait_time(&self) -> Option<Duration> {
        if self.tokens >= 1.0 {
            return None;
        }
        let secs = (1.0 - self.tokens) / self.max_per_second;
        Some(Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX))
    }

    fn take(&mut self) {
        debug_assert!(self.tokens >= 1.0, "token taken from an empty bucket");
        self.tokens -= 1.0;
    }
}

/// Run state of a [`TokenBucketMeter`].
#[derive(Debug)]
pub struct TokenBucketState {
    bucket: Mutex<Bucket>,
}

impl TokenBucketState {
    fn with_bucket<T>(&self, f: impl FnOnce(&mut Bucket) -> T) -> T {
        let mut bucket = self.bucket.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut bucket)
    }

    /// Tokens currently in the bucket, after refilling up to now.
    #[must_use]
    pub fn tokens(&self) -> f64 {
        self.with_bucket(|bucket| {
            bucket.refill(Instant::now());
            bucket.tokens
        })
    }
}

impl MeterState for TokenBucketState {
    fn wait_can_start(&self) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            loop {
                let wait = self.with_bucket(|bucket| {
                    bucket.refill(Instant::now());
                    bucket.wait_time()
                });
                let Some(wait) = wait else {
                    return;
                };
                trace!(?wait, "token bucket empty, waiting");
                // Deregistered from the timer driver when dropped.
                Timer::after(wait).await;
            }
        })
    }

    fn notify_started(&self) {
        // Refill first so burst clamping reflects the actual start time.
        self.with_bucket(|bucket| {
            bucket.refill(Instant::now());
            bucket.take();
        });
    }

    fn notify_finished(&self) {}
}
