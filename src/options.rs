//! Per-run configuration.

use std::{fmt, sync::Arc};

use crate::{
    ConfigError,
    meter::{MaxMeter, Meter, MeterState, TokenBucketMeter},
};

/// Options accepted by [`run_each`](crate::run_each),
/// [`map_stream`](crate::map_stream) and [`run_all`](crate::run_all).
///
/// Values are only validated when a run starts, so an invalid option is
/// reported as a [`ConfigError`] before any input is drawn.
///
/// # Example
/// ```
/// # use meterflow::RunOptions;
/// let options = RunOptions::new()
///     .max_concurrent(4)
///     .max_rate_per_second(10.0)
///     .max_burst(2)
///     .include_index(true);
/// ```
#[derive(Clone)]
#[must_use]
pub struct RunOptions {
    pub(crate) max_concurrent: Option<usize>,
    pub(crate) max_rate_per_second: Option<f64>,
    pub(crate) max_burst: usize,
    pub(crate) capture_outcome: bool,
    pub(crate) include_index: bool,
    pub(crate) include_value: bool,
    pub(crate) buffer_size: usize,
    meters: Vec<Arc<dyn Meter>>,
}

impl RunOptions {
    /// Options with no meters, no tagging, no capture and an unbuffered
    /// result channel.
    pub fn new() -> Self {
        RunOptions {
            max_concurrent: None,
            max_rate_per_second: None,
            max_burst: 1,
            capture_outcome: false,
            include_index: false,
            include_value: false,
            buffer_size: 0,
            meters: Vec::new(),
        }
    }

    /// Caps the number of tasks running at the same time.
    pub fn max_concurrent(mut self, max: usize) -> Self {
        self.max_concurrent = Some(max);
        self
    }

    /// Caps the sustained task start rate. Fractional rates are allowed.
    pub fn max_rate_per_second(mut self, rate: f64) -> Self {
        self.max_rate_per_second = Some(rate);
        self
    }

    /// Number of tasks that may start back-to-back under the rate limit.
    ///
    /// Defaults to 1. Has no effect unless a rate is set.
    pub fn max_burst(mut self, burst: usize) -> Self {
        self.max_burst = burst;
        self
    }

    /// Delivers task errors as `Err` outcomes instead of ending the run.
    ///
    /// Requires a result sink.
    pub fn capture_outcome(mut self, capture: bool) -> Self {
        self.capture_outcome = capture;
        self
    }

    /// Tags every result with the zero-based index of its input.
    pub fn include_index(mut self, include: bool) -> Self {
        self.include_index = include;
        self
    }

    /// Tags every result with a clone of its input value.
    pub fn include_value(mut self, include: bool) -> Self {
        self.include_value = include;
        self
    }

    /// Number of results the result channel buffers before the producer waits.
    ///
    /// With the default of 0 the channel is a rendezvous: a finished task
    /// only completes once the consumer has taken its result. Only used by
    /// [`map_stream`](crate::map_stream).
    pub fn buffer_size(mut self, size: usize) -> Self {
        self.buffer_size = size;
        self
    }

    /// Adds a custom admission policy.
    ///
    /// Custom meters are checked after the built-in concurrency and rate
    /// meters, in the order they were added.
    pub fn meter(mut self, meter: impl Meter + 'static) -> Self {
        self.meters.push(Arc::new(meter));
        self
    }

    /// Validates the meter options and creates fresh state for one run.
    ///
    /// # Errors
    ///
    /// Any [`ConfigError`] raised by the meter constructors.
    pub fn meter_states(&self) -> Result<Vec<Box<dyn MeterState>>, ConfigError> {
        let mut states = Vec::with_capacity(self.meters.len() + 2);
        if let Some(max) = self.max_concurrent {
            states.push(MaxMeter::new(max)?.new_state());
        }
        if let Some(rate) = self.max_rate_per_second {
            states.push(TokenBucketMeter::new(rate, self.max_burst)?.new_state());
        }
        states.extend(self.meters.iter().map(|meter| meter.new_state()));
        Ok(states)
    }
}

impl Default for RunOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for RunOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunOptions")
            .field("max_concurrent", &self.max_concurrent)
            .field("max_rate_per_second", &self.max_rate_per_second)
            .field("max_burst", &self.max_burst)
            .field("capture_outcome", &self.capture_outcome)
            .field("include_index", &self.include_index)
            .field("include_value", &self.include_value)
            .field("buffer_size", &self.buffer_size)
            .field("custom_meters", &self.meters.len())
            .finish()
    }
}
