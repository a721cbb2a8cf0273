//! Execution of a single unit of work.
//!
//! Every admitted input becomes one worker future. The worker awaits the
//! user's future, decides whether a failure ends the run or travels on as a
//! captured outcome, tags the result and hands it to the result sink. Meters
//! are told the task finished on every exit path, cancellation included.

use futures::{SinkExt, channel::mpsc, lock::Mutex};
use tracing::trace;

use crate::{ConfigError, RunError, RunOptions, meter::MeterState};

/// The result of a unit of work as delivered to a result sink.
///
/// With outcome capture disabled every delivered outcome is `Ok`; the first
/// `Err` ends the run instead.
pub type Outcome<R, E> = Result<R, E>;

/// Sending half of a result channel.
pub type ResultSender<T, R, E> = mpsc::Sender<Tagged<T, Outcome<R, E>>>;

/// Receiving half of a result channel.
pub type ResultReceiver<T, R, E> = mpsc::Receiver<Tagged<T, Outcome<R, E>>>;

/// Creates a result channel suitable for [`run_each_into`](crate::run_each_into).
///
/// Delivering a result completes once fewer than `buffer` results are
/// waiting in the channel, so with a `buffer` of 0 every delivery waits for
/// the receiver.
pub fn result_channel<T, R, E>(buffer: usize) -> (ResultSender<T, R, E>, ResultReceiver<T, R, E>) {
    mpsc::channel(buffer)
}

/// A result, optionally tagged with the index and value of its input.
///
/// `index` is set when [`RunOptions::include_index`] is enabled and `value`
/// when [`RunOptions::include_value`] is.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Tagged<T, O> {
    pub index: Option<usize>,
    pub value: Option<T>,
    pub result: O,
}

impl<T, O> Tagged<T, O> {
    /// Drops the tags and returns the bare result.
    pub fn into_result(self) -> O {
        self.result
    }
}

/// Read-only configuration shared by every worker of one run.
///
/// Owns the result sink; dropping the config closes it, which is how the
/// consumer learns that no more results will arrive.
pub(crate) struct RunConfig<T, R, E> {
    pub(crate) capture_outcome: bool,
    pub(crate) include_index: bool,
    pub(crate) clone_value: Option<fn(&T) -> T>,
    pub(crate) sink: Option<Mutex<ResultSender<T, R, E>>>,
    pub(crate) meter_states: Vec<Box<dyn MeterState>>,
}

impl<T, R, E> RunConfig<T, R, E> {
    pub(crate) fn new(
        options: &RunOptions,
        clone_value: Option<fn(&T) -> T>,
        sink: Option<ResultSender<T, R, E>>,
    ) -> Result<Self, ConfigError> {
        let meter_states = options.meter_states()?;
        if options.capture_outcome && sink.is_none() {
            return Err(ConfigError::CaptureWithoutSink);
        }
        Ok(RunConfig {
            capture_outcome: options.capture_outcome,
            include_index: options.include_index,
            clone_value: clone_value.filter(|_| options.include_value),
            sink: sink.map(Mutex::new),
            meter_states,
        })
    }
}

impl<T, R, E> Drop for RunConfig<T, R, E> {
    fn drop(&mut self) {
        if let Some(sink) = self.sink.as_mut() {
            sink.get_mut().close_channel();
        }
    }
}

// Releases the task's hold on every meter when the worker ends, however it ends.
struct Finished<'a>(&'a [Box<dyn MeterState>]);

impl Drop for Finished<'_> {
    fn drop(&mut self) {
        for state in self.0 {
            state.notify_finished();
        }
    }
}

/// Runs one admitted task to completion and delivers its result.
///
/// The task counts as started as soon as this is called, so the meters are
/// released even if the returned future is dropped before its first poll.
pub(crate) fn work<T, R, E>(
    config: &RunConfig<T, R, E>,
    index: usize,
    value: Option<T>,
    task: impl Future<Output = Outcome<R, E>>,
) -> impl Future<Output = Result<(), RunError<E>>> {
    let finished = Finished(&config.meter_states);
    async move {
        let _finished = finished;
        deliver(config, index, value, task.await).await
    }
}

async fn deliver<T, R, E>(
    config: &RunConfig<T, R, E>,
    index: usize,
    value: Option<T>,
    result: Outcome<R, E>,
) -> Result<(), RunError<E>> {
    let result = match result {
        Err(source) if !config.capture_outcome => {
            return Err(RunError::Task { index, source });
        }
        result => result,
    };

    if let Some(sink) = &config.sink {
        let tagged = Tagged {
            index: config.include_index.then_some(index),
            value,
            result,
        };
        trace!(index, "delivering result");
        sink.lock()
            .await
            .send(tagged)
            .await
            .map_err(|_| RunError::SinkClosed)?;
    }
    Ok(())
}
