//! The scheduling loop behind every run.
//!
//! A run draws inputs from a stream one at a time. Each input is admitted by
//! every configured meter, in configuration order, before its task is pushed
//! into the run's task group. The loop keeps polling the task group while it
//! waits for admission, so running tasks make progress and release capacity.
//!
//! The task group is fail-fast: the first unit-of-work error that is not
//! captured ends the run, and every other in-flight task and pending meter
//! wait is dropped with it. Whatever way the run ends, its result sink is
//! closed exactly once.

use std::pin::pin;

use futures::{
    Stream, StreamExt, select,
    stream::{FusedStream, FuturesUnordered},
};
use tracing::{debug, trace};

use crate::{
    RunError, RunOptions,
    meter::MeterState,
    worker::{Outcome, ResultSender, RunConfig, work},
};

// Waits for every meter to admit one more task, then claims the admission on
// all of them without suspending in between.
async fn admit(states: &[Box<dyn MeterState>]) {
    for state in states {
        state.wait_can_start().await;
    }
    for state in states {
        state.notify_started();
    }
}

/// Drives one run to completion and returns how many tasks it started.
pub(crate) async fn drive<T, F, Fut, R, E>(
    mut f: F,
    input: impl Stream<Item = T>,
    config: RunConfig<T, R, E>,
) -> Result<usize, RunError<E>>
where
    F: FnMut(T) -> Fut,
    Fut: Future<Output = Outcome<R, E>>,
{
    debug!(
        meters = config.meter_states.len(),
        capture_outcome = config.capture_outcome,
        sink = config.sink.is_some(),
        "run started"
    );
    let states = config.meter_states.as_slice();
    // `then` only draws the next input once the previous one was admitted.
    let mut admitted = pin!(
        input
            .then(move |value| async move {
                admit(states).await;
                value
            })
            .enumerate()
            .fuse()
    );
    let mut group = FuturesUnordered::new();
    let mut started = 0;

    loop {
        select! {
            (index, value) = admitted.select_next_some() => {
                trace!(index, "task admitted");
                let tag = config.clone_value.map(|clone| clone(&value));
                group.push(work(&config, index, tag, f(value)));
                started += 1;
            }
            finished = group.select_next_some() => {
                if let Err(err) = finished {
                    debug!(started, in_flight = group.len(), "run failed, canceling");
                    return Err(err);
                }
            }
            complete => break,
        }
    }

    debug_assert!(admitted.is_terminated());
    debug!(started, "run finished");
    Ok(started)
}

/// Runs `f` on every input, honoring the meters configured in `options`.
///
/// Completes once every input has been drawn and every task has finished.
/// Results are discarded; use [`run_each_into`] or
/// [`map_stream`](crate::map_stream) to observe them.
///
/// # Errors
///
/// - `RunError::Config` if `options` is invalid, including when outcome
///   capture is requested, since there is no sink to capture into.
/// - `RunError::Task` with the first error returned by `f`. Tasks still
///   running at that point are canceled.
///
/// # Example
/// ```
/// # use meterflow::{RunOptions, iter, run_each};
/// # async {
/// let options = RunOptions::new().max_concurrent(2);
/// run_each(
///     |x: u32| async move { Ok::<_, std::convert::Infallible>(x + 1) },
///     iter([1, 2, 3]),
///     options,
/// )
/// .await
/// .unwrap();
/// # };
/// ```
pub async fn run_each<T, F, Fut, R, E>(
    f: F,
    input: impl Stream<Item = T>,
    options: RunOptions,
) -> Result<(), RunError<E>>
where
    F: FnMut(T) -> Fut,
    Fut: Future<Output = Outcome<R, E>>,
{
    let config = RunConfig::new(&options, None, None)?;
    drive(f, input, config).await.map(|_| ())
}

/// Like [`run_each`], but sends every (possibly tagged) result to `sink`.
///
/// Results arrive in completion order. `sink` is closed when the run ends,
/// successfully or not.
///
/// # Errors
///
/// As for [`run_each`], plus `RunError::SinkClosed` if the receiving side is
/// dropped while results are still being sent.
pub async fn run_each_into<T, F, Fut, R, E>(
    f: F,
    input: impl Stream<Item = T>,
    options: RunOptions,
    sink: ResultSender<T, R, E>,
) -> Result<(), RunError<E>>
where
    T: Clone,
    F: FnMut(T) -> Fut,
    Fut: Future<Output = Outcome<R, E>>,
{
    let clone_value: fn(&T) -> T = T::clone;
    let config = RunConfig::new(&options, Some(clone_value), Some(sink))?;
    drive(f, input, config).await.map(|_| ())
}
