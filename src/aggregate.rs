//! Collecting the results of a run in submission order.

use std::pin::pin;

use futures::{Stream, StreamExt, future::join};
use tracing::trace;

use crate::{
    RunError, RunOptions,
    stream::{MapStream, open},
    worker::{Outcome, Tagged},
};

/// Runs every callable and returns their results in submission order.
///
/// Each callable is invoked once, under the meters configured in `options`.
/// Results are placed by input index, so slot `i` always holds the result of
/// the `i`-th callable however the tasks finish relative to each other.
/// Index tagging is forced on and value tagging off, whatever `options` say.
///
/// The stream's `size_hint` lower bound is used to preallocate the output.
///
/// # Errors
///
/// - `RunError::Config` if `options` is invalid.
/// - `RunError::Task` with the first error, unless outcome capture is enabled,
///   in which case errors are returned in their slot instead.
///
/// # Example
/// ```
/// # use meterflow::{RunOptions, iter, run_all};
/// # async {
/// let add_one = |x: u32| async move { Ok::<_, std::convert::Infallible>(x + 1) };
/// let calls = (10..13).map(|x| move || add_one(x));
///
/// let results = run_all(iter(calls), RunOptions::new()).await.unwrap();
/// assert_eq!(results, vec![Ok(11), Ok(12), Ok(13)]);
/// # };
/// ```
pub async fn run_all<C, Fut, R, E>(
    calls: impl Stream<Item = C>,
    options: RunOptions,
) -> Result<Vec<Outcome<R, E>>, RunError<E>>
where
    C: FnOnce() -> Fut,
    Fut: Future<Output = Outcome<R, E>>,
{
    let (hint, _) = calls.size_hint();
    let options = options.include_index(true).include_value(false);
    let (results, producer) = open(|call: C| call(), calls, options, None)?;

    // Returning early drops the stream, which makes the producer give up too.
    let ((), collected) = join(producer, collect_in_order(results, hint)).await;
    collected
}

async fn collect_in_order<T, R, E>(
    results: MapStream<T, R, E>,
    hint: usize,
) -> Result<Vec<Outcome<R, E>>, RunError<E>> {
    let mut results = pin!(results);
    let mut slots: Vec<Option<Outcome<R, E>>> = Vec::with_capacity(hint);
    slots.resize_with(hint, || None);
    let mut len = 0;

    while let Some(tagged) = results.next().await {
        let Tagged { index, result, .. } = tagged?;
        // Always set, index tagging is forced on above.
        let Some(index) = index else {
            continue;
        };
        trace!(index, "result collected");
        if index >= slots.len() {
            slots.resize_with(index + 1, || None);
        }
        slots[index] = Some(result);
        len = len.max(index + 1);
    }

    // Every input below `len` reported exactly once, so no slot is left empty.
    slots.truncate(len);
    Ok(slots.into_iter().flatten().collect())
}
