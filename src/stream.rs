//! Results of a run as a lazily consumed stream.
//!
//! [`map_stream`] splits a run in two halves joined by a bounded result
//! channel:
//! - a [`Producer`], the run itself, which the caller spawns on whatever
//!   executor it uses (or joins with the consumer),
//! - a [`MapStream`], which yields results as they complete.
//!
//! The producer keeps admitting inputs and filling the channel while the
//! consumer is busy, until the channel is full. The stream is a scoped
//! resource:
//! - a failure of the run is yielded once, after every result that made it
//!   into the channel,
//! - dropping the stream cancels the run together with all its in-flight tasks,
//! - dropping the producer ends the stream once the buffered results are read.

use std::{
    pin::Pin,
    task::{Context, Poll},
};

use futures::{
    Stream, StreamExt,
    channel::{mpsc, oneshot},
    future::{Fuse, FusedFuture, FutureExt},
    ready,
    stream::FusedStream,
};
use pin_project_lite::pin_project;
use tracing::debug;

use crate::{
    ConfigError, RunError, RunOptions,
    scheduler::drive,
    worker::{Outcome, ResultReceiver, RunConfig, Tagged},
};

/// How a finished run reports back to its stream.
type Report<E> = Result<usize, RunError<E>>;

pin_project! {
    /// The producing half of a [`map_stream`] run.
    ///
    /// Nothing runs until the producer is spawned or awaited. It completes
    /// when the run finishes, or as soon as its [`MapStream`] is dropped, in
    /// which case the run is abandoned. Panics of the run propagate to
    /// whoever polls the producer.
    #[must_use = "a run makes no progress unless its producer is spawned or awaited"]
    pub struct Producer<P: Future> {
        #[pin]
        run: P,
        report: Option<oneshot::Sender<P::Output>>,
    }
}

impl<P: Future> Future for Producer<P> {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        let this = self.project();
        let Some(report) = this.report.as_mut() else {
            return Poll::Ready(());
        };
        if report.poll_canceled(cx).is_ready() {
            debug!("result stream dropped, abandoning run");
            *this.report = None;
            return Poll::Ready(());
        }

        let output = ready!(this.run.poll(cx));
        if let Some(report) = this.report.take() {
            // The stream may be gone by now, nobody is left to tell.
            let _ = report.send(output);
        }
        Poll::Ready(())
    }
}

pin_project! {
    /// The consuming half of a [`map_stream`] run.
    ///
    /// Yields `Ok` for every delivered result, in completion order. If the
    /// run fails, the failure is yielded as a final `Err` item.
    #[must_use = "streams do nothing unless polled"]
    pub struct MapStream<T, R, E> {
        #[pin]
        report: Fuse<oneshot::Receiver<Report<E>>>,
        receiver: ResultReceiver<T, R, E>,
        failure: Option<RunError<E>>,
        done: bool,
    }
}

impl<T, R, E> MapStream<T, R, E> {
    /// Returns `true` once the run has stopped producing results.
    ///
    /// Results it already produced may still be buffered in the channel.
    #[must_use]
    pub fn is_producer_done(&self) -> bool {
        self.report.is_terminated()
    }
}

impl<T, R, E> Stream for MapStream<T, R, E> {
    type Item = Result<Tagged<T, Outcome<R, E>>, RunError<E>>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let mut this = self.project();
        if *this.done {
            return Poll::Ready(None);
        }

        if !this.report.is_terminated() {
            // A dropped producer is a canceled run, not a failed one.
            if let Poll::Ready(Ok(Err(err))) = this.report.as_mut().poll(cx) {
                *this.failure = Some(err);
            }
        }

        match this.receiver.poll_next_unpin(cx) {
            Poll::Ready(Some(tagged)) => Poll::Ready(Some(Ok(tagged))),
            // Closed and drained, and the run has reported how it ended.
            Poll::Ready(None) if this.report.is_terminated() => {
                *this.done = true;
                Poll::Ready(this.failure.take().map(Err))
            }
            // The channel closes just before the run reports.
            Poll::Ready(None) | Poll::Pending => Poll::Pending,
        }
    }
}

impl<T, R, E> FusedStream for MapStream<T, R, E> {
    fn is_terminated(&self) -> bool {
        self.done
    }
}

#[allow(clippy::type_complexity)]
pub(crate) fn open<T, F, Fut, R, E>(
    f: F,
    input: impl Stream<Item = T>,
    options: RunOptions,
    clone_value: Option<fn(&T) -> T>,
) -> Result<(MapStream<T, R, E>, Producer<impl Future<Output = Report<E>>>), ConfigError>
where
    F: FnMut(T) -> Fut,
    Fut: Future<Output = Outcome<R, E>>,
{
    let (sender, receiver) = mpsc::channel(options.buffer_size);
    let config = RunConfig::new(&options, clone_value, Some(sender))?;
    let (report_tx, report_rx) = oneshot::channel();

    let stream = MapStream {
        report: report_rx.fuse(),
        receiver,
        failure: None,
        done: false,
    };
    let producer = Producer {
        run: drive(f, input, config),
        report: Some(report_tx),
    };
    Ok((stream, producer))
}

/// Runs `f` on every input and returns a stream of the results, together
/// with the [`Producer`] that runs them.
///
/// Options are validated before anything runs. The producer must be spawned,
/// or awaited alongside the stream; it buffers up to
/// [`RunOptions::buffer_size`] results in the channel before waiting for the
/// consumer.
///
/// # Errors
///
/// A [`ConfigError`] if `options` is invalid.
///
/// # Example
/// ```
/// # use futures::StreamExt;
/// # use meterflow::{RunOptions, iter, map_stream};
/// # async {
/// let (results, producer) = map_stream(
///     |x: u32| async move { Ok::<_, std::convert::Infallible>(x * 2) },
///     iter([1, 2, 3]),
///     RunOptions::new().include_index(true).buffer_size(8),
/// )
/// .unwrap();
/// tokio::spawn(producer);
///
/// let mut results = std::pin::pin!(results);
/// while let Some(result) = results.next().await {
///     let tagged = result.unwrap();
///     println!("{:?} -> {:?}", tagged.index, tagged.result);
/// }
/// # };
/// ```
#[allow(clippy::type_complexity)]
pub fn map_stream<T, F, Fut, R, E>(
    f: F,
    input: impl Stream<Item = T>,
    options: RunOptions,
) -> Result<
    (
        MapStream<T, R, E>,
        Producer<impl Future<Output = Result<usize, RunError<E>>>>,
    ),
    ConfigError,
>
where
    T: Clone,
    F: FnMut(T) -> Fut,
    Fut: Future<Output = Outcome<R, E>>,
{
    let clone_value: fn(&T) -> T = T::clone;
    open(f, input, options, Some(clone_value))
}
