use futures::Stream;

use crate::{
    ConfigError, RunError, RunOptions,
    scheduler::run_each,
    stream::{MapStream, Producer, map_stream},
    worker::Outcome,
};

/// Extend `Stream` with metered runs over its items.
pub trait MeterStreamExt: Stream {
    /// Runs `f` on every item, see [`run_each`](crate::run_each).
    fn run_each_metered<F, Fut, R, E>(
        self,
        f: F,
        options: RunOptions,
    ) -> impl Future<Output = Result<(), RunError<E>>>
    where
        Self: Sized,
        F: FnMut(Self::Item) -> Fut,
        Fut: Future<Output = Outcome<R, E>>,
    {
        run_each(f, self, options)
    }

    /// Maps every item through `f`, see [`map_stream`](crate::map_stream).
    ///
    /// The returned [`Producer`] must be spawned or awaited for the stream to
    /// make progress.
    #[allow(clippy::type_complexity)]
    fn map_metered<F, Fut, R, E>(
        self,
        f: F,
        options: RunOptions,
    ) -> Result<
        (
            MapStream<Self::Item, R, E>,
            Producer<impl Future<Output = Result<usize, RunError<E>>>>,
        ),
        ConfigError,
    >
    where
        Self: Sized,
        Self::Item: Clone,
        F: FnMut(Self::Item) -> Fut,
        Fut: Future<Output = Outcome<R, E>>,
    {
        map_stream(f, self, options)
    }
}

impl<S> MeterStreamExt for S where S: Stream {}
