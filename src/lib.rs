//! Concurrency and rate limited execution of async work.
//!
//! `meterflow` runs an async function over every item of a stream, starting
//! tasks only as fast as a set of admission policies ("meters") allow:
//! - a cap on how many tasks run at once,
//! - a token bucket limiting the start rate, with bursts,
//! - any custom [`Meter`] implementation.
//!
//! Three entry points cover the common shapes:
//! - [`run_each`] / [`run_each_into`] run everything and optionally send each
//!   result to a channel,
//! - [`map_stream`] exposes the results as a backpressured stream, fed by a
//!   [`Producer`] the caller spawns,
//! - [`run_all`] collects results in submission order.
//!
//! A failing task ends its run and cancels its siblings unless outcome
//! capture is enabled, in which case the error is delivered as that task's
//! result. Dropping a run, or the stream returned by [`map_stream`], cancels
//! every task it started.
//!
//! The crate does not depend on a specific async runtime. Rate limit waits
//! use `async-io` timers, which run on their own driver thread, so runs can
//! be driven by tokio, smol, or a plain `block_on`.

mod aggregate;
pub mod error;
pub mod meter;
pub mod options;
mod scheduler;
pub mod stream;
pub mod stream_ext;
pub mod worker;

pub use aggregate::run_all;
pub use error::{ConfigError, RunError};
pub use futures::stream::iter;
pub use meter::{MaxMeter, Meter, MeterState, TokenBucketMeter};
pub use options::RunOptions;
pub use scheduler::{run_each, run_each_into};
pub use stream::{MapStream, Producer, map_stream};
pub use stream_ext::MeterStreamExt;
pub use worker::{Outcome, ResultReceiver, ResultSender, Tagged, result_channel};
