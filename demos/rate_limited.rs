use std::time::{Duration, Instant};

use futures::StreamExt;
use meterflow::{RunOptions, iter, map_stream};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let began = Instant::now();

    // At most 3 requests in flight, 5 starts per second, bursts of 2.
    let options = RunOptions::new()
        .max_concurrent(3)
        .max_rate_per_second(5.0)
        .max_burst(2)
        .include_index(true)
        .include_value(true);

    let (responses, producer) = map_stream(
        |url: &'static str| async move {
            tokio::time::sleep(Duration::from_millis(300)).await;
            Ok::<_, String>(url.len())
        },
        iter([
            "https://example.com/a",
            "https://example.com/bb",
            "https://example.com/ccc",
            "https://example.com/dddd",
            "https://example.com/eeeee",
            "https://example.com/ffffff",
        ]),
        options,
    )
    .expect("valid options");
    let producer = tokio::spawn(producer);

    let mut responses = std::pin::pin!(responses);
    while let Some(response) = responses.next().await {
        match response {
            Ok(tagged) => println!(
                "[{:>5}ms] #{:?} {:?} -> {:?}",
                began.elapsed().as_millis(),
                tagged.index,
                tagged.value,
                tagged.result
            ),
            Err(err) => eprintln!("run failed: {err}"),
        }
    }

    producer.await.expect("producer task panicked");
}
