use std::time::Duration;

use meterflow::{RunOptions, iter, run_all};

async fn slow_square(x: u64) -> Result<u64, String> {
    // Larger inputs finish first.
    tokio::time::sleep(Duration::from_millis(100 * (5 - x))).await;
    if x == 3 {
        return Err(format!("refusing to square {x}"));
    }
    Ok(x * x)
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let calls = (0..5).map(|x| move || slow_square(x));
    let results = run_all(
        iter(calls),
        RunOptions::new().max_concurrent(2).capture_outcome(true),
    )
    .await
    .expect("captured failures do not end the run");

    for (i, result) in results.iter().enumerate() {
        println!("{i}: {result:?}");
    }
    assert_eq!(results[4], Ok(16));
    assert!(results[3].is_err());
}
