use std::time::Duration;

use futures::stream;
use meterflow::{RunError, RunOptions, iter, run_all};

async fn add_one(x: u32) -> Result<u32, &'static str> {
    Ok(x + 1)
}

#[tokio::test(flavor = "multi_thread")]
async fn run_all_returns_results_in_submission_order() {
    let calls = (10..13).map(|x| move || add_one(x));
    let results = run_all(iter(calls), RunOptions::new()).await.unwrap();
    assert_eq!(results, vec![Ok(11), Ok(12), Ok(13)]);
}

#[tokio::test(flavor = "multi_thread")]
async fn run_all_order_ignores_completion_order() {
    let delays = [10, 120, 0, 40];
    let calls = delays.into_iter().enumerate().map(|(i, delay)| {
        move || async move {
            tokio::time::sleep(Duration::from_millis(delay)).await;
            Ok::<_, &str>(i)
        }
    });

    let results = run_all(iter(calls), RunOptions::new()).await.unwrap();
    assert_eq!(
        results,
        vec![Ok(0), Ok(1), Ok(2), Ok(3)],
        "Slow second task should still land in slot 1"
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn run_all_without_length_hint() {
    let calls = stream::unfold(0u32, |x| async move {
        (x < 5).then(|| (move || add_one(x), x + 1))
    });

    let results = run_all(calls, RunOptions::new().max_concurrent(2))
        .await
        .unwrap();
    assert_eq!(results, vec![Ok(1), Ok(2), Ok(3), Ok(4), Ok(5)]);
}

#[tokio::test(flavor = "multi_thread")]
async fn run_all_empty_input() {
    let calls = Vec::<fn() -> futures::future::Ready<Result<u32, &'static str>>>::new();
    let results = run_all(iter(calls), RunOptions::new()).await.unwrap();
    assert!(results.is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn run_all_captures_failures_in_place() {
    let calls = (0..4u32).map(|x| {
        move || async move {
            tokio::time::sleep(Duration::from_millis(u64::from(4 - x) * 10)).await;
            if x == 2 { Err("two") } else { Ok(x) }
        }
    });

    let results = run_all(iter(calls), RunOptions::new().capture_outcome(true))
        .await
        .unwrap();
    assert_eq!(results, vec![Ok(0), Ok(1), Err("two"), Ok(3)]);
}

#[tokio::test(flavor = "multi_thread")]
async fn run_all_fails_fast_without_capture() {
    let calls = (0..4u32).map(|x| {
        move || async move {
            if x == 1 {
                return Err("one");
            }
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok(x)
        }
    });

    let r = run_all(iter(calls), RunOptions::new()).await;
    assert!(
        matches!(
            r,
            Err(RunError::Task {
                index: 1,
                source: "one"
            })
        ),
        "First failure should end the run"
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn run_all_ignores_value_tagging() {
    let calls = (0..3).map(|x| move || add_one(x));
    let results = run_all(
        iter(calls),
        RunOptions::new()
            .include_value(true)
            .include_index(false)
            .max_rate_per_second(200.0)
            .max_burst(3),
    )
    .await
    .unwrap();
    assert_eq!(results, vec![Ok(1), Ok(2), Ok(3)]);
}
