use std::{
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use futures::StreamExt;
use meterflow::{ConfigError, RunError, RunOptions, iter, result_channel, run_each, run_each_into};

#[tokio::test(flavor = "multi_thread")]
async fn run_each_runs_every_input() {
    let ran_on = Arc::new(Mutex::new(Vec::new()));
    let ran_on_cl = Arc::clone(&ran_on);

    let r = run_each(
        move |x: u32| {
            let ran_on = Arc::clone(&ran_on_cl);
            async move {
                ran_on.lock().unwrap().push(x);
                Ok::<_, &str>(x + 1)
            }
        },
        iter([1, 2, 3]),
        RunOptions::new(),
    )
    .await;

    assert!(r.is_ok(), "Run should succeed");
    let mut ran_on = ran_on.lock().unwrap().clone();
    ran_on.sort();
    assert_eq!(ran_on, vec![1, 2, 3], "Every input should run exactly once");
}

#[tokio::test(flavor = "multi_thread")]
async fn run_each_empty_input() {
    let r = run_each(
        |x: u32| async move { Ok::<_, &str>(x) },
        iter(Vec::new()),
        RunOptions::new().max_concurrent(1),
    )
    .await;
    assert!(r.is_ok(), "Empty input should complete immediately");
}

#[tokio::test(flavor = "multi_thread")]
async fn run_each_capture_without_sink_is_rejected() {
    let invoked = Arc::new(AtomicUsize::new(0));
    let invoked_cl = Arc::clone(&invoked);

    let r = run_each(
        move |x: u32| {
            invoked_cl.fetch_add(1, Ordering::Relaxed);
            async move { Ok::<_, &str>(x) }
        },
        iter([1, 2, 3]),
        RunOptions::new().capture_outcome(true),
    )
    .await;

    assert!(
        matches!(r, Err(RunError::Config(ConfigError::CaptureWithoutSink))),
        "Capturing without a sink should be a configuration error"
    );
    assert_eq!(invoked.load(Ordering::Relaxed), 0, "No task should run");
}

#[tokio::test(flavor = "multi_thread")]
async fn run_each_invalid_meter_is_rejected() {
    let r = run_each(
        |x: u32| async move { Ok::<_, &str>(x) },
        iter([1]),
        RunOptions::new().max_rate_per_second(-1.0),
    )
    .await;

    assert!(
        matches!(
            r,
            Err(RunError::Config(ConfigError::NonPositive {
                name: "max_per_second",
                ..
            }))
        ),
        "Negative rate should be rejected"
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn run_each_fails_fast() {
    let finished = Arc::new(AtomicUsize::new(0));
    let finished_cl = Arc::clone(&finished);

    let r = run_each(
        move |x: u32| {
            let finished = Arc::clone(&finished_cl);
            async move {
                if x == 2 {
                    return Err("task 2 failed");
                }
                tokio::time::sleep(Duration::from_millis(500)).await;
                finished.fetch_add(1, Ordering::Relaxed);
                Ok(x)
            }
        },
        iter(0..5),
        RunOptions::new(),
    )
    .await;

    let err = r.unwrap_err();
    assert_eq!(err.task_index(), Some(2), "Failure should name its input");
    assert_eq!(err.into_task_error(), Some("task 2 failed"));

    tokio::time::sleep(Duration::from_millis(600)).await;
    assert_eq!(
        finished.load(Ordering::Relaxed),
        0,
        "Sibling tasks should have been canceled"
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn run_each_stops_infinite_input_on_failure() {
    let r = run_each(
        |x: usize| async move {
            tokio::time::sleep(Duration::from_millis(1)).await;
            if x == 20 { Err(x) } else { Ok(x) }
        },
        futures::stream::iter(0..),
        RunOptions::new().max_concurrent(4),
    )
    .await;

    assert_eq!(r.unwrap_err().into_task_error(), Some(20));
}

#[tokio::test(flavor = "multi_thread")]
async fn run_each_into_delivers_tagged_results() {
    let (tx, rx) = result_channel(0);

    let (r, mut results) = futures::join!(
        run_each_into(
            |x: u32| async move { Ok::<_, &str>(x * 10) },
            iter([1, 2, 3]),
            RunOptions::new().include_index(true).include_value(true),
            tx,
        ),
        rx.collect::<Vec<_>>(),
    );

    assert!(r.is_ok(), "Run should succeed");
    results.sort_by_key(|tagged| tagged.index);
    let tags: Vec<_> = results
        .into_iter()
        .map(|tagged| (tagged.index, tagged.value, tagged.result))
        .collect();
    assert_eq!(
        tags,
        vec![
            (Some(0), Some(1), Ok(10)),
            (Some(1), Some(2), Ok(20)),
            (Some(2), Some(3), Ok(30)),
        ]
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn run_each_into_captures_failures() {
    let (tx, rx) = result_channel(4);

    let (r, results) = futures::join!(
        run_each_into(
            |x: u32| async move {
                if x % 2 == 0 { Err(x) } else { Ok(x) }
            },
            iter(0..4),
            RunOptions::new().capture_outcome(true).include_index(true),
            tx,
        ),
        rx.collect::<Vec<_>>(),
    );

    assert!(r.is_ok(), "Captured failures should not fail the run");
    assert_eq!(results.len(), 4, "Every input should report");
    for tagged in results {
        let index = tagged.index.unwrap() as u32;
        if index % 2 == 0 {
            assert_eq!(tagged.result, Err(index), "Even inputs should fail");
        } else {
            assert_eq!(tagged.result, Ok(index), "Odd inputs should succeed");
        }
        assert_eq!(tagged.value, None, "Values were not requested");
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn run_each_into_closes_sink_on_failure() {
    let (tx, rx) = result_channel(8);

    let (r, results) = futures::join!(
        run_each_into(
            |x: u32| async move {
                if x == 0 {
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    Err("late failure")
                } else {
                    Ok(x)
                }
            },
            iter(0..3),
            RunOptions::new(),
            tx,
        ),
        rx.collect::<Vec<_>>(),
    );

    assert!(matches!(r, Err(RunError::Task { index: 0, .. })));
    assert_eq!(results.len(), 2, "Results before the failure are kept");
}

#[tokio::test(flavor = "multi_thread")]
async fn run_each_into_dropped_receiver() {
    let (tx, rx) = result_channel(0);
    drop(rx);

    let r = run_each_into(
        |x: u32| async move { Ok::<_, &str>(x) },
        iter([1, 2]),
        RunOptions::new(),
        tx,
    )
    .await;

    assert!(
        matches!(r, Err(RunError::SinkClosed)),
        "Sending to a dropped receiver should end the run"
    );
}
