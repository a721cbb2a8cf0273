use std::time::Duration;

use macro_rules_attribute::apply;
use meterflow::{RunOptions, iter, result_channel, run_each_into};
use smol::{Timer, stream::StreamExt};
use smol_macros::{Executor, main};

async fn work(x: u32) -> Result<u32, String> {
    Timer::after(Duration::from_millis(u64::from(x) * 10)).await;
    Ok(x * 2)
}

#[apply(main!)]
async fn main(ex: &Executor<'_>) {
    let (sink, mut results) = result_channel(2);

    let run = ex.spawn(run_each_into(
        work,
        iter(0..10),
        RunOptions::new().max_concurrent(4).include_index(true),
        sink,
    ));

    while let Some(tagged) = results.next().await {
        println!("input {:?} -> {:?}", tagged.index, tagged.result);
    }

    run.await.expect("run should succeed");
    println!("All done");
}
