//! Scheduler admission: the global cap, duplicate ids and unknown commands.

mod common;

use std::time::Duration;

use common::{register_sleep, sleep_cmd, test_pm, Results};
use jobvisor::{Args, Command, JobState};

#[tokio::test]
async fn concurrency_cap_delays_the_third_job() {
    let (pm, _dir) = test_pm(2);
    register_sleep(&pm);
    let results = Results::new();
    pm.add_result_handler(results.handler());
    pm.run().unwrap();

    for id in ["a", "b", "c"] {
        pm.push_cmd(sleep_cmd(id, 200)).await.unwrap();
    }

    // The live set must never exceed the cap while all three are in flight.
    for _ in 0..10 {
        assert!(pm.runners().await.len() <= 2);
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    let all = results.wait_for(3, Duration::from_secs(5)).await;
    assert!(all.iter().all(|r| r.state == JobState::Success));

    let start = |id: &str| all.iter().find(|r| r.cmd_id == id).unwrap().start_time;
    // a and b are admitted together; c waits for a slot.
    assert!((start("a") - start("b")).abs() < 100);
    let first_two = start("a").min(start("b"));
    assert!(
        start("c") >= first_two + 150,
        "c started too early: a/b at {first_two}, c at {}",
        start("c")
    );
}

#[tokio::test]
async fn max_jobs_one_serializes_everything() {
    let (pm, _dir) = test_pm(1);
    register_sleep(&pm);
    let results = Results::new();
    pm.add_result_handler(results.handler());
    pm.run().unwrap();

    for id in ["a", "b", "c"] {
        pm.push_cmd(sleep_cmd(id, 100)).await.unwrap();
    }

    let all = results.wait_for(3, Duration::from_secs(5)).await;
    let mut starts: Vec<i64> = all.iter().map(|r| r.start_time).collect();
    starts.sort_unstable();
    assert!(starts.windows(2).all(|w| w[1] - w[0] >= 80), "starts overlap: {starts:?}");
}

#[tokio::test]
async fn duplicate_id_is_rejected_without_touching_the_live_job() {
    let (pm, _dir) = test_pm(4);
    register_sleep(&pm);
    let results = Results::new();
    pm.add_result_handler(results.handler());
    pm.run().unwrap();

    pm.push_cmd(sleep_cmd("x", 300)).await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    pm.push_cmd(sleep_cmd("x", 300)).await.unwrap();

    // The rejection arrives promptly, while the first job still runs.
    let first = results.wait_for(1, Duration::from_millis(200)).await;
    assert_eq!(first[0].state, JobState::DuplicateId);
    assert!(first[0].data.contains('x'));
    assert_eq!(pm.runners().await.len(), 1);

    let all = results.wait_for(2, Duration::from_secs(5)).await;
    assert!(all.iter().any(|r| r.state == JobState::Success));
}

#[tokio::test]
async fn unknown_command_yields_a_synthetic_result() {
    let (pm, _dir) = test_pm(4);
    let results = Results::new();
    pm.add_result_handler(results.handler());
    pm.run().unwrap();

    let cmd = Command::new("j", "nope")
        .with_tags("route")
        .with_args(Args::new().with("custom", 1));
    pm.push_cmd(cmd).await.unwrap();

    let all = results.wait_for(1, Duration::from_secs(2)).await;
    assert_eq!(all[0].state, JobState::UnknownCmd);
    assert!(all[0].data.contains("nope"));
    assert!(pm.runners().await.is_empty());

    // Routing law: results mirror the command's tags and args.
    assert_eq!(all[0].tags, "route");
    assert_eq!(all[0].args.get_int("custom"), Some(1));
}

#[tokio::test]
async fn kill_is_idempotent() {
    let (pm, _dir) = test_pm(4);
    register_sleep(&pm);
    let results = Results::new();
    pm.add_result_handler(results.handler());
    pm.run().unwrap();

    pm.push_cmd(sleep_cmd("k", 5_000)).await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert!(pm.kill("k").await);
    pm.kill("k").await;
    pm.kill("k").await;

    let all = results.wait_for(1, Duration::from_secs(2)).await;
    assert_eq!(all[0].state, JobState::Killed);

    // Terminal cleanup runs right after the result fan-out; repeated kills
    // must not have produced extra results or left the runner registered.
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(results.all().len(), 1);
    assert!(!pm.kill("k").await);
}
