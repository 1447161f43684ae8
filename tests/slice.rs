//! Dependency-ordered slice startup.

mod common;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use common::{test_pm, Results};
use jobvisor::{InternalFn, JobResult, JobState, ProcessManager, StartupEntry};

/// Registers `step`, recording the order in which entries actually start.
fn register_step(pm: &ProcessManager, order: Arc<Mutex<Vec<String>>>) {
    pm.register(
        "step",
        InternalFn::arc(move |cmd, _ctx| {
            let order = order.clone();
            async move {
                order.lock().unwrap().push(cmd.id.clone());
                tokio::time::sleep(Duration::from_millis(30)).await;
                JobResult::new(&cmd, JobState::Success)
            }
        }),
    );
}

#[tokio::test]
async fn entries_start_in_dependency_order() {
    let (pm, _dir) = test_pm(8);
    let order = Arc::new(Mutex::new(Vec::new()));
    register_step(&pm, order.clone());
    pm.run().unwrap();

    pm.run_slice(vec![
        StartupEntry::new("a", "step").with_must_exit(true),
        StartupEntry::new("b", "step").with_after(["a"]).with_must_exit(true),
        StartupEntry::new("c", "step").with_after(["a", "b"]).with_must_exit(true),
    ])
    .await;

    assert_eq!(*order.lock().unwrap(), vec!["a", "b", "c"]);
}

#[tokio::test]
async fn a_failed_dependency_keeps_dependents_from_starting() {
    let (pm, _dir) = test_pm(8);
    let order = Arc::new(Mutex::new(Vec::new()));
    register_step(&pm, order.clone());
    pm.register(
        "fail",
        InternalFn::arc(|cmd, _ctx| async move {
            JobResult::new(&cmd, JobState::Error).with_data("init exploded")
        }),
    );
    let results = Results::new();
    pm.add_result_handler(results.handler());
    pm.run().unwrap();

    pm.run_slice(vec![
        StartupEntry::new("a", "fail").with_must_exit(true),
        StartupEntry::new("b", "step").with_after(["a"]).with_must_exit(true),
        StartupEntry::new("c", "step").with_after(["a", "b"]).with_must_exit(true),
    ])
    .await;

    // Nothing but the failing entry ran.
    assert!(order.lock().unwrap().is_empty());

    let all = results.wait_for(3, Duration::from_secs(2)).await;
    assert_eq!(all.len(), 3);
    assert_eq!(results.for_cmd("a").unwrap().state, JobState::Error);
    for id in ["b", "c"] {
        let result = results.for_cmd(id).unwrap();
        assert_eq!(result.state, JobState::Error);
        assert!(result.data.contains("dependency failed"), "data: {}", result.data);
    }
}

#[tokio::test]
async fn external_dependencies_are_assumed_satisfied() {
    let (pm, _dir) = test_pm(8);
    let order = Arc::new(Mutex::new(Vec::new()));
    register_step(&pm, order.clone());
    pm.run().unwrap();

    pm.run_slice(vec![StartupEntry::new("svc", "step")
        .with_after(["something-outside-the-slice"])
        .with_must_exit(true)])
    .await;

    assert_eq!(*order.lock().unwrap(), vec!["svc"]);
}

#[tokio::test]
async fn services_release_on_start_not_exit() {
    let (pm, _dir) = test_pm(8);
    let order = Arc::new(Mutex::new(Vec::new()));
    register_step(&pm, order.clone());

    // A long-lived service; with must_exit unset its key releases once it
    // is observed up, so dependents start while it still runs.
    pm.register(
        "service",
        InternalFn::arc(move |cmd, ctx| async move {
            ctx.cancelled().await;
            JobResult::new(&cmd, JobState::Success)
        }),
    );
    pm.run().unwrap();

    let slice = {
        let pm = pm.clone();
        tokio::spawn(async move {
            pm.run_slice(vec![
                StartupEntry::new("daemon", "service"),
                StartupEntry::new("client", "step").with_after(["daemon"]).with_must_exit(true),
            ])
            .await;
        })
    };

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(*order.lock().unwrap(), vec!["client"]);
    assert_eq!(pm.runners().await.len(), 1, "daemon should still be live");

    pm.kill("daemon").await;
    slice.await.unwrap();
}
