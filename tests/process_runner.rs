#![cfg(unix)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use toolrack::{Command, Error, ListenerSet, ProcessRunner, RunMode};

fn sh(script: &str) -> Command {
    Command::builder("sh").fixed(["-c", script]).build()
}

#[tokio::test]
async fn async_exit_code_one_fails_get() {
    let runner = ProcessRunner::new(RunMode::Async).capture_output(true);
    let future = runner.run(&sh("echo partial; exit 1"), None, &HashMap::new()).await.unwrap();

    assert!(matches!(
        future.get().await,
        Err(Error::ProcessExecution { exit_code: 1 })
    ));
    assert_eq!(future.exit_code(), Some(1));
    assert_eq!(future.output(), "partial");
}

#[tokio::test]
async fn runner_launches_only_once() {
    let runner = ProcessRunner::new(RunMode::Sync);
    runner.run(&sh("true"), None, &HashMap::new()).await.unwrap();
    let err = runner.run(&sh("true"), None, &HashMap::new()).await.unwrap_err();
    assert!(matches!(err, Error::AlreadyLaunched));
}

#[tokio::test]
async fn environment_and_working_directory_are_applied() {
    let dir = tempfile::tempdir().unwrap();
    let env = HashMap::from([("TOOLRACK_PROBE".to_string(), "42".to_string())]);
    let runner = ProcessRunner::new(RunMode::Sync).capture_output(true);
    let future = runner
        .run(&sh("echo $TOOLRACK_PROBE; pwd -P; echo ${HOME:+inherited}"), Some(dir.path()), &env)
        .await
        .unwrap();

    let output = future.get().await.unwrap();
    let lines: Vec<&str> = output.lines().collect();
    assert_eq!(lines[0], "42");
    assert_eq!(lines[1], dir.path().canonicalize().unwrap().to_str().unwrap());
    if std::env::var_os("HOME").is_some() {
        assert_eq!(lines[2], "inherited");
    }
}

#[tokio::test]
async fn cancelling_a_running_process_kills_it() {
    let exits = Arc::new(Mutex::new(Vec::new()));
    let recorded = exits.clone();
    let runner = ProcessRunner::new(RunMode::Async).listeners(
        ListenerSet::new().exit(Arc::new(move |code: i32| recorded.lock().unwrap().push(code))),
    );
    let future = runner.run(&sh("sleep 30"), None, &HashMap::new()).await.unwrap();
    assert!(!future.is_done());

    assert!(future.cancel(true));
    assert!(future.is_cancelled());
    assert!(matches!(future.get().await, Err(Error::Cancelled)));

    tokio::time::timeout(Duration::from_secs(5), async {
        while exits.lock().unwrap().is_empty() {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .unwrap();
    assert_eq!(*exits.lock().unwrap(), [-1]);
}

#[tokio::test]
async fn soft_cancel_after_exit_changes_nothing() {
    let runner = ProcessRunner::new(RunMode::Sync).capture_output(true);
    let future = runner.run(&sh("echo done"), None, &HashMap::new()).await.unwrap();

    assert!(!future.cancel(false));
    assert!(!future.is_cancelled());
    assert_eq!(future.get().await.unwrap(), "done");
}

#[tokio::test]
async fn every_line_is_delivered_before_the_exit_callback() {
    let events = Arc::new(Mutex::new(Vec::new()));
    let (on_line, on_exit, on_start) = (events.clone(), events.clone(), events.clone());
    let listeners = ListenerSet::new()
        .start(Arc::new(move |pid: Option<u32>| {
            on_start.lock().unwrap().push(format!("start {}", pid.is_some()))
        }))
        .stdout(Arc::new(move |line: &str| on_line.lock().unwrap().push(line.to_string())))
        .exit(Arc::new(move |code: i32| on_exit.lock().unwrap().push(format!("exit {code}"))));
    let runner = ProcessRunner::new(RunMode::Async).listeners(listeners);

    let future = runner
        .run(&sh("for i in 1 2 3 4 5; do echo line$i; done"), None, &HashMap::new())
        .await
        .unwrap();
    future.get().await.unwrap();

    assert_eq!(
        *events.lock().unwrap(),
        ["start true", "line1", "line2", "line3", "line4", "line5", "exit 0"]
    );
}

#[tokio::test]
async fn async_launch_failure_is_reported_by_the_future() {
    let runner = ProcessRunner::new(RunMode::Async);
    let command = Command::builder("/definitely/not/a/tool").build();
    let future = runner.run(&command, None, &HashMap::new()).await.unwrap();

    assert!(future.is_done());
    assert!(future.pid().is_none());
    assert!(matches!(future.get().await, Err(Error::ProcessLaunch { .. })));
}

#[tokio::test]
async fn invalid_utf8_does_not_stop_the_reader() {
    let runner = ProcessRunner::new(RunMode::Async).capture_output(true);
    let future = runner
        .run(&sh("printf 'bad \\377 byte\\n'; echo after"), None, &HashMap::new())
        .await
        .unwrap();

    assert_eq!(future.get().await.unwrap(), "bad \u{fffd} byte\nafter");
    assert_eq!(future.exit_code(), Some(0));
}

#[tokio::test]
async fn bulk_output_after_invalid_utf8_is_drained() {
    let lines = Arc::new(Mutex::new(0usize));
    let counted = lines.clone();
    let runner = ProcessRunner::new(RunMode::Sync).listeners(
        ListenerSet::new().stdout(Arc::new(move |_line: &str| *counted.lock().unwrap() += 1)),
    );
    let script = "printf '\\377\\n'; i=0; while [ $i -lt 20000 ]; do echo line$i; i=$((i+1)); done";
    let future = runner.run(&sh(script), None, &HashMap::new()).await.unwrap();

    assert_eq!(future.exit_code(), Some(0));
    assert_eq!(*lines.lock().unwrap(), 20001);
}

#[tokio::test]
async fn exit_is_visible_while_a_grandchild_holds_the_pipe() {
    let runner = ProcessRunner::new(RunMode::Async).capture_output(true);
    let future = runner
        .run(&sh("sleep 5 & echo hi; exit 0"), None, &HashMap::new())
        .await
        .unwrap();

    // Well inside the drain window, which keeps `get` pending.
    let deadline = Instant::now() + Duration::from_millis(1500);
    while !future.is_done() && Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(future.is_done());
    assert_eq!(future.exit_code(), Some(0));

    assert!(!future.cancel(false));
    assert!(!future.is_cancelled());
    assert_eq!(future.get().await.unwrap(), "hi");
}
