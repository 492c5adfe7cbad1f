// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! End-to-end scenarios against a live Go target, ported from spec.md §8's
//! seed-test list. Each test reads its target pid from an environment
//! variable rather than spawning one itself, since this crate has no Go
//! toolchain dependency; a CI job that does have one is expected to build
//! the fixture binary, launch it, export the pid, then run these with
//! `cargo test -- --ignored`.

use spy_core::GoProcess;

fn target_pid(var: &str) -> Option<i32> {
    std::env::var(var).ok()?.parse().ok()
}

/// Precondition: `GOSPY_E2E_PID` names a running process built from a
/// plain `func main() { select {} }`-style Go binary (any recent Go
/// version is fine — the version under test is read back, not asserted
/// against a fixed string).
#[test]
#[ignore]
fn compatibility_smoke() {
    let pid = target_pid("GOSPY_E2E_PID").expect("set GOSPY_E2E_PID to a running Go target's pid");
    let proc = GoProcess::attach(pid).expect("attach");

    let facts = proc.runtime_info().expect("runtime_info");
    assert!(!facts.version.is_empty());

    let tasks = proc.tasks(false).expect("tasks");
    assert!(!tasks.is_empty());
    assert!(tasks.iter().any(|t| t.start_func.as_deref().is_some_and(|s| !s.is_empty())));
}

/// Precondition: `GOSPY_E2E_PID` names a target started with
/// `GOMAXPROCS=GOSPY_E2E_PROCS` (default 4 if the latter is unset).
#[test]
#[ignore]
fn processor_count() {
    let pid = target_pid("GOSPY_E2E_PID").expect("set GOSPY_E2E_PID to a running Go target's pid");
    let want: usize = std::env::var("GOSPY_E2E_PROCS")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(4);

    let proc = GoProcess::attach(pid).expect("attach");
    let mut ps = proc.processors().expect("processors");
    ps.sort_by_key(|p| p.id);

    assert_eq!(ps.len(), want);
    for (i, p) in ps.iter().enumerate() {
        assert_eq!(p.id as usize, i);
    }
}

/// Precondition: `GOSPY_E2E_PID` names a target with at least one
/// goroutine permanently blocked on an unbuffered channel receive.
#[test]
#[ignore]
fn wait_reason_labeling() {
    let pid = target_pid("GOSPY_E2E_PID").expect("set GOSPY_E2E_PID to a running Go target's pid");
    let proc = GoProcess::attach(pid).expect("attach");
    let tasks = proc.tasks(false).expect("tasks");

    let blocked = tasks.iter().find(|t| {
        t.status == "waiting"
            && t.wait_reason.as_deref().is_some_and(|r| r.contains("chan receive"))
    });
    assert!(blocked.is_some(), "expected a task blocked on chan receive");
}

/// Precondition: `GOSPY_E2E_PID` names a target spawning 5 busy loops, 3
/// channel-blocked, 2 mutex-blocked, 4 sleeping goroutines (plus whatever
/// runtime-internal goroutines that Go version itself keeps alive).
#[test]
#[ignore]
fn status_distribution() {
    let pid = target_pid("GOSPY_E2E_PID").expect("set GOSPY_E2E_PID to a running Go target's pid");
    let proc = GoProcess::attach(pid).expect("attach");
    let tasks = proc.tasks(false).expect("tasks");

    let running = tasks.iter().filter(|t| t.status == "running" || t.status == "runnable").count();
    let chan_blocked = tasks
        .iter()
        .filter(|t| t.wait_reason.as_deref().is_some_and(|r| r.contains("chan")))
        .count();
    let mutex_blocked = tasks
        .iter()
        .filter(|t| {
            t.wait_reason
                .as_deref()
                .is_some_and(|r| r.contains("sync") || r.contains("mutex"))
        })
        .count();
    let sleeping = tasks
        .iter()
        .filter(|t| t.wait_reason.as_deref().is_some_and(|r| r.contains("sleep")))
        .count();

    assert!(running >= 5, "expected >= 5 running/runnable tasks, got {running}");
    assert!(chan_blocked >= 3, "expected >= 3 chan-blocked tasks, got {chan_blocked}");
    assert!(mutex_blocked >= 2, "expected >= 2 mutex-blocked tasks, got {mutex_blocked}");
    assert!(sleeping >= 4, "expected >= 4 sleeping tasks, got {sleeping}");
}

/// Precondition: `GOSPY_E2E_PID` names any live target; `GOSPY_E2E_TASK`
/// names the id of a currently-running (non-idle) task in it.
#[test]
#[ignore]
fn stack_unwind_non_empty() {
    let pid = target_pid("GOSPY_E2E_PID").expect("set GOSPY_E2E_PID to a running Go target's pid");
    let task_id: u64 = std::env::var("GOSPY_E2E_TASK")
        .expect("set GOSPY_E2E_TASK to a running task id")
        .parse()
        .expect("GOSPY_E2E_TASK must be a u64");

    let proc = GoProcess::attach(pid).expect("attach");
    let frames = proc.task_stack_trace(task_id).expect("task_stack_trace");
    assert!(!frames.is_empty());
    assert!(!frames[0].func_name.is_empty());
}
