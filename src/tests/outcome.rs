use super::cmd;
use crate::{Classification, ExecutionOutcome, ExitStatus};

// raw waitpid statuses
fn exited(code: i32) -> ExitStatus {
    ExitStatus::from_raw(code << 8)
}

fn signaled(sig: i32) -> ExitStatus {
    ExitStatus::from_raw(sig)
}

#[test]
fn success_and_failure() {
    let ok = ExecutionOutcome::exited(cmd(&["true"]), exited(0));
    assert_eq!(ok.classification(), Classification::Success);
    assert_eq!(ok.exit_code(), Some(0));
    assert_eq!(ok.to_string(), "Execution of [true] returned 0 (success)");

    let bad = ExecutionOutcome::exited(cmd(&["sh", "-c", "exit 2"]), exited(2));
    assert_eq!(bad.classification(), Classification::Failure);
    assert_eq!(bad.to_string(), "Execution of [sh, -c, exit 2] returned 2 (ERROR)");
}

#[test]
fn killed_by_someone_else_is_failure() {
    let outcome = ExecutionOutcome::exited(cmd(&["sleep", "9"]), signaled(libc::SIGTERM));
    assert_eq!(outcome.classification(), Classification::Failure);
    assert_eq!(outcome.exit_code(), None);
    assert_eq!(outcome.signal(), Some(libc::SIGTERM));
    assert_eq!(
        outcome.to_string(),
        format!("Execution of [sleep, 9] ended by signal {} (ERROR)", libc::SIGTERM)
    );
}

#[test]
fn destroyed() {
    let outcome = ExecutionOutcome::destroyed(cmd(&["sleep", "9"]), signaled(libc::SIGKILL));
    assert_eq!(outcome.classification(), Classification::Destroyed);
    assert_eq!(
        outcome.to_string(),
        format!("Execution of [sleep, 9] was destroyed (signal {})", libc::SIGKILL)
    );
}

#[test]
fn without_status() {
    let failed = ExecutionOutcome::launch_failed(cmd(&["nosuchcommand", "-x"]));
    assert_eq!(failed.classification(), Classification::ErrorLaunching);
    assert_eq!(failed.exit_code(), None);
    assert_eq!(
        failed.to_string(),
        "Execution of [nosuchcommand, -x] could not be launched"
    );

    let interrupted = ExecutionOutcome::interrupted(cmd(&["sleep", "9"]));
    assert_eq!(interrupted.classification(), Classification::Interrupted);
    assert_eq!(interrupted.to_string(), "Execution of [sleep, 9] was interrupted");
}

#[test]
fn command_is_echoed_verbatim() {
    let command = cmd(&["printf", "%s, %s", "a b", ""]);
    let outcome = ExecutionOutcome::exited(command.clone(), exited(0));
    assert_eq!(outcome.command(), &command);
}
