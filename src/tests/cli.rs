use std::io::{self, Write};
use std::time::Duration;

use clap::Parser;
use tempfile::TempDir;

use super::cmd;
use crate::Classification;
use crate::cli::{
    Cli, Dispatch, EXIT_INTERRUPTED, EXIT_LAUNCH_ERROR, EXIT_OK, EXIT_USAGE, Route, USAGE,
    dispatch, route,
};
use crate::{Policy, SupervisorConfig};

fn args(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|s| s.to_string()).collect()
}

fn usage(exit_code: i32) -> Route {
    Route::Usage { exit_code }
}

#[test]
fn exit_codes_are_distinct() {
    let codes = [EXIT_OK, EXIT_USAGE, EXIT_LAUNCH_ERROR, EXIT_INTERRUPTED];
    assert_eq!(codes, [0, 1, 2, 3]);
}

#[test]
fn route_table() {
    assert_eq!(route(&args(&[])), usage(EXIT_USAGE));
    assert_eq!(route(&args(&["1"])), usage(EXIT_USAGE));
    assert_eq!(route(&args(&["9", "ls"])), usage(EXIT_OK));
    assert_eq!(route(&args(&["help", "me"])), usage(EXIT_OK));
    assert_eq!(
        route(&args(&["1", "ls", "-l"])),
        Route::Run {
            policy: Policy::Immediate,
            command: cmd(&["ls", "-l"]),
        }
    );
    assert_eq!(
        route(&args(&["2", "sleep", "12"])),
        Route::Run {
            policy: Policy::Heartbeat,
            command: cmd(&["sleep", "12"]),
        }
    );
    assert_eq!(
        route(&args(&["3", "sleep", "60"])),
        Route::Run {
            policy: Policy::Deadline,
            command: cmd(&["sleep", "60"]),
        }
    );
    assert_eq!(
        route(&args(&["4", "ls", "/tmp"])),
        Route::Run {
            policy: Policy::Directory,
            command: cmd(&["ls", "/tmp"]),
        }
    );
    assert_eq!(
        route(&args(&["5", "term", "in.txt", "out.txt"])),
        Route::Run {
            policy: Policy::Search,
            command: cmd(&["term", "in.txt", "out.txt"]),
        }
    );
}

#[test]
fn route_arity() {
    assert_eq!(route(&args(&["4", "/tmp"])), usage(EXIT_USAGE));
    assert_eq!(route(&args(&["5", "term", "in.txt"])), usage(EXIT_USAGE));
    assert_eq!(
        route(&args(&["5", "term", "in.txt", "out.txt", "extra"])),
        usage(EXIT_USAGE)
    );
}

#[test]
fn parse_options_before_selector() {
    let cli = Cli::try_parse_from([
        "childwarden",
        "--deadline",
        "2",
        "--poll-interval",
        "3",
        "1",
        "ls",
        "-la",
        "--deadline",
    ])
    .unwrap();
    assert_eq!(cli.args, args(&["1", "ls", "-la", "--deadline"]));
    let config = cli.config();
    assert_eq!(config.deadline, Duration::from_secs(2));
    assert_eq!(config.poll_interval, Duration::from_secs(3));
    assert_eq!(config.search_program, "grep");
}

#[test]
fn parse_defaults() {
    let cli = Cli::try_parse_from(["childwarden", "2", "sleep", "1"]).unwrap();
    assert_eq!(cli.config(), SupervisorConfig::default());
    assert_eq!(cli.args, args(&["2", "sleep", "1"]));

    let cli = Cli::try_parse_from(["childwarden"]).unwrap();
    assert!(cli.args.is_empty());
}

#[test]
fn parse_rejects_zero_interval() {
    assert!(Cli::try_parse_from(["childwarden", "--poll-interval", "0", "2", "true"]).is_err());
    assert!(Cli::try_parse_from(["childwarden", "--deadline", "0", "3", "true"]).is_err());
}

fn run_dispatch(route: Route) -> (Dispatch, String, String) {
    let mut out = Vec::new();
    let mut err = Vec::new();
    let config = SupervisorConfig {
        deadline: Duration::from_millis(200),
        ..Default::default()
    };
    let dispatch = dispatch(route, config, &mut out, &mut err).unwrap();
    (
        dispatch,
        String::from_utf8(out).unwrap(),
        String::from_utf8(err).unwrap(),
    )
}

#[test]
fn dispatch_usage() {
    let (dispatch, out, err) = run_dispatch(usage(EXIT_USAGE));
    assert_eq!(
        dispatch,
        Dispatch {
            outcome: None,
            exit_code: EXIT_USAGE,
        }
    );
    assert_eq!(out, format!("{USAGE}\n"));
    assert!(err.is_empty());
}

#[test]
fn dispatch_success_prints_outcome_last() {
    let (dispatch, out, _) = run_dispatch(route(&args(&["1", "true"])));
    assert_eq!(dispatch.exit_code, EXIT_OK);
    let outcome = dispatch.outcome.unwrap();
    assert_eq!(outcome.classification(), Classification::Success);
    assert_eq!(
        out.lines().last().unwrap(),
        "Execution of [true] returned 0 (success)"
    );
}

#[test]
fn dispatch_child_failure_is_not_an_error() {
    let (dispatch, out, _) = run_dispatch(route(&args(&["1", "sh", "-c", "exit 5"])));
    assert_eq!(dispatch.exit_code, EXIT_OK);
    assert_eq!(
        dispatch.outcome.unwrap().classification(),
        Classification::Failure
    );
    assert!(out.ends_with("Execution of [sh, -c, exit 5] returned 5 (ERROR)\n"));
}

#[test]
fn dispatch_destroyed() {
    let (dispatch, out, _) = run_dispatch(route(&args(&["3", "sleep", "30"])));
    assert_eq!(dispatch.exit_code, EXIT_OK);
    assert_eq!(
        dispatch.outcome.unwrap().classification(),
        Classification::Destroyed
    );
    assert!(out.contains("200ms passed. Process destroyed.\n"));
}

#[test]
fn dispatch_launch_error() {
    let (dispatch, out, err) = run_dispatch(route(&args(&["1", "nosuchcommand", "x"])));
    assert_eq!(dispatch.exit_code, EXIT_LAUNCH_ERROR);
    let outcome = dispatch.outcome.unwrap();
    assert_eq!(outcome.classification(), Classification::ErrorLaunching);
    assert_eq!(outcome.command(), &cmd(&["nosuchcommand", "x"]));
    assert_eq!(out, "Execution of [nosuchcommand, x] could not be launched\n");
    assert!(err.starts_with("Error while executing the process\n"));
    assert!(err.contains("program \"nosuchcommand\" not found"));
}

#[test]
fn dispatch_missing_search_input() {
    let tmpdir = TempDir::new().unwrap();
    let input = tmpdir.path().join("missing.txt");
    let output = tmpdir.path().join("out.txt");
    let (dispatch, out, _) = run_dispatch(route(&args(&[
        "5",
        "term",
        input.to_str().unwrap(),
        output.to_str().unwrap(),
    ])));
    assert_eq!(
        dispatch,
        Dispatch {
            outcome: None,
            exit_code: EXIT_OK,
        }
    );
    assert_eq!(
        out,
        format!("Input file does not exist: {}\n", input.display())
    );
    assert!(!output.exists());
}

#[test]
fn dispatch_arguments_error_has_no_outcome() {
    let mut out = Vec::new();
    let mut err = Vec::new();
    let route = Route::Run {
        policy: Policy::Directory,
        command: cmd(&["/tmp"]),
    };
    let dispatch = dispatch(route, SupervisorConfig::default(), &mut out, &mut err).unwrap();
    assert_eq!(
        dispatch,
        Dispatch {
            outcome: None,
            exit_code: EXIT_LAUNCH_ERROR,
        }
    );
    assert!(out.is_empty());
    let err = String::from_utf8(err).unwrap();
    assert!(err.contains("directory expects"), "{err}");
}

/// Accepts flushes but fails every write.
struct BrokenOut;

impl Write for BrokenOut {
    fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
        Err(io::ErrorKind::BrokenPipe.into())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[test]
fn dispatch_output_error_is_not_a_launch_failure() {
    let mut err = Vec::new();
    let dispatch = dispatch(
        route(&args(&["1", "true"])),
        SupervisorConfig::default(),
        BrokenOut,
        &mut err,
    )
    .unwrap();
    assert_eq!(
        dispatch,
        Dispatch {
            outcome: None,
            exit_code: EXIT_LAUNCH_ERROR,
        }
    );
    let err = String::from_utf8(err).unwrap();
    assert!(err.contains("cannot write status output"), "{err}");
    assert!(err.contains("caused by:"), "{err}");
}
