mod cli;
mod outcome;

use std::fs::File;
use std::io::Read;

use crate::{ChildHandle, CommandSpec, ExecutionOutcome, ExitStatus, SupervisorConfig};

fn assert_send_sync<T: Send + Sync>() {}

#[test]
fn public_types_are_send_and_sync() {
    assert_send_sync::<ChildHandle>();
    assert_send_sync::<CommandSpec>();
    assert_send_sync::<ExecutionOutcome>();
    assert_send_sync::<ExitStatus>();
    assert_send_sync::<SupervisorConfig>();
}

pub fn read_whole_file(mut f: File) -> String {
    let mut content = String::new();
    f.read_to_string(&mut content).unwrap();
    content
}

pub fn cmd(parts: &[&str]) -> CommandSpec {
    CommandSpec::new(parts.iter().copied())
}
