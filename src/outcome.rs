use std::fmt;

use crate::launch::CommandSpec;
use crate::process::ExitStatus;

/// Final category of a supervised run.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Classification {
    /// The child exited with status 0.
    Success,
    /// The child exited with a nonzero status or was killed by someone else.
    Failure,
    /// The child outlived its deadline and was killed by the supervisor.
    Destroyed,
    /// The child could not be started.
    ErrorLaunching,
    /// The supervisor was interrupted while waiting.
    Interrupted,
}

/// The result of one supervised invocation, echoing the command it ran.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionOutcome {
    exit_code: Option<i32>,
    signal: Option<i32>,
    command: CommandSpec,
    classification: Classification,
}

impl ExecutionOutcome {
    /// Outcome of a child that finished on its own.
    pub fn exited(command: CommandSpec, status: ExitStatus) -> ExecutionOutcome {
        let classification = if status.success() {
            Classification::Success
        } else {
            Classification::Failure
        };
        ExecutionOutcome::from_status(command, status, classification)
    }

    /// Outcome of a child killed after its deadline passed.
    pub fn destroyed(command: CommandSpec, status: ExitStatus) -> ExecutionOutcome {
        ExecutionOutcome::from_status(command, status, Classification::Destroyed)
    }

    pub fn launch_failed(command: CommandSpec) -> ExecutionOutcome {
        ExecutionOutcome::without_status(command, Classification::ErrorLaunching)
    }

    pub fn interrupted(command: CommandSpec) -> ExecutionOutcome {
        ExecutionOutcome::without_status(command, Classification::Interrupted)
    }

    fn from_status(
        command: CommandSpec,
        status: ExitStatus,
        classification: Classification,
    ) -> ExecutionOutcome {
        ExecutionOutcome {
            exit_code: status.code(),
            signal: status.signal(),
            command,
            classification,
        }
    }

    fn without_status(command: CommandSpec, classification: Classification) -> ExecutionOutcome {
        ExecutionOutcome {
            exit_code: None,
            signal: None,
            command,
            classification,
        }
    }

    /// Exit code, if the child exited voluntarily.
    pub fn exit_code(&self) -> Option<i32> {
        self.exit_code
    }

    /// Terminating signal, if the child was killed by one.
    pub fn signal(&self) -> Option<i32> {
        self.signal
    }

    pub fn command(&self) -> &CommandSpec {
        &self.command
    }

    pub fn classification(&self) -> Classification {
        self.classification
    }
}

impl fmt::Display for ExecutionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Execution of {} ", self.command)?;
        match (self.classification, self.exit_code, self.signal) {
            (Classification::Success, Some(code), _) => write!(f, "returned {code} (success)"),
            (Classification::Destroyed, _, Some(sig)) => write!(f, "was destroyed (signal {sig})"),
            (Classification::Destroyed, _, None) => write!(f, "was destroyed"),
            (Classification::ErrorLaunching, ..) => write!(f, "could not be launched"),
            (Classification::Interrupted, ..) => write!(f, "was interrupted"),
            (_, Some(code), _) => write!(f, "returned {code} (ERROR)"),
            (_, None, Some(sig)) => write!(f, "ended by signal {sig} (ERROR)"),
            (_, None, None) => write!(f, "ended with unknown status (ERROR)"),
        }
    }
}
