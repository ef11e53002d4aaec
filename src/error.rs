//! Error types for launching and supervising a child.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// A child could not be started. No process exists when this is returned.
#[derive(Error, Debug)]
pub enum LaunchError {
    #[error("command is empty")]
    EmptyCommand,

    #[error("working directory {} is not an existing directory", .0.display())]
    InvalidDirectory(PathBuf),

    #[error("cannot open {} for redirection", path.display())]
    Redirect {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("program {program:?} not found")]
    NotFound { program: String },

    #[error("permission denied executing {program:?}")]
    PermissionDenied { program: String },

    #[error("failed to start {program:?}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },
}

impl LaunchError {
    /// Classify the errno reported by a child whose exec failed.
    pub(crate) fn from_exec_errno(program: &str, errno: i32) -> LaunchError {
        let program = program.to_owned();
        match errno {
            libc::ENOENT => LaunchError::NotFound { program },
            libc::EACCES => LaunchError::PermissionDenied { program },
            _ => LaunchError::Spawn {
                program,
                source: io::Error::from_raw_os_error(errno),
            },
        }
    }
}

/// A supervision run failed for a reason other than the child's own exit status.
#[derive(Error, Debug)]
pub enum SuperviseError {
    #[error(transparent)]
    Launch(#[from] LaunchError),

    #[error("waiting for child {pid} failed")]
    Wait {
        pid: u32,
        #[source]
        source: io::Error,
    },

    #[error("cannot write status output")]
    Output(#[from] io::Error),

    #[error("{policy} expects {expected} arguments, got {got}")]
    Arguments {
        policy: &'static str,
        expected: &'static str,
        got: usize,
    },
}

impl SuperviseError {
    /// Process exit code the CLI uses for this error.
    pub fn exit_code(&self) -> i32 {
        crate::cli::EXIT_LAUNCH_ERROR
    }
}

/// Result type used by the supervisor.
pub type Result<T> = std::result::Result<T, SuperviseError>;
