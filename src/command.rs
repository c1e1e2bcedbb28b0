//! Local command execution and the runner abstraction used by shell-outs.

use std::ffi::OsString;
use std::process::Command;

use thiserror::Error;

/// Result of running an external command.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CommandOutput {
    /// Exit code reported by the process, if available.
    pub code: Option<i32>,
    /// Captured standard output.
    pub stdout: String,
    /// Captured standard error.
    pub stderr: String,
}

impl CommandOutput {
    /// Returns `true` when the exit code equals zero.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self.code, Some(0))
    }

    /// Converts a non-zero exit into [`ShellError::CommandFailure`].
    ///
    /// # Errors
    ///
    /// Returns [`ShellError::CommandFailure`] unless the exit code is zero.
    pub fn into_result(self, program: &str) -> Result<Self, ShellError> {
        if self.is_success() {
            return Ok(self);
        }

        let status_text = self
            .code
            .map_or_else(|| String::from("unknown"), |code| code.to_string());
        Err(ShellError::CommandFailure {
            program: program.to_owned(),
            status: self.code,
            status_text,
            stderr: self.stderr.trim().to_owned(),
        })
    }
}

/// Errors raised while running local commands.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum ShellError {
    /// Raised when the process cannot be started.
    #[error("failed to spawn {program}: {message}")]
    Spawn {
        /// Program that could not be started.
        program: String,
        /// Operating system error message.
        message: String,
    },
    /// Raised when the process exits unsuccessfully.
    #[error("{program} exited with status {status_text}: {stderr}")]
    CommandFailure {
        /// Program that failed.
        program: String,
        /// Exit code, if the process exited normally.
        status: Option<i32>,
        /// Printable form of the exit status.
        status_text: String,
        /// Captured standard error.
        stderr: String,
    },
}

/// Abstraction over command execution to support fakes in tests.
pub trait CommandRunner {
    /// Runs `program` with the given arguments, capturing stdout and stderr.
    ///
    /// # Errors
    ///
    /// Returns [`ShellError::Spawn`] if the command cannot be started.
    fn run(&self, program: &str, args: &[OsString]) -> Result<CommandOutput, ShellError>;
}

impl<R: CommandRunner + ?Sized> CommandRunner for &R {
    fn run(&self, program: &str, args: &[OsString]) -> Result<CommandOutput, ShellError> {
        (**self).run(program, args)
    }
}

/// Real command runner that shells out to the host operating system.
#[derive(Clone, Copy, Debug, Default)]
pub struct ProcessCommandRunner;

impl CommandRunner for ProcessCommandRunner {
    fn run(&self, program: &str, args: &[OsString]) -> Result<CommandOutput, ShellError> {
        tracing::debug!(program, ?args, "running command");
        let output = Command::new(program)
            .args(args)
            .output()
            .map_err(|err| ShellError::Spawn {
                program: program.to_owned(),
                message: err.to_string(),
            })?;

        Ok(CommandOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn into_result_keeps_successful_output() {
        let output = CommandOutput {
            code: Some(0),
            stdout: String::from("ok"),
            stderr: String::new(),
        };
        let kept = output
            .clone()
            .into_result("mount")
            .unwrap_or_else(|err| panic!("success expected: {err}"));
        assert_eq!(kept, output);
    }

    #[test]
    fn into_result_reports_exit_status_and_stderr() {
        let output = CommandOutput {
            code: Some(32),
            stdout: String::new(),
            stderr: String::from("mount: wrong fs type\n"),
        };
        let err = output
            .into_result("mount")
            .err()
            .unwrap_or_else(|| panic!("failure expected"));
        assert_eq!(
            err.to_string(),
            "mount exited with status 32: mount: wrong fs type"
        );
    }

    #[test]
    fn into_result_handles_signal_termination() {
        let output = CommandOutput {
            code: None,
            stdout: String::new(),
            stderr: String::new(),
        };
        let err = output
            .into_result("mkfs.ext4")
            .err()
            .unwrap_or_else(|| panic!("failure expected"));
        assert!(matches!(
            err,
            ShellError::CommandFailure {
                status: None,
                ref status_text,
                ..
            } if status_text == "unknown"
        ));
    }

    #[test]
    fn process_runner_reports_spawn_failures() {
        let err = ProcessCommandRunner
            .run("/nonexistent/cinder-pv-test-binary", &[])
            .err()
            .unwrap_or_else(|| panic!("spawn should fail"));
        assert!(matches!(err, ShellError::Spawn { .. }));
    }
}
