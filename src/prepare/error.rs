//! Error types for volume preparation.

use std::fmt;

use camino::Utf8PathBuf;
use thiserror::Error;

use crate::command::ShellError;

/// One shell-out in the preparation sequence.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PrepareStep {
    /// `mkfs.<fs> <device>`.
    Format,
    /// `mount <device> <dir>`.
    Mount,
    /// `chmod -R 777 <dir>`.
    Permissions,
    /// `umount <dir>`.
    Unmount,
}

impl PrepareStep {
    /// Steps in execution order.
    pub const SEQUENCE: [Self; 4] = [Self::Format, Self::Mount, Self::Permissions, Self::Unmount];

    /// Short name used in logs and errors.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Format => "format",
            Self::Mount => "mount",
            Self::Permissions => "permissions",
            Self::Unmount => "unmount",
        }
    }
}

impl fmt::Display for PrepareStep {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Errors raised while preparing a volume.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum PrepareError {
    /// Raised when the scratch mount directory cannot be created or removed.
    #[error("scratch directory {path}: {message}")]
    ScratchDir {
        /// Directory involved.
        path: Utf8PathBuf,
        /// Underlying error message.
        message: String,
    },
    /// Raised when one of the shell-outs fails.
    #[error("{step} step failed: {source}")]
    Command {
        /// Step that failed.
        step: PrepareStep,
        /// Underlying command error.
        #[source]
        source: ShellError,
    },
}
