//! Error type for provisioning runs.

use std::time::Duration;

use thiserror::Error;

use crate::cloud::CloudError;
use crate::poll::PollError;
use crate::prepare::PrepareError;
use crate::registrar::RegistrationError;

use super::state::{ProvisionStage, ProvisionState};

/// Errors that abort a provisioning run.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum ProvisionError {
    /// Raised when the create call itself fails.
    #[error("create failed: {0}")]
    Create(#[source] CloudError),
    /// Raised when the attach call fails.
    #[error("attach failed: {0}")]
    Attach(#[source] CloudError),
    /// Raised when the detach call fails.
    #[error("detach failed: {0}")]
    Detach(#[source] CloudError),
    /// Raised when a status probe fails while waiting.
    #[error("{stage} failed while polling: {source}")]
    Refresh {
        /// Stage being waited on.
        stage: ProvisionStage,
        /// Provider error.
        #[source]
        source: CloudError,
    },
    /// Raised when the volume reports `error` while being created.
    #[error("create failed: volume {volume_id} entered error state")]
    VolumeErrored {
        /// Volume identifier.
        volume_id: String,
    },
    /// Raised when a wait exceeds the configured timeout.
    #[error("{stage} timeout after {elapsed:?}")]
    Timeout {
        /// Stage being waited on.
        stage: ProvisionStage,
        /// Time spent waiting.
        elapsed: Duration,
    },
    /// Raised when the run is cancelled during a wait.
    #[error("{stage} cancelled")]
    Cancelled {
        /// Stage being waited on.
        stage: ProvisionStage,
    },
    /// Raised when the device directory cannot be listed.
    #[error("attach failed: cannot scan devices: {message}")]
    DeviceScan {
        /// I/O error message.
        message: String,
    },
    /// Raised when formatting fails.
    #[error("prepare failed: {0}")]
    Prepare(#[source] PrepareError),
    /// Raised when cluster registration fails.
    #[error("register failed: {0}")]
    Register(#[source] RegistrationError),
    /// Raised when a blocking shell-out task panics or is aborted.
    #[error("{stage} failed: worker task ended abnormally: {message}")]
    Worker {
        /// Stage whose commands were running.
        stage: ProvisionStage,
        /// Join error message.
        message: String,
    },
}

impl ProvisionError {
    /// Stage the failure belongs to.
    #[must_use]
    pub const fn stage(&self) -> ProvisionStage {
        match self {
            Self::Create(_) | Self::VolumeErrored { .. } => ProvisionStage::Create,
            Self::Attach(_) | Self::DeviceScan { .. } => ProvisionStage::Attach,
            Self::Detach(_) => ProvisionStage::Detach,
            Self::Refresh { stage, .. }
            | Self::Timeout { stage, .. }
            | Self::Cancelled { stage }
            | Self::Worker { stage, .. } => *stage,
            Self::Prepare(_) => ProvisionStage::Prepare,
            Self::Register(_) => ProvisionStage::Register,
        }
    }

    /// Short reason recorded in [`ProvisionState::Failed`].
    #[must_use]
    pub fn reason(&self) -> String {
        let stage = self.stage();
        match self {
            Self::Timeout { .. } => format!("{stage} timeout"),
            Self::Cancelled { .. } => format!("{stage} cancelled"),
            Self::VolumeErrored { .. } => String::from("volume error"),
            _ => format!("{stage} failed"),
        }
    }

    /// Terminal state corresponding to this error.
    #[must_use]
    pub fn state(&self) -> ProvisionState {
        ProvisionState::Failed(self.reason())
    }

    pub(super) fn from_wait(stage: ProvisionStage, err: PollError<Self>) -> Self {
        match err {
            PollError::Timeout { elapsed } => Self::Timeout { stage, elapsed },
            PollError::Cancelled => Self::Cancelled { stage },
            PollError::Probe(source) => source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn timeout(stage: ProvisionStage) -> ProvisionError {
        ProvisionError::Timeout {
            stage,
            elapsed: Duration::from_secs(30),
        }
    }

    #[rstest]
    #[case(timeout(ProvisionStage::Create), "create timeout")]
    #[case(timeout(ProvisionStage::Attach), "attach timeout")]
    #[case(timeout(ProvisionStage::Detach), "detach timeout")]
    #[case(ProvisionError::Cancelled { stage: ProvisionStage::Attach }, "attach cancelled")]
    #[case(ProvisionError::VolumeErrored { volume_id: String::from("v") }, "volume error")]
    #[case(ProvisionError::DeviceScan { message: String::from("denied") }, "attach failed")]
    #[case(
        ProvisionError::Worker {
            stage: ProvisionStage::Prepare,
            message: String::from("panicked"),
        },
        "prepare failed"
    )]
    fn reasons_name_the_stage(#[case] err: ProvisionError, #[case] expected: &str) {
        assert_eq!(err.reason(), expected);
        assert_eq!(err.state(), ProvisionState::Failed(String::from(expected)));
    }

    #[test]
    fn timeout_message_includes_elapsed_time() {
        assert_eq!(
            timeout(ProvisionStage::Create).to_string(),
            "create timeout after 30s"
        );
    }

    #[test]
    fn probe_errors_pass_through_wait_conversion() {
        let inner = ProvisionError::VolumeErrored {
            volume_id: String::from("v"),
        };
        assert_eq!(
            ProvisionError::from_wait(ProvisionStage::Create, PollError::Probe(inner.clone())),
            inner
        );
    }
}
