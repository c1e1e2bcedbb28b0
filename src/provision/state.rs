//! Provisioning states and stages.

use std::fmt;

/// State of a provisioning run.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ProvisionState {
    /// Run accepted, nothing created yet.
    Requested,
    /// Volume create issued, waiting for `available`.
    Creating,
    /// Volume reported `available`.
    Available,
    /// Attach issued, waiting for the local device.
    Attaching,
    /// Local device discovered.
    Attached,
    /// Formatting and permission changes in progress.
    Preparing,
    /// Filesystem ready and unmounted.
    Prepared,
    /// Detaching the volume and waiting for the attachment to disappear.
    Detaching,
    /// Attachment gone.
    Detached,
    /// PersistentVolume and claim submitted.
    Registered,
    /// Terminal failure with a short reason such as `create timeout`.
    Failed(String),
}

impl ProvisionState {
    /// Returns `true` for `Registered` and `Failed`.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Registered | Self::Failed(_))
    }
}

impl fmt::Display for ProvisionState {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Requested => "requested",
            Self::Creating => "creating",
            Self::Available => "available",
            Self::Attaching => "attaching",
            Self::Attached => "attached",
            Self::Preparing => "preparing",
            Self::Prepared => "prepared",
            Self::Detaching => "detaching",
            Self::Detached => "detached",
            Self::Registered => "registered",
            Self::Failed(reason) => return write!(formatter, "failed ({reason})"),
        };
        formatter.write_str(label)
    }
}

/// Step of the run an error is attributed to.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ProvisionStage {
    /// Volume creation.
    Create,
    /// Attachment and device discovery.
    Attach,
    /// Formatting.
    Prepare,
    /// Detachment.
    Detach,
    /// Cluster registration.
    Register,
}

impl ProvisionStage {
    /// Lowercase stage name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Attach => "attach",
            Self::Prepare => "prepare",
            Self::Detach => "detach",
            Self::Register => "register",
        }
    }
}

impl fmt::Display for ProvisionStage {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Ordered record of the states a run passed through.
#[derive(Debug, Default)]
pub(super) struct Journal {
    volume_id: Option<String>,
    history: Vec<ProvisionState>,
}

impl Journal {
    pub(super) fn start() -> Self {
        let mut journal = Self::default();
        journal.enter(ProvisionState::Requested);
        journal
    }

    pub(super) fn bind_volume(&mut self, volume_id: &str) {
        self.volume_id = Some(volume_id.to_owned());
    }

    pub(super) fn enter(&mut self, state: ProvisionState) {
        let volume_id = self.volume_id.as_deref().unwrap_or("-");
        match &state {
            ProvisionState::Failed(reason) => {
                tracing::error!(volume_id, reason = %reason, "provisioning failed");
            }
            other => tracing::info!(volume_id, state = %other, "provision state changed"),
        }
        self.history.push(state);
    }

    pub(super) fn into_history(self) -> Vec<ProvisionState> {
        self.history
    }
}
