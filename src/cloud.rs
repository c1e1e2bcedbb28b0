//! Cloud client abstraction for block-storage volumes and their attachments.

use std::fmt;
use std::future::Future;
use std::pin::Pin;

use thiserror::Error;

/// Lifecycle status reported by the provider for a volume.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum VolumeStatus {
    /// The provider is still allocating the volume.
    Creating,
    /// The volume is ready to be attached.
    Available,
    /// An attachment is in progress.
    Attaching,
    /// The volume is attached to a server.
    InUse,
    /// A detachment is in progress.
    Detaching,
    /// The provider failed to create or manage the volume.
    Error,
    /// The volume is being deleted.
    Deleting,
    /// Any status this crate does not model explicitly.
    Other(String),
}

impl VolumeStatus {
    /// Parses the provider's status string.
    #[must_use]
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "creating" => Self::Creating,
            "available" => Self::Available,
            "attaching" => Self::Attaching,
            "in-use" => Self::InUse,
            "detaching" => Self::Detaching,
            "error" => Self::Error,
            "deleting" => Self::Deleting,
            other => Self::Other(other.to_owned()),
        }
    }

    /// Returns the provider spelling of the status.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Creating => "creating",
            Self::Available => "available",
            Self::Attaching => "attaching",
            Self::InUse => "in-use",
            Self::Detaching => "detaching",
            Self::Error => "error",
            Self::Deleting => "deleting",
            Self::Other(value) => value.as_str(),
        }
    }
}

impl fmt::Display for VolumeStatus {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Parameters required to create a volume.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct VolumeSpec {
    /// Human-friendly volume name.
    pub display_name: String,
    /// Size in GiB.
    pub size_gib: u32,
    /// Optional provider volume type.
    pub volume_type: Option<String>,
    /// Optional availability zone.
    pub availability_zone: Option<String>,
}

impl VolumeSpec {
    /// Creates a new volume spec, trimming the display name.
    #[must_use]
    pub fn new(display_name: impl Into<String>, size_gib: u32) -> Self {
        Self {
            display_name: display_name.into().trim().to_owned(),
            size_gib,
            volume_type: None,
            availability_zone: None,
        }
    }

    /// Sets the optional volume type.
    #[must_use]
    pub fn volume_type(mut self, value: Option<String>) -> Self {
        self.volume_type = value.map(|kind| kind.trim().to_owned());
        self
    }

    /// Sets the optional availability zone.
    #[must_use]
    pub fn availability_zone(mut self, value: Option<String>) -> Self {
        self.availability_zone = value.map(|zone| zone.trim().to_owned());
        self
    }
}

/// Snapshot of a provider volume. The status is stale as soon as it is read.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Volume {
    /// Opaque provider identifier.
    pub id: String,
    /// Display name given at creation.
    pub display_name: String,
    /// Size in GiB.
    pub size_gib: u32,
    /// Provider volume type, if any.
    pub volume_type: Option<String>,
    /// Availability zone, if reported.
    pub availability_zone: Option<String>,
    /// Status at the time of the fetch.
    pub status: VolumeStatus,
}

/// Association between a volume and a server while it is attached.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Attachment {
    /// Attachment identifier used to detach and probe.
    pub id: String,
    /// Attached volume.
    pub volume_id: String,
    /// Server the volume is attached to.
    pub server_id: String,
    /// Device path suggested by the provider; not trusted for discovery.
    pub device_hint: Option<String>,
}

/// Errors raised by cloud clients.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum CloudError {
    /// Raised when the identity service rejects the credentials or token.
    #[error("authentication failed: {message}")]
    Auth {
        /// Message returned by the identity service.
        message: String,
    },
    /// Raised when the provider rejects an API call.
    #[error("{operation} failed: {message}")]
    Provider {
        /// Operation that was attempted.
        operation: String,
        /// Message returned by the provider or transport.
        message: String,
    },
    /// Raised when a resource does not exist.
    #[error("{resource} {id} not found")]
    NotFound {
        /// Kind of resource looked up.
        resource: String,
        /// Identifier looked up.
        id: String,
    },
    /// Raised when the provider answers with an unexpected body.
    #[error("unexpected response for {operation}: {message}")]
    InvalidResponse {
        /// Operation whose response could not be decoded.
        operation: String,
        /// Decoder message.
        message: String,
    },
}

impl CloudError {
    /// Returns `true` for [`CloudError::NotFound`].
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Future returned by cloud client operations.
pub type CloudFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, CloudError>> + Send + 'a>>;

/// Volume and attachment operations against the storage control plane.
///
/// Every call is a single request; implementations never retry.
pub trait VolumeClient {
    /// Submits a volume creation request and returns the initial snapshot.
    fn create_volume<'a>(&'a self, spec: &'a VolumeSpec) -> CloudFuture<'a, Volume>;

    /// Fetches a fresh snapshot of the volume.
    fn get_volume<'a>(&'a self, volume_id: &'a str) -> CloudFuture<'a, Volume>;

    /// Attaches the volume to the server.
    fn attach_volume<'a>(
        &'a self,
        server_id: &'a str,
        volume_id: &'a str,
    ) -> CloudFuture<'a, Attachment>;

    /// Requests removal of the attachment.
    fn detach_volume<'a>(
        &'a self,
        server_id: &'a str,
        attachment_id: &'a str,
    ) -> CloudFuture<'a, ()>;

    /// Fetches the attachment; [`CloudError::NotFound`] once it is gone.
    fn get_attachment<'a>(
        &'a self,
        server_id: &'a str,
        attachment_id: &'a str,
    ) -> CloudFuture<'a, Attachment>;
}
