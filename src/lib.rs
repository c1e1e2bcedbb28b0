//! Core library for the `cinder-pv` volume provisioner.
//!
//! The crate creates a block-storage volume through the OpenStack compute
//! API, attaches it to the local server, formats it, detaches it, and
//! registers it with the cluster as a PersistentVolume and claim. The
//! [`Provisioner`] drives those steps; each collaborator sits behind a trait
//! so the state machine can be exercised without a cloud or root access.

pub mod cloud;
pub mod command;
pub mod config;
pub mod device;
pub mod identity;
pub mod openstack;
pub mod poll;
pub mod prepare;
pub mod provision;
pub mod registrar;
pub mod test_support;

pub use cloud::{Attachment, CloudError, Volume, VolumeClient, VolumeSpec, VolumeStatus};
pub use command::{CommandOutput, CommandRunner, ProcessCommandRunner, ShellError};
pub use config::{ConfigError, ProvisionConfig};
pub use device::{DeviceBinding, DeviceNamespace, DeviceResolver, DiskByIdNamespace};
pub use identity::{IdentityError, discover_server_id};
pub use openstack::{Credentials, EndpointType, OpenStackClient};
pub use poll::{PollError, Poller};
pub use prepare::{PrepareError, PrepareStep, VolumePreparer};
pub use provision::{
    ProvisionError, ProvisionOutcome, ProvisionRequest, ProvisionStage, ProvisionState,
    Provisioner,
};
pub use registrar::{
    AccessMode, CliRegistrar, Manifest, ManifestKind, RegistrationError, ResourceRegistrar,
    StorageResourceSpec, register_storage,
};
