//! Command-line interface definitions for the `cinder-pv` binary.
//!
//! This module centralises the clap parser so both the binary and the build
//! script can reuse it when generating the manual page.

use clap::Parser;

/// Top-level CLI for the `cinder-pv` binary.
///
/// Every flag overrides the matching `CINDER_PV_*` environment variable or
/// `cinder-pv.toml` key.
#[derive(Debug, Default, Parser)]
#[command(
    name = "cinder-pv",
    about = "Create, format and register an OpenStack volume as cluster storage",
    version
)]
pub(crate) struct Cli {
    /// Server to attach the volume to while it is formatted.
    ///
    /// Defaults to the `uuid` reported by the instance metadata service.
    #[arg(long, value_name = "ID")]
    pub(crate) server: Option<String>,
    /// Display name of the volume and of the PersistentVolume.
    #[arg(long, value_name = "NAME")]
    pub(crate) volume_name: Option<String>,
    /// Volume size in GiB.
    #[arg(long, value_name = "GIB")]
    pub(crate) volume_size: Option<u32>,
    /// Provider volume type.
    #[arg(long, value_name = "TYPE")]
    pub(crate) volume_type: Option<String>,
    /// Provider availability zone.
    #[arg(long, value_name = "ZONE")]
    pub(crate) availability_zone: Option<String>,
    /// Filesystem created on the volume (`mkfs.<FS>`).
    #[arg(long, value_name = "FS")]
    pub(crate) filesystem: Option<String>,
    /// Seconds allowed for each wait.
    #[arg(long, value_name = "SECONDS")]
    pub(crate) timeout: Option<u64>,
    /// Comma separated access modes, for example `ReadWriteOnce`.
    #[arg(long, value_name = "MODES")]
    pub(crate) access_modes: Option<String>,
    /// Cluster command line tool used to submit manifests.
    #[arg(long, value_name = "PROGRAM")]
    pub(crate) cluster_cli: Option<String>,
}
