//! Configuration loading via `ortho-config`.
//!
//! Values merge defaults, `cinder-pv.toml`, and `CINDER_PV_*` environment
//! variables. The binary applies its command-line overrides on top.

use std::ffi::OsString;
use std::time::Duration;

use ortho_config::OrthoConfig;
use serde::Deserialize;
use thiserror::Error;

use crate::cloud::VolumeSpec;
use crate::device::DEFAULT_DEVICE_DIR;
use crate::identity::DEFAULT_METADATA_URL;
use crate::openstack::{Credentials, EndpointType};
use crate::poll::Poller;
use crate::provision::ProvisionRequest;
use crate::registrar::{AccessMode, DEFAULT_CLUSTER_CLI};

const CONFIG_FILE: &str = "cinder-pv.toml";

/// Settings for one provisioning run.
#[derive(Clone, Debug, Deserialize, OrthoConfig, PartialEq, Eq)]
#[ortho_config(
    prefix = "CINDER_PV",
    discovery(
        app_name = "cinder-pv",
        env_var = "CINDER_PV_CONFIG_PATH",
        config_file_name = "cinder-pv.toml",
        dotfile_name = ".cinder-pv.toml",
        project_file_name = "cinder-pv.toml"
    )
)]
pub struct ProvisionConfig {
    /// Keystone v2.0 endpoint, for example `https://keystone:5000/v2.0`.
    #[ortho_config(default = String::new())]
    pub auth_url: String,
    /// OpenStack user name.
    #[ortho_config(default = String::new())]
    pub username: String,
    /// OpenStack password.
    #[ortho_config(default = String::new())]
    pub password: String,
    /// Tenant (project) name.
    #[ortho_config(default = String::new())]
    pub tenant: String,
    /// Service catalog endpoint flavour.
    #[ortho_config(default = "publicURL".to_owned())]
    pub endpoint_type: String,
    /// Compute endpoint that bypasses the service catalog.
    pub endpoint_url: Option<String>,
    /// Compute API version. Only the 2.x API is supported.
    #[ortho_config(default = "2".to_owned())]
    pub api_version: String,
    /// Server to attach the volume to. Looked up from the metadata service
    /// when unset.
    pub server: Option<String>,
    /// Display name of the volume and name of the PersistentVolume.
    #[ortho_config(default = "cinder-volume".to_owned())]
    pub volume_name: String,
    /// Volume size in GiB.
    #[ortho_config(default = 5)]
    pub volume_size: u32,
    /// Provider volume type.
    pub volume_type: Option<String>,
    /// Provider availability zone.
    pub availability_zone: Option<String>,
    /// Filesystem created on the volume.
    #[ortho_config(default = "ext4".to_owned())]
    pub filesystem: String,
    /// Seconds allowed for each wait.
    #[ortho_config(default = 30)]
    pub timeout: u64,
    /// Seconds between status probes.
    #[ortho_config(default = 1)]
    pub poll_interval: u64,
    /// Comma separated access modes, for example `ReadWriteOnce`.
    #[ortho_config(default = "ReadWriteOnce".to_owned())]
    pub access_modes: String,
    /// Directory scanned for the attached block device.
    #[ortho_config(default = DEFAULT_DEVICE_DIR.to_owned())]
    pub device_dir: String,
    /// Cluster command line tool used to submit manifests.
    #[ortho_config(default = DEFAULT_CLUSTER_CLI.to_owned())]
    pub cluster_cli: String,
    /// Metadata document used to discover the local server.
    #[ortho_config(default = DEFAULT_METADATA_URL.to_owned())]
    pub metadata_url: String,
}

/// Metadata for a configuration field, used to generate actionable error messages.
struct FieldMetadata {
    description: &'static str,
    env_var: &'static str,
    toml_key: &'static str,
}

impl FieldMetadata {
    const fn new(description: &'static str, env_var: &'static str, toml_key: &'static str) -> Self {
        Self {
            description,
            env_var,
            toml_key,
        }
    }
}

impl ProvisionConfig {
    /// Loads configuration without parsing CLI arguments.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when merging sources fails.
    pub fn load_without_cli_args() -> Result<Self, ConfigError> {
        Self::load_from_iter([OsString::from("cinder-pv")])
            .map_err(|err| ConfigError::Parse(err.to_string()))
    }

    fn require_field(value: &str, metadata: &FieldMetadata) -> Result<(), ConfigError> {
        if value.trim().is_empty() {
            return Err(ConfigError::MissingField(format!(
                "missing {}: set {} or add {} to {CONFIG_FILE}",
                metadata.description, metadata.env_var, metadata.toml_key
            )));
        }
        Ok(())
    }

    /// Performs semantic validation. Missing values name the environment
    /// variable and configuration key that supply them.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingField`] for empty required values and
    /// [`ConfigError::Invalid`] for malformed ones.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let required = [
            (
                &self.auth_url,
                FieldMetadata::new("Keystone auth URL", "CINDER_PV_AUTH_URL", "auth_url"),
            ),
            (
                &self.username,
                FieldMetadata::new("OpenStack user name", "CINDER_PV_USERNAME", "username"),
            ),
            (
                &self.password,
                FieldMetadata::new("OpenStack password", "CINDER_PV_PASSWORD", "password"),
            ),
            (
                &self.tenant,
                FieldMetadata::new("tenant name", "CINDER_PV_TENANT", "tenant"),
            ),
            (
                &self.volume_name,
                FieldMetadata::new("volume name", "CINDER_PV_VOLUME_NAME", "volume_name"),
            ),
            (
                &self.device_dir,
                FieldMetadata::new("device directory", "CINDER_PV_DEVICE_DIR", "device_dir"),
            ),
            (
                &self.cluster_cli,
                FieldMetadata::new("cluster CLI", "CINDER_PV_CLUSTER_CLI", "cluster_cli"),
            ),
        ];
        for (value, metadata) in &required {
            Self::require_field(value, metadata)?;
        }
        self.endpoint_type()?;
        self.access_mode_list()?;

        if !self.api_version.trim().starts_with('2') {
            return Err(invalid(
                "api_version",
                format!("unsupported compute API version '{}'", self.api_version),
            ));
        }
        if self.volume_size == 0 {
            return Err(invalid("volume_size", "volume size must be at least 1 GiB"));
        }
        if self.poll_interval == 0 {
            return Err(invalid("poll_interval", "poll interval must be at least 1 second"));
        }
        if self.filesystem.is_empty()
            || !self
                .filesystem
                .chars()
                .all(|ch| ch.is_ascii_lowercase() || ch.is_ascii_digit())
        {
            return Err(invalid(
                "filesystem",
                format!("'{}' is not a filesystem name", self.filesystem),
            ));
        }
        Ok(())
    }

    /// Parsed endpoint type.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] for unknown values.
    pub fn endpoint_type(&self) -> Result<EndpointType, ConfigError> {
        self.endpoint_type
            .parse()
            .map_err(|message| invalid("endpoint_type", message))
    }

    /// Parsed access modes.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] for unknown or empty lists.
    pub fn access_mode_list(&self) -> Result<Vec<AccessMode>, ConfigError> {
        AccessMode::parse_list(&self.access_modes)
            .map_err(|message| invalid("access_modes", message))
    }

    /// Keystone credentials.
    #[must_use]
    pub fn credentials(&self) -> Credentials {
        Credentials {
            auth_url: self.auth_url.trim().to_owned(),
            username: self.username.clone(),
            password: self.password.clone(),
            tenant: self.tenant.clone(),
        }
    }

    /// Poller built from `poll_interval` and `timeout`.
    #[must_use]
    pub const fn poller(&self) -> Poller {
        Poller::new(
            Duration::from_secs(self.poll_interval),
            Duration::from_secs(self.timeout),
        )
    }

    /// Builds the request for a run against `server_id`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when validation fails.
    pub fn as_request(&self, server_id: &str) -> Result<ProvisionRequest, ConfigError> {
        self.validate()?;
        if server_id.trim().is_empty() {
            return Err(ConfigError::MissingField(format!(
                "missing server identifier: set CINDER_PV_SERVER or add server to {CONFIG_FILE}"
            )));
        }

        Ok(ProvisionRequest {
            server_id: server_id.trim().to_owned(),
            volume: VolumeSpec::new(self.volume_name.trim(), self.volume_size)
                .volume_type(self.volume_type.clone())
                .availability_zone(self.availability_zone.clone()),
            filesystem: self.filesystem.clone(),
            access_modes: self.access_mode_list()?,
            poller: self.poller(),
        })
    }
}

fn invalid(field: &'static str, message: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field,
        message: message.into(),
    }
}

/// Errors raised during configuration loading and validation.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum ConfigError {
    /// Indicates a required configuration field is empty or missing.
    #[error("missing configuration field: {0}")]
    MissingField(String),
    /// Indicates a configuration value is malformed.
    #[error("invalid {field}: {message}")]
    Invalid {
        /// Configuration key.
        field: &'static str,
        /// Validation message.
        message: String,
    },
    /// Surfaces errors from the `ortho-config` loader.
    #[error("configuration parsing failed: {0}")]
    Parse(String),
}
