//! Declarative PersistentVolume and PersistentVolumeClaim manifests.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// API version used for both resources.
pub const API_VERSION: &str = "v1";

/// Prefix applied to the volume name to form the claim name.
pub const CLAIM_PREFIX: &str = "claim-";

/// Kubernetes volume access mode.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub enum AccessMode {
    /// Mounted read-write by a single node.
    ReadWriteOnce,
    /// Mounted read-only by many nodes.
    ReadOnlyMany,
    /// Mounted read-write by many nodes.
    ReadWriteMany,
}

impl AccessMode {
    /// Returns the Kubernetes spelling.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ReadWriteOnce => "ReadWriteOnce",
            Self::ReadOnlyMany => "ReadOnlyMany",
            Self::ReadWriteMany => "ReadWriteMany",
        }
    }

    /// Parses a comma separated list such as `ReadWriteOnce,ReadOnlyMany`.
    ///
    /// # Errors
    ///
    /// Returns the first unknown mode, or an error when the list is empty.
    pub fn parse_list(value: &str) -> Result<Vec<Self>, String> {
        let modes = value
            .split(',')
            .map(str::trim)
            .filter(|mode| !mode.is_empty())
            .map(str::parse)
            .collect::<Result<Vec<Self>, String>>()?;
        if modes.is_empty() {
            return Err(String::from("at least one access mode is required"));
        }
        Ok(modes)
    }
}

impl FromStr for AccessMode {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "ReadWriteOnce" | "RWO" => Ok(Self::ReadWriteOnce),
            "ReadOnlyMany" | "ROX" => Ok(Self::ReadOnlyMany),
            "ReadWriteMany" | "RWX" => Ok(Self::ReadWriteMany),
            other => Err(format!("unknown access mode '{other}'")),
        }
    }
}

impl fmt::Display for AccessMode {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Resource kinds submitted to the control plane.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum ManifestKind {
    /// Cluster-wide volume bound to a concrete backend volume.
    PersistentVolume,
    /// Namespaced request for storage.
    PersistentVolumeClaim,
}

impl fmt::Display for ManifestKind {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PersistentVolume => formatter.write_str("PersistentVolume"),
            Self::PersistentVolumeClaim => formatter.write_str("PersistentVolumeClaim"),
        }
    }
}

/// Object metadata.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct ObjectMeta {
    /// Resource name.
    pub name: String,
}

/// Storage quantity wrapper (`{storage: "5Gi"}`).
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct StorageQuantity {
    /// Quantity in Kubernetes notation.
    pub storage: String,
}

/// Cinder backend reference.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct CinderVolumeSource {
    /// Filesystem the volume was formatted with.
    #[serde(rename = "fsType")]
    pub fs_type: String,
    /// Provider volume identifier.
    #[serde(rename = "volumeID")]
    pub volume_id: String,
}

/// PersistentVolume spec.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistentVolumeSpec {
    /// Capacity offered by the volume.
    pub capacity: StorageQuantity,
    /// Supported access modes.
    pub access_modes: Vec<AccessMode>,
    /// Backend reference.
    pub cinder: CinderVolumeSource,
}

/// Requested resources of a claim.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct ResourceRequirements {
    /// Minimum resources requested.
    pub requests: StorageQuantity,
}

/// PersistentVolumeClaim spec.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistentVolumeClaimSpec {
    /// Requested access modes.
    pub access_modes: Vec<AccessMode>,
    /// Requested storage.
    pub resources: ResourceRequirements,
}

/// Spec payload of either resource kind.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ManifestSpec {
    /// PersistentVolume payload.
    Volume(PersistentVolumeSpec),
    /// PersistentVolumeClaim payload.
    Claim(PersistentVolumeClaimSpec),
}

/// Manifest accepted by the control plane.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    /// Always [`API_VERSION`].
    pub api_version: String,
    /// Resource kind.
    pub kind: ManifestKind,
    /// Object metadata.
    pub metadata: ObjectMeta,
    /// Resource spec.
    pub spec: ManifestSpec,
}

impl Manifest {
    /// Resource name from the metadata.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    /// Renders the manifest as YAML.
    ///
    /// # Errors
    ///
    /// Returns the serialiser error.
    pub fn to_yaml(&self) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(self)
    }
}

/// Everything needed to register a prepared volume with the cluster.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct StorageResourceSpec {
    /// PersistentVolume name, normally the volume display name.
    pub name: String,
    /// Backing volume identifier.
    pub volume_id: String,
    /// Capacity in GiB.
    pub size_gib: u32,
    /// Filesystem the volume was formatted with.
    pub filesystem: String,
    /// Access modes for both resources.
    pub access_modes: Vec<AccessMode>,
}

impl StorageResourceSpec {
    fn quantity(&self) -> StorageQuantity {
        StorageQuantity {
            storage: format!("{}Gi", self.size_gib),
        }
    }

    /// Name of the claim paired with the volume.
    #[must_use]
    pub fn claim_name(&self) -> String {
        format!("{CLAIM_PREFIX}{}", self.name)
    }

    /// Builds the PersistentVolume manifest.
    #[must_use]
    pub fn persistent_volume(&self) -> Manifest {
        Manifest {
            api_version: String::from(API_VERSION),
            kind: ManifestKind::PersistentVolume,
            metadata: ObjectMeta {
                name: self.name.clone(),
            },
            spec: ManifestSpec::Volume(PersistentVolumeSpec {
                capacity: self.quantity(),
                access_modes: self.access_modes.clone(),
                cinder: CinderVolumeSource {
                    fs_type: self.filesystem.clone(),
                    volume_id: self.volume_id.clone(),
                },
            }),
        }
    }

    /// Builds the PersistentVolumeClaim manifest.
    #[must_use]
    pub fn persistent_volume_claim(&self) -> Manifest {
        Manifest {
            api_version: String::from(API_VERSION),
            kind: ManifestKind::PersistentVolumeClaim,
            metadata: ObjectMeta {
                name: self.claim_name(),
            },
            spec: ManifestSpec::Claim(PersistentVolumeClaimSpec {
                access_modes: self.access_modes.clone(),
                resources: ResourceRequirements {
                    requests: self.quantity(),
                },
            }),
        }
    }

    /// Both manifests in submission order.
    #[must_use]
    pub fn manifests(&self) -> [Manifest; 2] {
        [self.persistent_volume(), self.persistent_volume_claim()]
    }
}
