//! Wire types for the Nova volume proxy (`os-volumes`) and attachment APIs.

use serde::{Deserialize, Serialize};

use crate::cloud::{Attachment, Volume, VolumeSpec, VolumeStatus};

#[derive(Debug, Serialize)]
pub(super) struct CreateVolumeRequest<'a> {
    pub(super) volume: CreateVolumeBody<'a>,
}

#[derive(Debug, Serialize)]
pub(super) struct CreateVolumeBody<'a> {
    display_name: &'a str,
    size: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    volume_type: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    availability_zone: Option<&'a str>,
}

impl<'a> CreateVolumeRequest<'a> {
    pub(super) fn from_spec(spec: &'a VolumeSpec) -> Self {
        Self {
            volume: CreateVolumeBody {
                display_name: &spec.display_name,
                size: spec.size_gib,
                volume_type: spec.volume_type.as_deref(),
                availability_zone: spec.availability_zone.as_deref(),
            },
        }
    }
}

#[derive(Debug, Deserialize)]
pub(super) struct VolumeEnvelope {
    pub(super) volume: NovaVolume,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct NovaVolume {
    id: String,
    #[serde(default)]
    display_name: Option<String>,
    size: u32,
    #[serde(default)]
    volume_type: Option<String>,
    #[serde(default)]
    availability_zone: Option<String>,
    status: String,
}

impl From<NovaVolume> for Volume {
    fn from(value: NovaVolume) -> Self {
        Self {
            id: value.id,
            display_name: value.display_name.unwrap_or_default(),
            size_gib: value.size,
            volume_type: value.volume_type.filter(|kind| !kind.is_empty()),
            availability_zone: value.availability_zone.filter(|zone| !zone.is_empty()),
            status: VolumeStatus::parse(&value.status),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct AttachRequest<'a> {
    pub(super) volume_attachment: AttachBody<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct AttachBody<'a> {
    pub(super) volume_id: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct AttachmentEnvelope {
    pub(super) volume_attachment: NovaAttachment,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct NovaAttachment {
    id: String,
    volume_id: String,
    server_id: String,
    #[serde(default)]
    device: Option<String>,
}

impl From<NovaAttachment> for Attachment {
    fn from(value: NovaAttachment) -> Self {
        Self {
            id: value.id,
            volume_id: value.volume_id,
            server_id: value.server_id,
            device_hint: value.device.filter(|device| !device.is_empty()),
        }
    }
}
