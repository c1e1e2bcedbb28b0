//! Volume creation and lookup through `os-volumes`.

use crate::cloud::{CloudError, Volume, VolumeSpec};

use super::OpenStackClient;
use super::error::ApiCall;
use super::types::{CreateVolumeRequest, VolumeEnvelope};

impl OpenStackClient {
    pub(super) async fn post_volume(&self, spec: &VolumeSpec) -> Result<Volume, CloudError> {
        let call = ApiCall::new("create volume", "volume", &spec.display_name);
        let request = super::HTTP_CLIENT
            .post(self.url("/os-volumes"))
            .json(&CreateVolumeRequest::from_spec(spec));
        let body = self.send(call, request).await?;
        let envelope: VolumeEnvelope = Self::decode(call, &body)?;
        Ok(envelope.volume.into())
    }

    pub(super) async fn fetch_volume(&self, volume_id: &str) -> Result<Volume, CloudError> {
        let call = ApiCall::new("get volume", "volume", volume_id);
        let request = super::HTTP_CLIENT.get(self.url(&format!("/os-volumes/{volume_id}")));
        let body = self.send(call, request).await?;
        let envelope: VolumeEnvelope = Self::decode(call, &body)?;
        Ok(envelope.volume.into())
    }
}
