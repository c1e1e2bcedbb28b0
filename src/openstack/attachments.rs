//! Server volume attachment calls (`os-volume_attachments`).

use crate::cloud::{Attachment, CloudError};

use super::OpenStackClient;
use super::error::ApiCall;
use super::types::{AttachBody, AttachRequest, AttachmentEnvelope};

impl OpenStackClient {
    fn attachments_url(&self, server_id: &str) -> String {
        self.url(&format!("/servers/{server_id}/os-volume_attachments"))
    }

    pub(super) async fn post_attachment(
        &self,
        server_id: &str,
        volume_id: &str,
    ) -> Result<Attachment, CloudError> {
        let call = ApiCall::new("attach volume", "server", server_id);
        let payload = AttachRequest {
            volume_attachment: AttachBody { volume_id },
        };
        let request = super::HTTP_CLIENT
            .post(self.attachments_url(server_id))
            .json(&payload);
        let body = self.send(call, request).await?;
        let envelope: AttachmentEnvelope = Self::decode(call, &body)?;
        Ok(envelope.volume_attachment.into())
    }

    pub(super) async fn delete_attachment(
        &self,
        server_id: &str,
        attachment_id: &str,
    ) -> Result<(), CloudError> {
        let call = ApiCall::new("detach volume", "attachment", attachment_id);
        let url = format!("{}/{attachment_id}", self.attachments_url(server_id));
        let request = super::HTTP_CLIENT.delete(url);
        self.send(call, request).await?;
        Ok(())
    }

    pub(super) async fn fetch_attachment(
        &self,
        server_id: &str,
        attachment_id: &str,
    ) -> Result<Attachment, CloudError> {
        let call = ApiCall::new("get attachment", "attachment", attachment_id);
        let url = format!("{}/{attachment_id}", self.attachments_url(server_id));
        let request = super::HTTP_CLIENT.get(url);
        let body = self.send(call, request).await?;
        let envelope: AttachmentEnvelope = Self::decode(call, &body)?;
        Ok(envelope.volume_attachment.into())
    }
}
