//! OpenStack implementation of the volume client.
//!
//! Volumes are managed through the Nova volume proxy (`os-volumes`) and the
//! server attachment API, authenticated with a Keystone v2.0 token.

mod attachments;
mod auth;
mod error;
mod types;
mod volumes;

use std::sync::LazyLock;
use std::time::Duration;

use serde::de::DeserializeOwned;

use crate::cloud::{Attachment, CloudError, CloudFuture, Volume, VolumeClient, VolumeSpec};
use error::ApiCall;

pub use auth::{Credentials, EndpointType};

const AUTH_HEADER: &str = "X-Auth-Token";
pub(crate) const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

pub(crate) static HTTP_CLIENT: LazyLock<reqwest::Client> = LazyLock::new(|| {
    reqwest::Client::builder()
        .timeout(HTTP_TIMEOUT)
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
});

/// Authenticated handle to the compute API.
///
/// Cloning is cheap and clones share the underlying HTTP connection pool.
#[derive(Clone)]
pub struct OpenStackClient {
    compute_url: String,
    token: String,
}

impl std::fmt::Debug for OpenStackClient {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("OpenStackClient")
            .field("compute_url", &self.compute_url)
            .finish_non_exhaustive()
    }
}

impl OpenStackClient {
    /// Builds a client from an already issued token.
    #[must_use]
    pub fn with_token(compute_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            compute_url: compute_url.into().trim().trim_end_matches('/').to_owned(),
            token: token.into(),
        }
    }

    /// Requests a token from Keystone and resolves the compute endpoint.
    ///
    /// When `endpoint_url` is given it replaces the catalog lookup.
    ///
    /// # Errors
    ///
    /// Returns [`CloudError::Auth`] when the identity service is unreachable,
    /// rejects the credentials, or lists no usable compute endpoint.
    pub async fn authenticate(
        credentials: &Credentials,
        endpoint_type: EndpointType,
        endpoint_url: Option<&str>,
    ) -> Result<Self, CloudError> {
        let url = auth::tokens_url(&credentials.auth_url);
        tracing::debug!(
            %url,
            username = %credentials.username,
            tenant = %credentials.tenant,
            "requesting token"
        );

        let response = HTTP_CLIENT
            .post(&url)
            .json(&auth::TokenRequest::new(credentials))
            .send()
            .await
            .map_err(|err| CloudError::Auth {
                message: err.to_string(),
            })?;

        let status = response.status();
        let body = response.bytes().await.map_err(|err| CloudError::Auth {
            message: err.to_string(),
        })?;
        if !status.is_success() {
            return Err(CloudError::Auth {
                message: format!(
                    "HTTP {}: {}",
                    status.as_u16(),
                    String::from_utf8_lossy(&body).trim()
                ),
            });
        }

        let parsed: auth::TokenResponse =
            serde_json::from_slice(&body).map_err(|err| CloudError::Auth {
                message: format!("malformed token response: {err}"),
            })?;
        let compute_url = endpoint_url.map_or_else(
            || parsed.compute_endpoint(endpoint_type),
            |explicit| Ok(explicit.trim_end_matches('/').to_owned()),
        )?;

        tracing::info!(%compute_url, "authenticated against identity service");
        Ok(Self::with_token(compute_url, parsed.token()))
    }

    /// Compute endpoint requests are sent to.
    #[must_use]
    pub fn compute_url(&self) -> &str {
        &self.compute_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.compute_url)
    }

    async fn send(
        &self,
        call: ApiCall<'_>,
        request: reqwest::RequestBuilder,
    ) -> Result<Vec<u8>, CloudError> {
        let response = request
            .header(AUTH_HEADER, &self.token)
            .timeout(HTTP_TIMEOUT)
            .send()
            .await
            .map_err(|err| call.transport(err.to_string()))?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|err| call.transport(err.to_string()))?;

        if status.is_success() {
            return Ok(body.to_vec());
        }

        Err(call.classify(status.as_u16(), &String::from_utf8_lossy(&body)))
    }

    fn decode<T: DeserializeOwned>(call: ApiCall<'_>, body: &[u8]) -> Result<T, CloudError> {
        serde_json::from_slice(body).map_err(|err| call.invalid_response(err.to_string()))
    }
}

impl VolumeClient for OpenStackClient {
    fn create_volume<'a>(&'a self, spec: &'a VolumeSpec) -> CloudFuture<'a, Volume> {
        Box::pin(async move { self.post_volume(spec).await })
    }

    fn get_volume<'a>(&'a self, volume_id: &'a str) -> CloudFuture<'a, Volume> {
        Box::pin(async move { self.fetch_volume(volume_id).await })
    }

    fn attach_volume<'a>(
        &'a self,
        server_id: &'a str,
        volume_id: &'a str,
    ) -> CloudFuture<'a, Attachment> {
        Box::pin(async move { self.post_attachment(server_id, volume_id).await })
    }

    fn detach_volume<'a>(
        &'a self,
        server_id: &'a str,
        attachment_id: &'a str,
    ) -> CloudFuture<'a, ()> {
        Box::pin(async move { self.delete_attachment(server_id, attachment_id).await })
    }

    fn get_attachment<'a>(
        &'a self,
        server_id: &'a str,
        attachment_id: &'a str,
    ) -> CloudFuture<'a, Attachment> {
        Box::pin(async move { self.fetch_attachment(server_id, attachment_id).await })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn with_token_normalises_the_endpoint() {
        let client = OpenStackClient::with_token(" https://nova.example/v2/tenant/ ", "tok");
        assert_eq!(client.compute_url(), "https://nova.example/v2/tenant");
        assert_eq!(
            client.url("/os-volumes/abc"),
            "https://nova.example/v2/tenant/os-volumes/abc"
        );
    }

    #[test]
    fn debug_output_omits_the_token() {
        let client = OpenStackClient::with_token("https://nova.example", "secret-token");
        assert!(!format!("{client:?}").contains("secret-token"));
    }

    #[tokio::test]
    async fn unreachable_identity_service_is_an_auth_error() {
        let credentials = Credentials {
            auth_url: String::from("http://127.0.0.1:9/v2.0"),
            username: String::from("demo"),
            password: String::from("secret"),
            tenant: String::from("project"),
        };
        let result = OpenStackClient::authenticate(&credentials, EndpointType::Public, None).await;
        assert!(matches!(result, Err(CloudError::Auth { .. })));
    }
}
