//! Discovery of the local server identifier from the metadata service.

use serde::Deserialize;
use thiserror::Error;

use crate::openstack::{HTTP_CLIENT, HTTP_TIMEOUT};

/// Metadata document exposed to OpenStack guests.
pub const DEFAULT_METADATA_URL: &str = "http://169.254.169.254/openstack/latest/meta_data.json";

/// Errors raised while looking up the local server identifier.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum IdentityError {
    /// Raised when the metadata service cannot be reached.
    #[error("metadata request to {url} failed: {message}")]
    Request {
        /// Metadata URL.
        url: String,
        /// Transport error message.
        message: String,
    },
    /// Raised when the metadata service answers with a failure status.
    #[error("metadata service at {url} returned HTTP {status}")]
    Status {
        /// Metadata URL.
        url: String,
        /// HTTP status code.
        status: u16,
    },
    /// Raised when the document is not valid JSON or lacks `uuid`.
    #[error("metadata document from {url} is invalid: {message}")]
    Document {
        /// Metadata URL.
        url: String,
        /// Parse error message.
        message: String,
    },
}

#[derive(Deserialize)]
struct MetadataDocument {
    #[serde(default)]
    uuid: Option<String>,
}

/// Extracts the non-empty `uuid` field from a metadata document.
///
/// # Errors
///
/// Returns [`IdentityError::Document`] when the body is not JSON or the
/// field is missing or blank.
pub fn parse_server_id(url: &str, body: &[u8]) -> Result<String, IdentityError> {
    let document: MetadataDocument =
        serde_json::from_slice(body).map_err(|err| IdentityError::Document {
            url: url.to_owned(),
            message: err.to_string(),
        })?;

    document
        .uuid
        .map(|uuid| uuid.trim().to_owned())
        .filter(|uuid| !uuid.is_empty())
        .ok_or_else(|| IdentityError::Document {
            url: url.to_owned(),
            message: String::from("missing uuid field"),
        })
}

/// Fetches the metadata document at `url` and returns the server `uuid`.
///
/// # Errors
///
/// Returns [`IdentityError`] when the request fails, the service answers with
/// a non-success status, or the document has no usable `uuid`.
pub async fn discover_server_id(url: &str) -> Result<String, IdentityError> {
    let request_error = |err: reqwest::Error| IdentityError::Request {
        url: url.to_owned(),
        message: err.to_string(),
    };

    let response = HTTP_CLIENT
        .get(url)
        .timeout(HTTP_TIMEOUT)
        .send()
        .await
        .map_err(request_error)?;

    let status = response.status();
    if !status.is_success() {
        return Err(IdentityError::Status {
            url: url.to_owned(),
            status: status.as_u16(),
        });
    }

    let body = response.bytes().await.map_err(request_error)?;
    let server_id = parse_server_id(url, &body)?;
    tracing::info!(%server_id, "discovered local server identifier");
    Ok(server_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    const URL: &str = "http://metadata.test/meta_data.json";

    #[test]
    fn extracts_uuid() {
        let body = br#"{"uuid": "d8e02d56-2648-49a3-bf97-6be8f1204f38", "name": "node-1",
            "availability_zone": "nova"}"#;
        assert_eq!(
            parse_server_id(URL, body),
            Ok(String::from("d8e02d56-2648-49a3-bf97-6be8f1204f38"))
        );
    }

    #[rstest]
    #[case(br#"{"name": "node-1"}"#.as_slice())]
    #[case(br#"{"uuid": "  "}"#.as_slice())]
    #[case(b"not json".as_slice())]
    fn rejects_unusable_documents(#[case] body: &[u8]) {
        assert!(matches!(
            parse_server_id(URL, body),
            Err(IdentityError::Document { .. })
        ));
    }

    #[tokio::test]
    async fn unreachable_metadata_service_is_fatal() {
        let result = discover_server_id("http://127.0.0.1:9/openstack/latest/meta_data.json").await;
        assert!(matches!(result, Err(IdentityError::Request { .. })));
    }
}
