//! Keystone v2.0 password authentication and service catalog lookup.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::cloud::CloudError;

const COMPUTE_SERVICE_TYPE: &str = "compute";

/// Credentials presented to the identity service.
#[derive(Clone, Eq, PartialEq)]
pub struct Credentials {
    /// Keystone endpoint, for example `https://keystone.example:5000/v2.0`.
    pub auth_url: String,
    /// User name.
    pub username: String,
    /// User password.
    pub password: String,
    /// Tenant (project) name.
    pub tenant: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("Credentials")
            .field("auth_url", &self.auth_url)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("tenant", &self.tenant)
            .finish()
    }
}

/// Which catalog URL to use for a service.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum EndpointType {
    /// `publicURL`.
    #[default]
    Public,
    /// `internalURL`.
    Internal,
    /// `adminURL`.
    Admin,
}

impl EndpointType {
    /// Returns the catalog key for this endpoint type.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Public => "publicURL",
            Self::Internal => "internalURL",
            Self::Admin => "adminURL",
        }
    }
}

impl FromStr for EndpointType {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "publicURL" | "public" => Ok(Self::Public),
            "internalURL" | "internal" => Ok(Self::Internal),
            "adminURL" | "admin" => Ok(Self::Admin),
            other => Err(format!(
                "unknown endpoint type '{other}' (expected publicURL, internalURL or adminURL)"
            )),
        }
    }
}

impl fmt::Display for EndpointType {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct TokenRequest<'a> {
    auth: TokenRequestAuth<'a>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TokenRequestAuth<'a> {
    tenant_name: &'a str,
    password_credentials: PasswordCredentials<'a>,
}

#[derive(Serialize)]
struct PasswordCredentials<'a> {
    username: &'a str,
    password: &'a str,
}

impl<'a> TokenRequest<'a> {
    pub(super) fn new(credentials: &'a Credentials) -> Self {
        Self {
            auth: TokenRequestAuth {
                tenant_name: &credentials.tenant,
                password_credentials: PasswordCredentials {
                    username: &credentials.username,
                    password: &credentials.password,
                },
            },
        }
    }
}

#[derive(Debug, Deserialize)]
pub(super) struct TokenResponse {
    access: Access,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Access {
    token: Token,
    #[serde(default)]
    service_catalog: Vec<CatalogEntry>,
}

#[derive(Debug, Deserialize)]
struct Token {
    id: String,
}

#[derive(Debug, Deserialize)]
struct CatalogEntry {
    #[serde(rename = "type")]
    service_type: String,
    #[serde(default)]
    endpoints: Vec<CatalogEndpoint>,
}

#[derive(Debug, Deserialize)]
struct CatalogEndpoint {
    #[serde(rename = "publicURL")]
    public_url: Option<String>,
    #[serde(rename = "internalURL")]
    internal_url: Option<String>,
    #[serde(rename = "adminURL")]
    admin_url: Option<String>,
}

impl CatalogEndpoint {
    fn url(&self, endpoint_type: EndpointType) -> Option<&str> {
        match endpoint_type {
            EndpointType::Public => self.public_url.as_deref(),
            EndpointType::Internal => self.internal_url.as_deref(),
            EndpointType::Admin => self.admin_url.as_deref(),
        }
    }
}

impl TokenResponse {
    pub(super) fn token(&self) -> &str {
        &self.access.token.id
    }

    /// Returns the first compute endpoint of the requested type.
    pub(super) fn compute_endpoint(
        &self,
        endpoint_type: EndpointType,
    ) -> Result<String, CloudError> {
        self.access
            .service_catalog
            .iter()
            .filter(|entry| entry.service_type == COMPUTE_SERVICE_TYPE)
            .flat_map(|entry| entry.endpoints.iter())
            .find_map(|endpoint| endpoint.url(endpoint_type))
            .map(|url| url.trim_end_matches('/').to_owned())
            .ok_or_else(|| CloudError::Auth {
                message: format!(
                    "service catalog has no {COMPUTE_SERVICE_TYPE} endpoint of type {endpoint_type}"
                ),
            })
    }
}

pub(super) fn tokens_url(auth_url: &str) -> String {
    format!("{}/tokens", auth_url.trim().trim_end_matches('/'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    const CATALOG: &str = r#"{"access": {
        "token": {"id": "tok-123", "expires": "2030-01-01T00:00:00Z"},
        "serviceCatalog": [
            {"type": "identity", "endpoints": [{"publicURL": "http://keystone/v2.0"}]},
            {"type": "compute", "name": "nova", "endpoints": [{
                "region": "RegionOne",
                "publicURL": "https://nova.example/v2/tenant/",
                "internalURL": "http://nova.internal/v2/tenant",
                "adminURL": "http://nova.admin/v2/tenant"
            }]}
        ]}}"#;

    fn response() -> TokenResponse {
        serde_json::from_str(CATALOG).unwrap_or_else(|err| panic!("parse: {err}"))
    }

    #[rstest]
    #[case(EndpointType::Public, "https://nova.example/v2/tenant")]
    #[case(EndpointType::Internal, "http://nova.internal/v2/tenant")]
    #[case(EndpointType::Admin, "http://nova.admin/v2/tenant")]
    fn selects_compute_endpoint_by_type(#[case] kind: EndpointType, #[case] expected: &str) {
        let url = response()
            .compute_endpoint(kind)
            .unwrap_or_else(|err| panic!("endpoint: {err}"));
        assert_eq!(url, expected);
    }

    #[test]
    fn exposes_token_id() {
        assert_eq!(response().token(), "tok-123");
    }

    #[test]
    fn missing_compute_service_is_an_auth_error() {
        let body = r#"{"access": {"token": {"id": "t"}, "serviceCatalog": []}}"#;
        let parsed: TokenResponse =
            serde_json::from_str(body).unwrap_or_else(|err| panic!("parse: {err}"));
        let err = parsed
            .compute_endpoint(EndpointType::Public)
            .err()
            .unwrap_or_else(|| panic!("lookup should fail"));
        assert!(matches!(err, CloudError::Auth { .. }));
    }

    #[test]
    fn token_request_uses_v2_layout() {
        let credentials = Credentials {
            auth_url: String::from("http://keystone/v2.0"),
            username: String::from("demo"),
            password: String::from("secret"),
            tenant: String::from("project"),
        };
        let json = serde_json::to_string(&TokenRequest::new(&credentials))
            .unwrap_or_else(|err| panic!("serialise: {err}"));
        assert_eq!(
            json,
            concat!(
                r#"{"auth":{"tenantName":"project","#,
                r#""passwordCredentials":{"username":"demo","password":"secret"}}}"#
            )
        );
    }

    #[test]
    fn credentials_debug_hides_password() {
        let credentials = Credentials {
            auth_url: String::from("http://keystone/v2.0"),
            username: String::from("demo"),
            password: String::from("secret"),
            tenant: String::from("project"),
        };
        assert!(!format!("{credentials:?}").contains("secret"));
    }

    #[rstest]
    #[case("http://keystone:5000/v2.0", "http://keystone:5000/v2.0/tokens")]
    #[case("http://keystone:5000/v2.0/", "http://keystone:5000/v2.0/tokens")]
    fn tokens_url_appends_path(#[case] base: &str, #[case] expected: &str) {
        assert_eq!(tokens_url(base), expected);
    }

    #[rstest]
    #[case("publicURL", EndpointType::Public)]
    #[case("internal", EndpointType::Internal)]
    #[case("adminURL", EndpointType::Admin)]
    fn endpoint_type_parses(#[case] raw: &str, #[case] expected: EndpointType) {
        assert_eq!(raw.parse::<EndpointType>(), Ok(expected));
    }
}
