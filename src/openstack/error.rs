//! Mapping of HTTP failures onto [`CloudError`].

use crate::cloud::CloudError;

/// Describes the API call in flight so failures name what was attempted.
#[derive(Copy, Clone, Debug)]
pub(super) struct ApiCall<'a> {
    operation: &'static str,
    resource: &'static str,
    id: &'a str,
}

impl<'a> ApiCall<'a> {
    pub(super) const fn new(operation: &'static str, resource: &'static str, id: &'a str) -> Self {
        Self {
            operation,
            resource,
            id,
        }
    }

    pub(super) fn transport(self, message: impl Into<String>) -> CloudError {
        CloudError::Provider {
            operation: self.operation.to_owned(),
            message: message.into(),
        }
    }

    pub(super) fn invalid_response(self, message: impl Into<String>) -> CloudError {
        CloudError::InvalidResponse {
            operation: self.operation.to_owned(),
            message: message.into(),
        }
    }

    /// Classifies a non-success HTTP status.
    pub(super) fn classify(self, status: u16, body: &str) -> CloudError {
        match status {
            401 => CloudError::Auth {
                message: format!("{} rejected the token: {}", self.operation, body.trim()),
            },
            404 => CloudError::NotFound {
                resource: self.resource.to_owned(),
                id: self.id.to_owned(),
            },
            _ => CloudError::Provider {
                operation: self.operation.to_owned(),
                message: format!("HTTP {status}: {}", body.trim()),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    const CALL: ApiCall<'static> = ApiCall::new("get attachment", "attachment", "att-1");

    #[test]
    fn not_found_names_the_resource() {
        assert_eq!(
            CALL.classify(404, "{}"),
            CloudError::NotFound {
                resource: String::from("attachment"),
                id: String::from("att-1"),
            }
        );
    }

    #[test]
    fn unauthorised_maps_to_auth() {
        assert!(matches!(CALL.classify(401, "expired"), CloudError::Auth { .. }));
    }

    #[rstest]
    #[case(400)]
    #[case(409)]
    #[case(500)]
    fn other_statuses_are_provider_errors(#[case] status: u16) {
        let err = CALL.classify(status, " quota exceeded ");
        assert_eq!(
            err,
            CloudError::Provider {
                operation: String::from("get attachment"),
                message: format!("HTTP {status}: quota exceeded"),
            }
        );
    }
}
