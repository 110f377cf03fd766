// Error handling module
// One closed taxonomy for everything a credential session can fail with.
// Transport errors from the underlying client are wrapped at the boundary
// of each public operation; callers never see a raw `reqwest::Error`.

use thiserror::Error;

/// Errors produced by a credential session.
#[derive(Error, Debug)]
pub enum Error {
    /// Bad credentials, missing/unusable token, failed refresh, or a
    /// post-retry rejection. All mean "you are not (or no longer)
    /// authenticated".
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Transport failure or unexpected status on login, refresh, or an
    /// authenticated request. Carries the status code and raw response
    /// body for diagnostics when a response was received.
    #[error("API request failed: {message}")]
    Api {
        /// HTTP status, if a response was received at all.
        status: Option<u16>,
        message: String,
    },

    /// Unexpected status from the validate endpoint, or transport failure
    /// during validation.
    #[error("Token validation failed: {0}")]
    TokenValidation(String),

    /// Malformed settings. Raised when a client is constructed, never
    /// mid-request.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Wrap a transport-level failure where no HTTP response was received.
    pub(crate) fn transport(context: &str, err: reqwest::Error) -> Self {
        Error::Api {
            status: None,
            message: format!("{context}: {err}"),
        }
    }

    /// Wrap an unexpected HTTP status along with its raw response body.
    pub(crate) fn unexpected_status(status: u16, body: &str) -> Self {
        Error::Api {
            status: Some(status),
            message: format!("unexpected status {status}: {body}"),
        }
    }
}

/// Result type alias for credential session operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = Error::Authentication("invalid username or password".to_string());
        assert_eq!(
            err.to_string(),
            "Authentication failed: invalid username or password"
        );

        let err = Error::TokenValidation("unexpected status 500".to_string());
        assert_eq!(
            err.to_string(),
            "Token validation failed: unexpected status 500"
        );

        let err = Error::Config("base_url must start with http:// or https://".to_string());
        assert_eq!(
            err.to_string(),
            "Configuration error: base_url must start with http:// or https://"
        );
    }

    #[test]
    fn test_api_error_carries_status_and_body() {
        let err = Error::unexpected_status(503, "service unavailable");
        match &err {
            Error::Api { status, message } => {
                assert_eq!(*status, Some(503));
                assert!(message.contains("service unavailable"));
            }
            other => panic!("expected Api error, got {other:?}"),
        }
        assert_eq!(
            err.to_string(),
            "API request failed: unexpected status 503: service unavailable"
        );
    }
}
