// Request protocol
// Pure response-classification rules shared by the blocking and async
// clients. Keeping the decisions here, free of any I/O, means the two
// execution modes cannot drift apart and the one-retry bound stays
// auditable in a single place.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Login request body.
#[derive(Serialize)]
pub(crate) struct LoginRequest<'a> {
    pub username: &'a str,
    pub password: &'a str,
}

/// Refresh request body.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RefreshRequest<'a> {
    pub refresh_token: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TokenResponse {
    token: Option<String>,
    refresh_token: Option<String>,
}

/// Token pair extracted from a successful login or refresh response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct IssuedTokens {
    pub access: String,
    pub refresh: Option<String>,
}

/// Classify a login response.
///
/// 200 with a token is success. 200 without one is a malformed response,
/// which is an authentication failure distinct from transport trouble.
pub(crate) fn login_outcome(status: u16, body: &str) -> Result<IssuedTokens> {
    token_outcome(status, body, "invalid username or password")
}

/// Classify a refresh response. Same shape as login, but a 401 means the
/// refresh token itself is no longer usable.
pub(crate) fn refresh_outcome(status: u16, body: &str) -> Result<IssuedTokens> {
    token_outcome(status, body, "refresh token expired or invalid")
}

fn token_outcome(status: u16, body: &str, rejected_message: &str) -> Result<IssuedTokens> {
    match status {
        200 => {
            let parsed: TokenResponse = serde_json::from_str(body)
                .map_err(|_| Error::Authentication("no token received in response".to_string()))?;
            match parsed.token {
                Some(token) if !token.is_empty() => Ok(IssuedTokens {
                    access: token,
                    refresh: parsed.refresh_token,
                }),
                _ => Err(Error::Authentication(
                    "no token received in response".to_string(),
                )),
            }
        }
        401 => Err(Error::Authentication(rejected_message.to_string())),
        _ => Err(Error::unexpected_status(status, body)),
    }
}

/// Classify a validate response. 200 and 401 are both normal outcomes,
/// returned as a boolean; anything else is exceptional.
pub(crate) fn validate_outcome(status: u16) -> Result<bool> {
    match status {
        200 => Ok(true),
        401 => Ok(false),
        _ => Err(Error::TokenValidation(format!(
            "token validation failed with status {status}"
        ))),
    }
}

/// What to do with an authenticated request's response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RetryDecision {
    /// Hand the response back to the caller as-is.
    Done,
    /// The server rejected the access token despite it passing local
    /// expiry checks. Refresh once and re-execute the same request.
    RefreshAndRetry,
}

/// One-shot retry rule: only a first 401 triggers a refresh-and-retry.
/// A second rejection is terminal for the call, and no other status is
/// ever interpreted here.
pub(crate) fn after_status(status: u16, already_retried: bool) -> RetryDecision {
    if status == 401 && !already_retried {
        RetryDecision::RefreshAndRetry
    } else {
        RetryDecision::Done
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_login_outcome_success() {
        let issued =
            login_outcome(200, r#"{"token":"abc","refreshToken":"def"}"#).unwrap();
        assert_eq!(issued.access, "abc");
        assert_eq!(issued.refresh.as_deref(), Some("def"));
    }

    #[test]
    fn test_login_outcome_without_refresh_token() {
        let issued = login_outcome(200, r#"{"token":"abc"}"#).unwrap();
        assert_eq!(issued.access, "abc");
        assert!(issued.refresh.is_none());
    }

    #[test]
    fn test_login_outcome_missing_token_is_authentication_error() {
        for body in ["{}", r#"{"refreshToken":"def"}"#, r#"{"token":""}"#, "not json"] {
            match login_outcome(200, body) {
                Err(Error::Authentication(msg)) => {
                    assert!(msg.contains("no token received"), "body: {body}")
                }
                other => panic!("expected Authentication error for {body}, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_login_outcome_rejected_credentials() {
        match login_outcome(401, "") {
            Err(Error::Authentication(msg)) => {
                assert_eq!(msg, "invalid username or password")
            }
            other => panic!("expected Authentication error, got {other:?}"),
        }
    }

    #[test]
    fn test_login_outcome_unexpected_status_carries_body() {
        match login_outcome(500, "boom") {
            Err(Error::Api { status, message }) => {
                assert_eq!(status, Some(500));
                assert!(message.contains("boom"));
            }
            other => panic!("expected Api error, got {other:?}"),
        }
    }

    #[test]
    fn test_refresh_outcome_rejected_token() {
        match refresh_outcome(401, "") {
            Err(Error::Authentication(msg)) => {
                assert_eq!(msg, "refresh token expired or invalid")
            }
            other => panic!("expected Authentication error, got {other:?}"),
        }
    }

    #[test]
    fn test_validate_outcome() {
        assert!(validate_outcome(200).unwrap());
        assert!(!validate_outcome(401).unwrap());
        assert!(matches!(
            validate_outcome(503),
            Err(Error::TokenValidation(_))
        ));
    }

    #[test]
    fn test_retry_decision_is_one_shot() {
        assert_eq!(after_status(401, false), RetryDecision::RefreshAndRetry);
        assert_eq!(after_status(401, true), RetryDecision::Done);
        // Non-401 statuses are never interpreted, retried or not.
        for status in [200, 204, 400, 403, 404, 429, 500] {
            assert_eq!(after_status(status, false), RetryDecision::Done);
            assert_eq!(after_status(status, true), RetryDecision::Done);
        }
    }

    #[test]
    fn test_request_bodies_serialize_to_wire_names() {
        let login = serde_json::to_value(LoginRequest {
            username: "admin",
            password: "hunter2",
        })
        .unwrap();
        assert_eq!(login["username"], "admin");
        assert_eq!(login["password"], "hunter2");

        let refresh = serde_json::to_value(RefreshRequest {
            refresh_token: "def",
        })
        .unwrap();
        assert_eq!(refresh["refreshToken"], "def");
    }
}
