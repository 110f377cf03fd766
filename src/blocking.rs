// Blocking credential session
// Same observable contract as the async client, executed on the calling
// thread. The response-classification rules live in the protocol module,
// so the two modes cannot drift.

use std::sync::{Mutex, MutexGuard};

use reqwest::blocking::{Client, Response};
use reqwest::header::HeaderValue;
use reqwest::Method;

use crate::client::parse_auth_header;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::protocol::{self, LoginRequest, RefreshRequest, RetryDecision};
use crate::request::RequestOptions;
use crate::session::SessionStore;
use crate::token::{format_auth_header, is_token_expired, mask_token};

/// Blocking credential session.
///
/// Every operation runs on the calling thread. One pooled transport is
/// reused across calls; pooled connections are released when the client
/// is dropped or [`close`](Self::close)d. The session state assumes a
/// single logical writer.
pub struct AuthClient {
    config: Config,
    auth_header: reqwest::header::HeaderName,
    http: Client,
    session: Mutex<SessionStore>,
}

impl AuthClient {
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        let config = config.normalized();
        let auth_header = parse_auth_header(&config)?;
        let http = Client::builder()
            .timeout(config.timeout())
            .danger_accept_invalid_certs(!config.verify_tls)
            .build()
            .map_err(|e| Error::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            config,
            auth_header,
            http,
            session: Mutex::new(SessionStore::new()),
        })
    }

    /// Build a client configured from the environment.
    pub fn from_env() -> Result<Self> {
        Self::new(Config::from_env()?)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// POST credentials to the login endpoint and store the issued token
    /// pair. Returns the access token.
    pub fn authenticate(&self, username: &str, password: &str) -> Result<String> {
        let url = self.config.full_url(&self.config.login_endpoint);
        tracing::debug!(url = %url, username = %username, "authenticating");

        let response = self
            .http
            .post(&url)
            .json(&LoginRequest { username, password })
            .send()
            .map_err(|e| Error::transport("failed to send authentication request", e))?;
        let status = response.status().as_u16();
        let body = response
            .text()
            .map_err(|e| Error::transport("failed to read authentication response", e))?;

        let issued = protocol::login_outcome(status, &body)?;
        tracing::info!(token = %mask_token(&issued.access), "authenticated");
        self.session().replace(issued.access.clone(), issued.refresh);
        Ok(issued.access)
    }

    /// Authenticate with the fallback credentials from configuration.
    pub fn authenticate_default(&self) -> Result<String> {
        let (username, password) = self
            .config
            .default_credentials()
            .map(|(u, p)| (u.to_string(), p.to_string()))
            .ok_or_else(|| {
                Error::Authentication("no default credentials configured".to_string())
            })?;
        self.authenticate(&username, &password)
    }

    /// Exchange the stored refresh token for a new access token. Fails
    /// immediately, without a network call, when no refresh token is
    /// stored. A response that omits a new refresh token keeps the
    /// previous one.
    pub fn refresh_current(&self) -> Result<String> {
        let refresh_token = self.session().refresh_token().map(str::to_string);
        let Some(refresh_token) = refresh_token else {
            return Err(Error::Authentication(
                "no refresh token available".to_string(),
            ));
        };

        let url = self.config.full_url(&self.config.refresh_endpoint);
        tracing::debug!(url = %url, "refreshing access token");

        let response = self
            .http
            .post(&url)
            .json(&RefreshRequest {
                refresh_token: &refresh_token,
            })
            .send()
            .map_err(|e| Error::transport("failed to send refresh request", e))?;
        let status = response.status().as_u16();
        let body = response
            .text()
            .map_err(|e| Error::transport("failed to read refresh response", e))?;

        let issued = protocol::refresh_outcome(status, &body)?;
        tracing::debug!(token = %mask_token(&issued.access), "access token refreshed");
        self.session()
            .replace_after_refresh(issued.access.clone(), issued.refresh);
        Ok(issued.access)
    }

    /// Ask the server whether a token is accepted. Checks the given token,
    /// or the stored one when `None`. Returns `Ok(false)` without a
    /// network call when there is no token to check.
    pub fn validate(&self, token: Option<&str>) -> Result<bool> {
        let check = match token {
            Some(value) => Some(value.to_string()),
            None => self.session().access_token().map(str::to_string),
        };
        let Some(check) = check else {
            return Ok(false);
        };

        let url = self.config.full_url(&self.config.validate_endpoint);
        let response = self
            .http
            .get(&url)
            .header(self.auth_header.clone(), self.auth_value(&check)?)
            .send()
            .map_err(|e| Error::TokenValidation(format!("failed to send validation request: {e}")))?;

        protocol::validate_outcome(response.status().as_u16())
    }

    /// Return a usable access token, refreshing first when the stored one
    /// is expired or expiring within the configured buffer.
    pub fn ensure_valid(&self) -> Result<String> {
        let current = self.session().access_token().map(str::to_string);
        let Some(access) = current else {
            return Err(Error::Authentication("no token available".to_string()));
        };

        if !is_token_expired(&access, self.config.token_expiry_buffer) {
            return Ok(access);
        }

        tracing::debug!("stored token expired or expiring soon, refreshing");
        self.refresh_current()
            .map_err(|e| Error::Authentication(format!("token expired and refresh failed: {e}")))
    }

    /// Execute an authenticated request with one-shot refresh-and-retry
    /// on 401. See the async client for the full contract; both modes
    /// share the same decision rules.
    pub fn request(
        &self,
        method: Method,
        endpoint: &str,
        options: RequestOptions,
    ) -> Result<Response> {
        let mut token = self.ensure_valid()?;
        let url = self.config.full_url(endpoint);
        let mut already_retried = false;

        loop {
            let response = self.execute(&method, &url, &options, &token)?;
            match protocol::after_status(response.status().as_u16(), already_retried) {
                RetryDecision::Done => return Ok(response),
                RetryDecision::RefreshAndRetry => {
                    tracing::warn!(url = %url, "server rejected access token, refreshing and retrying once");
                    token = self.refresh_current().map_err(|e| {
                        Error::Authentication(format!("authentication expired: {e}"))
                    })?;
                    already_retried = true;
                }
            }
        }
    }

    pub fn get(&self, endpoint: &str, options: RequestOptions) -> Result<Response> {
        self.request(Method::GET, endpoint, options)
    }

    pub fn post(&self, endpoint: &str, options: RequestOptions) -> Result<Response> {
        self.request(Method::POST, endpoint, options)
    }

    pub fn put(&self, endpoint: &str, options: RequestOptions) -> Result<Response> {
        self.request(Method::PUT, endpoint, options)
    }

    pub fn delete(&self, endpoint: &str, options: RequestOptions) -> Result<Response> {
        self.request(Method::DELETE, endpoint, options)
    }

    /// Whether a token is stored and not expired per the local oracle.
    pub fn is_authenticated(&self) -> bool {
        self.session()
            .is_authenticated(self.config.token_expiry_buffer)
    }

    pub fn access_token(&self) -> Option<String> {
        self.session().access_token().map(str::to_string)
    }

    pub fn refresh_token(&self) -> Option<String> {
        self.session().refresh_token().map(str::to_string)
    }

    /// Drop the stored token pair.
    pub fn logout(&self) {
        self.session().clear();
    }

    /// Consume the session, releasing pooled connections held by the
    /// underlying transport.
    pub fn close(self) {}

    fn execute(
        &self,
        method: &Method,
        url: &str,
        options: &RequestOptions,
        token: &str,
    ) -> Result<Response> {
        let mut headers = options.headers.clone();
        // Caller headers are merged; the auth header always wins.
        headers.insert(self.auth_header.clone(), self.auth_value(token)?);

        let mut builder = self.http.request(method.clone(), url).headers(headers);
        if !options.query.is_empty() {
            builder = builder.query(&options.query);
        }
        if let Some(ref body) = options.json {
            builder = builder.json(body);
        }

        builder
            .send()
            .map_err(|e| Error::transport("request failed", e))
    }

    fn auth_value(&self, token: &str) -> Result<HeaderValue> {
        HeaderValue::from_str(&format_auth_header(token, &self.config.token_prefix)).map_err(
            |_| Error::Authentication("token contains characters invalid in a header".to_string()),
        )
    }

    /// Session state is only ever locked for in-memory reads and writes;
    /// the lock never spans a network call.
    fn session(&self) -> MutexGuard<'_, SessionStore> {
        self.session.lock().expect("session lock poisoned")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_rejects_invalid_config() {
        let config = Config {
            timeout_secs: 0,
            ..Config::default()
        };
        assert!(matches!(AuthClient::new(config), Err(Error::Config(_))));
    }

    #[test]
    fn test_ensure_valid_on_empty_session_fails_without_network() {
        let client = AuthClient::new(Config::new("http://127.0.0.1:9")).unwrap();
        match client.ensure_valid() {
            Err(Error::Authentication(msg)) => assert_eq!(msg, "no token available"),
            other => panic!("expected Authentication error, got {other:?}"),
        }
    }

    #[test]
    fn test_refresh_without_refresh_token_fails_without_network() {
        let client = AuthClient::new(Config::new("http://127.0.0.1:9")).unwrap();
        match client.refresh_current() {
            Err(Error::Authentication(msg)) => assert_eq!(msg, "no refresh token available"),
            other => panic!("expected Authentication error, got {other:?}"),
        }
    }

    #[test]
    fn test_validate_without_any_token_is_false_without_network() {
        let client = AuthClient::new(Config::new("http://127.0.0.1:9")).unwrap();
        assert!(!client.validate(None).unwrap());
    }
}
