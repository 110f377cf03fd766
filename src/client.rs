// Non-blocking credential session
// Async façade over the session store, the expiry oracle, and the
// authenticated-request protocol. Suspends at network call boundaries
// without blocking sibling tasks; concurrent requests share one session.

use reqwest::header::{HeaderName, HeaderValue};
use reqwest::{Client, Method, Response};
use tokio::sync::{Mutex, RwLock};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::protocol::{self, LoginRequest, RefreshRequest, RetryDecision};
use crate::request::RequestOptions;
use crate::session::SessionStore;
use crate::token::{format_auth_header, is_token_expired, mask_token};

/// Asynchronous credential session.
///
/// Authenticates against a login endpoint, tracks the resulting
/// access/refresh token pair, and wraps outbound requests with
/// "ensure valid token, attach header, execute, refresh once on 401"
/// semantics. Safe to share across tasks by reference; concurrent
/// refreshes are coalesced into a single in-flight refresh.
pub struct AuthClient {
    config: Config,
    auth_header: HeaderName,
    http: Client,
    session: RwLock<SessionStore>,
    /// Serializes refreshes so racing requests cannot invalidate a
    /// refresh token a sibling is still using.
    refresh_gate: Mutex<()>,
}

impl AuthClient {
    /// Build a client from validated configuration. Connection pooling is
    /// handled by the underlying transport; pooled connections are
    /// released when the client is dropped or [`close`](Self::close)d.
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
            session: RwLock::new(SessionStore::new()),
            refresh_gate: Mutex::new(()),
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
    pub async fn authenticate(&self, username: &str, password: &str) -> Result<String> {
        let url = self.config.full_url(&self.config.login_endpoint);
        tracing::debug!(url = %url, username = %username, "authenticating");

        let response = self
            .http
            .post(&url)
            .json(&LoginRequest { username, password })
            .send()
            .await
            .map_err(|e| Error::transport("failed to send authentication request", e))?;
        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| Error::transport("failed to read authentication response", e))?;

        let issued = protocol::login_outcome(status, &body)?;
        tracing::info!(token = %mask_token(&issued.access), "authenticated");
        let mut session = self.session.write().await;
        session.replace(issued.access.clone(), issued.refresh);
        Ok(issued.access)
    }

    /// Authenticate with the fallback credentials from configuration.
    pub async fn authenticate_default(&self) -> Result<String> {
        let (username, password) = self
            .config
            .default_credentials()
            .map(|(u, p)| (u.to_string(), p.to_string()))
            .ok_or_else(|| {
                Error::Authentication("no default credentials configured".to_string())
            })?;
        self.authenticate(&username, &password).await
    }

    /// Exchange the stored refresh token for a new access token. Fails
    /// immediately, without a network call, when no refresh token is
    /// stored. A response that omits a new refresh token keeps the
    /// previous one.
    pub async fn refresh_current(&self) -> Result<String> {
        let refresh_token = {
            let session = self.session.read().await;
            session.refresh_token().map(str::to_string)
        };
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
            .await
            .map_err(|e| Error::transport("failed to send refresh request", e))?;
        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| Error::transport("failed to read refresh response", e))?;

        let issued = protocol::refresh_outcome(status, &body)?;
        tracing::debug!(token = %mask_token(&issued.access), "access token refreshed");
        let mut session = self.session.write().await;
        session.replace_after_refresh(issued.access.clone(), issued.refresh);
        Ok(issued.access)
    }

    /// Ask the server whether a token is accepted. Checks the given token,
    /// or the stored one when `None`. Returns `Ok(false)` without a
    /// network call when there is no token to check; 200 and 401 are both
    /// normal outcomes.
    pub async fn validate(&self, token: Option<&str>) -> Result<bool> {
        let check = match token {
            Some(value) => Some(value.to_string()),
            None => {
                let session = self.session.read().await;
                session.access_token().map(str::to_string)
            }
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
            .await
            .map_err(|e| Error::TokenValidation(format!("failed to send validation request: {e}")))?;

        protocol::validate_outcome(response.status().as_u16())
    }

    /// Return a usable access token, refreshing first when the stored one
    /// is expired or expiring within the configured buffer.
    pub async fn ensure_valid(&self) -> Result<String> {
        let current = {
            let session = self.session.read().await;
            session.access_token().map(str::to_string)
        };
        let Some(access) = current else {
            return Err(Error::Authentication("no token available".to_string()));
        };

        if !is_token_expired(&access, self.config.token_expiry_buffer) {
            return Ok(access);
        }

        tracing::debug!("stored token expired or expiring soon, refreshing");
        self.refresh_coalesced(None)
            .await
            .map_err(|e| Error::Authentication(format!("token expired and refresh failed: {e}")))
    }

    /// Execute an authenticated request.
    ///
    /// Obtains a valid token (possibly refreshing), attaches the auth
    /// header, and executes the call. A 401 triggers exactly one refresh
    /// and re-execution; every response after that, including a second
    /// 401, is returned as-is. At most two refreshes can occur per
    /// request: one proactive, one reactive.
    pub async fn request(
        &self,
        method: Method,
        endpoint: &str,
        options: RequestOptions,
    ) -> Result<Response> {
        let mut token = self.ensure_valid().await?;
        let url = self.config.full_url(endpoint);
        let mut already_retried = false;

        loop {
            let response = self.execute(&method, &url, &options, &token).await?;
            match protocol::after_status(response.status().as_u16(), already_retried) {
                RetryDecision::Done => return Ok(response),
                RetryDecision::RefreshAndRetry => {
                    tracing::warn!(url = %url, "server rejected access token, refreshing and retrying once");
                    token = self.refresh_coalesced(Some(&token)).await.map_err(|e| {
                        Error::Authentication(format!("authentication expired: {e}"))
                    })?;
                    already_retried = true;
                }
            }
        }
    }

    pub async fn get(&self, endpoint: &str, options: RequestOptions) -> Result<Response> {
        self.request(Method::GET, endpoint, options).await
    }

    pub async fn post(&self, endpoint: &str, options: RequestOptions) -> Result<Response> {
        self.request(Method::POST, endpoint, options).await
    }

    pub async fn put(&self, endpoint: &str, options: RequestOptions) -> Result<Response> {
        self.request(Method::PUT, endpoint, options).await
    }

    pub async fn delete(&self, endpoint: &str, options: RequestOptions) -> Result<Response> {
        self.request(Method::DELETE, endpoint, options).await
    }

    /// Whether a token is stored and not expired per the local oracle.
    pub async fn is_authenticated(&self) -> bool {
        let session = self.session.read().await;
        session.is_authenticated(self.config.token_expiry_buffer)
    }

    pub async fn access_token(&self) -> Option<String> {
        let session = self.session.read().await;
        session.access_token().map(str::to_string)
    }

    pub async fn refresh_token(&self) -> Option<String> {
        let session = self.session.read().await;
        session.refresh_token().map(str::to_string)
    }

    /// Drop the stored token pair.
    pub async fn logout(&self) {
        self.session.write().await.clear();
    }

    /// Consume the session, releasing pooled connections held by the
    /// underlying transport.
    pub fn close(self) {}

    /// Refresh with at most one refresh in flight. Waiters re-check the
    /// store after acquiring the gate so a sibling's fresh token is
    /// reused instead of spending another refresh token.
    ///
    /// `rejected` is the token a server just refused with 401, if any.
    /// In that case a locally-unexpired token is only reused when it
    /// differs from the rejected one, i.e. a sibling already replaced it.
    async fn refresh_coalesced(&self, rejected: Option<&str>) -> Result<String> {
        let _guard = self.refresh_gate.lock().await;
        {
            let session = self.session.read().await;
            if let Some(access) = session.access_token() {
                let reusable = match rejected {
                    Some(old) => old != access,
                    None => !is_token_expired(access, self.config.token_expiry_buffer),
                };
                if reusable {
                    return Ok(access.to_string());
                }
            }
        }
        self.refresh_current().await
    }

    async fn execute(
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
            .await
            .map_err(|e| Error::transport("request failed", e))
    }

    fn auth_value(&self, token: &str) -> Result<HeaderValue> {
        HeaderValue::from_str(&format_auth_header(token, &self.config.token_prefix)).map_err(
            |_| Error::Authentication("token contains characters invalid in a header".to_string()),
        )
    }
}

pub(crate) fn parse_auth_header(config: &Config) -> Result<HeaderName> {
    HeaderName::from_bytes(config.token_header.as_bytes())
        .map_err(|_| Error::Config(format!("invalid token_header: {}", config.token_header)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_rejects_invalid_config() {
        let config = Config::new("not-a-url");
        assert!(matches!(AuthClient::new(config), Err(Error::Config(_))));
    }

    #[test]
    fn test_new_rejects_unusable_header_name() {
        let config = Config {
            token_header: "Bad Header".to_string(),
            ..Config::default()
        };
        assert!(matches!(AuthClient::new(config), Err(Error::Config(_))));
    }

    #[test]
    fn test_new_normalizes_base_url() {
        let client = AuthClient::new(Config::new("http://localhost:3001/")).unwrap();
        assert_eq!(client.config().base_url, "http://localhost:3001");
    }

    #[tokio::test]
    async fn test_ensure_valid_on_empty_session_fails_without_network() {
        // The configured port is unreachable; an attempted network call
        // would fail with an Api error rather than Authentication.
        let client = AuthClient::new(Config::new("http://127.0.0.1:9")).unwrap();
        match client.ensure_valid().await {
            Err(Error::Authentication(msg)) => assert_eq!(msg, "no token available"),
            other => panic!("expected Authentication error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_refresh_without_refresh_token_fails_without_network() {
        let client = AuthClient::new(Config::new("http://127.0.0.1:9")).unwrap();
        match client.refresh_current().await {
            Err(Error::Authentication(msg)) => assert_eq!(msg, "no refresh token available"),
            other => panic!("expected Authentication error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_validate_without_any_token_is_false_without_network() {
        let client = AuthClient::new(Config::new("http://127.0.0.1:9")).unwrap();
        assert!(!client.validate(None).await.unwrap());
    }

    #[tokio::test]
    async fn test_authenticate_default_requires_configured_credentials() {
        let client = AuthClient::new(Config::new("http://127.0.0.1:9")).unwrap();
        assert!(matches!(
            client.authenticate_default().await,
            Err(Error::Authentication(_))
        ));
    }
}
