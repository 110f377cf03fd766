// Configuration module
// Immutable settings for a credential session. Validation happens when a
// client is constructed, never mid-request.

use std::time::Duration;

use crate::error::{Error, Result};
use crate::token::DEFAULT_EXPIRY_BUFFER_SECS;

/// Prefix for environment-variable configuration, e.g. `AUTHFLOW_BASE_URL`.
const ENV_PREFIX: &str = "AUTHFLOW_";

/// Settings for a credential session.
///
/// Fields are public and the struct is plain data; clients treat it as
/// immutable for their whole lifetime.
#[derive(Debug, Clone)]
pub struct Config {
    /// Base URL of the API, `http://` or `https://`. A trailing slash is
    /// stripped during validation.
    pub base_url: String,
    /// Path prefix inserted between the base URL and every endpoint.
    pub api_prefix: String,

    // Authentication endpoints
    pub login_endpoint: String,
    pub refresh_endpoint: String,
    pub validate_endpoint: String,

    /// Header name carrying the bearer credential.
    pub token_header: String,
    /// Prefix placed before the credential inside the header value.
    pub token_prefix: String,
    /// Safety margin in seconds before the real token expiry.
    pub token_expiry_buffer: u64,

    /// Request timeout in seconds. Must be positive.
    pub timeout_secs: u64,
    /// Transport-level retry knobs, surfaced for the underlying client.
    /// The authenticated-request protocol itself never uses these.
    pub max_retries: u32,
    pub retry_delay_secs: f64,

    /// Verify TLS certificates. Disable only against local test servers.
    pub verify_tls: bool,

    /// Fallback credentials for development setups, if configured.
    pub default_username: Option<String>,
    pub default_password: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3001".to_string(),
            api_prefix: "/api".to_string(),
            login_endpoint: "/auth/login".to_string(),
            refresh_endpoint: "/auth/refresh".to_string(),
            validate_endpoint: "/auth/validate".to_string(),
            token_header: "Authorization".to_string(),
            token_prefix: "Bearer".to_string(),
            token_expiry_buffer: DEFAULT_EXPIRY_BUFFER_SECS,
            timeout_secs: 30,
            max_retries: 3,
            retry_delay_secs: 1.0,
            verify_tls: true,
            default_username: None,
            default_password: None,
        }
    }
}

impl Config {
    /// Config pointing at the given base URL, everything else default.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    /// Load configuration from `AUTHFLOW_`-prefixed environment variables,
    /// reading a `.env` file first if one exists. Unset variables keep
    /// their defaults; unparsable values are a configuration error.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let mut config = Self::default();
        read_env_string("BASE_URL", &mut config.base_url);
        read_env_string("API_PREFIX", &mut config.api_prefix);
        read_env_string("LOGIN_ENDPOINT", &mut config.login_endpoint);
        read_env_string("REFRESH_ENDPOINT", &mut config.refresh_endpoint);
        read_env_string("VALIDATE_ENDPOINT", &mut config.validate_endpoint);
        read_env_string("TOKEN_HEADER", &mut config.token_header);
        read_env_string("TOKEN_PREFIX", &mut config.token_prefix);
        read_env_parsed("TOKEN_EXPIRY_BUFFER", &mut config.token_expiry_buffer)?;
        read_env_parsed("TIMEOUT", &mut config.timeout_secs)?;
        read_env_parsed("MAX_RETRIES", &mut config.max_retries)?;
        read_env_parsed("RETRY_DELAY", &mut config.retry_delay_secs)?;
        read_env_bool("VERIFY_TLS", &mut config.verify_tls)?;
        config.default_username = env_var("USERNAME");
        config.default_password = env_var("PASSWORD");

        Ok(config)
    }

    /// Check the settings are usable. Called by client constructors so a
    /// malformed configuration surfaces before any request is made.
    pub fn validate(&self) -> Result<()> {
        if !self.base_url.starts_with("http://") && !self.base_url.starts_with("https://") {
            return Err(Error::Config(
                "base_url must start with http:// or https://".to_string(),
            ));
        }
        if self.timeout_secs == 0 {
            return Err(Error::Config("timeout must be positive".to_string()));
        }
        if self.token_header.trim().is_empty() {
            return Err(Error::Config("token_header must not be empty".to_string()));
        }
        if self.token_prefix.trim().is_empty() {
            return Err(Error::Config("token_prefix must not be empty".to_string()));
        }
        Ok(())
    }

    /// Copy with the trailing slash stripped from the base URL.
    pub(crate) fn normalized(mut self) -> Self {
        while self.base_url.ends_with('/') {
            self.base_url.pop();
        }
        self
    }

    /// Full URL for an endpoint:
    /// `base_url + "/" + api_prefix + "/" + endpoint`, slash-normalized.
    pub fn full_url(&self, endpoint: &str) -> String {
        format!(
            "{}/{}/{}",
            self.base_url.trim_end_matches('/'),
            self.api_prefix.trim_matches('/'),
            endpoint.trim_start_matches('/'),
        )
    }

    /// Request timeout as a `Duration`.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Configured fallback credentials, if both halves are present.
    pub fn default_credentials(&self) -> Option<(&str, &str)> {
        match (&self.default_username, &self.default_password) {
            (Some(user), Some(pass)) => Some((user.as_str(), pass.as_str())),
            _ => None,
        }
    }
}

fn env_var(suffix: &str) -> Option<String> {
    std::env::var(format!("{ENV_PREFIX}{suffix}")).ok()
}

fn read_env_string(suffix: &str, target: &mut String) {
    if let Some(value) = env_var(suffix) {
        *target = value;
    }
}

fn read_env_parsed<T: std::str::FromStr>(suffix: &str, target: &mut T) -> Result<()> {
    if let Some(raw) = env_var(suffix) {
        *target = raw.parse().map_err(|_| {
            Error::Config(format!("invalid value for {ENV_PREFIX}{suffix}: {raw}"))
        })?;
    }
    Ok(())
}

fn read_env_bool(suffix: &str, target: &mut bool) -> Result<()> {
    if let Some(raw) = env_var(suffix) {
        *target = match raw.to_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => true,
            "0" | "false" | "no" | "off" => false,
            _ => {
                return Err(Error::Config(format!(
                    "invalid value for {ENV_PREFIX}{suffix}: {raw}"
                )))
            }
        };
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        config.validate().unwrap();
        assert_eq!(config.token_expiry_buffer, 300);
        assert_eq!(config.timeout(), Duration::from_secs(30));
        assert!(config.verify_tls);
    }

    #[test]
    fn test_bad_scheme_is_config_error() {
        let config = Config::new("ftp://example.com");
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        let config = Config::new("localhost:3001");
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_zero_timeout_is_config_error() {
        let config = Config {
            timeout_secs: 0,
            ..Config::default()
        };
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_empty_header_parts_are_config_errors() {
        let config = Config {
            token_header: "  ".to_string(),
            ..Config::default()
        };
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        let config = Config {
            token_prefix: String::new(),
            ..Config::default()
        };
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_normalized_strips_trailing_slash() {
        let config = Config::new("http://localhost:3001///").normalized();
        assert_eq!(config.base_url, "http://localhost:3001");
    }

    #[test]
    fn test_full_url_slash_handling() {
        let config = Config::new("http://localhost:3001");
        assert_eq!(
            config.full_url("/auth/login"),
            "http://localhost:3001/api/auth/login"
        );
        assert_eq!(
            config.full_url("workspaces"),
            "http://localhost:3001/api/workspaces"
        );

        let config = Config {
            base_url: "https://example.com/".to_string(),
            api_prefix: "api/v1/".to_string(),
            ..Config::default()
        };
        assert_eq!(
            config.full_url("/auth/login"),
            "https://example.com/api/v1/auth/login"
        );
    }

    #[test]
    fn test_default_credentials_require_both_halves() {
        let mut config = Config::default();
        assert!(config.default_credentials().is_none());

        config.default_username = Some("admin".to_string());
        assert!(config.default_credentials().is_none());

        config.default_password = Some("hunter2".to_string());
        assert_eq!(config.default_credentials(), Some(("admin", "hunter2")));
    }

    #[test]
    fn test_from_env_overrides_and_rejects_garbage() {
        std::env::set_var("AUTHFLOW_BASE_URL", "https://llm.example.com/");
        std::env::set_var("AUTHFLOW_TIMEOUT", "60");
        std::env::set_var("AUTHFLOW_VERIFY_TLS", "off");
        let config = Config::from_env().unwrap();
        assert_eq!(config.base_url, "https://llm.example.com/");
        assert_eq!(config.timeout_secs, 60);
        assert!(!config.verify_tls);

        std::env::set_var("AUTHFLOW_TIMEOUT", "sixty");
        assert!(matches!(Config::from_env(), Err(Error::Config(_))));

        std::env::remove_var("AUTHFLOW_BASE_URL");
        std::env::remove_var("AUTHFLOW_TIMEOUT");
        std::env::remove_var("AUTHFLOW_VERIFY_TLS");
    }
}
