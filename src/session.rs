// Session state
// Holds at most one token pair for one authenticated identity. The store
// itself is single-writer; the owning client wraps it in whatever lock
// its execution mode needs.

use crate::token::TokenPair;

/// In-memory store for the current token pair.
///
/// Replaced wholesale on every successful login or refresh, cleared on
/// logout. No history is kept.
#[derive(Debug, Default)]
pub struct SessionStore {
    token: Option<TokenPair>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self { token: None }
    }

    /// The current token pair. A pair with an empty access value counts
    /// as absent.
    pub fn current(&self) -> Option<&TokenPair> {
        self.token.as_ref().filter(|pair| !pair.access.is_empty())
    }

    pub fn access_token(&self) -> Option<&str> {
        self.current().map(|pair| pair.access.as_str())
    }

    pub fn refresh_token(&self) -> Option<&str> {
        self.current().and_then(|pair| pair.refresh.as_deref())
    }

    /// Install a new token pair, discarding the previous one.
    pub fn replace(&mut self, access: String, refresh: Option<String>) {
        self.token = Some(TokenPair::new(access, refresh));
    }

    /// Install a refreshed pair. A refresh response that omits a new
    /// refresh token keeps the previous one unchanged.
    pub fn replace_after_refresh(&mut self, access: String, refresh: Option<String>) {
        let retained = refresh.or_else(|| self.refresh_token().map(str::to_string));
        self.token = Some(TokenPair::new(access, retained));
    }

    /// Drop the stored token pair.
    pub fn clear(&mut self) {
        self.token = None;
    }

    /// Whether a token is present and not expired per the local oracle.
    pub fn is_authenticated(&self, buffer_seconds: u64) -> bool {
        self.current()
            .map(|pair| !pair.is_expired(buffer_seconds))
            .unwrap_or(false)
    }
}
