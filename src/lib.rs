//! Client-side credential manager for token-based HTTP APIs.
//!
//! Establishes a session via username/password against a
//! `login -> {token, refreshToken}` endpoint, decides locally whether the
//! access token is still usable by decoding its embedded expiry claim,
//! and transparently refreshes and retries requests that fail with 401.
//! Available in a non-blocking ([`AuthClient`]) and a blocking
//! ([`blocking::AuthClient`]) flavor with the same contract.

pub mod blocking;
pub mod client;
pub mod config;
pub mod error;
mod protocol;
pub mod request;
pub mod session;
pub mod token;

pub use client::AuthClient;
pub use config::Config;
pub use error::{Error, Result};
pub use request::RequestOptions;
pub use session::SessionStore;
pub use token::{
    format_auth_header, is_token_expired, mask_token, TokenPair, DEFAULT_EXPIRY_BUFFER_SECS,
};
