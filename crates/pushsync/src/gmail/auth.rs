//! User credentials forwarded to the Gmail API
//!
//! Obtaining and refreshing tokens happens outside this crate; the
//! credentials here are only carried to the HTTP layer as a bearer token.

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// Token filename in the gmailpush config directory
const TOKENS_FILE: &str = "gmail-tokens.json";

const ACCESS_TOKEN_VAR: &str = "GMAIL_ACCESS_TOKEN";

/// OAuth2 user credentials, in the shape Google token endpoints return
#[derive(Clone, Serialize, Deserialize)]
pub struct UserCredentials {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub token_type: Option<String>,
    /// Expiry as milliseconds since epoch
    #[serde(default)]
    pub expiry_date: Option<i64>,
}

impl UserCredentials {
    /// Credentials holding only an access token
    pub fn bearer(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: None,
            scope: None,
            token_type: None,
            expiry_date: None,
        }
    }

    /// Load credentials using the following priority:
    /// 1. JSON file (~/.config/gmailpush/gmail-tokens.json)
    /// 2. `GMAIL_ACCESS_TOKEN` environment variable
    pub fn load() -> Result<Self> {
        if config::config_exists(TOKENS_FILE) {
            return config::load_json(TOKENS_FILE);
        }

        Self::from_env()
    }

    /// Load credentials from a specific JSON file
    pub fn from_file(path: &Path) -> Result<Self> {
        config::load_json_file(path)
    }

    /// Parse credentials from a token JSON string
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("Failed to parse credentials JSON")
    }

    /// Load an access token from the environment
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load an access token from `GMAIL_ACCESS_TOKEN` as returned by `lookup`
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let access_token = lookup(ACCESS_TOKEN_VAR)
            .map(|token| token.trim().to_string())
            .filter(|token| !token.is_empty())
            .ok_or_else(|| anyhow!("{} environment variable not set", ACCESS_TOKEN_VAR))?;
        Ok(Self::bearer(access_token))
    }

    /// Value for the `Authorization` request header
    pub fn authorization_header(&self) -> String {
        format!("Bearer {}", self.access_token)
    }
}

impl fmt::Debug for UserCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserCredentials")
            .field("access_token", &"<redacted>")
            .field("has_refresh_token", &self.refresh_token.is_some())
            .field("scope", &self.scope)
            .field("expiry_date", &self.expiry_date)
            .finish()
    }
}
