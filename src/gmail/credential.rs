use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

pub const GMAIL_SEND_SCOPE: &str = "https://www.googleapis.com/auth/gmail.send";
pub const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

/// Tokens this close to expiry are already treated as expired.
const REFRESH_THRESHOLD_SECS: i64 = 225;

fn default_token_uri() -> String {
  DEFAULT_TOKEN_URI.to_string()
}

/// An OAuth2 user credential, stored in the same JSON layout as Google's
/// "authorized user" token files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
  #[serde(rename = "token", default)]
  pub access_token: Option<String>,
  #[serde(default)]
  pub refresh_token: Option<String>,
  #[serde(default = "default_token_uri")]
  pub token_uri: String,
  pub client_id: String,
  pub client_secret: String,
  #[serde(default)]
  pub scopes: Vec<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub expiry: Option<DateTime<Utc>>,
}

impl Credential {
  /// A credential without a known expiry never counts as expired.
  pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
    match self.expiry {
      Some(expiry) => now >= expiry - Duration::seconds(REFRESH_THRESHOLD_SECS),
      None => false,
    }
  }

  pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
    self.access_token.as_deref().is_some_and(|token| !token.is_empty()) && !self.is_expired_at(now)
  }

  pub fn has_refresh_token(&self) -> bool {
    self.refresh_token.as_deref().is_some_and(|token| !token.is_empty())
  }

  pub fn bearer(&self) -> Result<&str> {
    self.access_token.as_deref().context("Credential has no access token")
  }
}
