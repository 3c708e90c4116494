//! Environment-driven configuration for both senders.
//!
//! Every value is read through a lookup function so the same parsing runs against the
//! process environment in the binaries and against plain maps in tests. Empty values are
//! treated exactly like unset ones.

use std::{
  env::{self, VarError},
  path::{Path, PathBuf},
};

use crate::error::ConfigError;

pub const DEFAULT_SMTP_PORT: u16 = 587;

pub fn process_env(key: &str) -> Result<String, VarError> {
  env::var(key)
}

/// Loads `.env` from `dir` only; parent directories are never searched. Variables that are
/// already set keep their values.
pub fn load_dotenv(dir: &Path) {
  let _ = dotenvy::from_path(dir.join(".env"));
}

fn optional<F>(lookup: &F, key: &'static str) -> Result<Option<String>, ConfigError>
where
  F: Fn(&str) -> Result<String, VarError>,
{
  match lookup(key) {
    Ok(value) if !value.is_empty() => Ok(Some(value)),
    Ok(_) | Err(VarError::NotPresent) => Ok(None),
    Err(VarError::NotUnicode(_)) => Err(ConfigError::NotUnicode(key)),
  }
}

fn required<F>(lookup: &F, key: &'static str) -> Result<String, ConfigError>
where
  F: Fn(&str) -> Result<String, VarError>,
{
  optional(lookup, key)?.ok_or(ConfigError::MissingEnv(key))
}

/// Removes every whitespace character, so app passwords pasted as `"abcd efgh"` still work.
pub fn strip_whitespace(value: &str) -> String {
  value.chars().filter(|c| !c.is_whitespace()).collect()
}

/// Fields shared by both senders that describe the message itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageFields {
  pub to_email: String,
  pub subject: String,
  pub body: String,
  pub from_email: Option<String>,
}

impl MessageFields {
  pub fn from_lookup<F>(lookup: &F) -> Result<Self, ConfigError>
  where
    F: Fn(&str) -> Result<String, VarError>,
  {
    Ok(MessageFields {
      to_email: required(lookup, "TO_EMAIL")?,
      subject: required(lookup, "SUBJECT")?,
      body: required(lookup, "BODY")?,
      from_email: optional(lookup, "FROM_EMAIL")?,
    })
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmtpSettings {
  pub host: String,
  pub port: u16,
  pub username: String,
  pub password: String,
  pub message: MessageFields,
}

impl SmtpSettings {
  pub fn from_env() -> Result<Self, ConfigError> {
    Self::from_lookup(&process_env)
  }

  pub fn from_lookup<F>(lookup: &F) -> Result<Self, ConfigError>
  where
    F: Fn(&str) -> Result<String, VarError>,
  {
    let host = required(lookup, "SMTP_HOST")?;
    let port = match optional(lookup, "SMTP_PORT")? {
      Some(value) => value.trim().parse::<u16>().map_err(|_| ConfigError::InvalidPort(value))?,
      None => DEFAULT_SMTP_PORT,
    };
    let username = required(lookup, "SMTP_USER")?;
    let password = strip_whitespace(&required(lookup, "SMTP_PASS")?);
    let message = MessageFields::from_lookup(lookup)?;

    Ok(SmtpSettings {
      host,
      port,
      username,
      password,
      message,
    })
  }

  /// The `From` address: `FROM_EMAIL` when set, otherwise the authenticating user.
  pub fn sender(&self) -> &str {
    self.message.from_email.as_deref().unwrap_or(&self.username)
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GmailApiSettings {
  pub credentials_path: PathBuf,
  pub token_path: PathBuf,
  pub message: MessageFields,
}

impl GmailApiSettings {
  pub fn from_env() -> Result<Self, ConfigError> {
    Self::from_lookup(&process_env)
  }

  pub fn from_lookup<F>(lookup: &F) -> Result<Self, ConfigError>
  where
    F: Fn(&str) -> Result<String, VarError>,
  {
    let credentials_path = optional(lookup, "GMAIL_API_CREDENTIALS")?
      .map(PathBuf::from)
      .filter(|path| path.exists())
      .ok_or(ConfigError::MissingCredentialsFile)?;
    let token_path = optional(lookup, "GMAIL_API_TOKEN")?
      .map(PathBuf::from)
      .ok_or(ConfigError::MissingTokenPath)?;
    let message = MessageFields::from_lookup(lookup)?;

    Ok(GmailApiSettings {
      credentials_path,
      token_path,
      message,
    })
  }
}
