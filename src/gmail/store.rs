use std::{
  fs,
  path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use tracing::debug;

use super::credential::Credential;

/// The on-disk token cache. Reads and writes are not locked; concurrent runs may race.
#[derive(Debug, Clone)]
pub struct TokenStore {
  path: PathBuf,
}

impl TokenStore {
  pub fn new(path: impl Into<PathBuf>) -> Self {
    TokenStore { path: path.into() }
  }

  pub fn path(&self) -> &Path {
    &self.path
  }

  /// Returns `None` when no token file exists yet. A file that exists but does not parse is an error.
  pub fn load(&self) -> Result<Option<Credential>> {
    if !self.path.exists() {
      debug!(path = %self.path.display(), "no cached token");
      return Ok(None);
    }

    let contents =
      fs::read_to_string(&self.path).with_context(|| format!("Failed to read token file {}", self.path.display()))?;
    let credential = serde_json::from_str(&contents)
      .with_context(|| format!("Token file {} is not a valid authorized user file", self.path.display()))?;

    Ok(Some(credential))
  }

  pub fn save(&self, credential: &Credential) -> Result<()> {
    if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
      fs::create_dir_all(parent).with_context(|| format!("Failed to create directory {}", parent.display()))?;
    }

    let json = serde_json::to_string_pretty(credential)?;
    fs::write(&self.path, json).with_context(|| format!("Failed to write token file {}", self.path.display()))?;
    debug!(path = %self.path.display(), "token cached");
    Ok(())
  }
}
