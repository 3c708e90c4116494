use anyhow::Result;
use chrono::Utc;
use tracing::{debug, info};

use super::{credential::Credential, oauth::Authorizer, store::TokenStore};

/// Returns a usable credential, going through the cache, a refresh, or the interactive
/// flow, in that order. The cache file is rewritten only after a refresh or authorization.
pub async fn resolve_credential<A>(store: &TokenStore, authorizer: &A) -> Result<Credential>
where
  A: Authorizer + ?Sized,
{
  let now = Utc::now();
  let cached = store.load()?;

  let credential = match cached {
    Some(credential) if credential.is_valid_at(now) => {
      debug!("using cached access token");
      return Ok(credential);
    }
    Some(credential) if credential.is_expired_at(now) && credential.has_refresh_token() => {
      authorizer.refresh(&credential).await?
    }
    _ => {
      info!("no usable cached token, starting interactive authorization");
      authorizer.authorize().await?
    }
  };

  store.save(&credential)?;
  Ok(credential)
}
