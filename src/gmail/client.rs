use anyhow::{bail, Context, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};

pub const GMAIL_API_BASE: &str = "https://gmail.googleapis.com";

#[derive(Debug, Clone)]
pub struct GmailClient {
  client: Client,
  base_url: String,
  access_token: String,
}

#[derive(Debug, Serialize)]
struct SendMessageRequest<'a> {
  raw: &'a str,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SentMessage {
  pub id: String,
  #[serde(rename = "threadId", default)]
  pub thread_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
  error: ApiError,
}

#[derive(Debug, Deserialize)]
struct ApiError {
  #[serde(default)]
  message: String,
}

impl GmailClient {
  pub fn new(client: Client, access_token: impl Into<String>) -> Self {
    Self::with_base_url(client, GMAIL_API_BASE, access_token)
  }

  pub fn with_base_url(client: Client, base_url: &str, access_token: impl Into<String>) -> Self {
    Self {
      client,
      base_url: base_url.trim_end_matches('/').to_string(),
      access_token: access_token.into(),
    }
  }

  /// Sends a base64url-encoded RFC 5322 message as the authenticated user.
  pub async fn send_raw(&self, raw: &str) -> Result<SentMessage> {
    let url = format!("{}/gmail/v1/users/me/messages/send", self.base_url);
    let response = self
      .client
      .post(&url)
      .bearer_auth(&self.access_token)
      .json(&SendMessageRequest { raw })
      .send()
      .await
      .context("Gmail API request failed")?;

    let status = response.status();
    if !status.is_success() {
      let body = response.text().await.unwrap_or_default();
      let detail = serde_json::from_str::<ApiErrorBody>(&body)
        .map(|parsed| parsed.error.message)
        .unwrap_or(body);
      bail!("Gmail API returned {}: {}", status, detail);
    }

    response
      .json()
      .await
      .context("Gmail API returned an unexpected body")
  }
}
