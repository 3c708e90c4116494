use anyhow::Result;
use tracing::info;

use crate::{
  config::{GmailApiSettings, SmtpSettings},
  email::{resolve_ipv4, EmailMessage, EmailService, LettreTransport, SmtpConfig},
  gmail::{resolve_credential, GmailClient, GoogleAuthorizer, TokenStore, GMAIL_SEND_SCOPE},
};

/// Resolves the server to IPv4, then submits one message over a TLS-protected SMTP session.
pub async fn run_smtp_sender(settings: SmtpSettings) -> Result<()> {
  let ip = resolve_ipv4(&settings.host, settings.port).await?;
  let message = EmailMessage::from_smtp_settings(&settings);

  let config = SmtpConfig::new(&settings, ip);
  let service = EmailService::new(LettreTransport::new(&config)?);
  service.send_email(&message).await
}

/// Encodes the message, obtains a credential and submits it through the Gmail API.
pub async fn run_gmail_api_sender(settings: GmailApiSettings) -> Result<()> {
  let raw = EmailMessage::from_fields(&settings.message).encode_raw()?;

  let http = reqwest::Client::new();
  let store = TokenStore::new(settings.token_path.clone());
  let authorizer = GoogleAuthorizer::new(
    http.clone(),
    settings.credentials_path.clone(),
    vec![GMAIL_SEND_SCOPE.to_string()],
  );
  let credential = resolve_credential(&store, &authorizer).await?;

  let sent = GmailClient::new(http, credential.bearer()?).send_raw(&raw).await?;
  info!(id = %sent.id, to = %settings.message.to_email, "email sent via Gmail API");
  Ok(())
}
