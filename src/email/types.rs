use anyhow::{Context, Result};
use base64::{engine::general_purpose::URL_SAFE, Engine};
use lettre::{
  message::{
    header::{self, ContentType, Headers},
    Mailbox, Mailboxes, SinglePart,
  },
  Message,
};

use crate::config::{MessageFields, SmtpSettings};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailMessage {
  pub from: Option<String>,
  pub to: String,
  pub subject: String,
  pub body: String,
}

impl EmailMessage {
  pub fn new(from: Option<String>, to: String, subject: String, body: String) -> Self {
    EmailMessage { from, to, subject, body }
  }

  pub fn from_fields(fields: &MessageFields) -> Self {
    EmailMessage::new(
      fields.from_email.clone(),
      fields.to_email.clone(),
      fields.subject.clone(),
      fields.body.clone(),
    )
  }

  pub fn from_smtp_settings(settings: &SmtpSettings) -> Self {
    let mut message = EmailMessage::from_fields(&settings.message);
    message.from = Some(settings.sender().to_string());
    message
  }

  fn recipient(&self) -> Result<Mailbox> {
    self
      .to
      .parse()
      .with_context(|| format!("Invalid TO_EMAIL address {:?}", self.to))
  }

  /// Builds a complete message. A `From` address is required here; use
  /// [`EmailMessage::to_mime_bytes`] when the submitting service fills it in.
  pub fn to_message(&self) -> Result<Message> {
    let from = self.from.as_deref().context("Message has no From address")?;
    let from: Mailbox = from
      .parse()
      .with_context(|| format!("Invalid From address {:?}", from))?;

    let email = Message::builder()
      .from(from)
      .to(self.recipient()?)
      .subject(&self.subject)
      .header(ContentType::TEXT_PLAIN)
      .body(self.body.clone())
      .context("Failed to build MIME message")?;

    Ok(email)
  }

  /// Serializes the message as RFC 5322 bytes, leaving `From` out when none was given.
  pub fn to_mime_bytes(&self) -> Result<Vec<u8>> {
    if self.from.is_some() {
      return Ok(self.to_message()?.formatted());
    }

    let mut headers = Headers::new();
    headers.set(header::To::from(Mailboxes::from(self.recipient()?)));
    headers.set(header::Subject::from(self.subject.clone()));
    headers.set(header::MIME_VERSION_1_0);

    let mut raw = headers.to_string().into_bytes();
    raw.extend(SinglePart::plain(self.body.clone()).formatted());
    Ok(raw)
  }

  /// Base64url (padded) encoding of the serialized message, as the Gmail API expects in `raw`.
  pub fn encode_raw(&self) -> Result<String> {
    Ok(URL_SAFE.encode(self.to_mime_bytes()?))
  }
}
