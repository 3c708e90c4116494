use std::{net::Ipv4Addr, time::Duration};

use crate::config::SmtpSettings;
use crate::email::types::EmailMessage;
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use lettre::{
  transport::smtp::{
    authentication::Credentials,
    client::{Tls, TlsParameters},
    extension::ClientId,
  },
  AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use tracing::{debug, info};

pub const SMTP_TIMEOUT: Duration = Duration::from_secs(25);
pub const IMPLICIT_TLS_PORT: u16 = 465;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TlsMode {
  /// TLS from the first byte (SMTPS).
  Implicit,
  /// Plain connection upgraded with `STARTTLS` after the first `EHLO`.
  StartTls,
}

impl TlsMode {
  pub fn for_port(port: u16) -> Self {
    if port == IMPLICIT_TLS_PORT {
      TlsMode::Implicit
    } else {
      TlsMode::StartTls
    }
  }

  /// lettre TLS setting for this mode, verifying certificates against `host`.
  pub fn tls(self, host: &str) -> Result<Tls> {
    let parameters = TlsParameters::new(host.to_string()).with_context(|| format!("Invalid TLS name {}", host))?;
    Ok(match self {
      TlsMode::Implicit => Tls::Wrapper(parameters),
      TlsMode::StartTls => Tls::Required(parameters),
    })
  }
}

/// Connection parameters for one submission: the resolved IPv4 address is dialled, while
/// the configured hostname is used for `EHLO` and certificate verification.
#[derive(Debug, Clone)]
pub struct SmtpConfig {
  pub host: String,
  pub ip: Ipv4Addr,
  pub port: u16,
  pub username: String,
  pub password: String,
}

impl SmtpConfig {
  pub fn new(settings: &SmtpSettings, ip: Ipv4Addr) -> Self {
    SmtpConfig {
      host: settings.host.clone(),
      ip,
      port: settings.port,
      username: settings.username.clone(),
      password: settings.password.clone(),
    }
  }

  pub fn tls_mode(&self) -> TlsMode {
    TlsMode::for_port(self.port)
  }

  pub fn server(&self) -> String {
    self.ip.to_string()
  }
}

#[async_trait]
pub trait MailTransport: Send + Sync {
  async fn send(&self, message: Message) -> Result<()>;
}

#[async_trait]
impl<T: MailTransport + ?Sized> MailTransport for &T {
  async fn send(&self, message: Message) -> Result<()> {
    (**self).send(message).await
  }
}

pub struct LettreTransport {
  transporter: AsyncSmtpTransport<Tokio1Executor>,
}

impl LettreTransport {
  pub fn new(config: &SmtpConfig) -> Result<Self> {
    Self::with_tls_mode(config, config.tls_mode())
  }

  /// Like [`LettreTransport::new`], but with the TLS mode chosen by the caller instead of the port.
  pub fn with_tls_mode(config: &SmtpConfig, mode: TlsMode) -> Result<Self> {
    let creds = Credentials::new(config.username.clone(), config.password.clone());

    let transporter = AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(config.server())
      .port(config.port)
      .tls(mode.tls(&config.host)?)
      .hello_name(ClientId::Domain(config.host.clone()))
      .timeout(Some(SMTP_TIMEOUT))
      .credentials(creds)
      .build();

    debug!(
      host = %config.host,
      server = %config.server(),
      port = config.port,
      tls = ?mode,
      "SMTP transport configured"
    );

    Ok(LettreTransport { transporter })
  }
}

#[async_trait]
impl MailTransport for LettreTransport {
  async fn send(&self, message: Message) -> Result<()> {
    // lettre's Display already carries the server reply; its source() would repeat it.
    let response = self
      .transporter
      .send(message)
      .await
      .map_err(|err| anyhow!("SMTP send failed: {}", err))?;
    debug!(code = %response.code(), "SMTP server accepted message");
    Ok(())
  }
}

pub struct EmailService<T> {
  transport: T,
}

impl<T: MailTransport> EmailService<T> {
  pub fn new(transport: T) -> Self {
    EmailService { transport }
  }

  pub async fn send_email(&self, message: &EmailMessage) -> Result<()> {
    let email = message.to_message()?;
    self.transport.send(email).await?;
    info!(to = %message.to, "email sent via SMTP");
    Ok(())
  }
}
