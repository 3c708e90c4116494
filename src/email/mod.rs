//! SMTP submission and MIME message construction
//!
//! Messages are built with lettre and submitted over a TLS-protected SMTP session to an
//! explicitly resolved IPv4 address.

mod resolve;
mod service;
mod types;

pub use resolve::{first_ipv4, resolve_ipv4};
pub use service::{
  EmailService, LettreTransport, MailTransport, SmtpConfig, TlsMode, IMPLICIT_TLS_PORT, SMTP_TIMEOUT,
};
pub use types::EmailMessage;
