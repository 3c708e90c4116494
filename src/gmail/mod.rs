//! Gmail REST API submission with a cached OAuth2 credential

mod client;
mod credential;
mod oauth;
mod service;
mod store;

pub use client::{GmailClient, SentMessage, GMAIL_API_BASE};
pub use credential::{Credential, DEFAULT_TOKEN_URI, GMAIL_SEND_SCOPE};
pub use oauth::{
  code_challenge, parse_callback, receive_callback, AuthorizationCallback, Authorizer, ClientSecrets,
  GoogleAuthorizer, DEFAULT_AUTH_URI,
};
pub use service::resolve_credential;
pub use store::TokenStore;
