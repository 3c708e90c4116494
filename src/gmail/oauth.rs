//! OAuth2 for an installed application: token refresh and the browser-driven
//! authorization-code flow with a loopback redirect and PKCE.

use std::{
  collections::HashMap,
  fs,
  path::{Path, PathBuf},
  process::{Command, Stdio},
};

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::{Duration, Utc};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use tokio::{
  io::{AsyncReadExt, AsyncWriteExt},
  net::TcpListener,
};
use tracing::{debug, info, warn};
use url::Url;
use uuid::Uuid;

use super::credential::{Credential, DEFAULT_TOKEN_URI};

pub const DEFAULT_AUTH_URI: &str = "https://accounts.google.com/o/oauth2/auth";

const MAX_CALLBACK_BYTES: usize = 16 * 1024;

const SUCCESS_PAGE: &str = "<!DOCTYPE html><html><head><title>envmail</title></head><body>\
<p>The authentication flow has completed. You may close this window.</p></body></html>";

const FAILURE_PAGE: &str = "<!DOCTYPE html><html><head><title>envmail</title></head><body>\
<p>The authentication flow failed. Check the terminal for details.</p></body></html>";

fn default_auth_uri() -> String {
  DEFAULT_AUTH_URI.to_string()
}

fn default_token_uri() -> String {
  DEFAULT_TOKEN_URI.to_string()
}

/// OAuth client identity from the console-issued client secrets file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ClientSecrets {
  pub client_id: String,
  pub client_secret: String,
  #[serde(default = "default_auth_uri")]
  pub auth_uri: String,
  #[serde(default = "default_token_uri")]
  pub token_uri: String,
}

#[derive(Deserialize)]
struct ClientSecretsFile {
  installed: Option<ClientSecrets>,
  web: Option<ClientSecrets>,
}

impl ClientSecrets {
  pub fn from_json(json: &str) -> Result<Self> {
    let file: ClientSecretsFile = serde_json::from_str(json).context("Client secrets file is not valid JSON")?;
    file
      .installed
      .or(file.web)
      .context("Client secrets file has neither an \"installed\" nor a \"web\" section")
  }

  pub fn from_file(path: &Path) -> Result<Self> {
    let json =
      fs::read_to_string(path).with_context(|| format!("Failed to read client secrets {}", path.display()))?;
    Self::from_json(&json).with_context(|| format!("Invalid client secrets {}", path.display()))
  }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
  access_token: String,
  #[serde(default)]
  expires_in: Option<i64>,
  #[serde(default)]
  refresh_token: Option<String>,
  #[serde(default)]
  scope: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TokenErrorResponse {
  error: String,
  #[serde(default)]
  error_description: Option<String>,
}

impl TokenResponse {
  /// Merges a token endpoint answer into `credential`. A refresh token or scope the
  /// endpoint leaves out keeps its previous value.
  fn apply_to(self, mut credential: Credential) -> Credential {
    credential.access_token = Some(self.access_token);
    credential.expiry = self.expires_in.map(|secs| Utc::now() + Duration::seconds(secs));
    if let Some(refresh_token) = self.refresh_token {
      credential.refresh_token = Some(refresh_token);
    }
    if let Some(scope) = self.scope {
      credential.scopes = scope.split_whitespace().map(str::to_string).collect();
    }
    credential
  }
}

async fn read_token_response(response: reqwest::Response) -> Result<TokenResponse> {
  let status = response.status();
  if !status.is_success() {
    let body = response.text().await.unwrap_or_default();
    let detail = match serde_json::from_str::<TokenErrorResponse>(&body) {
      Ok(TokenErrorResponse {
        error,
        error_description: Some(description),
      }) => format!("{}: {}", error, description),
      Ok(TokenErrorResponse { error, .. }) => error,
      Err(_) => body,
    };
    bail!("Token endpoint returned {}: {}", status, detail);
  }

  response
    .json()
    .await
    .context("Token endpoint returned an unexpected body")
}

/// S256 PKCE challenge for `verifier`.
pub fn code_challenge(verifier: &str) -> String {
  URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
}

fn new_code_verifier() -> String {
  format!("{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationCallback {
  pub code: String,
  pub state: String,
}

/// Extracts `code` and `state` from the redirect request's request line.
pub fn parse_callback(request: &str) -> Result<AuthorizationCallback> {
  let target = request
    .lines()
    .next()
    .and_then(|line| line.split_whitespace().nth(1))
    .context("Malformed authorization callback request")?;

  let url = Url::parse("http://localhost/")?
    .join(target)
    .context("Malformed authorization callback target")?;
  let params: HashMap<String, String> = url.query_pairs().into_owned().collect();

  if let Some(error) = params.get("error") {
    bail!("Authorization failed: {}", error);
  }

  Ok(AuthorizationCallback {
    code: params.get("code").cloned().context("Authorization callback has no code")?,
    state: params.get("state").cloned().context("Authorization callback has no state")?,
  })
}

/// Accepts a single connection on `listener` and answers it with a short HTML page.
pub async fn receive_callback(listener: &TcpListener) -> Result<AuthorizationCallback> {
  let (mut stream, peer) = listener
    .accept()
    .await
    .context("Failed to accept authorization callback")?;
  debug!(%peer, "authorization callback connected");

  let mut request = Vec::with_capacity(4096);
  let mut chunk = [0u8; 1024];
  loop {
    let n = stream
      .read(&mut chunk)
      .await
      .context("Failed to read authorization callback")?;
    if n == 0 {
      break;
    }
    request.extend_from_slice(&chunk[..n]);
    if request.windows(4).any(|w| w == b"\r\n\r\n") || request.len() > MAX_CALLBACK_BYTES {
      break;
    }
  }

  let callback = parse_callback(&String::from_utf8_lossy(&request));
  let page = if callback.is_ok() { SUCCESS_PAGE } else { FAILURE_PAGE };
  let response = format!(
    "HTTP/1.1 200 OK\r\nContent-Type: text/html; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
    page.len(),
    page
  );

  let _ = stream.write_all(response.as_bytes()).await;
  let _ = stream.flush().await;

  callback
}

/// The URL is always its own argument; nothing goes through a shell, so `&` and `?` survive.
fn browser_command(url: &str) -> Command {
  #[cfg(target_os = "macos")]
  let mut command = Command::new("open");
  #[cfg(target_os = "windows")]
  let mut command = {
    let mut command = Command::new("rundll32");
    command.arg("url.dll,FileProtocolHandler");
    command
  };
  #[cfg(not(any(target_os = "macos", target_os = "windows")))]
  let mut command = Command::new("xdg-open");

  command.arg(url);
  command
}

fn open_browser(url: &str) {
  match browser_command(url).stdout(Stdio::null()).stderr(Stdio::null()).spawn() {
    Ok(_) => debug!("browser launched for consent"),
    Err(err) => warn!(error = %err, "could not launch a browser; open the URL manually"),
  }
}

#[async_trait]
pub trait Authorizer: Send + Sync {
  /// Exchanges the credential's refresh token for a new access token.
  async fn refresh(&self, credential: &Credential) -> Result<Credential>;

  /// Runs the interactive consent flow and returns a fresh credential.
  async fn authorize(&self) -> Result<Credential>;
}

/// Talks to Google's OAuth endpoints. The client secrets file is only read when the
/// interactive flow actually runs.
pub struct GoogleAuthorizer {
  http: reqwest::Client,
  credentials_path: PathBuf,
  scopes: Vec<String>,
}

impl GoogleAuthorizer {
  pub fn new(http: reqwest::Client, credentials_path: impl Into<PathBuf>, scopes: Vec<String>) -> Self {
    GoogleAuthorizer {
      http,
      credentials_path: credentials_path.into(),
      scopes,
    }
  }

  pub fn authorization_url(
    &self,
    secrets: &ClientSecrets,
    redirect_uri: &str,
    state: &str,
    challenge: &str,
  ) -> Result<Url> {
    let scope = self.scopes.join(" ");
    Url::parse_with_params(
      &secrets.auth_uri,
      &[
        ("response_type", "code"),
        ("client_id", secrets.client_id.as_str()),
        ("redirect_uri", redirect_uri),
        ("scope", scope.as_str()),
        ("state", state),
        ("code_challenge", challenge),
        ("code_challenge_method", "S256"),
        ("access_type", "offline"),
      ],
    )
    .with_context(|| format!("Invalid auth_uri {}", secrets.auth_uri))
  }

  pub async fn exchange_code(
    &self,
    secrets: &ClientSecrets,
    code: &str,
    redirect_uri: &str,
    verifier: &str,
  ) -> Result<Credential> {
    let response = self
      .http
      .post(&secrets.token_uri)
      .form(&[
        ("grant_type", "authorization_code"),
        ("code", code),
        ("redirect_uri", redirect_uri),
        ("client_id", secrets.client_id.as_str()),
        ("client_secret", secrets.client_secret.as_str()),
        ("code_verifier", verifier),
      ])
      .send()
      .await
      .context("Authorization code exchange request failed")?;
    let token = read_token_response(response)
      .await
      .context("Failed to exchange authorization code")?;

    let credential = Credential {
      access_token: None,
      refresh_token: None,
      token_uri: secrets.token_uri.clone(),
      client_id: secrets.client_id.clone(),
      client_secret: secrets.client_secret.clone(),
      scopes: self.scopes.clone(),
      expiry: None,
    };
    Ok(token.apply_to(credential))
  }
}

#[async_trait]
impl Authorizer for GoogleAuthorizer {
  async fn refresh(&self, credential: &Credential) -> Result<Credential> {
    let refresh_token = credential
      .refresh_token
      .as_deref()
      .context("Credential has no refresh token")?;
    info!("refreshing expired access token");

    let response = self
      .http
      .post(&credential.token_uri)
      .form(&[
        ("grant_type", "refresh_token"),
        ("client_id", credential.client_id.as_str()),
        ("client_secret", credential.client_secret.as_str()),
        ("refresh_token", refresh_token),
      ])
      .send()
      .await
      .context("Token refresh request failed")?;
    let token = read_token_response(response)
      .await
      .context("Failed to refresh access token")?;

    Ok(token.apply_to(credential.clone()))
  }

  async fn authorize(&self) -> Result<Credential> {
    let secrets = ClientSecrets::from_file(&self.credentials_path)?;

    let listener = TcpListener::bind(("127.0.0.1", 0))
      .await
      .context("Failed to bind OAuth callback listener")?;
    let port = listener.local_addr()?.port();
    let redirect_uri = format!("http://localhost:{}/", port);

    let state = Uuid::new_v4().simple().to_string();
    let verifier = new_code_verifier();
    let url = self.authorization_url(&secrets, &redirect_uri, &state, &code_challenge(&verifier))?;

    info!(port, "waiting for OAuth consent");
    println!("Please visit this URL to authorize this application: {}", url);
    open_browser(url.as_str());

    let callback = receive_callback(&listener).await?;
    drop(listener);
    if callback.state != state {
      bail!("OAuth state mismatch in authorization callback");
    }

    self
      .exchange_code(&secrets, &callback.code, &redirect_uri, &verifier)
      .await
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::gmail::credential::GMAIL_SEND_SCOPE;
  use serde_json::json;
  use tokio::net::TcpStream;
  use wiremock::{
    matchers::{body_string_contains, method, path},
    Mock, MockServer, ResponseTemplate,
  };

  fn authorizer() -> GoogleAuthorizer {
    GoogleAuthorizer::new(
      reqwest::Client::new(),
      "/nonexistent/credentials.json",
      vec![GMAIL_SEND_SCOPE.to_string()],
    )
  }

  fn secrets(token_uri: String) -> ClientSecrets {
    ClientSecrets {
      client_id: "client-id".to_string(),
      client_secret: "client-secret".to_string(),
      auth_uri: DEFAULT_AUTH_URI.to_string(),
      token_uri,
    }
  }

  fn expired_credential(token_uri: String) -> Credential {
    Credential {
      access_token: Some("old-access".to_string()),
      refresh_token: Some("1//refresh".to_string()),
      token_uri,
      client_id: "client-id".to_string(),
      client_secret: "client-secret".to_string(),
      scopes: vec![GMAIL_SEND_SCOPE.to_string()],
      expiry: Some(Utc::now() - Duration::hours(1)),
    }
  }

  #[test]
  fn test_client_secrets_installed_section() {
    let json = r#"{"installed":{"client_id":"id","client_secret":"secret","redirect_uris":["http://localhost"]}}"#;
    let secrets = ClientSecrets::from_json(json).unwrap();

    assert_eq!(secrets.client_id, "id");
    assert_eq!(secrets.auth_uri, DEFAULT_AUTH_URI);
    assert_eq!(secrets.token_uri, DEFAULT_TOKEN_URI);
  }

  #[test]
  fn test_client_secrets_web_section() {
    let json = r#"{"web":{"client_id":"id","client_secret":"secret","token_uri":"https://example.com/token"}}"#;
    assert_eq!(
      ClientSecrets::from_json(json).unwrap().token_uri,
      "https://example.com/token"
    );
  }

  #[test]
  fn test_client_secrets_without_section_fails() {
    assert!(ClientSecrets::from_json(r#"{"other":{}}"#).is_err());
  }

  #[test]
  fn test_code_challenge_matches_rfc7636_example() {
    assert_eq!(
      code_challenge("dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk"),
      "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM"
    );
  }

  #[test]
  fn test_code_verifier_length_is_allowed() {
    let verifier = new_code_verifier();
    assert!((43..=128).contains(&verifier.len()));
  }

  #[test]
  fn test_authorization_url_parameters() {
    let url = authorizer()
      .authorization_url(
        &secrets(DEFAULT_TOKEN_URI.to_string()),
        "http://localhost:8123/",
        "state-1",
        "challenge-1",
      )
      .unwrap();
    let params: HashMap<String, String> = url.query_pairs().into_owned().collect();

    assert!(url.as_str().starts_with(DEFAULT_AUTH_URI));
    assert_eq!(params["response_type"], "code");
    assert_eq!(params["client_id"], "client-id");
    assert_eq!(params["redirect_uri"], "http://localhost:8123/");
    assert_eq!(params["scope"], GMAIL_SEND_SCOPE);
    assert_eq!(params["state"], "state-1");
    assert_eq!(params["code_challenge"], "challenge-1");
    assert_eq!(params["code_challenge_method"], "S256");
    assert_eq!(params["access_type"], "offline");
  }

  #[test]
  fn test_parse_callback_extracts_code_and_state() {
    let request = "GET /?state=abc&code=4%2F0Adeu&scope=https%3A%2F%2Fwww.googleapis.com%2Fauth%2Fgmail.send HTTP/1.1\r\nHost: localhost:8123\r\n\r\n";
    let callback = parse_callback(request).unwrap();

    assert_eq!(callback.code, "4/0Adeu");
    assert_eq!(callback.state, "abc");
  }

  #[test]
  fn test_parse_callback_surfaces_error() {
    let request = "GET /?error=access_denied&state=abc HTTP/1.1\r\n\r\n";
    let err = parse_callback(request).unwrap_err();
    assert_eq!(err.to_string(), "Authorization failed: access_denied");
  }

  #[test]
  fn test_parse_callback_requires_code() {
    assert!(parse_callback("GET /favicon.ico HTTP/1.1\r\n\r\n").is_err());
    assert!(parse_callback("").is_err());
  }

  #[tokio::test]
  async fn test_receive_callback_answers_browser() -> Result<()> {
    let listener = TcpListener::bind(("127.0.0.1", 0)).await?;
    let addr = listener.local_addr()?;

    let browser = tokio::spawn(async move {
      let mut stream = TcpStream::connect(addr).await.unwrap();
      stream
        .write_all(b"GET /?code=abc&state=xyz HTTP/1.1\r\nHost: localhost\r\n\r\n")
        .await
        .unwrap();
      let mut response = String::new();
      stream.read_to_string(&mut response).await.unwrap();
      response
    });

    let callback = receive_callback(&listener).await?;
    assert_eq!(callback.code, "abc");
    assert_eq!(callback.state, "xyz");

    let response = browser.await?;
    assert!(response.starts_with("HTTP/1.1 200 OK"));
    assert!(response.contains("authentication flow has completed"));
    Ok(())
  }

  #[tokio::test]
  async fn test_refresh_posts_refresh_grant_and_keeps_refresh_token() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
      .and(path("/token"))
      .and(body_string_contains("grant_type=refresh_token"))
      .and(body_string_contains("refresh_token=1%2F%2Frefresh"))
      .respond_with(ResponseTemplate::new(200).set_body_json(json!({
        "access_token": "new-access",
        "expires_in": 3599,
        "token_type": "Bearer",
        "scope": GMAIL_SEND_SCOPE,
      })))
      .expect(1)
      .mount(&server)
      .await;

    let before = expired_credential(format!("{}/token", server.uri()));
    let refreshed = authorizer().refresh(&before).await?;

    assert_eq!(refreshed.access_token.as_deref(), Some("new-access"));
    assert_eq!(refreshed.refresh_token.as_deref(), Some("1//refresh"));
    assert!(refreshed.is_valid_at(Utc::now()));
    Ok(())
  }

  #[tokio::test]
  async fn test_refresh_reports_endpoint_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
      .and(path("/token"))
      .respond_with(ResponseTemplate::new(400).set_body_json(json!({
        "error": "invalid_grant",
        "error_description": "Token has been expired or revoked.",
      })))
      .mount(&server)
      .await;

    let before = expired_credential(format!("{}/token", server.uri()));
    let err = authorizer().refresh(&before).await.unwrap_err();

    let message = format!("{:#}", err);
    assert!(message.contains("Failed to refresh access token"));
    assert!(message.contains("invalid_grant: Token has been expired or revoked."));
  }

  #[tokio::test]
  async fn test_exchange_code_sends_verifier() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
      .and(path("/token"))
      .and(body_string_contains("grant_type=authorization_code"))
      .and(body_string_contains("code=auth-code"))
      .and(body_string_contains("code_verifier=verifier-1"))
      .respond_with(ResponseTemplate::new(200).set_body_json(json!({
        "access_token": "access-1",
        "refresh_token": "refresh-1",
        "expires_in": 3599,
      })))
      .expect(1)
      .mount(&server)
      .await;

    let token_uri = format!("{}/token", server.uri());
    let credential = authorizer()
      .exchange_code(&secrets(token_uri.clone()), "auth-code", "http://localhost:1/", "verifier-1")
      .await?;

    assert_eq!(credential.access_token.as_deref(), Some("access-1"));
    assert_eq!(credential.refresh_token.as_deref(), Some("refresh-1"));
    assert_eq!(credential.token_uri, token_uri);
    assert_eq!(credential.scopes, vec![GMAIL_SEND_SCOPE.to_string()]);
    Ok(())
  }

  #[tokio::test]
  async fn test_authorize_fails_without_client_secrets() {
    let err = authorizer().authorize().await.unwrap_err();
    assert!(err.to_string().contains("Failed to read client secrets"));
  }

  #[test]
  fn test_browser_command_passes_url_verbatim() {
    let url = "https://accounts.google.com/o/oauth2/auth?response_type=code&client_id=id&state=abc";
    let command = browser_command(url);

    let args: Vec<_> = command.get_args().collect();
    assert_eq!(args.last().copied(), Some(std::ffi::OsStr::new(url)));
    assert_eq!(args.iter().filter(|a| a.to_string_lossy().contains("client_id")).count(), 1);

    #[cfg(target_os = "windows")]
    {
      assert_eq!(command.get_program(), "rundll32");
      assert_eq!(args, ["url.dll,FileProtocolHandler", url]);
    }
    #[cfg(target_os = "linux")]
    {
      assert_eq!(command.get_program(), "xdg-open");
      assert_eq!(args, [url]);
    }
  }
}
