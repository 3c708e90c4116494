use std::error::Error;
use std::process::ExitCode;

#[derive(Debug, PartialEq, Eq)]
pub enum ConfigError {
  MissingEnv(&'static str),
  NotUnicode(&'static str),
  MissingCredentialsFile,
  MissingTokenPath,
  InvalidPort(String),
}

impl Error for ConfigError {}

impl std::fmt::Display for ConfigError {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      ConfigError::MissingEnv(name) => write!(f, "Missing env {}", name),
      ConfigError::NotUnicode(name) => write!(f, "Env {} is not valid UTF-8", name),
      ConfigError::MissingCredentialsFile => write!(f, "Missing GMAIL_API_CREDENTIALS (credentials.json)."),
      ConfigError::MissingTokenPath => write!(f, "Missing GMAIL_API_TOKEN path (token.json)."),
      ConfigError::InvalidPort(value) => write!(f, "Invalid SMTP_PORT {:?}: expected a port number", value),
    }
  }
}

/// Formats a failure as the single line written to stderr.
pub fn error_line(program: &str, err: &anyhow::Error) -> String {
  let message = format!("{:#}", err).replace(['\r', '\n'], " ");
  format!("[{} ERROR] {}", program, message)
}

/// Maps the outcome of a run to the process exit status, printing the error line on failure.
pub fn report(program: &str, result: anyhow::Result<()>) -> ExitCode {
  match result {
    Ok(()) => ExitCode::SUCCESS,
    Err(err) => {
      eprintln!("{}", error_line(program, &err));
      ExitCode::FAILURE
    }
  }
}
