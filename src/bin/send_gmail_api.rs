use std::path::Path;
use std::process::ExitCode;

use envmail::app::run_gmail_api_sender;
use envmail::config::{load_dotenv, GmailApiSettings};
use envmail::report;
use envmail::telemetry::init_tracing;

const PROGRAM: &str = "send_gmail_api";

async fn run() -> anyhow::Result<()> {
  let settings = GmailApiSettings::from_env()?;
  run_gmail_api_sender(settings).await
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
  load_dotenv(Path::new("."));

  init_tracing();

  report(PROGRAM, run().await)
}
