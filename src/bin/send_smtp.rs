use std::path::Path;
use std::process::ExitCode;

use envmail::app::run_smtp_sender;
use envmail::config::{load_dotenv, SmtpSettings};
use envmail::report;
use envmail::telemetry::init_tracing;

const PROGRAM: &str = "send_smtp";

async fn run() -> anyhow::Result<()> {
  let settings = SmtpSettings::from_env()?;
  run_smtp_sender(settings).await
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
  load_dotenv(Path::new("."));

  init_tracing();

  report(PROGRAM, run().await)
}
