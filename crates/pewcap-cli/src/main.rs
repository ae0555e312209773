//! pewcap - fetch recent Personal Capital transactions from the command line.
//!
//! The cookie session is kept on disk so that, once a device has passed the
//! SMS/email verification, later runs can go unattended.

use std::io::{self, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use tracing::{debug, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use pewcap_core::api::PersonalCapitalClient;
use pewcap_core::auth::DEFAULT_SESSION_FILE;
use pewcap_core::config::{
    Config, DEFAULT_OUTPUT_DIR, ENV_EMAIL, ENV_OUTPUT_DIR, ENV_PASSWORD, ENV_SESSION_FILE,
    ENV_TWO_FACTOR,
};
use pewcap_core::{app, OperatorInput, TwoFactorMethod};

#[derive(Debug, Parser)]
#[command(
    name = "pewcap",
    version,
    about = "Fetch recent Personal Capital transactions without repeating two-factor login"
)]
struct Cli {
    /// Get a full year instead of the last week
    #[arg(long)]
    year: bool,

    /// Write the transactions to standard output instead of a file (also: `-`)
    #[arg(long)]
    stdout: bool,

    /// Where the login session is kept between runs
    #[arg(long, env = ENV_SESSION_FILE, default_value = DEFAULT_SESSION_FILE)]
    session_file: PathBuf,

    /// Directory for transactions_<end>_<start>.json
    #[arg(long, env = ENV_OUTPUT_DIR, default_value = DEFAULT_OUTPUT_DIR)]
    output_dir: PathBuf,

    /// Account email (prompted when unset)
    #[arg(long, env = ENV_EMAIL)]
    email: Option<String>,

    /// Channel for the verification code when the device isn't remembered
    #[arg(long, env = ENV_TWO_FACTOR, default_value_t = TwoFactorMethod::Sms)]
    two_factor: TwoFactorMethod,
}

impl Cli {
    /// The password is only ever read from the environment, never from flags
    fn into_config(self, password: Option<String>) -> Config {
        Config {
            session_file: self.session_file,
            output_dir: self.output_dir,
            email: self.email,
            password,
            two_factor: self.two_factor,
            extended: self.year,
            to_stdout: self.stdout,
        }
    }
}

/// A bare `-` means `--stdout`, unless it is the value of an option
/// such as `--session-file -`
fn normalize_args<I: IntoIterator<Item = String>>(args: I) -> Vec<String> {
    let command = Cli::command();
    let takes_value = |arg: &str| {
        arg.strip_prefix("--").is_some_and(|name| {
            command
                .get_arguments()
                .any(|a| a.get_long() == Some(name) && a.get_action().takes_values())
        })
    };

    let mut expecting_value = false;
    args.into_iter()
        .map(|arg| {
            let arg = if arg == "-" && !expecting_value {
                "--stdout".to_string()
            } else {
                arg
            };
            expecting_value = takes_value(&arg);
            arg
        })
        .collect()
}

/// Prompts on stderr so `--stdout` output stays clean
struct TerminalInput;

impl OperatorInput for TerminalInput {
    fn prompt(&self, message: &str) -> io::Result<String> {
        let mut stderr = io::stderr();
        write!(stderr, "{}", message)?;
        stderr.flush()?;

        let mut line = String::new();
        if io::stdin().read_line(&mut line)? == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "stdin closed while waiting for input",
            ));
        }
        Ok(line.trim_end_matches(['\r', '\n']).to_string())
    }

    fn prompt_secret(&self, message: &str) -> io::Result<String> {
        rpassword::prompt_password(message)
    }
}

/// Initialize the tracing subscriber for logging
fn init_tracing() {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(filter)
        .init();
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    init_tracing();

    let cli = Cli::parse_from(normalize_args(std::env::args()));
    let password = std::env::var(ENV_PASSWORD).ok();
    let config = cli.into_config(password);
    debug!(?config, "Resolved configuration");

    let api = PersonalCapitalClient::new().context("Failed to build HTTP client")?;
    let mut stdout = io::stdout().lock();

    if let Some(path) = app::run(&config, api, &TerminalInput, &mut stdout).await? {
        info!(path = %path.display(), "Done");
    }
    Ok(())
}
