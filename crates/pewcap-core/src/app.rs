//! One run of the tool: restore, authenticate, fetch, persist, write.

use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{Local, NaiveDate};
use tracing::{error, info};

use crate::api::RemoteApi;
use crate::auth::{AuthClient, AuthError, Credentials, FileSessionStore, OperatorInput, SessionStore};
use crate::config::Config;
use crate::output::OutputSink;
use crate::transactions::{FetchOrchestrator, TransactionBatch};

/// Run against today's local date. Returns the file written, if any.
pub async fn run<A: RemoteApi>(
    config: &Config,
    api: A,
    input: &dyn OperatorInput,
    stdout: &mut dyn Write,
) -> Result<Option<PathBuf>> {
    run_for_date(config, api, input, stdout, Local::now().date_naive()).await
}

pub async fn run_for_date<A: RemoteApi>(
    config: &Config,
    api: A,
    input: &dyn OperatorInput,
    stdout: &mut dyn Write,
    today: NaiveDate,
) -> Result<Option<PathBuf>> {
    let credentials = Credentials::resolve(config.email.as_deref(), config.password.as_deref(), input)
        .context("Failed to read credentials")?;

    let store = FileSessionStore::new(&config.session_file);
    let mut client = AuthClient::new(api, store).with_method(config.two_factor);
    client.restore_session();

    let fetched = authenticate_and_fetch(&mut client, &credentials, input, today, config.extended).await;

    // The session is saved whatever happened above
    let persisted = client.persist_session();
    let batch = match (fetched, persisted) {
        (Ok(batch), Ok(())) => batch,
        (Ok(_), Err(e)) => return Err(e).context("Failed to save session"),
        (Err(e), Ok(())) => return Err(e.into()),
        (Err(e), Err(save_err)) => {
            error!(error = %save_err, "Failed to save session");
            return Err(e.into());
        }
    };
    info!(path = %config.session_file.display(), "Session saved");

    let sink = OutputSink::new(config.to_stdout, &config.output_dir);
    sink.write(&batch, stdout)
}

async fn authenticate_and_fetch<A: RemoteApi, S: SessionStore>(
    client: &mut AuthClient<A, S>,
    credentials: &Credentials,
    input: &dyn OperatorInput,
    today: NaiveDate,
    extended: bool,
) -> Result<TransactionBatch, AuthError> {
    client.authenticate(credentials, input).await?;
    FetchOrchestrator::run_for_date(client, today, extended).await
}
