//! Transaction window selection and the single data request.

use chrono::{Duration, Local, NaiveDate};
use tracing::info;

use crate::api::{RemoteApi, TransactionResponse};
use crate::auth::{AuthClient, AuthError, SessionStore};

// ============================================================================
// Constants
// ============================================================================

pub const TRANSACTIONS_ENDPOINT: &str = "/transaction/getUserTransactions";

/// Default look-back in days
pub const DEFAULT_WINDOW_DAYS: i64 = 7;

/// Look-back for `--year`
pub const EXTENDED_WINDOW_DAYS: i64 = 365;

const ROWS_PER_PAGE: &str = "100";

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Dates requested from the server. Ends yesterday so a partial day is never
/// included.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateWindow {
    start: NaiveDate,
    end: NaiveDate,
}

impl DateWindow {
    /// Window of `days` days ending the day before `today`.
    /// `days` below one is treated as one so `start < end` holds.
    pub fn ending_before(today: NaiveDate, days: i64) -> Self {
        let end = today - Duration::days(1);
        let start = end - Duration::days(days.max(1));
        Self { start, end }
    }

    pub fn for_mode(today: NaiveDate, extended: bool) -> Self {
        let days = if extended {
            EXTENDED_WINDOW_DAYS
        } else {
            DEFAULT_WINDOW_DAYS
        };
        Self::ending_before(today, days)
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }

    pub fn start_str(&self) -> String {
        self.start.format(DATE_FORMAT).to_string()
    }

    pub fn end_str(&self) -> String {
        self.end.format(DATE_FORMAT).to_string()
    }

    /// `transactions_<end>_<start>.json`
    pub fn file_name(&self) -> String {
        format!("transactions_{}_{}.json", self.end_str(), self.start_str())
    }
}

/// The fixed first-page request for a window, newest first
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionQuery {
    start_date: String,
    end_date: String,
}

impl TransactionQuery {
    pub fn new(window: &DateWindow) -> Self {
        Self {
            start_date: window.start_str(),
            end_date: window.end_str(),
        }
    }

    pub fn params(&self) -> Vec<(&str, &str)> {
        vec![
            ("sort_cols", "transactionTime"),
            ("sort_rev", "true"),
            ("page", "0"),
            ("rows_per_page", ROWS_PER_PAGE),
            ("startDate", self.start_date.as_str()),
            ("endDate", self.end_date.as_str()),
            ("component", "DATAGRID"),
        ]
    }
}

/// A fetched payload and the window it covers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionBatch {
    pub window: DateWindow,
    pub response: TransactionResponse,
}

pub struct FetchOrchestrator;

impl FetchOrchestrator {
    /// Fetch the window ending yesterday, local time
    pub async fn run<A: RemoteApi, S: SessionStore>(
        client: &mut AuthClient<A, S>,
        extended: bool,
    ) -> Result<TransactionBatch, AuthError> {
        Self::run_for_date(client, Local::now().date_naive(), extended).await
    }

    pub async fn run_for_date<A: RemoteApi, S: SessionStore>(
        client: &mut AuthClient<A, S>,
        today: NaiveDate,
        extended: bool,
    ) -> Result<TransactionBatch, AuthError> {
        let window = DateWindow::for_mode(today, extended);
        let query = TransactionQuery::new(&window);

        info!(start = %window.start_str(), end = %window.end_str(), "Fetching transactions");
        let response = client.fetch(TRANSACTIONS_ENDPOINT, &query.params()).await?;
        info!(bytes = response.len(), "Fetched transactions");

        Ok(TransactionBatch { window, response })
    }
}

// ============================================================================
// Tests
// ============================================================================
