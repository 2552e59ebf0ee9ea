use std::path::PathBuf;
use std::process::ExitCode;

use log::{error, info};
use thiserror::Error;
use uuid::Uuid;

use crate::config::{ConfigError, ConfigResolver, DEFAULT_LOG_DIR, RunConfig};
use crate::exchange_rate::AuditedRateRecord;
use crate::fetcher::{FetchError, RateFetcher, RateSource};
use crate::logging::init_logging;
use crate::writer::{RateSink, RateWriter, WriteError};

#[derive(Debug, Error)]
pub enum JobError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Write(#[from] WriteError),
}

/// Furthest step a run got to. Runs only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum JobState {
    Init,
    ConfigLoaded,
    RateFetched,
    Persisted,
}

impl JobState {
    /// What the run was doing when it stopped in this state.
    pub fn next_step(self) -> &'static str {
        match self {
            JobState::Init => "reading configuration",
            JobState::ConfigLoaded => "fetching the exchange rate",
            JobState::RateFetched => "storing the exchange rate",
            JobState::Persisted => "finishing",
        }
    }
}

/// Terminal state of a run.
#[derive(Debug)]
pub struct JobOutcome {
    pub run_id: Uuid,
    pub reached: JobState,
    pub result: Result<AuditedRateRecord, JobError>,
}

impl JobOutcome {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }

    pub fn exit_status(&self) -> u8 {
        if self.is_success() { 0 } else { 1 }
    }

    pub fn exit_code(&self) -> ExitCode {
        ExitCode::from(self.exit_status())
    }
}

pub struct JobRunner<S, W> {
    source: S,
    sink: W,
}

impl<S: RateSource, W: RateSink> JobRunner<S, W> {
    pub fn new(source: S, sink: W) -> Self {
        Self { source, sink }
    }

    /// One linear attempt: config, fetch, write. A failing step ends the run
    /// and nothing after it is touched.
    pub async fn run<F>(&self, resolve: F) -> JobOutcome
    where
        F: FnOnce() -> Result<RunConfig, ConfigError>,
    {
        let run_id = Uuid::new_v4();
        info!("=== Starting exchange-rate update (run {run_id}) ===");

        let mut reached = JobState::Init;
        let result = self.advance(&mut reached, resolve).await;

        match &result {
            Ok(record) => info!(
                "Run {run_id} finished: rate for {} saved (buy {}, sell {})",
                record.date, record.buy_price, record.sell_price
            ),
            Err(e) => error!("Run {run_id} failed while {}: {e}", reached.next_step()),
        }

        JobOutcome {
            run_id,
            reached,
            result,
        }
    }

    async fn advance<F>(
        &self,
        reached: &mut JobState,
        resolve: F,
    ) -> Result<AuditedRateRecord, JobError>
    where
        F: FnOnce() -> Result<RunConfig, ConfigError>,
    {
        let config = resolve()?;
        *reached = JobState::ConfigLoaded;

        let rate = self.source.fetch_rate(&config).await?;
        *reached = JobState::RateFetched;

        let record = self.sink.write(&rate, &config, &config.username).await?;
        *reached = JobState::Persisted;

        Ok(record)
    }
}

/// Production entry point: logging to the configured directory, the HTTP
/// fetcher and the database writer.
pub async fn execute(config_dir: Option<PathBuf>, verbose: bool) -> JobOutcome {
    let resolver = ConfigResolver::new(config_dir);
    let settings = resolver.load_settings();
    let log_dir = settings
        .as_ref()
        .map(|settings| settings.log_dir())
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_LOG_DIR));
    init_logging(Some(&log_dir), verbose);

    if let Some(dir) = resolver.config_dir() {
        info!("Configuration directory: {}", dir.display());
    }

    let runner = JobRunner::new(RateFetcher::new(), RateWriter::new());
    runner
        .run(|| resolver.resolve_with_settings(settings?))
        .await
}
