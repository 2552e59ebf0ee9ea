pub mod config;
pub mod diagnostics;
pub mod dolar;
pub mod exchange_rate;
pub mod fetcher;
pub mod job;
pub mod logging;
pub mod writer;

pub use config::{ConfigError, ConfigResolver, RunConfig};
pub use exchange_rate::{AuditedRateRecord, ExchangeRate, Origin};
pub use fetcher::{FetchError, RateFetcher, RateSource};
pub use job::{JobError, JobOutcome, JobRunner, JobState};
pub use writer::{RateSink, RateWriter, WriteError};
