use async_trait::async_trait;
use chrono::{Local, NaiveDate, NaiveDateTime};
use log::{debug, info, warn};
use sqlx::postgres::{PgConnectOptions, PgConnection, PgSslMode};
use sqlx::Connection;
use thiserror::Error;

use crate::config::RunConfig;
use crate::exchange_rate::{AuditedRateRecord, ExchangeRate};

pub const TARGET_TABLE: &str = "sis.msttipcam";

const INSERT_SQL: &str = r#"
INSERT INTO sis.msttipcam (
    tipcamfch, tipcamcmpamt, tipcamvtaamt,
    crefch, modfch, creusr, modusr,
    creips, modips, crehsn, modhsn,
    tipcampremes, tipcampre
)
VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
"#;

const COUNT_FOR_DATE_SQL: &str = "SELECT COUNT(*) FROM sis.msttipcam WHERE tipcamfch = $1";

#[derive(Debug, Clone, Error, PartialEq)]
pub enum WriteError {
    #[error("ConnectionFailed: {0}")]
    ConnectionFailed(String),

    #[error("InsertFailed: {0}")]
    InsertFailed(String),

    #[error("PermissionDenied: {0}")]
    PermissionDenied(String),
}

/// Destination for one audited rate row per run.
#[async_trait]
pub trait RateSink: Send + Sync {
    async fn write(
        &self,
        rate: &ExchangeRate,
        config: &RunConfig,
        audit_user: &str,
    ) -> Result<AuditedRateRecord, WriteError>;
}

pub type Clock = fn() -> NaiveDateTime;

fn wall_clock() -> NaiveDateTime {
    Local::now().naive_local()
}

/// Inserts into the rate table over a dedicated connection that lives for a
/// single write.
pub struct RateWriter {
    clock: Clock,
}

impl Default for RateWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl RateWriter {
    pub fn new() -> Self {
        Self { clock: wall_clock }
    }

    pub fn with_clock(clock: Clock) -> Self {
        Self { clock }
    }

    pub fn record_for(
        &self,
        rate: &ExchangeRate,
        config: &RunConfig,
        audit_user: &str,
    ) -> AuditedRateRecord {
        AuditedRateRecord::new(rate, audit_user, &config.origin, (self.clock)())
    }
}

#[async_trait]
impl RateSink for RateWriter {
    async fn write(
        &self,
        rate: &ExchangeRate,
        config: &RunConfig,
        audit_user: &str,
    ) -> Result<AuditedRateRecord, WriteError> {
        info!(
            "Connecting to database {} on {}...",
            config.database, config.server
        );
        let mut conn = PgConnection::connect_with(&connect_options(config))
            .await
            .map_err(|e| classify(e, WriteError::ConnectionFailed))?;

        let record = self.record_for(rate, config, audit_user);
        let result = insert_record(&mut conn, &record).await;
        if result.is_ok() {
            info!("Exchange rate for {} stored", record.date);
            report_rows_for_date(&mut conn, record.date).await;
        }

        // Close on every path once the connection exists.
        if let Err(e) = conn.close().await {
            warn!("Database connection did not close cleanly: {e}");
        }

        result.map(|()| record)
    }
}

/// Builds connection options from `DB_SERVER`, which may carry a port as
/// `host:port`, `host,port` or `[ipv6]:port`.
pub fn connect_options(config: &RunConfig) -> PgConnectOptions {
    let (host, port) = split_host_port(&config.server);
    // Without the trust flag TLS is used when offered, plaintext otherwise.
    let ssl_mode = if config.trust_server_certificate {
        PgSslMode::Require
    } else {
        PgSslMode::Prefer
    };

    let options = PgConnectOptions::new()
        .host(host)
        .database(&config.database)
        .username(&config.username)
        .password(&config.password)
        .ssl_mode(ssl_mode)
        .application_name("tipcam");

    match port {
        Some(port) => options.port(port),
        None => options,
    }
}

pub fn split_host_port(server: &str) -> (&str, Option<u16>) {
    let server = server.trim();

    if let Some((addr, tail)) = server
        .strip_prefix('[')
        .and_then(|rest| rest.split_once(']'))
    {
        let port = tail.trim_start_matches([':', ',']).trim().parse().ok();
        return (addr, port);
    }

    if let Some((host, port)) = server.rsplit_once(',') {
        if let Ok(port) = port.trim().parse::<u16>() {
            return (host.trim(), Some(port));
        }
    }

    // A second colon means a bare IPv6 address, not a port separator.
    match server.rsplit_once(':') {
        Some((host, port)) if !host.contains(':') => match port.trim().parse::<u16>() {
            Ok(port) => (host.trim(), Some(port)),
            Err(_) => (server, None),
        },
        _ => (server, None),
    }
}

async fn insert_record(
    conn: &mut PgConnection,
    record: &AuditedRateRecord,
) -> Result<(), WriteError> {
    let mut tx = conn
        .begin()
        .await
        .map_err(|e| classify(e, WriteError::InsertFailed))?;

    sqlx::query(INSERT_SQL)
        .bind(record.date)
        .bind(record.buy_price)
        .bind(record.sell_price)
        .bind(record.created_at)
        .bind(record.modified_at)
        .bind(record.created_by.as_str())
        .bind(record.modified_by.as_str())
        .bind(record.created_by_ip.as_str())
        .bind(record.modified_by_ip.as_str())
        .bind(record.created_by_host.as_str())
        .bind(record.modified_by_host.as_str())
        .bind(record.monthly_reference_price)
        .bind(record.reference_price)
        .execute(&mut *tx)
        .await
        .map_err(|e| classify(e, WriteError::InsertFailed))?;

    // Dropping an uncommitted transaction rolls it back.
    tx.commit()
        .await
        .map_err(|e| classify(e, WriteError::InsertFailed))
}

/// Read-back after commit. Only insert rights are required, so nothing here
/// fails the write.
async fn report_rows_for_date(conn: &mut PgConnection, date: NaiveDate) {
    let read_back = sqlx::query_scalar::<_, i64>(COUNT_FOR_DATE_SQL)
        .bind(date)
        .fetch_one(&mut *conn)
        .await;

    match read_back_advisory(date, read_back) {
        Some(advisory) => warn!("{advisory}"),
        None => debug!("One row stored for {date}"),
    }
}

/// Turns the post-insert count into an operator warning, if one is due.
fn read_back_advisory(date: NaiveDate, read_back: Result<i64, sqlx::Error>) -> Option<String> {
    match read_back {
        Ok(1) => None,
        Ok(n) => Some(format!(
            "{n} rows are now stored for {date}; same-day re-runs add duplicates"
        )),
        Err(e) if is_permission_error(&e) => Some(format!(
            "Row was inserted, but the table cannot be read back with these credentials ({e}). \
             This can be ignored when only inserts are needed."
        )),
        Err(e) => Some(format!("Post-insert check failed: {e}")),
    }
}

fn classify(err: sqlx::Error, otherwise: fn(String) -> WriteError) -> WriteError {
    if is_permission_error(&err) {
        WriteError::PermissionDenied(err.to_string())
    } else {
        otherwise(err.to_string())
    }
}

/// SQLSTATE `42501` or failure text that points at missing rights.
pub fn is_permission_error(err: &sqlx::Error) -> bool {
    let code_denied = err
        .as_database_error()
        .and_then(|db| db.code())
        .is_some_and(|code| code == "42501");
    code_denied || mentions_permission(&err.to_string())
}

pub fn mentions_permission(text: &str) -> bool {
    let text = text.to_ascii_lowercase();
    [
        "permission denied",
        "insufficient privilege",
        "not authorized",
        "view server state",
    ]
    .iter()
    .any(|needle| text.contains(needle))
}
