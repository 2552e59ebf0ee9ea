//! Operator utilities that sit next to the job: a connectivity and
//! permission check against the rate table, and a driver listing.

use anyhow::{Context, Result};
use log::{info, warn};
use sqlx::Connection;
use sqlx::postgres::PgConnection;

use crate::config::RunConfig;
use crate::writer::{TARGET_TABLE, connect_options, is_permission_error};

/// Database client drivers compiled into this binary.
pub const COMPILED_DRIVERS: &[&str] = &["postgres"];

pub const DEFAULT_DRIVER: &str = "postgres";

pub fn has_driver(name: &str) -> bool {
    COMPILED_DRIVERS
        .iter()
        .any(|driver| driver.eq_ignore_ascii_case(name.trim()))
}

#[derive(Debug, Default, PartialEq)]
pub struct CheckReport {
    /// `None` when the user may insert but not read.
    pub row_count: Option<i64>,
    pub can_insert: bool,
    pub advisories: Vec<String>,
}

impl CheckReport {
    pub fn is_ready(&self) -> bool {
        self.can_insert
    }
}

pub async fn check_target(config: &RunConfig) -> Result<CheckReport> {
    info!(
        "Connecting to database {} on {}...",
        config.database, config.server
    );
    let mut conn = PgConnection::connect_with(&connect_options(config))
        .await
        .with_context(|| format!("Failed to connect to {}", config.server))?;

    let report = inspect_table(&mut conn).await;

    if let Err(e) = conn.close().await {
        warn!("Database connection did not close cleanly: {e}");
    }
    report
}

async fn inspect_table(conn: &mut PgConnection) -> Result<CheckReport> {
    let mut report = CheckReport::default();

    info!("Checking read access to {TARGET_TABLE}...");
    match sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM sis.msttipcam")
        .fetch_one(&mut *conn)
        .await
    {
        Ok(count) => {
            info!("Connection OK, {TARGET_TABLE} holds {count} rows");
            report.row_count = Some(count);
        }
        Err(e) if is_permission_error(&e) => {
            let advisory = format!(
                "Cannot read {TARGET_TABLE} ({e}); this can be ignored when only inserts are needed"
            );
            warn!("{advisory}");
            report.advisories.push(advisory);
        }
        Err(e) => return Err(e).with_context(|| format!("Failed to read {TARGET_TABLE}")),
    }

    info!("Checking insert permission on {TARGET_TABLE}...");
    report.can_insert = sqlx::query_scalar::<_, bool>("SELECT has_table_privilege($1, 'INSERT')")
        .bind(TARGET_TABLE)
        .fetch_one(&mut *conn)
        .await
        .context("Failed to query table privileges")?;

    if report.can_insert {
        info!("User may insert into {TARGET_TABLE}");
    } else {
        warn!("User may NOT insert into {TARGET_TABLE}");
    }

    Ok(report)
}
