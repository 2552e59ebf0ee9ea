use std::{
    fs::{self, File, OpenOptions},
    io::{self, Write},
    path::{Path, PathBuf},
};

use chrono::{Local, NaiveDate};
use env_logger::{Builder, Target};
use log::{LevelFilter, warn};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S,%3f";

/// Sends every formatted line to the console and to the daily log file.
struct Tee {
    file: File,
}

impl Write for Tee {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        io::stderr().write_all(buf)?;
        self.file.write_all(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        io::stderr().flush()?;
        self.file.flush()
    }
}

pub fn log_file_path(log_dir: &Path, date: NaiveDate) -> PathBuf {
    log_dir.join(format!("tipcam_{}.log", date.format("%Y%m%d")))
}

pub fn open_log_file(log_dir: &Path, date: NaiveDate) -> io::Result<(PathBuf, File)> {
    fs::create_dir_all(log_dir)?;
    let path = log_file_path(log_dir, date);
    let file = OpenOptions::new().create(true).append(true).open(&path)?;
    Ok((path, file))
}

/// Lines look like `2024-03-15 06:00:00,123 - INFO - message`. `RUST_LOG`
/// overrides the default level. Returns the log file in use, if any.
pub fn init_logging(log_dir: Option<&Path>, verbose: bool) -> Option<PathBuf> {
    let level = if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    let mut builder = Builder::new();
    builder
        .filter_level(level)
        .filter_module("sqlx", LevelFilter::Warn)
        .filter_module("hyper_util", LevelFilter::Warn)
        .filter_module("reqwest", LevelFilter::Warn)
        .parse_default_env()
        .format(|buf, record| {
            writeln!(
                buf,
                "{} - {} - {}",
                Local::now().format(TIMESTAMP_FORMAT),
                record.level(),
                record.args()
            )
        });

    let opened = log_dir.map(|dir| open_log_file(dir, Local::now().date_naive()));
    let (path, failure) = match opened {
        Some(Ok((path, file))) => {
            builder.target(Target::Pipe(Box::new(Tee { file })));
            (Some(path), None)
        }
        Some(Err(e)) => (None, Some(e)),
        None => (None, None),
    };

    // A logger may already be installed, e.g. across tests.
    let _ = builder.try_init();

    if let (Some(dir), Some(e)) = (log_dir, failure) {
        warn!(
            "Cannot write log file under {}: {e}; logging to console only",
            dir.display()
        );
    }
    path
}
