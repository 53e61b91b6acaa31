//! File logger configured from [`Settings`].

use chrono::{DateTime, Utc};
use log::Record;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::PathBuf;
use thiserror::Error;

use crate::config::Settings;

/// Used when no filter directives were given. Keeps the HTTP stack quiet.
pub const DEFAULT_FILTERS: &str = "info,reqwest=warn,hyper_util=warn";

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("cannot open log file {}: {source}", .path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("logger already installed: {0}")]
    AlreadyInstalled(#[from] log::SetLoggerError),
}

/// Route `log` records to `settings.log_file` and return that path.
pub fn init_logging(settings: &Settings) -> Result<PathBuf, LoggingError> {
    let path = settings.log_file.clone();
    let open_failed = |source| LoggingError::Open { path: path.clone(), source };

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(open_failed)?;
    }
    let file = OpenOptions::new().create(true).append(true).open(&path).map_err(open_failed)?;
    let filters = log_filters(settings.log_filters.as_deref());

    env_logger::Builder::new()
        .parse_filters(&filters)
        .format(|buf, record| write_line(buf, Utc::now(), record))
        .target(env_logger::Target::Pipe(Box::new(file)))
        .try_init()?;

    log::info!(
        "[logging] initialized: path={} filters={} history_file={} provider_timeout={}ms",
        path.display(),
        filters,
        settings.history_file.display(),
        settings.provider_timeout.as_millis()
    );
    Ok(path)
}

/// Filter directives in `RUST_LOG` syntax. Blank input means [`DEFAULT_FILTERS`].
pub fn log_filters(requested: Option<&str>) -> String {
    match requested.map(str::trim) {
        Some(spec) if !spec.is_empty() => spec.to_string(),
        _ => DEFAULT_FILTERS.to_string(),
    }
}

fn write_line(out: &mut impl Write, now: DateTime<Utc>, record: &Record<'_>) -> io::Result<()> {
    writeln!(
        out,
        "{} [{}] {} - {}",
        now.format("%Y-%m-%d %H:%M:%S%.3f"),
        record.level(),
        record.target(),
        record.args()
    )
}
