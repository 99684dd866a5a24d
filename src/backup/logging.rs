//! Console and log-file output for `tracing` events.

use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use crate::backup::result_error::AddMsg;
use std::fs::{File, OpenOptions};
use std::path::Path;
use std::sync::Mutex;
use tracing::Subscriber;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, Layer};

pub static DEFAULT_LOG_FILE: &str = "./log.txt";

fn open_append(path: &Path) -> Result<File> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    Ok(OpenOptions::new().create(true).append(true).open(path)?)
}

/// Plain-text layer appending to `path`.
pub fn file_layer<S>(path: &Path) -> Result<impl Layer<S>>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    let file = open_append(path)
        .add_msg(format!("Cannot open log file {:?}", path))?;
    Ok(fmt::layer()
        .with_ansi(false)
        .with_target(false)
        .with_writer(Mutex::new(file)))
}

/// Installs the global subscriber: console plus `log_file`, both at `level`.
pub fn init_logging(log_file: &Path, level: LevelFilter) -> Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false))
        .with(file_layer(log_file)?)
        .with(level)
        .try_init()
        .map_err(Error::from)
}
