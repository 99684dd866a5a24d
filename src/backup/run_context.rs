//! Immutable facts about a single backup run.

use chrono::{DateTime, Local, NaiveDate};
use getset::{CopyGetters, Getters};
use std::path::{Path, PathBuf};
use std::sync::Arc;

static DATE_FORMAT: &str = "%Y-%m-%d";

/// Formats a calendar date the way dated directories and archives are named.
pub fn date_stamp(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

/// `{prefix}-{YYYY-MM-DD}`
pub fn dated_dir_name<S: AsRef<str>>(prefix: S, date: NaiveDate) -> String {
    format!("{}-{}", prefix.as_ref(), date_stamp(date))
}

/// Created once per invocation, shared read-only by every pipeline.
#[derive(Debug, Clone, Getters, CopyGetters)]
pub struct RunContext {
    #[getset(get_copy = "pub")]
    started_at: DateTime<Local>,
    #[getset(get = "pub")]
    date_stamp: Arc<str>,
    #[getset(get = "pub")]
    dest_root: Arc<Path>,
    #[getset(get = "pub")]
    dest_prefix: Arc<str>,
    #[getset(get_copy = "pub")]
    max_process_count: usize,
}

impl RunContext {
    pub fn new<P: Into<Arc<Path>>, S: Into<Arc<str>>>(
        started_at: DateTime<Local>,
        dest_root: P,
        dest_prefix: S,
        max_process_count: usize,
    ) -> Self {
        Self {
            started_at,
            date_stamp: date_stamp(started_at.date_naive()).into(),
            dest_root: dest_root.into(),
            dest_prefix: dest_prefix.into(),
            max_process_count: max_process_count.max(1),
        }
    }

    pub fn anchor_date(&self) -> NaiveDate {
        self.started_at.date_naive()
    }

    pub fn dated_dir_name(&self) -> String {
        dated_dir_name(self.dest_prefix.as_ref(), self.anchor_date())
    }

    /// `{dest_root}/{prefix}-{YYYY-MM-DD}`, where this run writes its archives.
    pub fn dated_dir(&self) -> PathBuf {
        self.dest_root.join(self.dated_dir_name())
    }

    /// `{set_name}.{YYYY-MM-DD}.{archive_ext}`
    pub fn archive_file_name<S: AsRef<str>, E: AsRef<str>>(&self, set_name: S, ext: E) -> String {
        format!("{}.{}.{}", set_name.as_ref(), self.date_stamp, ext.as_ref())
    }
}
