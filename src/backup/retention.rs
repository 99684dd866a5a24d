//! Removal of the most recent previous dated directory.
//!
//! The scan walks back day by day from the anchor date (included), at most
//! [`LOOKBACK_DAYS`] days, and removes only the first directory it finds.
//! Older stale directories survive until later runs reach them.

use crate::backup::remote::{remote_join, remove_remote_dir_all, RemoteSession};
use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use crate::backup::result_error::AddMsg;
use crate::backup::run_context::dated_dir_name;
use chrono::{Days, NaiveDate};
use std::path::{Path, PathBuf};

pub static LOOKBACK_DAYS: u64 = 100;

/// `{prefix}-{date}` for the anchor date and the days before it, newest first.
pub fn candidate_names<'a>(prefix: &'a str, anchor: NaiveDate) -> impl Iterator<Item = String> + 'a {
    (0..LOOKBACK_DAYS)
        .filter_map(move |i| anchor.checked_sub_days(Days::new(i)))
        .map(move |date| dated_dir_name(prefix, date))
}

pub fn purge_oldest_local(base: &Path, prefix: &str, anchor: NaiveDate) -> Result<Option<PathBuf>> {
    for name in candidate_names(prefix, anchor) {
        let candidate = base.join(name);
        if candidate.exists() {
            std::fs::remove_dir_all(&candidate)
                .map_err(Error::from)
                .add_msg(format!("Failed to remove previous archive dir {:?}", candidate))?;
            tracing::info!("Previous archive dir {:?} has been removed...", candidate);
            return Ok(Some(candidate));
        }
    }
    tracing::debug!("No previous archive dir within {} days of {}", LOOKBACK_DAYS, anchor);
    Ok(None)
}

/// Remote counterpart of [`purge_oldest_local`], relative to the session's
/// current directory.
///
/// A candidate counts as present when the session can change into it. Any
/// probe error means "not there".
pub fn purge_oldest_remote(
    session: &mut dyn RemoteSession,
    prefix: &str,
    anchor: NaiveDate,
) -> Result<Option<String>> {
    let root = session.current_dir()?;
    for name in candidate_names(prefix, anchor) {
        let candidate = remote_join(&root, &name);
        match session.change_dir(&candidate) {
            Ok(_) => {
                session.change_dir(&root)?;
                remove_remote_dir_all(session, &candidate)
                    .add_msg(format!("Failed to remove remote archive dir {:?}", candidate))?;
                tracing::info!("Previous remote archive dir {:?} has been removed...", candidate);
                return Ok(Some(candidate));
            }
            Err(e) => tracing::trace!("Remote dir {:?} not found: {}", candidate, e),
        }
    }
    tracing::debug!("No previous remote archive dir within {} days of {}", LOOKBACK_DAYS, anchor);
    Ok(None)
}
