//! Mirroring of the run's archives to a remote store.

pub mod ftp;

use crate::backup::archive::ProducedArchive;
use crate::backup::function_path;
use crate::backup::remote::ftp::FtpConfig;
use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use crate::backup::result_error::{AddFunctionName, AddMsg};
use crate::backup::retention::purge_oldest_remote;
use crate::backup::run_context::RunContext;
use bon::Builder;
use derive_more::From;
use function_name::named;
use getset::{CopyGetters, Getters};
use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;
use std::fs::File;
use std::io::Read;
use std::result;
use validator::{Validate, ValidationErrors};

/// Deepest directory nesting removed by [`remove_remote_dir_all`]
static MAX_REMOVE_DEPTH: usize = 32;

/// An open connection to a remote store.
///
/// Paths are `/`-separated and resolved against the current directory.
/// Dropping the session closes it.
pub trait RemoteSession {
    fn current_dir(&mut self) -> Result<String>;
    fn change_dir(&mut self, path: &str) -> Result<()>;
    fn make_dir(&mut self, path: &str) -> Result<()>;
    /// Names of the entries in `path`.
    fn list(&mut self, path: &str) -> Result<Vec<String>>;
    fn remove_file(&mut self, path: &str) -> Result<()>;
    /// Removes an empty directory.
    fn remove_dir(&mut self, path: &str) -> Result<()>;
    /// Streams exactly `size` bytes from `reader` into `name`, returns bytes written.
    fn upload_stream(&mut self, name: &str, size: u64, reader: &mut dyn Read) -> Result<u64>;
}

pub trait RemoteConnector: Sync {
    fn connect(&self) -> Result<Box<dyn RemoteSession>>;
}

#[derive(Clone, From, Serialize, Deserialize, Debug)]
#[serde(tag = "type")]
#[serde(rename_all = "snake_case")]
pub enum RemoteStoreConfig {
    Ftp(FtpConfig),
}

impl Validate for RemoteStoreConfig {
    fn validate(&self) -> result::Result<(), ValidationErrors> {
        match self {
            RemoteStoreConfig::Ftp(ftp) => ftp.validate(),
        }
    }
}

impl RemoteConnector for RemoteStoreConfig {
    fn connect(&self) -> Result<Box<dyn RemoteSession>> {
        match self {
            RemoteStoreConfig::Ftp(ftp) => ftp.connect(),
        }
    }
}

#[skip_serializing_none]
#[derive(Clone, Debug, Serialize, Deserialize, Validate, Builder, Getters, CopyGetters)]
pub struct RemoteConfig {
    #[serde(default = "default_enabled")]
    #[builder(default = true)]
    #[getset(get_copy = "pub")]
    enabled: bool,
    /// Base directory on the remote store holding the dated directories
    #[builder(into)]
    #[getset(get = "pub")]
    dir: Option<String>,
    #[serde(flatten)]
    #[validate(nested)]
    #[builder(into)]
    #[getset(get = "pub")]
    store: RemoteStoreConfig,
}

fn default_enabled() -> bool {
    true
}

/// What happened to the run's archives on the remote side.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RemoteSyncReport {
    pub uploaded: Vec<String>,
    pub failed: Vec<String>,
    /// Nothing was attempted or the remote could not be prepared
    pub skipped: bool,
}

impl RemoteSyncReport {
    fn skipped() -> Self {
        Self {
            skipped: true,
            ..Default::default()
        }
    }
}

impl RemoteConfig {
    /// Purges the previous remote dated directory (when `purge` is set) and
    /// uploads every archive into today's remote dated directory.
    ///
    /// Never fails: remote trouble is logged and reflected in the report, the
    /// local archives stay the product of the run.
    pub fn sync(
        &self,
        connector: &dyn RemoteConnector,
        context: &RunContext,
        archives: &[ProducedArchive],
        purge: bool,
    ) -> RemoteSyncReport {
        if !self.enabled {
            tracing::info!("Remote upload disabled");
            return RemoteSyncReport::skipped();
        }

        if purge {
            if let Err(e) = self.purge_previous(connector, context) {
                tracing::warn!("Remote retention skipped: {}", e);
            }
        }

        let dated = context.dated_dir_name();
        if let Err(e) = self.ensure_dated_dir(connector, &dated) {
            tracing::error!("Remote sync skipped: {}", e);
            return RemoteSyncReport::skipped();
        }

        let mut report = RemoteSyncReport::default();
        for archive in archives {
            match self.upload(connector, &dated, archive) {
                Ok(written) => {
                    tracing::info!(
                        "File {:?} ({} bytes) was transferred to {}/{}",
                        archive.path(),
                        written,
                        self.dir.as_deref().unwrap_or("."),
                        dated
                    );
                    report.uploaded.push(archive.file_name().clone());
                }
                Err(e) => {
                    tracing::error!("Upload of {:?} failed: {}", archive.path(), e);
                    report.failed.push(archive.file_name().clone());
                }
            }
        }
        report
    }

    /// Connects and moves into the configured base directory.
    fn open(&self, connector: &dyn RemoteConnector) -> Result<Box<dyn RemoteSession>> {
        let mut session = connector.connect().add_msg("Remote connect failed")?;
        if let Some(dir) = &self.dir {
            session
                .change_dir(dir)
                .add_msg(format!("Remote base dir {:?} unavailable", dir))?;
        }
        Ok(session)
    }

    fn purge_previous(&self, connector: &dyn RemoteConnector, context: &RunContext) -> Result<()> {
        let mut session = self.open(connector)?;
        purge_oldest_remote(session.as_mut(), context.dest_prefix(), context.anchor_date())?;
        Ok(())
    }

    #[named]
    fn ensure_dated_dir(&self, connector: &dyn RemoteConnector, dated: &str) -> Result<()> {
        let mut session = self.open(connector)?;
        if session.change_dir(dated).is_err() {
            session
                .make_dir(dated)
                .add_fn_name(function_path!())?;
            tracing::info!("Remote dir {:?} has been created", dated);
        }
        Ok(())
    }

    /// Uploads one archive over its own session.
    fn upload(
        &self,
        connector: &dyn RemoteConnector,
        dated: &str,
        archive: &ProducedArchive,
    ) -> Result<u64> {
        let mut session = self.open(connector)?;
        session.change_dir(dated)?;
        let mut file = File::open(archive.path())?;
        let size = file.metadata()?.len();
        let written = session.upload_stream(archive.file_name(), size, &mut file)?;
        if written != size {
            return Err(Error::remote(format!(
                "uploaded {} of {} bytes of {:?}",
                written,
                size,
                archive.file_name()
            )));
        }
        Ok(written)
    }
}

/// Joins remote path segments with `/`.
pub fn remote_join(base: &str, name: &str) -> String {
    if base.is_empty() {
        name.to_string()
    } else if base.ends_with('/') {
        format!("{}{}", base, name)
    } else {
        format!("{}/{}", base, name)
    }
}

/// Removes `path` and everything below it.
///
/// Entries that refuse file removal are treated as directories.
pub fn remove_remote_dir_all(session: &mut dyn RemoteSession, path: &str) -> Result<()> {
    remove_remote_dir_all_at(session, path, 0)
}

fn remove_remote_dir_all_at(session: &mut dyn RemoteSession, path: &str, depth: usize) -> Result<()> {
    if depth > MAX_REMOVE_DEPTH {
        return Err(Error::remote(format!("{:?} is nested too deep to remove", path)));
    }
    for entry in session.list(path)? {
        let name = entry.rsplit('/').next().unwrap_or(entry.as_str());
        if name.is_empty() || name == "." || name == ".." {
            continue;
        }
        let child = remote_join(path, name);
        if session.remove_file(&child).is_err() {
            remove_remote_dir_all_at(session, &child, depth + 1)?;
        }
    }
    session.remove_dir(path)
}
