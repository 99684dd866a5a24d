//! External archiver invocation.

use crate::backup::archive::glob::ExcludeGlob;
use crate::backup::process::CommandRunner;
use bon::Builder;
use getset::{CopyGetters, Getters};
use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use validator::Validate;

/// Default compression level (-mx5)
static DEFAULT_COMPRESSION_LEVEL: u32 = 5;
/// Default multi-threading hint (-mmt2)
static DEFAULT_THREADS: u32 = 2;
static DEFAULT_ARCHIVE_EXT: &str = "7z";
/// Dependency-manager directories are never worth archiving
static DEFAULT_IGNORE: &[&str] = &["node_modules"];

#[cfg(windows)]
static SEVEN_ZIP_BIN: &str = "7z.exe";
#[cfg(not(windows))]
static SEVEN_ZIP_BIN: &str = "7z";

/// Configuration of the 7-Zip compatible archiver
#[skip_serializing_none]
#[derive(Clone, Debug, Serialize, Deserialize, Validate, Builder, Getters, CopyGetters)]
#[serde(deny_unknown_fields)]
pub struct ArchiverConfig {
    /// Directory containing the `7z` executable, looked up in `PATH` when absent
    #[builder(into)]
    #[getset(get = "pub")]
    bin_path: Option<PathBuf>,
    #[serde(default = "default_archive_ext")]
    #[builder(default = default_archive_ext(), into)]
    #[validate(length(min = 1))]
    #[getset(get = "pub")]
    archive_ext: String,
    /// Compression level (0-9), 0 stores only
    #[serde(default = "default_level")]
    #[builder(default = DEFAULT_COMPRESSION_LEVEL)]
    #[validate(range(min = 0, max = 9))]
    #[getset(get_copy = "pub")]
    level: u32,
    #[serde(default = "default_threads")]
    #[builder(default = DEFAULT_THREADS)]
    #[validate(range(min = 1))]
    #[getset(get_copy = "pub")]
    threads: u32,
    /// Directory names skipped recursively in every set
    #[serde(default = "default_ignore")]
    #[builder(default = default_ignore(), into)]
    #[getset(get = "pub")]
    ignore: Vec<String>,
}

impl Default for ArchiverConfig {
    fn default() -> Self {
        ArchiverConfig::builder().build()
    }
}

fn default_archive_ext() -> String {
    DEFAULT_ARCHIVE_EXT.to_string()
}

fn default_level() -> u32 {
    DEFAULT_COMPRESSION_LEVEL
}

fn default_threads() -> u32 {
    DEFAULT_THREADS
}

fn default_ignore() -> Vec<String> {
    DEFAULT_IGNORE.iter().map(|s| s.to_string()).collect()
}

impl ArchiverConfig {
    pub fn program(&self) -> PathBuf {
        match &self.bin_path {
            Some(dir) => dir.join(SEVEN_ZIP_BIN),
            None => PathBuf::from(SEVEN_ZIP_BIN),
        }
    }

    /// `u -y {-r0|-r-} -ssw -mmt{n} -mx{n} -xr!{ignore}... {archive} {input}`
    pub fn update_args(
        &self,
        archive: &Path,
        input: &Path,
        sub_dirs: bool,
        exclude: &[ExcludeGlob],
    ) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec![
            "u".into(),
            "-y".into(),
            (if sub_dirs { "-r0" } else { "-r-" }).into(),
            "-ssw".into(),
            format!("-mmt{}", self.threads).into(),
            format!("-mx{}", self.level).into(),
        ];
        args.extend(self.ignore.iter().map(|i| format!("-xr!{}", i).into()));
        args.extend(exclude.iter().map(|g| format!("-xr!{}", g.pattern()).into()));
        args.push(archive.into());
        args.push(input.into());
        args
    }

    /// Adds or refreshes `input` in `archive`.
    ///
    /// Failures are logged and reported as `false`. The caller keeps going with
    /// its remaining inputs.
    pub fn compress(
        &self,
        runner: &dyn CommandRunner,
        archive: &Path,
        input: &Path,
        cwd: &Path,
        sub_dirs: bool,
        exclude: &[ExcludeGlob],
    ) -> bool {
        let args = self.update_args(archive, input, sub_dirs, exclude);
        match runner.run(&self.program(), &args, cwd) {
            Ok(output) => {
                if !output.stdout.trim().is_empty() {
                    tracing::debug!("{}", output.stdout.trim_end());
                }
                if output.is_success() {
                    tracing::info!("Added {:?} to {:?}", input, archive);
                    true
                } else {
                    tracing::error!(
                        "Error creating archive {:?} from {:?}, exit code {:?}:\n{}",
                        archive,
                        input,
                        output.code,
                        output.stderr.trim_end()
                    );
                    false
                }
            }
            Err(e) => {
                tracing::error!("Error creating archive {:?} from {:?}: {}", archive, input, e);
                false
            }
        }
    }
}
