use crate::backup::redacted::RedactedString;
use bon::Builder;
use getset::{CopyGetters, Getters};
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use validator::Validate;

static DEFAULT_HOST: &str = "localhost";
static DEFAULT_PORT: u16 = 3050;

#[cfg(windows)]
static GBAK_BIN: &str = "gbak.exe";
#[cfg(not(windows))]
static GBAK_BIN: &str = "gbak";

/// Connection settings of one Firebird server and where its tools live.
#[derive(Clone, Debug, Serialize, Deserialize, Validate, Builder, Getters, CopyGetters)]
#[serde(deny_unknown_fields)]
pub struct GbakConfig {
    /// Directory containing the `gbak` executable
    #[builder(into)]
    #[getset(get = "pub")]
    bin_path: PathBuf,
    #[serde(default = "default_host")]
    #[builder(default = default_host(), into)]
    #[getset(get = "pub")]
    host: String,
    #[serde(default = "default_port")]
    #[builder(default = DEFAULT_PORT)]
    #[getset(get_copy = "pub")]
    port: u16,
    #[builder(into)]
    #[getset(get = "pub")]
    user: String,
    #[validate(nested)]
    #[builder(into)]
    #[getset(get = "pub")]
    password: RedactedString,
}

fn default_host() -> String {
    DEFAULT_HOST.to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

impl GbakConfig {
    pub fn program(&self) -> PathBuf {
        self.bin_path.join(GBAK_BIN)
    }

    /// `-b {src} {dst} -user {user} -password {password} -g -se {host}/{port}:service_mgr`
    pub fn backup_args(&self, src: &Path, dst: &Path) -> Vec<OsString> {
        vec![
            "-b".into(),
            src.into(),
            dst.into(),
            "-user".into(),
            self.user.as_str().into(),
            "-password".into(),
            self.password.inner().as_str().into(),
            "-g".into(),
            "-se".into(),
            format!("{}/{}:service_mgr", self.host, self.port).into(),
        ]
    }
}
