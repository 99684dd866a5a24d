use crate::backup::redacted::RedactedString;
use crate::backup::remote::{RemoteConnector, RemoteSession};
use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use crate::backup::result_error::AddMsg;
use bon::Builder;
use getset::{CopyGetters, Getters};
use serde::{Deserialize, Serialize};
use std::io::Read;
use suppaftp::types::FileType;
use suppaftp::{FtpStream, Mode};
use validator::Validate;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FtpMode {
    Active,
    #[default]
    Passive,
}

impl From<FtpMode> for Mode {
    fn from(value: FtpMode) -> Self {
        match value {
            FtpMode::Active => Mode::Active,
            FtpMode::Passive => Mode::Passive,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, Validate, Builder, Getters, CopyGetters)]
pub struct FtpConfig {
    #[validate(length(min = 1))]
    #[builder(into)]
    #[getset(get = "pub")]
    host: String,
    #[serde(default = "default_port")]
    #[builder(default = default_port())]
    #[getset(get_copy = "pub")]
    port: u16,
    #[serde(default)]
    #[builder(default)]
    #[getset(get_copy = "pub")]
    mode: FtpMode,
    #[validate(length(min = 1))]
    #[builder(into)]
    #[getset(get = "pub")]
    user: String,
    #[validate(nested)]
    #[builder(into)]
    password: RedactedString,
}

fn default_port() -> u16 {
    21
}

impl RemoteConnector for FtpConfig {
    fn connect(&self) -> Result<Box<dyn RemoteSession>> {
        let mut stream = FtpStream::connect((self.host.as_str(), self.port))
            .map_err(Error::from)
            .add_msg(format!("Cannot reach ftp://{}:{}", self.host, self.port))?;
        stream
            .login(self.user.as_str(), self.password.inner().as_str())
            .map_err(Error::from)
            .add_msg(format!("Login as {:?} refused", self.user))?;
        stream.set_mode(self.mode.into());
        stream.transfer_type(FileType::Binary)?;
        tracing::debug!("Connected to ftp://{}:{}", self.host, self.port);
        Ok(Box::new(FtpSession { stream }))
    }
}

/// Logged-in control connection, closed with `QUIT` on drop.
pub struct FtpSession {
    stream: FtpStream,
}

impl Drop for FtpSession {
    fn drop(&mut self) {
        if let Err(e) = self.stream.quit() {
            tracing::debug!("Ftp quit failed: {}", e);
        }
    }
}

impl RemoteSession for FtpSession {
    fn current_dir(&mut self) -> Result<String> {
        Ok(self.stream.pwd()?)
    }

    fn change_dir(&mut self, path: &str) -> Result<()> {
        Ok(self.stream.cwd(path)?)
    }

    fn make_dir(&mut self, path: &str) -> Result<()> {
        Ok(self.stream.mkdir(path)?)
    }

    fn list(&mut self, path: &str) -> Result<Vec<String>> {
        Ok(self.stream.nlst(Some(path))?)
    }

    fn remove_file(&mut self, path: &str) -> Result<()> {
        Ok(self.stream.rm(path)?)
    }

    fn remove_dir(&mut self, path: &str) -> Result<()> {
        Ok(self.stream.rmdir(path)?)
    }

    fn upload_stream(&mut self, name: &str, size: u64, reader: &mut dyn Read) -> Result<u64> {
        let mut limited = reader.take(size);
        Ok(self.stream.put_file(name, &mut limited)?)
    }
}
