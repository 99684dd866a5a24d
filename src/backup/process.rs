//! External process capability.
//!
//! Every export and archiver call goes through [`CommandRunner`], so tests can
//! swap the real process spawner for a scripted one.

use crate::backup::redacted::REDACTED_SECRET;
use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use crate::backup::result_error::AddMsg;
use std::ffi::OsString;
use std::path::Path;
use std::process::{Command, Stdio};

/// Result of running an external command to completion.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct CommandOutput {
    /// Exit code, `None` when the process was killed by a signal.
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success() -> Self {
        Self {
            code: Some(0),
            ..Default::default()
        }
    }

    pub fn failure<S: Into<String>>(code: i32, stderr: S) -> Self {
        Self {
            code: Some(code),
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    pub const fn is_success(&self) -> bool {
        matches!(self.code, Some(0))
    }
}

/// Flags whose following argument is a secret.
static SECRET_FLAGS: &[&str] = &["-password", "-pas"];

/// Arguments as they may appear in logs, secrets replaced.
pub fn loggable_args(args: &[OsString]) -> Vec<String> {
    let mut hide_next = false;
    args.iter()
        .map(|arg| {
            let arg = arg.to_string_lossy();
            if std::mem::replace(&mut hide_next, false) {
                return REDACTED_SECRET.to_string();
            }
            hide_next = SECRET_FLAGS.iter().any(|f| arg.eq_ignore_ascii_case(f));
            arg.into_owned()
        })
        .collect()
}

pub trait CommandRunner: Send + Sync {
    /// Runs `program` in `cwd`, waiting for it to exit.
    ///
    /// An `Err` means the process could not be spawned; a non-zero exit is
    /// reported through [`CommandOutput::code`].
    fn run(&self, program: &Path, args: &[OsString], cwd: &Path) -> Result<CommandOutput>;
}

#[derive(Clone, Debug, Default)]
pub struct ProcessCommandRunner;

impl CommandRunner for ProcessCommandRunner {
    fn run(&self, program: &Path, args: &[OsString], cwd: &Path) -> Result<CommandOutput> {
        tracing::debug!(
            "Running {:?} {:?} in {:?}",
            program,
            loggable_args(args),
            cwd
        );
        let output = Command::new(program)
            .args(args)
            .current_dir(cwd)
            .stdin(Stdio::null())
            .output()
            .map_err(Error::from)
            .add_msg(format!("Failed to spawn {:?}", program))?;

        Ok(CommandOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;

    #[test]
    fn test_command_output_status() {
        assert!(CommandOutput::success().is_success());
        assert!(!CommandOutput::failure(2, "boom").is_success());
        assert!(!CommandOutput::default().is_success());
    }

    #[test]
    #[cfg(unix)]
    fn test_process_runner_captures_output_and_code() {
        let dir = TempDir::new().unwrap();
        let args: Vec<OsString> = vec!["-c".into(), "pwd; echo oops >&2; exit 3".into()];
        let output = ProcessCommandRunner
            .run(Path::new("sh"), &args, dir.path())
            .unwrap();

        assert_eq!(output.code, Some(3));
        assert!(output.stderr.contains("oops"));
        let canonical = dir.path().canonicalize().unwrap();
        assert_eq!(output.stdout.trim(), canonical.to_string_lossy());
    }

    #[test]
    fn test_loggable_args_hide_password() {
        let args: Vec<OsString> = ["-b", "db.fdb", "db.fbk", "-user", "SYSDBA", "-PASSWORD", "s3cret", "-g"]
            .iter()
            .map(OsString::from)
            .collect();
        let shown = loggable_args(&args);
        assert_eq!(shown[6], REDACTED_SECRET);
        assert_eq!(shown[4], "SYSDBA");
        assert_eq!(shown[7], "-g");
        assert!(!shown.iter().any(|a| a == "s3cret"));
    }

    #[derive(Clone, Default)]
    struct Capture(Arc<Mutex<Vec<u8>>>);

    impl Write for Capture {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_process_runner_debug_log_hides_password() {
        let dir = TempDir::new().unwrap();
        let capture = Capture::default();
        let writer = capture.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();
        let args: Vec<OsString> = ["-b", "a.fdb", "a.fbk", "-password", "s3cretPW"]
            .iter()
            .map(OsString::from)
            .collect();

        tracing::subscriber::with_default(subscriber, || {
            let _ = ProcessCommandRunner.run(Path::new("/nonexistent/gbak"), &args, dir.path());
        });

        let logged = String::from_utf8(capture.0.lock().unwrap().clone()).unwrap();
        assert!(logged.contains("Running"));
        assert!(logged.contains(REDACTED_SECRET));
        assert!(!logged.contains("s3cretPW"));
    }

    #[test]
    fn test_process_runner_spawn_failure_is_error() {
        let dir = TempDir::new().unwrap();
        let res = ProcessCommandRunner.run(Path::new("/definitely/not/a/binary"), &[], dir.path());
        assert!(res.is_err());
    }
}
