use crate::backup::result_error::{AddDebugObjectAndFnName, AddFunctionName, AddMsg};
use itertools::Itertools;
use std::fmt::Debug;
use std::path::PathBuf;
use thiserror::Error;
use thiserror_ext::Construct;

#[derive(Error, Debug, Construct)]
pub enum Error {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    ValidationError(#[from] validator::ValidationErrors),
    #[error(transparent)]
    ThreadPoolBuildError(#[from] rayon::ThreadPoolBuildError),
    #[error(transparent)]
    SerdeYml(#[from] serde_yml::Error),
    #[error(transparent)]
    WalkDir(#[from] walkdir::Error),
    #[error(transparent)]
    StripPrefix(#[from] std::path::StripPrefixError),
    #[error(transparent)]
    Ftp(#[from] suppaftp::FtpError),
    #[error(transparent)]
    Glob(#[from] globset::Error),
    #[error(transparent)]
    LoggingInit(#[from] tracing_subscriber::util::TryInitError),
    #[error("Invalid cron expression {cron:?}: {reason}")]
    CronParse { cron: String, reason: String },
    #[error("Unsupported exclude pattern {pattern:?}: {reason}")]
    UnsupportedGlob { pattern: String, reason: String },
    #[error("Unknown processor {processor}")]
    UnknownProcessor { processor: String },
    #[error("No credentials configured for processor {processor}")]
    MissingProcessorConfig { processor: String },
    #[error("Database export of {src:?} failed with exit code {code:?}:\n{}", indent::indent_all_with("  ", stderr))]
    ExportFailed {
        src: PathBuf,
        code: Option<i32>,
        stderr: String,
    },
    #[error("Remote store error: {0}")]
    Remote(String),
    #[error("{}:\n{}", msg, indent::indent_all_with("  ", error.to_string()))]
    WithMsg { msg: String, error: Box<Error> },
    #[error("{} failed:\n{}", fn_name, indent::indent_all_with("  ", error.to_string()))]
    WithFnName { fn_name: String, error: Box<Error> },
    #[error("{:?} {} failed:\n{}", obj_debug, fn_name, indent::indent_all_with("  ", error.to_string()))]
    WithDebugObjAndFnName {
        error: Box<Error>,
        obj_debug: Box<dyn Debug + Send>,
        fn_name: String,
    },
    #[error("{}", itertools::join(.0, "\n\n"))]
    LotsOfError(Vec<Error>),
}

impl<S: Into<String>, O: Debug + Send + 'static> AddDebugObjectAndFnName<S, O> for Error {
    fn add_debug_object_and_fn_name(self, obj: O, fn_name: S) -> Self {
        Error::WithDebugObjAndFnName {
            error: Box::new(self),
            obj_debug: Box::new(obj),
            fn_name: fn_name.into(),
        }
    }
}

impl<S: Into<String>> AddFunctionName<S> for Error {
    fn add_fn_name(self, fn_name: S) -> Self {
        Error::WithFnName {
            fn_name: fn_name.into(),
            error: Box::new(self),
        }
    }
}

impl<S: Into<String>> AddMsg<S> for Error {
    fn add_msg(self, msg: S) -> Self {
        Self::WithMsg {
            msg: msg.into(),
            error: Box::new(self),
        }
    }
}

impl From<Vec<Error>> for Error {
    fn from(errors: Vec<Error>) -> Self {
        if errors.is_empty() {
            panic!("Should not create lots of errors when error is empty")
        }
        Self::LotsOfError(errors.into_iter().flat_map(|e| e.into_iter()).collect_vec())
    }
}

impl Error {
    pub fn into_iter(self) -> Box<dyn Iterator<Item = Error>> {
        match self {
            Error::LotsOfError(v) => Box::new(v.into_iter().flat_map(|e| e.into_iter())),
            e => Box::new(std::iter::once(e)),
        }
    }

    pub fn chain(self, other: Error) -> Error {
        Error::LotsOfError(self.into_iter().chain(other.into_iter()).collect_vec())
    }

    /// Whether this error must abort the whole run.
    ///
    /// Only configuration errors about export processors and failed database
    /// exports are fatal; everything else is logged where it happens.
    pub fn is_fatal(&self) -> bool {
        match self {
            Error::UnknownProcessor { .. }
            | Error::MissingProcessorConfig { .. }
            | Error::ExportFailed { .. } => true,
            Error::WithMsg { error, .. }
            | Error::WithFnName { error, .. }
            | Error::WithDebugObjAndFnName { error, .. } => error.is_fatal(),
            Error::LotsOfError(errors) => errors.iter().any(Error::is_fatal),
            _ => false,
        }
    }
}
