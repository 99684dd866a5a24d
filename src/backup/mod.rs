pub mod archive;
pub mod backup_config;
pub mod compress;
pub mod logging;
pub mod preprocess;
pub mod process;
pub mod redacted;
pub mod relocate;
pub mod remote;
pub mod result_error;
pub mod retention;
pub mod run_context;
pub mod scheduler;
pub mod temp_artifact;
pub mod validate;

macro_rules! function_path {
    () => {
        concat!(module_path!(), "::", function_name!(), " ", file!(), ":", line!())
    };
}

pub(crate) use function_path;
