//! Database export step run on selected inputs before compression.

pub mod gbak;

use crate::backup::archive::PreprocessSpec;
use crate::backup::function_path;
use crate::backup::preprocess::gbak::GbakConfig;
use crate::backup::process::CommandRunner;
use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use crate::backup::result_error::AddFunctionName;
use crate::backup::temp_artifact::TempArtifact;
use bon::Builder;
use function_name::named;
use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;
use std::path::{Path, PathBuf};
use validator::Validate;

/// Credentials of the export processors, keyed by processor identifier.
#[skip_serializing_none]
#[derive(Clone, Debug, Default, Serialize, Deserialize, Validate, Builder)]
#[serde(deny_unknown_fields)]
pub struct ProcessorsConfig {
    /// Firebird 2.5 server
    #[validate(nested)]
    fb25: Option<GbakConfig>,
    /// Firebird 3 server
    #[validate(nested)]
    fb3: Option<GbakConfig>,
}

impl ProcessorsConfig {
    /// Resolves a processor identifier to its configuration.
    pub fn resolve(&self, processor: &str) -> Result<&GbakConfig> {
        let config = match processor {
            "fb25" => self.fb25.as_ref(),
            "fb3" => self.fb3.as_ref(),
            _ => return Err(Error::unknown_processor(processor)),
        };
        config.ok_or_else(|| Error::missing_processor_config(processor))
    }

    /// Exports `src` according to `spec`.
    ///
    /// The returned artifact replaces `src` as the archiver input. Any failure
    /// here is fatal for the run.
    #[named]
    pub fn run(
        &self,
        runner: &dyn CommandRunner,
        src: &Path,
        spec: &PreprocessSpec,
        cwd: &Path,
    ) -> Result<TempArtifact> {
        let config = self
            .resolve(spec.processor())
            .add_fn_name(function_path!())?;
        let dst = export_destination(src, spec);
        // Guard before spawning so partial output of a failed export is swept.
        let artifact = TempArtifact::new(&dst);

        let output = runner
            .run(&config.program(), &config.backup_args(src, &dst), cwd)
            .map_err(|e| Error::export_failed(src, None::<i32>, e.to_string()))
            .add_fn_name(function_path!())?;

        if !output.stdout.trim().is_empty() {
            tracing::info!("{}", output.stdout.trim_end());
        }

        if !output.is_success() {
            tracing::error!("Error creating database backup of {:?}", src);
            tracing::error!("{}", output.stderr.trim_end());
            return Err(Error::export_failed(src, output.code, output.stderr))
                .add_fn_name(function_path!());
        }

        tracing::info!("Database backup {:?} has been created", dst);
        Ok(artifact)
    }
}

/// `{dir}/{stem}.{processor}{new_ext}` next to the source file.
pub fn export_destination(src: &Path, spec: &PreprocessSpec) -> PathBuf {
    let stem = src
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = format!("{}.{}{}", stem, spec.processor(), spec.new_ext());
    match src.parent() {
        Some(dir) => dir.join(name),
        None => PathBuf::from(name),
    }
}
