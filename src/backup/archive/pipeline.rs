use crate::backup::archive::glob::build_glob_set;
use crate::backup::archive::{ArchiveSetConfig, IncludeEntry, ProducedArchive};
use crate::backup::compress::ArchiverConfig;
use crate::backup::function_path;
use crate::backup::preprocess::ProcessorsConfig;
use crate::backup::process::CommandRunner;
use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use crate::backup::result_error::{AddFunctionName, AddMsg};
use crate::backup::run_context::RunContext;
use function_name::named;
use globset::GlobSet;
use std::path::Path;

/// Builds the archive of one set: export, compress, clean up, entry by entry.
///
/// Entries of a set run strictly one after another since they all update
/// the same archive file.
#[derive(Clone, Copy)]
pub struct SetPipeline<'a> {
    pub context: &'a RunContext,
    pub archiver: &'a ArchiverConfig,
    pub processors: &'a ProcessorsConfig,
    pub runner: &'a dyn CommandRunner,
}

impl SetPipeline<'_> {
    /// Runs the pipeline for `set`.
    ///
    /// Only fatal errors come back as `Err`; anything else is logged here and
    /// the set simply produces no archive.
    pub fn run(&self, name: &str, set: &ArchiveSetConfig) -> Result<Option<ProducedArchive>> {
        match self.run_set(name, set) {
            Ok(produced) => Ok(produced),
            Err(e) if e.is_fatal() => Err(e.add_msg(format!("Archive set {:?} aborted", name))),
            Err(e) => {
                tracing::error!("Archive set {:?} failed: {}", name, e);
                Ok(None)
            }
        }
    }

    #[named]
    fn run_set(&self, name: &str, set: &ArchiveSetConfig) -> Result<Option<ProducedArchive>> {
        let root = set.root_dir();
        if !root.is_dir() {
            tracing::error!("Error: {:?} not found!", root);
            return Ok(None);
        }

        let file_name = self.context.archive_file_name(name, self.archiver.archive_ext());
        let archive_path = self.context.dated_dir().join(&file_name);
        let excluded = build_glob_set(set.exclude())
            .map_err(Error::from)
            .add_fn_name(function_path!())?;

        tracing::info!(
            "Archiving {} entries of {:?} into {:?}",
            set.include().len(),
            name,
            archive_path
        );
        let mut compressed = 0usize;
        for entry in set.include() {
            if self.process_entry(root, entry, set, &archive_path, &excluded)? {
                compressed += 1;
            }
        }

        if archive_path.is_file() {
            tracing::info!(
                "Archive {:?} created with {}/{} entries",
                archive_path,
                compressed,
                set.include().len()
            );
            Ok(Some(ProducedArchive::new(archive_path, file_name)))
        } else {
            tracing::warn!("No archive produced for {:?}", name);
            Ok(None)
        }
    }

    /// Returns whether the entry made it into the archive.
    #[named]
    fn process_entry(
        &self,
        root: &Path,
        entry: &IncludeEntry,
        set: &ArchiveSetConfig,
        archive_path: &Path,
        excluded: &GlobSet,
    ) -> Result<bool> {
        let full_path = root.join(entry.file_name());
        if !full_path.exists() {
            tracing::warn!("WARNING: file {:?} not found...", full_path);
            return Ok(false);
        }
        if excluded.is_match(entry.file_name()) {
            tracing::info!("Skipping excluded entry {:?}", full_path);
            return Ok(false);
        }

        let artifact = match entry.pre_process() {
            Some(spec) => Some(
                self.processors
                    .run(self.runner, &full_path, spec, root)
                    .add_fn_name(function_path!())?,
            ),
            None => None,
        };
        let input = artifact.as_ref().map_or(full_path.as_path(), |a| a.path());

        let ok = self.archiver.compress(
            self.runner,
            archive_path,
            input,
            root,
            *set.sub_dirs(),
            set.exclude(),
        );

        if let Some(artifact) = artifact {
            artifact.cleanup();
        }
        Ok(ok)
    }
}
