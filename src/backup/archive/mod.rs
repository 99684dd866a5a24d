pub mod glob;
pub mod pipeline;

use crate::backup::archive::glob::ExcludeGlob;
use bon::Builder;
use derive_more::From;
use getset::Getters;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use validator::Validate;

/// One named group of inputs compressed into a single archive file.
///
/// The set's name is the key it is stored under in the config and becomes the
/// archive base file name.
#[derive(Clone, Debug, Serialize, Deserialize, Validate, Builder, PartialEq, Eq, Getters)]
#[serde(deny_unknown_fields)]
#[getset(get = "pub")]
pub struct ArchiveSetConfig {
    /// Working directory of every tool invocation and base of relative includes
    #[builder(into)]
    root_dir: PathBuf,
    /// Let the archiver recurse into subdirectories of included directories
    #[serde(default)]
    #[builder(default)]
    sub_dirs: bool,
    #[serde(default)]
    #[builder(default, into)]
    include: Vec<IncludeEntry>,
    /// Extra patterns kept out of the archive, matched at any depth below `root_dir`
    #[serde(default)]
    #[builder(default, into)]
    exclude: Vec<ExcludeGlob>,
}

/// A path relative to the set's root, optionally exported before archiving.
///
/// In the config this is either a bare string or
/// `{ file_name: ..., pre_process: { processor: ..., new_ext: ... } }`.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, From)]
#[serde(untagged)]
pub enum IncludeEntry {
    Path(PathBuf),
    Detailed(DetailedIncludeEntry),
}

#[derive(Clone, Debug, Serialize, Deserialize, Builder, PartialEq, Eq, Getters)]
#[serde(deny_unknown_fields)]
#[getset(get = "pub")]
pub struct DetailedIncludeEntry {
    #[builder(into)]
    file_name: PathBuf,
    #[serde(default)]
    pre_process: Option<PreprocessSpec>,
}

#[derive(Clone, Debug, Serialize, Deserialize, Builder, PartialEq, Eq, Getters)]
#[serde(deny_unknown_fields)]
#[getset(get = "pub")]
pub struct PreprocessSpec {
    /// Export processor identifier, e.g. `fb3`
    #[builder(into)]
    processor: String,
    /// Extension of the exported file, including the leading dot
    #[builder(into)]
    new_ext: String,
}

impl IncludeEntry {
    pub fn file_name(&self) -> &Path {
        match self {
            IncludeEntry::Path(p) => p,
            IncludeEntry::Detailed(d) => &d.file_name,
        }
    }

    pub fn pre_process(&self) -> Option<&PreprocessSpec> {
        match self {
            IncludeEntry::Path(_) => None,
            IncludeEntry::Detailed(d) => d.pre_process.as_ref(),
        }
    }
}

impl From<&str> for IncludeEntry {
    fn from(value: &str) -> Self {
        IncludeEntry::Path(value.into())
    }
}

/// An archive file written by a set pipeline during this run.
#[derive(Clone, Debug, PartialEq, Eq, Getters)]
#[getset(get = "pub")]
pub struct ProducedArchive {
    path: PathBuf,
    file_name: String,
}

impl ProducedArchive {
    pub fn new<P: Into<PathBuf>, S: Into<String>>(path: P, file_name: S) -> Self {
        Self {
            path: path.into(),
            file_name: file_name.into(),
        }
    }
}
