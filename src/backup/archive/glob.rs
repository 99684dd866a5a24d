use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use derive_more::Display;
use getset::Getters;
use globset::{Glob, GlobBuilder, GlobSet, GlobSetBuilder};
use serde::de::Visitor;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt::Formatter;
use std::result;

/// Syntax the archiver's `-xr!` wildcards do not read the way globset does
static UNSUPPORTED: &[(&str, &str)] = &[
    ("**", "recursive wildcards are implied"),
    ("[", "character classes are not supported"),
    ("]", "character classes are not supported"),
    ("{", "alternatives are not supported"),
    ("}", "alternatives are not supported"),
];

/// An exclusion pattern for one archive set.
///
/// Only literals, `*`, `?` and `/` are accepted, the subset the archiver's
/// recursive `-xr!` switch and globset agree on. Like the archiver, a pattern
/// matches at any depth below the set root, and a matching directory takes
/// its contents with it. `*` never crosses a path separator.
#[derive(Clone, Debug, Display, Serialize, PartialEq, Eq, Getters)]
#[display("{pattern}")]
#[serde(transparent)]
pub struct ExcludeGlob {
    /// The pattern as written in the config, handed to the archiver as is
    #[getset(get = "pub")]
    pattern: String,
    #[serde(skip)]
    matchers: [Glob; 2],
}

fn build(pattern: &str) -> result::Result<Glob, globset::Error> {
    GlobBuilder::new(pattern).literal_separator(true).build()
}

impl ExcludeGlob {
    pub fn new<S: AsRef<str>>(pattern: S) -> Result<Self> {
        let pattern = pattern.as_ref().trim_end_matches('/');
        if pattern.is_empty() || pattern.starts_with('/') {
            return Err(Error::unsupported_glob(pattern, "must be a non-empty relative pattern"));
        }
        if let Some((_, reason)) = UNSUPPORTED.iter().find(|(s, _)| pattern.contains(s)) {
            return Err(Error::unsupported_glob(pattern, *reason));
        }
        let matchers = [
            build(&format!("**/{pattern}"))?,
            build(&format!("**/{pattern}/**"))?,
        ];
        Ok(Self {
            pattern: pattern.to_string(),
            matchers,
        })
    }
}

pub fn build_glob_set<'a, I: IntoIterator<Item = &'a ExcludeGlob>>(
    globs: I,
) -> result::Result<GlobSet, globset::Error> {
    let mut builder = GlobSetBuilder::new();
    for g in globs {
        for m in &g.matchers {
            builder.add(m.clone());
        }
    }
    builder.build()
}

struct ExcludeGlobVisitor;

impl Visitor<'_> for ExcludeGlobVisitor {
    type Value = ExcludeGlob;

    fn expecting(&self, formatter: &mut Formatter) -> std::fmt::Result {
        formatter.write_str("a glob pattern")
    }

    fn visit_str<E>(self, v: &str) -> result::Result<Self::Value, E>
    where
        E: serde::de::Error,
    {
        ExcludeGlob::new(v).map_err(serde::de::Error::custom)
    }
}

impl<'de> Deserialize<'de> for ExcludeGlob {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> result::Result<Self, D::Error> {
        deserializer.deserialize_str(ExcludeGlobVisitor)
    }
}
