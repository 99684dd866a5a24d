//! Validation functions for configuration values.
//!
//! Provides custom validation functions for directories, archive set names,
//! cron expressions and other configuration parameters.

use chrono::Utc;
use sanitize_filename::{is_sanitized, sanitize};
use std::collections::BTreeMap;
use std::path::Path;
use std::result;
use validator::ValidationError;

pub fn validate_valid_archive_base_name<S: AsRef<str>>(name: S) -> result::Result<(), ValidationError> {
    let name = name.as_ref();
    if name.is_empty() || !is_sanitized(name) {
        return Err(ValidationError::new("InvalidArchiveBaseName").with_message(
            format!("Invalid file name {:?}, try sanitizing like {:?}", name, sanitize(name)).into(),
        ));
    }

    Ok(())
}

/// Every key of the map must be usable as an archive base name.
pub fn validate_archive_set_names<V>(sets: &BTreeMap<String, V>) -> result::Result<(), ValidationError> {
    sets.keys().try_for_each(validate_valid_archive_base_name)
}

pub fn validate_dir_exist_or_created<P: AsRef<Path>>(dir: P) -> result::Result<(), ValidationError> {
    let dir = dir.as_ref();
    if dir.exists() {
        if !dir.is_dir() {
            return Err(ValidationError::new("InvalidDirectory")
                .with_message(format!("{:?} is not a directory", dir).into()));
        }
    } else {
        return std::fs::create_dir_all(dir).map_err(|e| {
            ValidationError::new("InvalidDirectory").with_message(
                format!("cannot create or access directory {:?}: {}", dir, e).into(),
            )
        });
    }

    Ok(())
}

pub fn validate_cron_str<S: AsRef<str>>(cron: S) -> result::Result<(), ValidationError> {
    let cron = cron.as_ref();
    if cron_parser::parse(cron, &Utc::now()).is_err() {
        return Err(ValidationError::new("InvalidCron")
            .with_message(format!("Invalid cron string: {cron:?}").into()));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_archive_base_name() {
        assert!(validate_valid_archive_base_name("accounting").is_ok());
        assert!(validate_valid_archive_base_name("docs-2").is_ok());
        assert!(validate_valid_archive_base_name("a/b").is_err());
        assert!(validate_valid_archive_base_name("").is_err());
    }

    #[test]
    fn test_archive_set_names() {
        let mut sets = BTreeMap::new();
        sets.insert("docs".to_string(), ());
        assert!(validate_archive_set_names(&sets).is_ok());
        sets.insert("bad:name?".to_string(), ());
        assert!(validate_archive_set_names(&sets).is_err());
    }

    #[test]
    fn test_dir_exist_or_created() {
        let dir = TempDir::new().unwrap();
        let nested = dir.path().join("a/b");
        assert!(validate_dir_exist_or_created(&nested).is_ok());
        assert!(nested.is_dir());

        let file = dir.path().join("file");
        std::fs::write(&file, "x").unwrap();
        assert!(validate_dir_exist_or_created(&file).is_err());
    }

    #[test]
    fn test_cron_str() {
        assert!(validate_cron_str("0 2 * * *").is_ok());
        assert!(validate_cron_str("not a cron").is_err());
    }
}
