//! Moving a finished dated directory into its final location.

use crate::backup::function_path;
use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use crate::backup::result_error::{AddDebugObjectAndFnName, AddMsg};
use function_name::named;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Moves `src` to `final_dir/{name of src}`, replacing whatever is there.
///
/// A plain rename is attempted first. When that fails, for example across
/// filesystems, the tree is copied and the source removed afterwards.
#[named]
pub fn relocate_dir(src: &Path, final_dir: &Path) -> Result<PathBuf> {
    let name = src
        .file_name()
        .ok_or_else(|| Error::from(std::io::Error::other(format!("{:?} has no name", src))))?;
    std::fs::create_dir_all(final_dir)
        .map_err(Error::from)
        .add_msg(format!("Cannot create final dir {:?}", final_dir))?;

    let src = src
        .canonicalize()
        .map_err(Error::from)
        .add_msg(format!("Cannot relocate {:?}", src))?;
    let final_dir = final_dir.canonicalize()?;
    let target = final_dir.join(name);
    if target == src {
        tracing::info!("{:?} is already in {:?}", src, final_dir);
        return Ok(target);
    }
    if final_dir.starts_with(&src) {
        return Err(Error::from(std::io::Error::other(format!(
            "final dir {:?} lies inside {:?}",
            final_dir, src
        ))));
    }
    if target.exists() {
        remove_existing(&target)?;
        tracing::debug!("Replaced existing {:?}", target);
    }

    match std::fs::rename(&src, &target) {
        Ok(_) => {}
        Err(e) => {
            tracing::debug!("Rename {:?} -> {:?} failed ({}), copying instead", src, target, e);
            copy_tree(&src, &target)
                .add_debug_object_and_fn_name(target.clone(), function_path!())?;
            std::fs::remove_dir_all(&src)
                .map_err(Error::from)
                .add_msg(format!("Copied, but cannot remove {:?}", src))?;
        }
    }

    tracing::info!("{:?} has been moved to {:?}...", src, final_dir);
    Ok(target)
}

fn remove_existing(target: &Path) -> Result<()> {
    if target.is_dir() {
        std::fs::remove_dir_all(target)?;
    } else {
        std::fs::remove_file(target)?;
    }
    Ok(())
}

fn copy_tree(src: &Path, dst: &Path) -> Result<()> {
    for entry in WalkDir::new(src).follow_links(true) {
        let entry = entry?;
        let relative = entry.path().strip_prefix(src)?;
        let to = dst.join(relative);
        if entry.file_type().is_dir() {
            std::fs::create_dir_all(&to)?;
        } else {
            std::fs::copy(entry.path(), &to)
                .map_err(Error::from)
                .add_msg(format!("Copy {:?} -> {:?} failed", entry.path(), to))?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn dated(base: &Path) -> PathBuf {
        let dir = base.join("backup-2024-03-07");
        std::fs::create_dir_all(dir.join("inner")).unwrap();
        std::fs::write(dir.join("docs.2024-03-07.7z"), "docs").unwrap();
        std::fs::write(dir.join("inner/notes.txt"), "notes").unwrap();
        dir
    }

    #[test]
    fn test_relocate_moves_tree() {
        let dest = TempDir::new().unwrap();
        let fin = TempDir::new().unwrap();
        let src = dated(dest.path());

        let target = relocate_dir(&src, fin.path()).unwrap();

        assert_eq!(target, fin.path().canonicalize().unwrap().join("backup-2024-03-07"));
        assert!(!src.exists());
        assert_eq!(std::fs::read_to_string(target.join("docs.2024-03-07.7z")).unwrap(), "docs");
        assert_eq!(std::fs::read_to_string(target.join("inner/notes.txt")).unwrap(), "notes");
    }

    #[test]
    fn test_relocate_replaces_existing_target() {
        let dest = TempDir::new().unwrap();
        let fin = TempDir::new().unwrap();
        let src = dated(dest.path());
        let stale = fin.path().join("backup-2024-03-07");
        std::fs::create_dir_all(&stale).unwrap();
        std::fs::write(stale.join("stale.7z"), "old").unwrap();

        let target = relocate_dir(&src, fin.path()).unwrap();

        assert!(!target.join("stale.7z").exists());
        assert!(target.join("docs.2024-03-07.7z").exists());
    }

    #[test]
    fn test_relocate_creates_final_dir() {
        let dest = TempDir::new().unwrap();
        let fin = TempDir::new().unwrap();
        let src = dated(dest.path());
        let nested = fin.path().join("a/b");

        let target = relocate_dir(&src, &nested).unwrap();
        assert!(target.join("inner/notes.txt").exists());
    }

    #[test]
    fn test_copy_tree_keeps_layout() {
        let dest = TempDir::new().unwrap();
        let src = dated(dest.path());
        let copy = dest.path().join("copy");

        copy_tree(&src, &copy).unwrap();

        assert!(src.exists());
        assert_eq!(std::fs::read_to_string(copy.join("inner/notes.txt")).unwrap(), "notes");
    }

    #[test]
    fn test_relocate_into_own_parent_keeps_archives() {
        let dest = TempDir::new().unwrap();
        let src = dated(dest.path());

        let target = relocate_dir(&src, dest.path()).unwrap();

        assert_eq!(target, src.canonicalize().unwrap());
        assert_eq!(std::fs::read_to_string(src.join("docs.2024-03-07.7z")).unwrap(), "docs");
    }

    #[test]
    fn test_relocate_into_itself_is_rejected() {
        let dest = TempDir::new().unwrap();
        let src = dated(dest.path());

        assert!(relocate_dir(&src, &src.join("inner")).is_err());
        assert!(src.join("docs.2024-03-07.7z").is_file());
        assert!(src.join("inner/notes.txt").is_file());
    }

    #[test]
    fn test_relocate_missing_source_fails() {
        let dest = TempDir::new().unwrap();
        let fin = TempDir::new().unwrap();
        assert!(relocate_dir(&dest.path().join("absent"), fin.path()).is_err());
    }
}
