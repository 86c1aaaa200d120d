//! Renames exports from the legacy `unfoldingWord--<repo>--<ref>--<BOOK>--<SIZE>`
//! naming to `<repo>_<NN>-<BOOK>_<ref>_<SIZE>`.

use colored::*;
use regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::{info, warn};
use walkdir::WalkDir;

use crate::books;
use crate::error::{Error, Result};

fn legacy_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(
            r"^unfoldingWord--(?P<repo>[^-]+)--(?P<ref>[^-]+)--(?P<book>[A-Z0-9]+)--(?P<size>A4|LETTER)\.(?P<ext>pdf|html)$",
        )
        .expect("legacy file name pattern is valid")
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenamePlan {
    /// Not a legacy name; left alone.
    NotMatched,
    UnknownBook(String),
    Rename(String),
}

/// Computes the new file name for a legacy export name.
pub fn rename_target(file_name: &str) -> RenamePlan {
    let Some(caps) = legacy_pattern().captures(file_name) else {
        return RenamePlan::NotMatched;
    };

    let book = &caps["book"];
    let Some(info) = books::lookup(book) else {
        return RenamePlan::UnknownBook(book.to_string());
    };

    RenamePlan::Rename(format!(
        "{}_{:02}-{}_{}_{}.{}",
        &caps["repo"], info.number, book, &caps["ref"], &caps["size"], &caps["ext"]
    ))
}

/// Renames (or with `dry_run`, reports) a single file.
///
/// Returns the new path, or `None` when the name is not a legacy one.
pub fn rename_file(path: &Path, dry_run: bool) -> Result<Option<PathBuf>> {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return Ok(None);
    };

    let new_name = match rename_target(name) {
        RenamePlan::NotMatched => return Ok(None),
        RenamePlan::UnknownBook(code) => return Err(Error::UnknownBook(code)),
        RenamePlan::Rename(new_name) => new_name,
    };

    let target = path.with_file_name(&new_name);
    if target != path && target.exists() {
        return Err(Error::RenameCollision(target));
    }

    if dry_run {
        info!("Would rename: {} -> {}", name, new_name.cyan());
    } else {
        fs::rename(path, &target)?;
        info!("Renamed: {} -> {}", name, new_name.green());
    }

    Ok(Some(target))
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RenameStats {
    pub renamed: usize,
    /// Legacy names that could not be renamed.
    pub skipped: usize,
}

impl std::ops::AddAssign for RenameStats {
    fn add_assign(&mut self, other: Self) {
        self.renamed += other.renamed;
        self.skipped += other.skipped;
    }
}

pub fn process_directory(dir: &Path, dry_run: bool, recursive: bool) -> Result<RenameStats> {
    let depth = if recursive { usize::MAX } else { 1 };

    // Collect before renaming so the walk never sees its own output.
    let mut files = Vec::new();
    for entry in WalkDir::new(dir).min_depth(1).max_depth(depth).sort_by_file_name() {
        let entry = entry.map_err(|e| Error::Io(e.into()))?;
        let is_export = entry
            .path()
            .extension()
            .is_some_and(|ext| ext == "pdf" || ext == "html");
        if entry.file_type().is_file() && is_export {
            files.push(entry.into_path());
        }
    }

    let mut stats = RenameStats::default();
    for path in files {
        match rename_file(&path, dry_run) {
            Ok(Some(_)) => stats.renamed += 1,
            Ok(None) => {}
            Err(e) => {
                warn!("{} ({})", e, path.display());
                stats.skipped += 1;
            }
        }
    }

    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use tempfile::TempDir;

    #[test]
    fn maps_legacy_names() {
        assert_eq!(
            rename_target("unfoldingWord--en_tn--v87--ACT--LETTER.pdf"),
            RenamePlan::Rename("en_tn_45-ACT_v87_LETTER.pdf".into())
        );
        assert_eq!(
            rename_target("unfoldingWord--en_tn--v87--MAT--A4.html"),
            RenamePlan::Rename("en_tn_41-MAT_v87_A4.html".into())
        );
        assert_eq!(
            rename_target("unfoldingWord--en_ult--master--1SA--A4.pdf"),
            RenamePlan::Rename("en_ult_09-1SA_master_A4.pdf".into())
        );
    }

    #[test]
    fn leaves_other_names_alone() {
        assert_eq!(rename_target("en_tn_45-ACT_v87_LETTER.pdf"), RenamePlan::NotMatched);
        assert_eq!(rename_target("unfoldingWord--en_tn--v87--act--A4.pdf"), RenamePlan::NotMatched);
        assert_eq!(rename_target("unfoldingWord--en_tn--v87--ACT--B5.pdf"), RenamePlan::NotMatched);
        assert_eq!(rename_target("unfoldingWord--en-tn--v87--ACT--A4.pdf"), RenamePlan::NotMatched);
        assert_eq!(
            rename_target("unfoldingWord--en_tn--v87--XYZ--A4.pdf"),
            RenamePlan::UnknownBook("XYZ".into())
        );
    }

    #[test]
    fn dry_run_keeps_files() {
        let dir = TempDir::new().unwrap();
        let old = dir.path().join("unfoldingWord--en_tn--v87--ACT--A4.pdf");
        File::create(&old).unwrap();

        let target = rename_file(&old, true).unwrap().unwrap();
        assert_eq!(target, dir.path().join("en_tn_45-ACT_v87_A4.pdf"));
        assert!(old.exists());
        assert!(!target.exists());
    }

    #[test]
    fn refuses_to_overwrite() {
        let dir = TempDir::new().unwrap();
        let old = dir.path().join("unfoldingWord--en_tn--v87--ACT--A4.pdf");
        File::create(&old).unwrap();
        File::create(dir.path().join("en_tn_45-ACT_v87_A4.pdf")).unwrap();

        assert!(matches!(rename_file(&old, false), Err(Error::RenameCollision(_))));
        assert!(old.exists());
    }

    #[test]
    fn directory_counts() {
        let dir = TempDir::new().unwrap();
        let sub = dir.path().join("nested");
        fs::create_dir(&sub).unwrap();
        for name in [
            "unfoldingWord--en_tn--v87--ACT--A4.pdf",
            "unfoldingWord--en_tn--v87--ACT--A4.html",
            "unfoldingWord--en_tn--v87--XYZ--A4.pdf",
            "notes.txt",
            "en_tn_41-MAT_v87_A4.pdf",
        ] {
            File::create(dir.path().join(name)).unwrap();
        }
        File::create(sub.join("unfoldingWord--en_tn--v87--ROM--LETTER.pdf")).unwrap();

        let flat = process_directory(dir.path(), false, false).unwrap();
        assert_eq!(flat, RenameStats { renamed: 2, skipped: 1 });
        assert!(dir.path().join("en_tn_45-ACT_v87_A4.pdf").exists());
        assert!(dir.path().join("en_tn_45-ACT_v87_A4.html").exists());
        assert!(sub.join("unfoldingWord--en_tn--v87--ROM--LETTER.pdf").exists());

        let deep = process_directory(dir.path(), false, true).unwrap();
        assert_eq!(deep, RenameStats { renamed: 1, skipped: 1 });
        assert!(sub.join("en_tn_46-ROM_v87_LETTER.pdf").exists());
    }
}
