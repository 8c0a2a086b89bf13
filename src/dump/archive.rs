//! Final compressed archive of the artifact directory

use super::DumpContext;
use crate::error::{DumpError, Result};
use crate::process::Invocation;
use std::path::{Path, PathBuf};
use tracing::info;

/// Archive file created inside the artifact directory
pub const ARCHIVE_NAME: &str = "hypershift-dump.tar.gz";

/// Sorted top-level entries of the artifact directory, excluding a previous archive
pub fn list_entries(dir: &Path) -> Result<Vec<String>> {
    let read = std::fs::read_dir(dir).map_err(|source| DumpError::ArtifactDir {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut entries = Vec::new();
    for entry in read {
        let entry = entry.map_err(|source| DumpError::ArtifactDir {
            path: dir.to_path_buf(),
            source,
        })?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if name != ARCHIVE_NAME {
            entries.push(name);
        }
    }
    entries.sort();
    Ok(entries)
}

/// `tar` arguments for archiving `entries` relative to the working directory
pub fn archive_args(entries: &[String]) -> Vec<String> {
    let mut args = vec!["-cvzf".to_string(), ARCHIVE_NAME.to_string()];
    args.extend(entries.iter().cloned());
    args
}

/// Pack the artifact directory into [`ARCHIVE_NAME`]; any failure is fatal
pub async fn create_archive(ctx: &DumpContext, program: &Path, dir: &Path) -> Result<PathBuf> {
    let entries = list_entries(dir)?;
    if entries.is_empty() {
        return Err(DumpError::Archive(format!(
            "nothing to archive in {}",
            dir.display()
        )));
    }

    let args = archive_args(&entries);
    let invocation = Invocation::new(program, args.clone()).in_dir(dir);
    let out = ctx.runner.run(&invocation, &ctx.cancel).await?;
    if !out.success {
        return Err(DumpError::Archive(format!(
            "{} {} failed ({}): {}",
            program.display(),
            args.join(" "),
            out.status_text(),
            out.combined_lossy()
        )));
    }

    let archive = dir.join(ARCHIVE_NAME);
    info!(archive = %archive.display(), entries = entries.len(), "Created dump archive");
    Ok(archive)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_archive_args() {
        let entries = vec!["a.log".to_string(), "b.log".to_string()];
        assert_eq!(
            archive_args(&entries),
            vec!["-cvzf", "hypershift-dump.tar.gz", "a.log", "b.log"]
        );
    }

    #[test]
    fn test_list_entries_sorted_and_skips_archive() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.log"), "b").unwrap();
        std::fs::write(dir.path().join("a.log"), "a").unwrap();
        std::fs::create_dir(dir.path().join("namespaces")).unwrap();
        std::fs::write(dir.path().join(ARCHIVE_NAME), "old").unwrap();

        assert_eq!(
            list_entries(dir.path()).unwrap(),
            vec!["a.log", "b.log", "namespaces"]
        );
    }

    #[test]
    fn test_list_entries_missing_dir() {
        let err = list_entries(Path::new("/nonexistent/hcdump-artifacts")).unwrap_err();
        assert!(matches!(err, DumpError::ArtifactDir { .. }));
    }
}
