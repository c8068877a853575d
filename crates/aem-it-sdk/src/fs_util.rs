use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use walkdir::WalkDir;

/// Filesystem helpers for the collection phase.
pub struct FsUtil;

impl FsUtil {
    /// Create a directory and all parents, tolerating an existing directory.
    pub fn ensure_dir(path: &Path) -> Result<()> {
        fs::create_dir_all(path)
            .with_context(|| format!("Failed to create directory '{}'", path.display()))
    }

    /// Recursively copy the tree rooted at `src` into `dest`, creating `dest`
    /// and any intermediate directories. Returns the number of files copied.
    /// Errors if `src` does not exist.
    pub fn copy_tree(src: &Path, dest: &Path) -> Result<u64> {
        if !src.is_dir() {
            anyhow::bail!("Source directory '{}' does not exist", src.display());
        }

        let mut copied = 0;
        for entry in WalkDir::new(src) {
            let entry = entry
                .with_context(|| format!("Failed to walk directory '{}'", src.display()))?;
            let relative = entry
                .path()
                .strip_prefix(src)
                .expect("walkdir yields paths under the root");
            let target = dest.join(relative);

            if entry.file_type().is_dir() {
                fs::create_dir_all(&target).with_context(|| {
                    format!("Failed to create directory '{}'", target.display())
                })?;
            } else if entry.file_type().is_file() {
                if let Some(parent) = target.parent() {
                    fs::create_dir_all(parent).with_context(|| {
                        format!("Failed to create directory '{}'", parent.display())
                    })?;
                }
                fs::copy(entry.path(), &target).with_context(|| {
                    format!(
                        "Failed to copy '{}' to '{}'",
                        entry.path().display(),
                        target.display()
                    )
                })?;
                copied += 1;
            }
            // Symlinks inside report trees are not expected; skip anything else.
        }
        Ok(copied)
    }

    /// Truncate in place every `*.log` file directly under `dir` that is
    /// larger than `max_bytes`, cutting it to exactly `max_bytes`. Files at or
    /// below the threshold are untouched. Returns the truncated paths.
    pub fn truncate_logs_over(dir: &Path, max_bytes: u64) -> Result<Vec<PathBuf>> {
        let mut truncated = Vec::new();
        let entries = fs::read_dir(dir)
            .with_context(|| format!("Failed to read directory '{}'", dir.display()))?;

        for entry in entries {
            let entry = entry?;
            let path = entry.path();
            if !path.is_file() || path.extension().and_then(|e| e.to_str()) != Some("log") {
                continue;
            }
            let len = entry.metadata()?.len();
            if len > max_bytes {
                let file = fs::OpenOptions::new()
                    .write(true)
                    .open(&path)
                    .with_context(|| format!("Failed to open '{}'", path.display()))?;
                file.set_len(max_bytes)
                    .with_context(|| format!("Failed to truncate '{}'", path.display()))?;
                truncated.push(path);
            }
        }
        Ok(truncated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ensure_dir_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("a/b/c");
        FsUtil::ensure_dir(&target).unwrap();
        FsUtil::ensure_dir(&target).unwrap();
        assert!(target.is_dir());
    }

    #[test]
    fn copy_tree_copies_nested_files() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("reports");
        fs::create_dir_all(src.join("sub")).unwrap();
        fs::write(src.join("summary.txt"), "ok").unwrap();
        fs::write(src.join("sub/detail.xml"), "<xml/>").unwrap();

        let dest = dir.path().join("out/reports");
        let copied = FsUtil::copy_tree(&src, &dest).unwrap();

        assert_eq!(copied, 2);
        assert_eq!(fs::read_to_string(dest.join("summary.txt")).unwrap(), "ok");
        assert_eq!(
            fs::read_to_string(dest.join("sub/detail.xml")).unwrap(),
            "<xml/>"
        );
    }

    #[test]
    fn copy_tree_errors_on_missing_source() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("does-not-exist");
        assert!(FsUtil::copy_tree(&missing, &dir.path().join("out")).is_err());
    }

    #[test]
    fn oversized_logs_are_cut_to_the_threshold() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("error.log"), vec![b'x'; 100]).unwrap();
        fs::write(dir.path().join("stdout.log"), vec![b'y'; 64]).unwrap();
        fs::write(dir.path().join("report.txt"), vec![b'z'; 100]).unwrap();

        let truncated = FsUtil::truncate_logs_over(dir.path(), 64).unwrap();

        assert_eq!(truncated.len(), 1);
        assert!(truncated[0].ends_with("error.log"));
        assert_eq!(fs::metadata(dir.path().join("error.log")).unwrap().len(), 64);
        // At the threshold and non-.log files are untouched.
        assert_eq!(fs::metadata(dir.path().join("stdout.log")).unwrap().len(), 64);
        assert_eq!(fs::metadata(dir.path().join("report.txt")).unwrap().len(), 100);
    }

    #[test]
    fn truncation_keeps_the_leading_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let mut data = vec![b'a'; 32];
        data.extend(vec![b'b'; 32]);
        fs::write(dir.path().join("stderr.log"), &data).unwrap();

        FsUtil::truncate_logs_over(dir.path(), 32).unwrap();

        let kept = fs::read(dir.path().join("stderr.log")).unwrap();
        assert_eq!(kept, vec![b'a'; 32]);
    }
}
