//! Source scanner.
//!
//! Walks the requested roots and produces a flat, path-deduplicated list of
//! file descriptors with size and modification time from filesystem metadata.
//! No content is read here. Per-path errors are recorded and do not abort
//! the scan of sibling roots, so one unreadable directory never hides the
//! rest of a batch.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use thiserror::Error;
use tracing::{debug, info, warn};

const MAX_RECURSION_DEPTH: usize = 32;

#[derive(Error, Debug)]
pub enum ScanError {
    #[error("Path not found: {}", .0.display())]
    NotFound(PathBuf),
    #[error("Failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// A file discovered during scanning. Metadata only; content untouched.
#[derive(Debug, Clone)]
pub struct ScannedFile {
    /// Absolute path to the source file.
    pub path: PathBuf,
    /// File size in bytes.
    pub size: u64,
    /// Last modification time, when the filesystem reports one.
    pub modified: Option<SystemTime>,
}

/// Result of scanning a batch of roots.
///
/// Errors are carried alongside the files rather than short-circuiting:
/// the caller decides how to report them per path.
#[derive(Debug, Default)]
pub struct ScanOutcome {
    pub files: Vec<ScannedFile>,
    pub errors: Vec<ScanError>,
}

/// Check if a file is directory noise (.DS_Store, Thumbs.db, etc.)
fn is_noise_file(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|name| name == ".DS_Store" || name == "Thumbs.db" || name == "desktop.ini")
        .unwrap_or(false)
}

/// Scan one or more roots (files or directories) into a flat file list.
///
/// The output is deduplicated by path and sorted, so re-invoking the scanner
/// over the same roots yields the same sequence.
pub fn scan_roots(roots: &[PathBuf]) -> ScanOutcome {
    info!("Scanning {} root(s)", roots.len());

    let mut outcome = ScanOutcome::default();
    let mut seen: HashSet<PathBuf> = HashSet::new();

    for root in roots {
        if !root.exists() {
            warn!("Scan root not found: {:?}", root);
            outcome.errors.push(ScanError::NotFound(root.clone()));
            continue;
        }

        if root.is_file() {
            record_file(root, &mut seen, &mut outcome);
        } else if let Err(e) = scan_directory(root, 0, &mut seen, &mut outcome) {
            outcome.errors.push(e);
        }
    }

    outcome.files.sort_by(|a, b| a.path.cmp(&b.path));

    info!(
        "Scan complete: {} file(s), {} error(s)",
        outcome.files.len(),
        outcome.errors.len()
    );

    outcome
}

/// Recursively scan a directory, recording per-entry errors without
/// aborting siblings.
fn scan_directory(
    dir: &Path,
    depth: usize,
    seen: &mut HashSet<PathBuf>,
    outcome: &mut ScanOutcome,
) -> Result<(), ScanError> {
    if depth > MAX_RECURSION_DEPTH {
        warn!(
            "Max recursion depth {} reached at {:?}, stopping",
            MAX_RECURSION_DEPTH, dir
        );
        return Ok(());
    }

    let entries = fs::read_dir(dir).map_err(|e| ScanError::Io {
        path: dir.to_path_buf(),
        source: e,
    })?;

    for entry in entries.flatten() {
        let path = entry.path();

        if path.is_dir() {
            if let Err(e) = scan_directory(&path, depth + 1, seen, outcome) {
                outcome.errors.push(e);
            }
        } else if path.is_file() {
            if is_noise_file(&path) {
                continue;
            }
            record_file(&path, seen, outcome);
        }
    }

    Ok(())
}

/// Record a single file's metadata, deduplicating by path.
fn record_file(path: &Path, seen: &mut HashSet<PathBuf>, outcome: &mut ScanOutcome) {
    let canonical = path.to_path_buf();
    if !seen.insert(canonical.clone()) {
        debug!("Skipping already-seen path: {:?}", path);
        return;
    }

    match fs::metadata(path) {
        Ok(metadata) => {
            outcome.files.push(ScannedFile {
                path: canonical,
                size: metadata.len(),
                modified: metadata.modified().ok(),
            });
        }
        Err(e) => {
            warn!("Failed to read metadata for {:?}: {}", path, e);
            outcome.errors.push(ScanError::Io {
                path: canonical,
                source: e,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_scan_flat_directory() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        std::fs::write(temp_dir.path().join("a.jpg"), b"aaa").unwrap();
        std::fs::write(temp_dir.path().join("b.jpg"), b"bbbb").unwrap();

        let outcome = scan_roots(&[temp_dir.path().to_path_buf()]);

        assert_eq!(outcome.files.len(), 2);
        assert!(outcome.errors.is_empty());
        assert_eq!(outcome.files[0].size, 3);
        assert_eq!(outcome.files[1].size, 4);
    }

    #[test]
    fn test_scan_recurses_into_subdirectories() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let nested = temp_dir.path().join("2019").join("summer");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(nested.join("photo.jpg"), b"x").unwrap();
        std::fs::write(temp_dir.path().join("top.mp4"), b"yy").unwrap();

        let outcome = scan_roots(&[temp_dir.path().to_path_buf()]);

        assert_eq!(outcome.files.len(), 2);
    }

    #[test]
    fn test_scan_skips_noise_files() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        std::fs::write(temp_dir.path().join(".DS_Store"), b"noise").unwrap();
        std::fs::write(temp_dir.path().join("real.jpg"), b"data").unwrap();

        let outcome = scan_roots(&[temp_dir.path().to_path_buf()]);

        assert_eq!(outcome.files.len(), 1);
        assert!(outcome.files[0].path.ends_with("real.jpg"));
    }

    #[test]
    fn test_missing_root_is_recorded_not_fatal() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        std::fs::write(temp_dir.path().join("ok.jpg"), b"data").unwrap();

        let roots = vec![
            PathBuf::from("/definitely/not/a/real/path"),
            temp_dir.path().to_path_buf(),
        ];
        let outcome = scan_roots(&roots);

        assert_eq!(outcome.files.len(), 1);
        assert_eq!(outcome.errors.len(), 1);
        assert!(matches!(outcome.errors[0], ScanError::NotFound(_)));
    }

    #[test]
    fn test_duplicate_roots_deduplicated_by_path() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let file = temp_dir.path().join("once.jpg");
        std::fs::write(&file, b"data").unwrap();

        let outcome = scan_roots(&[file.clone(), file.clone(), temp_dir.path().to_path_buf()]);

        assert_eq!(outcome.files.len(), 1);
    }

    #[test]
    fn test_scan_is_restartable() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        std::fs::write(temp_dir.path().join("b.jpg"), b"b").unwrap();
        std::fs::write(temp_dir.path().join("a.jpg"), b"a").unwrap();

        let first = scan_roots(&[temp_dir.path().to_path_buf()]);
        let second = scan_roots(&[temp_dir.path().to_path_buf()]);

        let paths_first: Vec<_> = first.files.iter().map(|f| f.path.clone()).collect();
        let paths_second: Vec<_> = second.files.iter().map(|f| f.path.clone()).collect();
        assert_eq!(paths_first, paths_second);
    }
}
