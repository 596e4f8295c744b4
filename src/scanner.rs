use anyhow::{bail, Result};
use log::{debug, warn};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Extensions recognized as JSON-lines capture files
pub const CAPTURE_EXTENSIONS: &[&str] = &["jsonl", "ndjson"];

/// Locates capture files under a path.
///
/// The path may name a single capture file or a directory. Directories are
/// walked recursively, skipping `target` and hidden directories.
///
/// # Example
///
/// ```no_run
/// use openapi_from_traffic::scanner::CaptureScanner;
/// use std::path::PathBuf;
///
/// let scanner = CaptureScanner::new(PathBuf::from("./captures"));
/// let result = scanner.scan().unwrap();
/// println!("Found {} capture files", result.capture_files.len());
/// ```
pub struct CaptureScanner {
    root_path: PathBuf,
}

/// Capture files found by a scan
pub struct ScanResult {
    /// Capture files in walk order, sorted by path within each directory
    pub capture_files: Vec<PathBuf>,
    /// Paths that could not be read during the walk
    pub warnings: Vec<String>,
}

pub fn is_capture_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| CAPTURE_EXTENSIONS.contains(&ext))
}

impl CaptureScanner {
    pub fn new(root_path: PathBuf) -> Self {
        Self { root_path }
    }

    /// Collects capture files.
    ///
    /// An explicitly named file is accepted whatever its extension. Unreadable
    /// entries below a directory are reported as warnings and skipped.
    ///
    /// # Errors
    ///
    /// Returns an error if the root path does not exist.
    pub fn scan(&self) -> Result<ScanResult> {
        if !self.root_path.exists() {
            bail!("Capture path does not exist: {}", self.root_path.display());
        }
        if self.root_path.is_file() {
            return Ok(ScanResult {
                capture_files: vec![self.root_path.clone()],
                warnings: Vec::new(),
            });
        }

        let mut capture_files = Vec::new();
        let mut warnings = Vec::new();

        let walker = WalkDir::new(&self.root_path)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| {
                if e.depth() == 0 {
                    return true;
                }
                let name = e.file_name().to_string_lossy();
                !name.starts_with('.') && name != "target"
            });

        for entry in walker {
            match entry {
                Ok(entry) if entry.file_type().is_file() && is_capture_file(entry.path()) => {
                    debug!("Found capture file {}", entry.path().display());
                    capture_files.push(entry.into_path());
                }
                Ok(_) => {}
                Err(e) => {
                    let warning = format!("Failed to access path: {}", e);
                    warn!("{}", warning);
                    warnings.push(warning);
                }
            }
        }

        Ok(ScanResult {
            capture_files,
            warnings,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn names(result: &ScanResult) -> Vec<String> {
        result
            .capture_files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect()
    }

    #[test]
    fn test_scan_finds_capture_files_recursively() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        fs::create_dir_all(root.join("day1/morning")).unwrap();
        fs::write(root.join("b.jsonl"), "").unwrap();
        fs::write(root.join("a.ndjson"), "").unwrap();
        fs::write(root.join("day1/morning/c.jsonl"), "").unwrap();
        fs::write(root.join("notes.json"), "{}").unwrap();

        let result = CaptureScanner::new(root.to_path_buf()).scan().unwrap();

        assert!(result.warnings.is_empty());
        assert_eq!(names(&result), vec!["a.ndjson", "b.jsonl", "c.jsonl"]);
    }

    #[test]
    fn test_scan_skips_hidden_and_target_directories() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        fs::create_dir(root.join(".cache")).unwrap();
        fs::create_dir(root.join("target")).unwrap();
        fs::write(root.join(".cache/old.jsonl"), "").unwrap();
        fs::write(root.join("target/build.jsonl"), "").unwrap();
        fs::write(root.join("live.jsonl"), "").unwrap();

        let result = CaptureScanner::new(root.to_path_buf()).scan().unwrap();
        assert_eq!(names(&result), vec!["live.jsonl"]);
    }

    #[test]
    fn test_scan_single_file() {
        let temp_dir = TempDir::new().unwrap();
        let file = temp_dir.path().join("traffic.log");
        fs::write(&file, "").unwrap();

        let result = CaptureScanner::new(file.clone()).scan().unwrap();
        assert_eq!(result.capture_files, vec![file]);
    }

    #[test]
    fn test_scan_missing_path_fails() {
        let temp_dir = TempDir::new().unwrap();
        let scanner = CaptureScanner::new(temp_dir.path().join("missing"));
        assert!(scanner.scan().is_err());
    }
}
