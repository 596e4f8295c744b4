use crate::error::{Error, Result as CaptureResult};
use crate::host::Exchange;
use anyhow::{Context, Result};
use log::{debug, warn};
use std::fs;
use std::path::{Path, PathBuf};

/// Reader for JSON-lines capture files.
///
/// Each non-blank line holds one serialized [`Exchange`]. Lines that fail to
/// parse are logged and skipped so a single bad record never loses a capture.
///
/// # Example
///
/// ```no_run
/// use openapi_from_traffic::capture::CaptureReader;
/// use std::path::Path;
///
/// let capture = CaptureReader::read_file(Path::new("traffic.jsonl")).unwrap();
/// println!("Read {} exchanges", capture.exchanges.len());
/// ```
pub struct CaptureReader;

/// Exchanges read from one capture file
#[derive(Debug)]
pub struct CaptureFile {
    pub path: PathBuf,
    pub exchanges: Vec<Exchange>,
    /// Number of lines that could not be parsed
    pub skipped: usize,
}

impl CaptureReader {
    /// Parses one capture line; `line` is 1-based.
    pub fn parse_line(file: &Path, line: usize, text: &str) -> CaptureResult<Exchange> {
        serde_json::from_str(text).map_err(|e| Error::Capture {
            file: file.to_path_buf(),
            line,
            message: e.to_string(),
        })
    }

    /// Reads every exchange in a capture file.
    ///
    /// # Errors
    ///
    /// Returns an error only if the file cannot be read; malformed lines are
    /// counted in [`CaptureFile::skipped`].
    pub fn read_file(path: &Path) -> Result<CaptureFile> {
        debug!("Reading capture file: {}", path.display());
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read capture file: {}", path.display()))?;

        let mut exchanges = Vec::new();
        let mut skipped = 0;
        for (index, text) in content.lines().enumerate() {
            if text.trim().is_empty() {
                continue;
            }
            match Self::parse_line(path, index + 1, text) {
                Ok(exchange) => exchanges.push(exchange),
                Err(e) => {
                    warn!("Skipping line: {}", e);
                    skipped += 1;
                }
            }
        }

        debug!(
            "Read {} exchanges from {} ({} skipped)",
            exchanges.len(),
            path.display(),
            skipped
        );
        Ok(CaptureFile {
            path: path.to_path_buf(),
            exchanges,
            skipped,
        })
    }

    /// Reads several capture files, continuing past files that cannot be read.
    pub fn read_files(paths: &[PathBuf]) -> Vec<Result<CaptureFile>> {
        paths
            .iter()
            .map(|path| {
                let result = Self::read_file(path);
                if let Err(e) = &result {
                    warn!("{:#}", e);
                }
                result
            })
            .collect()
    }
}
