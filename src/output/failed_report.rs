//! Append-only report of abandoned URLs
//!
//! One `url<TAB>error` line per failure. Lines are only ever appended, so the
//! file accumulates across runs.

use crate::output::traits::{OutputError, OutputResult};
use crate::state::FailedItem;
use std::fs::OpenOptions;
use std::io::{BufWriter, Write};
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct FailedReport {
    path: PathBuf,
}

impl FailedReport {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Appends one line per failure
    ///
    /// # Returns
    ///
    /// The number of lines written
    pub fn append(&self, failures: &[FailedItem]) -> OutputResult<usize> {
        if failures.is_empty() {
            return Ok(0);
        }

        let io_err = |source| OutputError::Io {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(io_err)?;
        let mut writer = BufWriter::new(file);

        for failure in failures {
            writeln!(writer, "{}\t{}", failure.url, one_line(&failure.error)).map_err(io_err)?;
        }
        writer.flush().map_err(io_err)?;

        tracing::info!(
            path = %self.path.display(),
            count = failures.len(),
            "Appended failed URLs"
        );
        Ok(failures.len())
    }
}

fn one_line(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
