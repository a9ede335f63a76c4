//! Processed event egress - writes pipeline outcomes to file
//!
//! Records are written in JSONL format (one JSON object per line)
//! to the file specified in config.

use crate::domain::types::ProcessedEvent;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use tracing::{debug, error, info};

/// Egress writer for processed events
pub struct Egress {
    file_path: String,
}

impl Egress {
    pub fn new(file_path: &str) -> Self {
        info!(file_path = %file_path, "egress_initialized");
        Self { file_path: file_path.to_string() }
    }

    /// Write a processed event to the egress file
    /// Returns true if successful, false otherwise
    pub fn write_event(&self, event: &ProcessedEvent) -> bool {
        match self.append_line(&event.to_json()) {
            Ok(()) => {
                debug!(
                    event_id = %event.event_id,
                    session_id = %event.session_id,
                    is_bot = %event.verdict.is_bot,
                    "event_egressed"
                );
                true
            }
            Err(e) => {
                error!(event_id = %event.event_id, error = %e, "event_egress_failed");
                false
            }
        }
    }

    /// Append a line to the egress file
    fn append_line(&self, line: &str) -> std::io::Result<()> {
        let path = Path::new(&self.file_path);

        // Create parent directories if they don't exist
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let mut file = OpenOptions::new().create(true).append(true).open(path)?;

        writeln!(file, "{}", line)?;
        debug!(file = %self.file_path, bytes = %line.len(), "egress_written");

        Ok(())
    }
}
