//! Trace export - NDJSON persistence of run event logs
//!
//! One line per event; the first line identifies the run. Used by the CLI
//! `--trace` flag and the `trace show` subcommand.

use std::io::{BufRead, BufReader, Write};
use std::path::Path;

use crate::error::{Result, SkeinError};

use super::log::{Event, EventLog};

/// Generate a unique run id
pub fn generate_run_id() -> String {
    format!("run-{}", uuid::Uuid::new_v4())
}

/// Engine version string recorded in RunStarted events
pub fn engine_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

/// NDJSON writer for run event logs
pub struct TraceWriter;

impl TraceWriter {
    /// Export a log to an NDJSON file, one event per line
    pub fn export(log: &EventLog, path: &Path) -> Result<()> {
        let file = std::fs::File::create(path)?;
        let mut writer = std::io::BufWriter::new(file);

        log.with_events(|events| -> Result<()> {
            for event in events {
                let line = serde_json::to_string(event)?;
                writer.write_all(line.as_bytes())?;
                writer.write_all(b"\n")?;
            }
            Ok(())
        })?;

        writer.flush()?;
        Ok(())
    }

    /// Read an exported trace back into events
    pub fn load(path: &Path) -> Result<Vec<Event>> {
        let file = std::fs::File::open(path).map_err(|_| SkeinError::GraphNotFound {
            path: path.display().to_string(),
        })?;

        let mut events = Vec::new();
        for line in BufReader::new(file).lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            events.push(serde_json::from_str(&line)?);
        }
        Ok(events)
    }
}
