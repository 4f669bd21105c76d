//! Destinations for result tables.

use crate::error::{ForecastError, Result};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Receives every produced table by name as serialised rows.
pub trait TableSink {
    fn write_table(&mut self, name: &str, rows: Vec<Value>) -> Result<()>;
}

/// Keeps tables in memory.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    tables: BTreeMap<String, Vec<Value>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn table(&self, name: &str) -> Option<&[Value]> {
        self.tables.get(name).map(Vec::as_slice)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.tables.keys().map(String::as_str)
    }
}

impl TableSink for MemorySink {
    fn write_table(&mut self, name: &str, rows: Vec<Value>) -> Result<()> {
        self.tables.insert(name.to_string(), rows);
        Ok(())
    }
}

/// Writes one pretty-printed JSON array per table into a directory.
#[derive(Debug, Clone)]
pub struct JsonDirSink {
    dir: PathBuf,
}

fn output_error(path: &Path, err: impl std::fmt::Display) -> ForecastError {
    ForecastError::Output(format!("{}: {err}", path.display()))
}

impl JsonDirSink {
    /// Create the directory if needed.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|e| output_error(&dir, e))?;
        Ok(Self { dir })
    }

    pub fn path_for(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.json"))
    }
}

impl TableSink for JsonDirSink {
    fn write_table(&mut self, name: &str, rows: Vec<Value>) -> Result<()> {
        let path = self.path_for(name);
        let file = File::create(&path).map_err(|e| output_error(&path, e))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, &rows).map_err(|e| output_error(&path, e))?;
        writer.flush().map_err(|e| output_error(&path, e))?;
        debug!(table = name, rows = rows.len(), path = %path.display(), "table written");
        Ok(())
    }
}
