use std::io::Read;
use std::path::Path;

use csv::{ReaderBuilder, StringRecord, Trim};

use crate::error::{ChatError, Result};

pub const DEFAULT_SYSTEMS_CSV: &str = "default_systems.csv";

/// Keyword that lists every system instead of looking one up.
pub const INFO_KEYWORD: &str = "info";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SystemRow {
    pub system: String,
    pub host: String,
    cells: Vec<String>,
}

impl SystemRow {
    /// Whole-cell, case-insensitive comparison against every column of the row.
    /// Empty cells never match.
    fn mentions(&self, environment: &str) -> bool {
        if environment.trim().is_empty() {
            return false;
        }
        let wanted = environment.to_lowercase();
        self.cells.iter().any(|cell| cell.to_lowercase() == wanted)
    }
}

#[derive(Debug, Clone)]
pub struct SystemTable {
    rows: Vec<SystemRow>,
}

impl SystemTable {
    pub fn load(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(ChatError::SystemsFileMissing(path.to_path_buf()));
        }
        let file = std::fs::File::open(path)?;
        let table = Self::from_reader(file)?;
        tracing::debug!(path = %path.display(), rows = table.rows.len(), "loaded systems table");
        Ok(table)
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let mut reader = ReaderBuilder::new()
            .trim(Trim::All)
            .flexible(true)
            .from_reader(reader);

        let headers = reader.headers()?.clone();
        let system_ix = column_index(&headers, "system")?;
        let host_ix = column_index(&headers, "host")?;

        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record?;
            let cells: Vec<String> = record.iter().map(|c| c.to_string()).collect();
            rows.push(SystemRow {
                system: cells.get(system_ix).cloned().unwrap_or_default(),
                host: cells.get(host_ix).cloned().unwrap_or_default(),
                cells,
            });
        }
        Ok(SystemTable { rows })
    }

    pub fn rows(&self) -> &[SystemRow] {
        &self.rows
    }

    pub fn matches(&self, environment: &str) -> Vec<&SystemRow> {
        self.rows.iter().filter(|row| row.mentions(environment)).collect()
    }
}

fn column_index(headers: &StringRecord, name: &'static str) -> Result<usize> {
    headers
        .iter()
        .position(|h| h.eq_ignore_ascii_case(name))
        .ok_or(ChatError::MissingColumn(name))
}

pub fn describe(row: &SystemRow) -> String {
    format!("System: {}, Host: {}", row.system, row.host)
}
