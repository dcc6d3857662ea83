//! Tabular output. Column order and header names are the wire contract
//! consumed by the downstream visualization layer and must not change.

use std::path::Path;

use serde::Serialize;
use tracing::info;

use crate::error::ModelError;

#[derive(Debug, Clone, Serialize)]
pub struct Table {
    /// File stem, e.g. `tax_base` renders to `tax_base.csv`.
    pub name: String,
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    pub fn new(name: &str, headers: &[&str], rows: Vec<Vec<String>>) -> Self {
        debug_assert!(rows.iter().all(|r| r.len() == headers.len()));
        Self {
            name: name.to_string(),
            headers: headers.iter().map(|h| h.to_string()).collect(),
            rows,
        }
    }

    pub fn file_name(&self) -> String {
        format!("{}.csv", self.name)
    }

    pub fn to_csv(&self) -> String {
        let mut out = String::new();
        write_record(&mut out, &self.headers);
        for row in &self.rows {
            write_record(&mut out, row);
        }
        out
    }
}

fn write_record(out: &mut String, cells: &[String]) {
    for (i, cell) in cells.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        if cell.contains(',') || cell.contains('"') || cell.contains('\n') {
            out.push('"');
            out.push_str(&cell.replace('"', "\"\""));
            out.push('"');
        } else {
            out.push_str(cell);
        }
    }
    out.push('\n');
}

/// Write every table to `dir` as CSV, creating the directory if needed.
pub fn write_tables(dir: &Path, tables: &[Table]) -> Result<(), ModelError> {
    std::fs::create_dir_all(dir)?;
    for table in tables {
        let path = dir.join(table.file_name());
        std::fs::write(&path, table.to_csv())?;
        info!(path = %path.display(), rows = table.rows.len(), "wrote table");
    }
    Ok(())
}
