//! Wide table persistence as a flat CSV file.
//!
//! The CSV is the sole durable state: one row per axis date ascending, a
//! `date` column followed by one column per instrument display name. It is
//! rewritten wholesale at the end of every run.

use crate::series::{DateAxis, Series};
use anyhow::{Context, Result, anyhow};
use chrono::NaiveDate;
use std::path::{Path, PathBuf};
use tracing::debug;

pub const DATE_COLUMN: &str = "date";
const DATE_FORMAT: &str = "%Y-%m-%d";

/// One instrument column of the wide table.
#[derive(Debug, Clone)]
pub struct Column {
    pub name: String,
    pub decimals: u32,
    pub values: Vec<Option<f64>>,
}

impl Column {
    pub fn new(name: impl Into<String>, decimals: u32, values: Vec<Option<f64>>) -> Self {
        Column {
            name: name.into(),
            decimals,
            values,
        }
    }
}

/// One row per date, one column per instrument, in configured order.
#[derive(Debug, Clone, Default)]
pub struct WideTable {
    dates: Vec<NaiveDate>,
    columns: Vec<Column>,
}

impl WideTable {
    pub fn new(axis: &DateAxis) -> Self {
        WideTable {
            dates: axis.dates().to_vec(),
            columns: Vec::new(),
        }
    }

    pub fn push_column(&mut self, column: Column) {
        debug_assert_eq!(column.values.len(), self.dates.len());
        self.columns.push(column);
    }

    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// The named column as a sparse series, dropping missing cells. Returns
    /// `None` when the instrument was not previously tracked.
    pub fn series(&self, name: &str) -> Option<Series> {
        let column = self.columns.iter().find(|c| c.name == name)?;
        Some(Series::from_pairs(
            self.dates
                .iter()
                .zip(&column.values)
                .filter_map(|(date, value)| value.map(|v| (*date, v))),
        ))
    }
}

/// Loads and saves the wide table. A missing file on load signals a first
/// run, not an error.
pub struct CsvStore {
    path: PathBuf,
}

impl CsvStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        CsvStore { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<Option<WideTable>> {
        if !self.path.exists() {
            debug!("No prior data at {}", self.path.display());
            return Ok(None);
        }

        let mut reader = csv::Reader::from_path(&self.path)
            .with_context(|| format!("Failed to open {}", self.path.display()))?;
        let headers = reader
            .headers()
            .with_context(|| format!("Failed to read header of {}", self.path.display()))?
            .clone();

        let mut dates = Vec::new();
        let mut values: Vec<Vec<Option<f64>>> =
            vec![Vec::new(); headers.len().saturating_sub(1)];
        for record in reader.records() {
            let record =
                record.with_context(|| format!("Failed to read {}", self.path.display()))?;
            let raw_date = record
                .get(0)
                .ok_or_else(|| anyhow!("Row without a date cell in {}", self.path.display()))?;
            let date = NaiveDate::parse_from_str(raw_date, DATE_FORMAT)
                .with_context(|| format!("Invalid date '{raw_date}' in {}", self.path.display()))?;
            dates.push(date);

            for (index, cell) in record.iter().skip(1).enumerate() {
                let value = if cell.is_empty() {
                    None
                } else {
                    Some(cell.parse::<f64>().with_context(|| {
                        format!("Invalid number '{cell}' in {}", self.path.display())
                    })?)
                };
                if let Some(column) = values.get_mut(index) {
                    column.push(value);
                }
            }
        }

        // Precision is not recoverable from the file; it comes from the
        // instrument config when the table is rebuilt on save.
        let columns = headers
            .iter()
            .skip(1)
            .zip(values)
            .map(|(name, values)| Column::new(name, 0, values))
            .collect();

        debug!("Loaded {} rows from {}", dates.len(), self.path.display());
        Ok(Some(WideTable { dates, columns }))
    }

    pub fn save(&self, table: &WideTable) -> Result<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }

        let mut writer = csv::Writer::from_path(&self.path)
            .with_context(|| format!("Failed to write {}", self.path.display()))?;

        let mut header = vec![DATE_COLUMN.to_string()];
        header.extend(table.columns().iter().map(|c| c.name.clone()));
        writer.write_record(&header)?;

        for (row, date) in table.dates().iter().enumerate() {
            let mut record = vec![date.format(DATE_FORMAT).to_string()];
            for column in table.columns() {
                let cell = column
                    .values
                    .get(row)
                    .copied()
                    .flatten()
                    .map_or(String::new(), |v| {
                        format!("{:.*}", column.decimals as usize, v)
                    });
                record.push(cell);
            }
            writer.write_record(&record)?;
        }

        writer
            .flush()
            .with_context(|| format!("Failed to flush {}", self.path.display()))?;
        debug!(
            "Wrote {} rows to {}",
            table.dates().len(),
            self.path.display()
        );
        Ok(())
    }
}
