//! Tabular batches: named columns and equally wide rows of cells.

use std::collections::HashSet;
use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use serde::Serialize;
use thiserror::Error;

use crate::schema::Record;

/// One table cell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Integer(i64),
    Text(String),
    Missing,
}

impl Value {
    /// CSV cells are kept as text; empty cells become [`Value::Missing`].
    fn from_cell(cell: &str) -> Self {
        if cell.is_empty() {
            Value::Missing
        } else {
            Value::Text(cell.to_string())
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Integer(value) => write!(f, "{value}"),
            Value::Text(text) => f.write_str(text),
            Value::Missing => f.write_str("<missing>"),
        }
    }
}

#[derive(Error, Debug)]
pub enum TableError {
    #[error("CSV header row is missing")]
    EmptyHeader,

    #[error("column {0} has an empty name")]
    BlankColumn(usize),

    #[error("duplicate column '{0}'")]
    DuplicateColumn(String),

    #[error("row {row} has {found} values but the header declares {expected} columns")]
    Width {
        row: usize,
        expected: usize,
        found: usize,
    },

    #[error("batch exceeds the limit of {limit} rows")]
    TooManyRows { limit: usize },

    #[error("malformed CSV: {0}")]
    Csv(#[from] csv::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Ordered rows sharing one set of named columns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
}

impl Table {
    pub fn new(columns: Vec<String>) -> Result<Self, TableError> {
        if columns.is_empty() {
            return Err(TableError::EmptyHeader);
        }

        let mut seen = HashSet::with_capacity(columns.len());
        for (index, name) in columns.iter().enumerate() {
            if name.is_empty() {
                return Err(TableError::BlankColumn(index + 1));
            }
            if !seen.insert(name.as_str()) {
                return Err(TableError::DuplicateColumn(name.clone()));
            }
        }

        Ok(Self {
            columns,
            rows: Vec::new(),
        })
    }

    /// One row per record, columns in schema declaration order.
    pub fn from_records<I>(records: I) -> Self
    where
        I: IntoIterator<Item = Record>,
    {
        Self {
            columns: Record::column_names(),
            rows: records.into_iter().map(Record::into_row).collect(),
        }
    }

    /// Read a CSV document whose first row names the columns.
    ///
    /// Fields are trimmed, blank lines skipped and empty cells stored as
    /// [`Value::Missing`]. Fails once more than `max_rows` data rows are seen.
    pub fn from_csv_reader<R: Read>(reader: R, max_rows: usize) -> Result<Self, TableError> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let columns: Vec<String> = csv_reader
            .headers()?
            .iter()
            .enumerate()
            .map(|(index, name)| {
                if index == 0 {
                    name.trim_start_matches('\u{feff}').to_string()
                } else {
                    name.to_string()
                }
            })
            .collect();
        if columns.iter().all(String::is_empty) {
            return Err(TableError::EmptyHeader);
        }

        let mut table = Table::new(columns)?;
        for record in csv_reader.records() {
            let record = record?;
            if table.num_rows() >= max_rows {
                return Err(TableError::TooManyRows { limit: max_rows });
            }
            table.push_row(record.iter().map(Value::from_cell).collect())?;
        }

        Ok(table)
    }

    pub fn from_csv_path<P: AsRef<Path>>(path: P, max_rows: usize) -> Result<Self, TableError> {
        let file = File::open(path)?;
        Self::from_csv_reader(file, max_rows)
    }

    pub fn push_row(&mut self, row: Vec<Value>) -> Result<(), TableError> {
        if row.len() != self.columns.len() {
            return Err(TableError::Width {
                row: self.rows.len() + 1,
                expected: self.columns.len(),
                found: row.len(),
            });
        }
        self.rows.push(row);
        Ok(())
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|column| column == name)
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    pub fn num_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}
