//! Stock data loading
//!
//! One CSV file per symbol. The first column is the row index, `Date_col`
//! is kept as text, every other column is numeric. `Close(t)` is renamed
//! to `Close` on load. Row order is the chronological order of the file.
//!
//! Empty cells and non-finite literals (`NaN`, `inf`) load as missing
//! values; a column with gaps is only rejected once it is selected.


use crate::error::{Error, Result};
use ndarray::{Array1, Array2, ArrayView1};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Name of the date column, kept aside from the numeric data
pub const DATE_COLUMN: &str = "Date_col";

/// Raw price column name and the name it is exposed under
const RAW_CLOSE_COLUMN: &str = "Close(t)";
const CLOSE_COLUMN: &str = "Close";

/// Chronologically ordered table of one stock
#[derive(Debug, Clone)]
pub struct StockTable {
    symbol: String,
    index: Vec<String>,
    dates: Option<Vec<String>>,
    columns: Vec<String>,
    values: Array2<f64>,
}

/// First rows of a table, for display
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TablePreview {
    pub columns: Vec<String>,
    pub rows: Vec<PreviewRow>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PreviewRow {
    pub index: String,
    pub date: Option<String>,
    pub values: Vec<f64>,
}

impl StockTable {
    /// Build a table from already parsed parts
    pub fn new(
        symbol: impl Into<String>,
        index: Vec<String>,
        dates: Option<Vec<String>>,
        columns: Vec<String>,
        values: Array2<f64>,
    ) -> Result<Self> {
        let n_rows = values.nrows();
        if index.len() != n_rows {
            return Err(Error::LengthMismatch {
                expected: n_rows,
                actual: index.len(),
            });
        }
        if let Some(dates) = &dates {
            if dates.len() != n_rows {
                return Err(Error::LengthMismatch {
                    expected: n_rows,
                    actual: dates.len(),
                });
            }
        }
        if columns.len() != values.ncols() {
            return Err(Error::LengthMismatch {
                expected: values.ncols(),
                actual: columns.len(),
            });
        }

        Ok(Self {
            symbol: symbol.into(),
            index,
            dates,
            columns,
            values,
        })
    }

    /// Build a table from named numeric columns, indexing rows 0..n
    pub fn from_columns(symbol: impl Into<String>, columns: Vec<(&str, Vec<f64>)>) -> Result<Self> {
        let n_rows = columns.first().map(|(_, v)| v.len()).unwrap_or(0);
        let mut values = Array2::zeros((n_rows, columns.len()));
        for (j, (name, column)) in columns.iter().enumerate() {
            if column.len() != n_rows {
                return Err(Error::InvalidSelection(format!(
                    "column '{}' has {} rows, expected {}",
                    name,
                    column.len(),
                    n_rows
                )));
            }
            for (i, v) in column.iter().enumerate() {
                values[[i, j]] = *v;
            }
        }

        let names = columns.iter().map(|(name, _)| name.to_string()).collect();
        let index = (0..n_rows).map(|i| i.to_string()).collect();
        Self::new(symbol, index, None, names, values)
    }

    /// Parse a CSV file
    pub fn from_csv(symbol: impl Into<String>, path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(file);

        let headers = reader.headers()?.clone();
        if headers.is_empty() {
            return Err(Error::Parse {
                path: path.to_path_buf(),
                line: 1,
                column: String::new(),
                message: "missing header row".to_string(),
            });
        }

        // Column 0 is the row index
        let date_pos = headers.iter().position(|h| h == DATE_COLUMN).filter(|&p| p != 0);
        let numeric: Vec<(usize, String)> = headers
            .iter()
            .enumerate()
            .skip(1)
            .filter(|(pos, _)| Some(*pos) != date_pos)
            .map(|(pos, name)| {
                let name = if name == RAW_CLOSE_COLUMN { CLOSE_COLUMN } else { name };
                (pos, name.to_string())
            })
            .collect();

        let mut index = Vec::new();
        let mut dates = date_pos.map(|_| Vec::new());
        let mut flat = Vec::new();

        for (row, record) in reader.records().enumerate() {
            let record = record?;
            let line = row + 2;

            index.push(record.get(0).unwrap_or_default().to_string());
            if let (Some(pos), Some(dates)) = (date_pos, dates.as_mut()) {
                dates.push(record.get(pos).unwrap_or_default().to_string());
            }

            for (pos, name) in &numeric {
                let cell = record.get(*pos).unwrap_or_default();
                if cell.is_empty() {
                    flat.push(f64::NAN);
                    continue;
                }
                let value = cell.parse::<f64>().map_err(|e| Error::Parse {
                    path: path.to_path_buf(),
                    line,
                    column: name.clone(),
                    message: format!("'{}': {}", cell, e),
                })?;
                // NaN and infinities count as missing
                flat.push(if value.is_finite() { value } else { f64::NAN });
            }
        }

        let n_rows = index.len();
        let values = Array2::from_shape_vec((n_rows, numeric.len()), flat)
            .map_err(|e| Error::Internal(e.to_string()))?;
        let columns = numeric.into_iter().map(|(_, name)| name).collect();

        Self::new(symbol, index, dates, columns, values)
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn n_rows(&self) -> usize {
        self.values.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.n_rows() == 0
    }

    /// Numeric column names in file order
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_position(name).is_some()
    }

    pub fn column_position(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn column(&self, name: &str) -> Option<ArrayView1<'_, f64>> {
        self.column_position(name).map(|j| self.values.column(j))
    }

    pub fn values(&self) -> &Array2<f64> {
        &self.values
    }

    pub fn index(&self) -> &[String] {
        &self.index
    }

    pub fn dates(&self) -> Option<&[String]> {
        self.dates.as_deref()
    }

    /// Number of missing cells in a column, `None` for an unknown column
    pub fn missing_count(&self, name: &str) -> Option<usize> {
        self.column(name).map(|c| c.iter().filter(|v| !v.is_finite()).count())
    }

    /// Columns selectable as features for the given target
    pub fn feature_candidates(&self, target: &str) -> Vec<String> {
        self.columns.iter().filter(|c| *c != target).cloned().collect()
    }

    /// Gather the named columns into a dense matrix, preserving row order
    pub fn select(&self, names: &[String]) -> Result<Array2<f64>> {
        let positions = names
            .iter()
            .map(|name| {
                self.column_position(name).ok_or_else(|| {
                    Error::InvalidSelection(format!("unknown column '{}' for {}", name, self.symbol))
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let mut out = Array2::zeros((self.n_rows(), positions.len()));
        for (k, &j) in positions.iter().enumerate() {
            out.column_mut(k).assign(&self.values.column(j));
        }
        Ok(out)
    }

    /// Copy of one column
    pub fn target(&self, name: &str) -> Result<Array1<f64>> {
        self.column(name).map(|c| c.to_owned()).ok_or_else(|| {
            Error::InvalidSelection(format!("unknown target column '{}' for {}", name, self.symbol))
        })
    }

    /// First `n` rows, with the date column first when present
    pub fn head(&self, n: usize) -> TablePreview {
        let n = n.min(self.n_rows());
        let mut columns = Vec::with_capacity(self.columns.len() + 1);
        if self.dates.is_some() {
            columns.push(DATE_COLUMN.to_string());
        }
        columns.extend(self.columns.iter().cloned());

        let rows = (0..n)
            .map(|i| PreviewRow {
                index: self.index[i].clone(),
                date: self.dates.as_ref().map(|d| d[i].clone()),
                values: self.values.row(i).to_vec(),
            })
            .collect();

        TablePreview { columns, rows }
    }
}

/// All stock tables found in a data directory, keyed by symbol
#[derive(Debug, Clone, Default)]
pub struct DataStore {
    dir: PathBuf,
    tables: BTreeMap<String, Arc<StockTable>>,
}

impl DataStore {
    /// Load every `*.csv` file in `dir`
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        let mut tables: BTreeMap<String, Arc<StockTable>> = BTreeMap::new();

        let mut paths = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            if path.is_file() && path.extension().and_then(|e| e.to_str()) == Some("csv") {
                paths.push(path);
            }
        }
        paths.sort();

        for path in paths {
            let Some(symbol) = symbol_from_path(&path) else {
                continue;
            };
            if tables.contains_key(&symbol) {
                tracing::warn!(
                    symbol = %symbol,
                    path = %path.display(),
                    "Skipping file: symbol already loaded from another file"
                );
                continue;
            }

            let table = StockTable::from_csv(symbol.clone(), &path)?;
            tracing::debug!(
                symbol = %symbol,
                rows = table.n_rows(),
                columns = table.columns().len(),
                "Loaded stock table"
            );
            tables.insert(symbol, Arc::new(table));
        }

        tracing::info!("Loaded {} symbols from {}", tables.len(), dir.display());
        Ok(Self {
            dir: dir.to_path_buf(),
            tables,
        })
    }

    /// Store built from in-memory tables
    pub fn from_tables(tables: impl IntoIterator<Item = StockTable>) -> Self {
        Self {
            dir: PathBuf::new(),
            tables: tables
                .into_iter()
                .map(|t| (t.symbol().to_string(), Arc::new(t)))
                .collect(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Selectable symbols, sorted
    pub fn symbols(&self) -> Vec<String> {
        self.tables.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    pub fn load(&self, symbol: &str) -> Result<Arc<StockTable>> {
        self.tables.get(symbol).cloned().ok_or_else(|| Error::NotFound {
            symbol: symbol.to_string(),
        })
    }
}

/// `AAPL.csv` -> `AAPL`, `BRK.B.csv` -> `BRK`
fn symbol_from_path(path: &Path) -> Option<String> {
    let name = path.file_name()?.to_str()?;
    let symbol = name.split('.').next()?;
    if symbol.is_empty() {
        None
    } else {
        Some(symbol.to_string())
    }
}
