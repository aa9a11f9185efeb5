//! LibSVM format dataset implementation
//!
//! Supports loading datasets in the libsvm format:
//! label index:value index:value ...
//!
//! Example:
//! +1 1:0.5 3:1.2 7:0.8
//! -1 2:0.3 5:2.1
//!
//! Rows land in a CSR table with zero-based column indices.

use crate::core::{DalError, Dataset, Result, SparseVector};
use crate::table::NumericTable;
use log::debug;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// Dataset implementation for LibSVM format files
#[derive(Debug, Clone)]
pub struct LibSVMDataset {
    table: NumericTable,
    labels: Vec<f64>,
}

impl LibSVMDataset {
    /// Load a dataset from a LibSVM format file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        let dataset = Self::from_reader(BufReader::new(file))?;
        debug!(
            "Loaded {} rows x {} features from {}",
            dataset.len(),
            dataset.dim(),
            path.as_ref().display()
        );
        Ok(dataset)
    }

    /// Load a dataset from a reader (for testing and flexibility)
    pub fn from_reader<R: BufRead>(reader: R) -> Result<Self> {
        let mut rows = Vec::new();
        let mut labels = Vec::new();
        let mut n_columns = 0;

        for (line_num, line) in reader.lines().enumerate() {
            let line = line?;
            let line = line.trim();

            // Skip empty lines and comments
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let (features, label) = Self::parse_line(line).map_err(|e| {
                DalError::ParseError(format!("Error parsing line {}: {}", line_num + 1, e))
            })?;
            if let Some(&last) = features.indices.last() {
                n_columns = n_columns.max(last + 1);
            }
            rows.push(features);
            labels.push(label);
        }

        if rows.is_empty() {
            return Err(DalError::EmptyDataset);
        }

        let table = NumericTable::from_sparse_rows(&rows, n_columns)?;
        Ok(Self { table, labels })
    }

    /// Parse a single line in libsvm format
    fn parse_line(line: &str) -> Result<(SparseVector, f64)> {
        let mut parts = line.split_whitespace();

        let label_str = parts
            .next()
            .ok_or_else(|| DalError::ParseError("Empty line".to_string()))?;
        let label = label_str
            .parse::<f64>()
            .map_err(|_| DalError::ParseError(format!("Invalid label: {label_str}")))?;

        // Binary classification: anything positive is the +1 class
        let label = if label > 0.0 { 1.0 } else { -1.0 };

        let mut indices = Vec::new();
        let mut values = Vec::new();

        for feature_str in parts {
            let (index, value) = feature_str.split_once(':').ok_or_else(|| {
                DalError::ParseError(format!("Invalid feature format: {feature_str}"))
            })?;

            let index = index
                .parse::<usize>()
                .map_err(|_| DalError::ParseError(format!("Invalid feature index: {index}")))?;
            let value = value
                .parse::<f64>()
                .map_err(|_| DalError::ParseError(format!("Invalid feature value: {value}")))?;

            // libsvm uses 1-based indexing
            if index == 0 {
                return Err(DalError::ParseError(
                    "Feature index must be positive: 0".to_string(),
                ));
            }

            indices.push(index - 1);
            values.push(value);
        }

        let features = SparseVector::new(indices, values);
        if features.indices.windows(2).any(|w| w[0] == w[1]) {
            return Err(DalError::ParseError(format!(
                "Duplicate feature index in: {line}"
            )));
        }
        Ok((features, label))
    }

    /// Consume the dataset, returning its table and labels
    pub fn into_parts(self) -> (NumericTable, Vec<f64>) {
        (self.table, self.labels)
    }
}

impl Dataset for LibSVMDataset {
    fn table(&self) -> &NumericTable {
        &self.table
    }

    fn labels(&self) -> &[f64] {
        &self.labels
    }
}
