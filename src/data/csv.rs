//! CSV format dataset implementation
//!
//! Supports loading datasets from CSV files where:
//! - The last column is the label (unless loaded unlabeled)
//! - All other columns are features
//! - First row can be headers (automatically detected)
//!
//! Rows land in a dense table.

use crate::core::{DalError, Dataset, Result};
use crate::table::NumericTable;
use log::debug;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// Dataset implementation for CSV format files
#[derive(Debug, Clone)]
pub struct CSVDataset {
    table: NumericTable,
    labels: Vec<f64>,
}

impl CSVDataset {
    /// Load a labeled dataset from a CSV file
    ///
    /// The last column is assumed to be the label.
    /// Headers are automatically detected if present.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open(path.as_ref(), true)
    }

    /// Load a CSV file where every column is a feature
    pub fn from_file_unlabeled<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open(path.as_ref(), false)
    }

    fn open(path: &Path, labeled: bool) -> Result<Self> {
        let file = File::open(path)?;
        let dataset = Self::load(BufReader::new(file), true, labeled)?;
        debug!(
            "Loaded {} rows x {} features from {}",
            dataset.len(),
            dataset.dim(),
            path.display()
        );
        Ok(dataset)
    }

    /// Load a labeled dataset from a reader
    pub fn from_reader<R: BufRead>(reader: R) -> Result<Self> {
        Self::from_reader_with_options(reader, true)
    }

    /// Load a labeled dataset from a reader with explicit header option
    pub fn from_reader_with_options<R: BufRead>(reader: R, auto_detect_header: bool) -> Result<Self> {
        Self::load(reader, auto_detect_header, true)
    }

    /// Load an unlabeled dataset from a reader
    pub fn from_reader_unlabeled<R: BufRead>(reader: R) -> Result<Self> {
        Self::load(reader, true, false)
    }

    fn load<R: BufRead>(reader: R, auto_detect_header: bool, labeled: bool) -> Result<Self> {
        let mut data = Vec::new();
        let mut labels = Vec::new();
        let mut n_columns = None;
        let mut first = true;

        for (line_num, line) in reader.lines().enumerate() {
            let line = line?;
            let line = line.trim();

            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            // Only the first data-bearing line may be a header
            if std::mem::take(&mut first)
                && auto_detect_header
                && Self::is_header_line(line, labeled)
            {
                continue;
            }

            let (features, label) = Self::parse_data_line(line, labeled).map_err(|e| {
                DalError::ParseError(format!("Error parsing line {}: {}", line_num + 1, e))
            })?;

            let expected = *n_columns.get_or_insert(features.len());
            if features.len() != expected {
                return Err(DalError::ParseError(format!(
                    "Line {} has {} features, expected {expected}",
                    line_num + 1,
                    features.len()
                )));
            }
            data.extend(features);
            if let Some(label) = label {
                labels.push(label);
            }
        }

        let n_columns = n_columns.ok_or(DalError::EmptyDataset)?;
        let table = NumericTable::from_dense(data.len() / n_columns, n_columns, data)?;
        Ok(Self { table, labels })
    }

    /// Check if a line appears to be a header
    fn is_header_line(line: &str, labeled: bool) -> bool {
        let fields: Vec<&str> = line.split(',').collect();

        let n_features = if labeled {
            if fields.len() < 2 {
                return false;
            }
            fields.len() - 1
        } else {
            fields.len()
        };

        // Most feature fields non-numeric means a header
        let non_numeric_count = fields
            .iter()
            .take(n_features)
            .filter(|field| field.trim().parse::<f64>().is_err())
            .count();

        non_numeric_count > fields.len() / 2
    }

    /// Parse a CSV data line into its features and, when labeled, a +1/-1 label
    fn parse_data_line(line: &str, labeled: bool) -> Result<(Vec<f64>, Option<f64>)> {
        let fields: Vec<&str> = line.split(',').map(|f| f.trim()).collect();

        let min_fields = if labeled { 2 } else { 1 };
        if fields.len() < min_fields {
            return Err(DalError::ParseError(format!(
                "Line has too few fields: {line}"
            )));
        }

        let (feature_fields, label) = if labeled {
            let label_str = fields[fields.len() - 1];
            let label = label_str
                .parse::<f64>()
                .map_err(|_| DalError::ParseError(format!("Invalid label: {label_str}")))?;
            let label = if label > 0.0 { 1.0 } else { -1.0 };
            (&fields[..fields.len() - 1], Some(label))
        } else {
            (&fields[..], None)
        };

        let features = feature_fields
            .iter()
            .enumerate()
            .map(|(idx, field)| {
                field.parse::<f64>().map_err(|_| {
                    DalError::ParseError(format!(
                        "Invalid feature value at column {}: {}",
                        idx + 1,
                        field
                    ))
                })
            })
            .collect::<Result<Vec<f64>>>()?;

        Ok((features, label))
    }

    /// Consume the dataset, returning its table and labels
    pub fn into_parts(self) -> (NumericTable, Vec<f64>) {
        (self.table, self.labels)
    }
}

impl Dataset for CSVDataset {
    fn table(&self) -> &NumericTable {
        &self.table
    }

    fn labels(&self) -> &[f64] {
        &self.labels
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::{Layout, Row};
    use std::io::Cursor;

    fn dense_row(dataset: &CSVDataset, i: usize) -> Vec<f64> {
        match dataset.table().row(i) {
            Row::Dense(values) => values.to_vec(),
            Row::Sparse { .. } => panic!("csv rows are dense"),
        }
    }

    #[test]
    fn test_csv_basic() {
        let dataset = CSVDataset::from_reader(Cursor::new("1.0,2.0,1\n3.0,4.0,-1\n")).unwrap();

        assert_eq!(dataset.len(), 2);
        assert_eq!(dataset.dim(), 2);
        assert_eq!(dataset.table().layout(), Layout::Dense);
        assert_eq!(dense_row(&dataset, 0), vec![1.0, 2.0]);
        assert_eq!(dense_row(&dataset, 1), vec![3.0, 4.0]);
        assert_eq!(dataset.labels(), &[1.0, -1.0]);
    }

    #[test]
    fn test_csv_with_headers() {
        let data = "feature1,feature2,label\n1.0,2.0,1\n3.0,4.0,-1\n";
        let dataset = CSVDataset::from_reader(Cursor::new(data)).unwrap();

        assert_eq!(dataset.len(), 2); // Headers should be skipped
        assert_eq!(dataset.labels(), &[1.0, -1.0]);
    }

    #[test]
    fn test_csv_header_after_comment() {
        let data = "# exported\nx,y,label\n1.0,2.0,1\n";
        let dataset = CSVDataset::from_reader(Cursor::new(data)).unwrap();
        assert_eq!(dataset.len(), 1);
    }

    #[test]
    fn test_csv_keeps_zeros() {
        let dataset = CSVDataset::from_reader(Cursor::new("1.0,0.0,2.0,1\n")).unwrap();
        assert_eq!(dense_row(&dataset, 0), vec![1.0, 0.0, 2.0]);
    }

    #[test]
    fn test_csv_label_conversion() {
        let data = "1.0,2.0,0.5\n3.0,4.0,-0.5\n5.0,6.0,0\n";
        let dataset = CSVDataset::from_reader(Cursor::new(data)).unwrap();

        assert_eq!(dataset.labels(), &[1.0, -1.0, -1.0]);
    }

    #[test]
    fn test_csv_unlabeled() {
        let data = "x,y\n1.0,1.0\n1.5,2.0\n";
        let dataset = CSVDataset::from_reader_unlabeled(Cursor::new(data)).unwrap();

        assert_eq!(dataset.len(), 2);
        assert_eq!(dataset.dim(), 2);
        assert!(dataset.labels().is_empty());
        assert_eq!(dense_row(&dataset, 1), vec![1.5, 2.0]);
    }

    #[test]
    fn test_csv_invalid_format() {
        // Too few fields
        assert!(CSVDataset::from_reader(Cursor::new("1.0\n")).is_err());

        // Invalid number
        assert!(CSVDataset::from_reader(Cursor::new("1.0,abc,-1\n")).is_err());

        // Ragged rows
        let result = CSVDataset::from_reader(Cursor::new("1.0,2.0,1\n3.0,-1\n"));
        assert!(matches!(result, Err(DalError::ParseError(_))));
    }

    #[test]
    fn test_csv_empty() {
        let result = CSVDataset::from_reader(Cursor::new("# nothing\n\n"));
        assert!(matches!(result, Err(DalError::EmptyDataset)));
    }

    #[test]
    fn test_csv_manual_header_control() {
        let data = "1.0,2.0,1\n3.0,4.0,-1\n";
        let dataset = CSVDataset::from_reader_with_options(Cursor::new(data), false).unwrap();
        assert_eq!(dataset.len(), 2);
    }

    #[test]
    fn test_is_header_line() {
        assert!(CSVDataset::is_header_line("feature1,feature2,label", true));
        assert!(CSVDataset::is_header_line("x1,x2,x3,y", true));
        assert!(!CSVDataset::is_header_line("1.0,2.0,3.0,1", true));
        assert!(!CSVDataset::is_header_line("1", true)); // Too few fields
        assert!(CSVDataset::is_header_line("x", false));
    }
}
