//! Core traits shared by loaders and trained models

use crate::core::Prediction;
use crate::table::{NumericTable, Row};

/// Dataset abstraction: a numeric table with optional per-row labels
pub trait Dataset: Send + Sync {
    /// Number of rows in the dataset
    fn len(&self) -> usize {
        self.table().n_rows()
    }

    /// Number of features (dimensionality)
    fn dim(&self) -> usize {
        self.table().n_columns()
    }

    /// The feature table
    fn table(&self) -> &NumericTable;

    /// Per-row labels; empty when the source carried none
    fn labels(&self) -> &[f64];

    /// Check if the dataset is empty
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Trained SVM model
pub trait SVMModel: Send + Sync {
    /// Predict a single row
    fn predict(&self, row: Row<'_>) -> Prediction;

    /// Predict every row of a table
    fn predict_table(&self, table: &NumericTable) -> Vec<Prediction> {
        (0..table.n_rows()).map(|i| self.predict(table.row(i))).collect()
    }

    /// Get the number of support vectors
    fn n_support_vectors(&self) -> usize;

    /// Get the bias term
    fn bias(&self) -> f64;
}
