//! Error types shared by the clustering and SVM engines

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DalError {
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Invalid dataset: {0}")]
    InvalidDataset(String),

    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Partial result shape mismatch: expected {expected_clusters}x{expected_features}, got {actual_clusters}x{actual_features}")]
    PartialShapeMismatch {
        expected_clusters: usize,
        expected_features: usize,
        actual_clusters: usize,
        actual_features: usize,
    },

    #[error("Empty dataset")]
    EmptyDataset,

    #[error("Invalid label: expected -1 or +1, got {0}")]
    InvalidLabel(f64),

    #[error("Unsupported table layout: {0}")]
    UnsupportedLayout(String),

    #[error("Device unavailable: {0}")]
    DeviceUnavailable(String),

    #[error("Allocation failed: {0}")]
    Allocation(String),

    #[error("Numerical error: {0}")]
    Numerical(String),

    #[error("Model not trained")]
    ModelNotTrained,

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

pub type Result<T> = std::result::Result<T, DalError>;

/// Allocate a zeroed buffer, reporting failure instead of aborting the process
pub fn try_zeroed(len: usize, what: &str) -> Result<Vec<f64>> {
    let mut buffer = Vec::new();
    buffer
        .try_reserve_exact(len)
        .map_err(|e| DalError::Allocation(format!("{what} ({len} values): {e}")))?;
    buffer.resize(len, 0.0);
    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = DalError::DimensionMismatch {
            expected: 3,
            actual: 2,
        };
        assert_eq!(err.to_string(), "Dimension mismatch: expected 3, got 2");

        let err = DalError::PartialShapeMismatch {
            expected_clusters: 2,
            expected_features: 4,
            actual_clusters: 3,
            actual_features: 4,
        };
        assert!(err.to_string().contains("2x4"));
        assert!(err.to_string().contains("3x4"));
    }

    #[test]
    fn test_try_zeroed() {
        let buffer = try_zeroed(5, "test").unwrap();
        assert_eq!(buffer, vec![0.0; 5]);
    }

    #[test]
    fn test_try_zeroed_overflow() {
        let result = try_zeroed(usize::MAX / 2, "huge");
        assert!(matches!(result, Err(DalError::Allocation(_))));
    }
}
