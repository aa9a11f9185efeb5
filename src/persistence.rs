//! Model serialization and persistence
//!
//! Trained SVM models and K-Means results are stored as pretty-printed JSON,
//! together with the library version, the training parameters and a
//! creation timestamp. Support vectors are always written as sparse rows, so
//! models trained on dense and CSR data share one format.

use crate::api::TrainedModel;
use crate::core::{DalError, KMeansConfig, OptimizerConfig, Result, SVMModel, SparseVector};
use crate::kernel::{KernelFunction, RBFKernel};
use crate::kmeans::{Centroids, KMeansResult};
use crate::optimizer::SvmModel;
use crate::table::{NumericTable, Row};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;
use std::sync::Arc;

/// Serializable representation of a trained SVM model
#[derive(Debug, Serialize, Deserialize)]
pub struct SerializableModel {
    /// Kernel function and its parameters
    pub kernel: KernelFunction,
    /// Support vectors
    pub support_vectors: Vec<SerializableRow>,
    /// Alpha values times labels (alpha_i * y_i)
    pub alpha_y: Vec<f64>,
    /// Training-set row of every support vector
    pub support_indices: Vec<usize>,
    /// Bias term
    pub bias: f64,
    /// Feature count of the training data
    pub n_features: usize,
    /// Model metadata
    pub metadata: ModelMetadata,
}

/// Sparse feature row
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct SerializableRow {
    /// Feature indices
    pub indices: Vec<usize>,
    /// Feature values
    pub values: Vec<f64>,
}

/// Model metadata for tracking and validation
#[derive(Debug, Serialize, Deserialize)]
pub struct ModelMetadata {
    /// Library version used to create the model
    pub library_version: String,
    /// Number of support vectors
    pub n_support_vectors: usize,
    /// Training parameters used
    pub training_params: TrainingParams,
    /// Creation timestamp
    pub created_at: String,
}

/// Training parameters for reference
#[derive(Debug, Serialize, Deserialize)]
pub struct TrainingParams {
    pub c: f64,
    pub epsilon: f64,
    pub max_iterations: usize,
}

impl From<Row<'_>> for SerializableRow {
    fn from(row: Row<'_>) -> Self {
        match row {
            Row::Dense(values) => {
                let (indices, values) = values
                    .iter()
                    .enumerate()
                    .filter(|&(_, &v)| v != 0.0)
                    .map(|(j, &v)| (j, v))
                    .unzip();
                Self { indices, values }
            }
            Row::Sparse { indices, values } => Self {
                indices: indices.to_vec(),
                values: values.to_vec(),
            },
        }
    }
}

impl SerializableModel {
    /// Create a serializable model from a trained model
    pub fn from_trained_model(model: &TrainedModel<KernelFunction>) -> Self {
        let inner = model.inner();
        let table = inner.support_vectors();
        let support_vectors = (0..table.n_rows())
            .map(|i| SerializableRow::from(table.row(i)))
            .collect();
        let config = model.config();

        Self {
            kernel: *inner.kernel(),
            support_vectors,
            alpha_y: inner.classification_coefficients().to_vec(),
            support_indices: inner.support_indices().to_vec(),
            bias: inner.bias(),
            n_features: inner.n_features(),
            metadata: ModelMetadata {
                library_version: crate::VERSION.to_string(),
                n_support_vectors: inner.n_support_vectors(),
                training_params: TrainingParams {
                    c: config.c,
                    epsilon: config.epsilon,
                    max_iterations: config.max_iterations,
                },
                created_at: chrono::Utc::now().to_rfc3339(),
            },
        }
    }

    /// Save model to file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        write_json(self, path)
    }

    /// Load model from file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        read_json(path)
    }

    /// Rebuild a usable model
    pub fn to_trained_model(&self) -> Result<TrainedModel<KernelFunction>> {
        if let KernelFunction::Rbf { gamma } = self.kernel {
            RBFKernel::try_new(gamma)?;
        }
        let rows: Vec<SparseVector> = self
            .support_vectors
            .iter()
            .map(|row| {
                if row.indices.len() != row.values.len() {
                    return Err(DalError::SerializationError(
                        "Support vector indices and values differ in length".to_string(),
                    ));
                }
                Ok(SparseVector::new(row.indices.clone(), row.values.clone()))
            })
            .collect::<Result<_>>()?;
        let table = NumericTable::from_sparse_rows(&rows, self.n_features)?;

        let mut model = SvmModel::from_parts(
            Arc::new(self.kernel),
            table,
            self.alpha_y.clone(),
            self.support_indices.clone(),
            self.bias,
        )?;
        model.set_n_features(self.n_features);

        let params = &self.metadata.training_params;
        let config = OptimizerConfig {
            c: params.c,
            epsilon: params.epsilon,
            max_iterations: params.max_iterations,
            ..Default::default()
        };
        Ok(TrainedModel::from_model(model, config))
    }

    /// Print model summary
    pub fn print_summary(&self) {
        println!("=== SVM Model Summary ===");
        println!("Kernel: {}", self.kernel_description());
        println!("Support Vectors: {}", self.metadata.n_support_vectors);
        println!("Features: {}", self.n_features);
        println!("Bias: {:.6}", self.bias);
        println!("Library Version: {}", self.metadata.library_version);
        println!("Created: {}", self.metadata.created_at);
        println!("Training Parameters:");
        println!("  C: {}", self.metadata.training_params.c);
        println!("  Epsilon: {}", self.metadata.training_params.epsilon);
        println!(
            "  Max Iterations: {}",
            self.metadata.training_params.max_iterations
        );
    }

    fn kernel_description(&self) -> String {
        match self.kernel {
            KernelFunction::Linear => "linear".to_string(),
            KernelFunction::Rbf { gamma } => format!("rbf (gamma = {gamma})"),
        }
    }
}

/// Serializable K-Means result
#[derive(Debug, Serialize, Deserialize)]
pub struct SerializableClustering {
    /// Final centroids, one row per cluster
    pub centroids: Option<Vec<Vec<f64>>>,
    pub assignments: Option<Vec<usize>>,
    pub objective_function: Option<f64>,
    pub n_iterations: usize,
    pub n_empty_clusters: usize,
    pub metadata: ClusteringMetadata,
}

/// Clustering run metadata
#[derive(Debug, Serialize, Deserialize)]
pub struct ClusteringMetadata {
    pub library_version: String,
    pub n_clusters: usize,
    pub max_iterations: usize,
    pub accuracy_threshold: f64,
    pub created_at: String,
}

impl SerializableClustering {
    /// Capture a result and the parameters that produced it
    pub fn from_result(result: &KMeansResult, config: &KMeansConfig) -> Self {
        Self {
            centroids: result.centroids.as_ref().map(Centroids::to_rows),
            assignments: result.assignments.clone(),
            objective_function: result.objective_function,
            n_iterations: result.n_iterations,
            n_empty_clusters: result.n_empty_clusters,
            metadata: ClusteringMetadata {
                library_version: crate::VERSION.to_string(),
                n_clusters: config.n_clusters,
                max_iterations: config.max_iterations,
                accuracy_threshold: config.accuracy_threshold,
                created_at: chrono::Utc::now().to_rfc3339(),
            },
        }
    }

    /// Rebuild the result
    pub fn to_result(&self) -> Result<KMeansResult> {
        let centroids = self
            .centroids
            .as_deref()
            .map(Centroids::from_rows)
            .transpose()?;
        Ok(KMeansResult {
            centroids,
            assignments: self.assignments.clone(),
            objective_function: self.objective_function,
            n_iterations: self.n_iterations,
            n_empty_clusters: self.n_empty_clusters,
        })
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        write_json(self, path)
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        read_json(path)
    }
}

fn write_json<T: Serialize, P: AsRef<Path>>(value: &T, path: P) -> Result<()> {
    let file = File::create(path)?;
    let writer = BufWriter::new(file);
    serde_json::to_writer_pretty(writer, value)
        .map_err(|e| DalError::SerializationError(e.to_string()))
}

fn read_json<T: DeserializeOwned, P: AsRef<Path>>(path: P) -> Result<T> {
    let file = File::open(path)?;
    let reader = BufReader::new(file);
    serde_json::from_reader(reader).map_err(|e| DalError::SerializationError(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{KMeans, SVM};
    use tempfile::NamedTempFile;

    #[test]
    fn test_row_conversion() {
        let dense = SerializableRow::from(Row::Dense(&[1.0, 0.0, 2.0]));
        assert_eq!(dense.indices, vec![0, 2]);
        assert_eq!(dense.values, vec![1.0, 2.0]);

        let sparse = SerializableRow::from(Row::Sparse {
            indices: &[0, 2, 5],
            values: &[1.0, 2.0, 3.0],
        });
        assert_eq!(sparse.indices, vec![0, 2, 5]);
        assert_eq!(sparse.values, vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_model_serialization() -> Result<()> {
        let table = NumericTable::from_rows(&[vec![2.0, 0.0], vec![-2.0, 1.0], vec![1.5, 0.5]])?;
        let labels = [1.0, -1.0, 1.0];

        let model = SVM::with_kernel(KernelFunction::Rbf { gamma: 0.5 })
            .with_c(3.0)
            .train_table(&table, &labels)?;
        let serializable = SerializableModel::from_trained_model(&model);

        let temp_file = NamedTempFile::new().expect("Failed to create temp file");
        serializable.save_to_file(temp_file.path())?;
        let loaded = SerializableModel::load_from_file(temp_file.path())?;

        assert_eq!(loaded.kernel, KernelFunction::Rbf { gamma: 0.5 });
        assert_eq!(loaded.support_vectors, serializable.support_vectors);
        assert_eq!(loaded.bias, serializable.bias);
        assert_eq!(loaded.metadata.training_params.c, 3.0);

        let restored = loaded.to_trained_model()?;
        assert_eq!(restored.info().n_features, 2);
        for i in 0..table.n_rows() {
            let original = model.predict(table.row(i));
            let again = restored.predict(table.row(i));
            assert_eq!(original.label, again.label);
            assert!((original.decision_value - again.decision_value).abs() < 1e-12);
        }
        Ok(())
    }

    #[test]
    fn test_clustering_serialization() -> Result<()> {
        let table = NumericTable::from_rows(&[vec![0.0], vec![1.0], vec![10.0], vec![11.0]])?;
        let kmeans = KMeans::new(2).with_max_iterations(10);
        let result = kmeans.fit(&table)?;

        let temp_file = NamedTempFile::new().expect("Failed to create temp file");
        SerializableClustering::from_result(&result, kmeans.config()).save_to_file(temp_file.path())?;
        let loaded = SerializableClustering::load_from_file(temp_file.path())?;

        assert_eq!(loaded.metadata.n_clusters, 2);
        assert_eq!(loaded.to_result()?, result);
        Ok(())
    }

    #[test]
    fn test_load_garbage() {
        use std::io::Write;

        let mut temp_file = NamedTempFile::new().expect("Failed to create temp file");
        write!(temp_file, "{{ not json").expect("Failed to write");
        let result = SerializableModel::load_from_file(temp_file.path());
        assert!(matches!(result, Err(DalError::SerializationError(_))));
    }
}
