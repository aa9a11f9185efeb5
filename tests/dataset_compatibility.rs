//! Dataset compatibility and format validation tests
//!
//! The same logical data loaded from LibSVM (sparse) and CSV (dense) files
//! has to train, predict and cluster the same way.

use rdal::api::{KMeans, SVM};
use rdal::data::load_dataset;
use rdal::kmeans::InitMethod;
use rdal::{CSVDataset, Dataset, LibSVMDataset, Layout};
use std::io::Write;
use tempfile::NamedTempFile;

fn write_temp(data: &str, suffix: &str) -> NamedTempFile {
    let mut temp_file = NamedTempFile::with_suffix(suffix).expect("Failed to create temp file");
    write!(temp_file, "{data}").expect("Failed to write");
    temp_file.flush().expect("Failed to flush");
    temp_file
}

/// Test LibSVM format variations
#[test]
fn test_libsvm_format_variations() {
    let test_cases = vec![
        ("+1 1:0.5 3:1.2 7:0.8\n-1 2:0.3 5:2.1\n", "basic format"),
        (
            "# This is a comment\n+1 1:0.5 3:1.2\n\n# Another comment\n-1 2:0.3\n",
            "with comments",
        ),
        ("1 1:0.5 2:1.0\n0 1:-0.5 2:-1.0\n", "0/1 labels"),
        (
            "+1 1:1.0 10:2.0 100:3.0\n-1 5:1.5 50:2.5 500:3.5\n",
            "sparse indices",
        ),
        ("+1 1:2.0\n-1 1:-2.0\n+1 1:1.8\n-1 1:-1.8\n", "single feature"),
        ("+1 3:1.0 1:2.0\n-1 2:-1.0 1:-2.0\n", "unsorted indices"),
    ];

    for (data, description) in test_cases {
        let temp_file = write_temp(data, ".libsvm");

        let dataset = LibSVMDataset::from_file(temp_file.path())
            .unwrap_or_else(|e| panic!("Failed to load LibSVM dataset ({description}): {e}"));
        assert!(dataset.len() >= 2, "{description}");
        assert!(dataset.dim() > 0, "{description}");
        assert_eq!(dataset.table().layout(), Layout::Csr);

        let model = SVM::new()
            .train(&dataset)
            .unwrap_or_else(|e| panic!("Training failed ({description}): {e}"));
        let prediction = model.predict(dataset.table().row(0));
        assert!(prediction.label == 1.0 || prediction.label == -1.0, "{description}");
    }
}

#[test]
fn test_libsvm_dimension_is_max_index() {
    let temp_file = write_temp("+1 100:1.0 25000:1.5\n-1 200:1.0\n", ".libsvm");
    let dataset = LibSVMDataset::from_file(temp_file.path()).unwrap();
    assert_eq!(dataset.len(), 2);
    assert_eq!(dataset.dim(), 25000);
}

/// Test cross-format compatibility
#[test]
fn test_cross_format_compatibility() {
    let libsvm_data = "+1 1:2.0 2:1.0\n+1 1:1.8 2:1.1\n-1 1:-2.0 2:-1.0\n-1 1:-1.8 2:-1.1\n";
    let csv_data = "feature1,feature2,label\n2.0,1.0,1\n1.8,1.1,1\n-2.0,-1.0,-1\n-1.8,-1.1,-1\n";

    let libsvm_file = write_temp(libsvm_data, ".libsvm");
    let csv_file = write_temp(csv_data, ".csv");

    let libsvm_dataset = LibSVMDataset::from_file(libsvm_file.path()).unwrap();
    let csv_dataset = CSVDataset::from_file(csv_file.path()).unwrap();

    assert_eq!(libsvm_dataset.len(), csv_dataset.len());
    assert_eq!(libsvm_dataset.dim(), csv_dataset.dim());
    assert_eq!(libsvm_dataset.labels(), csv_dataset.labels());

    let libsvm_model = SVM::new().train(&libsvm_dataset).unwrap();
    let csv_model = SVM::new().train(&csv_dataset).unwrap();

    assert_eq!(libsvm_model.evaluate(&libsvm_dataset).unwrap(), 1.0);
    assert_eq!(csv_model.evaluate(&csv_dataset).unwrap(), 1.0);

    // models trained on either layout accept the other one
    let cross = csv_model.predict_dataset(&libsvm_dataset).unwrap();
    for (prediction, &label) in cross.iter().zip(libsvm_dataset.labels()) {
        assert_eq!(prediction.label, label);
    }
}

#[test]
fn test_cross_format_clustering() {
    let libsvm_data = "0 1:1.0 2:1.0\n0 1:1.0 2:2.0\n0 1:2.0 2:1.0\n0 1:8.0 2:8.0\n0 1:8.0 2:9.0\n0 1:9.0 2:8.0\n";
    let csv_data = "x,y\n1,1\n1,2\n2,1\n8,8\n8,9\n9,8\n";

    let libsvm_file = write_temp(libsvm_data, ".libsvm");
    let csv_file = write_temp(csv_data, ".csv");

    let (sparse, _) = load_dataset(libsvm_file.path(), true).unwrap();
    let (dense, labels) = load_dataset(csv_file.path(), false).unwrap();
    assert_eq!(sparse.layout(), Layout::Csr);
    assert_eq!(dense.layout(), Layout::Dense);
    assert!(labels.is_empty());

    let kmeans = KMeans::new(2).with_init(InitMethod::Deterministic);
    let a = kmeans.fit(&sparse).unwrap();
    let b = kmeans.fit(&dense).unwrap();

    assert_eq!(a.assignments, Some(vec![0, 0, 0, 1, 1, 1]));
    assert_eq!(a.assignments, b.assignments);
    assert!((a.objective_function.unwrap() - b.objective_function.unwrap()).abs() < 1e-9);
}

/// Test malformed data handling
#[test]
fn test_malformed_data_handling() {
    let libsvm_cases = vec![
        ("invalid_label 1:1.0\n", "invalid label"),
        ("+1 invalid_feature\n", "invalid feature format"),
        ("+1 0:1.0\n", "zero-based index"),
        ("+1 1:invalid_value\n", "invalid feature value"),
        ("+1 1:1.0 1:2.0\n", "duplicate index"),
        ("", "empty file"),
    ];
    for (data, description) in libsvm_cases {
        let temp_file = write_temp(data, ".libsvm");
        assert!(
            LibSVMDataset::from_file(temp_file.path()).is_err(),
            "LibSVM should reject malformed data: {description}"
        );
    }

    let csv_cases = vec![
        ("1,invalid_number\n", "invalid label"),
        ("1.0,abc,1\n", "invalid feature"),
        ("1.0,2.0,1\n3.0,1\n", "ragged rows"),
        ("", "empty file"),
    ];
    for (data, description) in csv_cases {
        let temp_file = write_temp(data, ".csv");
        assert!(
            CSVDataset::from_file(temp_file.path()).is_err(),
            "CSV should reject malformed data: {description}"
        );
    }
}

#[test]
fn test_missing_file() {
    assert!(LibSVMDataset::from_file("/nonexistent/data.libsvm").is_err());
    assert!(load_dataset("/nonexistent/data.csv", true).is_err());
}
