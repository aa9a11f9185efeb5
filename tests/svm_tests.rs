//! Integration tests for SVM training
//!
//! Working-set selection and the bias rule are checked directly; the
//! training loop is checked through observers and end-to-end accuracy.

use approx::assert_relative_eq;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rdal::api::SVM;
use rdal::core::{CacheKind, DalError, OptimizerConfig, SVMModel};
use rdal::dispatch::{Device, ExecutionContext};
use rdal::kernel::{KernelFunction, RBFKernel};
use rdal::optimizer::{SVMOptimizer, StopReason};
use rdal::solver::{compute_bias, is_lower, is_upper, select_indices, WorkingSetSelector};
use rdal::table::NumericTable;

/// Two separable blobs around (3, 3) and (-3, -3)
fn blobs(n_per_class: usize, seed: u64) -> (NumericTable, Vec<f64>) {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut rows = Vec::new();
    let mut labels = Vec::new();
    for _ in 0..n_per_class {
        rows.push(vec![
            3.0 + rng.random_range(-1.0..1.0),
            3.0 + rng.random_range(-1.0..1.0),
        ]);
        labels.push(1.0);
        rows.push(vec![
            -3.0 + rng.random_range(-1.0..1.0),
            -3.0 + rng.random_range(-1.0..1.0),
        ]);
        labels.push(-1.0);
    }
    (NumericTable::from_rows(&rows).unwrap(), labels)
}

/// A random solver state with alphas pinned to both bounds and free values
fn random_state(n: usize, c: f64, seed: u64) -> (Vec<f64>, Vec<f64>, Vec<f64>) {
    let mut rng = StdRng::seed_from_u64(seed);
    let y = (0..n)
        .map(|_| if rng.random::<f64>() < 0.5 { 1.0 } else { -1.0 })
        .collect();
    let alpha = (0..n)
        .map(|_| match rng.random_range(0..3) {
            0 => 0.0,
            1 => c,
            _ => rng.random_range(0.0..c),
        })
        .collect();
    let f = (0..n).map(|_| rng.random_range(-2.0..2.0)).collect();
    (y, alpha, f)
}

#[test]
fn test_selection_is_deterministic() {
    let (y, alpha, f) = random_state(50, 1.0, 3);

    let mut first_mask = vec![false; 50];
    let first = select_indices(&y, &alpha, &f, 1.0, 16, &mut first_mask);
    let mut second_mask = vec![false; 50];
    let second = select_indices(&y, &alpha, &f, 1.0, 16, &mut second_mask);

    assert_eq!(first, second);
    assert_eq!(first_mask, second_mask);
}

#[test]
fn test_selection_is_valid() {
    for seed in 0..20 {
        let n = 37;
        let c = 2.5;
        let (y, alpha, f) = random_state(n, c, seed);

        for n_select in [2, 8, 16, 64] {
            let mut selected = vec![false; n];
            let picked = select_indices(&y, &alpha, &f, c, n_select, &mut selected);

            // every row is in at least one of the two sets
            assert_eq!(picked.len(), n_select.min(n));
            let mut unique = picked.clone();
            unique.sort_unstable();
            unique.dedup();
            assert_eq!(unique.len(), picked.len(), "duplicate index for seed {seed}");

            for &i in &picked {
                assert!(selected[i]);
                assert!(is_upper(y[i], alpha[i], c) || is_lower(y[i], alpha[i], c));
            }
        }
    }
}

#[test]
fn test_selection_starts_from_most_violating_pair() {
    let y = [1.0, -1.0, 1.0, -1.0];
    let alpha = [0.0; 4];
    let f = [0.5, 0.1, -0.7, 0.9];
    let mut selected = [false; 4];

    let picked = select_indices(&y, &alpha, &f, 1.0, 2, &mut selected);

    // lowest f among the upper set, then highest f among the lower set
    assert_eq!(picked, vec![2, 3]);
}

#[test]
fn test_selector_keeps_second_half() {
    let (y, alpha, f) = random_state(40, 1.0, 9);
    let mut selector = WorkingSetSelector::new(40, 8).unwrap();

    let first = selector.select(&y, &alpha, &f, 1.0).unwrap().to_vec();
    assert_eq!(first.len(), 8);

    let second = selector.select(&y, &alpha, &f, 1.0).unwrap().to_vec();
    assert_eq!(second.len(), 8);
    assert_eq!(&second[..4], &first[4..]);

    let mut unique = second.clone();
    unique.sort_unstable();
    unique.dedup();
    assert_eq!(unique.len(), 8);
}

#[test]
fn test_selector_rejects_bad_sizes() {
    assert!(WorkingSetSelector::new(4, 0).is_err());
    assert!(WorkingSetSelector::new(4, 8).is_err());

    let mut selector = WorkingSetSelector::new(4, 2).unwrap();
    assert!(selector.select(&[1.0; 3], &[0.0; 4], &[0.0; 4], 1.0).is_err());
}

#[test]
fn test_bias_rule() {
    // free vectors present: negated mean of their gradients
    assert_relative_eq!(
        compute_bias(&[1.0, -1.0], &[0.5, 0.5], &[0.2, 0.4], 1.0),
        -0.3,
        epsilon = 1e-12
    );
    // no free vectors: midpoint of min over up and max over low
    assert_relative_eq!(
        compute_bias(&[1.0, -1.0], &[0.0, 0.0], &[0.2, 1.0], 1.0),
        -0.6,
        epsilon = 1e-12
    );
    // only the upper set is populated
    assert_relative_eq!(
        compute_bias(&[1.0, 1.0], &[0.0, 0.0], &[0.3, 0.5], 1.0),
        -0.3,
        epsilon = 1e-12
    );
    // only the lower set is populated
    assert_relative_eq!(
        compute_bias(&[1.0, 1.0], &[1.0, 1.0], &[0.3, 0.5], 1.0),
        -0.5,
        epsilon = 1e-12
    );
}

#[test]
fn test_box_and_equality_constraints_hold_every_iteration() {
    let (table, labels) = blobs(30, 17);

    for cache_kind in [CacheKind::NoCache, CacheKind::Simple, CacheKind::Lru] {
        let config = OptimizerConfig {
            c: 0.1,
            epsilon: 1e-4,
            cache_kind,
            cache_size: 4 * 60 * std::mem::size_of::<f64>(),
            working_set_size: Some(8),
            ..Default::default()
        };
        let optimizer = SVMOptimizer::new(RBFKernel::new(0.3), config);

        let mut iterations = 0;
        optimizer
            .train_with_observer(&table, &labels, |state| {
                iterations = state.iteration;
                for &a in state.alpha {
                    assert!((0.0..=state.c).contains(&a), "alpha {a} out of [0, {}]", state.c);
                }
                let balance: f64 = state.y.iter().zip(state.alpha).map(|(y, a)| y * a).sum();
                assert!(balance.abs() < 1e-9, "sum of y * alpha is {balance}");
            })
            .unwrap();
        assert!(iterations > 0, "{cache_kind:?} ran no iterations");
    }
}

#[test]
fn test_linear_blobs_are_separated() {
    let (table, labels) = blobs(25, 1);
    let model = SVM::new().with_c(1.0).train_table(&table, &labels).unwrap();

    let metrics = model.evaluate_table(&table, &labels).unwrap();
    assert_relative_eq!(metrics.accuracy(), 1.0);
    assert!(model.info().n_support_vectors >= 2);
    assert!(model.info().n_support_vectors < table.n_rows());

    let report = model.inner().report().unwrap();
    assert_ne!(report.stop_reason, StopReason::MaxIterations);
    assert!(report.iterations > 0);
}

#[test]
fn test_rbf_solves_xor() {
    let table = NumericTable::from_rows(&[
        vec![1.0, 1.0],
        vec![-1.0, -1.0],
        vec![1.0, -1.0],
        vec![-1.0, 1.0],
    ])
    .unwrap();
    let labels = [1.0, 1.0, -1.0, -1.0];

    let model = SVM::with_kernel(KernelFunction::Rbf { gamma: 1.0 })
        .with_c(10.0)
        .train_table(&table, &labels)
        .unwrap();

    let predictions = model.predict_table(&table).unwrap();
    for (prediction, &label) in predictions.iter().zip(&labels) {
        assert_eq!(prediction.label, label);
    }
    // the problem is symmetric, so the bias vanishes
    assert!(model.inner().bias().abs() < 1e-2);
    assert_eq!(model.info().n_support_vectors, 4);
}

#[test]
fn test_cache_kinds_agree() {
    let (table, labels) = blobs(20, 23);

    let train = |cache_kind: CacheKind| {
        SVM::with_kernel(KernelFunction::Rbf { gamma: 0.5 })
            .with_c(2.0)
            .with_cache_kind(cache_kind)
            .with_cache_size(3 * 40 * std::mem::size_of::<f64>())
            .with_working_set_size(4)
            .train_table(&table, &labels)
            .unwrap()
    };

    let reference = train(CacheKind::NoCache);
    for cache_kind in [CacheKind::Simple, CacheKind::Lru] {
        let model = train(cache_kind);
        assert_eq!(model.info().support_vector_indices, reference.info().support_vector_indices);
        for (a, b) in model
            .inner()
            .classification_coefficients()
            .iter()
            .zip(reference.inner().classification_coefficients())
        {
            assert_relative_eq!(a, b, epsilon = 1e-12);
        }
        assert_relative_eq!(model.inner().bias(), reference.inner().bias(), epsilon = 1e-12);
    }
}

#[test]
fn test_targets_agree() {
    let (table, labels) = blobs(20, 5);
    let device = Device::open("test-device", 2, 8).unwrap();

    let train = |ctx: ExecutionContext| {
        SVM::with_kernel(KernelFunction::Linear)
            .with_working_set_size(8)
            .with_context(ctx)
            .train_table(&table, &labels)
            .unwrap()
    };

    let reference = train(ExecutionContext::cpu_scalar());
    for ctx in [ExecutionContext::cpu(), ExecutionContext::with_device(device)] {
        let model = train(ctx);
        let expected = reference.predict_table(&table).unwrap();
        let actual = model.predict_table(&table).unwrap();
        for (a, b) in actual.iter().zip(&expected) {
            assert_eq!(a.label, b.label);
            assert!((a.decision_value - b.decision_value).abs() < 5e-2);
        }
    }
}

#[test]
fn test_sparse_training_matches_dense() {
    let (dense, labels) = blobs(15, 8);
    let rows: Vec<rdal::core::SparseVector> = (0..dense.n_rows())
        .map(|i| match dense.row(i) {
            rdal::table::Row::Dense(values) => {
                rdal::core::SparseVector::new(vec![0, 1], values.to_vec())
            }
            rdal::table::Row::Sparse { .. } => unreachable!(),
        })
        .collect();
    let sparse = NumericTable::from_sparse_rows(&rows, 2).unwrap();

    let a = SVM::new().train_table(&dense, &labels).unwrap();
    let b = SVM::new().train_table(&sparse, &labels).unwrap();

    let pa = a.predict_table(&dense).unwrap();
    let pb = b.predict_table(&sparse).unwrap();
    for (x, y) in pa.iter().zip(&pb) {
        assert_eq!(x.label, y.label);
        assert!((x.decision_value - y.decision_value).abs() < 5e-2);
    }
}

#[test]
fn test_invalid_training_input() {
    let table = NumericTable::from_rows(&[vec![1.0], vec![2.0]]).unwrap();

    assert!(SVM::new().train_table(&table, &[1.0, 1.0]).is_err());
    assert!(SVM::new().train_table(&table, &[1.0, 0.0]).is_err());
    assert!(SVM::new().train_table(&table, &[1.0]).is_err());
    assert!(SVM::new().with_c(-1.0).train_table(&table, &[1.0, -1.0]).is_err());
    assert!(SVM::new()
        .with_working_set_size(3)
        .train_table(&table, &[1.0, -1.0])
        .is_err());
}

#[test]
fn test_invalid_rbf_gamma_is_rejected() {
    let table = NumericTable::from_rows(&[vec![1.0], vec![-1.0]]).unwrap();

    for gamma in [0.0, -1.0, f64::NAN] {
        let result = SVM::with_kernel(KernelFunction::Rbf { gamma }).train_table(&table, &[1.0, -1.0]);
        assert!(
            matches!(result, Err(DalError::InvalidParameter(_))),
            "gamma {gamma} was accepted"
        );

        let optimizer = SVMOptimizer::new(KernelFunction::Rbf { gamma }, OptimizerConfig::default());
        assert!(optimizer.train_table(&table, &[1.0, -1.0]).is_err());
    }
}
