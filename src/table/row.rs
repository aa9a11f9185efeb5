//! Storage-independent view of a single table row

/// A borrowed row of a numeric table
///
/// Dense rows expose every feature value; sparse rows expose the sorted
/// column indices and the matching non-zero values.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Row<'a> {
    Dense(&'a [f64]),
    Sparse {
        indices: &'a [usize],
        values: &'a [f64],
    },
}

impl<'a> Row<'a> {
    /// Number of stored values
    pub fn nnz(&self) -> usize {
        match self {
            Row::Dense(values) => values.len(),
            Row::Sparse { values, .. } => values.len(),
        }
    }

    /// Squared L2 norm
    pub fn norm_squared(&self) -> f64 {
        let values = match self {
            Row::Dense(values) => values,
            Row::Sparse { values, .. } => values,
        };
        values.iter().map(|&v| v * v).sum()
    }

    /// Dot product with a dense vector of the same width
    pub fn dot_dense(&self, other: &[f64]) -> f64 {
        match self {
            Row::Dense(values) => dot_unrolled(values, other),
            Row::Sparse { indices, values } => indices
                .iter()
                .zip(values.iter())
                .map(|(&j, &v)| v * other[j])
                .sum(),
        }
    }

    /// Dot product with another row of any storage kind
    pub fn dot(&self, other: &Row<'_>) -> f64 {
        match (self, other) {
            (Row::Dense(x), Row::Dense(y)) => dot_unrolled(x, y),
            (Row::Sparse { .. }, Row::Dense(y)) => self.dot_dense(y),
            (Row::Dense(x), Row::Sparse { .. }) => other.dot_dense(x),
            (
                Row::Sparse {
                    indices: xi,
                    values: xv,
                },
                Row::Sparse {
                    indices: yi,
                    values: yv,
                },
            ) => dot_sparse(xi, xv, yi, yv),
        }
    }

    /// Squared Euclidean distance to a dense point, computed term by term
    pub fn squared_distance(&self, point: &[f64]) -> f64 {
        match self {
            Row::Dense(values) => values
                .iter()
                .zip(point.iter())
                .map(|(&a, &b)| (a - b) * (a - b))
                .sum(),
            Row::Sparse { indices, values } => {
                // ||x - c||^2 = ||c||^2 + sum over stored j of (x_j - c_j)^2 - c_j^2
                let mut dist: f64 = point.iter().map(|&c| c * c).sum();
                for (&j, &v) in indices.iter().zip(values.iter()) {
                    let c = point[j];
                    dist += (v - c) * (v - c) - c * c;
                }
                dist.max(0.0)
            }
        }
    }

    /// Add this row into a dense accumulator
    pub fn add_to(&self, acc: &mut [f64]) {
        match self {
            Row::Dense(values) => {
                for (a, &v) in acc.iter_mut().zip(values.iter()) {
                    *a += v;
                }
            }
            Row::Sparse { indices, values } => {
                for (&j, &v) in indices.iter().zip(values.iter()) {
                    acc[j] += v;
                }
            }
        }
    }

    /// Subtract this row from a dense accumulator
    pub fn subtract_from(&self, acc: &mut [f64]) {
        match self {
            Row::Dense(values) => {
                for (a, &v) in acc.iter_mut().zip(values.iter()) {
                    *a -= v;
                }
            }
            Row::Sparse { indices, values } => {
                for (&j, &v) in indices.iter().zip(values.iter()) {
                    acc[j] -= v;
                }
            }
        }
    }

    /// Write this row into a zero-filled dense buffer
    pub fn write_dense(&self, out: &mut [f64]) {
        out.fill(0.0);
        self.add_to(out);
    }
}

/// Dense dot product with an 8-wide unrolled body so the compiler can
/// vectorize the inner loop
pub(crate) fn dot_unrolled(x: &[f64], y: &[f64]) -> f64 {
    let len = x.len().min(y.len());
    let (x, y) = (&x[..len], &y[..len]);

    let mut acc = [0.0f64; 8];
    let chunks = len / 8;
    for c in 0..chunks {
        let base = c * 8;
        for lane in 0..8 {
            acc[lane] += x[base + lane] * y[base + lane];
        }
    }

    let mut tail = 0.0;
    for j in chunks * 8..len {
        tail += x[j] * y[j];
    }

    acc.iter().sum::<f64>() + tail
}

/// Merge-style dot product of two sorted sparse rows
fn dot_sparse(xi: &[usize], xv: &[f64], yi: &[usize], yv: &[f64]) -> f64 {
    let mut result = 0.0;
    let mut i = 0;
    let mut j = 0;

    while i < xi.len() && j < yi.len() {
        if xi[i] == yi[j] {
            result += xv[i] * yv[j];
            i += 1;
            j += 1;
        } else if xi[i] < yi[j] {
            i += 1;
        } else {
            j += 1;
        }
    }

    result
}
