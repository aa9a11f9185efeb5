//! Numeric tables with dense or CSR storage
//!
//! Every algorithm in the crate reads its input through [`NumericTable`]:
//! whole rows via [`NumericTable::row`], contiguous row ranges via
//! [`NumericTable::block_of_rows`] and single columns via
//! [`NumericTable::block_of_column_values`]. Blocks borrow the table, so a
//! block can never outlive the data it points into.

pub mod row;

pub use self::row::Row;

use crate::core::{DalError, Result, SparseVector};

/// Storage layout of a numeric table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    Dense,
    Csr,
}

/// Row-major dense storage
#[derive(Debug, Clone, PartialEq)]
pub struct DenseTable {
    n_rows: usize,
    n_columns: usize,
    data: Vec<f64>,
}

/// Compressed sparse row storage with zero-based column indices
#[derive(Debug, Clone, PartialEq)]
pub struct CsrTable {
    n_rows: usize,
    n_columns: usize,
    values: Vec<f64>,
    column_indices: Vec<usize>,
    row_offsets: Vec<usize>,
}

/// A numeric table, resolved once per call into its storage kind
#[derive(Debug, Clone, PartialEq)]
pub enum NumericTable {
    Dense(DenseTable),
    Csr(CsrTable),
}

impl NumericTable {
    /// Create a dense table from row-major values
    pub fn from_dense(n_rows: usize, n_columns: usize, data: Vec<f64>) -> Result<Self> {
        if data.len() != n_rows * n_columns {
            return Err(DalError::DimensionMismatch {
                expected: n_rows * n_columns,
                actual: data.len(),
            });
        }
        Ok(NumericTable::Dense(DenseTable {
            n_rows,
            n_columns,
            data,
        }))
    }

    /// Create a dense table from a list of equally sized rows
    pub fn from_rows(rows: &[Vec<f64>]) -> Result<Self> {
        let n_columns = rows.first().map(|r| r.len()).unwrap_or(0);
        let mut data = Vec::with_capacity(rows.len() * n_columns);
        for row in rows {
            if row.len() != n_columns {
                return Err(DalError::DimensionMismatch {
                    expected: n_columns,
                    actual: row.len(),
                });
            }
            data.extend_from_slice(row);
        }
        Self::from_dense(rows.len(), n_columns, data)
    }

    /// Create a CSR table from its three arrays
    ///
    /// `row_offsets` has `n_rows + 1` entries, column indices are zero-based
    /// and sorted within each row.
    pub fn from_csr(
        n_rows: usize,
        n_columns: usize,
        values: Vec<f64>,
        column_indices: Vec<usize>,
        row_offsets: Vec<usize>,
    ) -> Result<Self> {
        if row_offsets.len() != n_rows + 1 {
            return Err(DalError::DimensionMismatch {
                expected: n_rows + 1,
                actual: row_offsets.len(),
            });
        }
        if values.len() != column_indices.len() {
            return Err(DalError::DimensionMismatch {
                expected: values.len(),
                actual: column_indices.len(),
            });
        }
        if row_offsets[0] != 0 || row_offsets[n_rows] != values.len() {
            return Err(DalError::InvalidDataset(
                "CSR row offsets must start at 0 and end at nnz".to_string(),
            ));
        }
        if let Some(i) = row_offsets.windows(2).position(|w| w[0] > w[1]) {
            return Err(DalError::InvalidDataset(format!(
                "CSR row offsets decrease at row {i}"
            )));
        }
        for i in 0..n_rows {
            let (start, end) = (row_offsets[i], row_offsets[i + 1]);
            let cols = &column_indices[start..end];
            if cols.windows(2).any(|w| w[0] >= w[1]) {
                return Err(DalError::InvalidDataset(format!(
                    "CSR column indices of row {i} are not strictly increasing"
                )));
            }
            if let Some(&last) = cols.last() {
                if last >= n_columns {
                    return Err(DalError::InvalidDataset(format!(
                        "CSR column index {last} out of range for {n_columns} columns"
                    )));
                }
            }
        }
        Ok(NumericTable::Csr(CsrTable {
            n_rows,
            n_columns,
            values,
            column_indices,
            row_offsets,
        }))
    }

    /// Create a CSR table from sparse vectors
    pub fn from_sparse_rows(rows: &[SparseVector], n_columns: usize) -> Result<Self> {
        let nnz = rows.iter().map(|r| r.nnz()).sum();
        let mut values = Vec::with_capacity(nnz);
        let mut column_indices = Vec::with_capacity(nnz);
        let mut row_offsets = Vec::with_capacity(rows.len() + 1);
        row_offsets.push(0);

        for row in rows {
            values.extend_from_slice(&row.values);
            column_indices.extend_from_slice(&row.indices);
            row_offsets.push(values.len());
        }

        Self::from_csr(rows.len(), n_columns, values, column_indices, row_offsets)
    }

    /// Number of rows
    pub fn n_rows(&self) -> usize {
        match self {
            NumericTable::Dense(t) => t.n_rows,
            NumericTable::Csr(t) => t.n_rows,
        }
    }

    /// Number of columns (features)
    pub fn n_columns(&self) -> usize {
        match self {
            NumericTable::Dense(t) => t.n_columns,
            NumericTable::Csr(t) => t.n_columns,
        }
    }

    /// Storage layout
    pub fn layout(&self) -> Layout {
        match self {
            NumericTable::Dense(_) => Layout::Dense,
            NumericTable::Csr(_) => Layout::Csr,
        }
    }

    /// Check if the table has no rows
    pub fn is_empty(&self) -> bool {
        self.n_rows() == 0
    }

    /// Borrow row `i`
    ///
    /// # Panics
    /// Panics if `i >= n_rows()`
    pub fn row(&self, i: usize) -> Row<'_> {
        match self {
            NumericTable::Dense(t) => {
                let start = i * t.n_columns;
                Row::Dense(&t.data[start..start + t.n_columns])
            }
            NumericTable::Csr(t) => {
                let (start, end) = (t.row_offsets[i], t.row_offsets[i + 1]);
                Row::Sparse {
                    indices: &t.column_indices[start..end],
                    values: &t.values[start..end],
                }
            }
        }
    }

    /// Row-major dense values, when the table is dense
    pub fn dense_values(&self) -> Option<&[f64]> {
        match self {
            NumericTable::Dense(t) => Some(&t.data),
            NumericTable::Csr(_) => None,
        }
    }

    /// Borrow a contiguous range of rows
    pub fn block_of_rows(&self, start_row: usize, n_rows: usize) -> Result<RowBlock<'_>> {
        if start_row + n_rows > self.n_rows() {
            return Err(DalError::InvalidParameter(format!(
                "Row block [{start_row}, {}) exceeds {} rows",
                start_row + n_rows,
                self.n_rows()
            )));
        }
        Ok(RowBlock {
            table: self,
            start_row,
            n_rows,
        })
    }

    /// Borrow the whole table as a single block
    pub fn as_block(&self) -> RowBlock<'_> {
        RowBlock {
            table: self,
            start_row: 0,
            n_rows: self.n_rows(),
        }
    }

    /// Split the table into consecutive blocks of at most `block_size` rows
    pub fn split_rows(&self, block_size: usize) -> Result<Vec<RowBlock<'_>>> {
        if block_size == 0 {
            return Err(DalError::InvalidParameter(
                "Block size must be positive".to_string(),
            ));
        }
        let n = self.n_rows();
        (0..n)
            .step_by(block_size)
            .map(|start| self.block_of_rows(start, block_size.min(n - start)))
            .collect()
    }

    /// Copy the values of one column for a range of rows
    pub fn block_of_column_values(
        &self,
        column: usize,
        start_row: usize,
        n_rows: usize,
    ) -> Result<Vec<f64>> {
        if column >= self.n_columns() {
            return Err(DalError::InvalidParameter(format!(
                "Column {column} out of range for {} columns",
                self.n_columns()
            )));
        }
        let block = self.block_of_rows(start_row, n_rows)?;
        Ok(block
            .rows()
            .map(|row| match row {
                Row::Dense(values) => values[column],
                Row::Sparse { indices, values } => match indices.binary_search(&column) {
                    Ok(pos) => values[pos],
                    Err(_) => 0.0,
                },
            })
            .collect())
    }

    /// Squared L2 norm of every row
    pub fn row_norms_squared(&self) -> Vec<f64> {
        (0..self.n_rows())
            .map(|i| self.row(i).norm_squared())
            .collect()
    }

    /// Gather the given rows, in order, into a new table of the same layout
    pub fn gather_rows(&self, indices: &[usize]) -> Result<NumericTable> {
        let n = self.n_rows();
        if let Some(&bad) = indices.iter().find(|&&i| i >= n) {
            return Err(DalError::InvalidParameter(format!(
                "Row index {bad} out of range for {n} rows"
            )));
        }

        match self {
            NumericTable::Dense(t) => {
                let mut data = Vec::with_capacity(indices.len() * t.n_columns);
                for &i in indices {
                    data.extend_from_slice(&t.data[i * t.n_columns..(i + 1) * t.n_columns]);
                }
                Self::from_dense(indices.len(), t.n_columns, data)
            }
            NumericTable::Csr(t) => {
                let mut values = Vec::new();
                let mut column_indices = Vec::new();
                let mut row_offsets = Vec::with_capacity(indices.len() + 1);
                row_offsets.push(0);
                for &i in indices {
                    let (start, end) = (t.row_offsets[i], t.row_offsets[i + 1]);
                    values.extend_from_slice(&t.values[start..end]);
                    column_indices.extend_from_slice(&t.column_indices[start..end]);
                    row_offsets.push(values.len());
                }
                Self::from_csr(
                    indices.len(),
                    t.n_columns,
                    values,
                    column_indices,
                    row_offsets,
                )
            }
        }
    }

    /// Convert to a dense table
    pub fn to_dense(&self) -> NumericTable {
        match self {
            NumericTable::Dense(_) => self.clone(),
            NumericTable::Csr(t) => {
                let mut data = vec![0.0; t.n_rows * t.n_columns];
                for (i, chunk) in data.chunks_mut(t.n_columns.max(1)).enumerate() {
                    if i < t.n_rows {
                        self.row(i).write_dense(chunk);
                    }
                }
                NumericTable::Dense(DenseTable {
                    n_rows: t.n_rows,
                    n_columns: t.n_columns,
                    data,
                })
            }
        }
    }
}

/// A borrowed range of consecutive rows
#[derive(Debug, Clone, Copy)]
pub struct RowBlock<'a> {
    table: &'a NumericTable,
    start_row: usize,
    n_rows: usize,
}

impl<'a> RowBlock<'a> {
    /// Index of the first row in the parent table
    pub fn start_row(&self) -> usize {
        self.start_row
    }

    /// Number of rows in the block
    pub fn n_rows(&self) -> usize {
        self.n_rows
    }

    /// Number of columns
    pub fn n_columns(&self) -> usize {
        self.table.n_columns()
    }

    /// Storage layout of the parent table
    pub fn layout(&self) -> Layout {
        self.table.layout()
    }

    /// Row `i` of the block (relative to the block start)
    pub fn row(&self, i: usize) -> Row<'a> {
        debug_assert!(i < self.n_rows);
        self.table.row(self.start_row + i)
    }

    /// Iterate over the rows of the block
    pub fn rows(&self) -> impl Iterator<Item = Row<'a>> + 'a {
        let block = *self;
        (0..block.n_rows).map(move |i| block.row(i))
    }

    /// Dense row-major values of the block, when the parent is dense
    pub fn dense_values(&self) -> Option<&'a [f64]> {
        let n_columns = self.n_columns();
        self.table.dense_values().map(|data| {
            &data[self.start_row * n_columns..(self.start_row + self.n_rows) * n_columns]
        })
    }
}
