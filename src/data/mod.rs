//! Data loading and dataset implementations
//!
//! LibSVM files load into CSR tables, CSV files into dense tables. Both
//! implement [`Dataset`](crate::core::Dataset).

pub mod csv;
pub mod libsvm;

pub use self::csv::*;
pub use self::libsvm::*;

use crate::core::Result;
use crate::table::NumericTable;
use std::path::Path;

/// Load a dataset, picking the format from the file extension
///
/// `.csv` files load as CSV (unlabeled when `labeled` is false); anything
/// else is read as LibSVM.
pub fn load_dataset<P: AsRef<Path>>(path: P, labeled: bool) -> Result<(NumericTable, Vec<f64>)> {
    let path = path.as_ref();
    let is_csv = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"));
    if is_csv {
        let dataset = if labeled {
            CSVDataset::from_file(path)?
        } else {
            CSVDataset::from_file_unlabeled(path)?
        };
        Ok(dataset.into_parts())
    } else {
        Ok(LibSVMDataset::from_file(path)?.into_parts())
    }
}
