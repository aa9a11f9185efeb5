//! SVM solver building blocks
//!
//! The training loop in [`crate::optimizer`] decomposes the dual problem:
//! [`workset`] picks the variables to optimize next and [`smo`] solves the
//! reduced problem over them.

pub mod smo;
pub mod workset;

pub use self::smo::*;
pub use self::workset::*;
