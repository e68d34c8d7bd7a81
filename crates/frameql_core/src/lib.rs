//! Typed columnar data model and the operations over it.
//!
//! Values are grouped into homogeneous [`series::Series`] and into
//! [`dataframe::DataFrame`]s of schema-bound [`row::Row`]s. Every operation
//! is pure and returns a new collection.
pub mod dataframe;
pub mod display;
pub mod format;
pub mod grouped;
pub mod join;
pub mod row;
pub mod scalar;
pub mod schema;
pub mod series;
pub mod sort;
pub mod value;

pub mod testutil;
