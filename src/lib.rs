//! compound-table - An in-memory columnar table engine for compound data
//!
//! Rows are records with byte-valued cells, a cached numeric projection per
//! column and a 64-bit flag mask. Flags drive row visibility, selection and
//! hitlists. Derived descriptor columns are computed on a worker pool and
//! integrated back on the table's owning thread.

pub mod analysis;
pub mod cli;
pub mod config;
pub mod descriptor;
pub mod observability;
pub mod sort;
pub mod table;

pub use config::{ConfigError, TableConfig};
pub use table::{CompoundTable, TableError, TableResult};
