//! Column analysis: value parsing, type classification and categories
//!
//! Runs after every structural change, in this order:
//! 1. [`TypeAnalyzer`] classifies the column and refreshes the projection
//! 2. [`CategoryIndexer`] rebuilds the category list
//! 3. [`CategoryIndexer::assign_records_to_categories`] writes category indices

pub mod category;
pub mod indexer;
pub mod parse;
pub mod types;

pub use category::{CategoryList, CategoryOrder, MULTIPLE_CATEGORIES};
pub use indexer::CategoryIndexer;
pub use parse::{format_date, NumericToken, ValueParser};
pub use types::TypeAnalyzer;
