pub mod analyzer;
pub mod filter;
pub mod merge;

pub use analyzer::analyze_all;
pub use filter::{filter_actionable, group_by_best_source};
pub use merge::{merge_tables, single_source_props};
