pub mod adapter;
pub mod data_core;
pub mod export;
pub mod format;
pub mod graph;
pub mod performance;
pub mod search;
pub mod timeline;
pub mod tree_index;
pub mod view_filter;
