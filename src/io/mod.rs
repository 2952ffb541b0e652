//! On-disk debug output.

pub mod edge_log;

pub use edge_log::{read_edges, write_comm_stats, write_edges};
