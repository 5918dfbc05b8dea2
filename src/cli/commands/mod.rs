//! CLI command implementations.

pub mod adjustment;
pub mod balance;
pub mod drift;
pub mod edge;
pub mod graph;
pub mod init;
pub mod metric;
pub mod node;
pub mod refine;
