//! Database queries

pub mod batch;
pub mod flow;
pub mod process;
