//! Type definitions

pub mod batch;
pub mod flow;
pub mod process;

pub use batch::*;
pub use flow::*;
pub use process::*;
