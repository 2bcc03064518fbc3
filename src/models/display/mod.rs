//! Display model implementations for table and JSON output
//!
//! Display models turn domain types into CLI-friendly rows with
//! appropriate column names and serialization.

mod access;
mod common;
mod queue;

pub use access::AccessDisplay;
pub use queue::QueuedOperationDisplay;
