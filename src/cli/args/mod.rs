//! Shared CLI argument types

mod common;
mod global;

pub use common::{OutputFormat, WriteArgs};
pub use global::GlobalOptions;
