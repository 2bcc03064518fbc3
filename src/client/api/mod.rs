//! API trait definitions split by responsibility
//!
//! - [`AuthApi`] - Session and profile operations
//! - [`DataApi`] - Row reads and writes against registry tables
//!
//! The [`RegistryApi`](super::RegistryApi) super-trait combines both.

mod auth;
mod data;

pub use auth::AuthApi;
pub use data::DataApi;
