//! Registry platform data models
//!
//! Row payloads are owned by the remote platform and stay opaque JSON; only
//! the shapes the data-access layer reasons about are typed here.

mod auth;
mod mutation;
mod profile;
mod resource;

pub use auth::AuthSession;
pub use mutation::Mutation;
pub use profile::Profile;
pub use resource::{ListQuery, Resource};
