//! Registry platform API client

pub mod api;
pub mod jwt;
#[cfg(test)]
pub mod mock;
pub mod models;
pub mod rest;

pub use api::{AuthApi, DataApi};
#[cfg(test)]
pub use mock::MockRegistryClient;
pub use models::{AuthSession, ListQuery, Mutation, Profile, Resource};
pub use rest::RestClient;

/// Registry platform client: authentication plus table access.
///
/// Implemented automatically for anything providing both halves.
pub trait RegistryApi: AuthApi + DataApi {}

impl<T: AuthApi + DataApi + ?Sized> RegistryApi for T {}
