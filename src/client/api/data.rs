//! Data API trait for table reads and writes

use async_trait::async_trait;
use serde_json::Value;

use crate::client::models::{ListQuery, Mutation, Resource};
use crate::error::Result;

/// Row operations against registry tables.
///
/// Rows are opaque JSON objects; their shape belongs to the platform.
#[async_trait]
pub trait DataApi: Send + Sync {
    /// List rows matching `query`
    async fn list(&self, resource: Resource, query: &ListQuery) -> Result<Vec<Value>>;

    /// Fetch one row by id
    async fn get(&self, resource: Resource, id: &str) -> Result<Value>;

    /// Apply a write, returning the affected row (or `null` for deletes)
    async fn mutate(&self, mutation: &Mutation) -> Result<Value>;
}
