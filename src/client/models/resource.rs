//! Registry resources and list queries

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A resource family exposed by the registry platform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Resource {
    Regions,
    Sectors,
    Schools,
    Users,
    Categories,
    Columns,
    Notifications,
    Reports,
}

impl Resource {
    pub const ALL: [Resource; 8] = [
        Resource::Regions,
        Resource::Sectors,
        Resource::Schools,
        Resource::Users,
        Resource::Categories,
        Resource::Columns,
        Resource::Notifications,
        Resource::Reports,
    ];

    /// Name used on the command line and as the cache key prefix
    pub fn name(self) -> &'static str {
        match self {
            Resource::Regions => "regions",
            Resource::Sectors => "sectors",
            Resource::Schools => "schools",
            Resource::Users => "users",
            Resource::Categories => "categories",
            Resource::Columns => "columns",
            Resource::Notifications => "notifications",
            Resource::Reports => "reports",
        }
    }

    /// Backing table on the platform
    pub fn table(self) -> &'static str {
        match self {
            Resource::Users => "profiles",
            other => other.name(),
        }
    }

    /// Hierarchy columns rows of this resource can be filtered by
    pub fn scope_columns(self) -> &'static [&'static str] {
        match self {
            Resource::Sectors => &["region_id"],
            Resource::Schools => &["region_id", "sector_id"],
            Resource::Users => &["region_id", "sector_id", "school_id"],
            _ => &[],
        }
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Resource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        Resource::ALL
            .into_iter()
            .find(|r| r.name() == lower || r.table() == lower)
            .ok_or_else(|| {
                let names: Vec<&str> = Resource::ALL.iter().map(|r| r.name()).collect();
                format!("unknown resource '{}' (expected one of: {})", s, names.join(", "))
            })
    }
}

/// Equality filters and a row limit for a list call
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListQuery {
    pub filters: Vec<(String, String)>,
    pub limit: Option<usize>,
}

impl ListQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(mut self, column: impl Into<String>, value: impl Into<String>) -> Self {
        self.filters.push((column.into(), value.into()));
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Parameters identifying this query for cache keys
    pub fn cache_params(&self) -> Vec<(String, String)> {
        let mut params = self.filters.clone();
        if let Some(limit) = self.limit {
            params.push(("limit".to_string(), limit.to_string()));
        }
        params
    }
}
