//! Local cache for API responses
//!
//! Bounded in-memory store with per-entry TTL, optionally written through to
//! the durable store so a later run starts warm. Reads go through
//! [`ResponseCache::query_with_cache`], which serves stale-while-revalidate.

pub mod key;
mod query;
pub mod response;

use std::time::Duration;

use crate::client::Resource;

/// Cache TTL configuration per resource
///
/// The configured default applies to anything not listed here.
pub struct CacheTtl;

impl CacheTtl {
    // Hierarchy changes rarely
    pub const REGIONS: Duration = Duration::from_secs(30 * 60); // 30 min
    pub const SECTORS: Duration = Duration::from_secs(15 * 60); // 15 min

    // Form definitions are edited by superadmins only
    pub const CATEGORIES: Duration = Duration::from_secs(10 * 60); // 10 min
    pub const COLUMNS: Duration = Duration::from_secs(10 * 60); // 10 min

    // Notifications should feel live
    pub const NOTIFICATIONS: Duration = Duration::from_secs(30); // 30 sec

    /// TTL for `resource`, falling back to `default`
    pub fn for_resource(resource: Resource, default: Duration) -> Duration {
        match resource {
            Resource::Regions => Self::REGIONS,
            Resource::Sectors => Self::SECTORS,
            Resource::Categories => Self::CATEGORIES,
            Resource::Columns => Self::COLUMNS,
            Resource::Notifications => Self::NOTIFICATIONS,
            Resource::Schools | Resource::Users | Resource::Reports => default,
        }
    }
}

pub use key::CacheKey;
pub use response::{CacheStats, ResponseCache, RevalidationFailure};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ttl_falls_back_to_default() {
        let default = Duration::from_secs(300);
        assert_eq!(CacheTtl::for_resource(Resource::Schools, default), default);
        assert_eq!(
            CacheTtl::for_resource(Resource::Regions, default),
            CacheTtl::REGIONS
        );
        assert!(CacheTtl::for_resource(Resource::Notifications, default) < default);
    }
}
