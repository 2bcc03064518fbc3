//! Cache key generation using SHA-256 hashes

use std::fmt;

use sha2::{Digest, Sha256};

/// Deterministic key for one logical query against one resource.
///
/// Rendered as `<resource>:<hex digest>`. The resource prefix is what coarse
/// invalidation after a write matches on; the digest covers the sorted
/// query parameters so parameter order never changes the key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    resource: String,
    digest: String,
}

impl CacheKey {
    /// Build a key from a resource name and its query parameters.
    pub fn new(resource: &str, params: &[(&str, &str)]) -> Self {
        let mut hasher = Sha256::new();

        hasher.update(resource.as_bytes());
        hasher.update(b"|");

        // Sort by name then value so repeated names stay deterministic too
        let mut sorted_params: Vec<_> = params.iter().collect();
        sorted_params.sort();

        for (k, v) in sorted_params {
            hasher.update(k.as_bytes());
            hasher.update(b"=");
            hasher.update(v.as_bytes());
            hasher.update(b"&");
        }

        Self {
            resource: resource.to_string(),
            digest: format!("{:x}", hasher.finalize()),
        }
    }

    /// Resource family this key belongs to
    pub fn resource(&self) -> &str {
        &self.resource
    }

    /// Parse a rendered key back (used when hydrating persisted entries)
    pub fn parse(raw: &str) -> Option<Self> {
        let (resource, digest) = raw.split_once(':')?;
        if resource.is_empty() || digest.len() != 64 {
            return None;
        }
        Some(Self {
            resource: resource.to_string(),
            digest: digest.to_string(),
        })
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.resource, self.digest)
    }
}
