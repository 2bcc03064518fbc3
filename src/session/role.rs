//! Closed set of registry roles
//!
//! Raw role identifiers arrive with different spellings depending on where
//! they were stored. They are parsed once, at the boundary, and everything
//! past that point works with [`Role`].

use std::fmt;
use std::str::FromStr;

use log::warn;
use serde::{Deserialize, Serialize};

/// Normalized role tag, most privileged first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Role {
    #[serde(rename = "superadmin")]
    SuperAdmin,
    RegionAdmin,
    SectorAdmin,
    SchoolAdmin,
    /// Lowest privilege; the fallback when nothing else resolves
    User,
}

impl Role {
    pub const ALL: [Role; 5] = [
        Role::SuperAdmin,
        Role::RegionAdmin,
        Role::SectorAdmin,
        Role::SchoolAdmin,
        Role::User,
    ];

    /// Every administrative role
    pub const ADMINS: [Role; 4] = [
        Role::SuperAdmin,
        Role::RegionAdmin,
        Role::SectorAdmin,
        Role::SchoolAdmin,
    ];

    /// Canonical tag
    pub fn tag(self) -> &'static str {
        match self {
            Role::SuperAdmin => "superadmin",
            Role::RegionAdmin => "region-admin",
            Role::SectorAdmin => "sector-admin",
            Role::SchoolAdmin => "school-admin",
            Role::User => "user",
        }
    }

    /// Human-readable name
    pub fn display_name(self) -> &'static str {
        match self {
            Role::SuperAdmin => "Super administrator",
            Role::RegionAdmin => "Region administrator",
            Role::SectorAdmin => "Sector administrator",
            Role::SchoolAdmin => "School administrator",
            Role::User => "User",
        }
    }

    /// Parse any known spelling. Case, `-`, `_` and spaces are ignored.
    pub fn parse(raw: &str) -> Option<Role> {
        let squashed: String = raw
            .chars()
            .filter(|c| !matches!(c, '-' | '_' | ' '))
            .flat_map(char::to_lowercase)
            .collect();

        match squashed.as_str() {
            "superadmin" | "superadministrator" | "systemadmin" => Some(Role::SuperAdmin),
            "regionadmin" | "regionadministrator" | "regionaladmin" => Some(Role::RegionAdmin),
            "sectoradmin" | "sectoradministrator" => Some(Role::SectorAdmin),
            "schooladmin" | "schooladministrator" => Some(Role::SchoolAdmin),
            "user" | "member" => Some(Role::User),
            _ => None,
        }
    }

    /// Parse with the lowest-privilege fallback. Never guesses upward.
    pub fn normalize(raw: Option<&str>) -> Role {
        match raw.map(str::trim).filter(|r| !r.is_empty()) {
            Some(raw) => Role::parse(raw).unwrap_or_else(|| {
                warn!("Unrecognized role '{}', treating as {}", raw, Role::User);
                Role::User
            }),
            None => {
                warn!("No role information available, treating as {}", Role::User);
                Role::User
            }
        }
    }

    pub fn is_admin(self) -> bool {
        self != Role::User
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Role::parse(s).ok_or_else(|| format!("unknown role '{}'", s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spellings_converge() {
        for raw in [
            "region-admin",
            "region_admin",
            "regionadmin",
            "RegionAdmin",
            "Region Admin",
        ] {
            assert_eq!(Role::parse(raw), Some(Role::RegionAdmin), "{}", raw);
        }
        assert_eq!(Role::parse("super-admin"), Role::parse("superadmin"));
        assert_eq!(Role::parse("SCHOOL_ADMIN"), Some(Role::SchoolAdmin));
    }

    #[test]
    fn test_normalizing_a_tag_is_idempotent() {
        for role in Role::ALL {
            assert_eq!(Role::parse(role.tag()), Some(role));
            assert_eq!(Role::normalize(Some(role.tag())), role);
        }
    }

    #[test]
    fn test_unknown_defaults_to_lowest_privilege() {
        assert_eq!(Role::normalize(None), Role::User);
        assert_eq!(Role::normalize(Some("")), Role::User);
        assert_eq!(Role::normalize(Some("root")), Role::User);
    }

    #[test]
    fn test_bare_admin_is_not_promoted() {
        assert_eq!(Role::parse("admin"), None);
        assert_eq!(Role::normalize(Some("Admin")), Role::User);
    }

    #[test]
    fn test_serde_uses_tags() {
        assert_eq!(
            serde_json::to_string(&Role::RegionAdmin).unwrap(),
            "\"region-admin\""
        );
        assert_eq!(
            serde_json::from_str::<Role>("\"superadmin\"").unwrap(),
            Role::SuperAdmin
        );
    }
}
