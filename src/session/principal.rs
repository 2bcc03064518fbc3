//! Resolved identity of the current session

use log::warn;
use serde::{Deserialize, Serialize};

use super::Role;
use crate::client::Profile;

/// Part of the hierarchy a principal administers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "level", content = "id", rename_all = "lowercase")]
pub enum OrganizationScope {
    None,
    Region(String),
    Sector(String),
    School(String),
}

impl OrganizationScope {
    /// Filter that restricts list queries to this scope
    pub fn filter(&self) -> Option<(&'static str, &str)> {
        match self {
            OrganizationScope::None => None,
            OrganizationScope::Region(id) => Some(("region_id", id.as_str())),
            OrganizationScope::Sector(id) => Some(("sector_id", id.as_str())),
            OrganizationScope::School(id) => Some(("school_id", id.as_str())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Principal {
    pub id: String,
    pub email: Option<String>,
    pub display_name: String,
    /// Role identifier exactly as the platform returned it
    pub raw_role: Option<String>,
    pub role: Role,
    pub scope: OrganizationScope,
}

impl Principal {
    pub fn from_profile(profile: &Profile) -> Self {
        let role = Role::normalize(profile.role.as_deref());

        let region = profile.region_id.clone().map(OrganizationScope::Region);
        let sector = profile.sector_id.clone().map(OrganizationScope::Sector);
        let school = profile.school_id.clone().map(OrganizationScope::School);
        let administered = match role {
            Role::SuperAdmin => Some(OrganizationScope::None),
            Role::RegionAdmin => region.clone(),
            Role::SectorAdmin => sector.clone(),
            Role::SchoolAdmin => school.clone(),
            Role::User => None,
        };

        // An admin role without the id it administers would otherwise be
        // unscoped; it gets the lowest privilege instead
        let (role, scope) = match administered {
            Some(scope) => (role, scope),
            None => {
                if role.is_admin() {
                    warn!(
                        "Profile {} claims {} without a matching organization id, treating as {}",
                        profile.id,
                        role,
                        Role::User
                    );
                }
                let scope = school.or(sector).or(region);
                (Role::User, scope.unwrap_or(OrganizationScope::None))
            }
        };

        let display_name = profile
            .full_name
            .clone()
            .filter(|n| !n.trim().is_empty())
            .or_else(|| profile.email.clone())
            .unwrap_or_else(|| profile.id.clone());

        Self {
            id: profile.id.clone(),
            email: profile.email.clone(),
            display_name,
            raw_role: profile.role.clone(),
            role,
            scope,
        }
    }
}
