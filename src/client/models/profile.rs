//! User profile model

use serde::{Deserialize, Serialize};

/// A row of the platform's `profiles` table
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Profile {
    pub id: String,

    #[serde(default)]
    pub email: Option<String>,

    #[serde(default)]
    pub full_name: Option<String>,

    /// Raw role identifier as stored remotely; spelling varies by source
    #[serde(default)]
    pub role: Option<String>,

    #[serde(default)]
    pub region_id: Option<String>,

    #[serde(default)]
    pub sector_id: Option<String>,

    #[serde(default)]
    pub school_id: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profile_tolerates_missing_columns() {
        let profile: Profile = serde_json::from_str(r#"{"id": "u-1"}"#).unwrap();
        assert_eq!(profile.id, "u-1");
        assert!(profile.role.is_none());
        assert!(profile.region_id.is_none());
    }
}
