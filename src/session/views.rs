//! Registry views and the roles allowed to open them

use super::Role;

/// A navigable view
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct View {
    pub name: &'static str,
    pub path: &'static str,
    /// Empty means public
    pub required_roles: &'static [Role],
}

const SIGNED_IN: &[Role] = &Role::ALL;
const ADMINS: &[Role] = &Role::ADMINS;

/// Route table
pub const VIEWS: &[View] = &[
    View {
        name: "login",
        path: "/login",
        required_roles: &[],
    },
    View {
        name: "dashboard",
        path: "/dashboard",
        required_roles: SIGNED_IN,
    },
    View {
        name: "settings",
        path: "/settings",
        required_roles: SIGNED_IN,
    },
    View {
        name: "notifications",
        path: "/notifications",
        required_roles: SIGNED_IN,
    },
    View {
        name: "regions",
        path: "/regions",
        required_roles: &[Role::SuperAdmin],
    },
    View {
        name: "sectors",
        path: "/sectors",
        required_roles: &[Role::SuperAdmin, Role::RegionAdmin],
    },
    View {
        name: "schools",
        path: "/schools",
        required_roles: &[Role::SuperAdmin, Role::RegionAdmin, Role::SectorAdmin],
    },
    View {
        name: "categories",
        path: "/categories",
        required_roles: &[Role::SuperAdmin],
    },
    View {
        name: "columns",
        path: "/columns",
        required_roles: &[Role::SuperAdmin],
    },
    View {
        name: "users",
        path: "/users",
        required_roles: &[Role::SuperAdmin, Role::RegionAdmin, Role::SectorAdmin],
    },
    View {
        name: "reports",
        path: "/reports",
        required_roles: ADMINS,
    },
    View {
        name: "data-entry",
        path: "/data-entry",
        required_roles: ADMINS,
    },
];

/// Find a view by name or path. Nested paths (`/schools/42`) match their
/// top-level view.
pub fn find(requested: &str) -> Option<&'static View> {
    let trimmed = requested.trim();
    let first_segment = trimmed
        .trim_start_matches('/')
        .split(['/', '?', '#'])
        .next()
        .unwrap_or_default();

    VIEWS
        .iter()
        .find(|v| v.name.eq_ignore_ascii_case(first_segment))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_by_name_and_path() {
        assert_eq!(find("schools").unwrap().path, "/schools");
        assert_eq!(find("/schools/42/edit").unwrap().name, "schools");
        assert_eq!(find("/reports?year=2024").unwrap().name, "reports");
        assert!(find("/nowhere").is_none());
    }

    #[test]
    fn test_login_is_public() {
        assert!(find("/login").unwrap().required_roles.is_empty());
    }

    #[test]
    fn test_every_path_matches_its_name() {
        for view in VIEWS {
            assert_eq!(view.path.trim_start_matches('/'), view.name);
            assert_eq!(find(view.path), Some(view));
        }
    }

    #[test]
    fn test_school_admin_scope() {
        let schools = find("schools").unwrap();
        assert!(!schools.required_roles.contains(&Role::SchoolAdmin));
        assert!(find("data-entry").unwrap().required_roles.contains(&Role::SchoolAdmin));
    }
}
