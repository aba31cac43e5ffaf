//! Permission vocabulary and role table.
//!
//! Permissions are flat, opaque tokens from a closed vocabulary; a role is a
//! named bundle of them. A session's permission set is the union over its
//! roles, computed once at sign-in. The renderer derives its capability
//! booleans from the same vocabulary, so the two sides cannot drift.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// All permissions in the system. Membership-tested only, no hierarchy.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    ViewReports,
    ManageStudents,
    ViewStudents,
    CreatePermits,
    RevokePermits,
    ViewPermits,
    ManageSettings,
}

impl Permission {
    /// Convert to storage string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ViewReports => "view_reports",
            Self::ManageStudents => "manage_students",
            Self::ViewStudents => "view_students",
            Self::CreatePermits => "create_permits",
            Self::RevokePermits => "revoke_permits",
            Self::ViewPermits => "view_permits",
            Self::ManageSettings => "manage_settings",
        }
    }

    /// Parse from storage string.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "view_reports" => Some(Self::ViewReports),
            "manage_students" => Some(Self::ManageStudents),
            "view_students" => Some(Self::ViewStudents),
            "create_permits" => Some(Self::CreatePermits),
            "revoke_permits" => Some(Self::RevokePermits),
            "view_permits" => Some(Self::ViewPermits),
            "manage_settings" => Some(Self::ManageSettings),
            _ => None,
        }
    }
}

/// Named role bundles assignable to an actor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoleType {
    Admin,
    Registrar,
    Attendant,
    Viewer,
}

impl RoleType {
    /// Convert to storage string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Registrar => "registrar",
            Self::Attendant => "attendant",
            Self::Viewer => "viewer",
        }
    }

    /// Parse from storage string.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "admin" => Some(Self::Admin),
            "registrar" => Some(Self::Registrar),
            "attendant" => Some(Self::Attendant),
            "viewer" => Some(Self::Viewer),
            _ => None,
        }
    }

    /// The permission bundle this role grants.
    pub fn permissions(&self) -> &'static [Permission] {
        match self {
            Self::Admin => &[
                Permission::ViewReports,
                Permission::ManageStudents,
                Permission::ViewStudents,
                Permission::CreatePermits,
                Permission::RevokePermits,
                Permission::ViewPermits,
                Permission::ManageSettings,
            ],
            Self::Registrar => &[
                Permission::ViewReports,
                Permission::ManageStudents,
                Permission::ViewStudents,
                Permission::ViewPermits,
            ],
            Self::Attendant => &[
                Permission::ViewStudents,
                Permission::CreatePermits,
                Permission::RevokePermits,
                Permission::ViewPermits,
            ],
            Self::Viewer => &[
                Permission::ViewReports,
                Permission::ViewStudents,
                Permission::ViewPermits,
            ],
        }
    }
}

/// Union of permissions over a set of role names.
///
/// Unknown role names contribute nothing: an unrecognized role grants no
/// access rather than failing the whole resolution.
pub fn permissions_for_roles<I, S>(roles: I) -> BTreeSet<Permission>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut set = BTreeSet::new();
    for name in roles {
        if let Some(role) = RoleType::parse(name.as_ref()) {
            set.extend(role.permissions().iter().copied());
        }
    }
    set
}

/// Renderer-side capability booleans, derived from a permission set.
///
/// View components consult these to decide what to render or enable. They are
/// generated from the same vocabulary the guard checks against.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Capabilities {
    pub can_view_reports: bool,
    pub can_manage_students: bool,
    pub can_view_students: bool,
    pub can_create_permits: bool,
    pub can_revoke_permits: bool,
    pub can_view_permits: bool,
    pub can_manage_settings: bool,
}

impl Capabilities {
    /// Derive capability booleans from a resolved permission set.
    pub fn from_permissions(permissions: &BTreeSet<Permission>) -> Self {
        Self {
            can_view_reports: permissions.contains(&Permission::ViewReports),
            can_manage_students: permissions.contains(&Permission::ManageStudents),
            can_view_students: permissions.contains(&Permission::ViewStudents),
            can_create_permits: permissions.contains(&Permission::CreatePermits),
            can_revoke_permits: permissions.contains(&Permission::RevokePermits),
            can_view_permits: permissions.contains(&Permission::ViewPermits),
            can_manage_settings: permissions.contains(&Permission::ManageSettings),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn permission_roundtrip() {
        for p in [
            Permission::ViewReports,
            Permission::ManageStudents,
            Permission::ViewStudents,
            Permission::CreatePermits,
            Permission::RevokePermits,
            Permission::ViewPermits,
            Permission::ManageSettings,
        ] {
            assert_eq!(Permission::parse(p.as_str()), Some(p));
        }
        assert_eq!(Permission::parse("delete_everything"), None);
    }

    #[test]
    fn role_type_roundtrip() {
        assert_eq!(RoleType::parse("admin"), Some(RoleType::Admin));
        assert_eq!(RoleType::parse("Registrar"), Some(RoleType::Registrar));
        assert_eq!(RoleType::parse("attendant"), Some(RoleType::Attendant));
        assert_eq!(RoleType::parse("viewer"), Some(RoleType::Viewer));
        assert_eq!(RoleType::parse("janitor"), None);
    }

    #[test]
    fn admin_has_every_permission() {
        let perms = permissions_for_roles(["admin"]);
        assert!(perms.contains(&Permission::ManageStudents));
        assert!(perms.contains(&Permission::ManageSettings));
        assert!(perms.contains(&Permission::RevokePermits));
        assert_eq!(perms.len(), 7);
    }

    #[test]
    fn viewer_is_read_only() {
        let perms = permissions_for_roles(["viewer"]);
        assert!(perms.contains(&Permission::ViewStudents));
        assert!(perms.contains(&Permission::ViewReports));
        assert!(!perms.contains(&Permission::ManageStudents));
        assert!(!perms.contains(&Permission::CreatePermits));
        assert!(!perms.contains(&Permission::ManageSettings));
    }

    #[test]
    fn unknown_roles_grant_nothing() {
        let perms = permissions_for_roles(["janitor", "superuser"]);
        assert!(perms.is_empty());
    }

    #[test]
    fn union_over_multiple_roles() {
        let perms = permissions_for_roles(["registrar", "attendant"]);
        // From registrar
        assert!(perms.contains(&Permission::ManageStudents));
        assert!(perms.contains(&Permission::ViewReports));
        // From attendant
        assert!(perms.contains(&Permission::CreatePermits));
        assert!(perms.contains(&Permission::RevokePermits));
        // From neither
        assert!(!perms.contains(&Permission::ManageSettings));
    }

    #[test]
    fn unknown_role_does_not_poison_union() {
        let with_unknown = permissions_for_roles(["viewer", "janitor"]);
        let without = permissions_for_roles(["viewer"]);
        assert_eq!(with_unknown, without);
    }

    #[test]
    fn capabilities_mirror_permissions() {
        let perms = permissions_for_roles(["attendant"]);
        let caps = Capabilities::from_permissions(&perms);
        assert!(caps.can_create_permits);
        assert!(caps.can_revoke_permits);
        assert!(caps.can_view_students);
        assert!(!caps.can_manage_students);
        assert!(!caps.can_view_reports);
        assert!(!caps.can_manage_settings);
    }
}

#[cfg(test)]
mod property_tests {
    use super::*;
    use proptest::prelude::*;

    fn arb_role_name() -> impl Strategy<Value = String> {
        prop_oneof![
            Just("admin".to_string()),
            Just("registrar".to_string()),
            Just("attendant".to_string()),
            Just("viewer".to_string()),
            "[a-z]{3,12}",
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        /// Adding a role to a set never removes a permission.
        #[test]
        fn prop_union_is_monotonic(
            base in prop::collection::vec(arb_role_name(), 0..4),
            extra in arb_role_name(),
        ) {
            let before = permissions_for_roles(base.iter());
            let mut extended = base.clone();
            extended.push(extra);
            let after = permissions_for_roles(extended.iter());
            prop_assert!(before.is_subset(&after));
        }

        /// Role order never changes the resolved set.
        #[test]
        fn prop_union_is_order_independent(
            mut roles in prop::collection::vec(arb_role_name(), 0..5),
        ) {
            let forward = permissions_for_roles(roles.iter());
            roles.reverse();
            let backward = permissions_for_roles(roles.iter());
            prop_assert_eq!(forward, backward);
        }

        /// Every capability boolean agrees with set membership.
        #[test]
        fn prop_capabilities_agree_with_membership(
            roles in prop::collection::vec(arb_role_name(), 0..4),
        ) {
            let perms = permissions_for_roles(roles.iter());
            let caps = Capabilities::from_permissions(&perms);
            prop_assert_eq!(caps.can_view_reports, perms.contains(&Permission::ViewReports));
            prop_assert_eq!(caps.can_manage_students, perms.contains(&Permission::ManageStudents));
            prop_assert_eq!(caps.can_view_students, perms.contains(&Permission::ViewStudents));
            prop_assert_eq!(caps.can_create_permits, perms.contains(&Permission::CreatePermits));
            prop_assert_eq!(caps.can_revoke_permits, perms.contains(&Permission::RevokePermits));
            prop_assert_eq!(caps.can_view_permits, perms.contains(&Permission::ViewPermits));
            prop_assert_eq!(caps.can_manage_settings, perms.contains(&Permission::ManageSettings));
        }
    }
}
