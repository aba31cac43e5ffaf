//! Session management for the signed-in administrator.
//!
//! A session carries the actor's identity and the permission set resolved
//! from their roles at sign-in. It is immutable for its lifetime and is
//! replaced wholesale at sign-in/sign-out.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use crate::config::DEFAULT_SESSION_TTL_HOURS;
use crate::database::{Database, SessionRecord};
use crate::error::{PermitDeskError, Result};
use crate::permissions::{permissions_for_roles, Capabilities, Permission, RoleType};

/// The authenticated actor context carried through the request boundary.
#[derive(Debug, Clone)]
pub struct Session {
    pub id: String,
    pub user_id: String,
    pub display_name: String,
    pub roles: Vec<RoleType>,
    /// Permission set resolved at sign-in; never recomputed afterwards.
    pub permissions: BTreeSet<Permission>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    /// Membership test against the resolved permission set.
    pub fn has_permission(&self, permission: Permission) -> bool {
        self.permissions.contains(&permission)
    }

    /// Capability booleans for the renderer.
    pub fn capabilities(&self) -> Capabilities {
        Capabilities::from_permissions(&self.permissions)
    }
}

/// Session manager over the store.
pub struct SessionManager {
    db: Arc<Database>,
    ttl: Duration,
}

impl SessionManager {
    /// Create a new session manager with the default session lifetime.
    pub fn new(db: Arc<Database>) -> Self {
        Self {
            db,
            ttl: Duration::hours(DEFAULT_SESSION_TTL_HOURS),
        }
    }

    /// Override the session lifetime.
    pub fn with_ttl_hours(mut self, hours: i64) -> Self {
        self.ttl = Duration::hours(hours);
        self
    }

    /// Sign a user in: resolve their assigned roles to a permission set and
    /// persist a fresh session. A user with no role assignment gets an empty
    /// permission set, which denies every gated operation.
    pub async fn sign_in(&self, user_id: &str, display_name: &str) -> Result<Session> {
        let roles_csv = self.db.get_user_roles(user_id).await?.unwrap_or_default();
        let role_names: Vec<&str> = roles_csv
            .split(',')
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .collect();

        let roles: Vec<RoleType> = role_names
            .iter()
            .filter_map(|name| RoleType::parse(name))
            .collect();
        let permissions = permissions_for_roles(role_names.iter());

        let now = Utc::now();
        let session = Session {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            display_name: display_name.to_string(),
            roles,
            permissions,
            created_at: now,
            expires_at: now + self.ttl,
        };

        self.db.create_session(&to_record(&session)).await?;

        tracing::info!(
            user_id = %session.user_id,
            session_id = %session.id,
            permissions = session.permissions.len(),
            "User signed in"
        );

        Ok(session)
    }

    /// Get a session by ID. Returns None for unknown or expired sessions.
    pub async fn get(&self, session_id: &str) -> Result<Option<Session>> {
        let record = match self.db.get_session(session_id).await? {
            Some(record) => record,
            None => return Ok(None),
        };

        if record.expires_at <= Utc::now() {
            return Ok(None);
        }

        from_record(record).map(Some)
    }

    /// Delete a session (sign-out).
    pub async fn sign_out(&self, session_id: &str) -> Result<()> {
        self.db.delete_session(session_id).await
    }

    /// Clean up expired sessions. Returns the number of sessions deleted.
    pub async fn cleanup_expired(&self) -> Result<u64> {
        self.db.cleanup_expired_sessions(Utc::now()).await
    }

    /// Replace a user's role assignment. Takes effect at their next sign-in;
    /// existing sessions keep the permission set they were issued with.
    pub async fn assign_roles(
        &self,
        user_id: &str,
        roles: &[RoleType],
        assigned_by: &str,
    ) -> Result<()> {
        let csv = roles
            .iter()
            .map(|r| r.as_str())
            .collect::<Vec<_>>()
            .join(",");
        self.db.set_user_roles(user_id, &csv, assigned_by).await
    }
}

fn to_record(session: &Session) -> SessionRecord {
    SessionRecord {
        id: session.id.clone(),
        user_id: session.user_id.clone(),
        display_name: session.display_name.clone(),
        roles: session
            .roles
            .iter()
            .map(|r| r.as_str())
            .collect::<Vec<_>>()
            .join(","),
        permissions: session
            .permissions
            .iter()
            .map(|p| p.as_str())
            .collect::<Vec<_>>()
            .join(","),
        created_at: session.created_at,
        expires_at: session.expires_at,
    }
}

fn from_record(record: SessionRecord) -> Result<Session> {
    let roles = record
        .roles
        .split(',')
        .filter(|s| !s.is_empty())
        .map(|name| {
            RoleType::parse(name).ok_or_else(|| {
                PermitDeskError::InternalState(format!("Unknown stored role: {}", name))
            })
        })
        .collect::<Result<Vec<_>>>()?;

    // Stored permissions are authoritative: they reflect the table as it was
    // at sign-in, not as it is now.
    let permissions = record
        .permissions
        .split(',')
        .filter(|s| !s.is_empty())
        .map(|name| {
            Permission::parse(name).ok_or_else(|| {
                PermitDeskError::InternalState(format!("Unknown stored permission: {}", name))
            })
        })
        .collect::<Result<BTreeSet<_>>>()?;

    Ok(Session {
        id: record.id,
        user_id: record.user_id,
        display_name: record.display_name,
        roles,
        permissions,
        created_at: record.created_at,
        expires_at: record.expires_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn sign_in_resolves_roles_to_permissions() {
        let db = Arc::new(Database::in_memory().await.unwrap());
        let manager = SessionManager::new(db.clone());

        db.set_user_roles("u-1", "registrar", "u-admin")
            .await
            .unwrap();

        let session = manager.sign_in("u-1", "Funke A.").await.unwrap();
        assert_eq!(session.roles, vec![RoleType::Registrar]);
        assert!(session.has_permission(Permission::ManageStudents));
        assert!(!session.has_permission(Permission::ManageSettings));
    }

    #[tokio::test]
    async fn sign_in_without_roles_yields_empty_permissions() {
        let db = Arc::new(Database::in_memory().await.unwrap());
        let manager = SessionManager::new(db);

        let session = manager.sign_in("u-unassigned", "New Hire").await.unwrap();
        assert!(session.roles.is_empty());
        assert!(session.permissions.is_empty());
        assert!(!session.has_permission(Permission::ViewStudents));
    }

    #[tokio::test]
    async fn get_returns_stored_session() {
        let db = Arc::new(Database::in_memory().await.unwrap());
        let manager = SessionManager::new(db.clone());

        db.set_user_roles("u-1", "admin", "u-root").await.unwrap();
        let session = manager.sign_in("u-1", "Root Admin").await.unwrap();

        let fetched = manager.get(&session.id).await.unwrap().unwrap();
        assert_eq!(fetched.user_id, "u-1");
        assert_eq!(fetched.permissions, session.permissions);
    }

    #[tokio::test]
    async fn expired_session_is_not_returned() {
        let db = Arc::new(Database::in_memory().await.unwrap());
        // Negative TTL: the session is already expired when created.
        let manager = SessionManager::new(db).with_ttl_hours(-1);

        let session = manager.sign_in("u-1", "Ghost").await.unwrap();
        assert!(manager.get(&session.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn sign_out_removes_session() {
        let db = Arc::new(Database::in_memory().await.unwrap());
        let manager = SessionManager::new(db);

        let session = manager.sign_in("u-1", "Leaving").await.unwrap();
        manager.sign_out(&session.id).await.unwrap();
        assert!(manager.get(&session.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn cleanup_removes_only_expired() {
        let db = Arc::new(Database::in_memory().await.unwrap());
        let expired_mgr = SessionManager::new(db.clone()).with_ttl_hours(-1);
        let live_mgr = SessionManager::new(db.clone());

        expired_mgr.sign_in("u-old", "Old").await.unwrap();
        let live = live_mgr.sign_in("u-new", "New").await.unwrap();

        let removed = live_mgr.cleanup_expired().await.unwrap();
        assert_eq!(removed, 1);
        assert!(live_mgr.get(&live.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn role_change_does_not_touch_existing_session() {
        let db = Arc::new(Database::in_memory().await.unwrap());
        let manager = SessionManager::new(db.clone());

        manager
            .assign_roles("u-1", &[RoleType::Viewer], "u-admin")
            .await
            .unwrap();
        let session = manager.sign_in("u-1", "Viewer").await.unwrap();
        assert!(!session.has_permission(Permission::ManageStudents));

        manager
            .assign_roles("u-1", &[RoleType::Admin], "u-admin")
            .await
            .unwrap();

        // Existing session keeps the permission set from sign-in.
        let fetched = manager.get(&session.id).await.unwrap().unwrap();
        assert!(!fetched.has_permission(Permission::ManageStudents));

        // A fresh sign-in picks up the new roles.
        let fresh = manager.sign_in("u-1", "Admin Now").await.unwrap();
        assert!(fresh.has_permission(Permission::ManageStudents));
    }
}
