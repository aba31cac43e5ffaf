//! Authorization guard for the request boundary.
//!
//! A pure allow/deny decision over a session's resolved permission set.
//! Deny is a normal outcome, not an error; the dispatcher turns it into a
//! `Forbidden` envelope.

use crate::permissions::Permission;
use crate::session::Session;

/// Outcome of an authorization check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny,
}

/// The fixed message returned for every denial. It deliberately does not
/// name the missing permission: the renderer is semi-trusted and must not be
/// able to enumerate the permission vocabulary by probing operations.
pub const FORBIDDEN_MESSAGE: &str = "You are not permitted to perform this action";

/// Decide whether `session` may invoke an operation gated on `required`.
///
/// Public operations (`None`) always pass; otherwise the permission must be
/// a member of the session's set. A session with no permissions denies every
/// gated operation.
pub fn authorize(session: &Session, required: Option<Permission>) -> Decision {
    match required {
        None => Decision::Allow,
        Some(permission) if session.has_permission(permission) => Decision::Allow,
        Some(_) => Decision::Deny,
    }
}
