//! Entity types shared between the store, the services, and the operation
//! handlers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A student record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Student {
    /// Institutional student id, e.g. matriculation number.
    pub student_id: String,
    pub name: String,
    pub email: String,
    pub course: String,
    pub level: String,
    pub phone: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Lifecycle status of a permit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermitStatus {
    Active,
    Revoked,
    Expired,
}

impl PermitStatus {
    /// Convert to database string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Revoked => "revoked",
            Self::Expired => "expired",
        }
    }

    /// Parse from database string.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(Self::Active),
            "revoked" => Some(Self::Revoked),
            "expired" => Some(Self::Expired),
            _ => None,
        }
    }
}

/// A parking/access permit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Permit {
    pub id: String,
    pub student_id: String,
    pub plate: String,
    /// Permit category, e.g. "semester", "annual", "visitor".
    pub kind: String,
    pub status: PermitStatus,
    /// Fee paid for the permit, in the smallest currency unit.
    pub amount_cents: i64,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// One page of a list result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// Total number of matching rows across all pages.
    pub total: u64,
    pub page: u32,
    pub page_size: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn permit_status_roundtrip() {
        for status in [
            PermitStatus::Active,
            PermitStatus::Revoked,
            PermitStatus::Expired,
        ] {
            assert_eq!(PermitStatus::parse(status.as_str()), Some(status));
        }
    }

    #[test]
    fn permit_status_parse_unknown() {
        assert_eq!(PermitStatus::parse("suspended"), None);
        assert_eq!(PermitStatus::parse(""), None);
    }

    #[test]
    fn permit_status_serde_lowercase() {
        let json = serde_json::to_string(&PermitStatus::Active).unwrap();
        assert_eq!(json, "\"active\"");
        let parsed: PermitStatus = serde_json::from_str("\"revoked\"").unwrap();
        assert_eq!(parsed, PermitStatus::Revoked);
    }
}
