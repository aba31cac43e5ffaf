//! Dashboard statistics aggregation.
//!
//! Computes an ephemeral snapshot from the store on every call: nothing is
//! cached, and the expiring-soon window is evaluated against the timestamp
//! passed in. The computation is all-or-nothing: any sub-query failure
//! aborts the snapshot and surfaces as a single error.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::config::DEFAULT_EXPIRY_HORIZON_DAYS;
use crate::database::Database;
use crate::error::Result;
use crate::models::PermitStatus;

/// Per-status figures in a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusFigures {
    pub count: u64,
    pub amount_cents: i64,
}

/// Derived, non-persisted aggregate over students and permits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatisticsSnapshot {
    pub total_students: u64,
    /// Count of permits currently in status `active`.
    pub active_permits: u64,
    /// Active permits expiring within the horizon, window `(now, now + horizon]`.
    pub expiring_soon: u64,
    /// Sum of amounts across all statuses: a cumulative lifetime figure,
    /// not a current-liability figure.
    pub total_revenue_cents: i64,
    pub by_status: HashMap<String, StatusFigures>,
    pub computed_at: DateTime<Utc>,
}

/// Computes dashboard statistics from the store.
pub struct StatsEngine {
    db: Arc<Database>,
    horizon: Duration,
}

impl StatsEngine {
    /// Create an engine with the default 7-day expiring-soon horizon.
    pub fn new(db: Arc<Database>) -> Self {
        Self {
            db,
            horizon: Duration::days(DEFAULT_EXPIRY_HORIZON_DAYS),
        }
    }

    /// Override the expiring-soon horizon.
    pub fn with_horizon_days(mut self, days: i64) -> Self {
        self.horizon = Duration::days(days);
        self
    }

    /// Compute a snapshot as of `now`.
    ///
    /// Two calls a moment apart may legitimately disagree on the
    /// expiring-soon figure; the count fields are stable absent mutation.
    pub async fn compute_statistics(&self, now: DateTime<Utc>) -> Result<StatisticsSnapshot> {
        let totals = self.db.permit_totals_by_status().await?;
        let total_students = self.db.count_students().await?;
        let expiring_soon = self
            .db
            .count_active_permits_expiring(now, now + self.horizon)
            .await?;

        // Absent statuses count as zero rather than failing.
        let active_permits = totals
            .get(PermitStatus::Active.as_str())
            .map(|t| t.count)
            .unwrap_or(0);

        let total_revenue_cents: i64 = totals.values().map(|t| t.amount_cents).sum();

        let by_status = totals
            .into_iter()
            .map(|(status, t)| {
                (
                    status,
                    StatusFigures {
                        count: t.count as u64,
                        amount_cents: t.amount_cents,
                    },
                )
            })
            .collect();

        Ok(StatisticsSnapshot {
            total_students: total_students as u64,
            active_permits: active_permits as u64,
            expiring_soon: expiring_soon as u64,
            total_revenue_cents,
            by_status,
            computed_at: now,
        })
    }
}

#[cfg(test)]
mod tests {
    use chrono::Timelike;

    use super::*;
    use crate::models::{Permit, Student};

    async fn seed_student(db: &Database, id: &str) {
        db.create_student(&Student {
            student_id: id.to_string(),
            name: format!("Student {}", id),
            email: format!("{}@campus.edu", id),
            course: "Engineering".to_string(),
            level: "200".to_string(),
            phone: None,
            created_at: Utc::now(),
        })
        .await
        .unwrap();
    }

    async fn seed_permit(
        db: &Database,
        id: &str,
        status: PermitStatus,
        amount_cents: i64,
        expires_at: DateTime<Utc>,
    ) {
        db.create_permit(&Permit {
            id: id.to_string(),
            student_id: "STU-1".to_string(),
            plate: format!("PLT-{}", id),
            kind: "semester".to_string(),
            status,
            amount_cents,
            issued_at: Utc::now(),
            expires_at,
        })
        .await
        .unwrap();
    }

    fn whole_second_now() -> DateTime<Utc> {
        Utc::now().with_nanosecond(0).expect("whole seconds")
    }

    #[tokio::test]
    async fn revenue_sums_across_all_statuses() {
        let db = Arc::new(Database::in_memory().await.unwrap());
        let now = whole_second_now();
        let far = now + Duration::days(90);

        seed_permit(&db, "P-1", PermitStatus::Active, 100, far).await;
        seed_permit(&db, "P-2", PermitStatus::Revoked, 50, far).await;
        seed_permit(&db, "P-3", PermitStatus::Expired, 25, far).await;

        let engine = StatsEngine::new(db);
        let snapshot = engine.compute_statistics(now).await.unwrap();

        assert_eq!(snapshot.total_revenue_cents, 175);
        assert_eq!(snapshot.active_permits, 1);
    }

    #[tokio::test]
    async fn active_permits_zero_when_status_absent() {
        let db = Arc::new(Database::in_memory().await.unwrap());
        let now = whole_second_now();
        seed_permit(&db, "P-1", PermitStatus::Revoked, 50, now + Duration::days(30)).await;

        let engine = StatsEngine::new(db);
        let snapshot = engine.compute_statistics(now).await.unwrap();

        assert_eq!(snapshot.active_permits, 0);
        assert_eq!(snapshot.total_revenue_cents, 50);
    }

    #[tokio::test]
    async fn empty_store_yields_zero_snapshot() {
        let db = Arc::new(Database::in_memory().await.unwrap());
        let engine = StatsEngine::new(db);

        let snapshot = engine.compute_statistics(whole_second_now()).await.unwrap();
        assert_eq!(snapshot.total_students, 0);
        assert_eq!(snapshot.active_permits, 0);
        assert_eq!(snapshot.expiring_soon, 0);
        assert_eq!(snapshot.total_revenue_cents, 0);
        assert!(snapshot.by_status.is_empty());
    }

    #[tokio::test]
    async fn expiry_window_boundaries() {
        let db = Arc::new(Database::in_memory().await.unwrap());
        let now = whole_second_now();
        let horizon = now + Duration::days(7);

        // At `now` exactly: excluded (lower bound exclusive).
        seed_permit(&db, "P-NOW", PermitStatus::Active, 100, now).await;
        // At `now + 7d` exactly: included (upper bound inclusive).
        seed_permit(&db, "P-EDGE", PermitStatus::Active, 100, horizon).await;
        // One second past the horizon: excluded.
        seed_permit(
            &db,
            "P-LATE",
            PermitStatus::Active,
            100,
            horizon + Duration::seconds(1),
        )
        .await;
        // Inside the window but not active: excluded.
        seed_permit(
            &db,
            "P-REVOKED",
            PermitStatus::Revoked,
            100,
            now + Duration::days(3),
        )
        .await;

        let engine = StatsEngine::new(db);
        let snapshot = engine.compute_statistics(now).await.unwrap();

        assert_eq!(snapshot.expiring_soon, 1);
    }

    #[tokio::test]
    async fn counts_students() {
        let db = Arc::new(Database::in_memory().await.unwrap());
        seed_student(&db, "STU-1").await;
        seed_student(&db, "STU-2").await;

        let engine = StatsEngine::new(db);
        let snapshot = engine.compute_statistics(whole_second_now()).await.unwrap();
        assert_eq!(snapshot.total_students, 2);
    }

    #[tokio::test]
    async fn repeated_reads_are_stable_without_mutation() {
        let db = Arc::new(Database::in_memory().await.unwrap());
        let now = whole_second_now();
        seed_student(&db, "STU-1").await;
        seed_permit(&db, "P-1", PermitStatus::Active, 100, now + Duration::days(3)).await;
        seed_permit(&db, "P-2", PermitStatus::Expired, 40, now + Duration::days(3)).await;

        let engine = StatsEngine::new(db);
        let first = engine.compute_statistics(now).await.unwrap();
        let second = engine.compute_statistics(now).await.unwrap();

        assert_eq!(first.total_students, second.total_students);
        assert_eq!(first.active_permits, second.active_permits);
        assert_eq!(first.expiring_soon, second.expiring_soon);
        assert_eq!(first.total_revenue_cents, second.total_revenue_cents);
    }

    #[tokio::test]
    async fn custom_horizon_respected() {
        let db = Arc::new(Database::in_memory().await.unwrap());
        let now = whole_second_now();
        seed_permit(&db, "P-1", PermitStatus::Active, 100, now + Duration::days(10)).await;

        let engine = StatsEngine::new(db.clone()).with_horizon_days(14);
        let snapshot = engine.compute_statistics(now).await.unwrap();
        assert_eq!(snapshot.expiring_soon, 1);

        let engine = StatsEngine::new(db).with_horizon_days(7);
        let snapshot = engine.compute_statistics(now).await.unwrap();
        assert_eq!(snapshot.expiring_soon, 0);
    }
}
