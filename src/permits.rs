//! Permit issuance and lifecycle service.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::database::Database;
use crate::error::{PermitDeskError, Result};
use crate::models::{Page, Permit, PermitStatus};
use crate::students::MAX_PAGE_SIZE;

/// Fields accepted when issuing a permit.
#[derive(Debug, Clone)]
pub struct PermitFields {
    pub student_id: String,
    pub plate: String,
    pub kind: String,
    pub amount_cents: i64,
    pub expires_at: DateTime<Utc>,
}

/// Service for permit issuance, revocation, and listing.
pub struct PermitService {
    db: Arc<Database>,
}

impl PermitService {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Issue a new permit for a student. Returns the created permit id.
    pub async fn create(&self, fields: PermitFields) -> Result<String> {
        let issued_at = Utc::now();

        if fields.plate.trim().is_empty() {
            return Err(PermitDeskError::Validation(
                "plate must not be empty".to_string(),
            ));
        }
        if fields.kind.trim().is_empty() {
            return Err(PermitDeskError::Validation(
                "permit kind must not be empty".to_string(),
            ));
        }
        if fields.amount_cents <= 0 {
            return Err(PermitDeskError::Validation(
                "amount must be positive".to_string(),
            ));
        }
        if fields.expires_at <= issued_at {
            return Err(PermitDeskError::Validation(
                "expiry must be in the future".to_string(),
            ));
        }

        // The permit must belong to a known student.
        if self.db.get_student(fields.student_id.trim()).await?.is_none() {
            return Err(PermitDeskError::Validation(format!(
                "Unknown student: {}",
                fields.student_id.trim()
            )));
        }

        let permit = Permit {
            id: Uuid::new_v4().to_string(),
            student_id: fields.student_id.trim().to_string(),
            plate: fields.plate.trim().to_string(),
            kind: fields.kind.trim().to_string(),
            status: PermitStatus::Active,
            amount_cents: fields.amount_cents,
            issued_at,
            expires_at: fields.expires_at,
        };

        self.db.create_permit(&permit).await?;

        tracing::info!(
            permit_id = %permit.id,
            student_id = %permit.student_id,
            "Permit issued"
        );
        Ok(permit.id)
    }

    /// Revoke a permit. Returns the updated status.
    pub async fn revoke(&self, permit_id: &str) -> Result<PermitStatus> {
        let permit = self.db.get_permit(permit_id).await?.ok_or_else(|| {
            PermitDeskError::Validation(format!("Unknown permit: {}", permit_id))
        })?;

        if permit.status == PermitStatus::Revoked {
            return Err(PermitDeskError::Validation(
                "permit is already revoked".to_string(),
            ));
        }

        self.db
            .set_permit_status(permit_id, PermitStatus::Revoked)
            .await?;

        tracing::info!(permit_id = permit_id, "Permit revoked");
        Ok(PermitStatus::Revoked)
    }

    /// Get a permit by id.
    pub async fn get(&self, permit_id: &str) -> Result<Option<Permit>> {
        self.db.get_permit(permit_id).await
    }

    /// Paginated permit listing with optional status and student filters.
    pub async fn list(
        &self,
        status: Option<PermitStatus>,
        student_id: Option<&str>,
        page: u32,
        page_size: u32,
    ) -> Result<Page<Permit>> {
        let page = page.max(1);
        let page_size = page_size.clamp(1, MAX_PAGE_SIZE);
        self.db
            .list_permits(status, student_id, page, page_size)
            .await
    }

    /// Sweep active permits past their expiry into `expired`.
    /// Returns the number of permits updated.
    pub async fn expire_lapsed(&self) -> Result<u64> {
        self.db.expire_lapsed_permits(Utc::now()).await
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;
    use crate::models::Student;

    async fn seed_student(db: &Database, id: &str) {
        db.create_student(&Student {
            student_id: id.to_string(),
            name: format!("Student {}", id),
            email: format!("{}@campus.edu", id),
            course: "Law".to_string(),
            level: "400".to_string(),
            phone: None,
            created_at: Utc::now(),
        })
        .await
        .unwrap();
    }

    fn make_fields(student_id: &str, plate: &str) -> PermitFields {
        PermitFields {
            student_id: student_id.to_string(),
            plate: plate.to_string(),
            kind: "semester".to_string(),
            amount_cents: 15_000,
            expires_at: Utc::now() + Duration::days(120),
        }
    }

    #[tokio::test]
    async fn create_and_get() {
        let db = Arc::new(Database::in_memory().await.unwrap());
        seed_student(&db, "STU-1").await;
        let service = PermitService::new(db);

        let id = service.create(make_fields("STU-1", "ABC-123")).await.unwrap();
        let permit = service.get(&id).await.unwrap().unwrap();
        assert_eq!(permit.status, PermitStatus::Active);
        assert_eq!(permit.plate, "ABC-123");
    }

    #[tokio::test]
    async fn create_rejects_unknown_student() {
        let db = Arc::new(Database::in_memory().await.unwrap());
        let service = PermitService::new(db);

        let result = service.create(make_fields("STU-404", "ABC-123")).await;
        assert!(matches!(result, Err(PermitDeskError::Validation(_))));
    }

    #[tokio::test]
    async fn create_rejects_nonpositive_amount() {
        let db = Arc::new(Database::in_memory().await.unwrap());
        seed_student(&db, "STU-1").await;
        let service = PermitService::new(db);

        let mut fields = make_fields("STU-1", "ABC-123");
        fields.amount_cents = 0;
        let result = service.create(fields).await;
        assert!(matches!(result, Err(PermitDeskError::Validation(_))));
    }

    #[tokio::test]
    async fn create_rejects_past_expiry() {
        let db = Arc::new(Database::in_memory().await.unwrap());
        seed_student(&db, "STU-1").await;
        let service = PermitService::new(db);

        let mut fields = make_fields("STU-1", "ABC-123");
        fields.expires_at = Utc::now() - Duration::days(1);
        let result = service.create(fields).await;
        assert!(matches!(result, Err(PermitDeskError::Validation(_))));
    }

    #[tokio::test]
    async fn revoke_updates_status() {
        let db = Arc::new(Database::in_memory().await.unwrap());
        seed_student(&db, "STU-1").await;
        let service = PermitService::new(db);

        let id = service.create(make_fields("STU-1", "ABC-123")).await.unwrap();
        let status = service.revoke(&id).await.unwrap();
        assert_eq!(status, PermitStatus::Revoked);

        let permit = service.get(&id).await.unwrap().unwrap();
        assert_eq!(permit.status, PermitStatus::Revoked);
    }

    #[tokio::test]
    async fn revoke_twice_is_validation_error() {
        let db = Arc::new(Database::in_memory().await.unwrap());
        seed_student(&db, "STU-1").await;
        let service = PermitService::new(db);

        let id = service.create(make_fields("STU-1", "ABC-123")).await.unwrap();
        service.revoke(&id).await.unwrap();

        let result = service.revoke(&id).await;
        assert!(matches!(result, Err(PermitDeskError::Validation(_))));
    }

    #[tokio::test]
    async fn revoke_unknown_permit_is_validation_error() {
        let db = Arc::new(Database::in_memory().await.unwrap());
        let service = PermitService::new(db);

        let result = service.revoke("nope").await;
        assert!(matches!(result, Err(PermitDeskError::Validation(_))));
    }

    #[tokio::test]
    async fn list_filters_by_status_and_student() {
        let db = Arc::new(Database::in_memory().await.unwrap());
        seed_student(&db, "STU-1").await;
        seed_student(&db, "STU-2").await;
        let service = PermitService::new(db);

        let a = service.create(make_fields("STU-1", "AAA-111")).await.unwrap();
        service.create(make_fields("STU-1", "BBB-222")).await.unwrap();
        service.create(make_fields("STU-2", "CCC-333")).await.unwrap();
        service.revoke(&a).await.unwrap();

        let active = service
            .list(Some(PermitStatus::Active), None, 1, 10)
            .await
            .unwrap();
        assert_eq!(active.total, 2);

        let stu1 = service.list(None, Some("STU-1"), 1, 10).await.unwrap();
        assert_eq!(stu1.total, 2);

        let stu1_active = service
            .list(Some(PermitStatus::Active), Some("STU-1"), 1, 10)
            .await
            .unwrap();
        assert_eq!(stu1_active.total, 1);
    }

    #[tokio::test]
    async fn list_survives_huge_page_number() {
        let db = Arc::new(Database::in_memory().await.unwrap());
        seed_student(&db, "STU-1").await;
        let service = PermitService::new(db);

        service.create(make_fields("STU-1", "ABC-123")).await.unwrap();

        let page = service.list(None, None, u32::MAX, 100).await.unwrap();
        assert!(page.items.is_empty());
        assert_eq!(page.total, 1);
    }
}
