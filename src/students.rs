//! Student record service.
//!
//! Field validation happens here, before anything reaches the store; the
//! dispatcher maps validation errors to a `ValidationFailure` envelope.

use std::sync::Arc;

use chrono::Utc;

use crate::database::Database;
use crate::error::{PermitDeskError, Result};
use crate::models::{Page, Student};

/// Largest page size a caller may request.
pub const MAX_PAGE_SIZE: u32 = 100;

/// Fields accepted when creating or updating a student.
#[derive(Debug, Clone)]
pub struct StudentFields {
    pub student_id: String,
    pub name: String,
    pub email: String,
    pub course: String,
    pub level: String,
    pub phone: Option<String>,
}

/// Service for student CRUD and search.
pub struct StudentService {
    db: Arc<Database>,
}

impl StudentService {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Create a student. Returns the created student id.
    pub async fn create(&self, fields: StudentFields) -> Result<String> {
        validate_fields(&fields)?;

        let student = Student {
            student_id: fields.student_id.trim().to_string(),
            name: fields.name.trim().to_string(),
            email: fields.email.trim().to_string(),
            course: fields.course.trim().to_string(),
            level: fields.level.trim().to_string(),
            phone: fields.phone,
            created_at: Utc::now(),
        };

        self.db.create_student(&student).await?;

        tracing::info!(student_id = %student.student_id, "Student created");
        Ok(student.student_id)
    }

    /// Update a student's mutable fields. Returns the student id.
    pub async fn update(&self, fields: StudentFields) -> Result<String> {
        validate_fields(&fields)?;

        let existing = self
            .db
            .get_student(fields.student_id.trim())
            .await?
            .ok_or_else(|| {
                PermitDeskError::Validation(format!(
                    "Unknown student: {}",
                    fields.student_id.trim()
                ))
            })?;

        let student = Student {
            student_id: existing.student_id.clone(),
            name: fields.name.trim().to_string(),
            email: fields.email.trim().to_string(),
            course: fields.course.trim().to_string(),
            level: fields.level.trim().to_string(),
            phone: fields.phone,
            created_at: existing.created_at,
        };

        self.db.update_student(&student).await?;
        Ok(student.student_id)
    }

    /// Delete a student. Returns true if a record was removed.
    pub async fn delete(&self, student_id: &str) -> Result<bool> {
        let removed = self.db.delete_student(student_id).await?;
        if removed {
            tracing::info!(student_id = student_id, "Student deleted");
        }
        Ok(removed)
    }

    /// Get a student by id.
    pub async fn get(&self, student_id: &str) -> Result<Option<Student>> {
        self.db.get_student(student_id).await
    }

    /// Paginated search over id, name, and email.
    pub async fn list(
        &self,
        search: Option<&str>,
        page: u32,
        page_size: u32,
    ) -> Result<Page<Student>> {
        let page = page.max(1);
        let page_size = page_size.clamp(1, MAX_PAGE_SIZE);
        let search = search.map(str::trim).filter(|s| !s.is_empty());

        self.db.list_students(search, page, page_size).await
    }
}

fn validate_fields(fields: &StudentFields) -> Result<()> {
    if fields.student_id.trim().is_empty() {
        return Err(PermitDeskError::Validation(
            "student id must not be empty".to_string(),
        ));
    }
    if fields.name.trim().is_empty() {
        return Err(PermitDeskError::Validation(
            "name must not be empty".to_string(),
        ));
    }
    let email = fields.email.trim();
    if email.is_empty() || !email.contains('@') {
        return Err(PermitDeskError::Validation(
            "email must be a valid address".to_string(),
        ));
    }
    if fields.course.trim().is_empty() {
        return Err(PermitDeskError::Validation(
            "course must not be empty".to_string(),
        ));
    }
    Ok(())
}
