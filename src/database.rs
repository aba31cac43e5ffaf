//! SQLite database for persistent storage.
//!
//! Handles students, permits, sessions, role assignments, the audit log, and
//! the aggregate queries behind the dashboard statistics.

use std::collections::HashMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;

use crate::error::{PermitDeskError, Result};
use crate::models::{Page, Permit, PermitStatus, Student};

/// A stored session row. Roles and permissions are kept as they were
/// resolved at sign-in; the session layer rebuilds the typed view.
#[derive(Debug, Clone)]
pub struct SessionRecord {
    pub id: String,
    pub user_id: String,
    pub display_name: String,
    /// Comma-separated role names.
    pub roles: String,
    /// Comma-separated permission names, resolved at sign-in.
    pub permissions: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Audit log entry for tracking privileged actions and denials.
#[derive(Debug, Clone)]
pub struct AuditLogEntry {
    pub id: i64,
    pub user_id: String,
    pub action: String,
    pub details: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Per-status permit totals from the grouped aggregate query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusTotals {
    pub count: i64,
    pub amount_cents: i64,
}

/// Database connection pool wrapper.
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Create a new database connection.
    ///
    /// Creates the database file and initializes schema if needed.
    pub async fn new(path: &str) -> Result<Self> {
        let db_path = Path::new(path);

        if let Some(parent) = db_path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    PermitDeskError::Database(format!(
                        "Failed to create database directory: {}",
                        e
                    ))
                })?;
            }
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| {
                PermitDeskError::Database(format!("Failed to connect to database: {}", e))
            })?;

        let db = Self { pool };
        db.initialize_schema().await?;

        Ok(db)
    }

    /// Create an in-memory database for testing.
    pub async fn in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(":memory:")
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(|e| {
                PermitDeskError::Database(format!("Failed to create in-memory db: {}", e))
            })?;

        let db = Self { pool };
        db.initialize_schema().await?;

        Ok(db)
    }

    /// Initialize database schema.
    async fn initialize_schema(&self) -> Result<()> {
        sqlx::query(SCHEMA)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                PermitDeskError::Database(format!("Failed to initialize schema: {}", e))
            })?;

        Ok(())
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Check if the database is healthy.
    pub async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| PermitDeskError::Database(format!("Health check failed: {}", e)))?;

        Ok(())
    }

    // ========== Student CRUD ==========

    /// Insert a new student. Fails on duplicate student id.
    pub async fn create_student(&self, student: &Student) -> Result<()> {
        sqlx::query(
            "INSERT INTO students (student_id, name, email, course, level, phone, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&student.student_id)
        .bind(&student.name)
        .bind(&student.email)
        .bind(&student.course)
        .bind(&student.level)
        .bind(&student.phone)
        .bind(student.created_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| PermitDeskError::Database(format!("Failed to create student: {}", e)))?;

        Ok(())
    }

    /// Get a student by id.
    pub async fn get_student(&self, student_id: &str) -> Result<Option<Student>> {
        let row = sqlx::query(
            "SELECT student_id, name, email, course, level, phone, created_at
             FROM students WHERE student_id = ?",
        )
        .bind(student_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| PermitDeskError::Database(format!("Failed to get student: {}", e)))?;

        match row {
            Some(row) => Ok(Some(student_from_row(&row)?)),
            None => Ok(None),
        }
    }

    /// Update a student's mutable fields. Errors if the student is unknown.
    pub async fn update_student(&self, student: &Student) -> Result<()> {
        let result = sqlx::query(
            "UPDATE students SET name = ?, email = ?, course = ?, level = ?, phone = ?
             WHERE student_id = ?",
        )
        .bind(&student.name)
        .bind(&student.email)
        .bind(&student.course)
        .bind(&student.level)
        .bind(&student.phone)
        .bind(&student.student_id)
        .execute(&self.pool)
        .await
        .map_err(|e| PermitDeskError::Database(format!("Failed to update student: {}", e)))?;

        if result.rows_affected() == 0 {
            return Err(PermitDeskError::Database("Student not found".to_string()));
        }

        Ok(())
    }

    /// Delete a student. Returns true if a row was removed.
    pub async fn delete_student(&self, student_id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM students WHERE student_id = ?")
            .bind(student_id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                PermitDeskError::Database(format!("Failed to delete student: {}", e))
            })?;

        Ok(result.rows_affected() > 0)
    }

    /// Paginated student search over id, name, and email.
    pub async fn list_students(
        &self,
        search: Option<&str>,
        page: u32,
        page_size: u32,
    ) -> Result<Page<Student>> {
        let pattern = search.map(|s| format!("%{}%", s));
        // Widen before multiplying: page is caller input and u32 arithmetic
        // would overflow on a large page number.
        let offset = i64::from(page.saturating_sub(1)) * i64::from(page_size);

        let total: i64 = match &pattern {
            Some(p) => sqlx::query_scalar(
                "SELECT COUNT(*) FROM students
                 WHERE student_id LIKE ? OR name LIKE ? OR email LIKE ?",
            )
            .bind(p)
            .bind(p)
            .bind(p)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                PermitDeskError::Database(format!("Failed to count students: {}", e))
            })?,
            None => sqlx::query_scalar("SELECT COUNT(*) FROM students")
                .fetch_one(&self.pool)
                .await
                .map_err(|e| {
                    PermitDeskError::Database(format!("Failed to count students: {}", e))
                })?,
        };

        let rows = match &pattern {
            Some(p) => {
                sqlx::query(
                    "SELECT student_id, name, email, course, level, phone, created_at
                     FROM students
                     WHERE student_id LIKE ? OR name LIKE ? OR email LIKE ?
                     ORDER BY name ASC LIMIT ? OFFSET ?",
                )
                .bind(p)
                .bind(p)
                .bind(p)
                .bind(page_size as i64)
                .bind(offset)
                .fetch_all(&self.pool)
                .await
            }
            None => {
                sqlx::query(
                    "SELECT student_id, name, email, course, level, phone, created_at
                     FROM students ORDER BY name ASC LIMIT ? OFFSET ?",
                )
                .bind(page_size as i64)
                .bind(offset)
                .fetch_all(&self.pool)
                .await
            }
        }
        .map_err(|e| PermitDeskError::Database(format!("Failed to list students: {}", e)))?;

        let mut items = Vec::with_capacity(rows.len());
        for row in rows {
            items.push(student_from_row(&row)?);
        }

        Ok(Page {
            items,
            total: total as u64,
            page,
            page_size,
        })
    }

    // ========== Permit CRUD ==========

    /// Insert a new permit. Fails if the plate already holds an active permit.
    pub async fn create_permit(&self, permit: &Permit) -> Result<()> {
        sqlx::query(
            "INSERT INTO permits (id, student_id, plate, kind, status, amount_cents, issued_at, expires_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&permit.id)
        .bind(&permit.student_id)
        .bind(&permit.plate)
        .bind(&permit.kind)
        .bind(permit.status.as_str())
        .bind(permit.amount_cents)
        .bind(permit.issued_at.to_rfc3339())
        .bind(permit.expires_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| PermitDeskError::Database(format!("Failed to create permit: {}", e)))?;

        Ok(())
    }

    /// Get a permit by id.
    pub async fn get_permit(&self, permit_id: &str) -> Result<Option<Permit>> {
        let row = sqlx::query(
            "SELECT id, student_id, plate, kind, status, amount_cents, issued_at, expires_at
             FROM permits WHERE id = ?",
        )
        .bind(permit_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| PermitDeskError::Database(format!("Failed to get permit: {}", e)))?;

        match row {
            Some(row) => Ok(Some(permit_from_row(&row)?)),
            None => Ok(None),
        }
    }

    /// Set a permit's status. Errors if the permit is unknown.
    pub async fn set_permit_status(&self, permit_id: &str, status: PermitStatus) -> Result<()> {
        let result = sqlx::query("UPDATE permits SET status = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(permit_id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                PermitDeskError::Database(format!("Failed to update permit status: {}", e))
            })?;

        if result.rows_affected() == 0 {
            return Err(PermitDeskError::Database("Permit not found".to_string()));
        }

        Ok(())
    }

    /// Paginated permit listing with optional status and student filters.
    pub async fn list_permits(
        &self,
        status: Option<PermitStatus>,
        student_id: Option<&str>,
        page: u32,
        page_size: u32,
    ) -> Result<Page<Permit>> {
        let offset = i64::from(page.saturating_sub(1)) * i64::from(page_size);

        let mut sql = String::from(
            "SELECT id, student_id, plate, kind, status, amount_cents, issued_at, expires_at
             FROM permits WHERE 1 = 1",
        );
        if status.is_some() {
            sql.push_str(" AND status = ?");
        }
        if student_id.is_some() {
            sql.push_str(" AND student_id = ?");
        }
        sql.push_str(" ORDER BY issued_at DESC");

        let count_sql = sql.replace(
            "SELECT id, student_id, plate, kind, status, amount_cents, issued_at, expires_at",
            "SELECT COUNT(*)",
        );

        let mut count_query = sqlx::query_scalar::<_, i64>(&count_sql);
        if let Some(s) = status {
            count_query = count_query.bind(s.as_str());
        }
        if let Some(sid) = student_id {
            count_query = count_query.bind(sid);
        }
        let total = count_query.fetch_one(&self.pool).await.map_err(|e| {
            PermitDeskError::Database(format!("Failed to count permits: {}", e))
        })?;

        sql.push_str(" LIMIT ? OFFSET ?");
        let mut data_query = sqlx::query(&sql);
        if let Some(s) = status {
            data_query = data_query.bind(s.as_str());
        }
        if let Some(sid) = student_id {
            data_query = data_query.bind(sid);
        }
        let rows = data_query
            .bind(page_size as i64)
            .bind(offset)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| PermitDeskError::Database(format!("Failed to list permits: {}", e)))?;

        let mut items = Vec::with_capacity(rows.len());
        for row in rows {
            items.push(permit_from_row(&row)?);
        }

        Ok(Page {
            items,
            total: total as u64,
            page,
            page_size,
        })
    }

    /// Flip active permits past their expiry to `expired`.
    /// Returns the number of permits updated.
    pub async fn expire_lapsed_permits(&self, now: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE permits SET status = 'expired'
             WHERE status = 'active' AND expires_at <= ?",
        )
        .bind(now.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| {
            PermitDeskError::Database(format!("Failed to expire lapsed permits: {}", e))
        })?;

        Ok(result.rows_affected())
    }

    // ========== Aggregate queries ==========

    /// Per-status permit count and summed amount.
    pub async fn permit_totals_by_status(&self) -> Result<HashMap<String, StatusTotals>> {
        let rows = sqlx::query(
            "SELECT status, COUNT(*) as count, COALESCE(SUM(amount_cents), 0) as amount
             FROM permits GROUP BY status",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            PermitDeskError::Database(format!("Failed to aggregate permits: {}", e))
        })?;

        let mut totals = HashMap::with_capacity(rows.len());
        for row in rows {
            let status: String = row.get("status");
            totals.insert(
                status,
                StatusTotals {
                    count: row.get("count"),
                    amount_cents: row.get("amount"),
                },
            );
        }

        Ok(totals)
    }

    /// Total number of students.
    pub async fn count_students(&self) -> Result<i64> {
        sqlx::query_scalar("SELECT COUNT(*) FROM students")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| PermitDeskError::Database(format!("Failed to count students: {}", e)))
    }

    /// Count active permits with expiry in `(after, until]`.
    pub async fn count_active_permits_expiring(
        &self,
        after: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<i64> {
        sqlx::query_scalar(
            "SELECT COUNT(*) FROM permits
             WHERE status = 'active' AND expires_at > ? AND expires_at <= ?",
        )
        .bind(after.to_rfc3339())
        .bind(until.to_rfc3339())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            PermitDeskError::Database(format!("Failed to count expiring permits: {}", e))
        })
    }

    // ========== Session CRUD ==========

    /// Create a new session.
    pub async fn create_session(&self, session: &SessionRecord) -> Result<()> {
        sqlx::query(
            "INSERT INTO sessions (id, user_id, display_name, roles, permissions, created_at, expires_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&session.id)
        .bind(&session.user_id)
        .bind(&session.display_name)
        .bind(&session.roles)
        .bind(&session.permissions)
        .bind(session.created_at.to_rfc3339())
        .bind(session.expires_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| PermitDeskError::Database(format!("Failed to create session: {}", e)))?;

        Ok(())
    }

    /// Get a session by ID.
    pub async fn get_session(&self, session_id: &str) -> Result<Option<SessionRecord>> {
        let row = sqlx::query(
            "SELECT id, user_id, display_name, roles, permissions, created_at, expires_at
             FROM sessions WHERE id = ?",
        )
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| PermitDeskError::Database(format!("Failed to get session: {}", e)))?;

        match row {
            Some(row) => Ok(Some(SessionRecord {
                id: row.get("id"),
                user_id: row.get("user_id"),
                display_name: row.get("display_name"),
                roles: row.get("roles"),
                permissions: row.get("permissions"),
                created_at: parse_timestamp(row.get("created_at"), "created_at")?,
                expires_at: parse_timestamp(row.get("expires_at"), "expires_at")?,
            })),
            None => Ok(None),
        }
    }

    /// Delete a session (sign-out).
    pub async fn delete_session(&self, session_id: &str) -> Result<()> {
        sqlx::query("DELETE FROM sessions WHERE id = ?")
            .bind(session_id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                PermitDeskError::Database(format!("Failed to delete session: {}", e))
            })?;

        Ok(())
    }

    /// Clean up expired sessions. Returns the number of sessions deleted.
    pub async fn cleanup_expired_sessions(&self, now: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query("DELETE FROM sessions WHERE expires_at <= ?")
            .bind(now.to_rfc3339())
            .execute(&self.pool)
            .await
            .map_err(|e| {
                PermitDeskError::Database(format!("Failed to cleanup sessions: {}", e))
            })?;

        Ok(result.rows_affected())
    }

    // ========== Role assignments ==========

    /// Assign roles to a user, replacing any previous assignment.
    pub async fn set_user_roles(
        &self,
        user_id: &str,
        roles: &str,
        assigned_by: &str,
    ) -> Result<()> {
        sqlx::query(
            "INSERT INTO role_assignments (user_id, roles, assigned_by, assigned_at)
             VALUES (?, ?, ?, ?)
             ON CONFLICT(user_id) DO UPDATE SET
                roles = excluded.roles,
                assigned_by = excluded.assigned_by,
                assigned_at = excluded.assigned_at",
        )
        .bind(user_id)
        .bind(roles)
        .bind(assigned_by)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| PermitDeskError::Database(format!("Failed to assign roles: {}", e)))?;

        Ok(())
    }

    /// Get the comma-separated role names assigned to a user.
    /// Returns `None` when the user has no assignment.
    pub async fn get_user_roles(&self, user_id: &str) -> Result<Option<String>> {
        let row = sqlx::query("SELECT roles FROM role_assignments WHERE user_id = ?")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                PermitDeskError::Database(format!("Failed to get user roles: {}", e))
            })?;

        Ok(row.map(|r| r.get("roles")))
    }

    // ========== Audit log ==========

    /// Append an audit log entry.
    pub async fn create_audit_log(
        &self,
        user_id: &str,
        action: &str,
        details: Option<&str>,
    ) -> Result<()> {
        sqlx::query(
            "INSERT INTO audit_log (user_id, action, details, timestamp)
             VALUES (?, ?, ?, ?)",
        )
        .bind(user_id)
        .bind(action)
        .bind(details)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| PermitDeskError::Database(format!("Failed to create audit log: {}", e)))?;

        Ok(())
    }

    /// Get the most recent audit log entries.
    pub async fn get_audit_log(&self, limit: u32) -> Result<Vec<AuditLogEntry>> {
        let rows = sqlx::query(
            "SELECT id, user_id, action, details, timestamp
             FROM audit_log ORDER BY id DESC LIMIT ?",
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| PermitDeskError::Database(format!("Failed to get audit log: {}", e)))?;

        let mut entries = Vec::with_capacity(rows.len());
        for row in rows {
            entries.push(AuditLogEntry {
                id: row.get("id"),
                user_id: row.get("user_id"),
                action: row.get("action"),
                details: row.get("details"),
                timestamp: parse_timestamp(row.get("timestamp"), "timestamp")?,
            });
        }

        Ok(entries)
    }
}

/// Parse an RFC3339 timestamp column.
fn parse_timestamp(value: &str, column: &str) -> Result<DateTime<Utc>> {
    chrono::DateTime::parse_from_rfc3339(value)
        .map_err(|e| PermitDeskError::Database(format!("Invalid {}: {}", column, e)))
        .map(|dt| dt.with_timezone(&Utc))
}

fn student_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Student> {
    Ok(Student {
        student_id: row.get("student_id"),
        name: row.get("name"),
        email: row.get("email"),
        course: row.get("course"),
        level: row.get("level"),
        phone: row.get("phone"),
        created_at: parse_timestamp(row.get("created_at"), "created_at")?,
    })
}

fn permit_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Permit> {
    let status_str: String = row.get("status");
    let status = PermitStatus::parse(&status_str).ok_or_else(|| {
        PermitDeskError::InternalState(format!("Unknown permit status: {}", status_str))
    })?;

    Ok(Permit {
        id: row.get("id"),
        student_id: row.get("student_id"),
        plate: row.get("plate"),
        kind: row.get("kind"),
        status,
        amount_cents: row.get("amount_cents"),
        issued_at: parse_timestamp(row.get("issued_at"), "issued_at")?,
        expires_at: parse_timestamp(row.get("expires_at"), "expires_at")?,
    })
}

/// Database schema.
const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS students (
    student_id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    email TEXT NOT NULL,
    course TEXT NOT NULL,
    level TEXT NOT NULL,
    phone TEXT,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS permits (
    id TEXT PRIMARY KEY,
    student_id TEXT NOT NULL,
    plate TEXT NOT NULL,
    kind TEXT NOT NULL,
    status TEXT NOT NULL,
    amount_cents INTEGER NOT NULL,
    issued_at TEXT NOT NULL,
    expires_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_permits_status ON permits(status);
CREATE INDEX IF NOT EXISTS idx_permits_expiry ON permits(status, expires_at);
CREATE UNIQUE INDEX IF NOT EXISTS idx_permits_active_plate
    ON permits(plate) WHERE status = 'active';

CREATE TABLE IF NOT EXISTS sessions (
    id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL,
    display_name TEXT NOT NULL,
    roles TEXT NOT NULL,
    permissions TEXT NOT NULL,
    created_at TEXT NOT NULL,
    expires_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS role_assignments (
    user_id TEXT PRIMARY KEY,
    roles TEXT NOT NULL,
    assigned_by TEXT NOT NULL,
    assigned_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS audit_log (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id TEXT NOT NULL,
    action TEXT NOT NULL,
    details TEXT,
    timestamp TEXT NOT NULL
);
"#;
