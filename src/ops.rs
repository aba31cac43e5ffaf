//! Operation surface of the request boundary.
//!
//! Registers every named operation with its required permission and a
//! handler that decodes the JSON input, delegates to a service, and encodes
//! the result. Registration happens once in `main` (or in a test) against an
//! explicit registry.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::database::Database;
use crate::dispatcher::Registry;
use crate::email::{EmailMessage, Mailer};
use crate::error::{PermitDeskError, Result};
use crate::models::PermitStatus;
use crate::permissions::Permission;
use crate::permits::{PermitFields, PermitService};
use crate::stats::StatsEngine;
use crate::students::{StudentFields, StudentService};

/// Everything the operation handlers need, shared behind one Arc.
pub struct AppServices {
    pub db: Arc<Database>,
    pub students: StudentService,
    pub permits: PermitService,
    pub stats: StatsEngine,
    pub mailer: Arc<dyn Mailer>,
}

impl AppServices {
    /// Wire the default services over a store and mailer.
    pub fn new(db: Arc<Database>, mailer: Arc<dyn Mailer>) -> Self {
        Self {
            students: StudentService::new(db.clone()),
            permits: PermitService::new(db.clone()),
            stats: StatsEngine::new(db.clone()),
            db,
            mailer,
        }
    }
}

fn decode<T: DeserializeOwned>(input: Value) -> Result<T> {
    serde_json::from_value(input)
        .map_err(|e| PermitDeskError::Validation(format!("invalid input: {}", e)))
}

fn encode<T: serde::Serialize>(output: T) -> Result<Value> {
    Ok(serde_json::to_value(output)?)
}

const DEFAULT_PAGE_SIZE: u32 = 25;

fn default_page() -> u32 {
    1
}

fn default_page_size() -> u32 {
    DEFAULT_PAGE_SIZE
}

#[derive(Debug, Deserialize)]
struct StudentRequest {
    student_id: String,
    name: String,
    email: String,
    course: String,
    level: String,
    #[serde(default)]
    phone: Option<String>,
}

impl From<StudentRequest> for StudentFields {
    fn from(req: StudentRequest) -> Self {
        Self {
            student_id: req.student_id,
            name: req.name,
            email: req.email,
            course: req.course,
            level: req.level,
            phone: req.phone,
        }
    }
}

#[derive(Debug, Deserialize)]
struct StudentIdRequest {
    student_id: String,
}

#[derive(Debug, Deserialize)]
struct ListStudentsRequest {
    #[serde(default)]
    search: Option<String>,
    #[serde(default = "default_page")]
    page: u32,
    #[serde(default = "default_page_size")]
    page_size: u32,
}

#[derive(Debug, Deserialize)]
struct CreatePermitRequest {
    student_id: String,
    plate: String,
    kind: String,
    amount_cents: i64,
    expires_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct PermitIdRequest {
    permit_id: String,
}

#[derive(Debug, Deserialize)]
struct ListPermitsRequest {
    #[serde(default)]
    status: Option<PermitStatus>,
    #[serde(default)]
    student_id: Option<String>,
    #[serde(default = "default_page")]
    page: u32,
    #[serde(default = "default_page_size")]
    page_size: u32,
}

/// Register the full operation surface against `registry`.
pub fn register_operations(registry: &mut Registry, services: Arc<AppServices>) {
    let svc = services.clone();
    registry.register(
        "dashboard.getStats",
        Some(Permission::ViewReports),
        move |_input| {
            let svc = svc.clone();
            async move {
                let snapshot = svc.stats.compute_statistics(Utc::now()).await?;
                encode(snapshot)
            }
        },
    );

    let svc = services.clone();
    registry.register(
        "student.create",
        Some(Permission::ManageStudents),
        move |input| {
            let svc = svc.clone();
            async move {
                let req: StudentRequest = decode(input)?;
                let id = svc.students.create(req.into()).await?;
                Ok(json!({ "student_id": id }))
            }
        },
    );

    let svc = services.clone();
    registry.register(
        "student.update",
        Some(Permission::ManageStudents),
        move |input| {
            let svc = svc.clone();
            async move {
                let req: StudentRequest = decode(input)?;
                let id = svc.students.update(req.into()).await?;
                Ok(json!({ "student_id": id }))
            }
        },
    );

    let svc = services.clone();
    registry.register(
        "student.delete",
        Some(Permission::ManageStudents),
        move |input| {
            let svc = svc.clone();
            async move {
                let req: StudentIdRequest = decode(input)?;
                let deleted = svc.students.delete(&req.student_id).await?;
                Ok(json!({ "deleted": deleted }))
            }
        },
    );

    let svc = services.clone();
    registry.register(
        "student.list",
        Some(Permission::ViewStudents),
        move |input| {
            let svc = svc.clone();
            async move {
                let req: ListStudentsRequest = decode(input)?;
                let page = svc
                    .students
                    .list(req.search.as_deref(), req.page, req.page_size)
                    .await?;
                encode(page)
            }
        },
    );

    let svc = services.clone();
    registry.register(
        "permit.create",
        Some(Permission::CreatePermits),
        move |input| {
            let svc = svc.clone();
            async move {
                let req: CreatePermitRequest = decode(input)?;
                let id = svc
                    .permits
                    .create(PermitFields {
                        student_id: req.student_id,
                        plate: req.plate,
                        kind: req.kind,
                        amount_cents: req.amount_cents,
                        expires_at: req.expires_at,
                    })
                    .await?;
                Ok(json!({ "permit_id": id }))
            }
        },
    );

    let svc = services.clone();
    registry.register(
        "permit.revoke",
        Some(Permission::RevokePermits),
        move |input| {
            let svc = svc.clone();
            async move {
                let req: PermitIdRequest = decode(input)?;
                let status = svc.permits.revoke(&req.permit_id).await?;
                Ok(json!({ "status": status }))
            }
        },
    );

    let svc = services.clone();
    registry.register(
        "permit.list",
        Some(Permission::ViewPermits),
        move |input| {
            let svc = svc.clone();
            async move {
                let req: ListPermitsRequest = decode(input)?;
                let page = svc
                    .permits
                    .list(
                        req.status,
                        req.student_id.as_deref(),
                        req.page,
                        req.page_size,
                    )
                    .await?;
                encode(page)
            }
        },
    );

    let svc = services.clone();
    registry.register(
        "email.send",
        Some(Permission::ManageSettings),
        move |input| {
            let svc = svc.clone();
            async move {
                let message: EmailMessage = decode(input)?;
                let receipt = svc.mailer.send(&message).await?;
                encode(receipt)
            }
        },
    );
}
