//! The permission-gated request dispatcher.
//!
//! Every cross-boundary operation is registered once at start-up with a name,
//! an optional required permission, and an async handler. `invoke` resolves
//! the operation, runs the authorization guard against the caller's session,
//! executes the handler, and returns a uniform result envelope. Expected
//! failures never escape as errors; the caller always gets an envelope.

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::database::Database;
use crate::error::{PermitDeskError, Result};
use crate::guard::{authorize, Decision, FORBIDDEN_MESSAGE};
use crate::permissions::Permission;
use crate::session::Session;

/// Failure categories callers can branch on. The message is a display
/// payload; the kind is the contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Unregistered operation name — a caller bug.
    UnknownOperation,
    /// Authorization denied. Never reveals the missing permission.
    Forbidden,
    /// Input failed shape or field checks before reaching the store.
    ValidationFailure,
    /// Downstream failure (store, mail relay, aggregation).
    HandlerFailure,
    /// The boundary itself was unreachable.
    TransportError,
}

/// The tagged error half of an envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvelopeError {
    pub kind: ErrorKind,
    pub message: String,
}

/// The uniform success/error wrapper returned by every operation.
///
/// Exactly one of `data`/`error` is meaningful: `error` is present if and
/// only if `success` is false.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<EnvelopeError>,
}

impl Envelope {
    /// Success envelope wrapping the handler's output.
    pub fn ok(data: Value) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    /// Error envelope with a tagged kind and display message.
    pub fn failure(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(EnvelopeError {
                kind,
                message: message.into(),
            }),
        }
    }

    /// The error kind, if this is a failure envelope.
    pub fn error_kind(&self) -> Option<ErrorKind> {
        self.error.as_ref().map(|e| e.kind)
    }
}

impl PermitDeskError {
    /// Envelope kind a handler error maps to at the boundary.
    fn envelope_kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::ValidationFailure,
            _ => ErrorKind::HandlerFailure,
        }
    }
}

/// Boxed async handler: JSON in, JSON out.
pub type Handler = Box<dyn Fn(Value) -> BoxFuture<'static, Result<Value>> + Send + Sync>;

/// A registered operation: unique name, the permission gating it (or none
/// for public operations), and its handler.
pub struct OperationDescriptor {
    pub name: String,
    pub required: Option<Permission>,
    handler: Handler,
}

/// Explicit operation registry, built once at start-up and handed to the
/// dispatcher. Not a global: tests construct their own.
#[derive(Default)]
pub struct Registry {
    operations: HashMap<String, OperationDescriptor>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an operation. Registration happens once at process start;
    /// a duplicate name is a programming error and fails fast here rather
    /// than misbehaving at call time.
    pub fn register<F, Fut>(&mut self, name: &str, required: Option<Permission>, handler: F)
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<Value>> + Send + 'static,
    {
        let descriptor = OperationDescriptor {
            name: name.to_string(),
            required,
            handler: Box::new(move |input| Box::pin(handler(input))),
        };

        if self
            .operations
            .insert(name.to_string(), descriptor)
            .is_some()
        {
            panic!("duplicate operation registration: {}", name);
        }
    }

    fn get(&self, name: &str) -> Option<&OperationDescriptor> {
        self.operations.get(name)
    }

    /// Registered operation names, for diagnostics.
    pub fn operation_names(&self) -> Vec<&str> {
        self.operations.keys().map(|s| s.as_str()).collect()
    }
}

/// The request dispatcher: guards and executes registered operations.
pub struct Dispatcher {
    registry: Registry,
    /// Audit sink for permission denials; best-effort.
    audit: Option<Arc<Database>>,
}

impl Dispatcher {
    pub fn new(registry: Registry) -> Self {
        Self {
            registry,
            audit: None,
        }
    }

    /// Record permission denials in the store's audit log.
    pub fn with_audit(mut self, db: Arc<Database>) -> Self {
        self.audit = Some(db);
        self
    }

    /// Invoke a named operation on behalf of `session`.
    ///
    /// Mutating handlers run exactly once per invocation; this layer never
    /// retries and never deduplicates concurrent duplicates. Callers must
    /// await the returned envelope before assuming any effect has occurred,
    /// and cannot abort a handler once it has started.
    pub async fn invoke(&self, name: &str, input: Value, session: &Session) -> Envelope {
        let operation = match self.registry.get(name) {
            Some(op) => op,
            None => {
                tracing::warn!(operation = name, "Unknown operation invoked");
                return Envelope::failure(
                    ErrorKind::UnknownOperation,
                    format!("Unknown operation: {}", name),
                );
            }
        };

        if authorize(session, operation.required) == Decision::Deny {
            tracing::warn!(
                user_id = %session.user_id,
                operation = %operation.name,
                "Permission denied"
            );

            if let Some(db) = &self.audit {
                let details = format!("operation: {}", operation.name);
                if let Err(e) = db
                    .create_audit_log(&session.user_id, "permission_denied", Some(&details))
                    .await
                {
                    tracing::warn!(
                        operation = %operation.name,
                        error = %e,
                        "Failed to write audit log entry"
                    );
                }
            }

            return Envelope::failure(ErrorKind::Forbidden, FORBIDDEN_MESSAGE);
        }

        match (operation.handler)(input).await {
            Ok(data) => {
                // Gated operations are privileged actions; record them.
                if operation.required.is_some() {
                    if let Some(db) = &self.audit {
                        if let Err(e) = db
                            .create_audit_log(&session.user_id, &operation.name, None)
                            .await
                        {
                            tracing::warn!(
                                operation = %operation.name,
                                error = %e,
                                "Failed to write audit log entry"
                            );
                        }
                    }
                }
                Envelope::ok(data)
            }
            Err(e) => {
                tracing::error!(
                    user_id = %session.user_id,
                    operation = %operation.name,
                    error = %e,
                    "Operation handler failed"
                );
                Envelope::failure(e.envelope_kind(), e.to_string())
            }
        }
    }
}
