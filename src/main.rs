//! PermitDesk backend entry point.
//!
//! Boots the store, wires the services, registers the operation surface, and
//! serves the request boundary for the renderer process.

use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use permitdesk::config::PermitDeskConfig;
use permitdesk::database::Database;
use permitdesk::dispatcher::{Dispatcher, Registry};
use permitdesk::email::{DisabledMailer, HttpMailer, Mailer};
use permitdesk::error::Result;
use permitdesk::ops::{register_operations, AppServices};
use permitdesk::session::SessionManager;
use permitdesk::stats::StatsEngine;
use permitdesk::web::{self, AppState};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env if present; real env vars take precedence.
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    tracing::info!(
        build = option_env!("BUILD_TIMESTAMP").unwrap_or("unknown"),
        "PermitDesk backend starting"
    );

    let config = PermitDeskConfig::from_env()?;

    let db = Arc::new(Database::new(&config.db_path).await?);
    db.health_check().await?;

    let mailer: Arc<dyn Mailer> = match &config.mail_relay {
        Some(relay) => Arc::new(HttpMailer::new(relay)),
        None => {
            tracing::warn!("MAIL_RELAY_URL not set; outbound mail disabled");
            Arc::new(DisabledMailer)
        }
    };

    let mut services = AppServices::new(db.clone(), mailer);
    services.stats = StatsEngine::new(db.clone()).with_horizon_days(config.expiry_horizon_days);
    let services = Arc::new(services);

    let mut registry = Registry::new();
    register_operations(&mut registry, services.clone());
    tracing::info!(
        operations = registry.operation_names().len(),
        "Operation surface registered"
    );

    let dispatcher = Arc::new(Dispatcher::new(registry).with_audit(db.clone()));
    let sessions = Arc::new(
        SessionManager::new(db.clone()).with_ttl_hours(config.session_ttl_hours),
    );

    spawn_background_tasks(services.clone(), sessions.clone());

    web::serve(
        AppState {
            dispatcher,
            sessions,
        },
        config.port,
    )
    .await;

    Ok(())
}

/// Spawn background tasks for periodic maintenance.
fn spawn_background_tasks(services: Arc<AppServices>, sessions: Arc<SessionManager>) {
    // Permit expiry sweep (runs every hour)
    let svc = services.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(3600));
        loop {
            interval.tick().await;
            match svc.permits.expire_lapsed().await {
                Ok(count) => {
                    if count > 0 {
                        tracing::info!(count = count, "Expired lapsed permits");
                    }
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to expire lapsed permits");
                }
            }
        }
    });

    // Session cleanup task (runs every hour)
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(3600));
        loop {
            interval.tick().await;
            match sessions.cleanup_expired().await {
                Ok(count) => {
                    if count > 0 {
                        tracing::info!(count = count, "Cleaned up expired sessions");
                    }
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to cleanup sessions");
                }
            }
        }
    });
}
