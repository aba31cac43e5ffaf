//! Configuration loading from environment.
//!
//! Reads database location, listen port, session lifetime, and the outbound
//! mail relay settings from environment variables.

use std::env;

use crate::error::{PermitDeskError, Result};

/// Default number of hours a session stays valid after sign-in.
pub const DEFAULT_SESSION_TTL_HOURS: i64 = 12;

/// Default horizon, in days, for the "expiring soon" dashboard figure.
pub const DEFAULT_EXPIRY_HORIZON_DAYS: i64 = 7;

/// Main configuration for the PermitDesk backend.
#[derive(Debug, Clone)]
pub struct PermitDeskConfig {
    /// Path to the SQLite database file.
    pub db_path: String,
    /// Port the renderer boundary listens on.
    pub port: u16,
    /// Hours before a session expires.
    pub session_ttl_hours: i64,
    /// Days ahead counted as "expiring soon" on the dashboard.
    pub expiry_horizon_days: i64,
    /// Mail relay settings, absent when outbound mail is disabled.
    pub mail_relay: Option<MailRelayConfig>,
}

/// Outbound mail relay configuration.
#[derive(Debug, Clone)]
pub struct MailRelayConfig {
    /// Endpoint accepting JSON-encoded messages.
    pub url: String,
    /// Bearer token for the relay, if it requires one.
    pub token: Option<String>,
}

impl PermitDeskConfig {
    /// Load configuration from environment variables.
    ///
    /// Required environment variables:
    /// - `PERMITDESK_DB_PATH`: path to the SQLite database file
    ///
    /// Optional environment variables:
    /// - `PERMITDESK_PORT`: listen port (default: 8710)
    /// - `SESSION_TTL_HOURS`: session lifetime in hours (default: 12)
    /// - `EXPIRY_HORIZON_DAYS`: expiring-soon window in days (default: 7)
    /// - `MAIL_RELAY_URL`: mail relay endpoint (mail disabled when unset)
    /// - `MAIL_RELAY_TOKEN`: bearer token for the relay
    pub fn from_env() -> Result<Self> {
        let db_path = env::var("PERMITDESK_DB_PATH")
            .map_err(|_| PermitDeskError::Config("PERMITDESK_DB_PATH not set".to_string()))?;

        let port = env::var("PERMITDESK_PORT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(8710);

        let session_ttl_hours = env::var("SESSION_TTL_HOURS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_SESSION_TTL_HOURS);

        let expiry_horizon_days = env::var("EXPIRY_HORIZON_DAYS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_EXPIRY_HORIZON_DAYS);

        let mail_relay = env::var("MAIL_RELAY_URL").ok().map(|url| MailRelayConfig {
            url,
            token: env::var("MAIL_RELAY_TOKEN").ok(),
        });

        if session_ttl_hours <= 0 {
            return Err(PermitDeskError::Config(
                "SESSION_TTL_HOURS must be positive".to_string(),
            ));
        }

        if expiry_horizon_days <= 0 {
            return Err(PermitDeskError::Config(
                "EXPIRY_HORIZON_DAYS must be positive".to_string(),
            ));
        }

        Ok(Self {
            db_path,
            port,
            session_ttl_hours,
            expiry_horizon_days,
            mail_relay,
        })
    }
}
