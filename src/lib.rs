//! PermitDesk backend library.
//!
//! The privileged half of a desktop administration app for university
//! parking/access permits and student records. The renderer issues named
//! operations across a trust boundary; this crate authorizes each one
//! against the session's permission set, executes it, and returns a uniform
//! result envelope.

pub mod config;
pub mod database;
pub mod dispatcher;
pub mod email;
pub mod error;
pub mod guard;
pub mod models;
pub mod ops;
pub mod permissions;
pub mod permits;
pub mod session;
pub mod stats;
pub mod students;
pub mod web;
