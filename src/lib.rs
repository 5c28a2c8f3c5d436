//! Fieldops - backend for school assignments and school audits
//!
//! Controllers assign schools to trainers for a day, trainers run timed
//! audits at each school, and every read of an assignment reconciles its
//! per-school status against the audit log.
//!
//! ## Services
//!
//! - **Assignments**: Assign, edit, delete and list daily school assignments
//! - **Audits**: Start/end audits with photo capture and session details
//! - **Mystery audits**: One-shot outlet scorecards and the controller roster
//! - **Reconcile**: Dedup schools and derive status from audit records
//! - **Auth**: JWT access/refresh tokens with role-based route guards

pub mod auth;
pub mod blob;
pub mod config;
pub mod db;
pub mod reconcile;
pub mod routes;
pub mod server;
pub mod services;
pub mod store;
pub mod types;

pub use config::Args;
pub use server::{run, AppState};
pub use types::{FieldOpsError, Result};
