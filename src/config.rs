//! Configuration for fieldops
//!
//! CLI arguments and environment variable handling using clap.

use chrono::{FixedOffset, NaiveDate, Offset, Utc};
use clap::Parser;
use std::net::SocketAddr;

/// Longest assignment horizon a deployment may configure
const MAX_WINDOW_DAYS: i64 = 90;

/// fieldops - field operations backend
#[derive(Parser, Debug, Clone)]
#[command(name = "fieldops")]
#[command(about = "School assignment and audit backend for field trainers")]
pub struct Args {
    /// Address to listen on
    #[arg(long, env = "LISTEN", default_value = "0.0.0.0:10000")]
    pub listen: SocketAddr,

    /// Enable development mode (disables bearer checks, in-memory fallbacks)
    #[arg(long, env = "DEV_MODE", default_value = "false")]
    pub dev_mode: bool,

    /// MongoDB connection URI
    #[arg(long, env = "MONGODB_URI", default_value = "mongodb://localhost:27017")]
    pub mongodb_uri: String,

    /// MongoDB database name
    #[arg(long, env = "MONGODB_DB", default_value = "fieldops")]
    pub mongodb_db: String,

    /// JWT secret for token signing (required in production)
    #[arg(long, env = "JWT_SECRET")]
    pub jwt_secret: Option<String>,

    /// Access token expiry in seconds
    #[arg(long, env = "JWT_EXPIRY_SECONDS", default_value = "7200")]
    pub jwt_expiry_seconds: u64,

    /// Refresh token expiry in seconds
    #[arg(long, env = "REFRESH_EXPIRY_SECONDS", default_value = "604800")]
    pub refresh_expiry_seconds: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Base URL of the blob store holding audit photos
    /// (e.g., "http://localhost:8091")
    #[arg(long, env = "STORAGE_URL")]
    pub storage_url: Option<String>,

    /// Offset of the business timezone from UTC, in minutes (330 = IST)
    #[arg(long, env = "UTC_OFFSET_MINUTES", default_value = "330")]
    pub utc_offset_minutes: i32,

    /// How many days ahead a controller may assign schools
    #[arg(long, env = "ASSIGNMENT_WINDOW_DAYS", default_value = "7")]
    pub assignment_window_days: i64,

    /// Default trailing window for audit-status sync
    #[arg(long, env = "SYNC_WINDOW_DAYS", default_value = "7")]
    pub sync_window_days: i64,
}

impl Args {
    /// Get effective JWT secret (uses default in dev mode)
    pub fn jwt_secret(&self) -> Option<String> {
        match (&self.jwt_secret, self.dev_mode) {
            (Some(secret), _) => Some(secret.clone()),
            (None, true) => Some("dev-only-insecure-secret-for-local-testing".to_string()),
            (None, false) => None,
        }
    }

    /// Business timezone
    pub fn timezone(&self) -> FixedOffset {
        FixedOffset::east_opt(self.utc_offset_minutes * 60)
            .unwrap_or_else(|| Utc.fix())
    }

    /// Current calendar date in the business timezone
    pub fn today(&self) -> NaiveDate {
        Utc::now().with_timezone(&self.timezone()).date_naive()
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if !self.dev_mode && self.jwt_secret.is_none() {
            return Err("JWT_SECRET is required in production mode".to_string());
        }

        if FixedOffset::east_opt(self.utc_offset_minutes * 60).is_none() {
            return Err("UTC_OFFSET_MINUTES must be within +/- 24 hours".to_string());
        }

        if !(0..=MAX_WINDOW_DAYS).contains(&self.assignment_window_days) {
            return Err(format!(
                "ASSIGNMENT_WINDOW_DAYS must be between 0 and {}",
                MAX_WINDOW_DAYS
            ));
        }

        if !(0..=MAX_WINDOW_DAYS).contains(&self.sync_window_days) {
            return Err(format!("SYNC_WINDOW_DAYS must be between 0 and {}", MAX_WINDOW_DAYS));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(extra: &[&str]) -> Args {
        let mut argv = vec!["fieldops"];
        argv.extend_from_slice(extra);
        Args::parse_from(argv)
    }

    #[test]
    fn test_production_requires_secret() {
        let mut args = parse(&[]);
        args.dev_mode = false;
        args.jwt_secret = None;
        assert!(args.validate().is_err());

        let args = parse(&["--jwt-secret", "a-secret-that-is-long-enough-for-hs256"]);
        assert!(args.validate().is_ok());
    }

    #[test]
    fn test_dev_mode_secret_fallback() {
        let mut args = parse(&[]);
        args.jwt_secret = None;
        args.dev_mode = true;
        assert!(args.jwt_secret().is_some());
        assert!(args.validate().is_ok());
    }

    #[test]
    fn test_window_bounds() {
        let mut args = parse(&["--jwt-secret", "a-secret-that-is-long-enough-for-hs256"]);
        args.assignment_window_days = -1;
        assert!(args.validate().is_err());
        args.assignment_window_days = 7;
        args.sync_window_days = 365;
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_timezone_offset() {
        let args = parse(&["--utc-offset-minutes", "330"]);
        assert_eq!(args.timezone().local_minus_utc(), 330 * 60);
    }
}
