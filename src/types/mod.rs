//! Shared types for fieldops

mod error;

pub use error::{FieldOpsError, Result};
