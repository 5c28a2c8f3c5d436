//! Audit status enums shared by assignments and audits

use serde::{Deserialize, Serialize};
use std::fmt;

/// State of an audit document
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuditState {
    #[default]
    InProgress,
    Completed,
}

impl AuditState {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditState::InProgress => "in_progress",
            AuditState::Completed => "completed",
        }
    }
}

/// Per-school status inside an assignment.
///
/// Only moves forward: pending -> in_progress -> completed. The one way back
/// to pending is an in_progress audit found to have no content.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AuditStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
}

impl AuditStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditStatus::Pending => "pending",
            AuditStatus::InProgress => "in_progress",
            AuditStatus::Completed => "completed",
        }
    }
}

impl From<AuditState> for AuditStatus {
    fn from(state: AuditState) -> Self {
        match state {
            AuditState::InProgress => AuditStatus::InProgress,
            AuditState::Completed => AuditStatus::Completed,
        }
    }
}

impl fmt::Display for AuditStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for AuditState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
