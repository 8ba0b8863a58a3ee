//! AuditEntry (§3.3): one persistent record of a CREATE/UPDATE/DELETE on one
//! configuration object, strictly totally ordered by `(timestamp, revision_id)`
//! within a single server tag (§5).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::selector::ServerTag;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModificationType {
    Create,
    Update,
    Delete,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub object_type: String,
    pub object_id: String,
    pub modification_type: ModificationType,
    pub timestamp: DateTime<Utc>,
    pub revision_id: u64,
    /// the server tag this entry was recorded under; audit entries attached
    /// to a write against `ALL_SERVERS`/`MULTIPLE_SERVERS` fan out to one
    /// entry per affected tag so ordering within one tag stays total (§5).
    pub server_tag: ServerTag,
}
