//! SharedNetwork (§3.3): a set of subnets treated as one allocation pool.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::entity::subnet::SubnetId;
use crate::selector::ServerTag;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SharedNetwork4 {
    pub name: String,
    /// each subnet belongs to at most one shared network; member order is
    /// the declaration order used as the allocation engine's pool tie-break
    /// (DESIGN.md Open Question (b)).
    pub subnet_ids: Vec<SubnetId>,
    pub parameters: BTreeMap<String, String>,
    pub tags: BTreeSet<ServerTag>,
    pub modified_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SharedNetwork6 {
    pub name: String,
    pub subnet_ids: Vec<SubnetId>,
    pub parameters: BTreeMap<String, String>,
    pub tags: BTreeSet<ServerTag>,
    pub modified_at: DateTime<Utc>,
}
