//! OptionDefinition and OptionDescriptor (§3.3): `(code, space)` keyed option
//! metadata, and option instances carried at one of five scopes.

use std::collections::BTreeSet;
use std::net::{IpAddr, Ipv6Addr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::entity::subnet::SubnetId;
use crate::selector::ServerTag;

/// `(code, space)` uniquely identifies a definition per server tag, for codes
/// outside the standard-option range (§3.3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptionDefinition {
    pub code: u32,
    pub space: String,
    /// Kea-style record type tag, e.g. `"uint32"`, `"ipv4-address"`, `"string"`.
    pub record_type: String,
    pub encapsulated_space: Option<String>,
    pub array: bool,
    pub tags: BTreeSet<ServerTag>,
    pub modified_at: DateTime<Utc>,
}

impl OptionDefinition {
    pub fn key(&self) -> (u32, String) {
        (self.code, self.space.clone())
    }
}

/// One of the five addressing shapes an [`OptionDescriptor`] may be carried
/// at (§4.3 "Option scope addressing"). No two scopes share a primary key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum OptionScope {
    Global,
    SharedNetwork(String),
    Subnet(SubnetId),
    Pool { start: IpAddr, end: IpAddr },
    PdPool { prefix: Ipv6Addr, prefix_len: u8 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptionDescriptor {
    pub code: u32,
    pub space: String,
    pub scope: OptionScope,
    /// whether this option should be sent even if not requested.
    pub persistent: bool,
    pub formatted_value: String,
    /// a cancelled descriptor suppresses an option otherwise inherited from
    /// an enclosing scope (global < shared-network < subnet < pool/pd-pool).
    pub cancelled: bool,
    pub tags: BTreeSet<ServerTag>,
    pub modified_at: DateTime<Utc>,
}

impl OptionDescriptor {
    /// The primary key routing a write to the correct storage table (§4.3).
    pub fn key(&self) -> (OptionScope, u32, String) {
        (self.scope.clone(), self.code, self.space.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distinct_scopes_for_same_code_space_are_distinct_keys() {
        let mut base = OptionDescriptor {
            code: 6,
            space: "dhcp4".into(),
            scope: OptionScope::Global,
            persistent: false,
            formatted_value: "8.8.8.8".into(),
            cancelled: false,
            tags: BTreeSet::new(),
            modified_at: Utc::now(),
        };
        let global_key = base.key();
        base.scope = OptionScope::Subnet(7);
        let subnet_key = base.key();
        assert_ne!(global_key, subnet_key);
    }
}
