//! The lease data model: `Lease4`, `Lease6`, and the identifiers that key them.
//!
//! These are records, not classes — direct field access, no hidden behavior,
//! because every allocation and renewal touches one.

use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::LeaseStoreError;

/// Unique within a server's configuration; zero is reserved and never assigned to a lease.
pub type SubnetId = u32;

/// Meaningful only relative to a [`Duid`].
pub type Iaid = u32;

/// 2-255 opaque bytes identifying a v4 client (DHCP option 61, or the chaddr fallback).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ClientIdentifier(Vec<u8>);

impl ClientIdentifier {
    pub fn new(bytes: Vec<u8>) -> Result<Self, LeaseStoreError> {
        if (2..=255).contains(&bytes.len()) {
            Ok(Self(bytes))
        } else {
            Err(LeaseStoreError::BadValue(format!(
                "client identifier must be 2-255 bytes, got {}",
                bytes.len()
            )))
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

/// Hardware type tag plus 1-20 bytes of link-layer address.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct HardwareAddress {
    pub htype: u8,
    bytes: Vec<u8>,
}

impl HardwareAddress {
    pub fn new(htype: u8, bytes: Vec<u8>) -> Result<Self, LeaseStoreError> {
        if (1..=20).contains(&bytes.len()) {
            Ok(Self { htype, bytes })
        } else {
            Err(LeaseStoreError::BadValue(format!(
                "hardware address must be 1-20 bytes, got {}",
                bytes.len()
            )))
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

/// 1-128 opaque bytes, the v6 analogue of a client identifier.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Duid(Vec<u8>);

impl Duid {
    pub fn new(bytes: Vec<u8>) -> Result<Self, LeaseStoreError> {
        if (1..=128).contains(&bytes.len()) {
            Ok(Self(bytes))
        } else {
            Err(LeaseStoreError::BadValue(format!(
                "DUID must be 1-128 bytes, got {}",
                bytes.len()
            )))
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LeaseType {
    Na,
    Ta,
    Pd,
}

impl fmt::Display for LeaseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LeaseType::Na => write!(f, "NA"),
            LeaseType::Ta => write!(f, "TA"),
            LeaseType::Pd => write!(f, "PD"),
        }
    }
}

/// Persisted lease state. The engine's in-flight states (ALLOCATING, RENEWED) are
/// never written to storage — they exist only as the caller's intent before commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LeaseState {
    Default,
    Declined,
    ExpiredReclaimed,
}

impl LeaseState {
    pub fn is_reclaimed(self) -> bool {
        matches!(self, LeaseState::ExpiredReclaimed)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lease4 {
    pub address: Ipv4Addr,
    pub hardware_address: Option<HardwareAddress>,
    pub client_id: Option<ClientIdentifier>,
    pub valid_lifetime: u32,
    pub t1: u32,
    pub t2: u32,
    pub cltt: DateTime<Utc>,
    pub subnet_id: SubnetId,
    pub fixed: bool,
    pub hostname: String,
    pub fqdn_fwd: bool,
    pub fqdn_rev: bool,
    pub state: LeaseState,
    pub user_context: serde_json::Value,
}

impl Lease4 {
    /// `T1 <= T2 <= valid_lft` whenever any of T1, T2 are non-zero (§3.2).
    pub fn validate(&self) -> Result<(), LeaseStoreError> {
        if (self.t1 != 0 || self.t2 != 0) && !(self.t1 <= self.t2 && self.t2 <= self.valid_lifetime)
        {
            return Err(LeaseStoreError::BadValue(format!(
                "t1 ({}) <= t2 ({}) <= valid_lifetime ({}) violated",
                self.t1, self.t2, self.valid_lifetime
            )));
        }
        Ok(())
    }

    /// `valid_lft > 0` implies the lease is active until `cltt + valid_lft` (§3.2).
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.valid_lifetime > 0
            && self.state == LeaseState::Default
            && now < self.cltt + chrono::Duration::seconds(self.valid_lifetime as i64)
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.valid_lifetime > 0
            && now >= self.cltt + chrono::Duration::seconds(self.valid_lifetime as i64)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lease6 {
    pub address: Ipv6Addr,
    pub prefix_len: u8,
    pub lease_type: LeaseType,
    pub duid: Duid,
    pub iaid: Iaid,
    pub hardware_address: Option<HardwareAddress>,
    pub preferred_lifetime: u32,
    pub valid_lifetime: u32,
    pub t1: u32,
    pub t2: u32,
    pub cltt: DateTime<Utc>,
    pub subnet_id: SubnetId,
    pub fixed: bool,
    pub hostname: String,
    pub fqdn_fwd: bool,
    pub fqdn_rev: bool,
    pub state: LeaseState,
    pub user_context: serde_json::Value,
}

impl Lease6 {
    pub fn validate(&self) -> Result<(), LeaseStoreError> {
        if self.prefix_len > 128 {
            return Err(LeaseStoreError::BadValue(format!(
                "prefix length must be 0-128, got {}",
                self.prefix_len
            )));
        }
        if self.lease_type != LeaseType::Pd && self.prefix_len != 128 {
            return Err(LeaseStoreError::BadValue(
                "non-PD leases must carry prefix length 128".into(),
            ));
        }
        if (self.t1 != 0 || self.t2 != 0) && !(self.t1 <= self.t2 && self.t2 <= self.valid_lifetime)
        {
            return Err(LeaseStoreError::BadValue(format!(
                "t1 ({}) <= t2 ({}) <= valid_lifetime ({}) violated",
                self.t1, self.t2, self.valid_lifetime
            )));
        }
        Ok(())
    }

    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.valid_lifetime > 0
            && self.state == LeaseState::Default
            && now < self.cltt + chrono::Duration::seconds(self.valid_lifetime as i64)
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.valid_lifetime > 0
            && now >= self.cltt + chrono::Duration::seconds(self.valid_lifetime as i64)
    }

    /// Primary key per §3.2: a PD lease is keyed by its prefix, i.e. (address, type).
    pub fn key(&self) -> (Ipv6Addr, LeaseType) {
        (self.address, self.lease_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_identifier_rejects_out_of_range_lengths() {
        assert!(ClientIdentifier::new(vec![1]).is_err());
        assert!(ClientIdentifier::new(vec![0; 256]).is_err());
        assert!(ClientIdentifier::new(vec![1, 2]).is_ok());
    }

    #[test]
    fn hardware_address_rejects_out_of_range_lengths() {
        assert!(HardwareAddress::new(1, vec![]).is_err());
        assert!(HardwareAddress::new(1, vec![0; 21]).is_err());
        assert!(HardwareAddress::new(1, vec![0xaa; 6]).is_ok());
    }

    #[test]
    fn duid_rejects_out_of_range_lengths() {
        assert!(Duid::new(vec![]).is_err());
        assert!(Duid::new(vec![0; 129]).is_err());
        assert!(Duid::new(vec![1; 14]).is_ok());
    }

    fn sample_lease4() -> Lease4 {
        Lease4 {
            address: Ipv4Addr::new(192, 0, 2, 3),
            hardware_address: None,
            client_id: None,
            valid_lifetime: 3600,
            t1: 1800,
            t2: 3150,
            cltt: Utc::now(),
            subnet_id: 7,
            fixed: false,
            hostname: String::new(),
            fqdn_fwd: false,
            fqdn_rev: false,
            state: LeaseState::Default,
            user_context: serde_json::Value::Null,
        }
    }

    #[test]
    fn lease4_rejects_t1_t2_out_of_order() {
        let mut lease = sample_lease4();
        lease.t1 = 3200;
        lease.t2 = 1800;
        assert!(lease.validate().is_err());
    }

    #[test]
    fn lease4_zero_t1_t2_always_valid() {
        let mut lease = sample_lease4();
        lease.t1 = 0;
        lease.t2 = 0;
        lease.valid_lifetime = 10;
        assert!(lease.validate().is_ok());
    }

    #[test]
    fn pd_lease_requires_prefix_length_field() {
        let lease = Lease6 {
            address: "2001:db8::".parse().unwrap(),
            prefix_len: 56,
            lease_type: LeaseType::Pd,
            duid: Duid::new(vec![1, 2, 3]).unwrap(),
            iaid: 1,
            hardware_address: None,
            preferred_lifetime: 1800,
            valid_lifetime: 3600,
            t1: 0,
            t2: 0,
            cltt: Utc::now(),
            subnet_id: 1,
            fixed: false,
            hostname: String::new(),
            fqdn_fwd: false,
            fqdn_rev: false,
            state: LeaseState::Default,
            user_context: serde_json::Value::Null,
        };
        assert!(lease.validate().is_ok());
        assert_eq!(lease.key(), ("2001:db8::".parse().unwrap(), LeaseType::Pd));
    }

    #[test]
    fn na_lease_rejects_non_128_prefix() {
        let mut lease = Lease6 {
            address: "2001:db8::1".parse().unwrap(),
            prefix_len: 64,
            lease_type: LeaseType::Na,
            duid: Duid::new(vec![1, 2, 3]).unwrap(),
            iaid: 1,
            hardware_address: None,
            preferred_lifetime: 1800,
            valid_lifetime: 3600,
            t1: 0,
            t2: 0,
            cltt: Utc::now(),
            subnet_id: 1,
            fixed: false,
            hostname: String::new(),
            fqdn_fwd: false,
            fqdn_rev: false,
            state: LeaseState::Default,
            user_context: serde_json::Value::Null,
        };
        assert!(lease.validate().is_err());
        lease.prefix_len = 128;
        assert!(lease.validate().is_ok());
    }
}
