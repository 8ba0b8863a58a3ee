//! Request contexts (§4.4 "Inputs"). Wire parsing and relay-agent/link-address
//! subnet resolution happen upstream, out of scope here; the engine receives
//! an already-resolved starting subnet id plus client identity.

use std::net::{Ipv4Addr, Ipv6Addr};
use std::time::Instant;

use lease_store::{ClientIdentifier, Duid, HardwareAddress, Iaid, LeaseType, SubnetId};

/// A v4 DISCOVER/REQUEST-equivalent: find or revise a lease for this client.
#[derive(Debug, Clone)]
pub struct AllocateRequest4 {
    pub subnet_id: SubnetId,
    pub hardware_address: Option<HardwareAddress>,
    pub client_id: Option<ClientIdentifier>,
    /// A client-supplied hint (DHCP option 50); honored only if it still
    /// falls in an active pool.
    pub requested_address: Option<Ipv4Addr>,
    pub valid_lifetime: u32,
    pub t1: u32,
    pub t2: u32,
    pub deadline: Instant,
}

/// A v4 RENEW/REBIND: the client already knows its address.
#[derive(Debug, Clone)]
pub struct RenewRequest4 {
    pub subnet_id: SubnetId,
    pub address: Ipv4Addr,
    pub valid_lifetime: u32,
    pub t1: u32,
    pub t2: u32,
}

/// The v6 analogue of [`AllocateRequest4`], keyed by DUID+IAID rather than
/// hardware address / client identifier.
#[derive(Debug, Clone)]
pub struct AllocateRequest6 {
    pub subnet_id: SubnetId,
    pub duid: Duid,
    pub iaid: Iaid,
    /// NA/TA draw from a subnet's address pools; PD draws whole prefixes
    /// from its pd-pools (§3.2, §4.4).
    pub lease_type: LeaseType,
    /// A client hint: a requested address for NA/TA, or a requested prefix
    /// for PD (DHCPv6 IA_PD's IAPREFIX).
    pub requested_address: Option<Ipv6Addr>,
    pub preferred_lifetime: u32,
    pub valid_lifetime: u32,
    pub t1: u32,
    pub t2: u32,
    pub deadline: Instant,
}

#[derive(Debug, Clone)]
pub struct RenewRequest6 {
    pub subnet_id: SubnetId,
    pub address: Ipv6Addr,
    pub lease_type: LeaseType,
    pub preferred_lifetime: u32,
    pub valid_lifetime: u32,
    pub t1: u32,
    pub t2: u32,
}
