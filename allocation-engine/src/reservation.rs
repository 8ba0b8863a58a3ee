//! Host reservations. Not one of the configuration entities in §3.3 (no
//! `Reservation` row exists in `config-backend`); the engine treats the
//! reservation list as a fourth snapshot input supplied at publish time,
//! generalizing the `Reserved` record `static-addr` looks up per-subnet.

use std::net::{Ipv6Addr, Ipv4Addr};

use lease_store::{ClientIdentifier, Duid, HardwareAddress, SubnetId};

/// A fixed v4 address bound to a client identity, scoped to one subnet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostReservation4 {
    pub subnet_id: SubnetId,
    pub address: Ipv4Addr,
    pub hardware_address: Option<HardwareAddress>,
    pub client_id: Option<ClientIdentifier>,
}

impl HostReservation4 {
    pub(crate) fn matches(
        &self,
        hardware_address: Option<&HardwareAddress>,
        client_id: Option<&ClientIdentifier>,
    ) -> bool {
        if let (Some(a), Some(b)) = (self.client_id.as_ref(), client_id) {
            if a == b {
                return true;
            }
        }
        if let (Some(a), Some(b)) = (self.hardware_address.as_ref(), hardware_address) {
            if a == b {
                return true;
            }
        }
        false
    }
}

/// The v6 analogue of [`HostReservation4`], keyed by DUID rather than hardware
/// address or client identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostReservation6 {
    pub subnet_id: SubnetId,
    pub address: Ipv6Addr,
    pub duid: Duid,
}

impl HostReservation6 {
    pub(crate) fn matches(&self, duid: &Duid) -> bool {
        &self.duid == duid
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reservation4_matches_on_either_identity() {
        let cid = ClientIdentifier::new(vec![1, 2, 3]).unwrap();
        let reservation = HostReservation4 {
            subnet_id: 1,
            address: "192.0.2.50".parse().unwrap(),
            hardware_address: None,
            client_id: Some(cid.clone()),
        };
        assert!(reservation.matches(None, Some(&cid)));
        assert!(!reservation.matches(None, None));
    }
}
