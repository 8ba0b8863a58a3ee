//! The immutable, publish-swap configuration view the engine reads through
//! (§5 "Shared-resource policy"). Built off-path from a [`ConfigBackend`] and
//! installed with a single pointer swap; a request holds one `Arc` for its
//! whole lifetime and never observes a torn configuration.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use config_backend::entity::{SharedNetwork4, SharedNetwork6, Subnet4, Subnet6};
use config_backend::{ConfigBackend, ConfigBackendError, ServerSelector};
use lease_store::SubnetId;

use crate::reservation::{HostReservation4, HostReservation6};

/// A consistent, point-in-time view of the v4 side of the configuration.
#[derive(Debug, Clone)]
pub struct ConfigSnapshot4 {
    subnets: BTreeMap<SubnetId, Subnet4>,
    shared_networks: BTreeMap<String, SharedNetwork4>,
    reservations: Vec<HostReservation4>,
    built_at: DateTime<Utc>,
}

impl ConfigSnapshot4 {
    /// An empty snapshot, for callers that assemble one field at a time
    /// (tests, or a reconfiguration source other than a [`ConfigBackend`]).
    pub fn empty() -> Self {
        Self {
            subnets: BTreeMap::new(),
            shared_networks: BTreeMap::new(),
            reservations: Vec::new(),
            built_at: Utc::now(),
        }
    }

    pub fn insert_subnet(&mut self, subnet: Subnet4) {
        self.subnets.insert(subnet.id, subnet);
    }

    pub fn insert_shared_network(&mut self, network: SharedNetwork4) {
        self.shared_networks.insert(network.name.clone(), network);
    }

    /// Reads every subnet and shared network visible to `selector` off a
    /// backend. Reservations are not a `config-backend` entity (§3.3 lists
    /// none); callers assemble them from whatever external source holds host
    /// records and pass them in whole, same as wire parsing is out of scope.
    pub async fn load(
        backend: &dyn ConfigBackend,
        selector: &ServerSelector,
        reservations: Vec<HostReservation4>,
    ) -> Result<Self, ConfigBackendError> {
        let subnets = backend
            .get_all_subnet4(selector)
            .await?
            .into_iter()
            .map(|s| (s.id, s))
            .collect();
        let shared_networks = backend
            .get_all_shared_network4(selector)
            .await?
            .into_iter()
            .map(|n| (n.name.clone(), n))
            .collect();
        Ok(Self {
            subnets,
            shared_networks,
            reservations,
            built_at: Utc::now(),
        })
    }

    pub fn subnet(&self, id: SubnetId) -> Option<&Subnet4> {
        self.subnets.get(&id)
    }

    /// Candidate subnets for an incoming request, in allocation order (§4.4
    /// step 1). A subnet belonging to a shared network expands to that
    /// network's member list in declaration order; otherwise it is the sole
    /// candidate.
    pub fn candidate_subnets(&self, start: SubnetId) -> Vec<&Subnet4> {
        let Some(subnet) = self.subnets.get(&start) else {
            return Vec::new();
        };
        match subnet.shared_network.as_deref().and_then(|name| self.shared_networks.get(name)) {
            Some(network) => network
                .subnet_ids
                .iter()
                .filter_map(|id| self.subnets.get(id))
                .collect(),
            None => vec![subnet],
        }
    }

    pub fn reservation_for(
        &self,
        hardware_address: Option<&lease_store::HardwareAddress>,
        client_id: Option<&lease_store::ClientIdentifier>,
    ) -> Option<&HostReservation4> {
        self.reservations
            .iter()
            .find(|r| r.matches(hardware_address, client_id))
    }

    pub fn built_at(&self) -> DateTime<Utc> {
        self.built_at
    }
}

/// The v6 analogue of [`ConfigSnapshot4`].
#[derive(Debug, Clone)]
pub struct ConfigSnapshot6 {
    subnets: BTreeMap<SubnetId, Subnet6>,
    shared_networks: BTreeMap<String, SharedNetwork6>,
    reservations: Vec<HostReservation6>,
    built_at: DateTime<Utc>,
}

impl ConfigSnapshot6 {
    pub fn empty() -> Self {
        Self {
            subnets: BTreeMap::new(),
            shared_networks: BTreeMap::new(),
            reservations: Vec::new(),
            built_at: Utc::now(),
        }
    }

    pub fn insert_subnet(&mut self, subnet: Subnet6) {
        self.subnets.insert(subnet.id, subnet);
    }

    pub fn insert_shared_network(&mut self, network: SharedNetwork6) {
        self.shared_networks.insert(network.name.clone(), network);
    }

    pub async fn load(
        backend: &dyn ConfigBackend,
        selector: &ServerSelector,
        reservations: Vec<HostReservation6>,
    ) -> Result<Self, ConfigBackendError> {
        let subnets = backend
            .get_all_subnet6(selector)
            .await?
            .into_iter()
            .map(|s| (s.id, s))
            .collect();
        let shared_networks = backend
            .get_all_shared_network6(selector)
            .await?
            .into_iter()
            .map(|n| (n.name.clone(), n))
            .collect();
        Ok(Self {
            subnets,
            shared_networks,
            reservations,
            built_at: Utc::now(),
        })
    }

    pub fn subnet(&self, id: SubnetId) -> Option<&Subnet6> {
        self.subnets.get(&id)
    }

    pub fn candidate_subnets(&self, start: SubnetId) -> Vec<&Subnet6> {
        let Some(subnet) = self.subnets.get(&start) else {
            return Vec::new();
        };
        match subnet.shared_network.as_deref().and_then(|name| self.shared_networks.get(name)) {
            Some(network) => network
                .subnet_ids
                .iter()
                .filter_map(|id| self.subnets.get(id))
                .collect(),
            None => vec![subnet],
        }
    }

    pub fn reservation_for(&self, duid: &lease_store::Duid) -> Option<&HostReservation6> {
        self.reservations.iter().find(|r| r.matches(duid))
    }

    pub fn built_at(&self) -> DateTime<Utc> {
        self.built_at
    }
}

/// Owns the published snapshot behind a single swappable pointer. Cloning
/// the handle is cheap; every clone sees the same snapshot until the next
/// [`SnapshotHandle::publish`].
#[derive(Debug, Clone)]
pub struct SnapshotHandle<T> {
    inner: Arc<RwLock<Arc<T>>>,
}

impl<T> SnapshotHandle<T> {
    pub fn new(initial: T) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Arc::new(initial))),
        }
    }

    /// The snapshot in effect right now. Hold the returned `Arc` for the
    /// duration of one request; a concurrent `publish` never invalidates it.
    pub fn current(&self) -> Arc<T> {
        self.inner.read().clone()
    }

    /// Installs a new snapshot built off-path, with a single pointer swap
    /// (§5). In-flight requests holding the previous `Arc` are unaffected.
    pub fn publish(&self, snapshot: T) {
        *self.inner.write() = Arc::new(snapshot);
    }
}

pub type SnapshotHandle4 = SnapshotHandle<ConfigSnapshot4>;
pub type SnapshotHandle6 = SnapshotHandle<ConfigSnapshot6>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn subnet4(id: SubnetId, shared_network: Option<&str>) -> Subnet4 {
        Subnet4 {
            id,
            prefix: "192.0.2.0/24".parse().unwrap(),
            pools: vec![],
            shared_network: shared_network.map(str::to_string),
            parameters: Default::default(),
            tags: BTreeSet::new(),
            modified_at: Utc::now(),
        }
    }

    #[test]
    fn candidate_subnets_expands_shared_network_in_declaration_order() {
        let mut subnets = BTreeMap::new();
        subnets.insert(1, subnet4(1, Some("campus")));
        subnets.insert(2, subnet4(2, Some("campus")));
        let mut shared_networks = BTreeMap::new();
        shared_networks.insert(
            "campus".to_string(),
            SharedNetwork4 {
                name: "campus".to_string(),
                subnet_ids: vec![2, 1],
                parameters: Default::default(),
                tags: BTreeSet::new(),
                modified_at: Utc::now(),
            },
        );
        let snapshot = ConfigSnapshot4 {
            subnets,
            shared_networks,
            reservations: vec![],
            built_at: Utc::now(),
        };
        let ids: Vec<_> = snapshot.candidate_subnets(1).iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![2, 1]);
    }

    #[test]
    fn publish_swaps_without_disturbing_held_references() {
        let handle = SnapshotHandle4::new(ConfigSnapshot4 {
            subnets: BTreeMap::new(),
            shared_networks: BTreeMap::new(),
            reservations: vec![],
            built_at: Utc::now(),
        });
        let held = handle.current();
        handle.publish(ConfigSnapshot4 {
            subnets: BTreeMap::from([(9, subnet4(9, None))]),
            shared_networks: BTreeMap::new(),
            reservations: vec![],
            built_at: Utc::now(),
        });
        assert!(held.subnet(9).is_none());
        assert!(handle.current().subnet(9).is_some());
    }
}
