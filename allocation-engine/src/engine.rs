//! The stateful allocation coordinator (§4.4): given a client request and
//! the currently published configuration snapshot, produces or revises a
//! lease through the lease store while honoring pool boundaries,
//! reservations, and the per-lease state machine.
//!
//! Grounded on `plugins::leases::Leases::discover`/`request`/`release`/
//! `decline` for the request/response shape, and on
//! `ip_manager::IpManager::reserve_first`'s bounded retry loop for the
//! free-pool picking walk.

use std::net::{Ipv4Addr, Ipv6Addr};
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tracing::{debug, instrument, warn};

use config_backend::entity::{PdPool, Pool4, Pool6, Subnet4, Subnet6};
use lease_store::{
    ClientIdentifier, Duid, HardwareAddress, Iaid, Lease4, Lease6, LeaseState, LeaseStore4,
    LeaseStore6, LeaseType, SubnetId,
};

use crate::error::AllocationError;
use crate::picker::PickerStrategy;
use crate::request::{AllocateRequest4, AllocateRequest6, RenewRequest4, RenewRequest6};
use crate::retry::{retry_db, RetryPolicy};
use crate::snapshot::{ConfigSnapshot4, ConfigSnapshot6, SnapshotHandle4, SnapshotHandle6};

/// Default bounded retry count per subnet when a subnet doesn't override it
/// via a `max-address-tries` parameter (§4.4 "bounded retry count
/// configured per subnet, default 50").
const DEFAULT_MAX_ADDRESS_TRIES: u32 = 50;

fn max_address_tries(parameters: &std::collections::BTreeMap<String, String>) -> u32 {
    parameters
        .get("max-address-tries")
        .and_then(|v| v.parse().ok())
        .unwrap_or(DEFAULT_MAX_ADDRESS_TRIES)
}

fn picker_strategy(parameters: &std::collections::BTreeMap<String, String>) -> PickerStrategy {
    PickerStrategy::from_parameter(parameters.get("allocator").map(String::as_str))
}

/// Coordinates IPv4 lease allocation, renewal, release and decline on top of
/// a [`LeaseStore4`] and a published [`ConfigSnapshot4`].
pub struct AllocationEngine4 {
    store: Arc<dyn LeaseStore4>,
    snapshot: SnapshotHandle4,
    retry_policy: RetryPolicy,
}

impl std::fmt::Debug for AllocationEngine4 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AllocationEngine4").field("store", &self.store.name()).finish()
    }
}

impl AllocationEngine4 {
    pub fn new(store: Arc<dyn LeaseStore4>, snapshot: SnapshotHandle4) -> Self {
        Self {
            store,
            snapshot,
            retry_policy: RetryPolicy::default(),
        }
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    /// §4.4 algorithm, steps 1-3: resolve candidate subnets (expanding
    /// shared networks), prefer renewing an existing lease, otherwise
    /// allocate from a reservation or free pool, retrying across candidate
    /// subnets until the deadline or the combined retry budget is spent.
    #[instrument(level = "debug", skip(self, req), fields(subnet_id = req.subnet_id))]
    pub async fn allocate(&self, req: AllocateRequest4) -> Result<Lease4, AllocationError> {
        let snapshot = self.snapshot.current();
        let candidates = snapshot.candidate_subnets(req.subnet_id);
        if candidates.is_empty() {
            return Err(AllocationError::NoAddressAvailable);
        }

        for subnet in candidates {
            if Instant::now() >= req.deadline {
                return Err(AllocationError::NoAddressAvailable);
            }

            if let Some(existing) = self
                .existing_lease(subnet.id, req.hardware_address.as_ref(), req.client_id.as_ref())
                .await?
            {
                if existing.is_active(Utc::now()) && subnet.pools.iter().any(|p| p.contains(existing.address)) {
                    return self.renew_lease(existing, req.valid_lifetime, req.t1, req.t2).await;
                }
            }

            if let Some(reservation) = snapshot
                .reservation_for(req.hardware_address.as_ref(), req.client_id.as_ref())
                .filter(|r| r.subnet_id == subnet.id)
            {
                if let Some(lease) = self.try_reserved_address(&req, subnet, reservation.address).await? {
                    return Ok(lease);
                }
                // reservation conflicts with another client's active lease;
                // §4.4 falls back to free-pool allocation for this subnet.
            }

            if let Some(lease) = self.pick_from_pools(&req, subnet).await? {
                return Ok(lease);
            }
        }

        Err(AllocationError::NoAddressAvailable)
    }

    /// §4.4 step 2a applied directly: the client already knows its address
    /// (RENEW/REBIND) and the engine only needs to re-validate and bump
    /// lifetimes.
    #[instrument(level = "debug", skip(self, req), fields(subnet_id = req.subnet_id, address = %req.address))]
    pub async fn renew(&self, req: RenewRequest4) -> Result<Lease4, AllocationError> {
        let snapshot = self.snapshot.current();
        let subnet = snapshot.subnet(req.subnet_id).ok_or(AllocationError::NoSuchLease)?;
        let lease = retry_db(&self.retry_policy, || {
            self.store.get_by_address(req.address, Some(req.subnet_id))
        })
        .await?
        .ok_or(AllocationError::NoSuchLease)?;

        if !subnet.pools.iter().any(|p| p.contains(req.address)) {
            return Err(AllocationError::BadValue(format!(
                "address {} no longer lies in an active pool of subnet {}",
                req.address, req.subnet_id
            )));
        }

        self.renew_lease(lease, req.valid_lifetime, req.t1, req.t2).await
    }

    /// Moves a lease to DECLINED, clears client identifiers, and sets a
    /// quarantine expiry; the reclaimer returns it to the free pool once
    /// `quarantine` has elapsed (§4.4 "Decline handling").
    #[instrument(level = "debug", skip(self), fields(%address))]
    pub async fn decline(
        &self,
        address: Ipv4Addr,
        subnet_id: SubnetId,
        quarantine_secs: u32,
    ) -> Result<(), AllocationError> {
        let mut lease = retry_db(&self.retry_policy, || self.store.get_by_address(address, Some(subnet_id)))
            .await?
            .ok_or(AllocationError::NoSuchLease)?;
        lease.state = LeaseState::Declined;
        lease.hardware_address = None;
        lease.client_id = None;
        lease.cltt = Utc::now();
        lease.valid_lifetime = quarantine_secs;
        lease.t1 = 0;
        lease.t2 = 0;
        retry_db(&self.retry_policy, || self.store.update(lease.clone())).await?;
        Ok(())
    }

    /// ACTIVE -> EXPIRED_RECLAIMED (§4.4 state machine).
    #[instrument(level = "debug", skip(self), fields(%address))]
    pub async fn release(&self, address: Ipv4Addr, subnet_id: SubnetId) -> Result<(), AllocationError> {
        let mut lease = retry_db(&self.retry_policy, || self.store.get_by_address(address, Some(subnet_id)))
            .await?
            .ok_or(AllocationError::NoSuchLease)?;
        lease.state = LeaseState::ExpiredReclaimed;
        lease.valid_lifetime = 0;
        retry_db(&self.retry_policy, || self.store.update(lease.clone())).await?;
        Ok(())
    }

    async fn existing_lease(
        &self,
        subnet_id: SubnetId,
        hwaddr: Option<&HardwareAddress>,
        client_id: Option<&ClientIdentifier>,
    ) -> Result<Option<Lease4>, AllocationError> {
        if let Some(cid) = client_id {
            let mut leases =
                retry_db(&self.retry_policy, || self.store.get_by_client_id(cid, Some(subnet_id))).await?;
            if let Some(lease) = leases.pop() {
                return Ok(Some(lease));
            }
        }
        if let Some(hw) = hwaddr {
            let mut leases =
                retry_db(&self.retry_policy, || self.store.get_by_hwaddr(hw, Some(subnet_id))).await?;
            if let Some(lease) = leases.pop() {
                return Ok(Some(lease));
            }
        }
        Ok(None)
    }

    async fn renew_lease(
        &self,
        mut lease: Lease4,
        valid_lifetime: u32,
        t1: u32,
        t2: u32,
    ) -> Result<Lease4, AllocationError> {
        lease.valid_lifetime = valid_lifetime;
        lease.t1 = t1;
        lease.t2 = t2;
        lease.cltt = Utc::now();
        lease.validate().map_err(AllocationError::from)?;
        retry_db(&self.retry_policy, || self.store.update(lease.clone())).await?;
        Ok(lease)
    }

    async fn try_reserved_address(
        &self,
        req: &AllocateRequest4,
        subnet: &Subnet4,
        address: Ipv4Addr,
    ) -> Result<Option<Lease4>, AllocationError> {
        let lease = Lease4 {
            address,
            hardware_address: req.hardware_address.clone(),
            client_id: req.client_id.clone(),
            valid_lifetime: req.valid_lifetime,
            t1: req.t1,
            t2: req.t2,
            cltt: Utc::now(),
            subnet_id: subnet.id,
            fixed: true,
            hostname: String::new(),
            fqdn_fwd: false,
            fqdn_rev: false,
            state: LeaseState::Default,
            user_context: serde_json::Value::Null,
        };
        lease.validate().map_err(AllocationError::from)?;
        if retry_db(&self.retry_policy, || self.store.add_lease(lease.clone())).await? {
            return Ok(Some(lease));
        }
        warn!(%address, subnet_id = subnet.id, "reserved address is in use by another client");
        Ok(None)
    }

    async fn pick_from_pools(
        &self,
        req: &AllocateRequest4,
        subnet: &Subnet4,
    ) -> Result<Option<Lease4>, AllocationError> {
        let picker = picker_strategy(&subnet.parameters).picker4();
        let max_tries = max_address_tries(&subnet.parameters);
        let seed = request_seed4(req);

        // A client-supplied hint (DHCP option 50) is honored ahead of the
        // picker walk, but only if it still falls in one of this subnet's
        // active pools (§4.4 "Inputs").
        if let Some(hint) = req.requested_address {
            if let Some(pool) = subnet.pools.iter().find(|p| p.contains(hint)) {
                if let Some(lease) = self.try_candidate(req, subnet, pool, hint).await? {
                    return Ok(Some(lease));
                }
            }
        }

        for pool in &subnet.pools {
            for attempt in 0..max_tries {
                if Instant::now() >= req.deadline {
                    return Ok(None);
                }
                let Some(candidate) = picker.candidate(pool, &seed, attempt) else {
                    break;
                };
                if let Some(lease) = self.try_candidate(req, subnet, pool, candidate).await? {
                    return Ok(Some(lease));
                }
            }
        }
        Ok(None)
    }

    async fn try_candidate(
        &self,
        req: &AllocateRequest4,
        subnet: &Subnet4,
        pool: &Pool4,
        candidate: Ipv4Addr,
    ) -> Result<Option<Lease4>, AllocationError> {
        if !pool.contains(candidate) {
            return Ok(None);
        }
        if let Some(existing) = retry_db(&self.retry_policy, || self.store.get_by_address(candidate, None)).await? {
            if !existing.state.is_reclaimed() {
                return Ok(None);
            }
        }
        let lease = Lease4 {
            address: candidate,
            hardware_address: req.hardware_address.clone(),
            client_id: req.client_id.clone(),
            valid_lifetime: req.valid_lifetime,
            t1: req.t1,
            t2: req.t2,
            cltt: Utc::now(),
            subnet_id: subnet.id,
            fixed: false,
            hostname: String::new(),
            fqdn_fwd: false,
            fqdn_rev: false,
            state: LeaseState::Default,
            user_context: serde_json::Value::Null,
        };
        lease.validate().map_err(AllocationError::from)?;
        if retry_db(&self.retry_policy, || self.store.add_lease(lease.clone())).await? {
            debug!(address = %candidate, "allocated address from free pool");
            Ok(Some(lease))
        } else {
            // another worker won the race on this primary key; caller retries.
            Ok(None)
        }
    }
}

fn request_seed4(req: &AllocateRequest4) -> Vec<u8> {
    req.client_id
        .as_ref()
        .map(|c| c.as_bytes().to_vec())
        .or_else(|| req.hardware_address.as_ref().map(|h| h.as_bytes().to_vec()))
        .unwrap_or_default()
}

/// The v6 analogue of [`AllocationEngine4`]. NA/TA leases draw from a
/// subnet's address pools; PD leases draw whole prefixes from its pd-pools.
pub struct AllocationEngine6 {
    store: Arc<dyn LeaseStore6>,
    snapshot: SnapshotHandle6,
    retry_policy: RetryPolicy,
}

impl std::fmt::Debug for AllocationEngine6 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AllocationEngine6").field("store", &self.store.name()).finish()
    }
}

impl AllocationEngine6 {
    pub fn new(store: Arc<dyn LeaseStore6>, snapshot: SnapshotHandle6) -> Self {
        Self {
            store,
            snapshot,
            retry_policy: RetryPolicy::default(),
        }
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    #[instrument(level = "debug", skip(self, req), fields(subnet_id = req.subnet_id, lease_type = %req.lease_type))]
    pub async fn allocate(&self, req: AllocateRequest6) -> Result<Lease6, AllocationError> {
        let snapshot = self.snapshot.current();
        let candidates = snapshot.candidate_subnets(req.subnet_id);
        if candidates.is_empty() {
            return Err(AllocationError::NoAddressAvailable);
        }

        for subnet in candidates {
            if Instant::now() >= req.deadline {
                return Err(AllocationError::NoAddressAvailable);
            }

            if let Some(existing) = self.existing_lease(subnet.id, &req.duid, req.iaid, req.lease_type).await? {
                let in_pool = match req.lease_type {
                    LeaseType::Pd => subnet
                        .pd_pools
                        .iter()
                        .any(|p| prefix_in_pd_pool(p, existing.address)),
                    _ => subnet.pools.iter().any(|p| p.contains(existing.address)),
                };
                if existing.is_active(Utc::now()) && in_pool {
                    return self
                        .renew_lease(existing, req.preferred_lifetime, req.valid_lifetime, req.t1, req.t2)
                        .await;
                }
            }

            if let Some(reservation) = snapshot.reservation_for(&req.duid).filter(|r| r.subnet_id == subnet.id) {
                if req.lease_type != LeaseType::Pd {
                    if let Some(lease) = self.try_reserved_address(&req, subnet, reservation.address).await? {
                        return Ok(lease);
                    }
                }
            }

            let picked = match req.lease_type {
                LeaseType::Pd => self.pick_from_pd_pools(&req, subnet).await?,
                _ => self.pick_from_pools(&req, subnet).await?,
            };
            if let Some(lease) = picked {
                return Ok(lease);
            }
        }

        Err(AllocationError::NoAddressAvailable)
    }

    #[instrument(level = "debug", skip(self, req), fields(subnet_id = req.subnet_id, address = %req.address))]
    pub async fn renew(&self, req: RenewRequest6) -> Result<Lease6, AllocationError> {
        let snapshot = self.snapshot.current();
        let subnet = snapshot.subnet(req.subnet_id).ok_or(AllocationError::NoSuchLease)?;
        let lease = retry_db(&self.retry_policy, || {
            self.store.get_by_address(req.address, req.lease_type, Some(req.subnet_id))
        })
        .await?
        .ok_or(AllocationError::NoSuchLease)?;

        let in_pool = match req.lease_type {
            LeaseType::Pd => subnet.pd_pools.iter().any(|p| prefix_in_pd_pool(p, req.address)),
            _ => subnet.pools.iter().any(|p| p.contains(req.address)),
        };
        if !in_pool {
            return Err(AllocationError::BadValue(format!(
                "address {} no longer lies in an active pool of subnet {}",
                req.address, req.subnet_id
            )));
        }

        self.renew_lease(lease, req.preferred_lifetime, req.valid_lifetime, req.t1, req.t2)
            .await
    }

    #[instrument(level = "debug", skip(self), fields(%address))]
    pub async fn decline(
        &self,
        address: Ipv6Addr,
        lease_type: LeaseType,
        subnet_id: SubnetId,
        quarantine_secs: u32,
    ) -> Result<(), AllocationError> {
        let mut lease = retry_db(&self.retry_policy, || self.store.get_by_address(address, lease_type, Some(subnet_id)))
            .await?
            .ok_or(AllocationError::NoSuchLease)?;
        lease.state = LeaseState::Declined;
        lease.cltt = Utc::now();
        lease.valid_lifetime = quarantine_secs;
        lease.preferred_lifetime = 0;
        lease.t1 = 0;
        lease.t2 = 0;
        retry_db(&self.retry_policy, || self.store.update(lease.clone())).await?;
        Ok(())
    }

    #[instrument(level = "debug", skip(self), fields(%address))]
    pub async fn release(
        &self,
        address: Ipv6Addr,
        lease_type: LeaseType,
        subnet_id: SubnetId,
    ) -> Result<(), AllocationError> {
        let mut lease = retry_db(&self.retry_policy, || self.store.get_by_address(address, lease_type, Some(subnet_id)))
            .await?
            .ok_or(AllocationError::NoSuchLease)?;
        lease.state = LeaseState::ExpiredReclaimed;
        lease.valid_lifetime = 0;
        retry_db(&self.retry_policy, || self.store.update(lease.clone())).await?;
        Ok(())
    }

    async fn existing_lease(
        &self,
        subnet_id: SubnetId,
        duid: &Duid,
        iaid: Iaid,
        lease_type: LeaseType,
    ) -> Result<Option<Lease6>, AllocationError> {
        let leases = retry_db(&self.retry_policy, || self.store.get_by_duid_iaid(duid, iaid, Some(subnet_id))).await?;
        Ok(leases.into_iter().find(|l| l.lease_type == lease_type))
    }

    async fn renew_lease(
        &self,
        mut lease: Lease6,
        preferred_lifetime: u32,
        valid_lifetime: u32,
        t1: u32,
        t2: u32,
    ) -> Result<Lease6, AllocationError> {
        lease.preferred_lifetime = preferred_lifetime;
        lease.valid_lifetime = valid_lifetime;
        lease.t1 = t1;
        lease.t2 = t2;
        lease.cltt = Utc::now();
        lease.validate().map_err(AllocationError::from)?;
        retry_db(&self.retry_policy, || self.store.update(lease.clone())).await?;
        Ok(lease)
    }

    async fn try_reserved_address(
        &self,
        req: &AllocateRequest6,
        subnet: &Subnet6,
        address: Ipv6Addr,
    ) -> Result<Option<Lease6>, AllocationError> {
        let lease = Lease6 {
            address,
            prefix_len: 128,
            lease_type: req.lease_type,
            duid: req.duid.clone(),
            iaid: req.iaid,
            hardware_address: None,
            preferred_lifetime: req.preferred_lifetime,
            valid_lifetime: req.valid_lifetime,
            t1: req.t1,
            t2: req.t2,
            cltt: Utc::now(),
            subnet_id: subnet.id,
            fixed: true,
            hostname: String::new(),
            fqdn_fwd: false,
            fqdn_rev: false,
            state: LeaseState::Default,
            user_context: serde_json::Value::Null,
        };
        lease.validate().map_err(AllocationError::from)?;
        if retry_db(&self.retry_policy, || self.store.add_lease(lease.clone())).await? {
            return Ok(Some(lease));
        }
        warn!(%address, subnet_id = subnet.id, "reserved address is in use by another client");
        Ok(None)
    }

    async fn pick_from_pools(&self, req: &AllocateRequest6, subnet: &Subnet6) -> Result<Option<Lease6>, AllocationError> {
        let picker = picker_strategy(&subnet.parameters).picker6();
        let max_tries = max_address_tries(&subnet.parameters);
        let seed = req.duid.as_bytes().to_vec();

        if let Some(hint) = req.requested_address {
            if let Some(pool) = subnet.pools.iter().find(|p| p.contains(hint)) {
                if let Some(lease) = self.try_candidate(req, subnet, pool, hint).await? {
                    return Ok(Some(lease));
                }
            }
        }

        for pool in &subnet.pools {
            for attempt in 0..max_tries {
                if Instant::now() >= req.deadline {
                    return Ok(None);
                }
                let Some(candidate) = picker.candidate(pool, &seed, attempt) else {
                    break;
                };
                if let Some(lease) = self.try_candidate(req, subnet, pool, candidate).await? {
                    return Ok(Some(lease));
                }
            }
        }
        Ok(None)
    }

    async fn try_candidate(
        &self,
        req: &AllocateRequest6,
        subnet: &Subnet6,
        pool: &Pool6,
        candidate: Ipv6Addr,
    ) -> Result<Option<Lease6>, AllocationError> {
        if !pool.contains(candidate) {
            return Ok(None);
        }
        if let Some(existing) =
            retry_db(&self.retry_policy, || self.store.get_by_address(candidate, req.lease_type, None)).await?
        {
            if !existing.state.is_reclaimed() {
                return Ok(None);
            }
        }
        let lease = Lease6 {
            address: candidate,
            prefix_len: 128,
            lease_type: req.lease_type,
            duid: req.duid.clone(),
            iaid: req.iaid,
            hardware_address: None,
            preferred_lifetime: req.preferred_lifetime,
            valid_lifetime: req.valid_lifetime,
            t1: req.t1,
            t2: req.t2,
            cltt: Utc::now(),
            subnet_id: subnet.id,
            fixed: false,
            hostname: String::new(),
            fqdn_fwd: false,
            fqdn_rev: false,
            state: LeaseState::Default,
            user_context: serde_json::Value::Null,
        };
        lease.validate().map_err(AllocationError::from)?;
        if retry_db(&self.retry_policy, || self.store.add_lease(lease.clone())).await? {
            debug!(address = %candidate, "allocated address from free pool");
            Ok(Some(lease))
        } else {
            Ok(None)
        }
    }

    async fn pick_from_pd_pools(&self, req: &AllocateRequest6, subnet: &Subnet6) -> Result<Option<Lease6>, AllocationError> {
        let picker = picker_strategy(&subnet.parameters).picker_pd();
        let max_tries = max_address_tries(&subnet.parameters);
        let seed = req.duid.as_bytes().to_vec();

        if let Some(hint) = req.requested_address {
            if let Some(pool) = subnet.pd_pools.iter().find(|p| prefix_in_pd_pool(p, hint)) {
                if let Some(lease) = self.try_pd_candidate(req, subnet, pool, hint).await? {
                    return Ok(Some(lease));
                }
            }
        }

        for pool in &subnet.pd_pools {
            for attempt in 0..max_tries {
                if Instant::now() >= req.deadline {
                    return Ok(None);
                }
                let Some(candidate) = picker.candidate(pool, &seed, attempt) else {
                    break;
                };
                if let Some(lease) = self.try_pd_candidate(req, subnet, pool, candidate).await? {
                    return Ok(Some(lease));
                }
            }
        }
        Ok(None)
    }

    async fn try_pd_candidate(
        &self,
        req: &AllocateRequest6,
        subnet: &Subnet6,
        pool: &PdPool,
        candidate: Ipv6Addr,
    ) -> Result<Option<Lease6>, AllocationError> {
        if !prefix_in_pd_pool(pool, candidate) {
            return Ok(None);
        }
        if let Some(existing) =
            retry_db(&self.retry_policy, || self.store.get_by_address(candidate, LeaseType::Pd, None)).await?
        {
            if !existing.state.is_reclaimed() {
                return Ok(None);
            }
        }
        let lease = Lease6 {
            address: candidate,
            prefix_len: pool.delegated_len,
            lease_type: LeaseType::Pd,
            duid: req.duid.clone(),
            iaid: req.iaid,
            hardware_address: None,
            preferred_lifetime: req.preferred_lifetime,
            valid_lifetime: req.valid_lifetime,
            t1: req.t1,
            t2: req.t2,
            cltt: Utc::now(),
            subnet_id: subnet.id,
            fixed: false,
            hostname: String::new(),
            fqdn_fwd: false,
            fqdn_rev: false,
            state: LeaseState::Default,
            user_context: serde_json::Value::Null,
        };
        lease.validate().map_err(AllocationError::from)?;
        if retry_db(&self.retry_policy, || self.store.add_lease(lease.clone())).await? {
            debug!(address = %candidate, "delegated prefix from pd-pool");
            Ok(Some(lease))
        } else {
            Ok(None)
        }
    }
}

fn prefix_in_pd_pool(pool: &PdPool, address: Ipv6Addr) -> bool {
    let stride = 1u128 << (128 - pool.delegated_len);
    let span = (1u128 << (pool.delegated_len - pool.prefix_len)) * stride;
    let start = u128::from(pool.prefix);
    let addr = u128::from(address);
    addr >= start && addr < start + span && (addr - start) % stride == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{BTreeMap, BTreeSet};
    use std::time::Duration;

    use config_backend::entity::{SharedNetwork4, Subnet4};
    use lease_store::MemoryLeaseStore;

    fn subnet4(id: SubnetId, pools: Vec<Pool4>) -> Subnet4 {
        Subnet4 {
            id,
            prefix: "192.0.2.0/29".parse().unwrap(),
            pools,
            shared_network: None,
            parameters: BTreeMap::new(),
            tags: BTreeSet::new(),
            modified_at: Utc::now(),
        }
    }

    fn pool4(start: &str, end: &str) -> Pool4 {
        Pool4 {
            start: start.parse().unwrap(),
            end: end.parse().unwrap(),
            client_classes: vec![],
        }
    }

    fn engine_with_subnet(subnet: Subnet4) -> AllocationEngine4 {
        let store: Arc<dyn LeaseStore4> = Arc::new(MemoryLeaseStore::new());
        let mut snapshot = ConfigSnapshot4::empty();
        snapshot.insert_subnet(subnet);
        let handle = SnapshotHandle4::new(snapshot);
        AllocationEngine4::new(store, handle)
    }

    fn client_id(n: u8) -> ClientIdentifier {
        ClientIdentifier::new(vec![1, 2, n]).unwrap()
    }

    fn allocate_req(subnet_id: SubnetId, client: u8) -> AllocateRequest4 {
        AllocateRequest4 {
            subnet_id,
            hardware_address: None,
            client_id: Some(client_id(client)),
            requested_address: None,
            valid_lifetime: 3600,
            t1: 1800,
            t2: 3150,
            deadline: Instant::now() + Duration::from_secs(5),
        }
    }

    #[tokio::test]
    async fn five_clients_in_a_five_address_pool_all_succeed_sixth_fails() {
        let subnet = subnet4(1, vec![pool4("192.0.2.2", "192.0.2.6")]);
        let engine = engine_with_subnet(subnet);

        let mut addresses = std::collections::HashSet::new();
        for client in 0..5u8 {
            let lease = engine.allocate(allocate_req(1, client)).await.unwrap();
            assert!(addresses.insert(lease.address), "duplicate address handed out");
        }

        let sixth = engine.allocate(allocate_req(1, 5)).await;
        assert!(matches!(sixth, Err(AllocationError::NoAddressAvailable)));
    }

    #[tokio::test]
    async fn renew_keeps_the_same_address_and_bumps_cltt() {
        let subnet = subnet4(1, vec![pool4("192.0.2.2", "192.0.2.6")]);
        let engine = engine_with_subnet(subnet);

        let first = engine.allocate(allocate_req(1, 0)).await.unwrap();
        let renewed = engine.allocate(allocate_req(1, 0)).await.unwrap();
        assert_eq!(first.address, renewed.address);
        assert!(renewed.cltt >= first.cltt);
    }

    #[tokio::test]
    async fn allocation_expands_shared_network_in_declaration_order() {
        let mut subnet_a = subnet4(1, vec![]); // empty pool, forces expansion to subnet b
        subnet_a.shared_network = Some("campus".into());
        let mut subnet_b = subnet4(2, vec![pool4("192.0.2.2", "192.0.2.2")]);
        subnet_b.shared_network = Some("campus".into());

        let store: Arc<dyn LeaseStore4> = Arc::new(MemoryLeaseStore::new());
        let mut snapshot = ConfigSnapshot4::empty();
        snapshot.insert_subnet(subnet_a);
        snapshot.insert_subnet(subnet_b);
        snapshot.insert_shared_network(SharedNetwork4 {
            name: "campus".into(),
            subnet_ids: vec![1, 2],
            parameters: BTreeMap::new(),
            tags: BTreeSet::new(),
            modified_at: Utc::now(),
        });
        let handle = SnapshotHandle4::new(snapshot);
        let engine = AllocationEngine4::new(store, handle);

        let lease = engine.allocate(allocate_req(1, 0)).await.unwrap();
        assert_eq!(lease.address, "192.0.2.2".parse::<Ipv4Addr>().unwrap());
        assert_eq!(lease.subnet_id, 2);
    }

    #[tokio::test]
    async fn decline_clears_identity_and_quarantines() {
        let subnet = subnet4(1, vec![pool4("192.0.2.2", "192.0.2.2")]);
        let engine = engine_with_subnet(subnet);
        let lease = engine.allocate(allocate_req(1, 0)).await.unwrap();

        engine.decline(lease.address, 1, 120).await.unwrap();

        let fresh = engine.store.get_by_address(lease.address, Some(1)).await.unwrap().unwrap();
        assert_eq!(fresh.state, LeaseState::Declined);
        assert!(fresh.client_id.is_none());
        assert_eq!(fresh.valid_lifetime, 120);
    }

    #[tokio::test]
    async fn release_reclaims_the_lease() {
        let subnet = subnet4(1, vec![pool4("192.0.2.2", "192.0.2.2")]);
        let engine = engine_with_subnet(subnet);
        let lease = engine.allocate(allocate_req(1, 0)).await.unwrap();

        engine.release(lease.address, 1).await.unwrap();

        let fresh = engine.store.get_by_address(lease.address, Some(1)).await.unwrap().unwrap();
        assert_eq!(fresh.state, LeaseState::ExpiredReclaimed);
        assert_eq!(fresh.valid_lifetime, 0);
    }

    fn subnet6(id: SubnetId, pools: Vec<Pool6>, pd_pools: Vec<PdPool>) -> Subnet6 {
        Subnet6 {
            id,
            prefix: "2001:db8::/32".parse().unwrap(),
            pools,
            pd_pools,
            shared_network: None,
            parameters: BTreeMap::new(),
            tags: BTreeSet::new(),
            modified_at: Utc::now(),
        }
    }

    fn pool6(start: &str, end: &str) -> Pool6 {
        Pool6 {
            start: start.parse().unwrap(),
            end: end.parse().unwrap(),
            client_classes: vec![],
        }
    }

    fn pd_pool(prefix: &str, prefix_len: u8, delegated_len: u8) -> PdPool {
        PdPool {
            prefix: prefix.parse().unwrap(),
            prefix_len,
            delegated_len,
            client_classes: vec![],
        }
    }

    fn duid(n: u8) -> Duid {
        Duid::new(vec![0xaa, n]).unwrap()
    }

    fn allocate_req6(subnet_id: SubnetId, client: u8, lease_type: LeaseType) -> AllocateRequest6 {
        AllocateRequest6 {
            subnet_id,
            duid: duid(client),
            iaid: 1,
            lease_type,
            requested_address: None,
            preferred_lifetime: 1800,
            valid_lifetime: 3600,
            t1: 900,
            t2: 1575,
            deadline: Instant::now() + Duration::from_secs(5),
        }
    }

    fn engine6_with_subnet(subnet: Subnet6) -> AllocationEngine6 {
        let store: Arc<dyn LeaseStore6> = Arc::new(MemoryLeaseStore::new());
        let mut snapshot = ConfigSnapshot6::empty();
        snapshot.insert_subnet(subnet);
        let handle = SnapshotHandle6::new(snapshot);
        AllocationEngine6::new(store, handle)
    }

    #[tokio::test]
    async fn na_allocation_draws_from_the_address_pool() {
        let subnet = subnet6(1, vec![pool6("2001:db8::1", "2001:db8::5")], vec![]);
        let engine = engine6_with_subnet(subnet);
        let lease = engine.allocate(allocate_req6(1, 0, LeaseType::Na)).await.unwrap();
        assert_eq!(lease.prefix_len, 128);
        assert_eq!(lease.lease_type, LeaseType::Na);
    }

    #[tokio::test]
    async fn pd_allocation_draws_whole_prefixes_and_coexists_with_na_on_the_same_address() {
        let subnet = subnet6(
            1,
            vec![pool6("2001:db8::1", "2001:db8::1")],
            vec![pd_pool("2001:db8::", 32, 40)],
        );
        let engine = engine6_with_subnet(subnet);

        let pd_lease = engine.allocate(allocate_req6(1, 0, LeaseType::Pd)).await.unwrap();
        assert_eq!(pd_lease.lease_type, LeaseType::Pd);
        assert_eq!(pd_lease.prefix_len, 40);

        // a second PD request from a different client draws a distinct prefix.
        let second = engine.allocate(allocate_req6(1, 1, LeaseType::Pd)).await.unwrap();
        assert_ne!(pd_lease.address, second.address);

        // NA allocation on the same subnet is an independent primary key
        // namespace: a PD-delegated prefix doesn't block an NA address.
        let na_lease = engine.allocate(allocate_req6(1, 0, LeaseType::Na)).await.unwrap();
        assert_eq!(na_lease.lease_type, LeaseType::Na);
    }

    #[tokio::test]
    async fn v6_renew_keeps_the_same_prefix() {
        let subnet = subnet6(1, vec![], vec![pd_pool("2001:db8::", 32, 48)]);
        let engine = engine6_with_subnet(subnet);
        let first = engine.allocate(allocate_req6(1, 0, LeaseType::Pd)).await.unwrap();
        let renewed = engine.allocate(allocate_req6(1, 0, LeaseType::Pd)).await.unwrap();
        assert_eq!(first.address, renewed.address);
        assert_eq!(first.prefix_len, renewed.prefix_len);
    }
}
