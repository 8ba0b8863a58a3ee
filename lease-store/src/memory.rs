//! In-memory lease store: `BTreeMap`s guarded by `parking_lot::Mutex`, same
//! shape as a development/test backend with no persistence across restarts.

use std::collections::BTreeMap;
use std::net::{Ipv4Addr, Ipv6Addr};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tracing::debug;

use crate::error::LeaseStoreError;
use crate::lease::{ClientIdentifier, Duid, HardwareAddress, Iaid, Lease4, Lease6, LeaseType, SubnetId};
use crate::{LeaseStore4, LeaseStore6, SchemaVersion, EXPECTED_SCHEMA_VERSION};

#[derive(Debug, Default)]
pub struct MemoryLeaseStore {
    v4: Mutex<BTreeMap<Ipv4Addr, Lease4>>,
    v6: Mutex<BTreeMap<(Ipv6Addr, LeaseType), Lease6>>,
}

impl MemoryLeaseStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LeaseStore4 for MemoryLeaseStore {
    async fn add_lease(&self, lease: Lease4) -> Result<bool, LeaseStoreError> {
        lease.validate()?;
        let mut map = self.v4.lock();
        if let Some(existing) = map.get(&lease.address) {
            if !existing.state.is_reclaimed() {
                debug!(address = %lease.address, "add_lease rejected, conflicting live row");
                return Ok(false);
            }
        }
        map.insert(lease.address, lease);
        Ok(true)
    }

    async fn get_by_address(
        &self,
        address: Ipv4Addr,
        subnet_id: Option<SubnetId>,
    ) -> Result<Option<Lease4>, LeaseStoreError> {
        let map = self.v4.lock();
        Ok(map
            .get(&address)
            .filter(|l| subnet_id.map_or(true, |s| l.subnet_id == s))
            .cloned())
    }

    async fn get_by_hwaddr(
        &self,
        hwaddr: &HardwareAddress,
        subnet_id: Option<SubnetId>,
    ) -> Result<Vec<Lease4>, LeaseStoreError> {
        let map = self.v4.lock();
        Ok(map
            .values()
            .filter(|l| l.hardware_address.as_ref() == Some(hwaddr))
            .filter(|l| subnet_id.map_or(true, |s| l.subnet_id == s))
            .cloned()
            .collect())
    }

    async fn get_by_client_id(
        &self,
        client_id: &ClientIdentifier,
        subnet_id: Option<SubnetId>,
    ) -> Result<Vec<Lease4>, LeaseStoreError> {
        let map = self.v4.lock();
        Ok(map
            .values()
            .filter(|l| l.client_id.as_ref() == Some(client_id))
            .filter(|l| subnet_id.map_or(true, |s| l.subnet_id == s))
            .cloned()
            .collect())
    }

    async fn get_by_subnet(&self, subnet_id: SubnetId) -> Result<Vec<Lease4>, LeaseStoreError> {
        let map = self.v4.lock();
        Ok(map
            .values()
            .filter(|l| l.subnet_id == subnet_id)
            .cloned()
            .collect())
    }

    async fn get_expired(&self, max_count: usize) -> Result<Vec<Lease4>, LeaseStoreError> {
        let now = Utc::now();
        let map = self.v4.lock();
        let mut expired: Vec<Lease4> = map
            .values()
            .filter(|l| l.is_expired(now) || l.state == crate::LeaseState::Declined)
            .cloned()
            .collect();
        expired.sort_by_key(|l| l.cltt + chrono::Duration::seconds(l.valid_lifetime as i64));
        expired.truncate(max_count);
        Ok(expired)
    }

    async fn get_modified_since(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<Lease4>, LeaseStoreError> {
        // the in-memory backend doesn't track a separate modification stamp per row;
        // `cltt` is bumped on every write, so it stands in for one here.
        let map = self.v4.lock();
        Ok(map
            .values()
            .filter(|l| l.cltt > since)
            .cloned()
            .collect())
    }

    async fn update(&self, lease: Lease4) -> Result<(), LeaseStoreError> {
        lease.validate()?;
        let mut map = self.v4.lock();
        if !map.contains_key(&lease.address) {
            return Err(LeaseStoreError::NoSuchLease);
        }
        map.insert(lease.address, lease);
        Ok(())
    }

    async fn delete_by_address(&self, address: Ipv4Addr) -> Result<bool, LeaseStoreError> {
        Ok(self.v4.lock().remove(&address).is_some())
    }

    fn name(&self) -> &'static str {
        "memfile4"
    }

    fn description(&self) -> &'static str {
        "in-memory IPv4 lease store, no persistence across restarts"
    }

    fn schema_version(&self) -> SchemaVersion {
        EXPECTED_SCHEMA_VERSION
    }
}

#[async_trait]
impl LeaseStore6 for MemoryLeaseStore {
    async fn add_lease(&self, lease: Lease6) -> Result<bool, LeaseStoreError> {
        lease.validate()?;
        let mut map = self.v6.lock();
        let key = lease.key();
        if let Some(existing) = map.get(&key) {
            if !existing.state.is_reclaimed() {
                debug!(address = %lease.address, lease_type = %lease.lease_type, "add_lease rejected, conflicting live row");
                return Ok(false);
            }
        }
        map.insert(key, lease);
        Ok(true)
    }

    async fn get_by_address(
        &self,
        address: Ipv6Addr,
        lease_type: LeaseType,
        subnet_id: Option<SubnetId>,
    ) -> Result<Option<Lease6>, LeaseStoreError> {
        let map = self.v6.lock();
        Ok(map
            .get(&(address, lease_type))
            .filter(|l| subnet_id.map_or(true, |s| l.subnet_id == s))
            .cloned())
    }

    async fn get_by_duid_iaid(
        &self,
        duid: &Duid,
        iaid: Iaid,
        subnet_id: Option<SubnetId>,
    ) -> Result<Vec<Lease6>, LeaseStoreError> {
        let map = self.v6.lock();
        Ok(map
            .values()
            .filter(|l| &l.duid == duid && l.iaid == iaid)
            .filter(|l| subnet_id.map_or(true, |s| l.subnet_id == s))
            .cloned()
            .collect())
    }

    async fn get_by_subnet(&self, subnet_id: SubnetId) -> Result<Vec<Lease6>, LeaseStoreError> {
        let map = self.v6.lock();
        Ok(map
            .values()
            .filter(|l| l.subnet_id == subnet_id)
            .cloned()
            .collect())
    }

    async fn get_expired(&self, max_count: usize) -> Result<Vec<Lease6>, LeaseStoreError> {
        let now = Utc::now();
        let map = self.v6.lock();
        let mut expired: Vec<Lease6> = map
            .values()
            .filter(|l| l.is_expired(now) || l.state == crate::LeaseState::Declined)
            .cloned()
            .collect();
        expired.sort_by_key(|l| l.cltt + chrono::Duration::seconds(l.valid_lifetime as i64));
        expired.truncate(max_count);
        Ok(expired)
    }

    async fn get_modified_since(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<Lease6>, LeaseStoreError> {
        let map = self.v6.lock();
        Ok(map
            .values()
            .filter(|l| l.cltt > since)
            .cloned()
            .collect())
    }

    async fn update(&self, lease: Lease6) -> Result<(), LeaseStoreError> {
        lease.validate()?;
        let mut map = self.v6.lock();
        let key = lease.key();
        if !map.contains_key(&key) {
            return Err(LeaseStoreError::NoSuchLease);
        }
        map.insert(key, lease);
        Ok(())
    }

    async fn delete_by_address(
        &self,
        address: Ipv6Addr,
        lease_type: LeaseType,
    ) -> Result<bool, LeaseStoreError> {
        Ok(self.v6.lock().remove(&(address, lease_type)).is_some())
    }

    fn name(&self) -> &'static str {
        "memfile6"
    }

    fn description(&self) -> &'static str {
        "in-memory IPv6 lease store, no persistence across restarts"
    }

    fn schema_version(&self) -> SchemaVersion {
        EXPECTED_SCHEMA_VERSION
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lease::LeaseState;

    fn lease4(address: Ipv4Addr, subnet_id: SubnetId) -> Lease4 {
        Lease4 {
            address,
            hardware_address: None,
            client_id: None,
            valid_lifetime: 3600,
            t1: 1800,
            t2: 3150,
            cltt: Utc::now(),
            subnet_id,
            fixed: false,
            hostname: String::new(),
            fqdn_fwd: false,
            fqdn_rev: false,
            state: LeaseState::Default,
            user_context: serde_json::Value::Null,
        }
    }

    #[tokio::test]
    async fn add_lease_rejects_conflicting_primary_key() {
        let store = MemoryLeaseStore::new();
        let addr = Ipv4Addr::new(192, 0, 2, 10);
        assert!(LeaseStore4::add_lease(&store, lease4(addr, 1)).await.unwrap());
        assert!(!LeaseStore4::add_lease(&store, lease4(addr, 1)).await.unwrap());
    }

    #[tokio::test]
    async fn add_lease_allowed_once_prior_row_reclaimed() {
        let store = MemoryLeaseStore::new();
        let addr = Ipv4Addr::new(192, 0, 2, 10);
        let mut first = lease4(addr, 1);
        first.state = LeaseState::ExpiredReclaimed;
        assert!(LeaseStore4::add_lease(&store, first).await.unwrap());
        assert!(LeaseStore4::add_lease(&store, lease4(addr, 1)).await.unwrap());
    }

    #[tokio::test]
    async fn update_missing_row_fails_no_such_lease() {
        let store = MemoryLeaseStore::new();
        let err = LeaseStore4::update(&store, lease4(Ipv4Addr::new(192, 0, 2, 10), 1))
            .await
            .unwrap_err();
        assert!(matches!(err, LeaseStoreError::NoSuchLease));
    }

    #[tokio::test]
    async fn delete_by_address_reports_whether_a_row_was_removed() {
        let store = MemoryLeaseStore::new();
        let addr = Ipv4Addr::new(192, 0, 2, 10);
        assert!(!LeaseStore4::delete_by_address(&store, addr).await.unwrap());
        LeaseStore4::add_lease(&store, lease4(addr, 1)).await.unwrap();
        assert!(LeaseStore4::delete_by_address(&store, addr).await.unwrap());
    }

    #[tokio::test]
    async fn pd_lease_keyed_separately_from_na_lease_at_same_address() {
        let store = MemoryLeaseStore::new();
        let duid = Duid::new(vec![1, 2, 3]).unwrap();
        let base = Lease6 {
            address: "2001:db8::".parse().unwrap(),
            prefix_len: 56,
            lease_type: LeaseType::Pd,
            duid: duid.clone(),
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
        assert!(LeaseStore6::add_lease(&store, base.clone()).await.unwrap());
        assert!(!LeaseStore6::add_lease(&store, base.clone()).await.unwrap());

        let mut as_na = base;
        as_na.lease_type = LeaseType::Na;
        as_na.prefix_len = 128;
        assert!(LeaseStore6::add_lease(&store, as_na).await.unwrap());
    }

    #[tokio::test]
    async fn get_expired_orders_oldest_first() {
        let store = MemoryLeaseStore::new();
        let mut newer = lease4(Ipv4Addr::new(192, 0, 2, 10), 1);
        newer.valid_lifetime = 1;
        newer.cltt = Utc::now() - chrono::Duration::seconds(2);
        let mut older = lease4(Ipv4Addr::new(192, 0, 2, 11), 1);
        older.valid_lifetime = 1;
        older.cltt = Utc::now() - chrono::Duration::seconds(10);

        LeaseStore4::add_lease(&store, newer).await.unwrap();
        LeaseStore4::add_lease(&store, older).await.unwrap();

        let expired = LeaseStore4::get_expired(&store, 10).await.unwrap();
        assert_eq!(expired.len(), 2);
        assert_eq!(expired[0].address, Ipv4Addr::new(192, 0, 2, 11));
    }
}
