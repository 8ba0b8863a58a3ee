//! Wide-column-shaped lease store: an in-process column-family emulation over
//! `dashmap::DashMap`, partitioned by `subnet_id` with the lease's primary key
//! as the clustering key inside each partition — representative of the shape
//! a Cassandra-like store would present, without vendoring a driver that
//! isn't anywhere in the corpus.

use std::net::{Ipv4Addr, Ipv6Addr};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tracing::debug;

use crate::error::LeaseStoreError;
use crate::lease::{ClientIdentifier, Duid, HardwareAddress, Iaid, Lease4, Lease6, LeaseType, SubnetId};
use crate::{LeaseStore4, LeaseStore6, SchemaVersion, EXPECTED_SCHEMA_VERSION};

type Partition4 = DashMap<Ipv4Addr, Lease4>;
type Partition6 = DashMap<(Ipv6Addr, LeaseType), Lease6>;

#[derive(Debug, Default)]
pub struct WideColumnLeaseStore {
    v4: DashMap<SubnetId, Partition4>,
    v6: DashMap<SubnetId, Partition6>,
}

impl WideColumnLeaseStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn find_partition4(&self, address: Ipv4Addr) -> Option<(SubnetId, Lease4)> {
        self.v4.iter().find_map(|entry| {
            entry
                .value()
                .get(&address)
                .map(|lease| (*entry.key(), lease.clone()))
        })
    }

    fn find_partition6(&self, key: (Ipv6Addr, LeaseType)) -> Option<(SubnetId, Lease6)> {
        self.v6.iter().find_map(|entry| {
            entry
                .value()
                .get(&key)
                .map(|lease| (*entry.key(), lease.clone()))
        })
    }
}

#[async_trait]
impl LeaseStore4 for WideColumnLeaseStore {
    async fn add_lease(&self, lease: Lease4) -> Result<bool, LeaseStoreError> {
        lease.validate()?;
        if let Some((_, existing)) = self.find_partition4(lease.address) {
            if !existing.state.is_reclaimed() {
                debug!(address = %lease.address, "add_lease rejected, conflicting live row");
                return Ok(false);
            }
        }
        let partition = self.v4.entry(lease.subnet_id).or_default();
        partition.insert(lease.address, lease);
        Ok(true)
    }

    async fn get_by_address(
        &self,
        address: Ipv4Addr,
        subnet_id: Option<SubnetId>,
    ) -> Result<Option<Lease4>, LeaseStoreError> {
        match subnet_id {
            Some(subnet_id) => Ok(self
                .v4
                .get(&subnet_id)
                .and_then(|partition| partition.get(&address).map(|l| l.clone()))),
            None => Ok(self.find_partition4(address).map(|(_, l)| l)),
        }
    }

    async fn get_by_hwaddr(
        &self,
        hwaddr: &HardwareAddress,
        subnet_id: Option<SubnetId>,
    ) -> Result<Vec<Lease4>, LeaseStoreError> {
        let mut out = Vec::new();
        for entry in self.v4.iter() {
            if subnet_id.map_or(true, |s| s == *entry.key()) {
                for lease in entry.value().iter() {
                    if lease.hardware_address.as_ref() == Some(hwaddr) {
                        out.push(lease.clone());
                    }
                }
            }
        }
        Ok(out)
    }

    async fn get_by_client_id(
        &self,
        client_id: &ClientIdentifier,
        subnet_id: Option<SubnetId>,
    ) -> Result<Vec<Lease4>, LeaseStoreError> {
        let mut out = Vec::new();
        for entry in self.v4.iter() {
            if subnet_id.map_or(true, |s| s == *entry.key()) {
                for lease in entry.value().iter() {
                    if lease.client_id.as_ref() == Some(client_id) {
                        out.push(lease.clone());
                    }
                }
            }
        }
        Ok(out)
    }

    async fn get_by_subnet(&self, subnet_id: SubnetId) -> Result<Vec<Lease4>, LeaseStoreError> {
        Ok(self
            .v4
            .get(&subnet_id)
            .map(|partition| partition.iter().map(|l| l.clone()).collect())
            .unwrap_or_default())
    }

    async fn get_expired(&self, max_count: usize) -> Result<Vec<Lease4>, LeaseStoreError> {
        let now = Utc::now();
        let mut expired: Vec<Lease4> = self
            .v4
            .iter()
            .flat_map(|entry| entry.value().iter().map(|l| l.clone()).collect::<Vec<_>>())
            .filter(|l| l.is_expired(now) || l.state == crate::LeaseState::Declined)
            .collect();
        expired.sort_by_key(|l| l.cltt + chrono::Duration::seconds(l.valid_lifetime as i64));
        expired.truncate(max_count);
        Ok(expired)
    }

    async fn get_modified_since(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<Lease4>, LeaseStoreError> {
        Ok(self
            .v4
            .iter()
            .flat_map(|entry| entry.value().iter().map(|l| l.clone()).collect::<Vec<_>>())
            .filter(|l| l.cltt > since)
            .collect())
    }

    async fn update(&self, lease: Lease4) -> Result<(), LeaseStoreError> {
        lease.validate()?;
        if self.find_partition4(lease.address).is_none() {
            return Err(LeaseStoreError::NoSuchLease);
        }
        // the subnet may have changed; drop from whichever partition currently holds it.
        for entry in self.v4.iter() {
            entry.value().remove(&lease.address);
        }
        self.v4
            .entry(lease.subnet_id)
            .or_default()
            .insert(lease.address, lease);
        Ok(())
    }

    async fn delete_by_address(&self, address: Ipv4Addr) -> Result<bool, LeaseStoreError> {
        let mut removed = false;
        for entry in self.v4.iter() {
            if entry.value().remove(&address).is_some() {
                removed = true;
            }
        }
        Ok(removed)
    }

    fn name(&self) -> &'static str {
        "widecolumn4"
    }

    fn description(&self) -> &'static str {
        "IPv4 lease store over a partitioned (subnet_id, address) column family"
    }

    fn schema_version(&self) -> SchemaVersion {
        EXPECTED_SCHEMA_VERSION
    }
}

#[async_trait]
impl LeaseStore6 for WideColumnLeaseStore {
    async fn add_lease(&self, lease: Lease6) -> Result<bool, LeaseStoreError> {
        lease.validate()?;
        let key = lease.key();
        if let Some((_, existing)) = self.find_partition6(key) {
            if !existing.state.is_reclaimed() {
                debug!(address = %lease.address, lease_type = %lease.lease_type, "add_lease rejected, conflicting live row");
                return Ok(false);
            }
        }
        let partition = self.v6.entry(lease.subnet_id).or_default();
        partition.insert(key, lease);
        Ok(true)
    }

    async fn get_by_address(
        &self,
        address: Ipv6Addr,
        lease_type: LeaseType,
        subnet_id: Option<SubnetId>,
    ) -> Result<Option<Lease6>, LeaseStoreError> {
        let key = (address, lease_type);
        match subnet_id {
            Some(subnet_id) => Ok(self
                .v6
                .get(&subnet_id)
                .and_then(|partition| partition.get(&key).map(|l| l.clone()))),
            None => Ok(self.find_partition6(key).map(|(_, l)| l)),
        }
    }

    async fn get_by_duid_iaid(
        &self,
        duid: &Duid,
        iaid: Iaid,
        subnet_id: Option<SubnetId>,
    ) -> Result<Vec<Lease6>, LeaseStoreError> {
        let mut out = Vec::new();
        for entry in self.v6.iter() {
            if subnet_id.map_or(true, |s| s == *entry.key()) {
                for lease in entry.value().iter() {
                    if &lease.duid == duid && lease.iaid == iaid {
                        out.push(lease.clone());
                    }
                }
            }
        }
        Ok(out)
    }

    async fn get_by_subnet(&self, subnet_id: SubnetId) -> Result<Vec<Lease6>, LeaseStoreError> {
        Ok(self
            .v6
            .get(&subnet_id)
            .map(|partition| partition.iter().map(|l| l.clone()).collect())
            .unwrap_or_default())
    }

    async fn get_expired(&self, max_count: usize) -> Result<Vec<Lease6>, LeaseStoreError> {
        let now = Utc::now();
        let mut expired: Vec<Lease6> = self
            .v6
            .iter()
            .flat_map(|entry| entry.value().iter().map(|l| l.clone()).collect::<Vec<_>>())
            .filter(|l| l.is_expired(now) || l.state == crate::LeaseState::Declined)
            .collect();
        expired.sort_by_key(|l| l.cltt + chrono::Duration::seconds(l.valid_lifetime as i64));
        expired.truncate(max_count);
        Ok(expired)
    }

    async fn get_modified_since(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<Lease6>, LeaseStoreError> {
        Ok(self
            .v6
            .iter()
            .flat_map(|entry| entry.value().iter().map(|l| l.clone()).collect::<Vec<_>>())
            .filter(|l| l.cltt > since)
            .collect())
    }

    async fn update(&self, lease: Lease6) -> Result<(), LeaseStoreError> {
        lease.validate()?;
        let key = lease.key();
        if self.find_partition6(key).is_none() {
            return Err(LeaseStoreError::NoSuchLease);
        }
        for entry in self.v6.iter() {
            entry.value().remove(&key);
        }
        self.v6.entry(lease.subnet_id).or_default().insert(key, lease);
        Ok(())
    }

    async fn delete_by_address(
        &self,
        address: Ipv6Addr,
        lease_type: LeaseType,
    ) -> Result<bool, LeaseStoreError> {
        let key = (address, lease_type);
        let mut removed = false;
        for entry in self.v6.iter() {
            if entry.value().remove(&key).is_some() {
                removed = true;
            }
        }
        Ok(removed)
    }

    fn name(&self) -> &'static str {
        "widecolumn6"
    }

    fn description(&self) -> &'static str {
        "IPv6 lease store over a partitioned (subnet_id, address, type) column family"
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
    async fn add_lease_rejects_conflicting_primary_key_across_partitions() {
        let store = WideColumnLeaseStore::new();
        let addr = Ipv4Addr::new(192, 0, 2, 20);
        assert!(LeaseStore4::add_lease(&store, lease4(addr, 1)).await.unwrap());
        // same address key claimed from a different subnet partition must still collide
        assert!(!LeaseStore4::add_lease(&store, lease4(addr, 2)).await.unwrap());
    }

    #[tokio::test]
    async fn get_by_subnet_only_returns_that_partition() {
        let store = WideColumnLeaseStore::new();
        LeaseStore4::add_lease(&store, lease4(Ipv4Addr::new(192, 0, 2, 20), 1))
            .await
            .unwrap();
        LeaseStore4::add_lease(&store, lease4(Ipv4Addr::new(192, 0, 2, 21), 2))
            .await
            .unwrap();
        let in_subnet_one = LeaseStore4::get_by_subnet(&store, 1).await.unwrap();
        assert_eq!(in_subnet_one.len(), 1);
        assert_eq!(in_subnet_one[0].address, Ipv4Addr::new(192, 0, 2, 20));
    }

    #[tokio::test]
    async fn update_missing_row_fails_no_such_lease() {
        let store = WideColumnLeaseStore::new();
        let err = LeaseStore4::update(&store, lease4(Ipv4Addr::new(192, 0, 2, 22), 1))
            .await
            .unwrap_err();
        assert!(matches!(err, LeaseStoreError::NoSuchLease));
    }
}
