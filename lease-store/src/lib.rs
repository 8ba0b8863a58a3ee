//! # lease-store
//!
//! The persistent collection of granted leases and the allocator's source of
//! truth for free/used address space: [`Lease4`]/[`Lease6`] record types plus
//! a capability interface (`LeaseStore4`/`LeaseStore6`) implemented by three
//! backend shapes — in-memory, relational, and wide-column.
//!
//! This trait is not meant to be used directly by a request handler; it is
//! wrapped by the allocation engine, which adds retry, host-reservation, and
//! picker-strategy logic on top.

pub mod error;
pub mod lease;
pub mod memory;
pub mod sql;
pub mod wide_column;

use std::net::{Ipv4Addr, Ipv6Addr};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

pub use error::LeaseStoreError;
pub use lease::{
    ClientIdentifier, Duid, HardwareAddress, Iaid, Lease4, Lease6, LeaseState, LeaseType, SubnetId,
};
pub use memory::MemoryLeaseStore;
pub use sql::SqlLeaseStore;
pub use wide_column::WideColumnLeaseStore;

/// `(major, minor)`. A store refuses to open when the on-disk major version
/// does not match the code's expected major (§6).
pub type SchemaVersion = (u32, u32);

pub const EXPECTED_SCHEMA_VERSION: SchemaVersion = (1, 0);

#[async_trait]
pub trait LeaseStore4: Send + Sync + 'static {
    /// Returns `false` if a conflicting lease (state != EXPIRED_RECLAIMED) already
    /// exists on the primary key; `true` on success. Never a no-op for duplicate content.
    async fn add_lease(&self, lease: Lease4) -> Result<bool, LeaseStoreError>;

    async fn get_by_address(
        &self,
        address: Ipv4Addr,
        subnet_id: Option<SubnetId>,
    ) -> Result<Option<Lease4>, LeaseStoreError>;

    async fn get_by_hwaddr(
        &self,
        hwaddr: &HardwareAddress,
        subnet_id: Option<SubnetId>,
    ) -> Result<Vec<Lease4>, LeaseStoreError>;

    async fn get_by_client_id(
        &self,
        client_id: &ClientIdentifier,
        subnet_id: Option<SubnetId>,
    ) -> Result<Vec<Lease4>, LeaseStoreError>;

    async fn get_by_subnet(&self, subnet_id: SubnetId) -> Result<Vec<Lease4>, LeaseStoreError>;

    /// Ordered by ascending expiry time so the reclaimer processes the oldest first.
    async fn get_expired(&self, max_count: usize) -> Result<Vec<Lease4>, LeaseStoreError>;

    async fn get_modified_since(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<Lease4>, LeaseStoreError>;

    /// Fails with `NoSuchLease` if the primary key has no row.
    async fn update(&self, lease: Lease4) -> Result<(), LeaseStoreError>;

    /// Returns whether a row was removed.
    async fn delete_by_address(&self, address: Ipv4Addr) -> Result<bool, LeaseStoreError>;

    fn name(&self) -> &'static str;
    fn description(&self) -> &'static str;
    fn schema_version(&self) -> SchemaVersion;
}

#[async_trait]
pub trait LeaseStore6: Send + Sync + 'static {
    /// Primary key is `(address, lease_type)`; a PD lease is keyed by its prefix.
    async fn add_lease(&self, lease: Lease6) -> Result<bool, LeaseStoreError>;

    async fn get_by_address(
        &self,
        address: Ipv6Addr,
        lease_type: LeaseType,
        subnet_id: Option<SubnetId>,
    ) -> Result<Option<Lease6>, LeaseStoreError>;

    async fn get_by_duid_iaid(
        &self,
        duid: &Duid,
        iaid: Iaid,
        subnet_id: Option<SubnetId>,
    ) -> Result<Vec<Lease6>, LeaseStoreError>;

    async fn get_by_subnet(&self, subnet_id: SubnetId) -> Result<Vec<Lease6>, LeaseStoreError>;

    async fn get_expired(&self, max_count: usize) -> Result<Vec<Lease6>, LeaseStoreError>;

    async fn get_modified_since(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<Lease6>, LeaseStoreError>;

    async fn update(&self, lease: Lease6) -> Result<(), LeaseStoreError>;

    async fn delete_by_address(
        &self,
        address: Ipv6Addr,
        lease_type: LeaseType,
    ) -> Result<bool, LeaseStoreError>;

    fn name(&self) -> &'static str;
    fn description(&self) -> &'static str;
    fn schema_version(&self) -> SchemaVersion;
}
