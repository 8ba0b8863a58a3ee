//! Relational lease store backed by SQLite via `sqlx`, following
//! `ip-manager::sqlite`'s shape: compile-time-checked `query!` macros, a
//! `sqlx::migrate!`-managed schema, and a private `util` module holding the
//! epoch-seconds conversions and row mapping.

use std::net::{Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqliteSynchronous};
use sqlx::ConnectOptions;

use crate::error::LeaseStoreError;
use crate::lease::{
    ClientIdentifier, Duid, HardwareAddress, Iaid, Lease4, Lease6, LeaseState, LeaseType, SubnetId,
};
use crate::{LeaseStore4, LeaseStore6, SchemaVersion, EXPECTED_SCHEMA_VERSION};

#[derive(Debug, Clone)]
pub struct SqlLeaseStore {
    pool: SqlitePool,
}

impl SqlLeaseStore {
    pub async fn new(uri: impl AsRef<str>) -> Result<Self, LeaseStoreError> {
        let mut opts = SqliteConnectOptions::from_str(uri.as_ref())
            .map_err(sqlx::Error::from)?
            .synchronous(SqliteSynchronous::Normal)
            .create_if_missing(true);
        opts.log_statements(tracing::log::LevelFilter::Trace);

        let pool = SqlitePool::connect_with(opts).await?;
        sqlx::migrate!("./migrations").run(&pool).await?;

        let store = Self { pool };
        store.check_schema_version().await?;
        Ok(store)
    }

    async fn check_schema_version(&self) -> Result<(), LeaseStoreError> {
        let row = sqlx::query!("SELECT major, minor FROM schema_version LIMIT 1")
            .fetch_one(&self.pool)
            .await?;
        let found = row.major as u32;
        let (expected, _) = EXPECTED_SCHEMA_VERSION;
        if found != expected {
            return Err(LeaseStoreError::DbIncompatible {
                expected,
                found,
            });
        }
        Ok(())
    }
}

#[async_trait]
impl LeaseStore4 for SqlLeaseStore {
    async fn add_lease(&self, lease: Lease4) -> Result<bool, LeaseStoreError> {
        lease.validate()?;
        let row = util::from_lease4(&lease);
        let mut txn = self.pool.begin().await?;
        let existing_live = sqlx::query!(
            "SELECT state FROM leases4 WHERE address = ?1",
            row.address
        )
        .fetch_optional(&mut txn)
        .await?;
        if let Some(existing) = existing_live {
            if existing.state != util::state_code(LeaseState::ExpiredReclaimed) {
                txn.rollback().await?;
                return Ok(false);
            }
        }
        sqlx::query!(
            r#"INSERT OR REPLACE INTO leases4
               (address, hwaddr_htype, hwaddr, client_id, valid_lifetime, t1, t2, cltt,
                subnet_id, fixed, hostname, fqdn_fwd, fqdn_rev, state, user_context)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)"#,
            row.address,
            row.hwaddr_htype,
            row.hwaddr,
            row.client_id,
            row.valid_lifetime,
            row.t1,
            row.t2,
            row.cltt,
            row.subnet_id,
            row.fixed,
            row.hostname,
            row.fqdn_fwd,
            row.fqdn_rev,
            row.state,
            row.user_context,
        )
        .execute(&mut txn)
        .await?;
        txn.commit().await?;
        Ok(true)
    }

    async fn get_by_address(
        &self,
        address: Ipv4Addr,
        subnet_id: Option<SubnetId>,
    ) -> Result<Option<Lease4>, LeaseStoreError> {
        let key = util::ipv4_key(address);
        let row = sqlx::query_as!(
            util::Lease4Row,
            "SELECT * FROM leases4 WHERE address = ?1",
            key
        )
        .fetch_optional(&self.pool)
        .await?;
        Ok(row
            .map(util::into_lease4)
            .filter(|l| subnet_id.map_or(true, |s| l.subnet_id == s)))
    }

    async fn get_by_hwaddr(
        &self,
        hwaddr: &HardwareAddress,
        subnet_id: Option<SubnetId>,
    ) -> Result<Vec<Lease4>, LeaseStoreError> {
        let bytes = hwaddr.as_bytes();
        let rows = sqlx::query_as!(
            util::Lease4Row,
            "SELECT * FROM leases4 WHERE hwaddr = ?1",
            bytes
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(util::into_lease4)
            .filter(|l| subnet_id.map_or(true, |s| l.subnet_id == s))
            .collect())
    }

    async fn get_by_client_id(
        &self,
        client_id: &ClientIdentifier,
        subnet_id: Option<SubnetId>,
    ) -> Result<Vec<Lease4>, LeaseStoreError> {
        let bytes = client_id.as_bytes();
        let rows = sqlx::query_as!(
            util::Lease4Row,
            "SELECT * FROM leases4 WHERE client_id = ?1",
            bytes
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(util::into_lease4)
            .filter(|l| subnet_id.map_or(true, |s| l.subnet_id == s))
            .collect())
    }

    async fn get_by_subnet(&self, subnet_id: SubnetId) -> Result<Vec<Lease4>, LeaseStoreError> {
        let subnet_id = subnet_id as i64;
        let rows = sqlx::query_as!(
            util::Lease4Row,
            "SELECT * FROM leases4 WHERE subnet_id = ?1",
            subnet_id
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(util::into_lease4).collect())
    }

    async fn get_expired(&self, max_count: usize) -> Result<Vec<Lease4>, LeaseStoreError> {
        let now = util::epoch(Utc::now());
        let declined = util::state_code(LeaseState::Declined);
        let limit = max_count as i64;
        let rows = sqlx::query_as!(
            util::Lease4Row,
            r#"SELECT * FROM leases4
               WHERE (valid_lifetime > 0 AND cltt + valid_lifetime <= ?1) OR state = ?2
               ORDER BY (cltt + valid_lifetime) ASC
               LIMIT ?3"#,
            now,
            declined,
            limit
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(util::into_lease4).collect())
    }

    async fn get_modified_since(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<Lease4>, LeaseStoreError> {
        let since = util::epoch(since);
        let rows = sqlx::query_as!(
            util::Lease4Row,
            "SELECT * FROM leases4 WHERE cltt > ?1",
            since
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(util::into_lease4).collect())
    }

    async fn update(&self, lease: Lease4) -> Result<(), LeaseStoreError> {
        lease.validate()?;
        let row = util::from_lease4(&lease);
        let result = sqlx::query!(
            r#"UPDATE leases4 SET
                 hwaddr_htype = ?2, hwaddr = ?3, client_id = ?4, valid_lifetime = ?5,
                 t1 = ?6, t2 = ?7, cltt = ?8, subnet_id = ?9, fixed = ?10, hostname = ?11,
                 fqdn_fwd = ?12, fqdn_rev = ?13, state = ?14, user_context = ?15
               WHERE address = ?1"#,
            row.address,
            row.hwaddr_htype,
            row.hwaddr,
            row.client_id,
            row.valid_lifetime,
            row.t1,
            row.t2,
            row.cltt,
            row.subnet_id,
            row.fixed,
            row.hostname,
            row.fqdn_fwd,
            row.fqdn_rev,
            row.state,
            row.user_context,
        )
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(LeaseStoreError::NoSuchLease);
        }
        Ok(())
    }

    async fn delete_by_address(&self, address: Ipv4Addr) -> Result<bool, LeaseStoreError> {
        let key = util::ipv4_key(address);
        let result = sqlx::query!("DELETE FROM leases4 WHERE address = ?1", key)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    fn name(&self) -> &'static str {
        "sqlite4"
    }

    fn description(&self) -> &'static str {
        "IPv4 lease store backed by SQLite via sqlx"
    }

    fn schema_version(&self) -> SchemaVersion {
        EXPECTED_SCHEMA_VERSION
    }
}

#[async_trait]
impl LeaseStore6 for SqlLeaseStore {
    async fn add_lease(&self, lease: Lease6) -> Result<bool, LeaseStoreError> {
        lease.validate()?;
        let row = util::from_lease6(&lease);
        let mut txn = self.pool.begin().await?;
        let existing_live = sqlx::query!(
            "SELECT state FROM leases6 WHERE address = ?1 AND lease_type = ?2",
            row.address,
            row.lease_type
        )
        .fetch_optional(&mut txn)
        .await?;
        if let Some(existing) = existing_live {
            if existing.state != util::state_code(LeaseState::ExpiredReclaimed) {
                txn.rollback().await?;
                return Ok(false);
            }
        }
        sqlx::query!(
            r#"INSERT OR REPLACE INTO leases6
               (address, lease_type, prefix_len, duid, iaid, hwaddr_htype, hwaddr,
                preferred_lifetime, valid_lifetime, t1, t2, cltt, subnet_id, fixed,
                hostname, fqdn_fwd, fqdn_rev, state, user_context)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19)"#,
            row.address,
            row.lease_type,
            row.prefix_len,
            row.duid,
            row.iaid,
            row.hwaddr_htype,
            row.hwaddr,
            row.preferred_lifetime,
            row.valid_lifetime,
            row.t1,
            row.t2,
            row.cltt,
            row.subnet_id,
            row.fixed,
            row.hostname,
            row.fqdn_fwd,
            row.fqdn_rev,
            row.state,
            row.user_context,
        )
        .execute(&mut txn)
        .await?;
        txn.commit().await?;
        Ok(true)
    }

    async fn get_by_address(
        &self,
        address: Ipv6Addr,
        lease_type: LeaseType,
        subnet_id: Option<SubnetId>,
    ) -> Result<Option<Lease6>, LeaseStoreError> {
        let key = util::ipv6_key(address);
        let code = util::lease_type_code(lease_type);
        let row = sqlx::query_as!(
            util::Lease6Row,
            "SELECT * FROM leases6 WHERE address = ?1 AND lease_type = ?2",
            key,
            code
        )
        .fetch_optional(&self.pool)
        .await?;
        Ok(row
            .map(util::into_lease6)
            .filter(|l| subnet_id.map_or(true, |s| l.subnet_id == s)))
    }

    async fn get_by_duid_iaid(
        &self,
        duid: &Duid,
        iaid: Iaid,
        subnet_id: Option<SubnetId>,
    ) -> Result<Vec<Lease6>, LeaseStoreError> {
        let duid_bytes = duid.as_bytes();
        let iaid = iaid as i64;
        let rows = sqlx::query_as!(
            util::Lease6Row,
            "SELECT * FROM leases6 WHERE duid = ?1 AND iaid = ?2",
            duid_bytes,
            iaid
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(util::into_lease6)
            .filter(|l| subnet_id.map_or(true, |s| l.subnet_id == s))
            .collect())
    }

    async fn get_by_subnet(&self, subnet_id: SubnetId) -> Result<Vec<Lease6>, LeaseStoreError> {
        let subnet_id = subnet_id as i64;
        let rows = sqlx::query_as!(
            util::Lease6Row,
            "SELECT * FROM leases6 WHERE subnet_id = ?1",
            subnet_id
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(util::into_lease6).collect())
    }

    async fn get_expired(&self, max_count: usize) -> Result<Vec<Lease6>, LeaseStoreError> {
        let now = util::epoch(Utc::now());
        let declined = util::state_code(LeaseState::Declined);
        let limit = max_count as i64;
        let rows = sqlx::query_as!(
            util::Lease6Row,
            r#"SELECT * FROM leases6
               WHERE (valid_lifetime > 0 AND cltt + valid_lifetime <= ?1) OR state = ?2
               ORDER BY (cltt + valid_lifetime) ASC
               LIMIT ?3"#,
            now,
            declined,
            limit
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(util::into_lease6).collect())
    }

    async fn get_modified_since(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<Lease6>, LeaseStoreError> {
        let since = util::epoch(since);
        let rows = sqlx::query_as!(
            util::Lease6Row,
            "SELECT * FROM leases6 WHERE cltt > ?1",
            since
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(util::into_lease6).collect())
    }

    async fn update(&self, lease: Lease6) -> Result<(), LeaseStoreError> {
        lease.validate()?;
        let row = util::from_lease6(&lease);
        let result = sqlx::query!(
            r#"UPDATE leases6 SET
                 prefix_len = ?3, duid = ?4, iaid = ?5, hwaddr_htype = ?6, hwaddr = ?7,
                 preferred_lifetime = ?8, valid_lifetime = ?9, t1 = ?10, t2 = ?11, cltt = ?12,
                 subnet_id = ?13, fixed = ?14, hostname = ?15, fqdn_fwd = ?16, fqdn_rev = ?17,
                 state = ?18, user_context = ?19
               WHERE address = ?1 AND lease_type = ?2"#,
            row.address,
            row.lease_type,
            row.prefix_len,
            row.duid,
            row.iaid,
            row.hwaddr_htype,
            row.hwaddr,
            row.preferred_lifetime,
            row.valid_lifetime,
            row.t1,
            row.t2,
            row.cltt,
            row.subnet_id,
            row.fixed,
            row.hostname,
            row.fqdn_fwd,
            row.fqdn_rev,
            row.state,
            row.user_context,
        )
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(LeaseStoreError::NoSuchLease);
        }
        Ok(())
    }

    async fn delete_by_address(
        &self,
        address: Ipv6Addr,
        lease_type: LeaseType,
    ) -> Result<bool, LeaseStoreError> {
        let key = util::ipv6_key(address);
        let code = util::lease_type_code(lease_type);
        let result = sqlx::query!(
            "DELETE FROM leases6 WHERE address = ?1 AND lease_type = ?2",
            key,
            code
        )
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    fn name(&self) -> &'static str {
        "sqlite6"
    }

    fn description(&self) -> &'static str {
        "IPv6 lease store backed by SQLite via sqlx"
    }

    fn schema_version(&self) -> SchemaVersion {
        EXPECTED_SCHEMA_VERSION
    }
}

mod util {
    use super::*;

    pub struct Lease4Row {
        pub address: i64,
        pub hwaddr_htype: Option<i64>,
        pub hwaddr: Option<Vec<u8>>,
        pub client_id: Option<Vec<u8>>,
        pub valid_lifetime: i64,
        pub t1: i64,
        pub t2: i64,
        pub cltt: i64,
        pub subnet_id: i64,
        pub fixed: bool,
        pub hostname: String,
        pub fqdn_fwd: bool,
        pub fqdn_rev: bool,
        pub state: i64,
        pub user_context: String,
    }

    pub struct Lease6Row {
        pub address: Vec<u8>,
        pub lease_type: i64,
        pub prefix_len: i64,
        pub duid: Vec<u8>,
        pub iaid: i64,
        pub hwaddr_htype: Option<i64>,
        pub hwaddr: Option<Vec<u8>>,
        pub preferred_lifetime: i64,
        pub valid_lifetime: i64,
        pub t1: i64,
        pub t2: i64,
        pub cltt: i64,
        pub subnet_id: i64,
        pub fixed: bool,
        pub hostname: String,
        pub fqdn_fwd: bool,
        pub fqdn_rev: bool,
        pub state: i64,
        pub user_context: String,
    }

    pub fn epoch(time: DateTime<Utc>) -> i64 {
        time.timestamp()
    }

    pub fn to_datetime(epoch: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(epoch, 0).unwrap_or_else(Utc::now)
    }

    pub fn ipv4_key(address: Ipv4Addr) -> i64 {
        u32::from(address) as i64
    }

    pub fn ipv6_key(address: Ipv6Addr) -> Vec<u8> {
        address.octets().to_vec()
    }

    pub fn state_code(state: LeaseState) -> i64 {
        match state {
            LeaseState::Default => 0,
            LeaseState::Declined => 1,
            LeaseState::ExpiredReclaimed => 2,
        }
    }

    pub fn state_from_code(code: i64) -> LeaseState {
        match code {
            1 => LeaseState::Declined,
            2 => LeaseState::ExpiredReclaimed,
            _ => LeaseState::Default,
        }
    }

    pub fn lease_type_code(lease_type: LeaseType) -> i64 {
        match lease_type {
            LeaseType::Na => 0,
            LeaseType::Ta => 1,
            LeaseType::Pd => 2,
        }
    }

    pub fn lease_type_from_code(code: i64) -> LeaseType {
        match code {
            1 => LeaseType::Ta,
            2 => LeaseType::Pd,
            _ => LeaseType::Na,
        }
    }

    pub fn from_lease4(lease: &Lease4) -> Lease4Row {
        Lease4Row {
            address: ipv4_key(lease.address),
            hwaddr_htype: lease.hardware_address.as_ref().map(|h| h.htype as i64),
            hwaddr: lease.hardware_address.as_ref().map(|h| h.as_bytes().to_vec()),
            client_id: lease.client_id.as_ref().map(|c| c.as_bytes().to_vec()),
            valid_lifetime: lease.valid_lifetime as i64,
            t1: lease.t1 as i64,
            t2: lease.t2 as i64,
            cltt: epoch(lease.cltt),
            subnet_id: lease.subnet_id as i64,
            fixed: lease.fixed,
            hostname: lease.hostname.clone(),
            fqdn_fwd: lease.fqdn_fwd,
            fqdn_rev: lease.fqdn_rev,
            state: state_code(lease.state),
            user_context: lease.user_context.to_string(),
        }
    }

    pub fn into_lease4(row: Lease4Row) -> Lease4 {
        Lease4 {
            address: Ipv4Addr::from(row.address as u32),
            hardware_address: row.hwaddr.and_then(|bytes| {
                HardwareAddress::new(row.hwaddr_htype.unwrap_or(1) as u8, bytes).ok()
            }),
            client_id: row.client_id.and_then(|bytes| ClientIdentifier::new(bytes).ok()),
            valid_lifetime: row.valid_lifetime as u32,
            t1: row.t1 as u32,
            t2: row.t2 as u32,
            cltt: to_datetime(row.cltt),
            subnet_id: row.subnet_id as u32,
            fixed: row.fixed,
            hostname: row.hostname,
            fqdn_fwd: row.fqdn_fwd,
            fqdn_rev: row.fqdn_rev,
            state: state_from_code(row.state),
            user_context: serde_json::from_str(&row.user_context).unwrap_or(serde_json::Value::Null),
        }
    }

    pub fn from_lease6(lease: &Lease6) -> Lease6Row {
        Lease6Row {
            address: ipv6_key(lease.address),
            lease_type: lease_type_code(lease.lease_type),
            prefix_len: lease.prefix_len as i64,
            duid: lease.duid.as_bytes().to_vec(),
            iaid: lease.iaid as i64,
            hwaddr_htype: lease.hardware_address.as_ref().map(|h| h.htype as i64),
            hwaddr: lease.hardware_address.as_ref().map(|h| h.as_bytes().to_vec()),
            preferred_lifetime: lease.preferred_lifetime as i64,
            valid_lifetime: lease.valid_lifetime as i64,
            t1: lease.t1 as i64,
            t2: lease.t2 as i64,
            cltt: epoch(lease.cltt),
            subnet_id: lease.subnet_id as i64,
            fixed: lease.fixed,
            hostname: lease.hostname.clone(),
            fqdn_fwd: lease.fqdn_fwd,
            fqdn_rev: lease.fqdn_rev,
            state: state_code(lease.state),
            user_context: lease.user_context.to_string(),
        }
    }

    pub fn into_lease6(row: Lease6Row) -> Lease6 {
        let octets: [u8; 16] = row.address.try_into().unwrap_or([0; 16]);
        Lease6 {
            address: Ipv6Addr::from(octets),
            prefix_len: row.prefix_len as u8,
            lease_type: lease_type_from_code(row.lease_type),
            duid: Duid::new(row.duid).unwrap_or_else(|_| Duid::new(vec![0]).unwrap()),
            iaid: row.iaid as u32,
            hardware_address: row.hwaddr.and_then(|bytes| {
                HardwareAddress::new(row.hwaddr_htype.unwrap_or(1) as u8, bytes).ok()
            }),
            preferred_lifetime: row.preferred_lifetime as u32,
            valid_lifetime: row.valid_lifetime as u32,
            t1: row.t1 as u32,
            t2: row.t2 as u32,
            cltt: to_datetime(row.cltt),
            subnet_id: row.subnet_id as u32,
            fixed: row.fixed,
            hostname: row.hostname,
            fqdn_fwd: row.fqdn_fwd,
            fqdn_rev: row.fqdn_rev,
            state: state_from_code(row.state),
            user_context: serde_json::from_str(&row.user_context).unwrap_or(serde_json::Value::Null),
        }
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
    async fn add_lease_rejects_conflicting_primary_key() -> Result<(), Box<dyn std::error::Error>> {
        let store = SqlLeaseStore::new("sqlite::memory:").await?;
        let addr = Ipv4Addr::new(192, 0, 2, 10);
        assert!(LeaseStore4::add_lease(&store, lease4(addr, 1)).await?);
        assert!(!LeaseStore4::add_lease(&store, lease4(addr, 1)).await?);
        Ok(())
    }

    #[tokio::test]
    async fn get_by_address_round_trips_fields() -> Result<(), Box<dyn std::error::Error>> {
        let store = SqlLeaseStore::new("sqlite::memory:").await?;
        let addr = Ipv4Addr::new(192, 0, 2, 11);
        let mut lease = lease4(addr, 3);
        lease.hostname = "printer".into();
        LeaseStore4::add_lease(&store, lease.clone()).await?;

        let found = LeaseStore4::get_by_address(&store, addr, None).await?.unwrap();
        assert_eq!(found.hostname, "printer");
        assert_eq!(found.subnet_id, 3);
        Ok(())
    }

    #[tokio::test]
    async fn update_missing_row_fails_no_such_lease() -> Result<(), Box<dyn std::error::Error>> {
        let store = SqlLeaseStore::new("sqlite::memory:").await?;
        let err = LeaseStore4::update(&store, lease4(Ipv4Addr::new(192, 0, 2, 12), 1))
            .await
            .unwrap_err();
        assert!(matches!(err, LeaseStoreError::NoSuchLease));
        Ok(())
    }

    #[tokio::test]
    async fn pd_lease_keyed_by_prefix() -> Result<(), Box<dyn std::error::Error>> {
        let store = SqlLeaseStore::new("sqlite::memory:").await?;
        let duid = Duid::new(vec![9, 9, 9]).unwrap();
        let base = Lease6 {
            address: "2001:db8::".parse().unwrap(),
            prefix_len: 56,
            lease_type: LeaseType::Pd,
            duid,
            iaid: 7,
            hardware_address: None,
            preferred_lifetime: 1800,
            valid_lifetime: 3600,
            t1: 0,
            t2: 0,
            cltt: Utc::now(),
            subnet_id: 2,
            fixed: false,
            hostname: String::new(),
            fqdn_fwd: false,
            fqdn_rev: false,
            state: LeaseState::Default,
            user_context: serde_json::Value::Null,
        };
        assert!(LeaseStore6::add_lease(&store, base.clone()).await?);
        assert!(!LeaseStore6::add_lease(&store, base.clone()).await?);

        let mut as_na = base;
        as_na.lease_type = LeaseType::Na;
        as_na.prefix_len = 128;
        assert!(LeaseStore6::add_lease(&store, as_na).await?);
        Ok(())
    }
}
