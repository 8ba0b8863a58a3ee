//! Subnet4/Subnet6 (§3.3): identifier, prefix, pools (pd-pools for v6),
//! per-subnet parameters, and an option set (held separately as
//! [`crate::entity::OptionDescriptor`] rows addressed at subnet/pool/pd-pool
//! scope, not embedded here).

use std::collections::{BTreeMap, BTreeSet};
use std::net::{Ipv4Addr, Ipv6Addr};

use chrono::{DateTime, Utc};
use ipnet::{Ipv4Net, Ipv6Net};
use serde::{Deserialize, Serialize};

use crate::error::ConfigBackendError;
use crate::selector::ServerTag;

pub type SubnetId = u32;

/// A contiguous address range inside a subnet from which leases may be drawn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pool4 {
    pub start: Ipv4Addr,
    pub end: Ipv4Addr,
    /// client classes this pool is restricted to; empty means unrestricted.
    pub client_classes: Vec<String>,
}

impl Pool4 {
    pub fn contains(&self, addr: Ipv4Addr) -> bool {
        self.start <= addr && addr <= self.end
    }

    fn overlaps(&self, other: &Pool4) -> bool {
        self.start <= other.end && other.start <= self.end
    }
}

/// The v6 analogue of [`Pool4`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pool6 {
    pub start: Ipv6Addr,
    pub end: Ipv6Addr,
    pub client_classes: Vec<String>,
}

impl Pool6 {
    pub fn contains(&self, addr: Ipv6Addr) -> bool {
        self.start <= addr && addr <= self.end
    }

    fn overlaps(&self, other: &Pool6) -> bool {
        self.start <= other.end && other.start <= self.end
    }
}

/// A prefix-delegation pool, yielding whole prefixes rather than single addresses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PdPool {
    pub prefix: Ipv6Addr,
    pub prefix_len: u8,
    /// length of prefix handed to each client; must be >= `prefix_len`.
    pub delegated_len: u8,
    pub client_classes: Vec<String>,
}

impl PdPool {
    fn overlaps(&self, other: &PdPool) -> Result<bool, ConfigBackendError> {
        let a = Ipv6Net::new(self.prefix, self.prefix_len)
            .map_err(|e| ConfigBackendError::BadValue(e.to_string()))?;
        let b = Ipv6Net::new(other.prefix, other.prefix_len)
            .map_err(|e| ConfigBackendError::BadValue(e.to_string()))?;
        Ok(a.contains(&b) || b.contains(&a))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subnet4 {
    pub id: SubnetId,
    pub prefix: Ipv4Net,
    pub pools: Vec<Pool4>,
    pub shared_network: Option<String>,
    /// free-form per-subnet parameters (renew-timer, valid-lifetime, etc).
    pub parameters: BTreeMap<String, String>,
    pub tags: BTreeSet<ServerTag>,
    pub modified_at: DateTime<Utc>,
}

impl Subnet4 {
    /// Pool ranges within a subnet are pairwise disjoint and contained in the
    /// subnet's prefix (§3.3).
    pub fn validate(&self) -> Result<(), ConfigBackendError> {
        if self.id == 0 {
            return Err(ConfigBackendError::BadValue(
                "subnet id 0 is reserved".into(),
            ));
        }
        for pool in &self.pools {
            if !self.prefix.contains(&pool.start) || !self.prefix.contains(&pool.end) {
                return Err(ConfigBackendError::BadValue(format!(
                    "pool {}-{} is not contained in subnet prefix {}",
                    pool.start, pool.end, self.prefix
                )));
            }
            if pool.end < pool.start {
                return Err(ConfigBackendError::BadValue(format!(
                    "pool end {} precedes start {}",
                    pool.end, pool.start
                )));
            }
        }
        for (i, a) in self.pools.iter().enumerate() {
            for b in &self.pools[i + 1..] {
                if a.overlaps(b) {
                    return Err(ConfigBackendError::BadValue(format!(
                        "pools {}-{} and {}-{} overlap",
                        a.start, a.end, b.start, b.end
                    )));
                }
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subnet6 {
    pub id: SubnetId,
    pub prefix: Ipv6Net,
    pub pools: Vec<Pool6>,
    pub pd_pools: Vec<PdPool>,
    pub shared_network: Option<String>,
    pub parameters: BTreeMap<String, String>,
    pub tags: BTreeSet<ServerTag>,
    pub modified_at: DateTime<Utc>,
}

impl Subnet6 {
    pub fn validate(&self) -> Result<(), ConfigBackendError> {
        if self.id == 0 {
            return Err(ConfigBackendError::BadValue(
                "subnet id 0 is reserved".into(),
            ));
        }
        for pool in &self.pools {
            if !self.prefix.contains(&pool.start) || !self.prefix.contains(&pool.end) {
                return Err(ConfigBackendError::BadValue(format!(
                    "pool {}-{} is not contained in subnet prefix {}",
                    pool.start, pool.end, self.prefix
                )));
            }
        }
        for (i, a) in self.pools.iter().enumerate() {
            for b in &self.pools[i + 1..] {
                if a.overlaps(b) {
                    return Err(ConfigBackendError::BadValue(format!(
                        "pools {}-{} and {}-{} overlap",
                        a.start, a.end, b.start, b.end
                    )));
                }
            }
        }
        for pd in &self.pd_pools {
            if pd.delegated_len < pd.prefix_len {
                return Err(ConfigBackendError::BadValue(format!(
                    "pd-pool delegated length {} shorter than pool prefix length {}",
                    pd.delegated_len, pd.prefix_len
                )));
            }
        }
        for (i, a) in self.pd_pools.iter().enumerate() {
            for b in &self.pd_pools[i + 1..] {
                if a.overlaps(b)? {
                    return Err(ConfigBackendError::BadValue(format!(
                        "pd-pools {}/{} and {}/{} overlap",
                        a.prefix, a.prefix_len, b.prefix, b.prefix_len
                    )));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn subnet4(pools: Vec<Pool4>) -> Subnet4 {
        Subnet4 {
            id: 1,
            prefix: "192.0.2.0/24".parse().unwrap(),
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

    #[test]
    fn subnet_id_zero_rejected() {
        let mut s = subnet4(vec![]);
        s.id = 0;
        assert!(s.validate().is_err());
    }

    #[test]
    fn pool_outside_prefix_rejected() {
        let s = subnet4(vec![pool4("192.0.3.10", "192.0.3.20")]);
        assert!(s.validate().is_err());
    }

    #[test]
    fn overlapping_pools_rejected() {
        let s = subnet4(vec![pool4("192.0.2.10", "192.0.2.20"), pool4("192.0.2.15", "192.0.2.25")]);
        assert!(s.validate().is_err());
    }

    #[test]
    fn disjoint_pools_within_prefix_accepted() {
        let s = subnet4(vec![pool4("192.0.2.10", "192.0.2.20"), pool4("192.0.2.30", "192.0.2.40")]);
        assert!(s.validate().is_ok());
    }

    #[test]
    fn pd_pool_delegated_length_must_not_be_shorter_than_pool() {
        let mut s6 = Subnet6 {
            id: 1,
            prefix: "2001:db8::/32".parse().unwrap(),
            pools: vec![],
            pd_pools: vec![PdPool {
                prefix: "2001:db8::".parse().unwrap(),
                prefix_len: 48,
                delegated_len: 40,
                client_classes: vec![],
            }],
            shared_network: None,
            parameters: BTreeMap::new(),
            tags: BTreeSet::new(),
            modified_at: Utc::now(),
        };
        assert!(s6.validate().is_err());
        s6.pd_pools[0].delegated_len = 56;
        assert!(s6.validate().is_ok());
    }
}
