//! Server selector (§3.1): scopes reads and writes to a subset of configured
//! servers by tag.

use std::collections::BTreeSet;
use std::fmt;

use crate::error::ConfigBackendError;

pub type ServerTag = String;

/// A filter that scopes configuration queries to a subset of configured servers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerSelector {
    Unassigned,
    AllServers,
    OneServer(ServerTag),
    MultipleServers(BTreeSet<ServerTag>),
    AnyServer,
}

impl fmt::Display for ServerSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServerSelector::Unassigned => write!(f, "unassigned"),
            ServerSelector::AllServers => write!(f, "all"),
            ServerSelector::OneServer(tag) => write!(f, "{tag}"),
            ServerSelector::MultipleServers(tags) => {
                write!(f, "{}", tags.iter().cloned().collect::<Vec<_>>().join(","))
            }
            ServerSelector::AnyServer => write!(f, "any"),
        }
    }
}

impl ServerSelector {
    /// Writes reject `UNASSIGNED` and `ANY_SERVER` (§4.3 "Selector discipline").
    pub fn require_writable(&self) -> Result<(), ConfigBackendError> {
        match self {
            ServerSelector::Unassigned => Err(ConfigBackendError::NotImplemented),
            ServerSelector::AnyServer => Err(ConfigBackendError::InvalidParameter(
                "writes may not target ANY_SERVER".into(),
            )),
            _ => Ok(()),
        }
    }

    /// `UNASSIGNED` fails with `NotImplemented` unless the component states
    /// otherwise (§3.1); every read in this crate requires a resolved selector.
    pub fn require_assigned(&self) -> Result<(), ConfigBackendError> {
        if matches!(self, ServerSelector::Unassigned) {
            return Err(ConfigBackendError::NotImplemented);
        }
        Ok(())
    }

    /// The tag set a `create_update_*` call against this selector stamps
    /// onto the written entity. Only called after `require_writable`, so
    /// `Unassigned`/`AnyServer` never reach here.
    pub fn to_tags(&self) -> Result<BTreeSet<ServerTag>, ConfigBackendError> {
        match self {
            ServerSelector::OneServer(tag) => Ok(BTreeSet::from([tag.clone()])),
            ServerSelector::MultipleServers(tags) => Ok(tags.clone()),
            ServerSelector::AllServers => Ok(BTreeSet::from(["all".to_string()])),
            ServerSelector::Unassigned | ServerSelector::AnyServer => Err(
                ConfigBackendError::InvalidParameter("selector does not resolve to a tag set".into()),
            ),
        }
    }

    /// Whether an entity tagged with `tags` is visible to this selector.
    /// `ALL_SERVERS` reads only match entries also tagged `all` ("Deletes
    /// against ALL_SERVERS remove only entries explicitly tagged to all
    /// servers" — reads apply the same discipline for consistency).
    pub fn matches(&self, tags: &BTreeSet<ServerTag>) -> bool {
        match self {
            ServerSelector::Unassigned => false,
            ServerSelector::AllServers => tags.contains("all"),
            ServerSelector::OneServer(tag) => tags.contains(tag),
            ServerSelector::MultipleServers(wanted) => !wanted.is_disjoint(tags),
            ServerSelector::AnyServer => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unassigned_rejects_both_read_and_write() {
        assert!(matches!(
            ServerSelector::Unassigned.require_assigned(),
            Err(ConfigBackendError::NotImplemented)
        ));
        assert!(matches!(
            ServerSelector::Unassigned.require_writable(),
            Err(ConfigBackendError::NotImplemented)
        ));
    }

    #[test]
    fn any_server_rejects_writes_but_allows_reads() {
        assert!(ServerSelector::AnyServer.require_assigned().is_ok());
        assert!(ServerSelector::AnyServer.require_writable().is_err());
    }

    #[test]
    fn all_servers_matches_only_all_tagged_entries() {
        let mut tags = BTreeSet::new();
        tags.insert("dhcp1".to_string());
        assert!(!ServerSelector::AllServers.matches(&tags));
        tags.insert("all".to_string());
        assert!(ServerSelector::AllServers.matches(&tags));
    }

    #[test]
    fn any_server_matches_everything() {
        let tags = BTreeSet::new();
        assert!(ServerSelector::AnyServer.matches(&tags));
    }
}
