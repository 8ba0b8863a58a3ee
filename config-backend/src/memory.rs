//! In-memory configuration backend: entities keyed by their logical key in
//! `BTreeMap`s guarded by `parking_lot::RwLock` — reads vastly outnumber
//! writes (a reconfiguration poll happens once per interval, requests read
//! constantly), so a reader/writer lock beats a plain mutex here.
//!
//! Each entity key maps to a single row carrying its own `tags` field
//! (DESIGN.md decision (d)): a `create_update` against a selector replaces
//! the row's tag set with the selector's resolved tags rather than forking
//! per-tag copies of the same key.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tracing::debug;

use crate::entity::subnet::SubnetId;
use crate::entity::{
    AuditEntry, GlobalParameter, ModificationType, OptionDefinition, OptionDescriptor,
    OptionScope, SharedNetwork4, SharedNetwork6, Subnet4, Subnet6,
};
use crate::error::ConfigBackendError;
use crate::selector::ServerSelector;
use crate::{AuditObserver, ConfigBackend, SchemaVersion, EXPECTED_SCHEMA_VERSION};

type OptionKey = (OptionScope, u32, String);

#[derive(Default)]
pub struct MemoryConfigBackend {
    subnet4: RwLock<BTreeMap<SubnetId, Subnet4>>,
    subnet6: RwLock<BTreeMap<SubnetId, Subnet6>>,
    shared_network4: RwLock<BTreeMap<String, SharedNetwork4>>,
    shared_network6: RwLock<BTreeMap<String, SharedNetwork6>>,
    option_definitions: RwLock<BTreeMap<(u32, String), OptionDefinition>>,
    options: RwLock<BTreeMap<OptionKey, OptionDescriptor>>,
    global_parameters: RwLock<BTreeMap<String, GlobalParameter>>,
    audit: RwLock<Vec<AuditEntry>>,
    revision: AtomicU64,
    observers: RwLock<Vec<AuditObserver>>,
}

impl std::fmt::Debug for MemoryConfigBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryConfigBackend").finish()
    }
}

impl MemoryConfigBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bumps the revision counter once per affected tag and notifies
    /// observers with the whole batch (§9).
    fn record_audit(
        &self,
        object_type: &str,
        object_id: String,
        modification_type: ModificationType,
        tags: &std::collections::BTreeSet<String>,
    ) {
        let now = Utc::now();
        let mut batch = Vec::with_capacity(tags.len().max(1));
        for tag in tags {
            let revision_id = self.revision.fetch_add(1, Ordering::SeqCst) + 1;
            batch.push(AuditEntry {
                object_type: object_type.to_string(),
                object_id: object_id.clone(),
                modification_type,
                timestamp: now,
                revision_id,
                server_tag: tag.clone(),
            });
        }
        debug!(object_type, object_id, ?modification_type, "audit entry recorded");
        self.audit.write().extend(batch.iter().cloned());
        let observers = self.observers.read();
        for observer in observers.iter() {
            observer(&batch);
        }
    }
}

#[async_trait]
impl ConfigBackend for MemoryConfigBackend {
    async fn get_subnet4(
        &self,
        selector: &ServerSelector,
        id: SubnetId,
    ) -> Result<Option<Subnet4>, ConfigBackendError> {
        selector.require_assigned()?;
        Ok(self
            .subnet4
            .read()
            .get(&id)
            .filter(|s| selector.matches(&s.tags))
            .cloned())
    }

    async fn get_all_subnet4(
        &self,
        selector: &ServerSelector,
    ) -> Result<Vec<Subnet4>, ConfigBackendError> {
        selector.require_assigned()?;
        Ok(self
            .subnet4
            .read()
            .values()
            .filter(|s| selector.matches(&s.tags))
            .cloned()
            .collect())
    }

    async fn get_modified_subnet4(
        &self,
        selector: &ServerSelector,
        since: DateTime<Utc>,
    ) -> Result<Vec<Subnet4>, ConfigBackendError> {
        selector.require_assigned()?;
        Ok(self
            .subnet4
            .read()
            .values()
            .filter(|s| selector.matches(&s.tags) && s.modified_at > since)
            .cloned()
            .collect())
    }

    async fn create_update_subnet4(
        &self,
        selector: &ServerSelector,
        mut subnet: Subnet4,
    ) -> Result<(), ConfigBackendError> {
        selector.require_writable()?;
        subnet.validate()?;
        let tags = selector.to_tags()?;
        subnet.tags = tags.clone();
        subnet.modified_at = Utc::now();
        let id = subnet.id;
        let modification = {
            let mut map = self.subnet4.write();
            let modification = if map.contains_key(&id) {
                ModificationType::Update
            } else {
                ModificationType::Create
            };
            map.insert(id, subnet);
            modification
        };
        self.record_audit("subnet4", id.to_string(), modification, &tags);
        Ok(())
    }

    async fn delete_subnet4(
        &self,
        selector: &ServerSelector,
        id: SubnetId,
    ) -> Result<usize, ConfigBackendError> {
        selector.require_writable()?;
        let removed = {
            let mut map = self.subnet4.write();
            match map.get(&id).filter(|s| selector.matches(&s.tags)) {
                Some(_) => {
                    map.remove(&id);
                    true
                }
                None => false,
            }
        };
        if removed {
            let tags = selector.to_tags()?;
            self.record_audit("subnet4", id.to_string(), ModificationType::Delete, &tags);
            Ok(1)
        } else {
            Ok(0)
        }
    }

    async fn delete_all_subnet4(&self, selector: &ServerSelector) -> Result<usize, ConfigBackendError> {
        selector.require_writable()?;
        let ids: Vec<SubnetId> = self
            .subnet4
            .read()
            .values()
            .filter(|s| selector.matches(&s.tags))
            .map(|s| s.id)
            .collect();
        for id in &ids {
            self.subnet4.write().remove(id);
        }
        let tags = selector.to_tags()?;
        for id in &ids {
            self.record_audit("subnet4", id.to_string(), ModificationType::Delete, &tags);
        }
        Ok(ids.len())
    }

    async fn get_subnet6(
        &self,
        selector: &ServerSelector,
        id: SubnetId,
    ) -> Result<Option<Subnet6>, ConfigBackendError> {
        selector.require_assigned()?;
        Ok(self
            .subnet6
            .read()
            .get(&id)
            .filter(|s| selector.matches(&s.tags))
            .cloned())
    }

    async fn get_all_subnet6(&self, selector: &ServerSelector) -> Result<Vec<Subnet6>, ConfigBackendError> {
        selector.require_assigned()?;
        Ok(self
            .subnet6
            .read()
            .values()
            .filter(|s| selector.matches(&s.tags))
            .cloned()
            .collect())
    }

    async fn get_modified_subnet6(
        &self,
        selector: &ServerSelector,
        since: DateTime<Utc>,
    ) -> Result<Vec<Subnet6>, ConfigBackendError> {
        selector.require_assigned()?;
        Ok(self
            .subnet6
            .read()
            .values()
            .filter(|s| selector.matches(&s.tags) && s.modified_at > since)
            .cloned()
            .collect())
    }

    async fn create_update_subnet6(
        &self,
        selector: &ServerSelector,
        mut subnet: Subnet6,
    ) -> Result<(), ConfigBackendError> {
        selector.require_writable()?;
        subnet.validate()?;
        let tags = selector.to_tags()?;
        subnet.tags = tags.clone();
        subnet.modified_at = Utc::now();
        let id = subnet.id;
        let modification = {
            let mut map = self.subnet6.write();
            let modification = if map.contains_key(&id) {
                ModificationType::Update
            } else {
                ModificationType::Create
            };
            map.insert(id, subnet);
            modification
        };
        self.record_audit("subnet6", id.to_string(), modification, &tags);
        Ok(())
    }

    async fn delete_subnet6(
        &self,
        selector: &ServerSelector,
        id: SubnetId,
    ) -> Result<usize, ConfigBackendError> {
        selector.require_writable()?;
        let removed = {
            let mut map = self.subnet6.write();
            match map.get(&id).filter(|s| selector.matches(&s.tags)) {
                Some(_) => {
                    map.remove(&id);
                    true
                }
                None => false,
            }
        };
        if removed {
            let tags = selector.to_tags()?;
            self.record_audit("subnet6", id.to_string(), ModificationType::Delete, &tags);
            Ok(1)
        } else {
            Ok(0)
        }
    }

    async fn delete_all_subnet6(&self, selector: &ServerSelector) -> Result<usize, ConfigBackendError> {
        selector.require_writable()?;
        let ids: Vec<SubnetId> = self
            .subnet6
            .read()
            .values()
            .filter(|s| selector.matches(&s.tags))
            .map(|s| s.id)
            .collect();
        for id in &ids {
            self.subnet6.write().remove(id);
        }
        let tags = selector.to_tags()?;
        for id in &ids {
            self.record_audit("subnet6", id.to_string(), ModificationType::Delete, &tags);
        }
        Ok(ids.len())
    }

    async fn get_shared_network4(
        &self,
        selector: &ServerSelector,
        name: &str,
    ) -> Result<Option<SharedNetwork4>, ConfigBackendError> {
        selector.require_assigned()?;
        Ok(self
            .shared_network4
            .read()
            .get(name)
            .filter(|n| selector.matches(&n.tags))
            .cloned())
    }

    async fn get_all_shared_network4(
        &self,
        selector: &ServerSelector,
    ) -> Result<Vec<SharedNetwork4>, ConfigBackendError> {
        selector.require_assigned()?;
        Ok(self
            .shared_network4
            .read()
            .values()
            .filter(|n| selector.matches(&n.tags))
            .cloned()
            .collect())
    }

    async fn create_update_shared_network4(
        &self,
        selector: &ServerSelector,
        mut network: SharedNetwork4,
    ) -> Result<(), ConfigBackendError> {
        selector.require_writable()?;
        let tags = selector.to_tags()?;
        network.tags = tags.clone();
        network.modified_at = Utc::now();
        let name = network.name.clone();
        let modification = {
            let mut map = self.shared_network4.write();
            let modification = if map.contains_key(&name) {
                ModificationType::Update
            } else {
                ModificationType::Create
            };
            map.insert(name.clone(), network);
            modification
        };
        self.record_audit("shared_network4", name, modification, &tags);
        Ok(())
    }

    async fn delete_shared_network4(
        &self,
        selector: &ServerSelector,
        name: &str,
    ) -> Result<usize, ConfigBackendError> {
        selector.require_writable()?;
        let removed = {
            let mut map = self.shared_network4.write();
            match map.get(name).filter(|n| selector.matches(&n.tags)) {
                Some(_) => {
                    map.remove(name);
                    true
                }
                None => false,
            }
        };
        if removed {
            let tags = selector.to_tags()?;
            self.record_audit("shared_network4", name.to_string(), ModificationType::Delete, &tags);
            Ok(1)
        } else {
            Ok(0)
        }
    }

    async fn get_shared_network6(
        &self,
        selector: &ServerSelector,
        name: &str,
    ) -> Result<Option<SharedNetwork6>, ConfigBackendError> {
        selector.require_assigned()?;
        Ok(self
            .shared_network6
            .read()
            .get(name)
            .filter(|n| selector.matches(&n.tags))
            .cloned())
    }

    async fn get_all_shared_network6(
        &self,
        selector: &ServerSelector,
    ) -> Result<Vec<SharedNetwork6>, ConfigBackendError> {
        selector.require_assigned()?;
        Ok(self
            .shared_network6
            .read()
            .values()
            .filter(|n| selector.matches(&n.tags))
            .cloned()
            .collect())
    }

    async fn create_update_shared_network6(
        &self,
        selector: &ServerSelector,
        mut network: SharedNetwork6,
    ) -> Result<(), ConfigBackendError> {
        selector.require_writable()?;
        let tags = selector.to_tags()?;
        network.tags = tags.clone();
        network.modified_at = Utc::now();
        let name = network.name.clone();
        let modification = {
            let mut map = self.shared_network6.write();
            let modification = if map.contains_key(&name) {
                ModificationType::Update
            } else {
                ModificationType::Create
            };
            map.insert(name.clone(), network);
            modification
        };
        self.record_audit("shared_network6", name, modification, &tags);
        Ok(())
    }

    async fn delete_shared_network6(
        &self,
        selector: &ServerSelector,
        name: &str,
    ) -> Result<usize, ConfigBackendError> {
        selector.require_writable()?;
        let removed = {
            let mut map = self.shared_network6.write();
            match map.get(name).filter(|n| selector.matches(&n.tags)) {
                Some(_) => {
                    map.remove(name);
                    true
                }
                None => false,
            }
        };
        if removed {
            let tags = selector.to_tags()?;
            self.record_audit("shared_network6", name.to_string(), ModificationType::Delete, &tags);
            Ok(1)
        } else {
            Ok(0)
        }
    }

    async fn get_option_definition(
        &self,
        selector: &ServerSelector,
        code: u32,
        space: &str,
    ) -> Result<Option<OptionDefinition>, ConfigBackendError> {
        selector.require_assigned()?;
        Ok(self
            .option_definitions
            .read()
            .get(&(code, space.to_string()))
            .filter(|d| selector.matches(&d.tags))
            .cloned())
    }

    async fn get_all_option_definitions(
        &self,
        selector: &ServerSelector,
    ) -> Result<Vec<OptionDefinition>, ConfigBackendError> {
        selector.require_assigned()?;
        Ok(self
            .option_definitions
            .read()
            .values()
            .filter(|d| selector.matches(&d.tags))
            .cloned()
            .collect())
    }

    async fn create_update_option_definition(
        &self,
        selector: &ServerSelector,
        mut def: OptionDefinition,
    ) -> Result<(), ConfigBackendError> {
        selector.require_writable()?;
        let tags = selector.to_tags()?;
        def.tags = tags.clone();
        def.modified_at = Utc::now();
        let key = def.key();
        let object_id = format!("{}/{}", key.0, key.1);
        let modification = {
            let mut map = self.option_definitions.write();
            let modification = if map.contains_key(&key) {
                ModificationType::Update
            } else {
                ModificationType::Create
            };
            map.insert(key, def);
            modification
        };
        self.record_audit("option_definition", object_id, modification, &tags);
        Ok(())
    }

    async fn delete_option_definition(
        &self,
        selector: &ServerSelector,
        code: u32,
        space: &str,
    ) -> Result<usize, ConfigBackendError> {
        selector.require_writable()?;
        let key = (code, space.to_string());
        let removed = {
            let mut map = self.option_definitions.write();
            match map.get(&key).filter(|d| selector.matches(&d.tags)) {
                Some(_) => {
                    map.remove(&key);
                    true
                }
                None => false,
            }
        };
        if removed {
            let tags = selector.to_tags()?;
            self.record_audit(
                "option_definition",
                format!("{code}/{space}"),
                ModificationType::Delete,
                &tags,
            );
            Ok(1)
        } else {
            Ok(0)
        }
    }

    async fn create_update_option(
        &self,
        selector: &ServerSelector,
        mut descriptor: OptionDescriptor,
    ) -> Result<(), ConfigBackendError> {
        selector.require_writable()?;
        let tags = selector.to_tags()?;
        descriptor.tags = tags.clone();
        descriptor.modified_at = Utc::now();
        let key = descriptor.key();
        let object_id = format!("{:?}/{}/{}", key.0, key.1, key.2);
        let modification = {
            let mut map = self.options.write();
            let modification = if map.contains_key(&key) {
                ModificationType::Update
            } else {
                ModificationType::Create
            };
            map.insert(key, descriptor);
            modification
        };
        self.record_audit("option", object_id, modification, &tags);
        Ok(())
    }

    async fn get_options(
        &self,
        selector: &ServerSelector,
        scope: &OptionScope,
    ) -> Result<Vec<OptionDescriptor>, ConfigBackendError> {
        selector.require_assigned()?;
        Ok(self
            .options
            .read()
            .values()
            .filter(|d| &d.scope == scope && selector.matches(&d.tags))
            .cloned()
            .collect())
    }

    async fn delete_option(
        &self,
        selector: &ServerSelector,
        scope: &OptionScope,
        code: u32,
        space: &str,
    ) -> Result<usize, ConfigBackendError> {
        selector.require_writable()?;
        let key = (scope.clone(), code, space.to_string());
        let removed = {
            let mut map = self.options.write();
            match map.get(&key).filter(|d| selector.matches(&d.tags)) {
                Some(_) => {
                    map.remove(&key);
                    true
                }
                None => false,
            }
        };
        if removed {
            let tags = selector.to_tags()?;
            self.record_audit(
                "option",
                format!("{scope:?}/{code}/{space}"),
                ModificationType::Delete,
                &tags,
            );
            Ok(1)
        } else {
            Ok(0)
        }
    }

    async fn delete_all_options(
        &self,
        selector: &ServerSelector,
        scope: &OptionScope,
    ) -> Result<usize, ConfigBackendError> {
        selector.require_writable()?;
        let keys: Vec<OptionKey> = self
            .options
            .read()
            .iter()
            .filter(|(k, d)| &k.0 == scope && selector.matches(&d.tags))
            .map(|(k, _)| k.clone())
            .collect();
        for key in &keys {
            self.options.write().remove(key);
        }
        let tags = selector.to_tags()?;
        for key in &keys {
            self.record_audit(
                "option",
                format!("{:?}/{}/{}", key.0, key.1, key.2),
                ModificationType::Delete,
                &tags,
            );
        }
        Ok(keys.len())
    }

    async fn get_global_parameter(
        &self,
        selector: &ServerSelector,
        name: &str,
    ) -> Result<Option<GlobalParameter>, ConfigBackendError> {
        selector.require_assigned()?;
        Ok(self
            .global_parameters
            .read()
            .get(name)
            .filter(|p| selector.matches(&p.tags))
            .cloned())
    }

    async fn get_all_global_parameters(
        &self,
        selector: &ServerSelector,
    ) -> Result<Vec<GlobalParameter>, ConfigBackendError> {
        selector.require_assigned()?;
        Ok(self
            .global_parameters
            .read()
            .values()
            .filter(|p| selector.matches(&p.tags))
            .cloned()
            .collect())
    }

    async fn create_update_global_parameter(
        &self,
        selector: &ServerSelector,
        mut parameter: GlobalParameter,
    ) -> Result<(), ConfigBackendError> {
        selector.require_writable()?;
        let tags = selector.to_tags()?;
        parameter.tags = tags.clone();
        let name = parameter.name().to_string();
        let modification = {
            let mut map = self.global_parameters.write();
            let modification = if map.contains_key(&name) {
                ModificationType::Update
            } else {
                ModificationType::Create
            };
            map.insert(name.clone(), parameter);
            modification
        };
        self.record_audit("global_parameter", name, modification, &tags);
        Ok(())
    }

    async fn delete_global_parameter(
        &self,
        selector: &ServerSelector,
        name: &str,
    ) -> Result<usize, ConfigBackendError> {
        selector.require_writable()?;
        let removed = {
            let mut map = self.global_parameters.write();
            match map.get(name).filter(|p| selector.matches(&p.tags)) {
                Some(_) => {
                    map.remove(name);
                    true
                }
                None => false,
            }
        };
        if removed {
            let tags = selector.to_tags()?;
            self.record_audit(
                "global_parameter",
                name.to_string(),
                ModificationType::Delete,
                &tags,
            );
            Ok(1)
        } else {
            Ok(0)
        }
    }

    async fn get_recent_audit_entries(
        &self,
        selector: &ServerSelector,
        since: u64,
    ) -> Result<Vec<AuditEntry>, ConfigBackendError> {
        selector.require_assigned()?;
        let mut entries: Vec<AuditEntry> = self
            .audit
            .read()
            .iter()
            .filter(|e| {
                e.revision_id > since && selector.matches(&std::collections::BTreeSet::from([e.server_tag.clone()]))
            })
            .cloned()
            .collect();
        entries.sort_by(|a, b| (a.timestamp, a.revision_id).cmp(&(b.timestamp, b.revision_id)));
        Ok(entries)
    }

    fn subscribe(&self, observer: AuditObserver) {
        self.observers.write().push(observer);
    }

    fn name(&self) -> &'static str {
        "memfile"
    }

    fn description(&self) -> &'static str {
        "in-memory configuration backend, no persistence across restarts"
    }

    fn schema_version(&self) -> SchemaVersion {
        EXPECTED_SCHEMA_VERSION
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{BTreeMap, BTreeSet};

    fn subnet4(id: SubnetId) -> Subnet4 {
        Subnet4 {
            id,
            prefix: "192.0.2.0/24".parse().unwrap(),
            pools: vec![],
            shared_network: None,
            parameters: BTreeMap::new(),
            tags: BTreeSet::new(),
            modified_at: Utc::now(),
        }
    }

    // scenario 5 from spec.md §8
    #[tokio::test]
    async fn create_update_subnet_rejects_unassigned_selector() {
        let backend = MemoryConfigBackend::new();
        let err = backend
            .create_update_subnet4(&ServerSelector::Unassigned, subnet4(1))
            .await
            .unwrap_err();
        assert!(matches!(err, ConfigBackendError::NotImplemented));
    }

    #[tokio::test]
    async fn idempotent_upsert_emits_one_update_audit_entry() {
        let backend = MemoryConfigBackend::new();
        let selector = ServerSelector::OneServer("dhcp1".into());
        backend.create_update_subnet4(&selector, subnet4(7)).await.unwrap();
        backend.create_update_subnet4(&selector, subnet4(7)).await.unwrap();

        let entries = backend.get_recent_audit_entries(&selector, 0).await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].modification_type, ModificationType::Create);
        assert_eq!(entries[1].modification_type, ModificationType::Update);

        let found = backend.get_subnet4(&selector, 7).await.unwrap().unwrap();
        assert_eq!(found.id, 7);
    }

    // scenario 4 from spec.md §8
    #[tokio::test]
    async fn audit_tail_reflects_create_then_delete() {
        let backend = MemoryConfigBackend::new();
        let selector = ServerSelector::OneServer("dhcp1".into());
        backend.create_update_subnet4(&selector, subnet4(1)).await.unwrap();
        backend.delete_subnet4(&selector, 1).await.unwrap();

        let all = backend.get_recent_audit_entries(&selector, 0).await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].modification_type, ModificationType::Create);
        assert_eq!(all[1].modification_type, ModificationType::Delete);

        let since_create = backend
            .get_recent_audit_entries(&selector, all[0].revision_id)
            .await
            .unwrap();
        assert_eq!(since_create.len(), 1);
        assert_eq!(since_create[0].modification_type, ModificationType::Delete);
    }

    #[tokio::test]
    async fn all_servers_read_only_sees_all_tagged_rows() {
        let backend = MemoryConfigBackend::new();
        backend
            .create_update_subnet4(&ServerSelector::OneServer("dhcp1".into()), subnet4(1))
            .await
            .unwrap();
        backend
            .create_update_subnet4(&ServerSelector::AllServers, subnet4(2))
            .await
            .unwrap();

        let all_selector_rows = backend.get_all_subnet4(&ServerSelector::AllServers).await.unwrap();
        assert_eq!(all_selector_rows.len(), 1);
        assert_eq!(all_selector_rows[0].id, 2);

        let any_selector_rows = backend.get_all_subnet4(&ServerSelector::AnyServer).await.unwrap();
        assert_eq!(any_selector_rows.len(), 2);
    }

    #[tokio::test]
    async fn observer_receives_batched_audit_entries() {
        let backend = MemoryConfigBackend::new();
        let seen = std::sync::Arc::new(parking_lot::Mutex::new(0usize));
        let seen_clone = seen.clone();
        backend.subscribe(Box::new(move |batch| {
            *seen_clone.lock() += batch.len();
        }));
        backend
            .create_update_subnet4(
                &ServerSelector::MultipleServers(BTreeSet::from(["a".to_string(), "b".to_string()])),
                subnet4(1),
            )
            .await
            .unwrap();
        assert_eq!(*seen.lock(), 2);
    }

    #[tokio::test]
    async fn delete_returns_zero_when_nothing_removed() {
        let backend = MemoryConfigBackend::new();
        let selector = ServerSelector::OneServer("dhcp1".into());
        assert_eq!(backend.delete_subnet4(&selector, 42).await.unwrap(), 0);
    }
}
