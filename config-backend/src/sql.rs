//! Relational configuration backend backed by SQLite via `sqlx`, following
//! `lease-store`'s `SqlLeaseStore` shape: compile-time-checked `query!`
//! macros, a `sqlx::migrate!`-managed schema, and a private `util` module
//! holding the JSON (de)serialization for the free-form nested fields
//! (pools, parameters, tags) that don't map onto scalar columns.

use std::collections::BTreeSet;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqliteSynchronous};
use sqlx::ConnectOptions;

use crate::entity::subnet::SubnetId;
use crate::entity::{
    AuditEntry, GlobalParameter, ModificationType, OptionDefinition, OptionDescriptor,
    OptionScope, SharedNetwork4, SharedNetwork6, Subnet4, Subnet6,
};
use crate::error::ConfigBackendError;
use crate::selector::ServerSelector;
use crate::{AuditObserver, ConfigBackend, SchemaVersion, EXPECTED_SCHEMA_VERSION};

#[derive(Clone)]
pub struct SqlConfigBackend {
    pool: SqlitePool,
    observers: std::sync::Arc<parking_lot::RwLock<Vec<AuditObserver>>>,
}

impl std::fmt::Debug for SqlConfigBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqlConfigBackend").finish()
    }
}

impl SqlConfigBackend {
    pub async fn new(uri: impl AsRef<str>) -> Result<Self, ConfigBackendError> {
        let mut opts = SqliteConnectOptions::from_str(uri.as_ref())
            .map_err(sqlx::Error::from)?
            .synchronous(SqliteSynchronous::Normal)
            .create_if_missing(true);
        opts.log_statements(tracing::log::LevelFilter::Trace);

        let pool = SqlitePool::connect_with(opts).await?;
        sqlx::migrate!("./migrations").run(&pool).await?;

        let backend = Self {
            pool,
            observers: std::sync::Arc::new(parking_lot::RwLock::new(Vec::new())),
        };
        backend.check_schema_version().await?;
        Ok(backend)
    }

    async fn check_schema_version(&self) -> Result<(), ConfigBackendError> {
        let row = sqlx::query!("SELECT major, minor FROM schema_version LIMIT 1")
            .fetch_one(&self.pool)
            .await?;
        let found = row.major as u32;
        let (expected, _) = EXPECTED_SCHEMA_VERSION;
        if found != expected {
            return Err(ConfigBackendError::DbIncompatible { expected, found });
        }
        Ok(())
    }

    async fn record_audit(
        &self,
        object_type: &str,
        object_id: &str,
        modification_type: ModificationType,
        tags: &BTreeSet<String>,
    ) -> Result<(), ConfigBackendError> {
        let now = util::epoch(Utc::now());
        let code = util::modification_code(modification_type);
        let mut batch = Vec::with_capacity(tags.len().max(1));
        for tag in tags {
            let result = sqlx::query!(
                r#"INSERT INTO audit_log (object_type, object_id, modification_type, timestamp, server_tag)
                   VALUES (?1, ?2, ?3, ?4, ?5)"#,
                object_type,
                object_id,
                code,
                now,
                tag,
            )
            .execute(&self.pool)
            .await?;
            batch.push(AuditEntry {
                object_type: object_type.to_string(),
                object_id: object_id.to_string(),
                modification_type,
                timestamp: util::to_datetime(now),
                revision_id: result.last_insert_rowid() as u64,
                server_tag: tag.clone(),
            });
        }
        let observers = self.observers.read();
        for observer in observers.iter() {
            observer(&batch);
        }
        Ok(())
    }
}

#[async_trait]
impl ConfigBackend for SqlConfigBackend {
    async fn get_subnet4(
        &self,
        selector: &ServerSelector,
        id: SubnetId,
    ) -> Result<Option<Subnet4>, ConfigBackendError> {
        selector.require_assigned()?;
        let key = id as i64;
        let row = sqlx::query_as!(util::Subnet4Row, "SELECT * FROM subnet4 WHERE id = ?1", key)
            .fetch_optional(&self.pool)
            .await?;
        row.map(util::into_subnet4)
            .transpose()
            .map(|s| s.filter(|s| selector.matches(&s.tags)))
    }

    async fn get_all_subnet4(
        &self,
        selector: &ServerSelector,
    ) -> Result<Vec<Subnet4>, ConfigBackendError> {
        selector.require_assigned()?;
        let rows = sqlx::query_as!(util::Subnet4Row, "SELECT * FROM subnet4")
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter()
            .map(util::into_subnet4)
            .collect::<Result<Vec<_>, _>>()
            .map(|v| v.into_iter().filter(|s| selector.matches(&s.tags)).collect())
    }

    async fn get_modified_subnet4(
        &self,
        selector: &ServerSelector,
        since: DateTime<Utc>,
    ) -> Result<Vec<Subnet4>, ConfigBackendError> {
        selector.require_assigned()?;
        let since = util::epoch(since);
        let rows = sqlx::query_as!(util::Subnet4Row, "SELECT * FROM subnet4 WHERE modified_at > ?1", since)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter()
            .map(util::into_subnet4)
            .collect::<Result<Vec<_>, _>>()
            .map(|v| v.into_iter().filter(|s| selector.matches(&s.tags)).collect())
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
        let row = util::from_subnet4(&subnet)?;
        let existing = sqlx::query!("SELECT id FROM subnet4 WHERE id = ?1", row.id)
            .fetch_optional(&self.pool)
            .await?;
        sqlx::query!(
            r#"INSERT OR REPLACE INTO subnet4
               (id, prefix, pools, shared_network, parameters, tags, modified_at)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"#,
            row.id,
            row.prefix,
            row.pools,
            row.shared_network,
            row.parameters,
            row.tags,
            row.modified_at,
        )
        .execute(&self.pool)
        .await?;
        let modification = if existing.is_some() { ModificationType::Update } else { ModificationType::Create };
        self.record_audit("subnet4", &subnet.id.to_string(), modification, &tags).await
    }

    async fn delete_subnet4(
        &self,
        selector: &ServerSelector,
        id: SubnetId,
    ) -> Result<usize, ConfigBackendError> {
        selector.require_writable()?;
        let key = id as i64;
        let tags = selector.to_tags()?;
        let existing = sqlx::query_as!(util::Subnet4Row, "SELECT * FROM subnet4 WHERE id = ?1", key)
            .fetch_optional(&self.pool)
            .await?
            .map(util::into_subnet4)
            .transpose()?;
        let Some(existing) = existing.filter(|s| selector.matches(&s.tags)) else {
            return Ok(0);
        };
        sqlx::query!("DELETE FROM subnet4 WHERE id = ?1", key)
            .execute(&self.pool)
            .await?;
        self.record_audit("subnet4", &existing.id.to_string(), ModificationType::Delete, &tags).await?;
        Ok(1)
    }

    async fn delete_all_subnet4(&self, selector: &ServerSelector) -> Result<usize, ConfigBackendError> {
        selector.require_writable()?;
        let matching = self.get_all_subnet4(selector).await?;
        for subnet in &matching {
            self.delete_subnet4(selector, subnet.id).await?;
        }
        Ok(matching.len())
    }

    async fn get_subnet6(
        &self,
        selector: &ServerSelector,
        id: SubnetId,
    ) -> Result<Option<Subnet6>, ConfigBackendError> {
        selector.require_assigned()?;
        let key = id as i64;
        let row = sqlx::query_as!(util::Subnet6Row, "SELECT * FROM subnet6 WHERE id = ?1", key)
            .fetch_optional(&self.pool)
            .await?;
        row.map(util::into_subnet6)
            .transpose()
            .map(|s| s.filter(|s| selector.matches(&s.tags)))
    }

    async fn get_all_subnet6(&self, selector: &ServerSelector) -> Result<Vec<Subnet6>, ConfigBackendError> {
        selector.require_assigned()?;
        let rows = sqlx::query_as!(util::Subnet6Row, "SELECT * FROM subnet6")
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter()
            .map(util::into_subnet6)
            .collect::<Result<Vec<_>, _>>()
            .map(|v| v.into_iter().filter(|s| selector.matches(&s.tags)).collect())
    }

    async fn get_modified_subnet6(
        &self,
        selector: &ServerSelector,
        since: DateTime<Utc>,
    ) -> Result<Vec<Subnet6>, ConfigBackendError> {
        selector.require_assigned()?;
        let since = util::epoch(since);
        let rows = sqlx::query_as!(util::Subnet6Row, "SELECT * FROM subnet6 WHERE modified_at > ?1", since)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter()
            .map(util::into_subnet6)
            .collect::<Result<Vec<_>, _>>()
            .map(|v| v.into_iter().filter(|s| selector.matches(&s.tags)).collect())
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
        let row = util::from_subnet6(&subnet)?;
        let existing = sqlx::query!("SELECT id FROM subnet6 WHERE id = ?1", row.id)
            .fetch_optional(&self.pool)
            .await?;
        sqlx::query!(
            r#"INSERT OR REPLACE INTO subnet6
               (id, prefix, pools, pd_pools, shared_network, parameters, tags, modified_at)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"#,
            row.id,
            row.prefix,
            row.pools,
            row.pd_pools,
            row.shared_network,
            row.parameters,
            row.tags,
            row.modified_at,
        )
        .execute(&self.pool)
        .await?;
        let modification = if existing.is_some() { ModificationType::Update } else { ModificationType::Create };
        self.record_audit("subnet6", &subnet.id.to_string(), modification, &tags).await
    }

    async fn delete_subnet6(
        &self,
        selector: &ServerSelector,
        id: SubnetId,
    ) -> Result<usize, ConfigBackendError> {
        selector.require_writable()?;
        let key = id as i64;
        let tags = selector.to_tags()?;
        let existing = sqlx::query_as!(util::Subnet6Row, "SELECT * FROM subnet6 WHERE id = ?1", key)
            .fetch_optional(&self.pool)
            .await?
            .map(util::into_subnet6)
            .transpose()?;
        let Some(existing) = existing.filter(|s| selector.matches(&s.tags)) else {
            return Ok(0);
        };
        sqlx::query!("DELETE FROM subnet6 WHERE id = ?1", key)
            .execute(&self.pool)
            .await?;
        self.record_audit("subnet6", &existing.id.to_string(), ModificationType::Delete, &tags).await?;
        Ok(1)
    }

    async fn delete_all_subnet6(&self, selector: &ServerSelector) -> Result<usize, ConfigBackendError> {
        selector.require_writable()?;
        let matching = self.get_all_subnet6(selector).await?;
        for subnet in &matching {
            self.delete_subnet6(selector, subnet.id).await?;
        }
        Ok(matching.len())
    }

    async fn get_shared_network4(
        &self,
        selector: &ServerSelector,
        name: &str,
    ) -> Result<Option<SharedNetwork4>, ConfigBackendError> {
        selector.require_assigned()?;
        let row = sqlx::query_as!(util::SharedNetwork4Row, "SELECT * FROM shared_network4 WHERE name = ?1", name)
            .fetch_optional(&self.pool)
            .await?;
        row.map(util::into_shared_network4)
            .transpose()
            .map(|n| n.filter(|n| selector.matches(&n.tags)))
    }

    async fn get_all_shared_network4(
        &self,
        selector: &ServerSelector,
    ) -> Result<Vec<SharedNetwork4>, ConfigBackendError> {
        selector.require_assigned()?;
        let rows = sqlx::query_as!(util::SharedNetwork4Row, "SELECT * FROM shared_network4")
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter()
            .map(util::into_shared_network4)
            .collect::<Result<Vec<_>, _>>()
            .map(|v| v.into_iter().filter(|n| selector.matches(&n.tags)).collect())
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
        let row = util::from_shared_network4(&network)?;
        let existing = sqlx::query!("SELECT name FROM shared_network4 WHERE name = ?1", row.name)
            .fetch_optional(&self.pool)
            .await?;
        sqlx::query!(
            r#"INSERT OR REPLACE INTO shared_network4 (name, subnet_ids, parameters, tags, modified_at)
               VALUES (?1, ?2, ?3, ?4, ?5)"#,
            row.name,
            row.subnet_ids,
            row.parameters,
            row.tags,
            row.modified_at,
        )
        .execute(&self.pool)
        .await?;
        let modification = if existing.is_some() { ModificationType::Update } else { ModificationType::Create };
        self.record_audit("shared_network4", &network.name, modification, &tags).await
    }

    async fn delete_shared_network4(
        &self,
        selector: &ServerSelector,
        name: &str,
    ) -> Result<usize, ConfigBackendError> {
        selector.require_writable()?;
        let tags = selector.to_tags()?;
        let existing = sqlx::query_as!(util::SharedNetwork4Row, "SELECT * FROM shared_network4 WHERE name = ?1", name)
            .fetch_optional(&self.pool)
            .await?
            .map(util::into_shared_network4)
            .transpose()?;
        let Some(existing) = existing.filter(|n| selector.matches(&n.tags)) else {
            return Ok(0);
        };
        sqlx::query!("DELETE FROM shared_network4 WHERE name = ?1", name)
            .execute(&self.pool)
            .await?;
        self.record_audit("shared_network4", &existing.name, ModificationType::Delete, &tags).await?;
        Ok(1)
    }

    async fn get_shared_network6(
        &self,
        selector: &ServerSelector,
        name: &str,
    ) -> Result<Option<SharedNetwork6>, ConfigBackendError> {
        selector.require_assigned()?;
        let row = sqlx::query_as!(util::SharedNetwork6Row, "SELECT * FROM shared_network6 WHERE name = ?1", name)
            .fetch_optional(&self.pool)
            .await?;
        row.map(util::into_shared_network6)
            .transpose()
            .map(|n| n.filter(|n| selector.matches(&n.tags)))
    }

    async fn get_all_shared_network6(
        &self,
        selector: &ServerSelector,
    ) -> Result<Vec<SharedNetwork6>, ConfigBackendError> {
        selector.require_assigned()?;
        let rows = sqlx::query_as!(util::SharedNetwork6Row, "SELECT * FROM shared_network6")
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter()
            .map(util::into_shared_network6)
            .collect::<Result<Vec<_>, _>>()
            .map(|v| v.into_iter().filter(|n| selector.matches(&n.tags)).collect())
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
        let row = util::from_shared_network6(&network)?;
        let existing = sqlx::query!("SELECT name FROM shared_network6 WHERE name = ?1", row.name)
            .fetch_optional(&self.pool)
            .await?;
        sqlx::query!(
            r#"INSERT OR REPLACE INTO shared_network6 (name, subnet_ids, parameters, tags, modified_at)
               VALUES (?1, ?2, ?3, ?4, ?5)"#,
            row.name,
            row.subnet_ids,
            row.parameters,
            row.tags,
            row.modified_at,
        )
        .execute(&self.pool)
        .await?;
        let modification = if existing.is_some() { ModificationType::Update } else { ModificationType::Create };
        self.record_audit("shared_network6", &network.name, modification, &tags).await
    }

    async fn delete_shared_network6(
        &self,
        selector: &ServerSelector,
        name: &str,
    ) -> Result<usize, ConfigBackendError> {
        selector.require_writable()?;
        let tags = selector.to_tags()?;
        let existing = sqlx::query_as!(util::SharedNetwork6Row, "SELECT * FROM shared_network6 WHERE name = ?1", name)
            .fetch_optional(&self.pool)
            .await?
            .map(util::into_shared_network6)
            .transpose()?;
        let Some(existing) = existing.filter(|n| selector.matches(&n.tags)) else {
            return Ok(0);
        };
        sqlx::query!("DELETE FROM shared_network6 WHERE name = ?1", name)
            .execute(&self.pool)
            .await?;
        self.record_audit("shared_network6", &existing.name, ModificationType::Delete, &tags).await?;
        Ok(1)
    }

    async fn get_option_definition(
        &self,
        selector: &ServerSelector,
        code: u32,
        space: &str,
    ) -> Result<Option<OptionDefinition>, ConfigBackendError> {
        selector.require_assigned()?;
        let code = code as i64;
        let row = sqlx::query_as!(
            util::OptionDefinitionRow,
            "SELECT * FROM option_definitions WHERE code = ?1 AND space = ?2",
            code,
            space
        )
        .fetch_optional(&self.pool)
        .await?;
        row.map(util::into_option_definition)
            .transpose()
            .map(|d| d.filter(|d| selector.matches(&d.tags)))
    }

    async fn get_all_option_definitions(
        &self,
        selector: &ServerSelector,
    ) -> Result<Vec<OptionDefinition>, ConfigBackendError> {
        selector.require_assigned()?;
        let rows = sqlx::query_as!(util::OptionDefinitionRow, "SELECT * FROM option_definitions")
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter()
            .map(util::into_option_definition)
            .collect::<Result<Vec<_>, _>>()
            .map(|v| v.into_iter().filter(|d| selector.matches(&d.tags)).collect())
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
        let row = util::from_option_definition(&def)?;
        let existing = sqlx::query!(
            "SELECT code FROM option_definitions WHERE code = ?1 AND space = ?2",
            row.code,
            row.space
        )
        .fetch_optional(&self.pool)
        .await?;
        sqlx::query!(
            r#"INSERT OR REPLACE INTO option_definitions
               (code, space, record_type, encapsulated_space, is_array, tags, modified_at)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"#,
            row.code,
            row.space,
            row.record_type,
            row.encapsulated_space,
            row.is_array,
            row.tags,
            row.modified_at,
        )
        .execute(&self.pool)
        .await?;
        let modification = if existing.is_some() { ModificationType::Update } else { ModificationType::Create };
        let object_id = format!("{}/{}", def.code, def.space);
        self.record_audit("option_definition", &object_id, modification, &tags).await
    }

    async fn delete_option_definition(
        &self,
        selector: &ServerSelector,
        code: u32,
        space: &str,
    ) -> Result<usize, ConfigBackendError> {
        selector.require_writable()?;
        let tags = selector.to_tags()?;
        let code_key = code as i64;
        let existing = sqlx::query_as!(
            util::OptionDefinitionRow,
            "SELECT * FROM option_definitions WHERE code = ?1 AND space = ?2",
            code_key,
            space
        )
        .fetch_optional(&self.pool)
        .await?
        .map(util::into_option_definition)
        .transpose()?;
        let Some(existing) = existing.filter(|d| selector.matches(&d.tags)) else {
            return Ok(0);
        };
        sqlx::query!(
            "DELETE FROM option_definitions WHERE code = ?1 AND space = ?2",
            code_key,
            space
        )
        .execute(&self.pool)
        .await?;
        self.record_audit(
            "option_definition",
            &format!("{}/{}", existing.code, existing.space),
            ModificationType::Delete,
            &tags,
        )
        .await?;
        Ok(1)
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
        let row = util::from_option_descriptor(&descriptor)?;
        let existing = sqlx::query!(
            "SELECT code FROM options WHERE scope = ?1 AND code = ?2 AND space = ?3",
            row.scope,
            row.code,
            row.space
        )
        .fetch_optional(&self.pool)
        .await?;
        sqlx::query!(
            r#"INSERT OR REPLACE INTO options
               (scope, code, space, persistent, formatted_value, cancelled, tags, modified_at)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"#,
            row.scope,
            row.code,
            row.space,
            row.persistent,
            row.formatted_value,
            row.cancelled,
            row.tags,
            row.modified_at,
        )
        .execute(&self.pool)
        .await?;
        let modification = if existing.is_some() { ModificationType::Update } else { ModificationType::Create };
        let object_id = format!("{}/{}/{}", row.scope, descriptor.code, descriptor.space);
        self.record_audit("option", &object_id, modification, &tags).await
    }

    async fn get_options(
        &self,
        selector: &ServerSelector,
        scope: &OptionScope,
    ) -> Result<Vec<OptionDescriptor>, ConfigBackendError> {
        selector.require_assigned()?;
        let scope_key = util::encode_scope(scope)?;
        let rows = sqlx::query_as!(util::OptionRow, "SELECT * FROM options WHERE scope = ?1", scope_key)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter()
            .map(util::into_option_descriptor)
            .collect::<Result<Vec<_>, _>>()
            .map(|v| v.into_iter().filter(|d| selector.matches(&d.tags)).collect())
    }

    async fn delete_option(
        &self,
        selector: &ServerSelector,
        scope: &OptionScope,
        code: u32,
        space: &str,
    ) -> Result<usize, ConfigBackendError> {
        selector.require_writable()?;
        let tags = selector.to_tags()?;
        let scope_key = util::encode_scope(scope)?;
        let code_key = code as i64;
        let existing = sqlx::query_as!(
            util::OptionRow,
            "SELECT * FROM options WHERE scope = ?1 AND code = ?2 AND space = ?3",
            scope_key,
            code_key,
            space
        )
        .fetch_optional(&self.pool)
        .await?
        .map(util::into_option_descriptor)
        .transpose()?;
        let Some(existing) = existing.filter(|d| selector.matches(&d.tags)) else {
            return Ok(0);
        };
        sqlx::query!(
            "DELETE FROM options WHERE scope = ?1 AND code = ?2 AND space = ?3",
            scope_key,
            code_key,
            space
        )
        .execute(&self.pool)
        .await?;
        self.record_audit(
            "option",
            &format!("{}/{}/{}", scope_key, existing.code, existing.space),
            ModificationType::Delete,
            &tags,
        )
        .await?;
        Ok(1)
    }

    async fn delete_all_options(
        &self,
        selector: &ServerSelector,
        scope: &OptionScope,
    ) -> Result<usize, ConfigBackendError> {
        selector.require_writable()?;
        let matching = self.get_options(selector, scope).await?;
        for descriptor in &matching {
            self.delete_option(selector, scope, descriptor.code, &descriptor.space).await?;
        }
        Ok(matching.len())
    }

    async fn get_global_parameter(
        &self,
        selector: &ServerSelector,
        name: &str,
    ) -> Result<Option<GlobalParameter>, ConfigBackendError> {
        selector.require_assigned()?;
        let row = sqlx::query_as!(util::GlobalParameterRow, "SELECT * FROM global_parameters WHERE name = ?1", name)
            .fetch_optional(&self.pool)
            .await?;
        row.map(util::into_global_parameter)
            .transpose()
            .map(|p| p.filter(|p| selector.matches(&p.tags)))
    }

    async fn get_all_global_parameters(
        &self,
        selector: &ServerSelector,
    ) -> Result<Vec<GlobalParameter>, ConfigBackendError> {
        selector.require_assigned()?;
        let rows = sqlx::query_as!(util::GlobalParameterRow, "SELECT * FROM global_parameters")
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter()
            .map(util::into_global_parameter)
            .collect::<Result<Vec<_>, _>>()
            .map(|v| v.into_iter().filter(|p| selector.matches(&p.tags)).collect())
    }

    async fn create_update_global_parameter(
        &self,
        selector: &ServerSelector,
        mut parameter: GlobalParameter,
    ) -> Result<(), ConfigBackendError> {
        selector.require_writable()?;
        let tags = selector.to_tags()?;
        parameter.tags = tags.clone();
        let row = util::from_global_parameter(&parameter)?;
        let name = parameter.name().to_string();
        let existing = sqlx::query!("SELECT name FROM global_parameters WHERE name = ?1", row.name)
            .fetch_optional(&self.pool)
            .await?;
        sqlx::query!(
            r#"INSERT OR REPLACE INTO global_parameters (name, value_type, value, tags, modified_at)
               VALUES (?1, ?2, ?3, ?4, ?5)"#,
            row.name,
            row.value_type,
            row.value,
            row.tags,
            row.modified_at,
        )
        .execute(&self.pool)
        .await?;
        let modification = if existing.is_some() { ModificationType::Update } else { ModificationType::Create };
        self.record_audit("global_parameter", &name, modification, &tags).await
    }

    async fn delete_global_parameter(
        &self,
        selector: &ServerSelector,
        name: &str,
    ) -> Result<usize, ConfigBackendError> {
        selector.require_writable()?;
        let tags = selector.to_tags()?;
        let existing = sqlx::query_as!(util::GlobalParameterRow, "SELECT * FROM global_parameters WHERE name = ?1", name)
            .fetch_optional(&self.pool)
            .await?
            .map(util::into_global_parameter)
            .transpose()?;
        let Some(existing) = existing.filter(|p| selector.matches(&p.tags)) else {
            return Ok(0);
        };
        sqlx::query!("DELETE FROM global_parameters WHERE name = ?1", name)
            .execute(&self.pool)
            .await?;
        self.record_audit(
            "global_parameter",
            existing.name(),
            ModificationType::Delete,
            &tags,
        )
        .await?;
        Ok(1)
    }

    async fn get_recent_audit_entries(
        &self,
        selector: &ServerSelector,
        since: u64,
    ) -> Result<Vec<AuditEntry>, ConfigBackendError> {
        selector.require_assigned()?;
        let since = since as i64;
        let rows = sqlx::query_as!(
            util::AuditRow,
            r#"SELECT * FROM audit_log WHERE revision_id > ?1 ORDER BY timestamp ASC, revision_id ASC"#,
            since
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(util::into_audit_entry)
            .filter(|e| selector.matches(&BTreeSet::from([e.server_tag.clone()])))
            .collect())
    }

    fn subscribe(&self, observer: AuditObserver) {
        self.observers.write().push(observer);
    }

    fn name(&self) -> &'static str {
        "sqlite-config"
    }

    fn description(&self) -> &'static str {
        "relational configuration backend backed by SQLite via sqlx"
    }

    fn schema_version(&self) -> SchemaVersion {
        EXPECTED_SCHEMA_VERSION
    }
}

mod util {
    use super::*;

    pub struct Subnet4Row {
        pub id: i64,
        pub prefix: String,
        pub pools: String,
        pub shared_network: Option<String>,
        pub parameters: String,
        pub tags: String,
        pub modified_at: i64,
    }

    pub struct Subnet6Row {
        pub id: i64,
        pub prefix: String,
        pub pools: String,
        pub pd_pools: String,
        pub shared_network: Option<String>,
        pub parameters: String,
        pub tags: String,
        pub modified_at: i64,
    }

    pub struct SharedNetwork4Row {
        pub name: String,
        pub subnet_ids: String,
        pub parameters: String,
        pub tags: String,
        pub modified_at: i64,
    }

    pub struct SharedNetwork6Row {
        pub name: String,
        pub subnet_ids: String,
        pub parameters: String,
        pub tags: String,
        pub modified_at: i64,
    }

    pub struct OptionDefinitionRow {
        pub code: i64,
        pub space: String,
        pub record_type: String,
        pub encapsulated_space: Option<String>,
        pub is_array: bool,
        pub tags: String,
        pub modified_at: i64,
    }

    pub struct OptionRow {
        pub scope: String,
        pub code: i64,
        pub space: String,
        pub persistent: bool,
        pub formatted_value: String,
        pub cancelled: bool,
        pub tags: String,
        pub modified_at: i64,
    }

    pub struct GlobalParameterRow {
        pub name: String,
        pub value_type: String,
        pub value: String,
        pub tags: String,
        pub modified_at: i64,
    }

    pub struct AuditRow {
        pub revision_id: i64,
        pub object_type: String,
        pub object_id: String,
        pub modification_type: i64,
        pub timestamp: i64,
        pub server_tag: String,
    }

    pub fn epoch(time: DateTime<Utc>) -> i64 {
        time.timestamp()
    }

    pub fn to_datetime(epoch: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(epoch, 0).unwrap_or_else(Utc::now)
    }

    pub fn modification_code(kind: ModificationType) -> i64 {
        match kind {
            ModificationType::Create => 0,
            ModificationType::Update => 1,
            ModificationType::Delete => 2,
        }
    }

    fn modification_from_code(code: i64) -> ModificationType {
        match code {
            1 => ModificationType::Update,
            2 => ModificationType::Delete,
            _ => ModificationType::Create,
        }
    }

    fn tags_to_json(tags: &BTreeSet<String>) -> Result<String, ConfigBackendError> {
        serde_json::to_string(tags).map_err(|e| ConfigBackendError::BadValue(e.to_string()))
    }

    fn tags_from_json(text: &str) -> Result<BTreeSet<String>, ConfigBackendError> {
        serde_json::from_str(text).map_err(|e| ConfigBackendError::BadValue(e.to_string()))
    }

    pub fn encode_scope(scope: &OptionScope) -> Result<String, ConfigBackendError> {
        serde_json::to_string(scope).map_err(|e| ConfigBackendError::BadValue(e.to_string()))
    }

    fn decode_scope(text: &str) -> Result<OptionScope, ConfigBackendError> {
        serde_json::from_str(text).map_err(|e| ConfigBackendError::BadValue(e.to_string()))
    }

    pub fn from_subnet4(subnet: &Subnet4) -> Result<Subnet4Row, ConfigBackendError> {
        Ok(Subnet4Row {
            id: subnet.id as i64,
            prefix: subnet.prefix.to_string(),
            pools: serde_json::to_string(&subnet.pools).map_err(|e| ConfigBackendError::BadValue(e.to_string()))?,
            shared_network: subnet.shared_network.clone(),
            parameters: serde_json::to_string(&subnet.parameters)
                .map_err(|e| ConfigBackendError::BadValue(e.to_string()))?,
            tags: tags_to_json(&subnet.tags)?,
            modified_at: epoch(subnet.modified_at),
        })
    }

    pub fn into_subnet4(row: Subnet4Row) -> Result<Subnet4, ConfigBackendError> {
        Ok(Subnet4 {
            id: row.id as u32,
            prefix: row.prefix.parse().map_err(|_| ConfigBackendError::BadValue("bad prefix".into()))?,
            pools: serde_json::from_str(&row.pools).map_err(|e| ConfigBackendError::BadValue(e.to_string()))?,
            shared_network: row.shared_network,
            parameters: serde_json::from_str(&row.parameters)
                .map_err(|e| ConfigBackendError::BadValue(e.to_string()))?,
            tags: tags_from_json(&row.tags)?,
            modified_at: to_datetime(row.modified_at),
        })
    }

    pub fn from_subnet6(subnet: &Subnet6) -> Result<Subnet6Row, ConfigBackendError> {
        Ok(Subnet6Row {
            id: subnet.id as i64,
            prefix: subnet.prefix.to_string(),
            pools: serde_json::to_string(&subnet.pools).map_err(|e| ConfigBackendError::BadValue(e.to_string()))?,
            pd_pools: serde_json::to_string(&subnet.pd_pools)
                .map_err(|e| ConfigBackendError::BadValue(e.to_string()))?,
            shared_network: subnet.shared_network.clone(),
            parameters: serde_json::to_string(&subnet.parameters)
                .map_err(|e| ConfigBackendError::BadValue(e.to_string()))?,
            tags: tags_to_json(&subnet.tags)?,
            modified_at: epoch(subnet.modified_at),
        })
    }

    pub fn into_subnet6(row: Subnet6Row) -> Result<Subnet6, ConfigBackendError> {
        Ok(Subnet6 {
            id: row.id as u32,
            prefix: row.prefix.parse().map_err(|_| ConfigBackendError::BadValue("bad prefix".into()))?,
            pools: serde_json::from_str(&row.pools).map_err(|e| ConfigBackendError::BadValue(e.to_string()))?,
            pd_pools: serde_json::from_str(&row.pd_pools).map_err(|e| ConfigBackendError::BadValue(e.to_string()))?,
            shared_network: row.shared_network,
            parameters: serde_json::from_str(&row.parameters)
                .map_err(|e| ConfigBackendError::BadValue(e.to_string()))?,
            tags: tags_from_json(&row.tags)?,
            modified_at: to_datetime(row.modified_at),
        })
    }

    pub fn from_shared_network4(network: &SharedNetwork4) -> Result<SharedNetwork4Row, ConfigBackendError> {
        Ok(SharedNetwork4Row {
            name: network.name.clone(),
            subnet_ids: serde_json::to_string(&network.subnet_ids)
                .map_err(|e| ConfigBackendError::BadValue(e.to_string()))?,
            parameters: serde_json::to_string(&network.parameters)
                .map_err(|e| ConfigBackendError::BadValue(e.to_string()))?,
            tags: tags_to_json(&network.tags)?,
            modified_at: epoch(network.modified_at),
        })
    }

    pub fn into_shared_network4(row: SharedNetwork4Row) -> Result<SharedNetwork4, ConfigBackendError> {
        Ok(SharedNetwork4 {
            name: row.name,
            subnet_ids: serde_json::from_str(&row.subnet_ids)
                .map_err(|e| ConfigBackendError::BadValue(e.to_string()))?,
            parameters: serde_json::from_str(&row.parameters)
                .map_err(|e| ConfigBackendError::BadValue(e.to_string()))?,
            tags: tags_from_json(&row.tags)?,
            modified_at: to_datetime(row.modified_at),
        })
    }

    pub fn from_shared_network6(network: &SharedNetwork6) -> Result<SharedNetwork6Row, ConfigBackendError> {
        Ok(SharedNetwork6Row {
            name: network.name.clone(),
            subnet_ids: serde_json::to_string(&network.subnet_ids)
                .map_err(|e| ConfigBackendError::BadValue(e.to_string()))?,
            parameters: serde_json::to_string(&network.parameters)
                .map_err(|e| ConfigBackendError::BadValue(e.to_string()))?,
            tags: tags_to_json(&network.tags)?,
            modified_at: epoch(network.modified_at),
        })
    }

    pub fn into_shared_network6(row: SharedNetwork6Row) -> Result<SharedNetwork6, ConfigBackendError> {
        Ok(SharedNetwork6 {
            name: row.name,
            subnet_ids: serde_json::from_str(&row.subnet_ids)
                .map_err(|e| ConfigBackendError::BadValue(e.to_string()))?,
            parameters: serde_json::from_str(&row.parameters)
                .map_err(|e| ConfigBackendError::BadValue(e.to_string()))?,
            tags: tags_from_json(&row.tags)?,
            modified_at: to_datetime(row.modified_at),
        })
    }

    pub fn from_option_definition(def: &OptionDefinition) -> Result<OptionDefinitionRow, ConfigBackendError> {
        Ok(OptionDefinitionRow {
            code: def.code as i64,
            space: def.space.clone(),
            record_type: def.record_type.clone(),
            encapsulated_space: def.encapsulated_space.clone(),
            is_array: def.array,
            tags: tags_to_json(&def.tags)?,
            modified_at: epoch(def.modified_at),
        })
    }

    pub fn into_option_definition(row: OptionDefinitionRow) -> Result<OptionDefinition, ConfigBackendError> {
        Ok(OptionDefinition {
            code: row.code as u32,
            space: row.space,
            record_type: row.record_type,
            encapsulated_space: row.encapsulated_space,
            array: row.is_array,
            tags: tags_from_json(&row.tags)?,
            modified_at: to_datetime(row.modified_at),
        })
    }

    pub fn from_option_descriptor(descriptor: &OptionDescriptor) -> Result<OptionRow, ConfigBackendError> {
        Ok(OptionRow {
            scope: encode_scope(&descriptor.scope)?,
            code: descriptor.code as i64,
            space: descriptor.space.clone(),
            persistent: descriptor.persistent,
            formatted_value: descriptor.formatted_value.clone(),
            cancelled: descriptor.cancelled,
            tags: tags_to_json(&descriptor.tags)?,
            modified_at: epoch(descriptor.modified_at),
        })
    }

    pub fn into_option_descriptor(row: OptionRow) -> Result<OptionDescriptor, ConfigBackendError> {
        Ok(OptionDescriptor {
            code: row.code as u32,
            space: row.space,
            scope: decode_scope(&row.scope)?,
            persistent: row.persistent,
            formatted_value: row.formatted_value,
            cancelled: row.cancelled,
            tags: tags_from_json(&row.tags)?,
            modified_at: to_datetime(row.modified_at),
        })
    }

    pub fn from_global_parameter(parameter: &GlobalParameter) -> Result<GlobalParameterRow, ConfigBackendError> {
        Ok(GlobalParameterRow {
            name: parameter.value.name.clone(),
            value_type: serde_json::to_string(&parameter.value.value_type)
                .map_err(|e| ConfigBackendError::BadValue(e.to_string()))?,
            value: parameter.value.value.clone(),
            tags: tags_to_json(&parameter.tags)?,
            modified_at: epoch(parameter.value.modified_at),
        })
    }

    pub fn into_global_parameter(row: GlobalParameterRow) -> Result<GlobalParameter, ConfigBackendError> {
        Ok(GlobalParameter {
            value: stamped_value::WireStampedValue {
                name: row.name,
                value_type: serde_json::from_str(&row.value_type)
                    .map_err(|e| ConfigBackendError::BadValue(e.to_string()))?,
                value: row.value,
                modified_at: to_datetime(row.modified_at),
            },
            tags: tags_from_json(&row.tags)?,
        })
    }

    pub fn into_audit_entry(row: AuditRow) -> AuditEntry {
        AuditEntry {
            object_type: row.object_type,
            object_id: row.object_id,
            modification_type: modification_from_code(row.modification_type),
            timestamp: to_datetime(row.timestamp),
            revision_id: row.revision_id as u64,
            server_tag: row.server_tag,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

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

    #[tokio::test]
    async fn create_update_subnet4_round_trips_through_sqlite() -> Result<(), Box<dyn std::error::Error>> {
        let backend = SqlConfigBackend::new("sqlite::memory:").await?;
        let selector = ServerSelector::OneServer("dhcp1".into());
        backend.create_update_subnet4(&selector, subnet4(5)).await?;

        let found = backend.get_subnet4(&selector, 5).await?.unwrap();
        assert_eq!(found.id, 5);
        assert!(found.tags.contains("dhcp1"));
        Ok(())
    }

    #[tokio::test]
    async fn delete_subnet4_reports_audit_entry() -> Result<(), Box<dyn std::error::Error>> {
        let backend = SqlConfigBackend::new("sqlite::memory:").await?;
        let selector = ServerSelector::OneServer("dhcp1".into());
        backend.create_update_subnet4(&selector, subnet4(9)).await?;
        assert_eq!(backend.delete_subnet4(&selector, 9).await?, 1);

        let entries = backend.get_recent_audit_entries(&selector, 0).await?;
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].modification_type, ModificationType::Delete);
        Ok(())
    }

    #[tokio::test]
    async fn schema_version_matches_expected() -> Result<(), Box<dyn std::error::Error>> {
        let backend = SqlConfigBackend::new("sqlite::memory:").await?;
        assert_eq!(backend.schema_version(), EXPECTED_SCHEMA_VERSION);
        Ok(())
    }
}
