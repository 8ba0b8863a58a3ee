#![warn(
    missing_debug_implementations,
    rust_2018_idioms,
    unreachable_pub,
    non_snake_case,
    non_upper_case_globals
)]
#![deny(rustdoc::broken_intra_doc_links)]

//! # config-backend
//!
//! Persists server configuration entities (subnets, shared networks, option
//! definitions, option descriptors, global parameters), partitioned by
//! [`ServerSelector`], with an audit log other instances can tail to detect
//! change. Two backend shapes: [`MemoryConfigBackend`] (the default/dev
//! backend) and [`SqlConfigBackend`] (`sqlx`/SQLite).
//!
//! Not used directly by a request handler; the allocation engine reads
//! through a published, immutable configuration snapshot built from this
//! trait's `get_all_*`/`get_modified_*` methods (§5).

pub mod entity;
pub mod error;
pub mod memory;
pub mod selector;
pub mod sql;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

pub use entity::{
    AuditEntry, GlobalParameter, ModificationType, OptionDefinition, OptionDescriptor,
    OptionScope, PdPool, Pool4, Pool6, SharedNetwork4, SharedNetwork6, Subnet4, Subnet6,
};
pub use error::ConfigBackendError;
pub use memory::MemoryConfigBackend;
pub use selector::{ServerSelector, ServerTag};
pub use sql::SqlConfigBackend;

use entity::subnet::SubnetId;

/// `(major, minor)`. A store refuses to open when the on-disk major version
/// does not match the code's expected major (§6).
pub type SchemaVersion = (u32, u32);

pub const EXPECTED_SCHEMA_VERSION: SchemaVersion = (1, 0);

/// Notified synchronously after a committed write, batched per call (§9
/// "global configuration handler callbacks" -> explicit observer list).
pub type AuditObserver = Box<dyn Fn(&[AuditEntry]) + Send + Sync>;

#[async_trait]
pub trait ConfigBackend: Send + Sync + 'static {
    async fn get_subnet4(
        &self,
        selector: &ServerSelector,
        id: SubnetId,
    ) -> Result<Option<Subnet4>, ConfigBackendError>;
    async fn get_all_subnet4(
        &self,
        selector: &ServerSelector,
    ) -> Result<Vec<Subnet4>, ConfigBackendError>;
    async fn get_modified_subnet4(
        &self,
        selector: &ServerSelector,
        since: DateTime<Utc>,
    ) -> Result<Vec<Subnet4>, ConfigBackendError>;
    async fn create_update_subnet4(
        &self,
        selector: &ServerSelector,
        subnet: Subnet4,
    ) -> Result<(), ConfigBackendError>;
    async fn delete_subnet4(
        &self,
        selector: &ServerSelector,
        id: SubnetId,
    ) -> Result<usize, ConfigBackendError>;
    async fn delete_all_subnet4(
        &self,
        selector: &ServerSelector,
    ) -> Result<usize, ConfigBackendError>;

    async fn get_subnet6(
        &self,
        selector: &ServerSelector,
        id: SubnetId,
    ) -> Result<Option<Subnet6>, ConfigBackendError>;
    async fn get_all_subnet6(
        &self,
        selector: &ServerSelector,
    ) -> Result<Vec<Subnet6>, ConfigBackendError>;
    async fn get_modified_subnet6(
        &self,
        selector: &ServerSelector,
        since: DateTime<Utc>,
    ) -> Result<Vec<Subnet6>, ConfigBackendError>;
    async fn create_update_subnet6(
        &self,
        selector: &ServerSelector,
        subnet: Subnet6,
    ) -> Result<(), ConfigBackendError>;
    async fn delete_subnet6(
        &self,
        selector: &ServerSelector,
        id: SubnetId,
    ) -> Result<usize, ConfigBackendError>;
    async fn delete_all_subnet6(
        &self,
        selector: &ServerSelector,
    ) -> Result<usize, ConfigBackendError>;

    async fn get_shared_network4(
        &self,
        selector: &ServerSelector,
        name: &str,
    ) -> Result<Option<SharedNetwork4>, ConfigBackendError>;
    async fn get_all_shared_network4(
        &self,
        selector: &ServerSelector,
    ) -> Result<Vec<SharedNetwork4>, ConfigBackendError>;
    async fn create_update_shared_network4(
        &self,
        selector: &ServerSelector,
        network: SharedNetwork4,
    ) -> Result<(), ConfigBackendError>;
    async fn delete_shared_network4(
        &self,
        selector: &ServerSelector,
        name: &str,
    ) -> Result<usize, ConfigBackendError>;

    async fn get_shared_network6(
        &self,
        selector: &ServerSelector,
        name: &str,
    ) -> Result<Option<SharedNetwork6>, ConfigBackendError>;
    async fn get_all_shared_network6(
        &self,
        selector: &ServerSelector,
    ) -> Result<Vec<SharedNetwork6>, ConfigBackendError>;
    async fn create_update_shared_network6(
        &self,
        selector: &ServerSelector,
        network: SharedNetwork6,
    ) -> Result<(), ConfigBackendError>;
    async fn delete_shared_network6(
        &self,
        selector: &ServerSelector,
        name: &str,
    ) -> Result<usize, ConfigBackendError>;

    async fn get_option_definition(
        &self,
        selector: &ServerSelector,
        code: u32,
        space: &str,
    ) -> Result<Option<OptionDefinition>, ConfigBackendError>;
    async fn get_all_option_definitions(
        &self,
        selector: &ServerSelector,
    ) -> Result<Vec<OptionDefinition>, ConfigBackendError>;
    async fn create_update_option_definition(
        &self,
        selector: &ServerSelector,
        def: OptionDefinition,
    ) -> Result<(), ConfigBackendError>;
    async fn delete_option_definition(
        &self,
        selector: &ServerSelector,
        code: u32,
        space: &str,
    ) -> Result<usize, ConfigBackendError>;

    /// Routes to the correct storage table by `descriptor.scope` (§4.3
    /// "Option scope addressing"); no two scopes share a primary key.
    async fn create_update_option(
        &self,
        selector: &ServerSelector,
        descriptor: OptionDescriptor,
    ) -> Result<(), ConfigBackendError>;
    async fn get_options(
        &self,
        selector: &ServerSelector,
        scope: &OptionScope,
    ) -> Result<Vec<OptionDescriptor>, ConfigBackendError>;
    async fn delete_option(
        &self,
        selector: &ServerSelector,
        scope: &OptionScope,
        code: u32,
        space: &str,
    ) -> Result<usize, ConfigBackendError>;
    async fn delete_all_options(
        &self,
        selector: &ServerSelector,
        scope: &OptionScope,
    ) -> Result<usize, ConfigBackendError>;

    async fn get_global_parameter(
        &self,
        selector: &ServerSelector,
        name: &str,
    ) -> Result<Option<GlobalParameter>, ConfigBackendError>;
    async fn get_all_global_parameters(
        &self,
        selector: &ServerSelector,
    ) -> Result<Vec<GlobalParameter>, ConfigBackendError>;
    async fn create_update_global_parameter(
        &self,
        selector: &ServerSelector,
        parameter: GlobalParameter,
    ) -> Result<(), ConfigBackendError>;
    async fn delete_global_parameter(
        &self,
        selector: &ServerSelector,
        name: &str,
    ) -> Result<usize, ConfigBackendError>;

    /// Rows strictly after `since`, ordered by `(timestamp, revision_id)` (§4.3).
    async fn get_recent_audit_entries(
        &self,
        selector: &ServerSelector,
        since: u64,
    ) -> Result<Vec<AuditEntry>, ConfigBackendError>;

    /// Registers a callback invoked synchronously, batched, after each
    /// committed write (§9).
    fn subscribe(&self, observer: AuditObserver);

    fn name(&self) -> &'static str;
    fn description(&self) -> &'static str;
    fn schema_version(&self) -> SchemaVersion;
}
