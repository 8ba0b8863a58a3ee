//! Configuration entities (§3.3): subnets, shared networks, option
//! definitions/descriptors at five scopes, global parameters, and audit
//! entries. Every entity carries a monotonically increasing modification
//! timestamp and a set of server tags.

pub mod audit;
pub mod global_parameter;
pub mod option;
pub mod shared_network;
pub mod subnet;

pub use audit::{AuditEntry, ModificationType};
pub use global_parameter::GlobalParameter;
pub use option::{OptionDefinition, OptionDescriptor, OptionScope};
pub use shared_network::{SharedNetwork4, SharedNetwork6};
pub use subnet::{PdPool, Pool4, Pool6, Subnet4, Subnet6};
