#![warn(
    missing_debug_implementations,
    rust_2018_idioms,
    unreachable_pub,
    non_snake_case,
    non_upper_case_globals
)]
#![deny(rustdoc::broken_intra_doc_links)]

//! # allocation-engine
//!
//! The stateful coordinator (§4.4) that, given a client request and the
//! currently published configuration snapshot, consults a [`lease_store`]
//! backend to produce or revise a lease while honoring pool boundaries,
//! host reservations, and client-class restrictions.
//!
//! Layering, leaves-first:
//! - [`picker`] — address/prefix picker strategies (iterative, random, hashed).
//! - [`reservation`] — host reservation lookup, a fourth snapshot input.
//! - [`snapshot`] — the immutable, publish-swap configuration view (§5).
//! - [`request`] — request/response contexts the upstream handler resolves.
//! - [`retry`] — bounded backoff for transient backend failures (§7).
//! - [`engine`] — [`engine::AllocationEngine4`] / [`engine::AllocationEngine6`],
//!   the actual allocate/renew/decline/release coordinator.

pub mod engine;
pub mod error;
pub mod picker;
pub mod request;
pub mod reservation;
pub mod retry;
pub mod snapshot;

pub use engine::{AllocationEngine4, AllocationEngine6};
pub use error::AllocationError;
pub use picker::PickerStrategy;
pub use request::{AllocateRequest4, AllocateRequest6, RenewRequest4, RenewRequest6};
pub use reservation::{HostReservation4, HostReservation6};
pub use retry::RetryPolicy;
pub use snapshot::{ConfigSnapshot4, ConfigSnapshot6, SnapshotHandle4, SnapshotHandle6};
