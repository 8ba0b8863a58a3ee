//! GlobalParameter (§3.3): a [`StampedValue`] carried with server tags,
//! keyed by name.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use stamped_value::StampedValue;

use crate::selector::ServerTag;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlobalParameter {
    #[serde(flatten)]
    pub value: StampedValueWire,
    pub tags: BTreeSet<ServerTag>,
}

/// `StampedValue` has no `Serialize`/`Eq` of its own (its `modified_at` stamp
/// is set on construction, not round-tripped by value); this crate stores
/// the wire form directly and rehydrates a `StampedValue` on demand via
/// [`GlobalParameter::stamped_value`].
pub type StampedValueWire = stamped_value::WireStampedValue;

impl GlobalParameter {
    pub fn name(&self) -> &str {
        &self.value.name
    }

    pub fn stamped_value(&self) -> Result<StampedValue, stamped_value::StampedValueError> {
        StampedValue::from_wire(self.value.clone())
    }
}
