//! Diff computation for property sets

use crate::error::{Error, Result};
use crate::schema::{EntityKind, NormalizedSet, PropValue};
use serde::Serialize;
use serde_json::{Map, Value};

/// One property whose live value differs from the desired one
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Change {
    /// Kind of the owning entity
    pub kind: EntityKind,
    /// Owning entity name
    pub entity: String,
    /// Management-API property name
    pub property: String,
    /// Desired value
    #[serde(skip)]
    pub value: PropValue,
}

impl Change {
    /// Single-property payload for an update request
    pub fn payload(&self) -> Value {
        let mut body = Map::new();
        body.insert(self.property.clone(), self.value.to_json());
        Value::Object(body)
    }
}

/// Compare a desired property set against live properties
///
/// Only desired properties are considered; live properties without a desired
/// counterpart are left alone. A difference on a frozen property fails the
/// whole diff.
pub fn diff(desired: &NormalizedSet, live: &Map<String, Value>) -> Result<Vec<Change>> {
    let mut changes = Vec::new();
    for (name, prop) in desired.iter() {
        let current = live.get(name);
        if prop.value.matches(current) {
            continue;
        }
        if prop.frozen {
            return Err(Error::FrozenPropertyConflict {
                entity: desired.entity().to_string(),
                property: name.to_string(),
                live: current.map_or_else(|| "nothing".to_string(), Value::to_string),
                desired: prop.value.to_string(),
            });
        }
        log::trace!(
            "{} {}: {name} differs ({} -> {})",
            desired.kind(),
            desired.entity(),
            current.map_or_else(|| "absent".to_string(), Value::to_string),
            prop.value
        );
        changes.push(Change {
            kind: desired.kind(),
            entity: desired.entity().to_string(),
            property: name.to_string(),
            value: prop.value.clone(),
        });
    }
    Ok(changes)
}
