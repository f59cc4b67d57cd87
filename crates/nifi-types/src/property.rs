//! Component property values
//!
//! A processor property may hold free text or the id of a controller service
//! the processor depends on. The server does not tell the two apart, so the
//! value is classified here, once, while the response is parsed.

use crate::ids::ControllerServiceId;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Property name to value mapping, ordered for stable request bodies
pub type Properties = BTreeMap<String, PropertyValue>;

/// Length of the canonical hyphenated 8-4-4-4-12 form
const HYPHENATED_ID_LEN: usize = 36;

/// A single property value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropertyValue {
    /// Property has no value (`null` on the wire)
    Unset,

    /// Free-form value
    Plain(String),

    /// Value in canonical component-id form, a candidate controller reference
    ControllerRef(ControllerServiceId),
}

impl PropertyValue {
    /// Classify a raw wire value
    pub fn parse(raw: Option<String>) -> Self {
        match raw {
            None => Self::Unset,
            Some(value) if is_component_id(&value) => {
                Self::ControllerRef(ControllerServiceId::new(value))
            }
            Some(value) => Self::Plain(value),
        }
    }

    /// Wrap a configured value without classification
    pub fn plain(value: impl Into<String>) -> Self {
        Self::Plain(value.into())
    }

    pub fn controller_ref(&self) -> Option<&ControllerServiceId> {
        match self {
            Self::ControllerRef(id) => Some(id),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Unset => None,
            Self::Plain(value) => Some(value),
            Self::ControllerRef(id) => Some(id.as_str()),
        }
    }

    /// Demote a controller reference that did not resolve to a plain string
    pub fn into_plain(self) -> Self {
        match self {
            Self::ControllerRef(id) => Self::Plain(id.to_string()),
            other => other,
        }
    }
}

impl From<&str> for PropertyValue {
    fn from(value: &str) -> Self {
        Self::parse(Some(value.to_string()))
    }
}

/// Whether `value` is a hyphenated 32-hex-digit component id
pub fn is_component_id(value: &str) -> bool {
    value.len() == HYPHENATED_ID_LEN && Uuid::try_parse(value).is_ok()
}

impl Serialize for PropertyValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self.as_str() {
            Some(value) => serializer.serialize_str(value),
            None => serializer.serialize_none(),
        }
    }
}

impl<'de> Deserialize<'de> for PropertyValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Option::<String>::deserialize(deserializer).map(Self::parse)
    }
}

/// Referenced controller ids, in property-name order, without duplicates
pub fn controller_refs(properties: &Properties) -> Vec<ControllerServiceId> {
    let mut refs: Vec<ControllerServiceId> = Vec::new();
    for value in properties.values() {
        if let Some(id) = value.controller_ref() {
            if !refs.contains(id) {
                refs.push(id.clone());
            }
        }
    }
    refs
}
