//! Roster core types: resource identity, status records and watch deltas.
//!
//! Everything the controllers read or write travels as a [`Resource`]. Typed
//! catalog payloads live in [`catalog`] and are decoded from the raw JSON
//! `data` field on demand.

#![forbid(unsafe_code)]

use std::collections::BTreeMap;
use std::fmt;

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use smallvec::SmallVec;

pub mod catalog;
pub mod health;

pub use health::{Health, UnknownHealth};

/// Group / version / kind triple.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceType {
    pub group: String,
    pub group_version: String,
    pub kind: String,
}

impl ResourceType {
    pub fn new(group: &str, group_version: &str, kind: &str) -> Self {
        Self { group: group.to_string(), group_version: group_version.to_string(), kind: kind.to_string() }
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.group, self.group_version, self.kind)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Tenancy {
    pub partition: String,
    pub namespace: String,
    pub peer_name: String,
}

impl Default for Tenancy {
    fn default() -> Self {
        Self { partition: "default".into(), namespace: "default".into(), peer_name: "local".into() }
    }
}

/// Uniquely addresses one resource. Never mutated once a resource exists.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceId {
    #[serde(rename = "type")]
    pub rtype: ResourceType,
    #[serde(default)]
    pub tenancy: Tenancy,
    pub name: String,
}

impl ResourceId {
    pub fn new(rtype: ResourceType, tenancy: Tenancy, name: impl Into<String>) -> Self {
        Self { rtype, tenancy, name: name.into() }
    }

    /// Same tenancy, different type and name. Used to derive sibling ids
    /// (ServiceEndpoints for a Service, Node for a Workload).
    pub fn sibling(&self, rtype: ResourceType, name: impl Into<String>) -> Self {
        Self { rtype, tenancy: self.tenancy.clone(), name: name.into() }
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}/{}", self.rtype, self.tenancy.partition, self.tenancy.namespace, self.name)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConditionState {
    #[default]
    Unknown,
    True,
    False,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Condition {
    #[serde(rename = "type")]
    pub kind: String,
    pub state: ConditionState,
    pub reason: String,
    pub message: String,
}

/// Status record published by one controller under its own key.
///
/// Equality is structural over every field, condition order included. That
/// comparison alone decides whether a status write is needed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Status {
    pub observed_generation: u64,
    pub conditions: SmallVec<[Condition; 2]>,
}

impl Status {
    pub fn condition(&self, kind: &str) -> Option<&Condition> {
        self.conditions.iter().find(|c| c.kind == kind)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    pub id: ResourceId,
    #[serde(default)]
    pub owner: Option<ResourceId>,
    /// Store-assigned identity of this incarnation (empty until first write).
    #[serde(default)]
    pub uid: String,
    /// Bumped by the store on every payload write.
    #[serde(default)]
    pub generation: u64,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
    #[serde(default)]
    pub status: BTreeMap<String, Status>,
    #[serde(default)]
    pub data: serde_json::Value,
}

impl Default for ResourceId {
    fn default() -> Self {
        Self { rtype: ResourceType::new("", "", ""), tenancy: Tenancy::default(), name: String::new() }
    }
}

/// A typed payload carried in [`Resource::data`].
pub trait Payload: Serialize + DeserializeOwned {
    const TYPE_NAME: &'static str;
}

/// Resource data did not decode into the schema its type promises.
#[derive(Debug, thiserror::Error)]
#[error("error parsing resource data as type {type_name:?}: {source}")]
pub struct DataParseError {
    pub type_name: &'static str,
    #[source]
    pub source: serde_json::Error,
}

impl Resource {
    pub fn new(id: ResourceId) -> Self {
        Self { id, ..Default::default() }
    }

    /// Decode `data` as `T`. Absent data decodes as an empty payload.
    pub fn decode<T: Payload>(&self) -> Result<T, DataParseError> {
        let decoded = match &self.data {
            serde_json::Value::Null => T::deserialize(serde_json::Value::Object(serde_json::Map::new())),
            data => T::deserialize(data),
        };
        decoded.map_err(|source| DataParseError { type_name: T::TYPE_NAME, source })
    }

    pub fn with_data<T: Payload>(mut self, data: &T) -> Result<Self, DataParseError> {
        self.data = serde_json::to_value(data).map_err(|source| DataParseError { type_name: T::TYPE_NAME, source })?;
        Ok(self)
    }

    pub fn with_owner(mut self, owner: ResourceId) -> Self {
        self.owner = Some(owner);
        self
    }

    pub fn with_meta(mut self, key: &str, value: &str) -> Self {
        self.metadata.insert(key.to_string(), value.to_string());
        self
    }

    pub fn is_type(&self, rtype: &ResourceType) -> bool {
        &self.id.rtype == rtype
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum DeltaKind {
    Applied,
    Deleted,
}

/// One watch notification. `resource` is the post-change state for
/// `Applied` and the last known state for `Deleted`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Delta {
    pub kind: DeltaKind,
    pub resource: Resource,
}

pub mod prelude {
    pub use super::{
        Condition, ConditionState, DataParseError, Delta, DeltaKind, Health, Payload, Resource, ResourceId,
        ResourceType, Status, Tenancy,
    };
}
