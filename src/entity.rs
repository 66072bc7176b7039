//! Entity trait and key extraction.

use std::fmt;

use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::Value;

/// Key value of an entity, read from its configured key property.
///
/// Backends use either integer or string identifiers. The key is rendered
/// into request paths with its [`Display`](fmt::Display) impl.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EntityKey {
    /// Numeric identifier.
    Int(i64),
    /// String identifier (UUIDs, slugs, ...).
    Text(String),
}

impl EntityKey {
    /// Read a key from a JSON value.
    ///
    /// Integers and strings become keys, non-integral numbers are kept in
    /// their textual form. `null`, booleans, arrays and objects yield `None`.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => Some(match n.as_i64() {
                Some(i) => Self::Int(i),
                None => Self::Text(n.to_string()),
            }),
            Value::String(s) => Some(Self::Text(s.clone())),
            _ => None,
        }
    }

    /// Whether the key marks a persisted entity.
    ///
    /// `0` and the empty string count as "no key": saving an entity whose key
    /// is not truthy creates it instead of updating it.
    pub fn is_truthy(&self) -> bool {
        match self {
            Self::Int(i) => *i != 0,
            Self::Text(s) => !s.is_empty(),
        }
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(i) => write!(f, "{i}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

impl From<i64> for EntityKey {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<i32> for EntityKey {
    fn from(value: i32) -> Self {
        Self::Int(value.into())
    }
}

impl From<&str> for EntityKey {
    fn from(value: &str) -> Self {
        Self::Text(value.to_owned())
    }
}

impl From<String> for EntityKey {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

/// A REST resource cached by an [`EntityStore`](crate::EntityStore).
///
/// The implementing type is the decoded resource itself. Equality must be
/// structural: the store compares entities with `==` to decide whether a
/// collection record actually changed.
///
/// # Contract
///
/// - [`ENTITY_NAME`](Entity::ENTITY_NAME) selects the entry in
///   [`StoreConfig::entities`](crate::StoreConfig::entities) that describes
///   the resource's API path, store key and key property.
/// - [`key`](Entity::key) must be a pure read of the key property. The
///   store calls it once per collection record each time a record is
///   reconciled or removed. The default implementation serializes the whole
///   entity to read one field, so its cost grows with the entity's size;
///   override it to return the field directly for large entities or long
///   collections.
///
/// # Examples
///
/// ```
/// use restfold::{Entity, EntityKey};
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// struct User {
///     id: Option<i64>,
///     name: String,
/// }
///
/// impl Entity for User {
///     const ENTITY_NAME: &'static str = "user";
///
///     fn key(&self, key_property: &str) -> Option<EntityKey> {
///         match key_property {
///             "id" => self.id.map(EntityKey::Int),
///             _ => None,
///         }
///     }
/// }
///
/// let user = User { id: Some(3), name: "ann".into() };
/// assert_eq!(user.key("id"), Some(EntityKey::Int(3)));
/// ```
pub trait Entity:
    Clone + PartialEq + Serialize + DeserializeOwned + Send + Sync + 'static
{
    /// Identifies this entity type (e.g. `"user"`) in the configuration.
    const ENTITY_NAME: &'static str;

    /// Read the entity's key from the field named `key_property`.
    fn key(&self, key_property: &str) -> Option<EntityKey> {
        serialized_key(self, key_property)
    }

    /// The key, if it is truthy.
    fn truthy_key(&self, key_property: &str) -> Option<EntityKey> {
        self.key(key_property).filter(EntityKey::is_truthy)
    }
}

/// Read `key_property` from the JSON serialization of `entity`.
fn serialized_key<T: Serialize + ?Sized>(entity: &T, key_property: &str) -> Option<EntityKey> {
    match serde_json::to_value(entity) {
        Ok(Value::Object(map)) => map.get(key_property).and_then(EntityKey::from_value),
        _ => None,
    }
}
