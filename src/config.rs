//! Store configuration and pluggable response parsers.
//!
//! [`StoreConfig`] is plain data and can be deserialized from JSON. The
//! response parsers are functions and are therefore attached through
//! [`RegistryBuilder`](crate::RegistryBuilder) instead.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::entity::EntityKey;
use crate::error::ConfigurationError;
use crate::state::Filter;
use crate::transport::HttpResponse;

/// Default grace period before a running operation is shown as busy.
pub const DEFAULT_BUSY_INDICATION_DELAY: Duration = Duration::from_millis(300);

/// Default name of the entity field holding its key.
pub const DEFAULT_KEY_PROPERTY: &str = "id";

/// Process-wide configuration of all entity stores.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use restfold::StoreConfig;
///
/// let config = StoreConfig::from_json(r#"{
///     "apiUrl": "https://api.example.com",
///     "entities": { "user": { "apiPath": "users" } }
/// }"#).unwrap();
///
/// assert_eq!(config.busy_indication_delay, Duration::from_millis(300));
/// assert_eq!(config.entities["user"].key_property, "id");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StoreConfig {
    /// Base URL every entity's API path is appended to.
    pub api_url: Option<String>,

    /// How long an operation may run before the busy indicator is shown.
    ///
    /// Serialized as milliseconds. Default: 300 ms.
    #[serde(with = "duration_millis")]
    pub busy_indication_delay: Duration,

    /// Per-entity settings keyed by [`Entity::ENTITY_NAME`](crate::Entity::ENTITY_NAME).
    pub entities: HashMap<String, EntityConfig>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            api_url: None,
            busy_indication_delay: DEFAULT_BUSY_INDICATION_DELAY,
            entities: HashMap::new(),
        }
    }
}

impl StoreConfig {
    /// Parse a configuration document.
    ///
    /// Missing fields take their defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError::Invalid`] if the document is not valid
    /// JSON or does not match the configuration shape.
    pub fn from_json(json: &str) -> Result<Self, ConfigurationError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Set the API base URL.
    pub fn with_api_url(mut self, url: impl Into<String>) -> Self {
        self.api_url = Some(url.into());
        self
    }

    /// Set the busy indication delay.
    pub fn with_busy_indication_delay(mut self, delay: Duration) -> Self {
        self.busy_indication_delay = delay;
        self
    }

    /// Add or replace the settings of one entity.
    pub fn with_entity(mut self, name: impl Into<String>, entity: EntityConfig) -> Self {
        self.entities.insert(name.into(), entity);
        self
    }

    /// Resolve the settings of `entity_name`, filling in defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError::MissingEntity`] if the entity has no
    /// entry, and [`ConfigurationError::MissingApiUrl`] if no base URL is set.
    pub(crate) fn binding(&self, entity_name: &str) -> Result<EntityBinding, ConfigurationError> {
        let entity = self
            .entities
            .get(entity_name)
            .ok_or_else(|| ConfigurationError::MissingEntity(entity_name.to_owned()))?;
        let api_url = self
            .api_url
            .as_deref()
            .filter(|url| !url.is_empty())
            .ok_or(ConfigurationError::MissingApiUrl)?;

        let api_path = entity.api_path.as_deref().unwrap_or(entity_name);
        Ok(EntityBinding {
            entity_name: entity_name.to_owned(),
            endpoint: format!(
                "{}/{}",
                api_url.trim_end_matches('/'),
                api_path.trim_start_matches('/')
            ),
            store_key: entity
                .store_key
                .clone()
                .unwrap_or_else(|| entity_name.to_owned()),
            key_property: entity.key_property.clone(),
        })
    }
}

/// Settings of one entity type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EntityConfig {
    /// Path below the API base URL. Defaults to the entity name.
    pub api_path: Option<String>,
    /// Key of the entity's state in the registry. Defaults to the entity name.
    pub store_key: Option<String>,
    /// Entity field holding the key. Default: `"id"`.
    pub key_property: String,
}

impl Default for EntityConfig {
    fn default() -> Self {
        Self {
            api_path: None,
            store_key: None,
            key_property: DEFAULT_KEY_PROPERTY.to_owned(),
        }
    }
}

impl EntityConfig {
    /// Settings with the given API path and default store key and key property.
    pub fn new(api_path: impl Into<String>) -> Self {
        Self {
            api_path: Some(api_path.into()),
            ..Self::default()
        }
    }

    /// Set the store key.
    pub fn with_store_key(mut self, store_key: impl Into<String>) -> Self {
        self.store_key = Some(store_key.into());
        self
    }

    /// Set the key property.
    pub fn with_key_property(mut self, key_property: impl Into<String>) -> Self {
        self.key_property = key_property.into();
        self
    }
}

/// Fully resolved settings of one registered entity type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct EntityBinding {
    pub entity_name: String,
    /// `{api_url}/{api_path}` without trailing slash.
    pub endpoint: String,
    pub store_key: String,
    pub key_property: String,
}

/// Request details handed to the response parsers.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParseContext {
    /// Filter sent with the request.
    pub filter: Option<Filter>,
    /// Key addressed by the request.
    pub key: Option<EntityKey>,
    /// Entity sent as request body.
    pub entity: Option<Value>,
}

/// Maps a raw collection response to `{ "entities": [...], "totalCount": n }`.
pub type CollectionParser = Arc<dyn Fn(&HttpResponse, &ParseContext) -> Value + Send + Sync>;

/// Maps a raw single-entity response to the entity object.
pub type EntityParser = Arc<dyn Fn(&HttpResponse, &ParseContext) -> Value + Send + Sync>;

/// Response decoding hooks for backends with custom envelopes.
///
/// The defaults assume the response body already is the page or entity.
#[derive(Clone)]
pub struct ResponseParsers {
    /// Collection response hook.
    pub collection: CollectionParser,
    /// Single-entity response hook.
    pub entity: EntityParser,
}

impl Default for ResponseParsers {
    fn default() -> Self {
        Self {
            collection: Arc::new(|response: &HttpResponse, _: &ParseContext| {
                response.body.clone()
            }),
            entity: Arc::new(|response: &HttpResponse, _: &ParseContext| {
                response.body.clone()
            }),
        }
    }
}

impl fmt::Debug for ResponseParsers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponseParsers").finish_non_exhaustive()
    }
}

mod duration_millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(deserializer)?))
    }
}
