//! Top-level entry point that owns one [`EntityStore`] per entity type.
//!
//! The registry is built through [`RegistryBuilder`], which collects the
//! configuration, the HTTP transport, optional response parsers and the
//! entity types to register. Every misconfiguration is reported by
//! [`build`](RegistryBuilder::build); lookups afterwards are infallible for
//! registered types.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::actor::spawn_store;
use crate::config::{ParseContext, ResponseParsers, StoreConfig};
use crate::entity::Entity;
use crate::error::ConfigurationError;
use crate::gateway::CrudGateway;
use crate::store::EntityStore;
use crate::transport::{HttpResponse, HttpTransport, ReqwestTransport};

/// Type-erased store map keyed by the entity's `TypeId`.
///
/// `Box<dyn Any + Send + Sync>` lets a single map hold `EntityStore<T>` for
/// any concrete `T`. Downcasting recovers the typed handle.
type StoreMap = HashMap<TypeId, Box<dyn Any + Send + Sync>>;

/// A store that was built but not yet inserted into the map.
struct BuiltStore {
    entity_name: &'static str,
    store_key: String,
    handle: Box<dyn Any + Send + Sync>,
}

/// Factory for deferred store construction.
type StoreFactory = Box<
    dyn FnOnce(
        &StoreConfig,
        Arc<dyn HttpTransport>,
        ResponseParsers,
    ) -> Result<BuiltStore, ConfigurationError>,
>;

/// Registry of all entity stores of an application.
///
/// `Clone` is cheap -- the store map is `Arc`-wrapped.
#[derive(Clone)]
pub struct Registry {
    stores: Arc<StoreMap>,
    store_keys: Arc<HashMap<String, &'static str>>,
}

// Manual `Debug` because `dyn Any` is not `Debug`.
impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("store_keys", &self.store_keys)
            .finish()
    }
}

impl Registry {
    /// Start building a registry.
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    /// Get a handle to the store of entity type `T`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError::NotRegistered`] if `T` was not
    /// registered with [`RegistryBuilder::entity`].
    pub fn store<T: Entity>(&self) -> Result<EntityStore<T>, ConfigurationError> {
        self.stores
            .get(&TypeId::of::<T>())
            .and_then(|boxed| boxed.downcast_ref::<EntityStore<T>>())
            .cloned()
            .ok_or_else(|| ConfigurationError::NotRegistered(T::ENTITY_NAME.to_owned()))
    }

    /// Store keys of all registered stores, sorted.
    pub fn store_keys(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = self.store_keys.keys().map(String::as_str).collect();
        keys.sort_unstable();
        keys
    }
}

/// Builder for configuring and building a [`Registry`].
///
/// # Examples
///
/// ```no_run
/// use restfold::{Entity, EntityConfig, Registry, ReqwestTransport, StoreConfig};
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
/// }
///
/// # async fn example() -> Result<(), restfold::ConfigurationError> {
/// let registry = Registry::builder()
///     .config(
///         StoreConfig::default()
///             .with_api_url("https://api.example.com")
///             .with_entity("user", EntityConfig::new("users")),
///     )
///     .transport(ReqwestTransport::new())
///     .entity::<User>()
///     .build()?;
///
/// let users = registry.store::<User>()?;
/// users.find_all(None);
/// # Ok(())
/// # }
/// ```
pub struct RegistryBuilder {
    config: StoreConfig,
    transport: Option<Arc<dyn HttpTransport>>,
    parsers: ResponseParsers,
    factories: Vec<(TypeId, StoreFactory)>,
}

impl fmt::Debug for RegistryBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistryBuilder")
            .field("config", &self.config)
            .field("has_transport", &self.transport.is_some())
            .field("entities", &self.factories.len())
            .finish()
    }
}

impl RegistryBuilder {
    /// Create a builder with the default configuration and no transport.
    pub fn new() -> Self {
        Self {
            config: StoreConfig::default(),
            transport: None,
            parsers: ResponseParsers::default(),
            factories: Vec::new(),
        }
    }

    /// Set the store configuration.
    ///
    /// # Arguments
    ///
    /// * `config` - API URL, busy indication delay and per-entity settings.
    ///
    /// # Returns
    ///
    /// `self` for method chaining.
    pub fn config(mut self, config: StoreConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the HTTP transport shared by all stores.
    ///
    /// # Returns
    ///
    /// `self` for method chaining.
    pub fn transport(mut self, transport: impl HttpTransport) -> Self {
        self.transport = Some(Arc::new(transport));
        self
    }

    /// Set an already shared HTTP transport.
    ///
    /// # Returns
    ///
    /// `self` for method chaining.
    pub fn shared_transport(mut self, transport: Arc<dyn HttpTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Use a [`ReqwestTransport`] around `client`.
    ///
    /// # Returns
    ///
    /// `self` for method chaining.
    pub fn reqwest_client(self, client: reqwest::Client) -> Self {
        self.transport(ReqwestTransport::with_client(client))
    }

    /// Map raw collection responses to `{ "entities": [...], "totalCount": n }`.
    ///
    /// # Returns
    ///
    /// `self` for method chaining.
    pub fn parse_collection_response<F>(mut self, parser: F) -> Self
    where
        F: Fn(&HttpResponse, &ParseContext) -> serde_json::Value + Send + Sync + 'static,
    {
        self.parsers.collection = Arc::new(parser);
        self
    }

    /// Map raw single-entity responses to the entity object.
    ///
    /// # Returns
    ///
    /// `self` for method chaining.
    pub fn parse_entity_response<F>(mut self, parser: F) -> Self
    where
        F: Fn(&HttpResponse, &ParseContext) -> serde_json::Value + Send + Sync + 'static,
    {
        self.parsers.entity = Arc::new(parser);
        self
    }

    /// Register entity type `T`.
    ///
    /// Its settings are looked up under [`Entity::ENTITY_NAME`] when the
    /// registry is built. Registering the same type twice keeps one store.
    ///
    /// # Type Parameters
    ///
    /// * `T` - A type implementing [`Entity`].
    ///
    /// # Returns
    ///
    /// `self` for method chaining.
    pub fn entity<T: Entity>(mut self) -> Self {
        let type_id = TypeId::of::<T>();
        if self.factories.iter().any(|(id, _)| *id == type_id) {
            return self;
        }
        self.factories.push((
            type_id,
            Box::new(
                |config: &StoreConfig,
                 transport: Arc<dyn HttpTransport>,
                 parsers: ResponseParsers|
                 -> Result<BuiltStore, ConfigurationError> {
                    let binding = config.binding(T::ENTITY_NAME)?;
                    let gateway = CrudGateway::<T>::new(&binding, transport, parsers);
                    let channels =
                        spawn_store(gateway, &binding.store_key, config.busy_indication_delay);
                    let store =
                        EntityStore::new(channels, &binding.store_key, &binding.key_property);
                    Ok(BuiltStore {
                        entity_name: T::ENTITY_NAME,
                        store_key: binding.store_key,
                        handle: Box::new(store),
                    })
                },
            ),
        ));
        self
    }

    /// Validate the configuration and start one store per registered type.
    ///
    /// # Returns
    ///
    /// A fully initialized [`Registry`].
    ///
    /// # Errors
    ///
    /// * [`ConfigurationError::MissingTransport`] -- no transport was set.
    /// * [`ConfigurationError::MissingEntity`] -- a registered type has no
    ///   configuration entry.
    /// * [`ConfigurationError::MissingApiUrl`] -- no API base URL is set.
    /// * [`ConfigurationError::DuplicateStoreKey`] -- two types share a
    ///   store key.
    ///
    /// # Panics
    ///
    /// Panics if called outside of a tokio runtime.
    pub fn build(self) -> Result<Registry, ConfigurationError> {
        let transport = self
            .transport
            .ok_or(ConfigurationError::MissingTransport)?;

        let mut stores = StoreMap::new();
        let mut store_keys: HashMap<String, &'static str> = HashMap::new();
        for (type_id, factory) in self.factories {
            let built = factory(&self.config, Arc::clone(&transport), self.parsers.clone())?;
            if let Some(first) = store_keys.get(&built.store_key) {
                return Err(ConfigurationError::DuplicateStoreKey {
                    store_key: built.store_key,
                    first: (*first).to_owned(),
                    second: built.entity_name.to_owned(),
                });
            }
            tracing::info!(
                entity = built.entity_name,
                store_key = %built.store_key,
                "entity store registered"
            );
            store_keys.insert(built.store_key, built.entity_name);
            stores.insert(type_id, built.handle);
        }

        Ok(Registry {
            stores: Arc::new(stores),
            store_keys: Arc::new(store_keys),
        })
    }
}

impl Default for RegistryBuilder {
    fn default() -> Self {
        Self::new()
    }
}
