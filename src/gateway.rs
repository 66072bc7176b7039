//! Typed CRUD gateway over an [`HttpTransport`].
//!
//! Translates entity operations into HTTP requests and normalizes the
//! responses into typed values or classified errors, so that the store
//! never deals with URLs, status codes or response envelopes.

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::Instrument;

use crate::config::{EntityBinding, ParseContext, ResponseParsers, StoreConfig};
use crate::entity::{Entity, EntityKey};
use crate::error::{ConfigurationError, GatewayError, ParseError, TransportError};
use crate::query::{build_url, push_segment};
use crate::state::Filter;
use crate::transport::{HttpMethod, HttpRequest, HttpResponse, HttpTransport};

/// One page of a collection, as returned by the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    /// Entities in response order.
    pub entities: Vec<T>,
    /// Total number of entities matching the filter on the server.
    pub total_count: usize,
}

/// Stateless request builder and executor for one entity type.
///
/// `Clone` is cheap: the transport and parsers are `Arc`-wrapped.
pub struct CrudGateway<T> {
    entity_name: Arc<str>,
    endpoint: Arc<str>,
    key_property: Arc<str>,
    transport: Arc<dyn HttpTransport>,
    parsers: ResponseParsers,
    _entity: PhantomData<fn() -> T>,
}

impl<T> Clone for CrudGateway<T> {
    fn clone(&self) -> Self {
        Self {
            entity_name: Arc::clone(&self.entity_name),
            endpoint: Arc::clone(&self.endpoint),
            key_property: Arc::clone(&self.key_property),
            transport: Arc::clone(&self.transport),
            parsers: self.parsers.clone(),
            _entity: PhantomData,
        }
    }
}

impl<T> fmt::Debug for CrudGateway<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CrudGateway")
            .field("entity", &self.entity_name)
            .field("endpoint", &self.endpoint)
            .finish()
    }
}

impl<T: Entity> CrudGateway<T> {
    pub(crate) fn new(
        binding: &EntityBinding,
        transport: Arc<dyn HttpTransport>,
        parsers: ResponseParsers,
    ) -> Self {
        Self {
            entity_name: binding.entity_name.as_str().into(),
            endpoint: binding.endpoint.as_str().into(),
            key_property: binding.key_property.as_str().into(),
            transport,
            parsers,
            _entity: PhantomData,
        }
    }

    /// Create a standalone gateway for `T` from the store configuration.
    ///
    /// Stores build their own gateways; this is for direct use without a
    /// [`Registry`](crate::Registry).
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError::MissingEntity`] or
    /// [`ConfigurationError::MissingApiUrl`] if the configuration does not
    /// describe `T`.
    pub fn from_config(
        config: &StoreConfig,
        transport: Arc<dyn HttpTransport>,
        parsers: ResponseParsers,
    ) -> Result<Self, ConfigurationError> {
        let binding = config.binding(T::ENTITY_NAME)?;
        Ok(Self::new(&binding, transport, parsers))
    }

    /// Collection endpoint, `{api_url}/{api_path}`.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Name of the entity field holding the key.
    pub fn key_property(&self) -> &str {
        &self.key_property
    }

    /// Load one page of the collection.
    ///
    /// Sends `GET {endpoint}?<filter>`.
    ///
    /// # Errors
    ///
    /// * [`GatewayError::Transport`] -- network failure or non-2xx status.
    /// * [`GatewayError::Parse`] -- the parsed body has no `entities` array,
    ///   no numeric `totalCount`, or an entity fails to decode.
    pub async fn find_all(&self, filter: Option<&Filter>) -> Result<Page<T>, GatewayError> {
        let url = build_url(&self.endpoint, filter)?;
        let response = self.execute(HttpMethod::Get, url, None).await?;
        let ctx = ParseContext {
            filter: filter.cloned(),
            ..ParseContext::default()
        };
        let parsed = (self.parsers.collection)(&response, &ctx);
        Ok(self.decode_page(&parsed)?)
    }

    /// Load a single entity.
    ///
    /// Sends `GET {endpoint}/{key}?<filter>`.
    ///
    /// # Errors
    ///
    /// * [`GatewayError::Transport`] -- network failure or non-2xx status.
    /// * [`GatewayError::Parse`] -- the parsed entity is empty or fails to decode.
    pub async fn find_by_key(
        &self,
        key: &EntityKey,
        filter: Option<&Filter>,
    ) -> Result<T, GatewayError> {
        let url = build_url(&self.entity_url(key)?, filter)?;
        let response = self.execute(HttpMethod::Get, url, None).await?;
        let ctx = ParseContext {
            filter: filter.cloned(),
            key: Some(key.clone()),
            entity: None,
        };
        self.entity_from_response(&response, &ctx)
    }

    /// Create or update an entity.
    ///
    /// Sends `PUT {endpoint}/{key}` when the entity's key is truthy and
    /// `POST {endpoint}` otherwise, with the entity as JSON body.
    ///
    /// # Errors
    ///
    /// * [`GatewayError::Transport`] -- network failure or non-2xx status.
    /// * [`GatewayError::Parse`] -- the entity cannot be encoded, or the
    ///   returned entity is empty or fails to decode.
    pub async fn save(&self, entity: &T) -> Result<T, GatewayError> {
        let body = serde_json::to_value(entity).map_err(|e| ParseError::Entity {
            entity: self.entity_name.to_string(),
            reason: format!("could not encode request body: {e}"),
        })?;

        let key = entity.truthy_key(&self.key_property);
        let (method, url) = match &key {
            Some(key) => (HttpMethod::Put, build_url(&self.entity_url(key)?, None)?),
            None => (HttpMethod::Post, build_url(&self.endpoint, None)?),
        };

        let response = self.execute(method, url, Some(body.clone())).await?;
        let ctx = ParseContext {
            filter: None,
            key,
            entity: Some(body),
        };
        self.entity_from_response(&response, &ctx)
    }

    /// Delete an entity.
    ///
    /// Sends `DELETE {endpoint}/{key}?<filter>`. The server is expected to
    /// answer with the deleted entity.
    ///
    /// # Errors
    ///
    /// * [`GatewayError::Transport`] -- network failure or non-2xx status.
    /// * [`GatewayError::Parse`] -- the returned entity is empty or fails
    ///   to decode.
    pub async fn delete_by_key(
        &self,
        key: &EntityKey,
        filter: Option<&Filter>,
    ) -> Result<T, GatewayError> {
        let url = build_url(&self.entity_url(key)?, filter)?;
        let response = self.execute(HttpMethod::Delete, url, None).await?;
        let ctx = ParseContext {
            filter: filter.cloned(),
            key: Some(key.clone()),
            entity: None,
        };
        self.entity_from_response(&response, &ctx)
    }

    fn entity_url(&self, key: &EntityKey) -> Result<String, TransportError> {
        push_segment(&self.endpoint, &key.to_string())
    }

    /// Send a request and reject non-2xx responses.
    async fn execute(
        &self,
        method: HttpMethod,
        url: String,
        body: Option<Value>,
    ) -> Result<HttpResponse, TransportError> {
        let span = tracing::debug_span!(
            "gateway",
            entity = %self.entity_name,
            method = %method,
            url = %url,
        );
        async move {
            let response = self.transport.fetch(HttpRequest { method, url, body }).await?;
            tracing::debug!(status = response.status, "response received");
            if !response.is_success() {
                return Err(TransportError::Status {
                    status: response.status,
                    body: response.body,
                });
            }
            Ok(response)
        }
        .instrument(span)
        .await
    }

    fn entity_from_response(
        &self,
        response: &HttpResponse,
        ctx: &ParseContext,
    ) -> Result<T, GatewayError> {
        let parsed = (self.parsers.entity)(response, ctx);
        Ok(self.decode_entity(&parsed)?)
    }

    /// Check the page contract and decode the entities.
    fn decode_page(&self, value: &Value) -> Result<Page<T>, ParseError> {
        let fail = |reason: &str| ParseError::Collection {
            entity: self.entity_name.to_string(),
            reason: reason.to_owned(),
        };

        let entities = match value.get("entities") {
            Some(Value::Array(items)) => items,
            _ => return Err(fail("response has no `entities` array")),
        };
        let total_count = value
            .get("totalCount")
            .or_else(|| value.get("totalEntities"))
            .and_then(numeric_total)
            .ok_or_else(|| fail("response has no numeric `totalCount`"))?;

        let entities = entities
            .iter()
            .map(|item| T::deserialize(item))
            .collect::<Result<Vec<T>, _>>()
            .map_err(|e| fail(&format!("entity does not decode: {e}")))?;

        Ok(Page {
            entities,
            total_count,
        })
    }

    fn decode_entity(&self, value: &Value) -> Result<T, ParseError> {
        let fail = |reason: String| ParseError::Entity {
            entity: self.entity_name.to_string(),
            reason,
        };
        if value.is_null() {
            return Err(fail("response has no entity".to_owned()));
        }
        T::deserialize(value).map_err(|e| fail(format!("entity does not decode: {e}")))
    }
}

/// Read a non-negative integral total from a number or a numeric string.
fn numeric_total(value: &Value) -> Option<usize> {
    let total = match value {
        Value::Number(n) => n.as_u64().or_else(|| {
            n.as_f64()
                .filter(|f| f.is_finite() && *f >= 0.0 && f.fract() == 0.0)
                .map(|f| f as u64)
        }),
        Value::String(s) => s.trim().parse::<u64>().ok(),
        _ => None,
    }?;
    usize::try_from(total).ok()
}
