//! Crate-level error types for gateway calls and store construction.

/// Error returned when an HTTP exchange with the backend fails.
///
/// Covers both network-level failures and non-2xx responses. The
/// response body of a rejected request is kept verbatim so callers can
/// surface server-provided messages.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TransportError {
    /// The request never produced a response (DNS, connect, TLS, timeout).
    #[error("network error: {0}")]
    Network(String),

    /// The server answered with a non-success status code.
    #[error("server responded with status {status}")]
    Status {
        /// HTTP status code of the response.
        status: u16,
        /// Decoded response body, `null` if the body was empty or not JSON.
        body: serde_json::Value,
    },

    /// The request URL could not be built from the configured endpoint.
    #[error("invalid request url: {0}")]
    InvalidUrl(String),
}

impl TransportError {
    /// HTTP status code carried by the error, if the server responded.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Error returned when a response does not match the page or entity
/// parse contract.
///
/// Usually means the response parsers in the store configuration do not
/// match the backend's envelope format.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    /// A collection response lacked an entity array or a numeric total,
    /// or one of its entities failed to decode.
    #[error(
        "could not parse collection response for `{entity}`: {reason}; \
         define or update parse_collection_response in the store configuration"
    )]
    Collection {
        /// Name of the entity type being loaded.
        entity: String,
        /// What was wrong with the response.
        reason: String,
    },

    /// A single-entity response was empty or failed to decode.
    #[error(
        "could not parse entity response for `{entity}`: {reason}; \
         define or update parse_entity_response in the store configuration"
    )]
    Entity {
        /// Name of the entity type being loaded.
        entity: String,
        /// What was wrong with the response.
        reason: String,
    },
}

/// Error returned by every [`CrudGateway`](crate::CrudGateway) operation.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GatewayError {
    /// Network failure or non-2xx response.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The response violated the page or entity parse contract.
    #[error(transparent)]
    Parse(#[from] ParseError),
}

/// Error raised while building the registry or looking up a store.
///
/// Configuration errors are fatal: they are returned from construction and
/// never recorded in store state.
#[derive(Debug, thiserror::Error)]
pub enum ConfigurationError {
    /// An entity type was registered without a matching configuration entry.
    #[error("entity configuration for `{0}` was not found; add it to the store configuration")]
    MissingEntity(String),

    /// Two entity types were configured with the same store key.
    #[error("store key `{store_key}` is used by both `{first}` and `{second}`")]
    DuplicateStoreKey {
        /// The contested store key.
        store_key: String,
        /// Entity registered first under the key.
        first: String,
        /// Entity that tried to reuse the key.
        second: String,
    },

    /// No API base URL was configured.
    #[error("api_url is not configured")]
    MissingApiUrl,

    /// The registry was built without an HTTP transport.
    #[error("no http transport configured")]
    MissingTransport,

    /// A store was requested for an entity type that was never registered.
    #[error("entity type `{0}` is not registered in this registry")]
    NotRegistered(String),

    /// The configuration document could not be deserialized.
    #[error("invalid store configuration: {0}")]
    Invalid(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_status_display_and_accessor() {
        let err = TransportError::Status {
            status: 404,
            body: serde_json::Value::Null,
        };
        assert_eq!(err.to_string(), "server responded with status 404");
        assert_eq!(err.status(), Some(404));
        assert_eq!(TransportError::Network("refused".into()).status(), None);
    }

    #[test]
    fn gateway_error_is_transparent() {
        let err: GatewayError = TransportError::Network("connection refused".into()).into();
        assert_eq!(err.to_string(), "network error: connection refused");

        let err: GatewayError = ParseError::Entity {
            entity: "user".into(),
            reason: "empty body".into(),
        }
        .into();
        assert!(err.to_string().contains("`user`: empty body"));
    }

    #[test]
    fn missing_entity_names_the_entity() {
        let err = ConfigurationError::MissingEntity("invoice".into());
        assert_eq!(
            err.to_string(),
            "entity configuration for `invoice` was not found; add it to the store configuration"
        );
    }

    #[test]
    fn invalid_config_from_serde_error() {
        let serde_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err = ConfigurationError::from(serde_err);
        assert!(err.to_string().starts_with("invalid store configuration"));
    }

    // Errors cross task boundaries through tokio channels.
    const _: () = {
        #[allow(dead_code)]
        fn assert_send_sync<T: Send + Sync>() {}

        #[allow(dead_code)]
        fn check() {
            assert_send_sync::<TransportError>();
            assert_send_sync::<ParseError>();
            assert_send_sync::<GatewayError>();
            assert_send_sync::<ConfigurationError>();
        }
    };
}
