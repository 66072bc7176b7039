//! Client-side entity cache for REST backends.
//!
//! Each registered entity type gets an [`EntityStore`] holding a "selected
//! entity" slot and a "collection" slot. Intents such as
//! [`find_all`](EntityStore::find_all) or [`save`](EntityStore::save) run
//! through a typed [`CrudGateway`]; their outcomes, including failures, are
//! applied to state by a single dispatch loop per type and observed through
//! change-only streams.

mod action;
mod actor;
mod config;
mod effects;
mod entity;
mod error;
mod gateway;
mod query;
mod reducer;
mod registry;
mod state;
mod store;
mod transport;
mod view;

pub use action::Action;
pub use config::{
    CollectionParser, DEFAULT_BUSY_INDICATION_DELAY, DEFAULT_KEY_PROPERTY, EntityConfig,
    EntityParser, ParseContext, ResponseParsers, StoreConfig,
};
pub use entity::{Entity, EntityKey};
pub use error::{ConfigurationError, GatewayError, ParseError, TransportError};
pub use gateway::{CrudGateway, Page};
pub use query::{build_url, encode_filter};
pub use reducer::reduce;
pub use registry::{Registry, RegistryBuilder};
pub use state::{
    CollectionState, EntityRecordState, ErrorInfo, ErrorKind, Filter, StatusTag, StoreState,
};
pub use store::EntityStore;
pub use transport::{
    HttpMethod, HttpRequest, HttpResponse, HttpTransport, ReqwestTransport, TransportFuture,
};
