//! Canonical state shape of one entity store.
//!
//! All slices are held behind [`Arc`] so that a transition can replace only
//! what changed. Unchanged slices keep their pointer identity, which is what
//! the derived views use to decide whether to emit.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{GatewayError, TransportError};

/// Free-form filter object sent to the backend as a query string.
pub type Filter = serde_json::Value;

/// Lifecycle status of a slot or record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusTag {
    /// Nothing has been requested yet.
    #[default]
    Initial,
    /// A load is in flight and has exceeded the busy indication delay.
    Loading,
    /// Content came from a successful load.
    Loaded,
    /// A save is in flight and has exceeded the busy indication delay.
    Saving,
    /// Content came from a successful save.
    Saved,
    /// A delete is in flight and has exceeded the busy indication delay.
    Deleting,
    /// The entity was deleted on the server.
    Deleted,
    /// The last operation on the slot failed.
    Error,
}

impl StatusTag {
    /// Lowercase name, as serialized.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Initial => "initial",
            Self::Loading => "loading",
            Self::Loaded => "loaded",
            Self::Saving => "saving",
            Self::Saved => "saved",
            Self::Deleting => "deleting",
            Self::Deleted => "deleted",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for StatusTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Category of a failure recorded in state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorKind {
    /// Network failure or non-2xx response.
    Transport,
    /// Response did not match the page or entity contract.
    Parse,
}

/// Snapshot of a failed operation, kept on the affected slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorInfo {
    /// Failure category.
    pub kind: ErrorKind,
    /// Human-readable description.
    pub message: String,
    /// HTTP status code, when the server responded.
    pub status: Option<u16>,
}

impl From<&GatewayError> for ErrorInfo {
    fn from(err: &GatewayError) -> Self {
        match err {
            GatewayError::Transport(inner) => Self {
                kind: ErrorKind::Transport,
                message: inner.to_string(),
                status: inner.status(),
            },
            GatewayError::Parse(inner) => Self {
                kind: ErrorKind::Parse,
                message: inner.to_string(),
                status: None,
            },
        }
    }
}

impl From<GatewayError> for ErrorInfo {
    fn from(err: GatewayError) -> Self {
        Self::from(&err)
    }
}

impl From<TransportError> for ErrorInfo {
    fn from(err: TransportError) -> Self {
        Self::from(GatewayError::from(err))
    }
}

/// Lifecycle snapshot of a single entity.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityRecordState<T> {
    /// Status of the last operation touching this entity.
    pub status: StatusTag,
    /// Whether an operation has been running longer than the busy delay.
    pub is_busy: bool,
    /// The entity, if one has been loaded or set.
    pub entity: Option<Arc<T>>,
    /// Failure of the last operation, cleared by the next success.
    pub error: Option<ErrorInfo>,
}

impl<T> Default for EntityRecordState<T> {
    fn default() -> Self {
        Self {
            status: StatusTag::Initial,
            is_busy: false,
            entity: None,
            error: None,
        }
    }
}

impl<T> EntityRecordState<T> {
    /// A settled record: not busy, no error.
    pub fn settled(entity: Option<Arc<T>>, status: StatusTag) -> Self {
        Self {
            status,
            is_busy: false,
            entity,
            error: None,
        }
    }
}

/// The list view of an entity type.
#[derive(Debug, Clone, PartialEq)]
pub struct CollectionState<T> {
    /// Status of the last collection operation.
    pub status: StatusTag,
    /// Whether a load has been running longer than the busy delay.
    pub is_busy: bool,
    /// Filter of the last requested load.
    pub api_filter: Option<Filter>,
    /// Records in response order.
    pub records: Arc<Vec<Arc<EntityRecordState<T>>>>,
    /// Total reported by the backend, adjusted by local deletes.
    pub total_count: usize,
    /// Failure of the last collection load.
    pub error: Option<ErrorInfo>,
}

impl<T> Default for CollectionState<T> {
    fn default() -> Self {
        Self {
            status: StatusTag::Initial,
            is_busy: false,
            api_filter: None,
            records: Arc::new(Vec::new()),
            total_count: 0,
            error: None,
        }
    }
}

/// The whole addressable state of one entity type.
#[derive(Debug, Clone, PartialEq)]
pub struct StoreState<T> {
    /// The "selected entity" slot.
    pub selected: Arc<EntityRecordState<T>>,
    /// The "collection" slot.
    pub collection: Arc<CollectionState<T>>,
}

impl<T> Default for StoreState<T> {
    fn default() -> Self {
        Self {
            selected: Arc::new(EntityRecordState::default()),
            collection: Arc::new(CollectionState::default()),
        }
    }
}

impl<T> StoreState<T> {
    /// Entities of the collection, in record order.
    pub fn entities(&self) -> Vec<Arc<T>> {
        self.collection
            .records
            .iter()
            .filter_map(|record| record.entity.clone())
            .collect()
    }
}
