//! Action vocabulary of an entity store.

use crate::entity::EntityKey;
use crate::state::{ErrorInfo, Filter, StatusTag};

/// A state transition request, applied by the store's dispatch loop.
///
/// Variants ending in `Requested` are intents: they leave state untouched
/// and start a gateway call whose result comes back as one of the terminal
/// variants. Every other variant is a pure transition handled by
/// [`reduce`](crate::reduce).
#[derive(Debug, Clone, PartialEq)]
pub enum Action<T> {
    /// Record the filter of the current collection query.
    SetApiFilter {
        /// The new filter, `None` to clear it.
        filter: Option<Filter>,
    },
    /// Load the collection with the given filter.
    FindAllRequested {
        /// Filter sent as query string.
        filter: Option<Filter>,
    },
    /// Replace the collection's records.
    SetEntities {
        /// Entities in response order.
        entities: Vec<T>,
        /// Total reported by the backend.
        total_count: usize,
        /// Status assigned to the collection and each record.
        status: StatusTag,
    },
    /// Show or hide the collection's busy indicator.
    SetCollectionBusy {
        /// Busy flag.
        is_busy: bool,
        /// Status of the running operation.
        status: StatusTag,
    },
    /// Record a failed collection load.
    SetCollectionError {
        /// The failure.
        error: ErrorInfo,
    },
    /// Load a single entity into the selected slot.
    FindByKeyRequested {
        /// Key of the entity.
        key: EntityKey,
        /// Filter sent as query string.
        filter: Option<Filter>,
    },
    /// Replace the selected slot's entity.
    SetSelected {
        /// The entity, `None` to clear the slot.
        entity: Option<T>,
        /// Status assigned to the slot.
        status: StatusTag,
    },
    /// Create or update an entity on the server.
    SaveRequested {
        /// Entity to persist. Created when its key is not truthy.
        entity: T,
    },
    /// Apply the server's representation of a saved entity.
    AfterSave {
        /// The saved entity as returned by the server.
        entity: T,
    },
    /// Delete an entity on the server.
    DeleteRequested {
        /// Key of the entity.
        key: EntityKey,
        /// Filter sent as query string.
        filter: Option<Filter>,
    },
    /// Apply a completed server-side delete.
    AfterDelete {
        /// The deleted entity as returned by the server.
        entity: T,
    },
    /// Show or hide the selected slot's busy indicator.
    SetSelectedBusy {
        /// Busy flag.
        is_busy: bool,
        /// Status of the running operation.
        status: StatusTag,
        /// Key of the entity being acted upon, if it has one. Reconciliation
        /// follows the selected record, not this key.
        key: Option<EntityKey>,
    },
    /// Record a failed selected-slot operation.
    SetSelectedError {
        /// The failure.
        error: ErrorInfo,
    },
}

impl<T> Action<T> {
    /// Short name used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::SetApiFilter { .. } => "set_api_filter",
            Self::FindAllRequested { .. } => "find_all_requested",
            Self::SetEntities { .. } => "set_entities",
            Self::SetCollectionBusy { .. } => "set_collection_busy",
            Self::SetCollectionError { .. } => "set_collection_error",
            Self::FindByKeyRequested { .. } => "find_by_key_requested",
            Self::SetSelected { .. } => "set_selected",
            Self::SaveRequested { .. } => "save_requested",
            Self::AfterSave { .. } => "after_save",
            Self::DeleteRequested { .. } => "delete_requested",
            Self::AfterDelete { .. } => "after_delete",
            Self::SetSelectedBusy { .. } => "set_selected_busy",
            Self::SetSelectedError { .. } => "set_selected_error",
        }
    }

    /// Whether the action starts a gateway call.
    pub fn is_intent(&self) -> bool {
        matches!(
            self,
            Self::FindAllRequested { .. }
                | Self::FindByKeyRequested { .. }
                | Self::SaveRequested { .. }
                | Self::DeleteRequested { .. }
        )
    }

    /// Whether the action is a busy indication.
    pub fn is_busy_indication(&self) -> bool {
        matches!(
            self,
            Self::SetCollectionBusy { .. } | Self::SetSelectedBusy { .. }
        )
    }

    /// Whether the action settles an intent, successfully or not.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::SetEntities { .. }
                | Self::SetCollectionError { .. }
                | Self::SetSelected { .. }
                | Self::AfterSave { .. }
                | Self::AfterDelete { .. }
                | Self::SetSelectedError { .. }
        )
    }
}
