//! Typed handle to the store of one entity type.
//!
//! An [`EntityStore`] is obtained from a [`Registry`](crate::Registry). It
//! exposes the store's intents as fire-and-forget methods and its state as
//! change-only streams. Outcomes of remote operations, failures included,
//! are observed through state; they are never returned to the caller.

use std::fmt;
use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, watch};
use tokio_stream::{Stream, StreamExt};

use crate::action::Action;
use crate::actor::StoreChannels;
use crate::entity::{Entity, EntityKey};
use crate::state::{
    CollectionState, EntityRecordState, ErrorInfo, Filter, StatusTag, StoreState,
};
use crate::view::{StateFeed, project};

/// Cloneable, `Send + Sync` handle to a running entity store.
///
/// All clones talk to the same dispatch loop. The loop shuts down once
/// every handle, including the one held by the registry, is dropped.
///
/// # Type Parameters
///
/// * `T` - The [`Entity`] type cached by this store.
pub struct EntityStore<T> {
    sender: mpsc::UnboundedSender<Action<T>>,
    state: watch::Receiver<Arc<StoreState<T>>>,
    feed: Arc<StateFeed<T>>,
    actions: broadcast::Sender<Arc<Action<T>>>,
    store_key: Arc<str>,
    key_property: Arc<str>,
}

// Manual `Clone` because `T` need not be `Clone` for the handle to be.
impl<T> Clone for EntityStore<T> {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
            state: self.state.clone(),
            feed: Arc::clone(&self.feed),
            actions: self.actions.clone(),
            store_key: Arc::clone(&self.store_key),
            key_property: Arc::clone(&self.key_property),
        }
    }
}

impl<T> fmt::Debug for EntityStore<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityStore")
            .field("store_key", &self.store_key)
            .field("key_property", &self.key_property)
            .finish_non_exhaustive()
    }
}

impl<T: Entity> EntityStore<T> {
    pub(crate) fn new(channels: StoreChannels<T>, store_key: &str, key_property: &str) -> Self {
        Self {
            sender: channels.sender,
            state: channels.state,
            feed: channels.feed,
            actions: channels.actions,
            store_key: store_key.into(),
            key_property: key_property.into(),
        }
    }

    /// Key of this store in the registry.
    pub fn store_key(&self) -> &str {
        &self.store_key
    }

    /// Name of the entity field holding the key.
    pub fn key_property(&self) -> &str {
        &self.key_property
    }

    // --- Intents ---

    /// Enqueue an action.
    ///
    /// Actions are applied in the order they are dispatched. Intent actions
    /// additionally start their gateway call.
    pub fn dispatch(&self, action: Action<T>) {
        let name = action.name();
        if self.sender.send(action).is_err() {
            tracing::warn!(
                entity = T::ENTITY_NAME,
                store_key = %self.store_key,
                action = name,
                "dispatch loop is gone, action dropped"
            );
        }
    }

    /// Load the collection and remember `filter` as the current filter.
    pub fn find_all(&self, filter: Option<Filter>) {
        self.dispatch(Action::FindAllRequested { filter });
    }

    /// Load the collection again with the current filter.
    pub fn reload_all(&self) {
        self.find_all(self.api_filter_value());
    }

    /// Load one entity into the selected slot.
    pub fn find_by_key(&self, key: impl Into<EntityKey>) {
        self.find_by_key_with_filter(key, None);
    }

    /// Load one entity into the selected slot, passing `filter` as query.
    pub fn find_by_key_with_filter(&self, key: impl Into<EntityKey>, filter: Option<Filter>) {
        self.dispatch(Action::FindByKeyRequested {
            key: key.into(),
            filter,
        });
    }

    /// Create the entity, or update it when its key is truthy.
    pub fn save(&self, entity: T) {
        self.dispatch(Action::SaveRequested { entity });
    }

    /// Delete the entity with `key` on the server.
    pub fn delete_by_key(&self, key: impl Into<EntityKey>, filter: Option<Filter>) {
        self.dispatch(Action::DeleteRequested {
            key: key.into(),
            filter,
        });
    }

    /// Replace the collection locally, without a server call.
    ///
    /// The total count becomes the number of entities.
    pub fn set_entities(&self, entities: Vec<T>, status: StatusTag) {
        let total_count = entities.len();
        self.dispatch(Action::SetEntities {
            entities,
            total_count,
            status,
        });
    }

    /// Replace the selected slot locally, without a server call.
    pub fn set_selected(&self, entity: Option<T>, status: StatusTag) {
        self.dispatch(Action::SetSelected { entity, status });
    }

    /// Replace the current filter without loading.
    pub fn set_api_filter(&self, filter: Option<Filter>) {
        self.dispatch(Action::SetApiFilter { filter });
    }

    // --- Snapshots ---

    /// The most recently published state.
    pub fn state(&self) -> Arc<StoreState<T>> {
        Arc::clone(&self.state.borrow())
    }

    /// The current filter.
    pub fn api_filter_value(&self) -> Option<Filter> {
        self.state.borrow().collection.api_filter.clone()
    }

    /// Subscribe to every action applied from now on, in application order.
    ///
    /// The log is bounded; a subscriber that falls behind receives
    /// [`RecvError::Lagged`](broadcast::error::RecvError::Lagged).
    pub fn actions(&self) -> broadcast::Receiver<Arc<Action<T>>> {
        self.actions.subscribe()
    }

    // --- Derived views ---

    /// The whole selected slot.
    pub fn selected_record(
        &self,
    ) -> impl Stream<Item = Arc<EntityRecordState<T>>> + Send + use<T> {
        project(&self.feed, |s| Arc::clone(&s.selected))
    }

    /// The selected entity.
    pub fn selected_entity(&self) -> impl Stream<Item = Option<Arc<T>>> + Send + use<T> {
        project(&self.feed, |s| s.selected.entity.clone())
    }

    /// Status of the selected slot.
    pub fn selected_status(&self) -> impl Stream<Item = StatusTag> + Send + use<T> {
        project(&self.feed, |s| s.selected.status)
    }

    /// Busy flag of the selected slot.
    pub fn selected_is_busy(&self) -> impl Stream<Item = bool> + Send + use<T> {
        project(&self.feed, |s| s.selected.is_busy)
    }

    /// Failure recorded on the selected slot.
    pub fn selected_error(&self) -> impl Stream<Item = Option<ErrorInfo>> + Send + use<T> {
        project(&self.feed, |s| s.selected.error.clone())
    }

    /// Filter of the last requested collection load.
    pub fn api_filter(&self) -> impl Stream<Item = Option<Filter>> + Send + use<T> {
        project(&self.feed, |s| s.collection.api_filter.clone())
    }

    /// The whole collection slot.
    pub fn collection(&self) -> impl Stream<Item = Arc<CollectionState<T>>> + Send + use<T> {
        project(&self.feed, |s| Arc::clone(&s.collection))
    }

    /// Entities of the collection, in order.
    pub fn entities(&self) -> impl Stream<Item = Vec<Arc<T>>> + Send + use<T> {
        self.entity_records().map(|records| {
            records
                .iter()
                .filter_map(|record| record.entity.clone())
                .collect()
        })
    }

    /// Records of the collection, in order.
    pub fn entity_records(
        &self,
    ) -> impl Stream<Item = Arc<Vec<Arc<EntityRecordState<T>>>>> + Send + use<T> {
        project(&self.feed, |s| Arc::clone(&s.collection.records))
    }

    /// Total count of the collection.
    pub fn collection_total(&self) -> impl Stream<Item = usize> + Send + use<T> {
        project(&self.feed, |s| s.collection.total_count)
    }

    /// Busy flag of the collection.
    pub fn collection_is_busy(&self) -> impl Stream<Item = bool> + Send + use<T> {
        project(&self.feed, |s| s.collection.is_busy)
    }

    /// Status of the collection.
    pub fn collection_status(&self) -> impl Stream<Item = StatusTag> + Send + use<T> {
        project(&self.feed, |s| s.collection.status)
    }

    /// Failure recorded on the collection.
    pub fn collection_error(&self) -> impl Stream<Item = Option<ErrorInfo>> + Send + use<T> {
        project(&self.feed, |s| s.collection.error.clone())
    }
}
