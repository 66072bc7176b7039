//! Pure state transition function and collection reconciliation.

use std::sync::Arc;

use crate::action::Action;
use crate::entity::{Entity, EntityKey};
use crate::state::{CollectionState, EntityRecordState, StatusTag, StoreState};

/// Apply a single action to the previous state and return the next state.
///
/// Must stay a pure function: no I/O, no side effects. Intent actions
/// return `state` itself. Slices the action does not touch keep their
/// `Arc` identity, so observers can detect changes by pointer comparison.
///
/// # Arguments
///
/// * `state` - The previous state. Never mutated.
/// * `action` - The transition to apply.
/// * `key_property` - Name of the entity field holding its key.
///
/// # Returns
///
/// The next state, pointer-equal to `state` when nothing changed.
pub fn reduce<T: Entity>(
    state: &Arc<StoreState<T>>,
    action: &Action<T>,
    key_property: &str,
) -> Arc<StoreState<T>> {
    match action {
        Action::FindAllRequested { .. }
        | Action::FindByKeyRequested { .. }
        | Action::SaveRequested { .. }
        | Action::DeleteRequested { .. } => Arc::clone(state),

        Action::SetApiFilter { filter } => with_collection(
            state,
            CollectionState {
                api_filter: filter.clone(),
                ..(*state.collection).clone()
            },
        ),

        Action::SetEntities {
            entities,
            total_count,
            status,
        } => {
            let records = entities
                .iter()
                .map(|entity| {
                    Arc::new(EntityRecordState::settled(
                        Some(Arc::new(entity.clone())),
                        *status,
                    ))
                })
                .collect();
            with_collection(
                state,
                CollectionState {
                    status: *status,
                    is_busy: false,
                    records: Arc::new(records),
                    total_count: *total_count,
                    error: None,
                    ..(*state.collection).clone()
                },
            )
        }

        Action::SetCollectionBusy { is_busy, status } => with_collection(
            state,
            CollectionState {
                is_busy: *is_busy,
                status: *status,
                ..(*state.collection).clone()
            },
        ),

        Action::SetCollectionError { error } => with_collection(
            state,
            CollectionState {
                is_busy: false,
                status: StatusTag::Error,
                error: Some(error.clone()),
                ..(*state.collection).clone()
            },
        ),

        Action::SetSelected { entity, status } => {
            let updated = EntityRecordState::settled(entity.clone().map(Arc::new), *status);
            let collection = reconcile(&state.collection, &updated, key_property);
            Arc::new(StoreState {
                selected: Arc::new(updated),
                collection,
            })
        }

        Action::AfterSave { entity } => {
            let updated =
                EntityRecordState::settled(Some(Arc::new(entity.clone())), StatusTag::Saved);
            let collection = reconcile(&state.collection, &updated, key_property);

            let replaces_selected = match &state.selected.entity {
                None => true,
                Some(selected) => selected.key(key_property) == entity.key(key_property),
            };
            let selected = if replaces_selected {
                Arc::new(updated)
            } else {
                Arc::clone(&state.selected)
            };
            Arc::new(StoreState {
                selected,
                collection,
            })
        }

        Action::AfterDelete { entity } => {
            let deleted_key = entity.key(key_property);

            // "deleted" is only reported on the selected slot when it holds
            // the entity that was deleted.
            let selected = match &state.selected.entity {
                Some(selected) if selected.key(key_property) == deleted_key => {
                    Arc::new(EntityRecordState::settled(
                        Some(Arc::new(entity.clone())),
                        StatusTag::Deleted,
                    ))
                }
                _ => Arc::clone(&state.selected),
            };

            let position = deleted_key
                .as_ref()
                .and_then(|key| position_of(&state.collection.records, key, key_property));
            let collection = match position {
                Some(index) => {
                    let mut records = (*state.collection.records).clone();
                    records.remove(index);
                    Arc::new(CollectionState {
                        records: Arc::new(records),
                        total_count: state.collection.total_count.saturating_sub(1),
                        ..(*state.collection).clone()
                    })
                }
                None => Arc::clone(&state.collection),
            };

            Arc::new(StoreState {
                selected,
                collection,
            })
        }

        Action::SetSelectedBusy { is_busy, status, .. } => {
            let updated = EntityRecordState {
                is_busy: *is_busy,
                status: *status,
                error: None,
                entity: state.selected.entity.clone(),
            };
            let collection = reconcile(&state.collection, &updated, key_property);
            Arc::new(StoreState {
                selected: Arc::new(updated),
                collection,
            })
        }

        Action::SetSelectedError { error } => Arc::new(StoreState {
            selected: Arc::new(EntityRecordState {
                is_busy: false,
                status: StatusTag::Error,
                error: Some(error.clone()),
                ..(*state.selected).clone()
            }),
            collection: Arc::clone(&state.collection),
        }),
    }
}

/// Replace the collection slice, keeping the selected slice's identity.
fn with_collection<T>(state: &StoreState<T>, collection: CollectionState<T>) -> Arc<StoreState<T>> {
    Arc::new(StoreState {
        selected: Arc::clone(&state.selected),
        collection: Arc::new(collection),
    })
}

/// Index of the record whose entity carries `key`.
fn position_of<T: Entity>(
    records: &[Arc<EntityRecordState<T>>],
    key: &EntityKey,
    key_property: &str,
) -> Option<usize> {
    records.iter().position(|record| {
        record
            .entity
            .as_ref()
            .and_then(|entity| entity.key(key_property))
            .as_ref()
            == Some(key)
    })
}

/// Put `candidate` at `index` unless the record there is already equal.
fn replace_record<T: Entity>(
    collection: &Arc<CollectionState<T>>,
    index: usize,
    candidate: EntityRecordState<T>,
) -> Arc<CollectionState<T>> {
    if *collection.records[index] == candidate {
        return Arc::clone(collection);
    }
    let mut records = (*collection.records).clone();
    records[index] = Arc::new(candidate);
    Arc::new(CollectionState {
        records: Arc::new(records),
        ..(**collection).clone()
    })
}

/// Mirror an updated record into the collection.
///
/// Looks up the record with the same truthy key as `updated`. If there is
/// one and it differs structurally, it is replaced in place. Otherwise the
/// collection is returned unchanged so that list observers are not woken.
pub(crate) fn reconcile<T: Entity>(
    collection: &Arc<CollectionState<T>>,
    updated: &EntityRecordState<T>,
    key_property: &str,
) -> Arc<CollectionState<T>> {
    let key = updated
        .entity
        .as_ref()
        .and_then(|entity| entity.truthy_key(key_property));
    let position = key
        .as_ref()
        .and_then(|key| position_of(&collection.records, key, key_property));
    match position {
        Some(index) => replace_record(collection, index, updated.clone()),
        None => Arc::clone(collection),
    }
}
