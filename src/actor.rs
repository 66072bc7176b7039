//! Dispatch loop that owns the state of one entity type.
//!
//! The loop runs as a tokio task and applies actions from an unbounded
//! `mpsc` channel strictly one at a time. It is the only writer of the
//! state: handles read snapshots through a `watch` channel, derived views
//! receive every published state through a [`StateFeed`], and applied
//! actions are logged on a `broadcast` channel.
//!
//! Public API lives in [`EntityStore`](crate::EntityStore); this module
//! only exposes the crate-internal [`spawn_store`] factory.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc, watch};

use crate::action::Action;
use crate::effects::Effects;
use crate::entity::Entity;
use crate::gateway::CrudGateway;
use crate::reducer::reduce;
use crate::state::StoreState;
use crate::view::StateFeed;

/// Capacity of the applied-action log. Lagging subscribers lose the oldest
/// entries.
const ACTION_LOG_CAPACITY: usize = 256;

/// Channels a store handle keeps after spawning the loop.
pub(crate) struct StoreChannels<T> {
    /// Strong sender into the dispatch loop.
    pub sender: mpsc::UnboundedSender<Action<T>>,
    /// Latest published state.
    pub state: watch::Receiver<Arc<StoreState<T>>>,
    /// Every published state, for derived views.
    pub feed: Arc<StateFeed<T>>,
    /// Applied-action log, used to hand out new subscriptions.
    pub actions: broadcast::Sender<Arc<Action<T>>>,
}

/// State owned by the dispatch loop.
struct DispatchLoop<T> {
    state: Arc<StoreState<T>>,
    key_property: Arc<str>,
    store_key: Arc<str>,
    state_tx: watch::Sender<Arc<StoreState<T>>>,
    feed: Arc<StateFeed<T>>,
    actions_tx: broadcast::Sender<Arc<Action<T>>>,
    effects: Effects<T>,
}

impl<T: Entity> DispatchLoop<T> {
    /// Apply one incoming action.
    ///
    /// A collection load also records its filter, right after the load has
    /// been started.
    fn handle(&mut self, action: Action<T>) {
        let filter = match &action {
            Action::FindAllRequested { filter } => Some(filter.clone()),
            _ => None,
        };
        self.apply(action);
        if let Some(filter) = filter {
            self.apply(Action::SetApiFilter { filter });
        }
    }

    /// Reduce, publish if changed, log, and start the effect of intents.
    fn apply(&mut self, action: Action<T>) {
        let next = reduce(&self.state, &action, &self.key_property);
        let changed = !Arc::ptr_eq(&next, &self.state);
        tracing::debug!(
            entity = T::ENTITY_NAME,
            store_key = %self.store_key,
            action = action.name(),
            changed,
            "action applied"
        );
        if changed {
            self.state = next;
            self.feed.publish(Arc::clone(&self.state));
            self.state_tx.send_replace(Arc::clone(&self.state));
        }

        let action = Arc::new(action);
        // No subscribers is the normal case.
        let _ = self.actions_tx.send(Arc::clone(&action));

        if action.is_intent() {
            self.effects.spawn(&action);
        }
    }
}

// Views must end even if the loop task is aborted.
impl<T> Drop for DispatchLoop<T> {
    fn drop(&mut self) {
        self.feed.close();
    }
}

/// Run the dispatch loop until every strong sender is dropped.
async fn run_store<T: Entity>(
    mut rx: mpsc::UnboundedReceiver<Action<T>>,
    mut store: DispatchLoop<T>,
) {
    tracing::info!(
        entity = T::ENTITY_NAME,
        store_key = %store.store_key,
        "entity store started"
    );
    while let Some(action) = rx.recv().await {
        store.handle(action);
    }
    tracing::info!(
        entity = T::ENTITY_NAME,
        store_key = %store.store_key,
        "entity store stopped"
    );
}

/// Spawn the dispatch loop of one entity type.
///
/// # Arguments
///
/// * `gateway` - Gateway the store's intents are executed against.
/// * `store_key` - Registry key of the store, used in log fields.
/// * `busy_delay` - Grace period before busy actions are dispatched.
///
/// # Returns
///
/// The channels a store handle needs. The loop keeps running as long as a
/// clone of the returned sender exists.
///
/// # Panics
///
/// Panics if called outside of a tokio runtime.
pub(crate) fn spawn_store<T: Entity>(
    gateway: CrudGateway<T>,
    store_key: &str,
    busy_delay: Duration,
) -> StoreChannels<T> {
    let (sender, rx) = mpsc::unbounded_channel();
    let initial = Arc::new(StoreState::default());
    let (state_tx, state) = watch::channel(Arc::clone(&initial));
    let feed = Arc::new(StateFeed::new(Arc::clone(&initial)));
    let (actions, _) = broadcast::channel(ACTION_LOG_CAPACITY);

    let store_key: Arc<str> = store_key.into();
    let key_property: Arc<str> = gateway.key_property().into();
    let effects = Effects::new(gateway, busy_delay, Arc::clone(&store_key), sender.downgrade());
    let store = DispatchLoop {
        state: initial,
        key_property,
        store_key,
        state_tx,
        feed: Arc::clone(&feed),
        actions_tx: actions.clone(),
        effects,
    };
    tokio::spawn(run_store(rx, store));

    StoreChannels {
        sender,
        state,
        feed,
        actions,
    }
}
