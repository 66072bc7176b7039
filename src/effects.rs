//! Asynchronous side of the store: gateway calls raced against the busy
//! indication delay.
//!
//! Every intent action applied by the dispatch loop is handed to
//! [`Effects::spawn`], which starts one tokio task per intent. The task
//! never touches state directly. It re-enters the store only by dispatching
//! actions through a weak sender, so a store whose handles were all dropped
//! shuts down even while calls are still in flight.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use crate::action::Action;
use crate::entity::{Entity, EntityKey};
use crate::error::GatewayError;
use crate::gateway::CrudGateway;
use crate::state::{ErrorInfo, Filter, StatusTag};

/// Spawner of the gateway call behind each intent.
pub(crate) struct Effects<T> {
    gateway: CrudGateway<T>,
    busy_delay: Duration,
    store_key: Arc<str>,
    dispatch: mpsc::WeakUnboundedSender<Action<T>>,
}

// Manual `Clone`: `T` need not be `Clone` for the handles to be.
impl<T> Clone for Effects<T> {
    fn clone(&self) -> Self {
        Self {
            gateway: self.gateway.clone(),
            busy_delay: self.busy_delay,
            store_key: Arc::clone(&self.store_key),
            dispatch: self.dispatch.clone(),
        }
    }
}

impl<T: Entity> Effects<T> {
    /// Create the effect runner of one store.
    ///
    /// # Arguments
    ///
    /// * `gateway` - Gateway the intents are executed against.
    /// * `busy_delay` - Grace period before a busy action is dispatched.
    /// * `store_key` - Store key, used in log fields.
    /// * `dispatch` - Weak sender into the store's dispatch loop.
    pub(crate) fn new(
        gateway: CrudGateway<T>,
        busy_delay: Duration,
        store_key: Arc<str>,
        dispatch: mpsc::WeakUnboundedSender<Action<T>>,
    ) -> Self {
        Self {
            gateway,
            busy_delay,
            store_key,
            dispatch,
        }
    }

    /// Start the gateway call for an intent action.
    ///
    /// Non-intent actions are ignored. Must be called from within a tokio
    /// runtime.
    pub(crate) fn spawn(&self, action: &Action<T>) {
        let effects = self.clone();
        match action {
            Action::FindAllRequested { filter } => {
                tokio::spawn(effects.find_all(filter.clone()));
            }
            Action::FindByKeyRequested { key, filter } => {
                tokio::spawn(effects.find_by_key(key.clone(), filter.clone()));
            }
            Action::SaveRequested { entity } => {
                tokio::spawn(effects.save(entity.clone()));
            }
            Action::DeleteRequested { key, filter } => {
                tokio::spawn(effects.delete_by_key(key.clone(), filter.clone()));
            }
            _ => {}
        }
    }

    async fn find_all(self, filter: Option<Filter>) {
        let call = self.gateway.find_all(filter.as_ref());
        let busy = Action::SetCollectionBusy {
            is_busy: true,
            status: StatusTag::Loading,
        };
        let terminal = match self.race(call, busy).await {
            Ok(page) => Action::SetEntities {
                entities: page.entities,
                total_count: page.total_count,
                status: StatusTag::Loaded,
            },
            Err(e) => Action::SetCollectionError {
                error: self.failure("find all", &e),
            },
        };
        self.send(terminal);
    }

    async fn find_by_key(self, key: EntityKey, filter: Option<Filter>) {
        let call = self.gateway.find_by_key(&key, filter.as_ref());
        let busy = Action::SetSelectedBusy {
            is_busy: true,
            status: StatusTag::Loading,
            key: Some(key.clone()),
        };
        let terminal = match self.race(call, busy).await {
            Ok(entity) => Action::SetSelected {
                entity: Some(entity),
                status: StatusTag::Loaded,
            },
            Err(e) => Action::SetSelectedError {
                error: self.failure("find by key", &e),
            },
        };
        self.send(terminal);
    }

    async fn save(self, entity: T) {
        let key = entity.truthy_key(self.gateway.key_property());
        let call = self.gateway.save(&entity);
        let busy = Action::SetSelectedBusy {
            is_busy: true,
            status: StatusTag::Saving,
            key,
        };
        let terminal = match self.race(call, busy).await {
            Ok(entity) => Action::AfterSave { entity },
            Err(e) => Action::SetSelectedError {
                error: self.failure("save", &e),
            },
        };
        self.send(terminal);
    }

    async fn delete_by_key(self, key: EntityKey, filter: Option<Filter>) {
        let call = self.gateway.delete_by_key(&key, filter.as_ref());
        let busy = Action::SetSelectedBusy {
            is_busy: true,
            status: StatusTag::Deleting,
            key: Some(key.clone()),
        };
        let terminal = match self.race(call, busy).await {
            Ok(entity) => Action::AfterDelete { entity },
            Err(e) => Action::SetSelectedError {
                error: self.failure("delete", &e),
            },
        };
        self.send(terminal);
    }

    /// Await `call`, dispatching `busy` once if it outlives the delay.
    ///
    /// The call is polled first, so a call that is already complete when the
    /// delay fires never produces a busy action. The call is never cancelled.
    async fn race<F, R>(&self, call: F, busy: Action<T>) -> R
    where
        F: Future<Output = R>,
    {
        tokio::pin!(call);
        let delay = tokio::time::sleep(self.busy_delay);
        tokio::pin!(delay);

        tokio::select! {
            biased;
            result = &mut call => return result,
            () = &mut delay => {}
        }

        tracing::debug!(
            entity = T::ENTITY_NAME,
            store_key = %self.store_key,
            action = busy.name(),
            "busy indication delay elapsed"
        );
        self.send(busy);
        call.await
    }

    fn failure(&self, operation: &str, error: &GatewayError) -> ErrorInfo {
        tracing::warn!(
            entity = T::ENTITY_NAME,
            store_key = %self.store_key,
            operation,
            error = %error,
            "gateway call failed"
        );
        ErrorInfo::from(error)
    }

    /// Dispatch into the store, if it is still alive.
    fn send(&self, action: Action<T>) {
        let delivered = self
            .dispatch
            .upgrade()
            .is_some_and(|tx| tx.send(action).is_ok());
        if !delivered {
            tracing::debug!(
                entity = T::ENTITY_NAME,
                store_key = %self.store_key,
                "store dropped, discarding result"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::config::{EntityConfig, ResponseParsers, StoreConfig};
    use crate::entity::test_fixtures::Widget;
    use crate::state::ErrorKind;
    use crate::transport::test_fixtures::{MockTransport, Reply};

    const DELAY: Duration = Duration::from_millis(300);

    fn effects(
        replies: Vec<Reply>,
    ) -> (
        Effects<Widget>,
        mpsc::UnboundedSender<Action<Widget>>,
        mpsc::UnboundedReceiver<Action<Widget>>,
    ) {
        let binding = StoreConfig::default()
            .with_api_url("http://api.test")
            .with_entity("widget", EntityConfig::new("widgets"))
            .binding("widget")
            .expect("binding");
        let transport = Arc::new(MockTransport::new(replies));
        let gateway = CrudGateway::new(&binding, transport, ResponseParsers::default());
        let (tx, rx) = mpsc::unbounded_channel();
        let effects = Effects::new(gateway, DELAY, "widget".into(), tx.downgrade());
        (effects, tx, rx)
    }

    /// Drain everything the effect dispatched after it finished.
    async fn collect(
        tx: mpsc::UnboundedSender<Action<Widget>>,
        mut rx: mpsc::UnboundedReceiver<Action<Widget>>,
    ) -> Vec<Action<Widget>> {
        drop(tx);
        let mut actions = Vec::new();
        while let Some(action) = rx.recv().await {
            actions.push(action);
        }
        actions
    }

    #[tokio::test(start_paused = true)]
    async fn fast_call_dispatches_only_terminal() {
        let (effects, tx, rx) = effects(vec![
            Reply::ok(200, json!({"entities": [{"id": 1, "name": "a"}], "totalCount": 1}))
                .after(Duration::from_millis(100)),
        ]);
        effects.find_all(None).await;

        let actions = collect(tx, rx).await;
        assert_eq!(
            actions,
            vec![Action::SetEntities {
                entities: vec![Widget::new(1, "a")],
                total_count: 1,
                status: StatusTag::Loaded,
            }]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn slow_call_dispatches_busy_then_terminal() {
        let (effects, tx, rx) = effects(vec![
            Reply::ok(200, json!({"id": 5, "name": "e"})).after(Duration::from_millis(500)),
        ]);
        effects.find_by_key(EntityKey::Int(5), None).await;

        let actions = collect(tx, rx).await;
        assert_eq!(
            actions,
            vec![
                Action::SetSelectedBusy {
                    is_busy: true,
                    status: StatusTag::Loading,
                    key: Some(EntityKey::Int(5)),
                },
                Action::SetSelected {
                    entity: Some(Widget::new(5, "e")),
                    status: StatusTag::Loaded,
                },
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn save_busy_carries_truthy_key_only() {
        let (effects, tx, rx) = effects(vec![
            Reply::ok(201, json!({"id": 9, "name": "new"})).after(Duration::from_secs(1)),
        ]);
        effects.save(Widget::unsaved("new")).await;

        let actions = collect(tx, rx).await;
        assert_eq!(
            actions[0],
            Action::SetSelectedBusy {
                is_busy: true,
                status: StatusTag::Saving,
                key: None,
            }
        );
        assert_eq!(
            actions[1],
            Action::AfterSave {
                entity: Widget::new(9, "new")
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn failure_becomes_error_action() {
        let (effects, tx, rx) = effects(vec![Reply::ok(500, json!({"message": "boom"}))]);
        effects.delete_by_key(EntityKey::Int(2), None).await;

        let actions = collect(tx, rx).await;
        assert_eq!(actions.len(), 1);
        match &actions[0] {
            Action::SetSelectedError { error } => {
                assert_eq!(error.kind, ErrorKind::Transport);
                assert_eq!(error.status, Some(500));
            }
            other => panic!("expected selected error, got: {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn result_is_discarded_when_store_is_gone() {
        let (effects, tx, mut rx) = effects(vec![
            Reply::ok(200, json!({"entities": [], "totalCount": 0})),
        ]);
        drop(tx);
        effects.find_all(None).await;
        assert!(rx.recv().await.is_none());
    }
}
