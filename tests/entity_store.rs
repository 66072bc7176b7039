//! End-to-end behavior of entity stores against a scripted backend.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use restfold::{
    Action, ConfigurationError, Entity, EntityKey, EntityStore, ErrorKind,
    HttpMethod, HttpRequest, HttpResponse, HttpTransport, Registry, StatusTag, StoreConfig,
    TransportError, TransportFuture,
};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::sync::broadcast;
use tokio_stream::StreamExt;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct User {
    id: Option<i64>,
    name: String,
}

impl User {
    fn new(id: i64, name: &str) -> Self {
        Self {
            id: Some(id),
            name: name.to_owned(),
        }
    }
}

impl Entity for User {
    const ENTITY_NAME: &'static str = "user";
}

/// Scripted backend: replies in order, each after its own latency.
#[derive(Clone, Default)]
struct Backend {
    replies: Arc<Mutex<VecDeque<(Duration, Result<HttpResponse, TransportError>)>>>,
    requests: Arc<Mutex<Vec<HttpRequest>>>,
}

impl Backend {
    fn reply(self, latency: Duration, status: u16, body: Value) -> Self {
        self.replies
            .lock()
            .expect("replies lock")
            .push_back((latency, Ok(HttpResponse { status, body })));
        self
    }

    fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().expect("requests lock").clone()
    }
}

impl HttpTransport for Backend {
    fn fetch(&self, request: HttpRequest) -> TransportFuture<'_> {
        self.requests.lock().expect("requests lock").push(request);
        let (latency, result) = self
            .replies
            .lock()
            .expect("replies lock")
            .pop_front()
            .unwrap_or_else(|| {
                (
                    Duration::ZERO,
                    Err(TransportError::Network("connection refused".into())),
                )
            });
        Box::pin(async move {
            tokio::time::sleep(latency).await;
            result
        })
    }
}

const FAST: Duration = Duration::from_millis(100);
const SLOW: Duration = Duration::from_millis(800);

fn config() -> StoreConfig {
    StoreConfig::from_json(
        r#"{
            "apiUrl": "http://localhost/api",
            "entities": { "user": { "apiPath": "users" } }
        }"#,
    )
    .expect("valid config")
}

fn users(backend: &Backend) -> EntityStore<User> {
    Registry::builder()
        .config(config())
        .transport(backend.clone())
        .entity::<User>()
        .build()
        .expect("build should succeed")
        .store::<User>()
        .expect("user store")
}

/// Collect applied action names until one of the terminal actions arrives.
async fn until_terminal(log: &mut broadcast::Receiver<Arc<Action<User>>>) -> Vec<&'static str> {
    let mut names = Vec::new();
    loop {
        let action = log.recv().await.expect("action log should stay open");
        names.push(action.name());
        if action.is_terminal() {
            return names;
        }
    }
}

#[tokio::test(start_paused = true)]
async fn find_all_loads_collection_and_records_filter() {
    let backend = Backend::default().reply(
        FAST,
        200,
        json!({
            "entities": [{"id": 1, "name": "a"}, {"id": 2, "name": "b"}],
            "totalCount": 2,
        }),
    );
    let store = users(&backend);
    let mut log = store.actions();

    store.find_all(Some(json!({"status": "active"})));
    until_terminal(&mut log).await;

    let state = store.state();
    assert_eq!(state.collection.status, StatusTag::Loaded);
    assert_eq!(state.collection.total_count, 2);
    assert!(!state.collection.is_busy);
    assert_eq!(state.collection.api_filter, Some(json!({"status": "active"})));
    let entities = state.entities();
    let names: Vec<&str> = entities.iter().map(|u| u.name.as_str()).collect();
    assert_eq!(names, vec!["a", "b"]);
    for record in state.collection.records.iter() {
        assert_eq!(record.status, StatusTag::Loaded);
        assert!(!record.is_busy);
        assert!(record.error.is_none());
    }

    let request = &backend.requests()[0];
    assert_eq!(request.method, HttpMethod::Get);
    assert_eq!(request.url, "http://localhost/api/users?status=active");
}

#[tokio::test(start_paused = true)]
async fn fast_call_never_shows_busy() {
    let backend = Backend::default().reply(FAST, 200, json!({"id": 1, "name": "a"}));
    let store = users(&backend);
    let mut log = store.actions();

    store.find_by_key(1);
    let names = until_terminal(&mut log).await;
    assert_eq!(names, vec!["find_by_key_requested", "set_selected"]);
}

#[tokio::test(start_paused = true)]
async fn slow_call_shows_busy_exactly_once() {
    let backend = Backend::default().reply(
        SLOW,
        200,
        json!({"entities": [{"id": 1, "name": "a"}], "totalCount": 1}),
    );
    let store = users(&backend);
    let mut log = store.actions();
    let busy_view = store.collection_is_busy();
    let busy = tokio::spawn(async move {
        let mut busy_view = Box::pin(busy_view);
        let mut seen = Vec::new();
        while let Some(is_busy) = busy_view.next().await {
            seen.push(is_busy);
            if seen.len() == 3 {
                break;
            }
        }
        seen
    });

    store.find_all(None);
    let names = until_terminal(&mut log).await;
    assert_eq!(
        names,
        vec![
            "find_all_requested",
            "set_api_filter",
            "set_collection_busy",
            "set_entities",
        ]
    );
    let seen = busy.await.expect("view task should finish");
    assert_eq!(seen, vec![false, true, false]);
}

#[tokio::test(start_paused = true)]
async fn save_without_key_posts_and_with_key_puts() {
    let backend = Backend::default()
        .reply(FAST, 201, json!({"id": 5, "name": "new"}))
        .reply(FAST, 200, json!({"id": 5, "name": "renamed"}));
    let store = users(&backend);
    let mut log = store.actions();

    store.save(User {
        id: None,
        name: "new".into(),
    });
    until_terminal(&mut log).await;
    let selected = store.state().selected.clone();
    assert_eq!(selected.status, StatusTag::Saved);
    assert_eq!(selected.entity.as_deref(), Some(&User::new(5, "new")));

    store.save(User::new(5, "renamed"));
    until_terminal(&mut log).await;
    assert_eq!(
        store.state().selected.entity.as_deref(),
        Some(&User::new(5, "renamed"))
    );

    let requests = backend.requests();
    assert_eq!(requests[0].method, HttpMethod::Post);
    assert_eq!(requests[0].url, "http://localhost/api/users");
    assert_eq!(requests[1].method, HttpMethod::Put);
    assert_eq!(requests[1].url, "http://localhost/api/users/5");
}

#[tokio::test(start_paused = true)]
async fn save_reconciles_collection_in_place() {
    let backend = Backend::default().reply(FAST, 200, json!({"id": 2, "name": "B"}));
    let store = users(&backend);
    let mut log = store.actions();

    store.set_entities(
        vec![User::new(1, "a"), User::new(2, "b"), User::new(3, "c")],
        StatusTag::Loaded,
    );
    store.save(User::new(2, "B"));
    until_terminal(&mut log).await; // set_entities
    until_terminal(&mut log).await; // after_save

    let state = store.state();
    let entities = state.entities();
    let names: Vec<&str> = entities.iter().map(|u| u.name.as_str()).collect();
    assert_eq!(names, vec!["a", "B", "c"]);
    assert_eq!(state.collection.records[1].status, StatusTag::Saved);
    assert_eq!(state.collection.total_count, 3);
}

#[tokio::test(start_paused = true)]
async fn delete_removes_record_and_marks_selected() {
    let backend = Backend::default()
        .reply(FAST, 200, json!({"id": 2, "name": "b"}))
        .reply(SLOW, 200, json!({"id": 2, "name": "b"}));
    let store = users(&backend);
    let mut log = store.actions();

    store.set_entities(
        vec![User::new(1, "a"), User::new(2, "b"), User::new(3, "c")],
        StatusTag::Loaded,
    );
    until_terminal(&mut log).await;
    store.find_by_key(2);
    until_terminal(&mut log).await;

    store.delete_by_key(2, None);
    let names = until_terminal(&mut log).await;
    assert_eq!(
        names,
        vec!["delete_requested", "set_selected_busy", "after_delete"]
    );

    let state = store.state();
    assert_eq!(state.selected.status, StatusTag::Deleted);
    assert_eq!(state.collection.total_count, 2);
    let ids: Vec<Option<i64>> = state.entities().iter().map(|u| u.id).collect();
    assert_eq!(ids, vec![Some(1), Some(3)]);
    assert_eq!(backend.requests()[1].method, HttpMethod::Delete);
    assert_eq!(backend.requests()[1].url, "http://localhost/api/users/2");
}

#[tokio::test(start_paused = true)]
async fn failures_surface_in_state_only() {
    let backend = Backend::default()
        .reply(FAST, 404, json!({"message": "not found"}))
        .reply(FAST, 200, json!({"unexpected": true}));
    let store = users(&backend);
    let mut log = store.actions();

    store.find_by_key(EntityKey::from("missing"));
    until_terminal(&mut log).await;
    let selected = store.state().selected.clone();
    assert_eq!(selected.status, StatusTag::Error);
    let error = selected.error.clone().expect("selected error");
    assert_eq!(error.kind, ErrorKind::Transport);
    assert_eq!(error.status, Some(404));

    store.find_all(None);
    until_terminal(&mut log).await;
    let collection = store.state().collection.clone();
    assert_eq!(collection.status, StatusTag::Error);
    assert!(!collection.is_busy);
    let error = collection.error.clone().expect("collection error");
    assert_eq!(error.kind, ErrorKind::Parse);
    assert!(error.message.contains("parse_collection_response"));
}

#[tokio::test(start_paused = true)]
async fn custom_parsers_unwrap_envelopes() {
    let backend = Backend::default().reply(
        FAST,
        200,
        json!({"data": [{"id": 7, "name": "g"}], "meta": {"total": "40"}}),
    );
    let store = Registry::builder()
        .config(config())
        .transport(backend.clone())
        .parse_collection_response(|response, _| {
            json!({
                "entities": response.body["data"],
                "totalCount": response.body["meta"]["total"],
            })
        })
        .entity::<User>()
        .build()
        .expect("build should succeed")
        .store::<User>()
        .expect("user store");
    let mut log = store.actions();

    store.find_all(None);
    until_terminal(&mut log).await;
    let state = store.state();
    assert_eq!(state.collection.total_count, 40);
    assert_eq!(*state.entities()[0], User::new(7, "g"));
}

#[tokio::test(start_paused = true)]
async fn reload_all_repeats_last_filter() {
    let page = json!({"entities": [], "totalCount": 0});
    let backend = Backend::default()
        .reply(FAST, 200, page.clone())
        .reply(FAST, 200, page);
    let store = users(&backend);
    let mut log = store.actions();

    store.find_all(Some(json!({"where": {"age": 30}})));
    until_terminal(&mut log).await;
    store.reload_all();
    until_terminal(&mut log).await;

    let urls: Vec<String> = backend.requests().into_iter().map(|r| r.url).collect();
    assert_eq!(urls[0], urls[1]);
    assert_eq!(urls[1], "http://localhost/api/users?where%5Bage%5D=30");
}

#[tokio::test]
async fn missing_entity_configuration_is_fatal() {
    let err = Registry::builder()
        .config(StoreConfig::default().with_api_url("http://localhost/api"))
        .transport(Backend::default())
        .entity::<User>()
        .build()
        .expect_err("user is not configured");
    assert!(matches!(err, ConfigurationError::MissingEntity(name) if name == "user"));
}

#[tokio::test(start_paused = true)]
async fn busy_indication_mirrors_the_selected_record() {
    let backend = Backend::default().reply(SLOW, 500, json!({"message": "boom"}));
    let store = users(&backend);
    let mut log = store.actions();

    store.set_entities(vec![User::new(1, "a"), User::new(2, "b")], StatusTag::Loaded);
    store.set_selected(Some(User::new(2, "b")), StatusTag::Loaded);
    store.delete_by_key(1, None);

    // set_entities, set_selected, then the delete.
    until_terminal(&mut log).await;
    until_terminal(&mut log).await;
    let mut names = Vec::new();
    loop {
        let action = log.recv().await.expect("action log should stay open");
        names.push(action.name());
        if action.name() == "set_selected_busy" {
            break;
        }
    }
    assert_eq!(names, vec!["delete_requested", "set_selected_busy"]);

    let state = store.state();
    assert_eq!(state.selected.status, StatusTag::Deleting);
    assert_eq!(*state.collection.records[1], *state.selected);
    assert_eq!(state.collection.records[0].status, StatusTag::Loaded);
    assert!(!state.collection.records[0].is_busy);

    // A failed delete leaves no record stuck busy.
    until_terminal(&mut log).await;
    let state = store.state();
    assert_eq!(state.selected.status, StatusTag::Error);
    assert!(state.collection.records.iter().all(|record| !record.is_busy));
}

#[tokio::test(start_paused = true)]
async fn slower_older_load_wins_over_newer_one() {
    let backend = Backend::default()
        .reply(
            SLOW,
            200,
            json!({"entities": [{"id": 1, "name": "older"}], "totalCount": 1}),
        )
        .reply(
            FAST,
            200,
            json!({"entities": [{"id": 2, "name": "newer"}], "totalCount": 1}),
        );
    let store = users(&backend);
    let mut log = store.actions();

    store.find_all(Some(json!({"name": "older"})));
    store.find_all(Some(json!({"name": "newer"})));

    let mut loads = 0;
    let mut seen = Vec::new();
    while loads < 2 {
        let action = log.recv().await.expect("action log should stay open");
        if let Action::SetEntities { entities, .. } = &*action {
            loads += 1;
            seen.push(entities[0].name.clone());
        }
    }
    // Neither call is cancelled; they apply in completion order.
    assert_eq!(seen, vec!["newer", "older"]);

    let urls: Vec<String> = backend.requests().into_iter().map(|r| r.url).collect();
    assert_eq!(
        urls,
        vec![
            "http://localhost/api/users?name=older",
            "http://localhost/api/users?name=newer",
        ]
    );

    let state = store.state();
    assert_eq!(
        state.entities().iter().map(|u| u.name.as_str()).collect::<Vec<_>>(),
        vec!["older"]
    );
    // The filter stays the one of the last request issued.
    assert_eq!(store.api_filter_value(), Some(json!({"name": "newer"})));
}
