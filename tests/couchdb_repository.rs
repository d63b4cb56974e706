use std::collections::{BTreeMap, HashMap, HashSet};
use std::error::Error;
use std::net::{SocketAddr, TcpListener};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, put};
use axum::Router;
use customer_service::config::CouchCredentials;
use customer_service::errors::RepositoryError;
use customer_service::models::customer::{Customer, CustomerFilter};
use customer_service::repositories::couchdb::CouchCustomerRepository;
use customer_service::repositories::CustomerRepository;
use customer_service::utils::retry::RetryPolicy;
use serde_json::{json, Value};
use uuid::Uuid;

type TestResult = Result<(), Box<dyn Error>>;

const DATABASE: &str = "customers";

#[derive(Default)]
struct FakeCouch {
    databases: HashSet<String>,
    documents: BTreeMap<String, Value>,
    revisions: u64,
    failures: usize,
}

impl FakeCouch {
    fn next_rev(&mut self) -> String {
        self.revisions += 1;
        format!("{}-fake", self.revisions)
    }
}

type Shared = Arc<Mutex<FakeCouch>>;

fn unavailable() -> Response {
    (StatusCode::SERVICE_UNAVAILABLE, Json(json!({"error": "unavailable"}))).into_response()
}

/// Consumes one injected failure, if any are queued.
fn injected_failure(state: &Shared) -> bool {
    let mut couch = match state.lock() {
        Ok(couch) => couch,
        Err(poisoned) => poisoned.into_inner(),
    };

    if couch.failures > 0 {
        couch.failures -= 1;
        return true;
    }

    false
}

async fn welcome(State(state): State<Shared>) -> Response {
    if injected_failure(&state) {
        return unavailable();
    }

    Json(json!({"couchdb": "Welcome"})).into_response()
}

async fn create_database(State(state): State<Shared>, Path(db): Path<String>) -> Response {
    let mut couch = state.lock().unwrap();

    if couch.databases.insert(db) {
        (StatusCode::CREATED, Json(json!({"ok": true}))).into_response()
    } else {
        (
            StatusCode::PRECONDITION_FAILED,
            Json(json!({"error": "file_exists"})),
        )
            .into_response()
    }
}

async fn post_document(
    State(state): State<Shared>,
    Path(_db): Path<String>,
    Json(mut body): Json<Value>,
) -> Response {
    if injected_failure(&state) {
        return unavailable();
    }

    let mut couch = state.lock().unwrap();
    let id = Uuid::new_v4().simple().to_string();
    let rev = couch.next_rev();

    body["_id"] = json!(id);
    body["_rev"] = json!(rev);
    couch.documents.insert(id.clone(), body);

    (
        StatusCode::CREATED,
        Json(json!({"ok": true, "id": id, "rev": rev})),
    )
        .into_response()
}

async fn get_document(
    State(state): State<Shared>,
    Path((_db, id)): Path<(String, String)>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    if injected_failure(&state) {
        return unavailable();
    }

    let couch = state.lock().unwrap();

    if id == "_all_docs" {
        let include_docs = params.get("include_docs").map(String::as_str) == Some("true");
        let rows = couch
            .documents
            .iter()
            .map(|(id, doc)| {
                let mut row = json!({"id": id, "key": id, "value": {"rev": doc["_rev"]}});
                if include_docs {
                    row["doc"] = doc.clone();
                }
                row
            })
            .collect::<Vec<Value>>();

        return Json(json!({"total_rows": rows.len(), "offset": 0, "rows": rows})).into_response();
    }

    match couch.documents.get(&id) {
        Some(doc) => Json(doc.clone()).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({"error": "not_found", "reason": "missing"})),
        )
            .into_response(),
    }
}

async fn find_documents(
    State(state): State<Shared>,
    Path((_db, endpoint)): Path<(String, String)>,
    Json(query): Json<Value>,
) -> Response {
    if injected_failure(&state) {
        return unavailable();
    }

    if endpoint != "_find" {
        return StatusCode::NOT_FOUND.into_response();
    }

    let couch = state.lock().unwrap();
    let selector = query["selector"].as_object().cloned().unwrap_or_default();
    let limit = query["limit"].as_u64().unwrap_or(25) as usize;
    let offset = query["bookmark"]
        .as_str()
        .and_then(|bookmark| bookmark.parse::<usize>().ok())
        .unwrap_or(0);

    let matching = couch
        .documents
        .iter()
        .filter(|(id, _)| !id.starts_with("_design/"))
        .map(|(_, doc)| doc)
        .filter(|doc| selector.iter().all(|(field, value)| &doc[field] == value))
        .cloned()
        .collect::<Vec<Value>>();

    let page = matching
        .iter()
        .skip(offset)
        .take(limit)
        .cloned()
        .collect::<Vec<Value>>();
    let bookmark = (offset + page.len()).to_string();

    Json(json!({"docs": page, "bookmark": bookmark})).into_response()
}

async fn put_document(
    State(state): State<Shared>,
    Path((_db, id)): Path<(String, String)>,
    Json(mut body): Json<Value>,
) -> Response {
    if injected_failure(&state) {
        return unavailable();
    }

    let mut couch = state.lock().unwrap();

    if let Some(current) = couch.documents.get(&id) {
        if current["_rev"] != body["_rev"] {
            return (
                StatusCode::CONFLICT,
                Json(json!({"error": "conflict", "reason": "Document update conflict."})),
            )
                .into_response();
        }
    }

    let rev = couch.next_rev();
    body["_id"] = json!(id);
    body["_rev"] = json!(rev);
    couch.documents.insert(id.clone(), body);

    (
        StatusCode::CREATED,
        Json(json!({"ok": true, "id": id, "rev": rev})),
    )
        .into_response()
}

async fn delete_document(
    State(state): State<Shared>,
    Path((_db, id)): Path<(String, String)>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    if injected_failure(&state) {
        return unavailable();
    }

    let mut couch = state.lock().unwrap();

    let current_rev = match couch.documents.get(&id) {
        Some(current) => current["_rev"].as_str().map(str::to_string),
        None => return StatusCode::NOT_FOUND.into_response(),
    };

    if current_rev.as_ref() != params.get("rev") {
        return StatusCode::CONFLICT.into_response();
    }

    couch.documents.remove(&id);
    Json(json!({"ok": true, "id": id})).into_response()
}

async fn spawn_fake_couch() -> Result<(SocketAddr, Shared), Box<dyn Error>> {
    let state: Shared = Arc::new(Mutex::new(FakeCouch::default()));

    let app = Router::new()
        .route("/", get(welcome))
        .route("/:db", put(create_database).post(post_document))
        .route(
            "/:db/:id",
            get(get_document)
                .post(find_documents)
                .put(put_document)
                .delete(delete_document),
        )
        .with_state(state.clone());

    let listener = TcpListener::bind("127.0.0.1:0")?;
    let addr = listener.local_addr()?;
    let server = axum::Server::from_tcp(listener)?.serve(app.into_make_service());

    tokio::spawn(async move {
        if let Err(err) = server.await {
            eprintln!("fake couchdb stopped: {err}");
        }
    });

    Ok((addr, state))
}

fn quick_retries(count: u32) -> RetryPolicy {
    RetryPolicy {
        count,
        delay: Duration::from_millis(5),
        backoff: 2.0,
    }
}

async fn connect(addr: SocketAddr, retry: RetryPolicy) -> Result<CouchCustomerRepository, RepositoryError> {
    let credentials = CouchCredentials {
        username: Some("admin".to_string()),
        password: Some("pass".to_string()),
        url: Some(format!("http://{addr}")),
        ..CouchCredentials::default()
    };

    CouchCustomerRepository::connect(&credentials, DATABASE, false, retry).await
}

fn customer(first_name: &str, last_name: &str, address: &str) -> Customer {
    Customer::new(first_name, last_name, address)
}

#[tokio::test]
async fn connect_creates_database_once() -> TestResult {
    let (addr, state) = spawn_fake_couch().await?;

    connect(addr, quick_retries(1)).await?;
    connect(addr, quick_retries(1)).await?;

    assert!(state.lock().unwrap().databases.contains(DATABASE));
    Ok(())
}

#[tokio::test]
async fn connect_fails_when_server_is_down() -> TestResult {
    let listener = TcpListener::bind("127.0.0.1:0")?;
    let addr = listener.local_addr()?;
    drop(listener);

    let result = connect(addr, quick_retries(1)).await;
    assert!(matches!(result, Err(RepositoryError::Connection(_))));
    Ok(())
}

#[tokio::test]
async fn crud_round_trip() -> TestResult {
    let (addr, state) = spawn_fake_couch().await?;
    let repository = connect(addr, quick_retries(1)).await?;

    let id = repository
        .create(&customer("Michael", "Parker", "1 Main St"))
        .await?;
    assert!(state
        .lock()
        .unwrap()
        .documents
        .contains_key(&id.simple().to_string()));

    let found = repository.find(&id).await?.ok_or("created customer missing")?;
    assert_eq!(found.id, Some(id));
    assert_eq!(found.first_name, "Michael");
    assert!(found.active);

    let mut changed = found.clone();
    changed.address = "unknown".to_string();
    changed.active = false;
    repository.update(&id, &changed).await?;

    let found = repository.find(&id).await?.ok_or("updated customer missing")?;
    assert_eq!(found.address, "unknown");
    assert!(!found.active);

    repository.delete(&id).await?;
    assert_eq!(repository.find(&id).await?, None);
    Ok(())
}

#[tokio::test]
async fn update_and_delete_of_missing_documents_are_noops() -> TestResult {
    let (addr, state) = spawn_fake_couch().await?;
    let repository = connect(addr, quick_retries(1)).await?;
    let id = Uuid::new_v4();

    repository
        .update(&id, &customer("Michael", "Parker", "1 Main St"))
        .await?;
    repository.delete(&id).await?;

    assert!(state.lock().unwrap().documents.is_empty());
    Ok(())
}

#[tokio::test]
async fn documents_without_revision_are_treated_as_missing() -> TestResult {
    let (addr, state) = spawn_fake_couch().await?;
    let repository = connect(addr, quick_retries(1)).await?;
    let id = Uuid::new_v4();

    state.lock().unwrap().documents.insert(
        id.simple().to_string(),
        json!({
            "_id": id.simple().to_string(),
            "first_name": "Ghost",
            "last_name": "Record",
            "address": "nowhere",
            "active": true,
        }),
    );

    assert_eq!(repository.find(&id).await?, None);
    assert!(repository.all().await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn all_skips_design_documents() -> TestResult {
    let (addr, state) = spawn_fake_couch().await?;
    let repository = connect(addr, quick_retries(1)).await?;

    state.lock().unwrap().documents.insert(
        "_design/customers".to_string(),
        json!({"_id": "_design/customers", "_rev": "1-design", "views": {}}),
    );

    repository
        .create(&customer("Michael", "Parker", "1 Main St"))
        .await?;
    repository
        .create(&customer("Sarah", "Parker", "2 Main St"))
        .await?;

    let mut names = repository
        .all()
        .await?
        .into_iter()
        .map(|c| c.first_name)
        .collect::<Vec<String>>();
    names.sort();
    assert_eq!(names, vec!["Michael", "Sarah"]);
    Ok(())
}

#[tokio::test]
async fn find_by_matches_exact_fields() -> TestResult {
    let (addr, _) = spawn_fake_couch().await?;
    let repository = connect(addr, quick_retries(1)).await?;

    repository
        .create(&customer("Michael", "Parker", "1 Main St"))
        .await?;
    repository
        .create(&customer("Michael", "Jordan", "2 Main St"))
        .await?;
    repository
        .create(&customer("Sarah", "Parker", "1 Main St"))
        .await?;

    let by_first = repository
        .find_by(&CustomerFilter::FirstName("Michael".to_string()))
        .await?;
    assert_eq!(by_first.len(), 2);
    assert!(by_first.iter().all(|c| c.id.is_some()));

    let by_last = repository
        .find_by(&CustomerFilter::LastName("Parker".to_string()))
        .await?;
    assert_eq!(by_last.len(), 2);

    let by_address = repository
        .find_by(&CustomerFilter::Address("2 Main St".to_string()))
        .await?;
    assert_eq!(by_address.len(), 1);
    assert_eq!(by_address[0].last_name, "Jordan");

    let by_name = repository
        .find_by(&CustomerFilter::Name {
            first_name: "Sarah".to_string(),
            last_name: "Parker".to_string(),
        })
        .await?;
    assert_eq!(by_name.len(), 1);
    assert_eq!(by_name[0].first_name, "Sarah");

    let none = repository
        .find_by(&CustomerFilter::FirstName("michael".to_string()))
        .await?;
    assert!(none.is_empty());
    Ok(())
}

#[tokio::test]
async fn find_by_follows_bookmarks_across_pages() -> TestResult {
    let (addr, state) = spawn_fake_couch().await?;
    let repository = connect(addr, quick_retries(1)).await?;

    {
        let mut couch = state.lock().unwrap();
        for n in 0..450 {
            let id = Uuid::new_v4().simple().to_string();
            let rev = couch.next_rev();
            let first_name = if n % 3 == 0 { "Bulk" } else { "Other" };
            couch.documents.insert(
                id.clone(),
                json!({
                    "_id": id,
                    "_rev": rev,
                    "first_name": first_name,
                    "last_name": format!("Customer{n}"),
                    "address": "Somewhere",
                    "active": true,
                }),
            );
        }
    }

    let found = repository
        .find_by(&CustomerFilter::Address("Somewhere".to_string()))
        .await?;
    assert_eq!(found.len(), 450);

    let bulk = repository
        .find_by(&CustomerFilter::FirstName("Bulk".to_string()))
        .await?;
    assert_eq!(bulk.len(), 150);
    Ok(())
}

#[tokio::test]
async fn remove_all_keeps_design_documents() -> TestResult {
    let (addr, state) = spawn_fake_couch().await?;
    let repository = connect(addr, quick_retries(1)).await?;

    state.lock().unwrap().documents.insert(
        "_design/customers".to_string(),
        json!({"_id": "_design/customers", "_rev": "1-design", "views": {}}),
    );
    for n in 0..3 {
        repository
            .create(&customer("Michael", &format!("Parker{n}"), "1 Main St"))
            .await?;
    }

    repository.remove_all().await?;

    assert!(repository.all().await?.is_empty());
    let couch = state.lock().unwrap();
    assert_eq!(couch.documents.len(), 1);
    assert!(couch.documents.contains_key("_design/customers"));
    Ok(())
}

#[tokio::test]
async fn transient_failures_are_retried() -> TestResult {
    let (addr, state) = spawn_fake_couch().await?;
    let repository = connect(addr, quick_retries(3)).await?;

    state.lock().unwrap().failures = 2;
    let id = repository
        .create(&customer("Michael", "Parker", "1 Main St"))
        .await?;

    state.lock().unwrap().failures = 2;
    let found = repository.find(&id).await?;
    assert!(found.is_some());
    assert_eq!(state.lock().unwrap().failures, 0);
    Ok(())
}

#[tokio::test]
async fn exhausted_retries_surface_transient_error() -> TestResult {
    let (addr, state) = spawn_fake_couch().await?;
    let repository = connect(addr, quick_retries(3)).await?;

    state.lock().unwrap().failures = 5;
    let result = repository.all().await;

    assert!(matches!(result, Err(RepositoryError::Transient(_))));
    assert_eq!(state.lock().unwrap().failures, 2);
    Ok(())
}

#[tokio::test]
async fn model_create_absorbs_backend_failure() -> TestResult {
    let (addr, state) = spawn_fake_couch().await?;
    let repository = connect(addr, quick_retries(2)).await?;

    state.lock().unwrap().failures = 2;
    let mut michael = customer("Michael", "Parker", "1 Main St");
    michael.create(&repository).await?;

    assert_eq!(michael.id, None);
    assert!(state.lock().unwrap().documents.is_empty());
    Ok(())
}
