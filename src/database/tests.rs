use super::*;
use crate::auth::models::Session;
use crate::auth::FirebaseAuth;
use crate::core::middleware::SessionTokenMiddleware;
use httpmock::prelude::*;
use reqwest::Client;
use reqwest_middleware::ClientBuilder;
use serde_json::json;

fn test_db(server: &MockServer) -> FirebaseDatabase {
    let client = ClientBuilder::new(Client::new()).build();
    FirebaseDatabase::new(client, &server.url("/")).unwrap()
}

fn path(p: &str) -> DatabasePath {
    DatabasePath::parse(p).unwrap()
}

fn fields(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        other => panic!("Expected object, got {}", other),
    }
}

#[tokio::test]
async fn test_fetch_all_collection() {
    let server = MockServer::start();
    let db = test_db(&server);

    let mock = server.mock(|when, then| {
        when.method(GET).path("/products.json");
        then.status(200)
            .header("content-type", "application/json")
            .json_body(json!({
                "p1": { "name": "Kale", "price": 3.5, "category": "Veg", "image": "u1", "availability": true }
            }));
    });

    let children = db.fetch_all(&path("products")).await.unwrap().unwrap();
    assert_eq!(children.len(), 1);
    assert_eq!(children["p1"]["name"], "Kale");
    mock.assert();
}

#[tokio::test]
async fn test_fetch_all_missing_collection() {
    let server = MockServer::start();
    let db = test_db(&server);

    let mock = server.mock(|when, then| {
        when.method(GET).path("/products.json");
        then.status(200)
            .header("content-type", "application/json")
            .body("null");
    });

    assert!(db.fetch_all(&path("products")).await.unwrap().is_none());
    mock.assert();
}

#[tokio::test]
async fn test_fetch_all_scalar_is_rejected() {
    let server = MockServer::start();
    let db = test_db(&server);

    server.mock(|when, then| {
        when.method(GET).path("/products.json");
        then.status(200)
            .header("content-type", "application/json")
            .body("42");
    });

    let err = db.fetch_all(&path("products")).await.unwrap_err();
    assert!(matches!(err, StoreError::UnexpectedShape(p) if p == "products"));
}

#[tokio::test]
async fn test_permission_denied_maps_to_api_error() {
    let server = MockServer::start();
    let db = test_db(&server);

    server.mock(|when, then| {
        when.method(GET).path("/products.json");
        then.status(401)
            .header("content-type", "application/json")
            .json_body(json!({ "error": "Permission denied" }));
    });

    match db.fetch_all(&path("products")).await.unwrap_err() {
        StoreError::ApiError { status, message } => {
            assert_eq!(status, 401);
            assert_eq!(message, "Permission denied");
        }
        other => panic!("Expected ApiError, got {:?}", other),
    }
}

#[tokio::test]
async fn test_write_full() {
    let server = MockServer::start();
    let db = test_db(&server);

    let mock = server.mock(|when, then| {
        when.method(PUT)
            .path("/products/p2.json")
            .query_param("print", "silent")
            .json_body(json!({ "name": "Spinach", "price": 2.0, "availability": true }));
        then.status(204);
    });

    db.write_full(
        &path("products/p2"),
        &json!({ "name": "Spinach", "price": 2.0, "availability": true }),
    )
    .await
    .unwrap();
    mock.assert();
}

#[tokio::test]
async fn test_write_partial() {
    let server = MockServer::start();
    let db = test_db(&server);

    let mock = server.mock(|when, then| {
        when.method(PATCH)
            .path("/products/p1.json")
            .query_param("print", "silent")
            .json_body(json!({ "availability": false }));
        then.status(204);
    });

    db.write_partial(&path("products/p1"), &fields(json!({ "availability": false })))
        .await
        .unwrap();
    mock.assert();
}

#[tokio::test]
async fn test_delete_at() {
    let server = MockServer::start();
    let db = test_db(&server);

    let mock = server.mock(|when, then| {
        when.method(DELETE)
            .path("/products/p1.json")
            .query_param("print", "silent");
        then.status(204);
    });

    db.delete_at(&path("products/p1")).await.unwrap();
    mock.assert();
}

#[tokio::test]
async fn test_write_failure_is_reported() {
    let server = MockServer::start();
    let db = test_db(&server);

    server.mock(|when, then| {
        when.method(PUT).path("/products/p1.json");
        then.status(500).body("upstream exploded");
    });

    let err = db
        .write_full(&path("products/p1"), &json!({ "name": "x" }))
        .await
        .unwrap_err();
    match err {
        StoreError::ApiError { status, message } => {
            assert_eq!(status, 500);
            assert!(message.starts_with("Write failed"));
        }
        other => panic!("Expected ApiError, got {:?}", other),
    }
}

#[tokio::test]
async fn test_reference_push_then_set() {
    let server = MockServer::start();
    let db = test_db(&server);

    let mock = server.mock(|when, then| {
        when.method(PUT).json_body(json!({ "name": "Chard" }));
        then.status(204);
    });

    let products = db.reference_at("products").unwrap();
    let new_ref = products.push().unwrap();
    let key = new_ref.key().unwrap().to_string();
    assert_eq!(key.len(), push_id::PUSH_ID_LEN);

    new_ref.set(&json!({ "name": "Chard" })).await.unwrap();
    mock.assert();

    // Keys from one client keep increasing.
    let next = products.push().unwrap();
    assert!(next.key().unwrap() > key.as_str());
}

#[tokio::test]
async fn test_session_token_is_sent_as_auth_param() {
    let server = MockServer::start();
    let auth = signed_in_auth(&server, chrono::Utc::now() + chrono::Duration::hours(1));

    let client = ClientBuilder::new(Client::new())
        .with(SessionTokenMiddleware::new(auth.clone()))
        .build();
    let db = FirebaseDatabase::new(client, &server.url("")).unwrap();

    let mock = server.mock(|when, then| {
        when.method(DELETE)
            .path("/products/p1.json")
            .query_param("auth", "id-token-1")
            .query_param("print", "silent");
        then.status(204);
    });

    db.delete_at(&path("products/p1")).await.unwrap();
    mock.assert();
}

fn signed_in_auth(server: &MockServer, expires_at: chrono::DateTime<chrono::Utc>) -> FirebaseAuth {
    let auth = FirebaseAuth::new_with_client(
        ClientBuilder::new(Client::new()).build(),
        "test-key",
        server.url("/v1"),
        server.url("/v1/token"),
    );
    auth.session().replace(Some(Session {
        uid: "uid-1".into(),
        email: None,
        id_token: "id-token-1".into(),
        refresh_token: "refresh-1".into(),
        expires_at,
    }));
    auth
}

#[tokio::test]
async fn test_expired_session_token_is_refreshed_before_request() {
    let server = MockServer::start();
    let auth = signed_in_auth(&server, chrono::Utc::now() - chrono::Duration::hours(2));

    let refresh = server.mock(|when, then| {
        when.method(POST)
            .path("/v1/token")
            .body("grant_type=refresh_token&refresh_token=refresh-1");
        then.status(200)
            .header("content-type", "application/json")
            .json_body(json!({
                "expires_in": "3600",
                "token_type": "Bearer",
                "refresh_token": "refresh-2",
                "id_token": "id-token-2",
                "user_id": "uid-1"
            }));
    });
    let patch = server.mock(|when, then| {
        when.method(PATCH)
            .path("/products/p1.json")
            .query_param("auth", "id-token-2")
            .json_body(json!({ "availability": false }));
        then.status(200).json_body(json!({ "availability": false }));
    });

    let client = ClientBuilder::new(Client::new())
        .with(SessionTokenMiddleware::new(auth.clone()))
        .build();
    let db = FirebaseDatabase::new(client, &server.url("")).unwrap();

    db.write_partial(&path("products/p1"), &fields(json!({ "availability": false })))
        .await
        .unwrap();

    refresh.assert();
    patch.assert();
    assert_eq!(auth.current_session().unwrap().id_token, "id-token-2");
}

#[tokio::test]
async fn test_rejected_refresh_fails_the_request() {
    let server = MockServer::start();
    let auth = signed_in_auth(&server, chrono::Utc::now() - chrono::Duration::hours(2));

    server.mock(|when, then| {
        when.method(POST).path("/v1/token");
        then.status(400)
            .header("content-type", "application/json")
            .json_body(json!({ "error": { "code": 400, "message": "TOKEN_EXPIRED" } }));
    });
    let delete = server.mock(|when, then| {
        when.method(DELETE).path("/products/p1.json");
        then.status(204);
    });

    let client = ClientBuilder::new(Client::new())
        .with(SessionTokenMiddleware::new(auth.clone()))
        .build();
    let db = FirebaseDatabase::new(client, &server.url("")).unwrap();

    let err = db.delete_at(&path("products/p1")).await.unwrap_err();
    assert!(matches!(err, StoreError::MiddlewareError(_)));
    assert_eq!(auth.current_session(), None);
    delete.assert_calls(0);
}

#[tokio::test]
async fn test_memory_store_write_and_fetch() {
    let store = MemoryStore::new();
    assert!(store.fetch_all(&path("products")).await.unwrap().is_none());

    store
        .write_full(&path("products/p1"), &json!({ "name": "Kale", "availability": true }))
        .await
        .unwrap();
    store
        .write_full(&path("products/p2"), &json!({ "name": "Leek", "availability": true }))
        .await
        .unwrap();

    let children = store.fetch_all(&path("products")).await.unwrap().unwrap();
    assert_eq!(children.keys().collect::<Vec<_>>(), vec!["p1", "p2"]);
}

#[tokio::test]
async fn test_memory_store_partial_write_merges() {
    let store = MemoryStore::with_data(json!({
        "products": { "p1": { "name": "Kale", "price": 3.5, "availability": true } }
    }));

    store
        .write_partial(&path("products/p1"), &fields(json!({ "availability": false, "price": null })))
        .await
        .unwrap();

    assert_eq!(
        store.snapshot("products/p1").unwrap(),
        Some(json!({ "name": "Kale", "availability": false }))
    );
}

#[tokio::test]
async fn test_memory_store_delete_prunes_empty_parents() {
    let store = MemoryStore::with_data(json!({
        "products": { "p1": { "name": "Kale" } },
        "settings": { "theme": "dark" }
    }));

    store.delete_at(&path("products/p1")).await.unwrap();
    assert_eq!(store.snapshot("products").unwrap(), None);
    assert_eq!(store.snapshot("settings/theme").unwrap(), Some(json!("dark")));

    // Deleting something that is not there is fine.
    store.delete_at(&path("products/missing/deeper")).await.unwrap();
    store.delete_at(&path("settings/theme/deeper")).await.unwrap();
    assert_eq!(store.snapshot("settings/theme").unwrap(), Some(json!("dark")));
}

#[tokio::test]
async fn test_memory_store_array_children() {
    let store = MemoryStore::with_data(json!({ "tags": ["a", null, "c"] }));
    let children = store.fetch_all(&path("tags")).await.unwrap().unwrap();
    assert_eq!(children.get("0"), Some(&json!("a")));
    assert_eq!(children.get("1"), None);
    assert_eq!(children.get("2"), Some(&json!("c")));
}

#[tokio::test]
async fn test_memory_store_generates_distinct_keys() {
    let store = MemoryStore::new();
    let root = path("products");
    let a = store.generate_key(&root).unwrap();
    let b = store.generate_key(&root).unwrap();
    assert_ne!(a, b);
    assert!(a < b);
    // Generating a key writes nothing.
    assert!(store.fetch_all(&root).await.unwrap().is_none());
}
