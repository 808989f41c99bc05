use axum::http::{StatusCode, header::CONTENT_RANGE};
use serde_json::{Value, json};
use std::sync::Arc;

mod common;
use common::{CountingCollection, encode, ids, send, setup_app, tickets};

#[tokio::test]
async fn test_find_returns_every_match_without_pager() {
    let app = setup_app(Arc::new(tickets()));

    let uri = format!(
        "/tickets/find?status=open&pagination={}",
        encode(&json!({"page": 1, "pageSize": 1}))
    );
    let (status, headers, body) = send(app, "GET", &uri, None).await;

    assert_eq!(status, StatusCode::OK);
    assert!(headers.get(CONTENT_RANGE).is_none());
    assert_eq!(ids(&body), vec!["t1", "t2", "t3", "t4"]);
}

#[tokio::test]
async fn test_find_ignores_invalid_pagination() {
    let app = setup_app(Arc::new(tickets()));

    let uri = format!("/tickets/find?pagination={}", encode(&json!({"page": -3})));
    let (status, _, body) = send(app, "GET", &uri, None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(ids(&body).len(), 5);
}

#[tokio::test]
async fn test_find_honors_sort_and_populations() {
    let app = setup_app(Arc::new(tickets()));

    let uri = format!(
        "/tickets/find?status=open&sort={}&populates={}",
        encode(&json!({"rank": -1})),
        encode(&json!(["author:name"]))
    );
    let (status, _, body) = send(app, "GET", &uri, None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(ids(&body), vec!["t4", "t3", "t2", "t1"]);
    assert_eq!(body[0]["author"], json!({"_id": "u2", "name": "Bob"}));
    assert_eq!(body[1]["author"], json!({"_id": "u1", "name": "Ada"}));
}

#[tokio::test]
async fn test_find_one_returns_first_match() {
    let app = setup_app(Arc::new(tickets()));

    let (status, _, body) = send(app, "GET", "/tickets/one?status=closed", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["_id"], "t5");
    assert_eq!(body["author"], "u1");
}

#[tokio::test]
async fn test_find_one_matches_numeric_query_value() {
    let app = setup_app(Arc::new(tickets()));

    let (status, _, body) = send(app, "GET", "/tickets/one?rank=4", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["_id"], "t4");
}

#[tokio::test]
async fn test_find_one_absent_is_null() {
    let app = setup_app(Arc::new(tickets()));

    let (status, _, body) = send(app, "GET", "/tickets/one?status=archived", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, Value::Null);
}

#[tokio::test]
async fn test_find_one_with_population_directive() {
    let app = setup_app(Arc::new(tickets()));

    let populates = json!([r"watchers:name -_id:active\:true:1", "author:name email"]);
    let uri = format!("/tickets/one?_id=t2&populates={}", encode(&populates));
    let (status, _, body) = send(app, "GET", &uri, None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["watchers"], json!([{"name": "Ada"}]));
    assert_eq!(
        body["author"],
        json!({"_id": "u2", "name": "Bob", "email": "bob@example.com"})
    );
}

#[tokio::test]
async fn test_population_match_excluding_reference_gives_null() {
    let app = setup_app(Arc::new(tickets()));

    let populates = json!([{"path": "author", "match": {"active": true}}]);
    let uri = format!("/tickets/one?_id=t2&populates={}", encode(&populates));
    let (status, _, body) = send(app, "GET", &uri, None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["author"], Value::Null);
}

#[tokio::test]
async fn test_malformed_directive_never_reaches_the_store() {
    let collection = Arc::new(CountingCollection::new(tickets()));
    let app = setup_app(collection.clone());

    let uri = format!("/tickets/one?populates={}", encode(&json!(["author:a:b:c:d"])));
    let (status, _, body) = send(app, "GET", &uri, None).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], 400);
    assert_eq!(collection.calls(), 0);
}
