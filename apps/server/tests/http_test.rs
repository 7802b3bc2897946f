//! Integration tests for the HTTP surface
//!
//! Exercises session creation, the identity checks of the connect endpoint
//! and the health probes through the full router.

mod common;

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use chrono::Utc;

use watchparty_server::models::Peer;

use common::{app, json_body, registry, send};

fn put_session(body: &str) -> Request<Body> {
    Request::builder()
        .method("PUT")
        .uri("/api/session")
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

#[tokio::test]
async fn test_create_session_with_playlist() {
    let registry = registry();
    let response = send(
        app(&registry),
        put_session(r#"{"id":"movie-night","playlist":[{"video":"a.mp4"}]}"#),
    )
    .await;

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["id"], "movie-night");
    assert_eq!(body["playlistIndex"], 0);
    assert_eq!(body["paused"], true);
    assert_eq!(body["playhead"], 0.0);
    assert_eq!(body["playlist"][0]["video"], "a.mp4");
    assert!(registry.get("movie-night").is_some());
}

#[tokio::test]
async fn test_create_session_with_empty_body() {
    let registry = registry();
    let response = send(
        app(&registry),
        Request::builder()
            .method("PUT")
            .uri("/api/session")
            .body(Body::empty())
            .unwrap(),
    )
    .await;

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["playlistIndex"], -1);
    assert_eq!(body["id"].as_str().map(str::len), Some(22));
    assert_eq!(registry.len(), 1);
}

#[tokio::test]
async fn test_create_session_rejects_bad_input() {
    let registry = registry();

    let response = send(app(&registry), put_session("{oops")).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["code"], "INVALID_BODY");

    let response = send(
        app(&registry),
        put_session(r#"{"id":"no spaces","playlist":[{"video":""}]}"#),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert_eq!(body["code"], "VALIDATION_ERROR");
    assert_eq!(body["details"]["issues"].as_array().map(Vec::len), Some(2));

    assert!(registry.is_empty());
}

#[tokio::test]
async fn test_connect_unknown_session_is_not_found() {
    let registry = registry();
    let response = send(
        app(&registry),
        get("/api/session/missing/connect?nickname=alice&color=red"),
    )
    .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(json_body(response).await["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_connect_with_unknown_token_is_forbidden() {
    let registry = registry();
    let session = registry.create_session(Some("room".into()), vec![]).unwrap();
    session.add_peer(Peer::new("alice", "red", Utc::now()));

    let response = send(app(&registry), get("/api/session/room/connect?resume=forged")).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(session.peer_count(), 1);
}

#[tokio::test]
async fn test_connect_new_peer_requires_nickname() {
    let registry = registry();
    let session = registry.create_session(Some("room".into()), vec![]).unwrap();

    let response = send(app(&registry), get("/api/session/room/connect?color=red")).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["code"], "MISSING_FIELD");
    assert_eq!(session.peer_count(), 0);
}

#[tokio::test]
async fn test_connect_without_upgrade_registers_nobody() {
    let registry = registry();
    let session = registry.create_session(Some("room".into()), vec![]).unwrap();

    let response = send(
        app(&registry),
        get("/api/session/room/connect?nickname=alice&color=red"),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["code"], "UPGRADE_REQUIRED");
    assert_eq!(session.peer_count(), 0);
}

#[tokio::test]
async fn test_health_endpoints() {
    let registry = registry();
    registry.create_session(None, vec![]).unwrap();

    let response = send(app(&registry), get("/health")).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert_eq!(&body[..], b"OK");

    let response = send(app(&registry), get("/health/live")).await;
    assert_eq!(json_body(response).await["status"], "alive");

    let response = send(app(&registry), get("/health/ready")).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["status"], "ready");
    assert_eq!(body["sessions"], 1);
    assert_eq!(body["peers"], 0);
}

#[tokio::test]
async fn test_unknown_route_is_not_found() {
    let registry = registry();
    let response = send(app(&registry), get("/api/nothing-here")).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
