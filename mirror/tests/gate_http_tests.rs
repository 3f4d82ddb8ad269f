use axum::body::Body;
use axum::http::header::{AUTHORIZATION, WWW_AUTHENTICATE};
use axum::http::{Request, StatusCode};
use axum::response::Response;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use history::{MemoryWiki, UserRecord};
use mirror::server::{router, ORIGINAL_URI_HEADER};
use mirror::TransportGate;
use std::sync::Arc;
use tower::util::ServiceExt;

const PUSH_REFS: &str = "/E/info/refs?service=git-receive-pack";

fn create_app() -> axum::Router {
    let wiki = Arc::new(MemoryWiki::new());
    wiki.add_user(UserRecord::new("alice", "secret").with_edit_rights("E"));
    wiki.add_user(UserRecord::new("bob", "hunter2"));
    router(TransportGate::new(wiki.clone(), wiki))
}

fn basic(credentials: &str) -> String {
    format!("Basic {}", STANDARD.encode(credentials))
}

async fn send(uri: &str, authorization: Option<String>) -> Response {
    let mut request = Request::builder()
        .uri("/auth")
        .header(ORIGINAL_URI_HEADER, uri);
    if let Some(authorization) = authorization {
        request = request.header(AUTHORIZATION, authorization);
    }
    create_app()
        .oneshot(request.body(Body::empty()).unwrap())
        .await
        .unwrap()
}

async fn body_is_empty(response: Response) -> bool {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    bytes.is_empty()
}

#[tokio::test]
async fn test_push_without_credentials_is_challenged() {
    let response = send(PUSH_REFS, None).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(response.headers().get(WWW_AUTHENTICATE).unwrap(), "Basic");
    assert!(body_is_empty(response).await);
}

#[tokio::test]
async fn test_push_with_wrong_password_is_challenged() {
    let response = send(PUSH_REFS, Some(basic("bob:wrong"))).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(response.headers().get(WWW_AUTHENTICATE).unwrap(), "Basic");
}

#[tokio::test]
async fn test_push_with_unknown_user_is_challenged() {
    let response = send("/E/git-receive-pack", Some(basic("mallory:secret"))).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_push_with_malformed_header_is_challenged() {
    let response = send(PUSH_REFS, Some("Basic ???".to_string())).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(response.headers().contains_key(WWW_AUTHENTICATE));
}

#[tokio::test]
async fn test_push_without_edit_right_is_forbidden() {
    let response = send(PUSH_REFS, Some(basic("bob:hunter2"))).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert!(response.headers().get(WWW_AUTHENTICATE).is_none());
    assert!(body_is_empty(response).await);
}

#[tokio::test]
async fn test_authorized_push_is_allowed() {
    let response = send(PUSH_REFS, Some(basic("alice:secret"))).await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = send("/E/git-receive-pack", Some(basic("alice:secret"))).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_fetch_is_allowed_without_credentials() {
    let response = send("/E/info/refs?service=git-upload-pack", None).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().get(WWW_AUTHENTICATE).is_none());

    let response = send("/E/git-upload-pack", Some("Basic ???".to_string())).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_request_without_marker_is_not_handled() {
    let response = create_app()
        .oneshot(
            Request::builder()
                .uri("/E/info/refs?service=git-receive-pack")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert!(body_is_empty(response).await);
}

#[tokio::test]
async fn test_percent_encoded_push_is_challenged() {
    let response = send("/E/git%2Dreceive-pack", None).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(response.headers().get(WWW_AUTHENTICATE).unwrap(), "Basic");

    let response = send("/E/git%2Dreceive-pack", Some(basic("alice:secret"))).await;
    assert_eq!(response.status(), StatusCode::OK);
}
