use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::Query;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, patch, post};
use axum::{Json, Router};
use mitsumori_core::{AuthEvent, Credential, Quote, QuoteId};
use serde_json::{json, Value};
use supabase_sdk::{Backend, BackendError, SupabaseClient, SupabaseConfig};

const API_KEY: &str = "anon-key";

async fn serve(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}")
}

fn client(base: &str) -> SupabaseClient {
    SupabaseClient::new(SupabaseConfig::new(base, API_KEY).unwrap()).unwrap()
}

fn token_body(access_token: &str, expires_in: i64) -> Value {
    json!({
        "access_token": access_token,
        "token_type": "bearer",
        "expires_in": expires_in,
        "refresh_token": format!("refresh-{access_token}"),
        "user": {"id": "user-1", "email": "a@b.com"}
    })
}

fn password_grant() -> Router {
    Router::new().route(
        "/auth/v1/token",
        post(|| async { Json(token_body("access-1", 3600)) }),
    )
}

#[tokio::test]
async fn sign_in_sends_api_key_and_stores_session() {
    let seen: Arc<Mutex<Option<(HeaderMap, HashMap<String, String>, Value)>>> =
        Arc::new(Mutex::new(None));
    let captured = seen.clone();
    let router = Router::new().route(
        "/auth/v1/token",
        post(
            move |headers: HeaderMap,
                  Query(params): Query<HashMap<String, String>>,
                  Json(body): Json<Value>| {
                let captured = captured.clone();
                async move {
                    *captured.lock().unwrap() = Some((headers, params, body));
                    Json(token_body("access-1", 3600))
                }
            },
        ),
    );
    let client = client(&serve(router).await);

    let session = client
        .sign_in(&Credential::new("a@b.com", "pw123456"))
        .await
        .unwrap();
    assert_eq!(session.user_id, "user-1");
    assert_eq!(session.access_token, "access-1");
    assert_eq!(session.email.as_deref(), Some("a@b.com"));
    assert_eq!(client.current_session(), Some(session));

    let (headers, params, body) = seen.lock().unwrap().take().expect("request seen");
    assert_eq!(headers["apikey"], API_KEY);
    assert_eq!(headers["authorization"], format!("Bearer {API_KEY}"));
    assert_eq!(params["grant_type"], "password");
    assert_eq!(body, json!({"email": "a@b.com", "password": "pw123456"}));
}

#[tokio::test]
async fn list_quotes_filters_by_owner_and_sorts_newest_first() {
    let seen: Arc<Mutex<Option<(HeaderMap, HashMap<String, String>)>>> =
        Arc::new(Mutex::new(None));
    let captured = seen.clone();
    let router = password_grant().route(
        "/rest/v1/quotes",
        get(
            move |headers: HeaderMap, Query(params): Query<HashMap<String, String>>| {
                let captured = captured.clone();
                async move {
                    *captured.lock().unwrap() = Some((headers, params));
                    Json(json!([
                        {"id": 1, "quote": "Carpe diem", "author": "Horace",
                         "user_id": "user-1", "created_at": "2024-03-01T10:00:00+00:00"},
                        {"id": 2, "quote": "Memento mori", "author": "Unknown",
                         "reference": null, "user_id": "user-1",
                         "created_at": "2024-03-02T10:00:00+00:00"}
                    ]))
                }
            },
        ),
    );
    let client = client(&serve(router).await);
    client
        .sign_in(&Credential::new("a@b.com", "pw123456"))
        .await
        .unwrap();

    let quotes = client.list_quotes("user-1").await.unwrap();
    let ids: Vec<&str> = quotes
        .iter()
        .filter_map(|quote| quote.id.as_ref().map(QuoteId::as_str))
        .collect();
    assert_eq!(ids, ["2", "1"]);
    assert_eq!(quotes[1].owner_id.as_deref(), Some("user-1"));

    let (headers, params) = seen.lock().unwrap().take().expect("request seen");
    assert_eq!(headers["authorization"], "Bearer access-1");
    assert_eq!(params["user_id"], "eq.user-1");
    assert_eq!(params["order"], "created_at.desc");
}

#[tokio::test]
async fn crud_without_session_is_rejected_locally() {
    let client = client("http://127.0.0.1:9");
    assert!(matches!(
        client.list_quotes("user-1").await,
        Err(BackendError::Auth(_))
    ));
}

#[tokio::test]
async fn rejected_credentials_are_auth_errors() {
    let router = Router::new().route(
        "/auth/v1/token",
        post(|| async {
            (
                StatusCode::BAD_REQUEST,
                Json(json!({
                    "error": "invalid_grant",
                    "error_description": "Invalid login credentials"
                })),
            )
        }),
    );
    let client = client(&serve(router).await);
    let err = client
        .sign_in(&Credential::new("a@b.com", "wrong-password"))
        .await
        .unwrap_err();
    assert!(matches!(err, BackendError::Auth(detail) if detail == "Invalid login credentials"));
    assert!(client.current_session().is_none());
}

#[tokio::test]
async fn patch_matching_no_rows_is_not_found() {
    let router = password_grant().route(
        "/rest/v1/quotes",
        patch(|Query(params): Query<HashMap<String, String>>| async move {
            assert_eq!(params["id"], "eq.42");
            Json(json!([]))
        }),
    );
    let client = client(&serve(router).await);
    client
        .sign_in(&Credential::new("a@b.com", "pw123456"))
        .await
        .unwrap();

    let quote = Quote::new("Carpe diem", "Horace").with_id(42_i64);
    assert!(matches!(
        client.update_quote(&quote).await,
        Err(BackendError::NotFound(_))
    ));
}

#[tokio::test]
async fn unreachable_backend_is_a_network_error() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let client = client(&format!("http://{addr}"));
    assert!(matches!(
        client.sign_in(&Credential::new("a@b.com", "pw123456")).await,
        Err(BackendError::Network(_))
    ));
}

#[tokio::test]
async fn failed_sign_out_keeps_the_session() {
    let router = password_grant().route(
        "/auth/v1/logout",
        post(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "boom") }),
    );
    let client = client(&serve(router).await);
    client
        .sign_in(&Credential::new("a@b.com", "pw123456"))
        .await
        .unwrap();

    assert!(client.sign_out().await.is_err());
    assert!(client.current_session().is_some());
}

#[tokio::test]
async fn sign_out_clears_the_session_quietly() {
    let router = password_grant().route(
        "/auth/v1/logout",
        post(|| async { StatusCode::NO_CONTENT }),
    );
    let client = client(&serve(router).await);
    client
        .sign_in(&Credential::new("a@b.com", "pw123456"))
        .await
        .unwrap();
    let mut events = client.auth_events();

    client.sign_out().await.unwrap();
    assert!(client.current_session().is_none());
    assert!(events.try_recv().is_err());
}

#[tokio::test]
async fn short_lived_tokens_are_refreshed_in_the_background() {
    let router = Router::new().route(
        "/auth/v1/token",
        post(|Query(params): Query<HashMap<String, String>>| async move {
            match params.get("grant_type").map(String::as_str) {
                Some("refresh_token") => Json(token_body("access-2", 3600)),
                _ => Json(token_body("access-1", 1)),
            }
        }),
    );
    let client = client(&serve(router).await);
    let mut events = client.auth_events();
    client
        .sign_in(&Credential::new("a@b.com", "pw123456"))
        .await
        .unwrap();
    assert!(matches!(events.recv().await, Ok(AuthEvent::SignedIn(_))));

    let refreshed = tokio::time::timeout(Duration::from_secs(5), events.recv())
        .await
        .expect("refresh within timeout")
        .unwrap();
    match refreshed {
        AuthEvent::TokenRefreshed(session) => {
            assert_eq!(session.access_token, "access-2");
            assert_eq!(session.user_id, "user-1");
        }
        other => panic!("expected refresh, got {other:?}"),
    }
    assert_eq!(
        client.current_session().map(|session| session.access_token),
        Some("access-2".to_string())
    );
}
