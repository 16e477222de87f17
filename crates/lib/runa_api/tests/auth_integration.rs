//! End-to-end tests against the router with an in-memory store.

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::header::{AUTHORIZATION, CONTENT_TYPE, COOKIE, SET_COOKIE};
use axum::http::{Request, Response, StatusCode};
use runa_api::{AppState, config::ApiConfig};
use runa_core::auth::password::Hasher;
use runa_core::models::User;
use runa_core::store::counting::CountingStore;
use runa_core::store::memory::MemoryStore;
use runa_core::store::{Store, UserLookup};
use tower::ServiceExt;

struct Harness {
    app: Router,
    store: CountingStore<MemoryStore>,
}

fn harness() -> Harness {
    let store = CountingStore::new(MemoryStore::new());
    let state = AppState::with_hasher(
        Arc::new(store.clone()),
        ApiConfig::default(),
        Hasher::with_params(1024, 1, 1).expect("hasher params"),
    );
    Harness {
        app: runa_api::router(state),
        store,
    }
}

fn json_request(method: &str, uri: &str, client: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(CONTENT_TYPE, "application/json")
        .header("x-forwarded-for", client)
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn send(app: &Router, req: Request<Body>) -> Response<Body> {
    app.clone().oneshot(req).await.expect("request")
}

async fn body_json(resp: Response<Body>) -> serde_json::Value {
    let body = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("parse JSON")
}

/// Value of the refresh cookie set on `resp`.
fn session_cookie(resp: &Response<Body>) -> String {
    let header = resp
        .headers()
        .get(SET_COOKIE)
        .expect("set-cookie")
        .to_str()
        .unwrap();
    let pair = header.split(';').next().unwrap();
    let (name, value) = pair.split_once('=').unwrap();
    assert_eq!(name, "__session");
    value.to_string()
}

async fn register(app: &Router, client: &str, username: &str, password: &str) -> String {
    let resp = send(
        app,
        json_request(
            "POST",
            "/api/users",
            client,
            serde_json::json!({"username": username, "password": password}),
        ),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    session_cookie(&resp)
}

async fn access_token(app: &Router, client: &str, cookie: &str) -> String {
    let req = Request::builder()
        .method("POST")
        .uri("/api/accesstoken")
        .header(COOKIE, format!("__session={cookie}"))
        .header("x-forwarded-for", client)
        .body(Body::empty())
        .unwrap();
    let resp = send(app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let json = body_json(resp).await;
    json["accesstoken"].as_str().expect("accesstoken").to_string()
}

fn authed(method: &str, uri: &str, authorization: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(AUTHORIZATION, authorization)
        .header("x-forwarded-for", "10.0.0.1")
        .body(Body::empty())
        .unwrap()
}

fn authed_json(
    method: &str,
    uri: &str,
    authorization: &str,
    body: serde_json::Value,
) -> Request<Body> {
    let mut req = json_request(method, uri, "10.0.0.1", body);
    req.headers_mut()
        .insert(AUTHORIZATION, authorization.parse().unwrap());
    req
}

async fn login(app: &Router, client: &str, username: &str, password: &str) -> Response<Body> {
    send(
        app,
        json_request(
            "POST",
            "/api/login",
            client,
            serde_json::json!({"username": username, "password": password}),
        ),
    )
    .await
}

async fn refresh_status(app: &Router, cookie: &str) -> StatusCode {
    let req = Request::builder()
        .method("POST")
        .uri("/api/accesstoken")
        .header(COOKIE, format!("__session={cookie}"))
        .body(Body::empty())
        .unwrap();
    send(app, req).await.status()
}

async fn issue_api_token(app: &Router, access: &str) -> String {
    let resp = send(app, authed("POST", "/api/apitoken", access)).await;
    assert_eq!(resp.status(), StatusCode::OK);
    body_json(resp).await["token"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn login_then_access_token_then_me() {
    let h = harness();
    register(&h.app, "10.0.0.1", "alice", "correct horse").await;

    let resp = send(
        &h.app,
        json_request(
            "POST",
            "/api/login",
            "10.0.0.1",
            serde_json::json!({"username": "alice", "password": "correct horse"}),
        ),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let cookie_header = resp.headers()[SET_COOKIE].to_str().unwrap().to_string();
    assert!(cookie_header.contains("HttpOnly"));
    assert!(cookie_header.contains("Path=/"));
    let cookie = session_cookie(&resp);
    let login_body = body_json(resp).await;
    assert_eq!(login_body["username"], "alice");

    let token = access_token(&h.app, "10.0.0.1", &cookie).await;

    let resp = send(&h.app, authed("GET", "/api/users/me", &format!("AccessToken {token}"))).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let me = body_json(resp).await;
    assert_eq!(me["username"], "alice");
    assert!(me.get("password_hash").is_none());
}

#[tokio::test]
async fn repeated_login_failures_are_rejected_without_store_access() {
    let h = harness();
    register(&h.app, "10.0.0.2", "alice", "correct horse").await;

    let bad = || {
        json_request(
            "POST",
            "/api/login",
            "10.0.0.2",
            serde_json::json!({"username": "alice", "password": "wrong password"}),
        )
    };
    for _ in 0..5 {
        let resp = send(&h.app, bad()).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    h.store.reset();
    let resp = send(&h.app, bad()).await;
    assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);
    assert!(resp.headers().contains_key("retry-after"));
    assert_eq!(h.store.total_calls(), 0);

    // A different client keeps its own budget.
    let resp = send(
        &h.app,
        json_request(
            "POST",
            "/api/login",
            "10.0.0.3",
            serde_json::json!({"username": "alice", "password": "correct horse"}),
        ),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);
}

#[tokio::test]
async fn successful_logins_do_not_consume_the_budget() {
    let h = harness();
    register(&h.app, "10.0.0.4", "bob", "hunter2hunter2").await;
    for _ in 0..8 {
        let resp = send(
            &h.app,
            json_request(
                "POST",
                "/api/login",
                "10.0.0.4",
                serde_json::json!({"username": "bob", "password": "hunter2hunter2"}),
            ),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::OK);
    }
}

#[tokio::test]
async fn api_token_authenticates_with_basic_scheme() {
    let h = harness();
    let cookie = register(&h.app, "10.0.0.5", "carol", "correct horse").await;
    let access = access_token(&h.app, "10.0.0.5", &cookie).await;

    let resp = send(&h.app, authed("POST", "/api/apitoken", &format!("AccessToken {access}"))).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let api_token = body_json(resp).await["token"].as_str().unwrap().to_string();

    let resp = send(&h.app, authed("GET", "/api/users/me", &format!("Basic {api_token}"))).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_json(resp).await["username"], "carol");

    let resp = send(&h.app, authed("GET", "/api/users/me", "Basic not-a-real-token")).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(resp).await["error"], "unauthorized");

    // Rotating the token invalidates the old one immediately.
    let resp = send(&h.app, authed("POST", "/api/apitoken", &format!("AccessToken {access}"))).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let resp = send(&h.app, authed("GET", "/api/users/me", &format!("Basic {api_token}"))).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn garbage_access_token_is_invalid_access() {
    let h = harness();
    let resp = send(&h.app, authed("GET", "/api/users/me", "AccessToken not.a.jwt")).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(resp).await["error"], "invalid_access_key");
}

#[tokio::test]
async fn missing_or_unknown_scheme_is_unauthorized() {
    let h = harness();
    let req = Request::builder()
        .uri("/api/users/me")
        .body(Body::empty())
        .unwrap();
    let resp = send(&h.app, req).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(resp).await["error"], "unauthorized");

    let resp = send(&h.app, authed("GET", "/api/users/me", "Bearer abc")).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(resp).await["error"], "unauthorized");
}

#[tokio::test]
async fn logout_invalidates_the_refresh_cookie() {
    let h = harness();
    let cookie = register(&h.app, "10.0.0.6", "dave", "correct horse").await;

    let req = Request::builder()
        .method("POST")
        .uri("/api/logout")
        .header(COOKIE, format!("__session={cookie}"))
        .body(Body::empty())
        .unwrap();
    let resp = send(&h.app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(session_cookie(&resp).is_empty());

    let req = Request::builder()
        .method("POST")
        .uri("/api/accesstoken")
        .header(COOKIE, format!("__session={cookie}"))
        .body(Body::empty())
        .unwrap();
    let resp = send(&h.app, req).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn duplicate_registration_conflicts() {
    let h = harness();
    register(&h.app, "10.0.0.7", "erin", "correct horse").await;
    let resp = send(
        &h.app,
        json_request(
            "POST",
            "/api/users",
            "10.0.0.8",
            serde_json::json!({"username": "Erin", "password": "correct horse"}),
        ),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::CONFLICT);

    let resp = send(&h.app, authed("GET", "/api/users/erin", "")).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let resp = send(&h.app, authed("GET", "/api/users/nobody", "")).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn pages_are_private_to_their_owner() {
    let h = harness();
    let alice = register(&h.app, "10.0.1.1", "alice", "correct horse").await;
    let mallory = register(&h.app, "10.0.1.2", "mallory", "correct horse").await;
    let alice = format!("AccessToken {}", access_token(&h.app, "10.0.1.1", &alice).await);
    let mallory = format!("AccessToken {}", access_token(&h.app, "10.0.1.2", &mallory).await);

    let mut req = json_request(
        "POST",
        "/api/pages",
        "10.0.1.1",
        serde_json::json!({"title": "notes", "data": {"blocks": []}}),
    );
    req.headers_mut()
        .insert(AUTHORIZATION, alice.parse().unwrap());
    let resp = send(&h.app, req).await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let page_id = body_json(resp).await["uid"].as_str().unwrap().to_string();

    let uri = format!("/api/pages/{page_id}");
    let resp = send(&h.app, authed("GET", &uri, &alice)).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_json(resp).await["title"], "notes");

    let resp = send(&h.app, authed("GET", &uri, &mallory)).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    let resp = send(&h.app, authed("DELETE", &uri, &mallory)).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    let resp = send(&h.app, authed("DELETE", &uri, &alice)).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let resp = send(&h.app, authed("GET", &uri, &alice)).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn sessions_list_hides_token_values() {
    let h = harness();
    let cookie = register(&h.app, "10.0.2.1", "frank", "correct horse").await;
    let access = format!("AccessToken {}", access_token(&h.app, "10.0.2.1", &cookie).await);

    let resp = send(&h.app, authed("GET", "/api/sessions", &access)).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let sessions = body_json(resp).await;
    let list = sessions.as_array().unwrap();
    assert_eq!(list.len(), 1);
    assert!(list[0].get("token").is_none());
    let id = list[0]["id"].as_str().unwrap().to_string();

    let resp = send(&h.app, authed("DELETE", &format!("/api/sessions/{id}"), &access)).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let resp = send(&h.app, authed("DELETE", &format!("/api/sessions/{id}"), &access)).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn password_change_revokes_every_session() {
    let h = harness();
    let cookie = register(&h.app, "10.0.3.1", "grace", "correct horse").await;
    let old_access = format!("AccessToken {}", access_token(&h.app, "10.0.3.1", &cookie).await);

    let resp = send(
        &h.app,
        authed_json(
            "POST",
            "/api/users/me",
            &old_access,
            serde_json::json!({
                "new_password": "battery staple",
                "current_password": "correct horse",
            }),
        ),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);

    assert_eq!(refresh_status(&h.app, &cookie).await, StatusCode::UNAUTHORIZED);
    let resp = send(&h.app, authed("GET", "/api/users/me", &old_access)).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(resp).await["error"], "invalid_access_key");

    let resp = login(&h.app, "10.0.3.1", "grace", "correct horse").await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    let resp = login(&h.app, "10.0.3.1", "grace", "battery staple").await;
    assert_eq!(resp.status(), StatusCode::OK);
    let cookie = session_cookie(&resp);
    let access = format!("AccessToken {}", access_token(&h.app, "10.0.3.1", &cookie).await);
    let resp = send(&h.app, authed("GET", "/api/users/me", &access)).await;
    assert_eq!(resp.status(), StatusCode::OK);
}

#[tokio::test]
async fn wrong_current_password_changes_nothing() {
    let h = harness();
    let cookie = register(&h.app, "10.0.3.2", "heidi", "correct horse").await;
    let access = format!("AccessToken {}", access_token(&h.app, "10.0.3.2", &cookie).await);

    let resp = send(
        &h.app,
        authed_json(
            "POST",
            "/api/users/me",
            &access,
            serde_json::json!({
                "display_name": "Heidi",
                "current_password": "not my password",
            }),
        ),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(refresh_status(&h.app, &cookie).await, StatusCode::OK);
    let stored = h
        .store
        .get_user(UserLookup::Name("heidi"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.display_name, "heidi");
}

#[tokio::test]
async fn deleting_the_account_removes_everything() {
    let h = harness();
    let cookie = register(&h.app, "10.0.3.3", "ivan", "correct horse").await;
    let access = format!("AccessToken {}", access_token(&h.app, "10.0.3.3", &cookie).await);
    let api_token = format!("Basic {}", issue_api_token(&h.app, &access).await);

    let resp = send(&h.app, authed("GET", "/api/users/me", &api_token)).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let uid = body_json(resp).await["uid"].as_str().unwrap().to_string();

    let resp = send(
        &h.app,
        authed_json(
            "POST",
            "/api/pages",
            &access,
            serde_json::json!({"title": "diary", "data": {}}),
        ),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let page_id = body_json(resp).await["uid"].as_str().unwrap().to_string();

    let resp = send(
        &h.app,
        authed_json(
            "DELETE",
            "/api/users/me",
            &access,
            serde_json::json!({"current_password": "correct horse"}),
        ),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(session_cookie(&resp).is_empty());

    let resp = send(&h.app, authed("GET", "/api/users/me", &api_token)).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    let resp = send(&h.app, authed("GET", "/api/users/me", &access)).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(refresh_status(&h.app, &cookie).await, StatusCode::UNAUTHORIZED);

    let uid = uid.parse().unwrap();
    assert!(h.store.get_user(UserLookup::Id(uid)).await.unwrap().is_none());
    assert!(h.store.get_page(page_id.parse().unwrap()).await.unwrap().is_none());
    let resp = send(&h.app, authed("GET", "/api/users/ivan", "")).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn legacy_hash_is_upgraded_on_login() {
    let h = harness();
    let legacy = User::new("judy", bcrypt::hash("correct horse", 4).unwrap());
    h.store.create_user(&legacy).await.unwrap();

    let resp = login(&h.app, "10.0.3.4", "judy", "correct horse").await;
    assert_eq!(resp.status(), StatusCode::OK);

    let stored = h
        .store
        .get_user(UserLookup::Id(legacy.uid))
        .await
        .unwrap()
        .unwrap();
    assert!(stored.password_hash.starts_with("$argon2id$"));

    let resp = login(&h.app, "10.0.3.4", "judy", "correct horse").await;
    assert_eq!(resp.status(), StatusCode::OK);
}

#[tokio::test]
async fn profile_edit_is_visible_through_api_token() {
    let h = harness();
    let cookie = register(&h.app, "10.0.3.5", "karl", "correct horse").await;
    let access = format!("AccessToken {}", access_token(&h.app, "10.0.3.5", &cookie).await);
    let api_token = format!("Basic {}", issue_api_token(&h.app, &access).await);

    // Warm the token cache.
    let resp = send(&h.app, authed("GET", "/api/users/me", &api_token)).await;
    assert_eq!(body_json(resp).await["display_name"], "karl");

    let resp = send(
        &h.app,
        authed_json(
            "POST",
            "/api/users/me",
            &api_token,
            serde_json::json!({
                "display_name": "Karl K.",
                "current_password": "correct horse",
            }),
        ),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = send(&h.app, authed("GET", "/api/users/me", &api_token)).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_json(resp).await["display_name"], "Karl K.");
}

#[tokio::test]
async fn login_keeps_a_profile_edit_made_in_between() {
    let h = harness();
    let cookie = register(&h.app, "10.0.3.6", "lena", "correct horse").await;
    let access = format!("AccessToken {}", access_token(&h.app, "10.0.3.6", &cookie).await);

    let resp = send(
        &h.app,
        authed_json(
            "POST",
            "/api/users/me",
            &access,
            serde_json::json!({
                "display_name": "Lena",
                "current_password": "correct horse",
            }),
        ),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);

    h.store.reset();
    let resp = login(&h.app, "10.0.3.6", "lena", "correct horse").await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(h.store.calls("record_login"), 1);
    assert_eq!(h.store.calls("edit_user"), 0);

    let resp = send(&h.app, authed("GET", "/api/users/me", &access)).await;
    assert_eq!(body_json(resp).await["display_name"], "Lena");
}

#[tokio::test]
async fn page_order_is_stored_per_scope() {
    let h = harness();
    let cookie = register(&h.app, "10.0.3.7", "mona", "correct horse").await;
    let access = format!("AccessToken {}", access_token(&h.app, "10.0.3.7", &cookie).await);

    let resp = send(
        &h.app,
        authed_json(
            "POST",
            "/api/users/me/pageorder",
            &access,
            serde_json::json!({"pageorder": ["3", "1", "2"]}),
        ),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let me = body_json(resp).await;
    assert_eq!(me["page_order"]["general"], serde_json::json!(["3", "1", "2"]));

    let resp = send(
        &h.app,
        authed_json(
            "POST",
            "/api/users/me/pageorder?scope=work",
            &access,
            serde_json::json!({"pageorder": ["7"]}),
        ),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = send(&h.app, authed("GET", "/api/users/me", &access)).await;
    let me = body_json(resp).await;
    assert_eq!(me["page_order"]["general"], serde_json::json!(["3", "1", "2"]));
    assert_eq!(me["page_order"]["work"], serde_json::json!(["7"]));

    let resp = send(
        &h.app,
        authed_json(
            "POST",
            "/api/users/me/pageorder?scope=",
            &access,
            serde_json::json!({"pageorder": []}),
        ),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}
