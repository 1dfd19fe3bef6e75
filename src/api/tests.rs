//! Router tests driven through `tower::ServiceExt::oneshot`

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

use crate::api::{build_router, AppState};
use crate::app::build_state;
use crate::cache::{Cache, MemoryCache};
use crate::config::Config;
use crate::db::repositories::SqlxRbacRepository;
use crate::db::{create_test_pool, migrations};
use crate::services::RbacResolver;

struct TestApp {
    router: Router,
    _state: AppState,
}

struct TestResponse {
    status: StatusCode,
    headers: axum::http::HeaderMap,
    body: Value,
}

async fn setup_test_app_with(config: Config) -> TestApp {
    let pool = create_test_pool().await.expect("Failed to create test pool");
    migrations::run_migrations(&pool)
        .await
        .expect("Failed to run migrations");
    RbacResolver::new(SqlxRbacRepository::boxed(pool.clone()))
        .sync()
        .await
        .expect("Failed to sync rbac");

    let cache = Arc::new(Cache::Memory(MemoryCache::new()));
    let state = build_state(&config, pool, cache)
        .await
        .expect("Failed to build state");
    TestApp {
        router: build_router(state.clone(), &config.server),
        _state: state,
    }
}

async fn setup_test_app() -> TestApp {
    setup_test_app_with(Config::default()).await
}

impl TestApp {
    async fn send(&self, method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> TestResponse {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("Should read body");
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).expect("Should parse JSON")
        };
        TestResponse { status, headers, body }
    }

    async fn get(&self, uri: &str, token: Option<&str>) -> TestResponse {
        self.send(Method::GET, uri, token, None).await
    }

    /// Register and log in, returning the access token
    async fn sign_up(&self, username: &str) -> String {
        let registered = self
            .send(
                Method::POST,
                "/api/v1/auth/register",
                None,
                Some(json!({
                    "username": username,
                    "password": "password-1",
                    "plainPassword": "password-1",
                })),
            )
            .await;
        assert_eq!(registered.status, StatusCode::CREATED, "{}", registered.body);

        let login = self
            .send(
                Method::POST,
                "/api/v1/auth/login",
                None,
                Some(json!({ "credential": username, "password": "password-1" })),
            )
            .await;
        assert_eq!(login.status, StatusCode::OK, "{}", login.body);
        login.body["token"].as_str().unwrap().to_string()
    }
}

#[tokio::test]
async fn test_login_and_profile() {
    let app = setup_test_app().await;
    let token = app.sign_up("pincman").await;

    let profile = app.get("/api/v1/auth/profile", Some(&token)).await;
    assert_eq!(profile.status, StatusCode::OK);
    assert_eq!(profile.body["username"], "pincman");
    assert!(profile.body.get("password").is_none());

    let cookie_request = Request::builder()
        .uri("/api/v1/auth/profile")
        .header(header::COOKIE, format!("token={}", token))
        .body(Body::empty())
        .unwrap();
    let response = app.router.clone().oneshot(cookie_request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_missing_token_is_unauthorized() {
    let app = setup_test_app().await;
    let response = app.get("/api/v1/auth/profile", None).await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    assert_eq!(response.body["error"]["code"], "UNAUTHORIZED");

    let bogus = app.get("/api/v1/auth/profile", Some("not-a-token")).await;
    assert_eq!(bogus.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_register_validation_error() {
    let app = setup_test_app().await;
    let response = app
        .send(
            Method::POST,
            "/api/v1/auth/register",
            None,
            Some(json!({
                "username": "pincman",
                "password": "password-1",
                "plainPassword": "password-2",
            })),
        )
        .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.body["error"]["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn test_malformed_body_uses_error_envelope() {
    let app = setup_test_app().await;
    let request = Request::builder()
        .method(Method::POST)
        .uri("/api/v1/auth/login")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{"))
        .unwrap();
    let response = app.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
    assert!(body["error"]["details"]["reason"].is_string());
}

#[tokio::test]
async fn test_logout_revokes_token() {
    let app = setup_test_app().await;
    let token = app.sign_up("pincman").await;

    let logout = app.send(Method::POST, "/api/v1/auth/logout", Some(&token), None).await;
    assert_eq!(logout.status, StatusCode::OK);
    let after = app.get("/api/v1/auth/profile", Some(&token)).await;
    assert_eq!(after.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_expired_token_is_renewed_in_header() {
    let mut config = Config::default();
    config.auth.token_expired = 0;
    let app = setup_test_app_with(config).await;
    let token = app.sign_up("pincman").await;

    let response = app.get("/api/v1/auth/profile", Some(&token)).await;
    assert_eq!(response.status, StatusCode::OK);
    let renewed = response
        .headers
        .get("token")
        .and_then(|v| v.to_str().ok())
        .expect("renewed token header")
        .to_string();
    assert_ne!(renewed, token);

    // the old token was replaced
    let stale = app.get("/api/v1/auth/profile", Some(&token)).await;
    assert_eq!(stale.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_manage_routes_need_system_manage() {
    let app = setup_test_app().await;
    let admin = app.sign_up("the-admin").await;
    let member = app.sign_up("a-member").await;

    let roles = app.get("/api/v1/manage/rbac/roles", Some(&admin)).await;
    assert_eq!(roles.status, StatusCode::OK);
    let names: Vec<_> = roles.body.as_array().unwrap().iter().map(|r| r["name"].clone()).collect();
    assert!(names.contains(&json!("super-admin")));

    let denied = app.get("/api/v1/manage/rbac/roles", Some(&member)).await;
    assert_eq!(denied.status, StatusCode::FORBIDDEN);

    let anonymous = app.get("/api/v1/manage/users", None).await;
    assert_eq!(anonymous.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_post_ownership() {
    let app = setup_test_app().await;
    app.sign_up("the-admin").await;
    let alice = app.sign_up("alice").await;
    let bob = app.sign_up("bobby").await;

    let created = app
        .send(
            Method::POST,
            "/api/v1/posts",
            Some(&alice),
            Some(json!({ "title": "Hello", "body": "World", "publish": true })),
        )
        .await;
    assert_eq!(created.status, StatusCode::CREATED, "{}", created.body);
    let id = created.body["id"].as_str().unwrap().to_string();

    let listed = app.get("/api/v1/posts", None).await;
    assert_eq!(listed.body["meta"]["totalItems"], 1);
    let detail = app.get(&format!("/api/v1/posts/{}", id), None).await;
    assert_eq!(detail.body["title"], "Hello");

    let stolen = app
        .send(Method::DELETE, "/api/v1/posts", Some(&bob), Some(json!({ "ids": [id] })))
        .await;
    assert_eq!(stolen.status, StatusCode::FORBIDDEN);

    let trashed = app
        .send(
            Method::DELETE,
            "/api/v1/posts",
            Some(&alice),
            Some(json!({ "ids": [id], "trash": true })),
        )
        .await;
    assert_eq!(trashed.status, StatusCode::OK);
    assert_eq!(trashed.body["affected"], 1);

    let listed = app.get("/api/v1/posts", None).await;
    assert_eq!(listed.body["meta"]["totalItems"], 0);
    let gone = app.get(&format!("/api/v1/posts/{}", id), None).await;
    assert_eq!(gone.status, StatusCode::NOT_FOUND);

    let own = app.get("/api/v1/posts/owner?trashed=only", Some(&alice)).await;
    assert_eq!(own.body["meta"]["totalItems"], 1);
    let not_mine = app.get(&format!("/api/v1/posts/owner/{}", id), Some(&bob)).await;
    assert_eq!(not_mine.status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_comment_parent_must_share_post() {
    let app = setup_test_app().await;
    let token = app.sign_up("pincman").await;

    let mut post_ids = Vec::new();
    for title in ["First", "Second"] {
        let created = app
            .send(
                Method::POST,
                "/api/v1/posts",
                Some(&token),
                Some(json!({ "title": title, "body": "body", "publish": true })),
            )
            .await;
        post_ids.push(created.body["id"].as_str().unwrap().to_string());
    }

    let root = app
        .send(
            Method::POST,
            "/api/v1/comments",
            Some(&token),
            Some(json!({ "body": "root", "post": post_ids[0] })),
        )
        .await;
    assert_eq!(root.status, StatusCode::CREATED, "{}", root.body);

    let stray = app
        .send(
            Method::POST,
            "/api/v1/comments",
            Some(&token),
            Some(json!({ "body": "stray", "post": post_ids[1], "parent": root.body["id"] })),
        )
        .await;
    assert_eq!(stray.status, StatusCode::FORBIDDEN);
    assert_eq!(
        stray.body["error"]["message"],
        "Parent comment and child comment must belong same post!"
    );

    let tree = app
        .get(&format!("/api/v1/comments/tree?post={}", post_ids[0]), None)
        .await;
    assert_eq!(tree.body.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_music_catalog_routes() {
    let app = setup_test_app().await;
    let admin = app.sign_up("the-admin").await;

    let singer = app
        .send(
            Method::POST,
            "/api/v1/manage/singers",
            Some(&admin),
            Some(json!({ "name": "周杰伦", "sex": 1 })),
        )
        .await;
    assert_eq!(singer.status, StatusCode::CREATED, "{}", singer.body);
    let singer_id = singer.body["id"].as_i64().unwrap();

    let song = app
        .send(
            Method::POST,
            "/api/v1/manage/songs",
            Some(&admin),
            Some(json!({ "singerId": singer_id, "name": "晴天", "url": "/song/qingtian.mp3" })),
        )
        .await;
    assert_eq!(song.status, StatusCode::CREATED, "{}", song.body);

    let singers = app.get("/api/v1/singer/querySingerList", None).await;
    assert_eq!(singers.body.as_array().unwrap().len(), 1);

    let page = app
        .get(&format!("/api/v1/song/queryPageSong?singerId={}", singer_id), None)
        .await;
    assert_eq!(page.status, StatusCode::OK);
    assert_eq!(page.body["items"][0]["name"], "晴天");

    let missing = app
        .send(Method::DELETE, "/api/v1/manage/singers/9999", Some(&admin), None)
        .await;
    assert_eq!(missing.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_manage_categories_and_tags() {
    let app = setup_test_app().await;
    let admin = app.sign_up("the-admin").await;

    let parent = app
        .send(
            Method::POST,
            "/api/v1/manage/categories",
            Some(&admin),
            Some(json!({ "name": "Music" })),
        )
        .await;
    assert_eq!(parent.status, StatusCode::CREATED);
    let child = app
        .send(
            Method::POST,
            "/api/v1/manage/categories",
            Some(&admin),
            Some(json!({ "name": "Pop", "parent": parent.body["id"] })),
        )
        .await;
    assert_eq!(child.status, StatusCode::CREATED);

    let tree = app.get("/api/v1/categories/tree", None).await;
    assert_eq!(tree.body[0]["children"][0]["name"], "Pop");

    let tag = app
        .send(Method::POST, "/api/v1/manage/tags", Some(&admin), Some(json!({ "name": "rust" })))
        .await;
    assert_eq!(tag.status, StatusCode::CREATED);
    let duplicate = app
        .send(Method::POST, "/api/v1/manage/tags", Some(&admin), Some(json!({ "name": "rust" })))
        .await;
    assert_eq!(duplicate.status, StatusCode::CONFLICT);
}
