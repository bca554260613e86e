//! Router-level tests for the three HTTP endpoints.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use tower::ServiceExt;

use docpost_core::config::{
    Config, ScheduleConfig, SchedulesConfig, SenderConfig, ServerConfig, SmtpConfig,
};
use docpost_notify::token::{self, UnsubscribeEvent, UnsubscribeMode};
use docpost_notify::{
    CommentsPref, Directory, DocInfo, DocPrefs, MemoryDirectory, TemplateRenderer,
};
use docpost_server::{build_router, AppState};

fn test_config() -> Config {
    Config {
        server: ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
            cors_origin: "*".to_string(),
        },
        smtp: SmtpConfig {
            host: None,
            port: None,
            tls: None,
        },
        sender: SenderConfig {
            name: "Docpost".to_string(),
            email: "notifications@example.com".to_string(),
            doc_notifications_from: None,
            doc_notifications_reply_to: None,
        },
        schedules: SchedulesConfig {
            doc_change: ScheduleConfig {
                first_delay_ms: 60_000,
                throttle_ms: 300_000,
            },
            comment: ScheduleConfig {
                first_delay_ms: 30_000,
                throttle_ms: 180_000,
            },
        },
        home_url: "https://docs.example.com".to_string(),
        worker_count: 0,
    }
}

/// Doc "d1" with Eve (5) granted access; Zoe (6) exists but has none.
async fn app() -> (Router, Arc<MemoryDirectory>) {
    let directory = Arc::new(MemoryDirectory::new());
    directory
        .add_doc(DocInfo {
            id: "d1".to_string(),
            name: "Budget 2026".to_string(),
            url_id: None,
        })
        .await;
    directory.add_regular_user(5, "Eve", "eve@example.com").await;
    directory.add_regular_user(6, "Zoe", "zoe@example.com").await;
    directory.grant("d1", 5).await;

    let state = Arc::new(AppState {
        directory: directory.clone(),
        pages: TemplateRenderer::new(),
        config: test_config(),
    });
    (build_router(state), directory)
}

fn get(uri: &str, user: Option<i64>) -> Request<Body> {
    let mut builder = Request::builder().uri(uri);
    if let Some(user) = user {
        builder = builder.header("x-user-id", user.to_string());
    }
    builder.body(Body::empty()).unwrap()
}

fn post(uri: &str, user: Option<i64>, body: &str) -> Request<Body> {
    let mut builder = Request::builder().method("POST").uri(uri);
    if let Some(user) = user {
        builder = builder.header("x-user-id", user.to_string());
    }
    builder
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn body_string(response: axum::response::Response) -> String {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

fn unsubscribe_uri(token: &str) -> String {
    format!("/notifications-unsubscribe?token={}", urlencoding::encode(token))
}

// ── Health ───────────────────────────────────────────────────────

#[tokio::test]
async fn health_answers_ok() {
    let (app, _) = app().await;
    let response = app.oneshot(get("/health", None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(body_string(response).await.contains("\"ok\""));
}

// ── Notifications config ─────────────────────────────────────────

#[tokio::test]
async fn config_requires_identity() {
    let (app, _) = app().await;
    let response = app
        .oneshot(get("/api/docs/d1/notifications-config", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn config_requires_doc_access() {
    let (app, _) = app().await;
    let response = app
        .oneshot(get("/api/docs/d1/notifications-config", Some(6)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn config_unknown_doc_is_404() {
    let (app, _) = app().await;
    let response = app
        .oneshot(get("/api/docs/nope/notifications-config", Some(5)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert!(body_string(response).await.contains("error"));
}

#[tokio::test]
async fn config_returns_both_bundles() {
    let (app, directory) = app().await;
    directory
        .set_doc_defaults(
            "d1",
            DocPrefs {
                doc_changes: Some(true),
                comments: None,
            },
        )
        .await;
    directory
        .set_user_prefs(
            "d1",
            5,
            DocPrefs {
                doc_changes: None,
                comments: Some(CommentsPref::None),
            },
        )
        .await;

    let response = app
        .oneshot(get("/api/docs/d1/notifications-config", Some(5)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json: serde_json::Value =
        serde_json::from_str(&body_string(response).await).unwrap();
    assert_eq!(json["docDefaults"]["docChanges"], true);
    assert_eq!(json["currentUser"]["comments"], "none");
}

#[tokio::test]
async fn config_write_replaces_named_bundles() {
    let (app, directory) = app().await;
    let response = app
        .oneshot(post(
            "/api/docs/d1/notifications-config",
            Some(5),
            r#"{"currentUser": {"docChanges": true, "comments": "all"}}"#,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_string(response).await, "null");

    let bundle = directory.prefs("d1", 5).await.unwrap();
    assert_eq!(bundle.current_user.doc_changes, Some(true));
    assert_eq!(bundle.current_user.comments, Some(CommentsPref::All));
    // Doc defaults were not named in the body, so they are untouched.
    assert_eq!(bundle.doc_defaults, DocPrefs::default());
}

#[tokio::test]
async fn config_write_rejects_unknown_fields() {
    let (app, directory) = app().await;
    let response = app
        .oneshot(post(
            "/api/docs/d1/notifications-config",
            Some(5),
            r#"{"currentUser": {"docChanges": true, "push": true}}"#,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(body_string(response).await.contains("error"));
    // Nothing was written.
    let bundle = directory.prefs("d1", 5).await.unwrap();
    assert_eq!(bundle.current_user, DocPrefs::default());
}

#[tokio::test]
async fn config_write_rejects_invalid_enum() {
    let (app, _) = app().await;
    let response = app
        .oneshot(post(
            "/api/docs/d1/notifications-config",
            Some(5),
            r#"{"currentUser": {"comments": "sometimes"}}"#,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

// ── Unsubscribe ──────────────────────────────────────────────────

#[tokio::test]
async fn unsubscribe_fully_silences_comments() {
    let (app, directory) = app().await;
    directory
        .set_doc_defaults(
            "d1",
            DocPrefs {
                doc_changes: None,
                comments: Some(CommentsPref::All),
            },
        )
        .await;
    let key = directory.ensure_unsubscribe_key(5).await.unwrap();
    let token = token::sign(
        "d1",
        "u-5",
        UnsubscribeEvent::Comments,
        Some(UnsubscribeMode::Full),
        &key,
        chrono::Utc::now(),
    );

    let response = app.oneshot(get(&unsubscribe_uri(&token), None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let page = body_string(response).await;
    assert!(page.contains("Budget 2026"));
    assert!(page.contains("https://docs.example.com/docs/d1"));

    let bundle = directory.prefs("d1", 5).await.unwrap();
    assert_eq!(bundle.current_user.comments, Some(CommentsPref::None));
    // Document defaults untouched.
    assert_eq!(bundle.doc_defaults.comments, Some(CommentsPref::All));
}

#[tokio::test]
async fn unsubscribe_normal_drops_to_relevant() {
    let (app, directory) = app().await;
    let key = directory.ensure_unsubscribe_key(5).await.unwrap();
    let token = token::sign(
        "d1",
        "u-5",
        UnsubscribeEvent::Comments,
        Some(UnsubscribeMode::Normal),
        &key,
        chrono::Utc::now(),
    );

    let response = app.oneshot(get(&unsubscribe_uri(&token), None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let bundle = directory.prefs("d1", 5).await.unwrap();
    assert_eq!(bundle.current_user.comments, Some(CommentsPref::Relevant));
}

#[tokio::test]
async fn unsubscribe_doc_changes_clears_flag() {
    let (app, directory) = app().await;
    directory
        .set_user_prefs(
            "d1",
            5,
            DocPrefs {
                doc_changes: Some(true),
                comments: Some(CommentsPref::All),
            },
        )
        .await;
    let key = directory.ensure_unsubscribe_key(5).await.unwrap();
    let token = token::sign(
        "d1",
        "u-5",
        UnsubscribeEvent::DocChanges,
        None,
        &key,
        chrono::Utc::now(),
    );

    let response = app.oneshot(get(&unsubscribe_uri(&token), None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let bundle = directory.prefs("d1", 5).await.unwrap();
    assert_eq!(bundle.current_user.doc_changes, Some(false));
    // The other field of the override bundle is preserved.
    assert_eq!(bundle.current_user.comments, Some(CommentsPref::All));
}

#[tokio::test]
async fn unsubscribe_garbage_token_is_a_friendly_200() {
    let (app, _) = app().await;
    let forged = unsubscribe_uri("d1|u-5|comments|full|20991231|AAAA");
    for uri in [
        "/notifications-unsubscribe",
        "/notifications-unsubscribe?token=",
        "/notifications-unsubscribe?token=not-a-token",
        forged.as_str(),
    ] {
        let response = app.clone().oneshot(get(uri, None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK, "{uri}");
        assert!(body_string(response).await.contains("didn't work"), "{uri}");
    }
}

#[tokio::test]
async fn unsubscribe_unknown_ref_is_indistinguishable() {
    let (app, directory) = app().await;
    let key = directory.ensure_unsubscribe_key(5).await.unwrap();
    // Signed with a real key but naming a ref that doesn't exist.
    let token = token::sign(
        "d1",
        "u-404",
        UnsubscribeEvent::Comments,
        None,
        &key,
        chrono::Utc::now(),
    );
    let response = app.oneshot(get(&unsubscribe_uri(&token), None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(body_string(response).await.contains("didn't work"));
}

#[tokio::test]
async fn unsubscribe_expired_token_fails_politely() {
    let (app, directory) = app().await;
    let key = directory.ensure_unsubscribe_key(5).await.unwrap();
    let minted = chrono::Utc::now() - chrono::Duration::days(90);
    let token = token::sign(
        "d1",
        "u-5",
        UnsubscribeEvent::Comments,
        Some(UnsubscribeMode::Full),
        &key,
        minted,
    );

    let response = app.oneshot(get(&unsubscribe_uri(&token), None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(body_string(response).await.contains("didn't work"));
    // And nothing was written.
    let bundle = directory.prefs("d1", 5).await.unwrap();
    assert_eq!(bundle.current_user, DocPrefs::default());
}

#[tokio::test]
async fn unsubscribe_never_mailed_user_fails_politely() {
    let (app, _) = app().await;
    // Zoe has no unsubscribe key; no token of hers can verify.
    let token = token::sign(
        "d1",
        "u-6",
        UnsubscribeEvent::Comments,
        None,
        "some-made-up-key",
        chrono::Utc::now(),
    );
    let response = app.oneshot(get(&unsubscribe_uri(&token), None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(body_string(response).await.contains("didn't work"));
}
