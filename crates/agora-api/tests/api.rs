use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tempfile::TempDir;
use tower::ServiceExt;
use uuid::Uuid;

use agora_api::{ApiConfig, AppStateInner, router};
use agora_db::Database;
use agora_db::models::NewPost;
use agora_gateway::Dispatcher;
use agora_media::{CompressionSettings, Storage};

const STAFF_EMAIL: &str = "desk@agora.test";

struct TestApp {
    router: Router,
    db: Arc<Database>,
    _media: TempDir,
}

async fn app() -> TestApp {
    let media = tempfile::tempdir().unwrap();
    let db = Arc::new(Database::open_in_memory().unwrap());
    let storage = Storage::new(media.path().to_path_buf(), "/media/").await.unwrap();
    let state = Arc::new(AppStateInner {
        db: db.clone(),
        dispatcher: Dispatcher::new(),
        storage,
        config: ApiConfig {
            jwt_secret: "integration-test-secret".into(),
            token_days: 7,
            staff_emails: vec![STAFF_EMAIL.into()],
            frontend_url: "https://agora.test".into(),
            compression: CompressionSettings::default(),
        },
    });
    TestApp {
        router: router(state),
        db,
        _media: media,
    }
}

async fn send(app: &TestApp, method: &str, uri: &str, token: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
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
    let response = app.router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

/// Registers an account and returns `(token, account id)`.
async fn register(app: &TestApp, email: &str) -> (String, Uuid) {
    let (status, body) = send(
        app,
        "POST",
        "/acc/api/auth/register",
        None,
        Some(json!({ "email": email, "password": "correct horse", "full_name": "Test User" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);
    let token = body["data"]["token"].as_str().unwrap().to_string();
    let id = body["data"]["acc_id"].as_str().unwrap().parse().unwrap();
    (token, id)
}

fn seed_post(app: &TestApp, owner: Uuid) -> String {
    let post_id = agora_db::queries::short_id();
    app.db
        .create_post(
            &NewPost {
                post_id: post_id.clone(),
                user_id: owner,
                title: "Used drilling rig".into(),
                category_id: None,
                location: Some("Lagos".into()),
                price: Some("12000".into()),
                description: Some("Well maintained.".into()),
            },
            &[],
        )
        .unwrap();
    post_id
}

#[tokio::test]
async fn register_login_and_duplicate_email() {
    let app = app().await;
    register(&app, "ada@agora.test").await;

    let (status, body) = send(
        &app,
        "POST",
        "/acc/api/auth/login",
        None,
        Some(json!({ "email": "ada@agora.test", "password": "correct horse" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert!(body["data"]["token"].as_str().is_some_and(|t| !t.is_empty()));

    let (status, body) = send(
        &app,
        "POST",
        "/acc/api/auth/login",
        None,
        Some(json!({ "email": "ada@agora.test", "password": "wrong password" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["success"], false);

    let (status, body) = send(
        &app,
        "POST",
        "/acc/api/auth/register",
        None,
        Some(json!({ "email": "ada@agora.test", "password": "another one", "full_name": "Ada" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "An account with this email already exists.");
}

#[tokio::test]
async fn protected_routes_need_a_token() {
    let app = app().await;
    let (status, body) = send(&app, "GET", "/api/v1/profile", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["success"], false);
    assert_eq!(body["requires_verification"], false);

    let (status, _) = send(&app, "GET", "/api/v1.1/conversations", Some("not-a-jwt"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn like_toggles_between_two_calls() {
    let app = app().await;
    let (_, owner) = register(&app, "owner@agora.test").await;
    let (token, _) = register(&app, "fan@agora.test").await;
    let post_id = seed_post(&app, owner);
    let uri = format!("/api/v1.0/posts/{}/like", post_id);

    let (status, body) = send(&app, "POST", &uri, Some(&token), None).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["is_liked"], true);
    assert_eq!(body["data"]["likes_count"], 1);
    assert_eq!(body["message"], "Post liked successfully");

    let (status, body) = send(&app, "POST", &uri, Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["is_liked"], false);
    assert_eq!(body["data"]["likes_count"], 0);
}

#[tokio::test]
async fn replies_cannot_be_nested() {
    let app = app().await;
    let (token, owner) = register(&app, "author@agora.test").await;
    let post_id = seed_post(&app, owner);
    let uri = format!("/api/v1.0/posts/{}/comments/create", post_id);

    let (status, top) = send(&app, "POST", &uri, Some(&token), Some(json!({ "content": "Still available?" }))).await;
    assert_eq!(status, StatusCode::CREATED);
    let top_id = top["data"]["comment_id"].as_str().unwrap().to_string();

    let (status, reply) = send(
        &app,
        "POST",
        &uri,
        Some(&token),
        Some(json!({ "content": "Yes it is.", "parent": top_id })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let reply_id = reply["data"]["comment_id"].as_str().unwrap().to_string();

    let (status, body) = send(
        &app,
        "POST",
        &uri,
        Some(&token),
        Some(json!({ "content": "Great.", "parent": reply_id })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Replies cannot be nested.");

    let (status, body) = send(&app, "GET", &format!("/api/v1.0/posts/{}/comments", post_id), None, None).await;
    assert_eq!(status, StatusCode::OK);
    let comments = body["data"].as_array().unwrap();
    assert_eq!(comments.len(), 1);
    assert_eq!(comments[0]["replies"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn reports_are_unique_per_reporter_and_item() {
    let app = app().await;
    let (_, owner) = register(&app, "seller@agora.test").await;
    let (token, _) = register(&app, "watcher@agora.test").await;
    let (other, _) = register(&app, "bystander@agora.test").await;
    let post_id = seed_post(&app, owner);

    let report = json!({
        "category_name": "scam",
        "reason": "Asks for payment up front.",
        "reported_item_type": "post",
        "reported_item_id": post_id,
    });
    let (status, body) = send(&app, "POST", "/api/v1.4/reports/create", Some(&token), Some(report.clone())).await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);
    let report_id = body["data"]["report_id"].as_str().unwrap().to_string();
    assert!(report_id.starts_with("LST-"));
    assert_eq!(body["data"]["status"], "pending");

    let (status, body) = send(&app, "POST", "/api/v1.4/reports/create", Some(&token), Some(report)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["existing_report_id"], report_id.as_str());

    let (status, _) = send(
        &app,
        "POST",
        "/api/v1.4/reports/create",
        Some(&token),
        Some(json!({
            "category_name": "scam",
            "reason": "Fake.",
            "reported_item_type": "listing",
            "reported_item_id": post_id,
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(
        &app,
        "POST",
        "/api/v1.4/reports/create",
        Some(&token),
        Some(json!({
            "category_name": "not-a-category",
            "reason": "Fake.",
            "reported_item_type": "profile",
            "reported_item_id": Uuid::new_v4(),
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let uri = format!("/api/v1.4/reports/{}", report_id);
    let (status, _) = send(&app, "GET", &uri, Some(&other), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, body) = send(&app, "GET", &format!("{}/item", uri), Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["type"], "post");

    let (status, _) = send(&app, "GET", "/api/v1.4/admin/reports", Some(&token), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn staff_review_stamps_the_reviewer() {
    let app = app().await;
    let (_, owner) = register(&app, "seller@agora.test").await;
    let (token, _) = register(&app, "watcher@agora.test").await;
    let (staff, staff_id) = register(&app, STAFF_EMAIL).await;
    let post_id = seed_post(&app, owner);

    let (_, body) = send(
        &app,
        "POST",
        "/api/v1.4/reports/create",
        Some(&token),
        Some(json!({
            "category_name": "spam",
            "reason": "Posted ten times.",
            "reported_item_type": "post",
            "reported_item_id": post_id,
        })),
    )
    .await;
    let report_id = body["data"]["report_id"].as_str().unwrap().to_string();

    let (status, body) = send(&app, "GET", "/api/v1.4/admin/reports?status=pending&type=post", Some(&staff), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["count"], 1);

    let (status, body) = send(
        &app,
        "PATCH",
        &format!("/api/v1.4/admin/reports/{}/update", report_id),
        Some(&staff),
        Some(json!({ "status": "resolved", "action_taken": "content_removal" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "resolved");
    assert_eq!(body["data"]["reviewed_by"]["acc_id"], staff_id.to_string());
    assert!(!body["data"]["reviewed_at"].is_null());
}

#[tokio::test]
async fn news_desk_publishes_and_readers_count_views() {
    let app = app().await;
    let (reader, _) = register(&app, "reader@agora.test").await;
    let (staff, _) = register(&app, STAFF_EMAIL).await;

    let category = json!({ "name": "Upstream Oil" });
    let (status, _) = send(&app, "POST", "/api/v1.2/industry-news/admin/categories", Some(&reader), Some(category.clone())).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = send(&app, "POST", "/api/v1.2/industry-news/admin/categories", Some(&staff), Some(category)).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["slug"], "upstream-oil");
    let category_id = body["data"]["id"].as_i64().unwrap();

    let (status, body) = send(
        &app,
        "POST",
        "/api/v1.2/industry-news/admin/articles",
        Some(&staff),
        Some(json!({
            "title": "Rig count rises",
            "content": "Operators added rigs this week.",
            "category_id": category_id,
            "status": "published",
            "priority": "breaking",
            "country": "Nigeria",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);
    let published = body["data"]["article_id"].as_str().unwrap().to_string();

    let (_, body) = send(
        &app,
        "POST",
        "/api/v1.2/industry-news/admin/articles",
        Some(&staff),
        Some(json!({ "title": "Embargoed", "content": "Not yet." })),
    )
    .await;
    assert_eq!(body["data"]["status"], "draft");
    let draft = body["data"]["article_id"].as_str().unwrap().to_string();

    let (status, body) = send(&app, "GET", "/api/v1.2/industry-news?category=upstream-oil&country=niger", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["count"], 1);
    assert_eq!(body["data"]["results"][0]["is_breaking"], true);

    let (_, body) = send(&app, "GET", &format!("/api/v1.2/industry-news/{}", published), None, None).await;
    assert_eq!(body["data"]["views_count"], 1);
    let (_, body) = send(&app, "GET", &format!("/api/v1.2/industry-news/{}", published), None, None).await;
    assert_eq!(body["data"]["views_count"], 2);

    let (status, _) = send(&app, "GET", &format!("/api/v1.2/industry-news/{}", draft), None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, body) = send(&app, "GET", "/api/v1.2/industry-news/breaking", None, None).await;
    assert_eq!(body["data"].as_array().unwrap().len(), 1);

    let (_, body) = send(&app, "GET", "/api/v1.2/industry-news/search?q=rig", None, None).await;
    assert_eq!(body["data"]["results"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn direct_conversations_are_private_and_reused() {
    let app = app().await;
    let (alice, _) = register(&app, "alice@agora.test").await;
    let (_, bob) = register(&app, "bob@agora.test").await;
    let (mallory, _) = register(&app, "mallory@agora.test").await;

    let start = json!({ "participant_ids": [bob] });
    let (status, body) = send(&app, "POST", "/api/v1.1/conversations", Some(&alice), Some(start.clone())).await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);
    let conversation_id = body["data"]["conversation_id"].as_str().unwrap().to_string();
    assert_eq!(body["data"]["is_group"], false);

    let (status, body) = send(&app, "POST", "/api/v1.1/conversations", Some(&alice), Some(start)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["conversation_id"], conversation_id.as_str());

    let messages = format!("/api/v1.1/conversations/{}/messages", conversation_id);
    let (status, body) = send(&app, "POST", &messages, Some(&alice), Some(json!({ "content": "Is the rig still for sale?" }))).await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);
    assert_eq!(body["data"]["content"], "Is the rig still for sale?");

    let (status, body) = send(&app, "GET", &messages, Some(&alice), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["results"][0]["content"], "Is the rig still for sale?");

    let (status, _) = send(&app, "GET", &messages, Some(&mallory), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

/// Opens a 1:1 thread from `token` to `other` and returns its id.
async fn direct_conversation(app: &TestApp, token: &str, other: Uuid) -> String {
    let (status, body) = send(
        app,
        "POST",
        "/api/v1.1/conversations",
        Some(token),
        Some(json!({ "participant_ids": [other] })),
    )
    .await;
    assert!(status.is_success(), "{}", body);
    body["data"]["conversation_id"].as_str().unwrap().to_string()
}

async fn post_message(app: &TestApp, token: &str, conversation_id: &str, content: &str) -> String {
    let uri = format!("/api/v1.1/conversations/{}/messages", conversation_id);
    let (status, body) = send(app, "POST", &uri, Some(token), Some(json!({ "content": content }))).await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);
    body["data"]["message_id"].as_str().unwrap().to_string()
}

async fn unread_for(app: &TestApp, token: &str, conversation_id: &str) -> u64 {
    let (status, body) = send(app, "GET", "/api/v1.1/conversations", Some(token), None).await;
    assert_eq!(status, StatusCode::OK);
    body["data"]
        .as_array()
        .unwrap()
        .iter()
        .find(|c| c["conversation_id"] == conversation_id)
        .map(|c| c["unread_count"].as_u64().unwrap())
        .unwrap()
}

#[tokio::test]
async fn mark_read_clears_the_unread_count() {
    let app = app().await;
    let (alice, _) = register(&app, "alice@agora.test").await;
    let (bob, bob_id) = register(&app, "bob@agora.test").await;
    let conversation_id = direct_conversation(&app, &alice, bob_id).await;

    for text in ["Rig is in Warri", "Price is firm", "Can ship next week"] {
        post_message(&app, &alice, &conversation_id, text).await;
    }
    assert_eq!(unread_for(&app, &bob, &conversation_id).await, 3);
    assert_eq!(unread_for(&app, &alice, &conversation_id).await, 0);

    let uri = format!("/api/v1.1/conversations/{}/mark-read", conversation_id);
    let (status, body) = send(&app, "POST", &uri, Some(&bob), None).await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert!(body["data"]["message_id"].is_string());
    assert_eq!(unread_for(&app, &bob, &conversation_id).await, 0);
}

#[tokio::test]
async fn message_hide_is_per_viewer_and_idempotent() {
    let app = app().await;
    let (alice, _) = register(&app, "alice@agora.test").await;
    let (bob, bob_id) = register(&app, "bob@agora.test").await;
    let conversation_id = direct_conversation(&app, &alice, bob_id).await;
    let first = post_message(&app, &alice, &conversation_id, "First offer").await;
    post_message(&app, &alice, &conversation_id, "Second offer").await;

    let hide = format!("/api/v1.1/messages/{}/delete", first);
    let (status, body) = send(&app, "DELETE", &hide, Some(&bob), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Message deleted successfully.");
    let (status, body) = send(&app, "DELETE", &hide, Some(&bob), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Message already deleted.");

    let messages = format!("/api/v1.1/conversations/{}/messages", conversation_id);
    let (_, body) = send(&app, "GET", &messages, Some(&bob), None).await;
    assert_eq!(body["data"]["count"], 1);
    let (_, body) = send(&app, "GET", &messages, Some(&alice), None).await;
    assert_eq!(body["data"]["count"], 2);

    let restore = format!("/api/v1.1/messages/{}/restore", first);
    let (status, _) = send(&app, "POST", &restore, Some(&bob), None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = send(&app, "POST", &restore, Some(&bob), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (_, body) = send(&app, "GET", &messages, Some(&bob), None).await;
    assert_eq!(body["data"]["count"], 2);
}

#[tokio::test]
async fn reactions_toggle_on_repeat() {
    let app = app().await;
    let (alice, _) = register(&app, "alice@agora.test").await;
    let (bob, bob_id) = register(&app, "bob@agora.test").await;
    let conversation_id = direct_conversation(&app, &alice, bob_id).await;
    let message = post_message(&app, &alice, &conversation_id, "Deal?").await;

    let react = format!("/api/v1.1/messages/{}/react", message);
    let love = json!({ "reaction": "love" });
    let (status, body) = send(&app, "POST", &react, Some(&bob), Some(love.clone())).await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["data"]["action"], "added");
    let (_, body) = send(&app, "POST", &react, Some(&bob), Some(love)).await;
    assert_eq!(body["data"]["action"], "removed");

    let (status, _) = send(&app, "POST", &react, Some(&bob), Some(json!({ "reaction": "meh" }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn only_the_creator_removes_other_group_members() {
    let app = app().await;
    let (alice, _) = register(&app, "alice@agora.test").await;
    let (bob, bob_id) = register(&app, "bob@agora.test").await;
    let (carol, carol_id) = register(&app, "carol@agora.test").await;
    let (_, dave_id) = register(&app, "dave@agora.test").await;

    let (status, body) = send(
        &app,
        "POST",
        "/api/v1.1/conversations",
        Some(&alice),
        Some(json!({ "participant_ids": [bob_id, carol_id], "name": "Crew" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);
    assert_eq!(body["data"]["is_group"], true);
    let group = body["data"]["conversation_id"].as_str().unwrap().to_string();
    let add = format!("/api/v1.1/conversations/{}/participants/add", group);
    let remove = format!("/api/v1.1/conversations/{}/participants/remove", group);
    let participants = format!("/api/v1.1/conversations/{}/participants", group);

    let (status, _) = send(&app, "POST", &remove, Some(&bob), Some(json!({ "participant_ids": [carol_id] }))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = send(&app, "POST", &add, Some(&bob), Some(json!({ "participant_ids": [dave_id] }))).await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["data"].as_array().unwrap().len(), 4);

    let (status, _) = send(&app, "POST", &remove, Some(&carol), Some(json!({ "participant_ids": [carol_id] }))).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = send(&app, "GET", &participants, Some(&carol), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = send(&app, "POST", &remove, Some(&alice), Some(json!({ "participant_ids": [bob_id] }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), 2);

    let direct = direct_conversation(&app, &alice, dave_id).await;
    let direct_add = format!("/api/v1.1/conversations/{}/participants/add", direct);
    let (status, _) = send(&app, "POST", &direct_add, Some(&alice), Some(json!({ "participant_ids": [bob_id] }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn follower_and_rating_pages() {
    let app = app().await;
    let (alice, alice_id) = register(&app, "alice@agora.test").await;
    let (bob, bob_id) = register(&app, "bob@agora.test").await;

    let (status, _) = send(&app, "POST", &format!("/api/v1/follow/{}", bob_id), Some(&alice), None).await;
    assert!(status.is_success());
    let (status, body) = send(&app, "GET", &format!("/api/v1/followers/{}", bob_id), Some(&alice), None).await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["data"]["count"], 1);
    let (_, body) = send(&app, "GET", "/api/v1/following", Some(&alice), None).await;
    assert_eq!(body["data"]["count"], 1);

    let rating = json!({ "rated": bob_id, "rating_count": 4, "review_content": "Fair seller" });
    let (status, body) = send(&app, "POST", "/api/v1/create/rating", Some(&alice), Some(rating)).await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);
    let (status, body) = send(&app, "GET", "/api/v1/ratings", Some(&bob), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["count"], 1);
    let (_, body) = send(&app, "GET", &format!("/api/v1/ratings/{}", alice_id), Some(&bob), None).await;
    assert_eq!(body["data"]["count"], 0);
}

#[tokio::test]
async fn ads_listing_hides_inactive_items() {
    let app = app().await;
    let (staff, _) = register(&app, STAFF_EMAIL).await;

    let (status, body) = send(
        &app,
        "POST",
        "/api/v1.3/ads-events/admin/categories",
        Some(&staff),
        Some(json!({ "name": "Trade Shows" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);
    assert_eq!(body["data"]["slug"], "trade-shows");
    let category_id = body["data"]["category_id"].clone();

    let (status, body) = send(
        &app,
        "POST",
        "/api/v1.3/ads-events/admin/items",
        Some(&staff),
        Some(json!({
            "title": "Offshore Expo",
            "type": "event",
            "category_id": category_id,
            "location": "Aberdeen",
            "start_date": "2099-03-01",
            "end_date": "2099-03-03",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);
    let item = body["data"]["ad_event_id"].as_str().unwrap().to_string();
    assert_eq!(body["data"]["is_upcoming"], true);

    let (_, body) = send(&app, "GET", "/api/v1.3/ads-events/upcoming-events", None, None).await;
    assert_eq!(body["data"]["count"], 1);

    let (status, _) = send(
        &app,
        "PATCH",
        &format!("/api/v1.3/ads-events/admin/items/{}", item),
        Some(&staff),
        Some(json!({ "status": "suspended" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send(&app, "GET", &format!("/api/v1.3/ads-events/{}", item), None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
