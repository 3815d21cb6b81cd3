///! REST client tests against a local axum server that records every request.
///!
///! Each test checks the method, path, headers and body the client sends, and
///! how the server's answer is mapped back.
///!
///! Run with: `cargo test --test http_test`
use axum::Router;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::header::AUTHORIZATION;
use axum::http::{HeaderMap, Method, StatusCode, Uri};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;

use chat_client::api::{HttpMessageService, RemoteMessageService};
use chat_client::auth::TokenStore;
use chat_client::error::ChatError;
use chat_client::models::ai::ImproveStyle;

/// A request as the server saw it.
#[derive(Debug, Clone)]
struct Recorded {
    method: Method,
    path: String,
    query: Option<String>,
    authorization: Option<String>,
    /// `Value::Null` when the request had no body.
    body: Value,
}

/// Canned answers keyed by `"METHOD /path"`. Unknown routes answer `200 {}`.
#[derive(Default)]
struct MockApi {
    replies: Mutex<HashMap<String, (StatusCode, String)>>,
    requests: Mutex<Vec<Recorded>>,
}

impl MockApi {
    fn reply(&self, route: &str, status: StatusCode, body: impl Into<String>) {
        self.replies
            .lock()
            .unwrap()
            .insert(route.to_string(), (status, body.into()));
    }

    /// The last request made to `path`.
    fn request_to(&self, path: &str) -> Recorded {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|r| r.path == path)
            .cloned()
            .unwrap_or_else(|| panic!("no request to {path}"))
    }
}

async fn record(
    State(api): State<Arc<MockApi>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> (StatusCode, String) {
    let route = format!("{method} {}", uri.path());
    api.requests.lock().unwrap().push(Recorded {
        method,
        path: uri.path().to_string(),
        query: uri.query().map(str::to_string),
        authorization: headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
        body: serde_json::from_slice(&body).unwrap_or(Value::Null),
    });

    api.replies
        .lock()
        .unwrap()
        .get(&route)
        .cloned()
        .unwrap_or((StatusCode::OK, "{}".to_string()))
}

/// Helper: start the mock API and a client pointed at it.
async fn serve(token: Option<&str>) -> (Arc<MockApi>, HttpMessageService) {
    let api = Arc::new(MockApi::default());
    let app = Router::new().fallback(record).with_state(api.clone());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base_url = format!("http://{}/api/v1/", listener.local_addr().unwrap());
    tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });

    let tokens = TokenStore::new(token.map(str::to_string));
    (api, HttpMessageService::new(base_url, tokens))
}

// ── History and chat details ──

#[tokio::test]
async fn test_fetch_messages_sends_page_and_bearer() {
    let (api, service) = serve(Some("tok")).await;
    api.reply(
        "GET /api/v1/message/c1",
        StatusCode::OK,
        json!({
            "messages": [
                { "_id": "m1", "sender": { "_id": "bob" }, "content": "hi" },
                { "content": "no id" },
                { "_id": "m2", "sender": "me", "content": "yo" }
            ],
            "totalPages": 3
        })
        .to_string(),
    );

    let page = service.fetch_messages("c1", 2).await.unwrap();

    let ids: Vec<_> = page.messages.iter().map(|m| m.id.as_str()).collect();
    assert_eq!(ids, vec!["m1", "m2"]);
    assert_eq!(page.total_pages, Some(3));

    let request = api.request_to("/api/v1/message/c1");
    assert_eq!(request.method, Method::GET);
    assert_eq!(request.query.as_deref(), Some("page=2"));
    assert_eq!(request.authorization.as_deref(), Some("Bearer tok"));
}

#[tokio::test]
async fn test_chat_details_unwraps_envelope() {
    let (api, service) = serve(Some("tok")).await;
    api.reply(
        "GET /api/v1/chat/c1",
        StatusCode::OK,
        json!({
            "chat": { "name": "Team", "groupChat": true, "members": [{ "_id": "me" }, "bob"] }
        })
        .to_string(),
    );

    let details = service.chat_details("c1").await.unwrap();

    assert_eq!(details.chat_id, "c1");
    assert_eq!(details.name.as_deref(), Some("Team"));
    assert_eq!(details.members, vec!["me", "bob"]);
}

#[tokio::test]
async fn test_requests_without_token_carry_no_authorization() {
    let (api, service) = serve(None).await;

    service.mark_seen("m1").await.unwrap();

    assert_eq!(api.request_to("/api/v1/message/m1/seen").authorization, None);
}

// ── Edit and delete ──

#[tokio::test]
async fn test_update_message_requires_success() {
    let (api, service) = serve(Some("tok")).await;
    api.reply(
        "PUT /api/v1/message/m1",
        StatusCode::OK,
        json!({
            "success": true,
            "message": { "_id": "m1", "sender": "me", "content": "new", "updatedAt": "2024-05-01T10:05:00Z" }
        })
        .to_string(),
    );
    // Applied, but the returned message has no id.
    api.reply(
        "PUT /api/v1/message/m2",
        StatusCode::OK,
        json!({ "success": true, "message": { "content": "new" } }).to_string(),
    );
    api.reply(
        "PUT /api/v1/message/m3",
        StatusCode::OK,
        json!({ "success": false }).to_string(),
    );

    let updated = service.update_message("m1", "new").await.unwrap().unwrap();
    assert_eq!(updated.content.as_deref(), Some("new"));

    let request = api.request_to("/api/v1/message/m1");
    assert_eq!(request.method, Method::PUT);
    assert_eq!(request.body, json!({ "content": "new" }));

    assert_eq!(service.update_message("m2", "new").await, Ok(None));
    assert!(matches!(
        service.update_message("m3", "new").await,
        Err(ChatError::Rejected(_))
    ));
    // Unknown route answers `{}`: no success flag.
    assert!(matches!(
        service.update_message("m4", "new").await,
        Err(ChatError::Rejected(_))
    ));
}

#[tokio::test]
async fn test_delete_message_requires_success() {
    let (api, service) = serve(Some("tok")).await;
    api.reply(
        "DELETE /api/v1/message/m1",
        StatusCode::OK,
        json!({ "success": true }).to_string(),
    );
    api.reply("DELETE /api/v1/message/m2", StatusCode::OK, "");

    assert_eq!(service.delete_message("m1").await, Ok(()));
    assert_eq!(api.request_to("/api/v1/message/m1").method, Method::DELETE);

    // An empty body reads as `{}`, which is not a success.
    assert!(matches!(
        service.delete_message("m2").await,
        Err(ChatError::Rejected(_))
    ));
}

// ── Receipts and reactions ──

#[tokio::test]
async fn test_receipts_accept_empty_bodies() {
    let (api, service) = serve(Some("tok")).await;
    api.reply("PUT /api/v1/message/m1/delivered", StatusCode::OK, "");
    api.reply("PUT /api/v1/message/m1/seen", StatusCode::OK, "");

    assert_eq!(service.mark_delivered("m1").await, Ok(()));
    assert_eq!(service.mark_seen("m1").await, Ok(()));

    for path in ["/api/v1/message/m1/delivered", "/api/v1/message/m1/seen"] {
        let request = api.request_to(path);
        assert_eq!(request.method, Method::PUT);
        assert_eq!(request.authorization.as_deref(), Some("Bearer tok"));
    }
}

#[tokio::test]
async fn test_reaction_endpoints() {
    let (api, service) = serve(Some("tok")).await;
    api.reply(
        "PUT /api/v1/reaction",
        StatusCode::OK,
        json!({ "reactions": [{ "emoji": "👍", "count": 2 }] }).to_string(),
    );
    api.reply("DELETE /api/v1/reaction/m1", StatusCode::OK, "");

    let summary = service.upsert_reaction("m1", "👍").await.unwrap().unwrap();
    assert_eq!(summary[0].emoji, "👍");
    assert_eq!(summary[0].count, 2);
    assert_eq!(
        api.request_to("/api/v1/reaction").body,
        json!({ "messageId": "m1", "emoji": "👍" })
    );

    assert_eq!(service.remove_reaction("m1").await, Ok(None));
    assert_eq!(api.request_to("/api/v1/reaction/m1").method, Method::DELETE);
}

// ── AI ──

#[tokio::test]
async fn test_ai_request_bodies() {
    let (api, service) = serve(Some("tok")).await;
    api.reply(
        "POST /api/v1/ai/smart-replies",
        StatusCode::OK,
        json!({ "suggestions": ["Yes", "No"] }).to_string(),
    );
    api.reply(
        "POST /api/v1/ai/summarize",
        StatusCode::OK,
        json!({ "summary": "They agreed." }).to_string(),
    );
    api.reply(
        "POST /api/v1/ai/chat",
        StatusCode::OK,
        json!({ "response": "Friday." }).to_string(),
    );
    api.reply(
        "POST /api/v1/ai/improve",
        StatusCode::OK,
        json!({ "improved": "Hey there!" }).to_string(),
    );
    api.reply(
        "POST /api/v1/ai/translate",
        StatusCode::OK,
        json!({ "translated": "hello" }).to_string(),
    );

    assert_eq!(service.smart_replies("c1").await.unwrap(), vec!["Yes", "No"]);
    assert_eq!(
        api.request_to("/api/v1/ai/smart-replies").body,
        json!({ "chatId": "c1" })
    );

    assert_eq!(
        service.summarize("c1", 50).await.unwrap().as_deref(),
        Some("They agreed.")
    );
    assert_eq!(
        api.request_to("/api/v1/ai/summarize").body,
        json!({ "chatId": "c1", "messageCount": 50 })
    );

    assert_eq!(
        service.ask("when?", Some("c1")).await.unwrap().as_deref(),
        Some("Friday.")
    );
    assert_eq!(
        api.request_to("/api/v1/ai/chat").body,
        json!({ "query": "when?", "chatId": "c1" })
    );

    assert_eq!(
        service
            .improve("hey", ImproveStyle::Casual)
            .await
            .unwrap()
            .as_deref(),
        Some("Hey there!")
    );
    assert_eq!(
        api.request_to("/api/v1/ai/improve").body,
        json!({ "message": "hey", "style": "casual" })
    );

    assert_eq!(
        service.translate("hola", "English").await.unwrap().as_deref(),
        Some("hello")
    );
    let request = api.request_to("/api/v1/ai/translate");
    assert_eq!(request.method, Method::POST);
    assert_eq!(
        request.body,
        json!({ "message": "hola", "targetLanguage": "English" })
    );
}

// ── Failures ──

#[tokio::test]
async fn test_error_statuses_carry_server_message() {
    let (api, service) = serve(Some("tok")).await;
    api.reply(
        "GET /api/v1/message/gone",
        StatusCode::NOT_FOUND,
        json!({ "success": false, "message": "Chat not found" }).to_string(),
    );
    api.reply(
        "GET /api/v1/chat/broken",
        StatusCode::INTERNAL_SERVER_ERROR,
        json!({ "error": "boom" }).to_string(),
    );
    api.reply(
        "PUT /api/v1/message/m1/seen",
        StatusCode::BAD_GATEWAY,
        "upstream down",
    );

    assert_eq!(
        service.fetch_messages("gone", 1).await,
        Err(ChatError::Status {
            status: 404,
            message: "Chat not found".into(),
        })
    );
    assert_eq!(
        service.chat_details("broken").await,
        Err(ChatError::Status {
            status: 500,
            message: "boom".into(),
        })
    );
    // No JSON error body: fall back to the reason phrase.
    assert_eq!(
        service.mark_seen("m1").await,
        Err(ChatError::Status {
            status: 502,
            message: "Bad Gateway".into(),
        })
    );
}

#[tokio::test]
async fn test_malformed_success_body_is_a_decode_error() {
    let (api, service) = serve(Some("tok")).await;
    api.reply("GET /api/v1/message/c1", StatusCode::OK, "<html>");

    assert!(matches!(
        service.fetch_messages("c1", 1).await,
        Err(ChatError::Decode(_))
    ));
}
