//! Integration tests for the PropChat HTTP surface.
//!
//! Each test builds its own router over an in-memory database, the local
//! auth provider and the keyword intent parser, then drives it with
//! `tower::ServiceExt::oneshot`.

use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

use propchat_api::handlers::HealthResponse;
use propchat_api::{create_router, AppState};
use propchat_chat::{ChatOrchestrator, KeywordIntentParser};
use propchat_core::config::{AuthConfig, PropChatConfig};
use propchat_core::error::PropChatError;
use propchat_core::services::MessageStore;
use propchat_core::types::{Message, MessageRole, NewMessage, PropertyRecord};
use propchat_storage::{Database, LocalAuthProvider, MessageRepository, PropertyRepository};

// =============================================================================
// Helpers
// =============================================================================

const EMAIL: &str = "agent@example.com";
const PASSWORD: &str = "secret-pass";

struct Harness {
    state: AppState,
    auth: Arc<LocalAuthProvider>,
    messages: Arc<MessageRepository>,
    properties: Arc<PropertyRepository>,
    token: String,
}

impl Harness {
    fn app(&self) -> axum::Router {
        create_router(self.state.clone())
    }

    fn message_count(&self) -> u64 {
        self.messages.count().unwrap()
    }
}

fn auth_config(require_confirmation: bool) -> AuthConfig {
    AuthConfig {
        require_email_confirmation: require_confirmation,
        password_hash_iterations: 1_000,
        ..AuthConfig::default()
    }
}

fn property(name: &str, owner: &str, city: &str) -> PropertyRecord {
    let mut attributes = serde_json::Map::new();
    attributes.insert("city".to_string(), json!(city));
    PropertyRecord {
        id: 0,
        name: Some(name.to_string()),
        address: Some(format!("{} Street", name)),
        owner: Some(owner.to_string()),
        attributes,
    }
}

/// Fresh state with a confirmed, logged-in user and a few properties.
fn make_harness_with_store(store: Option<Arc<dyn MessageStore>>) -> Harness {
    let db = Arc::new(Database::in_memory().unwrap());
    let mut config = PropChatConfig::default();
    config.auth = auth_config(false);

    let auth = Arc::new(LocalAuthProvider::new(db.clone(), config.auth.clone()));
    auth.register(EMAIL, PASSWORD).unwrap();
    let token = auth.login(EMAIL, PASSWORD).unwrap().access_token;

    let properties = Arc::new(PropertyRepository::new(db.clone()));
    properties.insert(&property("Maple House", "Jane Doe", "Denver")).unwrap();
    properties.insert(&property("Oak Villa", "Jane Doe", "Denver")).unwrap();
    properties.insert(&property("Pine Loft", "John Roe", "Boston")).unwrap();

    let messages = Arc::new(MessageRepository::new(db));
    let store: Arc<dyn MessageStore> = store.unwrap_or_else(|| messages.clone() as Arc<dyn MessageStore>);

    let orchestrator = ChatOrchestrator::new(
        properties.clone(),
        Arc::new(KeywordIntentParser::new()),
        properties.clone(),
        store.clone(),
    );
    let state = AppState::new(config, auth.clone(), orchestrator, store);

    Harness {
        state,
        auth,
        messages,
        properties,
        token,
    }
}

fn make_harness() -> Harness {
    make_harness_with_store(None)
}

fn chat_request(token: Option<&str>, body: &str) -> Request<Body> {
    let mut builder = Request::post("/chat").header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

fn chat_body(message: &str, offset: u64) -> String {
    json!({"message": message, "conversationId": "conv-1", "offset": offset}).to_string()
}

fn form_post(uri: &str, form: &str) -> Request<Body> {
    Request::post(uri)
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(form.to_string()))
        .unwrap()
}

fn get_with_cookie(uri: &str, token: &str) -> Request<Body> {
    Request::get(uri)
        .header(header::COOKIE, format!("propchat_session={}", token))
        .body(Body::empty())
        .unwrap()
}

/// Read full response body bytes.
async fn body_bytes(resp: axum::response::Response) -> Vec<u8> {
    axum::body::to_bytes(resp.into_body(), 1024 * 1024)
        .await
        .unwrap()
        .to_vec()
}

async fn body_json(resp: axum::response::Response) -> Value {
    serde_json::from_slice(&body_bytes(resp).await).unwrap()
}

async fn body_text(resp: axum::response::Response) -> String {
    String::from_utf8(body_bytes(resp).await).unwrap()
}

fn location(resp: &axum::response::Response) -> &str {
    resp.headers()
        .get(header::LOCATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
}

fn set_cookie(resp: &axum::response::Response) -> String {
    resp.headers()
        .get(header::SET_COOKIE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

/// Message store that accepts user messages but fails assistant ones.
struct FailingAssistantStore(Arc<MessageRepository>);

#[async_trait]
impl MessageStore for FailingAssistantStore {
    async fn insert_message(&self, message: NewMessage) -> Result<Message, PropChatError> {
        match message.role {
            MessageRole::User => self.0.insert(message),
            MessageRole::Assistant => Err(PropChatError::Storage("disk full".to_string())),
        }
    }

    async fn list_messages(&self, conversation_id: &str, user_id: Uuid) -> Result<Vec<Message>, PropChatError> {
        self.0.list(conversation_id, user_id)
    }
}

// =============================================================================
// Health
// =============================================================================

#[tokio::test]
async fn test_health_happy_path() {
    let h = make_harness();
    let resp = h
        .app()
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    let health: HealthResponse = serde_json::from_slice(&body_bytes(resp).await).unwrap();
    assert_eq!(health.status, "healthy");
    assert_eq!(health.version, "0.1.0");
}

// =============================================================================
// POST /chat preconditions
// =============================================================================

#[tokio::test]
async fn test_chat_without_session_returns_401_and_writes_nothing() {
    let h = make_harness();
    let resp = h
        .app()
        .oneshot(chat_request(None, &chat_body("hello", 0)))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(
        body_json(resp).await,
        json!({"error": "Unauthorized - Please log in"})
    );
    assert_eq!(h.message_count(), 0);
}

#[tokio::test]
async fn test_chat_with_unknown_token_returns_401() {
    let h = make_harness();
    let resp = h
        .app()
        .oneshot(chat_request(Some("not-a-session"), &chat_body("hello", 0)))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_chat_unauthorized_wins_over_malformed_body() {
    let h = make_harness();
    let resp = h
        .app()
        .oneshot(chat_request(None, "{not json"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_chat_missing_fields_returns_400_and_writes_nothing() {
    let h = make_harness();
    for body in [
        json!({"message": "hello"}).to_string(),
        json!({"conversationId": "conv-1"}).to_string(),
        json!({"message": "", "conversationId": "conv-1"}).to_string(),
        "{}".to_string(),
    ] {
        let resp = h
            .app()
            .oneshot(chat_request(Some(&h.token), &body))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            body_json(resp).await,
            json!({"error": "Missing message or conversationId"})
        );
    }
    assert_eq!(h.message_count(), 0);
}

#[tokio::test]
async fn test_chat_invalid_json_returns_400() {
    let h = make_harness();
    let resp = h
        .app()
        .oneshot(chat_request(Some(&h.token), "{not json"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(h.message_count(), 0);
}

// =============================================================================
// POST /chat turns
// =============================================================================

#[tokio::test]
async fn test_chat_owner_lookup_happy_path() {
    let h = make_harness();
    let resp = h
        .app()
        .oneshot(chat_request(
            Some(&h.token),
            &chat_body("Show me properties owned by Jane Doe", 0),
        ))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    let json = body_json(resp).await;
    let response = json["response"].as_str().unwrap();
    assert!(response.starts_with("Found 2 property/properties. Showing 2 of 2."));
    assert!(response.contains("| Name | Address | Owner |\n| - | - | - |"));
    assert!(response.contains("| Maple House | Maple House Street | Jane Doe |"));
    assert_eq!(json["hasMore"], false);
    assert_eq!(json["currentOffset"], 0);

    let message = &json["message"];
    assert_eq!(message["role"], "assistant");
    assert_eq!(message["conversation_id"], "conv-1");
    assert_eq!(message["content"], response);
    assert_eq!(message["metadata"]["intent"], "property_lookup");
    assert_eq!(message["metadata"]["total_results"], 2);
    assert_eq!(message["metadata"]["full_results_data"][0]["city"], "Denver");

    assert_eq!(h.message_count(), 2);
}

#[tokio::test]
async fn test_chat_location_pagination() {
    let h = make_harness();
    for i in 0..9 {
        h.properties
            .insert(&property(&format!("Unit {}", i), "Lee", "Austin"))
            .unwrap();
    }
    // Three more in Austin from other owners makes twelve.
    for i in 0..3 {
        h.properties
            .insert(&property(&format!("Loft {}", i), "Kim", "Austin"))
            .unwrap();
    }

    let resp = h
        .app()
        .oneshot(chat_request(Some(&h.token), &chat_body("Show properties in Austin", 0)))
        .await
        .unwrap();
    let json = body_json(resp).await;
    assert_eq!(json["hasMore"], true);
    assert!(json["response"]
        .as_str()
        .unwrap()
        .starts_with("Found 12 properties in that location. Showing 5 of 12."));

    let resp = h
        .app()
        .oneshot(chat_request(Some(&h.token), &chat_body("Show properties in Austin", 10)))
        .await
        .unwrap();
    let json = body_json(resp).await;
    assert_eq!(json["hasMore"], false);
    assert_eq!(json["currentOffset"], 10);
    assert!(json["response"]
        .as_str()
        .unwrap()
        .starts_with("Found 12 properties in that location. Showing 2 of 12."));
}

#[tokio::test]
async fn test_chat_location_without_matches() {
    let h = make_harness();
    let resp = h
        .app()
        .oneshot(chat_request(Some(&h.token), &chat_body("Show properties in Paris", 0)))
        .await
        .unwrap();
    let json = body_json(resp).await;
    assert_eq!(json["hasMore"], false);
    assert!(json["response"]
        .as_str()
        .unwrap()
        .starts_with("No properties found in that location."));
}

#[tokio::test]
async fn test_chat_aggregations() {
    let h = make_harness();
    let resp = h
        .app()
        .oneshot(chat_request(Some(&h.token), &chat_body("How many properties are there?", 0)))
        .await
        .unwrap();
    assert_eq!(body_json(resp).await["response"], "There are 3 total properties.");

    let resp = h
        .app()
        .oneshot(chat_request(Some(&h.token), &chat_body("Who has the most properties?", 0)))
        .await
        .unwrap();
    assert_eq!(
        body_json(resp).await["response"],
        "Jane Doe has the most properties with 2 properties."
    );
}

#[tokio::test]
async fn test_chat_metadata_lists_attributes() {
    let h = make_harness();
    let resp = h
        .app()
        .oneshot(chat_request(Some(&h.token), &chat_body("What information do you have?", 0)))
        .await
        .unwrap();
    let json = body_json(resp).await;
    assert!(json["response"]
        .as_str()
        .unwrap()
        .starts_with("I have information about 13 property attributes including: Name, Address, Owner, City"));
}

#[tokio::test]
async fn test_chat_accepts_session_cookie() {
    let h = make_harness();
    let req = Request::post("/chat")
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::COOKIE, format!("propchat_session={}", h.token))
        .body(Body::from(chat_body("hello", 0)))
        .unwrap();
    let resp = h.app().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let json = body_json(resp).await;
    assert_eq!(json["message"]["metadata"]["intent"], "other");
}

#[tokio::test]
async fn test_chat_assistant_save_failure_returns_500_without_payload() {
    let db_backed = make_harness();
    let store: Arc<dyn MessageStore> =
        Arc::new(FailingAssistantStore(db_backed.messages.clone()));
    let h = make_harness_with_store(Some(store));

    let resp = h
        .app()
        .oneshot(chat_request(Some(&h.token), &chat_body("How many properties are there?", 0)))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body_json(resp).await, json!({"error": "Error saving message"}));

    // The user message was kept.
    assert_eq!(db_backed.message_count(), 1);
}

// =============================================================================
// Conversation history
// =============================================================================

#[tokio::test]
async fn test_list_messages_requires_session() {
    let h = make_harness();
    let resp = h
        .app()
        .oneshot(
            Request::get("/conversations/conv-1/messages")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(
        body_json(resp).await,
        json!({"error": "Unauthorized - Please log in"})
    );
}

#[tokio::test]
async fn test_list_messages_returns_turn_in_order_for_owner_only() {
    let h = make_harness();
    h.app()
        .oneshot(chat_request(Some(&h.token), &chat_body("hello", 0)))
        .await
        .unwrap();

    let resp = h
        .app()
        .oneshot(get_with_cookie("/conversations/conv-1/messages", &h.token))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let json = body_json(resp).await;
    let list = json.as_array().unwrap();
    assert_eq!(list.len(), 2);
    assert_eq!(list[0]["role"], "user");
    assert_eq!(list[0]["content"], "hello");
    assert_eq!(list[1]["role"], "assistant");

    h.auth.register("other@example.com", PASSWORD).unwrap();
    let other = h.auth.login("other@example.com", PASSWORD).unwrap().access_token;
    let resp = h
        .app()
        .oneshot(get_with_cookie("/conversations/conv-1/messages", &other))
        .await
        .unwrap();
    assert_eq!(body_json(resp).await, json!([]));
}

// =============================================================================
// Auth pages
// =============================================================================

#[tokio::test]
async fn test_login_page_renders_form() {
    let h = make_harness();
    let resp = h
        .app()
        .oneshot(Request::get("/auth/login").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let html = body_text(resp).await;
    assert!(html.contains(r#"action="/auth/login""#));
}

#[tokio::test]
async fn test_login_page_signup_mode_with_error() {
    let h = make_harness();
    let resp = h
        .app()
        .oneshot(
            Request::get("/auth/login?mode=signup&error=Bad%20things")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let html = body_text(resp).await;
    assert!(html.contains(r#"action="/auth/signup""#));
    assert!(html.contains(r#"<p class="error">Bad things</p>"#));
}

#[tokio::test]
async fn test_login_page_redirects_when_logged_in() {
    let h = make_harness();
    let resp = h
        .app()
        .oneshot(get_with_cookie("/auth/login", &h.token))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&resp), "/chat");
}

#[tokio::test]
async fn test_login_submit_sets_cookie_and_redirects() {
    let h = make_harness();
    let resp = h
        .app()
        .oneshot(form_post(
            "/auth/login",
            "email=agent%40example.com&password=secret-pass",
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&resp), "/chat");
    let cookie = set_cookie(&resp);
    assert!(cookie.starts_with("propchat_session="));
    assert!(cookie.contains("HttpOnly"));

    let token = cookie
        .trim_start_matches("propchat_session=")
        .split(';')
        .next()
        .unwrap()
        .to_string();
    let resp = h.app().oneshot(get_with_cookie("/chat", &token)).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(body_text(resp).await.contains(EMAIL));
}

#[tokio::test]
async fn test_login_submit_wrong_password_shows_error() {
    let h = make_harness();
    let resp = h
        .app()
        .oneshot(form_post(
            "/auth/login",
            "email=agent%40example.com&password=wrong-pass",
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(set_cookie(&resp).is_empty());
    let html = body_text(resp).await;
    assert!(html.contains("Invalid login credentials"));
    assert!(html.contains(r#"value="agent@example.com""#));
}

#[tokio::test]
async fn test_signup_shows_verification_prompt_in_login_mode() {
    let h = make_harness();
    let resp = h
        .app()
        .oneshot(form_post(
            "/auth/signup",
            "email=new%40example.com&password=secret-pass",
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let html = body_text(resp).await;
    assert!(html.contains("Sign up successful! Check your email to verify your account."));
    assert!(html.contains(r#"action="/auth/login""#));
}

#[tokio::test]
async fn test_signup_duplicate_shows_error_in_signup_mode() {
    let h = make_harness();
    let resp = h
        .app()
        .oneshot(form_post(
            "/auth/signup",
            "email=agent%40example.com&password=secret-pass",
        ))
        .await
        .unwrap();
    let html = body_text(resp).await;
    assert!(html.contains("User already registered"));
    assert!(html.contains(r#"action="/auth/signup""#));
}

#[tokio::test]
async fn test_callback_without_session_serves_page() {
    let h = make_harness();
    let resp = h
        .app()
        .oneshot(Request::get("/auth/callback").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(body_text(resp).await.contains("setTimeout"));
}

#[tokio::test]
async fn test_callback_with_session_redirects_to_chat() {
    let h = make_harness();
    let resp = h
        .app()
        .oneshot(get_with_cookie("/auth/callback", &h.token))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&resp), "/chat");
}

#[tokio::test]
async fn test_callback_with_bad_token_redirects_to_login_with_error() {
    let h = make_harness();
    let resp = h
        .app()
        .oneshot(
            Request::get("/auth/callback?token=deadbeef")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&resp), "/auth/login?error=Authentication%20failed");
}

#[tokio::test]
async fn test_callback_confirms_email_and_logs_in() {
    let db = Arc::new(Database::in_memory().unwrap());
    let mut config = PropChatConfig::default();
    config.auth = auth_config(true);
    let auth = Arc::new(LocalAuthProvider::new(db.clone(), config.auth.clone()));
    let (_, confirmation) = auth.register("new@example.com", PASSWORD).unwrap();
    let confirmation = confirmation.unwrap();

    let properties = Arc::new(PropertyRepository::new(db.clone()));
    let messages = Arc::new(MessageRepository::new(db));
    let orchestrator = ChatOrchestrator::new(
        properties.clone(),
        Arc::new(KeywordIntentParser::new()),
        properties,
        messages.clone(),
    );
    let app = create_router(AppState::new(config, auth.clone(), orchestrator, messages));

    let resp = app
        .oneshot(
            Request::get(format!("/auth/callback?token={}", confirmation))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&resp), "/chat");
    assert!(set_cookie(&resp).starts_with("propchat_session="));
    assert!(auth.login("new@example.com", PASSWORD).is_ok());
}

#[tokio::test]
async fn test_logout_revokes_session() {
    let h = make_harness();
    let req = Request::post("/auth/logout")
        .header(header::COOKIE, format!("propchat_session={}", h.token))
        .body(Body::empty())
        .unwrap();
    let resp = h.app().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&resp), "/auth/login");
    assert!(set_cookie(&resp).contains("Max-Age=0"));

    let resp = h.app().oneshot(get_with_cookie("/chat", &h.token)).await.unwrap();
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&resp), "/auth/login");
}

#[tokio::test]
async fn test_chat_page_requires_session() {
    let h = make_harness();
    let resp = h
        .app()
        .oneshot(Request::get("/chat").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&resp), "/auth/login");
}
