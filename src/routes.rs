use axum::{
    async_trait,
    extract::{rejection::JsonRejection, DefaultBodyLimit, FromRequest, Path, Request, State},
    routing::{get, post},
    Json, Router,
};
use std::{collections::HashMap, sync::Arc};
use parking_lot::RwLock;
use chrono::{DateTime, Utc};
use tower_http::cors::{Any, CorsLayer};

use crate::{
    audit::{AuditLog, MemorySink, TracingSink},
    catalog::{Recommender, StaticCatalog, UPSELL_HINT},
    config::AppConfig,
    error::StylistError,
    models::{AddToCartRequest, CartView, ChatRequest, ChatView, EventsView, GenerateRequest, OutfitView, RecommendationsView, SessionView},
    stylist::{OutfitGenerator, OutfitRequest, PlaceholderStylist},
    workflow::{timestamp_id, Session},
};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<RwLock<HashMap<String, Session>>>,
    pub generator: Arc<dyn OutfitGenerator>,
    pub recommender: Arc<dyn Recommender>,
    pub audit: AuditLog,
    pub events: Arc<MemorySink>,
    pub max_upload_bytes: usize,
}

impl AppState {
    pub fn new(config: &AppConfig) -> Self {
        let events = Arc::new(MemorySink::new(config.audit_log_capacity));
        Self {
            store: Arc::default(),
            generator: Arc::new(PlaceholderStylist::new(config.generation_delay)),
            recommender: Arc::new(StaticCatalog::new(config.recommendation_delay)),
            audit: AuditLog::new().with_sink(Arc::new(TracingSink)).with_sink(events.clone()),
            events,
            max_upload_bytes: config.max_upload_bytes,
        }
    }

    fn open_session(&self, now: DateTime<Utc>) -> SessionView {
        let mut guard = self.store.write();
        let mut id = timestamp_id("user", now, None);
        while guard.contains_key(&id) {
            id = timestamp_id("user", now, Some(&id));
        }
        let session = Session::with_id(id.clone(), now);
        let view = session.view(UPSELL_HINT);
        guard.insert(id, session);
        view
    }
}

/// `Json` extractor whose rejections use the same JSON error body as every
/// other failure.
pub struct ApiJson<T>(pub T);

#[async_trait]
impl<T, S> FromRequest<S> for ApiJson<T>
where
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
    S: Send + Sync,
{
    type Rejection = StylistError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await?;
        Ok(Self(value))
    }
}

pub fn router(state: AppState) -> Router {
    // base64 grows the photo by a third, plus a little JSON framing
    let upload_limit = state.max_upload_bytes / 3 * 4 + 4096;
    Router::new()
        .route("/api/sessions", post(create_session))
        .route("/api/sessions/:id", get(get_session))
        .route("/api/sessions/:id/outfit", post(generate_outfit).layer(DefaultBodyLimit::max(upload_limit)))
        .route("/api/sessions/:id/recommendations", post(recommend_products))
        .route("/api/sessions/:id/cart", post(add_to_cart))
        .route("/api/sessions/:id/chat", post(chat))
        .route("/api/sessions/:id/events", get(list_events))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
        )
        .with_state(state)
}

pub async fn create_session(State(state): State<AppState>) -> Json<SessionView> {
    let view = state.open_session(Utc::now());
    tracing::info!("🆕 Opened session {}", view.session_id);
    Json(view)
}

pub async fn get_session(Path(id): Path<String>, State(state): State<AppState>) -> Result<Json<SessionView>, StylistError> {
    let guard = state.store.read();
    let session = guard.get(&id).ok_or(StylistError::SessionNotFound(id.clone()))?;
    Ok(Json(session.view(UPSELL_HINT)))
}

pub async fn generate_outfit(
    Path(id): Path<String>,
    State(state): State<AppState>,
    ApiJson(body): ApiJson<GenerateRequest>,
) -> Result<Json<OutfitView>, StylistError> {
    let request = {
        let mut guard = state.store.write();
        let session = guard.get_mut(&id).ok_or(StylistError::SessionNotFound(id.clone()))?;
        session.begin_generation(body.image_base64, body.style, body.occasion)?
    };

    tracing::info!("🚀 Generating {} / {} outfit for session {}", request.style, request.occasion, id);

    // Once the session is Generating, the generation must settle even if the
    // client goes away, so it runs on its own task.
    let task = tokio::spawn(settle_generation(state, id, request));
    let view = task.await.map_err(|e| StylistError::Internal(e.to_string()))??;
    Ok(Json(view))
}

async fn settle_generation(state: AppState, id: String, request: OutfitRequest) -> Result<OutfitView, StylistError> {
    // Generate outside the lock
    let result = state.generator.generate(&request).await;

    let mut guard = state.store.write();
    let session = guard.get_mut(&id).ok_or(StylistError::SessionNotFound(id.clone()))?;
    let (event, outfit) = session.complete_generation(request, result, Utc::now());
    state.audit.emit(&event);
    let view = outfit?.view();
    tracing::info!("✅ Session {} now on outfit {}", id, view.outfit_id);
    Ok(view)
}

pub async fn recommend_products(Path(id): Path<String>, State(state): State<AppState>) -> Result<Json<RecommendationsView>, StylistError> {
    let (outfit_id, components) = {
        let guard = state.store.read();
        let session = guard.get(&id).ok_or(StylistError::SessionNotFound(id.clone()))?;
        session.recommendation_query()?
    };

    let set = state.recommender.recommend(&components).await;

    let mut guard = state.store.write();
    let session = guard.get_mut(&id).ok_or(StylistError::SessionNotFound(id.clone()))?;
    let (event, set) = session.install_recommendations(&outfit_id, set)?;
    state.audit.emit(&event);
    let view = set.view(&outfit_id, UPSELL_HINT);
    tracing::info!("✅ {} recommendation groups for outfit {}", view.recommendations.len(), outfit_id);
    Ok(Json(view))
}

pub async fn add_to_cart(
    Path(id): Path<String>,
    State(state): State<AppState>,
    ApiJson(body): ApiJson<AddToCartRequest>,
) -> Result<Json<CartView>, StylistError> {
    let mut guard = state.store.write();
    let session = guard.get_mut(&id).ok_or(StylistError::SessionNotFound(id.clone()))?;
    let (event, product) = session.add_to_cart(&body.component, &body.link)?;
    let added = product.clone();
    state.audit.emit(&event);
    tracing::info!("🛒 Added {} to cart for session {}", added.name, id);
    Ok(Json(CartView { added, cart: session.cart().to_vec() }))
}

pub async fn chat(
    Path(id): Path<String>,
    State(state): State<AppState>,
    ApiJson(body): ApiJson<ChatRequest>,
) -> Result<Json<ChatView>, StylistError> {
    let mut guard = state.store.write();
    let session = guard.get_mut(&id).ok_or(StylistError::SessionNotFound(id.clone()))?;
    let (event, reply) = session.chat(&body.prompt, Utc::now())?;
    let reply = reply.clone();
    state.audit.emit(&event);
    Ok(Json(ChatView { reply, messages: session.history().messages().to_vec() }))
}

pub async fn list_events(Path(id): Path<String>, State(state): State<AppState>) -> Result<Json<EventsView>, StylistError> {
    if !state.store.read().contains_key(&id) {
        return Err(StylistError::SessionNotFound(id));
    }
    let events = state.events.for_session(&id);
    Ok(Json(EventsView { session_id: id, events }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{audit::FailingSink, stylist::sample_png};
    use axum::{body::Body, http::{Request, StatusCode}};
    use base64::Engine;
    use pretty_assertions::assert_eq;
    use serde_json::{json, Value};
    use std::time::Duration;
    use tower::ServiceExt;

    fn test_state() -> AppState {
        AppState::new(&AppConfig {
            generation_delay: Duration::ZERO,
            recommendation_delay: Duration::ZERO,
            ..AppConfig::default()
        })
    }

    async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => builder.header("content-type", "application/json").body(Body::from(body.to_string())).unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes).unwrap() };
        (status, value)
    }

    async fn open(app: &Router) -> String {
        let (status, body) = send(app, "POST", "/api/sessions", None).await;
        assert_eq!(status, StatusCode::OK);
        body["session_id"].as_str().unwrap().to_string()
    }

    fn png_body(style: &str, occasion: &str) -> Value {
        let encoded = base64::engine::general_purpose::STANDARD.encode(sample_png());
        json!({ "image_base64": encoded, "style": style, "occasion": occasion })
    }

    #[tokio::test]
    async fn full_workflow_emits_one_event_per_action() {
        let app = router(test_state());
        let id = open(&app).await;

        let (status, outfit) = send(&app, "POST", &format!("/api/sessions/{id}/outfit"), Some(png_body("Casual Chic", "Everyday"))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(outfit["components"], json!({ "top": "Kurti", "bottom": "Palazzo", "accessory": "Tote Bag" }));
        assert!(outfit["outfit_id"].as_str().unwrap().starts_with("outfit-"));

        let (status, recs) = send(&app, "POST", &format!("/api/sessions/{id}/recommendations"), None).await;
        assert_eq!(status, StatusCode::OK);
        let keys: Vec<_> = recs["recommendations"].as_array().unwrap().iter().map(|g| g["key"].as_str().unwrap().to_string()).collect();
        assert_eq!(keys, vec!["Kurti (Top)", "Palazzo (Bottom)", "Tote Bag (Accessory)"]);
        assert_eq!(recs["upsell"], UPSELL_HINT);

        let (status, cart) = send(&app, "POST", &format!("/api/sessions/{id}/cart"), Some(json!({ "component": "Tote Bag (Accessory)", "link": "#link5" }))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(cart["added"]["name"], "Woven Straw Tote");

        let (status, chat) = send(&app, "POST", &format!("/api/sessions/{id}/chat"), Some(json!({ "prompt": "find me shoes" }))).await;
        assert_eq!(status, StatusCode::OK);
        assert!(chat["reply"]["content"].as_str().unwrap().contains("Kurti, Palazzo, Tote Bag"));

        let (_, events) = send(&app, "GET", &format!("/api/sessions/{id}/events"), None).await;
        let actions: Vec<_> = events["events"].as_array().unwrap().iter().map(|e| e["action"].as_str().unwrap().to_string()).collect();
        assert_eq!(actions, vec!["generated", "recommended", "add_to_cart", "chat_interaction"]);
        assert!(events["events"].as_array().unwrap().iter().all(|e| e["session_id"] == id.as_str()));

        let (_, view) = send(&app, "GET", &format!("/api/sessions/{id}"), None).await;
        assert_eq!(view["stage"], "recommendations_ready");
        assert_eq!(view["chatting"], true);
        assert_eq!(view["messages"].as_array().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn generate_without_image_warns_and_keeps_state() {
        let app = router(test_state());
        let id = open(&app).await;
        let (status, body) = send(&app, "POST", &format!("/api/sessions/{id}/outfit"), Some(json!({ "style": "Formal Wear" }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "missing_input");
        let (_, view) = send(&app, "GET", &format!("/api/sessions/{id}"), None).await;
        assert_eq!(view["stage"], "empty");
        let (_, events) = send(&app, "GET", &format!("/api/sessions/{id}/events"), None).await;
        assert_eq!(events["events"], json!([]));
    }

    #[tokio::test]
    async fn undecodable_image_reverts_to_empty() {
        let app = router(test_state());
        let id = open(&app).await;
        let garbage = base64::engine::general_purpose::STANDARD.encode(b"definitely not a png");
        let (status, body) = send(&app, "POST", &format!("/api/sessions/{id}/outfit"), Some(json!({ "image_base64": garbage }))).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["error"], "generation");
        let (_, view) = send(&app, "GET", &format!("/api/sessions/{id}"), None).await;
        assert_eq!(view["stage"], "empty");
        assert_eq!(view["outfit"], Value::Null);
        let (_, events) = send(&app, "GET", &format!("/api/sessions/{id}/events"), None).await;
        assert_eq!(events["events"][0]["action"], "generation_failed");
    }

    #[tokio::test]
    async fn recommendations_before_generation_change_nothing() {
        let app = router(test_state());
        let id = open(&app).await;
        let (status, body) = send(&app, "POST", &format!("/api/sessions/{id}/recommendations"), None).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"], "no_outfit_components");
        let (_, view) = send(&app, "GET", &format!("/api/sessions/{id}"), None).await;
        assert_eq!(view["stage"], "empty");
        assert_eq!(view["recommendations"], Value::Null);
    }

    #[tokio::test]
    async fn fresh_session_chat_gets_generic_greeting() {
        let app = router(test_state());
        let id = open(&app).await;
        let (status, chat) = send(&app, "POST", &format!("/api/sessions/{id}/chat"), Some(json!({ "prompt": "hello" }))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(chat["reply"]["content"], crate::workflow::GENERIC_REPLY);
        assert_eq!(chat["reply"]["role"], "assistant");
    }

    #[tokio::test]
    async fn unknown_session_is_not_found() {
        let app = router(test_state());
        let (status, body) = send(&app, "GET", "/api/sessions/user-0", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "session_not_found");
        let (status, _) = send(&app, "POST", "/api/sessions/user-0/chat", Some(json!({ "prompt": "hi" }))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn failing_audit_sink_does_not_fail_the_action() {
        let mut state = test_state();
        state.audit = state.audit.clone().with_sink(Arc::new(FailingSink));
        let app = router(state);
        let id = open(&app).await;
        let (status, _) = send(&app, "POST", &format!("/api/sessions/{id}/chat"), Some(json!({ "prompt": "hello" }))).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[test]
    fn sessions_opened_on_the_same_tick_get_distinct_ids() {
        let state = test_state();
        let now = Utc::now();
        let a = state.open_session(now);
        let b = state.open_session(now);
        assert_ne!(a.session_id, b.session_id);
        assert_eq!(state.store.read().len(), 2);
    }

    #[tokio::test]
    async fn abandoned_generate_request_still_settles() {
        let app = router(AppState::new(&AppConfig {
            generation_delay: Duration::from_millis(300),
            recommendation_delay: Duration::ZERO,
            ..AppConfig::default()
        }));
        let id = open(&app).await;
        let uri = format!("/api/sessions/{id}/outfit");

        let abandoned = tokio::time::timeout(Duration::from_millis(50), send(&app, "POST", &uri, Some(png_body("Casual Chic", "Everyday")))).await;
        assert!(abandoned.is_err());
        tokio::time::sleep(Duration::from_millis(600)).await;

        let (_, view) = send(&app, "GET", &format!("/api/sessions/{id}"), None).await;
        assert_eq!(view["stage"], "generated");
        let (_, events) = send(&app, "GET", &format!("/api/sessions/{id}/events"), None).await;
        assert_eq!(events["events"].as_array().unwrap().len(), 1);
        assert_eq!(events["events"][0]["action"], "generated");

        let (status, _) = send(&app, "POST", &uri, Some(png_body("Party Look", "Vacation"))).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn photo_sized_upload_reaches_the_generator() {
        let app = router(test_state());
        let id = open(&app).await;
        let photo = base64::engine::general_purpose::STANDARD.encode(vec![7u8; 3 * 1024 * 1024]);
        let (status, body) = send(&app, "POST", &format!("/api/sessions/{id}/outfit"), Some(json!({ "image_base64": photo }))).await;
        // past the body limit; rejected only because the bytes are not an image
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["error"], "generation");
    }

    #[tokio::test]
    async fn upload_over_limit_is_a_json_413() {
        let app = router(AppState::new(&AppConfig {
            generation_delay: Duration::ZERO,
            recommendation_delay: Duration::ZERO,
            max_upload_bytes: 1024,
            ..AppConfig::default()
        }));
        let id = open(&app).await;
        let photo = base64::engine::general_purpose::STANDARD.encode(vec![7u8; 16 * 1024]);
        let (status, body) = send(&app, "POST", &format!("/api/sessions/{id}/outfit"), Some(json!({ "image_base64": photo }))).await;
        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(body["error"], "payload_too_large");
        let (_, view) = send(&app, "GET", &format!("/api/sessions/{id}"), None).await;
        assert_eq!(view["stage"], "empty");
    }

    #[tokio::test]
    async fn invalid_base64_gets_json_error_body() {
        let app = router(test_state());
        let id = open(&app).await;
        let (status, body) = send(&app, "POST", &format!("/api/sessions/{id}/outfit"), Some(json!({ "image_base64": "***not base64***" }))).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["error"], "invalid_body");
        assert!(body["message"].as_str().unwrap().contains("image_base64"));
        let (_, view) = send(&app, "GET", &format!("/api/sessions/{id}"), None).await;
        assert_eq!(view["stage"], "empty");
    }
}
