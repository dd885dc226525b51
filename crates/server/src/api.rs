//! JSON API for the intake conversations and quotes.
//!
//! - `POST   /api/chat`                  quote-chat turn
//! - `POST   /api/setup/chat`            setup-wizard turn
//! - `POST   /api/quotes`                quick quote from a filled form
//! - `GET    /api/quotes/{quote_id}`     stored quote
//! - `DELETE /api/sessions/{session_id}` drop a conversation

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use serde::Serialize;
use tracing::{error, warn};
use uuid::Uuid;

use paintquote_agent::runtime::{ChatReply, ChatRequest, IntakeRuntime, SetupReply};
use paintquote_core::assembler::DirectQuoteRequest;
use paintquote_core::domain::quote::Quote;
use paintquote_core::errors::{ApplicationError, InterfaceError};

const CORRELATION_HEADER: &str = "x-correlation-id";

#[derive(Clone)]
pub struct ApiState {
    runtime: Arc<IntakeRuntime>,
}

pub fn router(runtime: Arc<IntakeRuntime>) -> Router {
    Router::new()
        .route("/api/chat", post(chat))
        .route("/api/setup/chat", post(setup_chat))
        .route("/api/quotes", post(create_quote))
        .route("/api/quotes/{quote_id}", get(get_quote))
        .route("/api/sessions/{session_id}", delete(clear_session))
        .with_state(ApiState { runtime })
}

pub struct ApiError(InterfaceError);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.0.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let mut response = (status, Json(self.0.body())).into_response();
        if let InterfaceError::RateLimited { retry_after_secs, .. } = &self.0 {
            let headers = response.headers_mut();
            headers.insert("retry-after", HeaderValue::from(*retry_after_secs));
            headers.insert("x-ratelimit-remaining", HeaderValue::from(0_u32));
        }
        response
    }
}

fn correlation_id(headers: &HeaderMap) -> String {
    headers
        .get(CORRELATION_HEADER)
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.trim().is_empty())
        .map(str::to_owned)
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}

fn reject(route: &'static str, correlation_id: &str, error: ApplicationError) -> ApiError {
    let mapped = error.clone().into_interface(correlation_id);
    if mapped.status_code() >= 500 {
        error!(
            event_name = "api.request.failed",
            route,
            correlation_id,
            status = mapped.status_code(),
            error = %error,
            "request failed"
        );
    } else {
        warn!(
            event_name = "api.request.rejected",
            route,
            correlation_id,
            status = mapped.status_code(),
            error = %error,
            "request rejected"
        );
    }
    ApiError(mapped)
}

fn malformed(route: &'static str, correlation_id: &str, rejection: JsonRejection) -> ApiError {
    reject(
        route,
        correlation_id,
        ApplicationError::InvalidInput { message: rejection.body_text(), details: Vec::new() },
    )
}

async fn chat(
    State(state): State<ApiState>,
    headers: HeaderMap,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<ChatReply>, ApiError> {
    let correlation_id = correlation_id(&headers);
    let Json(request) = payload.map_err(|e| malformed("chat", &correlation_id, e))?;
    state
        .runtime
        .handle_chat(request, &correlation_id)
        .await
        .map(Json)
        .map_err(|e| reject("chat", &correlation_id, e))
}

async fn setup_chat(
    State(state): State<ApiState>,
    headers: HeaderMap,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<SetupReply>, ApiError> {
    let correlation_id = correlation_id(&headers);
    let Json(request) = payload.map_err(|e| malformed("setup_chat", &correlation_id, e))?;
    state
        .runtime
        .handle_setup(request, &correlation_id)
        .await
        .map(Json)
        .map_err(|e| reject("setup_chat", &correlation_id, e))
}

async fn create_quote(
    State(state): State<ApiState>,
    headers: HeaderMap,
    payload: Result<Json<DirectQuoteRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Quote>), ApiError> {
    let correlation_id = correlation_id(&headers);
    let Json(request) = payload.map_err(|e| malformed("create_quote", &correlation_id, e))?;
    let quote = state
        .runtime
        .create_quote(request, &correlation_id)
        .await
        .map_err(|e| reject("create_quote", &correlation_id, e))?;
    Ok((StatusCode::CREATED, Json(quote)))
}

async fn get_quote(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Path(quote_id): Path<String>,
) -> Result<Json<Quote>, ApiError> {
    let correlation_id = correlation_id(&headers);
    state
        .runtime
        .get_quote(&quote_id)
        .await
        .map(Json)
        .map_err(|e| reject("get_quote", &correlation_id, e))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ClearedSession {
    session_id: String,
    cleared: bool,
}

async fn clear_session(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Path(session_id): Path<String>,
) -> Json<ClearedSession> {
    let correlation_id = correlation_id(&headers);
    let cleared = state.runtime.clear_session(&session_id, &correlation_id);
    Json(ClearedSession { session_id, cleared })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
        Router,
    };
    use rust_decimal::Decimal;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use paintquote_agent::provider::DeterministicProvider;
    use paintquote_agent::runtime::IntakeRuntime;
    use paintquote_core::domain::company::{Company, CompanyDefaults, CompanyId};
    use paintquote_core::session::{InMemorySessionStore, TurnRateLimiter};
    use paintquote_db::repositories::{InMemoryCompanyRepository, InMemoryQuoteRepository};

    use super::router;

    fn app(turns_per_minute: u32) -> Router {
        let mut defaults = CompanyDefaults::unconfigured(CompanyId(1));
        defaults.walls_rate = Some(Decimal::new(300, 2));
        defaults.markup_percentage = Decimal::new(45, 0);
        let runtime = IntakeRuntime::new(
            Arc::new(DeterministicProvider::new().expect("catalogs")),
            Arc::new(InMemorySessionStore::default()),
            Arc::new(InMemoryCompanyRepository::with_company(
                Company { id: CompanyId(1), name: "Brightline Painting".to_owned() },
                Some(defaults),
            )),
            Arc::new(InMemoryQuoteRepository::default()),
        )
        .with_limiter(TurnRateLimiter::new(
            turns_per_minute,
            Arc::new(paintquote_core::session::SystemClock),
        ));
        router(Arc::new(runtime))
    }

    async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .header("x-correlation-id", "test-req")
            .body(body.map(|b| Body::from(b.to_string())).unwrap_or_else(Body::empty))
            .expect("request");
        let response = app.clone().oneshot(request).await.expect("response");
        let status = response.status();
        let bytes = to_bytes(response.into_body(), 1 << 20).await.expect("body");
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).expect("json body")
        };
        (status, value)
    }

    #[tokio::test]
    async fn chat_turn_returns_prompt_and_partial_quote() {
        let app = app(20);
        let (status, body) = send(
            &app,
            "POST",
            "/api/chat",
            Some(json!({ "message": "123, walls only, John Smith", "sessionId": "s-1", "companyId": 1 })),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["isComplete"], false);
        assert_eq!(body["response"], "How many square feet of walls?");
        assert_eq!(body["partialQuote"]["customer"]["name"], "John Smith");
        assert_eq!(body["remainingTurns"], 19);
    }

    #[tokio::test]
    async fn unknown_company_is_404_with_error_body() {
        let app = app(20);
        let (status, body) = send(
            &app,
            "POST",
            "/api/chat",
            Some(json!({ "message": "hello", "sessionId": "s-1", "companyId": 42 })),
        )
        .await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body["error"].as_str().is_some_and(|e| e.contains("company 42")));
        assert_eq!(body["correlation_id"], "test-req");
    }

    #[tokio::test]
    async fn malformed_body_is_400() {
        let app = app(20);
        let (status, body) =
            send(&app, "POST", "/api/chat", Some(json!({ "message": "hi" }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].is_string());
    }

    #[tokio::test]
    async fn rate_limited_turn_is_429() {
        let app = app(1);
        let request = json!({ "message": "John Smith", "sessionId": "s-9", "companyId": 1 });
        let (first, _) = send(&app, "POST", "/api/chat", Some(request.clone())).await;
        let (second, body) = send(&app, "POST", "/api/chat", Some(request)).await;

        assert_eq!(first, StatusCode::OK);
        assert_eq!(second, StatusCode::TOO_MANY_REQUESTS);
        assert!(body["error"].as_str().is_some_and(|e| e.contains("1 messages per minute")));
    }

    #[tokio::test]
    async fn direct_quote_round_trips_through_the_api() {
        let app = app(20);
        let (status, created) = send(
            &app,
            "POST",
            "/api/quotes",
            Some(json!({
                "companyId": 1,
                "measurements": { "totalWallsSqft": "1000", "totalCeilingsSqft": "0", "totalTrimSqft": "0" }
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED, "{created}");
        assert_eq!(created["pricing"]["finalPrice"], "4350.00");

        let quote_id = created["metadata"]["quoteId"].as_str().expect("quote id").to_owned();
        let (status, fetched) = send(&app, "GET", &format!("/api/quotes/{quote_id}"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(fetched, created);

        let (missing, _) = send(&app, "GET", "/api/quotes/Q-nope", None).await;
        assert_eq!(missing, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn invalid_measurements_are_400_with_details() {
        let app = app(20);
        let (status, body) = send(
            &app,
            "POST",
            "/api/quotes",
            Some(json!({
                "companyId": 1,
                "measurements": { "totalWallsSqft": "-5", "totalCeilingsSqft": "0", "totalTrimSqft": "0" }
            })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["details"].as_array().is_some_and(|details| !details.is_empty()));
    }

    #[tokio::test]
    async fn deleting_a_session_reports_whether_it_existed() {
        let app = app(20);
        send(
            &app,
            "POST",
            "/api/setup/chat",
            Some(json!({ "message": "Brightline Painting", "sessionId": "setup-1", "companyId": 1 })),
        )
        .await;

        let (status, body) = send(&app, "DELETE", "/api/sessions/setup-1", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["cleared"], true);

        let (_, again) = send(&app, "DELETE", "/api/sessions/setup-1", None).await;
        assert_eq!(again["cleared"], false);
    }
}
