//! REST endpoints for call lifecycle and scheduling.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get, post},
    Json, Router,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use homeserv_core::{ApplianceCategory, SpokenResponse};
use homeserv_dialogue::{tools, TurnIntent};
use homeserv_scheduling::{BookingRequest, DayPart, SlotQuery};
use homeserv_session::SessionSnapshot;

use crate::state::AppState;
use crate::ws;
use crate::ServerError;

/// Create the application router
pub fn create_router(state: AppState) -> Router {
    let mut router = Router::new()
        // Call lifecycle
        .route("/api/calls", post(start_call))
        .route("/api/calls", get(list_calls))
        .route("/api/calls/:call_id", get(get_call))
        .route("/api/calls/:call_id", delete(end_call))
        .route("/api/calls/:call_id/turns", post(post_turn))
        // Scheduling
        .route("/api/availability", get(get_availability))
        .route("/api/appointments", post(book_appointment))
        .route("/api/appointments/:code", get(get_appointment))
        .route("/api/appointments/:code", delete(cancel_appointment))
        // Tool schemas for the voice layer
        .route("/api/tools", get(list_tools))
        // Health
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        // WebSocket
        .route("/ws/calls/:call_id", get(ws::ws_handler))
        .layer(TraceLayer::new_for_http());

    if state.config.server.cors_enabled {
        router = router.layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        );
    }

    router.with_state(state)
}

#[derive(Debug, Deserialize)]
struct StartCallRequest {
    /// Provided by telephony; generated when absent.
    call_id: Option<String>,
    caller_phone: String,
}

#[derive(Debug, Serialize)]
struct StartCallResponse {
    call_id: String,
    response: SpokenResponse,
}

async fn start_call(
    State(state): State<AppState>,
    Json(request): Json<StartCallRequest>,
) -> Result<(StatusCode, Json<StartCallResponse>), ServerError> {
    if request.caller_phone.trim().is_empty() {
        return Err(ServerError::InvalidRequest(
            "caller_phone must not be empty".to_string(),
        ));
    }
    let call_id = request
        .call_id
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    let response = state
        .orchestrator
        .begin_call(&call_id, &request.caller_phone)
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(StartCallResponse { call_id, response }),
    ))
}

async fn list_calls(State(state): State<AppState>) -> Json<serde_json::Value> {
    let calls = state.sessions.list();
    Json(serde_json::json!({
        "calls": calls,
        "count": calls.len(),
    }))
}

async fn get_call(
    State(state): State<AppState>,
    Path(call_id): Path<String>,
) -> Result<Json<SessionSnapshot>, ServerError> {
    let session = state.sessions.get(&call_id)?;
    Ok(Json(session.snapshot()))
}

async fn end_call(State(state): State<AppState>, Path(call_id): Path<String>) -> StatusCode {
    state.orchestrator.end_call(&call_id).await;
    StatusCode::NO_CONTENT
}

async fn post_turn(
    State(state): State<AppState>,
    Path(call_id): Path<String>,
    Json(intent): Json<TurnIntent>,
) -> Result<Json<SpokenResponse>, ServerError> {
    let response = state.orchestrator.handle_turn(&call_id, intent).await?;
    if response.end_call {
        state.orchestrator.end_call(&call_id).await;
    }
    Ok(Json(response))
}

#[derive(Debug, Deserialize)]
struct AvailabilityParams {
    zip_code: String,
    appliance: String,
    start_date: Option<NaiveDate>,
    end_date: Option<NaiveDate>,
    time_preference: Option<String>,
}

async fn get_availability(
    State(state): State<AppState>,
    Query(params): Query<AvailabilityParams>,
) -> Result<Json<serde_json::Value>, ServerError> {
    let appliance = parse_appliance(&params.appliance)?;
    let day_part = match params.time_preference.as_deref() {
        None | Some("any") => None,
        Some(raw) => Some(DayPart::parse(raw).ok_or_else(|| {
            ServerError::InvalidRequest(format!("bad time_preference {raw:?}"))
        })?),
    };
    let query = SlotQuery {
        zip_code: params.zip_code,
        appliance,
        start_date: params.start_date,
        end_date: params.end_date,
        day_part,
    };
    let offers = state.engine.find_availability(&query)?;
    Ok(Json(serde_json::json!({
        "count": offers.len(),
        "slots": offers,
    })))
}

#[derive(Debug, Deserialize)]
struct BookAppointmentRequest {
    caller_phone: String,
    slot_id: i64,
    appliance: String,
    issue_description: Option<String>,
}

async fn book_appointment(
    State(state): State<AppState>,
    Json(request): Json<BookAppointmentRequest>,
) -> Result<(StatusCode, Json<serde_json::Value>), ServerError> {
    let appliance = parse_appliance(&request.appliance)?;
    let customer = state.engine.get_or_create_customer(&request.caller_phone)?;
    let appointment = state.engine.book_slot(&BookingRequest {
        customer_id: customer.id,
        slot_id: request.slot_id,
        appliance,
        issue_description: request
            .issue_description
            .unwrap_or_else(|| "general service visit".to_string()),
        symptoms: None,
        call_id: None,
    })?;
    let details = state
        .engine
        .appointment_by_confirmation(&appointment.confirmation_code)?;
    Ok((StatusCode::CREATED, Json(serde_json::json!(details))))
}

async fn get_appointment(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> Result<Json<serde_json::Value>, ServerError> {
    let details = state.engine.appointment_by_confirmation(&code)?;
    Ok(Json(serde_json::json!(details)))
}

async fn cancel_appointment(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> Result<Json<serde_json::Value>, ServerError> {
    let details = state.engine.cancel_appointment(&code)?;
    Ok(Json(serde_json::json!(details)))
}

async fn list_tools() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "tools": tools::tool_catalog() }))
}

async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn readiness_check(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ready",
        "active_calls": state.sessions.count(),
    }))
}

fn parse_appliance(raw: &str) -> Result<ApplianceCategory, ServerError> {
    ApplianceCategory::normalize(raw)
        .ok_or_else(|| ServerError::InvalidRequest(format!("unrecognized appliance {raw:?}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use homeserv_config::Settings;
    use homeserv_scheduling::{seed, MemoryStore, SchedulingStore};
    use http_body_util::BodyExt;
    use std::sync::Arc;
    use tower::ServiceExt;

    fn test_state() -> AppState {
        let store = Arc::new(MemoryStore::new());
        seed::seed_demo_data(store.as_ref()).unwrap();
        AppState::new(Settings::default(), store as Arc<dyn SchedulingStore>)
    }

    async fn json_body(response: axum::response::Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn health_endpoint() {
        let app = create_router(test_state());
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["status"], "healthy");
    }

    #[tokio::test]
    async fn call_lifecycle_over_http() {
        let app = create_router(test_state());

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/calls")
                    .header("content-type", "application/json")
                    .body(Body::from(
                        r#"{"call_id":"call-1","caller_phone":"555-123-4567"}"#,
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let body = json_body(response).await;
        assert_eq!(body["call_id"], "call-1");
        assert!(body["response"]["text"]
            .as_str()
            .unwrap()
            .contains("appliance"));

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/calls/call-1/turns")
                    .header("content-type", "application/json")
                    .body(Body::from(
                        r#"{"type":"transcript","text":"my washer won't start"}"#,
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/api/calls/call-1")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let snapshot = json_body(response).await;
        assert_eq!(snapshot["phase"], "diagnose");
        assert_eq!(snapshot["facts"]["appliance"], "washer");

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("DELETE")
                    .uri("/api/calls/call-1")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn duplicate_call_is_conflict() {
        let app = create_router(test_state());
        let request = || {
            Request::builder()
                .method("POST")
                .uri("/api/calls")
                .header("content-type", "application/json")
                .body(Body::from(
                    r#"{"call_id":"call-1","caller_phone":"555-123-4567"}"#,
                ))
                .unwrap()
        };
        let first = app.clone().oneshot(request()).await.unwrap();
        assert_eq!(first.status(), StatusCode::CREATED);
        let second = app.oneshot(request()).await.unwrap();
        assert_eq!(second.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn unknown_call_is_not_found() {
        let app = create_router(test_state());
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/calls/nope")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn availability_and_booking() {
        let app = create_router(test_state());

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/api/availability?zip_code=10001&appliance=refrigerator")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        let slot_id = body["slots"][0]["slot_id"].as_i64().unwrap();

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/appointments")
                    .header("content-type", "application/json")
                    .body(Body::from(format!(
                        r#"{{"caller_phone":"555-123-4567","slot_id":{slot_id},"appliance":"fridge","issue_description":"not cooling"}}"#
                    )))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let details = json_body(response).await;
        let code = details["appointment"]["confirmation_code"]
            .as_str()
            .unwrap()
            .to_string();
        assert!(code.starts_with("SHS-"));

        // Rebooking the same slot is a conflict.
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/appointments")
                    .header("content-type", "application/json")
                    .body(Body::from(format!(
                        r#"{{"caller_phone":"555-999-0000","slot_id":{slot_id},"appliance":"fridge"}}"#
                    )))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);

        let response = app
            .oneshot(
                Request::builder()
                    .method("DELETE")
                    .uri(format!("/api/appointments/{code}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn tool_catalog_served() {
        let app = create_router(test_state());
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/tools")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["tools"].as_array().unwrap().len(), 7);
    }
}
