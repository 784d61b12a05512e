use crate::pipeline::PipelineError;
use crate::{telemetry, AppState, CONFIG_SCHEMA_VERSION, CRATE_NAME};
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use intake_api::wire::{
    CreateInspectionRequest, CreateTemplateRequest, CreateVehicleRequest, PatchInspectionRequest,
    PatchInspectionResponse, UpdateInspectionRequest, UpdateTemplateRequest, UpdateVehicleRequest,
};
use intake_api::{ApiError, ApiErrorCode};
use intake_core::path::FieldPath;
use intake_core::sha256_hex;
use intake_model::{FormTemplate, InspectionId, TemplateId, Vehicle, VehicleId};
use intake_store::{StoreError, StoreErrorCode};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::Ordering;
use std::time::Instant;
use tracing::info;

fn make_request_id(state: &AppState) -> String {
    let id = state.request_id_seed.fetch_add(1, Ordering::Relaxed);
    format!("req-{id:016x}")
}

fn propagated_request_id(headers: &HeaderMap, state: &AppState) -> String {
    if let Some(raw) = headers.get("x-request-id").and_then(|v| v.to_str().ok()) {
        let trimmed = raw.trim();
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
    }
    make_request_id(state)
}

fn with_request_id(mut response: Response, request_id: &str) -> Response {
    if let Ok(v) = HeaderValue::from_str(request_id) {
        response.headers_mut().insert("x-request-id", v);
    }
    response
}

fn error_response(err: ApiError) -> Response {
    let status =
        StatusCode::from_u16(err.code.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(json!({"error": err}))).into_response()
}

fn if_none_match(headers: &HeaderMap) -> Option<String> {
    headers
        .get("if-none-match")
        .and_then(|v| v.to_str().ok())
        .map(ToString::to_string)
}

fn put_cache_headers(headers: &mut HeaderMap, max_age_secs: u64, etag: &str) {
    if let Ok(value) = HeaderValue::from_str(&format!("private, max-age={max_age_secs}")) {
        headers.insert("cache-control", value);
    }
    if let Ok(value) = HeaderValue::from_str(etag) {
        headers.insert("etag", value);
    }
}

fn actor_id(headers: &HeaderMap) -> String {
    headers
        .get("x-actor-id")
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
        .unwrap_or_else(|| "anonymous".to_string())
}

fn decode_body<T: DeserializeOwned>(body: Value) -> Result<T, ApiError> {
    serde_json::from_value(body).map_err(|e| {
        ApiError::new(
            ApiErrorCode::MalformedInput,
            "invalid request body",
            json!({"reason": e.to_string()}),
        )
    })
}

fn require_body(body: Option<Json<Value>>) -> Result<Value, ApiError> {
    match body {
        Some(Json(value)) => Ok(value),
        None => Err(ApiError::new(
            ApiErrorCode::MalformedInput,
            "request body must be JSON",
            Value::Null,
        )),
    }
}

fn store_error_to_api(entity: &str, id: &str, err: StoreError) -> ApiError {
    match err.code {
        StoreErrorCode::NotFound => ApiError::not_found(entity, id),
        StoreErrorCode::Conflict => {
            ApiError::new(ApiErrorCode::Conflict, err.to_string(), json!({"id": id}))
        }
        _ => ApiError::storage(err.to_string()),
    }
}

fn pipeline_error_to_api(err: PipelineError) -> ApiError {
    match err {
        PipelineError::NotFound { entity, id } => ApiError::not_found(entity, &id),
        PipelineError::Closed => ApiError::new(
            ApiErrorCode::InspectionClosed,
            "inspection is closed to edits",
            Value::Null,
        ),
        PipelineError::PathConflict { at } => ApiError::new(
            ApiErrorCode::PathConflict,
            format!("path conflict: `{at}` holds a non-mapping value"),
            json!({"at": at}),
        ),
        PipelineError::InvalidTransition(reason) => {
            ApiError::new(ApiErrorCode::InvalidTransition, reason, Value::Null)
        }
        PipelineError::Storage(e) => ApiError::storage(e.to_string()),
    }
}

async fn respond(
    state: &AppState,
    route: &'static str,
    request_id: &str,
    started: Instant,
    response: Response,
) -> Response {
    state
        .metrics
        .observe_request(route, response.status(), started.elapsed())
        .await;
    with_request_id(response, request_id)
}

pub(crate) async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let request_id = make_request_id(&state);
    let started = Instant::now();
    let resp = (StatusCode::OK, "ok").into_response();
    respond(&state, "/health", &request_id, started, resp).await
}

pub(crate) async fn readyz_handler(State(state): State<AppState>) -> impl IntoResponse {
    let request_id = make_request_id(&state);
    let started = Instant::now();
    let resp = if state.ready.load(Ordering::Relaxed) {
        (StatusCode::OK, "ready").into_response()
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "not-ready").into_response()
    };
    respond(&state, "/readyz", &request_id, started, resp).await
}

pub(crate) async fn version_handler(State(state): State<AppState>) -> impl IntoResponse {
    let request_id = make_request_id(&state);
    let started = Instant::now();
    let payload = json!({
        "crate": CRATE_NAME,
        "version": env!("CARGO_PKG_VERSION"),
        "config_schema_version": CONFIG_SCHEMA_VERSION,
    });
    let resp = Json(payload).into_response();
    respond(&state, "/version", &request_id, started, resp).await
}

pub(crate) async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    let request_id = make_request_id(&state);
    let started = Instant::now();
    let body = telemetry::render_metrics(&state).await;
    let resp = (StatusCode::OK, body).into_response();
    respond(&state, "/metrics", &request_id, started, resp).await
}

pub(crate) async fn list_vehicles_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> impl IntoResponse {
    let route = "/api/v1/vehicles";
    let request_id = propagated_request_id(&headers, &state);
    let started = Instant::now();
    let resp = match state.store.list_vehicles().await {
        Ok(vehicles) => Json(json!({"vehicles": vehicles})).into_response(),
        Err(e) => error_response(ApiError::storage(e.to_string())),
    };
    respond(&state, route, &request_id, started, resp).await
}

pub(crate) async fn create_vehicle_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Option<Json<Value>>,
) -> impl IntoResponse {
    let route = "/api/v1/vehicles";
    let request_id = propagated_request_id(&headers, &state);
    let started = Instant::now();
    let resp = create_vehicle(&state, body).await;
    respond(&state, route, &request_id, started, resp).await
}

async fn create_vehicle(state: &AppState, body: Option<Json<Value>>) -> Response {
    let req: CreateVehicleRequest = match require_body(body).and_then(decode_body) {
        Ok(req) => req,
        Err(e) => return error_response(e),
    };
    let mut vehicle = match Vehicle::check_in(&req.license_plate) {
        Ok(vehicle) => vehicle,
        Err(e) => return error_response(ApiError::malformed_input("license_plate", &e.to_string())),
    };
    vehicle.vin = req.vin;
    vehicle.make = req.make.unwrap_or_default();
    vehicle.model = req.model.unwrap_or_default();
    vehicle.year = req.year;
    vehicle.color = req.color;
    vehicle.mileage = req.mileage;
    match state.store.create_vehicle(&vehicle).await {
        Ok(()) => {
            info!(vehicle_id = %vehicle.id, plate = %vehicle.license_plate, "vehicle checked in");
            (StatusCode::CREATED, Json(vehicle)).into_response()
        }
        Err(e) => error_response(store_error_to_api("vehicle", vehicle.id.as_str(), e)),
    }
}

pub(crate) async fn get_vehicle_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> impl IntoResponse {
    let route = "/api/v1/vehicles/{id}";
    let request_id = propagated_request_id(&headers, &state);
    let started = Instant::now();
    let resp = match VehicleId::parse(&id) {
        Ok(vehicle_id) => match state.store.load_vehicle(&vehicle_id).await {
            Ok(vehicle) => Json(vehicle).into_response(),
            Err(e) => error_response(store_error_to_api("vehicle", &id, e)),
        },
        Err(e) => error_response(ApiError::malformed_input("id", &e.to_string())),
    };
    respond(&state, route, &request_id, started, resp).await
}

pub(crate) async fn update_vehicle_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    body: Option<Json<Value>>,
) -> impl IntoResponse {
    let route = "/api/v1/vehicles/{id}";
    let request_id = propagated_request_id(&headers, &state);
    let started = Instant::now();
    let resp = update_vehicle(&state, &id, body).await;
    respond(&state, route, &request_id, started, resp).await
}

async fn update_vehicle(state: &AppState, id: &str, body: Option<Json<Value>>) -> Response {
    let req: UpdateVehicleRequest = match require_body(body).and_then(decode_body) {
        Ok(req) => req,
        Err(e) => return error_response(e),
    };
    let vehicle_id = match VehicleId::parse(id) {
        Ok(vehicle_id) => vehicle_id,
        Err(e) => return error_response(ApiError::malformed_input("id", &e.to_string())),
    };
    let mut vehicle = match state.store.load_vehicle(&vehicle_id).await {
        Ok(vehicle) => vehicle,
        Err(e) => return error_response(store_error_to_api("vehicle", id, e)),
    };
    if let Some(status) = req.status {
        vehicle.status = status;
    }
    if let Some(mileage) = req.mileage {
        vehicle.mileage = Some(mileage);
    }
    if let Some(color) = req.color {
        vehicle.color = Some(color);
    }
    if let Some(checked_out_at) = req.checked_out_at {
        vehicle.checked_out_at = Some(checked_out_at);
    }
    vehicle.updated_at = Utc::now();
    match state.store.save_vehicle(&vehicle).await {
        Ok(()) => Json(vehicle).into_response(),
        Err(e) => error_response(store_error_to_api("vehicle", id, e)),
    }
}

pub(crate) async fn list_inspections_handler(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> impl IntoResponse {
    let route = "/api/v1/inspections";
    let request_id = propagated_request_id(&headers, &state);
    let started = Instant::now();
    let resp = list_inspections(&state, &params).await;
    respond(&state, route, &request_id, started, resp).await
}

async fn list_inspections(state: &AppState, params: &HashMap<String, String>) -> Response {
    let vehicle_filter = match params.get("vehicle_id") {
        Some(raw) => match VehicleId::parse(raw) {
            Ok(vehicle_id) => Some(vehicle_id),
            Err(e) => return error_response(ApiError::malformed_input("vehicle_id", &e.to_string())),
        },
        None => None,
    };
    match state.store.list_inspections(vehicle_filter.as_ref()).await {
        Ok(inspections) => Json(json!({"inspections": inspections})).into_response(),
        Err(e) => error_response(ApiError::storage(e.to_string())),
    }
}

pub(crate) async fn create_inspection_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Option<Json<Value>>,
) -> impl IntoResponse {
    let route = "/api/v1/inspections";
    let request_id = propagated_request_id(&headers, &state);
    let started = Instant::now();
    let resp = create_inspection(&state, body).await;
    respond(&state, route, &request_id, started, resp).await
}

async fn create_inspection(state: &AppState, body: Option<Json<Value>>) -> Response {
    let req: CreateInspectionRequest = match require_body(body).and_then(decode_body) {
        Ok(req) => req,
        Err(e) => return error_response(e),
    };
    let vehicle_id = match VehicleId::parse(&req.vehicle_id) {
        Ok(vehicle_id) => vehicle_id,
        Err(e) => return error_response(ApiError::malformed_input("vehicle_id", &e.to_string())),
    };
    let inspector_id = req.inspector_id.trim();
    if inspector_id.is_empty() {
        return error_response(ApiError::malformed_input(
            "inspector_id",
            "must not be empty",
        ));
    }
    match state
        .pipeline
        .start_inspection(vehicle_id, inspector_id.to_string(), req.kind)
        .await
    {
        Ok(inspection) => (StatusCode::CREATED, Json(inspection)).into_response(),
        Err(e) => error_response(pipeline_error_to_api(e)),
    }
}

pub(crate) async fn get_inspection_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> impl IntoResponse {
    let route = "/api/v1/inspections/{id}";
    let request_id = propagated_request_id(&headers, &state);
    let started = Instant::now();
    let resp = match InspectionId::parse(&id) {
        Ok(inspection_id) => match state.store.load_inspection(&inspection_id).await {
            Ok(inspection) => Json(inspection).into_response(),
            Err(e) => error_response(store_error_to_api("inspection", &id, e)),
        },
        Err(e) => error_response(ApiError::malformed_input("id", &e.to_string())),
    };
    respond(&state, route, &request_id, started, resp).await
}

pub(crate) async fn inspection_data_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> impl IntoResponse {
    let route = "/api/v1/inspections/{id}/data";
    let request_id = propagated_request_id(&headers, &state);
    let started = Instant::now();
    let resp = match InspectionId::parse(&id) {
        Ok(inspection_id) => match state.pipeline.load_data(&inspection_id).await {
            Ok(data) => {
                let payload = json!({"inspection_id": inspection_id, "data": data});
                let etag = format!(
                    "\"{}\"",
                    sha256_hex(&serde_json::to_vec(&payload).unwrap_or_default())
                );
                let max_age = state.api.cache_ttl.as_secs().min(60);
                if if_none_match(&headers).as_deref() == Some(etag.as_str()) {
                    let mut resp = StatusCode::NOT_MODIFIED.into_response();
                    put_cache_headers(resp.headers_mut(), max_age, &etag);
                    resp
                } else {
                    let mut resp = Json(payload).into_response();
                    put_cache_headers(resp.headers_mut(), max_age, &etag);
                    resp
                }
            }
            Err(e) => error_response(pipeline_error_to_api(e)),
        },
        Err(e) => error_response(ApiError::malformed_input("id", &e.to_string())),
    };
    respond(&state, route, &request_id, started, resp).await
}

pub(crate) async fn update_inspection_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    body: Option<Json<Value>>,
) -> impl IntoResponse {
    let route = "/api/v1/inspections/{id}";
    let request_id = propagated_request_id(&headers, &state);
    let started = Instant::now();
    let resp = update_inspection(&state, &id, body).await;
    respond(&state, route, &request_id, started, resp).await
}

async fn update_inspection(state: &AppState, id: &str, body: Option<Json<Value>>) -> Response {
    let req: UpdateInspectionRequest = match require_body(body).and_then(decode_body) {
        Ok(req) => req,
        Err(e) => return error_response(e),
    };
    let inspection_id = match InspectionId::parse(id) {
        Ok(inspection_id) => inspection_id,
        Err(e) => return error_response(ApiError::malformed_input("id", &e.to_string())),
    };
    match state
        .pipeline
        .update_status(&inspection_id, req.status, req.completed_at)
        .await
    {
        Ok(inspection) => Json(inspection).into_response(),
        Err(e) => error_response(pipeline_error_to_api(e)),
    }
}

pub(crate) async fn delete_inspection_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> impl IntoResponse {
    let route = "/api/v1/inspections/{id}";
    let request_id = propagated_request_id(&headers, &state);
    let started = Instant::now();
    let resp = match InspectionId::parse(&id) {
        Ok(inspection_id) => match state.pipeline.delete_inspection(&inspection_id).await {
            Ok(()) => Json(json!({"deleted": inspection_id})).into_response(),
            Err(e) => error_response(pipeline_error_to_api(e)),
        },
        Err(e) => error_response(ApiError::malformed_input("id", &e.to_string())),
    };
    respond(&state, route, &request_id, started, resp).await
}

pub(crate) async fn patch_inspection_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    body: Option<Json<Value>>,
) -> impl IntoResponse {
    let route = "/api/v1/inspections/{id}/update";
    let request_id = propagated_request_id(&headers, &state);
    let started = Instant::now();
    let actor = actor_id(&headers);
    let resp = patch_inspection(&state, &id, &actor, body).await;
    respond(&state, route, &request_id, started, resp).await
}

async fn patch_inspection(
    state: &AppState,
    id: &str,
    actor: &str,
    body: Option<Json<Value>>,
) -> Response {
    let req: PatchInspectionRequest = match require_body(body).and_then(decode_body) {
        Ok(req) => req,
        Err(e) => return error_response(e),
    };
    let inspection_id = match InspectionId::parse(id) {
        Ok(inspection_id) => inspection_id,
        Err(e) => return error_response(ApiError::malformed_input("id", &e.to_string())),
    };
    let path = match FieldPath::parse(&req.path) {
        Ok(path) => path,
        Err(e) => return error_response(ApiError::malformed_input("path", &e.to_string())),
    };
    match state
        .pipeline
        .apply_update(&inspection_id, &path, req.value, actor)
        .await
    {
        Ok(update) => Json(PatchInspectionResponse {
            success: true,
            update,
        })
        .into_response(),
        Err(e) => error_response(pipeline_error_to_api(e)),
    }
}

pub(crate) async fn list_templates_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> impl IntoResponse {
    let route = "/api/v1/form-templates";
    let request_id = propagated_request_id(&headers, &state);
    let started = Instant::now();
    let resp = match state.store.list_templates().await {
        Ok(templates) => Json(json!({"templates": templates})).into_response(),
        Err(e) => error_response(ApiError::storage(e.to_string())),
    };
    respond(&state, route, &request_id, started, resp).await
}

pub(crate) async fn create_template_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Option<Json<Value>>,
) -> impl IntoResponse {
    let route = "/api/v1/form-templates";
    let request_id = propagated_request_id(&headers, &state);
    let started = Instant::now();
    let resp = create_template(&state, body).await;
    respond(&state, route, &request_id, started, resp).await
}

async fn create_template(state: &AppState, body: Option<Json<Value>>) -> Response {
    let req: CreateTemplateRequest = match require_body(body).and_then(decode_body) {
        Ok(req) => req,
        Err(e) => return error_response(e),
    };
    let template = match FormTemplate::new(&req.name, req.kind, req.sections) {
        Ok(template) => template,
        Err(e) => return error_response(ApiError::malformed_input("name", &e.to_string())),
    };
    match state.store.create_template(&template).await {
        Ok(()) => (StatusCode::CREATED, Json(template)).into_response(),
        Err(e) => error_response(store_error_to_api("template", template.id.as_str(), e)),
    }
}

pub(crate) async fn get_template_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> impl IntoResponse {
    let route = "/api/v1/form-templates/{id}";
    let request_id = propagated_request_id(&headers, &state);
    let started = Instant::now();
    let resp = match TemplateId::parse(&id) {
        Ok(template_id) => match state.store.load_template(&template_id).await {
            Ok(template) => Json(template).into_response(),
            Err(e) => error_response(store_error_to_api("template", &id, e)),
        },
        Err(e) => error_response(ApiError::malformed_input("id", &e.to_string())),
    };
    respond(&state, route, &request_id, started, resp).await
}

pub(crate) async fn update_template_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    body: Option<Json<Value>>,
) -> impl IntoResponse {
    let route = "/api/v1/form-templates/{id}";
    let request_id = propagated_request_id(&headers, &state);
    let started = Instant::now();
    let resp = update_template(&state, &id, body).await;
    respond(&state, route, &request_id, started, resp).await
}

async fn update_template(state: &AppState, id: &str, body: Option<Json<Value>>) -> Response {
    let req: UpdateTemplateRequest = match require_body(body).and_then(decode_body) {
        Ok(req) => req,
        Err(e) => return error_response(e),
    };
    let template_id = match TemplateId::parse(id) {
        Ok(template_id) => template_id,
        Err(e) => return error_response(ApiError::malformed_input("id", &e.to_string())),
    };
    let mut template = match state.store.load_template(&template_id).await {
        Ok(template) => template,
        Err(e) => return error_response(store_error_to_api("template", id, e)),
    };
    if let Some(name) = req.name {
        let name = name.trim().to_string();
        if name.is_empty() {
            return error_response(ApiError::malformed_input("name", "must not be empty"));
        }
        template.name = name;
    }
    if let Some(sections) = req.sections {
        template.sections = sections;
    }
    if let Some(active) = req.active {
        template.active = active;
    }
    template.updated_at = Utc::now();
    match state.store.save_template(&template).await {
        Ok(()) => Json(template).into_response(),
        Err(e) => error_response(store_error_to_api("template", id, e)),
    }
}

pub(crate) async fn delete_template_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> impl IntoResponse {
    let route = "/api/v1/form-templates/{id}";
    let request_id = propagated_request_id(&headers, &state);
    let started = Instant::now();
    let resp = match TemplateId::parse(&id) {
        Ok(template_id) => match state.store.delete_template(&template_id).await {
            Ok(()) => Json(json!({"deleted": template_id})).into_response(),
            Err(e) => error_response(store_error_to_api("template", &id, e)),
        },
        Err(e) => error_response(ApiError::malformed_input("id", &e.to_string())),
    };
    respond(&state, route, &request_id, started, resp).await
}
