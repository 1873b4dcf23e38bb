//! REST and Server-Sent Events surface over the dispatcher

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{header, Method, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Json, Response,
    },
    routing::{get, post, put},
    Router,
};
use futures::{Stream, StreamExt};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::error;

use ruta_common::{
    ActorId, CancellationReason, RequesterId, RutaError, TransactionType, TripId, TripKind,
    TripRequest, TripStatus, WalletTransaction, WorkerId, CURRENCY,
};
use ruta_dispatch::{
    Dispatcher, DocumentStatus, DocumentType, InMemoryKycRegistry, NewTrip, WorkerAvailability,
};
use ruta_ledger::{BalanceStatus, Reconciliation};

// ============ STATE ============

#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Dispatcher,
    /// Document review stub; production deployments point the gate at the review service
    pub kyc: Arc<InMemoryKycRegistry>,
}

// ============ ERRORS ============

/// Dispatch error rendered as `{"error": code, "message": text}`
pub struct ApiError(RutaError);

impl From<RutaError> for ApiError {
    fn from(err: RutaError) -> Self {
        ApiError(err)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            RutaError::InvalidTransition { .. }
            | RutaError::AlreadyAssigned { .. }
            | RutaError::InvalidNegotiationState(_)
            | RutaError::Conflict(_) => StatusCode::CONFLICT,
            RutaError::InsufficientFunds { .. } => StatusCode::PAYMENT_REQUIRED,
            RutaError::NotEligible { .. } => StatusCode::FORBIDDEN,
            RutaError::TripNotFound(_) => StatusCode::NOT_FOUND,
            RutaError::Validation(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(code = self.0.code(), "Request failed: {}", self.0);
        }
        let body = Json(serde_json::json!({
            "error": self.0.code(),
            "message": self.0.to_string(),
        }));
        (status, body).into_response()
    }
}

type ApiResult<T> = std::result::Result<T, ApiError>;

// ============ REQUEST TYPES ============

#[derive(Debug, Deserialize)]
pub struct AvailableQuery {
    pub kind: TripKind,
    pub worker_id: WorkerId,
}

#[derive(Debug, Deserialize)]
pub struct AcceptRequest {
    pub worker_id: WorkerId,
}

#[derive(Debug, Deserialize)]
pub struct StatusRequest {
    pub status: TripStatus,
}

#[derive(Debug, Deserialize)]
pub struct CancelRequest {
    pub reason: CancellationReason,
    #[serde(default)]
    pub actor: Option<ActorId>,
}

#[derive(Debug, Deserialize)]
pub struct ProposeRequest {
    pub actor: ActorId,
    pub top_up: Decimal,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ResolveRequest {
    pub actor: ActorId,
}

#[derive(Debug, Deserialize)]
pub struct AvailabilityRequest {
    pub kind: TripKind,
    pub online: bool,
}

#[derive(Debug, Deserialize)]
pub struct WalletQuery {
    #[serde(default)]
    pub kind: Option<TripKind>,
}

#[derive(Debug, Deserialize)]
pub struct TransactionRequest {
    /// Signed: positive for loads, negative for deducts
    pub amount: Decimal,
    #[serde(rename = "type")]
    pub kind: TransactionType,
    #[serde(default)]
    pub trip_id: Option<TripId>,
    #[serde(default)]
    pub reference: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DocumentRequest {
    pub status: DocumentStatus,
}

// ============ RESPONSE TYPES ============

#[derive(Debug, Serialize)]
pub struct WalletSummary {
    pub worker_id: WorkerId,
    pub balance: Decimal,
    pub currency: &'static str,
    pub kind: TripKind,
    pub platform_fee: Decimal,
    pub capacity: u64,
    pub status: BalanceStatus,
}

#[derive(Debug, Serialize)]
pub struct TransactionResponse {
    pub worker_id: WorkerId,
    pub balance: Decimal,
}

// ============ HANDLERS ============

async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn metrics(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    let body = state.dispatcher.metrics().render()?;
    Ok((
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        body,
    ))
}

async fn create_trip(
    State(state): State<AppState>,
    Json(req): Json<NewTrip>,
) -> ApiResult<(StatusCode, Json<TripRequest>)> {
    let trip = state.dispatcher.create_trip(req).await?;
    Ok((StatusCode::CREATED, Json(trip)))
}

async fn get_trip(
    State(state): State<AppState>,
    Path(trip_id): Path<TripId>,
) -> ApiResult<Json<TripRequest>> {
    Ok(Json(state.dispatcher.get_trip(trip_id).await?))
}

async fn list_available(
    State(state): State<AppState>,
    Query(query): Query<AvailableQuery>,
) -> ApiResult<Json<Vec<TripRequest>>> {
    let trips = state
        .dispatcher
        .list_available(query.kind, query.worker_id)
        .await?;
    Ok(Json(trips))
}

async fn available_feed(
    State(state): State<AppState>,
    Query(query): Query<AvailableQuery>,
) -> ApiResult<Sse<impl Stream<Item = Result<Event, axum::Error>>>> {
    let feed = state
        .dispatcher
        .subscribe_available(query.kind, query.worker_id)
        .await?;
    let events = feed.map(|trip| Event::default().event("trip").json_data(trip));
    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}

async fn trip_events(
    State(state): State<AppState>,
    Path(trip_id): Path<TripId>,
) -> ApiResult<Sse<impl Stream<Item = Result<Event, axum::Error>>>> {
    // 404 before opening a stream that would never yield
    state.dispatcher.get_trip(trip_id).await?;
    let events = state
        .dispatcher
        .watch_trip(trip_id)
        .map(|event| Event::default().event("trip_event").json_data(event));
    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}

async fn accept_trip(
    State(state): State<AppState>,
    Path(trip_id): Path<TripId>,
    Json(req): Json<AcceptRequest>,
) -> ApiResult<Json<TripRequest>> {
    Ok(Json(state.dispatcher.accept(trip_id, req.worker_id).await?))
}

async fn advance_status(
    State(state): State<AppState>,
    Path(trip_id): Path<TripId>,
    Json(req): Json<StatusRequest>,
) -> ApiResult<Json<TripRequest>> {
    Ok(Json(state.dispatcher.advance_status(trip_id, req.status).await?))
}

async fn cancel_trip(
    State(state): State<AppState>,
    Path(trip_id): Path<TripId>,
    Json(req): Json<CancelRequest>,
) -> ApiResult<Json<TripRequest>> {
    Ok(Json(
        state
            .dispatcher
            .cancel(trip_id, req.reason, req.actor)
            .await?,
    ))
}

async fn propose_negotiation(
    State(state): State<AppState>,
    Path(trip_id): Path<TripId>,
    Json(req): Json<ProposeRequest>,
) -> ApiResult<Json<TripRequest>> {
    Ok(Json(
        state
            .dispatcher
            .propose_negotiation(trip_id, req.actor, req.top_up, req.notes)
            .await?,
    ))
}

async fn accept_negotiation(
    State(state): State<AppState>,
    Path(trip_id): Path<TripId>,
    Json(req): Json<ResolveRequest>,
) -> ApiResult<Json<TripRequest>> {
    Ok(Json(
        state
            .dispatcher
            .accept_negotiation(trip_id, req.actor)
            .await?,
    ))
}

async fn reject_negotiation(
    State(state): State<AppState>,
    Path(trip_id): Path<TripId>,
    Json(req): Json<ResolveRequest>,
) -> ApiResult<Json<TripRequest>> {
    Ok(Json(
        state
            .dispatcher
            .reject_negotiation(trip_id, req.actor)
            .await?,
    ))
}

async fn worker_trips(
    State(state): State<AppState>,
    Path(worker_id): Path<WorkerId>,
) -> ApiResult<Json<Vec<TripRequest>>> {
    Ok(Json(state.dispatcher.trips_for_worker(&worker_id).await?))
}

async fn requester_trips(
    State(state): State<AppState>,
    Path(requester_id): Path<RequesterId>,
) -> ApiResult<Json<Vec<TripRequest>>> {
    Ok(Json(state.dispatcher.trips_for_requester(&requester_id).await?))
}

/// Last availability a worker set; `null` if they never went online
async fn get_availability(
    State(state): State<AppState>,
    Path(worker_id): Path<WorkerId>,
) -> Json<Option<WorkerAvailability>> {
    Json(state.dispatcher.availability(&worker_id))
}

async fn set_availability(
    State(state): State<AppState>,
    Path(worker_id): Path<WorkerId>,
    Json(req): Json<AvailabilityRequest>,
) -> ApiResult<Json<WorkerAvailability>> {
    Ok(Json(
        state
            .dispatcher
            .set_availability(worker_id, req.kind, req.online)
            .await?,
    ))
}

async fn get_wallet(
    State(state): State<AppState>,
    Path(worker_id): Path<WorkerId>,
    Query(query): Query<WalletQuery>,
) -> ApiResult<Json<WalletSummary>> {
    let kind = query.kind.unwrap_or(TripKind::Ride);
    let platform_fee = state.dispatcher.config().fees.platform_fee(kind);
    let ledger = state.dispatcher.ledger();

    Ok(Json(WalletSummary {
        worker_id,
        balance: ledger.get_balance(&worker_id).await?,
        currency: CURRENCY,
        kind,
        platform_fee,
        capacity: ledger.transaction_capacity(&worker_id, platform_fee).await?,
        status: state.dispatcher.balance_status(&worker_id, kind).await?,
    }))
}

async fn list_transactions(
    State(state): State<AppState>,
    Path(worker_id): Path<WorkerId>,
) -> ApiResult<Json<Vec<WalletTransaction>>> {
    Ok(Json(state.dispatcher.ledger().transactions(&worker_id).await?))
}

async fn apply_transaction(
    State(state): State<AppState>,
    Path(worker_id): Path<WorkerId>,
    Json(req): Json<TransactionRequest>,
) -> ApiResult<(StatusCode, Json<TransactionResponse>)> {
    let balance = state
        .dispatcher
        .ledger()
        .apply_transaction(worker_id, req.amount, req.kind, req.trip_id, req.reference)
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(TransactionResponse { worker_id, balance }),
    ))
}

async fn reconcile_wallet(
    State(state): State<AppState>,
    Path(worker_id): Path<WorkerId>,
) -> ApiResult<Json<Reconciliation>> {
    Ok(Json(state.dispatcher.ledger().reconcile(&worker_id).await?))
}

async fn set_document_status(
    State(state): State<AppState>,
    Path((worker_id, document)): Path<(WorkerId, DocumentType)>,
    Json(req): Json<DocumentRequest>,
) -> StatusCode {
    state.kyc.set_status(worker_id, document, req.status);
    StatusCode::NO_CONTENT
}

// ============ ROUTER ============

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION, header::ACCEPT]);

    Router::new()
        // Health & metrics
        .route("/health", get(health_check))
        .route("/metrics", get(metrics))
        // Trips
        .route("/api/v1/trips", post(create_trip))
        .route("/api/v1/trips/available", get(list_available))
        .route("/api/v1/trips/feed", get(available_feed))
        .route("/api/v1/trips/:trip_id", get(get_trip))
        .route("/api/v1/trips/:trip_id/events", get(trip_events))
        .route("/api/v1/trips/:trip_id/accept", post(accept_trip))
        .route("/api/v1/trips/:trip_id/status", post(advance_status))
        .route("/api/v1/trips/:trip_id/cancel", post(cancel_trip))
        // Negotiation
        .route("/api/v1/trips/:trip_id/negotiation", post(propose_negotiation))
        .route(
            "/api/v1/trips/:trip_id/negotiation/accept",
            post(accept_negotiation),
        )
        .route(
            "/api/v1/trips/:trip_id/negotiation/reject",
            post(reject_negotiation),
        )
        // Workers
        .route("/api/v1/workers/:worker_id/trips", get(worker_trips))
        .route(
            "/api/v1/workers/:worker_id/availability",
            get(get_availability).put(set_availability),
        )
        .route("/api/v1/workers/:worker_id/wallet", get(get_wallet))
        .route(
            "/api/v1/workers/:worker_id/wallet/transactions",
            get(list_transactions).post(apply_transaction),
        )
        .route(
            "/api/v1/workers/:worker_id/wallet/reconcile",
            get(reconcile_wallet),
        )
        .route(
            "/api/v1/workers/:worker_id/documents/:document",
            put(set_document_status),
        )
        // Requesters
        .route("/api/v1/requesters/:requester_id/trips", get(requester_trips))
        // Middleware
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
