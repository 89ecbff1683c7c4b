//! API Routes
//!
//! HTTP endpoint definitions.

use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        Path, Query, State,
    },
    http::{header, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::domain::{Account, DomainError, TransactionKind, TransactionRecord};
use crate::error::AppError;
use crate::metrics;
use crate::handlers::{
    AccountHandler, ApplyTransactionCommand, BalanceMutator, CreateAccountCommand,
};

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub mutator: Arc<BalanceMutator>,
    pub accounts: Arc<AccountHandler>,
}

// =========================================================================
// Request/Response types
// =========================================================================

#[derive(Debug, Deserialize)]
pub struct CreateAccountRequest {
    pub name: String,
    pub email: String,
    #[serde(default, alias = "initial_balance")]
    pub balance: Option<Decimal>,
}

#[derive(Debug, Deserialize)]
pub struct CreateTransactionRequest {
    pub account_id: Uuid,
    pub amount: Decimal,
    #[serde(alias = "type")]
    pub kind: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    #[serde(default)]
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub account_id: Uuid,
    pub transactions: Vec<TransactionRecord>,
}

// =========================================================================
// API Router
// =========================================================================

/// Create the API router
pub fn create_router() -> Router<AppState> {
    Router::new()
        .route("/accounts", post(create_account))
        .route("/accounts/:account_id", get(get_account))
        .route("/accounts/:account_id/transactions", get(get_account_transactions))
        .route("/transactions", post(create_transaction))
}

// Extractor rejections are validation failures like any other bad input

fn json_body<T>(body: Result<Json<T>, JsonRejection>) -> Result<T, AppError> {
    body.map(|Json(value)| value)
        .map_err(|e| DomainError::validation(e.body_text()).into())
}

fn path_id(path: Result<Path<Uuid>, PathRejection>) -> Result<Uuid, AppError> {
    path.map(|Path(id)| id)
        .map_err(|e| DomainError::validation(e.body_text()).into())
}

fn query_params<T>(query: Result<Query<T>, QueryRejection>) -> Result<T, AppError> {
    query
        .map(|Query(value)| value)
        .map_err(|e| DomainError::validation(e.body_text()).into())
}

// =========================================================================
// POST /accounts
// =========================================================================

/// Open an account
async fn create_account(
    State(state): State<AppState>,
    body: Result<Json<CreateAccountRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Account>), AppError> {
    let request = json_body(body)?;
    let command = CreateAccountCommand::parse(&request.name, &request.email, request.balance)?;

    let account = state.accounts.create(command).await?;
    Ok((StatusCode::CREATED, Json(account)))
}

// =========================================================================
// GET /accounts/:account_id
// =========================================================================

async fn get_account(
    State(state): State<AppState>,
    path: Result<Path<Uuid>, PathRejection>,
) -> Result<Json<Account>, AppError> {
    let account_id = path_id(path)?;
    let account = state.accounts.get(account_id).await?;
    Ok(Json(account))
}

// =========================================================================
// GET /accounts/:account_id/transactions
// =========================================================================

async fn get_account_transactions(
    State(state): State<AppState>,
    path: Result<Path<Uuid>, PathRejection>,
    query: Result<Query<HistoryQuery>, QueryRejection>,
) -> Result<Json<HistoryResponse>, AppError> {
    let account_id = path_id(path)?;
    let query = query_params(query)?;
    let transactions = state.accounts.history(account_id, query.limit).await?;
    Ok(Json(HistoryResponse {
        account_id,
        transactions,
    }))
}

// =========================================================================
// POST /transactions
// =========================================================================

/// Metric label for requests whose kind could not be read
const UNKNOWN_KIND: &str = "unknown";

/// Count a request rejected before it reached the mutator
fn rejected_transaction(kind: &str, error: AppError) -> AppError {
    metrics::record_transaction(kind, error.code());
    error
}

/// Debit or credit an account
async fn create_transaction(
    State(state): State<AppState>,
    body: Result<Json<CreateTransactionRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<TransactionRecord>), AppError> {
    let request = json_body(body).map_err(|e| rejected_transaction(UNKNOWN_KIND, e))?;
    let kind = request
        .kind
        .parse::<TransactionKind>()
        .map(|k| k.as_str())
        .unwrap_or(UNKNOWN_KIND);
    let command = ApplyTransactionCommand::parse(
        request.account_id,
        request.amount,
        &request.kind,
        request.description,
    )
    .map_err(|e| rejected_transaction(kind, e.into()))?;

    let record = state.mutator.apply(command).await?;
    Ok((StatusCode::CREATED, Json(record)))
}

// =========================================================================
// Operational endpoints
// =========================================================================

/// Health check endpoint
pub async fn health_check() -> &'static str {
    "OK"
}

/// Prometheus exposition endpoint
pub async fn metrics_handler() -> Result<impl IntoResponse, AppError> {
    let body = crate::metrics::render().map_err(|e| AppError::Internal(e.to_string()))?;
    Ok((
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        body,
    ))
}
