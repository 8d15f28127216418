//! Wallet and ledger endpoints.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use common::{Money, OrderId, TransactionId};
use saga::{PaymentRepository, PaymentService, QueryParams, Transaction};
use serde::{Deserialize, Serialize};

use crate::auth::{Authenticated, RequestId};
use crate::error::ApiError;

#[derive(Deserialize)]
pub struct RechargeRequest {
    pub amount_cents: i64,
}

#[derive(Serialize)]
pub struct TransactionResponse {
    pub id: TransactionId,
    pub amount_cents: i64,
    pub is_credit: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_id: Option<OrderId>,
    pub created_at: DateTime<Utc>,
}

impl From<Transaction> for TransactionResponse {
    fn from(tx: Transaction) -> Self {
        Self {
            id: tx.id,
            amount_cents: tx.amount.cents(),
            is_credit: tx.is_credit,
            order_id: tx.order_id,
            created_at: tx.created_at,
        }
    }
}

pub fn router<R: PaymentRepository + 'static>(service: Arc<PaymentService<R>>) -> Router {
    Router::new()
        .route("/wallet/recharge", post(recharge::<R>))
        .route("/transactions", get(list::<R>))
        .with_state(service)
}

/// POST /wallet/recharge
#[tracing::instrument(skip(service, request_id, claims, req), fields(request_id = %request_id.0))]
pub async fn recharge<R: PaymentRepository + 'static>(
    State(service): State<Arc<PaymentService<R>>>,
    request_id: RequestId,
    Authenticated(claims): Authenticated,
    Json(req): Json<RechargeRequest>,
) -> Result<(StatusCode, Json<TransactionResponse>), ApiError> {
    let tx = service
        .recharge_wallet(&request_id.0, &claims, Money::from_cents(req.amount_cents))
        .await?;
    Ok((StatusCode::CREATED, Json(tx.into())))
}

/// GET /transactions
pub async fn list<R: PaymentRepository + 'static>(
    State(service): State<Arc<PaymentService<R>>>,
    Authenticated(claims): Authenticated,
    Query(query): Query<QueryParams>,
) -> Result<Json<Vec<TransactionResponse>>, ApiError> {
    let transactions = service.list_transactions(&claims, &query).await?;
    Ok(Json(transactions.into_iter().map(Into::into).collect()))
}
