//! Order endpoints.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use common::{OrderId, ProductId};
use saga::{Order, OrderRepository, OrderService, QueryParams};
use serde::{Deserialize, Serialize};

use crate::auth::{Authenticated, RequestId};
use crate::error::ApiError;

// -- Request types --

#[derive(Deserialize)]
pub struct CreateOrderRequest {
    pub product_id: ProductId,
    pub quantity: u32,
}

// -- Response types --

#[derive(Serialize)]
pub struct OrderResponse {
    pub id: OrderId,
    pub product_id: ProductId,
    pub quantity: u32,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Order> for OrderResponse {
    fn from(order: Order) -> Self {
        Self {
            id: order.id,
            product_id: order.product_id,
            quantity: order.quantity,
            status: order.status.to_string(),
            created_at: order.created_at,
            updated_at: order.updated_at,
        }
    }
}

// -- Handlers --

pub fn router<R: OrderRepository + 'static>(service: Arc<OrderService<R>>) -> Router {
    Router::new()
        .route("/orders", get(list::<R>).post(create::<R>))
        .with_state(service)
}

/// POST /orders: Place an order. The saga continues asynchronously; the
/// response carries the initial `pending` status.
#[tracing::instrument(skip(service, request_id, claims, req), fields(request_id = %request_id.0))]
pub async fn create<R: OrderRepository + 'static>(
    State(service): State<Arc<OrderService<R>>>,
    request_id: RequestId,
    Authenticated(claims): Authenticated,
    Json(req): Json<CreateOrderRequest>,
) -> Result<(StatusCode, Json<OrderResponse>), ApiError> {
    let order = service
        .create_order(&request_id.0, &claims, req.product_id, req.quantity)
        .await?;
    Ok((StatusCode::CREATED, Json(order.into())))
}

/// GET /orders: The caller's orders with their current status, newest
/// first unless `orderby` says otherwise.
pub async fn list<R: OrderRepository + 'static>(
    State(service): State<Arc<OrderService<R>>>,
    Authenticated(claims): Authenticated,
    Query(query): Query<QueryParams>,
) -> Result<Json<Vec<OrderResponse>>, ApiError> {
    let orders = service.list_orders(&claims, &query).await?;
    Ok(Json(orders.into_iter().map(Into::into).collect()))
}
