//! Merchant and product endpoints.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use common::{AccountId, MerchantId, Money, ProductId};
use saga::{InventoryRepository, InventoryService, Merchant, Product, QueryParams};
use serde::{Deserialize, Serialize};

use crate::auth::{Authenticated, RequestId};
use crate::error::ApiError;

#[derive(Deserialize)]
pub struct CreateMerchantRequest {
    pub name: String,
}

#[derive(Deserialize)]
pub struct CreateProductRequest {
    pub merchant_id: MerchantId,
    pub name: String,
    pub price_cents: i64,
    pub quantity: u32,
}

#[derive(Serialize)]
pub struct MerchantResponse {
    pub id: MerchantId,
    pub name: String,
    pub owner: AccountId,
    pub created_at: DateTime<Utc>,
}

impl From<Merchant> for MerchantResponse {
    fn from(merchant: Merchant) -> Self {
        Self {
            id: merchant.id,
            name: merchant.name,
            owner: merchant.owner,
            created_at: merchant.created_at,
        }
    }
}

#[derive(Serialize)]
pub struct ProductResponse {
    pub id: ProductId,
    pub merchant_id: MerchantId,
    pub name: String,
    pub price_cents: i64,
    pub quantity: u32,
    pub low_stock: bool,
}

impl From<Product> for ProductResponse {
    fn from(product: Product) -> Self {
        Self {
            low_stock: product.is_low_stock(),
            id: product.id,
            merchant_id: product.merchant_id,
            name: product.name,
            price_cents: product.price.cents(),
            quantity: product.quantity,
        }
    }
}

pub fn router<R: InventoryRepository + 'static>(service: Arc<InventoryService<R>>) -> Router {
    Router::new()
        .route(
            "/merchants",
            get(list_merchants::<R>).post(create_merchant::<R>),
        )
        .route("/products", get(list_products::<R>).post(create_product::<R>))
        .with_state(service)
}

/// POST /merchants
#[tracing::instrument(skip(service, request_id, claims, req), fields(request_id = %request_id.0))]
pub async fn create_merchant<R: InventoryRepository + 'static>(
    State(service): State<Arc<InventoryService<R>>>,
    request_id: RequestId,
    Authenticated(claims): Authenticated,
    Json(req): Json<CreateMerchantRequest>,
) -> Result<(StatusCode, Json<MerchantResponse>), ApiError> {
    let merchant = service
        .create_merchant(&request_id.0, &claims, &req.name)
        .await?;
    Ok((StatusCode::CREATED, Json(merchant.into())))
}

/// GET /merchants
pub async fn list_merchants<R: InventoryRepository + 'static>(
    State(service): State<Arc<InventoryService<R>>>,
    Authenticated(claims): Authenticated,
    Query(query): Query<QueryParams>,
) -> Result<Json<Vec<MerchantResponse>>, ApiError> {
    let merchants = service.list_merchants(&claims, &query).await?;
    Ok(Json(merchants.into_iter().map(Into::into).collect()))
}

/// POST /products
#[tracing::instrument(skip(service, request_id, claims, req), fields(request_id = %request_id.0))]
pub async fn create_product<R: InventoryRepository + 'static>(
    State(service): State<Arc<InventoryService<R>>>,
    request_id: RequestId,
    Authenticated(claims): Authenticated,
    Json(req): Json<CreateProductRequest>,
) -> Result<(StatusCode, Json<ProductResponse>), ApiError> {
    let product = service
        .create_product(
            &request_id.0,
            &claims,
            req.merchant_id,
            &req.name,
            Money::from_cents(req.price_cents),
            req.quantity,
        )
        .await?;
    Ok((StatusCode::CREATED, Json(product.into())))
}

/// GET /products
pub async fn list_products<R: InventoryRepository + 'static>(
    State(service): State<Arc<InventoryService<R>>>,
    Authenticated(claims): Authenticated,
    Query(query): Query<QueryParams>,
) -> Result<Json<Vec<ProductResponse>>, ApiError> {
    let products = service.list_products(&claims, &query).await?;
    Ok(Json(products.into_iter().map(Into::into).collect()))
}
