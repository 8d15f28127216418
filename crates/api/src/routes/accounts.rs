//! Identity endpoints.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{delete, get};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use common::{AccountId, Role};
use saga::{Account, AccountRepository, IdentityService, QueryParams};
use serde::{Deserialize, Serialize};

use crate::auth::{Authenticated, RequestId};
use crate::error::ApiError;

#[derive(Deserialize)]
pub struct CreateAccountRequest {
    pub name: String,
    pub email: String,
    pub role: Role,
}

#[derive(Serialize)]
pub struct AccountResponse {
    pub id: AccountId,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

impl From<Account> for AccountResponse {
    fn from(account: Account) -> Self {
        Self {
            id: account.id,
            name: account.name,
            email: account.email,
            role: account.role,
            created_at: account.created_at,
        }
    }
}

pub fn router<R: AccountRepository + 'static>(service: Arc<IdentityService<R>>) -> Router {
    Router::new()
        .route("/accounts", get(list::<R>).post(create::<R>))
        .route("/accounts/{id}", delete(remove::<R>))
        .with_state(service)
}

/// POST /accounts: Register an account. No claims required.
#[tracing::instrument(skip(service, request_id, req), fields(request_id = %request_id.0))]
pub async fn create<R: AccountRepository + 'static>(
    State(service): State<Arc<IdentityService<R>>>,
    request_id: RequestId,
    Json(req): Json<CreateAccountRequest>,
) -> Result<(StatusCode, Json<AccountResponse>), ApiError> {
    let account = service
        .create_account(&request_id.0, &req.name, &req.email, req.role)
        .await?;
    Ok((StatusCode::CREATED, Json(account.into())))
}

/// GET /accounts?page=&page_size=&orderby=: Accounts visible to the caller.
pub async fn list<R: AccountRepository + 'static>(
    State(service): State<Arc<IdentityService<R>>>,
    Authenticated(claims): Authenticated,
    Query(query): Query<QueryParams>,
) -> Result<Json<Vec<AccountResponse>>, ApiError> {
    let accounts = service.list_accounts(&claims, &query).await?;
    Ok(Json(accounts.into_iter().map(Into::into).collect()))
}

/// DELETE /accounts/{id}
#[tracing::instrument(skip(service, request_id, claims), fields(request_id = %request_id.0))]
pub async fn remove<R: AccountRepository + 'static>(
    State(service): State<Arc<IdentityService<R>>>,
    request_id: RequestId,
    Authenticated(claims): Authenticated,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let id: AccountId = id
        .parse()
        .map_err(|_| ApiError::BadRequest(format!("invalid account id: {id}")))?;
    service.delete_account(&request_id.0, &claims, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
