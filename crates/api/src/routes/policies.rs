//! Authorization endpoints. Internal to the deployment: no claims are
//! checked here.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{delete, get};
use axum::{Json, Router};
use events::PolicyTarget;
use policy::{Grant, PoliciesResponse};
use saga::{AuthzService, PolicyRepository};
use serde::Deserialize;

use crate::auth::RequestId;
use crate::error::ApiError;

#[derive(Debug, Deserialize)]
pub struct ListPoliciesQuery {
    pub sub: String,
    pub resource_type: Option<String>,
}

pub fn router<R: PolicyRepository + 'static>(service: Arc<AuthzService<R>>) -> Router {
    Router::new()
        .route(
            "/policies",
            get(list::<R>).put(upsert::<R>).delete(remove::<R>),
        )
        .route("/policies/{sub}", delete(remove_for_sub::<R>))
        .with_state(service)
}

/// GET /policies?sub=&resource_type=: Grants in `sub:rtype:act:rid` form.
///
/// This is what the other services' policy caches call on a miss.
pub async fn list<R: PolicyRepository + 'static>(
    State(service): State<Arc<AuthzService<R>>>,
    Query(query): Query<ListPoliciesQuery>,
) -> Result<Json<PoliciesResponse>, ApiError> {
    if query.sub.is_empty() {
        return Err(ApiError::BadRequest("sub is required".to_string()));
    }
    let policies = service
        .list_policies(&query.sub, query.resource_type.as_deref())
        .await?;
    Ok(Json(PoliciesResponse { policies }))
}

/// PUT /policies
#[tracing::instrument(skip(service, request_id), fields(request_id = %request_id.0))]
pub async fn upsert<R: PolicyRepository + 'static>(
    State(service): State<Arc<AuthzService<R>>>,
    request_id: RequestId,
    Json(target): Json<PolicyTarget>,
) -> Result<StatusCode, ApiError> {
    service
        .upsert_policy(&request_id.0, Grant::from(target))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// DELETE /policies
#[tracing::instrument(skip(service, request_id), fields(request_id = %request_id.0))]
pub async fn remove<R: PolicyRepository + 'static>(
    State(service): State<Arc<AuthzService<R>>>,
    request_id: RequestId,
    Json(target): Json<PolicyTarget>,
) -> Result<StatusCode, ApiError> {
    service
        .remove_policy(&request_id.0, Grant::from(target))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// DELETE /policies/{sub}: Revokes everything `sub` holds.
#[tracing::instrument(skip(service, request_id), fields(request_id = %request_id.0))]
pub async fn remove_for_sub<R: PolicyRepository + 'static>(
    State(service): State<Arc<AuthzService<R>>>,
    request_id: RequestId,
    Path(sub): Path<String>,
) -> Result<StatusCode, ApiError> {
    let account_id = sub
        .parse()
        .map_err(|_| ApiError::BadRequest(format!("invalid subject: {sub}")))?;
    service
        .remove_policies_for_sub(&request_id.0, account_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
