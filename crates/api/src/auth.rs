//! Request extractors for caller identity and correlation.
//!
//! Authentication happens upstream. The verified claims arrive as headers
//! and are trusted as given.

use std::convert::Infallible;

use axum::extract::FromRequestParts;
use axum::http::HeaderMap;
use axum::http::request::Parts;
use common::{AccountId, Claims, CorrelationId, Role};

use crate::error::ApiError;

pub const ACCOUNT_ID_HEADER: &str = "x-account-id";
pub const ACCOUNT_EMAIL_HEADER: &str = "x-account-email";
pub const ACCOUNT_ROLE_HEADER: &str = "x-account-role";
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Claims of the calling account. Rejects with 401 when absent.
#[derive(Debug, Clone)]
pub struct Authenticated(pub Claims);

impl<S: Send + Sync> FromRequestParts<S> for Authenticated {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let headers = &parts.headers;
        let account_id: AccountId = parse_header(headers, ACCOUNT_ID_HEADER)?;
        let role: Role = parse_header(headers, ACCOUNT_ROLE_HEADER)?;
        let email = header(headers, ACCOUNT_EMAIL_HEADER).unwrap_or_default();
        Ok(Authenticated(Claims::new(account_id, email, role)))
    }
}

/// Correlation ID for the unit of work a request starts. Taken from
/// `x-request-id` or generated.
#[derive(Debug, Clone)]
pub struct RequestId(pub CorrelationId);

impl<S: Send + Sync> FromRequestParts<S> for RequestId {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let id = header(&parts.headers, REQUEST_ID_HEADER)
            .map(CorrelationId::new)
            .unwrap_or_else(CorrelationId::generate);
        Ok(RequestId(id))
    }
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

fn parse_header<T: std::str::FromStr>(headers: &HeaderMap, name: &str) -> Result<T, ApiError> {
    let value = header(headers, name)
        .ok_or_else(|| ApiError::Unauthorized(format!("missing {name} header")))?;
    value
        .parse()
        .map_err(|_| ApiError::Unauthorized(format!("invalid {name} header: {value}")))
}
