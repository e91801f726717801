//! Auth Middleware: decode the `X-Signature` header, load the Auth
//! record, verify the body MAC, and bind the principal onto the request
//! before it reaches the Renewal Handler.

pub mod signature;

use axum::{
    body::{Body, Bytes},
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::Response,
};

use crate::error::AppError;
use crate::state::AppState;

/// `(owner_id, authorized_domains, raw_body)` bound onto the request by
/// `require_signature`, consumed by the renewal handler.
#[derive(Clone)]
pub struct Principal {
    pub owner_id: i64,
    pub authorized_domains: Vec<String>,
    pub raw_body: Bytes,
}

pub async fn require_signature(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let header_value = request
        .headers()
        .get("X-Signature")
        .and_then(|v| v.to_str().ok())
        .ok_or(AppError::Forbidden)?
        .to_string();

    let parsed = signature::parse(&header_value).map_err(|e| {
        tracing::info!(error = %e, "rejecting request: bad signature header");
        AppError::Forbidden
    })?;

    let (parts, body) = request.into_parts();
    let raw_body = axum::body::to_bytes(body, state.throttle().max_body_bytes)
        .await
        .map_err(|_| AppError::PayloadTooLarge)?;

    let rows = state.repo().select_auth_by_token_id(parsed.token_id).await?;
    let auth = match rows.into_iter().next() {
        Some(auth) if !auth.locked && !auth.domains.is_empty() => auth,
        _ => {
            tracing::info!(token_id = %parsed.token_id, "rejecting request: unknown or locked token");
            return Err(AppError::Forbidden);
        }
    };

    if !signature::verify(parsed.algorithm, auth.token_key.as_bytes(), &raw_body, &parsed.mac) {
        tracing::info!(token_id = %parsed.token_id, "rejecting request: signature mismatch");
        return Err(AppError::Forbidden);
    }

    let principal = Principal {
        owner_id: auth.id,
        authorized_domains: auth.domains,
        raw_body: raw_body.clone(),
    };

    let mut request = Request::from_parts(parts, Body::from(raw_body));
    request.extensions_mut().insert(principal);

    Ok(next.run(request).await)
}

impl axum::extract::FromRequestParts<AppState> for Principal {
    type Rejection = (StatusCode, &'static str);

    fn from_request_parts<'a, 'b, 'c>(
        parts: &'a mut axum::http::request::Parts,
        _state: &'b AppState,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<Self, Self::Rejection>> + Send + 'c>>
    where
        'a: 'c,
        'b: 'c,
    {
        let result = parts
            .extensions
            .get::<Principal>()
            .cloned()
            .ok_or((StatusCode::INTERNAL_SERVER_ERROR, "missing principal"));
        Box::pin(async move { result })
    }
}
