//! Per-request middleware and identity extractors.
//!
//! The middleware runs ahead of every handler. It passes OPTIONS through
//! untouched, evaluates the authorization chain, and attaches the decoded
//! session identity to request extensions when one is present. It never
//! blocks page-style requests from reaching their handler; rendering a
//! login form is the handler's job, not the middleware's.

use axum::extract::{FromRequestParts, Request, State};
use axum::http::{HeaderMap, Method, header, request::Parts};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum_extra::extract::CookieJar;
use std::collections::BTreeMap;

use gatehouse_access::{ChainOutcome, Identity, RequestFacts};

use super::AuthState;
use crate::error::ApiError;

/// The identity attached to the request, when a session decoded.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub Option<Identity>);

/// Extractor requiring an authenticated identity; rejects with 401 JSON.
#[derive(Debug, Clone)]
pub struct RequireUser(pub Identity);

impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(parts
            .extensions
            .get::<CurrentUser>()
            .cloned()
            .unwrap_or(CurrentUser(None)))
    }
}

impl<S> FromRequestParts<S> for RequireUser
where
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        match parts.extensions.get::<CurrentUser>() {
            Some(CurrentUser(Some(identity))) => Ok(RequireUser(identity.clone())),
            _ => Err(ApiError::Unauthorized {
                message: "Unauthorized".to_string(),
            }
            .into_response()),
        }
    }
}

/// The per-request middleware installed by the gateway.
pub async fn auth_middleware(
    State(state): State<AuthState>,
    mut request: Request,
    next: Next,
) -> Response {
    if request.method() == Method::OPTIONS {
        return next.run(request).await;
    }

    let facts = request_facts(&request);
    match state.authz.evaluate(&facts) {
        ChainOutcome::Granted => {
            tracing::debug!(path = %facts.path, "request authorized by chain");
            return next.run(request).await;
        }
        ChainOutcome::Denied => {
            tracing::warn!(path = %facts.path, host = ?facts.host, "request denied by authorization chain");
            return ApiError::Forbidden {
                message: "request not authorized".to_string(),
            }
            .into_response();
        }
        ChainOutcome::NoChain => {}
    }

    let identity = session_identity(&state, request.headers()).await;
    request.extensions_mut().insert(CurrentUser(identity));
    next.run(request).await
}

/// Decodes the session cookie into an identity, failing softly.
async fn session_identity(state: &AuthState, headers: &HeaderMap) -> Option<Identity> {
    let jar = CookieJar::from_headers(headers);
    let handle = jar.get(&state.sessions.cookie().name)?.value().to_string();
    let session = state.sessions.decode(&handle).await?;
    Some(session.identity().clone())
}

/// Distills the request into the facts the authorization chain sees.
fn request_facts(request: &Request) -> RequestFacts {
    let mut headers = BTreeMap::new();
    for (name, value) in request.headers() {
        if let Ok(value) = value.to_str() {
            headers.insert(name.as_str().to_lowercase(), value.to_string());
        }
    }

    let host = request
        .headers()
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .or_else(|| request.uri().host().map(str::to_string));

    RequestFacts {
        method: request.method().as_str().to_string(),
        path: request.uri().path().to_string(),
        host,
        headers,
    }
}
