//! Forward-auth endpoint.
//!
//! A reverse proxy asks for a verdict on the request it is about to forward, described
//! by `X-Forwarded-Method` and `X-Forwarded-Uri`. The caller is resolved from the same
//! headers the network layer uses.

use std::sync::Arc;

use axum::{
    Json,
    extract::{Request, State},
    response::{IntoResponse, Response},
};
use http::{HeaderMap, Method, StatusCode, Uri};
use rate_limit::{Operation, RateLimitManager};

use crate::{client_identification::ClientResolver, response};

pub(crate) const X_FORWARDED_METHOD: &str = "x-forwarded-method";
pub(crate) const X_FORWARDED_URI: &str = "x-forwarded-uri";

#[derive(Clone)]
pub(crate) struct AdmissionState {
    pub(crate) manager: Arc<RateLimitManager>,
    pub(crate) resolver: Arc<ClientResolver>,
}

#[derive(Debug, thiserror::Error)]
enum ForwardedRequestError {
    #[error("Missing {0} header")]
    MissingHeader(&'static str),
    #[error("Invalid {0} header")]
    InvalidHeader(&'static str),
}

impl IntoResponse for ForwardedRequestError {
    fn into_response(self) -> Response {
        let body = response::Issues::single("admission/invalid-request", self.to_string());
        (StatusCode::BAD_REQUEST, Json(body)).into_response()
    }
}

/// 204 with the quota triad when the forwarded request may proceed, 429 otherwise.
pub(crate) async fn admission(State(state): State<AdmissionState>, request: Request) -> Response {
    let (method, uri) = match forwarded_request(request.headers()) {
        Ok(forwarded) => forwarded,
        Err(error) => {
            log::debug!("Invalid admission request: {error}");
            return error.into_response();
        }
    };

    if !state.manager.is_enabled() {
        return StatusCode::NO_CONTENT.into_response();
    }

    let context = state.resolver.resolve(&request);
    let (tier, verdict) = state
        .manager
        .check_operation(&Operation::new(&method, &uri), &context)
        .await;

    match verdict.into_result() {
        Ok(admission) => {
            let mut response = StatusCode::NO_CONTENT.into_response();
            response::insert_admission_headers(response.headers_mut(), &admission);

            response
        }
        Err(exceeded) => {
            log::debug!("Rejected forwarded {method} {} on tier {tier}", uri.path());
            response::rejection(&exceeded)
        }
    }
}

fn forwarded_request(headers: &HeaderMap) -> Result<(Method, Uri), ForwardedRequestError> {
    let header = |name: &'static str| {
        headers
            .get(name)
            .ok_or(ForwardedRequestError::MissingHeader(name))?
            .to_str()
            .map_err(|_| ForwardedRequestError::InvalidHeader(name))
    };

    let method = Method::from_bytes(header(X_FORWARDED_METHOD)?.trim().as_bytes())
        .map_err(|_| ForwardedRequestError::InvalidHeader(X_FORWARDED_METHOD))?;

    let uri = header(X_FORWARDED_URI)?
        .trim()
        .parse::<Uri>()
        .map_err(|_| ForwardedRequestError::InvalidHeader(X_FORWARDED_URI))?;

    Ok((method, uri))
}
