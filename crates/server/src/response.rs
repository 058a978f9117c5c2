//! Rate limit headers and the rejection response shared by the layer and the
//! admission endpoint.

use axum::{
    Json,
    response::{IntoResponse, Response},
};
use http::{HeaderMap, HeaderValue, StatusCode, header::RETRY_AFTER};
use rate_limit::{Admission, RateLimitExceeded};
use serde::Serialize;

pub(crate) const X_RATELIMIT_LIMIT: &str = "x-ratelimit-limit";
pub(crate) const X_RATELIMIT_REMAINING: &str = "x-ratelimit-remaining";
pub(crate) const X_RATELIMIT_RESET: &str = "x-ratelimit-reset";

const EXCEEDED_CODE: &str = "ratelimit/exceeded";
const EXCEEDED_MESSAGE: &str = "Rate limit exceeded. Please try again later.";

#[derive(Debug, Serialize)]
pub(crate) struct Issues {
    issues: Vec<Issue>,
}

#[derive(Debug, Serialize)]
struct Issue {
    code: &'static str,
    message: String,
}

impl Issues {
    pub(crate) fn single(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            issues: vec![Issue {
                code,
                message: message.into(),
            }],
        }
    }
}

/// Adds the quota triad of an admitted operation.
pub(crate) fn insert_admission_headers(headers: &mut HeaderMap, admission: &Admission) {
    insert_triad(headers, admission.limit, admission.remaining, admission.reset_epoch_seconds());
}

/// 429 with a retry hint and the quota triad.
pub(crate) fn rejection(exceeded: &RateLimitExceeded) -> Response {
    let body = Issues::single(EXCEEDED_CODE, EXCEEDED_MESSAGE);
    let mut response = (StatusCode::TOO_MANY_REQUESTS, Json(body)).into_response();

    let headers = response.headers_mut();
    headers.insert(RETRY_AFTER, HeaderValue::from(exceeded.retry_after_seconds));
    insert_triad(headers, exceeded.limit, exceeded.remaining, exceeded.reset_epoch_seconds);

    response
}

fn insert_triad(headers: &mut HeaderMap, limit: u32, remaining: u32, reset: i64) {
    headers.insert(X_RATELIMIT_LIMIT, HeaderValue::from(limit));
    headers.insert(X_RATELIMIT_REMAINING, HeaderValue::from(remaining));
    headers.insert(X_RATELIMIT_RESET, HeaderValue::from(reset));
}
