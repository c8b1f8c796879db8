//! Response classification.
//!
//! Maps transport status codes and a small table of known body markers onto
//! [`AttemptOutcome`]. The marker tables are plain data so they can be
//! updated and tested without touching any strategy.

use super::types::{AttemptOutcome, FatalCause};
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::StatusCode;
use std::time::Duration;

pub(crate) const RATE_LIMIT_MARKERS: [&str; 5] = [
    "please wait a few minutes",
    "rate limit",
    "too many requests",
    "try again later",
    "\"spam\":true",
];

pub(crate) const BLOCK_MARKERS: [&str; 12] = [
    "challenge_required",
    "checkpoint_required",
    "suspicious activity",
    "verify you are a human",
    "please complete the captcha",
    "captcha challenge",
    "unusual activity",
    "automated behavior",
    "we restrict certain activity",
    "blocked",
    "login_required",
    "bot detection",
];

pub(crate) const UNAVAILABLE_MARKERS: [&str; 4] = [
    "sorry, this page isn't available",
    "post isn't available",
    "media not found or unavailable",
    "this content isn't available",
];

pub(crate) const PRIVATE_MARKERS: [&str; 2] = ["this account is private", "\"is_private\":true"];

/// Find the first marker contained in an already lowercased body.
pub(crate) fn find_marker(lower: &str, markers: &[&'static str]) -> Option<&'static str> {
    markers.iter().copied().find(|marker| lower.contains(marker))
}

/// Parse a `Retry-After` header given in seconds.
pub(crate) fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

/// Classify a non-success status.
///
/// Returns `None` for 2xx, leaving the body to the caller's extractor.
pub(crate) fn classify_status(
    status: StatusCode,
    headers: &HeaderMap,
    body: &str,
) -> Option<AttemptOutcome> {
    if status.is_success() {
        return None;
    }

    let lower = body.to_ascii_lowercase();
    let outcome = match status {
        StatusCode::TOO_MANY_REQUESTS => AttemptOutcome::RateLimited(retry_after(headers)),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            if let Some(marker) = find_marker(&lower, &PRIVATE_MARKERS) {
                tracing::debug!(marker, "private marker on {}", status.as_u16());
                AttemptOutcome::Fatal(FatalCause::Private)
            } else {
                AttemptOutcome::Blocked(format!("status {}", status.as_u16()))
            }
        }
        StatusCode::NOT_FOUND | StatusCode::GONE => AttemptOutcome::Fatal(FatalCause::Unavailable),
        s if s.is_server_error() => {
            AttemptOutcome::TransientError(format!("status {} (server error)", s.as_u16()))
        }
        s => {
            // 400 is how the login and API endpoints report throttling and checkpoints
            if find_marker(&lower, &RATE_LIMIT_MARKERS).is_some() {
                AttemptOutcome::RateLimited(retry_after(headers))
            } else if let Some(marker) = find_marker(&lower, &BLOCK_MARKERS) {
                AttemptOutcome::Blocked(marker.to_string())
            } else {
                AttemptOutcome::TransientError(format!("status {}", s.as_u16()))
            }
        }
    };
    Some(outcome)
}

/// Classify a 2xx body that carries no media.
///
/// Order matters: an unavailable/private page also tends to include login prompts.
pub(crate) fn classify_body(body: &str) -> Option<AttemptOutcome> {
    let lower = body.to_ascii_lowercase();

    if find_marker(&lower, &UNAVAILABLE_MARKERS).is_some() {
        return Some(AttemptOutcome::Fatal(FatalCause::Unavailable));
    }
    if find_marker(&lower, &PRIVATE_MARKERS).is_some() {
        return Some(AttemptOutcome::Fatal(FatalCause::Private));
    }
    if find_marker(&lower, &RATE_LIMIT_MARKERS).is_some() {
        return Some(AttemptOutcome::RateLimited(None));
    }
    if let Some(marker) = find_marker(&lower, &BLOCK_MARKERS) {
        return Some(AttemptOutcome::Blocked(marker.to_string()));
    }
    None
}

/// Classify a transport-level failure.
pub(crate) fn classify_transport(err: &reqwest::Error) -> AttemptOutcome {
    if err.is_timeout() {
        AttemptOutcome::TransientError("request timed out".into())
    } else if err.is_connect() {
        AttemptOutcome::TransientError(format!("connection failed: {err}"))
    } else if let Some(status) = err.status() {
        classify_status(status, &HeaderMap::new(), "")
            .unwrap_or_else(|| AttemptOutcome::TransientError(err.to_string()))
    } else {
        AttemptOutcome::TransientError(format!("request failed: {err}"))
    }
}
