//! HTTP response building
//!
//! The only place where pipeline results and errors become status codes
//! and headers. Successful artifacts are served with conditional-GET and
//! single-range support; placeholders and errors are served whole with the
//! short error freshness window.

use axum::{
    body::Body,
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{error, info};

use crate::errors::{AppError, HttpError};
use crate::orchestrator::ServedImage;

/// Freshness windows advertised in `Cache-Control`
#[derive(Debug, Clone, Copy)]
pub struct CachePolicy {
    pub max_age: Duration,
    pub error_max_age: Duration,
}

/// `max-age=<seconds>, public`
pub fn cache_control(max_age: Duration) -> HeaderValue {
    HeaderValue::from_str(&format!("max-age={}, public", max_age.as_secs()))
        .unwrap_or_else(|_| HeaderValue::from_static("public"))
}

/// IMF-fixdate, e.g. `Wed, 21 Oct 2015 07:28:00 GMT`
pub fn http_date(time: SystemTime) -> String {
    DateTime::<Utc>::from(time)
        .format("%a, %d %b %Y %H:%M:%S GMT")
        .to_string()
}

pub fn parse_http_date(value: &str) -> Option<SystemTime> {
    DateTime::parse_from_rfc2822(value.trim())
        .ok()
        .map(SystemTime::from)
}

/// HTTP dates have second granularity
fn truncate_to_seconds(time: SystemTime) -> SystemTime {
    match time.duration_since(UNIX_EPOCH) {
        Ok(elapsed) => UNIX_EPOCH + Duration::from_secs(elapsed.as_secs()),
        Err(_) => time,
    }
}

/// Interpretation of a `Range` header against a known length
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteRange {
    /// No usable single range; serve everything
    Full,
    /// Inclusive byte positions
    Partial { start: u64, end: u64 },
    Unsatisfiable,
}

pub fn parse_range(value: &str, len: u64) -> ByteRange {
    let Some(specs) = value.trim().strip_prefix("bytes=") else {
        return ByteRange::Unsatisfiable;
    };
    if len == 0 {
        return ByteRange::Full;
    }

    let mut ranges = Vec::new();
    for spec in specs.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let Some((start, end)) = spec.split_once('-') else {
            return ByteRange::Unsatisfiable;
        };
        let (start, end) = (start.trim(), end.trim());

        if start.is_empty() {
            // Suffix range: the last N bytes
            match end.parse::<u64>() {
                Ok(0) => continue,
                Ok(suffix) => ranges.push((len.saturating_sub(suffix), len - 1)),
                Err(_) => return ByteRange::Unsatisfiable,
            }
            continue;
        }

        let Ok(start) = start.parse::<u64>() else {
            return ByteRange::Unsatisfiable;
        };
        let end = if end.is_empty() {
            len - 1
        } else {
            match end.parse::<u64>() {
                Ok(end) if end >= start => end.min(len - 1),
                _ => return ByteRange::Unsatisfiable,
            }
        };
        if start >= len {
            continue;
        }
        ranges.push((start, end));
    }

    match ranges.as_slice() {
        [] => ByteRange::Unsatisfiable,
        [(start, end)] => ByteRange::Partial {
            start: *start,
            end: *end,
        },
        _ => ByteRange::Full,
    }
}

/// Build the response for a served artifact
pub fn image_response(request_headers: &HeaderMap, served: &ServedImage, policy: &CachePolicy) -> Response {
    let content_type = served.content_type();

    if served.placeholder {
        info!("== RESP == {} {}", served.status.as_u16(), served.key);
        return (
            served.status,
            [
                (header::CACHE_CONTROL, cache_control(policy.error_max_age)),
                (header::CONTENT_TYPE, header_value(&content_type)),
            ],
            Body::from(served.artifact.content.clone()),
        )
            .into_response();
    }

    let modified = truncate_to_seconds(served.artifact.last_modified);
    let mut headers = HeaderMap::new();
    headers.insert(header::CACHE_CONTROL, cache_control(policy.max_age));
    headers.insert(header::LAST_MODIFIED, header_value(&http_date(modified)));
    headers.insert(header::ACCEPT_RANGES, HeaderValue::from_static("bytes"));

    if let Some(since) = header_date(request_headers, header::IF_UNMODIFIED_SINCE) {
        if modified > since {
            info!("== RESP == 412 {}", served.key);
            return (StatusCode::PRECONDITION_FAILED, headers).into_response();
        }
    }
    if let Some(since) = header_date(request_headers, header::IF_MODIFIED_SINCE) {
        if modified <= since {
            info!("== RESP == 304 {}", served.key);
            return (StatusCode::NOT_MODIFIED, headers).into_response();
        }
    }

    headers.insert(header::CONTENT_TYPE, header_value(&content_type));
    let content = &served.artifact.content;
    let len = content.len() as u64;

    let range = request_headers
        .get(header::RANGE)
        .and_then(|v| v.to_str().ok())
        .map_or(ByteRange::Full, |value| parse_range(value, len));

    match range {
        ByteRange::Full => {
            info!("== RESP == 200 {}", served.key);
            (StatusCode::OK, headers, Body::from(content.clone())).into_response()
        }
        ByteRange::Partial { start, end } => {
            info!("== RESP == 206 {} bytes {}-{}", served.key, start, end);
            headers.insert(
                header::CONTENT_RANGE,
                header_value(&format!("bytes {start}-{end}/{len}")),
            );
            let body: Bytes = content.slice(start as usize..=end as usize);
            (StatusCode::PARTIAL_CONTENT, headers, Body::from(body)).into_response()
        }
        ByteRange::Unsatisfiable => {
            info!("== RESP == 416 {}", served.key);
            headers.insert(header::CONTENT_RANGE, header_value(&format!("bytes */{len}")));
            (StatusCode::RANGE_NOT_SATISFIABLE, headers).into_response()
        }
    }
}

/// Plain-text error response with the error freshness window
pub fn error_response(err: &AppError, error_max_age: Duration) -> Response {
    let http = HttpError::from(err);
    if http.status.is_server_error() {
        error!("== ERR == {}", http);
    } else {
        info!("== ERR == {}", http);
    }

    (
        http.status,
        [
            (header::CACHE_CONTROL, cache_control(error_max_age)),
            (
                header::CONTENT_TYPE,
                HeaderValue::from_static("text/plain; charset=utf-8"),
            ),
            (
                header::X_CONTENT_TYPE_OPTIONS,
                HeaderValue::from_static("nosniff"),
            ),
        ],
        format!("{}\n", http.message),
    )
        .into_response()
}

fn header_value(value: &str) -> HeaderValue {
    HeaderValue::from_str(value).unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream"))
}

fn header_date(headers: &HeaderMap, name: header::HeaderName) -> Option<SystemTime> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .and_then(parse_http_date)
}
