// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Caller checks for the loopback bridge.
//!
//! The bridge holds a live session and carries no credential of its own, so
//! it only answers callers it can place:
//!
//! - `Host` must name a loopback interface, the bind address or the host of
//!   an allowed origin. A page on a rebound DNS name fails this check.
//! - A request carrying `Origin` must come from an allowed origin. Browsers
//!   attach `Origin` to cross-origin requests, preflights and same-origin
//!   POSTs, so a foreign page cannot reach a state-changing route.
//!
//! Requests without `Origin` (native front ends, scripts) skip the origin
//! check. CORS headers are only granted to allowed origins.

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{header, HeaderValue, Method, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::warn;
use url::Url;

use crate::error::ApiError;

const LOOPBACK_HOSTS: [&str; 3] = ["localhost", "127.0.0.1", "[::1]"];

/// Origins and host names the bridge answers.
#[derive(Clone, Debug)]
pub struct BridgeGuard {
    origins: Arc<[HeaderValue]>,
    hosts: Arc<[String]>,
}

impl BridgeGuard {
    /// Build the guard from serialized origins (`scheme://host[:port]`).
    pub fn new(allowed_origins: &[String], bind_addr: SocketAddr) -> Self {
        let origins: Vec<HeaderValue> = allowed_origins
            .iter()
            .filter_map(|origin| match HeaderValue::from_str(origin) {
                Ok(value) => Some(value),
                Err(_) => {
                    warn!(origin = %origin, "Ignoring allowed origin that is not a header value");
                    None
                }
            })
            .collect();

        let mut hosts: Vec<String> = LOOPBACK_HOSTS.iter().map(|h| h.to_string()).collect();
        hosts.push(host_literal(bind_addr.ip()));
        hosts.extend(
            allowed_origins
                .iter()
                .filter_map(|origin| Url::parse(origin).ok())
                .filter_map(|url| url.host_str().map(str::to_ascii_lowercase)),
        );
        hosts.sort();
        hosts.dedup();

        Self {
            origins: origins.into(),
            hosts: hosts.into(),
        }
    }

    /// CORS layer granting the allowed origins and nothing else.
    pub fn cors(&self) -> CorsLayer {
        CorsLayer::new()
            .allow_origin(AllowOrigin::list(self.origins.iter().cloned()))
            .allow_methods([Method::GET, Method::POST])
            .allow_headers([header::CONTENT_TYPE])
    }

    fn origin_allowed(&self, origin: &HeaderValue) -> bool {
        self.origins.contains(origin)
    }

    fn host_allowed(&self, host: &str) -> bool {
        let name = host_name(host);
        self.hosts.iter().any(|allowed| allowed.eq_ignore_ascii_case(name))
    }
}

/// Refuse requests for a foreign `Host` or from a foreign `Origin`.
///
/// Apply with `axum::middleware::from_fn_with_state(guard, check_caller)`
/// outside the CORS layer so refused preflights never get CORS headers.
pub async fn check_caller(
    State(guard): State<BridgeGuard>,
    request: Request,
    next: Next,
) -> Response {
    let headers = request.headers();

    if let Some(host) = headers.get(header::HOST) {
        if !host.to_str().is_ok_and(|h| guard.host_allowed(h)) {
            warn!(
                host = ?host,
                path = %request.uri().path(),
                "Refusing request for a foreign host"
            );
            return ApiError::new(
                StatusCode::FORBIDDEN,
                "host_not_allowed",
                "request host is not served by this bridge",
            )
            .into_response();
        }
    }

    if let Some(origin) = headers.get(header::ORIGIN) {
        if !guard.origin_allowed(origin) {
            warn!(
                origin = ?origin,
                method = %request.method(),
                path = %request.uri().path(),
                "Refusing request from a foreign origin"
            );
            return ApiError::new(
                StatusCode::FORBIDDEN,
                "origin_not_allowed",
                "request origin is not allowed to use this bridge",
            )
            .into_response();
        }
    }

    next.run(request).await
}

fn host_literal(ip: IpAddr) -> String {
    match ip {
        IpAddr::V4(v4) => v4.to_string(),
        IpAddr::V6(v6) => format!("[{v6}]"),
    }
}

/// Host name of a `Host` header value, without the port.
fn host_name(host: &str) -> &str {
    if host.starts_with('[') {
        return match host.find(']') {
            Some(end) => &host[..=end],
            None => host,
        };
    }
    host.split_once(':').map_or(host, |(name, _)| name)
}
