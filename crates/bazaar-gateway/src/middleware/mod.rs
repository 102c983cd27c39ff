//! Tenant isolation gate.
//!
//! Every request to a tenant-scoped route passes through here before
//! any handler runs. The gate rate-limits by client address, resolves
//! the tenant, rejects unknown or deactivated tenants, and stamps the
//! vetted [`RequestContext`] into the request extensions.

pub mod ratelimit;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{header::HeaderName, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::context::RequestContext;
use crate::metrics;
use crate::tenant::{Resolution, TenantResolver};
use ratelimit::RateLimiter;

/// Paths that serve every tenant or none, and so skip resolution.
/// The Stripe webhook is exempt because Stripe cannot present tenant
/// credentials; its signature check authenticates the caller and the
/// tenant is recovered from the booking the event references.
const EXEMPT_PREFIXES: &[&str] = &[
    "/admin/",
    "/static/",
    "/media/",
    "/health",
    "/metrics",
    "/api/auth/",
    "/api/schema/",
    "/api/docs/",
    "/api/payments/webhook",
];

pub fn is_exempt(path: &str) -> bool {
    EXEMPT_PREFIXES.iter().any(|prefix| {
        if let Some(dir) = prefix.strip_suffix('/') {
            path == dir || path.starts_with(prefix)
        } else {
            path == *prefix || path.starts_with(&format!("{prefix}/"))
        }
    })
}

pub struct IsolationState {
    pub resolver: TenantResolver,
    pub limiter: RateLimiter,
    pub production: bool,
}

pub async fn isolation_gate(
    State(state): State<Arc<IsolationState>>,
    request: Request,
    next: Next,
) -> Response {
    let path = request.uri().path().to_string();
    if is_exempt(&path) {
        return next.run(request).await;
    }
    let http_method = request.method().clone();

    let client = client_address(&request);
    if !state.limiter.check(&client) {
        metrics::RATE_LIMIT_HITS.inc();
        tracing::warn!(client = %client, path = %path, "rate limit exceeded");
        return rejection(
            StatusCode::TOO_MANY_REQUESTS,
            "rate limit exceeded",
            "rate_limit_exceeded",
            None,
        );
    }

    let headers = request.headers().clone();
    let resolution = match state.resolver.resolve(&headers).await {
        Ok(resolution) => resolution,
        Err(err) => {
            // Fail closed: a directory outage must not let requests
            // through without a tenant.
            tracing::error!(error = %err, "tenant directory unavailable");
            return rejection(
                StatusCode::SERVICE_UNAVAILABLE,
                "tenant resolution unavailable",
                "tenant_resolution_unavailable",
                None,
            );
        }
    };

    match resolution {
        Resolution::Resolved { tenant, method } => {
            metrics::TENANT_RESOLUTIONS
                .with_label_values(&[&method.to_string()])
                .inc();
            let tenant_id = tenant.id.to_string();
            let context = RequestContext::new(tenant, method);
            let mut request = request;
            request.extensions_mut().insert(context);
            let mut response = next.run(request).await;
            apply_security_headers(&mut response, &tenant_id, state.production);
            response
        }
        Resolution::Inactive(tenant) => {
            metrics::TENANT_REJECTIONS
                .with_label_values(&["tenant_inactive"])
                .inc();
            tracing::warn!(tenant = %tenant.name, path = %path, "inactive tenant rejected");
            rejection(
                StatusCode::FORBIDDEN,
                "tenant account is inactive",
                "tenant_inactive",
                None,
            )
        }
        Resolution::NotFound => {
            metrics::TENANT_REJECTIONS
                .with_label_values(&["tenant_not_found"])
                .inc();
            tracing::warn!(
                client = %client,
                method = %http_method,
                path = %path,
                user_agent = header_str(&headers, "user-agent").as_deref().unwrap_or(""),
                x_tenant = header_str(&headers, crate::config::TENANT_HEADER).as_deref().unwrap_or(""),
                host = header_str(&headers, "host").as_deref().unwrap_or(""),
                "no tenant resolved"
            );
            let debug = (!state.production).then(|| {
                json!({
                    "host": header_str(&headers, "host"),
                    "x_tenant": header_str(&headers, crate::config::TENANT_HEADER),
                    "authorization_present": headers.contains_key("authorization"),
                })
            });
            rejection(
                StatusCode::FORBIDDEN,
                "no tenant could be identified for this request",
                "tenant_not_found",
                debug,
            )
        }
    }
}

fn rejection(
    status: StatusCode,
    message: &str,
    code: &str,
    debug: Option<serde_json::Value>,
) -> Response {
    let mut body = json!({ "error": message, "code": code });
    if let Some(debug) = debug {
        body["debug"] = debug;
    }
    (status, Json(body)).into_response()
}

fn header_str(headers: &axum::http::HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

/// Client address for rate limiting. The first hop of
/// `X-Forwarded-For` is trusted because the gateway is expected to sit
/// behind its own proxy; the socket address is the fallback.
fn client_address(request: &Request) -> String {
    if let Some(forwarded) = request
        .headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
    {
        if let Some(first) = forwarded.split(',').next() {
            let first = first.trim();
            if !first.is_empty() {
                return first.to_string();
            }
        }
    }
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|info| info.0.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

fn apply_security_headers(response: &mut Response, tenant_id: &str, production: bool) {
    let headers = response.headers_mut();
    headers.insert(
        HeaderName::from_static("x-content-type-options"),
        HeaderValue::from_static("nosniff"),
    );
    headers.insert(
        HeaderName::from_static("x-frame-options"),
        HeaderValue::from_static("DENY"),
    );
    if let Ok(value) = HeaderValue::from_str(tenant_id) {
        headers.insert(HeaderName::from_static("x-tenant-id"), value);
    }
    if production {
        headers.insert(
            HeaderName::from_static("strict-transport-security"),
            HeaderValue::from_static("max-age=31536000; includeSubDomains"),
        );
        headers.insert(
            HeaderName::from_static("content-security-policy"),
            HeaderValue::from_static("default-src 'self'"),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exempt_paths_skip_resolution() {
        assert!(is_exempt("/health"));
        assert!(is_exempt("/metrics"));
        assert!(is_exempt("/admin/login"));
        assert!(is_exempt("/static/css/site.css"));
        assert!(is_exempt("/api/auth/token"));
        assert!(is_exempt("/api/payments/webhook"));
    }

    #[test]
    fn tenant_scoped_paths_are_not_exempt() {
        assert!(!is_exempt("/api/payments/bookings"));
        assert!(!is_exempt("/api/payments/bookings/create_checkout"));
        assert!(!is_exempt("/healthcheck-of-sorts"));
        assert!(!is_exempt("/api/payments/webhooks"));
        assert!(!is_exempt("/"));
    }

    #[test]
    fn forwarded_for_first_hop_wins() {
        let request = Request::builder()
            .header("x-forwarded-for", "203.0.113.7, 10.0.0.1")
            .body(axum::body::Body::empty())
            .unwrap();
        assert_eq!(client_address(&request), "203.0.113.7");
    }

    #[test]
    fn missing_forwarding_info_is_unknown() {
        let request = Request::builder()
            .body(axum::body::Body::empty())
            .unwrap();
        assert_eq!(client_address(&request), "unknown");
    }
}
