//! Response security headers and request header sanitisation.

use axum::Router;
use axum::extract::Request;
use axum::http::HeaderValue;
use axum::http::header::{
    CONTENT_SECURITY_POLICY, HeaderName, REFERRER_POLICY, STRICT_TRANSPORT_SECURITY,
    X_CONTENT_TYPE_OPTIONS, X_FRAME_OPTIONS,
};
use axum::middleware::{self, Next};
use axum::response::Response;
use tower_http::set_header::SetResponseHeaderLayer;

/// Forwarding headers removed from client requests.
///
/// Admission control keys on the peer address; nothing downstream may see a
/// client-supplied origin.
const FORWARDING_HEADERS: [&str; 5] = [
    "x-forwarded-for",
    "x-forwarded-proto",
    "x-forwarded-host",
    "x-real-ip",
    "forwarded",
];

const PERMISSIONS_POLICY: HeaderName = HeaderName::from_static("permissions-policy");

const HSTS: &str = "max-age=31536000; includeSubDomains; preload";

/// Wrap `router` with security headers and forwarding-header stripping.
///
/// Handlers may set their own value for any of these headers; it is kept.
/// HSTS is only sent when clients reach the service over TLS.
pub(super) fn secure(router: Router, tls_terminated: bool) -> Router {
    router
        .layer(SetResponseHeaderLayer::if_not_present(
            X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::if_not_present(
            X_FRAME_OPTIONS,
            HeaderValue::from_static("DENY"),
        ))
        .layer(SetResponseHeaderLayer::if_not_present(
            REFERRER_POLICY,
            HeaderValue::from_static("strict-origin-when-cross-origin"),
        ))
        .layer(SetResponseHeaderLayer::if_not_present(
            PERMISSIONS_POLICY,
            HeaderValue::from_static("geolocation=(), microphone=(), camera=(), payment=(), usb=()"),
        ))
        // JSON only: nothing is rendered or framed.
        .layer(SetResponseHeaderLayer::if_not_present(
            CONTENT_SECURITY_POLICY,
            HeaderValue::from_static("default-src 'none'; frame-ancestors 'none'"),
        ))
        .layer(SetResponseHeaderLayer::if_not_present(
            STRICT_TRANSPORT_SECURITY,
            move |_: &Response| tls_terminated.then(|| HeaderValue::from_static(HSTS)),
        ))
        .layer(middleware::from_fn(strip_forwarding_headers))
}

async fn strip_forwarding_headers(mut request: Request, next: Next) -> Response {
    let headers = request.headers_mut();
    for name in FORWARDING_HEADERS {
        headers.remove(name);
    }
    next.run(request).await
}
