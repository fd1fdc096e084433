//! Security headers middleware.
//!
//! Adds standard security headers to every response, including the HTML
//! catalogue pages.

use axum::{
    extract::Request,
    http::{HeaderName, HeaderValue},
    middleware::Next,
    response::Response,
};

const SECURITY_HEADERS: [(&str, &str); 6] = [
    ("x-frame-options", "DENY"),
    ("x-content-type-options", "nosniff"),
    ("strict-transport-security", "max-age=31536000; includeSubDomains"),
    ("referrer-policy", "strict-origin-when-cross-origin"),
    ("permissions-policy", "camera=(), microphone=(), geolocation=()"),
    (
        "content-security-policy",
        "default-src 'self'; script-src 'self'; style-src 'self' 'unsafe-inline'; \
         img-src 'self' data:; frame-ancestors 'none'; base-uri 'self'; form-action 'self'",
    ),
];

pub async fn security_headers_middleware(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    for (name, value) in SECURITY_HEADERS {
        headers.insert(
            HeaderName::from_static(name),
            HeaderValue::from_static(value),
        );
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, middleware, routing::get, Router};
    use tower::ServiceExt;

    async fn build_response() -> Response {
        let app = Router::new()
            .route("/catalogue", get(|| async { "OK" }))
            .layer(middleware::from_fn(security_headers_middleware));

        let request = Request::builder()
            .uri("/catalogue")
            .body(Body::empty())
            .unwrap();
        app.oneshot(request).await.unwrap()
    }

    fn header(resp: &Response, name: &str) -> String {
        resp.headers()
            .get(name)
            .unwrap()
            .to_str()
            .unwrap()
            .to_string()
    }

    #[tokio::test]
    async fn test_frame_and_sniffing_headers() {
        let resp = build_response().await;
        assert_eq!(header(&resp, "x-frame-options"), "DENY");
        assert_eq!(header(&resp, "x-content-type-options"), "nosniff");
    }

    #[tokio::test]
    async fn test_csp_allows_inline_styles_only() {
        let resp = build_response().await;
        let csp = header(&resp, "content-security-policy");
        assert!(csp.contains("style-src 'self' 'unsafe-inline'"));
        assert!(csp.contains("script-src 'self';"));
        assert!(csp.contains("frame-ancestors 'none'"));
    }

    #[tokio::test]
    async fn test_all_headers_present_and_status_kept() {
        let resp = build_response().await;
        assert_eq!(resp.status(), axum::http::StatusCode::OK);
        for (name, _) in SECURITY_HEADERS {
            assert!(resp.headers().contains_key(name), "missing {}", name);
        }
    }
}
