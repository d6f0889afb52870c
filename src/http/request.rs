//! Outbound request construction.
//!
//! # Responsibilities
//! - Point the request at the backend (scheme + authority)
//! - Keep method, path, query, headers and body as received
//!
//! # Design Decisions
//! - The body is moved, never buffered
//! - `Host` is not copied; the client derives it from the backend authority
//! - The HTTP version is not copied, the backend is always spoken to over
//!   the client's default protocol
//! - No trace propagation headers are injected

use axum::body::Body;
use axum::http::uri::Scheme;
use axum::http::{header, Request, Uri};

use crate::error::ProxyError;

/// Target URI on `backend` for an inbound request URI.
pub fn outbound_uri(backend: &str, original: &Uri) -> Result<Uri, ProxyError> {
    let path_and_query = original
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");

    Ok(Uri::builder()
        .scheme(Scheme::HTTP)
        .authority(backend)
        .path_and_query(path_and_query)
        .build()?)
}

/// Turn an inbound request into the request sent to `backend`.
pub fn build_outbound(request: Request<Body>, backend: &str) -> Result<Request<Body>, ProxyError> {
    let (parts, body) = request.into_parts();
    let uri = outbound_uri(backend, &parts.uri)?;

    let mut builder = Request::builder().method(parts.method).uri(uri);
    if let Some(headers) = builder.headers_mut() {
        for (name, value) in parts.headers.iter() {
            if name != header::HOST {
                headers.append(name.clone(), value.clone());
            }
        }
    }

    Ok(builder.body(body)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Method;

    #[test]
    fn test_outbound_uri_keeps_path_and_query() {
        let original: Uri = "/foo/bar?x=1&y=two".parse().unwrap();
        let uri = outbound_uri("localhost:8000", &original).unwrap();
        assert_eq!(uri.to_string(), "http://localhost:8000/foo/bar?x=1&y=two");
    }

    #[test]
    fn test_outbound_uri_defaults_to_root() {
        let original: Uri = "http://proxy.example".parse().unwrap();
        let uri = outbound_uri("10.0.0.5:9000", &original).unwrap();
        assert_eq!(uri.to_string(), "http://10.0.0.5:9000/");
    }

    #[test]
    fn test_outbound_uri_rejects_bad_authority() {
        let original: Uri = "/".parse().unwrap();
        let err = outbound_uri("not a host", &original).unwrap_err();
        assert!(matches!(err, ProxyError::InvalidRequest(_)));
    }

    #[test]
    fn test_build_outbound_copies_request() {
        let request = Request::builder()
            .method(Method::PUT)
            .uri("/items/7?dry_run=true")
            .header("host", "proxy.example")
            .header("x-custom", "a")
            .header("x-custom", "b")
            .header("traceparent", "00-0af7651916cd43dd8448eb211c80319c-b7ad6b7169203331-01")
            .body(Body::from("payload"))
            .unwrap();

        let outbound = build_outbound(request, "backend:8000").unwrap();
        assert_eq!(outbound.method(), Method::PUT);
        assert_eq!(outbound.uri().to_string(), "http://backend:8000/items/7?dry_run=true");
        assert!(outbound.headers().get(header::HOST).is_none());

        let custom: Vec<_> = outbound.headers().get_all("x-custom").iter().collect();
        assert_eq!(custom, ["a", "b"]);
        assert!(outbound.headers().contains_key("traceparent"));
    }
}
