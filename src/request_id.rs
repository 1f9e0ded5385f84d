use axum::{
    body::Body,
    http::{HeaderName, HeaderValue, Request},
};
use tower_http::request_id::{MakeRequestId, RequestId};
use uuid::Uuid;

pub const X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

/// Tags every incoming request with a fresh UUID unless the caller sent one.
#[derive(Clone, Copy, Debug, Default)]
pub struct RequestUuid;

impl MakeRequestId for RequestUuid {
    fn make_request_id<B>(&mut self, _: &Request<B>) -> Option<RequestId> {
        HeaderValue::from_str(&Uuid::new_v4().to_string())
            .map(RequestId::new)
            .map_err(|e| tracing::warn!("Failed to build a request id header value: {e:?}"))
            .ok()
    }
}

pub fn from_x_request_id(request: &Request<Body>) -> Option<&str> {
    let value = request.headers().get(X_REQUEST_ID)?;
    value
        .to_str()
        .map_err(|e| tracing::warn!("Ignoring non-ASCII {X_REQUEST_ID} header: {e:?}"))
        .ok()
}
