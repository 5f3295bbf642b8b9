use axum::http::{HeaderValue, Request};
use tower_http::request_id::{MakeRequestId, RequestId};
use uuid::Uuid;

const MAX_INBOUND_ID_LEN: usize = 128;

/// Reuses a caller-supplied `x-request-id` when it is sane, otherwise mints a UUID.
#[derive(Clone, Copy, Debug, Default)]
pub struct MakeRequestUuidOrHeader;

impl MakeRequestId for MakeRequestUuidOrHeader {
    fn make_request_id<B>(&mut self, request: &Request<B>) -> Option<RequestId> {
        let inbound = request
            .headers()
            .get("x-request-id")
            .filter(|value| !value.is_empty() && value.len() <= MAX_INBOUND_ID_LEN && value.to_str().is_ok())
            .cloned();

        let value = match inbound {
            Some(value) => value,
            None => HeaderValue::from_str(&Uuid::new_v4().to_string()).ok()?,
        };
        Some(RequestId::new(value))
    }
}
