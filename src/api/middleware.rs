use axum::http::{HeaderValue, Request};
use tower_http::request_id::{MakeRequestId, RequestId};
use uuid::Uuid;

/// Reuses a well-formed `x-request-id` sent by the caller, otherwise mints a time-ordered UUID.
#[derive(Clone, Copy, Debug, Default)]
pub struct MakeRequestUuidOrHeader;

impl MakeRequestId for MakeRequestUuidOrHeader {
    fn make_request_id<B>(&mut self, request: &Request<B>) -> Option<RequestId> {
        let from_header = request
            .headers()
            .get("x-request-id")
            .and_then(|value| value.to_str().ok())
            .filter(|value| Uuid::parse_str(value).is_ok())
            .and_then(|value| HeaderValue::from_str(value).ok());

        from_header
            .or_else(|| HeaderValue::from_str(&Uuid::now_v7().to_string()).ok())
            .map(RequestId::new)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_a_valid_incoming_id() {
        let id = Uuid::new_v4().to_string();
        let request = Request::builder().header("x-request-id", &id).body(()).expect("request");

        let made = MakeRequestUuidOrHeader.make_request_id(&request).expect("id");
        assert_eq!(made.header_value().to_str().expect("ascii"), id);
    }

    #[test]
    fn replaces_garbage_with_a_fresh_uuid() {
        let request = Request::builder().header("x-request-id", "not-a-uuid").body(()).expect("request");

        let made = MakeRequestUuidOrHeader.make_request_id(&request).expect("id");
        assert!(Uuid::parse_str(made.header_value().to_str().expect("ascii")).is_ok());
    }
}
