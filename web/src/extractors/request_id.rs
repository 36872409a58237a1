use crate::extractors::RejectionType;
use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{request::Parts, StatusCode},
};

pub(crate) const X_REQUEST_ID: &str = "x-request-id";

/// The caller-supplied `X-Request-ID` header, if any. Echoed back to
/// WebSocket clients as the envelope `request_id` and attached to log lines.
pub(crate) struct RequestId(pub Option<String>);

#[async_trait]
impl<S> FromRequestParts<S> for RequestId
where
    S: Send + Sync,
{
    type Rejection = RejectionType;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        match parts.headers.get(X_REQUEST_ID) {
            None => Ok(RequestId(None)),
            Some(value) => value
                .to_str()
                .map(|id| RequestId(Some(id.to_string())))
                .map_err(|_| {
                    (
                        StatusCode::BAD_REQUEST,
                        "X-Request-ID must be visible ASCII".to_string(),
                    )
                }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{HeaderValue, Request};

    async fn extract(request: Request<()>) -> Result<RequestId, RejectionType> {
        let (mut parts, _) = request.into_parts();
        RequestId::from_request_parts(&mut parts, &()).await
    }

    #[tokio::test]
    async fn test_missing_header_yields_none() {
        let request = Request::builder().uri("/").body(()).unwrap();
        assert_eq!(extract(request).await.unwrap().0, None);
    }

    #[tokio::test]
    async fn test_header_value_is_extracted() {
        let request = Request::builder()
            .uri("/")
            .header("X-Request-ID", "req-123")
            .body(())
            .unwrap();
        assert_eq!(extract(request).await.unwrap().0.as_deref(), Some("req-123"));
    }

    #[tokio::test]
    async fn test_non_ascii_header_is_rejected() {
        let mut request = Request::builder().uri("/").body(()).unwrap();
        request.headers_mut().insert(
            X_REQUEST_ID,
            HeaderValue::from_bytes(&[0xe2, 0x98, 0x83]).unwrap(),
        );
        let (status, _) = extract(request).await.err().unwrap();
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
