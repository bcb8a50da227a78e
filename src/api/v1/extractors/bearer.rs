use axum::extract::FromRequestParts;
use axum::http::{header, request::Parts};

use crate::error::AppError;

/// Raw bearer credential from the `Authorization` header.
///
/// The token is not verified here; services resolve it (key token or PAT
/// secret) and decide. A missing or malformed header is rejected with 401.
#[derive(Debug, Clone)]
pub struct BearerToken(pub String);

impl<S> FromRequestParts<S> for BearerToken
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let value = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or(AppError::Authentication)?;

        let token = value
            .strip_prefix("Bearer ")
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or(AppError::Authentication)?;

        Ok(BearerToken(token.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use axum::http::Request;

    use super::*;

    async fn extract(header: Option<&str>) -> Result<BearerToken, AppError> {
        let mut req = Request::builder().uri("/");
        if let Some(h) = header {
            req = req.header(header::AUTHORIZATION, h);
        }
        let (mut parts, _) = req.body(()).unwrap().into_parts();
        BearerToken::from_request_parts(&mut parts, &()).await
    }

    #[tokio::test]
    async fn extracts_bearer_token() {
        assert_eq!(extract(Some("Bearer abc.def")).await.unwrap().0, "abc.def");
        for bad in [None, Some("Basic abc"), Some("Bearer "), Some("bearer abc")] {
            assert!(matches!(extract(bad).await, Err(AppError::Authentication)), "{bad:?}");
        }
    }
}
