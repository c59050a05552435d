use axum::{
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};

use ledgerbridge_core::UserId;

use crate::context::UserContext;

/// Header carrying the id of the user who triggered the action.
pub const USER_HEADER: &str = "x-user-id";

pub async fn user_middleware(
    mut req: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Result<Response, StatusCode> {
    let user = extract_user(req.headers())?;
    req.extensions_mut().insert(UserContext::new(user));
    Ok(next.run(req).await)
}

fn extract_user(headers: &HeaderMap) -> Result<UserId, StatusCode> {
    let header = headers.get(USER_HEADER).ok_or(StatusCode::UNAUTHORIZED)?;
    let raw = header.to_str().map_err(|_| StatusCode::UNAUTHORIZED)?.trim();

    match raw.parse::<u64>() {
        Ok(id) if id > 0 => Ok(UserId::new(id)),
        _ => Err(StatusCode::UNAUTHORIZED),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(USER_HEADER, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn user_is_read_from_header() {
        assert_eq!(extract_user(&headers(" 7 ")), Ok(UserId::new(7)));
    }

    #[test]
    fn missing_or_malformed_user_is_unauthorized() {
        assert_eq!(extract_user(&HeaderMap::new()), Err(StatusCode::UNAUTHORIZED));
        assert_eq!(extract_user(&headers("admin")), Err(StatusCode::UNAUTHORIZED));
        assert_eq!(extract_user(&headers("0")), Err(StatusCode::UNAUTHORIZED));
    }
}
