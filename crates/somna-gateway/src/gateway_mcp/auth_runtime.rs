//! Bearer credential extraction for gateway routes.
use super::*;

pub(super) fn bearer_token_from_headers(headers: &HeaderMap) -> Option<String> {
    let header = headers.get(AUTHORIZATION)?;
    let raw = header.to_str().ok()?;
    let token = raw.strip_prefix("Bearer ")?;
    let token = token.trim();
    if token.is_empty() {
        return None;
    }
    Some(token.to_string())
}

/// Guards the unaudited read routes with the dispatcher's shared secret.
pub(super) fn authorize_gateway_request(
    state: &GatewayServerState,
    headers: &HeaderMap,
) -> Result<(), GatewayApiError> {
    let observed = bearer_token_from_headers(headers);
    if state.dispatcher.verify_credential(observed.as_deref()) {
        Ok(())
    } else {
        tracing::debug!("rejected gateway request with missing or invalid bearer token");
        Err(GatewayApiError::unauthorized())
    }
}

#[cfg(test)]
mod tests {
    use super::bearer_token_from_headers;
    use axum::http::{header::AUTHORIZATION, HeaderMap, HeaderValue};

    #[test]
    fn bearer_token_requires_scheme_and_value() {
        let mut headers = HeaderMap::new();
        assert_eq!(bearer_token_from_headers(&headers), None);
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert_eq!(bearer_token_from_headers(&headers), None);
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer   "));
        assert_eq!(bearer_token_from_headers(&headers), None);
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer  s3cret "));
        assert_eq!(bearer_token_from_headers(&headers), Some("s3cret".to_string()));
    }
}
