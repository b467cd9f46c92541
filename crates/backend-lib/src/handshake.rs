// ============================
// crates/backend-lib/src/handshake.rs
// ============================
//! HTTP/1.1 upgrade negotiation for the `/ws` endpoint.
//!
//! The request is validated and answered with `101 Switching Protocols` from inside the
//! axum handler; hyper then releases the raw stream, which is handed to
//! [`crate::connection::serve_connection`]. No HTTP semantics apply after that point.

use crate::connection;
use crate::error::AppError;
use crate::AppState;
use axum::{
    body::Body,
    extract::{Request, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use base64::{engine::general_purpose::STANDARD, Engine};
use hyper_util::rt::TokioIo;
use sha1::{Digest, Sha1};
use std::sync::Arc;

/// GUID appended to the client key before hashing
pub const WS_MAGIC: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// Case-insensitive membership test on a comma-separated header value
pub fn header_contains_token(value: &str, token: &str) -> bool {
    value
        .split(',')
        .any(|part| part.trim().eq_ignore_ascii_case(token))
}

fn header_has_token(headers: &HeaderMap, name: header::HeaderName, token: &str) -> bool {
    headers
        .get_all(name)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .any(|value| header_contains_token(value, token))
}

/// `base64(SHA1(key + GUID))`
pub fn accept_key(key: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(key.as_bytes());
    hasher.update(WS_MAGIC.as_bytes());
    STANDARD.encode(hasher.finalize())
}

/// Check the upgrade preconditions and return the trimmed client key
pub fn validate_upgrade(headers: &HeaderMap) -> Result<String, AppError> {
    if !header_has_token(headers, header::CONNECTION, "upgrade")
        || !header_has_token(headers, header::UPGRADE, "websocket")
    {
        return Err(AppError::UpgradeRequired);
    }

    let key = headers
        .get(header::SEC_WEBSOCKET_KEY)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .unwrap_or_default();
    if key.is_empty() {
        return Err(AppError::BadWebSocketKey);
    }
    Ok(key.to_string())
}

/// The `101 Switching Protocols` answer for a validated key
pub fn switching_protocols(key: &str) -> Result<Response, AppError> {
    let accept = HeaderValue::from_str(&accept_key(key))
        .map_err(|e| AppError::Internal(e.to_string()))?;

    let mut response = Response::new(Body::empty());
    *response.status_mut() = StatusCode::SWITCHING_PROTOCOLS;
    let headers = response.headers_mut();
    headers.insert(header::UPGRADE, HeaderValue::from_static("websocket"));
    headers.insert(header::CONNECTION, HeaderValue::from_static("Upgrade"));
    headers.insert(header::SEC_WEBSOCKET_ACCEPT, accept);
    Ok(response)
}

/// Handler for WebSocket connections
pub async fn ws_handler(State(state): State<Arc<AppState>>, mut req: Request) -> Response {
    let key = match validate_upgrade(req.headers()) {
        Ok(key) => key,
        Err(err) => {
            tracing::debug!(error = %err, "rejected websocket upgrade");
            return err.into_response();
        },
    };

    let response = match switching_protocols(&key) {
        Ok(response) => response,
        Err(err) => return err.into_response(),
    };

    let on_upgrade = hyper::upgrade::on(&mut req);
    let registry = Arc::clone(&state.registry);
    tokio::spawn(async move {
        match on_upgrade.await {
            Ok(upgraded) => connection::serve_connection(registry, TokioIo::new(upgraded)).await,
            Err(err) => tracing::warn!(error = %err, "websocket upgrade failed"),
        }
    });

    response
}

#[cfg(test)]
mod tests {
    use super::*;

    fn upgrade_headers(connection: &str, upgrade: &str, key: Option<&str>) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONNECTION, HeaderValue::from_str(connection).unwrap());
        headers.insert(header::UPGRADE, HeaderValue::from_str(upgrade).unwrap());
        if let Some(key) = key {
            headers.insert(header::SEC_WEBSOCKET_KEY, HeaderValue::from_str(key).unwrap());
        }
        headers
    }

    #[test]
    fn test_accept_key_rfc_sample() {
        assert_eq!(
            accept_key("dGhlIHNhbXBsZSBub25jZQ=="),
            "s3pPLMBiTxaQ9kYGzzhZRbK+xOo="
        );
    }

    #[test]
    fn test_header_token_matching() {
        assert!(header_contains_token("keep-alive, Upgrade", "upgrade"));
        assert!(header_contains_token("UPGRADE", "Upgrade"));
        assert!(!header_contains_token("keep-alive", "Upgrade"));
        assert!(!header_contains_token("upgrades", "upgrade"));
    }

    #[test]
    fn test_validate_upgrade() {
        let headers = upgrade_headers("keep-alive, Upgrade", "WebSocket", Some("  abc==  "));
        assert_eq!(validate_upgrade(&headers).unwrap(), "abc==");

        let headers = upgrade_headers("keep-alive", "websocket", Some("abc=="));
        assert!(matches!(validate_upgrade(&headers), Err(AppError::UpgradeRequired)));

        let headers = upgrade_headers("Upgrade", "h2c", Some("abc=="));
        assert!(matches!(validate_upgrade(&headers), Err(AppError::UpgradeRequired)));

        let headers = upgrade_headers("Upgrade", "websocket", Some("   "));
        assert!(matches!(validate_upgrade(&headers), Err(AppError::BadWebSocketKey)));

        let headers = upgrade_headers("Upgrade", "websocket", None);
        assert!(matches!(validate_upgrade(&headers), Err(AppError::BadWebSocketKey)));
    }

    #[test]
    fn test_switching_protocols_response() {
        let response = switching_protocols("dGhlIHNhbXBsZSBub25jZQ==").unwrap();
        assert_eq!(response.status(), StatusCode::SWITCHING_PROTOCOLS);
        let headers = response.headers();
        assert_eq!(headers[header::UPGRADE], "websocket");
        assert_eq!(headers[header::CONNECTION], "Upgrade");
        assert_eq!(
            headers[header::SEC_WEBSOCKET_ACCEPT],
            "s3pPLMBiTxaQ9kYGzzhZRbK+xOo="
        );
    }
}
