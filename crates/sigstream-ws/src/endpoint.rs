//! Endpoint derivation from the serving page origin.

use crate::error::{WsError, WsResult};
use tokio_tungstenite::tungstenite::http::Uri;

/// Default socket path on the backend.
pub const DEFAULT_WS_PATH: &str = "/ws";

/// Derive the socket URL from a page origin.
///
/// `https` origins map to `wss`, `http` origins to `ws`. Only the host (and
/// port) of the origin is kept; `path` replaces any origin path.
pub fn derive_endpoint(origin: &str, path: &str) -> WsResult<String> {
    let uri: Uri = origin
        .trim()
        .parse()
        .map_err(|e| WsError::InvalidEndpoint(format!("{origin}: {e}")))?;

    let scheme = match uri.scheme_str() {
        Some("https") => "wss",
        Some("http") => "ws",
        other => {
            return Err(WsError::InvalidEndpoint(format!(
                "{origin}: unsupported scheme {other:?}"
            )))
        }
    };

    let authority = uri
        .authority()
        .filter(|a| !a.host().is_empty())
        .ok_or_else(|| WsError::InvalidEndpoint(format!("{origin}: missing host")))?;

    let path = if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{path}")
    };

    Ok(format!("{scheme}://{authority}{path}"))
}
