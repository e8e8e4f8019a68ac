use secrecy::{ExposeSecret, SecretString};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;

use crate::client::consts::{COOKIE_HEADER, SESSION_COOKIE_NAME};

/// Builds the WebSocket handshake request, attaching the auth cookie when one
/// is configured.
pub fn build_request(
    ws_url: &str,
    session_cookie: Option<&SecretString>,
) -> tokio_tungstenite::tungstenite::Result<Request> {
    let mut request = ws_url.into_client_request()?;
    if let Some(cookie) = session_cookie {
        request.headers_mut().insert(
            COOKIE_HEADER,
            cookie_value(cookie).as_str().parse()?,
        );
    }
    Ok(request)
}

pub fn cookie_value(cookie: &SecretString) -> String {
    format!("{}={}", SESSION_COOKIE_NAME, cookie.expose_secret())
}
