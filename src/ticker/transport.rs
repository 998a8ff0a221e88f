//! WebSocket transport: authenticated URL construction and connection.

use std::time::{SystemTime, UNIX_EPOCH};

use tokio::net::TcpStream;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use url::Url;

use crate::error::Result;
use crate::ticker::client::Settings;

/// The connected socket. TLS is negotiated and validated normally for
/// `wss://` endpoints; plain `ws://` is accepted for local testing.
pub(crate) type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Build the feed URL with the authentication query parameters.
pub(crate) fn build_url(settings: &Settings) -> Result<Url> {
    let mut url = Url::parse(&settings.root_url)?;
    let uid = settings.uid.unwrap_or_else(unix_millis);
    url.query_pairs_mut()
        .append_pair("api_key", &settings.api_key)
        .append_pair("user_id", &settings.user_id)
        .append_pair("enctoken", &settings.enctoken)
        .append_pair("uid", &uid.to_string());
    Ok(url)
}

/// Open the WebSocket. The caller applies the connect timeout.
pub(crate) async fn connect(settings: &Settings) -> Result<WsStream> {
    let url = build_url(settings)?;
    // Log the host only; the query string carries the enctoken.
    tracing::debug!(
        host = url.host_str().unwrap_or_default(),
        "opening ticker websocket"
    );
    let (ws, _resp) = connect_async(url.as_str()).await?;
    Ok(ws)
}

/// Milliseconds since the unix epoch, the default `uid` query value.
fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_carries_auth_query_parameters() {
        let mut settings = Settings::new("AB1234", "secret-token");
        settings.uid = Some(1_700_000_000_000);
        let url = build_url(&settings).unwrap();

        assert_eq!(url.host_str(), Some("ws.zerodha.com"));
        let pairs: Vec<(String, String)> = url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        assert_eq!(
            pairs,
            vec![
                ("api_key".into(), "kitefront".into()),
                ("user_id".into(), "AB1234".into()),
                ("enctoken".into(), "secret-token".into()),
                ("uid".into(), "1700000000000".into()),
            ]
        );
    }

    #[test]
    fn uid_defaults_to_wall_clock_millis() {
        let settings = Settings::new("AB1234", "secret-token");
        let url = build_url(&settings).unwrap();
        let uid: u64 = url
            .query_pairs()
            .find(|(k, _)| k == "uid")
            .map(|(_, v)| v.parse().unwrap())
            .unwrap();
        // Any plausible recent timestamp will do.
        assert!(uid > 1_600_000_000_000);
    }
}
