//! Mutually authenticated HTTPS transport to the authority.
//!
//! The client certificate bundle is decoded and loaded exactly once, when the
//! transport is built at startup. Requests are JSON `POST`s; the layer does
//! not retry.

use std::future::Future;
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use secrecy::ExposeSecret;
use serde::Deserialize;
use tracing::{debug, instrument};

use crate::config::BankIdConfig;

/// Request timeout towards the authority.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Error payload the authority sends with non-2xx responses.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteError {
    /// Machine-readable code (`invalidParameters`, `alreadyInProgress`, ...).
    pub error_code: String,
    /// Free text. Never forwarded to end users.
    #[serde(default)]
    pub details: String,
}

/// Errors that can occur while talking to the authority.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Connection, timeout, or body read failure.
    #[error("network error: {0}")]
    Network(#[source] reqwest::Error),

    /// The certificate material could not be loaded, or the TLS handshake
    /// with the authority failed.
    #[error("certificate error: {0}")]
    Certificate(String),

    /// The authority answered with a non-2xx status.
    #[error(
        "authority returned HTTP {status}{}",
        .error.as_ref().map(|e| format!(" ({})", e.error_code)).unwrap_or_default()
    )]
    Status {
        /// HTTP status code.
        status: u16,
        /// Parsed error payload, if the body had one.
        error: Option<RemoteError>,
    },

    /// A 2xx body that was not JSON.
    #[error("response body is not JSON: {0}")]
    Decode(#[source] serde_json::Error),
}

impl TransportError {
    /// Whether the authority rejected the request because it does not know
    /// the order reference.
    #[must_use]
    pub fn is_unknown_order(&self) -> bool {
        match self {
            Self::Status {
                status: 400 | 404,
                error: Some(error),
            } => matches!(error.error_code.as_str(), "invalidParameters" | "notFound"),
            _ => false,
        }
    }
}

impl From<reqwest::Error> for TransportError {
    /// Handshake and peer certificate failures surface as a `native_tls`
    /// error somewhere down the source chain.
    fn from(err: reqwest::Error) -> Self {
        let mut source = std::error::Error::source(&err);
        while let Some(cause) = source {
            if let Some(tls) = cause.downcast_ref::<native_tls::Error>() {
                return Self::Certificate(format!("TLS handshake failed: {tls}"));
            }
            source = cause.source();
        }
        Self::Network(err)
    }
}

/// A JSON-over-HTTPS channel to the authority.
///
/// Implemented by [`HttpTransport`] in production; tests substitute fakes.
pub trait Transport: Send + Sync + 'static {
    /// `POST` `body` to `path` (relative to the API root) and return the
    /// parsed response body.
    fn send(
        &self,
        path: &str,
        body: serde_json::Value,
    ) -> impl Future<Output = Result<serde_json::Value, TransportError>> + Send;
}

/// `reqwest`-backed transport.
#[derive(Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    api_url: String,
}

impl std::fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpTransport")
            .field("api_url", &self.api_url)
            .finish_non_exhaustive()
    }
}

impl HttpTransport {
    /// Build the transport from configuration, loading the client identity
    /// and the trusted root for the authority.
    ///
    /// # Errors
    ///
    /// Returns `TransportError::Certificate` if the bundle is not base64, the
    /// passphrase does not open it, or the trusted root is not valid PEM.
    pub fn from_config(config: &BankIdConfig) -> Result<Self, TransportError> {
        let der = BASE64_STANDARD
            .decode(config.pfx.expose_secret().trim())
            .map_err(|e| {
                TransportError::Certificate(format!("client bundle is not valid base64: {e}"))
            })?;

        let identity = reqwest::Identity::from_pkcs12_der(&der, config.passphrase.expose_secret())
            .map_err(|e| TransportError::Certificate(format!("cannot open client bundle: {e}")))?;

        let root = reqwest::Certificate::from_pem(config.ca.as_bytes())
            .map_err(|e| TransportError::Certificate(format!("invalid trusted root: {e}")))?;

        let client = reqwest::Client::builder()
            .identity(identity)
            .add_root_certificate(root)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| TransportError::Certificate(format!("cannot build TLS client: {e}")))?;

        Ok(Self::with_client(&config.api_url, client))
    }

    /// Wrap an already configured client. Used by tests against plain HTTP.
    #[must_use]
    pub fn with_client(api_url: &str, client: reqwest::Client) -> Self {
        Self {
            client,
            api_url: api_url.trim_end_matches('/').to_owned(),
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.api_url, path.trim_start_matches('/'))
    }
}

impl Transport for HttpTransport {
    #[instrument(skip(self, body), fields(path = %path))]
    async fn send(
        &self,
        path: &str,
        body: serde_json::Value,
    ) -> Result<serde_json::Value, TransportError> {
        let response = self
            .client
            .post(self.endpoint(path))
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error = response.json::<RemoteError>().await.ok();
            debug!(status = status.as_u16(), error = ?error, "Authority rejected request");
            return Err(TransportError::Status {
                status: status.as_u16(),
                error,
            });
        }

        let bytes = response.bytes().await?;
        if bytes.is_empty() {
            return Ok(serde_json::Value::Object(serde_json::Map::new()));
        }
        serde_json::from_slice(&bytes).map_err(TransportError::Decode)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use secrecy::SecretString;

    use super::*;

    fn config(pfx: &str, ca: &str) -> BankIdConfig {
        BankIdConfig {
            api_url: "https://appapi2.test.bankid.com/rp/v6.0".to_owned(),
            pfx: SecretString::from(pfx),
            passphrase: SecretString::from("qwerty123"),
            ca: ca.to_owned(),
            ..BankIdConfig::default()
        }
    }

    #[test]
    fn test_rejects_non_base64_bundle() {
        let err = HttpTransport::from_config(&config("not base64!!", "")).unwrap_err();
        assert!(matches!(err, TransportError::Certificate(msg) if msg.contains("base64")));
    }

    #[test]
    fn test_rejects_garbage_bundle() {
        let err = HttpTransport::from_config(&config("AAAA", "")).unwrap_err();
        assert!(matches!(err, TransportError::Certificate(_)));
    }

    #[test]
    fn test_endpoint_joins_cleanly() {
        let transport =
            HttpTransport::with_client("http://localhost:1234/rp/v6.0/", reqwest::Client::new());
        assert_eq!(
            transport.endpoint("collect"),
            "http://localhost:1234/rp/v6.0/collect"
        );
        assert_eq!(
            transport.endpoint("/auth"),
            "http://localhost:1234/rp/v6.0/auth"
        );
    }

    #[test]
    fn test_status_error_display_includes_code() {
        let err = TransportError::Status {
            status: 400,
            error: Some(RemoteError {
                error_code: "alreadyInProgress".to_owned(),
                details: "Order already in progress".to_owned(),
            }),
        };
        assert_eq!(
            err.to_string(),
            "authority returned HTTP 400 (alreadyInProgress)"
        );
        assert!(!err.is_unknown_order());
    }

    #[tokio::test]
    async fn test_send_parses_json_and_errors() {
        let mut server = mockito::Server::new_async().await;
        let ok = server
            .mock("POST", "/rp/v6.0/collect")
            .match_header("content-type", "application/json")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"orderRef":"abc123","status":"pending"}"#)
            .create_async()
            .await;
        let missing = server
            .mock("POST", "/rp/v6.0/cancel")
            .with_status(400)
            .with_header("content-type", "application/json")
            .with_body(r#"{"errorCode":"invalidParameters","details":"No such order"}"#)
            .create_async()
            .await;

        let api_url = format!("{}/rp/v6.0", server.url());
        let transport = HttpTransport::with_client(&api_url, reqwest::Client::new());

        let body = transport
            .send("collect", serde_json::json!({ "orderRef": "abc123" }))
            .await
            .unwrap();
        assert_eq!(body["status"], "pending");

        let err = transport
            .send("cancel", serde_json::json!({ "orderRef": "nope" }))
            .await
            .unwrap_err();
        assert!(err.is_unknown_order());

        ok.assert_async().await;
        missing.assert_async().await;
    }

    #[tokio::test]
    async fn test_empty_body_is_empty_object() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/cancel")
            .with_status(200)
            .create_async()
            .await;

        let transport = HttpTransport::with_client(&server.url(), reqwest::Client::new());
        let body = transport
            .send("cancel", serde_json::json!({ "orderRef": "abc123" }))
            .await
            .unwrap();
        assert_eq!(body, serde_json::json!({}));
    }

    #[tokio::test]
    async fn test_failed_handshake_is_certificate_error() {
        // Speaks plain text where a TLS server hello is expected
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            use tokio::io::AsyncWriteExt;
            let (mut socket, _) = listener.accept().await.unwrap();
            let _ = socket.write_all(b"HTTP/1.1 400 Bad Request\r\n\r\n").await;
        });

        let api_url = format!("https://{addr}");
        let transport = HttpTransport::with_client(&api_url, reqwest::Client::new());
        let err = transport
            .send("collect", serde_json::json!({ "orderRef": "abc123" }))
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Certificate(msg) if msg.contains("TLS")));
    }

    #[tokio::test]
    async fn test_refused_connection_is_network_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let api_url = format!("http://{addr}");
        let transport = HttpTransport::with_client(&api_url, reqwest::Client::new());
        let err = transport
            .send("collect", serde_json::json!({ "orderRef": "abc123" }))
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Network(_)));
    }
}
