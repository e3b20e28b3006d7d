//! Transport boundary for the protocol engine.
//!
//! - [`Transport`]: the seam the engine drives; anything that can move text
//!   frames both ways can sit behind it.
//! - [`ws`]: the bundled non-blocking WebSocket implementation.

use std::time::Duration;

use secrecy::SecretString;
use thiserror::Error;

/// Bundled WebSocket transport.
pub mod ws;

/// Default plaintext port.
pub const DEFAULT_PORT: u16 = 80;
/// Default TLS port.
pub const DEFAULT_TLS_PORT: u16 = 443;
/// Default time allowed for connect and handshake before giving up.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Where and how a transport should connect.
#[derive(Clone, Debug)]
pub struct Endpoint {
    /// Server host name or address.
    pub host: String,
    /// Server port.
    pub port: u16,
    /// Request path including any query string.
    pub request_path: String,
    /// Optional subprotocol offered during the handshake.
    pub subprotocol: Option<String>,
    /// TLS settings; `None` connects in plaintext.
    pub tls: Option<TlsConfig>,
}

impl Endpoint {
    /// Renders the endpoint as a connect URL, picking the scheme from the
    /// TLS settings.
    pub fn url(&self) -> String {
        let scheme = if self.tls.is_some() { "wss" } else { "ws" };
        format!("{scheme}://{}:{}{}", self.host, self.port, self.request_path)
    }
}

/// TLS material for secure connections.
#[derive(Clone, Debug, Default)]
pub struct TlsConfig {
    /// PEM bundle of trusted root certificates. `None` uses the built-in
    /// webpki roots.
    pub root_ca_pem: Option<String>,
    /// Optional client certificate presented to the server.
    pub client_cert: Option<ClientCert>,
}

/// Client certificate and private key in PEM form.
#[derive(Clone, Debug)]
pub struct ClientCert {
    /// Certificate chain PEM.
    pub cert_pem: String,
    /// Private key PEM.
    pub key_pem: SecretString,
}

/// Inbound happenings surfaced by [`Transport::service`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum TransportEvent {
    /// Connection is up and frames can flow.
    Connected,
    /// Connection is gone; no frames flow until the next connect.
    Disconnected,
    /// A complete inbound text frame.
    Text(Vec<u8>),
    /// Transport-level trouble that did not necessarily end the connection.
    Error(String),
}

/// Errors raised while establishing a connection.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Host name did not resolve to any address.
    #[error("failed to resolve {host}:{port}")]
    Resolve {
        host: String,
        port: u16,
        #[source]
        source: std::io::Error,
    },

    /// TCP connection could not be established.
    #[error("connect to {addr} failed")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// TLS material was rejected.
    #[error("tls configuration rejected: {0}")]
    Tls(String),

    /// WebSocket upgrade failed.
    #[error("websocket handshake failed: {0}")]
    Handshake(#[from] tungstenite::Error),

    /// Endpoint could not be turned into a request.
    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),

    /// Connect was attempted while a connection is already up.
    #[error("transport already connected")]
    AlreadyConnected,
}

/// Byte-stream collaborator driven by the engine tick.
///
/// Implementations are expected to be non-blocking outside of
/// [`Transport::connect`]: `service` pumps whatever I/O is ready and returns
/// immediately, and a `false` send means the frame was not accepted this
/// tick.
pub trait Transport {
    /// Establishes the connection synchronously.
    fn connect(&mut self, endpoint: &Endpoint) -> Result<(), TransportError>;

    /// Drops the connection, if any.
    fn close(&mut self);

    fn is_connected(&self) -> bool;

    /// Sends one text frame. Returns false when the frame was not accepted.
    fn send_text(&mut self, text: &str) -> bool;

    /// Sends one text frame assembled from a header and a body.
    fn send_text_parts(&mut self, header: &str, body: &str) -> bool {
        let mut frame = String::with_capacity(header.len() + body.len());
        frame.push_str(header);
        frame.push_str(body);
        self.send_text(&frame)
    }

    /// Pumps transport I/O and returns the inbound events that occurred.
    fn service(&mut self) -> Vec<TransportEvent>;
}

#[cfg(test)]
mod tests {
    use super::{Endpoint, TlsConfig};

    fn endpoint() -> Endpoint {
        Endpoint {
            host: "example.test".to_string(),
            port: 8080,
            request_path: "/socket.io/?EIO=4".to_string(),
            subprotocol: None,
            tls: None,
        }
    }

    #[test]
    fn plaintext_endpoint_renders_ws_url() {
        assert_eq!(endpoint().url(), "ws://example.test:8080/socket.io/?EIO=4");
    }

    #[test]
    fn tls_endpoint_renders_wss_url() {
        let mut endpoint = endpoint();
        endpoint.tls = Some(TlsConfig::default());
        assert_eq!(endpoint.url(), "wss://example.test:8080/socket.io/?EIO=4");
    }
}
