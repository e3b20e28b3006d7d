//! Non-blocking WebSocket transport built on `tungstenite`.
//!
//! Connect and handshake run synchronously with a timeout; after that the
//! underlying socket is switched to non-blocking mode and every
//! [`Transport::service`] call pumps whatever is ready without waiting.

use std::io;
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::time::Duration;

use secrecy::ExposeSecret;
use tracing::{debug, warn};
use tungstenite::client::ClientRequestBuilder;
use tungstenite::http::Uri;
use tungstenite::stream::MaybeTlsStream;
use tungstenite::{client_tls_with_config, Connector, Message, WebSocket};

use crate::transport::{
    Endpoint, TlsConfig, Transport, TransportError, TransportEvent, DEFAULT_CONNECT_TIMEOUT,
};

/// WebSocket implementation of [`Transport`].
///
/// Frames rejected by a full write buffer come back as a `false` send;
/// frames accepted while the socket is congested are flushed on later
/// service calls.
pub struct WebSocketTransport {
    socket: Option<WebSocket<MaybeTlsStream<TcpStream>>>,
    queued: Vec<TransportEvent>,
    connect_timeout: Duration,
}

impl WebSocketTransport {
    pub fn new() -> Self {
        Self {
            socket: None,
            queued: Vec::new(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    /// Sets the time allowed for TCP connect, TLS setup, and the upgrade.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }
}

impl Default for WebSocketTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for WebSocketTransport {
    fn connect(&mut self, endpoint: &Endpoint) -> Result<(), TransportError> {
        if self.socket.is_some() {
            return Err(TransportError::AlreadyConnected);
        }
        if !endpoint.request_path.starts_with('/') {
            return Err(TransportError::InvalidEndpoint(format!(
                "request path {:?} must start with '/'",
                endpoint.request_path
            )));
        }

        let url = endpoint.url();
        let uri: Uri = url
            .parse()
            .map_err(|error| TransportError::InvalidEndpoint(format!("{url}: {error}")))?;
        let mut request = ClientRequestBuilder::new(uri);
        if let Some(protocol) = &endpoint.subprotocol {
            request = request.with_sub_protocol(protocol.clone());
        }

        let stream = open_tcp(&endpoint.host, endpoint.port, self.connect_timeout)?;
        let connector = endpoint
            .tls
            .as_ref()
            .map(|tls| build_tls_config(tls).map(|config| Connector::Rustls(Arc::new(config))))
            .transpose()?;

        let (socket, response) = client_tls_with_config(request, stream, None, connector)
            .map_err(|error| match error {
                tungstenite::HandshakeError::Failure(error) => TransportError::Handshake(error),
                interrupted @ tungstenite::HandshakeError::Interrupted(_) => {
                    TransportError::Handshake(tungstenite::Error::Io(io::Error::new(
                        io::ErrorKind::WouldBlock,
                        interrupted.to_string(),
                    )))
                }
            })?;
        match raw_tcp(socket.get_ref()) {
            Some(tcp) => {
                tcp.set_nonblocking(true)
                    .map_err(|source| TransportError::Connect {
                        addr: url.clone(),
                        source,
                    })?;
            }
            None => warn!(event = "nonblocking_unavailable", url = %url),
        }

        debug!(
            event = "websocket_connected",
            url = %url,
            status = response.status().as_u16()
        );
        self.socket = Some(socket);
        self.queued.push(TransportEvent::Connected);
        Ok(())
    }

    fn close(&mut self) {
        if let Some(mut socket) = self.socket.take() {
            let _ = socket.close(None);
            let _ = socket.flush();
            debug!(event = "websocket_closed_locally");
            self.queued.push(TransportEvent::Disconnected);
        }
    }

    fn is_connected(&self) -> bool {
        self.socket.is_some()
    }

    fn send_text(&mut self, text: &str) -> bool {
        let Some(socket) = self.socket.as_mut() else {
            return false;
        };
        match socket.send(Message::text(text)) {
            Ok(()) => true,
            // The frame is buffered; it goes out once the socket drains.
            Err(error) if is_would_block(&error) => true,
            Err(tungstenite::Error::WriteBufferFull(_)) => {
                debug!(event = "write_buffer_full");
                false
            }
            Err(error) => {
                warn!(event = "websocket_send_failed", error = %error);
                self.socket = None;
                self.queued.push(TransportEvent::Disconnected);
                false
            }
        }
    }

    fn service(&mut self) -> Vec<TransportEvent> {
        let mut events = std::mem::take(&mut self.queued);
        let mut lost = false;

        if let Some(socket) = self.socket.as_mut() {
            if let Err(error) = socket.flush() {
                if !is_would_block(&error) {
                    debug!(event = "websocket_flush_failed", error = %error);
                    lost = true;
                }
            }

            while !lost {
                match socket.read() {
                    Ok(Message::Text(text)) => {
                        events.push(TransportEvent::Text(text.as_bytes().to_vec()));
                    }
                    Ok(Message::Binary(payload)) => {
                        debug!(event = "binary_frame_skipped", len = payload.len());
                    }
                    // tungstenite queues the protocol-level pong itself.
                    Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_)) => {}
                    Ok(Message::Close(frame)) => {
                        debug!(event = "websocket_closed_by_peer", frame = ?frame);
                        lost = true;
                    }
                    Err(error) if is_would_block(&error) => break,
                    Err(tungstenite::Error::ConnectionClosed)
                    | Err(tungstenite::Error::AlreadyClosed) => {
                        lost = true;
                    }
                    Err(error) => {
                        warn!(event = "websocket_read_failed", error = %error);
                        events.push(TransportEvent::Error(error.to_string()));
                        lost = true;
                    }
                }
            }
        }

        if lost {
            self.socket = None;
            events.push(TransportEvent::Disconnected);
        }
        events
    }
}

fn is_would_block(error: &tungstenite::Error) -> bool {
    matches!(error, tungstenite::Error::Io(source) if source.kind() == io::ErrorKind::WouldBlock)
}

fn raw_tcp(stream: &MaybeTlsStream<TcpStream>) -> Option<&TcpStream> {
    match stream {
        MaybeTlsStream::Plain(tcp) => Some(tcp),
        MaybeTlsStream::Rustls(tls) => Some(tls.get_ref()),
        _ => None,
    }
}

fn open_tcp(host: &str, port: u16, timeout: Duration) -> Result<TcpStream, TransportError> {
    let addrs = (host, port)
        .to_socket_addrs()
        .map_err(|source| TransportError::Resolve {
            host: host.to_string(),
            port,
            source,
        })?;

    let mut last_error = None;
    for addr in addrs {
        match TcpStream::connect_timeout(&addr, timeout) {
            Ok(stream) => {
                stream
                    .set_nodelay(true)
                    .map_err(|source| connect_error(addr, source))?;
                stream
                    .set_read_timeout(Some(timeout))
                    .map_err(|source| connect_error(addr, source))?;
                stream
                    .set_write_timeout(Some(timeout))
                    .map_err(|source| connect_error(addr, source))?;
                return Ok(stream);
            }
            Err(source) => last_error = Some((addr, source)),
        }
    }

    match last_error {
        Some((addr, source)) => Err(connect_error(addr, source)),
        None => Err(TransportError::Resolve {
            host: host.to_string(),
            port,
            source: io::Error::new(io::ErrorKind::NotFound, "no addresses resolved"),
        }),
    }
}

fn connect_error(addr: SocketAddr, source: io::Error) -> TransportError {
    TransportError::Connect {
        addr: addr.to_string(),
        source,
    }
}

fn build_tls_config(tls: &TlsConfig) -> Result<rustls::ClientConfig, TransportError> {
    let mut roots = rustls::RootCertStore::empty();
    match &tls.root_ca_pem {
        Some(pem) => {
            let mut reader = pem.as_bytes();
            let mut added = 0usize;
            for cert in rustls_pemfile::certs(&mut reader) {
                let cert = cert.map_err(|error| {
                    TransportError::Tls(format!("root certificate unreadable: {error}"))
                })?;
                roots
                    .add(cert)
                    .map_err(|error| TransportError::Tls(format!("root certificate rejected: {error}")))?;
                added += 1;
            }
            if added == 0 {
                return Err(TransportError::Tls(
                    "root certificate bundle held no certificates".to_string(),
                ));
            }
        }
        None => roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned()),
    }

    let builder = rustls::ClientConfig::builder().with_root_certificates(roots);
    let config = match &tls.client_cert {
        Some(identity) => {
            let mut cert_reader = identity.cert_pem.as_bytes();
            let certs = rustls_pemfile::certs(&mut cert_reader)
                .collect::<Result<Vec<_>, _>>()
                .map_err(|error| {
                    TransportError::Tls(format!("client certificate unreadable: {error}"))
                })?;
            let mut key_reader = identity.key_pem.expose_secret().as_bytes();
            let key = rustls_pemfile::private_key(&mut key_reader)
                .map_err(|error| TransportError::Tls(format!("client key unreadable: {error}")))?
                .ok_or_else(|| {
                    TransportError::Tls("client key pem held no private key".to_string())
                })?;
            builder
                .with_client_auth_cert(certs, key)
                .map_err(|error| TransportError::Tls(format!("client identity rejected: {error}")))?
        }
        None => builder.with_no_client_auth(),
    };
    Ok(config)
}
