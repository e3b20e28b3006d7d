//! Protocol engine façade, dispatcher, and outbound queue.
//!
//! `SocketIoClient` owns a [`Transport`], decodes whatever frames the
//! transport surfaced this tick, routes events to registered handlers, and
//! drains a queue of outbound event packets. All of that happens inside
//! [`SocketIoClient::poll`]; nothing runs in the background.

use std::collections::VecDeque;
use std::time::Instant;

use serde::Serialize;
use tracing::{debug, warn};

use crate::socket::heartbeat::Heartbeat;
use crate::socket::packet::{self, EnginePacketType, SocketPacketType, DEFAULT_NAMESPACE};
use crate::socket::registry::EventRegistry;
use crate::transport::ws::WebSocketTransport;
use crate::transport::{Endpoint, TlsConfig, Transport, TransportError, TransportEvent};

/// Default request path, speaking protocol version 4.
pub const DEFAULT_REQUEST_PATH: &str = "/socket.io/?EIO=4";

/// Connection settings handed to [`SocketIoClient::begin`].
#[derive(Clone, Debug)]
pub struct SocketConfig {
    /// Server host name or address.
    pub host: String,
    /// Server port.
    pub port: u16,
    /// Namespace joined after the transport comes up.
    pub namespace: String,
    /// Request path including the query string.
    pub request_path: String,
    /// Optional subprotocol offered during the handshake.
    pub subprotocol: Option<String>,
}

impl SocketConfig {
    /// Creates a config with the default namespace and request path.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            namespace: DEFAULT_NAMESPACE.to_string(),
            request_path: DEFAULT_REQUEST_PATH.to_string(),
            subprotocol: None,
        }
    }

    /// Sets the namespace to join.
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    /// Sets the request path including any query string.
    pub fn with_request_path(mut self, request_path: impl Into<String>) -> Self {
        self.request_path = request_path.into();
        self
    }

    /// Offers a subprotocol during the handshake.
    pub fn with_subprotocol(mut self, subprotocol: impl Into<String>) -> Self {
        self.subprotocol = Some(subprotocol.into());
        self
    }
}

/// Protocol engine over an injected transport.
///
/// The engine is single-threaded: every decode, dispatch, heartbeat check,
/// and queued send happens inside [`SocketIoClient::poll`] on the calling
/// thread. Handlers run to completion before the tick moves on.
pub struct SocketIoClient<T: Transport> {
    transport: T,
    registry: EventRegistry,
    heartbeat: Heartbeat,
    pending: VecDeque<String>,
    namespace: String,
    joined: bool,
}

impl SocketIoClient<WebSocketTransport> {
    /// Creates a client over the bundled WebSocket transport.
    pub fn websocket() -> Self {
        Self::new(WebSocketTransport::new())
    }
}

impl<T: Transport> SocketIoClient<T> {
    /// Creates a client that drives the given transport.
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            registry: EventRegistry::new(),
            heartbeat: Heartbeat::new(Instant::now()),
            pending: VecDeque::new(),
            namespace: DEFAULT_NAMESPACE.to_string(),
            joined: false,
        }
    }

    /// Connects in plaintext and fixes the namespace for this session.
    pub fn begin(&mut self, config: SocketConfig) -> Result<(), TransportError> {
        self.start(config, None)
    }

    /// Connects over TLS and fixes the namespace for this session.
    pub fn begin_secure(
        &mut self,
        config: SocketConfig,
        tls: TlsConfig,
    ) -> Result<(), TransportError> {
        self.start(config, Some(tls))
    }

    fn start(&mut self, config: SocketConfig, tls: Option<TlsConfig>) -> Result<(), TransportError> {
        if self.transport.is_connected() {
            return Err(TransportError::AlreadyConnected);
        }

        let SocketConfig {
            host,
            port,
            namespace,
            request_path,
            subprotocol,
        } = config;
        let endpoint = Endpoint {
            host,
            port,
            request_path,
            subprotocol,
            tls,
        };
        self.transport.connect(&endpoint)?;

        // Version 4 servers drive the heartbeat themselves; answering their
        // pings is enough.
        if endpoint.request_path.contains("EIO=4") {
            self.heartbeat.set_enabled(false);
            debug!(event = "self_ping_disabled", path = %endpoint.request_path);
        }

        self.namespace = namespace;
        self.joined = false;
        self.heartbeat.reset(Instant::now());
        debug!(event = "session_started", url = %endpoint.url(), namespace = %self.namespace);
        Ok(())
    }

    /// Closes the connection. Registered handlers and queued packets stay.
    pub fn close(&mut self) {
        debug!(event = "session_closed", namespace = %self.namespace);
        self.joined = false;
        self.transport.close();
    }

    /// Registers a handler for a named event, replacing any previous one.
    pub fn on<F>(&mut self, event: impl Into<String>, handler: F)
    where
        F: FnMut(&str) + Send + 'static,
    {
        self.registry.insert(event, Box::new(handler));
    }

    /// Removes the handler for a named event. Unknown names are ignored.
    pub fn remove(&mut self, event: &str) {
        self.registry.remove(event);
    }

    /// Removes every named handler. The raw packet callback stays.
    pub fn remove_all(&mut self) {
        self.registry.clear();
    }

    /// Installs a callback that sees every inner-layer packet.
    ///
    /// The callback receives the packet type and the still-framed payload,
    /// and fires in addition to named dispatch. It is also invoked with
    /// synthetic `Connect` / `Disconnect` packets when the transport comes up
    /// or goes away.
    pub fn on_packet<F>(&mut self, handler: F)
    where
        F: FnMut(SocketPacketType, &[u8]) + Send + 'static,
    {
        self.registry.set_catch_all(Box::new(handler));
    }

    /// Queues a named event with a text payload for delivery.
    ///
    /// Returns false and drops the event when the transport is down; nothing
    /// is buffered across disconnects.
    pub fn emit(&mut self, event: &str, payload: &str) -> bool {
        let message = packet::encode_event(&self.namespace, event, payload);
        self.enqueue(event, message)
    }

    /// Queues a named event with any serializable payload for delivery.
    pub fn emit_json<P: Serialize>(&mut self, event: &str, payload: &P) -> bool {
        let value = match serde_json::to_value(payload) {
            Ok(value) => value,
            Err(error) => {
                warn!(event = "emit_payload_rejected", name = %event, error = %error);
                return false;
            }
        };
        let message = packet::encode_event_value(&self.namespace, event, value);
        self.enqueue(event, message)
    }

    fn enqueue(&mut self, event: &str, message: String) -> bool {
        if !self.transport.is_connected() {
            debug!(event = "emit_dropped", name = %event);
            return false;
        }
        self.pending.push_back(message);
        true
    }

    /// Sends one inner-layer packet immediately, bypassing the queue.
    pub fn send_packet(&mut self, kind: SocketPacketType, payload: &str) -> bool {
        if !self.transport.is_connected() {
            debug!(event = "send_dropped", kind = ?kind);
            return false;
        }
        let header = packet::packet_header(EnginePacketType::Message, kind);
        self.transport.send_text_parts(&header, payload)
    }

    /// Runs one protocol tick: transport I/O, dispatch, heartbeat, and the
    /// outbound queue.
    ///
    /// Call this at a steady cadence, ideally well below half the ping
    /// interval.
    pub fn poll(&mut self) {
        self.tick(Instant::now());
    }

    fn tick(&mut self, now: Instant) {
        for event in self.transport.service() {
            self.apply(event);
        }
        if self.heartbeat.ping_due(now) {
            debug!(event = "heartbeat_ping");
            self.transport
                .send_text(&packet::control_frame(EnginePacketType::Ping));
        }
        self.drain_pending();
    }

    fn apply(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Connected => self.negotiate_session(),
            TransportEvent::Disconnected => {
                debug!(event = "transport_disconnected", namespace = %self.namespace);
                self.joined = false;
                self.registry.notify_raw(SocketPacketType::Disconnect, &[]);
            }
            TransportEvent::Error(detail) => {
                warn!(event = "transport_error", detail = %detail);
            }
            TransportEvent::Text(frame) => self.handle_frame(&frame),
        }
    }

    fn negotiate_session(&mut self) {
        debug!(event = "transport_connected", namespace = %self.namespace);
        self.transport.send_text(packet::PROBE_FRAME);
        self.transport
            .send_text(&packet::control_frame(EnginePacketType::Upgrade));
        let namespace = self.namespace.clone();
        self.send_packet(SocketPacketType::Connect, &namespace);
        self.registry.notify_raw(SocketPacketType::Connect, &[]);
    }

    fn handle_frame(&mut self, frame: &[u8]) {
        let (kind, rest) = match packet::decode_engine(frame) {
            Ok(split) => split,
            Err(error) => {
                debug!(event = "frame_dropped", error = %error);
                return;
            }
        };
        match kind {
            EnginePacketType::Ping => {
                let mut pong = packet::control_frame(EnginePacketType::Pong);
                pong.push_str(&String::from_utf8_lossy(rest));
                self.transport.send_text(&pong);
                debug!(event = "ping_answered");
            }
            EnginePacketType::Pong => debug!(event = "pong_received"),
            EnginePacketType::Message => self.handle_message(rest),
            EnginePacketType::Open
            | EnginePacketType::Close
            | EnginePacketType::Upgrade
            | EnginePacketType::Noop => {
                debug!(event = "engine_frame_ignored", kind = ?kind);
            }
        }
    }

    fn handle_message(&mut self, body: &[u8]) {
        let (kind, payload) = match packet::decode_socket(body) {
            Ok(split) => split,
            Err(error) => {
                debug!(event = "message_dropped", error = %error);
                return;
            }
        };

        if kind == SocketPacketType::Connect {
            // Join acknowledgement for the configured namespace. Handled
            // here in full, so the raw callback never sees it.
            self.joined = true;
            debug!(event = "namespace_joined", namespace = %self.namespace);
            return;
        }

        if kind == SocketPacketType::Event {
            let text = String::from_utf8_lossy(payload);
            let (name, body) = packet::decode_event_payload(&text, &self.namespace);
            self.registry.dispatch(&name, &body);
        } else {
            debug!(event = "packet_unhandled", kind = ?kind);
        }

        self.registry.notify_raw(kind, payload);
    }

    fn drain_pending(&mut self) {
        if self.pending.is_empty() || !self.transport.is_connected() {
            return;
        }

        let header = packet::packet_header(EnginePacketType::Message, SocketPacketType::Event);
        let mut index = 0;
        while index < self.pending.len() {
            let Some(message) = self.pending.get(index) else {
                break;
            };
            if self.transport.send_text_parts(&header, message) {
                self.pending.remove(index);
            } else {
                // Keep the packet in place for the next tick and move on so
                // one stuck packet does not starve the rest.
                index += 1;
            }
        }
    }

    /// True while the transport reports an established connection.
    pub fn is_connected(&self) -> bool {
        self.transport.is_connected()
    }

    /// True once the server has acknowledged the namespace join.
    pub fn is_joined(&self) -> bool {
        self.joined
    }

    /// Number of queued outbound event packets.
    pub fn pending_packets(&self) -> usize {
        self.pending.len()
    }

    /// Namespace fixed at [`SocketIoClient::begin`] time.
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Enables or disables the self-initiated heartbeat ping.
    ///
    /// Inbound pings keep being answered either way.
    pub fn set_heartbeat(&mut self, enabled: bool) {
        debug!(event = "heartbeat_toggled", enabled);
        self.heartbeat.set_enabled(enabled);
    }
}
