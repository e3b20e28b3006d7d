//! Tick-driven client for a two-layer realtime messaging protocol.
//!
//! The crate is organized by concern:
//! - `socket`: packet codec, event registry, heartbeat, and the engine that
//!   drives them from a single `poll` call.
//! - `transport`: the byte-stream boundary the engine talks through, plus a
//!   bundled non-blocking WebSocket implementation.
//!
//! Nothing here spawns a thread or owns a runtime. The embedding application
//! calls [`socket::client::SocketIoClient::poll`] at its own cadence and
//! every decode, dispatch, heartbeat check, and queued send happens right
//! there.

/// Protocol engine: codec, registry, heartbeat, and the client façade.
pub mod socket;
/// Transport trait, endpoint types, and the WebSocket implementation.
pub mod transport;
