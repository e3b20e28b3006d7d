//! Protocol engine modules.
//!
//! - `packet`: wire codec for the outer and inner packet layers.
//! - `registry`: named event handlers and the raw packet callback.
//! - `heartbeat`: self-initiated ping scheduling.
//! - `client`: the tick-driven engine tying the pieces together.

/// Tick-driven protocol engine and connection settings.
pub mod client;
/// Ping scheduling.
pub mod heartbeat;
/// Wire codec and packet types.
pub mod packet;
/// Event handler registry.
pub mod registry;
