//! Triologue gateway terminal client.
//!
//! One persistent WebSocket connection to a chat-room gateway: bearer-token
//! authentication, room selection, and a concurrent duplex message loop
//! under four operating modes (interactive REPL, JSON stream, stdin pipe,
//! one-shot send).
//!
//! # Architecture
//!
//! ```text
//! Config ──► ws::connect ──► auth handshake ──► per-mode duplex loop
//!                │                                  │
//!                └── protocol (JSON codec) ──► session (state machine)
//!                                                   │
//!                                                   └── render (display)
//! ```
//!
//! # Modules
//!
//! - [`config`] - immutable session configuration and operating mode
//! - [`protocol`] - JSON wire codec (tagged inbound/outbound events)
//! - [`session`] - auth/room state machine and room-selection policy
//! - [`client`] - the duplex loop multiplexing gateway events and input
//! - [`render`] - timestamps, message rendering, gated console output
//! - [`ws`] - WebSocket transport wrapper (split reader/writer halves)

pub mod client;
pub mod config;
pub mod protocol;
pub mod render;
pub mod session;
pub mod ws;

// Re-export the types a consumer needs to drive a session.
pub use client::{run, SessionEnd};
pub use config::{Config, Mode};
pub use session::SessionState;
