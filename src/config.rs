//! Client configuration.
//!
//! A [`Config`] is assembled once from CLI arguments plus environment
//! fallbacks and is immutable for the lifetime of the session.

use anyhow::{bail, Result};

/// Default gateway endpoint when neither `--server` nor `GATEWAY_WS_URL`
/// is given.
pub const DEFAULT_SERVER_URL: &str = "ws://localhost:9500/byoa/ws";

/// Environment variable consulted when `--token` is absent.
pub const TOKEN_ENV: &str = "BYOA_TOKEN";

/// Environment variable consulted when `--server` is absent.
pub const SERVER_URL_ENV: &str = "GATEWAY_WS_URL";

/// Operating mode of the client session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// REPL: stdin lines become messages, inbound messages are printed.
    Interactive,
    /// Receive-only: every filtered message is printed as one JSON line.
    JsonStream,
    /// Relay: stdin lines become messages, nothing is rendered.
    Pipe,
    /// Send one configured message, then exit.
    OneShotSend,
}

impl Mode {
    /// Whether connection banners and room info lines are shown.
    ///
    /// Only the interactive REPL decorates its output; the other modes
    /// keep stdout machine-clean.
    #[must_use]
    pub fn shows_info(self) -> bool {
        self == Mode::Interactive
    }
}

/// Immutable session configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Bearer token sent in the auth handshake.
    pub token: String,
    /// Gateway WebSocket URL.
    pub server_url: String,
    /// Optional room-name filter (case-insensitive substring match).
    pub room_filter: Option<String>,
    /// Operating mode.
    pub mode: Mode,
    /// Message text for [`Mode::OneShotSend`].
    pub send_text: Option<String>,
    /// Suppress info banners and non-fatal warnings.
    pub quiet: bool,
}

impl Config {
    /// Build a config from raw CLI values, applying environment fallbacks
    /// and mode precedence (`--send` > `--pipe` > `--json` > interactive).
    ///
    /// # Errors
    ///
    /// Fails when no token is supplied via `--token` or `BYOA_TOKEN`.
    pub fn resolve(
        token: Option<String>,
        server: Option<String>,
        room: Option<String>,
        json: bool,
        pipe: bool,
        send: Option<String>,
        quiet: bool,
    ) -> Result<Self> {
        let token = match token.or_else(|| std::env::var(TOKEN_ENV).ok()) {
            Some(t) if !t.is_empty() => t,
            _ => bail!("Token required: --token byoa_xxx or set {TOKEN_ENV} env var"),
        };

        let server_url = server
            .or_else(|| std::env::var(SERVER_URL_ENV).ok())
            .unwrap_or_else(|| DEFAULT_SERVER_URL.to_string());

        let mode = if send.is_some() {
            Mode::OneShotSend
        } else if pipe {
            Mode::Pipe
        } else if json {
            Mode::JsonStream
        } else {
            Mode::Interactive
        };

        Ok(Self {
            token,
            server_url,
            room_filter: room,
            mode,
            send_text: send,
            quiet,
        })
    }
}
