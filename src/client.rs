//! Duplex session loop.
//!
//! Owns the lifetime of one gateway connection: the auth handshake, the
//! keepalive replies, and the concurrent multiplexing of inbound gateway
//! events against the mode-specific outbound input source.
//!
//! # Architecture
//!
//! ```text
//! run()
//!   ├── ws::connect ──► send auth
//!   ├── authenticate()            (inline receive loop, 10s bound)
//!   └── per-mode select! loop
//!         ├── WsReader::recv      (inbound events → SessionState → renderer)
//!         ├── stdin line channel  (interactive/pipe outbound source)
//!         └── CancellationToken   (Ctrl-C short-circuits every await)
//! ```
//!
//! The [`SessionState`] is owned by this single loop; auxiliary tasks only
//! feed it through channels, so no locking is needed.

use std::time::Duration;

use anyhow::{bail, Result};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::config::{Config, Mode};
use crate::protocol::{self, InboundEvent, OutboundEvent};
use crate::render::{self, Printer};
use crate::session::{SessionState, SessionUpdate};
use crate::ws::{self, WsMessage, WsReader, WsWriter};

/// Bounded wait for the auth handshake after sending `auth`.
const AUTH_TIMEOUT: Duration = Duration::from_secs(10);

/// Delay before closing so in-flight sends reach the wire.
const SEND_GRACE: Duration = Duration::from_millis(500);

/// How a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// The mode ran to completion (quit command, stdin EOF, one-shot done,
    /// or user interrupt).
    Clean,
    /// The gateway closed the connection after a working session.
    ConnectionClosed,
}

/// What a mode loop should do after one inbound message.
enum LoopStep {
    Continue,
    Closed,
}

/// How inbound messages are rendered, per mode.
#[derive(Clone, Copy)]
enum RenderPolicy {
    /// `[HH:MM] sender: content` (interactive).
    Plain,
    /// One JSON line per message (stream mode).
    Json,
    /// Nothing rendered (pipe, one-shot).
    Silent,
}

impl RenderPolicy {
    fn for_mode(mode: Mode) -> Self {
        match mode {
            Mode::Interactive => Self::Plain,
            Mode::JsonStream => Self::Json,
            Mode::Pipe | Mode::OneShotSend => Self::Silent,
        }
    }
}

/// Run one full session: connect, authenticate, then drive the configured
/// mode until it completes, the gateway closes, or `cancel` fires.
///
/// Wires stdin as the outbound line source for the modes that read one.
///
/// # Errors
///
/// Returns an error for every fatal condition of the protocol: refused
/// connection, auth rejection, auth timeout, and one-shot mode without an
/// available room. Closure after a working session is not an error; it is
/// reported as [`SessionEnd::ConnectionClosed`].
pub async fn run(config: &Config, cancel: CancellationToken) -> Result<SessionEnd> {
    let lines = match config.mode {
        Mode::Interactive | Mode::Pipe => spawn_stdin_lines(),
        // Receive-only and one-shot modes have no input source; hand them
        // an already-closed channel.
        Mode::JsonStream | Mode::OneShotSend => mpsc::channel(1).1,
    };
    run_with_input(config, cancel, lines).await
}

/// Like [`run`], but with the outbound line source supplied by the caller.
///
/// [`run`] feeds stdin through the channel; tests inject scripted lines.
pub async fn run_with_input(
    config: &Config,
    cancel: CancellationToken,
    mut lines: mpsc::Receiver<String>,
) -> Result<SessionEnd> {
    let printer = Printer::new(config.mode, config.quiet);
    let (mut writer, mut reader) = ws::connect(&config.server_url).await?;

    writer
        .send_text(&protocol::encode(&OutboundEvent::Auth {
            token: config.token.clone(),
        })?)
        .await?;

    let mut state = SessionState::default();
    if !authenticate(&mut state, &mut reader, &mut writer, config, &printer, &cancel).await? {
        // Interrupted during the handshake; close and leave quietly.
        let _ = writer.close().await;
        return Ok(SessionEnd::Clean);
    }

    let end = match config.mode {
        Mode::OneShotSend => {
            run_one_shot(&state, &mut writer, config, &cancel).await?
        }
        Mode::Pipe => {
            run_pipe(&mut state, &mut reader, &mut writer, &mut lines, config, &cancel).await?
        }
        Mode::JsonStream => {
            run_json_stream(&mut state, &mut reader, &mut writer, config, &cancel).await?
        }
        Mode::Interactive => {
            run_interactive(&mut state, &mut reader, &mut writer, &mut lines, config, &cancel)
                .await?
        }
    };

    let _ = writer.close().await;
    Ok(end)
}

/// Drive the receive loop until `auth_ok`/`auth_error`, bounded by
/// [`AUTH_TIMEOUT`]. Returns `false` when interrupted by `cancel`.
async fn authenticate(
    state: &mut SessionState,
    reader: &mut WsReader,
    writer: &mut WsWriter,
    config: &Config,
    printer: &Printer,
    cancel: &CancellationToken,
) -> Result<bool> {
    let handshake = async {
        while let Some(inbound) = reader.recv().await {
            let raw = match inbound? {
                WsMessage::Text(text) => text,
                WsMessage::Ping(data) => {
                    writer.send_pong(data).await?;
                    continue;
                }
                WsMessage::Close { .. } => break,
            };
            let Some(event) = decode_frame(&raw) else {
                continue;
            };
            if matches!(event, InboundEvent::Ping) {
                writer
                    .send_text(&protocol::encode(&OutboundEvent::Pong)?)
                    .await?;
                continue;
            }
            match state.apply(event, config.room_filter.as_deref()) {
                SessionUpdate::Ready { info } => {
                    for line in &info {
                        printer.info(line);
                    }
                    printer.info(&"─".repeat(45));
                    return Ok(());
                }
                SessionUpdate::AuthFailed { error } => bail!("Auth failed: {error}"),
                SessionUpdate::GatewayError { code, message } => {
                    printer.warn(&gateway_warning(code.as_deref(), message.as_deref()));
                }
                // Pre-auth messages and acks are noise.
                SessionUpdate::Deliver(_) | SessionUpdate::None => {}
            }
        }
        bail!("Connection closed during authentication")
    };

    tokio::select! {
        outcome = tokio::time::timeout(AUTH_TIMEOUT, handshake) => match outcome {
            Ok(result) => result.map(|()| true),
            Err(_) => bail!("Auth timeout"),
        },
        () = cancel.cancelled() => Ok(false),
    }
}

/// Send the configured text once, wait out the grace delay, done.
async fn run_one_shot(
    state: &SessionState,
    writer: &mut WsWriter,
    config: &Config,
    cancel: &CancellationToken,
) -> Result<SessionEnd> {
    let Some(room) = state.current_room_id.clone() else {
        bail!("No room available");
    };
    let content = config.send_text.clone().unwrap_or_default();
    writer
        .send_text(&protocol::encode(&OutboundEvent::Message { room, content })?)
        .await?;
    grace_delay(cancel).await;
    Ok(SessionEnd::Clean)
}

/// Relay input lines into the selected room until the source is exhausted.
async fn run_pipe(
    state: &mut SessionState,
    reader: &mut WsReader,
    writer: &mut WsWriter,
    lines: &mut mpsc::Receiver<String>,
    config: &Config,
    cancel: &CancellationToken,
) -> Result<SessionEnd> {
    let printer = Printer::new(config.mode, config.quiet);
    loop {
        tokio::select! {
            line = lines.recv() => {
                let Some(line) = line else {
                    // input exhausted
                    grace_delay(cancel).await;
                    return Ok(SessionEnd::Clean);
                };
                let text = line.trim();
                if text.is_empty() {
                    continue;
                }
                // Lines arriving with no room selected are silently dropped.
                if let Some(room) = state.current_room_id.clone() {
                    writer
                        .send_text(&protocol::encode(&OutboundEvent::Message {
                            room,
                            content: text.to_string(),
                        })?)
                        .await?;
                }
            }
            inbound = reader.recv() => {
                match process_inbound(inbound, state, writer, config, &printer, RenderPolicy::Silent).await? {
                    LoopStep::Continue => {}
                    LoopStep::Closed => return Ok(SessionEnd::ConnectionClosed),
                }
            }
            () = cancel.cancelled() => return Ok(SessionEnd::Clean),
        }
    }
}

/// Receive-only: print every filtered message as one JSON line.
async fn run_json_stream(
    state: &mut SessionState,
    reader: &mut WsReader,
    writer: &mut WsWriter,
    config: &Config,
    cancel: &CancellationToken,
) -> Result<SessionEnd> {
    let printer = Printer::new(config.mode, config.quiet);
    loop {
        tokio::select! {
            inbound = reader.recv() => {
                match process_inbound(inbound, state, writer, config, &printer, RenderPolicy::Json).await? {
                    LoopStep::Continue => {}
                    LoopStep::Closed => return Ok(SessionEnd::ConnectionClosed),
                }
            }
            () = cancel.cancelled() => return Ok(SessionEnd::Clean),
        }
    }
}

/// REPL: prompt, read a line, run commands or send it as a message, while
/// rendering inbound messages in between.
async fn run_interactive(
    state: &mut SessionState,
    reader: &mut WsReader,
    writer: &mut WsWriter,
    lines: &mut mpsc::Receiver<String>,
    config: &Config,
    cancel: &CancellationToken,
) -> Result<SessionEnd> {
    let printer = Printer::new(config.mode, config.quiet);
    let mut need_prompt = true;
    loop {
        if need_prompt {
            show_prompt().await?;
            need_prompt = false;
        }
        tokio::select! {
            line = lines.recv() => {
                let Some(line) = line else {
                    // stdin EOF ends the REPL.
                    return Ok(SessionEnd::Clean);
                };
                need_prompt = true;
                let text = line.trim();
                if text.is_empty() {
                    continue;
                }
                if text.starts_with('/') {
                    match command_response(state, config, text) {
                        CommandOutcome::Quit => return Ok(SessionEnd::Clean),
                        CommandOutcome::Reply(reply) => {
                            for line in reply {
                                println!("{line}");
                            }
                        }
                    }
                    continue;
                }
                if let Some(room) = state.current_room_id.clone() {
                    writer
                        .send_text(&protocol::encode(&OutboundEvent::Message {
                            room,
                            content: text.to_string(),
                        })?)
                        .await?;
                } else {
                    println!("⚠️ No room selected. Use /room <name>");
                }
            }
            inbound = reader.recv() => {
                match process_inbound(inbound, state, writer, config, &printer, RenderPolicy::Plain).await? {
                    LoopStep::Continue => {}
                    LoopStep::Closed => return Ok(SessionEnd::ConnectionClosed),
                }
            }
            () = cancel.cancelled() => return Ok(SessionEnd::Clean),
        }
    }
}

/// Result of one interactive `/`-command.
#[derive(Debug, PartialEq, Eq)]
enum CommandOutcome {
    Quit,
    Reply(Vec<String>),
}

/// Interpret one interactive command line (starting with `/`).
fn command_response(state: &mut SessionState, config: &Config, text: &str) -> CommandOutcome {
    let (cmd, arg) = match text.split_once(' ') {
        Some((cmd, arg)) => (cmd, arg.trim()),
        None => (text, ""),
    };
    let reply = match cmd {
        "/quit" | "/exit" | "/q" => return CommandOutcome::Quit,
        "/rooms" => state
            .rooms
            .iter()
            .enumerate()
            .map(|(i, room)| {
                let marker = if state.current_room_id.as_deref() == Some(room.id.as_str()) {
                    " ← current"
                } else {
                    ""
                };
                format!("  {}. {}{marker}", i + 1, room.name)
            })
            .collect(),
        "/room" if arg.is_empty() => {
            vec![format!(
                "Current: {}",
                state.current_room_name.as_deref().unwrap_or("none")
            )]
        }
        "/room" => match state.switch_room(arg) {
            Some(room) => vec![format!("📍 Switched to: {}", room.name)],
            None => vec![format!("⚠️ Room \"{arg}\" not found")],
        },
        "/status" => {
            let (emoji, name) = state
                .agent
                .as_ref()
                .map_or(("🤖", "Agent"), |a| (a.emoji_or_default(), a.name.as_str()));
            vec![
                format!("Agent: {emoji} {name}"),
                format!(
                    "Room: {}",
                    state.current_room_name.as_deref().unwrap_or("none")
                ),
                format!("Server: {}", config.server_url),
            ]
        }
        _ => vec!["Unknown command. Try /rooms, /room, /status, /quit".to_string()],
    };
    CommandOutcome::Reply(reply)
}

/// Handle one inbound transport message in a mode loop.
async fn process_inbound(
    inbound: Option<Result<WsMessage>>,
    state: &mut SessionState,
    writer: &mut WsWriter,
    config: &Config,
    printer: &Printer,
    policy: RenderPolicy,
) -> Result<LoopStep> {
    let raw = match inbound {
        None | Some(Ok(WsMessage::Close { .. })) => return Ok(LoopStep::Closed),
        Some(Err(e)) => {
            log::warn!("transport read failed: {e:#}");
            return Ok(LoopStep::Closed);
        }
        Some(Ok(WsMessage::Ping(data))) => {
            writer.send_pong(data).await?;
            return Ok(LoopStep::Continue);
        }
        Some(Ok(WsMessage::Text(text))) => text,
    };

    let Some(event) = decode_frame(&raw) else {
        return Ok(LoopStep::Continue);
    };

    // Keepalive is answered here and never reaches the state machine.
    if matches!(event, InboundEvent::Ping) {
        writer
            .send_text(&protocol::encode(&OutboundEvent::Pong)?)
            .await?;
        return Ok(LoopStep::Continue);
    }

    match state.apply(event, config.room_filter.as_deref()) {
        SessionUpdate::Deliver(msg) => match policy {
            RenderPolicy::Plain => println!("{}", render::render_plain(&msg)),
            RenderPolicy::Json => println!("{}", render::render_json(&msg)?),
            RenderPolicy::Silent => {}
        },
        SessionUpdate::GatewayError { code, message } => {
            printer.warn(&gateway_warning(code.as_deref(), message.as_deref()));
        }
        SessionUpdate::AuthFailed { error } => bail!("Auth failed: {error}"),
        SessionUpdate::Ready { info } => {
            // Repeated auth_ok is unexpected but harmless.
            for line in &info {
                printer.info(line);
            }
        }
        SessionUpdate::None => {}
    }
    Ok(LoopStep::Continue)
}

/// Decode one text frame, dropping malformed payloads with a debug log.
fn decode_frame(raw: &str) -> Option<InboundEvent> {
    match protocol::decode(raw) {
        Ok(event) => Some(event),
        Err(e) => {
            log::debug!("dropping malformed gateway frame: {e}");
            None
        }
    }
}

fn gateway_warning(code: Option<&str>, message: Option<&str>) -> String {
    format!(
        "⚠️ {}: {}",
        code.unwrap_or("error"),
        message.unwrap_or("unknown gateway error")
    )
}

/// Wait out [`SEND_GRACE`] unless interrupted.
async fn grace_delay(cancel: &CancellationToken) {
    tokio::select! {
        () = tokio::time::sleep(SEND_GRACE) => {}
        () = cancel.cancelled() => {}
    }
}

/// Write the interactive prompt without a trailing newline.
async fn show_prompt() -> Result<()> {
    let mut stdout = tokio::io::stdout();
    stdout.write_all(b"> ").await?;
    stdout.flush().await?;
    Ok(())
}

/// Spawn a task reading stdin line-by-line into a channel. The channel
/// closes at EOF; the task dies when the receiver is dropped.
fn spawn_stdin_lines() -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel(16);
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if tx.send(line).await.is_err() {
                break;
            }
        }
    });
    rx
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{AgentProfile, Room};

    fn test_config() -> Config {
        Config {
            token: "byoa_test".into(),
            server_url: "ws://localhost:9500/byoa/ws".into(),
            room_filter: None,
            mode: Mode::Interactive,
            send_text: None,
            quiet: false,
        }
    }

    fn authed_state() -> SessionState {
        SessionState {
            authenticated: true,
            agent: Some(AgentProfile {
                username: "bot1".into(),
                name: "Bot".into(),
                emoji: Some("🦀".into()),
            }),
            rooms: vec![
                Room {
                    id: "r1".into(),
                    name: "General".into(),
                },
                Room {
                    id: "r2".into(),
                    name: "Ops".into(),
                },
            ],
            current_room_id: Some("r1".into()),
            current_room_name: Some("General".into()),
        }
    }

    #[test]
    fn test_quit_aliases() {
        for cmd in ["/quit", "/exit", "/q"] {
            let mut state = authed_state();
            assert_eq!(
                command_response(&mut state, &test_config(), cmd),
                CommandOutcome::Quit
            );
        }
    }

    #[test]
    fn test_rooms_marks_current() {
        let mut state = authed_state();
        match command_response(&mut state, &test_config(), "/rooms") {
            CommandOutcome::Reply(lines) => {
                assert_eq!(lines, vec!["  1. General ← current", "  2. Ops"]);
            }
            CommandOutcome::Quit => panic!("unexpected quit"),
        }
    }

    #[test]
    fn test_room_without_arg_reports_current() {
        let mut state = authed_state();
        match command_response(&mut state, &test_config(), "/room") {
            CommandOutcome::Reply(lines) => assert_eq!(lines, vec!["Current: General"]),
            CommandOutcome::Quit => panic!("unexpected quit"),
        }
    }

    #[test]
    fn test_room_switch_and_miss() {
        let mut state = authed_state();
        match command_response(&mut state, &test_config(), "/room ops") {
            CommandOutcome::Reply(lines) => assert_eq!(lines, vec!["📍 Switched to: Ops"]),
            CommandOutcome::Quit => panic!("unexpected quit"),
        }
        assert_eq!(state.current_room_id.as_deref(), Some("r2"));

        match command_response(&mut state, &test_config(), "/room nope") {
            CommandOutcome::Reply(lines) => {
                assert_eq!(lines, vec!["⚠️ Room \"nope\" not found"]);
            }
            CommandOutcome::Quit => panic!("unexpected quit"),
        }
        assert_eq!(state.current_room_id.as_deref(), Some("r2"));
    }

    #[test]
    fn test_status_lists_agent_room_server() {
        let mut state = authed_state();
        match command_response(&mut state, &test_config(), "/status") {
            CommandOutcome::Reply(lines) => {
                assert_eq!(
                    lines,
                    vec![
                        "Agent: 🦀 Bot",
                        "Room: General",
                        "Server: ws://localhost:9500/byoa/ws",
                    ]
                );
            }
            CommandOutcome::Quit => panic!("unexpected quit"),
        }
    }

    #[test]
    fn test_unknown_command_hint() {
        let mut state = authed_state();
        match command_response(&mut state, &test_config(), "/frobnicate") {
            CommandOutcome::Reply(lines) => {
                assert_eq!(lines.len(), 1);
                assert!(lines[0].starts_with("Unknown command"));
            }
            CommandOutcome::Quit => panic!("unexpected quit"),
        }
    }
}
