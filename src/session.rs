//! Session state machine.
//!
//! Tracks authentication status, the agent identity, the room roster, and
//! the currently selected room. The state is owned by the duplex loop and
//! mutated only by applying inbound events (or the interactive `/room`
//! command); nothing else holds a reference to it.
//!
//! ```text
//! Unauthenticated ──auth_ok──► Authenticated ──auth_error/close──► Terminated
//! ```

use crate::protocol::{AgentProfile, InboundEvent, MessageEvent, Room};

/// What the duplex loop should do after applying one inbound event.
#[derive(Debug)]
pub enum SessionUpdate {
    /// Nothing to act on (acks, unknown event types).
    None,
    /// Authentication accepted. `info` holds the banner and room-selection
    /// lines to show in interactive mode.
    Ready { info: Vec<String> },
    /// Authentication rejected. Fatal.
    AuthFailed { error: String },
    /// A message in the selected room, ready for the mode renderer.
    Deliver(MessageEvent),
    /// Non-fatal gateway error to surface as a warning.
    GatewayError {
        code: Option<String>,
        message: Option<String>,
    },
}

/// Mutable per-session state.
#[derive(Debug, Default)]
pub struct SessionState {
    /// Set once by `auth_ok`.
    pub authenticated: bool,
    /// Agent identity, received at auth.
    pub agent: Option<AgentProfile>,
    /// Room roster in gateway order, received at auth.
    pub rooms: Vec<Room>,
    /// Selected room id; always one of `rooms`, or unset.
    pub current_room_id: Option<String>,
    /// Name of the selected room.
    pub current_room_name: Option<String>,
}

impl SessionState {
    /// Apply one inbound event and report what the loop should do.
    ///
    /// `room_filter` is the configured room-name filter; it only matters
    /// for the initial room selection at `auth_ok`. Keepalive pings are
    /// answered by the loop before the event reaches this function.
    pub fn apply(&mut self, event: InboundEvent, room_filter: Option<&str>) -> SessionUpdate {
        match event {
            InboundEvent::AuthOk { agent, rooms } => {
                self.authenticated = true;
                self.rooms = rooms;
                let mut info = vec![format!(
                    "✅ {} {} ({})",
                    agent.emoji_or_default(),
                    agent.name,
                    agent.username
                )];
                self.agent = Some(agent);
                info.extend(self.select_initial_room(room_filter));
                SessionUpdate::Ready { info }
            }
            InboundEvent::AuthError { error } => SessionUpdate::AuthFailed { error },
            InboundEvent::Message(msg) => {
                // Single-room filter: drop anything outside the selected room.
                if let Some(current) = self.current_room_id.as_deref() {
                    if msg.room.as_deref() != Some(current) {
                        return SessionUpdate::None;
                    }
                }
                SessionUpdate::Deliver(msg)
            }
            InboundEvent::Error { code, message } => SessionUpdate::GatewayError { code, message },
            InboundEvent::MessageSent | InboundEvent::Unknown => SessionUpdate::None,
            InboundEvent::Ping => {
                log::debug!("ping reached the state machine; loop should have answered it");
                SessionUpdate::None
            }
        }
    }

    /// Case-insensitive substring lookup against room names, first match
    /// wins in roster order.
    #[must_use]
    pub fn find_room(&self, needle: &str) -> Option<&Room> {
        let needle = needle.to_lowercase();
        self.rooms
            .iter()
            .find(|r| r.name.to_lowercase().contains(&needle))
    }

    /// Switch the selected room by name lookup (the `/room` command).
    /// Returns the newly selected room, or `None` when nothing matched
    /// (selection is left untouched).
    pub fn switch_room(&mut self, needle: &str) -> Option<Room> {
        let room = self.find_room(needle)?.clone();
        self.current_room_id = Some(room.id.clone());
        self.current_room_name = Some(room.name.clone());
        Some(room)
    }

    fn select_room(&mut self, index: usize) {
        self.current_room_id = Some(self.rooms[index].id.clone());
        self.current_room_name = Some(self.rooms[index].name.clone());
    }

    /// Initial room selection at `auth_ok`. Returns the info lines that
    /// describe the outcome.
    fn select_initial_room(&mut self, filter: Option<&str>) -> Vec<String> {
        let mut info = Vec::new();
        if let Some(filter) = filter {
            if let Some(room) = self.find_room(filter) {
                let name = room.name.clone();
                let id = room.id.clone();
                self.current_room_id = Some(id);
                self.current_room_name = Some(name.clone());
                info.push(format!("📍 Room: {name}"));
            } else {
                info.push(format!("⚠️  Room \"{filter}\" not found. Available:"));
                for room in &self.rooms {
                    info.push(format!("   - {}", room.name));
                }
                if !self.rooms.is_empty() {
                    self.select_room(0);
                }
            }
        } else if self.rooms.len() == 1 {
            self.select_room(0);
            info.push(format!("📍 Room: {}", self.rooms[0].name));
        } else if !self.rooms.is_empty() {
            info.push("📍 Rooms:".to_string());
            for (i, room) in self.rooms.iter().enumerate() {
                info.push(format!("   {}. {}", i + 1, room.name));
            }
            self.select_room(0);
            info.push(format!("Defaulting to: {}", self.rooms[0].name));
        }
        info
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::decode;

    fn auth_ok(rooms: &[(&str, &str)]) -> InboundEvent {
        InboundEvent::AuthOk {
            agent: AgentProfile {
                username: "bot1".into(),
                name: "Bot".into(),
                emoji: None,
            },
            rooms: rooms
                .iter()
                .map(|(id, name)| Room {
                    id: (*id).into(),
                    name: (*name).into(),
                })
                .collect(),
        }
    }

    fn message_in(room: &str) -> InboundEvent {
        InboundEvent::Message(MessageEvent {
            room: Some(room.into()),
            content: Some("hi".into()),
            ..MessageEvent::default()
        })
    }

    #[test]
    fn test_auth_ok_single_room_autoselects() {
        // Scenario straight off the wire: one room, no filter.
        let raw = r#"{"type":"auth_ok","agent":{"username":"bot1","name":"Bot"},"rooms":[{"id":"r1","name":"General"}]}"#;
        let mut state = SessionState::default();
        let update = state.apply(decode(raw).unwrap(), None);
        assert!(matches!(update, SessionUpdate::Ready { .. }));
        assert!(state.authenticated);
        assert_eq!(state.current_room_id.as_deref(), Some("r1"));
        assert_eq!(state.current_room_name.as_deref(), Some("General"));
    }

    #[test]
    fn test_filter_selects_unique_substring_match() {
        let mut state = SessionState::default();
        state.apply(auth_ok(&[("r1", "General"), ("r2", "Onboarding")]), Some("BOARD"));
        assert_eq!(state.current_room_id.as_deref(), Some("r2"));
    }

    #[test]
    fn test_filter_first_match_wins_in_roster_order() {
        let mut state = SessionState::default();
        state.apply(
            auth_ok(&[("r1", "dev-general"), ("r2", "dev-ops")]),
            Some("dev"),
        );
        assert_eq!(state.current_room_id.as_deref(), Some("r1"));
    }

    #[test]
    fn test_filter_miss_falls_back_to_first_room_with_warning() {
        let mut state = SessionState::default();
        let update = state.apply(auth_ok(&[("r1", "General"), ("r2", "Ops")]), Some("nope"));
        assert_eq!(state.current_room_id.as_deref(), Some("r1"));
        match update {
            SessionUpdate::Ready { info } => {
                assert!(info.iter().any(|l| l.contains("not found")));
                assert!(info.iter().any(|l| l.contains("General")));
                assert!(info.iter().any(|l| l.contains("Ops")));
            }
            other => panic!("unexpected update: {other:?}"),
        }
    }

    #[test]
    fn test_filter_miss_with_empty_roster_selects_nothing() {
        let mut state = SessionState::default();
        state.apply(auth_ok(&[]), Some("nope"));
        assert!(state.authenticated);
        assert_eq!(state.current_room_id, None);
    }

    #[test]
    fn test_multiple_rooms_default_to_first_and_list_all() {
        let mut state = SessionState::default();
        let update = state.apply(auth_ok(&[("r1", "General"), ("r2", "Ops")]), None);
        assert_eq!(state.current_room_id.as_deref(), Some("r1"));
        match update {
            SessionUpdate::Ready { info } => {
                assert!(info.iter().any(|l| l.contains("1. General")));
                assert!(info.iter().any(|l| l.contains("2. Ops")));
                assert!(info.iter().any(|l| l.contains("Defaulting to: General")));
            }
            other => panic!("unexpected update: {other:?}"),
        }
    }

    #[test]
    fn test_message_outside_selected_room_is_dropped() {
        let mut state = SessionState::default();
        state.apply(auth_ok(&[("r1", "General")]), None);
        assert!(matches!(state.apply(message_in("r2"), None), SessionUpdate::None));
        assert!(matches!(
            state.apply(message_in("r1"), None),
            SessionUpdate::Deliver(_)
        ));
    }

    #[test]
    fn test_message_with_no_selected_room_is_delivered() {
        let mut state = SessionState::default();
        state.apply(auth_ok(&[]), None);
        assert!(matches!(
            state.apply(message_in("anywhere"), None),
            SessionUpdate::Deliver(_)
        ));
    }

    #[test]
    fn test_auth_error_is_fatal() {
        let mut state = SessionState::default();
        let update = state.apply(
            InboundEvent::AuthError {
                error: "bad token".into(),
            },
            None,
        );
        match update {
            SessionUpdate::AuthFailed { error } => assert_eq!(error, "bad token"),
            other => panic!("unexpected update: {other:?}"),
        }
        assert!(!state.authenticated);
    }

    #[test]
    fn test_switch_room_updates_selection() {
        let mut state = SessionState::default();
        state.apply(auth_ok(&[("r1", "General"), ("r2", "Ops")]), None);
        let room = state.switch_room("ops").unwrap();
        assert_eq!(room.id, "r2");
        assert_eq!(state.current_room_id.as_deref(), Some("r2"));
        // A miss leaves the selection untouched.
        assert!(state.switch_room("nope").is_none());
        assert_eq!(state.current_room_id.as_deref(), Some("r2"));
    }

    #[test]
    fn test_acks_and_unknown_events_are_ignored() {
        let mut state = SessionState::default();
        assert!(matches!(
            state.apply(InboundEvent::MessageSent, None),
            SessionUpdate::None
        ));
        assert!(matches!(
            state.apply(InboundEvent::Unknown, None),
            SessionUpdate::None
        ));
    }
}
