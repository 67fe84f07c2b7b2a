//! Pause the game while a player is joining.
//!
//! The server logs every peer connection step. A joining peer passes
//! through the map download/load states and catches up on ticks; while any
//! peer sits in one of those states the game is paused so the join cannot
//! fall behind. The flag is recomputed from the full peer map after every
//! change, so missed or reordered lines never leave the game stuck paused
//! once the map is clean.

use log::{debug, info};
use regex::Regex;
use std::collections::HashMap;
use std::sync::LazyLock;

use super::{GameConsole, LineHandler};
use crate::errors::HandlerError;
use crate::metrics;

/// Connection states during which the game stays paused.
pub const PAUSE_STATES: [&str; 6] = [
    "Ready",
    "ConnectedWaitingForMap",
    "ConnectedDownloadingMap",
    "ConnectedLoadingMap",
    "TryingToCatchUp",
    "WaitingForCommandToStartSendingTickClosures",
];

static STATE_CHANGED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"received stateChanged peerID *\((\d+)\) oldState *\(([^()]+)\) newState *\(([^()]+)\)",
    )
    .expect("valid regex")
});
static ADDING_PEER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"adding peer *\((\d+)\)").expect("valid regex"));
static REMOVING_PEER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"removing peer *\((\d+)\)").expect("valid regex"));

/// A peer event recognized in a console line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerEvent {
    Added { peer: String },
    Removed { peer: String },
    StateChanged { peer: String, old: String, new: String },
}

impl PeerEvent {
    pub fn parse(line: &str) -> Option<Self> {
        if line.contains("received stateChanged") {
            let caps = STATE_CHANGED.captures(line)?;
            return Some(PeerEvent::StateChanged {
                peer: caps[1].to_string(),
                old: caps[2].to_string(),
                new: caps[3].to_string(),
            });
        }
        if line.contains("adding peer") {
            let caps = ADDING_PEER.captures(line)?;
            return Some(PeerEvent::Added {
                peer: caps[1].to_string(),
            });
        }
        if line.contains("removing peer") {
            let caps = REMOVING_PEER.captures(line)?;
            return Some(PeerEvent::Removed {
                peer: caps[1].to_string(),
            });
        }
        None
    }
}

#[derive(Debug, Default)]
pub struct AutoPauseHandler {
    peers: HashMap<String, String>,
    paused: bool,
}

impl AutoPauseHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn peer_state(&self, peer: &str) -> Option<&str> {
        self.peers.get(peer).map(String::as_str)
    }

    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }

    /// Apply one peer event to the map.
    pub fn apply(&mut self, event: PeerEvent) {
        match event {
            PeerEvent::Added { peer } => {
                debug!("peer {} added", peer);
                self.peers.insert(peer, "Ready".to_string());
            }
            PeerEvent::Removed { peer } => {
                if self.peers.remove(&peer).is_none() {
                    debug!("peer {} removed but was never added", peer);
                }
            }
            PeerEvent::StateChanged { peer, old, new } => {
                debug!("peer {} state {} -> {}", peer, old, new);
                self.peers.insert(peer, new);
            }
        }
    }

    /// Whether the current peer map calls for a pause.
    pub fn should_pause(&self) -> bool {
        self.peers
            .values()
            .any(|state| PAUSE_STATES.contains(&state.as_str()))
    }

    fn sync_pause(&mut self, console: &dyn GameConsole) {
        let should_pause = self.should_pause();
        if should_pause == self.paused {
            return;
        }

        info!("Setting game pause to {}", should_pause);
        console.write_stderr(&format!("Setting game pause to {}\n", should_pause));
        if should_pause {
            console.send_console("/pause");
            console.send_console("Pausing game for joining player");
        } else {
            console.send_console("/unpause");
            console.send_console("Unpausing game as join finished");
        }
        metrics::inc_pause_transitions();
        self.paused = should_pause;
    }
}

impl LineHandler for AutoPauseHandler {
    fn name(&self) -> &'static str {
        "autopause"
    }

    fn handle_line(&mut self, line: &str, console: &dyn GameConsole) -> Result<(), HandlerError> {
        let Some(event) = PeerEvent::parse(line) else {
            return Ok(());
        };
        self.apply(event);
        self.sync_pause(console);
        Ok(())
    }

    /// A new server process has no peers and is not paused.
    fn server_started(&mut self) {
        self.peers.clear();
        self.paused = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    #[derive(Default)]
    struct RecordingConsole {
        sent: RefCell<Vec<String>>,
        notices: RefCell<Vec<String>>,
    }

    impl GameConsole for RecordingConsole {
        fn send_console(&self, line: &str) {
            self.sent.borrow_mut().push(line.to_string());
        }
        fn write_stderr(&self, text: &str) {
            self.notices.borrow_mut().push(text.to_string());
        }
    }

    fn feed(handler: &mut AutoPauseHandler, console: &RecordingConsole, lines: &[&str]) {
        for line in lines {
            handler.handle_line(line, console).expect("handle_line");
        }
    }

    const ADD_1: &str = "1.234 Info ServerMultiplayerManager.cpp:806: adding peer(1) success(true).";
    const REMOVE_1: &str = "9.000 Info ServerMultiplayerManager.cpp:1029: removing peer(1).";

    fn state_line(peer: u32, old: &str, new: &str) -> String {
        format!(
            "2.000 Info ServerMultiplayerManager.cpp:1180: received stateChanged peerID({}) oldState({}) newState({})",
            peer, old, new
        )
    }

    #[test]
    fn parses_peer_events() {
        assert_eq!(
            PeerEvent::parse(ADD_1),
            Some(PeerEvent::Added { peer: "1".into() })
        );
        assert_eq!(
            PeerEvent::parse(REMOVE_1),
            Some(PeerEvent::Removed { peer: "1".into() })
        );
        assert_eq!(
            PeerEvent::parse(&state_line(7, "Ready", "ConnectedLoadingMap")),
            Some(PeerEvent::StateChanged {
                peer: "7".into(),
                old: "Ready".into(),
                new: "ConnectedLoadingMap".into(),
            })
        );
        assert_eq!(PeerEvent::parse("adding peer without id"), None);
        assert_eq!(PeerEvent::parse("Factorio initialised"), None);
    }

    #[test]
    fn join_pauses_then_unpauses() {
        let mut handler = AutoPauseHandler::new();
        let console = RecordingConsole::default();

        feed(&mut handler, &console, &[ADD_1]);
        assert!(handler.is_paused());
        assert_eq!(
            *console.sent.borrow(),
            vec!["/pause", "Pausing game for joining player"]
        );
        assert_eq!(*console.notices.borrow(), vec!["Setting game pause to true\n"]);

        let downloading = state_line(1, "Ready", "ConnectedDownloadingMap");
        let in_game = state_line(1, "WaitingForCommandToStartSendingTickClosures", "InGame");
        feed(&mut handler, &console, &[downloading.as_str(), in_game.as_str()]);
        assert!(!handler.is_paused());
        assert_eq!(console.sent.borrow().len(), 4);
        assert_eq!(console.sent.borrow()[2], "/unpause");
        assert_eq!(console.sent.borrow()[3], "Unpausing game as join finished");
    }

    #[test]
    fn repeated_states_do_not_resend() {
        let mut handler = AutoPauseHandler::new();
        let console = RecordingConsole::default();
        let loading = state_line(1, "ConnectedDownloadingMap", "ConnectedLoadingMap");
        feed(&mut handler, &console, &[ADD_1, loading.as_str(), loading.as_str()]);
        assert_eq!(console.sent.borrow().len(), 2, "only the first pause is sent");
    }

    #[test]
    fn removing_unknown_peer_is_noop() {
        let mut handler = AutoPauseHandler::new();
        let console = RecordingConsole::default();
        feed(&mut handler, &console, &[REMOVE_1]);
        assert!(!handler.is_paused());
        assert_eq!(handler.peer_count(), 0);
        assert!(console.sent.borrow().is_empty());
        assert!(console.notices.borrow().is_empty());
    }

    #[test]
    fn disconnect_mid_join_unpauses() {
        let mut handler = AutoPauseHandler::new();
        let console = RecordingConsole::default();
        let downloading = state_line(1, "Ready", "ConnectedDownloadingMap");
        feed(&mut handler, &console, &[ADD_1, downloading.as_str(), REMOVE_1]);
        assert!(!handler.is_paused());
        assert_eq!(console.sent.borrow().last().map(String::as_str), Some("Unpausing game as join finished"));
    }

    #[test]
    fn stays_paused_while_any_peer_joins() {
        let mut handler = AutoPauseHandler::new();
        let console = RecordingConsole::default();
        let add_2 = "adding peer(2) success(true).";
        let p1_in_game = state_line(1, "TryingToCatchUp", "InGame");
        let p2_in_game = state_line(2, "TryingToCatchUp", "InGame");
        feed(&mut handler, &console, &[ADD_1, add_2, p1_in_game.as_str()]);
        assert!(handler.is_paused(), "peer 2 is still joining");
        feed(&mut handler, &console, &[p2_in_game.as_str()]);
        assert!(!handler.is_paused());
        assert_eq!(console.sent.borrow().len(), 4);
    }

    #[test]
    fn state_change_for_unseen_peer_is_tracked() {
        let mut handler = AutoPauseHandler::new();
        let console = RecordingConsole::default();
        feed(&mut handler, &console, &[state_line(5, "Ready", "ConnectedLoadingMap").as_str()]);
        assert_eq!(handler.peer_state("5"), Some("ConnectedLoadingMap"));
        assert!(handler.is_paused());
    }

    #[test]
    fn flag_matches_current_map_for_any_sequence() {
        // Deterministic pseudo-random walk over add/remove/state-change lines.
        let states = ["Ready", "ConnectedLoadingMap", "InGame", "DisconnectScheduled", "TryingToCatchUp"];
        let mut handler = AutoPauseHandler::new();
        let console = RecordingConsole::default();
        let mut seed: u32 = 0x2545_F491;
        for _ in 0..500 {
            seed ^= seed << 13;
            seed ^= seed >> 17;
            seed ^= seed << 5;
            let peer = seed % 4;
            let line = match (seed >> 8) % 3 {
                0 => format!("adding peer({})", peer),
                1 => format!("removing peer({})", peer),
                _ => state_line(peer, "Ready", states[((seed >> 12) % states.len() as u32) as usize]),
            };
            handler.handle_line(&line, &console).expect("handle_line");
            let expected = handler
                .peers
                .values()
                .any(|s| PAUSE_STATES.contains(&s.as_str()));
            assert_eq!(handler.is_paused(), expected, "after line {:?}", line);
        }
    }

    #[test]
    fn new_server_clears_peers() {
        let mut handler = AutoPauseHandler::new();
        let console = RecordingConsole::default();
        feed(&mut handler, &console, &[ADD_1]);
        handler.server_started();
        assert_eq!(handler.peer_count(), 0);
        assert!(!handler.is_paused());
    }
}
