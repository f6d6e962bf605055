use serde::Serialize;

use super::grounding::GroundingLinkRing;
use super::history::HistoryLog;
use super::turn::TurnAccumulator;

/// Application-level state built from the event stream
#[derive(Debug, Clone, Serialize)]
pub struct Conversation {
    pub turn: TurnAccumulator,
    pub history: HistoryLog,
    pub links: GroundingLinkRing,
    /// Document whose summary was (or is being) injected
    pub active_document: Option<String>,
}

impl Conversation {
    pub fn new(grounding_link_cap: usize) -> Self {
        Self {
            turn: TurnAccumulator::default(),
            history: HistoryLog::new(),
            links: GroundingLinkRing::new(grounding_link_cap),
            active_document: None,
        }
    }

    /// Move the current turn into the history; returns entries added
    pub fn archive_turn(&mut self) -> usize {
        let turn = self.turn.take();
        self.history.archive_turn(turn)
    }

    /// Clear everything tied to the old session except the history log
    pub fn reset_transient(&mut self) {
        self.turn = TurnAccumulator::default();
        self.links.clear();
        self.active_document = None;
    }
}
