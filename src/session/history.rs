use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::turn::ArchivedTurn;

/// Who produced a history entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

/// One archived message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatEntry {
    pub role: Role,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

/// Append-only conversation log. Survives session resets.
#[derive(Debug, Clone, Default, Serialize)]
pub struct HistoryLog {
    entries: Vec<ChatEntry>,
}

impl HistoryLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a finished turn; user text first, then the assistant's
    ///
    /// Returns the number of entries added (0 for an empty turn).
    pub fn archive_turn(&mut self, turn: ArchivedTurn) -> usize {
        let now = Utc::now();
        let before = self.entries.len();

        if let Some(text) = turn.user {
            self.push(Role::User, text, now);
        }
        if let Some(text) = turn.assistant {
            self.push(Role::Assistant, text, now);
        }

        self.entries.len() - before
    }

    pub fn archive_system(&mut self, text: impl Into<String>) {
        let text = text.into();
        if !text.trim().is_empty() {
            self.push(Role::System, text, Utc::now());
        }
    }

    fn push(&mut self, role: Role, text: String, timestamp: DateTime<Utc>) {
        self.entries.push(ChatEntry {
            role,
            text,
            timestamp,
        });
    }

    pub fn entries(&self) -> &[ChatEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_turn_is_a_no_op() {
        let mut log = HistoryLog::new();
        assert_eq!(log.archive_turn(ArchivedTurn::default()), 0);
        assert!(log.is_empty());
    }

    #[test]
    fn test_user_entry_precedes_assistant_entry() {
        let mut log = HistoryLog::new();
        let added = log.archive_turn(ArchivedTurn {
            user: Some("What is a pulsar?".into()),
            assistant: Some("A rotating neutron star.".into()),
        });

        assert_eq!(added, 2);
        assert_eq!(log.entries()[0].role, Role::User);
        assert_eq!(log.entries()[1].role, Role::Assistant);
        assert!(log.entries()[0].timestamp <= log.entries()[1].timestamp);
    }

    #[test]
    fn test_blank_system_event_is_dropped() {
        let mut log = HistoryLog::new();
        log.archive_system("  ");
        log.archive_system("Ingested notes.md");
        assert_eq!(log.len(), 1);
        assert_eq!(log.entries()[0].role, Role::System);
    }
}
