use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Emotional tag the assistant embeds in its speech for the visual layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mood {
    #[default]
    Neutral,
    Sad,
    Good,
    Mystical,
    Angry,
}

impl Mood {
    pub const ALL: [Mood; 5] = [Mood::Neutral, Mood::Sad, Mood::Good, Mood::Mystical, Mood::Angry];

    pub fn as_str(&self) -> &'static str {
        match self {
            Mood::Neutral => "neutral",
            Mood::Sad => "sad",
            Mood::Good => "good",
            Mood::Mystical => "mystical",
            Mood::Angry => "angry",
        }
    }
}

impl fmt::Display for Mood {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mood {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Mood::ALL
            .into_iter()
            .find(|mood| mood.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown mood tag: {}", s))
    }
}

/// Extracts `[MOOD:TAG]` markers from assistant text
#[derive(Debug, Clone)]
pub struct MoodMarkers {
    pattern: Regex,
    vocabulary: Vec<Mood>,
}

/// Assistant text with markers removed, plus the mood they selected
#[derive(Debug, Clone, PartialEq)]
pub struct StrippedText {
    pub text: String,
    pub mood: Option<Mood>,
}

impl MoodMarkers {
    pub fn new(vocabulary: Vec<Mood>) -> Self {
        // Leading blanks go with the marker so "A [MOOD:SAD] B" reads "A B"
        let pattern = Regex::new(r"(?i)[ \t]*\[MOOD:(\w+)\]").expect("static mood pattern");
        Self { pattern, vocabulary }
    }

    /// Strip every marker; the first one naming a known tag sets the mood.
    /// Markers outside the vocabulary are removed but ignored.
    pub fn strip(&self, text: &str) -> StrippedText {
        let mood = self
            .pattern
            .captures_iter(text)
            .filter_map(|caps| caps.get(1))
            .filter_map(|tag| tag.as_str().parse::<Mood>().ok())
            .find(|mood| self.vocabulary.contains(mood));

        let text = self.pattern.replace_all(text, "").into_owned();
        StrippedText { text, mood }
    }
}

impl Default for MoodMarkers {
    fn default() -> Self {
        Self::new(Mood::ALL.to_vec())
    }
}

/// Transcript text of the turn in progress
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TurnAccumulator {
    /// Speech-to-text of the user
    pub user_text: String,
    /// What the assistant has said so far, markers stripped
    pub assistant_text: String,
    pub mood: Mood,
}

/// Trimmed, non-empty turn text ready for the history log
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ArchivedTurn {
    pub user: Option<String>,
    pub assistant: Option<String>,
}

impl TurnAccumulator {
    pub fn push_user(&mut self, fragment: &str) {
        self.user_text.push_str(fragment);
    }

    pub fn push_assistant(&mut self, fragment: &str) {
        self.assistant_text.push_str(fragment);
    }

    pub fn is_empty(&self) -> bool {
        self.user_text.trim().is_empty() && self.assistant_text.trim().is_empty()
    }

    /// Take both buffers, leaving the accumulator cleared and neutral
    pub fn take(&mut self) -> ArchivedTurn {
        let non_empty = |s: String| {
            let trimmed = s.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        };

        let archived = ArchivedTurn {
            user: non_empty(std::mem::take(&mut self.user_text)),
            assistant: non_empty(std::mem::take(&mut self.assistant_text)),
        };
        self.mood = Mood::Neutral;
        archived
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_marker_is_stripped_and_sets_mood() {
        let markers = MoodMarkers::default();
        let out = markers.strip("A [MOOD:SAD] B");
        assert_eq!(out.text, "A B");
        assert_eq!(out.mood, Some(Mood::Sad));
    }

    #[test]
    fn test_marker_is_case_insensitive() {
        let markers = MoodMarkers::default();
        let out = markers.strip("[mood:Mystical]Once upon a time");
        assert_eq!(out.text, "Once upon a time");
        assert_eq!(out.mood, Some(Mood::Mystical));
    }

    #[test]
    fn test_text_without_marker_is_untouched() {
        let markers = MoodMarkers::default();
        let out = markers.strip(" plain words ");
        assert_eq!(out.text, " plain words ");
        assert_eq!(out.mood, None);
    }

    #[test]
    fn test_unknown_tag_is_removed_but_ignored() {
        let markers = MoodMarkers::default();
        let out = markers.strip("x [MOOD:SLEEPY] y");
        assert_eq!(out.text, "x y");
        assert_eq!(out.mood, None);
    }

    #[test]
    fn test_tag_outside_vocabulary_is_ignored() {
        let markers = MoodMarkers::new(vec![Mood::Neutral, Mood::Good]);
        let out = markers.strip("[MOOD:ANGRY] then [MOOD:GOOD] after");
        assert_eq!(out.text, " then after");
        assert_eq!(out.mood, Some(Mood::Good));
    }

    #[test]
    fn test_mood_from_str() {
        assert_eq!("ANGRY".parse::<Mood>(), Ok(Mood::Angry));
        assert!("joyful".parse::<Mood>().is_err());
    }

    #[test]
    fn test_take_returns_only_non_empty_buffers() {
        let mut turn = TurnAccumulator::default();
        turn.push_user("Hello");
        turn.mood = Mood::Good;

        let archived = turn.take();
        assert_eq!(archived.user.as_deref(), Some("Hello"));
        assert_eq!(archived.assistant, None);
        assert_eq!(turn, TurnAccumulator::default());
    }

    #[test]
    fn test_whitespace_only_buffers_are_cleared() {
        let mut turn = TurnAccumulator::default();
        turn.push_assistant("   ");
        assert!(turn.is_empty());

        let archived = turn.take();
        assert_eq!(archived, ArchivedTurn::default());
        assert!(turn.assistant_text.is_empty());
    }
}
