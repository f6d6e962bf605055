//! Event classifier
//!
//! Splits one inbound [`ServerEvent`] into the concerns it carries and applies
//! each of them to the conversation, the signals and the playback scheduler.
//! Several branches may fire for the same event; they are applied in a fixed
//! order (tool call, grounding, user text, assistant text, turn complete,
//! audio, interruption).

use tracing::{debug, info};

use super::conversation::Conversation;
use super::grounding::{links_from_metadata, GroundingLink};
use super::signals::SignalSender;
use super::turn::{Mood, MoodMarkers, StrippedText};
use crate::audio::PlaybackScheduler;
use crate::protocol::{InlineData, ServerEvent};

/// One concern extracted from an inbound event
#[derive(Debug, Clone, PartialEq)]
pub enum EventAction {
    ToolCall,
    Grounding(Vec<GroundingLink>),
    UserTranscript(String),
    AssistantTranscript(StrippedText),
    TurnComplete,
    Audio(InlineData),
    Interrupted,
}

#[derive(Debug, Clone, Default)]
pub struct EventClassifier {
    markers: MoodMarkers,
}

impl EventClassifier {
    pub fn new(mood_tags: Vec<Mood>) -> Self {
        Self {
            markers: MoodMarkers::new(mood_tags),
        }
    }

    pub fn classify(&self, event: &ServerEvent) -> Vec<EventAction> {
        let mut actions = Vec::new();

        if event.tool_call.is_some() {
            actions.push(EventAction::ToolCall);
        }

        let Some(content) = event.server_content.as_ref() else {
            return actions;
        };

        if let Some(metadata) = &content.grounding_metadata {
            let links = links_from_metadata(metadata);
            if !links.is_empty() {
                actions.push(EventAction::Grounding(links));
            }
        }

        if let Some(fragment) = &content.input_transcription {
            actions.push(EventAction::UserTranscript(fragment.text.clone()));
        }

        if let Some(fragment) = &content.output_transcription {
            actions.push(EventAction::AssistantTranscript(self.markers.strip(&fragment.text)));
        }

        if content.turn_complete {
            actions.push(EventAction::TurnComplete);
        }

        actions.extend(event.audio_parts().cloned().map(EventAction::Audio));

        if content.interrupted {
            actions.push(EventAction::Interrupted);
        }

        actions
    }

    /// Classify `event` and apply every resulting action in order
    pub fn dispatch(
        &self,
        event: &ServerEvent,
        conversation: &mut Conversation,
        scheduler: &PlaybackScheduler,
        signals: &SignalSender,
    ) {
        for action in self.classify(event) {
            apply(action, conversation, scheduler, signals);
        }
    }
}

fn apply(
    action: EventAction,
    conversation: &mut Conversation,
    scheduler: &PlaybackScheduler,
    signals: &SignalSender,
) {
    match action {
        EventAction::ToolCall => {
            info!("Assistant is searching");
            signals.update(|s| s.searching = true);
        }

        EventAction::Grounding(links) => {
            debug!("Received {} grounding links", links.len());
            conversation.links.extend(links);
        }

        EventAction::UserTranscript(text) => {
            conversation.turn.push_user(&text);
        }

        EventAction::AssistantTranscript(StrippedText { text, mood }) => {
            if let Some(mood) = mood {
                debug!("Mood marker: {}", mood);
                conversation.turn.mood = mood;
            }
            conversation.turn.push_assistant(&text);
            let mood = conversation.turn.mood;
            signals.update(|s| {
                s.mood = mood;
                s.searching = false;
                s.assistant_speaking = true;
            });
        }

        EventAction::TurnComplete => {
            let archived = conversation.archive_turn();
            debug!("Turn complete ({} history entries added)", archived);
            signals.update(|s| {
                s.assistant_speaking = false;
                s.searching = false;
                s.mood = Mood::Neutral;
            });
        }

        EventAction::Audio(payload) => {
            scheduler.submit(payload);
        }

        EventAction::Interrupted => {
            scheduler.interrupt(|| {
                conversation.archive_turn();
            });
            signals.update(|s| {
                s.assistant_speaking = false;
                s.searching = false;
                s.mood = Mood::Neutral;
            });
        }
    }
}
