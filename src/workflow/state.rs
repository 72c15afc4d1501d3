//! Fixed-schema conversation state carried between turns.

use serde::{Deserialize, Serialize};

use crate::profile::{ProfileFields, UserProfile};

/// Who produced a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    Human,
    Assistant,
}

impl MessageRole {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Human => "human",
            Self::Assistant => "assistant",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "assistant" | "ai" => Self::Assistant,
            _ => Self::Human,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: MessageRole,
    pub content: String,
}

impl ChatTurn {
    pub fn human(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Human,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
        }
    }
}

/// Post-onboarding handling path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    WelfareSearch,
    GeneralQuery,
}

impl std::fmt::Display for Intent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::WelfareSearch => f.write_str("welfare_search"),
            Self::GeneralQuery => f.write_str("general_query"),
        }
    }
}

/// State of one conversation, checkpointed after every turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationState {
    /// Full history, oldest first.
    pub messages: Vec<ChatTurn>,
    pub user_id: String,
    /// Re-derived from the store on every turn.
    pub is_onboarding: bool,
    pub user_profile_data: ProfileFields,
    #[serde(default)]
    pub intent: Option<Intent>,
    #[serde(default)]
    pub tool_output: Option<String>,
    #[serde(default)]
    pub final_response_text: Option<String>,
    #[serde(default)]
    pub backstory: Option<String>,
    /// Stored profile loaded by the profile check this turn.
    #[serde(skip)]
    pub profile: Option<UserProfile>,
}

impl ConversationState {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            messages: Vec::new(),
            user_id: user_id.into(),
            is_onboarding: true,
            user_profile_data: ProfileFields::default(),
            intent: None,
            tool_output: None,
            final_response_text: None,
            backstory: None,
            profile: None,
        }
    }

    /// Clear per-turn fields and append the new human utterance.
    pub fn begin_turn(&mut self, utterance: &str) {
        self.intent = None;
        self.tool_output = None;
        self.final_response_text = None;
        self.backstory = None;
        self.profile = None;
        self.messages.push(ChatTurn::human(utterance));
    }

    pub fn last_human_message(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == MessageRole::Human)
            .map(|m| m.content.as_str())
    }

    pub fn human_message_count(&self) -> usize {
        self.messages
            .iter()
            .filter(|m| m.role == MessageRole::Human)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::ProfileField;

    #[test]
    fn begin_turn_resets_transient_fields() {
        let mut state = ConversationState::new("u1");
        state.intent = Some(Intent::GeneralQuery);
        state.tool_output = Some("raw".into());
        state.final_response_text = Some("done".into());
        state.backstory = Some("story".into());

        state.begin_turn("hello again");

        assert!(state.intent.is_none());
        assert!(state.tool_output.is_none());
        assert!(state.final_response_text.is_none());
        assert!(state.backstory.is_none());
        assert_eq!(state.last_human_message(), Some("hello again"));
    }

    #[test]
    fn history_is_kept_across_turns() {
        let mut state = ConversationState::new("u1");
        state.begin_turn("one");
        state.messages.push(ChatTurn::assistant("reply"));
        state.begin_turn("two");
        assert_eq!(state.messages.len(), 3);
        assert_eq!(state.human_message_count(), 2);
        assert_eq!(state.last_human_message(), Some("two"));
    }

    #[test]
    fn serializes_without_loaded_profile() {
        let mut state = ConversationState::new("u1");
        state.user_profile_data.set(ProfileField::Name, "Asha");
        state.intent = Some(Intent::WelfareSearch);
        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(json["intent"], "welfare_search");
        assert_eq!(json["user_profile_data"]["name"], "Asha");
        assert!(json.get("profile").is_none());

        let back: ConversationState = serde_json::from_value(json).unwrap();
        assert_eq!(back, state);
    }
}
