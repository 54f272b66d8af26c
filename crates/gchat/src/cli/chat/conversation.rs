use tracing::debug;

use crate::api_client::model::{
    Content,
    GenerateContentRequest,
    USER_ROLE,
};

/// The turns of one chat session, sent in full with every request.
#[derive(Debug, Clone, Default)]
pub struct ConversationState {
    conversation_id: String,
    history: Vec<Content>,
    system_instruction: Option<String>,
}

impl ConversationState {
    pub fn new(system_instruction: Option<String>) -> Self {
        let conversation_id = uuid::Uuid::new_v4().to_string();
        debug!(?conversation_id, "Generated new conversation id");
        Self {
            conversation_id,
            history: Vec::new(),
            system_instruction: system_instruction.filter(|s| !s.trim().is_empty()),
        }
    }

    pub fn conversation_id(&self) -> &str {
        &self.conversation_id
    }

    pub fn history(&self) -> &[Content] {
        &self.history
    }

    pub fn system_instruction(&self) -> Option<&str> {
        self.system_instruction.as_deref()
    }

    pub fn push_user_message(&mut self, text: impl Into<String>) {
        self.history.push(Content::user(text));
    }

    /// Records the model's answer to the last user message. Empty answers are not recorded.
    pub fn push_assistant_message(&mut self, text: impl Into<String>) {
        let text = text.into();
        if !text.is_empty() {
            self.history.push(Content::model(text));
        }
    }

    /// Whether the last turn is a user message still waiting for an answer.
    pub fn awaiting_response(&self) -> bool {
        self.history
            .last()
            .is_some_and(|turn| turn.role.as_deref() == Some(USER_ROLE))
    }

    pub fn clear(&mut self) {
        self.history.clear();
    }

    /// Builds the request body for the current history, without tools.
    pub fn to_request(&self) -> GenerateContentRequest {
        GenerateContentRequest {
            contents: self.history.clone(),
            system_instruction: self.system_instruction.as_deref().map(Content::system),
            tools: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api_client::model::MODEL_ROLE;

    #[test]
    fn test_turns() {
        let mut conversation = ConversationState::new(Some("Be terse.".to_owned()));
        assert!(!conversation.awaiting_response());

        conversation.push_user_message("hi");
        assert!(conversation.awaiting_response());
        conversation.push_assistant_message("hello");
        assert!(!conversation.awaiting_response());

        let request = conversation.to_request();
        assert_eq!(request.contents.len(), 2);
        assert_eq!(request.contents[1].role.as_deref(), Some(MODEL_ROLE));
        assert_eq!(request.system_instruction, Some(Content::system("Be terse.")));

        conversation.clear();
        assert!(conversation.history().is_empty());
        assert_eq!(conversation.system_instruction(), Some("Be terse."));
    }

    #[test]
    fn test_blank_values_are_dropped() {
        let mut conversation = ConversationState::new(Some("  ".to_owned()));
        assert_eq!(conversation.system_instruction(), None);
        assert!(conversation.to_request().system_instruction.is_none());

        conversation.push_user_message("hi");
        conversation.push_assistant_message("");
        assert_eq!(conversation.history().len(), 1);
        assert!(!conversation.conversation_id().is_empty());
    }
}
