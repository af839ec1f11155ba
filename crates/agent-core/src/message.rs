//! Conversation Messages
//!
//! Standard message format used across the agent system. A message may
//! carry image or document attachments so one user turn can combine free
//! text with uploaded material.

use serde::{Deserialize, Serialize};
use chrono::{DateTime, Utc};

/// Role of a message sender
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System prompt/instructions
    System,
    /// User input
    User,
    /// Assistant (LLM) response
    Assistant,
    /// Tool result (injected as context)
    Tool,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::System => write!(f, "system"),
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
            Role::Tool => write!(f, "tool"),
        }
    }
}

/// What an attachment represents to the model
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttachmentKind {
    /// Medical image (scan, photo, chart)
    Image,
    /// Document (EHR export, lab report, free text)
    Document,
}

/// Opaque file handle sent inline with a message
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Attachment {
    pub kind: AttachmentKind,

    /// Sanitized file name
    pub filename: String,

    /// MIME type (e.g. "image/png", "application/pdf")
    pub media_type: String,

    /// Base64-encoded file content
    pub data: String,
}

impl Attachment {
    pub fn new(
        kind: AttachmentKind,
        filename: impl Into<String>,
        media_type: impl Into<String>,
        data: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            filename: filename.into(),
            media_type: media_type.into(),
            data: data.into(),
        }
    }

    /// Whether the payload is plain text that can be inlined into a prompt
    pub fn is_text(&self) -> bool {
        self.media_type.starts_with("text/")
    }
}

/// A single message in a conversation
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Message {
    /// Message role
    pub role: Role,

    /// Text content
    pub content: String,

    /// Inline images/documents
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,

    /// Timestamp
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,

    /// Optional metadata
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<MessageMetadata>,
}

/// Additional message metadata
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct MessageMetadata {
    /// Tool call ID (for tool messages)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,

    /// Tool name (for tool messages)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
}

impl Message {
    /// Create a new message
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            attachments: Vec::new(),
            timestamp: Utc::now(),
            metadata: None,
        }
    }

    /// Create a system message
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    /// Create a user message
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    /// Create an assistant message
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    /// Create a tool result message
    pub fn tool(content: impl Into<String>, tool_name: &str, tool_call_id: Option<String>) -> Self {
        let mut msg = Self::new(Role::Tool, content);
        msg.metadata = Some(MessageMetadata {
            tool_call_id,
            tool_name: Some(tool_name.to_string()),
        });
        msg
    }

    /// Attach images/documents to the message
    pub fn with_attachments(mut self, attachments: Vec<Attachment>) -> Self {
        self.attachments.extend(attachments);
        self
    }

    /// Estimate token count (rough approximation)
    pub fn estimate_tokens(&self) -> u32 {
        // ~4 characters per token; attachments are budgeted at a flat rate
        let text = u32::try_from(self.content.len() / 4).unwrap_or(u32::MAX);
        let attached = u32::try_from(self.attachments.len()).unwrap_or(u32::MAX) * 258;
        text.saturating_add(attached).saturating_add(4)
    }
}

/// Conversation history with utility methods
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Conversation {
    messages: Vec<Message>,

    /// Maximum context length (in estimated tokens)
    #[serde(default = "default_max_context")]
    max_context_tokens: u32,
}

fn default_max_context() -> u32 {
    32_768
}

impl Default for Conversation {
    fn default() -> Self {
        Self {
            messages: Vec::new(),
            max_context_tokens: default_max_context(),
        }
    }
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_system_prompt(prompt: impl Into<String>) -> Self {
        let mut conv = Self::new();
        conv.push(Message::system(prompt));
        conv
    }

    /// Override the token budget used by [`Conversation::truncate_to_fit`]
    pub fn with_max_context_tokens(mut self, max: u32) -> Self {
        self.max_context_tokens = max;
        self
    }

    /// Add a message
    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    /// Get all messages
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Get messages as mutable
    pub fn messages_mut(&mut self) -> &mut Vec<Message> {
        &mut self.messages
    }

    /// Get the last message
    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// Estimate total tokens in conversation
    pub fn estimate_tokens(&self) -> u32 {
        self.messages.iter().map(Message::estimate_tokens).sum()
    }

    /// Truncate to fit within token limit, preserving system and recent messages
    pub fn truncate_to_fit(&mut self) {
        while self.estimate_tokens() > self.max_context_tokens && self.messages.len() > 2 {
            // Find first non-system message and remove it
            if let Some(pos) = self.messages.iter().position(|m| m.role != Role::System) {
                // Don't remove the very last message
                if pos < self.messages.len() - 1 {
                    self.messages.remove(pos);
                } else {
                    break;
                }
            } else {
                break;
            }
        }
    }

    /// Keep system messages plus the `max` most recent others
    pub fn retain_recent(&mut self, max: usize) {
        let others = self.messages.iter().filter(|m| m.role != Role::System).count();
        let mut to_drop = others.saturating_sub(max);
        self.messages.retain(|m| {
            if m.role != Role::System && to_drop > 0 {
                to_drop -= 1;
                false
            } else {
                true
            }
        });
    }

    /// Number of messages
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_creation() {
        let msg = Message::user("Hello");
        assert_eq!(msg.role, Role::User);
        assert_eq!(msg.content, "Hello");
        assert!(msg.attachments.is_empty());
    }

    #[test]
    fn test_conversation() {
        let mut conv = Conversation::with_system_prompt("You are helpful.");
        conv.push(Message::user("Hi"));
        conv.push(Message::assistant("Hello!"));

        assert_eq!(conv.len(), 3);
        assert!(conv.last().unwrap().role == Role::Assistant);
    }

    #[test]
    fn test_retain_recent_keeps_system_prompt() {
        let mut conv = Conversation::with_system_prompt("rules");
        for i in 0..6 {
            conv.push(Message::user(format!("q{i}")));
        }
        conv.retain_recent(2);

        assert_eq!(conv.len(), 3);
        assert_eq!(conv.messages()[0].role, Role::System);
        assert_eq!(conv.messages()[1].content, "q4");
        assert_eq!(conv.messages()[2].content, "q5");
    }

    #[test]
    fn test_truncate_to_fit_drops_oldest_turns() {
        let mut conv = Conversation::with_system_prompt("rules").with_max_context_tokens(20);
        conv.push(Message::user("a".repeat(100)));
        conv.push(Message::user("latest"));
        conv.truncate_to_fit();

        assert_eq!(conv.len(), 2);
        assert_eq!(conv.last().unwrap().content, "latest");
    }

    #[test]
    fn test_attachment_is_text() {
        let doc = Attachment::new(AttachmentKind::Document, "labs.txt", "text/plain", "aGk=");
        let scan = Attachment::new(AttachmentKind::Image, "xray.png", "image/png", "AAAA");
        assert!(doc.is_text());
        assert!(!scan.is_text());

        let msg = Message::user("see attached").with_attachments(vec![doc, scan]);
        assert_eq!(msg.attachments.len(), 2);
    }
}
