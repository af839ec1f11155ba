//! # agent-core
//!
//! Core agent logic with provider-agnostic LLM abstraction and extensible tool system.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        Agent                                 │
//! │  ┌─────────────┐  ┌─────────────┐  ┌─────────────────────┐  │
//! │  │  Reasoning  │  │    Tools    │  │   LlmProvider       │  │
//! │  │    Loop     │──│   Registry  │──│   (Strategy)        │  │
//! │  └─────────────┘  └─────────────┘  └─────────────────────┘  │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! The `LlmProvider` trait enables swapping between Ollama, Gemini,
//! or any other provider without changing agent logic. Messages carry
//! optional image/document attachments so a single user turn can be
//! multi-part.

pub mod provider;
pub mod tool;
pub mod reasoning;
pub mod message;
pub mod error;
pub mod session;
pub mod mock;

pub use error::{AgentError, Result};
pub use message::{Attachment, AttachmentKind, Conversation, Message, Role};
pub use provider::LlmProvider;
pub use reasoning::{Agent, AgentConfig, AgentResponse, RunError, ToolInvocation};
pub use session::SessionId;
pub use tool::{Tool, ToolCall, ToolResult, ToolRegistry, ToolSchema};
