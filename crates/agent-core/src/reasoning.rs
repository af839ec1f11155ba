//! Reasoning Loop
//!
//! Implements the ReAct (Reason + Act) pattern for agent behavior.
//! The agent observes, thinks, acts (via tools), and responds.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{AgentError, Result};
use crate::message::{Conversation, Message, Role};
use crate::provider::{GenerationOptions, LlmProvider};
use crate::tool::{ToolCall, ToolRegistry, ToolResult};

/// Agent configuration
#[derive(Clone, Debug)]
pub struct AgentConfig {
    /// System prompt template
    pub system_prompt: String,

    /// Maximum reasoning iterations before giving up
    pub max_iterations: usize,

    /// Generation options
    pub generation: GenerationOptions,

    /// Whether to append tool descriptions to system prompt
    pub inject_tool_descriptions: bool,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            system_prompt: DEFAULT_SYSTEM_PROMPT.into(),
            max_iterations: 10,
            generation: GenerationOptions::default(),
            inject_tool_descriptions: true,
        }
    }
}

const DEFAULT_SYSTEM_PROMPT: &str = r#"You are a helpful AI assistant.

When you need to use a tool, respond with a JSON block in this exact format:
```tool
{"tool": "tool_name", "arguments": {"arg1": "value1"}}
```

After receiving tool results, synthesize them into a helpful response.
If you can answer directly without tools, do so.
Be concise and accurate."#;

/// One tool call made during a run, with its outcome
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolInvocation {
    pub call: ToolCall,
    pub result: ToolResult,
}

/// Final text of a run plus every tool invocation it made
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AgentResponse {
    /// The model's final (tool-free) answer
    pub content: String,

    /// Tool invocations in call order
    pub invocations: Vec<ToolInvocation>,

    /// Completions requested from the provider
    pub iterations: usize,
}

impl AgentResponse {
    /// Last successful invocation of the named tool
    pub fn last_success(&self, tool: &str) -> Option<&ToolInvocation> {
        self.invocations
            .iter()
            .rev()
            .find(|inv| inv.call.name == tool && inv.result.success)
    }

    /// Names of invoked tools in call order
    pub fn tool_names(&self) -> Vec<String> {
        self.invocations.iter().map(|inv| inv.call.name.clone()).collect()
    }
}

/// A run that stopped before the model produced a final answer
#[derive(Debug, thiserror::Error)]
#[error("{error}")]
pub struct RunError {
    #[source]
    pub error: AgentError,

    /// Tool invocations completed before the failure; `content` is empty
    pub partial: AgentResponse,
}

impl RunError {
    fn new(error: AgentError, partial: AgentResponse) -> Self {
        tracing::warn!(
            error = %error,
            invocations = partial.invocations.len(),
            "Agent run stopped early"
        );
        Self { error, partial }
    }
}

impl From<RunError> for AgentError {
    fn from(err: RunError) -> Self {
        err.error
    }
}

/// The main Agent struct
pub struct Agent {
    provider: Arc<dyn LlmProvider>,
    tools: Arc<ToolRegistry>,
    config: AgentConfig,
}

impl Agent {
    /// Create a new agent
    pub fn new(
        provider: Arc<dyn LlmProvider>,
        tools: Arc<ToolRegistry>,
        config: AgentConfig,
    ) -> Self {
        Self {
            provider,
            tools,
            config,
        }
    }

    /// Build the full system prompt including tool descriptions
    pub fn build_system_prompt(&self) -> String {
        let mut prompt = self.config.system_prompt.clone();

        if self.config.inject_tool_descriptions && !self.tools.is_empty() {
            prompt.push_str("\n\n");
            prompt.push_str(&self.tools.generate_prompt_section());
        }

        prompt
    }

    /// Run the agent until it produces a response without a tool call
    ///
    /// On failure the invocations already made are returned with the error.
    pub async fn run(&self, conversation: &mut Conversation) -> std::result::Result<AgentResponse, RunError> {
        // Ensure system prompt is set
        if conversation.messages().first().map(|m| &m.role) != Some(&Role::System) {
            let messages = conversation.messages_mut();
            messages.insert(0, Message::system(self.build_system_prompt()));
        }

        let mut partial = AgentResponse {
            content: String::new(),
            invocations: Vec::new(),
            iterations: 0,
        };

        loop {
            partial.iterations += 1;

            if partial.iterations > self.config.max_iterations {
                partial.iterations -= 1;
                return Err(RunError::new(AgentError::MaxIterations(self.config.max_iterations), partial));
            }

            // Get completion from provider
            let completion = match self.provider
                .complete(conversation.messages(), &self.config.generation)
                .await
            {
                Ok(completion) => completion,
                Err(error) => return Err(RunError::new(error, partial)),
            };

            let content = completion.content;

            // Add assistant response to conversation
            conversation.push(Message::assistant(&content));

            // Check for tool calls
            if let Some(tool_call) = Self::parse_tool_call(&content) {
                tracing::debug!(tool = %tool_call.name, iteration = partial.iterations, "Executing tool");

                let result = self.execute_tool(&tool_call).await;

                let tool_message = Self::format_tool_result(&result);
                conversation.push(Message::tool(tool_message, &tool_call.name, tool_call.id.clone()));

                partial.invocations.push(ToolInvocation { call: tool_call, result });
                continue;
            }

            // No tool call - this is the final response
            partial.content = content;
            return Ok(partial);
        }
    }

    /// Parse a tool call from LLM response
    pub fn parse_tool_call(content: &str) -> Option<ToolCall> {
        // Look for ```tool ... ``` blocks
        let tool_start = "```tool";
        let tool_end = "```";

        if let Some(start_idx) = content.find(tool_start) {
            let after_marker = &content[start_idx + tool_start.len()..];
            if let Some(end_idx) = after_marker.find(tool_end) {
                let json_str = after_marker[..end_idx].trim();

                if let Ok(call) = serde_json::from_str::<ToolCall>(json_str) {
                    return Some(Self::with_call_id(call));
                }
            }
        }

        // Fallback: try to find raw JSON with "tool" key
        Self::parse_inline_tool_call(content).map(Self::with_call_id)
    }

    fn with_call_id(mut call: ToolCall) -> ToolCall {
        if call.id.is_none() {
            call.id = Some(uuid::Uuid::new_v4().to_string());
        }
        call
    }

    /// Try to parse inline JSON tool call
    fn parse_inline_tool_call(content: &str) -> Option<ToolCall> {
        if !content.contains(r#""tool""#) {
            return None;
        }

        // Find JSON boundaries
        let start = content.find('{')?;
        let end = content.rfind('}')?;

        if end <= start {
            return None;
        }

        let json_str = &content[start..=end];
        serde_json::from_str::<ToolCall>(json_str).ok()
    }

    /// Execute a tool call; errors become failed results for the model to see
    async fn execute_tool(&self, call: &ToolCall) -> ToolResult {
        match self.tools.execute(call).await {
            Ok(mut result) => {
                result.id.clone_from(&call.id);
                result
            }
            Err(e) => {
                tracing::warn!(tool = %call.name, error = %e, "Tool call failed");
                ToolResult::failure(call.name.clone(), format!("Error: {}", e))
                    .with_code(e.code())
                    .with_id(call.id.clone().unwrap_or_default())
            }
        }
    }

    /// Format tool result for conversation
    fn format_tool_result(result: &ToolResult) -> String {
        if result.success {
            format!("[Tool '{}' returned]\n{}", result.name, result.output)
        } else {
            let code = result.code.as_deref().unwrap_or("error");
            format!("[Tool '{}' failed: {}]\n{}", result.name, code, result.output)
        }
    }

    /// Get the tool registry
    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    /// Get configuration
    pub fn config(&self) -> &AgentConfig {
        &self.config
    }
}

/// Builder for Agent configuration
pub struct AgentBuilder {
    provider: Option<Arc<dyn LlmProvider>>,
    tools: ToolRegistry,
    config: AgentConfig,
}

impl Default for AgentBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl AgentBuilder {
    pub fn new() -> Self {
        Self {
            provider: None,
            tools: ToolRegistry::new(),
            config: AgentConfig::default(),
        }
    }

    pub fn provider(mut self, provider: Arc<dyn LlmProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn tool<T: crate::tool::Tool + 'static>(mut self, tool: T) -> Self {
        self.tools.register(tool);
        self
    }

    pub fn tools(mut self, tools: ToolRegistry) -> Self {
        self.tools = tools;
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.system_prompt = prompt.into();
        self
    }

    pub fn generation(mut self, options: GenerationOptions) -> Self {
        self.config.generation = options;
        self
    }

    pub fn max_iterations(mut self, max: usize) -> Self {
        self.config.max_iterations = max;
        self
    }

    pub fn build(self) -> Result<Agent> {
        let provider = self.provider
            .ok_or_else(|| AgentError::Config("Provider is required".into()))?;

        Ok(Agent::new(provider, Arc::new(self.tools), self.config))
    }
}
