use quill_model::{ModelProvider, ThinkingLevel};

use super::Agent;
use crate::model_client::ModelClient;
use crate::tool::{AnyTool, Tool, ToolObject};

/// The default number of model rounds a single prompt may take.
pub const DEFAULT_MAX_ROUNDS: usize = 16;

/// [`Agent`] builder.
pub struct AgentBuilder {
    pub(crate) model_client: ModelClient,
    pub(crate) system_prompt: String,
    pub(crate) thinking_level: ThinkingLevel,
    pub(crate) max_rounds: usize,
    pub(crate) tools: Vec<Box<dyn ToolObject>>,
}

impl AgentBuilder {
    /// Creates a new builder with the specified model provider.
    #[inline]
    pub fn with_model_provider<P: ModelProvider + 'static>(
        provider: P,
    ) -> Self {
        Self {
            model_client: ModelClient::new(provider),
            system_prompt: String::new(),
            thinking_level: ThinkingLevel::Off,
            max_rounds: DEFAULT_MAX_ROUNDS,
            tools: vec![],
        }
    }

    /// Sets the system prompt. An empty prompt sends no system message.
    #[inline]
    pub fn with_system_prompt<S: Into<String>>(
        mut self,
        system_prompt: S,
    ) -> Self {
        self.system_prompt = system_prompt.into();
        self
    }

    /// Sets the thinking level.
    #[inline]
    pub fn with_thinking_level(mut self, level: ThinkingLevel) -> Self {
        self.thinking_level = level;
        self
    }

    /// Sets how many model rounds a prompt may take before it fails.
    ///
    /// Values below 1 are treated as 1.
    #[inline]
    pub fn with_max_rounds(mut self, max_rounds: usize) -> Self {
        self.max_rounds = max_rounds.max(1);
        self
    }

    /// Registers a tool.
    #[inline]
    pub fn with_tool<T: Tool>(mut self, tool: T) -> Self {
        self.tools.push(Box::new(AnyTool(tool)));
        self
    }

    /// Builds the agent.
    ///
    /// # Panics
    ///
    /// Panics if called outside of a Tokio runtime.
    #[inline]
    pub fn build(self) -> Agent {
        Agent::spawn_from_builder(self)
    }
}
