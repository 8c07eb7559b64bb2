use quill_core::{Agent, AgentBuilder};
use quill_model::{ModelProvider, ThinkingLevel};
use quill_openai_model::{Environment, ModelHandle, ResolveError, resolve_model};

/// The backend used when `QUILL_BACKEND` is not set.
pub const DEFAULT_BACKEND: &str = "azure-openai-responses";

/// The model used when `QUILL_MODEL` is not set.
pub const DEFAULT_MODEL: &str = "gpt-4.1";

/// The prompt sent when `QUILL_PROMPT` is not set.
pub const DEFAULT_PROMPT: &str = "What is 2 + 2?";

/// The system prompt of the agent.
pub const SYSTEM_PROMPT: &str =
    "You are a helpful assistant. Keep responses concise.";

const QUILL_BACKEND: &str = "QUILL_BACKEND";
const QUILL_MODEL: &str = "QUILL_MODEL";
const QUILL_PROMPT: &str = "QUILL_PROMPT";

/// What the CLI should run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DemoSettings {
    /// The backend identifier.
    pub backend: String,
    /// The model identifier.
    pub model: String,
    /// The prompt to send.
    pub prompt: String,
}

impl DemoSettings {
    /// Reads the settings from `env`, falling back to the defaults.
    pub fn from_env(env: &Environment) -> Self {
        let read = |name, default: &str| {
            env.get(name).unwrap_or(default).to_owned()
        };
        Self {
            backend: read(QUILL_BACKEND, DEFAULT_BACKEND),
            model: read(QUILL_MODEL, DEFAULT_MODEL),
            prompt: read(QUILL_PROMPT, DEFAULT_PROMPT),
        }
    }

    /// Resolves the model handle for these settings.
    #[inline]
    pub fn resolve(
        &self,
        env: &Environment,
    ) -> Result<ModelHandle, ResolveError> {
        resolve_model(&self.backend, &self.model, env)
    }
}

/// Builds the agent used by the CLI: [`SYSTEM_PROMPT`], thinking off and
/// no tools.
pub fn build_agent<P: ModelProvider + 'static>(provider: P) -> Agent {
    AgentBuilder::with_model_provider(provider)
        .with_system_prompt(SYSTEM_PROMPT)
        .with_thinking_level(ThinkingLevel::Off)
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = DemoSettings::from_env(&Environment::default());
        assert_eq!(settings.backend, "azure-openai-responses");
        assert_eq!(settings.model, "gpt-4.1");
        assert_eq!(settings.prompt, "What is 2 + 2?");
    }

    #[test]
    fn test_overrides() {
        let env = Environment::from_pairs([
            ("QUILL_BACKEND", "openai"),
            ("QUILL_MODEL", "gpt-4o"),
            ("QUILL_PROMPT", "  "),
        ]);
        let settings = DemoSettings::from_env(&env);
        assert_eq!(settings.backend, "openai");
        assert_eq!(settings.model, "gpt-4o");
        // Blank values count as unset.
        assert_eq!(settings.prompt, DEFAULT_PROMPT);
    }

    #[test]
    fn test_missing_environment() {
        let settings = DemoSettings::from_env(&Environment::default());
        let err = settings.resolve(&Environment::default()).unwrap_err();
        assert_eq!(
            err,
            ResolveError::MissingVariable("AZURE_OPENAI_API_KEY")
        );
    }
}
