use std::fmt::{self, Display};
use std::str::FromStr;

/// A supported model backend.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Backend {
    /// OpenAI (or any compatible server) over the Chat Completions API.
    OpenAI,
    /// Azure OpenAI over the Responses API.
    AzureOpenAIResponses,
}

/// The wire protocol spoken with a backend.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Protocol {
    /// `POST /chat/completions`.
    ChatCompletions,
    /// `POST /responses`.
    Responses,
}

impl Backend {
    /// All known backends.
    pub const ALL: [Backend; 2] = [Backend::OpenAI, Backend::AzureOpenAIResponses];

    /// Returns the identifier used to select this backend.
    #[inline]
    pub fn id(&self) -> &'static str {
        match self {
            Backend::OpenAI => "openai",
            Backend::AzureOpenAIResponses => "azure-openai-responses",
        }
    }

    /// Returns the wire protocol of this backend.
    #[inline]
    pub fn protocol(&self) -> Protocol {
        match self {
            Backend::OpenAI => Protocol::ChatCompletions,
            Backend::AzureOpenAIResponses => Protocol::Responses,
        }
    }

    /// Returns the known models of this backend.
    ///
    /// Both backends share one table: they serve the same model family,
    /// and Azure deployments are expected to be named after the model.
    #[inline]
    pub fn models(&self) -> impl Iterator<Item = ModelSpec> {
        MODELS.iter().map(CatalogEntry::to_spec)
    }

    /// Looks up a model by id in the table shared by all backends.
    pub fn find_model(&self, id: &str) -> Option<ModelSpec> {
        MODELS
            .iter()
            .find(|entry| entry.id == id)
            .map(CatalogEntry::to_spec)
    }
}

impl Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for Backend {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Backend::ALL
            .into_iter()
            .find(|backend| backend.id() == s)
            .ok_or(())
    }
}

/// Static information about a model.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ModelSpec {
    /// The model id sent to the backend.
    pub id: String,
    /// A human-readable name.
    pub name: String,
    /// Whether the model accepts a reasoning effort.
    pub reasoning: bool,
    /// Context window size in tokens.
    pub context_window: u32,
    /// Maximum number of output tokens.
    pub max_output_tokens: u32,
}

struct CatalogEntry {
    id: &'static str,
    name: &'static str,
    reasoning: bool,
    context_window: u32,
    max_output_tokens: u32,
}

impl CatalogEntry {
    fn to_spec(&self) -> ModelSpec {
        ModelSpec {
            id: self.id.to_owned(),
            name: self.name.to_owned(),
            reasoning: self.reasoning,
            context_window: self.context_window,
            max_output_tokens: self.max_output_tokens,
        }
    }
}

macro_rules! catalog {
    ($(($id:literal, $name:literal, $reasoning:literal, $ctx:literal, $out:literal)),* $(,)?) => {
        &[$(CatalogEntry {
            id: $id,
            name: $name,
            reasoning: $reasoning,
            context_window: $ctx,
            max_output_tokens: $out,
        }),*]
    };
}

static MODELS: &[CatalogEntry] = catalog![
    ("gpt-4o", "GPT-4o", false, 128_000, 16_384),
    ("gpt-4o-mini", "GPT-4o mini", false, 128_000, 16_384),
    ("gpt-4.1", "GPT-4.1", false, 1_047_576, 32_768),
    ("gpt-4.1-mini", "GPT-4.1 mini", false, 1_047_576, 32_768),
    ("gpt-4.1-nano", "GPT-4.1 nano", false, 1_047_576, 32_768),
    ("o3", "o3", true, 200_000, 100_000),
    ("o4-mini", "o4-mini", true, 200_000, 100_000),
    ("gpt-5", "GPT-5", true, 400_000, 128_000),
    ("gpt-5-mini", "GPT-5 mini", true, 400_000, 128_000),
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_ids_round_trip() {
        for backend in Backend::ALL {
            assert_eq!(backend.id().parse(), Ok(backend));
        }
        assert!("anthropic".parse::<Backend>().is_err());
    }

    #[test]
    fn test_find_model() {
        let spec = Backend::AzureOpenAIResponses.find_model("gpt-4.1").unwrap();
        assert_eq!(spec.name, "GPT-4.1");
        assert!(!spec.reasoning);
        assert!(Backend::OpenAI.find_model("o3").unwrap().reasoning);
        assert!(Backend::OpenAI.find_model("gpt-2").is_none());
    }

    #[test]
    fn test_backends_share_the_table() {
        let openai: Vec<ModelSpec> = Backend::OpenAI.models().collect();
        let azure: Vec<ModelSpec> =
            Backend::AzureOpenAIResponses.models().collect();
        assert_eq!(openai, azure);
        assert_eq!(
            Backend::OpenAI.find_model("gpt-5"),
            Backend::AzureOpenAIResponses.find_model("gpt-5")
        );
    }

    #[test]
    fn test_model_ids_are_unique() {
        let mut ids: Vec<String> =
            Backend::OpenAI.models().map(|spec| spec.id).collect();
        let len = ids.len();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), len);
    }
}
