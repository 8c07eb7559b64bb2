use thiserror::Error;

use crate::Environment;
use crate::catalog::Backend;
use crate::handle::{ModelHandle, ModelHandleBuilder, azure_resource_url};

/// Errors returned while resolving a model handle.
///
/// Resolution never touches the network, so these are all configuration
/// problems that should be reported before any request is attempted.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ResolveError {
    /// The backend identifier is not known.
    #[error("unknown backend `{0}` (expected one of: {known})", known = known_backends())]
    UnknownBackend(String),
    /// The model is not known for the backend.
    #[error("unknown model `{model}` for backend `{backend}`")]
    UnknownModel {
        /// The backend identifier.
        backend: &'static str,
        /// The requested model.
        model: String,
    },
    /// A required environment variable is not set.
    #[error("environment variable `{0}` is not set")]
    MissingVariable(&'static str),
    /// None of the alternative environment variables is set.
    #[error("one of the environment variables {} must be set", .0.join(", "))]
    MissingOneOf(&'static [&'static str]),
    /// No API key was given to the builder.
    #[error("no API key configured for backend `{backend}`")]
    MissingApiKey {
        /// The backend identifier.
        backend: &'static str,
    },
    /// No base URL was given to the builder, and the backend has none.
    #[error("no base URL configured for backend `{backend}`")]
    MissingBaseUrl {
        /// The backend identifier.
        backend: &'static str,
    },
    /// The base URL cannot be used.
    #[error("invalid base URL `{url}`: {reason}")]
    InvalidBaseUrl {
        /// The offending URL.
        url: String,
        /// Why it was rejected.
        reason: String,
    },
}

fn known_backends() -> String {
    Backend::ALL
        .iter()
        .map(Backend::id)
        .collect::<Vec<_>>()
        .join(", ")
}

const OPENAI_API_KEY: &str = "OPENAI_API_KEY";
const OPENAI_BASE_URL: &str = "OPENAI_BASE_URL";
const AZURE_OPENAI_API_KEY: &str = "AZURE_OPENAI_API_KEY";
const AZURE_OPENAI_BASE_URL: &str = "AZURE_OPENAI_BASE_URL";
const AZURE_OPENAI_RESOURCE_NAME: &str = "AZURE_OPENAI_RESOURCE_NAME";
const AZURE_OPENAI_API_VERSION: &str = "AZURE_OPENAI_API_VERSION";

/// Resolves a model handle for `backend` and `model`, reading credentials
/// and endpoints from `env`.
///
/// | backend                  | variables                                        |
/// |--------------------------|--------------------------------------------------|
/// | `openai`                 | `OPENAI_API_KEY`, optional `OPENAI_BASE_URL`     |
/// | `azure-openai-responses` | `AZURE_OPENAI_API_KEY`, `AZURE_OPENAI_BASE_URL` or `AZURE_OPENAI_RESOURCE_NAME`, optional `AZURE_OPENAI_API_VERSION` |
///
/// The backend and model are checked before the environment, so a typo
/// in the model name is reported even when credentials are missing.
pub fn resolve_model(
    backend: &str,
    model: &str,
    env: &Environment,
) -> Result<ModelHandle, ResolveError> {
    let backend: Backend = backend
        .parse()
        .map_err(|_| ResolveError::UnknownBackend(backend.to_owned()))?;
    let builder = ModelHandleBuilder::new(backend, model)?;

    let handle = match backend {
        Backend::OpenAI => {
            let api_key = require(env, OPENAI_API_KEY)?;
            let mut builder = builder.with_api_key(api_key);
            if let Some(base_url) = env.get(OPENAI_BASE_URL) {
                builder = builder.with_base_url(base_url);
            }
            builder.build()?
        }
        Backend::AzureOpenAIResponses => {
            let api_key = require(env, AZURE_OPENAI_API_KEY)?;
            let base_url = match (
                env.get(AZURE_OPENAI_BASE_URL),
                env.get(AZURE_OPENAI_RESOURCE_NAME),
            ) {
                (Some(base_url), _) => base_url.to_owned(),
                (None, Some(resource)) => azure_resource_url(resource),
                (None, None) => {
                    return Err(ResolveError::MissingOneOf(&[
                        AZURE_OPENAI_BASE_URL,
                        AZURE_OPENAI_RESOURCE_NAME,
                    ]));
                }
            };
            let mut builder =
                builder.with_api_key(api_key).with_base_url(base_url);
            if let Some(version) = env.get(AZURE_OPENAI_API_VERSION) {
                builder = builder.with_api_version(version);
            }
            builder.build()?
        }
    };

    debug!(
        backend = %handle.backend(),
        model = %handle.model().id,
        url = %handle.request_url(),
        "resolved model handle"
    );
    Ok(handle)
}

#[inline]
fn require<'a>(
    env: &'a Environment,
    name: &'static str,
) -> Result<&'a str, ResolveError> {
    env.get(name).ok_or(ResolveError::MissingVariable(name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Protocol;

    #[test]
    fn test_resolve_azure() {
        let env = Environment::from_pairs([
            ("AZURE_OPENAI_API_KEY", "k"),
            ("AZURE_OPENAI_BASE_URL", "https://res.openai.azure.com"),
        ]);
        let handle =
            resolve_model("azure-openai-responses", "gpt-4.1", &env).unwrap();
        assert_eq!(handle.backend().protocol(), Protocol::Responses);
        assert_eq!(handle.base_url(), "https://res.openai.azure.com/openai/v1");
        assert_eq!(handle.api_version(), None);
    }

    #[test]
    fn test_resolve_azure_from_resource_name() {
        let env = Environment::from_pairs([
            ("AZURE_OPENAI_API_KEY", "k"),
            ("AZURE_OPENAI_RESOURCE_NAME", "contoso"),
            ("AZURE_OPENAI_API_VERSION", "2025-04-01-preview"),
        ]);
        let handle =
            resolve_model("azure-openai-responses", "o4-mini", &env).unwrap();
        assert_eq!(
            handle.request_url(),
            "https://contoso.openai.azure.com/openai/v1/responses?api-version=2025-04-01-preview"
        );
    }

    #[test]
    fn test_resolve_openai() {
        let env = Environment::from_pairs([("OPENAI_API_KEY", "k")]);
        let handle = resolve_model("openai", "gpt-4o-mini", &env).unwrap();
        assert_eq!(handle.backend(), Backend::OpenAI);
        assert_eq!(handle.base_url(), "https://api.openai.com/v1");
    }

    #[test]
    fn test_missing_environment() {
        let env = Environment::default();
        assert_eq!(
            resolve_model("azure-openai-responses", "gpt-4.1", &env)
                .unwrap_err(),
            ResolveError::MissingVariable("AZURE_OPENAI_API_KEY")
        );

        let env = Environment::from_pairs([("AZURE_OPENAI_API_KEY", "k")]);
        let err =
            resolve_model("azure-openai-responses", "gpt-4.1", &env).unwrap_err();
        assert!(matches!(err, ResolveError::MissingOneOf(_)));
        assert_eq!(
            err.to_string(),
            "one of the environment variables AZURE_OPENAI_BASE_URL, \
             AZURE_OPENAI_RESOURCE_NAME must be set"
        );
    }

    #[test]
    fn test_unknown_names_fail_first() {
        let env = Environment::default();
        let err = resolve_model("azure-openai-responses", "gpt-9", &env)
            .unwrap_err();
        assert!(matches!(err, ResolveError::UnknownModel { .. }));

        let err = resolve_model("bedrock", "gpt-4.1", &env).unwrap_err();
        assert_eq!(
            err.to_string(),
            "unknown backend `bedrock` (expected one of: openai, azure-openai-responses)"
        );
    }
}
