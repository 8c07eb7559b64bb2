use std::fmt::{self, Debug};
use std::sync::Arc;

use reqwest::Url;

use crate::ResolveError;
use crate::catalog::{Backend, ModelSpec, Protocol};

/// A resolved reference to a model deployment.
///
/// A handle is immutable once created and cheap to clone. It carries
/// everything needed to reach the model, including the API key, which
/// is never printed by the `Debug` implementation.
#[derive(Clone, PartialEq, Eq)]
pub struct ModelHandle {
    inner: Arc<HandleInner>,
}

#[derive(PartialEq, Eq)]
struct HandleInner {
    backend: Backend,
    model: ModelSpec,
    base_url: String,
    api_key: String,
    api_version: Option<String>,
}

impl ModelHandle {
    /// Returns the backend of this handle.
    #[inline]
    pub fn backend(&self) -> Backend {
        self.inner.backend
    }

    /// Returns the model information.
    #[inline]
    pub fn model(&self) -> &ModelSpec {
        &self.inner.model
    }

    /// Returns the base URL, without a trailing slash.
    #[inline]
    pub fn base_url(&self) -> &str {
        &self.inner.base_url
    }

    /// Returns the API version sent with each request, if any.
    #[inline]
    pub fn api_version(&self) -> Option<&str> {
        self.inner.api_version.as_deref()
    }

    #[inline]
    pub(crate) fn api_key(&self) -> &str {
        &self.inner.api_key
    }

    /// Returns the full URL that requests are posted to.
    pub fn request_url(&self) -> String {
        match self.inner.backend.protocol() {
            Protocol::ChatCompletions => {
                format!("{}/chat/completions", self.inner.base_url)
            }
            Protocol::Responses => match &self.inner.api_version {
                Some(version) => format!(
                    "{}/responses?api-version={version}",
                    self.inner.base_url
                ),
                None => format!("{}/responses", self.inner.base_url),
            },
        }
    }
}

impl Debug for ModelHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelHandle")
            .field("backend", &self.inner.backend)
            .field("model", &self.inner.model.id)
            .field("base_url", &self.inner.base_url)
            .field("api_key", &"<redacted>")
            .field("api_version", &self.inner.api_version)
            .finish()
    }
}

/// Builder for [`ModelHandle`].
///
/// Most callers should use [`crate::resolve_model`], which reads the
/// settings from an [`crate::Environment`]. The builder is useful for
/// models or servers that are not in the catalog.
#[derive(Clone, PartialEq, Eq)]
pub struct ModelHandleBuilder {
    backend: Backend,
    model: ModelSpec,
    api_key: Option<String>,
    base_url: Option<String>,
    api_version: Option<String>,
}

impl ModelHandleBuilder {
    /// Creates a builder for a model from the catalog.
    pub fn new(backend: Backend, model: &str) -> Result<Self, ResolveError> {
        let Some(model) = backend.find_model(model) else {
            return Err(ResolveError::UnknownModel {
                backend: backend.id(),
                model: model.to_owned(),
            });
        };
        Ok(Self::with_model_spec(backend, model))
    }

    /// Creates a builder for an arbitrary model.
    #[inline]
    pub fn with_model_spec(backend: Backend, model: ModelSpec) -> Self {
        Self {
            backend,
            model,
            api_key: None,
            base_url: None,
            api_version: None,
        }
    }

    /// Sets the API key.
    #[inline]
    pub fn with_api_key<S: Into<String>>(mut self, api_key: S) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Sets a custom base URL.
    #[inline]
    pub fn with_base_url<S: Into<String>>(mut self, base_url: S) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Sets the API version query parameter.
    #[inline]
    pub fn with_api_version<S: Into<String>>(mut self, version: S) -> Self {
        self.api_version = Some(version.into());
        self
    }

    /// Builds the handle.
    ///
    /// The API key is required. Without a base URL, the public OpenAI
    /// endpoint is used for [`Backend::OpenAI`]; Azure has no default.
    pub fn build(self) -> Result<ModelHandle, ResolveError> {
        let Some(api_key) = self.api_key.filter(|key| !key.is_empty()) else {
            return Err(ResolveError::MissingApiKey {
                backend: self.backend.id(),
            });
        };
        let base_url = match (self.base_url, self.backend) {
            (Some(base_url), backend) => normalize_base_url(&base_url, backend)?,
            (None, Backend::OpenAI) => DEFAULT_OPENAI_BASE_URL.to_owned(),
            (None, Backend::AzureOpenAIResponses) => {
                return Err(ResolveError::MissingBaseUrl {
                    backend: self.backend.id(),
                });
            }
        };
        Ok(ModelHandle {
            inner: Arc::new(HandleInner {
                backend: self.backend,
                model: self.model,
                base_url,
                api_key,
                api_version: self.api_version,
            }),
        })
    }
}

impl Debug for ModelHandleBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelHandleBuilder")
            .field("backend", &self.backend)
            .field("model", &self.model.id)
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("api_version", &self.api_version)
            .finish()
    }
}

const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

const AZURE_HOST_SUFFIXES: [&str; 2] =
    [".openai.azure.com", ".cognitiveservices.azure.com"];

/// Returns the base URL of an Azure OpenAI resource.
pub(crate) fn azure_resource_url(resource: &str) -> String {
    format!("https://{resource}.openai.azure.com/openai/v1")
}

fn normalize_base_url(
    base_url: &str,
    backend: Backend,
) -> Result<String, ResolveError> {
    let url = Url::parse(base_url.trim()).map_err(|err| {
        ResolveError::InvalidBaseUrl {
            url: base_url.to_owned(),
            reason: err.to_string(),
        }
    })?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ResolveError::InvalidBaseUrl {
            url: base_url.to_owned(),
            reason: format!("unsupported scheme `{}`", url.scheme()),
        });
    }

    let mut normalized = url.as_str().trim_end_matches('/').to_owned();
    let is_bare_azure_host = url.path() == "/"
        && url.host_str().is_some_and(|host| {
            AZURE_HOST_SUFFIXES
                .iter()
                .any(|suffix| host.ends_with(suffix))
        });
    if backend == Backend::AzureOpenAIResponses && is_bare_azure_host {
        normalized.push_str("/openai/v1");
    }
    Ok(normalized)
}
