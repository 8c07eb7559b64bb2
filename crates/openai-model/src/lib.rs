//! A model provider for OpenAI and Azure OpenAI.
//!
//! Models are addressed by a backend id and a model id, and resolved
//! against an [`Environment`] snapshot into a [`ModelHandle`]:
//!
//! ```no_run
//! use quill_openai_model::{Environment, OpenAIProvider, resolve_model};
//!
//! let env = Environment::capture();
//! let handle = resolve_model("azure-openai-responses", "gpt-4.1", &env)?;
//! let provider = OpenAIProvider::new(&handle);
//! # Ok::<(), quill_openai_model::ResolveError>(())
//! ```

#[macro_use]
extern crate tracing;

mod catalog;
mod env;
mod handle;
mod io;
mod protocol;
mod resolve;
mod response;

use std::error::Error as StdError;
use std::fmt::{self, Display};

use quill_model::{
    ErrorKind, ModelProvider, ModelProviderError, ModelRequest,
};
use mime::Mime;
use reqwest::{Client, Response, StatusCode, header};
use serde::Deserialize;

pub use catalog::{Backend, ModelSpec, Protocol};
pub use env::Environment;
pub use handle::{ModelHandle, ModelHandleBuilder};
use io::{Chunks, Sse};
use protocol::ApiError;
pub use resolve::{ResolveError, resolve_model};
pub use response::OpenAIResponse;

/// Error type for [`OpenAIProvider`].
#[derive(Debug)]
pub struct Error {
    message: String,
    kind: ErrorKind,
}

impl Error {
    pub(crate) fn new(message: impl Into<String>, kind: ErrorKind) -> Self {
        Self {
            message: message.into(),
            kind,
        }
    }

    /// Returns the error message.
    #[inline]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl StdError for Error {}

impl ModelProviderError for Error {
    #[inline]
    fn kind(&self) -> ErrorKind {
        self.kind
    }
}

/// Model provider for a resolved [`ModelHandle`].
#[derive(Clone, Debug)]
pub struct OpenAIProvider {
    client: Client,
    handle: ModelHandle,
}

impl OpenAIProvider {
    /// Creates a provider for the given model.
    #[inline]
    pub fn new(handle: &ModelHandle) -> Self {
        Self::with_client(Client::new(), handle)
    }

    /// Creates a provider that sends requests through `client`.
    #[inline]
    pub fn with_client(client: Client, handle: &ModelHandle) -> Self {
        Self {
            client,
            handle: handle.clone(),
        }
    }

    /// Returns the model this provider talks to.
    #[inline]
    pub fn handle(&self) -> &ModelHandle {
        &self.handle
    }

    fn reasoning_effort(&self, req: &ModelRequest) -> Option<&'static str> {
        let effort = req.thinking_level.effort()?;
        if !self.handle.model().reasoning {
            debug!(
                "model {} has no reasoning support, ignoring thinking level {}",
                self.handle.model().id,
                req.thinking_level
            );
            return None;
        }
        Some(effort)
    }
}

impl ModelProvider for OpenAIProvider {
    type Error = Error;
    type Response = OpenAIResponse;

    #[inline]
    fn model_id(&self) -> &str {
        &self.handle.model().id
    }

    fn send_request(
        &self,
        req: &ModelRequest,
    ) -> impl Future<Output = Result<Self::Response, Self::Error>> + Send + 'static
    {
        let backend = self.handle.backend();
        let api = backend.protocol();
        let model = &self.handle.model().id;
        let effort = self.reasoning_effort(req);

        let builder = self
            .client
            .post(self.handle.request_url())
            .header(header::CONTENT_TYPE, "application/json")
            .header(header::ACCEPT, "text/event-stream");
        let builder = match backend {
            Backend::OpenAI => builder.bearer_auth(self.handle.api_key()),
            Backend::AzureOpenAIResponses => {
                builder.header("api-key", self.handle.api_key())
            }
        };
        let builder = match api {
            Protocol::ChatCompletions => builder
                .json(&protocol::chat::create_request(req, model, effort)),
            Protocol::Responses => builder.json(
                &protocol::responses::create_request(req, model, effort),
            ),
        };
        debug!("sending request to {backend} for {model}");
        let resp_fut = builder.send();

        async move {
            let resp = resp_fut.await.map_err(|err| {
                Error::new(format!("request failed: {err}"), ErrorKind::Other)
            })?;
            if !resp.status().is_success() {
                return Err(error_from_response(resp).await);
            }

            let content_type = resp
                .headers()
                .get(header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok());
            let is_event_stream = content_type
                .and_then(|v| v.parse().ok())
                .map(|m: Mime| m.essence_str() == "text/event-stream")
                .unwrap_or(false);
            if !is_event_stream {
                return Err(Error::new(
                    format!("unexpected content type: {content_type:?}"),
                    ErrorKind::InvalidResponse,
                ));
            }

            let sse = Sse::new(Chunks::from_response(resp));
            Ok(OpenAIResponse::new(sse, api))
        }
    }
}

#[derive(Deserialize)]
struct ErrorBody {
    error: ApiError,
}

async fn error_from_response(resp: Response) -> Error {
    let status = resp.status();
    let body = resp.text().await.unwrap_or_default();
    let api_error = serde_json::from_str::<ErrorBody>(&body).ok().map(|b| b.error);
    warn!("server responded with {status}");
    error_from_status(status, api_error)
}

fn error_from_status(status: StatusCode, api_error: Option<ApiError>) -> Error {
    let kind = match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            ErrorKind::Authentication
        }
        StatusCode::TOO_MANY_REQUESTS => ErrorKind::RateLimitExceeded,
        _ => api_error
            .as_ref()
            .map(ApiError::kind)
            .unwrap_or(ErrorKind::Other),
    };
    let message = match api_error {
        Some(err) if !err.message.is_empty() => err.message,
        _ => format!("server responded with {status}"),
    };
    Error::new(message, kind)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn api_error(value: serde_json::Value) -> Option<ApiError> {
        serde_json::from_value::<ErrorBody>(value).ok().map(|b| b.error)
    }

    #[test]
    fn test_status_mapping() {
        let err = error_from_status(
            StatusCode::UNAUTHORIZED,
            api_error(json!({
                "error": { "code": "401", "message": "Access denied due to invalid subscription key." }
            })),
        );
        assert_eq!(err.kind(), ErrorKind::Authentication);
        assert_eq!(
            err.message(),
            "Access denied due to invalid subscription key."
        );

        let err = error_from_status(StatusCode::TOO_MANY_REQUESTS, None);
        assert_eq!(err.kind(), ErrorKind::RateLimitExceeded);
        assert_eq!(err.message(), "server responded with 429 Too Many Requests");

        let err = error_from_status(
            StatusCode::BAD_REQUEST,
            api_error(json!({
                "error": {
                    "code": "content_filter",
                    "message": "The response was filtered.",
                    "type": null
                }
            })),
        );
        assert_eq!(err.kind(), ErrorKind::Moderated);

        let err = error_from_status(StatusCode::INTERNAL_SERVER_ERROR, None);
        assert_eq!(err.kind(), ErrorKind::Other);
    }

    #[test]
    fn test_reasoning_effort_needs_reasoning_model() {
        let handle = |model: &str| {
            ModelHandleBuilder::new(Backend::OpenAI, model)
                .unwrap()
                .with_api_key("sk-test")
                .build()
                .unwrap()
        };
        let req = ModelRequest {
            thinking_level: quill_model::ThinkingLevel::High,
            ..Default::default()
        };
        let provider = OpenAIProvider::new(&handle("o3"));
        assert_eq!(provider.reasoning_effort(&req), Some("high"));
        assert_eq!(provider.model_id(), "o3");

        let provider = OpenAIProvider::new(&handle("gpt-4.1"));
        assert_eq!(provider.reasoning_effort(&req), None);
    }

    #[test]
    fn test_error_display() {
        let err = Error::new("slow down", ErrorKind::RateLimitExceeded);
        assert_eq!(err.to_string(), "rate limit exceeded: slow down");
    }
}
