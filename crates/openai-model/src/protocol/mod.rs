//! Wire protocols and their stream decoders.

pub mod chat;
pub mod responses;

use std::collections::VecDeque;

use quill_model::{ErrorKind, ModelResponseEvent};
use serde::Deserialize;
use serde_json::Value;

use crate::Error;
use crate::catalog::Protocol;
use crate::io::SseEvent;

/// Whether the decoder expects more events.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Done,
}

/// A stream decoder for one of the supported protocols.
pub enum Decoder {
    Chat(chat::ChatDecoder),
    Responses(responses::ResponsesDecoder),
}

impl Decoder {
    #[inline]
    pub fn for_protocol(protocol: Protocol) -> Self {
        match protocol {
            Protocol::ChatCompletions => Decoder::Chat(Default::default()),
            Protocol::Responses => Decoder::Responses(Default::default()),
        }
    }

    /// Decodes one server-sent event, appending model events to `out`.
    #[inline]
    pub fn decode(
        &mut self,
        event: &SseEvent,
        out: &mut VecDeque<ModelResponseEvent>,
    ) -> Result<Flow, Error> {
        match self {
            Decoder::Chat(decoder) => decoder.decode(event, out),
            Decoder::Responses(decoder) => decoder.decode(event, out),
        }
    }

    /// Called when the event stream ends without the decoder saying it's
    /// done.
    #[inline]
    pub fn finish(
        &mut self,
        out: &mut VecDeque<ModelResponseEvent>,
    ) -> Result<(), Error> {
        match self {
            Decoder::Chat(decoder) => decoder.finish(out),
            Decoder::Responses(decoder) => decoder.finish(out),
        }
    }
}

/// The error object both APIs use, in bodies and in stream events.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct ApiError {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub code: Option<Value>,
    #[serde(default, rename = "type")]
    pub ty: Option<String>,
}

impl ApiError {
    pub fn kind(&self) -> ErrorKind {
        let code = match &self.code {
            Some(Value::String(code)) => code.clone(),
            Some(code) => code.to_string(),
            None => self.ty.clone().unwrap_or_default(),
        };
        match code.as_str() {
            "content_filter" | "content_policy_violation" => {
                ErrorKind::Moderated
            }
            "rate_limit_exceeded" | "429" => ErrorKind::RateLimitExceeded,
            "invalid_api_key" | "401" | "authentication_error" => {
                ErrorKind::Authentication
            }
            _ => ErrorKind::Other,
        }
    }

    #[inline]
    pub fn into_error(self) -> Error {
        let kind = self.kind();
        let message = if self.message.is_empty() {
            "the server reported an error".to_owned()
        } else {
            self.message
        };
        Error::new(message, kind)
    }
}

/// Parses streamed tool call arguments.
///
/// Models sometimes send no arguments at all for parameterless tools,
/// which is treated as an empty object.
pub fn parse_arguments(arguments: &str) -> Result<Value, Error> {
    if arguments.trim().is_empty() {
        return Ok(Value::Object(Default::default()));
    }
    serde_json::from_str(arguments).map_err(|err| {
        Error::new(
            format!("malformed tool call arguments: {err}"),
            ErrorKind::InvalidResponse,
        )
    })
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_api_error_kinds() {
        let err: ApiError = serde_json::from_value(json!({
            "message": "Too many requests",
            "code": 429
        }))
        .unwrap();
        assert_eq!(err.kind(), ErrorKind::RateLimitExceeded);

        let err: ApiError = serde_json::from_value(json!({
            "message": "bad key",
            "type": "invalid_api_key"
        }))
        .unwrap();
        assert_eq!(err.kind(), ErrorKind::Authentication);

        let err = ApiError::default().into_error();
        assert_eq!(err.message(), "the server reported an error");
    }

    #[test]
    fn test_parse_arguments() {
        assert_eq!(parse_arguments("").unwrap(), json!({}));
        assert_eq!(parse_arguments("{\"a\":1}").unwrap(), json!({ "a": 1 }));
        assert!(parse_arguments("{\"a\":").is_err());
    }
}
