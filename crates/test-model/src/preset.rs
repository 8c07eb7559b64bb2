use quill_model::{ErrorKind, ToolCallRequest};
use serde::{Deserialize, Serialize};

/// A scripted failure.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresetError {
    /// The kind reported by the error.
    pub kind: ErrorKind,
    /// The error message.
    pub message: String,
}

impl PresetError {
    /// Creates a `PresetError`.
    #[inline]
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// The events in a preset response.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum PresetEvent {
    #[serde(rename = "message_delta")]
    MessageDelta(String),
    #[serde(rename = "reasoning_delta")]
    ReasoningDelta(String),
    #[serde(rename = "tool_call")]
    ToolCall(ToolCallRequest),
    /// Fails the response after the preceding events were delivered.
    #[serde(rename = "error")]
    Error(PresetError),
}

/// The preset response for an assistant step.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresetResponse {
    /// Events in this response.
    pub events: Vec<PresetEvent>,
    /// If set, the request itself fails and no events are streamed.
    #[serde(default)]
    pub rejection: Option<PresetError>,
}

impl PresetResponse {
    /// Creates a `PresetResponse` with the specified events.
    #[inline]
    pub fn with_events(events: impl Into<Vec<PresetEvent>>) -> Self {
        Self {
            events: events.into(),
            rejection: None,
        }
    }

    /// Creates a `PresetResponse` with a single message delta.
    #[inline]
    pub fn with_text(text: impl Into<String>) -> Self {
        Self::with_events([PresetEvent::MessageDelta(text.into())])
    }

    /// Creates a `PresetResponse` whose request is rejected.
    #[inline]
    pub fn rejected(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            events: vec![],
            rejection: Some(PresetError::new(kind, message)),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_serialize_deserialize() {
        let response = PresetResponse::with_events([
            PresetEvent::ReasoningDelta("The user wants a note.".to_string()),
            PresetEvent::MessageDelta(
                "I have left a message for you.".to_string(),
            ),
            PresetEvent::ToolCall(ToolCallRequest {
                id: "1".to_string(),
                name: "write_file".to_string(),
                arguments: json!({
                    "filename": "message.txt",
                    "content": "Hello, world!"
                }),
            }),
        ]);

        let serialized = serde_json::to_string(&response).unwrap();
        let deserialized: PresetResponse =
            serde_json::from_str(&serialized).unwrap();

        assert_eq!(response, deserialized);
    }

    #[test]
    fn test_rejection_defaults_to_none() {
        let response: PresetResponse = serde_json::from_value(json!({
            "events": [{ "type": "message_delta", "data": "4" }]
        }))
        .unwrap();
        assert_eq!(response, PresetResponse::with_text("4"));
    }
}
