//! The Responses API.

use std::collections::VecDeque;

use quill_model::{
    ErrorKind, ModelFinishReason, ModelMessage, ModelRequest,
    ModelResponseEvent, ModelTool, ToolCallRequest,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{ApiError, Flow, parse_arguments};
use crate::Error;
use crate::io::SseEvent;

// ------------------------
// Types sent to the server
// ------------------------

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart {
    InputText { text: String },
    OutputText { text: String },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum InputItem {
    Message {
        role: &'static str,
        content: Vec<ContentPart>,
    },
    FunctionCall {
        call_id: String,
        name: String,
        arguments: String,
    },
    FunctionCallOutput {
        call_id: String,
        output: String,
    },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
struct FunctionTool {
    r#type: &'static str,
    name: String,
    description: String,
    parameters: Value,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
struct Reasoning {
    effort: &'static str,
    summary: &'static str,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ResponsesRequest {
    model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    instructions: Option<String>,
    input: Vec<InputItem>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<FunctionTool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reasoning: Option<Reasoning>,
    store: bool,
    stream: bool,
}

pub fn create_request(
    req: &ModelRequest,
    model: &str,
    reasoning_effort: Option<&'static str>,
) -> ResponsesRequest {
    let mut input = Vec::with_capacity(req.messages.len());
    for msg in &req.messages {
        match msg {
            // Sent as `instructions` instead.
            ModelMessage::System(_) => {}
            ModelMessage::User(text) => input.push(InputItem::Message {
                role: "user",
                content: vec![ContentPart::InputText { text: text.clone() }],
            }),
            ModelMessage::Assistant(msg) => {
                if !msg.text.is_empty() {
                    input.push(InputItem::Message {
                        role: "assistant",
                        content: vec![ContentPart::OutputText {
                            text: msg.text.clone(),
                        }],
                    });
                }
                input.extend(msg.tool_calls.iter().map(|call| {
                    InputItem::FunctionCall {
                        call_id: call.id.clone(),
                        name: call.name.clone(),
                        arguments: call.arguments.to_string(),
                    }
                }));
            }
            ModelMessage::Tool(result) => {
                input.push(InputItem::FunctionCallOutput {
                    call_id: result.id.clone(),
                    output: result.content.clone(),
                })
            }
        }
    }

    ResponsesRequest {
        model: model.to_owned(),
        instructions: req.system_prompt(),
        input,
        tools: req.tools.iter().map(create_tool).collect(),
        reasoning: reasoning_effort.map(|effort| Reasoning {
            effort,
            summary: "auto",
        }),
        store: false,
        stream: true,
    }
}

fn create_tool(tool: &ModelTool) -> FunctionTool {
    FunctionTool {
        r#type: "function",
        name: tool.name.clone(),
        description: tool.description.clone(),
        parameters: tool.parameters.clone(),
    }
}

// ------------------------------
// Types received from the server
// ------------------------------

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(tag = "type")]
enum StreamEvent {
    #[serde(rename = "response.output_text.delta")]
    OutputTextDelta { delta: String },
    #[serde(rename = "response.reasoning_summary_text.delta")]
    ReasoningSummaryDelta { delta: String },
    #[serde(rename = "response.output_item.added")]
    OutputItemAdded { item: OutputItem },
    #[serde(rename = "response.function_call_arguments.delta")]
    FunctionCallArgumentsDelta { item_id: String, delta: String },
    #[serde(rename = "response.output_item.done")]
    OutputItemDone { item: OutputItem },
    #[serde(rename = "response.completed")]
    Completed,
    #[serde(rename = "response.incomplete")]
    Incomplete { response: ResponseBody },
    #[serde(rename = "response.failed")]
    Failed { response: ResponseBody },
    #[serde(rename = "error")]
    Error(ApiError),
    #[serde(other)]
    Other,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(tag = "type")]
enum OutputItem {
    #[serde(rename = "function_call")]
    FunctionCall {
        #[serde(default)]
        id: String,
        call_id: String,
        name: String,
        #[serde(default)]
        arguments: String,
    },
    #[serde(other)]
    Other,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
struct ResponseBody {
    error: Option<ApiError>,
    incomplete_details: Option<IncompleteDetails>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
struct IncompleteDetails {
    reason: Option<String>,
}

// --------
// Decoding
// --------

struct PartialFunctionCall {
    item_id: String,
    call_id: String,
    name: String,
    arguments: String,
}

/// Turns Responses API stream events into model events.
///
/// Function calls are emitted when their output item is done, which is
/// when the arguments are guaranteed to be complete.
#[derive(Default)]
pub struct ResponsesDecoder {
    function_calls: Vec<PartialFunctionCall>,
    emitted_tool_calls: usize,
}

impl ResponsesDecoder {
    pub fn decode(
        &mut self,
        event: &SseEvent,
        out: &mut VecDeque<ModelResponseEvent>,
    ) -> Result<Flow, Error> {
        let event = serde_json::from_str::<StreamEvent>(&event.data)
            .map_err(|err| {
                Error::new(
                    format!("malformed stream event: {err}"),
                    ErrorKind::InvalidResponse,
                )
            })?;

        match event {
            StreamEvent::OutputTextDelta { delta } => {
                if !delta.is_empty() {
                    out.push_back(ModelResponseEvent::MessageDelta(delta));
                }
            }
            StreamEvent::ReasoningSummaryDelta { delta } => {
                if !delta.is_empty() {
                    out.push_back(ModelResponseEvent::ReasoningDelta(delta));
                }
            }
            StreamEvent::OutputItemAdded {
                item:
                    OutputItem::FunctionCall {
                        id,
                        call_id,
                        name,
                        arguments,
                    },
            } => {
                self.function_calls.push(PartialFunctionCall {
                    item_id: id,
                    call_id,
                    name,
                    arguments,
                });
            }
            StreamEvent::FunctionCallArgumentsDelta { item_id, delta } => {
                match self
                    .function_calls
                    .iter_mut()
                    .find(|call| call.item_id == item_id)
                {
                    Some(call) => call.arguments.push_str(&delta),
                    None => warn!("arguments for unknown item: {item_id}"),
                }
            }
            StreamEvent::OutputItemDone {
                item:
                    OutputItem::FunctionCall {
                        id,
                        call_id,
                        name,
                        arguments,
                    },
            } => {
                // The final item carries the full arguments; fall back to
                // what was accumulated if the server left them out.
                let accumulated = self
                    .function_calls
                    .iter()
                    .position(|call| call.item_id == id)
                    .map(|pos| self.function_calls.remove(pos));
                let arguments = match accumulated {
                    Some(call) if arguments.is_empty() => call.arguments,
                    _ => arguments,
                };
                out.push_back(ModelResponseEvent::ToolCall(ToolCallRequest {
                    id: call_id,
                    name,
                    arguments: parse_arguments(&arguments)?,
                }));
                self.emitted_tool_calls += 1;
            }
            StreamEvent::Completed => {
                let reason = if self.emitted_tool_calls > 0 {
                    ModelFinishReason::ToolCalls
                } else {
                    ModelFinishReason::Stop
                };
                out.push_back(ModelResponseEvent::Completed(reason));
                return Ok(Flow::Done);
            }
            StreamEvent::Incomplete { response } => {
                let reason = response
                    .incomplete_details
                    .and_then(|details| details.reason)
                    .unwrap_or_default();
                if reason == "content_filter" {
                    return Err(Error::new(
                        "the response was filtered",
                        ErrorKind::Moderated,
                    ));
                }
                out.push_back(ModelResponseEvent::Completed(
                    ModelFinishReason::Length,
                ));
                return Ok(Flow::Done);
            }
            StreamEvent::Failed { response } => {
                return Err(response.error.unwrap_or_default().into_error());
            }
            StreamEvent::Error(err) => return Err(err.into_error()),
            StreamEvent::OutputItemAdded { .. }
            | StreamEvent::OutputItemDone { .. }
            | StreamEvent::Other => {}
        }
        Ok(Flow::Continue)
    }

    pub fn finish(
        &mut self,
        _out: &mut VecDeque<ModelResponseEvent>,
    ) -> Result<(), Error> {
        Err(Error::new(
            "stream ended before the response completed",
            ErrorKind::Other,
        ))
    }
}

#[cfg(test)]
mod tests {
    use std::pin::pin;

    use bytes::Bytes;
    use quill_model::{
        AssistantMessage, ModelProviderError, ModelResponse, ThinkingLevel,
        ToolCallResult,
    };
    use serde_json::json;

    use super::*;
    use crate::catalog::Protocol;
    use crate::io::{Chunks, Sse};
    use crate::response::OpenAIResponse;

    async fn decode_fixture(
        fixture: &'static [u8],
    ) -> Result<Vec<ModelResponseEvent>, Error> {
        let chunks = Chunks::from_vec_deque(
            // Split the fixture at an awkward place to exercise buffering.
            vec![
                Bytes::from_static(&fixture[..fixture.len() / 3]),
                Bytes::from_static(&fixture[fixture.len() / 3..]),
            ]
            .into(),
        );
        let mut resp = pin!(OpenAIResponse::new(
            Sse::new(chunks),
            Protocol::Responses
        ));
        let mut events = vec![];
        while let Some(event) =
            std::future::poll_fn(|cx| resp.as_mut().poll_next_event(cx))
                .await?
        {
            events.push(event);
        }
        Ok(events)
    }

    #[test]
    fn test_create_request() {
        let request = ModelRequest {
            messages: vec![
                ModelMessage::System("Keep responses concise.".to_owned()),
                ModelMessage::User("Weather?".to_owned()),
                ModelMessage::Assistant(AssistantMessage {
                    text: "Checking.".to_owned(),
                    tool_calls: vec![ToolCallRequest {
                        id: "call_1".to_owned(),
                        name: "weather".to_owned(),
                        arguments: json!({ "city": "Oslo" }),
                    }],
                }),
                ModelMessage::Tool(ToolCallResult {
                    id: "call_1".to_owned(),
                    content: "rain".to_owned(),
                    is_error: false,
                }),
            ],
            tools: vec![ModelTool {
                name: "weather".to_owned(),
                description: "Looks up the weather.".to_owned(),
                parameters: json!({ "type": "object" }),
            }],
            thinking_level: ThinkingLevel::Off,
        };
        let body = serde_json::to_value(create_request(&request, "gpt-4.1", None))
            .unwrap();
        assert_eq!(
            body,
            json!({
                "model": "gpt-4.1",
                "instructions": "Keep responses concise.",
                "input": [
                    {
                        "type": "message",
                        "role": "user",
                        "content": [{ "type": "input_text", "text": "Weather?" }]
                    },
                    {
                        "type": "message",
                        "role": "assistant",
                        "content": [{ "type": "output_text", "text": "Checking." }]
                    },
                    {
                        "type": "function_call",
                        "call_id": "call_1",
                        "name": "weather",
                        "arguments": "{\"city\":\"Oslo\"}"
                    },
                    { "type": "function_call_output", "call_id": "call_1", "output": "rain" }
                ],
                "tools": [{
                    "type": "function",
                    "name": "weather",
                    "description": "Looks up the weather.",
                    "parameters": { "type": "object" }
                }],
                "store": false,
                "stream": true
            })
        );

        let body =
            serde_json::to_value(create_request(&request, "o3", Some("low")))
                .unwrap();
        assert_eq!(body["reasoning"], json!({ "effort": "low", "summary": "auto" }));
    }

    #[tokio::test]
    async fn test_text_fixture() {
        let events =
            decode_fixture(include_bytes!("../../fixtures/responses_text.txt"))
                .await
                .unwrap();
        let text: String = events
            .iter()
            .filter_map(|event| match event {
                ModelResponseEvent::MessageDelta(delta) => Some(delta.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(text, "2 + 2 = 4.");
        assert_eq!(
            events.last(),
            Some(&ModelResponseEvent::Completed(ModelFinishReason::Stop))
        );
    }

    #[tokio::test]
    async fn test_tool_call_fixture() {
        let events = decode_fixture(include_bytes!(
            "../../fixtures/responses_tool_call.txt"
        ))
        .await
        .unwrap();
        assert_eq!(
            events,
            vec![
                ModelResponseEvent::ReasoningDelta("Look it up.".to_owned()),
                ModelResponseEvent::ToolCall(ToolCallRequest {
                    id: "call_abc".to_owned(),
                    name: "weather".to_owned(),
                    arguments: json!({ "city": "Oslo" }),
                }),
                ModelResponseEvent::Completed(ModelFinishReason::ToolCalls),
            ]
        );
    }

    #[tokio::test]
    async fn test_failed_fixture() {
        let err = decode_fixture(include_bytes!(
            "../../fixtures/responses_failed.txt"
        ))
        .await
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::RateLimitExceeded);
        assert_eq!(err.message(), "Rate limit reached for gpt-4.1.");
    }

    #[tokio::test]
    async fn test_truncated_stream() {
        let err = decode_fixture(
            b"event: response.output_text.delta\n\
              data: {\"type\":\"response.output_text.delta\",\"delta\":\"Hi\"}\n\n",
        )
        .await
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Other);
    }
}
