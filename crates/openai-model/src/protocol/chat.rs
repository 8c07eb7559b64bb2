//! The Chat Completions API.

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

// ------------------------------
// Types received from the server
// ------------------------------

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
struct FunctionDelta {
    name: Option<String>,
    arguments: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
struct ToolCallDelta {
    index: Option<u32>,
    id: Option<String>,
    function: Option<FunctionDelta>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
struct ChatCompletionChunk {
    #[serde(default)]
    id: String,
    #[serde(default)]
    choices: Vec<Choice>,
    error: Option<ApiError>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
struct Choice {
    #[serde(default)]
    delta: Delta,
    finish_reason: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
struct Delta {
    content: Option<String>,
    tool_calls: Option<Vec<ToolCallDelta>>,
    reasoning_content: Option<String>,
}

// ------------------------
// Types sent to the server
// ------------------------

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
struct FunctionTool {
    name: String,
    description: String,
    parameters: Value,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
struct Tool {
    r#type: &'static str,
    function: FunctionTool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
struct FunctionCall {
    name: String,
    arguments: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
struct ToolCall {
    id: String,
    r#type: &'static str,
    function: FunctionCall,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "role", rename_all = "lowercase")]
enum Message {
    System {
        content: String,
    },
    User {
        content: String,
    },
    Assistant {
        content: Option<String>,
        #[serde(skip_serializing_if = "Vec::is_empty")]
        tool_calls: Vec<ToolCall>,
    },
    Tool {
        tool_call_id: String,
        content: String,
    },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ChatCompletionRequest {
    model: String,
    messages: Vec<Message>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<Tool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reasoning_effort: Option<&'static str>,
    stream_options: StreamOptions,
    stream: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
struct StreamOptions {
    include_usage: bool,
}

// -----------
// Conversions
// -----------

pub fn create_request(
    req: &ModelRequest,
    model: &str,
    reasoning_effort: Option<&'static str>,
) -> ChatCompletionRequest {
    ChatCompletionRequest {
        model: model.to_owned(),
        messages: req.messages.iter().map(create_message).collect(),
        tools: req.tools.iter().map(create_tool).collect(),
        reasoning_effort,
        stream_options: StreamOptions {
            include_usage: true,
        },
        stream: true,
    }
}

fn create_message(msg: &ModelMessage) -> Message {
    match msg {
        ModelMessage::System(content) => Message::System {
            content: content.clone(),
        },
        ModelMessage::User(content) => Message::User {
            content: content.clone(),
        },
        ModelMessage::Assistant(msg) => Message::Assistant {
            content: if msg.text.is_empty() && !msg.tool_calls.is_empty() {
                None
            } else {
                Some(msg.text.clone())
            },
            tool_calls: msg
                .tool_calls
                .iter()
                .map(|call| ToolCall {
                    id: call.id.clone(),
                    r#type: "function",
                    function: FunctionCall {
                        name: call.name.clone(),
                        arguments: call.arguments.to_string(),
                    },
                })
                .collect(),
        },
        ModelMessage::Tool(result) => Message::Tool {
            tool_call_id: result.id.clone(),
            content: result.content.clone(),
        },
    }
}

fn create_tool(tool: &ModelTool) -> Tool {
    Tool {
        r#type: "function",
        function: FunctionTool {
            name: tool.name.clone(),
            description: tool.description.clone(),
            parameters: tool.parameters.clone(),
        },
    }
}

// --------
// Decoding
// --------

#[derive(Default)]
struct PartialToolCall {
    index: Option<u32>,
    id: String,
    name: String,
    arguments: String,
}

/// Turns `chat.completion.chunk` events into model events.
///
/// Text and reasoning deltas are forwarded as they arrive. Tool calls
/// stream their arguments in pieces, so they are held back until the
/// finish reason shows up and then emitted whole, before `Completed`.
#[derive(Default)]
pub struct ChatDecoder {
    id: Option<String>,
    tool_calls: Vec<PartialToolCall>,
    finished: bool,
}

impl ChatDecoder {
    pub fn decode(
        &mut self,
        event: &SseEvent,
        out: &mut VecDeque<ModelResponseEvent>,
    ) -> Result<Flow, Error> {
        if event.data == "[DONE]" {
            if !self.finished {
                self.finish_with(ModelFinishReason::Stop, out)?;
            }
            return Ok(Flow::Done);
        }

        let chunk = serde_json::from_str::<ChatCompletionChunk>(&event.data)
            .map_err(|err| {
                Error::new(
                    format!("malformed chunk: {err}"),
                    ErrorKind::InvalidResponse,
                )
            })?;
        if let Some(err) = chunk.error {
            return Err(err.into_error());
        }
        // Some servers send a first chunk without an id (e.g. Azure's
        // prompt filter results), so only compare non-empty ids.
        if !chunk.id.is_empty()
            && self.id.get_or_insert_with(|| chunk.id.clone()) != &chunk.id
        {
            return Err(Error::new(
                "chunk id mismatch",
                ErrorKind::InvalidResponse,
            ));
        }

        for choice in chunk.choices {
            if let Some(content) = choice.delta.reasoning_content {
                if !content.is_empty() {
                    out.push_back(ModelResponseEvent::ReasoningDelta(content));
                }
            }
            if let Some(content) = choice.delta.content {
                if !content.is_empty() {
                    out.push_back(ModelResponseEvent::MessageDelta(content));
                }
            }
            for tool_call in choice.delta.tool_calls.into_iter().flatten() {
                self.patch_tool_call(tool_call);
            }
            if let Some(reason) = choice.finish_reason {
                let reason = match reason.as_str() {
                    "tool_calls" | "function_call" => {
                        ModelFinishReason::ToolCalls
                    }
                    "length" => ModelFinishReason::Length,
                    "content_filter" => {
                        return Err(Error::new(
                            "the response was filtered",
                            ErrorKind::Moderated,
                        ));
                    }
                    _ => ModelFinishReason::Stop,
                };
                self.finish_with(reason, out)?;
            }
        }

        Ok(Flow::Continue)
    }

    pub fn finish(
        &mut self,
        _out: &mut VecDeque<ModelResponseEvent>,
    ) -> Result<(), Error> {
        if self.finished {
            return Ok(());
        }
        Err(Error::new(
            "stream ended before a finish reason",
            ErrorKind::Other,
        ))
    }

    fn patch_tool_call(&mut self, delta: ToolCallDelta) {
        let pos = match self
            .tool_calls
            .iter()
            .position(|t| t.index == delta.index)
        {
            Some(pos) => pos,
            None => {
                self.tool_calls.push(PartialToolCall {
                    index: delta.index,
                    ..Default::default()
                });
                self.tool_calls.len() - 1
            }
        };
        let partial = &mut self.tool_calls[pos];
        if let Some(id) = delta.id {
            partial.id.push_str(&id);
        }
        if let Some(function) = delta.function {
            if let Some(name) = function.name {
                partial.name.push_str(&name);
            }
            if let Some(arguments) = function.arguments {
                partial.arguments.push_str(&arguments);
            }
        }
    }

    fn finish_with(
        &mut self,
        reason: ModelFinishReason,
        out: &mut VecDeque<ModelResponseEvent>,
    ) -> Result<(), Error> {
        if self.finished {
            return Ok(());
        }
        self.finished = true;

        let has_tool_calls = !self.tool_calls.is_empty();
        for partial in self.tool_calls.drain(..) {
            out.push_back(ModelResponseEvent::ToolCall(ToolCallRequest {
                arguments: parse_arguments(&partial.arguments)?,
                id: partial.id,
                name: partial.name,
            }));
        }
        // Some servers report `stop` even though they asked for tools.
        let reason = if has_tool_calls && reason == ModelFinishReason::Stop {
            ModelFinishReason::ToolCalls
        } else {
            reason
        };
        out.push_back(ModelResponseEvent::Completed(reason));
        Ok(())
    }
}
