//! A local fake model for testing purpose.

mod preset;

use std::error::Error as StdError;
use std::fmt::{self, Display, Formatter};
use std::future::ready;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll, ready};
use std::time::Duration;

use quill_model::{
    ErrorKind, ModelFinishReason, ModelMessage, ModelProvider,
    ModelProviderError, ModelRequest, ModelResponse, ModelResponseEvent,
};
use tokio::time::{Sleep, sleep};

pub use preset::*;

#[derive(Debug)]
pub struct Error {
    message: String,
    kind: ErrorKind,
}

impl Error {
    fn new(message: impl Into<String>, kind: ErrorKind) -> Self {
        Self {
            message: message.into(),
            kind,
        }
    }
}

impl From<&PresetError> for Error {
    #[inline]
    fn from(preset: &PresetError) -> Self {
        Self::new(preset.message.clone(), preset.kind)
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
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

pub struct TestModelResponse {
    events: Vec<PresetEvent>,
    event_idx: usize,
    finished: bool,
    delay: Duration,
    sleep: Option<Pin<Box<Sleep>>>,
}

impl TestModelResponse {
    fn finish_reason(&self) -> ModelFinishReason {
        let has_tool_call = self
            .events
            .iter()
            .any(|event| matches!(event, PresetEvent::ToolCall(_)));
        if has_tool_call {
            ModelFinishReason::ToolCalls
        } else {
            ModelFinishReason::Stop
        }
    }
}

impl ModelResponse for TestModelResponse {
    type Error = crate::Error;

    fn poll_next_event(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Result<Option<ModelResponseEvent>, Self::Error>> {
        let this = self.get_mut();
        if this.finished {
            // In case this method is called after completion.
            return Poll::Ready(Ok(None));
        }

        let sleep = this
            .sleep
            .get_or_insert_with(|| Box::pin(sleep(this.delay)));
        ready!(sleep.as_mut().poll(cx));
        this.sleep = None;

        let Some(event) = this.events.get(this.event_idx) else {
            this.finished = true;
            return Poll::Ready(Ok(Some(ModelResponseEvent::Completed(
                this.finish_reason(),
            ))));
        };
        this.event_idx += 1;
        let event = match event {
            PresetEvent::MessageDelta(delta) => {
                ModelResponseEvent::MessageDelta(delta.clone())
            }
            PresetEvent::ReasoningDelta(delta) => {
                ModelResponseEvent::ReasoningDelta(delta.clone())
            }
            PresetEvent::ToolCall(req) => {
                ModelResponseEvent::ToolCall(req.clone())
            }
            PresetEvent::Error(err) => {
                this.finished = true;
                return Poll::Ready(Err(err.into()));
            }
        };
        Poll::Ready(Ok(Some(event)))
    }
}

#[derive(Clone, Debug)]
enum ConversationStep {
    UserInput,
    AssistantResponse(PresetResponse),
    ToolResult,
}

/// A local fake model for testing purpose.
///
/// Before sending requests, you need to setup the conversation script,
/// which is how the model should respond to a request. The step is
/// selected by the number of non-system messages in the request, so the
/// script mirrors the conversation history: a user input, an assistant
/// response, one tool result per tool call, and so on. If there are no
/// enough steps in the script, or the selected step is not an assistant
/// response, the request fails.
///
/// Every request is recorded and can be inspected with
/// [`TestModelProvider::requests`].
///
/// # Note
///
/// This type is not optimized for production use, there are heavy memory
/// copies involved. You should only use it for testing.
#[derive(Clone, Default)]
pub struct TestModelProvider {
    conversation_script: Vec<ConversationStep>,
    delay: Option<Duration>,
    requests: Arc<Mutex<Vec<ModelRequest>>>,
}

impl TestModelProvider {
    #[inline]
    pub fn add_assistant_response_step(&mut self, preset: PresetResponse) {
        self.conversation_script
            .push(ConversationStep::AssistantResponse(preset));
    }

    #[inline]
    pub fn add_user_input_step(&mut self) {
        self.conversation_script.push(ConversationStep::UserInput);
    }

    #[inline]
    pub fn add_tool_result_step(&mut self) {
        self.conversation_script.push(ConversationStep::ToolResult);
    }

    /// Sets the delay before every streamed event.
    #[inline]
    pub fn set_delay(&mut self, duration: Duration) {
        self.delay = Some(duration);
    }

    /// Returns the requests received so far, in order.
    pub fn requests(&self) -> Vec<ModelRequest> {
        match self.requests.lock() {
            Ok(requests) => requests.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn respond(&self, req: &ModelRequest) -> Result<TestModelResponse, Error> {
        let step_idx = req
            .messages
            .iter()
            .filter(|msg| !matches!(msg, ModelMessage::System(_)))
            .count();
        let Some(step) = self.conversation_script.get(step_idx) else {
            return Err(Error::new(
                format!("no enough steps for {step_idx} messages"),
                ErrorKind::Other,
            ));
        };
        let ConversationStep::AssistantResponse(preset) = step else {
            return Err(Error::new(
                format!("step {step_idx} is not an assistant response"),
                ErrorKind::Other,
            ));
        };
        if let Some(rejection) = &preset.rejection {
            return Err(rejection.into());
        }
        Ok(TestModelResponse {
            events: preset.events.clone(),
            event_idx: 0,
            finished: false,
            delay: self.delay.unwrap_or(Duration::from_millis(1)),
            sleep: None,
        })
    }
}

impl ModelProvider for TestModelProvider {
    type Error = crate::Error;
    type Response = TestModelResponse;

    #[inline]
    fn model_id(&self) -> &str {
        "test-model"
    }

    fn send_request(
        &self,
        req: &ModelRequest,
    ) -> impl Future<Output = Result<Self::Response, Self::Error>> + Send + 'static
    {
        match self.requests.lock() {
            Ok(mut requests) => requests.push(req.clone()),
            Err(poisoned) => poisoned.into_inner().push(req.clone()),
        }
        ready(self.respond(req))
    }
}

#[cfg(test)]
mod tests {
    use std::future::poll_fn;
    use std::pin::pin;

    use quill_model::{
        AssistantMessage, ModelTool, ThinkingLevel, ToolCallRequest,
        ToolCallResult,
    };
    use serde_json::json;

    use super::*;

    async fn collect_response(
        resp: TestModelResponse,
    ) -> Result<(AssistantMessage, ModelFinishReason), Error> {
        let mut resp = pin!(resp);
        let mut msg = AssistantMessage::default();
        loop {
            let event = poll_fn(|cx| resp.as_mut().poll_next_event(cx))
                .await?
                .unwrap();
            match event {
                ModelResponseEvent::Completed(reason) => {
                    return Ok((msg, reason));
                }
                ModelResponseEvent::MessageDelta(delta) => {
                    msg.text.push_str(&delta);
                }
                ModelResponseEvent::ReasoningDelta(_) => {}
                ModelResponseEvent::ToolCall(req) => msg.tool_calls.push(req),
            }
        }
    }

    #[tokio::test]
    async fn test_send_request() {
        let mut provider = TestModelProvider::default();
        provider.add_user_input_step();
        provider.add_assistant_response_step(PresetResponse::with_events([
            PresetEvent::MessageDelta("Hello, ".to_owned()),
            PresetEvent::MessageDelta("world!".to_owned()),
        ]));
        provider.add_user_input_step();
        provider.add_assistant_response_step(PresetResponse::with_events([
            PresetEvent::MessageDelta("Sure, ".to_owned()),
            PresetEvent::MessageDelta("let me take a ".to_owned()),
            PresetEvent::MessageDelta("look.".to_owned()),
            PresetEvent::ToolCall(ToolCallRequest {
                id: "tool:1".to_owned(),
                name: "read_file".to_owned(),
                arguments: json!({ "filename": "todo.txt" }),
            }),
        ]));
        provider.add_tool_result_step();
        provider
            .add_assistant_response_step(PresetResponse::with_text("Done."));

        let mut req = ModelRequest {
            messages: vec![
                ModelMessage::System("Be brief.".to_owned()),
                ModelMessage::User("Hi".to_owned()),
            ],
            tools: vec![ModelTool {
                name: "read_file".to_owned(),
                description: "Reads a file".to_owned(),
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "filename": {
                            "type": "string",
                            "description": "The name of the file to read"
                        }
                    }
                }),
            }],
            thinking_level: ThinkingLevel::Off,
        };
        let resp = provider.send_request(&req).await.unwrap();
        let (msg, reason) = collect_response(resp).await.unwrap();
        assert_eq!(msg.text, "Hello, world!");
        assert_eq!(reason, ModelFinishReason::Stop);

        req.messages.push(ModelMessage::Assistant(msg));
        req.messages
            .push(ModelMessage::User("Check my todo".to_owned()));
        let resp = provider.send_request(&req).await.unwrap();
        let (msg, reason) = collect_response(resp).await.unwrap();
        assert_eq!(msg.text, "Sure, let me take a look.");
        assert_eq!(reason, ModelFinishReason::ToolCalls);
        let tool_call = msg.tool_calls[0].clone();
        assert_eq!(tool_call.name, "read_file");
        assert_eq!(tool_call.arguments, json!({ "filename": "todo.txt" }));

        req.messages.push(ModelMessage::Assistant(msg));
        req.messages.push(ModelMessage::Tool(ToolCallResult {
            id: tool_call.id,
            content: "buy milk".to_owned(),
            is_error: false,
        }));
        let resp = provider.send_request(&req).await.unwrap();
        let (msg, _) = collect_response(resp).await.unwrap();
        assert_eq!(msg.text, "Done.");

        assert_eq!(provider.requests().len(), 3);
    }

    #[tokio::test]
    async fn test_scripted_failures() {
        let mut provider = TestModelProvider::default();
        provider.add_user_input_step();
        provider.add_assistant_response_step(PresetResponse::rejected(
            ErrorKind::Authentication,
            "bad key",
        ));
        let req = ModelRequest {
            messages: vec![ModelMessage::User("Hi".to_owned())],
            ..Default::default()
        };
        let Err(err) = provider.send_request(&req).await else {
            panic!("the request should be rejected");
        };
        assert_eq!(err.kind(), ErrorKind::Authentication);

        let mut provider = TestModelProvider::default();
        provider.add_user_input_step();
        provider.add_assistant_response_step(PresetResponse::with_events([
            PresetEvent::MessageDelta("partial".to_owned()),
            PresetEvent::Error(PresetError::new(
                ErrorKind::RateLimitExceeded,
                "slow down",
            )),
        ]));
        let resp = provider.send_request(&req).await.unwrap();
        let err = collect_response(resp).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::RateLimitExceeded);

        // Out of script.
        let req = ModelRequest {
            messages: vec![
                ModelMessage::User("Hi".to_owned()),
                ModelMessage::Assistant(AssistantMessage::text("Hello")),
                ModelMessage::User("Again".to_owned()),
            ],
            ..Default::default()
        };
        assert!(provider.send_request(&req).await.is_err());
    }
}
