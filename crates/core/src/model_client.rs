use std::future::poll_fn;
use std::pin::{Pin, pin};
use std::sync::Arc;

use quill_model::{
    AssistantMessage, ModelFinishReason, ModelProvider, ModelProviderError,
    ModelRequest, ModelResponse, ModelResponseEvent,
};
use tracing::Instrument;

type SendRequestResult =
    Result<ModelClientResponse, Box<dyn ModelProviderError>>;
type BoxedSendRequestFuture =
    Pin<Box<dyn Future<Output = SendRequestResult> + Send>>;
type EventCallback = Box<dyn Fn(ModelResponseEvent) + Send + 'static>;
#[rustfmt::skip]
type HandlerFn = Arc<
    dyn Fn(ModelRequest, EventCallback) -> BoxedSendRequestFuture
        + Send + Sync
>;

/// A wrapper around a model provider that maintains an execution
/// environment for the provider and provides a type-erased interface
/// for the other modules.
#[derive(Clone)]
pub struct ModelClient {
    handler_fn: HandlerFn,
    model_id: Arc<str>,
}

impl ModelClient {
    #[inline]
    pub fn new<P: ModelProvider + 'static>(provider: P) -> Self {
        let model_id = Arc::from(provider.model_id());
        // We have to erase the type `P`, since `ModelClient` doesn't have a
        // generic parameter and we don't want it either.
        let handler_fn: HandlerFn = Arc::new(move |req, on_event| {
            let fut = provider.send_request(&req);
            Box::pin(
                async move {
                    trace!("got a request: {:?}", req);
                    let resp_or_err = fut.await;
                    handle_response::<P>(resp_or_err, on_event).await
                }
                .instrument(trace_span!("model client req")),
            )
        });
        Self {
            handler_fn,
            model_id,
        }
    }

    #[inline]
    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    /// Sends a request and returns the complete response.
    ///
    /// Every event is passed to `on_event` as soon as it's received, the
    /// returned response holds the accumulated message.
    ///
    /// # Cancel safety
    ///
    /// This method is cancel safe. The response stops streaming further
    /// events when this operation is cancelled.
    #[inline]
    pub fn send_request(
        &self,
        req: ModelRequest,
        on_event: impl Fn(ModelResponseEvent) + Send + 'static,
    ) -> BoxedSendRequestFuture {
        (self.handler_fn)(req, Box::new(on_event))
    }
}

/// A completely received response from the model client.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ModelClientResponse {
    pub message: AssistantMessage,
    /// The reason the model finished generating.
    pub finish_reason: ModelFinishReason,
}

async fn handle_response<P: ModelProvider + 'static>(
    resp_or_err: Result<P::Response, P::Error>,
    on_event: EventCallback,
) -> SendRequestResult {
    let resp = match resp_or_err {
        Ok(resp) => resp,
        Err(err) => {
            error!("got an error: {err:?}");
            return Err(Box::new(err));
        }
    };

    let mut message = AssistantMessage::default();
    let mut finish_reason = None;

    trace!("start receiving events");

    let mut pinned_resp = pin!(resp);
    loop {
        let event_or_err =
            poll_fn(|cx| pinned_resp.as_mut().poll_next_event(cx)).await;
        let event = match event_or_err {
            Ok(Some(event)) => event,
            Ok(None) => break,
            Err(err) => {
                error!("got an error: {err:?}");
                return Err(Box::new(err));
            }
        };
        trace!("got an event: {event:?}");

        match &event {
            ModelResponseEvent::MessageDelta(delta) => {
                message.text.push_str(delta);
            }
            ModelResponseEvent::ReasoningDelta(_) => {}
            ModelResponseEvent::ToolCall(req) => {
                message.tool_calls.push(req.clone());
            }
            ModelResponseEvent::Completed(reason) => {
                finish_reason = Some(*reason);
            }
        }
        on_event(event);
    }

    trace!("finished a request");

    let finish_reason = finish_reason.unwrap_or_else(|| {
        warn!("response ended without a finish reason");
        if message.tool_calls.is_empty() {
            ModelFinishReason::Stop
        } else {
            ModelFinishReason::ToolCalls
        }
    });
    Ok(ModelClientResponse {
        message,
        finish_reason,
    })
}
