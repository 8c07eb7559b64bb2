use std::collections::VecDeque;
use std::pin::Pin;
use std::task::{Context, Poll, ready};

use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use quill_model::{ErrorKind, ModelResponse, ModelResponseEvent};
use pin_project_lite::pin_project;

use crate::Error;
use crate::catalog::Protocol;
use crate::io::Sse;
use crate::protocol::{Decoder, Flow};

struct PartialState {
    sse: Sse,
    decoder: Decoder,
    // Events decoded from the last server-sent event but not yet returned.
    // One SSE event can expand into several model events.
    pending: VecDeque<ModelResponseEvent>,
    done: bool,
}

type NextEvent = Result<(Option<ModelResponseEvent>, PartialState), Error>;

pin_project! {
    /// A streaming response from an OpenAI-compatible backend.
    pub struct OpenAIResponse {
        next_event_fut: Option<BoxFuture<'static, NextEvent>>,
    }
}

impl OpenAIResponse {
    #[inline]
    pub fn new(sse: Sse, protocol: Protocol) -> Self {
        let partial_state = PartialState {
            sse,
            decoder: Decoder::for_protocol(protocol),
            pending: VecDeque::new(),
            done: false,
        };
        Self {
            next_event_fut: Some(next_event(partial_state).boxed()),
        }
    }
}

impl ModelResponse for OpenAIResponse {
    type Error = Error;

    fn poll_next_event(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Result<Option<ModelResponseEvent>, Self::Error>> {
        let this = self.project();
        let Some(next_event_fut) = this.next_event_fut else {
            return Poll::Ready(Ok(None));
        };
        let (event, partial_state) = match ready!(next_event_fut.as_mut().poll(cx))
        {
            Ok((Some(event), partial_state)) => (event, partial_state),
            Ok((None, _)) => {
                *this.next_event_fut = None;
                return Poll::Ready(Ok(None));
            }
            Err(err) => {
                *this.next_event_fut = None;
                return Poll::Ready(Err(err));
            }
        };

        *this.next_event_fut = Some(next_event(partial_state).boxed());
        Poll::Ready(Ok(Some(event)))
    }
}

async fn next_event(mut partial_state: PartialState) -> NextEvent {
    loop {
        if let Some(event) = partial_state.pending.pop_front() {
            return Ok((Some(event), partial_state));
        }
        if partial_state.done {
            return Ok((None, partial_state));
        }

        let sse_event = partial_state.sse.next_event().await.map_err(|err| {
            Error::new(format!("{err}"), ErrorKind::Other)
        })?;
        let Some(sse_event) = sse_event else {
            // Either the decoder queues its last events or it reports
            // that the stream was cut short.
            partial_state.decoder.finish(&mut partial_state.pending)?;
            partial_state.done = true;
            continue;
        };
        trace!("got sse event: {:?}", sse_event.event);

        let flow = partial_state
            .decoder
            .decode(&sse_event, &mut partial_state.pending)?;
        if flow == Flow::Done {
            partial_state.done = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::future::poll_fn;
    use std::pin::pin;

    use bytes::Bytes;
    use quill_model::ModelFinishReason;

    use super::*;
    use crate::io::Chunks;

    #[tokio::test]
    async fn test_chat_fixture() {
        let chunks = Chunks::from_vec_deque(
            vec![Bytes::from_static(include_bytes!(
                "../fixtures/chat_tool_calls.txt"
            ))]
            .into(),
        );
        let sse = Sse::new(chunks);
        let mut resp =
            pin!(OpenAIResponse::new(sse, Protocol::ChatCompletions));
        let mut text = String::new();
        let mut tool_call_count = 0;
        let mut finish_reason = None;
        while let Some(event) =
            poll_fn(|cx| resp.as_mut().poll_next_event(cx)).await.unwrap()
        {
            assert!(finish_reason.is_none(), "event after completion");
            match event {
                ModelResponseEvent::MessageDelta(delta) => {
                    text.push_str(&delta)
                }
                ModelResponseEvent::ToolCall(call) => {
                    assert_eq!(call.name, "weather");
                    tool_call_count += 1;
                }
                ModelResponseEvent::Completed(reason) => {
                    finish_reason = Some(reason)
                }
                ModelResponseEvent::ReasoningDelta(_) => {}
            }
        }
        assert_eq!(text, "Let me check both cities.");
        assert_eq!(tool_call_count, 2);
        assert_eq!(finish_reason, Some(ModelFinishReason::ToolCalls));

        // Exhausted responses keep returning `None`.
        let event = poll_fn(|cx| resp.as_mut().poll_next_event(cx)).await;
        assert!(matches!(event, Ok(None)));
    }

    #[tokio::test]
    async fn test_error_ends_stream() {
        let chunks = Chunks::from_static(&[
            b"data: {\"id\":\"c1\",\"choices\":[{\"delta\":{\"content\":\"Hi\"}}]}\n\n",
            b"data: not json\n\n",
        ]);
        let mut resp = pin!(OpenAIResponse::new(
            Sse::new(chunks),
            Protocol::ChatCompletions
        ));
        let first = poll_fn(|cx| resp.as_mut().poll_next_event(cx)).await;
        assert_eq!(
            first.unwrap(),
            Some(ModelResponseEvent::MessageDelta("Hi".to_owned()))
        );
        let second = poll_fn(|cx| resp.as_mut().poll_next_event(cx)).await;
        assert!(second.is_err());
        let third = poll_fn(|cx| resp.as_mut().poll_next_event(cx)).await;
        assert!(matches!(third, Ok(None)));
    }
}
