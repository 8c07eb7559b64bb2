use std::io::{self, Write};
use std::sync::{Arc, Mutex};

use quill::core::PromptError;
use quill::model::ErrorKind;
use quill::{DEFAULT_PROMPT, DONE_TRAILER, build_agent, print_events};
use quill_test_model::{PresetEvent, PresetResponse, TestModelProvider};

#[derive(Clone, Default)]
struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl SharedBuffer {
    fn contents(&self) -> String {
        String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[tokio::test]
async fn test_answers_the_default_prompt() {
    let mut model_provider = TestModelProvider::default();
    model_provider.add_user_input_step();
    model_provider.add_assistant_response_step(PresetResponse::with_events([
        PresetEvent::MessageDelta("2 + 2 = ".to_owned()),
        PresetEvent::MessageDelta("4".to_owned()),
    ]));

    let agent = build_agent(model_provider.clone());
    let out = SharedBuffer::default();
    agent.subscribe(print_events(out.clone()));
    agent.prompt(DEFAULT_PROMPT).await.unwrap();

    let output = out.contents();
    assert_eq!(output, format!("2 + 2 = 4{DONE_TRAILER}"));
    assert_eq!(output.matches("--- done ---").count(), 1);

    let requests = model_provider.requests();
    assert_eq!(
        requests[0].system_prompt().as_deref(),
        Some(quill::SYSTEM_PROMPT)
    );
    assert_eq!(requests[0].thinking_level, quill::model::ThinkingLevel::Off);
    assert!(requests[0].tools.is_empty());
}

#[tokio::test]
async fn test_failed_turn_still_prints_trailer() {
    let mut model_provider = TestModelProvider::default();
    model_provider.add_user_input_step();
    model_provider.add_assistant_response_step(PresetResponse::rejected(
        ErrorKind::Authentication,
        "invalid api key",
    ));

    let agent = build_agent(model_provider);
    let out = SharedBuffer::default();
    agent.subscribe(print_events(out.clone()));
    let err = agent.prompt(DEFAULT_PROMPT).await.unwrap_err();

    assert!(matches!(
        err,
        PromptError::Backend {
            kind: ErrorKind::Authentication,
            ..
        }
    ));
    assert_eq!(out.contents(), DONE_TRAILER);
}
