//! A simple program demonstrates how to use `quill` as a library.
//!
//! It sends one prompt to the configured model and streams the answer to
//! stdout. Logs and the progress spinner go to stderr.

#[macro_use]
extern crate tracing;

use std::process::ExitCode;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use owo_colors::OwoColorize;
use quill::openai::{Environment, OpenAIProvider};
use quill::{DemoSettings, build_agent, is_backend_activity, print_events};

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let env = Environment::capture();
    let settings = DemoSettings::from_env(&env);
    let handle = match settings.resolve(&env) {
        Ok(handle) => handle,
        Err(err) => {
            eprintln!("{} {err}", "error:".bright_red().bold());
            return ExitCode::FAILURE;
        }
    };
    info!(
        "using {} on {}",
        handle.model().id,
        handle.backend().id()
    );

    let agent = build_agent(OpenAIProvider::new(&handle));

    let spinner = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::with_template("{spinner} {wide_msg}") {
        spinner.set_style(style.tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏"));
    }
    spinner.set_message("🤔 Thinking...");
    spinner.enable_steady_tick(Duration::from_millis(100));

    // Registered first, so the spinner is gone before anything is printed.
    agent.subscribe({
        let spinner = spinner.clone();
        move |event| {
            if is_backend_activity(event) && !spinner.is_finished() {
                spinner.finish_and_clear();
            }
        }
    });
    agent.subscribe(print_events(std::io::stdout()));

    let result = agent.prompt(settings.prompt).await;
    spinner.finish_and_clear();
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{} {err}", "error:".bright_red().bold());
            ExitCode::FAILURE
        }
    }
}
