//! Shared mocks and builders for engine tests
#![allow(dead_code)]

use async_trait::async_trait;
use mockall::mock;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use toolshell_engine::{
    Arguments, Completion, CompletionError, DriverSettings, Executor, RawResult, RemoteError,
    SequenceDriver, ToolEndpoint, ToolInfo, Translator,
};

mock! {
    pub Completion {}

    #[async_trait]
    impl Completion for Completion {
        async fn complete(&self, prompt: &str, system_instruction: &str) -> Result<String, CompletionError>;
    }
}

mock! {
    pub Endpoint {}

    #[async_trait]
    impl ToolEndpoint for Endpoint {
        async fn call(&self, tool_name: &str, arguments: &Arguments) -> Result<RawResult, RemoteError>;
        async fn list_tools(&self) -> Result<Vec<ToolInfo>, RemoteError>;
    }
}

/// Completion that never answers in time
pub struct SlowCompletion {
    pub delay: Duration,
}

#[async_trait]
impl Completion for SlowCompletion {
    async fn complete(&self, prompt: &str, _: &str) -> Result<String, CompletionError> {
        tokio::time::sleep(self.delay).await;
        Ok(prompt.to_string())
    }
}

/// Endpoint that sleeps before answering and counts calls
pub struct SlowEndpoint {
    pub delay: Duration,
    pub calls: AtomicUsize,
}

impl SlowEndpoint {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ToolEndpoint for SlowEndpoint {
    async fn call(&self, _: &str, _: &Arguments) -> Result<RawResult, RemoteError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        Ok(RawResult::text("late"))
    }

    async fn list_tools(&self) -> Result<Vec<ToolInfo>, RemoteError> {
        Ok(Vec::new())
    }
}

/// Completion that echoes its prompt and counts calls
#[derive(Default)]
pub struct EchoCompletion {
    pub calls: AtomicUsize,
}

impl EchoCompletion {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Completion for EchoCompletion {
    async fn complete(&self, prompt: &str, _: &str) -> Result<String, CompletionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(prompt.to_string())
    }
}

/// Endpoint that answers every call with its tool name
pub fn echo_endpoint() -> MockEndpoint {
    let mut endpoint = MockEndpoint::new();
    endpoint
        .expect_call()
        .returning(|name, _| Ok(RawResult::text(format!("ran {}", name))));
    endpoint
}

pub fn driver(
    completion: Option<Arc<dyn Completion>>,
    endpoint: Arc<dyn ToolEndpoint>,
    settings: DriverSettings,
) -> SequenceDriver {
    let translator = match completion {
        Some(backend) => Translator::new(backend, "translate"),
        None => Translator::passthrough(),
    };
    SequenceDriver::new(translator, Executor::new(endpoint), settings)
}
