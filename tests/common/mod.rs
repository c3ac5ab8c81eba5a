#![allow(dead_code)]
//! Common test utilities.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;

use parley::limiter::{RateLimiter, RateLimiterConfig};
use parley::llm::{Completion, CompletionRequest, LLMError, ModelClient, Turn, Usage};
use parley::orchestrator::{Orchestrator, OrchestratorSettings};
use parley::retry::RetryPolicy;
use parley::server::{self, AppState};
use parley::session::SessionStore;

/// Scripted model client for tests.
///
/// Pops one result per call; when the script runs dry it echoes the last
/// user turn back as `echo: <content>`. Tracks call counts and the peak
/// number of concurrent in-flight calls.
pub struct StubClient {
    script: Mutex<VecDeque<Result<String, LLMError>>>,
    delay: Option<Duration>,
    calls: AtomicU32,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl StubClient {
    pub fn echoing() -> Arc<Self> {
        Self::build(Vec::new(), None)
    }

    pub fn replies(replies: &[&str]) -> Arc<Self> {
        Self::build(replies.iter().map(|r| Ok((*r).to_string())).collect(), None)
    }

    pub fn scripted(script: Vec<Result<String, LLMError>>) -> Arc<Self> {
        Self::build(script, None)
    }

    pub fn echoing_with_delay(delay: Duration) -> Arc<Self> {
        Self::build(Vec::new(), Some(delay))
    }

    fn build(script: Vec<Result<String, LLMError>>, delay: Option<Duration>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into_iter().collect()),
            delay,
            calls: AtomicU32::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// Every request this client has seen, in arrival order.
    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ModelClient for StubClient {
    async fn complete(&self, request: CompletionRequest) -> Result<Completion, LLMError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request.clone());

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let next = self.script.lock().unwrap().pop_front();
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let content = match next {
            Some(Ok(content)) => content,
            Some(Err(e)) => return Err(e),
            None => {
                let last_user = request
                    .turns
                    .iter()
                    .rev()
                    .find(|t| t.role == parley::llm::Role::User)
                    .map(|t| t.content.clone())
                    .unwrap_or_default();
                format!("echo: {last_user}")
            }
        };

        Ok(Completion {
            id: "stub".to_string(),
            turn: Turn::assistant(content),
            stop_reason: Some("end_turn".to_string()),
            usage: Some(Usage {
                prompt_tokens: 10,
                completion_tokens: 5,
                total_tokens: 15,
            }),
        })
    }
}

/// Orchestrator wired to the given client with test-friendly timings.
pub fn test_orchestrator(client: Arc<dyn ModelClient>) -> Orchestrator {
    test_orchestrator_with(client, RateLimiterConfig::default())
}

pub fn test_orchestrator_with(
    client: Arc<dyn ModelClient>,
    limiter_config: RateLimiterConfig,
) -> Orchestrator {
    Orchestrator::new(
        SessionStore::new(),
        client,
        RateLimiter::new(limiter_config),
        RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(100),
            attempt_timeout: Duration::from_secs(30),
        },
        OrchestratorSettings {
            deadline: Duration::from_secs(30),
            ..OrchestratorSettings::default()
        },
    )
}

/// Create a test app backed by the given client.
pub fn test_app(client: Arc<dyn ModelClient>) -> Router {
    let state = AppState {
        orchestrator: test_orchestrator(client),
    };
    server::build_app(state, 30)
}
