//! Scripted [`Transport`] for tests.
//!
//! Responses are queued up front and replayed in order; every request is
//! recorded so tests can assert on call counts, URLs, and bodies. A request
//! arriving with an empty queue fails with a transport error naming it.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use gitshelf_core::error::{Result, StoreError};

use super::{HttpRequest, HttpResponse, Transport};

/// Replays queued responses and records requests.
#[derive(Default)]
pub struct ScriptedTransport {
    responses: Mutex<VecDeque<Result<HttpResponse>>>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a response with `status` and a raw text body.
    pub fn push(&self, status: u16, body: &str) -> &Self {
        self.push_response(HttpResponse::new(status, body))
    }

    /// Queue a response whose body is `value` serialized as JSON.
    pub fn push_json(&self, status: u16, value: serde_json::Value) -> &Self {
        self.push_response(HttpResponse::new(status, value.to_string()))
    }

    pub fn push_response(&self, response: HttpResponse) -> &Self {
        lock(&self.responses).push_back(Ok(response));
        self
    }

    /// Queue a failure as if the network call itself failed.
    pub fn push_error(&self, error: StoreError) -> &Self {
        lock(&self.responses).push_back(Err(error));
        self
    }

    /// Every request sent so far, oldest first.
    pub fn requests(&self) -> Vec<HttpRequest> {
        lock(&self.requests).clone()
    }

    pub fn calls(&self) -> usize {
        lock(&self.requests).len()
    }

    /// Responses still waiting to be consumed.
    pub fn remaining(&self) -> usize {
        lock(&self.responses).len()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse> {
        let label = format!("{} {}", request.method.as_str(), request.url);
        lock(&self.requests).push(request);
        lock(&self.responses).pop_front().unwrap_or_else(|| {
            Err(StoreError::transport(
                format!("no scripted response for {label}"),
                None,
            ))
        })
    }
}
