//! Test doubles for the transport and token storage seams.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};
use tokio::sync::oneshot;

use super::storage::{MemoryStorage, TokenStorage};
use super::transport::{ApiRequest, Outcome, Transport};
use crate::error::{ClientError, ClientResult};

enum Scripted {
    Ready(ClientResult<Outcome>),
    Gated(oneshot::Receiver<()>, ClientResult<Outcome>),
}

/// Replays scripted outcomes in order and records every request.
#[derive(Default)]
pub(crate) struct StubTransport {
    script: Mutex<VecDeque<Scripted>>,
    requests: Mutex<Vec<ApiRequest>>,
}

impl StubTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, outcome: ClientResult<Outcome>) -> &Self {
        self.lock_script().push_back(Scripted::Ready(outcome));
        self
    }

    pub fn ok(&self, value: Value) -> &Self {
        self.push(Ok(Outcome::Payload(value)))
    }

    pub fn empty(&self) -> &Self {
        self.push(Ok(Outcome::Empty))
    }

    pub fn fail(&self, status: u16, message: Option<&str>) -> &Self {
        let reason = reqwest::StatusCode::from_u16(status)
            .ok()
            .and_then(|s| s.canonical_reason())
            .unwrap_or_default()
            .to_string();
        self.push(Ok(Outcome::Failure {
            status,
            reason,
            message: message.map(str::to_string),
        }))
    }

    /// The response is held back until the returned sender fires.
    pub fn gated(&self, outcome: ClientResult<Outcome>) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        self.lock_script().push_back(Scripted::Gated(rx, outcome));
        tx
    }

    pub fn requests(&self) -> Vec<ApiRequest> {
        self.requests.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn last_request(&self) -> Option<ApiRequest> {
        self.requests().pop()
    }

    fn lock_script(&self) -> std::sync::MutexGuard<'_, VecDeque<Scripted>> {
        self.script.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl Transport for StubTransport {
    async fn send(&self, request: ApiRequest) -> ClientResult<Outcome> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request);
        let next = self.lock_script().pop_front();
        match next {
            Some(Scripted::Ready(outcome)) => outcome,
            Some(Scripted::Gated(gate, outcome)) => {
                let _ = gate.await;
                outcome
            }
            None => Err(ClientError::Transport("no scripted response".into())),
        }
    }
}

/// Memory storage that logs each write so tests can assert on side effects.
#[derive(Default)]
pub(crate) struct RecordingStorage {
    inner: MemoryStorage,
    ops: Mutex<Vec<String>>,
}

impl RecordingStorage {
    pub fn with_token(token: &str) -> Self {
        Self {
            inner: MemoryStorage::with_token(token),
            ops: Mutex::new(Vec::new()),
        }
    }

    pub fn ops(&self) -> Vec<String> {
        self.ops.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn stored(&self) -> Option<String> {
        self.inner.peek()
    }

    fn record(&self, op: String) {
        self.ops.lock().unwrap_or_else(PoisonError::into_inner).push(op);
    }
}

#[async_trait]
impl TokenStorage for RecordingStorage {
    async fn load(&self) -> ClientResult<Option<String>> {
        self.inner.load().await
    }

    async fn save(&self, token: &str) -> ClientResult<()> {
        self.record(format!("save:{}", token));
        self.inner.save(token).await
    }

    async fn clear(&self) -> ClientResult<()> {
        self.record("clear".to_string());
        self.inner.clear().await
    }
}

/// Storage whose writes always fail, like a read-only disk.
#[derive(Default)]
pub(crate) struct FailingStorage;

#[async_trait]
impl TokenStorage for FailingStorage {
    async fn load(&self) -> ClientResult<Option<String>> {
        Ok(None)
    }

    async fn save(&self, _token: &str) -> ClientResult<()> {
        Err(ClientError::Storage("disk is read-only".into()))
    }

    async fn clear(&self) -> ClientResult<()> {
        Err(ClientError::Storage("disk is read-only".into()))
    }
}
