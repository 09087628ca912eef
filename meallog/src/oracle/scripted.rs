//! Deterministic oracle for tests and offline runs.
//!
//! Responses are served from a FIFO script and every request is recorded so
//! tests can assert on what the engine asked for (and how often).

use super::{Oracle, OracleError, OracleInfo, OracleMessage, OracleRequest, OracleResponse};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};

pub struct ScriptedOracle {
    script: Mutex<VecDeque<Result<OracleResponse, OracleError>>>,
    requests: Mutex<Vec<OracleRequest>>,
    /// When the script runs dry: echo the last user message instead of failing.
    echo_when_exhausted: bool,
}

fn guard<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl ScriptedOracle {
    pub fn new() -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
            echo_when_exhausted: false,
        }
    }

    pub fn echo() -> Self {
        Self {
            echo_when_exhausted: true,
            ..Self::new()
        }
    }

    pub fn with_responses<I>(responses: I) -> Self
    where
        I: IntoIterator<Item = OracleResponse>,
    {
        let oracle = Self::new();
        for response in responses {
            oracle.push(response);
        }
        oracle
    }

    pub fn push(&self, response: OracleResponse) -> &Self {
        guard(&self.script).push_back(Ok(response));
        self
    }

    pub fn push_error(&self, error: OracleError) -> &Self {
        guard(&self.script).push_back(Err(error));
        self
    }

    pub fn call_count(&self) -> usize {
        guard(&self.requests).len()
    }

    pub fn requests(&self) -> Vec<OracleRequest> {
        guard(&self.requests).clone()
    }

    pub fn remaining(&self) -> usize {
        guard(&self.script).len()
    }
}

impl Default for ScriptedOracle {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Oracle for ScriptedOracle {
    async fn invoke(&self, request: &OracleRequest) -> Result<OracleResponse, OracleError> {
        guard(&self.requests).push(request.clone());
        if let Some(next) = guard(&self.script).pop_front() {
            return next;
        }
        if self.echo_when_exhausted {
            let last_user = request
                .messages
                .iter()
                .rev()
                .find_map(|m| match m {
                    OracleMessage::User { content } => Some(content.as_str()),
                    _ => None,
                })
                .unwrap_or_default();
            return Ok(OracleResponse::text(format!("(stub) You said: {}", last_user)));
        }
        Err(OracleError::Unavailable("scripted oracle has no response left".to_string()))
    }

    fn info(&self) -> OracleInfo {
        OracleInfo {
            name: "scripted".to_string(),
            model: "scripted".to_string(),
        }
    }
}
