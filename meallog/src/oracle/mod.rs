//! Oracle abstraction
//!
//! The oracle is the external text-generation service. Given instructions, a
//! transcript and an optional catalog of callable operations it returns text,
//! requested operation invocations, or both. Providers translate these
//! provider-neutral shapes to their wire formats.

pub mod anthropic;
pub mod openai;
pub mod scripted;

pub use anthropic::AnthropicOracle;
pub use openai::OpenAiOracle;
pub use scripted::ScriptedOracle;

use crate::config::{OracleConfig, OracleProvider};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum OracleError {
    #[error("oracle request failed: {0}")]
    Unavailable(String),
    #[error("oracle returned an unusable response: {0}")]
    InvalidResponse(String),
    #[error("oracle misconfigured: {0}")]
    Configuration(String),
}

/// A callable operation as advertised to the oracle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationSpec {
    pub name: String,
    pub description: String,
    /// JSON Schema of the arguments object.
    pub parameters: Value,
}

impl OperationSpec {
    pub fn to_openai_tool_json(&self) -> Value {
        json!({
            "type": "function",
            "function": {
                "name": self.name,
                "description": self.description,
                "parameters": self.parameters,
            }
        })
    }

    pub fn to_anthropic_tool_json(&self) -> Value {
        json!({
            "name": self.name,
            "description": self.description,
            "input_schema": self.parameters,
        })
    }
}

/// An invocation the oracle asked for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationCall {
    pub id: String,
    pub name: String,
    pub arguments: Value,
}

impl OperationCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: Value) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum OracleMessage {
    User {
        content: String,
    },
    Assistant {
        content: String,
        #[serde(default)]
        operation_calls: Vec<OperationCall>,
    },
    OperationResult {
        call_id: String,
        name: String,
        content: String,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OracleRequest {
    pub instructions: String,
    pub messages: Vec<OracleMessage>,
    /// Empty for single-shot calls that must not request operations.
    #[serde(default)]
    pub operations: Vec<OperationSpec>,
}

impl OracleRequest {
    /// A tool-less request with one user message.
    pub fn single_shot(instructions: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            instructions: instructions.into(),
            messages: vec![OracleMessage::User {
                content: content.into(),
            }],
            operations: Vec::new(),
        }
    }

    pub fn has_operations(&self) -> bool {
        !self.operations.is_empty()
    }

    /// Stable hash of the full prompt, for logs.
    pub fn prompt_hash(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.instructions.as_bytes());
        if let Ok(messages) = serde_json::to_vec(&self.messages) {
            hasher.update(&messages);
        }
        let hash = format!("{:x}", hasher.finalize());
        hash[..16].to_string()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OracleResponse {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub operation_calls: Vec<OperationCall>,
    /// Provider-parsed structured payload, when the provider produced one.
    #[serde(default)]
    pub structured: Option<Value>,
}

impl OracleResponse {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }

    pub fn calls(operation_calls: Vec<OperationCall>) -> Self {
        Self {
            operation_calls,
            ..Default::default()
        }
    }

    pub fn structured(value: Value) -> Self {
        Self {
            text: value.to_string(),
            structured: Some(value),
            ..Default::default()
        }
    }

    pub fn has_operation_calls(&self) -> bool {
        !self.operation_calls.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct OracleInfo {
    pub name: String,
    pub model: String,
}

#[async_trait]
pub trait Oracle: Send + Sync {
    async fn invoke(&self, request: &OracleRequest) -> Result<OracleResponse, OracleError>;

    fn info(&self) -> OracleInfo;
}

pub struct OracleFactory;

impl OracleFactory {
    pub fn create(config: &OracleConfig) -> Result<Arc<dyn Oracle>, OracleError> {
        match config.provider {
            OracleProvider::OpenAi => Ok(Arc::new(OpenAiOracle::new(config.clone())?)),
            OracleProvider::Anthropic => Ok(Arc::new(AnthropicOracle::new(config.clone())?)),
            OracleProvider::Stub => {
                let allow_stub = std::env::var("MEALLOG_ALLOW_STUB_ORACLE")
                    .map(|v| v == "1" || v == "true")
                    .unwrap_or(false)
                    || cfg!(test);
                if !allow_stub {
                    return Err(OracleError::Configuration(
                        "stub oracle is for testing only; set MEALLOG_ALLOW_STUB_ORACLE=1 or configure openai/anthropic".to_string(),
                    ));
                }
                tracing::warn!("Using scripted stub oracle; replies are canned");
                Ok(Arc::new(ScriptedOracle::echo()))
            }
        }
    }
}
