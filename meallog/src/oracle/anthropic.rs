//! Anthropic Messages API oracle.

use super::{
    Oracle, OracleError, OracleInfo, OracleMessage, OracleRequest, OracleResponse, OperationCall,
};
use crate::config::OracleConfig;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use std::time::{Duration, Instant};
use tracing::{debug, info};

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com/v1";
const API_VERSION: &str = "2023-06-01";
const DEFAULT_MAX_TOKENS: u32 = 1024;

pub struct AnthropicOracle {
    config: OracleConfig,
    client: Client,
}

impl AnthropicOracle {
    pub fn new(config: OracleConfig) -> Result<Self, OracleError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| {
                OracleError::Configuration(format!("failed to build HTTP client: {}", e))
            })?;
        Ok(Self { config, client })
    }

    fn build_body(&self, request: &OracleRequest) -> Value {
        let mut body = json!({
            "model": self.config.model,
            "max_tokens": self.config.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            "system": request.instructions,
            "messages": messages_to_anthropic_json(&request.messages),
        });
        if let Some(temperature) = self.config.temperature {
            body["temperature"] = json!(temperature);
        }
        if request.has_operations() {
            body["tools"] = Value::Array(
                request
                    .operations
                    .iter()
                    .map(|op| op.to_anthropic_tool_json())
                    .collect(),
            );
        }
        body
    }
}

/// Roles must alternate, so consecutive operation results are merged into a
/// single user message of `tool_result` blocks.
fn messages_to_anthropic_json(messages: &[OracleMessage]) -> Vec<Value> {
    let mut out: Vec<Value> = Vec::new();
    let mut pending_results: Vec<Value> = Vec::new();

    let flush = |out: &mut Vec<Value>, pending: &mut Vec<Value>| {
        if !pending.is_empty() {
            out.push(json!({ "role": "user", "content": std::mem::take(pending) }));
        }
    };

    for message in messages {
        match message {
            OracleMessage::OperationResult {
                call_id, content, ..
            } => pending_results.push(json!({
                "type": "tool_result",
                "tool_use_id": call_id,
                "content": content,
            })),
            OracleMessage::User { content } => {
                flush(&mut out, &mut pending_results);
                out.push(json!({ "role": "user", "content": content }));
            }
            OracleMessage::Assistant {
                content,
                operation_calls,
            } => {
                flush(&mut out, &mut pending_results);
                let mut blocks = Vec::new();
                if !content.trim().is_empty() {
                    blocks.push(json!({ "type": "text", "text": content }));
                }
                for call in operation_calls {
                    blocks.push(json!({
                        "type": "tool_use",
                        "id": call.id,
                        "name": call.name,
                        "input": call.arguments,
                    }));
                }
                // The API rejects an empty content array.
                if !blocks.is_empty() {
                    out.push(json!({ "role": "assistant", "content": blocks }));
                }
            }
        }
    }
    flush(&mut out, &mut pending_results);
    out
}

fn parse_anthropic_content(response_json: &Value) -> (String, Vec<OperationCall>) {
    let mut text = String::new();
    let mut calls = Vec::new();
    if let Some(blocks) = response_json["content"].as_array() {
        for (idx, block) in blocks.iter().enumerate() {
            match block["type"].as_str() {
                Some("text") => {
                    if let Some(t) = block["text"].as_str() {
                        if !text.is_empty() {
                            text.push('\n');
                        }
                        text.push_str(t);
                    }
                }
                Some("tool_use") => {
                    if let Some(name) = block["name"].as_str() {
                        calls.push(OperationCall {
                            id: block["id"]
                                .as_str()
                                .map(|s| s.to_string())
                                .unwrap_or_else(|| format!("call_{}", idx + 1)),
                            name: name.to_string(),
                            arguments: block["input"].clone(),
                        });
                    }
                }
                _ => {}
            }
        }
    }
    (text, calls)
}

#[async_trait]
impl Oracle for AnthropicOracle {
    async fn invoke(&self, request: &OracleRequest) -> Result<OracleResponse, OracleError> {
        let api_key = self.config.api_key.as_deref().ok_or_else(|| {
            OracleError::Configuration("API key required for Anthropic provider".to_string())
        })?;
        let base_url = self
            .config
            .base_url
            .as_deref()
            .map(|u| u.trim_end_matches('/'))
            .unwrap_or(DEFAULT_BASE_URL);
        let url = format!("{}/messages", base_url);

        let body = self.build_body(request);
        let started = Instant::now();
        debug!(
            "Sending to Anthropic - prompt hash {}, {} messages, {} tools",
            request.prompt_hash(),
            request.messages.len(),
            request.operations.len()
        );

        let response = self
            .client
            .post(&url)
            .header("x-api-key", api_key)
            .header("anthropic-version", API_VERSION)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| OracleError::Unavailable(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(OracleError::Unavailable(format!(
                "Anthropic API error {}: {}",
                status, error_text
            )));
        }

        let response_json: Value = response
            .json()
            .await
            .map_err(|e| OracleError::InvalidResponse(e.to_string()))?;
        if !response_json["content"].is_array() {
            return Err(OracleError::InvalidResponse(
                "response has no content blocks".to_string(),
            ));
        }

        let (text, operation_calls) = parse_anthropic_content(&response_json);
        info!(
            "Anthropic responded in {}ms: {} chars, {} operation calls",
            started.elapsed().as_millis(),
            text.len(),
            operation_calls.len()
        );

        Ok(OracleResponse {
            text,
            operation_calls,
            structured: None,
        })
    }

    fn info(&self) -> OracleInfo {
        OracleInfo {
            name: "anthropic".to_string(),
            model: self.config.model.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn silent_assistant_turns_are_skipped() {
        let messages = vec![
            OracleMessage::User {
                content: "I only had half".into(),
            },
            OracleMessage::Assistant {
                content: "  ".into(),
                operation_calls: Vec::new(),
            },
            OracleMessage::User {
                content: "yes".into(),
            },
        ];

        let json = messages_to_anthropic_json(&messages);
        assert_eq!(json.len(), 2);
        assert!(json.iter().all(|m| m["role"] == "user"));
    }

    #[test]
    fn consecutive_results_share_one_user_message() {
        let messages = vec![
            OracleMessage::User {
                content: "what did I eat?".into(),
            },
            OracleMessage::Assistant {
                content: String::new(),
                operation_calls: vec![
                    OperationCall::new("t1", "find_recent_entries", json!({})),
                    OperationCall::new("t2", "get_aggregate_summary", json!({})),
                ],
            },
            OracleMessage::OperationResult {
                call_id: "t1".into(),
                name: "find_recent_entries".into(),
                content: "[]".into(),
            },
            OracleMessage::OperationResult {
                call_id: "t2".into(),
                name: "get_aggregate_summary".into(),
                content: "{}".into(),
            },
        ];

        let json = messages_to_anthropic_json(&messages);
        assert_eq!(json.len(), 3);
        assert_eq!(json[1]["content"].as_array().unwrap().len(), 2);
        assert_eq!(json[2]["role"], "user");
        assert_eq!(json[2]["content"][1]["tool_use_id"], "t2");
    }

    #[test]
    fn parses_text_and_tool_use_blocks() {
        let payload = json!({
            "content": [
                { "type": "text", "text": "Let me look." },
                { "type": "tool_use", "id": "toolu_1", "name": "find_recent_entries", "input": { "limit": 2 } }
            ]
        });
        let (text, calls) = parse_anthropic_content(&payload);
        assert_eq!(text, "Let me look.");
        assert_eq!(calls[0].id, "toolu_1");
        assert_eq!(calls[0].arguments["limit"], 2);
    }
}
