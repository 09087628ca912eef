//! OpenAI-compatible oracle (works with OpenAI, OpenRouter and other
//! `/chat/completions` endpoints that support native tool calling).

use super::{
    Oracle, OracleError, OracleInfo, OracleMessage, OracleRequest, OracleResponse, OperationCall,
};
use crate::config::OracleConfig;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use std::time::{Duration, Instant};
use tracing::{debug, info};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

pub struct OpenAiOracle {
    config: OracleConfig,
    client: Client,
}

impl OpenAiOracle {
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
        let mut messages = vec![json!({
            "role": "system",
            "content": request.instructions,
        })];
        messages.extend(request.messages.iter().map(message_to_openai_json));

        let mut body = json!({
            "model": self.config.model,
            "messages": messages,
        });
        if let Some(max_tokens) = self.config.max_tokens {
            body["max_tokens"] = json!(max_tokens);
        }
        if let Some(temperature) = self.config.temperature {
            body["temperature"] = json!(temperature);
        }
        if request.has_operations() {
            body["tools"] = Value::Array(
                request
                    .operations
                    .iter()
                    .map(|op| op.to_openai_tool_json())
                    .collect(),
            );
        }
        body
    }
}

fn message_to_openai_json(message: &OracleMessage) -> Value {
    match message {
        OracleMessage::User { content } => json!({ "role": "user", "content": content }),
        OracleMessage::Assistant {
            content,
            operation_calls,
        } => {
            let mut msg = json!({ "role": "assistant", "content": content });
            if !operation_calls.is_empty() {
                msg["tool_calls"] = Value::Array(
                    operation_calls
                        .iter()
                        .map(|call| {
                            json!({
                                "id": call.id,
                                "type": "function",
                                "function": {
                                    "name": call.name,
                                    "arguments": call.arguments.to_string(),
                                }
                            })
                        })
                        .collect(),
                );
            }
            msg
        }
        OracleMessage::OperationResult {
            call_id, content, ..
        } => json!({
            "role": "tool",
            "tool_call_id": call_id,
            "content": content,
        }),
    }
}

pub fn extract_openai_assistant_content(response_json: &Value) -> String {
    response_json["choices"][0]["message"]["content"]
        .as_str()
        .unwrap_or_default()
        .to_string()
}

pub fn extract_openai_tool_calls(response_json: &Value) -> Vec<OperationCall> {
    let Some(tool_calls) = response_json["choices"][0]["message"]["tool_calls"].as_array() else {
        return Vec::new();
    };

    tool_calls
        .iter()
        .enumerate()
        .filter_map(|(idx, item)| {
            let name = item["function"]["name"].as_str()?.to_string();
            let id = item["id"]
                .as_str()
                .map(|s| s.to_string())
                .unwrap_or_else(|| format!("call_{}", idx + 1));

            let raw_args = item["function"]["arguments"].as_str().unwrap_or("{}");
            let arguments = match serde_json::from_str::<Value>(raw_args) {
                Ok(v) => v,
                Err(_) => json!({ "raw_arguments": raw_args }),
            };

            Some(OperationCall {
                id,
                name,
                arguments,
            })
        })
        .collect()
}

#[async_trait]
impl Oracle for OpenAiOracle {
    async fn invoke(&self, request: &OracleRequest) -> Result<OracleResponse, OracleError> {
        let api_key = self
            .config
            .api_key
            .as_deref()
            .ok_or_else(|| {
                OracleError::Configuration("API key required for OpenAI provider".to_string())
            })?;
        let base_url = self
            .config
            .base_url
            .as_deref()
            .map(|u| u.trim_end_matches('/'))
            .unwrap_or(DEFAULT_BASE_URL);
        let url = format!("{}/chat/completions", base_url);

        let body = self.build_body(request);
        let started = Instant::now();
        debug!(
            "Sending to OpenAI - prompt hash {}, {} messages, {} tools",
            request.prompt_hash(),
            request.messages.len(),
            request.operations.len()
        );

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| OracleError::Unavailable(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(OracleError::Unavailable(format!(
                "OpenAI API error {}: {}",
                status, error_text
            )));
        }

        let response_json: Value = response
            .json()
            .await
            .map_err(|e| OracleError::InvalidResponse(e.to_string()))?;
        if response_json["choices"].as_array().map_or(true, |c| c.is_empty()) {
            return Err(OracleError::InvalidResponse(
                "response has no choices".to_string(),
            ));
        }

        let text = extract_openai_assistant_content(&response_json);
        let operation_calls = extract_openai_tool_calls(&response_json);
        info!(
            "OpenAI responded in {}ms: {} chars, {} operation calls",
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
            name: "openai".to_string(),
            model: self.config.model.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::OperationSpec;

    #[test]
    fn converts_tool_calls_from_openai_shape() {
        let payload = json!({
            "choices": [{
                "message": {
                    "content": null,
                    "tool_calls": [{
                        "id": "call_1",
                        "function": {
                            "name": "find_recent_entries",
                            "arguments": "{\"limit\":3}"
                        }
                    }, {
                        "function": {
                            "name": "get_aggregate_summary",
                            "arguments": "not json"
                        }
                    }]
                }
            }]
        });

        let calls = extract_openai_tool_calls(&payload);
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].name, "find_recent_entries");
        assert_eq!(calls[0].arguments["limit"], 3);
        assert_eq!(calls[1].id, "call_2");
        assert_eq!(calls[1].arguments["raw_arguments"], "not json");
        assert_eq!(extract_openai_assistant_content(&payload), "");
    }

    #[test]
    fn request_body_carries_tools_and_tool_results() {
        let oracle = OpenAiOracle::new(OracleConfig::default()).unwrap();
        let request = OracleRequest {
            instructions: "be brief".into(),
            messages: vec![
                OracleMessage::User {
                    content: "that was lunch".into(),
                },
                OracleMessage::Assistant {
                    content: String::new(),
                    operation_calls: vec![OperationCall::new(
                        "call_1",
                        "find_recent_entries",
                        json!({}),
                    )],
                },
                OracleMessage::OperationResult {
                    call_id: "call_1".into(),
                    name: "find_recent_entries".into(),
                    content: "{\"success\":true}".into(),
                },
            ],
            operations: vec![OperationSpec {
                name: "find_recent_entries".into(),
                description: "List recent entries".into(),
                parameters: json!({"type": "object"}),
            }],
        };

        let body = oracle.build_body(&request);
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][2]["tool_calls"][0]["function"]["arguments"], "{}");
        assert_eq!(body["messages"][3]["role"], "tool");
        assert_eq!(body["tools"][0]["function"]["name"], "find_recent_entries");
    }
}
