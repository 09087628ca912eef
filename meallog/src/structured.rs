//! Validated parsing of oracle output into typed records.
//!
//! Oracle text is untrusted. A record is accepted only after its JSON has
//! been located, checked against the schema derived from the target type and
//! deserialized. Nothing half-parsed leaves this module.

use lazy_static::lazy_static;
use regex::Regex;
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StructuredOutputError {
    #[error("no JSON object found in output")]
    NoJson,
    #[error("output is not valid JSON: {0}")]
    InvalidJson(String),
    #[error("output does not match schema: {0}")]
    SchemaViolation(String),
    #[error("schema could not be compiled: {0}")]
    Schema(String),
}

lazy_static! {
    static ref FENCED_BLOCK: Regex = Regex::new(r"```(?:json|JSON)?\s*([\s\S]*?)\s*```").unwrap();
}

/// Returns the first balanced `{...}` in `text`, looking inside a Markdown
/// code fence first.
pub fn extract_json_object(text: &str) -> Option<&str> {
    let body = FENCED_BLOCK
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
        .unwrap_or(text);
    balanced_object(body).or_else(|| balanced_object(text))
}

fn balanced_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (i, c) in text[start..].char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + i + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

/// JSON Schema for `T` as a plain value.
pub fn schema_value<T: JsonSchema>() -> Value {
    let root = schemars::schema_for!(T);
    serde_json::to_value(&root).unwrap_or(Value::Null)
}

/// Schema for an operation's parameters, without the draft and title noise
/// providers reject or ignore.
pub fn parameters_schema<T: JsonSchema>() -> Value {
    let mut schema = schema_value::<T>();
    if let Some(obj) = schema.as_object_mut() {
        obj.remove("$schema");
        obj.remove("title");
    }
    schema
}

/// Checks `instance` against `schema`.
pub fn validate_value(schema: &Value, instance: &Value) -> Result<(), StructuredOutputError> {
    let compiled = jsonschema::JSONSchema::compile(schema)
        .map_err(|e| StructuredOutputError::Schema(e.to_string()))?;
    let violations: Vec<String> = match compiled.validate(instance) {
        Ok(()) => return Ok(()),
        Err(errors) => errors
            .map(|e| {
                let path = e.instance_path.to_string();
                if path.is_empty() {
                    e.to_string()
                } else {
                    format!("{}: {}", path, e)
                }
            })
            .collect(),
    };
    Err(StructuredOutputError::SchemaViolation(violations.join("; ")))
}

/// Validates an already-parsed value against `T`'s schema and deserializes it.
pub fn from_value<T>(value: Value) -> Result<T, StructuredOutputError>
where
    T: DeserializeOwned + JsonSchema,
{
    validate_value(&schema_value::<T>(), &value)?;
    serde_json::from_value(value).map_err(|e| StructuredOutputError::SchemaViolation(e.to_string()))
}

/// Locates the JSON object in raw oracle text, without schema checks.
pub fn parse_value(raw: &str) -> Result<Value, StructuredOutputError> {
    let json = extract_json_object(raw).ok_or(StructuredOutputError::NoJson)?;
    serde_json::from_str(json).map_err(|e| StructuredOutputError::InvalidJson(e.to_string()))
}

/// Locates, validates and deserializes a `T` from raw oracle text.
pub fn parse_record<T>(raw: &str) -> Result<T, StructuredOutputError>
where
    T: DeserializeOwned + JsonSchema,
{
    from_value(parse_value(raw)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Deserialize, JsonSchema, PartialEq)]
    #[serde(rename_all = "camelCase")]
    struct Pick {
        target_id: String,
        score: u32,
    }

    #[test]
    fn parses_fenced_json_with_prose_around_it() {
        let raw = "Sure, here it is:\n```json\n{\"targetId\": \"abc\", \"score\": 3}\n```\nAnything else?";
        let pick: Pick = parse_record(raw).unwrap();
        assert_eq!(
            pick,
            Pick {
                target_id: "abc".into(),
                score: 3
            }
        );
    }

    #[test]
    fn braces_inside_strings_do_not_end_the_object() {
        let raw = r#"{"targetId": "a}b{", "score": 1} trailing"#;
        assert_eq!(extract_json_object(raw), Some(r#"{"targetId": "a}b{", "score": 1}"#));
    }

    #[test]
    fn missing_field_is_a_schema_violation() {
        let err = parse_record::<Pick>(r#"{"targetId": "abc"}"#).unwrap_err();
        assert!(matches!(err, StructuredOutputError::SchemaViolation(_)));
    }

    #[test]
    fn prose_only_output_has_no_json() {
        let err = parse_record::<Pick>("I think it was the breakfast one.").unwrap_err();
        assert!(matches!(err, StructuredOutputError::NoJson));
    }

    #[test]
    fn parameter_schema_drops_meta_keys() {
        let schema = parameters_schema::<Pick>();
        assert!(schema.get("$schema").is_none());
        assert!(schema.get("title").is_none());
        assert_eq!(schema["type"], "object");
        assert!(validate_value(&schema, &json!({"targetId": "x", "score": 2})).is_ok());
        assert!(validate_value(&schema, &json!({"targetId": 5, "score": 2})).is_err());
    }
}
