use serde_json::{Map, Value};

use crate::error::AppError;

/// Body of `POST /generate`. Only a JSON object is accepted; the
/// extractor rejects arrays, scalars and `null` before this runs.
#[derive(Debug, Default)]
pub struct GenerateRequest {
    pub prompt: Option<String>,
}

impl GenerateRequest {
    /// The prompt, if one was supplied and is non-empty.
    pub fn prompt(&self) -> Option<&str> {
        self.prompt.as_deref().filter(|p| !p.is_empty())
    }
}

impl TryFrom<Map<String, Value>> for GenerateRequest {
    type Error = AppError;

    fn try_from(mut body: Map<String, Value>) -> Result<Self, Self::Error> {
        let prompt = match body.remove("prompt") {
            None | Some(Value::Null) => None,
            Some(Value::String(text)) => Some(text),
            Some(other) => {
                return Err(AppError::MalformedRequest(format!(
                    "prompt must be a string, got {}",
                    json_kind(&other)
                )))
            }
        };
        Ok(Self { prompt })
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(raw: &str) -> Result<GenerateRequest, AppError> {
        let body: Map<String, Value> = serde_json::from_str(raw).unwrap();
        GenerateRequest::try_from(body)
    }

    #[test]
    fn missing_null_and_empty_prompts_are_absent() {
        assert_eq!(parse("{}").unwrap().prompt(), None);
        assert_eq!(parse(r#"{"prompt": null}"#).unwrap().prompt(), None);
        assert_eq!(parse(r#"{"prompt": ""}"#).unwrap().prompt(), None);
    }

    #[test]
    fn whitespace_prompt_is_kept() {
        assert_eq!(parse(r#"{"prompt": "  "}"#).unwrap().prompt(), Some("  "));
    }

    #[test]
    fn unknown_fields_are_ignored() {
        let req = parse(r#"{"prompt": "x = 1", "max_tokens": 10}"#).unwrap();
        assert_eq!(req.prompt(), Some("x = 1"));
    }

    #[test]
    fn non_string_prompt_is_rejected() {
        let err = parse(r#"{"prompt": 123}"#).unwrap_err();
        assert_eq!(err.to_string(), "prompt must be a string, got a number");

        let err = parse(r#"{"prompt": ["a"]}"#).unwrap_err();
        assert_eq!(err.to_string(), "prompt must be a string, got an array");
    }

    #[test]
    fn arrays_are_not_request_objects() {
        assert!(serde_json::from_str::<Map<String, Value>>(r#"["print(1)"]"#).is_err());
        assert!(serde_json::from_str::<Map<String, Value>>("[]").is_err());
        assert!(serde_json::from_str::<Map<String, Value>>("null").is_err());
    }
}
