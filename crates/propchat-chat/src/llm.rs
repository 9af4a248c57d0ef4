//! LLM-backed intent parser over an OpenAI-compatible chat completions API.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use propchat_core::config::LlmConfig;
use propchat_core::error::PropChatError;
use propchat_core::services::IntentParser;
use propchat_core::types::{Filters, Intent, ParsedQuery};

const SYSTEM_PROMPT: &str = r#"You are the query interpreter for a property database assistant.
Classify the user's message and extract filters. Reply with a single JSON object and nothing else:
{"intent": "...", "filters": {"<internal_name>": ["value", ...]}, "response_text": "..."}

intent is one of:
- property_lookup: find properties by name, owner or any attribute
- location_filter: find properties in a city, state or address
- aggregation: counts and "most" questions; set filters.info_type to the aggregation kind
- metadata: questions about which information is available
- other: greetings and anything else

response_text is a short, friendly reply used when no data is shown."#;

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: String,
}

/// Intent parser that asks a hosted language model.
pub struct LlmIntentParser {
    client: Client,
    config: LlmConfig,
    api_key: String,
}

impl LlmIntentParser {
    pub fn new(config: LlmConfig, api_key: String) -> Result<Self, PropChatError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| PropChatError::Llm(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            config,
            api_key,
        })
    }

    async fn complete(&self, message: &str, schema_doc: &str) -> Result<String, PropChatError> {
        let system = format!("{}\n\n{}", SYSTEM_PROMPT, schema_doc);
        let body = ChatRequest {
            model: &self.config.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: &system,
                },
                ChatMessage {
                    role: "user",
                    content: message,
                },
            ],
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
        };

        let base = self.config.base_url.trim_end_matches('/');
        let res = self
            .client
            .post(format!("{}/chat/completions", base))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| PropChatError::Llm(format!("Request failed: {}", e)))?;

        if !res.status().is_success() {
            let status = res.status();
            let text = res.text().await.unwrap_or_default();
            return Err(PropChatError::Llm(format!("{} {}", status, text)));
        }

        let parsed: ChatResponse = res
            .json()
            .await
            .map_err(|e| PropChatError::Llm(format!("Invalid response body: {}", e)))?;
        parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| PropChatError::Llm("No choices in response".to_string()))
    }
}

#[async_trait]
impl IntentParser for LlmIntentParser {
    async fn parse(&self, message: &str, schema_doc: &str) -> Result<ParsedQuery, PropChatError> {
        let raw = self.complete(message, schema_doc).await?;
        debug!(model = %self.config.model, "Intent parser replied");
        parse_reply(&raw)
    }
}

/// Parse the model's reply, tolerating prose or code fences around the
/// JSON object.
pub fn parse_reply(raw: &str) -> Result<ParsedQuery, PropChatError> {
    let json = match (raw.find('{'), raw.rfind('}')) {
        (Some(start), Some(end)) if start < end => &raw[start..=end],
        _ => {
            warn!("Intent parser reply contains no JSON object");
            return Err(PropChatError::Llm("Reply is not a JSON object".to_string()));
        }
    };

    let value: Value = serde_json::from_str(json)
        .map_err(|e| PropChatError::Llm(format!("Reply is not valid JSON: {}", e)))?;

    let intent = value
        .get("intent")
        .and_then(Value::as_str)
        .map(Intent::from_label)
        .unwrap_or(Intent::Other);
    let response_text = value
        .get("response_text")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let filters = value
        .get("filters")
        .and_then(Value::as_object)
        .map(normalize_filters)
        .unwrap_or_default();

    Ok(ParsedQuery {
        intent,
        filters,
        response_text,
    })
}

/// Coerce loosely typed filter values into lists of strings.
fn normalize_filters(raw: &serde_json::Map<String, Value>) -> Filters {
    let mut filters = Filters::new();
    for (key, value) in raw {
        let values: Vec<String> = match value {
            Value::Array(items) => items.iter().filter_map(scalar_to_string).collect(),
            other => scalar_to_string(other).into_iter().collect(),
        };
        if !values.is_empty() {
            filters.insert(key.clone(), values);
        }
    }
    filters
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_json() {
        let parsed = parse_reply(
            r#"{"intent":"location_filter","filters":{"city":["Austin"]},"response_text":"Here you go"}"#,
        )
        .unwrap();
        assert_eq!(parsed.intent, Intent::LocationFilter);
        assert_eq!(parsed.filters["city"], vec!["Austin"]);
        assert_eq!(parsed.response_text, "Here you go");
    }

    #[test]
    fn test_parse_code_fenced_reply() {
        let raw = "Sure!\n```json\n{\"intent\": \"metadata\", \"filters\": {}, \"response_text\": \"\"}\n```";
        let parsed = parse_reply(raw).unwrap();
        assert_eq!(parsed.intent, Intent::Metadata);
        assert!(parsed.filters.is_empty());
    }

    #[test]
    fn test_filters_are_normalized() {
        let parsed = parse_reply(
            r#"{"intent":"property_lookup","filters":{"owner":"Jane","bedrooms":3,"pool":true,"city":null,"tags":["a",null,2]}}"#,
        )
        .unwrap();
        assert_eq!(parsed.filters["owner"], vec!["Jane"]);
        assert_eq!(parsed.filters["bedrooms"], vec!["3"]);
        assert_eq!(parsed.filters["pool"], vec!["true"]);
        assert!(!parsed.filters.contains_key("city"));
        assert_eq!(parsed.filters["tags"], vec!["a", "2"]);
        assert_eq!(parsed.response_text, "");
    }

    #[test]
    fn test_unknown_intent_maps_to_other() {
        let parsed = parse_reply(r#"{"intent":"chitchat","response_text":"Hi!"}"#).unwrap();
        assert_eq!(parsed.intent, Intent::Other);
        assert_eq!(parsed.response_text, "Hi!");
    }

    #[test]
    fn test_non_json_reply_is_error() {
        assert!(matches!(parse_reply("I don't know"), Err(PropChatError::Llm(_))));
        assert!(matches!(parse_reply("{not json}"), Err(PropChatError::Llm(_))));
    }

    #[test]
    fn test_client_builds_from_default_config() {
        let parser = LlmIntentParser::new(LlmConfig::default(), "key".to_string());
        assert!(parser.is_ok());
    }
}
