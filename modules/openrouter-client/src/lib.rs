pub mod error;
pub mod types;
pub mod util;

pub use error::{OpenRouterError, Result};
pub use types::{ChatMessage, ChatRequest, ChatResponse};
pub use util::{strip_code_blocks, truncate_to_char_boundary};

use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use schemars::{schema_for, JsonSchema};
use serde::de::DeserializeOwned;

const OPENROUTER_API_URL: &str = "https://openrouter.ai/api/v1";

/// Single LLM access point. Every request carries the caller-identifying
/// `HTTP-Referer` and `X-Title` headers OpenRouter uses for attribution.
pub struct OpenRouterClient {
    http: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
    referer: String,
    title: String,
}

impl OpenRouterClient {
    pub fn new(api_key: String, model: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key,
            model,
            base_url: OPENROUTER_API_URL.to_string(),
            referer: "https://github.com/casescout/casescout".to_string(),
            title: "casescout".to_string(),
        }
    }

    pub fn with_base_url(mut self, url: &str) -> Self {
        self.base_url = url.to_string();
        self
    }

    fn headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", self.api_key))
                .map_err(|e| OpenRouterError::Network(e.to_string()))?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            "HTTP-Referer",
            HeaderValue::from_str(&self.referer)
                .map_err(|e| OpenRouterError::Network(e.to_string()))?,
        );
        headers.insert(
            "X-Title",
            HeaderValue::from_str(&self.title)
                .map_err(|e| OpenRouterError::Network(e.to_string()))?,
        );
        Ok(headers)
    }

    /// Raw chat completion. Returns the first choice's content.
    pub async fn chat(&self, system: &str, user: &str) -> Result<String> {
        let request = ChatRequest {
            model: self.model.clone(),
            messages: vec![ChatMessage::system(system), ChatMessage::user(user)],
            temperature: Some(0.0),
            max_tokens: Some(4096),
        };

        tracing::debug!(model = %self.model, "OpenRouter chat request");

        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .headers(self.headers()?)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(OpenRouterError::Api {
                status: status.as_u16(),
                message: body,
            });
        }

        let parsed: ChatResponse = response.json().await?;
        let content = parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or(OpenRouterError::EmptyCompletion)?;

        if let Some(usage) = parsed.usage {
            tracing::debug!(
                prompt_tokens = usage.prompt_tokens,
                completion_tokens = usage.completion_tokens,
                "OpenRouter chat complete"
            );
        }

        Ok(content)
    }

    /// Chat completion whose system prompt embeds the JSON schema of `T`.
    /// Returns the raw completion; parse with [`parse_structured`] so the
    /// caller controls what happens when the output is malformed.
    pub async fn chat_structured<T: JsonSchema>(&self, system: &str, user: &str) -> Result<String> {
        let schema = schema_for!(T);
        let schema_json = serde_json::to_string_pretty(&schema)
            .map_err(|e| OpenRouterError::Parse(e.to_string()))?;
        let system = format!(
            "{system}\n\nRespond with a single JSON object matching this schema, and nothing else:\n{schema_json}"
        );
        self.chat(&system, user).await
    }

    /// One-shot structured extraction for callers that want the default
    /// malformed-output handling (one fence-strip repair, then error).
    pub async fn extract<T: JsonSchema + DeserializeOwned>(
        &self,
        system: &str,
        user: &str,
    ) -> Result<T> {
        let raw = self.chat_structured::<T>(system, user).await?;
        parse_structured(&raw)
    }
}

/// Parse a structured completion. Tries the raw text first, then exactly
/// one repair pass that strips code-fence wrappers.
pub fn parse_structured<T: DeserializeOwned>(raw: &str) -> Result<T> {
    match serde_json::from_str(raw) {
        Ok(v) => Ok(v),
        Err(first) => {
            let repaired = strip_code_blocks(raw);
            serde_json::from_str(repaired).map_err(|_| OpenRouterError::Parse(first.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Toy {
        n: u32,
    }

    #[test]
    fn parse_structured_accepts_plain_json() {
        let toy: Toy = parse_structured(r#"{"n": 3}"#).unwrap();
        assert_eq!(toy, Toy { n: 3 });
    }

    #[test]
    fn parse_structured_repairs_fenced_json() {
        let toy: Toy = parse_structured("```json\n{\"n\": 7}\n```").unwrap();
        assert_eq!(toy, Toy { n: 7 });
    }

    #[test]
    fn parse_structured_fails_after_one_repair() {
        let err = parse_structured::<Toy>("```json\nnot json\n```").unwrap_err();
        assert!(matches!(err, OpenRouterError::Parse(_)));
    }
}
