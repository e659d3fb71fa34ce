//! OpenRouter-compatible chat completion client with ordered model fallback.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde::{Deserialize, Serialize};
use std::time::Duration;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, thiserror::Error)]
pub enum AiError {
    #[error("no OpenRouter API key configured")]
    NotConfigured,

    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("model error: {0}")]
    Model(String),

    #[error("model returned no choices")]
    EmptyResponse,

    #[error("all AI models are busy, please retry later ({})", .0.join("; "))]
    Exhausted(Vec<String>),
}

/// A successful completion and the model that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, utoipa::ToSchema)]
pub struct AiCompletion {
    pub content: String,
    pub model: String,
}

#[async_trait]
pub trait ChatCompletion: Send + Sync {
    async fn complete(&self, api_key: &str, model: &str, prompt: &str) -> Result<String, AiError>;
}

// --- OpenRouter JSON types ---

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 1],
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    error: Option<ChatError>,
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatError {
    message: String,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: String,
}

#[derive(Debug, Clone)]
pub struct OpenRouterClient {
    client: reqwest::Client,
    url: String,
}

impl OpenRouterClient {
    pub fn new(url: &str, user_agent: &str) -> Self {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .build()
            .expect("Failed to build HTTP client");
        Self {
            client,
            url: url.to_string(),
        }
    }
}

#[async_trait]
impl ChatCompletion for OpenRouterClient {
    async fn complete(&self, api_key: &str, model: &str, prompt: &str) -> Result<String, AiError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", api_key))
                .map_err(|e| AiError::Model(format!("invalid API key header: {}", e)))?,
        );

        let body = ChatRequest {
            model,
            messages: [ChatMessage {
                role: "user",
                content: prompt,
            }],
        };

        // OpenRouter reports model failures in the body, often with a 200
        let response: ChatResponse = self
            .client
            .post(&self.url)
            .headers(headers)
            .timeout(REQUEST_TIMEOUT)
            .json(&body)
            .send()
            .await?
            .json()
            .await?;

        if let Some(err) = response.error {
            return Err(AiError::Model(err.message));
        }
        response
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or(AiError::EmptyResponse)
    }
}

/// Try each model in order; the first success wins. Exhaustion carries one
/// reason per model tried.
pub async fn run_with_fallback(
    client: &dyn ChatCompletion,
    api_key: Option<&str>,
    models: &[String],
    prompt: &str,
) -> Result<AiCompletion, AiError> {
    let api_key = api_key
        .filter(|k| !k.trim().is_empty())
        .ok_or(AiError::NotConfigured)?;

    let mut failures = Vec::with_capacity(models.len());
    for (i, model) in models.iter().enumerate() {
        tracing::debug!("AI analysis: trying model {}/{} ({})", i + 1, models.len(), model);
        match client.complete(api_key, model, prompt).await {
            Ok(content) => {
                return Ok(AiCompletion {
                    content,
                    model: model.clone(),
                })
            }
            Err(e) => {
                tracing::warn!("Model {} failed: {}", model, e);
                failures.push(format!("{}: {}", model, e));
            }
        }
    }
    Err(AiError::Exhausted(failures))
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use std::sync::Mutex;

    /// Fails for every model in `failing`, answers the rest with `reply`.
    #[derive(Default)]
    pub struct ScriptedChat {
        pub failing: Vec<String>,
        pub reply: String,
        pub calls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ChatCompletion for ScriptedChat {
        async fn complete(&self, _key: &str, model: &str, _prompt: &str) -> Result<String, AiError> {
            self.calls.lock().unwrap().push(model.to_string());
            if self.failing.iter().any(|m| m == model) {
                Err(AiError::Model("rate limited".to_string()))
            } else {
                Ok(self.reply.clone())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::ScriptedChat;
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn models() -> Vec<String> {
        vec!["first/model".to_string(), "second/model".to_string()]
    }

    #[tokio::test]
    async fn test_openrouter_parses_first_choice() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .and(body_partial_json(serde_json::json!({"model": "first/model"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{"message": {"role": "assistant", "content": "Run one large chiller."}}]
            })))
            .mount(&server)
            .await;

        let client = OpenRouterClient::new(&format!("{}/chat/completions", server.uri()), "test");
        let content = client
            .complete("sk-test", "first/model", "hello")
            .await
            .unwrap();
        assert_eq!(content, "Run one large chiller.");
    }

    #[tokio::test]
    async fn test_openrouter_body_error_is_model_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "error": {"message": "Provider returned error", "code": 429}
            })))
            .mount(&server)
            .await;

        let client = OpenRouterClient::new(&server.uri(), "test");
        let err = client.complete("k", "m", "p").await.unwrap_err();
        assert!(matches!(err, AiError::Model(msg) if msg == "Provider returned error"));
    }

    #[tokio::test]
    async fn test_openrouter_empty_choices() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"choices": []})),
            )
            .mount(&server)
            .await;

        let client = OpenRouterClient::new(&server.uri(), "test");
        let err = client.complete("k", "m", "p").await.unwrap_err();
        assert!(matches!(err, AiError::EmptyResponse));
    }

    #[tokio::test]
    async fn test_fallback_uses_next_model() {
        let chat = ScriptedChat {
            failing: vec!["first/model".to_string()],
            reply: "ok".to_string(),
            ..Default::default()
        };
        let result = run_with_fallback(&chat, Some("k"), &models(), "p")
            .await
            .unwrap();
        assert_eq!(result.model, "second/model");
        assert_eq!(chat.calls.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_fallback_exhaustion_lists_every_model() {
        let chat = ScriptedChat {
            failing: models(),
            ..Default::default()
        };
        let err = run_with_fallback(&chat, Some("k"), &models(), "p")
            .await
            .unwrap_err();
        match err {
            AiError::Exhausted(reasons) => {
                assert_eq!(reasons.len(), 2);
                assert!(reasons[0].starts_with("first/model"));
            }
            other => panic!("expected exhaustion, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_missing_key_makes_no_calls() {
        let chat = ScriptedChat::default();
        let err = run_with_fallback(&chat, Some("  "), &models(), "p")
            .await
            .unwrap_err();
        assert!(matches!(err, AiError::NotConfigured));
        assert!(chat.calls.lock().unwrap().is_empty());
    }
}
