// Tier 1: HTTP Classifier Client
//
// Concept: Send prompts (and base64-encoded photos) to an OpenAI-compatible
// chat-completions endpoint and return the first choice's text.
//
// Rate limiting is enforced client-side (token bucket) in ready(), ahead of
// the per-call deadline; the deadline itself comes from the request and is
// also enforced by call_with_timeout().

use crate::pipeline::tier1::classifier::Classifier;
use crate::pipeline::types::{ClassifierError, ClassifierRequest};
use async_trait::async_trait;
use base64::Engine;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use insp_common::config::ClassifierConfig;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::num::NonZeroU32;
use std::time::Duration;

/// Chat-completions request body
#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: Vec<ChatMessage>,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: Vec<ContentPart>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Serialize)]
struct ImageUrl {
    url: String,
}

/// Chat-completions response (only the fields we read)
#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Classifier backed by an HTTP chat-completions API
pub struct HttpClassifier {
    client: Client,
    endpoint: String,
    model: String,
    api_key: String,
    max_tokens: u32,
    rate_limiter: DefaultDirectRateLimiter,
}

impl HttpClassifier {
    /// Build a client from configuration and a resolved API key
    pub fn new(config: &ClassifierConfig, api_key: String) -> insp_common::Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .build()
            .map_err(|e| insp_common::Error::Config(format!("Failed to build HTTP client: {}", e)))?;

        let per_second = NonZeroU32::new(config.requests_per_second).ok_or_else(|| {
            insp_common::Error::Config("classifier.requests_per_second must be at least 1".to_string())
        })?;

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            model: config.model.clone(),
            api_key,
            max_tokens: config.max_tokens,
            rate_limiter: RateLimiter::direct(Quota::per_second(per_second)),
        })
    }

    fn build_body<'a>(&'a self, request: &ClassifierRequest) -> ChatRequest<'a> {
        let mut content = vec![ContentPart::Text {
            text: request.prompt.clone(),
        }];
        for image in &request.images {
            let encoded = base64::engine::general_purpose::STANDARD.encode(&image.data);
            content.push(ContentPart::ImageUrl {
                image_url: ImageUrl {
                    url: format!("data:{};base64,{}", image.mime_type, encoded),
                },
            });
        }

        ChatRequest {
            model: &self.model,
            max_tokens: self.max_tokens,
            messages: vec![ChatMessage {
                role: "user",
                content,
            }],
        }
    }
}

#[async_trait]
impl Classifier for HttpClassifier {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn ready(&self) {
        self.rate_limiter.until_ready().await;
    }

    async fn complete(&self, request: &ClassifierRequest) -> Result<String, ClassifierError> {
        let body = self.build_body(request);

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .timeout(request.timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ClassifierError::Timeout(request.timeout)
                } else {
                    ClassifierError::Transport(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ClassifierError::Status {
                status: status.as_u16(),
                body: truncate(&body, 500),
            });
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| ClassifierError::Transport(format!("Failed to read response body: {}", e)))?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|text| !text.trim().is_empty())
            .ok_or(ClassifierError::EmptyResponse)
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let mut cut: String = text.chars().take(max_chars).collect();
        cut.push('…');
        cut
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::types::{CallPurpose, ImagePayload};

    #[test]
    fn test_body_embeds_images_as_data_urls() {
        let classifier =
            HttpClassifier::new(&ClassifierConfig::default(), "key".to_string()).unwrap();
        let request = ClassifierRequest {
            purpose: CallPurpose::AnalyzePhoto,
            prompt: "describe".to_string(),
            images: vec![ImagePayload {
                mime_type: "image/png".to_string(),
                data: vec![1, 2, 3],
            }],
            timeout: Duration::from_secs(1),
        };

        let body = serde_json::to_value(classifier.build_body(&request)).unwrap();
        let parts = &body["messages"][0]["content"];
        assert_eq!(parts[0]["type"], "text");
        assert_eq!(parts[0]["text"], "describe");
        assert_eq!(parts[1]["type"], "image_url");
        assert_eq!(parts[1]["image_url"]["url"], "data:image/png;base64,AQID");
        assert_eq!(body["model"], ClassifierConfig::default().model);
    }

    #[test]
    fn test_zero_rate_limit_rejected() {
        let config = ClassifierConfig {
            requests_per_second: 0,
            ..Default::default()
        };
        assert!(HttpClassifier::new(&config, "key".to_string()).is_err());
    }

    #[test]
    fn test_response_shape_parses() {
        let parsed: ChatResponse = serde_json::from_str(
            r#"{"id":"x","choices":[{"index":0,"message":{"role":"assistant","content":"[1]"}}]}"#,
        )
        .unwrap();
        assert_eq!(parsed.choices[0].message.content.as_deref(), Some("[1]"));
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("abc", 5), "abc");
        assert_eq!(truncate("abcdef", 3), "abc…");
    }
}
