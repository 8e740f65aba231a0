use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};
use url::Url;

use super::{ChatMessage, CompletionClient, CompletionOutput, CompletionRequest, parse_api_base};
use crate::error::ChatError;

pub struct OpenAiClient {
    api_key: String,
    api_base: Url,
    client: reqwest::Client,
}

#[derive(Debug, Serialize)]
struct ChatCompletionBody<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f64,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

impl OpenAiClient {
    pub fn new(api_key: String, api_base: &str) -> Result<Self, ChatError> {
        Ok(Self {
            api_key,
            api_base: parse_api_base(api_base)?,
            client: reqwest::Client::new(),
        })
    }
}

#[async_trait]
impl CompletionClient for OpenAiClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<CompletionOutput, ChatError> {
        let url = self.api_base.join("v1/chat/completions")?;
        let body = ChatCompletionBody {
            model: &request.model_ref,
            messages: &request.messages,
            temperature: request.options.temperature,
            max_tokens: request.options.max_tokens,
        };

        debug!("Sending request to OpenAI: {}", serde_json::to_string_pretty(&body)?);

        let response = self
            .client
            .post(url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await?;
            error!("OpenAI request failed with {}: {}", status, error_text);
            return Err(ChatError::upstream(format!(
                "OpenAI request failed ({}): {}",
                status, error_text
            )));
        }

        let completion: ChatCompletionResponse = response.json().await?;
        debug!("Received {} choice(s) from OpenAI", completion.choices.len());

        completion
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .map(CompletionOutput::Text)
            .ok_or_else(|| ChatError::upstream("OpenAI returned no message content"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::chat::conversation_state::Role;
    use crate::completion::GenerationOptions;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn request() -> CompletionRequest {
        CompletionRequest {
            model_ref: "gpt-3.5-turbo".to_string(),
            prompt: String::new(),
            messages: vec![
                ChatMessage::new(Role::System, "SYS"),
                ChatMessage::new(Role::Assistant, "Hello. Could you please tell me your name?"),
                ChatMessage::new(Role::User, "Lee"),
            ],
            options: GenerationOptions::new(0.5, 500).unwrap(),
        }
    }

    #[tokio::test]
    async fn test_sends_messages_and_reads_first_choice() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .and(body_json(json!({
                "model": "gpt-3.5-turbo",
                "messages": [
                    { "role": "system", "content": "SYS" },
                    { "role": "assistant", "content": "Hello. Could you please tell me your name?" },
                    { "role": "user", "content": "Lee" }
                ],
                "temperature": 0.5,
                "max_tokens": 500
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [
                    { "index": 0, "message": { "role": "assistant", "content": " Nice to meet you, Lee. \n" } }
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = OpenAiClient::new("sk-test".to_string(), &server.uri()).unwrap();
        let output = client.complete(&request()).await.unwrap();
        assert_eq!(output.into_reply(), "Nice to meet you, Lee.");
    }

    #[tokio::test]
    async fn test_api_error_is_upstream_error() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(429).set_body_string("Rate limit reached"))
            .mount(&server)
            .await;

        let client = OpenAiClient::new("sk-test".to_string(), &server.uri()).unwrap();
        match client.complete(&request()).await {
            Err(ChatError::Upstream(msg)) => {
                assert!(msg.contains("429"));
                assert!(msg.contains("Rate limit reached"));
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_empty_choices_is_upstream_error() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "choices": [] })))
            .mount(&server)
            .await;

        let client = OpenAiClient::new("sk-test".to_string(), &server.uri()).unwrap();
        assert!(matches!(
            client.complete(&request()).await,
            Err(ChatError::Upstream(_))
        ));
    }
}
