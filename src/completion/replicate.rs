use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, error, info};
use url::Url;

use super::{CompletionClient, CompletionOutput, CompletionRequest, parse_api_base};
use crate::error::ChatError;

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(1000);

/// Client for the Replicate predictions API.
///
/// Model references of the form `owner/name:version` run a pinned version;
/// bare `owner/name` references run the model's latest deployment.
pub struct ReplicateClient {
    api_base: Url,
    client: reqwest::Client,
    poll_interval: Duration,
}

#[derive(Debug, Deserialize)]
struct Prediction {
    #[serde(default)]
    id: String,
    status: String,
    #[serde(default)]
    output: Option<Value>,
    #[serde(default)]
    error: Option<Value>,
    #[serde(default)]
    urls: Option<PredictionUrls>,
}

#[derive(Debug, Deserialize)]
struct PredictionUrls {
    get: Option<String>,
}

impl ReplicateClient {
    pub fn new(api_key: String, api_base: &str) -> Result<Self, ChatError> {
        let mut headers = HeaderMap::new();
        let auth = HeaderValue::from_str(&format!("Bearer {}", api_key))
            .map_err(|_| ChatError::validation("REPLICATE_API_TOKEN contains invalid characters"))?;
        headers.insert(AUTHORIZATION, auth);

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .build()?;

        Ok(Self {
            api_base: parse_api_base(api_base)?,
            client,
            poll_interval: DEFAULT_POLL_INTERVAL,
        })
    }

    #[cfg(test)]
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    fn endpoint(&self, model_ref: &str) -> Result<(Url, Option<String>), ChatError> {
        match model_ref.split_once(':') {
            Some((_, version)) if !version.is_empty() => {
                Ok((self.api_base.join("v1/predictions")?, Some(version.to_string())))
            }
            _ => {
                let url = self
                    .api_base
                    .join(&format!("v1/models/{}/predictions", model_ref))?;
                Ok((url, None))
            }
        }
    }

    async fn poll(&self, mut prediction: Prediction) -> Result<Prediction, ChatError> {
        while !is_terminal(&prediction.status) {
            let get_url = prediction
                .urls
                .as_ref()
                .and_then(|urls| urls.get.clone())
                .ok_or_else(|| {
                    ChatError::upstream(format!(
                        "Prediction {} is {} but has no status URL",
                        prediction.id, prediction.status
                    ))
                })?;

            debug!("Prediction {} is {}, polling", prediction.id, prediction.status);
            tokio::time::sleep(self.poll_interval).await;

            let response = self.client.get(&get_url).send().await?;
            if !response.status().is_success() {
                let status = response.status();
                let error_text = response.text().await?;
                error!("Prediction poll failed with {}: {}", status, error_text);
                return Err(ChatError::upstream(format!(
                    "Replicate request failed ({}): {}",
                    status, error_text
                )));
            }
            prediction = response.json().await?;
        }
        Ok(prediction)
    }
}

#[async_trait]
impl CompletionClient for ReplicateClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<CompletionOutput, ChatError> {
        let (url, version) = self.endpoint(&request.model_ref)?;

        let input = json!({
            "prompt": request.prompt,
            "temperature": request.options.temperature,
            "top_p": request.options.top_p,
            "max_length": request.options.max_tokens,
            "repetition_penalty": request.options.repetition_penalty,
        });
        let request_body = match version {
            Some(version) => json!({ "version": version, "input": input }),
            None => json!({ "input": input }),
        };

        debug!("Sending request to Replicate: {}", serde_json::to_string_pretty(&request_body)?);

        let response = self
            .client
            .post(url)
            .header("Prefer", "wait")
            .json(&request_body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await?;
            error!("Replicate request failed with {}: {}", status, error_text);
            return Err(ChatError::upstream(format!(
                "Replicate request failed ({}): {}",
                status, error_text
            )));
        }

        let prediction: Prediction = response.json().await?;
        let prediction = self.poll(prediction).await?;
        info!("Prediction {} finished with status {}", prediction.id, prediction.status);

        if prediction.status != "succeeded" {
            let details = prediction
                .error
                .map(|err| match err {
                    Value::String(s) => s,
                    other => other.to_string(),
                })
                .unwrap_or_else(|| format!("prediction {}", prediction.status));
            return Err(ChatError::upstream(details));
        }

        output_from_value(prediction.output.unwrap_or(Value::Null))
    }
}

fn is_terminal(status: &str) -> bool {
    matches!(status, "succeeded" | "failed" | "canceled")
}

fn output_from_value(output: Value) -> Result<CompletionOutput, ChatError> {
    match output {
        Value::String(text) => Ok(CompletionOutput::Text(text)),
        Value::Array(items) => Ok(CompletionOutput::Fragments(
            items
                .into_iter()
                .map(|item| match item {
                    Value::String(s) => s,
                    Value::Null => String::new(),
                    other => other.to_string(),
                })
                .collect(),
        )),
        Value::Null => Err(ChatError::upstream("Replicate returned no output")),
        other => Err(ChatError::upstream(format!(
            "Unexpected prediction output: {}",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::completion::GenerationOptions;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const LLAMA_7B: &str = "a16z-infra/llama7b-v2-chat:4f0a4744c7295c024a1de15e1a63c880d3da035fa1f49bfd344fe076074c8eea";

    fn request(model_ref: &str) -> CompletionRequest {
        CompletionRequest {
            model_ref: model_ref.to_string(),
            prompt: "SYS\n\nUser: hi\n\nAssistant: ".to_string(),
            messages: Vec::new(),
            options: GenerationOptions::new(0.5, 300).unwrap(),
        }
    }

    fn client(server: &MockServer) -> ReplicateClient {
        ReplicateClient::new("r8_test".to_string(), &server.uri())
            .unwrap()
            .with_poll_interval(Duration::from_millis(10))
    }

    #[tokio::test]
    async fn test_pinned_version_returns_fragments() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/predictions"))
            .and(header("authorization", "Bearer r8_test"))
            .and(body_partial_json(json!({
                "version": "4f0a4744c7295c024a1de15e1a63c880d3da035fa1f49bfd344fe076074c8eea",
                "input": {
                    "prompt": "SYS\n\nUser: hi\n\nAssistant: ",
                    "max_length": 300,
                    "top_p": 0.9,
                    "repetition_penalty": 1.0
                }
            })))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "id": "p1",
                "status": "succeeded",
                "output": ["Hel", "lo ", "Lee"]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let output = client(&server).complete(&request(LLAMA_7B)).await.unwrap();
        assert_eq!(
            output,
            CompletionOutput::Fragments(vec!["Hel".into(), "lo ".into(), "Lee".into()])
        );
        assert_eq!(output.into_reply(), "Hello Lee");
    }

    #[tokio::test]
    async fn test_unversioned_model_uses_model_endpoint() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/models/meta/llama-2-7b-chat/predictions"))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "id": "p2",
                "status": "succeeded",
                "output": "  Hello  "
            })))
            .expect(1)
            .mount(&server)
            .await;

        let output = client(&server)
            .complete(&request("meta/llama-2-7b-chat"))
            .await
            .unwrap();
        assert_eq!(output, CompletionOutput::Text("  Hello  ".to_string()));
    }

    #[tokio::test]
    async fn test_polls_until_succeeded() {
        let server = MockServer::start().await;
        let get_url = format!("{}/v1/predictions/p3", server.uri());

        Mock::given(method("POST"))
            .and(path("/v1/predictions"))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "id": "p3",
                "status": "processing",
                "urls": { "get": get_url }
            })))
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/v1/predictions/p3"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "p3",
                "status": "succeeded",
                "output": ["Done"]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let output = client(&server).complete(&request(LLAMA_7B)).await.unwrap();
        assert_eq!(output.into_reply(), "Done");
    }

    #[tokio::test]
    async fn test_failed_prediction_is_upstream_error() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/predictions"))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "id": "p4",
                "status": "failed",
                "error": "CUDA out of memory"
            })))
            .mount(&server)
            .await;

        let err = client(&server).complete(&request(LLAMA_7B)).await.unwrap_err();
        assert!(matches!(err, ChatError::Upstream(ref msg) if msg == "CUDA out of memory"));
    }

    #[tokio::test]
    async fn test_http_error_is_upstream_error() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/predictions"))
            .respond_with(ResponseTemplate::new(401).set_body_string("Unauthenticated"))
            .mount(&server)
            .await;

        let err = client(&server).complete(&request(LLAMA_7B)).await.unwrap_err();
        match err {
            ChatError::Upstream(msg) => assert!(msg.contains("Unauthenticated")),
            other => panic!("unexpected error: {:?}", other),
        }
    }
}
