use anyhow::{Context, Result};
use log::debug;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::env;

const DEFAULT_API_URL: &str = "https://api-inference.huggingface.co";

/// Configuration for the model inference endpoint
#[derive(Debug, Clone)]
pub struct InferenceConfig {
    pub api_url: String,
    pub api_token: Option<String>,
}

impl InferenceConfig {
    /// Create a new configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let api_url = env::var("INFERENCE_API_URL").unwrap_or_else(|_| DEFAULT_API_URL.to_string());
        let api_token = env::var("INFERENCE_API_TOKEN").ok();

        Ok(InferenceConfig { api_url, api_token })
    }
}

/// Beam-search settings sent with every generation request
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct GenerationParameters {
    pub num_beams: usize,
    pub min_length: usize,
    pub max_length: usize,
    pub num_return_sequences: usize,
}

/// Client for models served behind an inference endpoint
#[derive(Clone)]
pub struct InferenceClient {
    config: InferenceConfig,
    client: reqwest::Client,
}

impl InferenceClient {
    pub fn new(config: InferenceConfig) -> Self {
        let client = reqwest::Client::new();
        InferenceClient { config, client }
    }

    pub fn config(&self) -> &InferenceConfig {
        &self.config
    }

    /// One pooled embedding per input text
    pub async fn feature_extraction(
        &self,
        model: &str,
        inputs: &[String],
    ) -> Result<Vec<Vec<f32>>> {
        let request = FeatureExtractionRequest {
            inputs,
            options: Options { wait_for_model: true },
        };

        self.post(model, &request).await
    }

    /// Generated sequences for one input, best first
    pub async fn text2text(
        &self,
        model: &str,
        input: &str,
        parameters: &GenerationParameters,
    ) -> Result<Vec<String>> {
        let request = Text2TextRequest {
            inputs: input,
            parameters,
            options: Options { wait_for_model: true },
        };

        let response: Vec<GeneratedText> = self.post(model, &request).await?;
        Ok(response.into_iter().map(|g| g.generated_text).collect())
    }

    async fn post<B, R>(&self, model: &str, body: &B) -> Result<R>
    where
        B: Serialize,
        R: DeserializeOwned,
    {
        let url = model_url(&self.config.api_url, model);
        debug!("POST {}", url);

        // Build request
        let mut request = self.client.post(&url).json(body);
        if let Some(token) = &self.config.api_token {
            request = request.bearer_auth(token);
        }

        // Send request
        let response = request
            .send()
            .await
            .with_context(|| format!("Failed to reach model {}", model))?;

        // Check response status
        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(anyhow::anyhow!(
                "{} request failed: {} {}",
                model,
                status,
                error_text
            ));
        }

        // Parse response
        response
            .json()
            .await
            .with_context(|| format!("Unexpected response from model {}", model))
    }
}

fn model_url(api_url: &str, model: &str) -> String {
    format!("{}/models/{}", api_url.trim_end_matches('/'), model)
}

#[derive(Serialize)]
struct Options {
    wait_for_model: bool,
}

#[derive(Serialize)]
struct FeatureExtractionRequest<'a> {
    inputs: &'a [String],
    options: Options,
}

#[derive(Serialize)]
struct Text2TextRequest<'a> {
    inputs: &'a str,
    parameters: &'a GenerationParameters,
    options: Options,
}

#[derive(Deserialize, Debug)]
struct GeneratedText {
    generated_text: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_model_url() {
        assert_eq!(
            model_url("http://localhost:8080/", "facebook/rag-token-nq"),
            "http://localhost:8080/models/facebook/rag-token-nq"
        );
        assert_eq!(
            model_url(DEFAULT_API_URL, "facebook/dpr-ctx_encoder-single-nq-base"),
            "https://api-inference.huggingface.co/models/facebook/dpr-ctx_encoder-single-nq-base"
        );
    }

    #[test]
    fn test_generation_request_body() {
        let parameters = GenerationParameters {
            num_beams: 2,
            min_length: 2,
            max_length: 200,
            num_return_sequences: 2,
        };
        let request = Text2TextRequest {
            inputs: "Avery lives by the river. // Who is Avery?",
            parameters: &parameters,
            options: Options { wait_for_model: true },
        };

        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({
                "inputs": "Avery lives by the river. // Who is Avery?",
                "parameters": {
                    "num_beams": 2,
                    "min_length": 2,
                    "max_length": 200,
                    "num_return_sequences": 2
                },
                "options": {"wait_for_model": true}
            })
        );
    }

    #[test]
    fn test_generated_text_response() {
        let raw = r#"[{"generated_text": " a young witch"}, {"generated_text": "a girl"}]"#;
        let parsed: Vec<GeneratedText> = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed[0].generated_text, " a young witch");
        assert_eq!(parsed.len(), 2);
    }
}
