use std::time::{Duration, Instant};

use async_trait::async_trait;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::error::{check_status, ChatError, Result};
use crate::progress;

pub const DEFAULT_MODEL: &str = "ibm/granite-13b-chat-v2";
pub const DEFAULT_IAM_URL: &str = "https://iam.cloud.ibm.com/identity/token";
const API_VERSION: &str = "2023-05-29";
const IAM_GRANT_TYPE: &str = "urn:ibm:params:oauth:grant-type:apikey";
// Refresh this long before the IAM token actually expires
const TOKEN_EXPIRY_MARGIN: Duration = Duration::from_secs(60);

#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String>;
}

/// Generates one completion per prompt, in order. Nothing is sent if any prompt is empty.
pub async fn generate_all(generator: &dyn TextGenerator, prompts: &[String]) -> Result<Vec<String>> {
    if prompts.iter().any(|p| p.is_empty()) {
        return Err(ChatError::EmptyPrompt);
    }
    let mut responses = Vec::with_capacity(prompts.len());
    for prompt in prompts {
        responses.push(generator.generate(prompt).await?);
    }
    Ok(responses)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum DecodingMethod {
    Greedy,
    Sample,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerationParams {
    pub decoding_method: DecodingMethod,
    pub max_new_tokens: u32,
    pub min_new_tokens: u32,
    pub random_seed: u64,
    pub temperature: f64,
    pub repetition_penalty: f64,
}

impl Default for GenerationParams {
    fn default() -> Self {
        GenerationParams {
            decoding_method: DecodingMethod::Greedy,
            max_new_tokens: 100,
            min_new_tokens: 30,
            random_seed: 42,
            temperature: 1.0,
            repetition_penalty: 1.0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct WatsonxConfig {
    pub api_key: String,
    pub url: String,
    pub project_id: String,
    pub iam_url: String,
    pub model_id: String,
    pub params: GenerationParams,
}

#[derive(Serialize)]
struct GenerationRequest<'a> {
    model_id: &'a str,
    input: &'a str,
    parameters: &'a GenerationParams,
    project_id: &'a str,
}

#[derive(Deserialize)]
struct GenerationResponse {
    #[serde(default)]
    results: Vec<GenerationResult>,
}

#[derive(Deserialize)]
struct GenerationResult {
    generated_text: String,
    #[serde(default)]
    stop_reason: Option<String>,
}

#[derive(Deserialize)]
struct IamTokenResponse {
    access_token: String,
    expires_in: u64,
}

struct CachedToken {
    value: String,
    refresh_at: Instant,
}

pub struct WatsonxClient {
    http: reqwest::Client,
    config: WatsonxConfig,
    token: Mutex<Option<CachedToken>>,
}

impl WatsonxClient {
    pub fn new(config: WatsonxConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()?;
        Ok(WatsonxClient {
            http,
            config,
            token: Mutex::new(None),
        })
    }

    async fn bearer_token(&self) -> Result<String> {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref() {
            if Instant::now() < token.refresh_at {
                return Ok(token.value.clone());
            }
        }

        tracing::debug!(iam_url = %self.config.iam_url, "requesting IAM token");
        progress::count(&progress::HTTP_REQUESTS);
        let response = self
            .http
            .post(&self.config.iam_url)
            .header("Accept", "application/json")
            .form(&[
                ("grant_type", IAM_GRANT_TYPE),
                ("apikey", self.config.api_key.as_str()),
            ])
            .send()
            .await?;
        let body: IamTokenResponse = check_status("IAM", response).await?.json().await?;

        let lifetime = Duration::from_secs(body.expires_in).saturating_sub(TOKEN_EXPIRY_MARGIN);
        // A lifetime past what Instant can represent is not cached
        *cached = Instant::now()
            .checked_add(lifetime)
            .map(|refresh_at| CachedToken {
                value: body.access_token.clone(),
                refresh_at,
            });
        Ok(body.access_token)
    }

    fn generation_url(&self) -> String {
        format!(
            "{}/ml/v1/text/generation?version={}",
            self.config.url.trim_end_matches('/'),
            API_VERSION
        )
    }
}

#[async_trait]
impl TextGenerator for WatsonxClient {
    async fn generate(&self, prompt: &str) -> Result<String> {
        let token = self.bearer_token().await?;
        let body = GenerationRequest {
            model_id: &self.config.model_id,
            input: prompt,
            parameters: &self.config.params,
            project_id: &self.config.project_id,
        };

        tracing::debug!(model = %self.config.model_id, prompt_chars = prompt.len(), "sending generation request");
        progress::count(&progress::HTTP_REQUESTS);
        let response = self
            .http
            .post(self.generation_url())
            .bearer_auth(token)
            .header("Accept", "application/json")
            .json(&body)
            .send()
            .await?;
        let reply: GenerationResponse = check_status("watsonx.ai", response).await?.json().await?;
        progress::count(&progress::GENERATIONS);

        let first = reply
            .results
            .into_iter()
            .next()
            .ok_or(ChatError::MalformedResponse {
                service: "watsonx.ai",
                field: "results",
            })?;
        if let Some(reason) = first.stop_reason.as_deref() {
            tracing::debug!(stop_reason = reason, "generation finished");
        }
        Ok(first.generated_text)
    }
}
