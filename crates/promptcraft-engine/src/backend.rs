use std::time::Duration;

use anyhow::{bail, Context, Result};
use promptcraft_contracts::wire::{
    GenerateContentRequest, GenerateContentResponse, Operation, PredictRequest, PredictResponse,
};
use reqwest::blocking::{Client as HttpClient, RequestBuilder, Response as HttpResponse};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::config::EngineConfig;

const BACKEND_LABEL: &str = "Gemini";
const ERROR_BODY_MAX_CHARS: usize = 512;

/// The remote generative service, bound to one credential.
pub trait GenerativeBackend: Send + Sync {
    fn generate_content(
        &self,
        model: &str,
        request: &GenerateContentRequest,
    ) -> Result<GenerateContentResponse>;

    /// Generate-only image models (`:predict`).
    fn generate_images(&self, model: &str, request: &PredictRequest) -> Result<PredictResponse>;

    /// Starts a long-running video operation (`:predictLongRunning`).
    fn submit_video(&self, model: &str, request: &PredictRequest) -> Result<Operation>;

    fn fetch_operation(&self, name: &str) -> Result<Operation>;
}

/// Builds a backend for a freshly resolved credential. Callers connect once
/// per top-level request so a credential change takes effect immediately.
pub trait BackendConnector: Send + Sync {
    fn connect(&self, credential: &str) -> Result<Box<dyn GenerativeBackend>>;
}

#[derive(Debug, Clone)]
pub struct GeminiConnector {
    api_base: String,
    timeout: Duration,
}

impl GeminiConnector {
    pub fn new(api_base: impl Into<String>, timeout: Duration) -> Self {
        Self {
            api_base: api_base.into(),
            timeout,
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.api_base.clone(), config.request_timeout)
    }
}

impl BackendConnector for GeminiConnector {
    fn connect(&self, credential: &str) -> Result<Box<dyn GenerativeBackend>> {
        let backend = GeminiBackend::new(&self.api_base, credential, self.timeout)?;
        Ok(Box::new(backend))
    }
}

pub struct GeminiBackend {
    api_base: String,
    credential: String,
    http: HttpClient,
}

impl GeminiBackend {
    pub fn new(api_base: &str, credential: &str, timeout: Duration) -> Result<Self> {
        let http = HttpClient::builder()
            .timeout(timeout)
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            api_base: api_base.trim().trim_end_matches('/').to_string(),
            credential: credential.trim().to_string(),
            http,
        })
    }

    fn endpoint_for_model(&self, model: &str, method: &str) -> String {
        let trimmed = model.trim();
        let model_path = if trimmed.starts_with("models/") {
            trimmed.to_string()
        } else {
            format!("models/{trimmed}")
        };
        format!("{}/{}:{method}", self.api_base, model_path)
    }

    fn endpoint_for_operation(&self, name: &str) -> String {
        let trimmed = name.trim();
        if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
            return trimmed.to_string();
        }
        format!("{}/{}", self.api_base, trimmed.trim_start_matches('/'))
    }

    // An empty credential is sent as-is so the backend rejects the call
    // with its own error.
    fn authorize(&self, builder: RequestBuilder) -> RequestBuilder {
        if self.credential.is_empty() {
            builder
        } else {
            builder.query(&[("key", self.credential.as_str())])
        }
    }

    fn post_json<B: Serialize, T: DeserializeOwned>(&self, endpoint: &str, body: &B) -> Result<T> {
        let response = self
            .authorize(self.http.post(endpoint))
            .json(body)
            .send()
            .with_context(|| format!("{BACKEND_LABEL} request failed"))?;
        response_json_or_error(BACKEND_LABEL, response)
    }

    fn get_json<T: DeserializeOwned>(&self, endpoint: &str) -> Result<T> {
        let response = self
            .authorize(self.http.get(endpoint))
            .send()
            .with_context(|| format!("{BACKEND_LABEL} poll request failed"))?;
        response_json_or_error(BACKEND_LABEL, response)
    }
}

impl GenerativeBackend for GeminiBackend {
    fn generate_content(
        &self,
        model: &str,
        request: &GenerateContentRequest,
    ) -> Result<GenerateContentResponse> {
        let endpoint = self.endpoint_for_model(model, "generateContent");
        tracing::debug!(model, "posting generateContent");
        self.post_json(&endpoint, request)
    }

    fn generate_images(&self, model: &str, request: &PredictRequest) -> Result<PredictResponse> {
        let endpoint = self.endpoint_for_model(model, "predict");
        tracing::debug!(model, "posting predict");
        self.post_json(&endpoint, request)
    }

    fn submit_video(&self, model: &str, request: &PredictRequest) -> Result<Operation> {
        let endpoint = self.endpoint_for_model(model, "predictLongRunning");
        tracing::debug!(model, "posting predictLongRunning");
        self.post_json(&endpoint, request)
    }

    fn fetch_operation(&self, name: &str) -> Result<Operation> {
        if name.trim().is_empty() {
            bail!("operation name is empty");
        }
        self.get_json(&self.endpoint_for_operation(name))
    }
}

fn response_json_or_error<T: DeserializeOwned>(label: &str, response: HttpResponse) -> Result<T> {
    let status = response.status();
    let body = response
        .text()
        .with_context(|| format!("{label} response body read failed"))?;
    decode_body(label, status.as_u16(), status.is_success(), &body)
}

fn decode_body<T: DeserializeOwned>(label: &str, code: u16, success: bool, body: &str) -> Result<T> {
    if !success {
        bail!(
            "{label} request failed ({code}): {}",
            truncate_text(body.trim(), ERROR_BODY_MAX_CHARS)
        );
    }
    serde_json::from_str(body).with_context(|| format!("{label} returned invalid JSON payload"))
}

pub(crate) fn truncate_text(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    value.chars().take(max_chars).collect::<String>() + "…"
}
