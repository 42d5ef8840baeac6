use std::sync::Arc;

use anyhow::{bail, Result};
use promptcraft_contracts::models::ModelRegistry;
use promptcraft_contracts::request::{
    GenerationRequest, ImageAnalyzeRequest, ImageEditRequest, ImageGenerateRequest,
    TextEditRequest,
};
use promptcraft_contracts::results::{normalize, normalize_predictions, GenerationResult, Invocation};
use promptcraft_contracts::wire::{
    GenerateContentRequest, GenerationConfig, ImageConfig, Part, PredictInstance,
    PredictParameters, PredictRequest,
};

use crate::backend::{BackendConnector, GenerativeBackend};
use crate::credentials::CredentialResolver;

/// Performs one request/response generation per call. Backend errors are
/// returned to the caller as-is.
pub struct SyncInvoker {
    credentials: CredentialResolver,
    connector: Arc<dyn BackendConnector>,
    registry: ModelRegistry,
}

impl SyncInvoker {
    pub fn new(credentials: CredentialResolver, connector: Arc<dyn BackendConnector>) -> Self {
        Self {
            credentials,
            connector,
            registry: ModelRegistry::default(),
        }
    }

    pub fn with_registry(mut self, registry: ModelRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn invoke(&self, request: &GenerationRequest) -> Result<Invocation> {
        tracing::debug!(kind = request.kind().as_str(), model = request.model(), "invoking");
        match request {
            GenerationRequest::TextEdit(request) => self.edit_text(request).map(Invocation::Text),
            GenerationRequest::ImageAnalyze(request) => {
                self.analyze_images(request).map(Invocation::Text)
            }
            GenerationRequest::ImageEdit(request) => self.edit_image(request).map(Invocation::Media),
            GenerationRequest::ImageGenerate(request) => {
                self.generate_image(request).map(Invocation::Media)
            }
            GenerationRequest::VideoGenerate(_) => {
                bail!("video generation runs as a long-running job, not a synchronous invocation")
            }
            GenerationRequest::SuggestionBatch(_) => {
                bail!("suggestion batches are produced by the suggestion generator")
            }
        }
    }

    /// Concatenated response text; empty when the model returned none.
    pub fn edit_text(&self, request: &TextEditRequest) -> Result<String> {
        let body = GenerateContentRequest::user(
            vec![Part::text(request.contents())],
            Some(GenerationConfig {
                temperature: Some(request.temperature),
                ..GenerationConfig::default()
            }),
        );
        let response = self.backend()?.generate_content(&request.model, &body)?;
        Ok(normalize(&response).text.unwrap_or_default())
    }

    pub fn edit_image(&self, request: &ImageEditRequest) -> Result<GenerationResult> {
        let mut parts = request.images.iter().map(Part::image).collect::<Vec<Part>>();
        parts.push(Part::text(request.instruction.trim()));
        let body = GenerateContentRequest::user(
            parts,
            Some(GenerationConfig {
                image_config: Some(ImageConfig {
                    aspect_ratio: request.aspect_ratio.clone(),
                }),
                ..GenerationConfig::default()
            }),
        );
        let response = self.backend()?.generate_content(&request.model, &body)?;
        Ok(normalize(&response))
    }

    /// Routes generate-only models to the image prediction endpoint and
    /// everything else through `generateContent`.
    pub fn generate_image(&self, request: &ImageGenerateRequest) -> Result<GenerationResult> {
        let prompt = request.final_prompt();
        let backend = self.backend()?;
        if self.registry.is_generate_only(&request.model) {
            let body = PredictRequest {
                instances: vec![PredictInstance {
                    prompt,
                    image: None,
                }],
                parameters: PredictParameters {
                    sample_count: 1,
                    aspect_ratio: Some(request.aspect_ratio.clone()),
                    resolution: None,
                },
            };
            let response = backend.generate_images(&request.model, &body)?;
            return Ok(normalize_predictions(&response));
        }

        let body = GenerateContentRequest::user(
            vec![Part::text(prompt)],
            Some(GenerationConfig {
                temperature: request.temperature,
                seed: request.seed,
                image_config: Some(ImageConfig {
                    aspect_ratio: request.aspect_ratio.clone(),
                }),
                ..GenerationConfig::default()
            }),
        );
        let response = backend.generate_content(&request.model, &body)?;
        Ok(normalize(&response))
    }

    pub fn analyze_images(&self, request: &ImageAnalyzeRequest) -> Result<String> {
        let mut parts = request.images.iter().map(Part::image).collect::<Vec<Part>>();
        parts.push(Part::text(request.instruction.trim()));
        let config = request.json_output.then(GenerationConfig::json_output);
        let body = GenerateContentRequest::user(parts, config);
        let response = self.backend()?.generate_content(&request.model, &body)?;
        Ok(normalize(&response).text.unwrap_or_default())
    }

    fn backend(&self) -> Result<Box<dyn GenerativeBackend>> {
        self.connector.connect(&self.credentials.resolve())
    }
}
