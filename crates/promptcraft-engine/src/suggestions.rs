use std::sync::Arc;

use anyhow::Result;
use promptcraft_contracts::hints::{
    keyword_instruction, parse_keyword_list, parse_template_ids, template_selection_instruction,
    PromptTemplate, DEFAULT_IMAGE_KEYWORDS, MAX_TEMPLATE_RECOMMENDATIONS,
};
use promptcraft_contracts::request::{InlineImage, SuggestionRequest, DEFAULT_TEXT_MODEL};
use promptcraft_contracts::results::normalize;
use promptcraft_contracts::suggestions::{
    parse_suggestion_batch, suggestion_instruction, SuggestionBatch,
};
use promptcraft_contracts::wire::{GenerateContentRequest, GenerationConfig, Part};

use crate::backend::BackendConnector;
use crate::credentials::CredentialResolver;

/// What the template recommender should look at.
#[derive(Debug, Clone, PartialEq)]
pub enum HintSubject {
    Text(String),
    Image(InlineImage),
}

/// Optional prompt enrichment. Failures never reach the caller: every
/// operation logs and returns an empty result instead.
pub struct SuggestionGenerator {
    credentials: CredentialResolver,
    connector: Arc<dyn BackendConnector>,
    hint_model: String,
}

impl SuggestionGenerator {
    pub fn new(credentials: CredentialResolver, connector: Arc<dyn BackendConnector>) -> Self {
        Self {
            credentials,
            connector,
            hint_model: DEFAULT_TEXT_MODEL.to_string(),
        }
    }

    pub fn with_hint_model(mut self, model: impl Into<String>) -> Self {
        self.hint_model = model.into();
        self
    }

    pub fn generate_suggestions(&self, request: &SuggestionRequest) -> SuggestionBatch {
        match self.request_batch(request) {
            Ok(batch) => {
                if batch.is_empty() {
                    tracing::warn!(mode = request.mode.as_str(), "suggestion batch was empty or malformed");
                } else if !batch.matches_requested_shape() {
                    tracing::warn!(
                        mode = request.mode.as_str(),
                        categories = batch.len(),
                        "suggestion batch deviates from the requested shape"
                    );
                }
                batch
            }
            Err(err) => {
                tracing::warn!(mode = request.mode.as_str(), "suggestion request failed: {err:#}");
                SuggestionBatch::default()
            }
        }
    }

    /// Up to five style keywords for an image prompt. A blank prompt gets a
    /// fixed starter set without calling the backend.
    pub fn suggest_image_keywords(&self, prompt: &str) -> Vec<String> {
        if prompt.trim().is_empty() {
            return DEFAULT_IMAGE_KEYWORDS.iter().map(|keyword| keyword.to_string()).collect();
        }
        let body = GenerateContentRequest::user(vec![Part::text(keyword_instruction(prompt))], None);
        match self.generate_text(&body) {
            Ok(text) => parse_keyword_list(&text),
            Err(err) => {
                tracing::warn!("keyword suggestion failed: {err:#}");
                Vec::new()
            }
        }
    }

    /// Ids of the templates most relevant to `subject`, best first.
    pub fn suggest_relevant_templates(
        &self,
        subject: &HintSubject,
        templates: &[PromptTemplate],
    ) -> Vec<String> {
        if templates.is_empty() {
            return Vec::new();
        }
        let subject_part = match subject {
            HintSubject::Text(text) => Part::text(text.clone()),
            HintSubject::Image(image) => Part::image(image),
        };
        let body = GenerateContentRequest::user(
            vec![subject_part, Part::text(template_selection_instruction(templates))],
            Some(GenerationConfig::json_output()),
        );
        match self.generate_text(&body) {
            Ok(text) => {
                let mut ids = parse_template_ids(&text, templates);
                ids.truncate(MAX_TEMPLATE_RECOMMENDATIONS);
                ids
            }
            Err(err) => {
                tracing::warn!("template recommendation failed: {err:#}");
                Vec::new()
            }
        }
    }

    fn request_batch(&self, request: &SuggestionRequest) -> Result<SuggestionBatch> {
        let mut parts = request
            .context
            .images
            .iter()
            .map(Part::image)
            .collect::<Vec<Part>>();
        let texts = request
            .context
            .texts
            .iter()
            .filter(|text| !text.trim().is_empty())
            .collect::<Vec<&String>>();
        for (idx, text) in texts.iter().enumerate() {
            parts.push(Part::text(format!("[Input {}]:\n{}", idx + 1, text.trim())));
        }
        parts.push(Part::text(suggestion_instruction(request.mode, &request.context)));

        let body = GenerateContentRequest::user(parts, Some(GenerationConfig::json_output()));
        let backend = self.connector.connect(&self.credentials.resolve())?;
        let response = backend.generate_content(&request.model, &body)?;
        Ok(parse_suggestion_batch(normalize(&response).text_or_empty()))
    }

    fn generate_text(&self, body: &GenerateContentRequest) -> Result<String> {
        let backend = self.connector.connect(&self.credentials.resolve())?;
        let response = backend.generate_content(&self.hint_model, body)?;
        Ok(normalize(&response).text.unwrap_or_default())
    }
}
