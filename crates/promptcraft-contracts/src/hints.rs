//! Lightweight prompt hints: keyword boosters for image prompts and
//! template recommendations. Like suggestion batches, these are optional
//! enrichment, so every parser here degrades to an empty list.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::suggestions::strip_code_fence;

pub const DEFAULT_IMAGE_KEYWORDS: [&str; 4] = ["Cinematic", "8k", "Lighting", "Detailed"];
pub const MAX_IMAGE_KEYWORDS: usize = 5;
pub const MAX_TEMPLATE_RECOMMENDATIONS: usize = 3;

/// A prompt template the recommender may choose from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptTemplate {
    pub id: String,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub prompt: String,
}

pub fn keyword_instruction(prompt: &str) -> String {
    format!(
        "Analyze this image generation prompt: \"{}\".\n\
         Suggest {MAX_IMAGE_KEYWORDS} specific, high-quality, comma-separated keywords or short \
         phrases to improve the visual style, lighting, or detail (e.g. 'Volumetric lighting', \
         'Cyberpunk', '85mm lens', 'Octane render').\n\
         Return ONLY the comma-separated keywords.",
        prompt.trim()
    )
}

pub fn parse_keyword_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|keyword| keyword.trim().trim_matches(|c| c == '"' || c == '\'').trim())
        .filter(|keyword| !keyword.is_empty())
        .take(MAX_IMAGE_KEYWORDS)
        .map(str::to_string)
        .collect()
}

pub fn template_selection_instruction(templates: &[PromptTemplate]) -> String {
    let catalog = serde_json::to_string(templates).unwrap_or_else(|_| "[]".to_string());
    format!(
        "You are a helpful assistant for a prompt engineering playground.\n\
         Analyze the provided content (text or image) and select the \
         {MAX_TEMPLATE_RECOMMENDATIONS} most relevant prompt templates from the following list.\n\
         Return ONLY a JSON array of string IDs (e.g. [\"id1\", \"id2\", \"id3\"]). \
         Do not output markdown or explanations.\n\n\
         Available Prompts:\n{catalog}"
    )
}

/// Parses the recommender's JSON array, keeping only ids present in
/// `templates` so a hallucinated id never reaches the caller.
pub fn parse_template_ids(raw: &str, templates: &[PromptTemplate]) -> Vec<String> {
    let Ok(Value::Array(rows)) = serde_json::from_str::<Value>(&strip_code_fence(raw)) else {
        return Vec::new();
    };
    let mut out: Vec<String> = Vec::new();
    for id in rows.iter().filter_map(Value::as_str).map(str::trim) {
        if out.iter().any(|existing| existing == id) {
            continue;
        }
        if templates.iter().any(|template| template.id == id) {
            out.push(id.to_string());
        }
    }
    out
}
