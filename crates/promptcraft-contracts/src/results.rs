use serde::Serialize;

use crate::request::{InlineImage, DEFAULT_IMAGE_MIME};
use crate::wire::{GenerateContentResponse, Part, PredictResponse};

/// Normalized output of a synchronous generation.
///
/// Both fields empty is a valid result meaning the model produced nothing;
/// request failures never reach this type.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GenerationResult {
    pub text: Option<String>,
    pub image: Option<InlineImage>,
}

impl GenerationResult {
    pub fn is_empty(&self) -> bool {
        self.text.is_none() && self.image.is_none()
    }

    pub fn text_or_empty(&self) -> &str {
        self.text.as_deref().unwrap_or("")
    }
}

/// What the synchronous invoker hands back: plain text for text kinds,
/// a full result for image-capable kinds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Invocation {
    Text(String),
    Media(GenerationResult),
}

impl Invocation {
    pub fn text(&self) -> &str {
        match self {
            Self::Text(text) => text,
            Self::Media(result) => result.text_or_empty(),
        }
    }

    pub fn into_media(self) -> Option<GenerationResult> {
        match self {
            Self::Media(result) => Some(result),
            Self::Text(_) => None,
        }
    }
}

/// Collapses a `generateContent` response into one text and one image.
///
/// Only the first candidate is read. Text parts are concatenated in order;
/// when several parts carry inline data the last one wins.
pub fn normalize(response: &GenerateContentResponse) -> GenerationResult {
    let parts: &[Part] = response
        .candidates
        .as_deref()
        .and_then(<[_]>::first)
        .and_then(|candidate| candidate.content.as_ref())
        .and_then(|content| content.parts.as_deref())
        .unwrap_or_default();

    let mut text = String::new();
    let mut image = None;
    for part in parts {
        if let Some(chunk) = part.text.as_deref() {
            text.push_str(chunk);
        }
        let Some(blob) = part.inline_data.as_ref() else {
            continue;
        };
        let Some(data) = blob.data.as_deref().filter(|value| !value.is_empty()) else {
            continue;
        };
        image = Some(InlineImage::new(data, mime_or_default(blob.mime_type.as_deref())));
    }

    GenerationResult {
        text: (!text.is_empty()).then_some(text),
        image,
    }
}

/// Maps the image-only `predict` response onto the same result shape.
pub fn normalize_predictions(response: &PredictResponse) -> GenerationResult {
    let image = response
        .predictions
        .as_deref()
        .unwrap_or_default()
        .iter()
        .find_map(|prediction| {
            let data = prediction
                .bytes_base64_encoded
                .as_deref()
                .filter(|value| !value.is_empty())?;
            Some(InlineImage::new(
                data,
                mime_or_default(prediction.mime_type.as_deref()),
            ))
        });
    GenerationResult { text: None, image }
}

fn mime_or_default(mime_type: Option<&str>) -> String {
    mime_type
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .unwrap_or(DEFAULT_IMAGE_MIME)
        .to_string()
}
