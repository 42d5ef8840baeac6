use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::request::SuggestionContext;

pub const SUGGESTION_CATEGORY_COUNT: usize = 8;
pub const SUGGESTION_ITEMS_PER_CATEGORY: usize = 10;

/// Playground the suggestions are generated for. Each mode carries its own
/// fixed list of strategies, one per requested category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuggestionMode {
    Text,
    ImageEdit,
    TextToImage,
    ImageToText,
    ImageToVideo,
}

impl SuggestionMode {
    pub const ALL: [SuggestionMode; 5] = [
        Self::Text,
        Self::ImageEdit,
        Self::TextToImage,
        Self::ImageToText,
        Self::ImageToVideo,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::ImageEdit => "image_edit",
            Self::TextToImage => "text_to_image",
            Self::ImageToText => "image_to_text",
            Self::ImageToVideo => "image_to_video",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        let normalized = raw.trim().to_ascii_lowercase().replace('-', "_");
        Self::ALL
            .into_iter()
            .find(|mode| mode.as_str() == normalized)
    }

    fn playground(self) -> &'static str {
        match self {
            Self::Text => "text rewriting",
            Self::ImageEdit => "image editing",
            Self::TextToImage => "text-to-image generation",
            Self::ImageToText => "image analysis",
            Self::ImageToVideo => "image-to-video animation",
        }
    }

    pub fn strategies(self) -> [&'static str; SUGGESTION_CATEGORY_COUNT] {
        match self {
            Self::Text => [
                "Refine and polish",
                "Creative rewrite",
                "Summarize and condense",
                "Business and professional",
                "Logic and technical analysis",
                "Teach and explain",
                "Translate and localize",
                "Restructure the format",
            ],
            Self::ImageEdit => [
                "Fix and enhance",
                "Filters",
                "Background swap",
                "Add or remove elements",
                "Transformation",
                "Color grade",
                "Recompose",
                "Retouch",
            ],
            Self::TextToImage => [
                "Art styles",
                "Photography",
                "Graphic design",
                "Fantasy worlds",
                "Illustration",
                "Fashion",
                "Architecture and interiors",
                "Cinematic scenes",
            ],
            Self::ImageToText => [
                "Captioning",
                "Text extraction",
                "Format conversion",
                "Object detection and counting",
                "Scene analysis",
                "Style critique",
                "Accessibility description",
                "Chart and data reading",
            ],
            Self::ImageToVideo => [
                "Camera movement",
                "Physics",
                "Atmosphere and weather",
                "Visual effects",
                "Character motion",
                "Time-lapse",
                "Lighting change",
                "Seamless loop",
            ],
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuggestionItem {
    #[serde(default)]
    pub emoji: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, alias = "prompt_text", alias = "promptText")]
    pub prompt: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuggestionCategory {
    #[serde(default, rename = "category", alias = "name")]
    pub name: String,
    #[serde(default)]
    pub items: Vec<SuggestionItem>,
}

/// Categories in display order. Empty when the backend call failed or
/// returned something unparseable.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SuggestionBatch {
    pub categories: Vec<SuggestionCategory>,
}

impl SuggestionBatch {
    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }

    pub fn len(&self) -> usize {
        self.categories.len()
    }

    /// True when the batch has exactly the requested category and item
    /// counts. Deviating batches are still returned to callers as-is.
    pub fn matches_requested_shape(&self) -> bool {
        self.categories.len() == SUGGESTION_CATEGORY_COUNT
            && self
                .categories
                .iter()
                .all(|category| category.items.len() == SUGGESTION_ITEMS_PER_CATEGORY)
    }
}

/// Instruction text for one suggestion batch request.
pub fn suggestion_instruction(mode: SuggestionMode, context: &SuggestionContext) -> String {
    let strategies = mode
        .strategies()
        .iter()
        .enumerate()
        .map(|(idx, strategy)| format!("{}. {strategy}", idx + 1))
        .collect::<Vec<String>>()
        .join("\n");

    let mut out = format!(
        "You are a prompt strategist for a {playground} playground.\n\
         Study the provided input and propose prompts the user could run next.\n\n\
         Return exactly {categories} categories with exactly {items} items in each category.\n\
         Use one category per strategy below, in this order:\n{strategies}\n",
        playground = mode.playground(),
        categories = SUGGESTION_CATEGORY_COUNT,
        items = SUGGESTION_ITEMS_PER_CATEGORY,
    );

    let inputs = context.input_count();
    if inputs > 1 {
        out.push_str(&format!(
            "\nThere are {inputs} inputs. Every suggestion must reason about the relationships \
             between the inputs (compare, contrast, merge, or combine them) instead of treating \
             each input on its own.\n"
        ));
    }

    out.push_str(
        "\nEach item needs one emoji, a short title, a one-sentence description, and a \
         ready-to-run prompt.\n\
         Respond with JSON only, without markdown, shaped as:\n\
         [{\"category\": \"...\", \"items\": [{\"emoji\": \"...\", \"title\": \"...\", \
         \"description\": \"...\", \"prompt\": \"...\"}]}]",
    );
    out
}

/// Parses a suggestion document, degrading to an empty batch when it is not
/// a JSON array. Rows that are not objects are skipped; missing or
/// mistyped fields become empty.
pub fn parse_suggestion_batch(raw: &str) -> SuggestionBatch {
    let body = strip_code_fence(raw);
    let rows = match serde_json::from_str::<Value>(&body) {
        Ok(Value::Array(rows)) => rows,
        Ok(other) => {
            tracing::debug!(kind = json_kind(&other), "suggestion payload is not an array");
            return SuggestionBatch::default();
        }
        Err(err) => {
            tracing::debug!("suggestion payload is not valid JSON: {err}");
            return SuggestionBatch::default();
        }
    };
    let categories = rows
        .iter()
        .filter_map(category_from_value)
        .collect::<Vec<SuggestionCategory>>();
    if categories.len() < rows.len() {
        tracing::debug!(
            skipped = rows.len() - categories.len(),
            "suggestion payload has non-object rows"
        );
    }
    SuggestionBatch { categories }
}

fn category_from_value(value: &Value) -> Option<SuggestionCategory> {
    let row = value.as_object()?;
    let items = row
        .get("items")
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(item_from_value).collect())
        .unwrap_or_default();
    Some(SuggestionCategory {
        name: string_field(row, &["category", "name"]),
        items,
    })
}

fn item_from_value(value: &Value) -> Option<SuggestionItem> {
    let row = value.as_object()?;
    Some(SuggestionItem {
        emoji: string_field(row, &["emoji"]),
        title: string_field(row, &["title"]),
        description: string_field(row, &["description"]),
        prompt: string_field(row, &["prompt", "prompt_text", "promptText"]),
    })
}

fn string_field(row: &Map<String, Value>, keys: &[&str]) -> String {
    keys.iter()
        .find_map(|key| row.get(*key).and_then(Value::as_str))
        .unwrap_or_default()
        .to_string()
}

/// Removes a surrounding markdown code fence (with optional `json` tag).
pub fn strip_code_fence(text: &str) -> String {
    let raw = text.trim();
    if !(raw.starts_with("```") && raw.ends_with("```")) || raw.len() < 6 {
        return raw.to_string();
    }
    let lines: Vec<&str> = raw.lines().collect();
    let body = if lines.len() < 2 {
        raw.trim_start_matches("```").trim_end_matches("```").trim().to_string()
    } else {
        lines[1..lines.len() - 1].join("\n").trim().to_string()
    };
    strip_json_tag(&body).to_string()
}

fn strip_json_tag(body: &str) -> &str {
    match body.get(..4) {
        Some(tag) if tag.eq_ignore_ascii_case("json") => body[4..].trim(),
        _ => body,
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
