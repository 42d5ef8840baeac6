use anyhow::Context;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::{Deserialize, Serialize};

use crate::suggestions::SuggestionMode;

pub const DEFAULT_TEXT_MODEL: &str = "gemini-2.5-flash";
pub const DEFAULT_IMAGE_MODEL: &str = "gemini-2.5-flash-image";
pub const DEFAULT_VIDEO_MODEL: &str = "veo-3.1-generate-preview";
pub const DEFAULT_ASPECT_RATIO: &str = "1:1";
pub const DEFAULT_VIDEO_RESOLUTION: &str = "720p";
pub const DEFAULT_TEXT_TEMPERATURE: f32 = 0.7;
pub const DEFAULT_IMAGE_MIME: &str = "image/png";

pub const ASPECT_RATIOS: [&str; 6] = ["1:1", "16:9", "9:16", "4:3", "3:4", "21:9"];

const TEXT_INPUT_SEPARATOR: &str = "\n\n----------------\n\n";

/// Base64 payload plus media type, as carried by `inlineData` parts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InlineImage {
    pub data: String,
    pub mime_type: String,
}

impl InlineImage {
    pub fn new(data: impl Into<String>, mime_type: impl Into<String>) -> Self {
        Self {
            data: data.into(),
            mime_type: mime_type.into(),
        }
    }

    pub fn from_bytes(bytes: &[u8], mime_type: impl Into<String>) -> Self {
        Self::new(BASE64.encode(bytes), mime_type)
    }

    pub fn decode(&self) -> anyhow::Result<Vec<u8>> {
        BASE64
            .decode(self.data.trim().as_bytes())
            .with_context(|| format!("inline {} payload is not valid base64", self.mime_type))
    }

    /// File extension matching the media type, `png` when unknown.
    pub fn extension(&self) -> &'static str {
        let lowered = self.mime_type.to_ascii_lowercase();
        if lowered.contains("jpeg") || lowered.contains("jpg") {
            return "jpg";
        }
        if lowered.contains("webp") {
            return "webp";
        }
        if lowered.contains("gif") {
            return "gif";
        }
        "png"
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    TextEdit,
    ImageEdit,
    ImageGenerate,
    ImageAnalyze,
    VideoGenerate,
    SuggestionBatch,
}

impl RequestKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::TextEdit => "text_edit",
            Self::ImageEdit => "image_edit",
            Self::ImageGenerate => "image_generate",
            Self::ImageAnalyze => "image_analyze",
            Self::VideoGenerate => "video_generate",
            Self::SuggestionBatch => "suggestion_batch",
        }
    }
}

/// One user action's worth of work for the backend.
#[derive(Debug, Clone, PartialEq)]
pub enum GenerationRequest {
    TextEdit(TextEditRequest),
    ImageEdit(ImageEditRequest),
    ImageGenerate(ImageGenerateRequest),
    ImageAnalyze(ImageAnalyzeRequest),
    VideoGenerate(VideoGenerateRequest),
    SuggestionBatch(SuggestionRequest),
}

impl GenerationRequest {
    pub fn kind(&self) -> RequestKind {
        match self {
            Self::TextEdit(_) => RequestKind::TextEdit,
            Self::ImageEdit(_) => RequestKind::ImageEdit,
            Self::ImageGenerate(_) => RequestKind::ImageGenerate,
            Self::ImageAnalyze(_) => RequestKind::ImageAnalyze,
            Self::VideoGenerate(_) => RequestKind::VideoGenerate,
            Self::SuggestionBatch(_) => RequestKind::SuggestionBatch,
        }
    }

    pub fn model(&self) -> &str {
        match self {
            Self::TextEdit(request) => &request.model,
            Self::ImageEdit(request) => &request.model,
            Self::ImageGenerate(request) => &request.model,
            Self::ImageAnalyze(request) => &request.model,
            Self::VideoGenerate(request) => &request.model,
            Self::SuggestionBatch(request) => &request.model,
        }
    }
}

/// Rewrites one or more input texts according to an instruction.
#[derive(Debug, Clone, PartialEq)]
pub struct TextEditRequest {
    pub inputs: Vec<String>,
    pub instruction: String,
    pub model: String,
    pub temperature: f32,
    /// Style label, e.g. "Formal", appended to the instruction.
    pub tone: Option<String>,
}

impl TextEditRequest {
    pub fn new(inputs: Vec<String>, instruction: impl Into<String>) -> Self {
        Self {
            inputs,
            instruction: instruction.into(),
            model: DEFAULT_TEXT_MODEL.to_string(),
            temperature: DEFAULT_TEXT_TEMPERATURE,
            tone: None,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_tone(mut self, tone: impl Into<String>) -> Self {
        self.tone = Some(tone.into());
        self
    }

    /// The single text prompt sent to the model.
    ///
    /// Blank inputs are dropped; several inputs are numbered so the
    /// instruction can refer to them.
    pub fn contents(&self) -> String {
        let inputs = self
            .inputs
            .iter()
            .filter(|text| !text.trim().is_empty())
            .collect::<Vec<&String>>();
        let framed = match inputs.as_slice() {
            [] => String::new(),
            [single] => format!("Original Text:\n\"{single}\""),
            many => many
                .iter()
                .enumerate()
                .map(|(idx, text)| format!("[Text {}]:\n\"{}\"", idx + 1, text))
                .collect::<Vec<String>>()
                .join(TEXT_INPUT_SEPARATOR),
        };

        let mut instruction = self.instruction.clone();
        if let Some(tone) = self
            .tone
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
        {
            instruction.push_str(&format!(
                "\n\n(Use a \"{tone}\" tone or style for this task, keeping to the characteristics of that style.)"
            ));
        }
        format!("{framed}\n\nInstruction:\n{instruction}")
    }
}

/// Edits the attached images according to an instruction.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageEditRequest {
    pub images: Vec<InlineImage>,
    pub instruction: String,
    pub model: String,
    pub aspect_ratio: String,
}

impl ImageEditRequest {
    pub fn new(images: Vec<InlineImage>, instruction: impl Into<String>) -> Self {
        Self {
            images,
            instruction: instruction.into(),
            model: DEFAULT_IMAGE_MODEL.to_string(),
            aspect_ratio: DEFAULT_ASPECT_RATIO.to_string(),
        }
    }
}

/// Prompt-to-image generation.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageGenerateRequest {
    pub prompt: String,
    pub model: String,
    pub aspect_ratio: String,
    pub temperature: Option<f32>,
    pub seed: Option<i64>,
    pub negative_prompt: Option<String>,
}

impl ImageGenerateRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            model: DEFAULT_IMAGE_MODEL.to_string(),
            aspect_ratio: DEFAULT_ASPECT_RATIO.to_string(),
            temperature: None,
            seed: None,
            negative_prompt: None,
        }
    }

    /// Prompt with the negative instruction folded in, since not every
    /// model family accepts a dedicated negative-prompt parameter.
    pub fn final_prompt(&self) -> String {
        match self
            .negative_prompt
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
        {
            Some(negative) => format!(
                "{}\n\n(Negative prompt / Exclude elements: {negative})",
                self.prompt
            ),
            None => self.prompt.clone(),
        }
    }
}

/// Image-to-text analysis.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageAnalyzeRequest {
    pub images: Vec<InlineImage>,
    pub instruction: String,
    pub model: String,
    pub json_output: bool,
}

impl ImageAnalyzeRequest {
    pub fn new(images: Vec<InlineImage>, instruction: impl Into<String>) -> Self {
        Self {
            images,
            instruction: instruction.into(),
            model: DEFAULT_TEXT_MODEL.to_string(),
            json_output: false,
        }
    }
}

/// Image-to-video generation; always a long-running job.
#[derive(Debug, Clone, PartialEq)]
pub struct VideoGenerateRequest {
    pub image: InlineImage,
    pub prompt: String,
    pub model: String,
    pub resolution: String,
}

impl VideoGenerateRequest {
    pub fn new(image: InlineImage, prompt: impl Into<String>) -> Self {
        Self {
            image,
            prompt: prompt.into(),
            model: DEFAULT_VIDEO_MODEL.to_string(),
            resolution: DEFAULT_VIDEO_RESOLUTION.to_string(),
        }
    }
}

/// Inputs the suggestion batch should be tailored to.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SuggestionContext {
    pub texts: Vec<String>,
    pub images: Vec<InlineImage>,
}

impl SuggestionContext {
    pub fn input_count(&self) -> usize {
        self.texts
            .iter()
            .filter(|text| !text.trim().is_empty())
            .count()
            + self.images.len()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SuggestionRequest {
    pub mode: SuggestionMode,
    pub context: SuggestionContext,
    pub model: String,
}

impl SuggestionRequest {
    pub fn new(mode: SuggestionMode, context: SuggestionContext) -> Self {
        Self {
            mode,
            context,
            model: DEFAULT_TEXT_MODEL.to_string(),
        }
    }
}

pub fn is_known_aspect_ratio(value: &str) -> bool {
    ASPECT_RATIOS.contains(&value.trim())
}
