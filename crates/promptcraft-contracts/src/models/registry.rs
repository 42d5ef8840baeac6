use indexmap::IndexMap;

use super::{
    CAPABILITY_EDIT, CAPABILITY_GENERATE_ONLY, CAPABILITY_IMAGE, CAPABILITY_TEXT,
    CAPABILITY_VIDEO, CAPABILITY_VISION,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSpec {
    pub name: String,
    pub label: String,
    pub capabilities: Vec<String>,
}

impl ModelSpec {
    pub fn supports(&self, capability: &str) -> bool {
        self.capabilities.iter().any(|item| item == capability)
    }
}

#[derive(Debug, Clone)]
pub struct ModelRegistry {
    models: IndexMap<String, ModelSpec>,
}

impl Default for ModelRegistry {
    fn default() -> Self {
        Self::new(None)
    }
}

impl ModelRegistry {
    pub fn new(models: Option<IndexMap<String, ModelSpec>>) -> Self {
        Self {
            models: models.unwrap_or_else(default_models),
        }
    }

    pub fn get(&self, name: &str) -> Option<&ModelSpec> {
        self.models.get(normalize_model_name(name))
    }

    pub fn list(&self) -> impl Iterator<Item = &ModelSpec> {
        self.models.values()
    }

    pub fn by_capability(&self, capability: &str) -> Vec<ModelSpec> {
        self.models
            .values()
            .filter(|model| model.supports(capability))
            .cloned()
            .collect()
    }

    pub fn ensure(&self, name: &str, capability: &str) -> Option<ModelSpec> {
        let model = self.get(name)?;
        if model.supports(capability) {
            return Some(model.clone());
        }
        None
    }

    /// Whether `name` belongs to an image family that only supports
    /// prompt-to-image generation through the `predict` operation.
    ///
    /// Unknown names fall back to the `imagen` family prefix so newly
    /// released versions route correctly without a catalog update.
    pub fn is_generate_only(&self, name: &str) -> bool {
        match self.get(name) {
            Some(model) => model.supports(CAPABILITY_GENERATE_ONLY),
            None => normalize_model_name(name)
                .to_ascii_lowercase()
                .starts_with("imagen"),
        }
    }
}

fn normalize_model_name(name: &str) -> &str {
    name.trim().trim_start_matches("models/")
}

fn default_models() -> IndexMap<String, ModelSpec> {
    let mut map = IndexMap::new();

    let mut insert = |name: &str, label: &str, capabilities: &[&str]| {
        map.insert(
            name.to_string(),
            ModelSpec {
                name: name.to_string(),
                label: label.to_string(),
                capabilities: capabilities
                    .iter()
                    .map(|item| (*item).to_string())
                    .collect(),
            },
        );
    };

    insert(
        "gemini-2.5-flash",
        "Gemini 2.5 Flash",
        &[CAPABILITY_TEXT, CAPABILITY_VISION],
    );
    insert(
        "gemini-3-pro-preview",
        "Gemini 3 Pro",
        &[CAPABILITY_TEXT, CAPABILITY_VISION],
    );
    insert(
        "gemini-2.5-flash-image",
        "Gemini 2.5 Flash Image",
        &[CAPABILITY_IMAGE, CAPABILITY_EDIT],
    );
    insert(
        "gemini-3-pro-image-preview",
        "Gemini 3 Pro Image",
        &[CAPABILITY_IMAGE, CAPABILITY_EDIT],
    );
    insert(
        "imagen-3.0-generate-001",
        "Imagen 3",
        &[CAPABILITY_IMAGE, CAPABILITY_GENERATE_ONLY],
    );
    insert(
        "imagen-3.0-fast-generate-001",
        "Imagen 3 Fast",
        &[CAPABILITY_IMAGE, CAPABILITY_GENERATE_ONLY],
    );
    insert(
        "veo-3.1-generate-preview",
        "Veo 3.1",
        &[CAPABILITY_VIDEO],
    );
    insert(
        "veo-3.1-fast-generate-preview",
        "Veo 3.1 Fast",
        &[CAPABILITY_VIDEO],
    );

    map
}
