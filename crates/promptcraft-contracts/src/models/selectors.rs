use anyhow::bail;

use super::registry::{ModelRegistry, ModelSpec};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSelection {
    pub model: ModelSpec,
    pub requested: Option<String>,
    pub fallback_reason: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ModelSelector {
    pub registry: ModelRegistry,
}

impl ModelSelector {
    pub fn new(registry: Option<ModelRegistry>) -> Self {
        Self {
            registry: registry.unwrap_or_default(),
        }
    }

    /// Picks the requested model when it supports `capability`, otherwise
    /// the first catalog entry that does.
    ///
    /// Requested names missing from the catalog are passed through untouched
    /// when `allow_unlisted` is set, so new backend model ids work without a
    /// catalog update.
    pub fn select(
        &self,
        requested: Option<&str>,
        capability: &str,
        allow_unlisted: bool,
    ) -> anyhow::Result<ModelSelection> {
        let requested = requested.map(str::trim).filter(|value| !value.is_empty());
        let fallback_reason = match requested {
            Some(name) => {
                if let Some(model) = self.registry.ensure(name, capability) {
                    return Ok(ModelSelection {
                        model,
                        requested: Some(name.to_string()),
                        fallback_reason: None,
                    });
                }
                if allow_unlisted && self.registry.get(name).is_none() {
                    return Ok(ModelSelection {
                        model: ModelSpec {
                            name: name.to_string(),
                            label: name.to_string(),
                            capabilities: vec![capability.to_string()],
                        },
                        requested: Some(name.to_string()),
                        fallback_reason: None,
                    });
                }
                format!("Requested model '{name}' unavailable for capability '{capability}'.")
            }
            None => "No model specified; using default.".to_string(),
        };

        let Some(model) = self.registry.by_capability(capability).into_iter().next() else {
            bail!("No models available for capability '{capability}'.");
        };
        Ok(ModelSelection {
            model,
            requested: requested.map(str::to_string),
            fallback_reason: Some(fallback_reason),
        })
    }
}
