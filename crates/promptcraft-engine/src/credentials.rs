use std::env;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

/// Credential baked in at build time, if the build environment provided one.
pub const BUILD_TIME_CREDENTIAL: Option<&str> = option_env!("PROMPTCRAFT_API_KEY");

/// Runtime environment variables consulted, in order.
pub const CREDENTIAL_ENV_KEYS: [&str; 3] = ["GEMINI_API_KEY", "GOOGLE_API_KEY", "API_KEY"];

/// Shared, host-writable credential chosen through interactive selection.
#[derive(Clone, Default)]
pub struct CredentialSlot {
    inner: Arc<RwLock<Option<String>>>,
}

impl CredentialSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, credential: impl Into<String>) {
        let credential = credential.into().trim().to_string();
        let mut slot = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        *slot = (!credential.is_empty()).then_some(credential);
    }

    pub fn clear(&self) {
        let mut slot = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        *slot = None;
    }

    pub fn get(&self) -> Option<String> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn is_set(&self) -> bool {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }
}

impl fmt::Debug for CredentialSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialSlot")
            .field("set", &self.is_set())
            .finish()
    }
}

#[derive(Clone)]
pub enum CredentialSource {
    Fixed(Option<String>),
    Selected(CredentialSlot),
    Env(Vec<String>),
}

impl CredentialSource {
    fn lookup(&self) -> Option<String> {
        match self {
            Self::Fixed(value) => value
                .as_deref()
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .map(str::to_string),
            Self::Selected(slot) => slot.get(),
            Self::Env(keys) => keys.iter().find_map(|key| non_empty_env(key)),
        }
    }
}

impl fmt::Debug for CredentialSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fixed(value) => write!(f, "Fixed(present={})", value.is_some()),
            Self::Selected(slot) => write!(f, "Selected({slot:?})"),
            Self::Env(keys) => write!(f, "Env({keys:?})"),
        }
    }
}

/// Best-effort credential lookup. Every call re-reads its sources, so a
/// credential selected mid-session is picked up by the next request.
#[derive(Debug, Clone)]
pub struct CredentialResolver {
    sources: Vec<CredentialSource>,
}

impl Default for CredentialResolver {
    fn default() -> Self {
        Self::from_environment(CredentialSlot::default())
    }
}

impl CredentialResolver {
    /// Build-time value, then the interactively selected slot, then the
    /// process environment.
    pub fn from_environment(selected: CredentialSlot) -> Self {
        Self::with_sources(vec![
            CredentialSource::Fixed(BUILD_TIME_CREDENTIAL.map(str::to_string)),
            CredentialSource::Selected(selected),
            CredentialSource::Env(CREDENTIAL_ENV_KEYS.iter().map(|key| key.to_string()).collect()),
        ])
    }

    pub fn with_sources(sources: Vec<CredentialSource>) -> Self {
        Self { sources }
    }

    /// First non-empty credential, or an empty string when none is
    /// configured. Never fails.
    pub fn resolve(&self) -> String {
        self.sources
            .iter()
            .find_map(CredentialSource::lookup)
            .unwrap_or_default()
    }
}

/// Host capability for picking a credential interactively. Only the video
/// path consults it.
pub trait CredentialSelector: Send + Sync {
    fn has_selected_credential(&self) -> bool;
    fn prompt_for_credential(&self) -> anyhow::Result<()>;
}

fn non_empty_env(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sources_are_checked_in_order() {
        let slot = CredentialSlot::new();
        let resolver = CredentialResolver::with_sources(vec![
            CredentialSource::Fixed(None),
            CredentialSource::Selected(slot.clone()),
            CredentialSource::Fixed(Some("fallback-key".to_string())),
        ]);
        assert_eq!(resolver.resolve(), "fallback-key");

        slot.set("selected-key");
        assert_eq!(resolver.resolve(), "selected-key");

        let fixed_first = CredentialResolver::with_sources(vec![
            CredentialSource::Fixed(Some(" build-key ".to_string())),
            CredentialSource::Selected(slot),
        ]);
        assert_eq!(fixed_first.resolve(), "build-key");
    }

    #[test]
    fn missing_credentials_resolve_to_empty_string() {
        let resolver = CredentialResolver::with_sources(vec![
            CredentialSource::Fixed(Some("   ".to_string())),
            CredentialSource::Selected(CredentialSlot::new()),
            CredentialSource::Env(vec!["PROMPTCRAFT_TEST_KEY_THAT_IS_NEVER_SET".to_string()]),
        ]);
        assert_eq!(resolver.resolve(), "");
    }

    #[test]
    fn slot_ignores_blank_values_and_redacts_debug_output() {
        let slot = CredentialSlot::new();
        slot.set("  ");
        assert!(!slot.is_set());

        slot.set("secret-value");
        assert!(slot.is_set());
        let rendered = format!("{:?}", CredentialSource::Selected(slot.clone()));
        assert!(!rendered.contains("secret-value"));

        slot.clear();
        assert_eq!(slot.get(), None);
    }
}
