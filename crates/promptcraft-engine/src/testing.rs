use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use anyhow::{anyhow, Result};
use promptcraft_contracts::wire::{
    GenerateContentRequest, GenerateContentResponse, Operation, PredictRequest, PredictResponse,
};
use serde_json::Value;

use crate::backend::{BackendConnector, GenerativeBackend};
use crate::credentials::{CredentialSelector, CredentialSlot};

#[derive(Debug, Clone)]
pub(crate) enum Call {
    GenerateContent { model: String, body: Value },
    GenerateImages { model: String, body: Value },
    SubmitVideo { model: String, body: Value },
    FetchOperation { name: String, at: Instant },
}

type FetchHook = Box<dyn Fn(usize) + Send + Sync>;

#[derive(Default)]
struct Script {
    content: Mutex<VecDeque<Result<GenerateContentResponse>>>,
    predictions: Mutex<VecDeque<Result<PredictResponse>>>,
    operations: Mutex<VecDeque<Result<Operation>>>,
    calls: Mutex<Vec<Call>>,
    credentials: Mutex<Vec<String>>,
    on_fetch: Mutex<Option<FetchHook>>,
}

/// Connector whose backends replay queued responses and record every call.
#[derive(Clone, Default)]
pub(crate) struct ScriptedConnector {
    script: Arc<Script>,
}

impl ScriptedConnector {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push_content(&self, response: Result<GenerateContentResponse>) {
        lock(&self.script.content).push_back(response);
    }

    pub(crate) fn push_content_json(&self, value: Value) {
        let parsed = serde_json::from_value(value).map_err(anyhow::Error::from);
        self.push_content(parsed);
    }

    pub(crate) fn push_predictions_json(&self, value: Value) {
        let parsed = serde_json::from_value(value).map_err(anyhow::Error::from);
        lock(&self.script.predictions).push_back(parsed);
    }

    /// The first queued operation answers the submission, the rest answer
    /// polls in order.
    pub(crate) fn push_operation_json(&self, value: Value) {
        let parsed = serde_json::from_value(value).map_err(anyhow::Error::from);
        lock(&self.script.operations).push_back(parsed);
    }

    pub(crate) fn push_operation_error(&self, message: &str) {
        lock(&self.script.operations).push_back(Err(anyhow!(message.to_string())));
    }

    /// Runs after each poll with the 1-based poll number.
    pub(crate) fn on_fetch(&self, hook: impl Fn(usize) + Send + Sync + 'static) {
        *lock(&self.script.on_fetch) = Some(Box::new(hook));
    }

    pub(crate) fn calls(&self) -> Vec<Call> {
        lock(&self.script.calls).clone()
    }

    pub(crate) fn fetch_times(&self) -> Vec<Instant> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::FetchOperation { at, .. } => Some(at),
                _ => None,
            })
            .collect()
    }

    pub(crate) fn fetch_count(&self) -> usize {
        self.fetch_times().len()
    }

    pub(crate) fn credentials_seen(&self) -> Vec<String> {
        lock(&self.script.credentials).clone()
    }
}

impl BackendConnector for ScriptedConnector {
    fn connect(&self, credential: &str) -> Result<Box<dyn GenerativeBackend>> {
        lock(&self.script.credentials).push(credential.to_string());
        Ok(Box::new(ScriptedBackend {
            script: self.script.clone(),
        }))
    }
}

struct ScriptedBackend {
    script: Arc<Script>,
}

impl ScriptedBackend {
    fn record(&self, call: Call) -> usize {
        let mut calls = lock(&self.script.calls);
        calls.push(call);
        calls
            .iter()
            .filter(|call| matches!(call, Call::FetchOperation { .. }))
            .count()
    }
}

impl GenerativeBackend for ScriptedBackend {
    fn generate_content(
        &self,
        model: &str,
        request: &GenerateContentRequest,
    ) -> Result<GenerateContentResponse> {
        self.record(Call::GenerateContent {
            model: model.to_string(),
            body: serde_json::to_value(request)?,
        });
        lock(&self.script.content)
            .pop_front()
            .unwrap_or_else(|| Err(anyhow!("no scripted generateContent response")))
    }

    fn generate_images(&self, model: &str, request: &PredictRequest) -> Result<PredictResponse> {
        self.record(Call::GenerateImages {
            model: model.to_string(),
            body: serde_json::to_value(request)?,
        });
        lock(&self.script.predictions)
            .pop_front()
            .unwrap_or_else(|| Err(anyhow!("no scripted predict response")))
    }

    fn submit_video(&self, model: &str, request: &PredictRequest) -> Result<Operation> {
        self.record(Call::SubmitVideo {
            model: model.to_string(),
            body: serde_json::to_value(request)?,
        });
        lock(&self.script.operations)
            .pop_front()
            .unwrap_or_else(|| Err(anyhow!("no scripted submission response")))
    }

    fn fetch_operation(&self, name: &str) -> Result<Operation> {
        let poll = self.record(Call::FetchOperation {
            name: name.to_string(),
            at: Instant::now(),
        });
        let next = lock(&self.script.operations)
            .pop_front()
            .unwrap_or_else(|| Err(anyhow!("no scripted poll response")));
        if let Some(hook) = lock(&self.script.on_fetch).as_ref() {
            hook(poll);
        }
        next
    }
}

/// Selector that reports a fixed selection state and counts prompts.
#[derive(Default)]
pub(crate) struct RecordingSelector {
    pub(crate) selected: bool,
    pub(crate) prompts: Mutex<usize>,
    /// Where a prompt writes the picked key, if anywhere.
    pub(crate) pick: Option<(CredentialSlot, String)>,
}

impl RecordingSelector {
    pub(crate) fn prompt_count(&self) -> usize {
        *lock(&self.prompts)
    }
}

impl CredentialSelector for RecordingSelector {
    fn has_selected_credential(&self) -> bool {
        self.selected
    }

    fn prompt_for_credential(&self) -> Result<()> {
        *lock(&self.prompts) += 1;
        if let Some((slot, key)) = &self.pick {
            slot.set(key.clone());
        }
        Ok(())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}
