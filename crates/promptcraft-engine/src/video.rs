//! Image-to-video generation as a long-running job.
//!
//! A job is submitted once, then polled at a fixed interval until the
//! backend marks it done. Cancellation is cooperative: the token is checked
//! before every network call and interrupts the wait between polls, but a
//! request already in flight is allowed to finish. Nothing is sent to the
//! backend to abort the remote operation.

use std::fmt;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use promptcraft_contracts::events::{EventPayload, EventWriter};
use promptcraft_contracts::jobs::JobHandle;
use promptcraft_contracts::request::VideoGenerateRequest;
use promptcraft_contracts::wire::{PredictInstance, PredictParameters, PredictRequest};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use url::{form_urlencoded, Url};

use crate::backend::BackendConnector;
use crate::config::{EngineConfig, DEFAULT_POLL_INTERVAL};
use crate::credentials::{CredentialResolver, CredentialSelector};

pub const CANCELLED_MARKER: &str = "video generation cancelled by user";
pub const EMPTY_OUTPUT_MESSAGE: &str = "operation completed without producing output";
const MISSING_CREDENTIAL_MESSAGE: &str = "no API credential available for video generation";

#[derive(Debug, Default)]
struct CancelState {
    cancelled: Mutex<bool>,
    signal: Condvar,
}

/// Cancellation signal shared between a running job and whoever may stop
/// it. Clones observe the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    state: Arc<CancelState>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        *self.flag() = true;
        self.state.signal.notify_all();
    }

    pub fn is_cancelled(&self) -> bool {
        *self.flag()
    }

    /// Sleeps for `timeout` unless cancelled first. Returns whether the
    /// token is cancelled.
    pub fn wait(&self, timeout: Duration) -> bool {
        let guard = self.flag();
        let (guard, _) = self
            .state
            .signal
            .wait_timeout_while(guard, timeout, |cancelled| !*cancelled)
            .unwrap_or_else(PoisonError::into_inner);
        *guard
    }

    fn flag(&self) -> MutexGuard<'_, bool> {
        self.state
            .cancelled
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VideoJobErrorKind {
    Cancelled,
    EmptyOutput,
    TimedOut,
    Failed,
}

impl VideoJobErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Cancelled => "cancelled",
            Self::EmptyOutput => "empty_output",
            Self::TimedOut => "timed_out",
            Self::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone)]
pub struct VideoJobError {
    pub kind: VideoJobErrorKind,
    pub message: String,
}

impl VideoJobError {
    fn new(kind: VideoJobErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    fn cancelled() -> Self {
        Self::new(VideoJobErrorKind::Cancelled, CANCELLED_MARKER)
    }

    fn timed_out(max_wait: Duration) -> Self {
        Self::new(
            VideoJobErrorKind::TimedOut,
            format!(
                "video generation did not finish within {:.1}s",
                max_wait.as_secs_f64()
            ),
        )
    }

    fn failed(message: impl Into<String>) -> Self {
        Self::new(VideoJobErrorKind::Failed, message)
    }

    fn from_anyhow(err: anyhow::Error) -> Self {
        Self::failed(format!("{err:#}"))
    }

    pub fn is_cancelled(&self) -> bool {
        self.kind == VideoJobErrorKind::Cancelled
    }
}

impl fmt::Display for VideoJobError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for VideoJobError {}

/// True when `err` is, or wraps, a user cancellation.
pub fn is_cancellation(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        cause
            .downcast_ref::<VideoJobError>()
            .map(VideoJobError::is_cancelled)
            .unwrap_or(false)
    }) || err.to_string().contains(CANCELLED_MARKER)
}

pub struct VideoJobOrchestrator {
    credentials: CredentialResolver,
    connector: Arc<dyn BackendConnector>,
    selector: Option<Arc<dyn CredentialSelector>>,
    poll_interval: Duration,
    max_wait: Option<Duration>,
    events: Option<EventWriter>,
}

impl VideoJobOrchestrator {
    pub fn new(credentials: CredentialResolver, connector: Arc<dyn BackendConnector>) -> Self {
        Self {
            credentials,
            connector,
            selector: None,
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_wait: None,
            events: None,
        }
    }

    pub fn from_config(
        config: &EngineConfig,
        credentials: CredentialResolver,
        connector: Arc<dyn BackendConnector>,
    ) -> Self {
        Self::new(credentials, connector)
            .with_poll_interval(config.poll_interval)
            .with_max_wait(config.max_wait)
    }

    pub fn with_selector(mut self, selector: Arc<dyn CredentialSelector>) -> Self {
        self.selector = Some(selector);
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_max_wait(mut self, max_wait: Option<Duration>) -> Self {
        self.max_wait = max_wait;
        self
    }

    pub fn with_events(mut self, events: EventWriter) -> Self {
        self.events = Some(events);
        self
    }

    /// Runs the job to completion and returns a downloadable video URI
    /// carrying the credential.
    ///
    /// `on_progress` receives the backend's status after each poll that
    /// reports metadata. It is never called after a terminal outcome.
    pub fn run(
        &self,
        request: &VideoGenerateRequest,
        token: &CancellationToken,
        mut on_progress: impl FnMut(&str),
    ) -> Result<String, VideoJobError> {
        let request_hash = request_fingerprint(request);
        let started = Instant::now();
        let mut polls = 0usize;
        let outcome = self.drive(request, token, &request_hash, &mut polls, &mut on_progress);

        let elapsed_s = started.elapsed().as_secs_f64();
        match &outcome {
            Ok(_) => {
                tracing::info!(model = %request.model, polls, elapsed_s, "video job completed");
                self.record(
                    "video_job_completed",
                    &request_hash,
                    json!({"polls": polls, "elapsed_s": elapsed_s}),
                );
            }
            Err(err) if err.is_cancelled() => {
                tracing::info!(model = %request.model, polls, "video job cancelled");
                self.record("video_job_cancelled", &request_hash, json!({"polls": polls}));
            }
            Err(err) => {
                tracing::warn!(model = %request.model, polls, kind = err.kind.as_str(), "video job failed: {err}");
                self.record(
                    "video_job_failed",
                    &request_hash,
                    json!({"polls": polls, "kind": err.kind.as_str(), "error": err.message}),
                );
            }
        }
        outcome
    }

    fn drive(
        &self,
        request: &VideoGenerateRequest,
        token: &CancellationToken,
        request_hash: &str,
        polls: &mut usize,
        on_progress: &mut dyn FnMut(&str),
    ) -> Result<String, VideoJobError> {
        if let Some(selector) = self.selector.as_deref() {
            if !selector.has_selected_credential() {
                tracing::info!("no credential selected; asking the host to pick one");
                selector
                    .prompt_for_credential()
                    .map_err(VideoJobError::from_anyhow)?;
            }
        }
        if token.is_cancelled() {
            return Err(VideoJobError::cancelled());
        }

        let credential = self.credentials.resolve();
        if credential.is_empty() {
            return Err(VideoJobError::failed(MISSING_CREDENTIAL_MESSAGE));
        }
        let backend = self
            .connector
            .connect(&credential)
            .map_err(VideoJobError::from_anyhow)?;

        let mut handle: JobHandle = backend
            .submit_video(&request.model, &video_predict_request(request))
            .map_err(VideoJobError::from_anyhow)?
            .into();
        tracing::info!(model = %request.model, operation = %handle.name, "video job submitted");
        self.record(
            "video_job_submitted",
            request_hash,
            json!({"model": request.model, "operation": handle.name, "done": handle.done}),
        );
        if !handle.done && handle.name.trim().is_empty() {
            return Err(VideoJobError::failed(
                "backend accepted the video job without an operation name",
            ));
        }

        let polling_started = Instant::now();
        while !handle.done {
            if token.is_cancelled() {
                return Err(VideoJobError::cancelled());
            }
            let mut wait = self.poll_interval;
            let mut deadline = None;
            if let Some(max_wait) = self.max_wait {
                let remaining = max_wait.saturating_sub(polling_started.elapsed());
                if remaining.is_zero() {
                    return Err(VideoJobError::timed_out(max_wait));
                }
                if remaining <= wait {
                    wait = remaining;
                    deadline = Some(max_wait);
                }
            }
            if token.wait(wait) {
                return Err(VideoJobError::cancelled());
            }
            if let Some(max_wait) = deadline {
                return Err(VideoJobError::timed_out(max_wait));
            }

            let name = handle.name.clone();
            handle = backend
                .fetch_operation(&name)
                .map_err(VideoJobError::from_anyhow)?
                .into();
            if handle.name.trim().is_empty() {
                handle.name = name;
            }
            *polls += 1;

            if let Some(status) = handle.status.as_deref() {
                tracing::debug!(poll = *polls, status, "video job progress");
                on_progress(status);
                self.record(
                    "video_job_progress",
                    request_hash,
                    json!({"poll": *polls, "status": status}),
                );
            }
        }

        if let Some(error) = handle.error.as_deref() {
            return Err(VideoJobError::failed(format!("video generation failed: {error}")));
        }
        let Some(uri) = handle.video_uri.as_deref() else {
            return Err(VideoJobError::new(
                VideoJobErrorKind::EmptyOutput,
                EMPTY_OUTPUT_MESSAGE,
            ));
        };
        Ok(append_credential(uri, &credential))
    }

    fn record(&self, event_type: &str, request_hash: &str, payload: Value) {
        let Some(events) = self.events.as_ref() else {
            return;
        };
        let mut payload: EventPayload = payload.as_object().cloned().unwrap_or_default();
        payload.insert("request_hash".to_string(), Value::String(request_hash.to_string()));
        events.record(event_type, payload);
    }
}

fn video_predict_request(request: &VideoGenerateRequest) -> PredictRequest {
    PredictRequest {
        instances: vec![PredictInstance {
            prompt: request.prompt.clone(),
            image: Some((&request.image).into()),
        }],
        parameters: PredictParameters {
            sample_count: 1,
            aspect_ratio: None,
            resolution: Some(request.resolution.clone()),
        },
    }
}

/// Adds the `key` query parameter the asset host requires for download.
pub fn append_credential(uri: &str, credential: &str) -> String {
    match Url::parse(uri) {
        Ok(mut url) => {
            url.query_pairs_mut().append_pair("key", credential);
            url.to_string()
        }
        Err(_) => {
            let separator = if uri.contains('?') { '&' } else { '?' };
            let encoded = form_urlencoded::byte_serialize(credential.as_bytes()).collect::<String>();
            format!("{uri}{separator}key={encoded}")
        }
    }
}

fn request_fingerprint(request: &VideoGenerateRequest) -> String {
    let payload = json!({
        "model": request.model,
        "prompt": request.prompt,
        "resolution": request.resolution,
        "image_mime": request.image.mime_type,
        "image": request.image.data,
    });
    let bytes = serde_json::to_vec(&payload).unwrap_or_default();
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(&hasher.finalize()[..8])
}

#[cfg(test)]
mod tests {
    use std::thread;

    use promptcraft_contracts::request::InlineImage;
    use serde_json::json;

    use super::*;
    use crate::credentials::{CredentialSlot, CredentialSource};
    use crate::testing::{Call, RecordingSelector, ScriptedConnector};

    const FAST_POLL: Duration = Duration::from_millis(20);

    fn request() -> VideoGenerateRequest {
        VideoGenerateRequest::new(InlineImage::new("aW1n", "image/png"), "slow dolly zoom")
    }

    fn orchestrator(connector: &ScriptedConnector, credential: &str) -> VideoJobOrchestrator {
        let credentials = CredentialResolver::with_sources(vec![CredentialSource::Fixed(Some(
            credential.to_string(),
        ))]);
        VideoJobOrchestrator::new(credentials, Arc::new(connector.clone()))
            .with_poll_interval(FAST_POLL)
    }

    fn pending(state: Option<&str>) -> Value {
        match state {
            Some(state) => json!({"name": "models/veo/operations/7", "done": false, "metadata": {"state": state}}),
            None => json!({"name": "models/veo/operations/7", "done": false}),
        }
    }

    fn finished(uri: &str) -> Value {
        json!({
            "name": "models/veo/operations/7",
            "done": true,
            "metadata": {"state": "SUCCEEDED"},
            "response": {"generateVideoResponse": {"generatedSamples": [{"video": {"uri": uri}}]}},
        })
    }

    #[test]
    fn completes_after_polling_and_reports_progress() -> anyhow::Result<()> {
        let connector = ScriptedConnector::new();
        connector.push_operation_json(pending(None));
        connector.push_operation_json(pending(Some("RUNNING")));
        connector.push_operation_json(finished("https://media.example/video.mp4?alt=media"));

        let mut progress = Vec::new();
        let uri = orchestrator(&connector, "test-key").run(
            &request(),
            &CancellationToken::new(),
            |status| progress.push(status.to_string()),
        )?;

        assert!(uri.contains("alt=media"));
        assert!(uri.contains("key=test-key"));
        assert_eq!(progress, vec!["RUNNING", "SUCCEEDED"]);
        assert_eq!(connector.fetch_count(), 2);
        Ok(())
    }

    #[test]
    fn submission_carries_image_prompt_and_resolution() -> anyhow::Result<()> {
        let connector = ScriptedConnector::new();
        connector.push_operation_json(finished("https://media.example/v.mp4"));
        orchestrator(&connector, "test-key").run(&request(), &CancellationToken::new(), |_| {})?;

        let calls = connector.calls();
        let Call::SubmitVideo { model, body } = &calls[0] else {
            panic!("expected a submission first: {calls:?}");
        };
        assert_eq!(model, "veo-3.1-generate-preview");
        assert_eq!(body["instances"][0]["prompt"], "slow dolly zoom");
        assert_eq!(body["instances"][0]["image"]["bytesBase64Encoded"], "aW1n");
        assert_eq!(body["parameters"]["resolution"], "720p");
        assert_eq!(connector.fetch_count(), 0);
        Ok(())
    }

    #[test]
    fn polls_are_spaced_by_the_interval() -> anyhow::Result<()> {
        let connector = ScriptedConnector::new();
        connector.push_operation_json(pending(None));
        connector.push_operation_json(pending(Some("RUNNING")));
        connector.push_operation_json(pending(Some("RUNNING")));
        connector.push_operation_json(finished("https://media.example/v.mp4"));

        let submitted = Instant::now();
        orchestrator(&connector, "test-key").run(&request(), &CancellationToken::new(), |_| {})?;

        let times = connector.fetch_times();
        assert_eq!(times.len(), 3);
        assert!(times[0].duration_since(submitted) >= FAST_POLL);
        for pair in times.windows(2) {
            assert!(pair[1].duration_since(pair[0]) >= FAST_POLL);
        }
        Ok(())
    }

    #[test]
    fn cancellation_after_a_poll_stops_before_the_next_fetch() {
        let connector = ScriptedConnector::new();
        connector.push_operation_json(pending(None));
        connector.push_operation_json(pending(Some("RUNNING")));
        connector.push_operation_json(pending(Some("RUNNING")));
        connector.push_operation_json(finished("https://media.example/v.mp4"));

        let token = CancellationToken::new();
        let hook_token = token.clone();
        connector.on_fetch(move |poll| {
            if poll == 2 {
                hook_token.cancel();
            }
        });

        let mut progress = Vec::new();
        let err = orchestrator(&connector, "test-key")
            .run(&request(), &token, |status| progress.push(status.to_string()))
            .err();
        assert_eq!(err.map(|err| err.kind), Some(VideoJobErrorKind::Cancelled));
        assert_eq!(connector.fetch_count(), 2);
        assert_eq!(progress.len(), 2);
    }

    #[test]
    fn cancellation_during_the_wait_ends_the_job_early() {
        let connector = ScriptedConnector::new();
        connector.push_operation_json(pending(None));
        connector.push_operation_json(pending(Some("RUNNING")));
        connector.push_operation_json(finished("https://media.example/v.mp4"));

        let token = CancellationToken::new();
        let hook_token = token.clone();
        connector.on_fetch(move |poll| {
            if poll == 1 {
                let token = hook_token.clone();
                thread::spawn(move || {
                    thread::sleep(Duration::from_millis(50));
                    token.cancel();
                });
            }
        });

        let started = Instant::now();
        let err = orchestrator(&connector, "test-key")
            .with_poll_interval(Duration::from_millis(400))
            .run(&request(), &token, |_| {})
            .err();

        assert_eq!(err.as_ref().map(|err| err.kind), Some(VideoJobErrorKind::Cancelled));
        assert_eq!(
            err.map(|err| err.to_string()).as_deref(),
            Some(CANCELLED_MARKER)
        );
        assert_eq!(connector.fetch_count(), 1);
        // One full interval before the first poll, then an interrupted wait.
        assert!(started.elapsed() < Duration::from_millis(750));
    }

    #[test]
    fn cancelled_before_submission_makes_no_calls() {
        let connector = ScriptedConnector::new();
        let token = CancellationToken::new();
        token.cancel();
        let err = orchestrator(&connector, "test-key")
            .run(&request(), &token, |_| {})
            .err();
        assert!(err.map(|err| err.is_cancelled()).unwrap_or(false));
        assert!(connector.calls().is_empty());
    }

    #[test]
    fn finished_without_video_is_empty_output() {
        let connector = ScriptedConnector::new();
        connector.push_operation_json(pending(None));
        connector.push_operation_json(json!({"name": "models/veo/operations/7", "done": true, "response": {}}));

        let err = orchestrator(&connector, "test-key")
            .run(&request(), &CancellationToken::new(), |_| {})
            .err();
        assert_eq!(err.map(|err| err.kind), Some(VideoJobErrorKind::EmptyOutput));
    }

    #[test]
    fn remote_operation_error_fails_the_job() {
        let connector = ScriptedConnector::new();
        connector.push_operation_json(json!({
            "name": "models/veo/operations/7",
            "done": true,
            "error": {"code": 3, "message": "prompt blocked"},
        }));
        let err = orchestrator(&connector, "test-key")
            .run(&request(), &CancellationToken::new(), |_| {})
            .err();
        let err = err.map(|err| (err.kind, err.message));
        assert_eq!(
            err,
            Some((
                VideoJobErrorKind::Failed,
                "video generation failed: prompt blocked (code 3)".to_string()
            ))
        );
    }

    #[test]
    fn poll_transport_error_fails_the_job() {
        let connector = ScriptedConnector::new();
        connector.push_operation_json(pending(None));
        connector.push_operation_error("Gemini poll request failed");
        let err = orchestrator(&connector, "test-key")
            .run(&request(), &CancellationToken::new(), |_| {})
            .err();
        assert_eq!(err.as_ref().map(|err| err.kind), Some(VideoJobErrorKind::Failed));
        assert!(err
            .map(|err| err.message.contains("Gemini poll request failed"))
            .unwrap_or(false));
    }

    #[test]
    fn missing_credential_fails_before_submission() {
        let connector = ScriptedConnector::new();
        let err = orchestrator(&connector, "")
            .run(&request(), &CancellationToken::new(), |_| {})
            .err();
        assert_eq!(err.map(|err| err.kind), Some(VideoJobErrorKind::Failed));
        assert!(connector.credentials_seen().is_empty());
    }

    #[test]
    fn max_wait_bounds_the_polling_phase() {
        let connector = ScriptedConnector::new();
        connector.push_operation_json(pending(None));
        for _ in 0..10 {
            connector.push_operation_json(pending(Some("RUNNING")));
        }
        let err = orchestrator(&connector, "test-key")
            .with_max_wait(Some(Duration::from_millis(50)))
            .run(&request(), &CancellationToken::new(), |_| {})
            .err();
        assert_eq!(err.map(|err| err.kind), Some(VideoJobErrorKind::TimedOut));
        assert!(connector.fetch_count() < 10);
    }

    #[test]
    fn max_wait_shorter_than_the_interval_ends_at_the_deadline() {
        let connector = ScriptedConnector::new();
        connector.push_operation_json(pending(None));
        let started = Instant::now();
        let err = orchestrator(&connector, "test-key")
            .with_poll_interval(Duration::from_millis(500))
            .with_max_wait(Some(Duration::from_millis(60)))
            .run(&request(), &CancellationToken::new(), |_| {})
            .err();
        assert_eq!(err.map(|err| err.kind), Some(VideoJobErrorKind::TimedOut));
        assert_eq!(connector.fetch_count(), 0);
        assert!(started.elapsed() < Duration::from_millis(400));
    }

    #[test]
    fn selector_is_prompted_only_without_a_selection() -> anyhow::Result<()> {
        let connector = ScriptedConnector::new();
        connector.push_operation_json(finished("https://media.example/a.mp4"));
        connector.push_operation_json(finished("https://media.example/b.mp4"));

        let unselected = Arc::new(RecordingSelector::default());
        orchestrator(&connector, "test-key")
            .with_selector(unselected.clone())
            .run(&request(), &CancellationToken::new(), |_| {})?;
        assert_eq!(unselected.prompt_count(), 1);

        let selected = Arc::new(RecordingSelector {
            selected: true,
            ..RecordingSelector::default()
        });
        orchestrator(&connector, "test-key")
            .with_selector(selected.clone())
            .run(&request(), &CancellationToken::new(), |_| {})?;
        assert_eq!(selected.prompt_count(), 0);
        Ok(())
    }

    #[test]
    fn credential_chosen_during_selection_reaches_the_backend() -> anyhow::Result<()> {
        let connector = ScriptedConnector::new();
        connector.push_operation_json(finished("https://media.example/v.mp4"));
        let slot = CredentialSlot::new();
        let selector = Arc::new(RecordingSelector {
            pick: Some((slot.clone(), "picked-key".to_string())),
            ..RecordingSelector::default()
        });

        let uri = VideoJobOrchestrator::new(
            CredentialResolver::with_sources(vec![CredentialSource::Selected(slot)]),
            Arc::new(connector.clone()),
        )
        .with_selector(selector.clone())
        .run(&request(), &CancellationToken::new(), |_| {})?;

        assert_eq!(selector.prompt_count(), 1);
        assert_eq!(connector.credentials_seen(), vec!["picked-key"]);
        assert!(uri.ends_with("key=picked-key"));
        Ok(())
    }

    #[test]
    fn credential_is_read_fresh_for_each_job() -> anyhow::Result<()> {
        let connector = ScriptedConnector::new();
        connector.push_operation_json(finished("https://media.example/a.mp4"));
        connector.push_operation_json(finished("https://media.example/b.mp4"));
        let slot = CredentialSlot::new();
        let orchestrator = VideoJobOrchestrator::new(
            CredentialResolver::with_sources(vec![CredentialSource::Selected(slot.clone())]),
            Arc::new(connector.clone()),
        );

        slot.set("key-one");
        let first = orchestrator.run(&request(), &CancellationToken::new(), |_| {})?;
        slot.set("key-two");
        let second = orchestrator.run(&request(), &CancellationToken::new(), |_| {})?;

        assert!(first.ends_with("key=key-one"));
        assert!(second.ends_with("key=key-two"));
        assert_eq!(connector.credentials_seen(), vec!["key-one", "key-two"]);
        Ok(())
    }

    #[test]
    fn job_lifecycle_is_written_to_the_event_log() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let events_path = temp.path().join("events.jsonl");
        let connector = ScriptedConnector::new();
        connector.push_operation_json(pending(None));
        connector.push_operation_json(finished("https://media.example/v.mp4"));

        orchestrator(&connector, "secret-key")
            .with_events(EventWriter::new(&events_path, "session-1"))
            .run(&request(), &CancellationToken::new(), |_| {})?;

        let raw = std::fs::read_to_string(&events_path)?;
        assert!(!raw.contains("secret-key"));
        let types = raw
            .lines()
            .map(serde_json::from_str::<Value>)
            .collect::<Result<Vec<Value>, _>>()?
            .into_iter()
            .map(|row| row["type"].as_str().unwrap_or_default().to_string())
            .collect::<Vec<String>>();
        assert_eq!(
            types,
            vec!["video_job_submitted", "video_job_progress", "video_job_completed"]
        );
        Ok(())
    }

    #[test]
    fn credential_is_appended_to_plain_and_queried_uris() {
        assert_eq!(
            append_credential("https://media.example/v.mp4", "abc"),
            "https://media.example/v.mp4?key=abc"
        );
        assert_eq!(
            append_credential("https://media.example/v.mp4?alt=media", "abc"),
            "https://media.example/v.mp4?alt=media&key=abc"
        );
        assert_eq!(append_credential("files/v:download", "abc"), "files/v:download?key=abc");
    }

    #[test]
    fn credential_is_encoded_on_unparseable_uris() {
        assert_eq!(
            append_credential("files/v:download", "a b&c=d"),
            "files/v:download?key=a+b%26c%3Dd"
        );
        assert_eq!(
            append_credential("files/v:download?alt=media", "k/+"),
            "files/v:download?alt=media&key=k%2F%2B"
        );
    }

    #[test]
    fn token_wait_returns_early_once_cancelled() {
        let token = CancellationToken::new();
        assert!(!token.wait(Duration::from_millis(5)));

        let remote = token.clone();
        let canceller = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            remote.cancel();
        });
        let started = Instant::now();
        assert!(token.wait(Duration::from_secs(5)));
        assert!(started.elapsed() < Duration::from_secs(2));
        let _ = canceller.join();
        assert!(token.is_cancelled());
    }

    #[test]
    fn cancellation_is_detected_through_anyhow() {
        let err = anyhow::Error::new(VideoJobError::cancelled());
        assert!(is_cancellation(&err));
        assert!(is_cancellation(&err.context("while rendering")));
        assert!(!is_cancellation(&anyhow::anyhow!("quota exceeded")));
    }
}
