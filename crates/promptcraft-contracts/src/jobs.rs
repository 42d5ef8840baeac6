use serde_json::Value;

use crate::wire::Operation;

/// Snapshot of a long-running operation, refreshed on every poll.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobHandle {
    pub name: String,
    pub done: bool,
    pub status: Option<String>,
    pub video_uri: Option<String>,
    pub error: Option<String>,
}

impl From<Operation> for JobHandle {
    fn from(operation: Operation) -> Self {
        let status = operation.metadata.as_ref().map(status_from_metadata);
        let video_uri = operation.response.as_ref().and_then(|response| {
            response
                .generated_videos
                .as_deref()
                .filter(|videos| !videos.is_empty())
                .or_else(|| {
                    response
                        .generate_video_response
                        .as_ref()
                        .and_then(|inner| inner.generated_samples.as_deref())
                })
                .and_then(<[_]>::first)
                .and_then(|video| video.video.as_ref())
                .and_then(|asset| asset.uri.as_deref())
                .map(str::trim)
                .filter(|uri| !uri.is_empty())
                .map(str::to_string)
        });
        let error = operation.error.as_ref().map(|error| {
            let message = error
                .message
                .as_deref()
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .unwrap_or("operation reported an error");
            match error.code {
                Some(code) => format!("{message} (code {code})"),
                None => message.to_string(),
            }
        });

        Self {
            name: operation.name.unwrap_or_default(),
            done: operation.done.unwrap_or(false),
            status,
            video_uri,
            error,
        }
    }
}

fn status_from_metadata(metadata: &Value) -> String {
    metadata
        .get("state")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|state| !state.is_empty())
        .unwrap_or("Processing")
        .to_string()
}
