//! Generation orchestration for the prompt playground: credential lookup,
//! synchronous text and image calls, long-running video jobs, and
//! best-effort suggestion batches.

pub mod backend;
pub mod config;
pub mod credentials;
pub mod invoker;
pub mod suggestions;
pub mod video;

#[cfg(test)]
mod testing;

pub use backend::{BackendConnector, GeminiBackend, GeminiConnector, GenerativeBackend};
pub use config::EngineConfig;
pub use credentials::{CredentialResolver, CredentialSelector, CredentialSlot, CredentialSource};
pub use invoker::SyncInvoker;
pub use suggestions::{HintSubject, SuggestionGenerator};
pub use video::{
    is_cancellation, CancellationToken, VideoJobError, VideoJobErrorKind, VideoJobOrchestrator,
    CANCELLED_MARKER,
};
