//! Error taxonomy for the generation/validation pipeline.
//!
//! Provider-level failures ([`ProviderError`]) are never surfaced to the
//! caller of a triggering request — they are retried against the next
//! provider in the cycle. Pipeline-level failures ([`PipelineError`]) end up
//! as the `error` column of the task row; the triggering request only ever
//! observes "task accepted".

/// A single provider call failed.
///
/// `Transport` and `Timeout` are treated identically by the orchestrators:
/// rotate to the next provider in the cycle. `BadResponse` usually means the
/// model ignored the JSON contract — also worth trying another provider.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("provider '{provider}' call failed: {message}")]
    Transport { provider: String, message: String },

    #[error("provider '{provider}' timed out after {timeout_ms} ms")]
    Timeout { provider: String, timeout_ms: u64 },

    #[error("provider '{provider}' returned an unparsable response: {message}")]
    BadResponse { provider: String, message: String },

    #[error("provider '{provider}' is not configured")]
    NotConfigured { provider: String },
}

impl ProviderError {
    /// Name of the provider that produced this error.
    pub fn provider(&self) -> &str {
        match self {
            Self::Transport { provider, .. }
            | Self::Timeout { provider, .. }
            | Self::BadResponse { provider, .. }
            | Self::NotConfigured { provider } => provider,
        }
    }

    /// Whether retrying the same provider (with backoff) can plausibly help.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transport { .. } | Self::Timeout { .. })
    }
}

/// Terminal failures of a whole task run.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Cooperative cancellation — the watchdog (or an operator stop) set the
    /// abort flag and already wrote the terminal task state.
    #[error("task aborted: {reason}")]
    Aborted { reason: String },

    /// No provider in the cycle could service a round or item.
    #[error("no provider in the cycle could service the request")]
    ExhaustedProviders,

    #[error("persistence failure: {0}")]
    Persistence(#[from] sqlx::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
