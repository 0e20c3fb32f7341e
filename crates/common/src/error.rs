use thiserror::Error;

/// Canonical QX error taxonomy used across crates.
///
/// Classification guidance:
/// - [`QxError::Parse`]: SQL is syntactically or semantically invalid; surfaced immediately, no retry
/// - [`QxError::NoRealizationFound`]: a candidate plan matched no physical access path; drives the
///   enhanced push-down retry chain, then alternative advancement
/// - [`QxError::Unsupported`]: plan uses a construct an evaluator cannot run; drives alternative
///   advancement when more remain, else surfaced unchanged
/// - [`QxError::RecoverableBackend`]: transient storage-backend fault; eligible for one whole-query
///   retry after the read-backend switch when the allow-list matches
/// - [`QxError::Cancelled`]: cooperative cancellation observed at a retry checkpoint; no further retries
/// - [`QxError::DryRunComplete`]: terminal dry-run signal carrying the physical plan text; converted
///   into a diagnostic report, never surfaced as-is
/// - [`QxError::Execution`]: anything else raised by an evaluator; surfaced with diagnostics, no retry
#[derive(Debug, Error)]
pub enum QxError {
    /// SQL text failed to parse or validate against the catalog.
    #[error("parse failed: {0}")]
    Parse(String),

    /// No realization (precomputed index/model) matched the plan shape.
    ///
    /// The payload identifies the sub-plan region that went unmatched.
    #[error("no realization found: {0}")]
    NoRealizationFound(String),

    /// Valid request for a construct the chosen evaluator cannot run.
    #[error("unsupported operation: {0}")]
    Unsupported(String),

    /// Transient storage-backend condition; the payload is matched against
    /// the operator-configured allow-list before any backend switch.
    #[error("recoverable backend fault: {0}")]
    RecoverableBackend(String),

    /// Cooperative cancellation observed during a retry checkpoint.
    #[error("query cancelled: {0}")]
    Cancelled(String),

    /// Dry-run terminal signal. Carries the physical plan text produced
    /// right before execution would have started.
    #[error("dry run completed")]
    DryRunComplete(String),

    /// Invalid or inconsistent configuration/catalog state.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Runtime execution failures after planning succeeded.
    #[error("execution error: {0}")]
    Execution(String),

    /// Transparent std IO failures.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Standard QX result alias.
pub type Result<T> = std::result::Result<T, QxError>;
