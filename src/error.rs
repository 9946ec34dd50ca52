// Error taxonomy for the crawl/rank core.
//
// Most call sites still use `anyhow::Result` with `.context()`, matching the
// rest of this crate — this module exists only for the handful of error
// classes callers need to match on: fatal-at-startup failures (config,
// store, auth) versus per-call transient failures the gateway retries away.

use thiserror::Error;

/// Fatal errors — callers should stop the run, not retry.
#[derive(Debug, Error)]
pub enum FatalError {
    /// Malformed configuration file; fatal at startup.
    #[error("invalid configuration: {0}")]
    ConfigInvalid(String),

    /// The cache file cannot be opened, or satisfies neither a fresh-schema
    /// nor an existing-schema check.
    #[error("cache store is corrupt or unreadable: {0}")]
    StoreCorrupt(String),

    /// Session reuse failed *and* credential login failed.
    #[error("authentication failed: {0}")]
    AuthFailed(String),
}

/// A single remote call failed after exhausting its retry budget.
///
/// Per-call only — never fatal to the run. The crawl engine logs this and
/// leaves the affected account `fetched=false` for the next invocation.
///
/// Stores the triggering error's rendered chain rather than the
/// `anyhow::Error` itself: `anyhow::Error` doesn't implement
/// `std::error::Error` (by design, so it can't conflict with the blanket
/// `From<E: Error> for anyhow::Error`), so it can't sit behind thiserror's
/// `#[source]`.
#[derive(Debug, Error)]
#[error("remote call unavailable after {attempts} attempts: {source}")]
pub struct RemoteUnavailable {
    pub attempts: u32,
    pub source: String,
}

/// Classification of a remote-call failure, used by the retry wrapper to
/// decide whether to retry, treat as a benign data outcome, or give up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteFailureKind {
    /// Transport or non-terminal protocol error — retry.
    Transient,
    /// "Actor not found" on a followers/follows call — terminal but benign.
    ActorNotFound,
    /// A bad-request class error — terminal, triggers session fallback on login.
    BadRequest,
    /// Anything else we don't specifically classify — treated as transient.
    Unknown,
}

/// Inspect an error and classify it for the retry wrapper.
///
/// AT Protocol errors surface as strings in the error chain (both the
/// `atrium-api` XRPC error envelopes and transport errors from `reqwest`
/// stringify their cause), so — same approach as the teacher's
/// `is_rate_limit_error` — we match on the rendered chain rather than
/// downcasting to a concrete error type.
pub fn classify_remote_failure(err: &anyhow::Error) -> RemoteFailureKind {
    let chain = format!("{err:?}").to_lowercase();
    if chain.contains("actornotfound") || chain.contains("actor not found") {
        RemoteFailureKind::ActorNotFound
    } else if chain.contains("badrequest") || chain.contains("bad request") || chain.contains("400") {
        RemoteFailureKind::BadRequest
    } else if chain.contains("timeout")
        || chain.contains("connection")
        || chain.contains("timed out")
        || chain.contains("upstreamfailure")
        || chain.contains("internalservererror")
        || chain.contains("502")
        || chain.contains("503")
        || chain.contains("429")
    {
        RemoteFailureKind::Transient
    } else {
        RemoteFailureKind::Unknown
    }
}
