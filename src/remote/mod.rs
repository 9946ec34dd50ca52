// Rate-Limited Remote Gateway (C3) — spec §4.3.
//
// `AtpClient` is the swap-ready trait over the remote service, the same
// abstraction habit as the teacher's `ToxicityScorer`/`TopicExtractor`
// traits: production code depends on `Arc<dyn AtpClient>`, tests substitute
// an in-memory fake. `Gateway` wraps a client with the token bucket and the
// bounded-retry/error-classification policy; it is the only thing the
// crawl engine talks to.

mod bsky;
mod rate_limit;
mod session;

pub use bsky::AtpBskyClient;
pub use rate_limit::RateLimiter;
pub use session::login_with_session_fallback;

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tracing::warn;

use crate::cache::ProfileInput;
use crate::error::{classify_remote_failure, RemoteFailureKind, RemoteUnavailable};

/// One page of a followers/follows listing.
pub struct Page {
    pub dids: Vec<String>,
    pub next_cursor: Option<String>,
}

/// The remote service's operations, as consumed by the crawl engine (spec
/// §4.3). Implementations do not rate-limit or retry themselves — that is
/// `Gateway`'s job — they just make one call.
#[async_trait]
pub trait AtpClient: Send + Sync {
    /// Resolve up to 25 DIDs to profiles in a single call.
    async fn get_profiles(&self, dids: &[String]) -> Result<Vec<ProfileInput>>;

    /// One page of `did`'s followers, up to 100 per page.
    async fn get_followers(&self, did: &str, cursor: Option<String>) -> Result<Page>;

    /// One page of who `did` follows, up to 100 per page.
    async fn get_follows(&self, did: &str, cursor: Option<String>) -> Result<Page>;
}

/// Number of attempts per call, including the first (spec §4.3 "Retry policy").
const MAX_ATTEMPTS: u32 = 3;

/// Wraps an `AtpClient` with the shared token bucket and the bounded retry /
/// error classification policy. The crawl engine holds one `Gateway` behind
/// an `Arc` and shares it across every concurrent task.
pub struct Gateway {
    client: Arc<dyn AtpClient>,
    limiter: RateLimiter,
}

impl Gateway {
    pub fn new(client: Arc<dyn AtpClient>, rate_per_sec: u32) -> Self {
        Self {
            client,
            limiter: RateLimiter::new(rate_per_sec),
        }
    }

    pub async fn get_profiles(&self, dids: &[String]) -> Result<Vec<ProfileInput>> {
        self.call(|| self.client.get_profiles(dids)).await
    }

    /// Page through `did`'s followers until exhausted. An "actor not found"
    /// response is terminal but non-fatal: it returns whatever was
    /// accumulated so far instead of raising (spec §4.3).
    pub async fn get_all_followers(&self, did: &str) -> Result<Vec<String>> {
        self.paginate(did, |did, cursor| self.client.get_followers(did, cursor))
            .await
    }

    pub async fn get_all_follows(&self, did: &str) -> Result<Vec<String>> {
        self.paginate(did, |did, cursor| self.client.get_follows(did, cursor))
            .await
    }

    async fn paginate<'a, F, Fut>(&'a self, did: &'a str, page_fn: F) -> Result<Vec<String>>
    where
        F: Fn(&'a str, Option<String>) -> Fut,
        Fut: std::future::Future<Output = Result<Page>> + 'a,
    {
        let mut dids = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let attempt_cursor = cursor.clone();
            let page = match self
                .call(|| page_fn(did, attempt_cursor.clone()))
                .await
            {
                Ok(page) => page,
                Err(err) => {
                    if classify_remote_failure(&err) == RemoteFailureKind::ActorNotFound {
                        warn!(did, "actor not found during pagination, returning partial results");
                        return Ok(dids);
                    }
                    return Err(err);
                }
            };
            dids.extend(page.dids);
            match page.next_cursor {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }
        Ok(dids)
    }

    /// Acquire a token, then retry `operation` up to `MAX_ATTEMPTS` times on
    /// transient failure. Every attempt — including retries — re-acquires
    /// the rate limiter, since a retried attempt is still an outbound call.
    async fn call<F, Fut, T>(&self, operation: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            self.limiter.acquire().await;

            match operation().await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    let kind = classify_remote_failure(&err);
                    if kind == RemoteFailureKind::ActorNotFound {
                        return Err(err);
                    }
                    if attempt >= MAX_ATTEMPTS {
                        return Err(RemoteUnavailable {
                            attempts: attempt,
                            source: format!("{err:?}"),
                        }
                        .into());
                    }
                    warn!(attempt, max_attempts = MAX_ATTEMPTS, error = %err, "remote call failed, retrying");
                }
            }
        }
    }
}
