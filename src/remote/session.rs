// Session persistence and login fallback (spec §4.3 "Session"; restored in
// full from `original_source/pythonic/.../relationship.py`'s `_init`).
//
// On first run there is no session file: log in with user/password and
// write the exported session string to disk. On later runs, try the saved
// session string first; if that fails with a bad-request class error (the
// session is stale or malformed, not a transient network blip), fall back
// to user/password login and rewrite the file. Any other failure during
// session-string login is not swallowed — it propagates, since only a
// bad-request class response is specified as the fallback trigger.

use std::path::Path;

use anyhow::{Context, Result};
use bsky_sdk::BskyAgent;
use tracing::{info, warn};

use crate::error::{classify_remote_failure, FatalError, RemoteFailureKind};

/// Log in, preferring a persisted session string, falling back to
/// credentials on a bad-request class failure. Returns the authenticated
/// agent; the session file is rewritten whenever a fresh login occurs.
pub async fn login_with_session_fallback(
    user: &str,
    password: &str,
    session_file: &Path,
) -> Result<BskyAgent> {
    if session_file.exists() {
        let session_string = std::fs::read_to_string(session_file)
            .with_context(|| format!("failed to read session file {}", session_file.display()))?;

        match try_session_login(&session_string).await {
            Ok(agent) => {
                info!("authenticated using persisted session");
                return Ok(agent);
            }
            Err(err) => {
                let kind = classify_remote_failure(&err);
                if kind != RemoteFailureKind::BadRequest {
                    return Err(err);
                }
                warn!("persisted session rejected as a bad request, falling back to password login");
            }
        }
    }

    let agent = password_login(user, password)
        .await
        .map_err(|e| FatalError::AuthFailed(e.to_string()))?;
    persist_session(&agent, session_file).await?;
    Ok(agent)
}

async fn try_session_login(session_string: &str) -> Result<BskyAgent> {
    let agent = BskyAgent::builder()
        .build()
        .await
        .context("failed to initialize agent")?;
    let session: atrium_api::agent::Session =
        serde_json::from_str(session_string).context("malformed session string")?;
    agent
        .resume_session(session)
        .await
        .context("failed to resume session")?;
    Ok(agent)
}

async fn password_login(user: &str, password: &str) -> Result<BskyAgent> {
    let agent = BskyAgent::builder()
        .build()
        .await
        .context("failed to initialize agent")?;
    agent
        .login(user, password)
        .await
        .context("failed to authenticate with username/password")?;
    Ok(agent)
}

/// Export the agent's session and write it to `session_file`.
pub async fn persist_session(agent: &BskyAgent, session_file: &Path) -> Result<()> {
    let session = agent
        .get_session()
        .await
        .context("no session available to persist")?;
    let serialized = serde_json::to_string(&session).context("failed to serialize session")?;
    if let Some(parent) = session_file.parent() {
        std::fs::create_dir_all(parent).ok();
    }
    std::fs::write(session_file, serialized)
        .with_context(|| format!("failed to write session file {}", session_file.display()))?;
    Ok(())
}
