// Concrete AtpClient backed by bsky-sdk / atrium-api.
//
// Grounded on the teacher's `bluesky/followers.rs` (pagination shape) and
// `bluesky/profiles.rs` (25-per-batch profile resolution), adapted from
// Charcoal's "resolve handles for display" use case to this crate's
// "resolve full profiles for the cache" use case — the XRPC calls and
// batch/page limits are the same AT Protocol endpoints.

use anyhow::{Context, Result};
use async_trait::async_trait;
use atrium_api::app::bsky::actor::get_profiles;
use atrium_api::app::bsky::graph::{get_followers, get_follows};
use bsky_sdk::BskyAgent;

use super::{AtpClient, Page};
use crate::cache::ProfileInput;

/// Remote API limit on DIDs per `getProfiles` call (spec §4.3).
const PROFILE_BATCH_LIMIT: usize = 25;

/// Remote API limit on results per `getFollowers`/`getFollows` page (spec §4.3).
const PAGE_LIMIT: u32 = 100;

pub struct AtpBskyClient {
    agent: BskyAgent,
}

impl AtpBskyClient {
    pub fn new(agent: BskyAgent) -> Self {
        Self { agent }
    }
}

#[async_trait]
impl AtpClient for AtpBskyClient {
    async fn get_profiles(&self, dids: &[String]) -> Result<Vec<ProfileInput>> {
        anyhow::ensure!(
            dids.len() <= PROFILE_BATCH_LIMIT,
            "get_profiles: batch of {} exceeds the {}-DID remote limit",
            dids.len(),
            PROFILE_BATCH_LIMIT
        );

        let output = self
            .agent
            .api
            .app
            .bsky
            .actor
            .get_profiles(
                get_profiles::ParametersData {
                    actors: dids.iter().map(|d| d.clone().into()).collect(),
                }
                .into(),
            )
            .await
            .context("getProfiles failed")?;

        Ok(output
            .profiles
            .iter()
            .map(|profile| ProfileInput {
                did: profile.did.as_str().to_string(),
                handle: profile.handle.as_str().to_string(),
                nick: profile.display_name.clone().unwrap_or_default(),
                desc: profile.description.clone().unwrap_or_default(),
                followers: profile.followers_count.unwrap_or(0),
                following: profile.follows_count.unwrap_or(0),
            })
            .collect())
    }

    async fn get_followers(&self, did: &str, cursor: Option<String>) -> Result<Page> {
        let output = self
            .agent
            .api
            .app
            .bsky
            .graph
            .get_followers(
                get_followers::ParametersData {
                    actor: did.to_string().into(),
                    cursor,
                    limit: Some(PAGE_LIMIT.try_into().unwrap()),
                }
                .into(),
            )
            .await
            .context("getFollowers failed")?;

        Ok(Page {
            dids: output
                .followers
                .iter()
                .map(|p| p.did.as_str().to_string())
                .collect(),
            next_cursor: output.cursor.clone(),
        })
    }

    async fn get_follows(&self, did: &str, cursor: Option<String>) -> Result<Page> {
        let output = self
            .agent
            .api
            .app
            .bsky
            .graph
            .get_follows(
                get_follows::ParametersData {
                    actor: did.to_string().into(),
                    cursor,
                    limit: Some(PAGE_LIMIT.try_into().unwrap()),
                }
                .into(),
            )
            .await
            .context("getFollows failed")?;

        Ok(Page {
            dids: output
                .follows
                .iter()
                .map(|p| p.did.as_str().to_string())
                .collect(),
            next_cursor: output.cursor.clone(),
        })
    }
}
