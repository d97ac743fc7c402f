//! Discovery of installable daemon releases.

use std::{
    path::{Path, PathBuf},
    time::{Duration, SystemTime},
};

use reqwest::{header, Client};
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::{policies::ExponentialBackoff, RetryTransientMiddleware};
use serde::Deserialize;
use tokio::fs;

use crate::{AgentError, AgentResult};

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// GitHub rejects API requests without a user agent.
const USER_AGENT: &str = concat!("hy2agent/", env!("CARGO_PKG_VERSION"));

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// Lists upstream release tags, with an on-disk cache.
#[derive(Debug, Clone)]
pub struct ReleaseFeed {
    client: ClientWithMiddleware,
    url: String,
    cache_path: PathBuf,
    ttl: Duration,
}

#[derive(Debug, Deserialize)]
struct Release {
    tag_name: String,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl ReleaseFeed {
    /// Creates a feed over the GitHub releases endpoint at `url`.
    pub fn new(url: impl Into<String>, cache_path: impl Into<PathBuf>, ttl: Duration) -> Self {
        let retry_policy = ExponentialBackoff::builder().build_with_max_retries(3);
        let client_builder = ClientBuilder::new(Client::new());
        let client = client_builder
            .with(RetryTransientMiddleware::new_with_policy(retry_policy))
            .build();

        Self {
            client,
            url: url.into(),
            cache_path: cache_path.into(),
            ttl,
        }
    }

    /// Returns release tags, newest first as published.
    ///
    /// A fresh cache is served as-is. Otherwise the endpoint is queried and the cache rewritten.
    /// A failed live fetch is an error even when a stale cache exists.
    pub async fn available_versions(&self) -> AgentResult<Vec<String>> {
        if let Some(versions) = self.read_cache().await {
            tracing::debug!("serving {} versions from cache", versions.len());
            return Ok(versions);
        }

        let versions = self.fetch().await?;

        match serde_json::to_vec(&versions) {
            Ok(data) => {
                if let Err(e) = fs::write(&self.cache_path, data).await {
                    tracing::warn!("failed to write versions cache: {}", e);
                }
            }
            Err(e) => tracing::warn!("failed to encode versions cache: {}", e),
        }

        Ok(versions)
    }

    async fn fetch(&self) -> AgentResult<Vec<String>> {
        tracing::info!("fetching releases from {}", self.url);

        let response = self
            .client
            .get(&self.url)
            .header(header::USER_AGENT, USER_AGENT)
            .header(header::ACCEPT, "application/vnd.github+json")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(AgentError::ReleaseFeed(format!(
                "release endpoint returned {}",
                status
            )));
        }

        let releases = response
            .json::<Vec<Release>>()
            .await
            .map_err(|e| AgentError::ReleaseFeed(format!("failed to parse releases: {}", e)))?;

        Ok(releases.into_iter().map(|r| r.tag_name).collect())
    }

    /// Returns the cached list if the cache exists, is younger than the TTL and parses.
    async fn read_cache(&self) -> Option<Vec<String>> {
        if !is_fresh(&self.cache_path, self.ttl).await {
            return None;
        }

        let data = fs::read(&self.cache_path).await.ok()?;
        serde_json::from_slice(&data).ok()
    }
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

async fn is_fresh(path: &Path, ttl: Duration) -> bool {
    let Ok(metadata) = fs::metadata(path).await else {
        return false;
    };

    metadata
        .modified()
        .ok()
        .and_then(|modified| SystemTime::now().duration_since(modified).ok())
        .is_some_and(|age| age < ttl)
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
