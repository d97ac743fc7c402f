//! The persisted access policy.
//!
//! The policy holds the shared API key together with the IP blacklist, IP whitelist and domain
//! whitelist. It is the single source of truth for authorization and lives in a small JSON
//! document inside the agent home. Every mutation replaces the whole document and is flushed to
//! disk before it becomes visible to the gate.

use std::{
    collections::BTreeSet,
    path::{Path, PathBuf},
};

use getset::Getters;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use tokio::{
    fs,
    sync::{RwLock, RwLockReadGuard},
};

use crate::{utils, AgentError, AgentResult};

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// Number of random bytes in a generated API key.
const API_KEY_BYTES: usize = 32;

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// Authorization policy for the agent API.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, Getters)]
#[getset(get = "pub with_prefix")]
pub struct AccessPolicy {
    /// The shared secret every request must present in `X-API-Key`.
    api_key: String,

    /// Literal source IPs that are allowed in.
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    ip_whitelist: BTreeSet<String>,

    /// Literal source IPs that are always rejected.
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    ip_blacklist: BTreeSet<String>,

    /// Hostnames (or `*.suffix` wildcards) that are allowed in.
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    domain_whitelist: BTreeSet<String>,
}

/// Owns the access policy and its on-disk document.
///
/// Reads take a shared lock. [`PolicyStore::replace_with`] holds the exclusive lock across the
/// durable save so a concurrent request never sees a policy that is not on disk yet.
#[derive(Debug)]
pub struct PolicyStore {
    path: PathBuf,
    policy: RwLock<AccessPolicy>,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl AccessPolicy {
    /// Creates a policy with the given key and no list entries.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            ..Default::default()
        }
    }

    /// Creates a policy with a freshly generated random key.
    pub fn generate() -> Self {
        Self::new(generate_api_key())
    }

    /// Replaces the IP whitelist.
    pub fn with_ip_whitelist(mut self, ips: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.ip_whitelist = normalize_entries(ips);
        self
    }

    /// Replaces the IP blacklist.
    pub fn with_ip_blacklist(mut self, ips: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.ip_blacklist = normalize_entries(ips);
        self
    }

    /// Replaces the domain whitelist.
    pub fn with_domain_whitelist(
        mut self,
        domains: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        self.domain_whitelist = normalize_entries(domains);
        self
    }

    /// Returns true if neither the IP nor the domain whitelist has entries.
    pub fn whitelist_is_empty(&self) -> bool {
        self.ip_whitelist.is_empty() && self.domain_whitelist.is_empty()
    }
}

impl PolicyStore {
    /// Loads the policy at `path`, creating one with a fresh API key if the file does not exist.
    ///
    /// A document that exists but cannot be parsed is an error; it is never silently replaced.
    pub async fn load_or_init(path: impl Into<PathBuf>) -> AgentResult<Self> {
        let path = path.into();

        let policy = match fs::read(&path).await {
            Ok(data) => serde_json::from_slice::<AccessPolicy>(&data).map_err(|e| {
                AgentError::Policy(format!("failed to parse {}: {}", path.display(), e))
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                if let Some(parent) = path.parent() {
                    fs::create_dir_all(parent).await?;
                }

                let policy = AccessPolicy::generate();
                save(&path, &policy).await?;
                tracing::info!("created new access policy at {}", path.display());
                policy
            }
            Err(e) => return Err(e.into()),
        };

        if policy.api_key.is_empty() {
            return Err(AgentError::Policy(format!(
                "{} has an empty api_key",
                path.display()
            )));
        }

        Ok(Self {
            path,
            policy: RwLock::new(policy),
        })
    }

    /// Loads the policy from the agent home directory.
    pub async fn load_from_home(home: impl AsRef<Path>) -> AgentResult<Self> {
        Self::load_or_init(home.as_ref().join(utils::POLICY_FILENAME)).await
    }

    /// Returns the path of the policy document.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Acquires a read guard on the current policy.
    pub async fn read(&self) -> RwLockReadGuard<'_, AccessPolicy> {
        self.policy.read().await
    }

    /// Returns a copy of the current policy.
    pub async fn snapshot(&self) -> AccessPolicy {
        self.policy.read().await.clone()
    }

    /// Replaces the policy with `policy` once it has been written to disk.
    pub async fn replace(&self, policy: AccessPolicy) -> AgentResult<()> {
        self.replace_with(|_| policy).await.map(|_| ())
    }

    /// Builds a new policy from the current one and replaces it once it has been written to disk.
    ///
    /// If the save fails the in-memory policy is left untouched.
    pub async fn replace_with<F>(&self, build: F) -> AgentResult<AccessPolicy>
    where
        F: FnOnce(&AccessPolicy) -> AccessPolicy,
    {
        let mut guard = self.policy.write().await;
        let next = build(&guard);

        if next.api_key.is_empty() {
            return Err(AgentError::InvalidArgument(
                "api key must not be empty".to_string(),
            ));
        }

        save(&self.path, &next).await?;
        *guard = next.clone();

        Ok(next)
    }
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Generates a random hex-encoded API key.
pub fn generate_api_key() -> String {
    let mut bytes = [0u8; API_KEY_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

async fn save(path: &Path, policy: &AccessPolicy) -> AgentResult<()> {
    let data = serde_json::to_vec_pretty(policy)?;
    utils::write_atomic(path, data).await
}

fn normalize_entries(entries: impl IntoIterator<Item = impl Into<String>>) -> BTreeSet<String> {
    entries
        .into_iter()
        .map(|entry| entry.into().trim().to_string())
        .filter(|entry| !entry.is_empty())
        .collect()
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
