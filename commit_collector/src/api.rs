use async_trait::async_trait;
use chrono::{DateTime, Utc};
use derive_more::Constructor;
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("API quota exceeded, resets at {reset}")]
    QuotaExceeded { reset: DateTime<Utc> },
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },
    // reqwest is a dependency of the api feature for this variant alone
    #[error("Request error: {0}")]
    Request(#[from] reqwest::Error),
    #[error("Store error: {0}")]
    Store(String),
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    pub fn kind(&self) -> FailureKind {
        match self {
            Error::QuotaExceeded { .. } => FailureKind::QuotaExceeded,
            Error::Api { .. } | Error::Request(_) => FailureKind::Api,
            _ => FailureKind::Unexpected,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Why a repository collection failed. Only `QuotaExceeded` is worth a retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum FailureKind {
    QuotaExceeded,
    Api,
    Unexpected,
}

#[derive(Debug, Clone, PartialEq, Eq, Constructor)]
pub struct RepoDescriptor {
    pub name: String,
    pub archived: bool,
    pub created_at: Option<DateTime<Utc>>,
    pub pushed_at: Option<DateTime<Utc>>,
}

/// Author or committer signature as stored in the commit object.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Signature {
    pub name: Option<String>,
    pub email: Option<String>,
    pub date: Option<DateTime<Utc>>,
}

/// Git-level commit metadata. Field order is part of the unknown-author hash.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CommitMeta {
    pub author: Option<Signature>,
    pub committer: Option<Signature>,
    pub message: String,
    pub verified: bool,
}

/// A commit as listed by the forge: git metadata plus the platform accounts it resolved to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ForgeCommit {
    pub sha: String,
    pub author_login: Option<String>,
    pub committer_login: Option<String>,
    pub meta: CommitMeta,
    pub html_url: Option<String>,
    pub parent_count: usize,
}

/// Raw quota probe. Forges have been seen reporting the core quota either under
/// `resources.core` or under the legacy top-level `rate`, so both are optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct RateLimitProbe {
    pub resources: Option<RateLimitResources>,
    pub rate: Option<RateLimitResource>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct RateLimitResources {
    pub core: Option<RateLimitResource>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct RateLimitResource {
    pub limit: Option<u32>,
    pub remaining: Option<u32>,
    pub reset: Option<i64>,
}

#[async_trait]
pub trait Client: Send + Sync {
    async fn org_repos(&self, org: &str) -> Result<Vec<RepoDescriptor>>;

    async fn branches(&self, org: &str, repo: &str) -> Result<Vec<String>>;

    async fn commits(
        &self,
        org: &str,
        repo: &str,
        branch: &str,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Vec<ForgeCommit>>;

    async fn rate_limit(&self) -> Result<RateLimitProbe>;
}
