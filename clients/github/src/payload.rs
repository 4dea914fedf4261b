use chrono::{DateTime, Utc};
use commit_collector::api::{CommitMeta, ForgeCommit, RepoDescriptor, Signature};
use serde::de::IgnoredAny;
use serde::Deserialize;

#[derive(Deserialize, Debug)]
pub struct Repo {
    pub name: String,
    #[serde(default)]
    pub archived: bool,
    pub created_at: Option<DateTime<Utc>>,
    pub pushed_at: Option<DateTime<Utc>>,
}

impl From<Repo> for RepoDescriptor {
    fn from(repo: Repo) -> Self {
        RepoDescriptor::new(repo.name, repo.archived, repo.created_at, repo.pushed_at)
    }
}

#[derive(Deserialize, Debug)]
pub struct Branch {
    pub name: String,
}

/// Platform account a commit was attributed to; `{}` or `null` when the email matches no user.
#[derive(Deserialize, Debug, Default)]
pub struct Account {
    pub login: Option<String>,
}

#[derive(Deserialize, Debug)]
pub struct GitSignature {
    pub name: Option<String>,
    pub email: Option<String>,
    pub date: Option<DateTime<Utc>>,
}

impl From<GitSignature> for Signature {
    fn from(signature: GitSignature) -> Self {
        Signature {
            name: signature.name,
            email: signature.email,
            date: signature.date,
        }
    }
}

#[derive(Deserialize, Debug, Default)]
pub struct Verification {
    #[serde(default)]
    pub verified: bool,
}

#[derive(Deserialize, Debug)]
pub struct GitCommit {
    pub author: Option<GitSignature>,
    pub committer: Option<GitSignature>,
    #[serde(default)]
    pub message: String,
    pub verification: Option<Verification>,
}

#[derive(Deserialize, Debug)]
pub struct Commit {
    pub sha: String,
    pub author: Option<Account>,
    pub committer: Option<Account>,
    pub commit: GitCommit,
    pub html_url: Option<String>,
    #[serde(default)]
    pub parents: Vec<IgnoredAny>,
}

impl From<Commit> for ForgeCommit {
    fn from(commit: Commit) -> Self {
        ForgeCommit {
            sha: commit.sha,
            author_login: commit.author.and_then(|a| a.login),
            committer_login: commit.committer.and_then(|c| c.login),
            meta: CommitMeta {
                author: commit.commit.author.map(Signature::from),
                committer: commit.commit.committer.map(Signature::from),
                message: commit.commit.message,
                verified: commit.commit.verification.unwrap_or_default().verified,
            },
            html_url: commit.html_url,
            parent_count: commit.parents.len(),
        }
    }
}

/// Error body of a failed API call.
#[derive(Deserialize, Debug)]
pub struct ApiMessage {
    pub message: String,
}
