use crate::api::{Error, ForgeCommit, Result};
use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// Longest window a single run may cover, in days, both ends inclusive.
pub const MAX_WINDOW_DAYS: i64 = 10;

/// Commit id -> record, one repository traversal or one persisted bucket.
pub type CommitsById = BTreeMap<String, CommitRecord>;

/// Author key -> commits of that author.
pub type AuthorCommits = BTreeMap<String, CommitsById>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitRecord {
    #[serde(rename = "sha")]
    pub commit_id: String,
    pub repo: String,
    pub branch: String,
    pub author_login: Option<String>,
    pub author_name: Option<String>,
    pub author_email: Option<String>,
    pub committer_login: Option<String>,
    pub committer_name: Option<String>,
    pub committer_email: Option<String>,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    pub url: Option<String>,
    pub is_merge: bool,
    pub verified: bool,
}

impl CommitRecord {
    /// Builds the persisted record. `None` when the commit carries no author date,
    /// since the bucket day cannot be derived without it.
    pub fn from_forge(commit: &ForgeCommit, repo: &str, branch: &str) -> Option<Self> {
        let author = commit.meta.author.as_ref()?;
        let committer = commit.meta.committer.clone().unwrap_or_default();
        Some(CommitRecord {
            commit_id: commit.sha.clone(),
            repo: repo.to_string(),
            branch: branch.to_string(),
            author_login: commit.author_login.clone(),
            author_name: author.name.clone(),
            author_email: author.email.clone(),
            committer_login: commit.committer_login.clone(),
            committer_name: committer.name,
            committer_email: committer.email,
            message: commit.meta.message.clone(),
            timestamp: author.date?,
            url: commit.html_url.clone(),
            is_merge: commit.parent_count > 1,
            verified: commit.meta.verified,
        })
    }

    /// Bucket day: the author timestamp truncated to its UTC calendar date.
    pub fn day(&self) -> NaiveDate {
        self.timestamp.date_naive()
    }
}

/// Stable author identity: platform login, then lower-cased author email, then a
/// hash of the commit metadata.
pub fn author_key(commit: &ForgeCommit) -> String {
    if let Some(login) = commit.author_login.as_deref().filter(|l| !l.is_empty()) {
        return format!("login:{}", login);
    }
    let email = commit
        .meta
        .author
        .as_ref()
        .and_then(|a| a.email.as_deref())
        .filter(|e| !e.is_empty());
    if let Some(email) = email {
        return format!("email:{}", email.to_lowercase());
    }
    let raw = serde_json::to_vec(&commit.meta).unwrap_or_default();
    let digest = hex::encode(Sha256::digest(&raw));
    format!("unknown:{}", &digest[..12])
}

/// Merges `source` into `target`; a record from `source` replaces one with the same commit id.
pub fn merge_authors(target: &mut AuthorCommits, source: &AuthorCommits) {
    for (author, commits) in source {
        let bucket = target.entry(author.clone()).or_default();
        for (commit_id, record) in commits {
            bucket.insert(commit_id.clone(), record.clone());
        }
    }
}

pub fn commit_count(commits: &AuthorCommits) -> usize {
    commits.values().map(BTreeMap::len).sum()
}

/// Inclusive UTC date range of one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    start: NaiveDate,
    end: NaiveDate,
}

impl Window {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self> {
        if end < start {
            return Err(Error::Config(format!("window end {} is before start {}", end, start)));
        }
        let span = (end - start).num_days() + 1;
        if span > MAX_WINDOW_DAYS {
            return Err(Error::Config(format!(
                "window {}..{} spans {} days, at most {} allowed",
                start, end, span, MAX_WINDOW_DAYS
            )));
        }
        Ok(Window { start, end })
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }

    /// Start of the first day, 00:00:00 UTC.
    pub fn since(&self) -> DateTime<Utc> {
        self.start.and_time(NaiveTime::MIN).and_utc()
    }

    /// End of the last day, 23:59:59 UTC.
    pub fn until(&self) -> DateTime<Utc> {
        self.end.and_time(NaiveTime::MIN).and_utc() + Duration::seconds(86_399)
    }

    pub fn days(&self) -> Vec<NaiveDate> {
        self.start.iter_days().take_while(|day| *day <= self.end).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{CommitMeta, Signature};

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn commit(login: Option<&str>, email: Option<&str>) -> ForgeCommit {
        ForgeCommit {
            sha: "abc123".to_string(),
            author_login: login.map(str::to_string),
            meta: CommitMeta {
                author: Some(Signature {
                    name: Some("Alice".to_string()),
                    email: email.map(str::to_string),
                    date: Some("2025-03-05T10:00:00Z".parse().unwrap()),
                }),
                message: "init".to_string(),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn author_key_prefers_login() {
        assert_eq!(author_key(&commit(Some("alice"), Some("a@x.io"))), "login:alice");
        assert_eq!(author_key(&commit(None, Some("Alice@X.io"))), "email:alice@x.io");
        assert_eq!(author_key(&commit(Some(""), Some("a@x.io"))), "email:a@x.io");
    }

    #[test]
    fn author_key_hash_is_stable() {
        let first = author_key(&commit(None, None));
        let second = author_key(&commit(None, None));
        assert!(first.starts_with("unknown:"));
        assert_eq!(first.len(), "unknown:".len() + 12);
        assert_eq!(first, second);

        let mut other = commit(None, None);
        other.meta.message = "different".to_string();
        assert_ne!(author_key(&other), first);
    }

    #[test]
    fn day_is_author_utc_date() {
        let mut c = commit(Some("alice"), None);
        c.meta.author.as_mut().unwrap().date = Some("2025-02-01T23:59:59Z".parse().unwrap());
        c.meta.committer = Some(Signature {
            date: Some("2025-02-02T08:00:00Z".parse().unwrap()),
            ..Default::default()
        });
        let record = CommitRecord::from_forge(&c, "org/svc", "main").unwrap();
        assert_eq!(record.day(), date("2025-02-01"));

        c.meta.author.as_mut().unwrap().date = Some("2025-02-02T00:00:00Z".parse().unwrap());
        let record = CommitRecord::from_forge(&c, "org/svc", "main").unwrap();
        assert_eq!(record.day(), date("2025-02-02"));

        // 23:30 at -03:00 is already the next day in UTC
        let shifted: DateTime<Utc> = DateTime::parse_from_rfc3339("2025-02-01T23:30:00-03:00")
            .unwrap()
            .with_timezone(&Utc);
        c.meta.author.as_mut().unwrap().date = Some(shifted);
        let record = CommitRecord::from_forge(&c, "org/svc", "main").unwrap();
        assert_eq!(record.day(), date("2025-02-02"));
    }

    #[test]
    fn record_needs_author_date() {
        let mut c = commit(Some("alice"), None);
        c.meta.author.as_mut().unwrap().date = None;
        assert_eq!(CommitRecord::from_forge(&c, "org/svc", "main"), None);
    }

    #[test]
    fn record_serializes_sha_field() {
        let record = CommitRecord::from_forge(&commit(Some("alice"), None), "org/svc", "main").unwrap();
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["sha"], "abc123");
        assert_eq!(json["repo"], "org/svc");
        assert_eq!(json["is_merge"], false);
    }

    #[test]
    fn window_bounds() {
        let window = Window::new(date("2025-03-01"), date("2025-03-03")).unwrap();
        assert_eq!(window.since().to_rfc3339(), "2025-03-01T00:00:00+00:00");
        assert_eq!(window.until().to_rfc3339(), "2025-03-03T23:59:59+00:00");
        assert_eq!(
            window.days(),
            vec![date("2025-03-01"), date("2025-03-02"), date("2025-03-03")]
        );
    }

    #[test]
    fn window_validation() {
        assert!(Window::new(date("2025-03-02"), date("2025-03-01")).is_err());
        assert!(Window::new(date("2025-03-01"), date("2025-03-10")).is_ok());
        assert!(matches!(
            Window::new(date("2025-03-01"), date("2025-03-11")),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn merge_overwrites_same_commit() {
        let mut first = CommitRecord::from_forge(&commit(Some("alice"), None), "org/a", "main").unwrap();
        let mut target = AuthorCommits::new();
        target
            .entry("login:alice".to_string())
            .or_default()
            .insert(first.commit_id.clone(), first.clone());

        first.branch = "release".to_string();
        let mut source = AuthorCommits::new();
        source
            .entry("login:alice".to_string())
            .or_default()
            .insert(first.commit_id.clone(), first.clone());

        merge_authors(&mut target, &source);
        assert_eq!(commit_count(&target), 1);
        assert_eq!(target["login:alice"]["abc123"].branch, "release");
    }
}
