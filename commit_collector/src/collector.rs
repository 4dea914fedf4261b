use crate::api::{Client, Error, FailureKind, ForgeCommit, RepoDescriptor, Result};
use crate::model::{author_key, AuthorCommits, CommitRecord, Window};
use crate::rate_limit::{RateLimitGuard, COLLECT_MIN_REMAINING};
use log::{debug, info, trace, warn};
use std::collections::HashSet;
use std::sync::Arc;

/// Logins of automation accounts that do not carry a `[bot]` suffix everywhere.
const KNOWN_BOTS: &[&str] = &[
    "dependabot",
    "dependabot-preview",
    "github-actions",
    "renovate",
    "renovate-bot",
    "snyk-bot",
    "greenkeeper",
    "mergify",
    "codecov",
    "pre-commit-ci",
];

/// Commits of one repository traversal, deduplicated across branches.
#[derive(Debug, Default, PartialEq)]
pub struct RepoCommits {
    pub authors: AuthorCommits,
    pub included: usize,
    pub bots: usize,
    pub unresolved: usize,
    pub branches: usize,
    /// Branches whose listing failed and were left out.
    pub skipped_branches: Vec<String>,
}

#[derive(Debug)]
pub struct RepoOutcome {
    pub repo: String,
    pub status: String,
    pub result: std::result::Result<RepoCommits, FailureKind>,
}

impl RepoOutcome {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }

    pub fn failure(&self) -> Option<FailureKind> {
        self.result.as_ref().err().copied()
    }

    /// Every branch was listed; only then may the repository be marked processed.
    pub fn is_complete(&self) -> bool {
        matches!(&self.result, Ok(commits) if commits.skipped_branches.is_empty())
    }
}

/// A commit counts as automation when any of its author fields says so.
pub fn is_bot(commit: &ForgeCommit) -> bool {
    if let Some(login) = commit.author_login.as_deref() {
        if KNOWN_BOTS.contains(&login) || login.contains("[bot]") {
            return true;
        }
    }
    let Some(author) = commit.meta.author.as_ref() else {
        return false;
    };
    let name_says_bot = author
        .name
        .as_deref()
        .map_or(false, |name| name.to_lowercase().contains("bot"));
    let email_says_bot = author.email.as_deref().map_or(false, |email| {
        let email = email.to_lowercase();
        email.contains("noreply") || email.contains("bot")
    });
    name_says_bot || email_says_bot
}

fn has_identity(commit: &ForgeCommit) -> bool {
    commit.author_login.as_deref().map_or(false, |l| !l.is_empty()) || commit.meta.author.is_some()
}

pub struct Collector<CLIENT: Client> {
    client: Arc<CLIENT>,
    guard: RateLimitGuard<CLIENT>,
    org: String,
}

impl<CLIENT: Client> Clone for Collector<CLIENT> {
    fn clone(&self) -> Self {
        Collector {
            client: self.client.clone(),
            guard: self.guard.clone(),
            org: self.org.clone(),
        }
    }
}

impl<CLIENT: Client> Collector<CLIENT> {
    pub fn new(client: Arc<CLIENT>, org: impl Into<String>) -> Self {
        let guard = RateLimitGuard::new(client.clone());
        Collector {
            client,
            guard,
            org: org.into(),
        }
    }

    /// Never fails: every error ends up as the outcome's failure kind.
    pub async fn collect(&self, repo: &RepoDescriptor, window: &Window) -> RepoOutcome {
        match self.traverse(repo, window).await {
            Ok(commits) => {
                let mut status = format!(
                    "{}: {} commits on {} branches, {} bot commits excluded",
                    repo.name, commits.included, commits.branches, commits.bots
                );
                if !commits.skipped_branches.is_empty() {
                    status.push_str(&format!(", skipped branches: {}", commits.skipped_branches.join(", ")));
                }
                info!("{}", status);
                RepoOutcome {
                    repo: repo.name.clone(),
                    status,
                    result: Ok(commits),
                }
            }
            Err(err) => {
                let kind = err.kind();
                let status = format!("{}: failed ({}): {}", repo.name, kind, err);
                warn!("{}", status);
                RepoOutcome {
                    repo: repo.name.clone(),
                    status,
                    result: Err(kind),
                }
            }
        }
    }

    async fn traverse(&self, repo: &RepoDescriptor, window: &Window) -> Result<RepoCommits> {
        self.guard.ensure_quota(COLLECT_MIN_REMAINING).await?;
        let branches = self.client.branches(&self.org, &repo.name).await?;
        debug!("{}: {} branches", repo.name, branches.len());

        let full_name = format!("{}/{}", self.org, repo.name);
        let mut seen = HashSet::new();
        let mut out = RepoCommits {
            branches: branches.len(),
            ..Default::default()
        };
        for branch in &branches {
            let commits = match self
                .client
                .commits(&self.org, &repo.name, branch, window.since(), window.until())
                .await
            {
                Ok(commits) => commits,
                Err(err @ Error::QuotaExceeded { .. }) => return Err(err),
                Err(err) => {
                    warn!("{}@{}: skipping branch: {}", repo.name, branch, err);
                    out.skipped_branches.push(branch.clone());
                    continue;
                }
            };
            for commit in commits {
                if !seen.insert(commit.sha.clone()) {
                    trace!("{}@{}: {} already seen", repo.name, branch, commit.sha);
                    continue;
                }
                if !has_identity(&commit) {
                    out.unresolved += 1;
                    continue;
                }
                if is_bot(&commit) {
                    debug!("{}@{}: {} is a bot commit", repo.name, branch, commit.sha);
                    out.bots += 1;
                    continue;
                }
                let Some(record) = CommitRecord::from_forge(&commit, &full_name, branch) else {
                    out.unresolved += 1;
                    continue;
                };
                out.authors
                    .entry(author_key(&commit))
                    .or_default()
                    .insert(record.commit_id.clone(), record);
                out.included += 1;
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::api::{CommitMeta, RateLimitProbe, Signature};
    use crate::rate_limit::tests::core_probe;
    use async_trait::async_trait;
    use chrono::{DateTime, Duration, NaiveDate, Utc};
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    pub(crate) fn forge_commit(sha: &str, login: Option<&str>, name: &str, email: &str, date: &str) -> ForgeCommit {
        ForgeCommit {
            sha: sha.to_string(),
            author_login: login.map(str::to_string),
            committer_login: login.map(str::to_string),
            meta: CommitMeta {
                author: Some(Signature {
                    name: Some(name.to_string()),
                    email: Some(email.to_string()),
                    date: Some(date.parse().unwrap()),
                }),
                committer: None,
                message: format!("commit {}", sha),
                verified: false,
            },
            html_url: Some(format!("https://example.test/commit/{}", sha)),
            parent_count: 1,
        }
    }

    pub(crate) enum BranchCommits {
        Listed(Vec<ForgeCommit>),
        Fails(fn() -> Error),
    }

    /// In-memory forge: repo -> branch -> commits. Repos missing from the map fail branch listing.
    #[derive(Default)]
    pub(crate) struct FakeForge {
        pub(crate) repos: Vec<RepoDescriptor>,
        pub(crate) branches: HashMap<String, Vec<(String, BranchCommits)>>,
        pub(crate) quota_failures: HashMap<String, AtomicUsize>,
        pub(crate) branch_calls: AtomicUsize,
        /// Remaining quota every probe reports; plenty when unset.
        pub(crate) remaining: Option<u32>,
        pub(crate) probe_calls: AtomicUsize,
    }

    impl FakeForge {
        pub(crate) fn with_branch(mut self, repo: &str, branch: &str, commits: BranchCommits) -> Self {
            if !self.repos.iter().any(|r| r.name == repo) {
                self.repos.push(RepoDescriptor::new(repo.to_string(), false, None, None));
            }
            self.branches
                .entry(repo.to_string())
                .or_default()
                .push((branch.to_string(), commits));
            self
        }

        /// The first `times` branch listings of `repo` report an exhausted quota.
        pub(crate) fn with_quota_failures(mut self, repo: &str, times: usize) -> Self {
            self.quota_failures.insert(repo.to_string(), AtomicUsize::new(times));
            self
        }

        /// Every probe reports `remaining`, resetting 100 sec from now.
        pub(crate) fn with_remaining(mut self, remaining: u32) -> Self {
            self.remaining = Some(remaining);
            self
        }
    }

    #[async_trait]
    impl Client for FakeForge {
        async fn org_repos(&self, _org: &str) -> Result<Vec<RepoDescriptor>> {
            Ok(self.repos.clone())
        }

        async fn branches(&self, _org: &str, repo: &str) -> Result<Vec<String>> {
            self.branch_calls.fetch_add(1, Ordering::SeqCst);
            if let Some(left) = self.quota_failures.get(repo) {
                let before = left
                    .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                    .unwrap_or(0);
                if before > 0 {
                    return Err(Error::QuotaExceeded { reset: Utc::now() });
                }
            }
            match self.branches.get(repo) {
                Some(branches) => Ok(branches.iter().map(|(name, _)| name.clone()).collect()),
                None => Err(Error::Api {
                    status: 404,
                    message: format!("{} not found", repo),
                }),
            }
        }

        async fn commits(
            &self,
            _org: &str,
            repo: &str,
            branch: &str,
            since: DateTime<Utc>,
            until: DateTime<Utc>,
        ) -> Result<Vec<ForgeCommit>> {
            let branches = self.branches.get(repo).expect("listed repo");
            let (_, commits) = branches.iter().find(|(name, _)| name == branch).expect("listed branch");
            match commits {
                BranchCommits::Listed(commits) => Ok(commits
                    .iter()
                    .filter(|c| {
                        let date = c.meta.author.as_ref().and_then(|a| a.date);
                        date.map_or(true, |d| d >= since && d <= until)
                    })
                    .cloned()
                    .collect()),
                BranchCommits::Fails(err) => Err(err()),
            }
        }

        async fn rate_limit(&self) -> Result<RateLimitProbe> {
            self.probe_calls.fetch_add(1, Ordering::SeqCst);
            match self.remaining {
                Some(remaining) => Ok(core_probe(remaining, Utc::now() + Duration::seconds(100))),
                None => Ok(core_probe(5000, Utc::now() + Duration::seconds(3600))),
            }
        }
    }

    pub(crate) fn window() -> Window {
        let day = |s| NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap();
        Window::new(day("2025-03-01"), day("2025-03-07")).unwrap()
    }

    fn svc_api() -> FakeForge {
        FakeForge::default()
            .with_branch(
                "svc-api",
                "main",
                BranchCommits::Listed(vec![
                    forge_commit("abc123", Some("alice"), "Alice", "alice@acme.io", "2025-03-05T09:00:00Z"),
                    forge_commit(
                        "def456",
                        Some("dependabot[bot]"),
                        "dependabot[bot]",
                        "49699333+dependabot[bot]@users.noreply.github.com",
                        "2025-03-05T10:00:00Z",
                    ),
                ]),
            )
            .with_branch(
                "svc-api",
                "release",
                BranchCommits::Listed(vec![forge_commit(
                    "abc123",
                    Some("alice"),
                    "Alice",
                    "alice@acme.io",
                    "2025-03-05T09:00:00Z",
                )]),
            )
    }

    #[tokio::test]
    async fn dedups_across_branches_and_drops_bots() {
        let forge = svc_api();
        let repo = forge.repos[0].clone();
        let collector = Collector::new(Arc::new(forge), "acme");
        let outcome = collector.collect(&repo, &window()).await;

        assert!(outcome.is_complete());
        let commits = outcome.result.unwrap();
        assert_eq!(commits.included, 1);
        assert_eq!(commits.bots, 1);
        assert_eq!(commits.branches, 2);
        assert_eq!(commits.authors.len(), 1);
        let alice = &commits.authors["login:alice"];
        assert_eq!(alice.len(), 1);
        assert_eq!(alice["abc123"].branch, "main", "First branch should win");
        assert_eq!(alice["abc123"].repo, "acme/svc-api");
    }

    #[tokio::test]
    async fn failing_branch_is_skipped() {
        let forge = svc_api().with_branch(
            "svc-api",
            "broken",
            BranchCommits::Fails(|| Error::Api {
                status: 500,
                message: "boom".to_string(),
            }),
        );
        let repo = forge.repos[0].clone();
        let collector = Collector::new(Arc::new(forge), "acme");
        let outcome = collector.collect(&repo, &window()).await;

        assert!(outcome.is_success());
        assert!(!outcome.is_complete());
        assert!(outcome.status.contains("skipped branches: broken"));
        assert_eq!(outcome.result.unwrap().included, 1);
    }

    #[tokio::test]
    async fn quota_on_branch_fails_repository() {
        let forge = svc_api().with_branch(
            "svc-api",
            "hot",
            BranchCommits::Fails(|| Error::QuotaExceeded { reset: Utc::now() }),
        );
        let repo = forge.repos[0].clone();
        let collector = Collector::new(Arc::new(forge), "acme");
        let outcome = collector.collect(&repo, &window()).await;
        assert_eq!(outcome.failure(), Some(FailureKind::QuotaExceeded));
    }

    #[tokio::test]
    async fn branch_listing_error_is_api_failure() {
        let forge = FakeForge::default();
        let repo = RepoDescriptor::new("ghost".to_string(), false, None, None);
        let collector = Collector::new(Arc::new(forge), "acme");
        let outcome = collector.collect(&repo, &window()).await;
        assert_eq!(outcome.failure(), Some(FailureKind::Api));
        assert!(outcome.status.contains("ghost"));
    }

    #[tokio::test]
    async fn keys_by_email_without_login() {
        let forge = FakeForge::default().with_branch(
            "lib",
            "main",
            BranchCommits::Listed(vec![forge_commit(
                "e1",
                None,
                "Carol",
                "Carol@Acme.io",
                "2025-03-02T12:00:00Z",
            )]),
        );
        let repo = forge.repos[0].clone();
        let outcome = Collector::new(Arc::new(forge), "acme").collect(&repo, &window()).await;
        let commits = outcome.result.unwrap();
        assert!(commits.authors.contains_key("email:carol@acme.io"));
    }

    #[test]
    fn bot_classification() {
        let human = forge_commit("1", Some("alice"), "Alice", "alice@acme.io", "2025-03-05T09:00:00Z");
        assert!(!is_bot(&human));

        let known = forge_commit("2", Some("renovate"), "Renovate", "x@acme.io", "2025-03-05T09:00:00Z");
        assert!(is_bot(&known));

        let marker = forge_commit("3", Some("ci[bot]"), "CI", "ci@acme.io", "2025-03-05T09:00:00Z");
        assert!(is_bot(&marker));

        let by_name = forge_commit("4", None, "Release Bot", "release@acme.io", "2025-03-05T09:00:00Z");
        assert!(is_bot(&by_name));

        let by_email = forge_commit("5", None, "Deploy", "deploy@noreply.acme.io", "2025-03-05T09:00:00Z");
        assert!(is_bot(&by_email));

        let bot_email = forge_commit("6", None, "Continuous Integration", "ci-bot@acme.io", "2025-03-05T09:00:00Z");
        assert!(is_bot(&bot_email));
    }

    #[tokio::test(start_paused = true)]
    async fn collector_waits_only_below_its_threshold() {
        let forge = Arc::new(svc_api().with_remaining(60));
        let repo = forge.repos[0].clone();
        let started = tokio::time::Instant::now();
        let outcome = Collector::new(forge.clone(), "acme").collect(&repo, &window()).await;
        assert!(outcome.is_success());
        assert_eq!(forge.probe_calls.load(Ordering::SeqCst), 1);
        assert_eq!(started.elapsed(), std::time::Duration::ZERO);

        let forge = Arc::new(svc_api().with_remaining(20));
        let started = tokio::time::Instant::now();
        let outcome = Collector::new(forge.clone(), "acme").collect(&repo, &window()).await;
        assert!(outcome.is_success());
        assert_eq!(forge.probe_calls.load(Ordering::SeqCst), 2, "Quota should be probed again after waiting");
        let waited = started.elapsed().as_secs();
        assert!((100..=106).contains(&waited), "waited {} sec", waited);
    }

    #[test]
    fn commit_without_author_has_no_identity() {
        let mut commit = forge_commit("1", None, "x", "x@acme.io", "2025-03-05T09:00:00Z");
        commit.meta.author = None;
        assert!(!has_identity(&commit));
    }
}
