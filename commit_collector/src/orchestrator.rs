use crate::api::{Client, FailureKind, RepoDescriptor, Result};
use crate::cache::CacheIndex;
use crate::collector::{Collector, RepoOutcome};
use crate::model::{commit_count, merge_authors, AuthorCommits, Window};
use crate::rate_limit::{RateLimitGuard, DISPATCH_MIN_REMAINING};
use crate::repos::{active_repos, RepoSelection};
use crate::retry::QuotaRetry;
use crate::store::ObjectStore;
use crate::writer::{BucketWriter, WriteStats};
use futures::{stream, StreamExt};
use log::{error, info, warn};
use std::fmt::Display;
use std::sync::Arc;
use tokio::task::JoinError;

#[derive(Debug, Clone)]
pub struct RunConfig {
    pub org: String,
    pub window: Window,
    pub selection: RepoSelection,
    /// Key prefix of buckets and completion markers.
    pub prefix: String,
    pub workers: usize,
    /// Completed repositories between two flushes.
    pub batch_size: usize,
    /// 0 means no cap.
    pub max_repos: usize,
    /// Ignore completion markers when choosing repositories.
    pub force: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoFailure {
    pub repo: String,
    pub kind: FailureKind,
    pub status: String,
}

#[derive(Debug, Default)]
pub struct RunSummary {
    pub listed: usize,
    pub cached: usize,
    pub capped: usize,
    pub succeeded: usize,
    pub failures: Vec<RepoFailure>,
    pub commits: usize,
    pub authors: usize,
    pub bots: usize,
    pub buckets: WriteStats,
    pub flushes: usize,
    pub marked: usize,
}

impl Display for RunSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_fmt(format_args!(
            "repositories: {} active, {} cached, {} capped, {} ok, {} failed; commits: {} from {} authors ({} bot commits excluded); buckets: {} written, {} unchanged",
            self.listed,
            self.cached,
            self.capped,
            self.succeeded,
            self.failures.len(),
            self.commits,
            self.authors,
            self.bots,
            self.buckets.written,
            self.buckets.unchanged
        ))
    }
}

/// Records collected since the last flush and the repositories they complete.
#[derive(Default)]
struct Batch {
    authors: AuthorCommits,
    complete_repos: Vec<String>,
    completed: usize,
}

/// Runs one collection over the organization.
///
/// Collectors run as tokio tasks, at most `workers` at a time, and hand back their own
/// results. Only the task driving `run` touches the accumulated maps, so no locking is
/// needed around them.
pub struct Orchestrator<CLIENT: Client, STORE: ObjectStore> {
    client: Arc<CLIENT>,
    collector: Collector<CLIENT>,
    guard: RateLimitGuard<CLIENT>,
    cache: CacheIndex<STORE>,
    writer: BucketWriter<STORE>,
    retry: QuotaRetry,
    config: RunConfig,
}

impl<CLIENT, STORE> Orchestrator<CLIENT, STORE>
where
    CLIENT: 'static + Client,
    STORE: 'static + ObjectStore,
{
    pub fn new(client: Arc<CLIENT>, store: Arc<STORE>, config: RunConfig) -> Self {
        Orchestrator {
            collector: Collector::new(client.clone(), config.org.clone()),
            guard: RateLimitGuard::new(client.clone()),
            cache: CacheIndex::new(store.clone(), config.prefix.clone()),
            writer: BucketWriter::new(store, config.prefix.clone()),
            retry: QuotaRetry::default(),
            client,
            config,
        }
    }

    /// Fails only when listing repositories, reading markers or writing buckets fails.
    /// Failing repositories are reported in the summary.
    pub async fn run(&self) -> Result<RunSummary> {
        let mut summary = RunSummary::default();
        let window = self.config.window;
        info!(
            "Collecting {} commits from {} to {}",
            self.config.org,
            window.start(),
            window.end()
        );

        let repos = active_repos(self.client.as_ref(), &self.config.org, &self.config.selection, &window).await?;
        summary.listed = repos.len();
        let repos = self.eligible(repos, &mut summary).await?;
        info!("Dispatching {} repositories to {} workers", repos.len(), self.config.workers);

        let mut collected = AuthorCommits::new();
        let mut batch = Batch::default();
        let mut completions = self.dispatch(repos);
        while let Some((repo, outcome)) = completions.next().await {
            let outcome = self
                .retry
                .retry(
                    outcome,
                    || wait_for_quota(&self.guard),
                    || self.collector.collect(&repo, &window),
                )
                .await;
            self.accept(outcome, &mut collected, &mut batch, &mut summary);
            if batch.completed >= self.config.batch_size.max(1) {
                self.flush(&mut batch, &mut summary).await?;
            }
        }
        self.flush(&mut batch, &mut summary).await?;

        summary.commits = commit_count(&collected);
        summary.authors = collected.len();
        info!("{}", summary);
        for failure in &summary.failures {
            warn!("Failed repository {} ({}): {}", failure.repo, failure.kind, failure.status);
        }
        Ok(summary)
    }

    async fn eligible(&self, mut repos: Vec<RepoDescriptor>, summary: &mut RunSummary) -> Result<Vec<RepoDescriptor>> {
        if self.config.force {
            info!("Force reprocess: ignoring completion markers");
        } else {
            let processed = self.cache.snapshot(&self.config.window.days()).await?;
            let before = repos.len();
            repos.retain(|repo| !processed.is_fully_processed(&repo.name));
            summary.cached = before - repos.len();
            info!("{} repositories already processed for the whole window", summary.cached);
        }
        if self.config.max_repos > 0 && repos.len() > self.config.max_repos {
            summary.capped = repos.len() - self.config.max_repos;
            repos.truncate(self.config.max_repos);
        }
        Ok(repos)
    }

    fn dispatch(
        &self,
        repos: Vec<RepoDescriptor>,
    ) -> stream::BoxStream<'static, (RepoDescriptor, RepoOutcome)> {
        let collector = self.collector.clone();
        let guard = self.guard.clone();
        let window = self.config.window;
        stream::iter(repos)
            .then(move |repo| {
                let collector = collector.clone();
                let guard = guard.clone();
                async move {
                    wait_for_quota(&guard).await;
                    let task_repo = repo.clone();
                    let handle = tokio::spawn(async move { collector.collect(&task_repo, &window).await });
                    (repo, handle)
                }
            })
            .map(|(repo, handle)| async move {
                let outcome = handle.await.unwrap_or_else(|err| crashed(&repo, err));
                (repo, outcome)
            })
            .buffer_unordered(self.config.workers.max(1))
            .boxed()
    }

    fn accept(&self, outcome: RepoOutcome, collected: &mut AuthorCommits, batch: &mut Batch, summary: &mut RunSummary) {
        batch.completed += 1;
        let complete = outcome.is_complete();
        match outcome.result {
            Ok(commits) => {
                merge_authors(collected, &commits.authors);
                merge_authors(&mut batch.authors, &commits.authors);
                summary.succeeded += 1;
                summary.bots += commits.bots;
                if complete {
                    batch.complete_repos.push(outcome.repo);
                }
            }
            Err(kind) => summary.failures.push(RepoFailure {
                repo: outcome.repo,
                kind,
                status: outcome.status,
            }),
        }
    }

    /// Writes the pending records, then marks the repositories they complete.
    async fn flush(&self, batch: &mut Batch, summary: &mut RunSummary) -> Result<()> {
        if batch.completed == 0 {
            return Ok(());
        }
        let pending = std::mem::take(batch);
        if !pending.authors.is_empty() {
            summary.buckets += self.writer.write(&pending.authors).await?;
        }
        summary.flushes += 1;
        let days = self.config.window.days();
        for repo in &pending.complete_repos {
            match self.cache.mark_processed(repo, &days).await {
                Ok(()) => summary.marked += 1,
                Err(err) => warn!("Could not mark {} processed: {}", repo, err),
            }
        }
        Ok(())
    }
}

async fn wait_for_quota<CLIENT: Client>(guard: &RateLimitGuard<CLIENT>) {
    if let Err(err) = guard.ensure_quota(DISPATCH_MIN_REMAINING).await {
        warn!("Quota probe failed, continuing: {}", err);
    }
}

fn crashed(repo: &RepoDescriptor, err: JoinError) -> RepoOutcome {
    let status = format!("{}: collector task crashed: {}", repo.name, err);
    error!("{}", status);
    RepoOutcome {
        repo: repo.name.clone(),
        status,
        result: Err(FailureKind::Unexpected),
    }
}
