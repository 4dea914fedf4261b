mod args;

pub use args::Args;

use commit_collector::{Error, ObjectStore, Orchestrator, RepoSelection, Result, RunConfig, RunSummary, Window};
use github_client::GithubClientBuilder;
use local_store::LocalStore;
use log::info;
use std::sync::Arc;

/// Collects the window into `<store_root>/<bucket>`.
pub async fn collect_commits(args: Args) -> Result<RunSummary> {
    let store = LocalStore::new(&args.store_root, &args.bucket)?;
    info!("Storing into {}", args.store_root.join(&args.bucket).display());
    collect_commits_into(args, Arc::new(store)).await
}

/// Collects the window into the given store. Configuration is validated before any request.
pub async fn collect_commits_into<STORE>(args: Args, store: Arc<STORE>) -> Result<RunSummary>
where
    STORE: 'static + ObjectStore,
{
    let token = args
        .api_token
        .ok_or_else(|| Error::Config("API token is required".to_string()))?;
    if args.org.trim().is_empty() {
        return Err(Error::Config("organization is required".to_string()));
    }
    if args.bucket.trim().is_empty() {
        return Err(Error::Config("bucket is required".to_string()));
    }
    let prefix = args.prefix.trim().trim_matches('/').to_string();
    if prefix.is_empty() {
        return Err(Error::Config("prefix is required".to_string()));
    }
    let window = Window::new(args.since, args.until)?;

    let client = GithubClientBuilder::default()
        .with_github_url(&args.api_url)
        .with_insecure_transport(args.insecure)
        .try_with_token(token)?
        .build()?;

    let mut selection = RepoSelection::default();
    if let Some(repos) = &args.repos {
        selection = selection.with_names(repos);
    }
    if let Some(filter) = args.repo_filter {
        selection = selection.with_substring(filter);
    }

    let config = RunConfig {
        org: args.org.trim().to_string(),
        window,
        selection,
        prefix,
        workers: args.workers,
        batch_size: args.batch_size,
        max_repos: args.max_repos,
        force: args.force,
    };

    Orchestrator::new(Arc::new(client), store, config).run().await
}
