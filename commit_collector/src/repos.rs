use crate::api::{Client, Error, RepoDescriptor, Result};
use crate::model::Window;
use log::{debug, info};
use std::collections::BTreeSet;

/// Which repositories of the organization a run looks at.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RepoSelection {
    /// Explicit names; when non-empty only these are kept.
    pub names: BTreeSet<String>,
    /// Substring the name must contain.
    pub contains: Option<String>,
}

impl RepoSelection {
    /// Parses a comma separated list of names, ignoring blanks.
    pub fn with_names(mut self, list: &str) -> Self {
        self.names = list
            .split(',')
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .collect();
        self
    }

    pub fn with_substring(mut self, substring: impl Into<String>) -> Self {
        let substring = substring.into();
        self.contains = (!substring.is_empty()).then_some(substring);
        self
    }

    fn matches(&self, name: &str) -> bool {
        (self.names.is_empty() || self.names.contains(name))
            && self.contains.as_deref().map_or(true, |s| name.contains(s))
    }
}

/// Lists the organization's repositories that may hold commits inside `window`.
pub async fn active_repos<CLIENT: Client + ?Sized>(
    client: &CLIENT,
    org: &str,
    selection: &RepoSelection,
    window: &Window,
) -> Result<Vec<RepoDescriptor>> {
    if org.trim().is_empty() {
        return Err(Error::Config("organization is required".to_string()));
    }
    let repos = client.org_repos(org).await?;
    let listed = repos.len();
    let repos: Vec<RepoDescriptor> = repos
        .into_iter()
        .filter(|repo| selection.matches(&repo.name))
        .filter(|repo| is_active(repo, window))
        .collect();
    info!("Found {} active of {} repositories in {}", repos.len(), listed, org);
    Ok(repos)
}

fn is_active(repo: &RepoDescriptor, window: &Window) -> bool {
    if repo.archived {
        debug!("Skipping archived repository {}", repo.name);
        return false;
    }
    if repo.pushed_at.map_or(false, |pushed| pushed < window.since()) {
        debug!("Skipping {}: no push since {}", repo.name, window.since());
        return false;
    }
    if repo.created_at.map_or(false, |created| created > window.until()) {
        debug!("Skipping {}: created after {}", repo.name, window.until());
        return false;
    }
    true
}
