use crate::api::Result;
use crate::store::{list_all, ObjectStore};
use chrono::NaiveDate;
use log::{debug, info};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

const CACHE_NAMESPACE: &str = "_cache/v1";
const MARKER_SUFFIX: &str = ".done";

/// Completion markers: one empty object per (day, repository) fully traversed.
///
/// Markers live under their own namespace next to the author buckets and are never
/// read as data.
pub struct CacheIndex<STORE: ObjectStore> {
    store: Arc<STORE>,
    prefix: String,
}

impl<STORE: ObjectStore> CacheIndex<STORE> {
    pub fn new(store: Arc<STORE>, prefix: impl Into<String>) -> Self {
        CacheIndex {
            store,
            prefix: prefix.into(),
        }
    }

    fn day_prefix(&self, day: NaiveDate) -> String {
        format!("{}/{}/dt={}/", self.prefix, CACHE_NAMESPACE, day.format("%Y-%m-%d"))
    }

    pub fn marker_key(&self, day: NaiveDate, repo: &str) -> String {
        format!("{}repo={}{}", self.day_prefix(day), repo, MARKER_SUFFIX)
    }

    /// Repositories holding a marker for `day`.
    pub async fn list_processed(&self, day: NaiveDate) -> Result<BTreeSet<String>> {
        let prefix = self.day_prefix(day);
        let keys = list_all(self.store.as_ref(), &prefix).await?;
        Ok(keys
            .iter()
            .filter_map(|key| key.strip_prefix(&prefix))
            .filter_map(|name| name.strip_prefix("repo="))
            .filter_map(|name| name.strip_suffix(MARKER_SUFFIX))
            .map(str::to_string)
            .collect())
    }

    /// One listing per day, for use across many repositories.
    pub async fn snapshot(&self, days: &[NaiveDate]) -> Result<ProcessedDays> {
        let mut by_day = HashMap::new();
        for day in days {
            let repos = self.list_processed(*day).await?;
            debug!("{}: {} repositories already processed", day, repos.len());
            by_day.insert(*day, repos);
        }
        Ok(ProcessedDays {
            days: days.to_vec(),
            by_day,
        })
    }

    /// Convenience for a single repository; prefer `snapshot` when filtering many.
    pub async fn is_repo_fully_processed(&self, repo: &str, days: &[NaiveDate]) -> Result<bool> {
        Ok(self.snapshot(days).await?.is_fully_processed(repo))
    }

    pub async fn mark_processed(&self, repo: &str, days: &[NaiveDate]) -> Result<()> {
        for day in days {
            self.store.put(&self.marker_key(*day, repo), Vec::new()).await?;
        }
        info!("Marked {} processed for {} days", repo, days.len());
        Ok(())
    }
}

/// Markers of a window, read once at the start of a run.
#[derive(Debug, Default)]
pub struct ProcessedDays {
    days: Vec<NaiveDate>,
    by_day: HashMap<NaiveDate, BTreeSet<String>>,
}

impl ProcessedDays {
    pub fn is_fully_processed(&self, repo: &str) -> bool {
        !self.days.is_empty()
            && self
                .days
                .iter()
                .all(|day| self.by_day.get(day).map_or(false, |repos| repos.contains(repo)))
    }
}
