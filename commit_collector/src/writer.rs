use crate::api::{Error, Result};
use crate::model::{AuthorCommits, CommitRecord, CommitsById};
use crate::store::ObjectStore;
use chrono::NaiveDate;
use log::{debug, info};
use std::collections::BTreeMap;
use std::sync::Arc;

const BUCKET_FILE: &str = "commits.json";

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct WriteStats {
    pub written: usize,
    pub unchanged: usize,
}

impl std::ops::AddAssign for WriteStats {
    fn add_assign(&mut self, other: Self) {
        self.written += other.written;
        self.unchanged += other.unchanged;
    }
}

/// Reads, merges and writes back author buckets.
///
/// A record being written replaces the stored one with the same commit id; a bucket whose
/// merged content equals what is stored is not written again.
pub struct BucketWriter<STORE: ObjectStore> {
    store: Arc<STORE>,
    prefix: String,
}

impl<STORE: ObjectStore> BucketWriter<STORE> {
    pub fn new(store: Arc<STORE>, prefix: impl Into<String>) -> Self {
        BucketWriter {
            store,
            prefix: prefix.into(),
        }
    }

    pub fn bucket_key(&self, author_key: &str, day: NaiveDate) -> String {
        format!(
            "{}/{}/{}/{}",
            self.prefix,
            author_key.replace('%', "%25").replace('/', "%2F"),
            day.format("%Y-%m-%d"),
            BUCKET_FILE
        )
    }

    pub async fn read_bucket(&self, author_key: &str, day: NaiveDate) -> Result<CommitsById> {
        let key = self.bucket_key(author_key, day);
        match self.store.get(&key).await? {
            None => Ok(CommitsById::new()),
            Some(body) => {
                let records: Vec<CommitRecord> = serde_json::from_slice(&body)
                    .map_err(|err| Error::Store(format!("unreadable bucket {}: {}", key, err)))?;
                Ok(records.into_iter().map(|r| (r.commit_id.clone(), r)).collect())
            }
        }
    }

    /// Errors abort the write; buckets already written stay written.
    pub async fn write(&self, commits: &AuthorCommits) -> Result<WriteStats> {
        let mut stats = WriteStats::default();
        for (author, records) in commits {
            for (day, records) in by_day(records) {
                if self.merge_bucket(author, day, records).await? {
                    stats.written += 1;
                } else {
                    stats.unchanged += 1;
                }
            }
        }
        info!("Buckets written: {}, unchanged: {}", stats.written, stats.unchanged);
        Ok(stats)
    }

    async fn merge_bucket(&self, author: &str, day: NaiveDate, records: Vec<&CommitRecord>) -> Result<bool> {
        let existing = self.read_bucket(author, day).await?;
        let mut merged = existing.clone();
        for record in records {
            merged.insert(record.commit_id.clone(), record.clone());
        }
        if merged == existing {
            debug!("{}/{}: nothing new", author, day);
            return Ok(false);
        }
        let mut ordered: Vec<&CommitRecord> = merged.values().collect();
        ordered.sort_by(|a, b| (&a.repo, &a.commit_id).cmp(&(&b.repo, &b.commit_id)));
        let body = serde_json::to_vec_pretty(&ordered)?;
        self.store.put(&self.bucket_key(author, day), body).await?;
        debug!("{}/{}: {} -> {} commits", author, day, existing.len(), merged.len());
        Ok(true)
    }
}

fn by_day(records: &CommitsById) -> BTreeMap<NaiveDate, Vec<&CommitRecord>> {
    let mut days: BTreeMap<NaiveDate, Vec<&CommitRecord>> = BTreeMap::new();
    for record in records.values() {
        days.entry(record.day()).or_default().push(record);
    }
    days
}
