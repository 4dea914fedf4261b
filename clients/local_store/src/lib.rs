use async_trait::async_trait;
use commit_collector::api::{Error, Result};
use commit_collector::store::{ListPage, ObjectStore};
use log::debug;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

const DEFAULT_PAGE_SIZE: usize = 1000;

/// Object store kept in a directory, one file per key. `/` in keys maps to subdirectories.
pub struct LocalStore {
    root: PathBuf,
    page_size: usize,
}

impl LocalStore {
    /// Store rooted at `<store_root>/<bucket>`.
    pub fn new<P: AsRef<Path>>(store_root: P, bucket: &str) -> Result<Self> {
        if bucket.trim().is_empty() {
            return Err(Error::Config("bucket is required".to_string()));
        }
        Ok(LocalStore {
            root: store_root.as_ref().join(bucket),
            page_size: DEFAULT_PAGE_SIZE,
        })
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    fn path(&self, key: &str) -> Result<PathBuf> {
        let mut path = self.root.clone();
        for segment in key.split('/') {
            if segment.is_empty() || segment == "." || segment == ".." {
                return Err(Error::Store(format!("invalid key {}", key)));
            }
            path.push(segment);
        }
        Ok(path)
    }

    /// Keys under the directory part of `prefix`, sorted. Only that subtree is walked.
    async fn keys(&self, prefix: &str) -> Result<Vec<String>> {
        let dir_prefix = prefix.rfind('/').map_or("", |at| &prefix[..=at]);
        let start = match dir_prefix.trim_end_matches('/') {
            "" => self.root.clone(),
            dir => self.path(dir)?,
        };
        let mut keys = Vec::new();
        let mut pending = vec![(start, dir_prefix.to_string())];
        while let Some((dir, key_prefix)) = pending.pop() {
            let mut entries = match tokio::fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(err) if err.kind() == ErrorKind::NotFound => continue,
                Err(err) => return Err(err.into()),
            };
            while let Some(entry) = entries.next_entry().await? {
                let name = entry.file_name().to_string_lossy().into_owned();
                let key = format!("{}{}", key_prefix, name);
                if entry.file_type().await?.is_dir() {
                    pending.push((entry.path(), format!("{}/", key)));
                } else {
                    keys.push(key);
                }
            }
        }
        keys.sort();
        Ok(keys)
    }
}

#[async_trait]
impl ObjectStore for LocalStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        match tokio::fs::read(self.path(key)?).await {
            Ok(body) => Ok(Some(body)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    async fn put(&self, key: &str, body: Vec<u8>) -> Result<()> {
        let path = self.path(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        debug!("Writing {} bytes to {}", body.len(), path.display());
        tokio::fs::write(path, body).await?;
        Ok(())
    }

    async fn list(&self, prefix: &str, continuation: Option<String>) -> Result<ListPage> {
        let mut keys = self
            .keys(prefix)
            .await?
            .into_iter()
            .filter(|key| key.starts_with(prefix))
            .filter(|key| continuation.as_deref().map_or(true, |after| key.as_str() > after))
            .take(self.page_size + 1)
            .collect::<Vec<_>>();
        let next = if keys.len() > self.page_size {
            keys.truncate(self.page_size);
            keys.last().cloned()
        } else {
            None
        };
        Ok(ListPage::new(keys, next))
    }
}
