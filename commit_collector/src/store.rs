use crate::api::Result;
use async_trait::async_trait;
use derive_more::Constructor;
use std::collections::BTreeMap;
use std::sync::Mutex;

/// One page of a key listing. `next` is the continuation to pass to the following call.
#[derive(Debug, Default, PartialEq, Eq, Constructor)]
pub struct ListPage {
    pub keys: Vec<String>,
    pub next: Option<String>,
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// `Ok(None)` when the object does not exist.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    async fn put(&self, key: &str, body: Vec<u8>) -> Result<()>;

    async fn list(&self, prefix: &str, continuation: Option<String>) -> Result<ListPage>;
}

/// Follows continuations until the listing is exhausted.
pub async fn list_all<S: ObjectStore + ?Sized>(store: &S, prefix: &str) -> Result<Vec<String>> {
    let mut keys = Vec::new();
    let mut continuation = None;
    loop {
        let page = store.list(prefix, continuation).await?;
        keys.extend(page.keys);
        match page.next {
            Some(next) => continuation = Some(next),
            None => return Ok(keys),
        }
    }
}

/// Keeps objects in memory. Listing is paged like a remote store would be.
pub struct MemoryStore {
    objects: Mutex<BTreeMap<String, Vec<u8>>>,
    page_size: usize,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::with_page_size(1000)
    }
}

impl MemoryStore {
    pub fn with_page_size(page_size: usize) -> Self {
        MemoryStore {
            objects: Mutex::new(BTreeMap::new()),
            page_size: page_size.max(1),
        }
    }

    pub fn keys(&self) -> Vec<String> {
        self.lock().keys().cloned().collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, Vec<u8>>> {
        // a poisoned map is still a consistent map, writes are single inserts
        self.objects.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.lock().get(key).cloned())
    }

    async fn put(&self, key: &str, body: Vec<u8>) -> Result<()> {
        self.lock().insert(key.to_string(), body);
        Ok(())
    }

    async fn list(&self, prefix: &str, continuation: Option<String>) -> Result<ListPage> {
        let objects = self.lock();
        let mut keys = objects
            .keys()
            .filter(|key| key.starts_with(prefix))
            .filter(|key| continuation.as_deref().map_or(true, |after| key.as_str() > after))
            .take(self.page_size + 1)
            .cloned()
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
