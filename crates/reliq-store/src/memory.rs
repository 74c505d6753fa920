use crate::{Result, Store, StoreError};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;

/// One stored value. Mirrors the Redis type split the protocol relies on:
/// plain values (payloads and counters), lists (queues and in-flight
/// records), and sets (consumer registrations).
#[derive(Debug)]
enum Entry {
    Value(Vec<u8>),
    List(VecDeque<String>),
    Set(HashSet<String>),
}

#[derive(Debug)]
struct Inner {
    data: Mutex<HashMap<String, Entry>>,
    /// Bumped on every list write so blocked poppers re-check
    version: watch::Sender<u64>,
}

/// In-process store with the same operation semantics as [`crate::RedisStore`].
///
/// Clones share state, so one `MemoryStore` can stand in for a Redis server
/// shared by several clients under test. TTLs are accepted and ignored.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

impl MemoryStore {
    /// Create a new empty store
    pub fn new() -> Self {
        let (version, _) = watch::channel(0u64);
        Self {
            inner: Arc::new(Inner {
                data: Mutex::new(HashMap::new()),
                version,
            }),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Entry>> {
        // A poisoned lock means a panic mid-mutation in this process;
        // the data is still consistent for the single-key ops used here.
        match self.inner.data.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn bump_version(&self) {
        self.inner.version.send_modify(|v| *v = v.wrapping_add(1));
    }

    fn try_pop_push(&self, source: &str, destination: &str) -> Result<Option<String>> {
        let mut data = self.lock();

        let popped = match data.get_mut(source) {
            Some(Entry::List(list)) => list.pop_back(),
            Some(_) => return Err(StoreError::wrong_type(source, "list")),
            None => None,
        };

        let Some(value) = popped else {
            return Ok(None);
        };

        if matches!(data.get(source), Some(Entry::List(list)) if list.is_empty()) {
            data.remove(source);
        }

        match data
            .entry(destination.to_string())
            .or_insert_with(|| Entry::List(VecDeque::new()))
        {
            Entry::List(list) => list.push_front(value.clone()),
            _ => return Err(StoreError::wrong_type(destination, "list")),
        }

        drop(data);
        self.bump_version();
        Ok(Some(value))
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let data = self.lock();
        match data.get(key) {
            Some(Entry::Value(value)) => Ok(Some(value.clone())),
            Some(_) => Err(StoreError::wrong_type(key, "value")),
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &[u8], _ttl: Option<Duration>) -> Result<()> {
        let mut data = self.lock();
        data.insert(key.to_string(), Entry::Value(value.to_vec()));
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let mut data = self.lock();
        Ok(data.remove(key).is_some())
    }

    async fn set_add(&self, key: &str, member: &str) -> Result<bool> {
        let mut data = self.lock();
        match data
            .entry(key.to_string())
            .or_insert_with(|| Entry::Set(HashSet::new()))
        {
            Entry::Set(set) => Ok(set.insert(member.to_string())),
            _ => Err(StoreError::wrong_type(key, "set")),
        }
    }

    async fn set_members(&self, key: &str) -> Result<Vec<String>> {
        let data = self.lock();
        match data.get(key) {
            Some(Entry::Set(set)) => Ok(set.iter().cloned().collect()),
            Some(_) => Err(StoreError::wrong_type(key, "set")),
            None => Ok(Vec::new()),
        }
    }

    async fn list_push(&self, key: &str, value: &str) -> Result<()> {
        {
            let mut data = self.lock();
            match data
                .entry(key.to_string())
                .or_insert_with(|| Entry::List(VecDeque::new()))
            {
                Entry::List(list) => list.push_front(value.to_string()),
                _ => return Err(StoreError::wrong_type(key, "list")),
            }
        }
        self.bump_version();
        Ok(())
    }

    async fn list_range(&self, key: &str) -> Result<Vec<String>> {
        let data = self.lock();
        match data.get(key) {
            Some(Entry::List(list)) => Ok(list.iter().cloned().collect()),
            Some(_) => Err(StoreError::wrong_type(key, "list")),
            None => Ok(Vec::new()),
        }
    }

    async fn list_remove(&self, key: &str, value: &str) -> Result<usize> {
        let mut data = self.lock();
        let Some(entry) = data.get_mut(key) else {
            return Ok(0);
        };
        let Entry::List(list) = entry else {
            return Err(StoreError::wrong_type(key, "list"));
        };

        let before = list.len();
        list.retain(|v| v != value);
        let removed = before - list.len();

        if list.is_empty() {
            data.remove(key);
        }
        Ok(removed)
    }

    async fn pop_push(&self, source: &str, destination: &str) -> Result<Option<String>> {
        self.try_pop_push(source, destination)
    }

    async fn blocking_pop_push(
        &self,
        source: &str,
        destination: &str,
        timeout: Duration,
    ) -> Result<Option<String>> {
        let mut rx = self.inner.version.subscribe();
        loop {
            if let Some(value) = self.try_pop_push(source, destination)? {
                return Ok(Some(value));
            }

            if timeout.is_zero() {
                if rx.changed().await.is_err() {
                    return Err(StoreError::Closed);
                }
            } else {
                match tokio::time::timeout(timeout, rx.changed()).await {
                    Ok(Ok(())) => {}
                    Ok(Err(_)) => return Err(StoreError::Closed),
                    Err(_) => return Ok(None),
                }
            }
        }
    }

    async fn decrement(&self, key: &str) -> Result<i64> {
        let mut data = self.lock();
        let entry = data
            .entry(key.to_string())
            .or_insert_with(|| Entry::Value(b"0".to_vec()));
        let Entry::Value(value) = entry else {
            return Err(StoreError::wrong_type(key, "integer"));
        };

        let current: i64 = std::str::from_utf8(value)
            .ok()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| {
                StoreError::query(format!("Value at '{key}' is not an integer"))
            })?;

        let new_value = current - 1;
        *value = new_value.to_string().into_bytes();
        Ok(new_value)
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    async fn blocking_handle(&self) -> Result<Arc<dyn Store>> {
        // No connection to monopolize; a clone shares the same state.
        Ok(Arc::new(self.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_get_set_round_trip() {
        let fixture = MemoryStore::new();
        fixture.set("k", b"payload", None).await.unwrap();

        let actual = fixture.get("k").await.unwrap();
        let expected = Some(b"payload".to_vec());
        assert_eq!(actual, expected);
    }

    #[tokio::test]
    async fn test_get_missing_key() {
        let fixture = MemoryStore::new();
        let actual = fixture.get("missing").await.unwrap();
        assert_eq!(actual, None);
    }

    #[tokio::test]
    async fn test_delete() {
        let fixture = MemoryStore::new();
        fixture.set("k", b"v", None).await.unwrap();

        assert!(fixture.delete("k").await.unwrap());
        assert!(!fixture.delete("k").await.unwrap());
        assert_eq!(fixture.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_set_add_reports_new_members() {
        let fixture = MemoryStore::new();

        assert!(fixture.set_add("consumers", "b").await.unwrap());
        assert!(!fixture.set_add("consumers", "b").await.unwrap());

        let mut actual = fixture.set_members("consumers").await.unwrap();
        actual.sort();
        assert_eq!(actual, vec!["b".to_string()]);
    }

    #[tokio::test]
    async fn test_set_members_missing_key_is_empty() {
        let fixture = MemoryStore::new();
        let actual = fixture.set_members("missing").await.unwrap();
        assert!(actual.is_empty());
    }

    #[tokio::test]
    async fn test_list_is_fifo_through_pop_push() {
        let fixture = MemoryStore::new();
        fixture.list_push("q", "first").await.unwrap();
        fixture.list_push("q", "second").await.unwrap();

        let actual = fixture.pop_push("q", "inflight").await.unwrap();
        assert_eq!(actual, Some("first".to_string()));

        let actual = fixture.pop_push("q", "inflight").await.unwrap();
        assert_eq!(actual, Some("second".to_string()));

        // Destination receives pushes at the head: newest first
        let actual = fixture.list_range("inflight").await.unwrap();
        assert_eq!(actual, vec!["second".to_string(), "first".to_string()]);
    }

    #[tokio::test]
    async fn test_pop_push_empty_source() {
        let fixture = MemoryStore::new();
        let actual = fixture.pop_push("empty", "dest").await.unwrap();
        assert_eq!(actual, None);
    }

    #[tokio::test]
    async fn test_list_remove_by_value() {
        let fixture = MemoryStore::new();
        fixture.list_push("l", "a").await.unwrap();
        fixture.list_push("l", "b").await.unwrap();
        fixture.list_push("l", "a").await.unwrap();

        let actual = fixture.list_remove("l", "a").await.unwrap();
        assert_eq!(actual, 2);

        let actual = fixture.list_remove("l", "a").await.unwrap();
        assert_eq!(actual, 0);

        assert_eq!(fixture.list_range("l").await.unwrap(), vec!["b".to_string()]);
    }

    #[tokio::test]
    async fn test_decrement_counts_down() {
        let fixture = MemoryStore::new();
        fixture.set("reads", b"2", None).await.unwrap();

        assert_eq!(fixture.decrement("reads").await.unwrap(), 1);
        assert_eq!(fixture.decrement("reads").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_decrement_missing_key_starts_at_zero() {
        let fixture = MemoryStore::new();
        let actual = fixture.decrement("missing").await.unwrap();
        assert_eq!(actual, -1);
    }

    #[tokio::test]
    async fn test_wrong_type_errors() {
        let fixture = MemoryStore::new();
        fixture.set("k", b"v", None).await.unwrap();

        assert!(fixture.list_push("k", "x").await.is_err());
        assert!(fixture.set_add("k", "x").await.is_err());
        assert!(fixture.decrement("k").await.is_err());
    }

    #[tokio::test]
    async fn test_blocking_pop_push_wakes_on_push() {
        let fixture = MemoryStore::new();
        let store = fixture.clone();

        let waiter = tokio::spawn(async move {
            store
                .blocking_pop_push("q", "inflight", Duration::ZERO)
                .await
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        fixture.list_push("q", "m1").await.unwrap();

        let actual = waiter.await.unwrap().unwrap();
        assert_eq!(actual, Some("m1".to_string()));
        assert_eq!(
            fixture.list_range("inflight").await.unwrap(),
            vec!["m1".to_string()]
        );
    }

    #[tokio::test]
    async fn test_blocking_pop_push_times_out() {
        let fixture = MemoryStore::new();
        let actual = fixture
            .blocking_pop_push("q", "inflight", Duration::from_millis(20))
            .await
            .unwrap();
        assert_eq!(actual, None);
    }

    #[tokio::test]
    async fn test_clones_share_state() {
        let fixture = MemoryStore::new();
        let clone = fixture.clone();

        fixture.set("k", b"v", None).await.unwrap();
        let actual = clone.get("k").await.unwrap();
        assert_eq!(actual, Some(b"v".to_vec()));
    }
}
