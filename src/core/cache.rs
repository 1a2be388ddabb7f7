use std::collections::{HashMap, VecDeque};
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

struct Entries<K, V> {
    map: HashMap<K, Arc<V>>,
    order: VecDeque<K>,
}

/// Content-addressed memo table shared by every stage of a session.
///
/// Entries are published once as `Arc<V>` and never mutated afterwards, so a reader holds either
/// a complete entry or nothing. With a capacity, the oldest entry is evicted first.
pub struct Cache<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    inner: Arc<RwLock<Entries<K, V>>>,
    capacity: Option<usize>,
}

impl<K, V> Clone for Cache<K, V>
where
    K: Eq + Hash + Clone + Send + Sync,
    V: Send + Sync,
{
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            capacity: self.capacity,
        }
    }
}

impl<K, V> Cache<K, V>
where
    K: Eq + Hash + Clone + Debug + Send + Sync,
    V: Send + Sync,
{
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(Entries {
                map: HashMap::new(),
                order: VecDeque::new(),
            })),
            capacity: None,
        }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity: Some(capacity.max(1)),
            ..Self::new()
        }
    }

    pub async fn get(&self, key: &K) -> Option<Arc<V>> {
        let entries = self.inner.read().await;
        let value = entries.map.get(key).cloned();
        if value.is_some() {
            debug!(?key, "Cache HIT");
        } else {
            debug!(?key, "Cache MISS");
        }
        value
    }

    /// Publishes `value` under `key` unless an entry already exists, and returns the entry that
    /// readers will see from now on.
    pub async fn publish(&self, key: K, value: V) -> Arc<V> {
        let mut entries = self.inner.write().await;
        if let Some(existing) = entries.map.get(&key) {
            debug!(?key, "Cache PUT skipped, entry already published");
            return Arc::clone(existing);
        }
        if let Some(capacity) = self.capacity {
            while entries.map.len() >= capacity {
                match entries.order.pop_front() {
                    Some(oldest) => {
                        debug!(key = ?oldest, "Cache EVICT");
                        entries.map.remove(&oldest);
                    }
                    None => break,
                }
            }
        }
        debug!(?key, "Cache PUT");
        let value = Arc::new(value);
        entries.order.push_back(key.clone());
        entries.map.insert(key, Arc::clone(&value));
        value
    }

    /// Returns the published entry for `key`, computing and publishing it on a miss.
    ///
    /// The computation runs without holding the lock; if another caller publishes first, that
    /// entry is returned and the local result is dropped.
    pub async fn get_or_try_publish<E, F>(&self, key: K, compute: F) -> Result<Arc<V>, E>
    where
        F: FnOnce() -> Result<V, E>,
    {
        if let Some(hit) = self.get(&key).await {
            return Ok(hit);
        }
        let value = compute()?;
        Ok(self.publish(key, value).await)
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.map.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn clear(&self) {
        let mut entries = self.inner.write().await;
        entries.map.clear();
        entries.order.clear();
        debug!("Cache CLEAR");
    }
}

impl<K, V> Default for Cache<K, V>
where
    K: Eq + Hash + Clone + Debug + Send + Sync,
    V: Send + Sync,
{
    fn default() -> Self {
        Self::new()
    }
}
