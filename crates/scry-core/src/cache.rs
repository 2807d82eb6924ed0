use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Mutex, OnceLock};

/// Bounded process-local cache for provider HTTP clients and model sessions.
///
/// Declared as a `static`; entries are keyed by whatever makes two clients
/// interchangeable (timeout, model id). Lock poisoning never fails the caller:
/// a freshly built value is returned without being cached.
pub struct ClientCache<K, V> {
    slots: OnceLock<Mutex<HashMap<K, V>>>,
    capacity: usize,
}

impl<K, V> ClientCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub const fn new(capacity: usize) -> Self {
        Self {
            slots: OnceLock::new(),
            capacity,
        }
    }

    pub fn get_or_try_insert<E, F>(&self, key: K, build: F) -> Result<V, E>
    where
        F: FnOnce() -> Result<V, E>,
    {
        if self.capacity == 0 {
            return build();
        }
        let slots = self.slots.get_or_init(|| Mutex::new(HashMap::new()));

        if let Ok(guard) = slots.lock()
            && let Some(hit) = guard.get(&key)
        {
            return Ok(hit.clone());
        }

        // Built outside the lock: client construction can be slow.
        let value = build()?;

        if let Ok(mut guard) = slots.lock() {
            if let Some(existing) = guard.get(&key) {
                return Ok(existing.clone());
            }
            if guard.len() >= self.capacity
                && let Some(victim) = guard.keys().next().cloned()
            {
                guard.remove(&victim);
            }
            guard.insert(key, value.clone());
        }
        Ok(value)
    }

    pub fn len(&self) -> usize {
        self.slots
            .get()
            .and_then(|slots| slots.lock().ok().map(|guard| guard.len()))
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn same_timeout_reuses_client() {
        static CLIENTS: ClientCache<u64, String> = ClientCache::new(4);
        let builds = AtomicUsize::new(0);

        let first = CLIENTS
            .get_or_try_insert(30_000, || {
                builds.fetch_add(1, Ordering::SeqCst);
                Ok::<_, ()>("client-30s".to_string())
            })
            .unwrap();
        let second = CLIENTS
            .get_or_try_insert(30_000, || {
                builds.fetch_add(1, Ordering::SeqCst);
                Ok::<_, ()>("other".to_string())
            })
            .unwrap();

        assert_eq!(first, "client-30s");
        assert_eq!(second, "client-30s");
        assert_eq!(builds.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn capacity_bounds_entries() {
        static CLIENTS: ClientCache<u64, u64> = ClientCache::new(1);
        CLIENTS.get_or_try_insert(1, || Ok::<_, ()>(1)).unwrap();
        CLIENTS.get_or_try_insert(2, || Ok::<_, ()>(2)).unwrap();
        assert_eq!(CLIENTS.len(), 1);
        assert_eq!(CLIENTS.get_or_try_insert(2, || Err("rebuilt")), Ok(2));
    }

    #[test]
    fn build_errors_are_not_cached() {
        static CLIENTS: ClientCache<&'static str, u32> = ClientCache::new(2);
        let err = CLIENTS.get_or_try_insert("bad", || Err::<u32, _>("tls init failed"));
        assert_eq!(err, Err("tls init failed"));
        assert!(CLIENTS.is_empty());
    }

    #[test]
    fn zero_capacity_always_builds() {
        static CLIENTS: ClientCache<u8, u8> = ClientCache::new(0);
        assert_eq!(CLIENTS.get_or_try_insert(1, || Ok::<_, ()>(7)), Ok(7));
        assert_eq!(CLIENTS.get_or_try_insert(1, || Ok::<_, ()>(8)), Ok(8));
        assert!(CLIENTS.is_empty());
    }
}
