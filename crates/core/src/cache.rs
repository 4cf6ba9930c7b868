use std::collections::HashMap;
use std::fmt;

use tracing::warn;

use crate::{CachedMetadata, MetadataKind, TableName};

/// Opaque key/value store used to persist metadata across process restarts.
pub trait CacheBackend: Send {
    fn load(&mut self, key: &str) -> Option<Vec<u8>>;
    fn save(&mut self, key: &str, data: &[u8], tags: &[&str]);
    fn remove(&mut self, key: &str);
    fn clean(&mut self, tags: &[&str]);
}

/// Process-local cache of introspection results, optionally mirrored to a
/// [`CacheBackend`].
pub struct MetadataCache {
    enabled: bool,
    prefix: String,
    entries: HashMap<(String, MetadataKind), CachedMetadata>,
    backend: Option<Box<dyn CacheBackend>>,
}

impl fmt::Debug for MetadataCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MetadataCache")
            .field("enabled", &self.enabled)
            .field("prefix", &self.prefix)
            .field("entries", &self.entries.len())
            .field("backend", &self.backend.is_some())
            .finish()
    }
}

impl MetadataCache {
    pub fn new(prefix: impl Into<String>, enabled: bool) -> Self {
        Self {
            enabled,
            prefix: prefix.into(),
            entries: HashMap::new(),
            backend: None,
        }
    }

    #[must_use]
    pub fn with_backend(mut self, backend: Box<dyn CacheBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    pub fn set_backend(&mut self, backend: Box<dyn CacheBackend>) {
        self.backend = Some(backend);
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn backend_key(&self, table: &TableName, kind: MetadataKind) -> String {
        format!("{}_{}_{}", self.prefix, table.cache_key(), kind.as_str())
    }

    pub fn get(&mut self, table: &TableName, kind: MetadataKind) -> Option<CachedMetadata> {
        if !self.enabled {
            return None;
        }
        let local_key = (table.cache_key(), kind);
        if let Some(entry) = self.entries.get(&local_key) {
            return Some(entry.clone());
        }

        let key = self.backend_key(table, kind);
        let backend = self.backend.as_mut()?;
        let bytes = backend.load(&key)?;
        match serde_json::from_slice::<CachedMetadata>(&bytes) {
            Ok(entry) if entry.kind() == kind => {
                self.entries.insert(local_key, entry.clone());
                Some(entry)
            }
            Ok(_) => None,
            Err(error) => {
                warn!(key = %key, %error, "discarding undecodable metadata cache entry");
                backend.remove(&key);
                None
            }
        }
    }

    pub fn put(&mut self, table: &TableName, entry: CachedMetadata) {
        if !self.enabled {
            return;
        }
        let kind = entry.kind();
        let key = self.backend_key(table, kind);
        if let Some(backend) = self.backend.as_mut() {
            match serde_json::to_vec(&entry) {
                Ok(bytes) => backend.save(&key, &bytes, &[self.prefix.as_str()]),
                Err(error) => warn!(key = %key, %error, "failed to encode metadata cache entry"),
            }
        }
        self.entries.insert((table.cache_key(), kind), entry);
    }

    /// Drops every kind of entry for one table.
    pub fn invalidate(&mut self, table: &TableName) {
        let table_key = table.cache_key();
        self.entries.retain(|(key, _), _| *key != table_key);
        if self.backend.is_some() {
            let keys = MetadataKind::ALL
                .iter()
                .map(|kind| self.backend_key(table, *kind))
                .collect::<Vec<_>>();
            if let Some(backend) = self.backend.as_mut() {
                for key in keys {
                    backend.remove(&key);
                }
            }
        }
    }

    pub fn reset(&mut self) {
        self.entries.clear();
        if let Some(backend) = self.backend.as_mut() {
            backend.clean(&[self.prefix.as_str()]);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    use super::{CacheBackend, MetadataCache};
    use crate::{CachedMetadata, MetadataKind, TableName};

    #[derive(Default, Clone)]
    struct SharedBackend {
        store: Arc<Mutex<HashMap<String, (Vec<u8>, Vec<String>)>>>,
    }

    impl CacheBackend for SharedBackend {
        fn load(&mut self, key: &str) -> Option<Vec<u8>> {
            let store = self.store.lock().expect("store lock");
            store.get(key).map(|(data, _)| data.clone())
        }

        fn save(&mut self, key: &str, data: &[u8], tags: &[&str]) {
            let mut store = self.store.lock().expect("store lock");
            store.insert(
                key.to_string(),
                (data.to_vec(), tags.iter().map(|tag| (*tag).to_string()).collect()),
            );
        }

        fn remove(&mut self, key: &str) {
            self.store.lock().expect("store lock").remove(key);
        }

        fn clean(&mut self, tags: &[&str]) {
            self.store.lock().expect("store lock").retain(|_, (_, entry_tags)| {
                !entry_tags.iter().any(|tag| tags.contains(&tag.as_str()))
            });
        }
    }

    fn ddl(sql: &str) -> CachedMetadata {
        CachedMetadata::CreateDdl(sql.to_string())
    }

    #[test]
    fn entries_are_keyed_by_table_and_kind() {
        let mut cache = MetadataCache::new("DB_PDO_MYSQL_DDL", true);
        let orders = TableName::new("orders");
        cache.put(&orders, ddl("CREATE TABLE orders"));
        assert_eq!(
            cache.get(&orders, MetadataKind::CreateDdl),
            Some(ddl("CREATE TABLE orders"))
        );
        assert_eq!(cache.get(&orders, MetadataKind::Describe), None);
        assert_eq!(cache.get(&TableName::new("items"), MetadataKind::CreateDdl), None);
    }

    #[test]
    fn invalidate_only_touches_one_table() {
        let mut cache = MetadataCache::new("p", true);
        let orders = TableName::new("orders");
        let items = TableName::new("items");
        cache.put(&orders, ddl("a"));
        cache.put(&orders, CachedMetadata::Indexes(Vec::new()));
        cache.put(&items, ddl("b"));
        cache.invalidate(&TableName::new("ORDERS"));
        assert_eq!(cache.len(), 1);
        assert!(cache.get(&items, MetadataKind::CreateDdl).is_some());
    }

    #[test]
    fn disabled_cache_neither_stores_nor_serves() {
        let mut cache = MetadataCache::new("p", false);
        let orders = TableName::new("orders");
        cache.put(&orders, ddl("a"));
        assert!(cache.is_empty());
        cache.set_enabled(true);
        cache.put(&orders, ddl("a"));
        cache.set_enabled(false);
        assert_eq!(cache.get(&orders, MetadataKind::CreateDdl), None);
    }

    #[test]
    fn backend_survives_a_new_cache_instance() {
        let backend = SharedBackend::default();
        let orders = TableName::qualified("shop", "orders");
        let mut first = MetadataCache::new("p", true).with_backend(Box::new(backend.clone()));
        first.put(&orders, ddl("persisted"));
        assert!(
            backend
                .store
                .lock()
                .expect("store lock")
                .contains_key("p_shop.orders_create")
        );

        let mut second = MetadataCache::new("p", true).with_backend(Box::new(backend.clone()));
        assert_eq!(
            second.get(&orders, MetadataKind::CreateDdl),
            Some(ddl("persisted"))
        );

        second.reset();
        assert!(backend.store.lock().expect("store lock").is_empty());
    }
}
