//! Process-lifetime cache for resolved display names.

use std::collections::HashMap;

use tokio::sync::RwLock;

/// Id to display-name cache. Each key is written at most once.
///
/// Two tasks may resolve the same id concurrently; the first insert wins and
/// the second is dropped, which is harmless since both carry the same name.
#[derive(Debug, Default)]
pub struct NameCache {
    names: RwLock<HashMap<String, String>>,
}

impl NameCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, id: &str) -> Option<String> {
        self.names.read().await.get(id).cloned()
    }

    /// Store a name unless one is already cached for `id`.
    pub async fn insert(&self, id: &str, name: String) {
        self.names
            .write()
            .await
            .entry(id.to_string())
            .or_insert(name);
    }

    #[cfg(test)]
    pub async fn len(&self) -> usize {
        self.names.read().await.len()
    }
}
