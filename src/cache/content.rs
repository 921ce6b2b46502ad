use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::cache::entry::TtlMap;
use crate::content::kinds::ContentKind;
use crate::error::{CoreResult, read_lock_poisoned, write_lock_poisoned};
use crate::ids::{ContentId, Variant};

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ContentKey {
    pub kind: ContentKind,
    pub id: ContentId,
    pub variant: Variant,
}

/// The content domain of the tenant cache (spec §4.3/§4.5): read-through,
/// write-through storage for rendered content payloads, a slug → id index
/// backing `findBySlug`, and a per-kind id-list cache backing `findAll`.
/// Payloads are opaque JSON so the cache stays agnostic to each kind's
/// shape. `ContentRepository<K>` is the only caller.
#[derive(Default, Debug)]
pub struct ContentCache {
    entries: TtlMap<ContentKey, Value>,
    slugs: RwLock<HashMap<(ContentKind, String), ContentId>>,
    id_lists: RwLock<HashMap<ContentKind, Vec<ContentId>>>,
}

impl ContentCache {
    pub fn get(&self, key: &ContentKey) -> CoreResult<Option<(Value, String)>> {
        self.entries.get(key)
    }

    pub fn set(&self, key: ContentKey, value: Value, ttl: Duration) -> CoreResult<String> {
        self.entries.set(key, value, ttl)
    }

    pub fn invalidate(&self, key: &ContentKey) -> CoreResult<bool> {
        self.entries.invalidate(key)
    }

    pub fn invalidate_kind(&self, kind: ContentKind) -> CoreResult<usize> {
        let removed = self.entries.invalidate_where(|key| key.kind == kind)?;
        {
            let mut slugs = self.slugs.write().map_err(write_lock_poisoned)?;
            slugs.retain(|(k, _), _| *k != kind);
        }
        {
            let mut id_lists = self.id_lists.write().map_err(write_lock_poisoned)?;
            id_lists.remove(&kind);
        }
        Ok(removed)
    }

    /// Drops the entire content domain for the tenant — every kind's
    /// entries, slug index, and id-list cache — rather than tracking an
    /// inverse index per list (spec §4.5's `delete` contract).
    pub fn invalidate_all(&self) -> CoreResult<()> {
        self.entries.clear()?;
        self.slugs.write().map_err(write_lock_poisoned)?.clear();
        self.id_lists.write().map_err(write_lock_poisoned)?.clear();
        Ok(())
    }

    pub fn resolve_slug(&self, kind: ContentKind, slug: &str) -> CoreResult<Option<ContentId>> {
        let guard = self.slugs.read().map_err(read_lock_poisoned)?;
        Ok(guard.get(&(kind, slug.to_string())).copied())
    }

    pub fn set_slug(&self, kind: ContentKind, slug: &str, id: ContentId) -> CoreResult<()> {
        let mut guard = self.slugs.write().map_err(write_lock_poisoned)?;
        guard.insert((kind, slug.to_string()), id);
        Ok(())
    }

    pub fn id_list(&self, kind: ContentKind) -> CoreResult<Option<Vec<ContentId>>> {
        let guard = self.id_lists.read().map_err(read_lock_poisoned)?;
        Ok(guard.get(&kind).cloned())
    }

    pub fn set_id_list(&self, kind: ContentKind, ids: Vec<ContentId>) -> CoreResult<()> {
        let mut guard = self.id_lists.write().map_err(write_lock_poisoned)?;
        guard.insert(kind, ids);
        Ok(())
    }

    pub fn purge_expired(&self) -> CoreResult<usize> {
        self.entries.purge_expired()
    }

    pub fn len(&self) -> CoreResult<usize> {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn key(kind: ContentKind, id: Uuid) -> ContentKey {
        ContentKey {
            kind,
            id: ContentId(id),
            variant: Variant::default(),
        }
    }

    #[test]
    fn slug_index_resolves_to_the_id_it_was_set_with() {
        let cache = ContentCache::default();
        let id = ContentId(Uuid::new_v4());
        cache.set_slug(ContentKind::Resource, "about-us", id).unwrap();
        assert_eq!(cache.resolve_slug(ContentKind::Resource, "about-us").unwrap(), Some(id));
        assert_eq!(cache.resolve_slug(ContentKind::Resource, "missing").unwrap(), None);
    }

    #[test]
    fn invalidate_all_clears_every_kind_and_both_indices() {
        let cache = ContentCache::default();
        let id = ContentId(Uuid::new_v4());
        cache
            .set(key(ContentKind::Resource, id.0), serde_json::json!({}), Duration::from_secs(60))
            .unwrap();
        cache.set_slug(ContentKind::Resource, "about-us", id).unwrap();
        cache.set_id_list(ContentKind::Resource, vec![id]).unwrap();

        cache.invalidate_all().unwrap();

        assert_eq!(cache.len().unwrap(), 0);
        assert_eq!(cache.resolve_slug(ContentKind::Resource, "about-us").unwrap(), None);
        assert_eq!(cache.id_list(ContentKind::Resource).unwrap(), None);
    }

    #[test]
    fn invalidate_kind_drops_only_that_kinds_slug_and_id_list_entries() {
        let cache = ContentCache::default();
        let resource_id = ContentId(Uuid::new_v4());
        let pane_id = ContentId(Uuid::new_v4());
        cache.set_slug(ContentKind::Resource, "about-us", resource_id).unwrap();
        cache.set_slug(ContentKind::Pane, "hero", pane_id).unwrap();
        cache.set_id_list(ContentKind::Resource, vec![resource_id]).unwrap();
        cache.set_id_list(ContentKind::Pane, vec![pane_id]).unwrap();

        cache.invalidate_kind(ContentKind::Resource).unwrap();

        assert_eq!(cache.resolve_slug(ContentKind::Resource, "about-us").unwrap(), None);
        assert_eq!(cache.id_list(ContentKind::Resource).unwrap(), None);
        assert_eq!(cache.resolve_slug(ContentKind::Pane, "hero").unwrap(), Some(pane_id));
        assert_eq!(cache.id_list(ContentKind::Pane).unwrap(), Some(vec![pane_id]));
    }
}
