use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::cache::entry::TtlMap;
use crate::error::CoreResult;
use crate::ids::{PaneId, StoryFragmentId, Variant};

/// Identifies one rendered HTML chunk: a pane within a storyfragment,
/// rendered for a particular variant (spec §4.4).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChunkKey {
    pub storyfragment_id: StoryFragmentId,
    pub pane_id: PaneId,
    pub variant: Variant,
}

/// A cached HTML chunk plus the belief-context dependencies that, if
/// invalidated, must invalidate this chunk too (spec §4.7's
/// dependency-driven invalidation).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FragmentChunk {
    pub html: String,
    pub dependencies: Vec<String>,
}

/// The Fragment HTML Store: a TTL map of rendered chunks, invalidated
/// either by exact dependency match (a belief-context change) or by a
/// storyfragment-scoped prefix pattern (a full storyfragment edit).
#[derive(Default, Debug)]
pub struct FragmentStore {
    chunks: TtlMap<ChunkKey, FragmentChunk>,
}

impl FragmentStore {
    pub fn get_chunk(&self, key: &ChunkKey) -> CoreResult<Option<(FragmentChunk, String)>> {
        self.chunks.get(key)
    }

    pub fn set_chunk(&self, key: ChunkKey, chunk: FragmentChunk, ttl: Duration) -> CoreResult<String> {
        self.chunks.set(key, chunk, ttl)
    }

    /// Invalidates every chunk whose dependency list names `dependency`
    /// (e.g. a belief-context slug that just changed).
    pub fn invalidate_by_dependency(&self, dependency: &str) -> CoreResult<usize> {
        let keys = self.chunks.keys()?;
        let mut removed = 0;
        for key in keys {
            if let Some((chunk, _)) = self.chunks.get(&key)?
                && chunk.dependencies.iter().any(|d| d == dependency)
                && self.chunks.invalidate(&key)?
            {
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// Invalidates every chunk belonging to `storyfragment_id`, regardless
    /// of pane or variant.
    pub fn invalidate_by_storyfragment(&self, storyfragment_id: StoryFragmentId) -> CoreResult<usize> {
        self.chunks
            .invalidate_where(|key| key.storyfragment_id == storyfragment_id)
    }

    /// Invalidates every variant of one pane within a storyfragment (spec
    /// §4.7 step 4: resolving a belief update to affected panes invalidates
    /// exactly those panes' rendered chunks).
    pub fn invalidate_by_pane(&self, storyfragment_id: StoryFragmentId, pane_id: PaneId) -> CoreResult<usize> {
        self.chunks
            .invalidate_where(|key| key.storyfragment_id == storyfragment_id && key.pane_id == pane_id)
    }

    pub fn purge_expired(&self) -> CoreResult<usize> {
        self.chunks.purge_expired()
    }

    pub fn len(&self) -> CoreResult<usize> {
        self.chunks.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn key(sf: Uuid, pane: Uuid) -> ChunkKey {
        ChunkKey {
            storyfragment_id: StoryFragmentId(sf),
            pane_id: PaneId(pane),
            variant: Variant::default(),
        }
    }

    #[test]
    fn invalidate_by_dependency_only_removes_matching_chunks() {
        let store = FragmentStore::default();
        let sf = Uuid::new_v4();
        let k1 = key(sf, Uuid::new_v4());
        let k2 = key(sf, Uuid::new_v4());
        store
            .set_chunk(
                k1.clone(),
                FragmentChunk {
                    html: "<div/>".to_string(),
                    dependencies: vec!["belief:color".to_string()],
                },
                Duration::from_secs(60),
            )
            .unwrap();
        store
            .set_chunk(
                k2.clone(),
                FragmentChunk {
                    html: "<div/>".to_string(),
                    dependencies: vec!["belief:size".to_string()],
                },
                Duration::from_secs(60),
            )
            .unwrap();

        let removed = store.invalidate_by_dependency("belief:color").unwrap();
        assert_eq!(removed, 1);
        assert!(store.get_chunk(&k1).unwrap().is_none());
        assert!(store.get_chunk(&k2).unwrap().is_some());
    }

    #[test]
    fn invalidate_by_storyfragment_clears_every_pane() {
        let store = FragmentStore::default();
        let sf = Uuid::new_v4();
        let k1 = key(sf, Uuid::new_v4());
        let k2 = key(sf, Uuid::new_v4());
        for k in [&k1, &k2] {
            store
                .set_chunk(
                    k.clone(),
                    FragmentChunk {
                        html: "<div/>".to_string(),
                        dependencies: vec![],
                    },
                    Duration::from_secs(60),
                )
                .unwrap();
        }
        let removed = store
            .invalidate_by_storyfragment(StoryFragmentId(sf))
            .unwrap();
        assert_eq!(removed, 2);
        assert_eq!(store.len().unwrap(), 0);
    }
}
