pub mod kinds;
pub mod repository;

pub use kinds::{ContentKind, ContentKindTag};
pub use repository::ContentRepository;

use std::sync::Arc;
use std::time::Duration;

use crate::cache::CacheManager;
use crate::content::kinds::{
    BeliefKind, EpinetKind, FileKind, MenuKind, PaneKind, ResourceKind, StoryFragmentKind, TractStackKind,
};

/// One [`ContentRepository`] per content kind, bundled so HTTP handlers can
/// dispatch on a runtime [`ContentKind`] without duplicating the facade's
/// construction (spec §4.5: "one per content kind").
pub struct ContentRepositories {
    pub storyfragment: ContentRepository<StoryFragmentKind>,
    pub pane: ContentRepository<PaneKind>,
    pub menu: ContentRepository<MenuKind>,
    pub resource: ContentRepository<ResourceKind>,
    pub tractstack: ContentRepository<TractStackKind>,
    pub file: ContentRepository<FileKind>,
    pub belief: ContentRepository<BeliefKind>,
    pub epinet: ContentRepository<EpinetKind>,
}

impl ContentRepositories {
    pub fn new(cache: Arc<CacheManager>, ttl: Duration, slow_query_threshold: Duration) -> Self {
        Self {
            storyfragment: ContentRepository::new(cache.clone(), ttl, slow_query_threshold),
            pane: ContentRepository::new(cache.clone(), ttl, slow_query_threshold),
            menu: ContentRepository::new(cache.clone(), ttl, slow_query_threshold),
            resource: ContentRepository::new(cache.clone(), ttl, slow_query_threshold),
            tractstack: ContentRepository::new(cache.clone(), ttl, slow_query_threshold),
            file: ContentRepository::new(cache.clone(), ttl, slow_query_threshold),
            belief: ContentRepository::new(cache.clone(), ttl, slow_query_threshold),
            epinet: ContentRepository::new(cache, ttl, slow_query_threshold),
        }
    }
}
