use std::sync::Arc;

use sqlx::PgPool;

use crate::cache::CacheManager;
use crate::config::AppConfig;
use crate::content::ContentRepositories;
use crate::context::{PoolOptions, TenantContextManager};
use crate::push::{InvalidationPipeline, PushBroadcaster};
use crate::registry::{PgTenantsRepository, TenantsRepository};

/// The composition root, generalizing the teacher's `AppState<P, T>` (which
/// bundles a config provider and a mail transporter behind blanket trait
/// impls) into a plain struct of `Arc`-wrapped singletons: every handler
/// and background task shares the same cache, context manager, and
/// broadcaster rather than re-deriving them per request.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub main_pool: PgPool,
    pub registry: Arc<dyn TenantsRepository>,
    pub contexts: Arc<TenantContextManager>,
    pub cache: Arc<CacheManager>,
    pub content: Arc<ContentRepositories>,
    pub broadcaster: Arc<PushBroadcaster>,
    pub pipeline: Arc<InvalidationPipeline>,
}

impl AppState {
    pub async fn init(config: AppConfig) -> anyhow::Result<Self> {
        let main_pool = PgPool::connect(&config.main_database().url()).await?;
        let registry: Arc<dyn TenantsRepository> = Arc::new(PgTenantsRepository::new(main_pool.clone()));
        let cache = Arc::new(CacheManager::new());
        let pool_options = PoolOptions {
            min_connections: config.main_database().min_connections(),
            max_lifetime: config.main_database().max_lifetime(),
            idle_timeout: config.main_database().idle_timeout(),
        };
        let contexts = Arc::new(TenantContextManager::new(registry.clone(), cache.clone(), pool_options));
        let content = Arc::new(ContentRepositories::new(
            cache.clone(),
            config.cache().content_ttl(),
            config.main_database().slow_query_threshold(),
        ));
        let broadcaster = Arc::new(PushBroadcaster::default());
        let pipeline = Arc::new(InvalidationPipeline::new(
            cache.clone(),
            broadcaster.clone(),
            config.cache().session_ttl(),
            config.push().broadcast_to_sibling_sessions(),
        ));

        Ok(Self {
            config: Arc::new(config),
            main_pool,
            registry,
            contexts,
            cache,
            content,
            broadcaster,
            pipeline,
        })
    }
}
