use std::marker::PhantomData;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::Value;
use sqlx::PgPool;
use sqlx::Row;
use tracing::{Level, event};

use crate::cache::CacheManager;
use crate::cache::content::ContentKey;
use crate::content::kinds::ContentKindTag;
use crate::error::CoreResult;
use crate::ids::{ContentId, TenantId, Variant};

/// Generic read-through/write-through facade over one content kind (spec
/// §4.5). Instantiated once per kind via the zero-sized `K` tag rather than
/// duplicated per kind, per §9's guidance. Five operations: `find_by_id`
/// (read-through), `find_by_slug` (slug index, then delegates to
/// `find_by_id`), `find_by_ids` (bulk, partitioned by cache presence),
/// `find_all` (id-list cache, then delegates to `find_by_ids`), `store`
/// (write-through), and `delete` (drops the whole tenant content domain
/// rather than tracking an inverse index per list).
pub struct ContentRepository<K: ContentKindTag> {
    cache: Arc<CacheManager>,
    ttl: Duration,
    slow_query_threshold: Duration,
    _marker: PhantomData<K>,
}

impl<K: ContentKindTag> ContentRepository<K> {
    pub fn new(cache: Arc<CacheManager>, ttl: Duration, slow_query_threshold: Duration) -> Self {
        Self {
            cache,
            ttl,
            slow_query_threshold,
            _marker: PhantomData,
        }
    }

    fn key(&self, id: ContentId, variant: &Variant) -> ContentKey {
        ContentKey {
            kind: K::KIND,
            id,
            variant: variant.clone(),
        }
    }

    /// Logs `statement` on the `slow_query` target if it ran past the
    /// configured threshold (spec §4.5's slow-query rule).
    fn log_if_slow(&self, started: Instant, statement: &str) {
        let elapsed = started.elapsed();
        if elapsed >= self.slow_query_threshold {
            event!(
                target: "slow_query",
                Level::WARN,
                elapsed_ms = elapsed.as_millis() as u64,
                statement,
                "slow query"
            );
        }
    }

    /// Checks the tenant's content cache first; on a miss, loads from
    /// `pool` and populates the cache before returning.
    pub async fn find_by_id(
        &self,
        pool: &PgPool,
        tenant_id: &TenantId,
        id: ContentId,
        variant: &Variant,
    ) -> CoreResult<Option<(Value, String)>> {
        let shard = self.cache.shard(tenant_id)?;
        let key = self.key(id, variant);
        if let Some(hit) = shard.content.get(&key)? {
            return Ok(Some(hit));
        }
        let statement = format!("SELECT payload FROM {} WHERE id = $1", K::KIND.table_name());
        let started = Instant::now();
        let row = sqlx::query(&statement).bind(id.0).fetch_optional(pool).await?;
        self.log_if_slow(started, &statement);
        let Some(row) = row else {
            return Ok(None);
        };
        let payload: Value = row.try_get("payload")?;
        let etag = shard.content.set(key, payload.clone(), self.ttl)?;
        Ok(Some((payload, etag)))
    }

    /// Resolves `slug` to an id through the slug index (cache, else DB),
    /// then delegates to [`Self::find_by_id`].
    pub async fn find_by_slug(
        &self,
        pool: &PgPool,
        tenant_id: &TenantId,
        slug: &str,
        variant: &Variant,
    ) -> CoreResult<Option<(Value, String)>> {
        let shard = self.cache.shard(tenant_id)?;
        let id = match shard.content.resolve_slug(K::KIND, slug)? {
            Some(id) => Some(id),
            None => {
                let statement = format!("SELECT id FROM {} WHERE slug = $1", K::KIND.table_name());
                let started = Instant::now();
                let row = sqlx::query(&statement).bind(slug).fetch_optional(pool).await?;
                self.log_if_slow(started, &statement);
                match row {
                    Some(row) => {
                        let id = ContentId(row.try_get("id")?);
                        shard.content.set_slug(K::KIND, slug, id)?;
                        Some(id)
                    }
                    None => None,
                }
            }
        };
        let Some(id) = id else {
            return Ok(None);
        };
        self.find_by_id(pool, tenant_id, id, variant).await
    }

    /// Partitions `ids` by cache presence, bulk-loads the miss set in a
    /// single `IN (...)` statement, populates the cache, and returns hits
    /// in the order `ids` was given.
    pub async fn find_by_ids(
        &self,
        pool: &PgPool,
        tenant_id: &TenantId,
        ids: &[ContentId],
        variant: &Variant,
    ) -> CoreResult<Vec<(ContentId, Value)>> {
        let shard = self.cache.shard(tenant_id)?;
        let mut found: std::collections::HashMap<ContentId, Value> = std::collections::HashMap::new();
        let mut misses = Vec::new();
        for &id in ids {
            match shard.content.get(&self.key(id, variant))? {
                Some((payload, _)) => {
                    found.insert(id, payload);
                }
                None => misses.push(id.0),
            }
        }

        if !misses.is_empty() {
            let statement = format!(
                "SELECT id, payload FROM {} WHERE id = ANY($1)",
                K::KIND.table_name()
            );
            let started = Instant::now();
            let rows = sqlx::query(&statement).bind(&misses[..]).fetch_all(pool).await?;
            self.log_if_slow(started, &statement);
            for row in rows {
                let id = ContentId(row.try_get("id")?);
                let payload: Value = row.try_get("payload")?;
                shard.content.set(self.key(id, variant), payload.clone(), self.ttl)?;
                found.insert(id, payload);
            }
        }

        Ok(ids.iter().filter_map(|id| found.remove(id).map(|payload| (*id, payload))).collect())
    }

    /// Consults the id-list cache; on a hit, delegates to
    /// [`Self::find_by_ids`]; on a miss, loads the full id list, stores it,
    /// then delegates.
    pub async fn find_all(
        &self,
        pool: &PgPool,
        tenant_id: &TenantId,
        variant: &Variant,
    ) -> CoreResult<Vec<(ContentId, Value)>> {
        let shard = self.cache.shard(tenant_id)?;
        let ids = match shard.content.id_list(K::KIND)? {
            Some(ids) => ids,
            None => {
                let statement = format!("SELECT id FROM {}", K::KIND.table_name());
                let started = Instant::now();
                let rows = sqlx::query(&statement).fetch_all(pool).await?;
                self.log_if_slow(started, &statement);
                let ids: Vec<ContentId> = rows
                    .into_iter()
                    .map(|row| row.try_get("id").map(ContentId))
                    .collect::<Result<_, sqlx::Error>>()?;
                shard.content.set_id_list(K::KIND, ids.clone())?;
                ids
            }
        };
        self.find_by_ids(pool, tenant_id, &ids, variant).await
    }

    /// Writes `payload` (and `slug`, if given) to `pool`, then refreshes
    /// the cache entry and slug index so the next read is a hit with a
    /// freshly-minted ETag.
    pub async fn store(
        &self,
        pool: &PgPool,
        tenant_id: &TenantId,
        id: ContentId,
        variant: &Variant,
        slug: Option<&str>,
        payload: Value,
    ) -> CoreResult<String> {
        let statement = format!(
            "INSERT INTO {} (id, slug, payload) VALUES ($1, $2, $3) \
             ON CONFLICT (id) DO UPDATE SET slug = EXCLUDED.slug, payload = EXCLUDED.payload",
            K::KIND.table_name()
        );
        let started = Instant::now();
        sqlx::query(&statement)
            .bind(id.0)
            .bind(slug)
            .bind(&payload)
            .execute(pool)
            .await?;
        self.log_if_slow(started, &statement);

        let shard = self.cache.shard(tenant_id)?;
        if let Some(slug) = slug {
            shard.content.set_slug(K::KIND, slug, id)?;
        }
        shard.content.set(self.key(id, variant), payload, self.ttl)
    }

    /// Deletes the row, then invalidates the whole tenant content domain
    /// (every kind's cached entries, slug index, and id-list cache) — spec
    /// §4.5 treats this as cheaper than maintaining an inverse index from
    /// one entity back to every list it could appear in.
    pub async fn delete(&self, pool: &PgPool, tenant_id: &TenantId, id: ContentId) -> CoreResult<()> {
        let statement = format!("DELETE FROM {} WHERE id = $1", K::KIND.table_name());
        let started = Instant::now();
        sqlx::query(&statement).bind(id.0).execute(pool).await?;
        self.log_if_slow(started, &statement);

        let shard = self.cache.shard(tenant_id)?;
        shard.content.invalidate_all()
    }
}
