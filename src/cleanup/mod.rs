pub mod report;

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{Level, event};

use crate::cache::CacheManager;
use crate::cleanup::report::CleanupReport;
use crate::registry::{TenantStatus, TenantsRepository};

/// The background sweep described in spec §4.6: on every tick, purges
/// idle-expired entries from every active tenant's cache domains and, when
/// `verbose` is set, logs a structured per-tenant report. Runs as a
/// `tokio::spawn`ed loop observing a `CancellationToken` so `main`'s
/// graceful-shutdown path (mirroring the teacher's `shutdown_signal`) can
/// stop it cooperatively between ticks rather than aborting it mid-sweep.
pub struct CleanupWorker {
    cache: Arc<CacheManager>,
    registry: Arc<dyn TenantsRepository>,
    interval: Duration,
    verbose: bool,
    analytics_ttl: Duration,
    current_hour_ttl: Duration,
}

impl CleanupWorker {
    pub fn new(
        cache: Arc<CacheManager>,
        registry: Arc<dyn TenantsRepository>,
        interval: Duration,
        verbose: bool,
        analytics_ttl: Duration,
        current_hour_ttl: Duration,
    ) -> Self {
        Self {
            cache,
            registry,
            interval,
            verbose,
            analytics_ttl,
            current_hour_ttl,
        }
    }

    /// Spawns the sweep loop and returns its join handle. Call
    /// `token.cancel()` to stop it; the in-flight sweep (if any) finishes
    /// before the loop exits.
    pub fn spawn(self: Arc<Self>, token: CancellationToken) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let report = self.sweep_once().await;
                        if self.verbose {
                            event!(Level::INFO, report = ?report, "cleanup sweep completed");
                        }
                    }
                    _ = token.cancelled() => {
                        event!(Level::INFO, "cleanup worker stopping");
                        break;
                    }
                }
            }
        })
    }

    /// Runs one sweep across every tenant the registry reports `active`,
    /// purging idle-expired entries from each cache domain. Failures on one
    /// tenant are logged and do not stop the sweep for the rest, matching
    /// the teacher's `init_tenant_pools` per-tenant fault isolation.
    pub async fn sweep_once(&self) -> CleanupReport {
        let mut report = CleanupReport::default();
        let records = match self.registry.load_all().await {
            Ok(records) => records,
            Err(e) => {
                event!(Level::ERROR, error = %e, "cleanup sweep could not list tenants from the registry");
                return report;
            }
        };

        for record in records.into_iter().filter(|r| r.status() == TenantStatus::Active) {
            let tenant_id = record.tenant_id();
            let shard = match self.cache.shard(&tenant_id) {
                Ok(shard) => shard,
                Err(e) => {
                    event!(Level::ERROR, tenant = %tenant_id, error = %e, "skipping tenant in sweep");
                    continue;
                }
            };

            let content = shard.content.purge_expired().unwrap_or(0);
            let fragments = shard.fragments.purge_expired().unwrap_or(0);
            let analytics = shard
                .analytics
                .purge_expired(self.analytics_ttl, self.current_hour_ttl)
                .unwrap_or(0);

            let purged_sessions = shard.sessions.purge_expired_keys().unwrap_or_default();
            for session_id in &purged_sessions {
                if let Err(e) = shard.fingerprints.remove(*session_id) {
                    event!(Level::ERROR, tenant = %tenant_id, session = %session_id, error = %e, "failed to unlink purged session");
                }
            }

            report.record(tenant_id, content, purged_sessions.len(), fragments, analytics);
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::TenantId;
    use crate::registry::{MockTenantsRepository, TenantRecord};
    use std::time::Duration as StdDuration;

    fn active_record(tenant_id: &str) -> TenantRecord {
        TenantRecord {
            id: uuid::Uuid::new_v4(),
            tenant_id: tenant_id.to_string(),
            status_raw: "active".to_string(),
            db_host: "localhost".to_string(),
            db_port: 5432,
            db_username: "u".to_string(),
            db_password: "p".to_string(),
            db_name: "d".to_string(),
            db_max_pool_size: Some(2),
        }
    }

    fn worker(registry: MockTenantsRepository, cache: Arc<CacheManager>) -> CleanupWorker {
        CleanupWorker::new(
            cache,
            Arc::new(registry),
            StdDuration::from_secs(60),
            true,
            StdDuration::from_secs(86_400),
            StdDuration::from_secs(3600),
        )
    }

    #[tokio::test]
    async fn sweep_with_no_active_tenants_returns_an_empty_report() {
        let mut registry = MockTenantsRepository::new();
        registry.expect_load_all().returning(|| Ok(vec![]));
        let worker = worker(registry, Arc::new(CacheManager::new()));
        let report = worker.sweep_once().await;
        assert!(report.is_empty());
    }

    #[tokio::test]
    async fn sweep_skips_tenants_the_registry_reports_as_inactive() {
        let mut registry = MockTenantsRepository::new();
        registry.expect_load_all().returning(|| {
            Ok(vec![TenantRecord {
                status_raw: "inactive".to_string(),
                ..active_record("dormant")
            }])
        });
        let worker = worker(registry, Arc::new(CacheManager::new()));
        let report = worker.sweep_once().await;
        assert!(report.is_empty());
    }

    #[tokio::test]
    async fn sweep_purges_expired_sessions_and_unlinks_their_fingerprints() {
        let cache = Arc::new(CacheManager::new());
        let tenant = TenantId::from("acme");
        let shard = cache.init_shard(&tenant).unwrap();
        let session = crate::ids::SessionId(uuid::Uuid::new_v4());
        let fingerprint = crate::ids::FingerprintId(uuid::Uuid::new_v4());
        shard
            .sessions
            .set(
                session,
                crate::cache::session::SessionState {
                    fingerprint_id: fingerprint,
                    held_beliefs: Default::default(),
                },
                StdDuration::from_millis(0),
            )
            .unwrap();
        shard.fingerprints.set(fingerprint, session).unwrap();
        std::thread::sleep(StdDuration::from_millis(2));

        let mut registry = MockTenantsRepository::new();
        registry.expect_load_all().returning(move || Ok(vec![active_record("acme")]));
        let worker = worker(registry, cache);
        let report = worker.sweep_once().await;

        assert_eq!(report.entries[0].sessions_purged, 1);
        assert!(shard.fingerprints.sessions_for(fingerprint).unwrap().is_empty());
    }

    #[test]
    fn purge_expired_on_a_shard_drops_stale_content_entries() {
        let cache = Arc::new(CacheManager::new());
        let tenant = TenantId::from("acme");
        let shard = cache.init_shard(&tenant).unwrap();
        shard
            .content
            .set(
                crate::cache::content::ContentKey {
                    kind: crate::content::ContentKind::Resource,
                    id: crate::ids::ContentId(uuid::Uuid::new_v4()),
                    variant: crate::ids::Variant::default(),
                },
                serde_json::json!({}),
                StdDuration::from_millis(0),
            )
            .unwrap();
        std::thread::sleep(StdDuration::from_millis(2));
        assert_eq!(shard.content.purge_expired().unwrap(), 1);
    }
}
