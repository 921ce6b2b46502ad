use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{CoreResult, read_lock_poisoned, write_lock_poisoned};
use crate::ids::HourKey;

/// One hour's worth of rolled-up event counts for one subject — an epinet
/// or a content id — within a tenant (spec §3's analytics domain: "hourly
/// buckets keyed by (epinet or content id, hour-key)").
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AnalyticsKey {
    pub subject: String,
    pub hour: HourKey,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HourBin {
    pub page_views: u64,
    pub belief_changes: u64,
    pub conversions: u64,
}

/// The analytics and current-hour cache domain: a map of hourly bins per
/// subject, the current hour mutated in place as events stream in, older
/// ones read for reporting until they age out under the analytics TTL.
#[derive(Default, Debug)]
pub struct AnalyticsCache {
    bins: RwLock<HashMap<AnalyticsKey, HourBin>>,
}

impl AnalyticsCache {
    pub fn record_page_view(&self, subject: String, hour: HourKey) -> CoreResult<()> {
        self.mutate(subject, hour, |bin| bin.page_views += 1)
    }

    pub fn record_belief_change(&self, subject: String, hour: HourKey) -> CoreResult<()> {
        self.mutate(subject, hour, |bin| bin.belief_changes += 1)
    }

    pub fn record_conversion(&self, subject: String, hour: HourKey) -> CoreResult<()> {
        self.mutate(subject, hour, |bin| bin.conversions += 1)
    }

    fn mutate(&self, subject: String, hour: HourKey, f: impl FnOnce(&mut HourBin)) -> CoreResult<()> {
        let mut guard = self.bins.write().map_err(write_lock_poisoned)?;
        f(guard.entry(AnalyticsKey { subject, hour }).or_default());
        Ok(())
    }

    pub fn bin(&self, subject: &str, hour: &HourKey) -> CoreResult<Option<HourBin>> {
        let guard = self.bins.read().map_err(read_lock_poisoned)?;
        Ok(guard
            .get(&AnalyticsKey {
                subject: subject.to_string(),
                hour: hour.clone(),
            })
            .cloned())
    }

    /// Drops bins older than `analytics_ttl`, treating the current hour's
    /// bins as fresh under the shorter `current_hour_ttl` instead (spec
    /// §4.6's sweep step: "purge analytics bins older than analytics TTL;
    /// current-hour bins use a shorter TTL").
    pub fn purge_expired(&self, analytics_ttl: Duration, current_hour_ttl: Duration) -> CoreResult<usize> {
        let now = chrono::Utc::now();
        let current_hour = HourKey::current();
        let mut guard = self.bins.write().map_err(write_lock_poisoned)?;
        let before = guard.len();
        guard.retain(|key, _| {
            let Some(bucket_start) = key.hour.parsed() else {
                return false;
            };
            let age = now.signed_duration_since(bucket_start).to_std().unwrap_or(Duration::ZERO);
            let ttl = if key.hour == current_hour {
                current_hour_ttl
            } else {
                analytics_ttl
            };
            age < ttl
        });
        Ok(before - guard.len())
    }

    pub fn len(&self) -> CoreResult<usize> {
        let guard = self.bins.read().map_err(read_lock_poisoned)?;
        Ok(guard.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate_within_the_same_subject_and_hour() {
        let cache = AnalyticsCache::default();
        let hour = HourKey("2026-08-01T14".to_string());
        cache.record_page_view("epinet-1".to_string(), hour.clone()).unwrap();
        cache.record_page_view("epinet-1".to_string(), hour.clone()).unwrap();
        cache.record_conversion("epinet-1".to_string(), hour.clone()).unwrap();
        let bin = cache.bin("epinet-1", &hour).unwrap().unwrap();
        assert_eq!(bin.page_views, 2);
        assert_eq!(bin.conversions, 1);
    }

    #[test]
    fn distinct_subjects_in_the_same_hour_get_distinct_bins() {
        let cache = AnalyticsCache::default();
        let hour = HourKey("2026-08-01T14".to_string());
        cache.record_page_view("epinet-1".to_string(), hour.clone()).unwrap();
        cache.record_page_view("epinet-2".to_string(), hour.clone()).unwrap();
        assert_eq!(cache.bin("epinet-1", &hour).unwrap().unwrap().page_views, 1);
        assert_eq!(cache.bin("epinet-2", &hour).unwrap().unwrap().page_views, 1);
    }

    #[test]
    fn purge_expired_drops_bins_older_than_the_analytics_ttl() {
        let cache = AnalyticsCache::default();
        let current = HourKey::current();
        let stale = HourKey("2000-01-01T00".to_string());
        cache.record_page_view("epinet-1".to_string(), current.clone()).unwrap();
        cache.record_page_view("epinet-1".to_string(), stale).unwrap();
        let removed = cache
            .purge_expired(Duration::from_secs(86_400), Duration::from_secs(3600))
            .unwrap();
        assert_eq!(removed, 1);
        assert_eq!(cache.len().unwrap(), 1);
        assert!(cache.bin("epinet-1", &current).unwrap().is_some());
    }
}
