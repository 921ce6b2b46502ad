use std::collections::{HashMap, HashSet};
use std::sync::RwLock;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::cache::entry::TtlMap;
use crate::error::{CoreResult, read_lock_poisoned, write_lock_poisoned};
use crate::ids::{FingerprintId, SessionId};

/// A visitor's held beliefs, keyed by belief slug, plus the fingerprint it
/// belongs to. Held in the session domain of the tenant's cache (spec
/// §4.3/§4.7: belief updates flow through here before invalidation fans
/// out to dependent fragments).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionState {
    pub fingerprint_id: FingerprintId,
    pub held_beliefs: HashMap<String, String>,
}

/// The fingerprint → session inverted index (spec §4.3 invariant: every
/// session appears in exactly one fingerprint's list). Maintained
/// incrementally rather than rebuilt from the session map, so lookups stay
/// O(1); `rebuild` exists for integrity recovery after a detected
/// inconsistency (Testable Property, spec §8).
#[derive(Default, Debug)]
pub struct FingerprintIndex {
    by_fingerprint: RwLock<HashMap<FingerprintId, HashSet<SessionId>>>,
    owner: RwLock<HashMap<SessionId, FingerprintId>>,
    /// Fingerprints that have authenticated at least once (SPEC_FULL §9:
    /// set on first successful login, never cleared on logout).
    known: RwLock<HashSet<FingerprintId>>,
}

impl FingerprintIndex {
    /// Associates `session_id` with `fingerprint_id`, first detaching the
    /// session from any previous fingerprint so the one-owner invariant
    /// holds.
    pub fn set(&self, fingerprint_id: FingerprintId, session_id: SessionId) -> CoreResult<()> {
        self.remove(session_id)?;
        {
            let mut owner = self.owner.write().map_err(write_lock_poisoned)?;
            owner.insert(session_id, fingerprint_id);
        }
        let mut by_fp = self.by_fingerprint.write().map_err(write_lock_poisoned)?;
        by_fp.entry(fingerprint_id).or_default().insert(session_id);
        Ok(())
    }

    /// Detaches `session_id` from whatever fingerprint currently owns it,
    /// if any. Idempotent.
    pub fn remove(&self, session_id: SessionId) -> CoreResult<()> {
        let previous = {
            let mut owner = self.owner.write().map_err(write_lock_poisoned)?;
            owner.remove(&session_id)
        };
        if let Some(fingerprint_id) = previous {
            let mut by_fp = self.by_fingerprint.write().map_err(write_lock_poisoned)?;
            if let Some(sessions) = by_fp.get_mut(&fingerprint_id) {
                sessions.remove(&session_id);
                if sessions.is_empty() {
                    by_fp.remove(&fingerprint_id);
                }
            }
        }
        Ok(())
    }

    pub fn sessions_for(&self, fingerprint_id: FingerprintId) -> CoreResult<HashSet<SessionId>> {
        let by_fp = self.by_fingerprint.read().map_err(read_lock_poisoned)?;
        Ok(by_fp.get(&fingerprint_id).cloned().unwrap_or_default())
    }

    pub fn fingerprint_for(&self, session_id: SessionId) -> CoreResult<Option<FingerprintId>> {
        let owner = self.owner.read().map_err(read_lock_poisoned)?;
        Ok(owner.get(&session_id).copied())
    }

    pub fn mark_known(&self, fingerprint_id: FingerprintId) -> CoreResult<()> {
        let mut known = self.known.write().map_err(write_lock_poisoned)?;
        known.insert(fingerprint_id);
        Ok(())
    }

    pub fn is_known(&self, fingerprint_id: FingerprintId) -> CoreResult<bool> {
        let known = self.known.read().map_err(read_lock_poisoned)?;
        Ok(known.contains(&fingerprint_id))
    }

    /// Rebuilds `by_fingerprint` from `owner` (the source of truth for
    /// ownership), discarding any stale forward-index entries. Used by the
    /// integrity check described in spec §8.
    pub fn rebuild(&self) -> CoreResult<()> {
        let owner = self.owner.read().map_err(read_lock_poisoned)?;
        let mut rebuilt: HashMap<FingerprintId, HashSet<SessionId>> = HashMap::new();
        for (session_id, fingerprint_id) in owner.iter() {
            rebuilt.entry(*fingerprint_id).or_default().insert(*session_id);
        }
        let mut by_fp = self.by_fingerprint.write().map_err(write_lock_poisoned)?;
        *by_fp = rebuilt;
        Ok(())
    }

    /// Checks the invariant that every session in `owner` appears in
    /// exactly the one fingerprint bucket `owner` says it belongs to, and
    /// nowhere else.
    pub fn check_integrity(&self) -> CoreResult<bool> {
        let owner = self.owner.read().map_err(read_lock_poisoned)?;
        let by_fp = self.by_fingerprint.read().map_err(read_lock_poisoned)?;
        for (session_id, fingerprint_id) in owner.iter() {
            match by_fp.get(fingerprint_id) {
                Some(sessions) if sessions.contains(session_id) => {}
                _ => return Ok(false),
            }
        }
        let indexed_count: usize = by_fp.values().map(|s| s.len()).sum();
        Ok(indexed_count == owner.len())
    }
}

/// The session domain of the tenant cache: per-session held-belief state,
/// TTL-evicted like the content domain but on the shorter session TTL.
#[derive(Default, Debug)]
pub struct SessionCache {
    sessions: TtlMap<SessionId, SessionState>,
}

impl SessionCache {
    pub fn get(&self, session_id: &SessionId) -> CoreResult<Option<(SessionState, String)>> {
        self.sessions.get(session_id)
    }

    pub fn set(&self, session_id: SessionId, state: SessionState, ttl: Duration) -> CoreResult<String> {
        self.sessions.set(session_id, state, ttl)
    }

    pub fn invalidate(&self, session_id: &SessionId) -> CoreResult<bool> {
        self.sessions.invalidate(session_id)
    }

    pub fn purge_expired(&self) -> CoreResult<usize> {
        self.sessions.purge_expired()
    }

    /// Purges expired sessions and returns their ids, so the caller can
    /// unlink each one from the fingerprint index (spec §4.6).
    pub fn purge_expired_keys(&self) -> CoreResult<Vec<SessionId>> {
        self.sessions.purge_expired_keys()
    }

    pub fn len(&self) -> CoreResult<usize> {
        self.sessions.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn fp() -> FingerprintId {
        FingerprintId(Uuid::new_v4())
    }
    fn sess() -> SessionId {
        SessionId(Uuid::new_v4())
    }

    #[test]
    fn moving_a_session_to_a_new_fingerprint_detaches_the_old_one() {
        let index = FingerprintIndex::default();
        let (fp1, fp2, s) = (fp(), fp(), sess());
        index.set(fp1, s).unwrap();
        index.set(fp2, s).unwrap();
        assert!(index.sessions_for(fp1).unwrap().is_empty());
        assert_eq!(index.sessions_for(fp2).unwrap().len(), 1);
        assert_eq!(index.fingerprint_for(s).unwrap(), Some(fp2));
    }

    #[test]
    fn known_fingerprints_persist_across_logout() {
        let index = FingerprintIndex::default();
        let f = fp();
        index.mark_known(f).unwrap();
        index.remove(sess()).unwrap();
        assert!(index.is_known(f).unwrap());
    }

    #[test]
    fn rebuild_recovers_from_a_corrupted_forward_index() {
        let index = FingerprintIndex::default();
        let (f, s) = (fp(), sess());
        index.set(f, s).unwrap();
        {
            let mut by_fp = index.by_fingerprint.write().unwrap();
            by_fp.clear();
        }
        assert!(!index.check_integrity().unwrap());
        index.rebuild().unwrap();
        assert!(index.check_integrity().unwrap());
    }
}
