use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::cache::entry::TtlMap;
use crate::error::{CoreResult, read_lock_poisoned, write_lock_poisoned};
use crate::ids::{PaneId, SessionId, StoryFragmentId};

/// One rule from a StoryFragment's belief registry (spec §3/§4.7 step 4):
/// holding `belief_slug` at `matching_value` (or at any value, if
/// `matching_value` is `None`) changes the visibility of `affected_panes`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BeliefRule {
    pub belief_slug: String,
    pub matching_value: Option<String>,
    pub affected_panes: Vec<PaneId>,
}

impl BeliefRule {
    fn matches(&self, belief_slug: &str, belief_value: &str) -> bool {
        if self.belief_slug != belief_slug {
            return false;
        }
        match &self.matching_value {
            Some(expected) => expected == belief_value,
            None => true,
        }
    }
}

/// Per-tenant map from StoryFragment to the belief rules governing its
/// panes' visibility. Populated when a StoryFragment's content is written;
/// consulted on every held-belief update to resolve which panes changed.
#[derive(Default, Debug)]
pub struct BeliefRegistry {
    rules: RwLock<HashMap<StoryFragmentId, Vec<BeliefRule>>>,
}

impl BeliefRegistry {
    pub fn set_rules(&self, storyfragment_id: StoryFragmentId, rules: Vec<BeliefRule>) -> CoreResult<()> {
        let mut guard = self.rules.write().map_err(write_lock_poisoned)?;
        guard.insert(storyfragment_id, rules);
        Ok(())
    }

    /// Resolves `(belief_slug, belief_value)` held against `storyfragment_id`
    /// into the panes whose visibility it changes (spec §4.7 step 4).
    pub fn affected_panes(
        &self,
        storyfragment_id: StoryFragmentId,
        belief_slug: &str,
        belief_value: &str,
    ) -> CoreResult<Vec<PaneId>> {
        let guard = self.rules.read().map_err(read_lock_poisoned)?;
        let Some(rules) = guard.get(&storyfragment_id) else {
            return Ok(Vec::new());
        };
        Ok(rules
            .iter()
            .filter(|rule| rule.matches(belief_slug, belief_value))
            .flat_map(|rule| rule.affected_panes.iter().copied())
            .collect())
    }
}

/// The belief context for one visitor viewing one StoryFragment: which
/// panes are currently visible, given their held beliefs. Computed on
/// demand and cached here, not persisted — it is derived state, not
/// content (spec §3).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BeliefContextKey {
    pub session_id: SessionId,
    pub storyfragment_id: StoryFragmentId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BeliefContext {
    pub visible_panes: Vec<PaneId>,
}

/// The ephemeral belief-context cache domain (spec §4.7 step 3): dropped
/// for a `(session, storyfragment)` pair as soon as a belief held against
/// that storyfragment changes, forcing the next render to recompute it.
#[derive(Default, Debug)]
pub struct BeliefContextCache {
    entries: TtlMap<BeliefContextKey, BeliefContext>,
}

impl BeliefContextCache {
    pub fn get(&self, key: &BeliefContextKey) -> CoreResult<Option<(BeliefContext, String)>> {
        self.entries.get(key)
    }

    pub fn set(&self, key: BeliefContextKey, value: BeliefContext, ttl: Duration) -> CoreResult<String> {
        self.entries.set(key, value, ttl)
    }

    pub fn invalidate(&self, key: &BeliefContextKey) -> CoreResult<bool> {
        self.entries.invalidate(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn sf() -> StoryFragmentId {
        StoryFragmentId(Uuid::new_v4())
    }
    fn pane() -> PaneId {
        PaneId(Uuid::new_v4())
    }

    #[test]
    fn matching_value_rule_only_fires_on_the_exact_value() {
        let registry = BeliefRegistry::default();
        let storyfragment = sf();
        let p1 = pane();
        registry
            .set_rules(
                storyfragment,
                vec![BeliefRule {
                    belief_slug: "color".to_string(),
                    matching_value: Some("red".to_string()),
                    affected_panes: vec![p1],
                }],
            )
            .unwrap();

        assert_eq!(
            registry.affected_panes(storyfragment, "color", "red").unwrap(),
            vec![p1]
        );
        assert!(
            registry
                .affected_panes(storyfragment, "color", "blue")
                .unwrap()
                .is_empty()
        );
    }

    #[test]
    fn any_value_rule_fires_regardless_of_value() {
        let registry = BeliefRegistry::default();
        let storyfragment = sf();
        let p1 = pane();
        registry
            .set_rules(
                storyfragment,
                vec![BeliefRule {
                    belief_slug: "newsletter".to_string(),
                    matching_value: None,
                    affected_panes: vec![p1],
                }],
            )
            .unwrap();

        assert_eq!(
            registry.affected_panes(storyfragment, "newsletter", "yes").unwrap(),
            vec![p1]
        );
    }

    #[test]
    fn belief_context_invalidation_drops_only_the_targeted_entry() {
        let cache = BeliefContextCache::default();
        let key_a = BeliefContextKey {
            session_id: SessionId(Uuid::new_v4()),
            storyfragment_id: sf(),
        };
        let key_b = BeliefContextKey {
            session_id: SessionId(Uuid::new_v4()),
            storyfragment_id: sf(),
        };
        cache
            .set(key_a.clone(), BeliefContext { visible_panes: vec![] }, Duration::from_secs(60))
            .unwrap();
        cache
            .set(key_b.clone(), BeliefContext { visible_panes: vec![] }, Duration::from_secs(60))
            .unwrap();

        assert!(cache.invalidate(&key_a).unwrap());
        assert!(cache.get(&key_a).unwrap().is_none());
        assert!(cache.get(&key_b).unwrap().is_some());
    }
}
