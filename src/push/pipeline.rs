use std::sync::Arc;
use std::time::Duration;

use tracing::{Level, event};

use crate::cache::CacheManager;
use crate::cache::belief::{BeliefContext, BeliefContextKey};
use crate::cache::session::SessionState;
use crate::error::CoreResult;
use crate::ids::{FingerprintId, HourKey, PaneId, SessionId, StoryFragmentId, TenantId};
use crate::push::broadcaster::{PushBroadcaster, PushEvent};

/// Implements the real-time invalidation pipeline (spec §4.7): a client
/// state event updates the session's held beliefs (step 1), drops the
/// belief context cached for that `(session, storyfragment)` pair (step
/// 2), consults the StoryFragment's belief registry to resolve which panes
/// changed visibility (step 3), invalidates their rendered HTML chunks
/// (step 4), and pushes the result to the affected session(s) (step 5).
pub struct InvalidationPipeline {
    cache: Arc<CacheManager>,
    broadcaster: Arc<PushBroadcaster>,
    session_ttl: Duration,
    broadcast_to_sibling_sessions: bool,
}

/// What changed and what needs to be re-fetched, returned so callers (the
/// SSE handler, tests) can observe the pipeline's effect without
/// re-querying the cache.
#[derive(Debug, Clone)]
pub struct InvalidationOutcome {
    pub affected_panes: Vec<PaneId>,
    pub invalidated_fragment_count: usize,
    pub notified_sessions: Vec<SessionId>,
}

impl InvalidationPipeline {
    pub fn new(
        cache: Arc<CacheManager>,
        broadcaster: Arc<PushBroadcaster>,
        session_ttl: Duration,
        broadcast_to_sibling_sessions: bool,
    ) -> Self {
        Self {
            cache,
            broadcaster,
            session_ttl,
            broadcast_to_sibling_sessions,
        }
    }

    /// Runs the full pipeline for a single belief-held event against one
    /// StoryFragment. `goto_pane_id` carries an optional scroll target the
    /// client requested alongside the belief change.
    pub fn apply_belief_update(
        &self,
        tenant_id: &TenantId,
        session_id: SessionId,
        fingerprint_id: FingerprintId,
        storyfragment_id: StoryFragmentId,
        belief_slug: &str,
        belief_value: &str,
        goto_pane_id: Option<PaneId>,
    ) -> CoreResult<InvalidationOutcome> {
        let shard = self.cache.shard(tenant_id)?;

        // 1. held-belief update.
        let mut state = shard
            .sessions
            .get(&session_id)?
            .map(|(state, _)| state)
            .unwrap_or_else(|| SessionState {
                fingerprint_id,
                held_beliefs: Default::default(),
            });
        state.held_beliefs.insert(belief_slug.to_string(), belief_value.to_string());
        shard.sessions.set(session_id, state, self.session_ttl)?;
        shard.fingerprints.set(fingerprint_id, session_id)?;
        shard.analytics.record_belief_change(belief_slug.to_string(), HourKey::current())?;

        // 2. drop the belief context cached for this session/storyfragment pair.
        shard.belief_contexts.invalidate(&BeliefContextKey {
            session_id,
            storyfragment_id,
        })?;

        // 3. resolve which panes changed visibility.
        let affected_panes = shard
            .belief_registry
            .affected_panes(storyfragment_id, belief_slug, belief_value)?;

        // 4. invalidate each affected pane's rendered HTML chunk, across variants.
        let mut invalidated = 0;
        for pane_id in &affected_panes {
            invalidated += shard.fragments.invalidate_by_pane(storyfragment_id, *pane_id)?;
        }

        // 5. push `panes_updated` to the originating session, or every
        // sibling session on the same fingerprint if configured to fan out.
        let targets = if self.broadcast_to_sibling_sessions {
            shard
                .fingerprints
                .sessions_for(fingerprint_id)?
                .into_iter()
                .collect::<Vec<_>>()
        } else {
            vec![session_id]
        };

        let delivered = self.broadcaster.broadcast(
            tenant_id,
            &targets,
            PushEvent {
                storyfragment_id: storyfragment_id.to_string(),
                affected_panes: affected_panes.iter().map(|id| id.to_string()).collect(),
                goto_pane_id: goto_pane_id.map(|id| id.to_string()),
            },
        )?;

        event!(
            Level::DEBUG,
            tenant = %tenant_id,
            belief = belief_slug,
            invalidated,
            delivered,
            "invalidation pipeline completed"
        );

        let _ = shard.belief_contexts.set(
            BeliefContextKey {
                session_id,
                storyfragment_id,
            },
            BeliefContext {
                visible_panes: affected_panes.clone(),
            },
            self.session_ttl,
        );

        Ok(InvalidationOutcome {
            affected_panes,
            invalidated_fragment_count: invalidated,
            notified_sessions: targets,
        })
    }
}
