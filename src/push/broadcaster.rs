use std::collections::HashMap;
use std::sync::RwLock;

use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{Level, event};

use crate::error::{CoreResult, read_lock_poisoned, write_lock_poisoned};
use crate::ids::{SessionId, TenantId};

/// The push payload spec §6 mandates, serialized as the SSE `data:` field
/// of a `panes_updated` event — the only event type the core emits.
#[derive(Debug, Clone, Serialize)]
pub struct PushEvent {
    #[serde(rename = "storyfragmentId")]
    pub storyfragment_id: String,
    #[serde(rename = "affectedPanes")]
    pub affected_panes: Vec<String>,
    #[serde(rename = "gotoPaneId", skip_serializing_if = "Option::is_none")]
    pub goto_pane_id: Option<String>,
}

type ClientKey = (TenantId, SessionId);

/// Fans invalidation events out to connected SSE clients. Per-client
/// channels are bounded `tokio::sync::mpsc` senders; `broadcast` uses
/// `try_send` so a slow or disconnected client never blocks the
/// invalidation pipeline (spec §4.8/§5), following the same
/// spawn-a-task-own-a-sender shape as the teacher pack's SSE streaming
/// handler.
#[derive(Default)]
pub struct PushBroadcaster {
    clients: RwLock<HashMap<ClientKey, mpsc::Sender<PushEvent>>>,
}

impl PushBroadcaster {
    pub fn add_client(
        &self,
        tenant_id: TenantId,
        session_id: SessionId,
        capacity: usize,
    ) -> CoreResult<mpsc::Receiver<PushEvent>> {
        let (tx, rx) = mpsc::channel(capacity);
        let mut guard = self.clients.write().map_err(write_lock_poisoned)?;
        guard.insert((tenant_id, session_id), tx);
        Ok(rx)
    }

    pub fn remove_client(&self, tenant_id: &TenantId, session_id: &SessionId) -> CoreResult<()> {
        let mut guard = self.clients.write().map_err(write_lock_poisoned)?;
        guard.remove(&(tenant_id.clone(), *session_id));
        Ok(())
    }

    pub fn has_viewing_sessions(&self, tenant_id: &TenantId) -> CoreResult<bool> {
        let guard = self.clients.read().map_err(read_lock_poisoned)?;
        Ok(guard.keys().any(|(t, _)| t == tenant_id))
    }

    /// Sends `event` to exactly the sessions named in `targets`. A full
    /// channel is dropped and logged rather than awaited, per §5's
    /// non-blocking requirement; a missing/disconnected client is silently
    /// skipped, since `remove_client` races the invalidation pipeline by
    /// design.
    pub fn broadcast(&self, tenant_id: &TenantId, targets: &[SessionId], event: PushEvent) -> CoreResult<usize> {
        let guard = self.clients.read().map_err(read_lock_poisoned)?;
        let mut delivered = 0;
        for session_id in targets {
            let Some(sender) = guard.get(&(tenant_id.clone(), *session_id)) else {
                continue;
            };
            match sender.try_send(event.clone()) {
                Ok(()) => delivered += 1,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    event!(
                        Level::WARN,
                        tenant = %tenant_id,
                        session = %session_id,
                        "dropping push event: client channel full"
                    );
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {}
            }
        }
        Ok(delivered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[tokio::test]
    async fn broadcast_delivers_only_to_targeted_sessions() {
        let broadcaster = PushBroadcaster::default();
        let tenant = TenantId::from("acme");
        let s1 = SessionId(Uuid::new_v4());
        let s2 = SessionId(Uuid::new_v4());
        let mut rx1 = broadcaster.add_client(tenant.clone(), s1, 4).unwrap();
        let mut _rx2 = broadcaster.add_client(tenant.clone(), s2, 4).unwrap();

        let delivered = broadcaster
            .broadcast(
                &tenant,
                &[s1],
                PushEvent {
                    storyfragment_id: "sf1".to_string(),
                    affected_panes: vec!["p7".to_string(), "p9".to_string()],
                    goto_pane_id: None,
                },
            )
            .unwrap();
        assert_eq!(delivered, 1);
        assert!(rx1.try_recv().is_ok());
    }

    #[test]
    fn has_viewing_sessions_reflects_active_clients() {
        let broadcaster = PushBroadcaster::default();
        let tenant = TenantId::from("acme");
        assert!(!broadcaster.has_viewing_sessions(&tenant).unwrap());
        let session = SessionId(Uuid::new_v4());
        let _rx = broadcaster.add_client(tenant.clone(), session, 4).unwrap();
        assert!(broadcaster.has_viewing_sessions(&tenant).unwrap());
        broadcaster.remove_client(&tenant, &session).unwrap();
        assert!(!broadcaster.has_viewing_sessions(&tenant).unwrap());
    }

    #[test]
    fn full_channel_drops_without_blocking() {
        let broadcaster = PushBroadcaster::default();
        let tenant = TenantId::from("acme");
        let session = SessionId(Uuid::new_v4());
        let _rx = broadcaster.add_client(tenant.clone(), session, 1).unwrap();
        let ev = PushEvent {
            storyfragment_id: "sf1".to_string(),
            affected_panes: vec![],
            goto_pane_id: None,
        };
        broadcaster.broadcast(&tenant, &[session], ev.clone()).unwrap();
        let delivered = broadcaster.broadcast(&tenant, &[session], ev).unwrap();
        assert_eq!(delivered, 0);
    }
}
