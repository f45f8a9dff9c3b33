use crate::error::CoreError;
use crate::platform::ChatPlatform;
use crate::registry::EndpointRegistry;
use crate::{banshare, broadcast, membership, mutation, reactions};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use lattice_db::DbPool;
use lattice_models::channel::Endpoint;
use lattice_models::event::PlatformEvent;
use lattice_models::message::{AuthorIdentity, OutboundMessage};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

#[derive(Debug, Clone)]
pub struct RelaySettings {
    /// The relay's own platform identity; messages it authored are never
    /// re-relayed.
    pub relay_user_id: i64,
    pub relay_display_name: String,
    /// Channel where banshare nominations are reviewed.
    pub review_channel_id: Option<i64>,
    /// Distinct reviewer approvals needed for an important banshare.
    pub important_approval_quorum: u32,
    /// Bounded wait per guided-submission step.
    pub dialog_step_timeout: Duration,
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            relay_user_id: 0,
            relay_display_name: "Lattice".to_string(),
            review_channel_id: None,
            important_approval_quorum: 2,
            dialog_step_timeout: Duration::from_secs(300),
        }
    }
}

/// Tracks users currently inside a guided banshare submission and routes
/// their replies into the waiting dialog task. One dialog per user.
#[derive(Default)]
pub struct DialogSessions {
    active: DashMap<i64, mpsc::Sender<String>>,
}

impl DialogSessions {
    /// Claim the dialog slot for a user. `None` when a dialog is already
    /// in flight for them.
    pub fn begin(&self, user_id: i64) -> Option<mpsc::Receiver<String>> {
        match self.active.entry(user_id) {
            Entry::Occupied(_) => None,
            Entry::Vacant(slot) => {
                let (tx, rx) = mpsc::channel(8);
                slot.insert(tx);
                Some(rx)
            }
        }
    }

    /// Route a message into the user's active dialog. Returns `true` when
    /// the message was consumed as a dialog reply.
    pub fn route(&self, user_id: i64, content: &str) -> bool {
        match self.active.get(&user_id) {
            Some(tx) => tx.try_send(content.to_string()).is_ok(),
            None => false,
        }
    }

    pub fn end(&self, user_id: i64) {
        self.active.remove(&user_id);
    }

    pub fn is_active(&self, user_id: i64) -> bool {
        self.active.contains_key(&user_id)
    }
}

/// Shared state for the whole relay; one instance per process, handed to
/// each event-handling task behind an `Arc`.
pub struct Relay {
    pub db: DbPool,
    pub platform: Arc<dyn ChatPlatform>,
    pub registry: EndpointRegistry,
    pub settings: RelaySettings,
    pub dialogs: DialogSessions,
}

impl Relay {
    /// Build the relay and warm the endpoint mirror from the durable store.
    pub async fn new(
        db: DbPool,
        platform: Arc<dyn ChatPlatform>,
        settings: RelaySettings,
    ) -> Result<Arc<Self>, CoreError> {
        let registry = EndpointRegistry::new();
        let loaded = registry.load(&db).await?;
        tracing::info!(target: "relay", "endpoint registry warmed with {loaded} endpoints");
        Ok(Arc::new(Self {
            db,
            platform,
            registry,
            settings,
            dialogs: DialogSessions::default(),
        }))
    }

    /// Entry point for one inbound platform event; called from its own task.
    pub async fn dispatch(self: Arc<Self>, event: PlatformEvent) {
        if let Err(e) = self.handle(event).await {
            match e {
                CoreError::AuthorizationDenied => {
                    tracing::debug!(target: "relay", "event rejected: {e}")
                }
                CoreError::NotFound => tracing::debug!(target: "relay", "event ignored: {e}"),
                other => tracing::error!(target: "relay", "event handling failed: {other}"),
            }
        }
    }

    async fn handle(self: &Arc<Self>, event: PlatformEvent) -> Result<(), CoreError> {
        match event {
            PlatformEvent::MessageCreated(msg) => {
                if self.dialogs.route(msg.author_id, &msg.content) {
                    return Ok(());
                }
                broadcast::relay_inbound(self, &msg).await.map(drop)
            }
            PlatformEvent::MessageEdited {
                channel_id,
                physical_id,
                editor_id,
                content,
            } => mutation::propagate_edit(self, channel_id, physical_id, editor_id, &content)
                .await
                .map(drop),
            PlatformEvent::MessageDeleted {
                channel_id,
                physical_id,
                actor_id,
            } => mutation::propagate_delete(self, channel_id, physical_id, actor_id)
                .await
                .map(drop),
            PlatformEvent::ReactionAdded {
                channel_id,
                physical_id,
                user_id,
                symbol,
            } => reactions::toggle_from_event(self, channel_id, physical_id, user_id, &symbol)
                .await
                .map(drop),
            PlatformEvent::PinChanged {
                channel_id,
                physical_id,
                pinned,
            } => mutation::propagate_pin(self, channel_id, physical_id, pinned).await,
            PlatformEvent::ControlClicked(click) => banshare::handle_control(self, &click).await,
            PlatformEvent::JoinRequested {
                guild_id,
                channel_id,
                kind,
                requester_id,
            } => membership::request_join(self, guild_id, channel_id, kind, requester_id)
                .await
                .map(drop),
            PlatformEvent::BanRemoved { guild_id, user_id } => {
                banshare::handle_unban(self, guild_id, user_id)
                    .await
                    .map(drop)
            }
            PlatformEvent::GuildRemoved { guild_id } => {
                membership::remove_guild(self, guild_id).await
            }
        }
    }

    pub fn system_author(&self) -> AuthorIdentity {
        AuthorIdentity {
            user_id: self.settings.relay_user_id,
            display_name: self.settings.relay_display_name.clone(),
            avatar_url: None,
        }
    }

    pub fn system_message(&self, content: impl Into<String>) -> OutboundMessage {
        OutboundMessage::new(self.system_author(), content)
    }

    /// Best-effort notice into a channel; failures are logged, not surfaced.
    pub async fn notify(&self, credential: &str, content: &str) {
        let message = self.system_message(content);
        if let Err(e) = self.platform.send_message(credential, &message).await {
            tracing::debug!(target: "relay", "notice delivery failed: {e}");
        }
    }

    /// The configured central review endpoint, required by the banshare
    /// and membership workflows.
    pub fn review_endpoint(&self) -> Result<Endpoint, CoreError> {
        let channel_id = self
            .settings
            .review_channel_id
            .ok_or(CoreError::ConfigurationMissing("review channel"))?;
        self.registry
            .by_channel(channel_id)
            .ok_or(CoreError::ConfigurationMissing(
                "review channel has no endpoint",
            ))
    }
}

#[cfg(test)]
mod tests {
    use super::DialogSessions;

    #[test]
    fn dialog_slot_is_single_flight_per_user() {
        let sessions = DialogSessions::default();
        let first = sessions.begin(7);
        assert!(first.is_some());
        assert!(sessions.begin(7).is_none());
        assert!(sessions.begin(8).is_some());

        sessions.end(7);
        assert!(!sessions.is_active(7));
        assert!(sessions.begin(7).is_some());
    }

    #[tokio::test]
    async fn replies_route_only_to_active_dialogs() {
        let sessions = DialogSessions::default();
        let mut rx = sessions.begin(7).unwrap();

        assert!(sessions.route(7, "some reply"));
        assert!(!sessions.route(8, "nobody waiting"));
        assert_eq!(rx.recv().await.as_deref(), Some("some reply"));
    }
}
