use crate::platform::{ChatPlatform, PlatformError};
use crate::relay::{Relay, RelaySettings};
use async_trait::async_trait;
use dashmap::{DashMap, DashSet};
use lattice_models::channel::{AutoBanLevel, ChannelKind, Endpoint};
use lattice_models::event::InboundMessage;
use lattice_models::message::{MessageEdit, OutboundMessage};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const TEST_RELAY_USER: i64 = 999;

#[derive(Debug, Clone, Copy)]
pub enum FailureMode {
    Transient,
    Permanent,
}

impl FailureMode {
    fn to_error(self) -> PlatformError {
        match self {
            Self::Transient => PlatformError::Transient("injected".to_string()),
            Self::Permanent => PlatformError::Permanent("injected".to_string()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SentMessage {
    pub credential: String,
    pub message: OutboundMessage,
}

#[derive(Debug, Clone)]
pub struct EditRecord {
    pub credential: String,
    pub physical_id: i64,
    pub edit: MessageEdit,
}

/// Scriptable in-memory platform. Physical ids start at 9000 and count up
/// across all credentials.
#[derive(Default)]
pub struct MockPlatform {
    next_physical: AtomicI64,
    next_credential: AtomicI64,
    pub sent: Mutex<Vec<SentMessage>>,
    pub edits: Mutex<Vec<EditRecord>>,
    pub deleted: Mutex<Vec<(String, i64)>>,
    pub pins: Mutex<Vec<(String, i64, bool)>>,
    pub cleared_reactions: Mutex<Vec<(String, i64, i64, String)>>,
    pub bans: Mutex<Vec<(i64, i64)>>,
    pub deleted_endpoints: Mutex<Vec<String>>,
    /// Credentials whose calls fail, and how.
    pub fail_credentials: DashMap<String, FailureMode>,
    /// Guilds whose ban calls fail transiently.
    pub fail_bans: DashSet<i64>,
    /// (guild_id, user_id) pairs granted moderation rights.
    pub moderators: DashSet<(i64, i64)>,
}

impl MockPlatform {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            next_physical: AtomicI64::new(9000),
            next_credential: AtomicI64::new(1),
            ..Self::default()
        })
    }

    fn check(&self, credential: &str) -> Result<(), PlatformError> {
        match self.fail_credentials.get(credential) {
            Some(mode) => Err(mode.to_error()),
            None => Ok(()),
        }
    }

    pub fn sent_to(&self, credential: &str) -> Vec<OutboundMessage> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|s| s.credential == credential)
            .map(|s| s.message.clone())
            .collect()
    }

    pub fn edits_to(&self, credential: &str) -> Vec<EditRecord> {
        self.edits
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.credential == credential)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl ChatPlatform for MockPlatform {
    async fn send_message(
        &self,
        credential: &str,
        message: &OutboundMessage,
    ) -> Result<i64, PlatformError> {
        self.check(credential)?;
        let physical_id = self.next_physical.fetch_add(1, Ordering::SeqCst);
        self.sent.lock().unwrap().push(SentMessage {
            credential: credential.to_string(),
            message: message.clone(),
        });
        Ok(physical_id)
    }

    async fn edit_message(
        &self,
        credential: &str,
        physical_id: i64,
        edit: &MessageEdit,
    ) -> Result<(), PlatformError> {
        self.check(credential)?;
        self.edits.lock().unwrap().push(EditRecord {
            credential: credential.to_string(),
            physical_id,
            edit: edit.clone(),
        });
        Ok(())
    }

    async fn delete_message(
        &self,
        credential: &str,
        physical_id: i64,
    ) -> Result<(), PlatformError> {
        self.check(credential)?;
        self.deleted
            .lock()
            .unwrap()
            .push((credential.to_string(), physical_id));
        Ok(())
    }

    async fn pin_message(&self, credential: &str, physical_id: i64) -> Result<(), PlatformError> {
        self.check(credential)?;
        self.pins
            .lock()
            .unwrap()
            .push((credential.to_string(), physical_id, true));
        Ok(())
    }

    async fn unpin_message(&self, credential: &str, physical_id: i64) -> Result<(), PlatformError> {
        self.check(credential)?;
        self.pins
            .lock()
            .unwrap()
            .push((credential.to_string(), physical_id, false));
        Ok(())
    }

    async fn remove_reaction(
        &self,
        credential: &str,
        physical_id: i64,
        user_id: i64,
        symbol: &str,
    ) -> Result<(), PlatformError> {
        self.check(credential)?;
        self.cleared_reactions.lock().unwrap().push((
            credential.to_string(),
            physical_id,
            user_id,
            symbol.to_string(),
        ));
        Ok(())
    }

    async fn create_endpoint(&self, _channel_id: i64) -> Result<String, PlatformError> {
        let n = self.next_credential.fetch_add(1, Ordering::SeqCst);
        Ok(format!("mock-cred-{n}"))
    }

    async fn delete_endpoint(&self, credential: &str) -> Result<(), PlatformError> {
        self.deleted_endpoints
            .lock()
            .unwrap()
            .push(credential.to_string());
        Ok(())
    }

    async fn ban_user(&self, guild_id: i64, user_id: i64) -> Result<(), PlatformError> {
        if self.fail_bans.contains(&guild_id) {
            return Err(PlatformError::Transient("injected ban failure".to_string()));
        }
        self.bans.lock().unwrap().push((guild_id, user_id));
        Ok(())
    }

    async fn has_moderation_rights(
        &self,
        guild_id: i64,
        user_id: i64,
    ) -> Result<bool, PlatformError> {
        Ok(self.moderators.contains(&(guild_id, user_id)))
    }
}

pub fn test_settings() -> RelaySettings {
    RelaySettings {
        relay_user_id: TEST_RELAY_USER,
        relay_display_name: "Lattice".to_string(),
        review_channel_id: None,
        important_approval_quorum: 2,
        dialog_step_timeout: Duration::from_secs(5),
    }
}

pub async fn test_relay() -> (Arc<Relay>, Arc<MockPlatform>) {
    test_relay_with(test_settings()).await
}

pub async fn test_relay_with(settings: RelaySettings) -> (Arc<Relay>, Arc<MockPlatform>) {
    let pool = lattice_db::create_pool("sqlite::memory:", 1).await.unwrap();
    lattice_db::run_migrations(&pool).await.unwrap();
    let platform = MockPlatform::new();
    let relay = Relay::new(pool, platform.clone(), settings).await.unwrap();
    (relay, platform)
}

pub async fn add_endpoint(
    relay: &Relay,
    id: i64,
    guild_id: i64,
    channel_id: i64,
    kind: ChannelKind,
) -> Endpoint {
    add_endpoint_with(relay, id, guild_id, channel_id, kind, AutoBanLevel::None).await
}

pub async fn add_endpoint_with(
    relay: &Relay,
    id: i64,
    guild_id: i64,
    channel_id: i64,
    kind: ChannelKind,
    auto_ban_level: AutoBanLevel,
) -> Endpoint {
    let endpoint = Endpoint {
        id,
        guild_id,
        channel_id,
        kind,
        credential: format!("cred-{id}"),
        important_role_id: None,
        auto_ban_level,
    };
    relay
        .registry
        .register(&relay.db, endpoint.clone())
        .await
        .unwrap();
    endpoint
}

pub fn inbound(
    guild_id: i64,
    channel_id: i64,
    physical_id: i64,
    author_id: i64,
    content: &str,
) -> InboundMessage {
    InboundMessage {
        guild_id,
        channel_id,
        physical_id,
        author_id,
        author_name: format!("user-{author_id}"),
        avatar_url: None,
        content: content.to_string(),
        attachments: Vec::new(),
        reference_physical_id: None,
    }
}
