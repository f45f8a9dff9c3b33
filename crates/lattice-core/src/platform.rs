use async_trait::async_trait;
use lattice_models::message::{MessageEdit, OutboundMessage};
use thiserror::Error;

/// Failure from a platform call, classified by whether retrying against the
/// same endpoint can ever succeed.
#[derive(Debug, Error)]
pub enum PlatformError {
    /// Network trouble, rate limiting, a 5xx — worth retrying later.
    #[error("transient platform failure: {0}")]
    Transient(String),
    /// The endpoint credential was revoked or the target no longer exists
    /// upstream. Feeds the membership self-heal path.
    #[error("endpoint permanently unavailable: {0}")]
    Permanent(String),
}

impl PlatformError {
    pub fn is_permanent(&self) -> bool {
        matches!(self, Self::Permanent(_))
    }
}

/// The chat platform as the relay consumes it: a narrow capability set
/// where every call can fail independently per target and nothing is
/// atomic across targets.
#[async_trait]
pub trait ChatPlatform: Send + Sync {
    /// Deliver a message through an endpoint. Returns the physical id of
    /// the created copy.
    async fn send_message(
        &self,
        credential: &str,
        message: &OutboundMessage,
    ) -> Result<i64, PlatformError>;

    async fn edit_message(
        &self,
        credential: &str,
        physical_id: i64,
        edit: &MessageEdit,
    ) -> Result<(), PlatformError>;

    async fn delete_message(&self, credential: &str, physical_id: i64)
        -> Result<(), PlatformError>;

    async fn pin_message(&self, credential: &str, physical_id: i64) -> Result<(), PlatformError>;

    async fn unpin_message(&self, credential: &str, physical_id: i64) -> Result<(), PlatformError>;

    /// Clear a user's native reaction so the rendered control row stays the
    /// single representation of reaction state.
    async fn remove_reaction(
        &self,
        credential: &str,
        physical_id: i64,
        user_id: i64,
        symbol: &str,
    ) -> Result<(), PlatformError>;

    /// Create the platform-side send capability for a channel.
    async fn create_endpoint(&self, channel_id: i64) -> Result<String, PlatformError>;

    async fn delete_endpoint(&self, credential: &str) -> Result<(), PlatformError>;

    async fn ban_user(&self, guild_id: i64, user_id: i64) -> Result<(), PlatformError>;

    /// Delegated moderator check; the platform owns the permission model.
    async fn has_moderation_rights(
        &self,
        guild_id: i64,
        user_id: i64,
    ) -> Result<bool, PlatformError>;
}
