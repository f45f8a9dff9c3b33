use async_trait::async_trait;
use lattice_core::platform::{ChatPlatform, PlatformError};
use lattice_models::message::{MessageEdit, OutboundMessage};
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

// Must exceed the long-poll wait in events.rs.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_RETRIES: u32 = 3;
const RETRY_BASE_DELAY: Duration = Duration::from_millis(500);

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("http error: {0}")]
    Http(String),
    #[error("gateway returned {status}: {message}")]
    Remote { status: u16, message: String },
}

impl GatewayError {
    /// Client errors other than rate limiting mean the target is gone or
    /// the credential is dead; retrying cannot help.
    pub fn is_permanent(&self) -> bool {
        matches!(self, Self::Remote { status, .. }
            if (400..500).contains(status) && *status != 429)
    }
}

impl From<GatewayError> for PlatformError {
    fn from(e: GatewayError) -> Self {
        if e.is_permanent() {
            PlatformError::Permanent(e.to_string())
        } else {
            PlatformError::Transient(e.to_string())
        }
    }
}

/// HTTP client for the platform gateway's REST surface.
#[derive(Debug, Clone)]
pub struct GatewayClient {
    http: Client,
    base_url: String,
    token: String,
}

#[derive(Debug, Deserialize)]
struct SendMessageResponse {
    physical_id: i64,
}

#[derive(Debug, Deserialize)]
struct CreateEndpointResponse {
    credential: String,
}

#[derive(Debug, Deserialize)]
struct ModeratorResponse {
    moderator: bool,
}

impl GatewayClient {
    pub fn new(base_url: &str, token: &str) -> Result<Self, GatewayError> {
        let http = Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .user_agent("Lattice-Gateway/0.3")
            .build()
            .map_err(|e| GatewayError::Http(e.to_string()))?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
        })
    }

    pub(crate) fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// GET with exponential backoff retry on transient failure.
    pub(crate) async fn get_with_retry(
        &self,
        url: &str,
    ) -> Result<reqwest::Response, GatewayError> {
        let mut last_err = GatewayError::Http("no attempts made".to_string());
        for attempt in 0..MAX_RETRIES {
            let request = self
                .http
                .get(url)
                .header("authorization", format!("Bearer {}", self.token));
            match request.send().await {
                Ok(resp) if resp.status().is_success() => return Ok(resp),
                Ok(resp) if resp.status().is_server_error() || resp.status().as_u16() == 429 => {
                    last_err = GatewayError::Remote {
                        status: resp.status().as_u16(),
                        message: format!("from {url}"),
                    };
                }
                Ok(resp) => {
                    return Err(GatewayError::Remote {
                        status: resp.status().as_u16(),
                        message: format!("from {url}"),
                    });
                }
                Err(e) => {
                    last_err = GatewayError::Http(e.to_string());
                }
            }
            if attempt + 1 < MAX_RETRIES {
                tokio::time::sleep(RETRY_BASE_DELAY * 2u32.pow(attempt)).await;
            }
        }
        Err(last_err)
    }

    /// POST with exponential backoff retry.
    async fn post_with_retry(
        &self,
        url: &str,
        body_bytes: Vec<u8>,
    ) -> Result<reqwest::Response, GatewayError> {
        let mut last_err = GatewayError::Http("no attempts made".to_string());
        for attempt in 0..MAX_RETRIES {
            let request = self
                .http
                .post(url)
                .header("authorization", format!("Bearer {}", self.token))
                .header("content-type", "application/json")
                .body(body_bytes.clone());
            match request.send().await {
                Ok(resp) if resp.status().is_success() => return Ok(resp),
                Ok(resp) if resp.status().is_server_error() || resp.status().as_u16() == 429 => {
                    last_err = GatewayError::Remote {
                        status: resp.status().as_u16(),
                        message: format!("from {url}"),
                    };
                }
                Ok(resp) => {
                    return Err(GatewayError::Remote {
                        status: resp.status().as_u16(),
                        message: format!("from {url}"),
                    });
                }
                Err(e) => {
                    last_err = GatewayError::Http(e.to_string());
                }
            }
            if attempt + 1 < MAX_RETRIES {
                tokio::time::sleep(RETRY_BASE_DELAY * 2u32.pow(attempt)).await;
            }
        }
        Err(last_err)
    }

    async fn delete_with_retry(&self, url: &str) -> Result<reqwest::Response, GatewayError> {
        let mut last_err = GatewayError::Http("no attempts made".to_string());
        for attempt in 0..MAX_RETRIES {
            let request = self
                .http
                .delete(url)
                .header("authorization", format!("Bearer {}", self.token));
            match request.send().await {
                Ok(resp) if resp.status().is_success() => return Ok(resp),
                Ok(resp) if resp.status().is_server_error() || resp.status().as_u16() == 429 => {
                    last_err = GatewayError::Remote {
                        status: resp.status().as_u16(),
                        message: format!("from {url}"),
                    };
                }
                Ok(resp) => {
                    return Err(GatewayError::Remote {
                        status: resp.status().as_u16(),
                        message: format!("from {url}"),
                    });
                }
                Err(e) => {
                    last_err = GatewayError::Http(e.to_string());
                }
            }
            if attempt + 1 < MAX_RETRIES {
                tokio::time::sleep(RETRY_BASE_DELAY * 2u32.pow(attempt)).await;
            }
        }
        Err(last_err)
    }

    async fn post_json<B: serde::Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<reqwest::Response, GatewayError> {
        let bytes = serde_json::to_vec(body).map_err(|e| GatewayError::Http(e.to_string()))?;
        self.post_with_retry(&self.url(path), bytes).await
    }
}

#[async_trait]
impl ChatPlatform for GatewayClient {
    async fn send_message(
        &self,
        credential: &str,
        message: &OutboundMessage,
    ) -> Result<i64, PlatformError> {
        let resp = self
            .post_json(&format!("/endpoints/{credential}/messages"), message)
            .await?;
        let body: SendMessageResponse = resp
            .json()
            .await
            .map_err(|e| PlatformError::Transient(format!("invalid send response: {e}")))?;
        Ok(body.physical_id)
    }

    async fn edit_message(
        &self,
        credential: &str,
        physical_id: i64,
        edit: &MessageEdit,
    ) -> Result<(), PlatformError> {
        self.post_json(
            &format!("/endpoints/{credential}/messages/{physical_id}/edit"),
            edit,
        )
        .await?;
        Ok(())
    }

    async fn delete_message(
        &self,
        credential: &str,
        physical_id: i64,
    ) -> Result<(), PlatformError> {
        self.delete_with_retry(&self.url(&format!(
            "/endpoints/{credential}/messages/{physical_id}"
        )))
        .await?;
        Ok(())
    }

    async fn pin_message(&self, credential: &str, physical_id: i64) -> Result<(), PlatformError> {
        self.post_json(
            &format!("/endpoints/{credential}/messages/{physical_id}/pin"),
            &serde_json::json!({}),
        )
        .await?;
        Ok(())
    }

    async fn unpin_message(&self, credential: &str, physical_id: i64) -> Result<(), PlatformError> {
        self.delete_with_retry(&self.url(&format!(
            "/endpoints/{credential}/messages/{physical_id}/pin"
        )))
        .await?;
        Ok(())
    }

    async fn remove_reaction(
        &self,
        credential: &str,
        physical_id: i64,
        user_id: i64,
        symbol: &str,
    ) -> Result<(), PlatformError> {
        self.post_json(
            &format!("/endpoints/{credential}/messages/{physical_id}/reactions/remove"),
            &serde_json::json!({ "user_id": user_id, "symbol": symbol }),
        )
        .await?;
        Ok(())
    }

    async fn create_endpoint(&self, channel_id: i64) -> Result<String, PlatformError> {
        let resp = self
            .post_json(
                &format!("/channels/{channel_id}/endpoints"),
                &serde_json::json!({}),
            )
            .await?;
        let body: CreateEndpointResponse = resp
            .json()
            .await
            .map_err(|e| PlatformError::Transient(format!("invalid endpoint response: {e}")))?;
        Ok(body.credential)
    }

    async fn delete_endpoint(&self, credential: &str) -> Result<(), PlatformError> {
        self.delete_with_retry(&self.url(&format!("/endpoints/{credential}")))
            .await?;
        Ok(())
    }

    async fn ban_user(&self, guild_id: i64, user_id: i64) -> Result<(), PlatformError> {
        self.post_json(
            &format!("/guilds/{guild_id}/bans"),
            &serde_json::json!({ "user_id": user_id }),
        )
        .await?;
        Ok(())
    }

    async fn has_moderation_rights(
        &self,
        guild_id: i64,
        user_id: i64,
    ) -> Result<bool, PlatformError> {
        let resp = self
            .get_with_retry(&self.url(&format!("/guilds/{guild_id}/members/{user_id}/moderator")))
            .await
            .map_err(PlatformError::from)?;
        let body: ModeratorResponse = resp
            .json()
            .await
            .map_err(|e| PlatformError::Transient(format!("invalid moderator response: {e}")))?;
        Ok(body.moderator)
    }
}
