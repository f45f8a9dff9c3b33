use crate::error::CoreError;
use dashmap::DashMap;
use lattice_db::DbPool;
use lattice_models::channel::{ChannelKind, Endpoint};

/// In-memory mirror of the endpoint table.
///
/// Every read goes through the mirror; the durable store stays
/// authoritative and is re-read on process start. Mutations write the
/// database first, then the mirror, so a failed write leaves the mirror
/// unchanged.
#[derive(Debug, Default)]
pub struct EndpointRegistry {
    endpoints: DashMap<i64, Endpoint>,
}

impl EndpointRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild the mirror from the durable store.
    pub async fn load(&self, pool: &DbPool) -> Result<usize, CoreError> {
        let rows = lattice_db::endpoints::list_endpoints(pool).await?;
        self.endpoints.clear();
        let count = rows.len();
        for row in rows {
            let endpoint: Endpoint = row.into();
            self.endpoints.insert(endpoint.id, endpoint);
        }
        Ok(count)
    }

    pub async fn register(&self, pool: &DbPool, endpoint: Endpoint) -> Result<(), CoreError> {
        lattice_db::endpoints::register_endpoint(pool, &endpoint).await?;
        self.endpoints.insert(endpoint.id, endpoint);
        Ok(())
    }

    pub async fn remove(
        &self,
        pool: &DbPool,
        endpoint_id: i64,
    ) -> Result<Option<Endpoint>, CoreError> {
        lattice_db::endpoints::remove_endpoint(pool, endpoint_id).await?;
        Ok(self.endpoints.remove(&endpoint_id).map(|(_, e)| e))
    }

    pub async fn remove_guild(
        &self,
        pool: &DbPool,
        guild_id: i64,
    ) -> Result<Vec<Endpoint>, CoreError> {
        lattice_db::endpoints::remove_guild_endpoints(pool, guild_id).await?;
        let ids: Vec<i64> = self
            .endpoints
            .iter()
            .filter(|entry| entry.guild_id == guild_id)
            .map(|entry| entry.id)
            .collect();
        let mut removed = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some((_, endpoint)) = self.endpoints.remove(&id) {
                removed.push(endpoint);
            }
        }
        Ok(removed)
    }

    pub fn get(&self, endpoint_id: i64) -> Option<Endpoint> {
        self.endpoints.get(&endpoint_id).map(|e| e.clone())
    }

    pub fn by_channel(&self, channel_id: i64) -> Option<Endpoint> {
        self.endpoints
            .iter()
            .find(|entry| entry.channel_id == channel_id)
            .map(|entry| entry.clone())
    }

    pub fn by_credential(&self, credential: &str) -> Option<Endpoint> {
        self.endpoints
            .iter()
            .find(|entry| entry.credential == credential)
            .map(|entry| entry.clone())
    }

    /// Endpoints sharing one channel kind, optionally excluding an origin.
    /// Sorted by id so fan-out order is deterministic.
    pub fn list_kind(&self, kind: ChannelKind, excluding: Option<i64>) -> Vec<Endpoint> {
        let mut out: Vec<Endpoint> = self
            .endpoints
            .iter()
            .filter(|entry| entry.kind == kind && Some(entry.id) != excluding)
            .map(|entry| entry.clone())
            .collect();
        out.sort_by_key(|e| e.id);
        out
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }
}
