use crate::error::CoreError;
use crate::relay::Relay;
use lattice_models::banshare::ControlAction;
use lattice_models::channel::{AutoBanLevel, ChannelKind, Endpoint, JoinStatus};
use lattice_models::message::{Control, ControlRow};

/// Best-effort notice to every endpoint of one kind.
async fn announce(relay: &Relay, kind: ChannelKind, excluding: Option<i64>, text: &str) {
    for sibling in relay.registry.list_kind(kind, excluding) {
        relay.notify(&sibling.credential, text).await;
    }
}

/// A guild asks to bind a channel into the network. The request lands at
/// central review with accept/reject controls.
pub async fn request_join(
    relay: &Relay,
    guild_id: i64,
    channel_id: i64,
    kind: ChannelKind,
    requester_id: i64,
) -> Result<i64, CoreError> {
    let review = relay.review_endpoint()?;
    if relay.registry.by_channel(channel_id).is_some() {
        return Err(CoreError::Conflict(format!(
            "channel {channel_id} is already bound"
        )));
    }

    let request_id = lattice_util::snowflake::generate(1);
    lattice_db::join_requests::create_request(
        &relay.db,
        request_id,
        guild_id,
        channel_id,
        kind,
        requester_id,
    )
    .await?;

    let mut message = relay.system_message(format!(
        "Guild {guild_id} requests to join the {} network with channel {channel_id} \
         (requested by user {requester_id}).",
        kind.as_str()
    ));
    message.controls = vec![ControlRow {
        controls: vec![
            Control {
                id: ControlAction::JoinAccept { request_id }.id(),
                label: "Accept".to_string(),
            },
            Control {
                id: ControlAction::JoinReject { request_id }.id(),
                label: "Reject".to_string(),
            },
        ],
    }];
    relay
        .platform
        .send_message(&review.credential, &message)
        .await?;
    tracing::info!(
        target: "membership",
        "join request {request_id} opened for guild {guild_id} channel {channel_id}",
    );
    Ok(request_id)
}

/// Accept a pending join request: create the platform capability, persist
/// the endpoint, and tell the siblings.
pub async fn accept_join(relay: &Relay, request_id: i64) -> Result<Endpoint, CoreError> {
    let request = lattice_db::join_requests::get_request(&relay.db, request_id)
        .await?
        .ok_or(CoreError::NotFound)?;
    if !lattice_db::join_requests::decide_request(&relay.db, request_id, JoinStatus::Accepted)
        .await?
    {
        return Err(CoreError::Conflict(format!(
            "join request {request_id} was already decided"
        )));
    }

    let credential = relay.platform.create_endpoint(request.channel_id).await?;
    let endpoint = Endpoint {
        id: lattice_util::snowflake::generate(1),
        guild_id: request.guild_id,
        channel_id: request.channel_id,
        kind: request.kind,
        credential,
        important_role_id: None,
        auto_ban_level: AutoBanLevel::None,
    };
    relay.registry.register(&relay.db, endpoint.clone()).await?;
    tracing::info!(
        target: "membership",
        "endpoint {} created for guild {} ({})",
        endpoint.id,
        endpoint.guild_id,
        endpoint.kind.as_str(),
    );

    relay
        .notify(&endpoint.credential, "This channel is now part of the network.")
        .await;
    announce(
        relay,
        endpoint.kind,
        Some(endpoint.id),
        &format!("Guild {} joined the network.", endpoint.guild_id),
    )
    .await;
    Ok(endpoint)
}

pub async fn reject_join(relay: &Relay, request_id: i64) -> Result<(), CoreError> {
    lattice_db::join_requests::get_request(&relay.db, request_id)
        .await?
        .ok_or(CoreError::NotFound)?;
    if !lattice_db::join_requests::decide_request(&relay.db, request_id, JoinStatus::Rejected)
        .await?
    {
        return Err(CoreError::Conflict(format!(
            "join request {request_id} was already decided"
        )));
    }
    tracing::info!(target: "membership", "join request {request_id} rejected");
    Ok(())
}

/// Locally initiated removal: tear down the platform capability too.
pub async fn disconnect(relay: &Relay, endpoint_id: i64) -> Result<(), CoreError> {
    let endpoint = relay
        .registry
        .remove(&relay.db, endpoint_id)
        .await?
        .ok_or(CoreError::NotFound)?;
    if let Err(e) = relay.platform.delete_endpoint(&endpoint.credential).await {
        tracing::warn!(target: "membership", "endpoint {} teardown failed: {e}", endpoint.id);
    }
    tracing::info!(target: "membership", "endpoint {} disconnected", endpoint.id);
    announce(
        relay,
        endpoint.kind,
        None,
        &format!("Guild {} left the network.", endpoint.guild_id),
    )
    .await;
    Ok(())
}

/// Removal after a permanent delivery failure. The credential is already
/// dead upstream, so there is nothing to tear down.
pub async fn self_heal(relay: &Relay, endpoint_id: i64) -> Result<(), CoreError> {
    let Some(endpoint) = relay.registry.remove(&relay.db, endpoint_id).await? else {
        return Ok(());
    };
    tracing::warn!(
        target: "membership",
        "endpoint {} removed after permanent failure (guild {})",
        endpoint.id,
        endpoint.guild_id,
    );
    announce(
        relay,
        endpoint.kind,
        None,
        &format!("Guild {} dropped out of the network.", endpoint.guild_id),
    )
    .await;
    Ok(())
}

/// The relay was removed from a guild; every binding for it goes away.
pub async fn remove_guild(relay: &Relay, guild_id: i64) -> Result<(), CoreError> {
    let removed = relay.registry.remove_guild(&relay.db, guild_id).await?;
    if removed.is_empty() {
        return Ok(());
    }
    tracing::info!(
        target: "membership",
        "guild {guild_id} departed, {} endpoints removed",
        removed.len(),
    );
    for endpoint in &removed {
        announce(
            relay,
            endpoint.kind,
            None,
            &format!("Guild {guild_id} left the network."),
        )
        .await;
    }
    Ok(())
}

/// Re-attach an endpoint whose row was lost but whose platform credential
/// still works. Idempotent on the credential.
pub async fn reattach(
    relay: &Relay,
    guild_id: i64,
    channel_id: i64,
    kind: ChannelKind,
    credential: &str,
) -> Result<Endpoint, CoreError> {
    if let Some(existing) = relay.registry.by_credential(credential) {
        return Ok(existing);
    }
    let endpoint = Endpoint {
        id: lattice_util::snowflake::generate(1),
        guild_id,
        channel_id,
        kind,
        credential: credential.to_string(),
        important_role_id: None,
        auto_ban_level: AutoBanLevel::None,
    };
    relay.registry.register(&relay.db, endpoint.clone()).await?;
    tracing::info!(target: "membership", "endpoint {} re-attached", endpoint.id);
    Ok(endpoint)
}
