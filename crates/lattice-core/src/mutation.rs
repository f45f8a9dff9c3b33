use crate::broadcast::{self, SendOutcome, REPLY_SNIPPET_CHARS};
use crate::error::CoreError;
use crate::relay::Relay;
use futures_util::future::join_all;
use lattice_models::channel::Endpoint;
use lattice_models::message::MessageEdit;

/// Who initiated a propagated deletion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteKind {
    Author,
    Moderator,
}

/// Map one observed (channel, physical id) back to its logical message.
/// Copies resolve through the copy table; the original inbound message
/// resolves through the logical row's source fields.
pub(crate) async fn resolve_logical(
    relay: &Relay,
    endpoint: &Endpoint,
    physical_id: i64,
) -> Result<Option<i64>, CoreError> {
    if let Some(id) =
        lattice_db::messages::find_logical_id(&relay.db, endpoint.id, physical_id).await?
    {
        return Ok(Some(id));
    }
    Ok(
        lattice_db::messages::find_logical_by_source(&relay.db, endpoint.channel_id, physical_id)
            .await?,
    )
}

async fn authorize(
    relay: &Relay,
    guild_id: i64,
    actor_id: i64,
    author_id: i64,
) -> Result<DeleteKind, CoreError> {
    if actor_id == author_id {
        return Ok(DeleteKind::Author);
    }
    if relay.platform.has_moderation_rights(guild_id, actor_id).await? {
        return Ok(DeleteKind::Moderator);
    }
    Err(CoreError::AuthorizationDenied)
}

/// Replace the content of every copy after the author (or a moderator)
/// edited the message. Returns the number of copies updated, `None` when
/// the physical id is unknown.
pub async fn propagate_edit(
    relay: &Relay,
    channel_id: i64,
    physical_id: i64,
    editor_id: i64,
    content: &str,
) -> Result<Option<usize>, CoreError> {
    let Some(origin) = relay.registry.by_channel(channel_id) else {
        return Ok(None);
    };
    let Some(logical_id) = resolve_logical(relay, &origin, physical_id).await? else {
        return Ok(None);
    };
    let Some(meta) = lattice_db::messages::get_logical_message(&relay.db, logical_id).await? else {
        return Ok(None);
    };
    authorize(relay, origin.guild_id, editor_id, meta.author_id).await?;

    lattice_db::messages::update_snippet(
        &relay.db,
        logical_id,
        &lattice_util::text::snippet(content, REPLY_SNIPPET_CHARS),
    )
    .await?;

    let copies = lattice_db::messages::list_copies(&relay.db, logical_id).await?;
    let edit = MessageEdit::content(content);
    let edits = copies
        .iter()
        .filter(|copy| !(copy.endpoint_id == origin.id && copy.physical_id == physical_id))
        .filter_map(|copy| relay.registry.get(copy.endpoint_id).map(|e| (e, copy)))
        .map(|(endpoint, copy)| {
            let edit = edit.clone();
            async move {
                match relay
                    .platform
                    .edit_message(&endpoint.credential, copy.physical_id, &edit)
                    .await
                {
                    Ok(()) => SendOutcome::Sent,
                    Err(e) if e.is_permanent() => SendOutcome::Dead(endpoint.id),
                    Err(e) => {
                        tracing::warn!(
                            target: "relay",
                            "edit of copy {} at endpoint {} failed: {e}",
                            copy.physical_id,
                            endpoint.id,
                        );
                        SendOutcome::Failed
                    }
                }
            }
        });
    let outcomes = join_all(edits).await;
    let report = broadcast::collect_outcomes(relay, outcomes).await;
    tracing::info!(
        target: "relay",
        "edit of message {logical_id} propagated to {} copies, {} failed",
        report.sent,
        report.failed,
    );
    Ok(Some(report.sent))
}

/// Remove every copy of a deleted message, then purge the correlation
/// rows. Per-copy failures are tolerated; the purge always runs.
pub async fn propagate_delete(
    relay: &Relay,
    channel_id: i64,
    physical_id: i64,
    actor_id: Option<i64>,
) -> Result<Option<DeleteKind>, CoreError> {
    // Deletions the relay itself performed echo back as events.
    if actor_id == Some(relay.settings.relay_user_id) {
        return Ok(None);
    }
    let Some(origin) = relay.registry.by_channel(channel_id) else {
        return Ok(None);
    };
    let Some(logical_id) = resolve_logical(relay, &origin, physical_id).await? else {
        return Ok(None);
    };
    let Some(meta) = lattice_db::messages::get_logical_message(&relay.db, logical_id).await? else {
        return Ok(None);
    };
    let kind = match actor_id {
        Some(actor) => authorize(relay, origin.guild_id, actor, meta.author_id).await?,
        None => DeleteKind::Author,
    };

    let copies = lattice_db::messages::list_copies(&relay.db, logical_id).await?;
    let deletes = copies
        .iter()
        .filter(|copy| !(copy.endpoint_id == origin.id && copy.physical_id == physical_id))
        .filter_map(|copy| relay.registry.get(copy.endpoint_id).map(|e| (e, copy)))
        .map(|(endpoint, copy)| async move {
            match relay
                .platform
                .delete_message(&endpoint.credential, copy.physical_id)
                .await
            {
                Ok(()) => SendOutcome::Sent,
                Err(e) if e.is_permanent() => SendOutcome::Dead(endpoint.id),
                Err(e) => {
                    tracing::warn!(
                        target: "relay",
                        "delete of copy {} at endpoint {} failed: {e}",
                        copy.physical_id,
                        endpoint.id,
                    );
                    SendOutcome::Failed
                }
            }
        });
    let outcomes = join_all(deletes).await;
    broadcast::collect_outcomes(relay, outcomes).await;

    // The only purge path; runs even when some copy deletions failed so
    // no logical id outlives its last reachable copy.
    lattice_db::messages::delete_logical_message(&relay.db, logical_id).await?;
    tracing::info!(target: "relay", "message {logical_id} deleted ({kind:?})");

    if kind == DeleteKind::Moderator {
        if let Some(source) = relay.registry.by_channel(meta.source_channel_id) {
            relay
                .notify(&source.credential, "A relayed message was removed by a moderator.")
                .await;
        }
    }
    Ok(Some(kind))
}

/// Mirror a pin or unpin onto every sibling copy. Best effort.
pub async fn propagate_pin(
    relay: &Relay,
    channel_id: i64,
    physical_id: i64,
    pinned: bool,
) -> Result<(), CoreError> {
    let Some(origin) = relay.registry.by_channel(channel_id) else {
        return Ok(());
    };
    let Some(logical_id) = resolve_logical(relay, &origin, physical_id).await? else {
        return Ok(());
    };
    let copies = lattice_db::messages::list_copies(&relay.db, logical_id).await?;
    let pins = copies
        .iter()
        .filter(|copy| !(copy.endpoint_id == origin.id && copy.physical_id == physical_id))
        .filter_map(|copy| relay.registry.get(copy.endpoint_id).map(|e| (e, copy)))
        .map(|(endpoint, copy)| async move {
            let result = if pinned {
                relay
                    .platform
                    .pin_message(&endpoint.credential, copy.physical_id)
                    .await
            } else {
                relay
                    .platform
                    .unpin_message(&endpoint.credential, copy.physical_id)
                    .await
            };
            if let Err(e) = result {
                tracing::warn!(
                    target: "relay",
                    "pin update for copy {} at endpoint {} failed: {e}",
                    copy.physical_id,
                    endpoint.id,
                );
            }
        });
    join_all(pins).await;
    Ok(())
}
