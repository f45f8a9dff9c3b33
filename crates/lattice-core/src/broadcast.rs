use crate::error::CoreError;
use crate::membership;
use crate::relay::Relay;
use futures_util::future::join_all;
use lattice_models::channel::Endpoint;
use lattice_models::event::InboundMessage;
use lattice_models::message::{AuthorIdentity, OutboundMessage, ReplyPreview};

/// Character budget for the "replying to" preview.
pub const REPLY_SNIPPET_CHARS: usize = 80;

/// Per-destination outcome summary of one fan-out.
#[derive(Debug, Default, Clone)]
pub struct FanoutReport {
    pub sent: usize,
    pub failed: usize,
    /// Endpoints removed by self-heal after a permanent delivery failure.
    pub removed_endpoints: Vec<i64>,
}

pub(crate) enum SendOutcome {
    Sent,
    Failed,
    /// The destination credential is permanently invalid.
    Dead(i64),
}

/// Relay one newly authored message to every sibling endpoint of the same
/// channel kind.
///
/// Returns `None` when the message is not relayable: authored by the relay
/// itself, posted in an unbound channel, or already one of our own copies.
pub async fn relay_inbound(
    relay: &Relay,
    msg: &InboundMessage,
) -> Result<Option<(i64, FanoutReport)>, CoreError> {
    if msg.author_id == relay.settings.relay_user_id {
        return Ok(None);
    }
    let Some(origin) = relay.registry.by_channel(msg.channel_id) else {
        return Ok(None);
    };
    if lattice_db::messages::find_logical_id(&relay.db, origin.id, msg.physical_id)
        .await?
        .is_some()
    {
        tracing::debug!(target: "relay", "dropping our own copy {}", msg.physical_id);
        return Ok(None);
    }

    let reply_to = match msg.reference_physical_id {
        Some(reference) => {
            lattice_db::messages::find_logical_id(&relay.db, origin.id, reference).await?
        }
        None => None,
    };

    let logical_id = lattice_util::snowflake::generate(1);
    lattice_db::messages::create_logical_message(
        &relay.db,
        logical_id,
        msg.author_id,
        &msg.author_name,
        &lattice_util::text::snippet(&msg.content, REPLY_SNIPPET_CHARS),
        msg.channel_id,
        msg.physical_id,
        reply_to,
    )
    .await?;

    // Remove the original so the conversation does not appear twice in its
    // source channel. Best effort; fan-out proceeds either way.
    if let Err(e) = relay
        .platform
        .delete_message(&origin.credential, msg.physical_id)
        .await
    {
        tracing::debug!(target: "relay", "origin removal failed for {}: {e}", msg.physical_id);
    }

    // Each destination points the reply affordance at its own copy of the
    // reply target; destinations without a copy send without it.
    let reply_context = match reply_to {
        Some(target) => {
            let meta = lattice_db::messages::get_logical_message(&relay.db, target).await?;
            let copies = lattice_db::messages::list_copies(&relay.db, target).await?;
            meta.map(|meta| (meta, copies))
        }
        None => None,
    };

    let author = AuthorIdentity {
        user_id: msg.author_id,
        display_name: msg.author_name.clone(),
        avatar_url: msg.avatar_url.clone(),
    };
    let destinations = relay.registry.list_kind(origin.kind, Some(origin.id));
    let report = fan_out_message(relay, logical_id, &destinations, |dest| {
        let mut outbound = OutboundMessage::new(author.clone(), msg.content.clone());
        outbound.attachments = msg.attachments.clone();
        if let Some((meta, copies)) = &reply_context {
            outbound.reply = copies
                .iter()
                .find(|copy| copy.endpoint_id == dest.id)
                .map(|copy| ReplyPreview {
                    author_name: meta.author_name.clone(),
                    snippet: meta.snippet.clone(),
                    target_physical_id: copy.physical_id,
                });
        }
        outbound
    })
    .await;

    tracing::info!(
        target: "relay",
        "relayed message {logical_id}: {} sent, {} failed",
        report.sent,
        report.failed,
    );
    Ok(Some((logical_id, report)))
}

/// Send one message to each destination concurrently, recording a copy per
/// success. Destinations fail independently; no failure blocks the rest.
pub(crate) async fn fan_out_message<F>(
    relay: &Relay,
    logical_id: i64,
    destinations: &[Endpoint],
    build: F,
) -> FanoutReport
where
    F: Fn(&Endpoint) -> OutboundMessage,
{
    let sends = destinations.iter().map(|dest| {
        let outbound = build(dest);
        async move {
            match relay.platform.send_message(&dest.credential, &outbound).await {
                Ok(physical_id) => {
                    match lattice_db::messages::record_copy(
                        &relay.db,
                        logical_id,
                        dest.id,
                        physical_id,
                        dest.guild_id,
                    )
                    .await
                    {
                        Ok(()) => SendOutcome::Sent,
                        Err(e) => {
                            tracing::error!(
                                target: "relay",
                                "copy bookkeeping failed for endpoint {}: {e}",
                                dest.id,
                            );
                            SendOutcome::Failed
                        }
                    }
                }
                Err(e) if e.is_permanent() => {
                    tracing::warn!(target: "relay", "endpoint {} is gone upstream: {e}", dest.id);
                    SendOutcome::Dead(dest.id)
                }
                Err(e) => {
                    tracing::warn!(target: "relay", "send to endpoint {} failed: {e}", dest.id);
                    SendOutcome::Failed
                }
            }
        }
    });
    let outcomes = join_all(sends).await;
    collect_outcomes(relay, outcomes).await
}

/// Tally outcomes and run self-heal for permanently dead destinations.
pub(crate) async fn collect_outcomes(relay: &Relay, outcomes: Vec<SendOutcome>) -> FanoutReport {
    let mut report = FanoutReport::default();
    for outcome in outcomes {
        match outcome {
            SendOutcome::Sent => report.sent += 1,
            SendOutcome::Failed => report.failed += 1,
            SendOutcome::Dead(endpoint_id) => {
                report.failed += 1;
                report.removed_endpoints.push(endpoint_id);
            }
        }
    }
    for &endpoint_id in &report.removed_endpoints {
        if let Err(e) = membership::self_heal(relay, endpoint_id).await {
            tracing::error!(target: "membership", "self-heal for endpoint {endpoint_id} failed: {e}");
        }
    }
    report
}
