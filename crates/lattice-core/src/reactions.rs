use crate::broadcast::{self, SendOutcome};
use crate::error::CoreError;
use crate::mutation::resolve_logical;
use crate::relay::Relay;
use futures_util::future::join_all;
use lattice_db::reaction_votes::SymbolCount;
use lattice_models::banshare::ControlAction;
use lattice_models::event::ControlClick;
use lattice_models::message::{
    Control, ControlRow, MessageEdit, MAX_CONTROLS_PER_ROW, MAX_CONTROL_ROWS,
};

/// Render the aggregated vote counts as control rows. Symbols beyond the
/// platform's row capacity are dropped.
pub fn render_control_rows(counts: &[SymbolCount]) -> Vec<ControlRow> {
    let capacity = MAX_CONTROLS_PER_ROW * MAX_CONTROL_ROWS;
    if counts.len() > capacity {
        tracing::warn!(
            target: "relay",
            "dropping {} reaction symbols beyond the control capacity",
            counts.len() - capacity,
        );
    }
    counts
        .iter()
        .take(capacity)
        .map(|c| Control {
            id: ControlAction::React {
                symbol: c.symbol.clone(),
            }
            .id(),
            label: format!("{} {}", c.symbol, c.count),
        })
        .collect::<Vec<_>>()
        .chunks(MAX_CONTROLS_PER_ROW)
        .map(|chunk| ControlRow {
            controls: chunk.to_vec(),
        })
        .collect()
}

/// A native reaction landed on one of our copies. Toggle the vote, clear
/// the native signal, and re-render every copy's control rows.
///
/// Returns whether the vote is now present, `None` for untracked messages.
pub async fn toggle_from_event(
    relay: &Relay,
    channel_id: i64,
    physical_id: i64,
    user_id: i64,
    symbol: &str,
) -> Result<Option<bool>, CoreError> {
    let Some(endpoint) = relay.registry.by_channel(channel_id) else {
        return Ok(None);
    };
    let Some(logical_id) = resolve_logical(relay, &endpoint, physical_id).await? else {
        return Ok(None);
    };

    // Canonical state is the vote set plus rendered rows; the native
    // reaction is cleared even when it toggled a vote off.
    if let Err(e) = relay
        .platform
        .remove_reaction(&endpoint.credential, physical_id, user_id, symbol)
        .await
    {
        tracing::debug!(target: "relay", "native reaction clear failed: {e}");
    }

    let added = lattice_db::reaction_votes::toggle_vote(&relay.db, logical_id, user_id, symbol)
        .await?;
    rerender_copies(relay, logical_id).await?;
    Ok(Some(added))
}

/// A click on a rendered reaction control. Same toggle, no native signal
/// to clear.
pub async fn toggle_from_control(
    relay: &Relay,
    click: &ControlClick,
    symbol: &str,
) -> Result<Option<bool>, CoreError> {
    let Some(endpoint) = relay.registry.by_channel(click.channel_id) else {
        return Ok(None);
    };
    let Some(logical_id) = resolve_logical(relay, &endpoint, click.physical_id).await? else {
        return Ok(None);
    };
    let added =
        lattice_db::reaction_votes::toggle_vote(&relay.db, logical_id, click.user_id, symbol)
            .await?;
    rerender_copies(relay, logical_id).await?;
    Ok(Some(added))
}

async fn rerender_copies(relay: &Relay, logical_id: i64) -> Result<(), CoreError> {
    let counts = lattice_db::reaction_votes::count_votes(&relay.db, logical_id).await?;
    let rows = render_control_rows(&counts);
    let copies = lattice_db::messages::list_copies(&relay.db, logical_id).await?;
    let edits = copies
        .iter()
        .filter_map(|copy| relay.registry.get(copy.endpoint_id).map(|e| (e, copy)))
        .map(|(endpoint, copy)| {
            let edit = MessageEdit::controls(rows.clone());
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
                            "control re-render failed for copy {} at endpoint {}: {e}",
                            copy.physical_id,
                            endpoint.id,
                        );
                        SendOutcome::Failed
                    }
                }
            }
        });
    let outcomes = join_all(edits).await;
    broadcast::collect_outcomes(relay, outcomes).await;
    Ok(())
}
