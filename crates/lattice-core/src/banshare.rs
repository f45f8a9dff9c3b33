use crate::broadcast::{self, FanoutReport, SendOutcome};
use crate::error::CoreError;
use crate::reactions;
use crate::relay::Relay;
use futures_util::future::join_all;
use lattice_db::banshares::BanshareCaseRow;
use lattice_models::banshare::{BanshareStatus, ControlAction, GuildDecision};
use lattice_models::channel::{AutoBanLevel, ChannelKind, Endpoint};
use lattice_models::event::ControlClick;
use lattice_models::message::{Control, ControlRow, MessageEdit};
use tokio::sync::mpsc;
use tokio::time::timeout;

/// Route one control click to its workflow.
pub async fn handle_control(relay: &Relay, click: &ControlClick) -> Result<(), CoreError> {
    let Some(action) = ControlAction::parse(&click.control_id) else {
        tracing::debug!(target: "banshare", "unknown control '{}'", click.control_id);
        return Ok(());
    };
    match action {
        ControlAction::StartDialog => start_dialog(relay, click).await.map(drop),
        ControlAction::Banshare { case_id } => {
            authorize_reviewer(relay, click.user_id).await?;
            dispatch_case(relay, case_id, false).await.map(drop)
        }
        ControlAction::ImportantBanshare { case_id } => {
            authorize_reviewer(relay, click.user_id).await?;
            handle_approval(relay, case_id, click.user_id).await
        }
        ControlAction::RejectBanshare { case_id } => {
            authorize_reviewer(relay, click.user_id).await?;
            reject_case(relay, case_id).await
        }
        ControlAction::GuildEnforce { case_id } => guild_decide(relay, click, case_id, true).await,
        ControlAction::GuildReject { case_id } => guild_decide(relay, click, case_id, false).await,
        ControlAction::JoinAccept { request_id } => {
            authorize_reviewer(relay, click.user_id).await?;
            crate::membership::accept_join(relay, request_id).await.map(drop)
        }
        ControlAction::JoinReject { request_id } => {
            authorize_reviewer(relay, click.user_id).await?;
            crate::membership::reject_join(relay, request_id).await.map(drop)
        }
        ControlAction::React { symbol } => {
            reactions::toggle_from_control(relay, click, &symbol).await.map(drop)
        }
    }
}

/// Central-review actions require moderation rights in the review guild.
async fn authorize_reviewer(relay: &Relay, user_id: i64) -> Result<(), CoreError> {
    let review = relay.review_endpoint()?;
    if relay
        .platform
        .has_moderation_rights(review.guild_id, user_id)
        .await?
    {
        Ok(())
    } else {
        Err(CoreError::AuthorizationDenied)
    }
}

fn review_controls(case_id: i64, approvals: i64, quorum: u32) -> Vec<ControlRow> {
    vec![ControlRow {
        controls: vec![
            Control {
                id: ControlAction::Banshare { case_id }.id(),
                label: "Banshare".to_string(),
            },
            Control {
                id: ControlAction::ImportantBanshare { case_id }.id(),
                label: format!("Important banshare ({approvals}/{quorum})"),
            },
            Control {
                id: ControlAction::RejectBanshare { case_id }.id(),
                label: "Reject".to_string(),
            },
        ],
    }]
}

fn case_summary(case: &BanshareCaseRow) -> String {
    let mut text = format!(
        "Ban recommendation for user {}\nReason: {}",
        case.target_id, case.reason
    );
    for url in &case.proof {
        text.push_str("\nProof: ");
        text.push_str(url);
    }
    text
}

/// Create a case and post it for central review.
pub async fn submit_case(
    relay: &Relay,
    submitter_id: i64,
    target_id: i64,
    reason: &str,
    proof: &[String],
) -> Result<i64, CoreError> {
    let review = relay.review_endpoint()?;
    let case_id = lattice_util::snowflake::generate(1);
    let case = lattice_db::banshares::create_case(&relay.db, case_id, target_id, reason, proof)
        .await?;

    let mut message = relay.system_message(format!(
        "{}\nNominated by user {submitter_id}.",
        case_summary(&case)
    ));
    message.controls = review_controls(case_id, 0, relay.settings.important_approval_quorum);
    let physical_id = relay
        .platform
        .send_message(&review.credential, &message)
        .await?;
    lattice_db::banshares::set_review_message(&relay.db, case_id, physical_id).await?;
    tracing::info!(target: "banshare", "case {case_id} opened against user {target_id}");
    Ok(case_id)
}

async fn update_review_message(relay: &Relay, case_id: i64, edit: MessageEdit) {
    let review = match relay.review_endpoint() {
        Ok(review) => review,
        Err(e) => {
            tracing::error!(target: "banshare", "cannot update review message: {e}");
            return;
        }
    };
    let case = match lattice_db::banshares::get_case(&relay.db, case_id).await {
        Ok(Some(case)) => case,
        _ => return,
    };
    let Some(physical_id) = case.review_physical_id else {
        return;
    };
    if let Err(e) = relay
        .platform
        .edit_message(&review.credential, physical_id, &edit)
        .await
    {
        tracing::warn!(target: "banshare", "review message update failed for case {case_id}: {e}");
    }
}

/// Toggle one reviewer's approval; dispatch as important once the count of
/// distinct approvers reaches the configured quorum.
pub async fn handle_approval(
    relay: &Relay,
    case_id: i64,
    approver_id: i64,
) -> Result<(), CoreError> {
    let case = lattice_db::banshares::get_case(&relay.db, case_id)
        .await?
        .ok_or(CoreError::NotFound)?;
    if case.status != BanshareStatus::Pending {
        tracing::debug!(target: "banshare", "approval on decided case {case_id} ignored");
        return Ok(());
    }

    let added = lattice_db::banshares::toggle_approval(&relay.db, case_id, approver_id).await?;
    let approvals = lattice_db::banshares::count_approvals(&relay.db, case_id).await?;
    tracing::info!(
        target: "banshare",
        "case {case_id}: approval {} by user {approver_id}, now {approvals}",
        if added { "added" } else { "retracted" },
    );

    let quorum = relay.settings.important_approval_quorum;
    if approvals >= i64::from(quorum) {
        dispatch_case(relay, case_id, true).await?;
    } else {
        update_review_message(
            relay,
            case_id,
            MessageEdit::controls(review_controls(case_id, approvals, quorum)),
        )
        .await;
    }
    Ok(())
}

/// Freeze a pending case and fan it out to the network. Returns `false`
/// when the case was already decided; repeated clicks change nothing.
pub async fn dispatch_case(
    relay: &Relay,
    case_id: i64,
    important: bool,
) -> Result<bool, CoreError> {
    if !lattice_db::banshares::mark_enforced(&relay.db, case_id, important).await? {
        tracing::debug!(target: "banshare", "case {case_id} already decided, dispatch skipped");
        return Ok(false);
    }
    let case = lattice_db::banshares::get_case(&relay.db, case_id)
        .await?
        .ok_or(CoreError::NotFound)?;

    let report = fan_out_case(relay, &case).await;
    tracing::info!(
        target: "banshare",
        "case {case_id} dispatched (important: {important}): {} sent, {} failed",
        report.sent,
        report.failed,
    );

    update_review_message(
        relay,
        case_id,
        MessageEdit {
            content: Some(format!(
                "{}\nStatus: dispatched to the network{}.",
                case_summary(&case),
                if important { " as important" } else { "" }
            )),
            controls: Some(Vec::new()),
        },
    )
    .await;
    Ok(true)
}

/// Reject a pending case at central review. Terminal.
pub async fn reject_case(relay: &Relay, case_id: i64) -> Result<(), CoreError> {
    if !lattice_db::banshares::mark_rejected(&relay.db, case_id).await? {
        tracing::debug!(target: "banshare", "case {case_id} already decided, reject skipped");
        return Ok(());
    }
    tracing::info!(target: "banshare", "case {case_id} rejected at review");
    update_review_message(
        relay,
        case_id,
        MessageEdit {
            content: Some(format!("Banshare case {case_id} rejected.")),
            controls: Some(Vec::new()),
        },
    )
    .await;
    Ok(())
}

/// Deliver a dispatched case to every Banshare endpoint. Auto-ban policy
/// is decided per endpoint; failures stay local to their endpoint.
async fn fan_out_case(relay: &Relay, case: &BanshareCaseRow) -> FanoutReport {
    let destinations = relay.registry.list_kind(ChannelKind::Banshare, None);
    let sends = destinations.iter().map(|endpoint| async move {
        deliver_case(relay, endpoint, case).await
    });
    let outcomes = join_all(sends).await;
    broadcast::collect_outcomes(relay, outcomes).await
}

async fn deliver_case(relay: &Relay, endpoint: &Endpoint, case: &BanshareCaseRow) -> SendOutcome {
    let auto = match endpoint.auto_ban_level {
        AutoBanLevel::All => true,
        AutoBanLevel::Important => case.important,
        AutoBanLevel::None => false,
    };

    let mut enforced = false;
    if auto {
        match relay.platform.ban_user(endpoint.guild_id, case.target_id).await {
            Ok(()) => enforced = true,
            Err(e) => {
                tracing::warn!(
                    target: "banshare",
                    "auto-ban for case {} failed in guild {}: {e}",
                    case.id,
                    endpoint.guild_id,
                );
            }
        }
    }

    let decision = if enforced {
        GuildDecision::Enforced
    } else {
        GuildDecision::Pending
    };
    if let Err(e) = lattice_db::banshares::set_guild_decision(
        &relay.db,
        case.id,
        endpoint.guild_id,
        decision,
        None,
    )
    .await
    {
        tracing::error!(target: "banshare", "decision bookkeeping failed for case {}: {e}", case.id);
        return SendOutcome::Failed;
    }

    let mut message = relay.system_message(if enforced {
        format!("{}\nStatus: enforced automatically.", case_summary(case))
    } else {
        case_summary(case)
    });
    if !enforced {
        message.controls = vec![ControlRow {
            controls: vec![
                Control {
                    id: ControlAction::GuildEnforce { case_id: case.id }.id(),
                    label: "Ban".to_string(),
                },
                Control {
                    id: ControlAction::GuildReject { case_id: case.id }.id(),
                    label: "Decline".to_string(),
                },
            ],
        }];
    }

    match relay.platform.send_message(&endpoint.credential, &message).await {
        Ok(_) => SendOutcome::Sent,
        Err(e) if e.is_permanent() => SendOutcome::Dead(endpoint.id),
        Err(e) => {
            tracing::warn!(
                target: "banshare",
                "case {} delivery to endpoint {} failed: {e}",
                case.id,
                endpoint.id,
            );
            SendOutcome::Failed
        }
    }
}

/// A member guild's moderator decides a delivered case by clicking the
/// control on their local announcement.
async fn guild_decide(
    relay: &Relay,
    click: &ControlClick,
    case_id: i64,
    enforce: bool,
) -> Result<(), CoreError> {
    let endpoint = relay
        .registry
        .by_channel(click.channel_id)
        .ok_or(CoreError::NotFound)?;
    if !relay
        .platform
        .has_moderation_rights(endpoint.guild_id, click.user_id)
        .await?
    {
        return Err(CoreError::AuthorizationDenied);
    }
    let case = lattice_db::banshares::get_case(&relay.db, case_id)
        .await?
        .ok_or(CoreError::NotFound)?;
    if case.status == BanshareStatus::Overturned {
        relay
            .notify(&endpoint.credential, "This banshare has been overturned.")
            .await;
        return Ok(());
    }

    let (decision, status_line) = if enforce {
        relay.platform.ban_user(endpoint.guild_id, case.target_id).await?;
        (GuildDecision::Enforced, "Status: enforced.")
    } else {
        (GuildDecision::Rejected, "Status: declined.")
    };
    lattice_db::banshares::set_guild_decision(
        &relay.db,
        case_id,
        endpoint.guild_id,
        decision,
        Some(click.user_id),
    )
    .await?;
    tracing::info!(
        target: "banshare",
        "case {case_id}: guild {} decided {decision:?} by user {}",
        endpoint.guild_id,
        click.user_id,
    );

    let edit = MessageEdit {
        content: Some(format!("{}\n{status_line}", case_summary(&case))),
        controls: Some(Vec::new()),
    };
    if let Err(e) = relay
        .platform
        .edit_message(&endpoint.credential, click.physical_id, &edit)
        .await
    {
        tracing::warn!(target: "banshare", "case message update failed: {e}");
    }
    Ok(())
}

/// External unban observed in a guild: force every case against that user
/// to Overturned, no conditions, no ban retry.
pub async fn handle_unban(relay: &Relay, guild_id: i64, user_id: i64) -> Result<u64, CoreError> {
    let touched = lattice_db::banshares::overturn_for_guild(&relay.db, guild_id, user_id).await?;
    if touched > 0 {
        tracing::info!(
            target: "banshare",
            "unban of user {user_id} in guild {guild_id} overturned {touched} records",
        );
    }
    Ok(touched)
}

/// Guided submission: target, reason, then proof, each reply bounded by
/// the configured step timeout. One dialog per user at a time.
pub async fn start_dialog(relay: &Relay, click: &ControlClick) -> Result<Option<i64>, CoreError> {
    let endpoint = relay
        .registry
        .by_channel(click.channel_id)
        .ok_or(CoreError::NotFound)?;
    let Some(mut rx) = relay.dialogs.begin(click.user_id) else {
        relay
            .notify(
                &endpoint.credential,
                "You already have a banshare submission in progress.",
            )
            .await;
        return Err(CoreError::DialogBusy);
    };

    let collected = collect_submission(relay, &endpoint, &mut rx).await;
    relay.dialogs.end(click.user_id);

    match collected? {
        Some((target_id, reason, proof)) => {
            let case_id = submit_case(relay, click.user_id, target_id, &reason, &proof).await?;
            relay
                .notify(
                    &endpoint.credential,
                    &format!("Banshare case {case_id} submitted for review."),
                )
                .await;
            Ok(Some(case_id))
        }
        None => Ok(None),
    }
}

/// One prompt/reply exchange. `None` when the user went silent.
async fn dialog_step(
    relay: &Relay,
    endpoint: &Endpoint,
    rx: &mut mpsc::Receiver<String>,
    prompt: &str,
) -> Option<String> {
    relay.notify(&endpoint.credential, prompt).await;
    match timeout(relay.settings.dialog_step_timeout, rx.recv()).await {
        Ok(Some(reply)) => Some(reply),
        _ => None,
    }
}

async fn collect_submission(
    relay: &Relay,
    endpoint: &Endpoint,
    rx: &mut mpsc::Receiver<String>,
) -> Result<Option<(i64, String, Vec<String>)>, CoreError> {
    let Some(target_reply) =
        dialog_step(relay, endpoint, rx, "Who should be banned? Reply with the user id.").await
    else {
        relay
            .notify(&endpoint.credential, "Banshare submission timed out.")
            .await;
        return Ok(None);
    };
    let Ok(target_id) = target_reply.trim().parse::<i64>() else {
        relay
            .notify(
                &endpoint.credential,
                "That is not a user id. Submission cancelled.",
            )
            .await;
        return Ok(None);
    };

    let Some(reason) = dialog_step(relay, endpoint, rx, "What is the reason?").await else {
        relay
            .notify(&endpoint.credential, "Banshare submission timed out.")
            .await;
        return Ok(None);
    };

    let Some(proof_reply) = dialog_step(
        relay,
        endpoint,
        rx,
        "Provide proof links separated by spaces, or reply 'none'.",
    )
    .await
    else {
        relay
            .notify(&endpoint.credential, "Banshare submission timed out.")
            .await;
        return Ok(None);
    };
    let proof: Vec<String> = if proof_reply.trim().eq_ignore_ascii_case("none") {
        Vec::new()
    } else {
        proof_reply.split_whitespace().map(str::to_string).collect()
    };

    Ok(Some((target_id, reason.trim().to_string(), proof)))
}
