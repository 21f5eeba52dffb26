use std::sync::Arc;

use hdesk_core::{AppendOutcome, ChannelName, Envelope, PERSON_BLOCK, TemplateKind};
use hdesk_session::{BotSession, BotState, Room, SessionError};
use tracing::{debug, instrument, warn};

/// One thing the bot does in reaction to an inbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BotAction {
    /// Hand the room over to humans.
    StopFaqs,
    SendBlock(String),
    SendTemplate(TemplateKind),
}

/// Result of one handling pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassReport {
    pub outcome: AppendOutcome,
    pub actions: Vec<BotAction>,
}

/// Decides how the bot reacts to `inbound`, which has already been recorded in `room`.
///
/// While serving FAQs, every requested block id of a fresh, non-bot message becomes an
/// action; `person` ends the list since nothing is answered after a handoff. Once handed
/// off, the email template is asked for while exactly one client and one bot message follow
/// the handoff. That rule only reads history, so it stays one-shot even for re-deliveries.
pub fn decide(
    room: &Room,
    bot: &ChannelName,
    inbound: &Envelope,
    outcome: AppendOutcome,
) -> Vec<BotAction> {
    match room.state() {
        BotState::ServingFaqs => {
            if outcome.is_duplicate() || inbound.sender == *bot {
                return Vec::new();
            }
            let mut actions = Vec::with_capacity(inbound.go_to_blocks.len());
            for block_id in &inbound.go_to_blocks {
                if block_id == PERSON_BLOCK {
                    actions.push(BotAction::StopFaqs);
                    break;
                }
                actions.push(BotAction::SendBlock(block_id.clone()));
            }
            actions
        }
        BotState::HandedOff(_) => match room.handoff_counts(bot) {
            Some(counts) if counts.wants_email_capture() => {
                vec![BotAction::SendTemplate(TemplateKind::Email)]
            }
            _ => Vec::new(),
        },
    }
}

/// Records `envelope` and runs the resulting actions.
///
/// Every action runs even if an earlier one failed; the first error is returned and the rest
/// are logged.
#[instrument(name = "bot.handle_message", skip(session, envelope), fields(room = %session.room_id(), sender = %envelope.sender))]
pub async fn handle_message(
    session: &Arc<BotSession>,
    envelope: Envelope,
) -> Result<PassReport, SessionError> {
    let outcome = session.record(envelope.clone()).await?;
    if outcome.is_duplicate() {
        metrics::counter!("hdesk.bot.duplicates").increment(1);
        debug!(timetoken = ?envelope.timetoken, "re-delivered message");
    }

    let actions = session
        .inspect(|room| decide(room, session.bot(), &envelope, outcome))
        .await;

    let mut first_error = None;
    for action in &actions {
        let result = match action {
            BotAction::StopFaqs => session.stop_faqs().await.map(drop),
            BotAction::SendBlock(block_id) => session.send_block(block_id).await.map(drop),
            BotAction::SendTemplate(kind) => session.send_template(*kind).await.map(drop),
        };
        if let Err(err) = result {
            match first_error {
                None => first_error = Some(err),
                Some(_) => warn!(?action, error = %err, "bot action failed"),
            }
        }
    }

    match first_error {
        Some(err) => Err(err),
        None => Ok(PassReport { outcome, actions }),
    }
}
