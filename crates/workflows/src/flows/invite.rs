use chrono::{DateTime, Utc};
use engine::{EngineError, generate_code};

use crate::{
    Dispatcher, FlowError, OutboundMessage,
    event::{ActorEvent, EventKind},
    registry::ActorSlots,
    ui,
    workflow::{InviteStep, Workflow, WorkflowKind},
};

/// Attempts at drawing a code nobody holds yet.
const CODE_ATTEMPTS: usize = 5;

impl Dispatcher {
    /// Draws a code now and asks for optional notes; the invite is stored
    /// when the notes arrive.
    pub(crate) async fn start_invite(
        &self,
        slots: &mut ActorSlots,
        admin_id: i64,
        now: DateTime<Utc>,
    ) -> Result<(), FlowError> {
        let code = generate_code();
        slots.start(
            Workflow::InviteCode(InviteStep::WaitingForNotes { code: code.clone() }),
            now,
        );
        self.send(
            admin_id,
            OutboundMessage::text(format!(
                "🔑 Codice di invito generato\n\nCodice: {code}\n\nSe lo desideri, aggiungi una nota per ricordare a chi hai dato questo codice (opzionale).\nAltrimenti, invia \"{}\".",
                ui::NO_NOTES_LABEL
            ))
            .with_reply(&[&[ui::NO_NOTES_LABEL], &[ui::CANCEL_LABEL]]),
        )
        .await
    }

    pub(crate) async fn invite_step(
        &self,
        slots: &mut ActorSlots,
        event: &ActorEvent,
        step: InviteStep,
        now: DateTime<Utc>,
    ) -> Result<(), FlowError> {
        let InviteStep::WaitingForNotes { code } = step;
        let EventKind::Text(input) = &event.kind else {
            return Err(FlowError::Validation(format!(
                "Scrivi una nota oppure invia \"{}\".",
                ui::NO_NOTES_LABEL
            )));
        };
        let notes = (input.trim() != ui::NO_NOTES_LABEL).then_some(input.as_str());

        let mut code = code;
        let mut attempt = 0;
        let invite = loop {
            attempt += 1;
            match self
                .engine
                .create_invite(&code, event.actor_id, notes, now)
                .await
            {
                Ok(invite) => break invite,
                Err(EngineError::ExistingKey(_)) if attempt < CODE_ATTEMPTS => {
                    tracing::debug!(code = %code, "invite code taken, drawing another");
                    code = generate_code();
                }
                Err(err) => return Err(err.into()),
            }
        };
        slots.finish(WorkflowKind::InviteCode);

        let mut text = format!(
            "✅ Codice di invito creato con successo!\n\n🔑 Codice: {}\n📅 Scadenza: {}\n",
            invite.code,
            ui::format_date(invite.expires_at),
        );
        if let Some(notes) = &invite.notes {
            text.push_str(&format!("📝 Note: {notes}\n"));
        }
        text.push_str("\nCondividi questo codice con l'utente che desideri invitare.");
        self.send(
            event.actor_id,
            OutboundMessage::text(text).removing_keyboard(),
        )
        .await
    }

    pub(crate) async fn list_invites(
        &self,
        admin_id: i64,
        now: DateTime<Utc>,
    ) -> Result<(), FlowError> {
        let invites = self.engine.invites().await?;
        if invites.is_empty() {
            return self.reply(admin_id, "Non ci sono codici di invito.").await;
        }

        let mut text = String::from("🔑 Lista dei codici di invito\n\n");
        for invite in &invites {
            let state = if invite.used_by.is_some() {
                "✅ Utilizzato"
            } else if invite.is_active {
                "⏳ Attivo"
            } else {
                "❌ Disattivato"
            };
            let validity = if invite.is_expired(now) {
                "⏰ Scaduto"
            } else {
                "⏱️ Valido"
            };
            text.push_str(&format!(
                "Codice: {}\nStato: {state}\nValidità: {validity}\nCreato il: {}\nScadenza: {}\n",
                invite.code,
                ui::format_date(invite.created_at),
                ui::format_date(invite.expires_at),
            ));
            if let Some(used_by) = invite.used_by {
                text.push_str(&format!("Utilizzato da: {used_by}\n"));
            }
            if let Some(notes) = &invite.notes {
                text.push_str(&format!("Note: {notes}\n"));
            }
            text.push('\n');
        }
        self.reply(admin_id, text).await
    }
}
