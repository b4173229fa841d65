use chrono::{DateTime, Utc};
use engine::{AccountStatus, EngineError, Kwh, RequestUsage};

use crate::{
    Button, Dispatcher, FlowError, OutboundMessage,
    event::{ActorEvent, EventKind},
    registry::ActorSlots,
    ui,
    workflow::{UsageStep, Workflow, WorkflowKind},
};

impl Dispatcher {
    pub(crate) async fn start_usage(
        &self,
        slots: &mut ActorSlots,
        actor_id: i64,
        now: DateTime<Utc>,
    ) -> Result<(), FlowError> {
        let account = self.registered(actor_id, now).await?;
        if account.status != AccountStatus::Active {
            return Err(FlowError::AccountStatus(account.status));
        }
        slots.start(Workflow::UsageRegistration(UsageStep::WaitingForAmount), now);
        self.send(
            actor_id,
            OutboundMessage::text(
                "📉 Registrazione di un nuovo utilizzo\n\nPer favore, inserisci la quantità di kWh utilizzati:",
            )
            .with_reply(&[&[ui::CANCEL_LABEL]]),
        )
        .await
    }

    pub(crate) async fn usage_step(
        &self,
        slots: &mut ActorSlots,
        event: &ActorEvent,
        step: UsageStep,
        now: DateTime<Utc>,
    ) -> Result<(), FlowError> {
        let actor_id = event.actor_id;
        match (step, &event.kind) {
            (UsageStep::WaitingForAmount, EventKind::Text(input)) => {
                let amount = self.parse_amount(input, self.engine.policy().usage_ceiling)?;
                slots.advance(
                    Workflow::UsageRegistration(UsageStep::WaitingForPhoto { amount }),
                    now,
                );
                self.reply(
                    actor_id,
                    format!(
                        "✅ Quantità: {amount}\n\n📷 Per favore, carica una foto come documentazione dell'utilizzo:"
                    ),
                )
                .await
            }
            (UsageStep::WaitingForPhoto { amount }, EventKind::Photo { file_id }) => {
                slots.advance(
                    Workflow::UsageRegistration(UsageStep::WaitingForNotes {
                        amount,
                        photo_file_id: file_id.clone(),
                    }),
                    now,
                );
                self.send(
                    actor_id,
                    OutboundMessage::text(format!(
                        "✅ Foto ricevuta!\n\nSe lo desideri, puoi aggiungere una nota (opzionale). Altrimenti, invia \"{}\".",
                        ui::NO_NOTES_LABEL
                    ))
                    .with_reply(&[&[ui::NO_NOTES_LABEL], &[ui::CANCEL_LABEL]]),
                )
                .await
            }
            (
                UsageStep::WaitingForNotes {
                    amount,
                    photo_file_id,
                },
                EventKind::Text(input),
            ) => {
                let notes = (input.trim() != ui::NO_NOTES_LABEL).then(|| input.clone());
                self.submit_usage(slots, actor_id, amount, photo_file_id, notes)
                    .await
            }
            (UsageStep::WaitingForAmount, _) => Err(FlowError::Validation(ui::amount_prompt(
                self.engine.policy().usage_ceiling,
            ))),
            (UsageStep::WaitingForPhoto { .. }, _) => Err(FlowError::Validation(
                "📷 Per favore, carica una foto come documentazione dell'utilizzo:".to_string(),
            )),
            (UsageStep::WaitingForNotes { .. }, _) => Err(FlowError::Validation(format!(
                "Scrivi una nota oppure invia \"{}\".",
                ui::NO_NOTES_LABEL
            ))),
        }
    }

    /// Positive, at most two decimals and within `ceiling`.
    pub(crate) fn parse_amount(&self, input: &str, ceiling: Kwh) -> Result<Kwh, FlowError> {
        match input.parse::<Kwh>() {
            Ok(amount) if amount.is_positive() && amount <= ceiling => Ok(amount),
            _ => Err(FlowError::Validation(ui::amount_prompt(ceiling))),
        }
    }

    async fn submit_usage(
        &self,
        slots: &mut ActorSlots,
        actor_id: i64,
        amount: Kwh,
        photo_file_id: String,
        notes: Option<String>,
    ) -> Result<(), FlowError> {
        let request = RequestUsage {
            account_id: actor_id,
            amount,
            requested_by: actor_id,
            photo_file_id: Some(photo_file_id.clone()),
            notes,
        };
        let entry = match self.engine.request_usage(request).await {
            Ok(entry) => entry,
            Err(EngineError::InsufficientFunds { balance, .. }) => {
                slots.finish(WorkflowKind::UsageRegistration);
                return self
                    .send(
                        actor_id,
                        OutboundMessage::text(format!(
                            "⚠️ Saldo insufficiente. Il tuo saldo attuale è di {balance}."
                        ))
                        .removing_keyboard(),
                    )
                    .await;
            }
            Err(err @ EngineError::AccountNotActive(_)) => {
                slots.finish(WorkflowKind::UsageRegistration);
                return Err(err.into());
            }
            Err(err) => return Err(err.into()),
        };
        slots.finish(WorkflowKind::UsageRegistration);

        let account = self.engine.account(actor_id).await?;
        if let Some(admin_chat) = self.settings.admin_chat_id
            && let Err(err) = self
                .messenger
                .send_photo(admin_chat, &photo_file_id, Some("Foto documentativa dell'utilizzo"))
                .await
        {
            tracing::warn!(entry_id = %entry.id, error = %err, "usage photo not forwarded");
        }
        self.notify_admins(
            OutboundMessage::text(format!(
                "🔔 Nuova richiesta di registrazione utilizzo\n\n👤 Utente: {}\n💳 Tessera ID: {}\n⚡ Quantità: {}\n💰 Saldo attuale: {}\n💰 Saldo dopo approvazione: {}\n📝 Note: {}\n\nVuoi approvare questo utilizzo?",
                account.display_name(),
                ui::card_or_missing(entry.card_id.as_deref()),
                entry.amount,
                entry.previous_balance,
                entry.new_balance,
                entry.notes.as_deref().unwrap_or("Nessuna"),
            ))
            .with_inline(vec![vec![
                Button::new("✅ Approva", format!("approve_usage:{}", entry.id)),
                Button::new("❌ Rifiuta", format!("reject_usage:{}", entry.id)),
            ]]),
        )
        .await;

        self.send(
            actor_id,
            OutboundMessage::text(format!(
                "✅ Utilizzo registrato con successo!\n\n⚡ Quantità: {}\n💰 Saldo attuale: {}\n💰 Saldo dopo approvazione: {}\n\nLa tua richiesta è in attesa di approvazione da parte dell'amministratore.\nRiceverai una notifica quando la richiesta sarà elaborata.",
                entry.amount, entry.previous_balance, entry.new_balance,
            ))
            .removing_keyboard(),
        )
        .await
    }
}
