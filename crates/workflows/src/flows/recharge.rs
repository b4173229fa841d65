//! Two-step recharge: amount entry, then an explicit confirm or cancel.
//!
//! The account snapshot kept in the slot is shown to the admin but never
//! written back; the charge reads the live balance when it is applied.

use chrono::{DateTime, Utc};
use engine::{Account, AccountStatus, EngineError};

use crate::{
    Button, Dispatcher, FlowError, OutboundMessage,
    dispatcher::Ack,
    event::{ActorEvent, EventKind},
    registry::ActorSlots,
    ui,
    workflow::{RechargeStep, RechargeTarget, Workflow, WorkflowKind},
};

const RECHARGE_NOTES: &str = "Ricarica manuale da amministratore";
const NO_PENDING_RECHARGE: &str = "Nessuna ricarica in attesa di conferma.";

impl Dispatcher {
    pub(crate) async fn start_recharge(
        &self,
        slots: &mut ActorSlots,
        admin: &Account,
        arg: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<(), FlowError> {
        let Some(arg) = arg else {
            return self
                .reply(
                    admin.id,
                    "🔋 RICARICA SALDO UTENTE\n\nPer ricaricare il saldo di un utente, usa uno dei seguenti formati:\n\n• /admin_ricarica [ID_Telegram] - Cerca per ID Telegram\n• /admin_ricarica @[username] - Cerca per username Telegram\n• /admin_ricarica tessera:[numero] - Cerca per numero tessera\n\nEsempi:\n/admin_ricarica 12345678\n/admin_ricarica @username\n/admin_ricarica tessera:ABC123",
                )
                .await;
        };

        let account = self.resolve_account(&arg).await?;
        if account.status != AccountStatus::Active {
            return Err(FlowError::Validation(format!(
                "⚠️ Impossibile ricaricare questo utente perché è {}.",
                ui::status_label(account.status)
            )));
        }

        let target = RechargeTarget::from(&account);
        let text = format!(
            "✅ Utente selezionato: {}\n💳 Tessera ID: {}\n💰 Saldo attuale: {}\n\nPer favore, inserisci la quantità di kWh da ricaricare:",
            target.display_name,
            target.card_id.as_deref().unwrap_or("Non impostata"),
            target.balance,
        );
        slots.start(
            Workflow::Recharge(RechargeStep::WaitingForAmount { target }),
            now,
        );
        self.send(
            admin.id,
            OutboundMessage::text(text).with_reply(&[&[ui::CANCEL_LABEL]]),
        )
        .await
    }

    pub(crate) async fn recharge_step(
        &self,
        slots: &mut ActorSlots,
        event: &ActorEvent,
        step: RechargeStep,
        now: DateTime<Utc>,
    ) -> Result<(), FlowError> {
        let ceiling = self.engine.policy().recharge_ceiling;
        match (step, &event.kind) {
            (RechargeStep::WaitingForAmount { target }, EventKind::Text(input)) => {
                let amount = self.parse_amount(input, ceiling)?;
                let projected = target.balance + amount;
                let text = format!(
                    "🔍 Riepilogo ricarica\n\n👤 Utente: {}\n💳 Tessera ID: {}\n⚡ Quantità: {amount}\n💰 Saldo attuale: {}\n💰 Nuovo saldo: {projected}\n\nConfermi questa ricarica?",
                    target.display_name,
                    target.card_id.as_deref().unwrap_or("Non impostata"),
                    target.balance,
                );
                slots.advance(
                    Workflow::Recharge(RechargeStep::WaitingForConfirmation { target, amount }),
                    now,
                );
                let actor_id = event.actor_id;
                self.send(
                    actor_id,
                    OutboundMessage::text(text).with_inline(vec![vec![
                        Button::new("✅ Conferma", format!("confirm_recharge_{actor_id}")),
                        Button::new("❌ Annulla", format!("cancel_recharge_{actor_id}")),
                    ]]),
                )
                .await
            }
            (RechargeStep::WaitingForAmount { .. }, _) => {
                Err(FlowError::Validation(ui::amount_prompt(ceiling)))
            }
            (RechargeStep::WaitingForConfirmation { .. }, _) => Err(FlowError::Validation(
                "Usa i pulsanti ✅ Conferma o ❌ Annulla per completare la ricarica.".to_string(),
            )),
        }
    }

    /// `confirm_recharge_<initiator>`: applies the charge if the presser still
    /// has a recharge waiting for confirmation.
    pub(crate) async fn confirm_recharge(
        &self,
        slots: &mut ActorSlots,
        presser_id: i64,
        initiator_id: i64,
        now: DateTime<Utc>,
    ) -> Result<Ack, FlowError> {
        let (target, amount) = match slots.get(WorkflowKind::Recharge, now) {
            Some(Workflow::Recharge(RechargeStep::WaitingForConfirmation { target, amount }))
                if presser_id == initiator_id =>
            {
                (target.clone(), *amount)
            }
            _ => {
                tracing::info!(presser_id, initiator_id, "recharge confirmation expired");
                return Err(FlowError::State(NO_PENDING_RECHARGE.to_string()));
            }
        };
        self.admin(presser_id, now).await?;

        let entry = match self
            .engine
            .apply_charge(target.account_id, amount, presser_id, Some(RECHARGE_NOTES))
            .await
        {
            Ok(entry) => entry,
            Err(err @ (EngineError::AccountNotActive(_) | EngineError::KeyNotFound(_))) => {
                // The account changed under the dialog; nothing left to confirm.
                slots.finish(WorkflowKind::Recharge);
                return Err(err.into());
            }
            Err(err) => return Err(err.into()),
        };
        slots.finish(WorkflowKind::Recharge);

        if entry.previous_balance != target.balance {
            tracing::info!(
                account_id = target.account_id,
                snapshot = %target.balance,
                live = %entry.previous_balance,
                "recharge applied on a moved balance"
            );
        }

        self.notify(
            target.account_id,
            OutboundMessage::text(format!(
                "🎉 Ricarica effettuata!\n\n⚡ Quantità: {}\n💰 Saldo precedente: {}\n💰 Nuovo saldo: {}\n\nGrazie per aver utilizzato il nostro servizio!",
                entry.amount, entry.previous_balance, entry.new_balance,
            )),
        )
        .await;

        self.send(
            presser_id,
            OutboundMessage::text(format!(
                "✅ Ricarica completata con successo!\n\n👤 Utente: {}\n💳 Tessera ID: {}\n⚡ Quantità: {}\n💰 Saldo precedente: {}\n💰 Nuovo saldo: {}",
                target.display_name,
                target.card_id.as_deref().unwrap_or("Non impostata"),
                entry.amount,
                entry.previous_balance,
                entry.new_balance,
            ))
            .removing_keyboard(),
        )
        .await?;
        Ok(Some("Ricarica confermata!".to_string()))
    }

    pub(crate) async fn cancel_recharge(
        &self,
        slots: &mut ActorSlots,
        presser_id: i64,
        initiator_id: i64,
        now: DateTime<Utc>,
    ) -> Result<Ack, FlowError> {
        let pending = presser_id == initiator_id
            && matches!(
                slots.get(WorkflowKind::Recharge, now),
                Some(Workflow::Recharge(RechargeStep::WaitingForConfirmation { .. }))
            );
        if !pending {
            return Err(FlowError::State(NO_PENDING_RECHARGE.to_string()));
        }
        slots.finish(WorkflowKind::Recharge);
        tracing::info!(actor_id = presser_id, "recharge cancelled");
        self.send(
            presser_id,
            OutboundMessage::text("❌ Ricarica annullata.").removing_keyboard(),
        )
        .await?;
        Ok(Some("Ricarica annullata.".to_string()))
    }
}
