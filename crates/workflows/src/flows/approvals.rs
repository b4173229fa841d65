//! Button presses: usage and registration decisions, plus routing of the
//! browse and recharge buttons to their workflows.

use chrono::{DateTime, Utc};
use engine::{AccountStatus, EngineError};
use uuid::Uuid;

use crate::{
    Dispatcher, FlowError, OutboundMessage,
    dispatcher::Ack,
    event::ActorEvent,
    parsing::Action,
    registry::ActorSlots,
    ui,
};

impl Dispatcher {
    pub(crate) async fn handle_action(
        &self,
        slots: &mut ActorSlots,
        event: &ActorEvent,
        action: Action,
        now: DateTime<Utc>,
    ) -> Result<Ack, FlowError> {
        let actor_id = event.actor_id;
        tracing::debug!(actor_id, action = ?action, "button pressed");
        match action {
            Action::ApproveUsage(entry_id) => self.approve_usage(actor_id, entry_id, now).await,
            Action::RejectUsage(entry_id) => self.reject_usage(actor_id, entry_id, now).await,
            Action::ApproveRegistration(account_id) => {
                self.decide_registration(actor_id, account_id, AccountStatus::Active, now)
                    .await
            }
            Action::RejectRegistration(account_id) => {
                self.decide_registration(actor_id, account_id, AccountStatus::Blocked, now)
                    .await
            }
            Action::ConfirmRecharge(initiator) => {
                self.confirm_recharge(slots, actor_id, initiator, now).await
            }
            Action::CancelRecharge(initiator) => {
                self.cancel_recharge(slots, actor_id, initiator, now).await
            }
            Action::LowBalancePage(page) => {
                self.admin(actor_id, now).await?;
                self.low_balance_page(slots, actor_id, Some(page), now)
                    .await
            }
            Action::LowBalanceShowList => {
                self.admin(actor_id, now).await?;
                self.low_balance_page(slots, actor_id, None, now).await
            }
            Action::LowBalanceCsv => {
                self.admin(actor_id, now).await?;
                self.low_balance_csv(slots, actor_id, now).await
            }
            Action::LowBalanceCancel => {
                self.admin(actor_id, now).await?;
                self.low_balance_cancel(slots, actor_id, now).await
            }
            Action::HistoryPage(kind, page) => {
                self.admin(actor_id, now).await?;
                self.history_page(slots, actor_id, kind, page, now).await
            }
            Action::HistoryExport(kind) => {
                self.admin(actor_id, now).await?;
                self.history_export(slots, actor_id, kind, now).await
            }
            Action::HistoryClose(kind) => {
                self.admin(actor_id, now).await?;
                self.history_close(slots, actor_id, kind, now).await
            }
        }
    }

    async fn approve_usage(
        &self,
        admin_id: i64,
        entry_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Ack, FlowError> {
        self.admin(admin_id, now).await?;
        let outcome = match self.engine.approve_usage(entry_id, admin_id).await {
            Ok(outcome) => outcome,
            Err(EngineError::AlreadyProcessed(_) | EngineError::KeyNotFound(_)) => {
                return Err(FlowError::State(ui::INVALID_ENTRY.to_string()));
            }
            Err(EngineError::InsufficientFunds { balance, requested }) => {
                return Err(FlowError::State(format!(
                    "⚠️ Saldo insufficiente: l'utente ha {balance}, richiesti {requested}. L'utilizzo resta in attesa."
                )));
            }
            Err(err) => return Err(err.into()),
        };
        let entry = &outcome.entry;

        self.notify(
            entry.account_id,
            OutboundMessage::text(format!(
                "✅ Il tuo utilizzo è stato approvato!\n\n⚡ Quantità: {}\n💰 Saldo precedente: {}\n💰 Nuovo saldo: {}",
                entry.amount, entry.previous_balance, entry.new_balance,
            )),
        )
        .await;
        if outcome.low_balance {
            self.notify(
                entry.account_id,
                OutboundMessage::text(format!(
                    "⚠️ AVVISO: Il tuo saldo è basso ({}).\nTi consigliamo di contattare un amministratore per una ricarica.",
                    outcome.account.balance
                )),
            )
            .await;
        }

        let mut text = format!(
            "✅ Utilizzo approvato\n\n👤 Utente: {}\n⚡ Quantità: {}\n💰 Nuovo saldo: {}",
            outcome.account.display_name(),
            entry.amount,
            entry.new_balance,
        );
        if outcome.rebased {
            text.push_str("\n\nℹ️ Il saldo era cambiato dalla richiesta: importi ricalcolati sul saldo attuale.");
        }
        self.reply(admin_id, text).await?;
        Ok(Some("Utilizzo approvato con successo".to_string()))
    }

    async fn reject_usage(
        &self,
        admin_id: i64,
        entry_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Ack, FlowError> {
        self.admin(admin_id, now).await?;
        let entry = match self.engine.reject_usage(entry_id, admin_id).await {
            Ok(entry) => entry,
            Err(EngineError::AlreadyProcessed(_) | EngineError::KeyNotFound(_)) => {
                return Err(FlowError::State(ui::INVALID_ENTRY.to_string()));
            }
            Err(err) => return Err(err.into()),
        };

        // The entry keeps the request-time balance; report the live one.
        let balance = match self.engine.find_account(entry.account_id).await {
            Ok(Some(account)) => account.balance,
            _ => entry.previous_balance,
        };
        self.notify(
            entry.account_id,
            OutboundMessage::text(format!(
                "❌ Il tuo utilizzo è stato rifiutato.\n\n⚡ Quantità: {}\n💰 Saldo attuale: {} (invariato)\n📝 Note: {}\n\nPer maggiori informazioni, contatta l'amministratore.",
                entry.amount,
                balance,
                entry.notes.as_deref().unwrap_or("Nessuna"),
            )),
        )
        .await;
        self.reply(
            admin_id,
            format!("❌ Utilizzo di {} rifiutato.", entry.amount),
        )
        .await?;
        Ok(Some("Utilizzo rifiutato".to_string()))
    }

    /// Approve (`Active`) or reject (`Blocked`) a pending registration.
    async fn decide_registration(
        &self,
        admin_id: i64,
        account_id: i64,
        status: AccountStatus,
        now: DateTime<Utc>,
    ) -> Result<Ack, FlowError> {
        self.admin(admin_id, now).await?;
        let account = match self.engine.find_account(account_id).await? {
            Some(account) if account.status == AccountStatus::Pending => account,
            Some(_) => {
                return Err(FlowError::State(
                    "Registrazione già elaborata.".to_string(),
                ));
            }
            None => return Err(FlowError::State("Utente non trovato.".to_string())),
        };
        let updated = self.engine.set_account_status(account.id, status).await?;

        let (holder_text, admin_text, ack) = if status == AccountStatus::Active {
            (
                "🎉 La tua registrazione è stata approvata!\n\nOra puoi utilizzare il bot per gestire il tuo saldo kWh e registrare i tuoi utilizzi.\n\nUsa /help per visualizzare i comandi disponibili.",
                format!("✅ Registrazione di {} approvata.", updated.display_name()),
                "Registrazione approvata con successo",
            )
        } else {
            (
                "❌ La tua richiesta di registrazione è stata rifiutata.\n\nPer maggiori informazioni, contatta l'amministratore.",
                format!("❌ Registrazione di {} rifiutata.", updated.display_name()),
                "Registrazione rifiutata",
            )
        };
        tracing::info!(admin_id, account_id, status = %status.as_str(), "registration decided");
        self.notify(updated.id, OutboundMessage::text(holder_text)).await;
        self.reply(admin_id, admin_text).await?;
        Ok(Some(ack.to_string()))
    }
}
