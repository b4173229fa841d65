use chrono::{DateTime, Utc};
use engine::{EntryKind, EntryStatus};

use crate::{
    Dispatcher, FlowError, OutboundMessage,
    event::ActorEvent,
    parsing::{AdminCommand, Command},
    registry::ActorSlots,
    ui,
};

const RECENT_ENTRIES: u64 = 10;

impl Dispatcher {
    pub(crate) async fn handle_command(
        &self,
        slots: &mut ActorSlots,
        event: &ActorEvent,
        command: Command,
        now: DateTime<Utc>,
    ) -> Result<(), FlowError> {
        let actor_id = event.actor_id;
        tracing::debug!(actor_id, command = ?command, "command received");
        match command {
            Command::Start => self.start_registration(slots, actor_id, now).await,
            Command::Help => self.show_help(actor_id, now).await,
            Command::Balance => self.show_balance(actor_id, now).await,
            Command::Transactions => self.show_recent_entries(actor_id, now).await,
            Command::Profile => self.show_profile(actor_id, now).await,
            Command::RegisterUsage => self.start_usage(slots, actor_id, now).await,
            Command::Cancel => self.cancel_all(slots, actor_id).await,
            Command::Admin(command) => {
                let admin = self.admin(actor_id, now).await?;
                self.handle_admin_command(slots, &admin, command, now).await
            }
        }
    }

    async fn cancel_all(&self, slots: &mut ActorSlots, actor_id: i64) -> Result<(), FlowError> {
        let removed = slots.cancel_all();
        self.pending_deletions.lock().await.remove(&actor_id);
        tracing::info!(actor_id, removed, "workflows cancelled");
        let text = if removed > 0 {
            "🚫 Operazione corrente annullata."
        } else {
            "ℹ️ Non ci sono operazioni in corso da annullare."
        };
        self.send(actor_id, OutboundMessage::text(text).removing_keyboard())
            .await
    }

    async fn show_help(&self, actor_id: i64, now: DateTime<Utc>) -> Result<(), FlowError> {
        let account = self.registered(actor_id, now).await?;
        let mut text = String::from("📚 Comandi disponibili\n\n");
        text.push_str("👤 Comandi utente\n");
        text.push_str("/start - Avvia il bot / Registrazione\n");
        text.push_str("/help - Mostra questo messaggio di aiuto\n");
        text.push_str("/saldo - Visualizza il tuo saldo kWh attuale\n");
        text.push_str("/cronologia - Visualizza la cronologia delle tue transazioni\n");
        text.push_str("/registra_utilizzo - Registra un nuovo utilizzo di kWh\n");
        text.push_str("/profilo - Visualizza il tuo profilo\n");
        text.push_str("/annulla - Annulla l'operazione corrente\n");
        if account.is_admin {
            text.push_str("\n👑 Comandi amministratore\n");
            text.push_str("/admin_ricarica - Ricarica il saldo di un utente\n");
            text.push_str("/admin_crea_invito - Crea un nuovo codice di invito\n");
            text.push_str("/admin_inviti - Visualizza i codici di invito\n");
            text.push_str("/admin_saldi_bassi - Trova utenti con saldo basso\n");
            text.push_str("/admin_ricariche - Visualizza le ultime ricariche\n");
            text.push_str("/admin_utilizzi - Visualizza gli ultimi utilizzi kWh\n");
            text.push_str("/admin_stats - Visualizza le statistiche del bot\n");
            text.push_str("/admin_trova_tessera - Cerca utente per numero tessera\n");
            text.push_str("/admin_trova_utente - Cerca utente per nome/username\n");
            text.push_str("/admin_dettaglio - Dettaglio di un utente\n");
            text.push_str("/admin_approva, /admin_blocca, /admin_sblocca, /admin_disabilita - Stato utente\n");
            text.push_str("/admin_elimina - Elimina un utente\n");
            text.push_str("/admin_make_admin - Promuovi un utente ad amministratore\n");
        }
        self.reply(actor_id, text).await
    }

    async fn show_balance(&self, actor_id: i64, now: DateTime<Utc>) -> Result<(), FlowError> {
        let account = self.registered(actor_id, now).await?;
        let threshold = self.engine.policy().low_balance_threshold;
        let mut text = format!(
            "💰 Il tuo saldo attuale è di {}\n\n👤 Dati utente:\n🆔 ID Tessera: {}\n📝 Stato: {} {}\n",
            account.balance,
            ui::card_or_missing(account.card_id.as_deref()),
            ui::status_icon(account.status),
            ui::status_label(account.status),
        );
        if self.engine.policy().is_low(account.balance) {
            text.push_str(&format!(
                "\n⚠️ AVVISO: Il tuo saldo è basso (inferiore a {threshold}).\nTi consigliamo di contattare un amministratore per una ricarica."
            ));
            self.notify_admins(OutboundMessage::text(format!(
                "⚠️ AVVISO SALDO BASSO: L'utente {} (ID: {}) ha un saldo di {} (inferiore a {threshold}).",
                account.display_name(),
                account.id,
                account.balance,
            )))
            .await;
        }
        self.reply(actor_id, text).await
    }

    async fn show_recent_entries(
        &self,
        actor_id: i64,
        now: DateTime<Utc>,
    ) -> Result<(), FlowError> {
        self.registered(actor_id, now).await?;
        let entries = self
            .engine
            .entries_for_account(actor_id, RECENT_ENTRIES)
            .await?;
        if entries.is_empty() {
            return self
                .reply(actor_id, "Non hai ancora effettuato alcuna transazione.")
                .await;
        }

        let mut text = String::from("📜 Ultime transazioni\n\n");
        for entry in &entries {
            let status = match entry.status {
                EntryStatus::Approved => "✅",
                EntryStatus::Pending => "⏳",
                EntryStatus::Rejected => "❌",
            };
            let kind = match entry.kind {
                EntryKind::Charge => "🔋 Ricarica",
                EntryKind::Usage => "⚡ Utilizzo",
            };
            text.push_str(&format!(
                "{status} {kind}: {}\n📅 {}\n💰 Saldo dopo: {}\n",
                entry.amount,
                ui::format_datetime(entry.created_at),
                entry.new_balance,
            ));
            if let Some(notes) = &entry.notes {
                text.push_str(&format!("📝 Note: {notes}\n"));
            }
            text.push('\n');
        }
        self.reply(actor_id, text).await
    }

    async fn show_profile(&self, actor_id: i64, now: DateTime<Utc>) -> Result<(), FlowError> {
        let account = self.registered(actor_id, now).await?;
        let totals = self.engine.account_totals(actor_id).await?;
        let text = format!(
            "👤 Il tuo profilo\n\n👤 Nome: {}\n💳 Tessera ID: {}\n💰 Saldo attuale: {}\n📊 Stato: {} {}\n📅 Registrato il: {}\n\n📊 Statistiche\n🔋 Ricariche totali: {}\n⚡ Utilizzi totali: {}\n🔋 kWh totali caricati: {}\n⚡ kWh totali utilizzati: {}",
            account.display_name(),
            ui::card_or_missing(account.card_id.as_deref()),
            account.balance,
            ui::status_icon(account.status),
            ui::status_label(account.status),
            ui::format_date(account.created_at),
            totals.charges,
            totals.usages,
            totals.charged.decimal(),
            totals.used.decimal(),
        );
        self.reply(actor_id, text).await
    }

    async fn handle_admin_command(
        &self,
        slots: &mut ActorSlots,
        admin: &engine::Account,
        command: AdminCommand,
        now: DateTime<Utc>,
    ) -> Result<(), FlowError> {
        match command {
            AdminCommand::Recharge(arg) => self.start_recharge(slots, admin, arg, now).await,
            AdminCommand::CreateInvite => self.start_invite(slots, admin.id, now).await,
            AdminCommand::Invites => self.list_invites(admin.id, now).await,
            AdminCommand::LowBalances => self.start_low_balance(slots, admin.id, now).await,
            AdminCommand::RechargeHistory => {
                self.start_history(slots, admin.id, EntryKind::Charge, now)
                    .await
            }
            AdminCommand::UsageHistory => {
                self.start_history(slots, admin.id, EntryKind::Usage, now)
                    .await
            }
            AdminCommand::Stats => self.show_stats(admin.id).await,
            AdminCommand::Approve(arg) => {
                self.change_status(admin.id, arg, engine::AccountStatus::Active)
                    .await
            }
            AdminCommand::Block(arg) => {
                self.change_status(admin.id, arg, engine::AccountStatus::Blocked)
                    .await
            }
            AdminCommand::Unblock(arg) => {
                self.change_status(admin.id, arg, engine::AccountStatus::Active)
                    .await
            }
            AdminCommand::Disable(arg) => {
                self.change_status(admin.id, arg, engine::AccountStatus::Disabled)
                    .await
            }
            AdminCommand::Delete(arg) => self.request_deletion(admin.id, arg).await,
            AdminCommand::ConfirmDeletion(arg) => self.confirm_deletion(admin.id, arg).await,
            AdminCommand::MakeAdmin(arg) => self.make_admin(admin.id, arg).await,
            AdminCommand::FindByCard(arg) => self.find_by_card(admin.id, arg).await,
            AdminCommand::FindByName(arg) => self.find_by_name(admin.id, arg).await,
            AdminCommand::Details(arg) => self.show_details(admin.id, arg).await,
        }
    }
}
