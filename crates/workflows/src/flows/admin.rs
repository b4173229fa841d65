//! One-shot admin commands: account status, deletion, lookups and stats.

use engine::{Account, AccountStatus};

use crate::{
    Dispatcher, FlowError, OutboundMessage,
    parsing::{AccountRef, parse_account_ref},
    ui,
};

const INVALID_REF: &str =
    "⚠️ Parametro non valido. Usa un ID Telegram numerico, un @username o tessera:NUMERO.";
const NOT_FOUND: &str = "⚠️ Utente non trovato. Verifica il parametro di ricerca e riprova.";
const DETAIL_ENTRIES: u64 = 5;

impl Dispatcher {
    /// Resolves an admin-supplied reference, or explains why it cannot.
    pub(crate) async fn resolve_account(&self, raw: &str) -> Result<Account, FlowError> {
        let reference =
            parse_account_ref(raw).ok_or_else(|| FlowError::Validation(INVALID_REF.to_string()))?;
        let account = match reference {
            AccountRef::Id(id) => self.engine.find_account(id).await?,
            AccountRef::Username(name) => self.engine.account_by_username(&name).await?,
            AccountRef::Card(card) => self.engine.account_by_card(&card).await?,
        };
        account.ok_or_else(|| FlowError::Validation(NOT_FOUND.to_string()))
    }

    async fn required_account(
        &self,
        arg: Option<String>,
        usage: &str,
    ) -> Result<Account, FlowError> {
        let raw = arg.ok_or_else(|| FlowError::Validation(format!("⚠️ Utilizzo: {usage}")))?;
        self.resolve_account(&raw).await
    }

    pub(crate) async fn change_status(
        &self,
        admin_id: i64,
        arg: Option<String>,
        status: AccountStatus,
    ) -> Result<(), FlowError> {
        let usage = match status {
            AccountStatus::Blocked => "/admin_blocca <id>",
            AccountStatus::Disabled => "/admin_disabilita <id>",
            _ => "/admin_approva <id>",
        };
        let account = self.required_account(arg, usage).await?;
        let updated = self.engine.set_account_status(account.id, status).await?;

        let holder_text = match status {
            AccountStatus::Active if account.status == AccountStatus::Pending => {
                "🎉 La tua registrazione è stata approvata!\n\nOra puoi utilizzare il bot per gestire il tuo saldo kWh e registrare i tuoi utilizzi.\n\nUsa /help per visualizzare i comandi disponibili."
            }
            AccountStatus::Active => "✅ Il tuo account è stato riattivato.",
            other => ui::status_reason(other),
        };
        self.notify(updated.id, OutboundMessage::text(holder_text)).await;

        self.reply(
            admin_id,
            format!(
                "✅ Stato dell'utente {} aggiornato: {} {}",
                updated.display_name(),
                ui::status_icon(updated.status),
                ui::status_label(updated.status),
            ),
        )
        .await
    }

    pub(crate) async fn request_deletion(
        &self,
        admin_id: i64,
        arg: Option<String>,
    ) -> Result<(), FlowError> {
        let account = self.required_account(arg, "/admin_elimina <id>").await?;
        if account.id == admin_id {
            return Err(FlowError::Validation(
                "⚠️ Non puoi eliminare il tuo stesso account.".to_string(),
            ));
        }
        self.pending_deletions
            .lock()
            .await
            .insert(admin_id, account.id);
        self.reply(
            admin_id,
            format!(
                "⚠️ Stai per eliminare definitivamente l'utente {} (ID: {}). Lo storico delle sue transazioni verrà conservato.\n\nPer confermare usa:\n/admin_conferma_eliminazione {}",
                account.display_name(),
                account.id,
                account.id
            ),
        )
        .await
    }

    pub(crate) async fn confirm_deletion(
        &self,
        admin_id: i64,
        arg: Option<String>,
    ) -> Result<(), FlowError> {
        let requested: Option<i64> = arg.as_deref().and_then(|raw| raw.trim().parse().ok());
        let pending = self.pending_deletions.lock().await.get(&admin_id).copied();
        let account_id = match (pending, requested) {
            (Some(pending), Some(requested)) if pending == requested => pending,
            _ => {
                return Err(FlowError::State(
                    "⚠️ Nessuna eliminazione in attesa per questo utente. Usa prima /admin_elimina."
                        .to_string(),
                ));
            }
        };
        let deleted = self.engine.delete_account(account_id).await?;
        self.pending_deletions.lock().await.remove(&admin_id);
        self.reply(
            admin_id,
            format!(
                "🗑️ Utente {} (ID: {}) eliminato.",
                deleted.display_name(),
                deleted.id
            ),
        )
        .await
    }

    pub(crate) async fn make_admin(
        &self,
        admin_id: i64,
        arg: Option<String>,
    ) -> Result<(), FlowError> {
        let account = self.required_account(arg, "/admin_make_admin <id>").await?;
        if account.is_admin {
            return self
                .reply(
                    admin_id,
                    format!("ℹ️ {} è già un amministratore.", account.display_name()),
                )
                .await;
        }
        let promoted = self.engine.promote_to_admin(account.id).await?;
        self.notify(
            promoted.id,
            OutboundMessage::text(
                "👑 Sei stato promosso ad amministratore.\n\nUsa /help per visualizzare i nuovi comandi.",
            ),
        )
        .await;
        self.reply(
            admin_id,
            format!("✅ {} è ora un amministratore.", promoted.display_name()),
        )
        .await
    }

    pub(crate) async fn find_by_card(
        &self,
        admin_id: i64,
        arg: Option<String>,
    ) -> Result<(), FlowError> {
        let card = arg.ok_or_else(|| {
            FlowError::Validation("⚠️ Utilizzo: /admin_trova_tessera <tessera>".to_string())
        })?;
        match self.engine.account_by_card(&card).await? {
            Some(account) => self.reply(admin_id, ui::account_line(&account)).await,
            None => Err(FlowError::Validation(NOT_FOUND.to_string())),
        }
    }

    pub(crate) async fn find_by_name(
        &self,
        admin_id: i64,
        arg: Option<String>,
    ) -> Result<(), FlowError> {
        let query = arg
            .ok_or_else(|| {
                FlowError::Validation("⚠️ Utilizzo: /admin_trova_utente <nome o @username>".to_string())
            })?
            .trim()
            .trim_start_matches('@')
            .to_lowercase();
        let matches: Vec<Account> = self
            .engine
            .accounts(None)
            .await?
            .into_iter()
            .filter(|account| {
                account.display_name().to_lowercase().contains(&query)
                    || account
                        .username
                        .as_deref()
                        .is_some_and(|u| u.to_lowercase().contains(&query))
            })
            .collect();
        if matches.is_empty() {
            return Err(FlowError::Validation(NOT_FOUND.to_string()));
        }
        let mut text = format!("🔍 Trovati {} utenti\n\n", matches.len());
        for account in &matches {
            text.push_str(&ui::account_line(account));
            text.push_str("\n\n");
        }
        self.reply(admin_id, text).await
    }

    pub(crate) async fn show_details(
        &self,
        admin_id: i64,
        arg: Option<String>,
    ) -> Result<(), FlowError> {
        let account = self.required_account(arg, "/admin_dettaglio <id>").await?;
        let entries = self
            .engine
            .entries_for_account(account.id, DETAIL_ENTRIES)
            .await?;
        let last_charge = self.engine.last_charge_at(account.id).await?;

        let mut text = format!(
            "👤 {}\n🆔 Telegram ID: {}\n👤 Username: {}\n💳 Tessera ID: {}\n💰 Saldo: {}\n📊 Stato: {} {}\n👑 Admin: {}\n🔑 Codice invito: {}\n📅 Registrato il: {}\n👁️ Ultimo accesso: {}\n🔋 Ultima ricarica: {}\n",
            account.display_name(),
            account.id,
            ui::username_or_unset(account.username.as_deref()),
            ui::card_or_missing(account.card_id.as_deref()),
            account.balance,
            ui::status_icon(account.status),
            ui::status_label(account.status),
            if account.is_admin { "sì" } else { "no" },
            account.invite_code_used.as_deref().unwrap_or("Non utilizzato"),
            ui::format_date(account.created_at),
            ui::format_datetime(account.last_seen),
            last_charge
                .map(ui::format_datetime)
                .unwrap_or_else(|| "Mai".to_string()),
        );
        if !entries.is_empty() {
            text.push_str("\n📜 Ultime transazioni\n");
            for entry in &entries {
                text.push_str(&format!(
                    "{} {} {} ({}) • {}\n",
                    ui::format_datetime(entry.created_at),
                    match entry.kind {
                        engine::EntryKind::Charge => "🔋",
                        engine::EntryKind::Usage => "⚡",
                    },
                    entry.amount,
                    entry.status.as_str(),
                    entry.new_balance,
                ));
            }
        }
        self.reply(admin_id, text).await
    }

    pub(crate) async fn show_stats(&self, admin_id: i64) -> Result<(), FlowError> {
        let stats = self.engine.stats().await?;
        let text = format!(
            "📊 Statistiche del bot\n\n👥 Utenti\n📌 Totale: {}\n✅ Attivi: {}\n⏳ In attesa: {}\n❌ Bloccati: {}\n🚫 Disabilitati: {}\n👑 Amministratori: {}\n\n🔄 Transazioni\n🔋 Ricariche: {}\n⚡ Utilizzi: {}\n⏳ Utilizzi in attesa: {}\n\n⚡ Energia\n🔋 Totale caricato: {}\n⚡ Totale utilizzato: {}\n💰 Saldo totale: {}",
            stats.total_accounts() - stats.accounts(AccountStatus::Disabled),
            stats.accounts(AccountStatus::Active),
            stats.accounts(AccountStatus::Pending),
            stats.accounts(AccountStatus::Blocked),
            stats.accounts(AccountStatus::Disabled),
            stats.admins,
            stats.charges,
            stats.usages,
            stats.pending_usages,
            stats.total_charged,
            stats.total_used,
            stats.total_balance,
        );
        self.reply(admin_id, text).await
    }
}
