//! Admin browse of recharges or usages over a period, with CSV export.
//! The same code serves both kinds; only the nouns and icons differ.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use csv::Writer;
use engine::{Account, EntryKind, HistoryQuery, LedgerEntry};
use serde::Serialize;

use crate::{
    Button, Dispatcher, FlowError, OutboundMessage,
    dispatcher::Ack,
    event::{ActorEvent, EventKind},
    messenger::Document,
    parsing::{Period, history_prefix},
    registry::ActorSlots,
    ui,
    workflow::{HistoryStep, Workflow, WorkflowKind},
};

#[derive(Serialize)]
struct HistoryCsvRow<'a> {
    #[serde(rename = "Data")]
    date: String,
    #[serde(rename = "Ora")]
    time: String,
    #[serde(rename = "Nome")]
    first_name: &'a str,
    #[serde(rename = "Cognome")]
    last_name: &'a str,
    #[serde(rename = "Tessera ID")]
    card_id: &'a str,
    #[serde(rename = "Importo")]
    amount: String,
    #[serde(rename = "Saldo Precedente")]
    previous_balance: String,
    #[serde(rename = "Saldo Finale")]
    new_balance: String,
    #[serde(rename = "Note")]
    notes: &'a str,
}

fn workflow_kind(kind: EntryKind) -> WorkflowKind {
    match kind {
        EntryKind::Charge => WorkflowKind::RechargeHistory,
        EntryKind::Usage => WorkflowKind::UsageHistory,
    }
}

fn wrap(kind: EntryKind, step: HistoryStep) -> Workflow {
    match kind {
        EntryKind::Charge => Workflow::RechargeHistory(step),
        EntryKind::Usage => Workflow::UsageHistory(step),
    }
}

fn unwrap_step(workflow: Workflow) -> Option<HistoryStep> {
    match workflow {
        Workflow::RechargeHistory(step) | Workflow::UsageHistory(step) => Some(step),
        _ => None,
    }
}

fn noun(kind: EntryKind) -> &'static str {
    match kind {
        EntryKind::Charge => "ricariche",
        EntryKind::Usage => "utilizzi",
    }
}

fn holder<'a>(holders: &'a [Account], account_id: i64) -> Option<&'a Account> {
    holders.iter().find(|account| account.id == account_id)
}

impl Dispatcher {
    pub(crate) async fn start_history(
        &self,
        slots: &mut ActorSlots,
        admin_id: i64,
        kind: EntryKind,
        now: DateTime<Utc>,
    ) -> Result<(), FlowError> {
        slots.start(wrap(kind, HistoryStep::WaitingForPeriod), now);
        let text = match kind {
            EntryKind::Charge => "📊 Ricerca ricariche\n\nScegli un'opzione per visualizzare le ricariche:\n\n1. \"oggi\" - Visualizza le ricariche di oggi\n2. \"ieri\" - Visualizza le ricariche di ieri\n3. \"settimana\" - Visualizza le ricariche dell'ultima settimana\n4. \"mese\" - Visualizza le ricariche dell'ultimo mese\n5. \"GG/MM/AAAA\" - Inserisci una data specifica (es. 15/05/2025)\n\nPer visualizzare le ultime 10 ricariche indipendentemente dalla data, scrivi \"ultime\"",
            EntryKind::Usage => "📊 Ricerca utilizzi kWh\n\nScegli un'opzione per visualizzare gli utilizzi:\n\n1. \"oggi\" - Visualizza gli utilizzi di oggi\n2. \"ieri\" - Visualizza gli utilizzi di ieri\n3. \"settimana\" - Visualizza gli utilizzi dell'ultima settimana\n4. \"mese\" - Visualizza gli utilizzi dell'ultimo mese\n5. \"GG/MM/AAAA\" - Inserisci una data specifica (es. 15/05/2025)\n\nPer visualizzare gli ultimi 10 utilizzi indipendentemente dalla data, scrivi \"ultime\"",
        };
        self.send(
            admin_id,
            OutboundMessage::text(text).with_reply(&[
                &["oggi", "ieri", "settimana"],
                &["mese", "ultime"],
                &[ui::CANCEL_LABEL],
            ]),
        )
        .await
    }

    pub(crate) async fn history_step(
        &self,
        slots: &mut ActorSlots,
        event: &ActorEvent,
        kind: EntryKind,
        step: HistoryStep,
        now: DateTime<Utc>,
    ) -> Result<(), FlowError> {
        let admin_id = event.actor_id;
        if let HistoryStep::Browsing { .. } = step {
            return Err(FlowError::Validation(
                "Usa i pulsanti sotto i risultati per navigare, esportare o chiudere.".to_string(),
            ));
        }
        let EventKind::Text(input) = &event.kind else {
            return Err(FlowError::Validation(
                "Scegli un periodo oppure inserisci una data nel formato GG/MM/AAAA:".to_string(),
            ));
        };
        let period = Period::parse(input).map_err(|_| {
            FlowError::Validation(
                "⚠️ Formato data non valido. Utilizza GG/MM/AAAA o scegli un'opzione predefinita:"
                    .to_string(),
            )
        })?;

        let (from, to) = period.window(now);
        let entries = self
            .engine
            .history(HistoryQuery {
                kind,
                from,
                to,
                limit: period.limit(),
            })
            .await?;
        let description = period.description(kind);
        tracing::info!(admin_id, kind = kind.as_str(), period = ?period, found = entries.len(), "history search");

        if entries.is_empty() {
            slots.finish(workflow_kind(kind));
            return self
                .send(
                    admin_id,
                    OutboundMessage::text(format!(
                        "📊 Non ci sono {} {description}.",
                        noun(kind)
                    ))
                    .removing_keyboard(),
                )
                .await;
        }

        let ids: BTreeSet<i64> = entries.iter().map(|entry| entry.account_id).collect();
        let mut holders = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(account) = self.engine.find_account(id).await? {
                holders.push(account);
            }
        }

        let pages = ui::page_count(entries.len(), self.settings.page_size);
        self.send(
            admin_id,
            OutboundMessage::text(self.history_page_text(kind, period, &entries, &holders, 0)),
        )
        .await?;

        if pages > 1 {
            slots.advance(
                wrap(
                    kind,
                    HistoryStep::Browsing {
                        period,
                        entries,
                        holders,
                        page: 0,
                    },
                ),
                now,
            );
            self.send(
                admin_id,
                OutboundMessage::text("Usa i pulsanti sotto per navigare tra le pagine:")
                    .with_inline(history_keyboard(kind, 0, pages)),
            )
            .await
        } else {
            slots.finish(workflow_kind(kind));
            self.send(
                admin_id,
                OutboundMessage::text("✅ Ricerca completata.").removing_keyboard(),
            )
            .await
        }
    }

    fn history_page_text(
        &self,
        kind: EntryKind,
        period: Period,
        entries: &[LedgerEntry],
        holders: &[Account],
        page: usize,
    ) -> String {
        let page_size = self.settings.page_size;
        let pages = ui::page_count(entries.len(), page_size);
        let title = match kind {
            EntryKind::Charge => "Ricariche",
            EntryKind::Usage => "Utilizzi",
        };
        let icon = match kind {
            EntryKind::Charge => "🔋",
            EntryKind::Usage => "⚡",
        };
        let mut text = format!(
            "📊 {title} {}\n({} {} - Pagina {}/{pages})\n\n",
            period.description(kind),
            entries.len(),
            noun(kind),
            page + 1,
        );
        for entry in ui::page_slice(entries, page, page_size) {
            let account = holder(holders, entry.account_id);
            let name = account
                .map(Account::display_name)
                .unwrap_or_else(|| "Utente sconosciuto".to_string());
            text.push_str(&format!(
                "{icon} {name} - {}\n   💳 Tessera: {}\n   📅 Data: {}\n   💰 Saldo finale: {}\n",
                entry.amount,
                ui::card_or_missing(entry.card_id.as_deref()),
                ui::format_datetime(entry.created_at),
                entry.new_balance,
            ));
            if kind == EntryKind::Usage
                && let Some(notes) = &entry.notes
            {
                text.push_str(&format!("   📝 Note: {notes}\n"));
            }
            if let Some(account) = account {
                text.push_str(&format!("   📋 /admin_dettaglio {}\n", account.id));
            }
            text.push('\n');
        }
        text
    }

    /// Loads the browsing state, or explains that the search is gone.
    fn browsing(
        &self,
        slots: &mut ActorSlots,
        kind: EntryKind,
        now: DateTime<Utc>,
    ) -> Result<(Period, Vec<LedgerEntry>, Vec<Account>, usize), FlowError> {
        match slots
            .get(workflow_kind(kind), now)
            .cloned()
            .and_then(unwrap_step)
        {
            Some(HistoryStep::Browsing {
                period,
                entries,
                holders,
                page,
            }) => Ok((period, entries, holders, page)),
            _ => Err(FlowError::State(ui::SESSION_EXPIRED.to_string())),
        }
    }

    pub(crate) async fn history_page(
        &self,
        slots: &mut ActorSlots,
        admin_id: i64,
        kind: EntryKind,
        page: usize,
        now: DateTime<Utc>,
    ) -> Result<Ack, FlowError> {
        let (period, entries, holders, _) = self.browsing(slots, kind, now)?;
        let pages = ui::page_count(entries.len(), self.settings.page_size);
        if page >= pages {
            return Err(FlowError::State(ui::INVALID_PAGE.to_string()));
        }
        let text = self.history_page_text(kind, period, &entries, &holders, page);
        slots.advance(
            wrap(
                kind,
                HistoryStep::Browsing {
                    period,
                    entries,
                    holders,
                    page,
                },
            ),
            now,
        );
        self.send(
            admin_id,
            OutboundMessage::text(text).with_inline(history_keyboard(kind, page, pages)),
        )
        .await?;
        Ok(None)
    }

    pub(crate) async fn history_export(
        &self,
        slots: &mut ActorSlots,
        admin_id: i64,
        kind: EntryKind,
        now: DateTime<Utc>,
    ) -> Result<Ack, FlowError> {
        let (period, entries, holders, _) = self.browsing(slots, kind, now)?;

        let mut writer = Writer::from_writer(vec![]);
        for entry in &entries {
            let account = holder(&holders, entry.account_id);
            let at = ui::now_rome(entry.created_at);
            writer.serialize(HistoryCsvRow {
                date: at.format("%d/%m/%Y").to_string(),
                time: at.format("%H:%M:%S").to_string(),
                first_name: account.map_or("Unknown", |a| a.first_name.as_str()),
                last_name: account
                    .and_then(|a| a.last_name.as_deref())
                    .unwrap_or(""),
                card_id: ui::card_or_missing(entry.card_id.as_deref()),
                amount: entry.amount.decimal(),
                previous_balance: entry.previous_balance.decimal(),
                new_balance: entry.new_balance.decimal(),
                notes: entry.notes.as_deref().unwrap_or(""),
            })?;
        }
        let content = writer
            .into_inner()
            .map_err(|err| FlowError::Export(err.to_string()))?;

        let document = Document {
            file_name: period.file_name(kind, now),
            content,
            caption: Some(format!(
                "📊 Esportazione completata: {} {} {}",
                entries.len(),
                noun(kind),
                period.description(kind)
            )),
        };
        self.messenger.send_document(admin_id, document).await?;
        slots.finish(workflow_kind(kind));
        tracing::info!(admin_id, kind = kind.as_str(), rows = entries.len(), "history exported");
        Ok(Some("Esportazione completata".to_string()))
    }

    pub(crate) async fn history_close(
        &self,
        slots: &mut ActorSlots,
        admin_id: i64,
        kind: EntryKind,
        now: DateTime<Utc>,
    ) -> Result<Ack, FlowError> {
        self.browsing(slots, kind, now)?;
        slots.finish(workflow_kind(kind));
        self.send(
            admin_id,
            OutboundMessage::text(format!("📊 Visualizzazione {} chiusa", noun(kind)))
                .removing_keyboard(),
        )
        .await?;
        Ok(Some("Visualizzazione chiusa".to_string()))
    }
}

fn history_keyboard(kind: EntryKind, page: usize, pages: usize) -> Vec<Vec<Button>> {
    let prefix = history_prefix(kind);
    let mut keyboard = Vec::new();
    let nav = ui::page_buttons(prefix, page, pages);
    if !nav.is_empty() {
        keyboard.push(nav);
    }
    keyboard.push(vec![
        Button::new("🚫 Chiudi", format!("{prefix}_close")),
        Button::new("📥 Esporta CSV", format!("{prefix}_export")),
    ]);
    keyboard
}
