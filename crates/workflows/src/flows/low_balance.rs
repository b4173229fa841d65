//! Admin search for accounts under a balance threshold, browsed in pages
//! or exported as CSV.

use chrono::{DateTime, Utc};
use csv::Writer;
use engine::Kwh;
use serde::Serialize;

use crate::{
    Button, Dispatcher, FlowError, OutboundMessage,
    dispatcher::Ack,
    event::{ActorEvent, EventKind},
    messenger::Document,
    registry::ActorSlots,
    ui,
    workflow::{LowBalanceRow, LowBalanceStep, Workflow, WorkflowKind},
};

const THRESHOLD_CEILING: Kwh = Kwh::whole(10_000);
const PAGE_PREFIX: &str = "low_balance";

#[derive(Serialize)]
struct LowBalanceCsvRow<'a> {
    #[serde(rename = "ID Telegram")]
    id: i64,
    #[serde(rename = "Nome")]
    first_name: &'a str,
    #[serde(rename = "Cognome")]
    last_name: &'a str,
    #[serde(rename = "Username")]
    username: &'a str,
    #[serde(rename = "Tessera ID")]
    card_id: &'a str,
    #[serde(rename = "Saldo")]
    balance: String,
    #[serde(rename = "Ultima Ricarica")]
    last_charge: String,
    #[serde(rename = "Data Registrazione")]
    registered: String,
}

impl Dispatcher {
    pub(crate) async fn start_low_balance(
        &self,
        slots: &mut ActorSlots,
        admin_id: i64,
        now: DateTime<Utc>,
    ) -> Result<(), FlowError> {
        slots.start(
            Workflow::LowBalanceSearch(LowBalanceStep::WaitingForThreshold),
            now,
        );
        self.send(
            admin_id,
            OutboundMessage::text(
                "📊 Ricerca utenti con saldo basso\n\nInserisci il valore di soglia in kWh (es. 20):\nVerranno mostrati tutti gli utenti con saldo inferiore a questo valore.",
            )
            .with_reply(&[&[ui::CANCEL_LABEL]]),
        )
        .await
    }

    pub(crate) async fn low_balance_step(
        &self,
        slots: &mut ActorSlots,
        event: &ActorEvent,
        step: LowBalanceStep,
        now: DateTime<Utc>,
    ) -> Result<(), FlowError> {
        let admin_id = event.actor_id;
        let (LowBalanceStep::WaitingForThreshold, EventKind::Text(input)) = (&step, &event.kind)
        else {
            return Err(FlowError::Validation(match &step {
                LowBalanceStep::WaitingForThreshold => ui::amount_prompt(THRESHOLD_CEILING),
                LowBalanceStep::Browsing { .. } => {
                    "Usa i pulsanti sotto i risultati oppure ❌ Annulla.".to_string()
                }
            }));
        };
        let threshold = self.parse_amount(input, THRESHOLD_CEILING)?;

        let accounts = self.engine.low_balance_accounts(threshold).await?;
        if accounts.is_empty() {
            slots.finish(WorkflowKind::LowBalanceSearch);
            return self
                .send(
                    admin_id,
                    OutboundMessage::text(format!(
                        "✅ Non ci sono utenti con saldo inferiore a {threshold}."
                    ))
                    .removing_keyboard(),
                )
                .await;
        }

        let mut rows = Vec::with_capacity(accounts.len());
        for account in accounts {
            let last_charge_at = self.engine.last_charge_at(account.id).await?;
            rows.push(LowBalanceRow {
                account,
                last_charge_at,
            });
        }
        tracing::info!(admin_id, threshold = %threshold, found = rows.len(), "low balance search");

        let found = rows.len();
        slots.advance(
            Workflow::LowBalanceSearch(LowBalanceStep::Browsing {
                threshold,
                rows,
                page: 0,
            }),
            now,
        );
        // Drop the reply keyboard before offering the inline choices.
        self.send(
            admin_id,
            OutboundMessage::text(format!(
                "📊 Trovati {found} utenti con saldo inferiore a {threshold}."
            ))
            .removing_keyboard(),
        )
        .await?;
        self.send(
            admin_id,
            OutboundMessage::text("Come preferisci visualizzare i risultati?").with_inline(vec![
                vec![
                    Button::new("📋 Mostra lista", "low_balance_show_list"),
                    Button::new("📥 Scarica CSV", "low_balance_csv"),
                ],
                vec![Button::new("❌ Annulla", "low_balance_cancel")],
            ]),
        )
        .await
    }

    /// Shows `page`, or the current one when `None`.
    pub(crate) async fn low_balance_page(
        &self,
        slots: &mut ActorSlots,
        admin_id: i64,
        page: Option<usize>,
        now: DateTime<Utc>,
    ) -> Result<Ack, FlowError> {
        let Some(Workflow::LowBalanceSearch(LowBalanceStep::Browsing {
            threshold,
            rows,
            page: current,
        })) = slots.get(WorkflowKind::LowBalanceSearch, now).cloned()
        else {
            return Err(FlowError::State(ui::SESSION_EXPIRED.to_string()));
        };
        let page_size = self.settings.page_size;
        let pages = ui::page_count(rows.len(), page_size);
        let page = page.unwrap_or(current);
        if page >= pages {
            return Err(FlowError::State(ui::INVALID_PAGE.to_string()));
        }

        let mut text = format!(
            "📊 Utenti con saldo inferiore a {threshold}\n({} utenti trovati - Pagina {}/{pages})\n\n",
            rows.len(),
            page + 1
        );
        for (i, row) in ui::page_slice(&rows, page, page_size).iter().enumerate() {
            let account = &row.account;
            text.push_str(&format!(
                "{}. {}\n   💰 Saldo: {}\n   🆔 ID: {}\n   💳 Tessera: {}\n   🔋 Ultima ricarica: {}\n   📋 /admin_dettaglio {}\n   💸 /admin_ricarica {}\n\n",
                page * page_size + i + 1,
                account.display_name(),
                account.balance,
                account.id,
                account.card_id.as_deref().unwrap_or("Non impostata"),
                row.last_charge_at
                    .map(ui::format_date)
                    .unwrap_or_else(|| "Mai".to_string()),
                account.id,
                account.id,
            ));
        }

        let mut keyboard = Vec::new();
        let nav = ui::page_buttons(PAGE_PREFIX, page, pages);
        if !nav.is_empty() {
            keyboard.push(nav);
        }
        keyboard.push(vec![Button::new("📥 Scarica CSV", "low_balance_csv")]);

        slots.advance(
            Workflow::LowBalanceSearch(LowBalanceStep::Browsing {
                threshold,
                rows,
                page,
            }),
            now,
        );
        self.send(admin_id, OutboundMessage::text(text).with_inline(keyboard))
            .await?;
        Ok(None)
    }

    pub(crate) async fn low_balance_csv(
        &self,
        slots: &mut ActorSlots,
        admin_id: i64,
        now: DateTime<Utc>,
    ) -> Result<Ack, FlowError> {
        let Some(Workflow::LowBalanceSearch(LowBalanceStep::Browsing {
            threshold, rows, ..
        })) = slots.get(WorkflowKind::LowBalanceSearch, now).cloned()
        else {
            return Err(FlowError::State(ui::SESSION_EXPIRED.to_string()));
        };

        let mut writer = Writer::from_writer(vec![]);
        for row in &rows {
            let account = &row.account;
            writer.serialize(LowBalanceCsvRow {
                id: account.id,
                first_name: &account.first_name,
                last_name: account.last_name.as_deref().unwrap_or(""),
                username: account.username.as_deref().unwrap_or(""),
                card_id: account.card_id.as_deref().unwrap_or(""),
                balance: account.balance.decimal(),
                last_charge: row
                    .last_charge_at
                    .map(ui::format_date)
                    .unwrap_or_else(|| "Mai".to_string()),
                registered: ui::format_date(account.created_at),
            })?;
        }
        let content = writer
            .into_inner()
            .map_err(|err| FlowError::Export(err.to_string()))?;

        let document = Document {
            file_name: format!(
                "saldi_bassi_inferiori_{}_kwh_{}.csv",
                threshold.decimal(),
                ui::now_rome(now).format("%Y-%m-%d")
            ),
            content,
            caption: Some(format!(
                "📊 Utenti con saldo inferiore a {threshold} ({} utenti)",
                rows.len()
            )),
        };
        self.messenger.send_document(admin_id, document).await?;
        slots.finish(WorkflowKind::LowBalanceSearch);
        tracing::info!(admin_id, rows = rows.len(), "low balance csv sent");
        Ok(Some("CSV generato".to_string()))
    }

    pub(crate) async fn low_balance_cancel(
        &self,
        slots: &mut ActorSlots,
        admin_id: i64,
        now: DateTime<Utc>,
    ) -> Result<Ack, FlowError> {
        if slots.get(WorkflowKind::LowBalanceSearch, now).is_none() {
            return Err(FlowError::State(ui::NOTHING_IN_PROGRESS.to_string()));
        }
        slots.finish(WorkflowKind::LowBalanceSearch);
        self.send(
            admin_id,
            OutboundMessage::text(ui::WORKFLOW_CANCELLED).removing_keyboard(),
        )
        .await?;
        Ok(Some("Operazione annullata".to_string()))
    }
}
