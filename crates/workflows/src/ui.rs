//! Reply texts and small rendering helpers shared by the flows.

use chrono::{DateTime, FixedOffset, Utc};
use chrono_tz::Europe::Rome;
use engine::{Account, AccountStatus, EngineError, Kwh};

use crate::messenger::Button;

pub(crate) const CANCEL_LABEL: &str = "❌ Annulla";
pub(crate) const NO_NOTES_LABEL: &str = "Nessuna nota";

pub(crate) const UNRECOGNIZED: &str =
    "Comando non riconosciuto. Usa /help per visualizzare i comandi disponibili.";
pub(crate) const FORBIDDEN: &str =
    "⛔ Accesso negato. Solo gli amministratori possono utilizzare questo comando.";
pub(crate) const NOT_REGISTERED: &str = "⚠️ Non sei registrato. Per utilizzare questo bot, è necessario registrarsi.\n\nUsa il comando /start per iniziare la registrazione.";
pub(crate) const WORKFLOW_CANCELLED: &str = "❌ Operazione annullata.";
pub(crate) const SESSION_EXPIRED: &str = "Sessione scaduta. Per favore, avvia una nuova ricerca.";
pub(crate) const NOTHING_IN_PROGRESS: &str = "Nessuna operazione in corso.";
pub(crate) const INVALID_ENTRY: &str = "Transazione non valida o già processata";
pub(crate) const INVALID_PAGE: &str = "Pagina non valida";

pub(crate) fn now_rome(now: DateTime<Utc>) -> DateTime<FixedOffset> {
    now.with_timezone(&Rome).fixed_offset()
}

/// `15/05/2025 14:03:09` in Europe/Rome.
pub(crate) fn format_datetime(at: DateTime<Utc>) -> String {
    now_rome(at).format("%d/%m/%Y %H:%M:%S").to_string()
}

pub(crate) fn format_date(at: DateTime<Utc>) -> String {
    now_rome(at).format("%d/%m/%Y").to_string()
}

pub(crate) fn username_or_unset(username: Option<&str>) -> String {
    username
        .map(|u| format!("@{u}"))
        .unwrap_or_else(|| "Non impostato".to_string())
}

pub(crate) fn card_or_missing(card: Option<&str>) -> &str {
    card.unwrap_or("N/D")
}

/// Why an account in `status` cannot proceed, addressed to its holder.
pub(crate) fn status_reason(status: AccountStatus) -> &'static str {
    match status {
        AccountStatus::Active => "✅ Il tuo account è attivo.",
        AccountStatus::Pending => {
            "⏳ La tua registrazione è in attesa di approvazione da parte dell'amministratore.\n\nRiceverai una notifica quando la tua richiesta sarà elaborata."
        }
        AccountStatus::Blocked => {
            "⛔ Il tuo account è stato bloccato. Contatta l'amministratore per maggiori informazioni."
        }
        AccountStatus::Disabled => {
            "⛔ Il tuo account è stato disabilitato. Contatta l'amministratore per maggiori informazioni."
        }
    }
}

/// Status as an adjective, e.g. "in attesa di approvazione".
pub(crate) fn status_label(status: AccountStatus) -> &'static str {
    match status {
        AccountStatus::Active => "attivo",
        AccountStatus::Pending => "in attesa di approvazione",
        AccountStatus::Blocked => "bloccato",
        AccountStatus::Disabled => "disabilitato",
    }
}

pub(crate) fn status_icon(status: AccountStatus) -> &'static str {
    match status {
        AccountStatus::Active => "✅",
        AccountStatus::Pending => "⏳",
        AccountStatus::Blocked => "❌",
        AccountStatus::Disabled => "🚫",
    }
}

pub(crate) fn error_with_code(code: &str) -> String {
    format!("Si è verificato un errore (codice: {code}). Per favore, riprova più tardi.")
}

pub(crate) fn amount_prompt(ceiling: Kwh) -> String {
    format!(
        "⚠️ Inserisci un valore numerico positivo valido (massimo {} kWh):",
        ceiling.decimal()
    )
}

/// Reply for engine failures that are not storage errors.
pub(crate) fn engine_error_text(err: &EngineError) -> String {
    match err {
        EngineError::InvalidAmount(_) => "⚠️ Inserisci un valore numerico positivo valido.".to_string(),
        EngineError::AmountTooLarge(ceiling) => amount_prompt(*ceiling),
        EngineError::InsufficientFunds { balance, .. } => {
            format!("⚠️ Saldo insufficiente. Il saldo attuale è di {balance}.")
        }
        EngineError::AccountNotActive(status) => status_reason(*status).to_string(),
        EngineError::KeyNotFound(_) => "⚠️ Utente non trovato.".to_string(),
        EngineError::ExistingKey(_) => "⚠️ Elemento già presente.".to_string(),
        EngineError::InvalidInvite(_) => "❌ Codice di invito non valido o scaduto.".to_string(),
        EngineError::AlreadyProcessed(_) => INVALID_ENTRY.to_string(),
        EngineError::Conflict(_) => {
            "⚠️ Il saldo è stato modificato da un'altra operazione. Riprova.".to_string()
        }
        EngineError::Database(_) => "Si è verificato un errore. Per favore, riprova più tardi.".to_string(),
    }
}

/// Admin-facing one-line summary of an account.
pub(crate) fn account_line(account: &Account) -> String {
    format!(
        "{} {} ({})\n   🆔 {} • 💳 {} • 💰 {}",
        status_icon(account.status),
        account.display_name(),
        username_or_unset(account.username.as_deref()),
        account.id,
        card_or_missing(account.card_id.as_deref()),
        account.balance,
    )
}

/// `⬅️ Precedente` / `➡️ Successiva` for page `page` of `pages`.
pub(crate) fn page_buttons(prefix: &str, page: usize, pages: usize) -> Vec<Button> {
    let mut row = Vec::new();
    if page > 0 {
        row.push(Button::new(
            "⬅️ Precedente",
            format!("{prefix}_page_{}", page - 1),
        ));
    }
    if page + 1 < pages {
        row.push(Button::new(
            "➡️ Successiva",
            format!("{prefix}_page_{}", page + 1),
        ));
    }
    row
}

pub(crate) fn page_count(total: usize, page_size: usize) -> usize {
    total.div_ceil(page_size.max(1))
}

pub(crate) fn page_slice<T>(items: &[T], page: usize, page_size: usize) -> &[T] {
    let page_size = page_size.max(1);
    let start = (page * page_size).min(items.len());
    let end = (start + page_size).min(items.len());
    &items[start..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pagination() {
        let items: Vec<u32> = (0..23).collect();
        assert_eq!(page_count(items.len(), 10), 3);
        assert_eq!(page_slice(&items, 2, 10), &[20, 21, 22]);
        assert!(page_slice(&items, 5, 10).is_empty());

        let buttons = page_buttons("low_balance", 0, 3);
        assert_eq!(buttons.len(), 1);
        assert_eq!(buttons[0].data, "low_balance_page_1");
        assert_eq!(page_buttons("x", 2, 3)[0].data, "x_page_1");
    }
}
