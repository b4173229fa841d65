//! Text and button-payload parsing.

use chrono::{DateTime, Months, NaiveDate, TimeZone, Utc};
use chrono_tz::Europe::Rome;
use engine::EntryKind;
use uuid::Uuid;

/// Slash commands. Arguments are kept raw; each handler validates its own.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum Command {
    Start,
    Help,
    Balance,
    Transactions,
    RegisterUsage,
    Profile,
    Cancel,
    Admin(AdminCommand),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum AdminCommand {
    Recharge(Option<String>),
    CreateInvite,
    Invites,
    LowBalances,
    RechargeHistory,
    UsageHistory,
    Stats,
    Approve(Option<String>),
    Block(Option<String>),
    Unblock(Option<String>),
    Disable(Option<String>),
    Delete(Option<String>),
    ConfirmDeletion(Option<String>),
    MakeAdmin(Option<String>),
    FindByCard(Option<String>),
    FindByName(Option<String>),
    Details(Option<String>),
}

/// `None` when the text is not a command this bot knows.
pub(crate) fn parse_command(text: &str) -> Option<Command> {
    let trimmed = text.trim();
    if !trimmed.starts_with('/') {
        return None;
    }
    let mut parts = trimmed.splitn(2, ' ');
    let head = parts.next().unwrap_or("");
    // `/saldo@kwh_bot` in group chats.
    let cmd = head.split('@').next().unwrap_or(head);
    let arg = parts
        .next()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string);

    let command = match cmd {
        "/start" => Command::Start,
        "/help" => Command::Help,
        "/saldo" => Command::Balance,
        "/cronologia" => Command::Transactions,
        "/registra_utilizzo" => Command::RegisterUsage,
        "/profilo" => Command::Profile,
        "/annulla" => Command::Cancel,
        "/admin_ricarica" => Command::Admin(AdminCommand::Recharge(arg)),
        "/admin_crea_invito" => Command::Admin(AdminCommand::CreateInvite),
        "/admin_inviti" => Command::Admin(AdminCommand::Invites),
        "/admin_saldi_bassi" => Command::Admin(AdminCommand::LowBalances),
        "/admin_ricariche" => Command::Admin(AdminCommand::RechargeHistory),
        "/admin_utilizzi" => Command::Admin(AdminCommand::UsageHistory),
        "/admin_stats" => Command::Admin(AdminCommand::Stats),
        "/admin_approva" => Command::Admin(AdminCommand::Approve(arg)),
        "/admin_blocca" => Command::Admin(AdminCommand::Block(arg)),
        "/admin_sblocca" => Command::Admin(AdminCommand::Unblock(arg)),
        "/admin_disabilita" => Command::Admin(AdminCommand::Disable(arg)),
        "/admin_elimina" => Command::Admin(AdminCommand::Delete(arg)),
        "/admin_conferma_eliminazione" => Command::Admin(AdminCommand::ConfirmDeletion(arg)),
        "/admin_make_admin" => Command::Admin(AdminCommand::MakeAdmin(arg)),
        "/admin_trova_tessera" => Command::Admin(AdminCommand::FindByCard(arg)),
        "/admin_trova_utente" => Command::Admin(AdminCommand::FindByName(arg)),
        "/admin_dettaglio" => Command::Admin(AdminCommand::Details(arg)),
        _ => return None,
    };
    Some(command)
}

/// How an admin names an account: numeric id, `@username` or `tessera:CARD`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum AccountRef {
    Id(i64),
    Username(String),
    Card(String),
}

pub(crate) fn parse_account_ref(raw: &str) -> Option<AccountRef> {
    let raw = raw.trim();
    if let Some(card) = raw.strip_prefix("tessera:") {
        let card = card.trim();
        return (!card.is_empty()).then(|| AccountRef::Card(card.to_string()));
    }
    if let Some(name) = raw.strip_prefix('@') {
        return (!name.is_empty()).then(|| AccountRef::Username(name.to_string()));
    }
    raw.parse::<i64>().ok().map(AccountRef::Id)
}

/// Inline button payloads.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Action {
    ApproveUsage(Uuid),
    RejectUsage(Uuid),
    ApproveRegistration(i64),
    RejectRegistration(i64),
    ConfirmRecharge(i64),
    CancelRecharge(i64),
    LowBalancePage(usize),
    LowBalanceShowList,
    LowBalanceCsv,
    LowBalanceCancel,
    HistoryPage(EntryKind, usize),
    HistoryExport(EntryKind),
    HistoryClose(EntryKind),
}

pub(crate) fn parse_action(data: &str) -> Option<Action> {
    if let Some(id) = data.strip_prefix("approve_usage:") {
        return Uuid::parse_str(id).ok().map(Action::ApproveUsage);
    }
    if let Some(id) = data.strip_prefix("reject_usage:") {
        return Uuid::parse_str(id).ok().map(Action::RejectUsage);
    }
    if let Some(id) = data.strip_prefix("approve_registration:") {
        return id.parse().ok().map(Action::ApproveRegistration);
    }
    if let Some(id) = data.strip_prefix("reject_registration:") {
        return id.parse().ok().map(Action::RejectRegistration);
    }
    if let Some(id) = data.strip_prefix("confirm_recharge_") {
        return id.parse().ok().map(Action::ConfirmRecharge);
    }
    if let Some(id) = data.strip_prefix("cancel_recharge_") {
        return id.parse().ok().map(Action::CancelRecharge);
    }
    if let Some(page) = data.strip_prefix("low_balance_page_") {
        return page.parse().ok().map(Action::LowBalancePage);
    }
    match data {
        "low_balance_show_list" => return Some(Action::LowBalanceShowList),
        "low_balance_csv" => return Some(Action::LowBalanceCsv),
        "low_balance_cancel" => return Some(Action::LowBalanceCancel),
        _ => {}
    }

    for (prefix, kind) in [
        ("recharge_history_", EntryKind::Charge),
        ("usage_history_", EntryKind::Usage),
    ] {
        let Some(rest) = data.strip_prefix(prefix) else {
            continue;
        };
        if let Some(page) = rest.strip_prefix("page_") {
            return page.parse().ok().map(|page| Action::HistoryPage(kind, page));
        }
        return match rest {
            "export" => Some(Action::HistoryExport(kind)),
            "close" => Some(Action::HistoryClose(kind)),
            _ => None,
        };
    }
    None
}

/// Button payload prefix of a history browse.
pub(crate) fn history_prefix(kind: EntryKind) -> &'static str {
    match kind {
        EntryKind::Charge => "recharge_history",
        EntryKind::Usage => "usage_history",
    }
}

/// A history search window, in Europe/Rome calendar days.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Period {
    Today,
    Yesterday,
    /// From the start of the day seven days ago.
    LastWeek,
    /// From the start of the same day one month ago.
    LastMonth,
    /// The newest entries regardless of date.
    Latest,
    Day(NaiveDate),
}

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub(crate) enum PeriodError {
    #[error("formato data non valido")]
    InvalidDate,
}

impl Period {
    /// Accepts `oggi`, `ieri`, `settimana`, `mese`, `ultime` or `GG/MM/AAAA`.
    pub(crate) fn parse(input: &str) -> Result<Self, PeriodError> {
        match input.trim().to_lowercase().as_str() {
            "oggi" => Ok(Self::Today),
            "ieri" => Ok(Self::Yesterday),
            "settimana" => Ok(Self::LastWeek),
            "mese" => Ok(Self::LastMonth),
            "ultime" | "ultimi" => Ok(Self::Latest),
            other => NaiveDate::parse_from_str(other, "%d/%m/%Y")
                .map(Self::Day)
                .map_err(|_| PeriodError::InvalidDate),
        }
    }

    pub fn limit(self) -> u64 {
        match self {
            Self::Latest => 10,
            _ => 100,
        }
    }

    /// `[from, to)` in UTC; `None` bounds are open.
    pub fn window(self, now: DateTime<Utc>) -> (Option<DateTime<Utc>>, Option<DateTime<Utc>>) {
        let today = now.with_timezone(&Rome).date_naive();
        let tomorrow = today.succ_opt();
        let (from, to) = match self {
            Self::Latest => return (None, None),
            Self::Today => (Some(today), tomorrow),
            Self::Yesterday => (today.pred_opt(), Some(today)),
            Self::LastWeek => (today.checked_sub_days(chrono::Days::new(7)), tomorrow),
            Self::LastMonth => (today.checked_sub_months(Months::new(1)), tomorrow),
            Self::Day(day) => (Some(day), day.succ_opt()),
        };
        (from.and_then(rome_midnight), to.and_then(rome_midnight))
    }

    /// Italian phrase completing "ricariche ..." / "utilizzi ...".
    pub(crate) fn description(self, kind: EntryKind) -> String {
        match self {
            Self::Today => "oggi".to_string(),
            Self::Yesterday => "ieri".to_string(),
            Self::LastWeek => "dell'ultima settimana".to_string(),
            Self::LastMonth => "dell'ultimo mese".to_string(),
            Self::Latest => match kind {
                EntryKind::Charge => "ultime 10 ricariche".to_string(),
                EntryKind::Usage => "ultimi 10 utilizzi".to_string(),
            },
            Self::Day(day) => format!("del {}", day.format("%d/%m/%Y")),
        }
    }

    /// CSV file name for an export made at `now`.
    pub(crate) fn file_name(self, kind: EntryKind, now: DateTime<Utc>) -> String {
        let noun = match kind {
            EntryKind::Charge => "ricariche",
            EntryKind::Usage => "utilizzi",
        };
        let today = now.with_timezone(&Rome).date_naive();
        match self {
            Self::Today => format!("{noun}_oggi_{}.csv", today.format("%Y-%m-%d")),
            Self::Yesterday => format!(
                "{noun}_ieri_{}.csv",
                today.pred_opt().unwrap_or(today).format("%Y-%m-%d")
            ),
            Self::LastWeek => format!("{noun}_ultima_settimana_{}.csv", today.format("%Y-%m-%d")),
            Self::LastMonth => format!("{noun}_ultimo_mese_{}.csv", today.format("%Y-%m-%d")),
            Self::Latest => match kind {
                EntryKind::Charge => format!("ultime_ricariche_{}.csv", today.format("%Y-%m-%d")),
                EntryKind::Usage => format!("ultimi_utilizzi_{}.csv", today.format("%Y-%m-%d")),
            },
            Self::Day(day) => format!("{noun}_{}.csv", day.format("%d-%m-%Y")),
        }
    }
}

fn rome_midnight(day: NaiveDate) -> Option<DateTime<Utc>> {
    Rome.from_local_datetime(&day.and_hms_opt(0, 0, 0)?)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commands_keep_their_argument() {
        assert_eq!(
            parse_command("/admin_ricarica  @mario "),
            Some(Command::Admin(AdminCommand::Recharge(Some("@mario".to_string()))))
        );
        assert_eq!(parse_command("/saldo@kwh_bot"), Some(Command::Balance));
        assert_eq!(parse_command("/sconosciuto"), None);
        assert_eq!(parse_command("saldo"), None);
    }

    #[test]
    fn account_refs() {
        assert_eq!(parse_account_ref("123"), Some(AccountRef::Id(123)));
        assert_eq!(
            parse_account_ref("@mario"),
            Some(AccountRef::Username("mario".to_string()))
        );
        assert_eq!(
            parse_account_ref("tessera:AB12"),
            Some(AccountRef::Card("AB12".to_string()))
        );
        assert_eq!(parse_account_ref("mario"), None);
        assert_eq!(parse_account_ref("tessera:"), None);
    }

    #[test]
    fn actions() {
        let id = Uuid::new_v4();
        assert_eq!(
            parse_action(&format!("approve_usage:{id}")),
            Some(Action::ApproveUsage(id))
        );
        assert_eq!(parse_action("approve_usage:nope"), None);
        assert_eq!(parse_action("confirm_recharge_42"), Some(Action::ConfirmRecharge(42)));
        assert_eq!(parse_action("low_balance_page_3"), Some(Action::LowBalancePage(3)));
        assert_eq!(
            parse_action("usage_history_page_1"),
            Some(Action::HistoryPage(EntryKind::Usage, 1))
        );
        assert_eq!(
            parse_action("recharge_history_export"),
            Some(Action::HistoryExport(EntryKind::Charge))
        );
        assert_eq!(parse_action("recharge_history_nope"), None);
    }

    #[test]
    fn periods() {
        assert_eq!(Period::parse(" Oggi "), Ok(Period::Today));
        assert_eq!(
            Period::parse("15/05/2025"),
            Ok(Period::Day(NaiveDate::from_ymd_opt(2025, 5, 15).unwrap_or_default()))
        );
        assert_eq!(Period::parse("2025-05-15"), Err(PeriodError::InvalidDate));
        assert_eq!(Period::Latest.limit(), 10);
        assert_eq!(Period::Today.limit(), 100);
    }

    #[test]
    fn day_window_is_a_rome_calendar_day() {
        let day = NaiveDate::from_ymd_opt(2025, 7, 1).unwrap_or_default();
        let (from, to) = Period::Day(day).window(Utc::now());
        // CEST is UTC+2.
        assert_eq!(from.map(|d| d.to_rfc3339()), Some("2025-06-30T22:00:00+00:00".to_string()));
        assert_eq!(to.map(|d| d.to_rfc3339()), Some("2025-07-01T22:00:00+00:00".to_string()));
        assert_eq!(Period::Latest.window(Utc::now()), (None, None));
    }
}
