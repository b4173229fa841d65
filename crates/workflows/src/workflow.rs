//! Workflow kinds and their step sets.
//!
//! A slot holds exactly one [`Workflow`] value; each variant carries its own
//! step enum, so a slot can never be in a step that does not belong to its
//! kind.

use std::fmt;

use chrono::{DateTime, Utc};
use engine::{Account, Kwh, LedgerEntry};

use crate::parsing::Period;

/// Ordered by dispatch priority: when an actor has several live slots a
/// free-text event goes to the smallest kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum WorkflowKind {
    Registration,
    UsageRegistration,
    Recharge,
    InviteCode,
    LowBalanceSearch,
    RechargeHistory,
    UsageHistory,
}

impl WorkflowKind {
    pub const PRIORITY: [WorkflowKind; 7] = [
        WorkflowKind::Registration,
        WorkflowKind::UsageRegistration,
        WorkflowKind::Recharge,
        WorkflowKind::InviteCode,
        WorkflowKind::LowBalanceSearch,
        WorkflowKind::RechargeHistory,
        WorkflowKind::UsageHistory,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Registration => "registration",
            Self::UsageRegistration => "usage_registration",
            Self::Recharge => "recharge",
            Self::InviteCode => "invite_code",
            Self::LowBalanceSearch => "low_balance_search",
            Self::RechargeHistory => "recharge_history",
            Self::UsageHistory => "usage_history",
        }
    }
}

impl fmt::Display for WorkflowKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RegistrationStep {
    WaitingForInviteCode,
    WaitingForCardId { invite_code: Option<String> },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UsageStep {
    WaitingForAmount,
    WaitingForPhoto { amount: Kwh },
    WaitingForNotes { amount: Kwh, photo_file_id: String },
}

/// The account picked by the admin, as it looked when the dialog opened.
/// Display only: the charge itself always reads the live balance.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RechargeTarget {
    pub account_id: i64,
    pub display_name: String,
    pub username: Option<String>,
    pub card_id: Option<String>,
    pub balance: Kwh,
}

impl From<&Account> for RechargeTarget {
    fn from(account: &Account) -> Self {
        Self {
            account_id: account.id,
            display_name: account.display_name(),
            username: account.username.clone(),
            card_id: account.card_id.clone(),
            balance: account.balance,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RechargeStep {
    WaitingForAmount {
        target: RechargeTarget,
    },
    WaitingForConfirmation {
        target: RechargeTarget,
        amount: Kwh,
    },
}

impl RechargeStep {
    pub fn target(&self) -> &RechargeTarget {
        match self {
            Self::WaitingForAmount { target } | Self::WaitingForConfirmation { target, .. } => {
                target
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InviteStep {
    WaitingForNotes { code: String },
}

/// A low-balance row with the date of its last approved charge.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LowBalanceRow {
    pub account: Account,
    pub last_charge_at: Option<DateTime<Utc>>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LowBalanceStep {
    WaitingForThreshold,
    Browsing {
        threshold: Kwh,
        rows: Vec<LowBalanceRow>,
        page: usize,
    },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HistoryStep {
    WaitingForPeriod,
    Browsing {
        period: Period,
        entries: Vec<LedgerEntry>,
        /// Holders of `entries`, resolved once when the search runs.
        holders: Vec<Account>,
        page: usize,
    },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Workflow {
    Registration(RegistrationStep),
    UsageRegistration(UsageStep),
    Recharge(RechargeStep),
    InviteCode(InviteStep),
    LowBalanceSearch(LowBalanceStep),
    RechargeHistory(HistoryStep),
    UsageHistory(HistoryStep),
}

impl Workflow {
    pub fn kind(&self) -> WorkflowKind {
        match self {
            Self::Registration(_) => WorkflowKind::Registration,
            Self::UsageRegistration(_) => WorkflowKind::UsageRegistration,
            Self::Recharge(_) => WorkflowKind::Recharge,
            Self::InviteCode(_) => WorkflowKind::InviteCode,
            Self::LowBalanceSearch(_) => WorkflowKind::LowBalanceSearch,
            Self::RechargeHistory(_) => WorkflowKind::RechargeHistory,
            Self::UsageHistory(_) => WorkflowKind::UsageHistory,
        }
    }

    /// Name of the current step, for logs.
    pub fn step_name(&self) -> &'static str {
        match self {
            Self::Registration(RegistrationStep::WaitingForInviteCode) => "waiting_for_invite_code",
            Self::Registration(RegistrationStep::WaitingForCardId { .. }) => "waiting_for_card_id",
            Self::UsageRegistration(UsageStep::WaitingForAmount)
            | Self::Recharge(RechargeStep::WaitingForAmount { .. }) => "waiting_for_amount",
            Self::UsageRegistration(UsageStep::WaitingForPhoto { .. }) => "waiting_for_photo",
            Self::UsageRegistration(UsageStep::WaitingForNotes { .. })
            | Self::InviteCode(InviteStep::WaitingForNotes { .. }) => "waiting_for_notes",
            Self::Recharge(RechargeStep::WaitingForConfirmation { .. }) => {
                "waiting_for_confirmation"
            }
            Self::LowBalanceSearch(LowBalanceStep::WaitingForThreshold) => "waiting_for_threshold",
            Self::RechargeHistory(HistoryStep::WaitingForPeriod)
            | Self::UsageHistory(HistoryStep::WaitingForPeriod) => "waiting_for_period",
            Self::LowBalanceSearch(LowBalanceStep::Browsing { .. })
            | Self::RechargeHistory(HistoryStep::Browsing { .. })
            | Self::UsageHistory(HistoryStep::Browsing { .. }) => "browsing",
        }
    }
}

/// One live workflow of one actor.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WorkflowSlot {
    pub workflow: Workflow,
    pub last_activity: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_matches_ordering() {
        let mut sorted = WorkflowKind::PRIORITY;
        sorted.sort();
        assert_eq!(sorted, WorkflowKind::PRIORITY);
    }

    #[test]
    fn history_kinds_share_steps_but_not_kind() {
        let recharge = Workflow::RechargeHistory(HistoryStep::WaitingForPeriod);
        let usage = Workflow::UsageHistory(HistoryStep::WaitingForPeriod);
        assert_ne!(recharge.kind(), usage.kind());
        assert_eq!(recharge.step_name(), usage.step_name());
    }
}
