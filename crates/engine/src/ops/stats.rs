use std::collections::HashMap;

use sea_orm::{QueryFilter, prelude::*};

use crate::{AccountStatus, EntryKind, EntryStatus, Kwh, ResultEngine, accounts, ledger};

use super::Engine;

/// Aggregate figures shown by the admin stats command.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AccountStats {
    pub accounts_by_status: HashMap<AccountStatus, u64>,
    pub admins: u64,
    pub charges: u64,
    pub usages: u64,
    pub pending_usages: u64,
    /// Sum of approved charges.
    pub total_charged: Kwh,
    /// Sum of approved usages.
    pub total_used: Kwh,
    /// Sum of all account balances.
    pub total_balance: Kwh,
}

impl AccountStats {
    pub fn accounts(&self, status: AccountStatus) -> u64 {
        self.accounts_by_status.get(&status).copied().unwrap_or(0)
    }

    pub fn total_accounts(&self) -> u64 {
        self.accounts_by_status.values().sum()
    }
}

/// Approved ledger totals of a single account, shown on its profile.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AccountTotals {
    pub charges: u64,
    pub usages: u64,
    pub charged: Kwh,
    pub used: Kwh,
}

impl Engine {
    pub async fn account_totals(&self, account_id: i64) -> ResultEngine<AccountTotals> {
        let mut totals = AccountTotals::default();
        let approved = ledger::Entity::find()
            .filter(ledger::Column::AccountId.eq(account_id))
            .filter(ledger::Column::Status.eq(EntryStatus::Approved.as_str()))
            .all(&self.database)
            .await?;
        for model in approved {
            let amount = Kwh::new(model.amount);
            match EntryKind::try_from(model.kind.as_str())? {
                EntryKind::Charge => {
                    totals.charges += 1;
                    totals.charged = totals.charged + amount;
                }
                EntryKind::Usage => {
                    totals.usages += 1;
                    totals.used = totals.used + amount;
                }
            }
        }
        Ok(totals)
    }

    pub async fn stats(&self) -> ResultEngine<AccountStats> {
        let mut stats = AccountStats::default();

        for model in accounts::Entity::find().all(&self.database).await? {
            let status = AccountStatus::try_from(model.status.as_str())?;
            *stats.accounts_by_status.entry(status).or_default() += 1;
            if model.is_admin {
                stats.admins += 1;
            }
            stats.total_balance = stats.total_balance + Kwh::new(model.balance);
        }

        for model in ledger::Entity::find().all(&self.database).await? {
            let kind = EntryKind::try_from(model.kind.as_str())?;
            let status = EntryStatus::try_from(model.status.as_str())?;
            let amount = Kwh::new(model.amount);
            match (kind, status) {
                (EntryKind::Charge, EntryStatus::Approved) => {
                    stats.charges += 1;
                    stats.total_charged = stats.total_charged + amount;
                }
                (EntryKind::Usage, EntryStatus::Approved) => {
                    stats.usages += 1;
                    stats.total_used = stats.total_used + amount;
                }
                (EntryKind::Usage, EntryStatus::Pending) => stats.pending_usages += 1,
                _ => {}
            }
        }

        Ok(stats)
    }
}
