use sea_orm::{TransactionTrait, prelude::*};
use uuid::Uuid;

use crate::{Account, EngineError, EntryStatus, Kwh, LedgerEntry, ResultEngine, ledger};

use super::{
    Engine,
    accounts::require_account,
    ledger::{close_entry, write_balance},
    with_tx,
};

/// Result of a successful usage approval.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ApprovalOutcome {
    pub entry: LedgerEntry,
    pub account: Account,
    /// The balance moved between request and approval and the entry was
    /// rebased onto the live value.
    pub rebased: bool,
    /// The resulting balance is below the low-balance threshold.
    pub low_balance: bool,
}

impl Engine {
    /// `pending -> approved` for a usage entry, debiting the account.
    ///
    /// The status transition is a conditional update on `status = 'pending'`,
    /// so of two racing approvers exactly one succeeds and the other gets
    /// `AlreadyProcessed`. If the balance changed since the request the entry
    /// is rebased (`previous = live`, `new = live - amount`); a rebase that
    /// would go negative fails with `InsufficientFunds` and leaves the entry
    /// pending.
    pub async fn approve_usage(
        &self,
        entry_id: Uuid,
        approver_id: i64,
    ) -> ResultEngine<ApprovalOutcome> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let result: ResultEngine<ApprovalOutcome> = with_tx!(self, |db_tx| {
                let entry = load_pending(&db_tx, entry_id).await?;
                let account_model = require_account(&db_tx, entry.account_id).await?;

                let live = Kwh::new(account_model.balance);
                let rebased = live != entry.previous_balance;
                let (previous_balance, new_balance) = if rebased {
                    let new_balance = live - entry.amount;
                    if new_balance.is_negative() {
                        return Err(EngineError::InsufficientFunds {
                            balance: live,
                            requested: entry.amount,
                        });
                    }
                    (live, new_balance)
                } else {
                    (entry.previous_balance, entry.new_balance)
                };

                let closed = close_entry(
                    &db_tx,
                    entry_id,
                    EntryStatus::Approved,
                    approver_id,
                    rebased.then_some((previous_balance, new_balance)),
                )
                .await?;
                if !closed {
                    return Err(EngineError::AlreadyProcessed(entry_id.to_string()));
                }
                if !write_balance(&db_tx, &account_model, new_balance).await? {
                    Err(EngineError::Conflict(entry.account_id))
                } else {
                    let entry = fetch_entry(&db_tx, entry_id).await?;
                    let account = Account::try_from(
                        require_account(&db_tx, entry.account_id).await?,
                    )?;
                    Ok(ApprovalOutcome {
                        low_balance: self.policy.is_low(account.balance),
                        entry,
                        account,
                        rebased,
                    })
                }
            });

            match result {
                Ok(outcome) => {
                    tracing::info!(
                        entry_id = %entry_id,
                        approver_id,
                        rebased = outcome.rebased,
                        new_balance = %outcome.account.balance,
                        "usage approved"
                    );
                    return Ok(outcome);
                }
                Err(EngineError::Conflict(account_id)) if attempt < self.policy.max_retries => {
                    tracing::debug!(account_id, attempt, "approval lost version race, retrying");
                }
                Err(err) if err.is_busy() && attempt < self.policy.max_retries => {
                    tracing::debug!(entry_id = %entry_id, attempt, "storage busy, retrying approval");
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// `pending -> rejected` for a usage entry. The balance is not touched.
    pub async fn reject_usage(&self, entry_id: Uuid, approver_id: i64) -> ResultEngine<LedgerEntry> {
        with_tx!(self, |db_tx| {
            let closed =
                close_entry(&db_tx, entry_id, EntryStatus::Rejected, approver_id, None).await?;
            if !closed {
                // Tell a missing entry apart from one already decided.
                let entry = fetch_entry(&db_tx, entry_id).await?;
                return Err(EngineError::AlreadyProcessed(entry.id.to_string()));
            }
            let entry = fetch_entry(&db_tx, entry_id).await?;
            tracing::info!(entry_id = %entry_id, approver_id, "usage rejected");
            Ok(entry)
        })
    }
}

async fn fetch_entry<C: ConnectionTrait>(conn: &C, entry_id: Uuid) -> ResultEngine<LedgerEntry> {
    ledger::Entity::find_by_id(entry_id.to_string())
        .one(conn)
        .await?
        .ok_or_else(|| EngineError::KeyNotFound(format!("ledger entry {entry_id}")))
        .and_then(LedgerEntry::try_from)
}

async fn load_pending<C: ConnectionTrait>(conn: &C, entry_id: Uuid) -> ResultEngine<LedgerEntry> {
    let entry = fetch_entry(conn, entry_id).await?;
    if entry.status != EntryStatus::Pending {
        return Err(EngineError::AlreadyProcessed(entry_id.to_string()));
    }
    Ok(entry)
}
