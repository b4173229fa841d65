use chrono::{DateTime, Utc};
use sea_orm::{
    ConnectionTrait, QueryFilter, QueryOrder, QuerySelect, TransactionTrait,
    prelude::*, sea_query::Expr,
};
use uuid::Uuid;

use crate::{
    EngineError, EntryKind, EntryStatus, Kwh, LedgerEntry, ResultEngine, accounts, ledger,
    util::normalize_optional_text,
};

use super::{
    Engine,
    accounts::{ensure_active, require_account},
    with_tx,
};

/// Input for [`Engine::request_usage`].
#[derive(Clone, Debug, Default)]
pub struct RequestUsage {
    pub account_id: i64,
    pub amount: Kwh,
    pub requested_by: i64,
    pub photo_file_id: Option<String>,
    pub notes: Option<String>,
}

/// Filter for [`Engine::history`]: approved entries of one kind.
#[derive(Clone, Copy, Debug)]
pub struct HistoryQuery {
    pub kind: EntryKind,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub limit: u64,
}

/// Conditional balance write: succeeds only if `version` is still the one
/// read into `model`, and bumps it. Returns `false` when another writer won.
pub(super) async fn write_balance<C: ConnectionTrait>(
    conn: &C,
    model: &accounts::Model,
    new_balance: Kwh,
) -> ResultEngine<bool> {
    let result = accounts::Entity::update_many()
        .col_expr(accounts::Column::Balance, Expr::value(new_balance.hundredths()))
        .col_expr(accounts::Column::Version, Expr::value(model.version + 1))
        .filter(accounts::Column::Id.eq(model.id))
        .filter(accounts::Column::Version.eq(model.version))
        .exec(conn)
        .await?;
    Ok(result.rows_affected == 1)
}

pub(super) fn require_positive(amount: Kwh, ceiling: Kwh) -> ResultEngine<()> {
    if !amount.is_positive() {
        return Err(EngineError::InvalidAmount(
            "amount must be > 0".to_string(),
        ));
    }
    if amount > ceiling {
        return Err(EngineError::AmountTooLarge(ceiling));
    }
    Ok(())
}

impl Engine {
    /// Immediately credits `amount` to an active account and records an
    /// approved charge entry.
    ///
    /// The balance is always read inside the write transaction, so any
    /// snapshot the caller showed to the admin earlier is irrelevant. A
    /// concurrent writer makes the version check fail; the whole
    /// read-modify-write is then retried up to `max_retries` times.
    pub async fn apply_charge(
        &self,
        account_id: i64,
        amount: Kwh,
        admin_id: i64,
        notes: Option<&str>,
    ) -> ResultEngine<LedgerEntry> {
        require_positive(amount, self.policy.recharge_ceiling)?;
        let notes = normalize_optional_text(notes);

        for attempt in 1..=self.policy.max_retries {
            let written: ResultEngine<Option<LedgerEntry>> = with_tx!(self, |db_tx| {
                let model = require_account(&db_tx, account_id).await?;
                ensure_active(&model)?;

                let previous_balance = Kwh::new(model.balance);
                let new_balance = previous_balance
                    .checked_add(amount)
                    .ok_or_else(|| EngineError::InvalidAmount("balance overflow".to_string()))?;

                if !write_balance(&db_tx, &model, new_balance).await? {
                    Ok(None)
                } else {
                    let now = Utc::now();
                    let entry = LedgerEntry {
                        id: Uuid::new_v4(),
                        account_id,
                        card_id: model.card_id.clone(),
                        kind: EntryKind::Charge,
                        amount,
                        previous_balance,
                        new_balance,
                        status: EntryStatus::Approved,
                        requested_by: admin_id,
                        processed_by: Some(admin_id),
                        photo_file_id: None,
                        notes: notes.clone(),
                        created_at: now,
                        updated_at: now,
                    };
                    ledger::ActiveModel::from(&entry).insert(&db_tx).await?;
                    Ok(Some(entry))
                }
            });

            match written {
                Ok(Some(entry)) => {
                    tracing::info!(
                        account_id,
                        entry_id = %entry.id,
                        amount = %entry.amount,
                        new_balance = %entry.new_balance,
                        "charge applied"
                    );
                    return Ok(entry);
                }
                Ok(None) => tracing::debug!(account_id, attempt, "charge lost version race, retrying"),
                Err(err) if err.is_busy() => {
                    tracing::debug!(account_id, attempt, "storage busy, retrying charge");
                }
                Err(err) => return Err(err),
            }
        }

        Err(EngineError::Conflict(account_id))
    }

    /// Records a pending usage entry without touching the balance.
    ///
    /// Rejected when the amount is not positive, exceeds the usage ceiling,
    /// the account is not active, or the current balance cannot cover it.
    pub async fn request_usage(&self, request: RequestUsage) -> ResultEngine<LedgerEntry> {
        require_positive(request.amount, self.policy.usage_ceiling)?;

        let model = require_account(&self.database, request.account_id).await?;
        ensure_active(&model)?;

        let previous_balance = Kwh::new(model.balance);
        let new_balance = previous_balance - request.amount;
        if new_balance.is_negative() {
            return Err(EngineError::InsufficientFunds {
                balance: previous_balance,
                requested: request.amount,
            });
        }

        let now = Utc::now();
        let entry = LedgerEntry {
            id: Uuid::new_v4(),
            account_id: request.account_id,
            card_id: model.card_id,
            kind: EntryKind::Usage,
            amount: request.amount,
            previous_balance,
            new_balance,
            status: EntryStatus::Pending,
            requested_by: request.requested_by,
            processed_by: None,
            photo_file_id: normalize_optional_text(request.photo_file_id.as_deref()),
            notes: normalize_optional_text(request.notes.as_deref()),
            created_at: now,
            updated_at: now,
        };
        ledger::ActiveModel::from(&entry)
            .insert(&self.database)
            .await?;
        tracing::info!(
            account_id = entry.account_id,
            entry_id = %entry.id,
            amount = %entry.amount,
            "usage requested"
        );
        Ok(entry)
    }

    /// Returns the entry or `KeyNotFound`.
    pub async fn entry(&self, entry_id: Uuid) -> ResultEngine<LedgerEntry> {
        ledger::Entity::find_by_id(entry_id.to_string())
            .one(&self.database)
            .await?
            .ok_or_else(|| EngineError::KeyNotFound(format!("ledger entry {entry_id}")))
            .and_then(LedgerEntry::try_from)
    }

    /// Most recent entries of one account, any kind or status.
    pub async fn entries_for_account(
        &self,
        account_id: i64,
        limit: u64,
    ) -> ResultEngine<Vec<LedgerEntry>> {
        ledger::Entity::find()
            .filter(ledger::Column::AccountId.eq(account_id))
            .order_by_desc(ledger::Column::CreatedAt)
            .order_by_desc(ledger::Column::Id)
            .limit(limit)
            .all(&self.database)
            .await?
            .into_iter()
            .map(LedgerEntry::try_from)
            .collect()
    }

    /// Approved entries of one kind inside an optional `[from, to)` window,
    /// most recent first.
    pub async fn history(&self, query: HistoryQuery) -> ResultEngine<Vec<LedgerEntry>> {
        let mut select = ledger::Entity::find()
            .filter(ledger::Column::Kind.eq(query.kind.as_str()))
            .filter(ledger::Column::Status.eq(EntryStatus::Approved.as_str()));
        if let Some(from) = query.from {
            select = select.filter(ledger::Column::CreatedAt.gte(from));
        }
        if let Some(to) = query.to {
            select = select.filter(ledger::Column::CreatedAt.lt(to));
        }
        select
            .order_by_desc(ledger::Column::CreatedAt)
            .order_by_desc(ledger::Column::Id)
            .limit(query.limit)
            .all(&self.database)
            .await?
            .into_iter()
            .map(LedgerEntry::try_from)
            .collect()
    }

    /// Timestamp of the newest approved charge of the account, if any.
    pub async fn last_charge_at(&self, account_id: i64) -> ResultEngine<Option<DateTime<Utc>>> {
        let model = ledger::Entity::find()
            .filter(ledger::Column::AccountId.eq(account_id))
            .filter(ledger::Column::Kind.eq(EntryKind::Charge.as_str()))
            .filter(ledger::Column::Status.eq(EntryStatus::Approved.as_str()))
            .order_by_desc(ledger::Column::CreatedAt)
            .one(&self.database)
            .await?;
        Ok(model.map(|m| m.created_at))
    }

    /// Usage entries still waiting for an admin decision, oldest first.
    pub async fn pending_usages(&self) -> ResultEngine<Vec<LedgerEntry>> {
        ledger::Entity::find()
            .filter(ledger::Column::Kind.eq(EntryKind::Usage.as_str()))
            .filter(ledger::Column::Status.eq(EntryStatus::Pending.as_str()))
            .order_by_asc(ledger::Column::CreatedAt)
            .all(&self.database)
            .await?
            .into_iter()
            .map(LedgerEntry::try_from)
            .collect()
    }
}

/// Marks `entry_id` as `status` if and only if it is still pending.
/// Returns `false` when another approver got there first.
pub(super) async fn close_entry<C: ConnectionTrait>(
    conn: &C,
    entry_id: Uuid,
    status: EntryStatus,
    processed_by: i64,
    rebased: Option<(Kwh, Kwh)>,
) -> ResultEngine<bool> {
    let mut update = ledger::Entity::update_many()
        .col_expr(ledger::Column::Status, Expr::value(status.as_str()))
        .col_expr(ledger::Column::ProcessedBy, Expr::value(Some(processed_by)))
        .col_expr(ledger::Column::UpdatedAt, Expr::value(Utc::now()));
    if let Some((previous, new)) = rebased {
        update = update
            .col_expr(ledger::Column::PreviousBalance, Expr::value(previous.hundredths()))
            .col_expr(ledger::Column::NewBalance, Expr::value(new.hundredths()));
    }
    let result = update
        .filter(ledger::Column::Id.eq(entry_id.to_string()))
        .filter(ledger::Column::Status.eq(EntryStatus::Pending.as_str()))
        .exec(conn)
        .await?;
    Ok(result.rows_affected == 1)
}
