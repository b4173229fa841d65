use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveValue, ConnectionTrait, QueryFilter, QueryOrder, TransactionTrait, prelude::*,
    sea_query::Expr,
};

use crate::{
    Account, AccountStatus, EngineError, Kwh, NewAccount, ResultEngine, accounts, invites,
    util::{normalize_optional_text, require_card_id},
};

use super::{Engine, with_tx};

/// Load an account row or fail with `KeyNotFound`.
pub(super) async fn require_account<C: ConnectionTrait>(
    conn: &C,
    account_id: i64,
) -> ResultEngine<accounts::Model> {
    accounts::Entity::find_by_id(account_id)
        .one(conn)
        .await?
        .ok_or_else(|| EngineError::KeyNotFound(format!("account {account_id}")))
}

/// Fail with the account's status unless it is `active`.
pub(super) fn ensure_active(model: &accounts::Model) -> ResultEngine<AccountStatus> {
    let status = AccountStatus::try_from(model.status.as_str())?;
    if status != AccountStatus::Active {
        return Err(EngineError::AccountNotActive(status));
    }
    Ok(status)
}

impl Engine {
    /// Registers a new `pending` account with a zero balance.
    ///
    /// The card id must be unique. When `invite_code` is set the code must be
    /// valid at `now`; it is consumed in the same DB transaction as the insert.
    pub async fn register_account(
        &self,
        new: NewAccount,
        now: DateTime<Utc>,
    ) -> ResultEngine<Account> {
        let first_name = new.first_name.trim().to_string();
        if first_name.is_empty() {
            return Err(EngineError::InvalidAmount(
                "first name must not be empty".to_string(),
            ));
        }
        let card_id = require_card_id(&new.card_id)?;

        with_tx!(self, |db_tx| {
            if accounts::Entity::find_by_id(new.id).one(&db_tx).await?.is_some() {
                return Err(EngineError::ExistingKey(format!("account {}", new.id)));
            }
            let card_taken = accounts::Entity::find()
                .filter(accounts::Column::CardId.eq(card_id.clone()))
                .one(&db_tx)
                .await?
                .is_some();
            if card_taken {
                return Err(EngineError::ExistingKey(format!("card {card_id}")));
            }

            if let Some(code) = new.invite_code.as_deref() {
                let invite = invites::Entity::find_by_id(code.to_string())
                    .one(&db_tx)
                    .await?
                    .map(crate::Invite::from)
                    .ok_or_else(|| EngineError::InvalidInvite(code.to_string()))?;
                if !invite.is_valid(now) {
                    return Err(EngineError::InvalidInvite(code.to_string()));
                }
                let consumed = invites::Entity::update_many()
                    .col_expr(invites::Column::UsedBy, Expr::value(Some(new.id)))
                    .col_expr(invites::Column::UsedAt, Expr::value(Some(now)))
                    .filter(invites::Column::Code.eq(code))
                    .filter(invites::Column::UsedBy.is_null())
                    .exec(&db_tx)
                    .await?;
                if consumed.rows_affected == 0 {
                    return Err(EngineError::InvalidInvite(code.to_string()));
                }
            }

            let model = accounts::ActiveModel {
                id: ActiveValue::Set(new.id),
                first_name: ActiveValue::Set(first_name),
                last_name: ActiveValue::Set(normalize_optional_text(new.last_name.as_deref())),
                username: ActiveValue::Set(normalize_optional_text(new.username.as_deref())),
                card_id: ActiveValue::Set(Some(card_id)),
                balance: ActiveValue::Set(0),
                status: ActiveValue::Set(AccountStatus::Pending.as_str().to_string()),
                is_admin: ActiveValue::Set(false),
                invite_code_used: ActiveValue::Set(new.invite_code.clone()),
                version: ActiveValue::Set(0),
                created_at: ActiveValue::Set(now),
                last_seen: ActiveValue::Set(now),
            }
            .insert(&db_tx)
            .await?;
            tracing::info!(account_id = new.id, "account registered");
            Account::try_from(model)
        })
    }

    /// Creates an active admin account, or promotes and activates an existing one.
    pub async fn ensure_admin(
        &self,
        account_id: i64,
        first_name: &str,
        now: DateTime<Utc>,
    ) -> ResultEngine<Account> {
        with_tx!(self, |db_tx| {
            let model = match accounts::Entity::find_by_id(account_id).one(&db_tx).await? {
                Some(existing) => {
                    let mut active: accounts::ActiveModel = existing.into();
                    active.is_admin = ActiveValue::Set(true);
                    active.status = ActiveValue::Set(AccountStatus::Active.as_str().to_string());
                    active.update(&db_tx).await?
                }
                None => {
                    accounts::ActiveModel {
                        id: ActiveValue::Set(account_id),
                        first_name: ActiveValue::Set(first_name.trim().to_string()),
                        last_name: ActiveValue::Set(None),
                        username: ActiveValue::Set(None),
                        card_id: ActiveValue::Set(None),
                        balance: ActiveValue::Set(0),
                        status: ActiveValue::Set(AccountStatus::Active.as_str().to_string()),
                        is_admin: ActiveValue::Set(true),
                        invite_code_used: ActiveValue::Set(None),
                        version: ActiveValue::Set(0),
                        created_at: ActiveValue::Set(now),
                        last_seen: ActiveValue::Set(now),
                    }
                    .insert(&db_tx)
                    .await?
                }
            };
            Account::try_from(model)
        })
    }

    /// Returns the account or `KeyNotFound`.
    pub async fn account(&self, account_id: i64) -> ResultEngine<Account> {
        Account::try_from(require_account(&self.database, account_id).await?)
    }

    pub async fn find_account(&self, account_id: i64) -> ResultEngine<Option<Account>> {
        accounts::Entity::find_by_id(account_id)
            .one(&self.database)
            .await?
            .map(Account::try_from)
            .transpose()
    }

    pub async fn account_by_card(&self, card_id: &str) -> ResultEngine<Option<Account>> {
        accounts::Entity::find()
            .filter(accounts::Column::CardId.eq(card_id.trim()))
            .one(&self.database)
            .await?
            .map(Account::try_from)
            .transpose()
    }

    /// Case-insensitive lookup; a leading `@` is ignored.
    pub async fn account_by_username(&self, username: &str) -> ResultEngine<Option<Account>> {
        let name = username.trim().trim_start_matches('@').to_lowercase();
        accounts::Entity::find()
            .filter(Expr::cust("LOWER(username)").eq(name))
            .one(&self.database)
            .await?
            .map(Account::try_from)
            .transpose()
    }

    /// All accounts, optionally restricted to one status, oldest first.
    pub async fn accounts(&self, status: Option<AccountStatus>) -> ResultEngine<Vec<Account>> {
        let mut query = accounts::Entity::find();
        if let Some(status) = status {
            query = query.filter(accounts::Column::Status.eq(status.as_str()));
        }
        query
            .order_by_asc(accounts::Column::CreatedAt)
            .order_by_asc(accounts::Column::Id)
            .all(&self.database)
            .await?
            .into_iter()
            .map(Account::try_from)
            .collect()
    }

    /// Active accounts whose balance is strictly below `threshold`, lowest first.
    pub async fn low_balance_accounts(&self, threshold: Kwh) -> ResultEngine<Vec<Account>> {
        accounts::Entity::find()
            .filter(accounts::Column::Status.eq(AccountStatus::Active.as_str()))
            .filter(accounts::Column::Balance.lt(threshold.hundredths()))
            .order_by_asc(accounts::Column::Balance)
            .order_by_asc(accounts::Column::Id)
            .all(&self.database)
            .await?
            .into_iter()
            .map(Account::try_from)
            .collect()
    }

    /// Administrative status change (approve, block, unblock, disable).
    pub async fn set_account_status(
        &self,
        account_id: i64,
        status: AccountStatus,
    ) -> ResultEngine<Account> {
        with_tx!(self, |db_tx| {
            let model = require_account(&db_tx, account_id).await?;
            let mut active: accounts::ActiveModel = model.into();
            active.status = ActiveValue::Set(status.as_str().to_string());
            let updated = active.update(&db_tx).await?;
            tracing::info!(account_id, status = status.as_str(), "account status changed");
            Account::try_from(updated)
        })
    }

    pub async fn promote_to_admin(&self, account_id: i64) -> ResultEngine<Account> {
        with_tx!(self, |db_tx| {
            let model = require_account(&db_tx, account_id).await?;
            let mut active: accounts::ActiveModel = model.into();
            active.is_admin = ActiveValue::Set(true);
            let updated = active.update(&db_tx).await?;
            tracing::info!(account_id, "account promoted to admin");
            Account::try_from(updated)
        })
    }

    /// Removes the account. Its ledger entries stay as history.
    pub async fn delete_account(&self, account_id: i64) -> ResultEngine<Account> {
        with_tx!(self, |db_tx| {
            let model = require_account(&db_tx, account_id).await?;
            let account = Account::try_from(model)?;
            accounts::Entity::delete_by_id(account_id)
                .exec(&db_tx)
                .await?;
            tracing::info!(account_id, "account deleted");
            Ok(account)
        })
    }

    /// Records activity; unknown ids are ignored.
    pub async fn touch_last_seen(&self, account_id: i64, now: DateTime<Utc>) -> ResultEngine<()> {
        accounts::Entity::update_many()
            .col_expr(accounts::Column::LastSeen, Expr::value(now))
            .filter(accounts::Column::Id.eq(account_id))
            .exec(&self.database)
            .await?;
        Ok(())
    }
}
