//! Ledger entries.
//!
//! An entry records one balance change for one account. Charges are written
//! already `approved`; usages start `pending` and move exactly once to
//! `approved` or `rejected`. Once an entry leaves `pending` no field changes.

use chrono::{DateTime, Utc};
use sea_orm::{ActiveValue, entity::prelude::*};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{EngineError, Kwh};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    Charge,
    Usage,
}

impl EntryKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Charge => "charge",
            Self::Usage => "usage",
        }
    }
}

impl TryFrom<&str> for EntryKind {
    type Error = EngineError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "charge" => Ok(Self::Charge),
            "usage" => Ok(Self::Usage),
            other => Err(EngineError::KeyNotFound(format!(
                "invalid entry kind: {other}"
            ))),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryStatus {
    Pending,
    Approved,
    Rejected,
}

impl EntryStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }

    pub fn is_terminal(self) -> bool {
        self != Self::Pending
    }
}

impl TryFrom<&str> for EntryStatus {
    type Error = EngineError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "pending" => Ok(Self::Pending),
            "approved" => Ok(Self::Approved),
            "rejected" => Ok(Self::Rejected),
            other => Err(EngineError::KeyNotFound(format!(
                "invalid entry status: {other}"
            ))),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: Uuid,
    pub account_id: i64,
    pub card_id: Option<String>,
    pub kind: EntryKind,
    /// Always positive; the direction comes from `kind`.
    pub amount: Kwh,
    pub previous_balance: Kwh,
    pub new_balance: Kwh,
    pub status: EntryStatus,
    /// Actor who created the entry (the admin for charges, the holder for usages).
    pub requested_by: i64,
    /// Actor who approved/rejected a usage; the admin for charges.
    pub processed_by: Option<i64>,
    pub photo_file_id: Option<String>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl LedgerEntry {
    /// `+amount` for charges, `-amount` for usages.
    pub fn signed_amount(&self) -> Kwh {
        signed_amount(self.kind, self.amount)
    }
}

pub(crate) fn signed_amount(kind: EntryKind, amount: Kwh) -> Kwh {
    match kind {
        EntryKind::Charge => amount,
        EntryKind::Usage => Kwh::ZERO - amount,
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "ledger_entries")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub account_id: i64,
    pub card_id: Option<String>,
    pub kind: String,
    pub amount: i64,
    pub previous_balance: i64,
    pub new_balance: i64,
    pub status: String,
    pub requested_by: i64,
    pub processed_by: Option<i64>,
    pub photo_file_id: Option<String>,
    pub notes: Option<String>,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::accounts::Entity",
        from = "Column::AccountId",
        to = "super::accounts::Column::Id"
    )]
    Account,
}

impl Related<super::accounts::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Account.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl From<&LedgerEntry> for ActiveModel {
    fn from(entry: &LedgerEntry) -> Self {
        Self {
            id: ActiveValue::Set(entry.id.to_string()),
            account_id: ActiveValue::Set(entry.account_id),
            card_id: ActiveValue::Set(entry.card_id.clone()),
            kind: ActiveValue::Set(entry.kind.as_str().to_string()),
            amount: ActiveValue::Set(entry.amount.hundredths()),
            previous_balance: ActiveValue::Set(entry.previous_balance.hundredths()),
            new_balance: ActiveValue::Set(entry.new_balance.hundredths()),
            status: ActiveValue::Set(entry.status.as_str().to_string()),
            requested_by: ActiveValue::Set(entry.requested_by),
            processed_by: ActiveValue::Set(entry.processed_by),
            photo_file_id: ActiveValue::Set(entry.photo_file_id.clone()),
            notes: ActiveValue::Set(entry.notes.clone()),
            created_at: ActiveValue::Set(entry.created_at),
            updated_at: ActiveValue::Set(entry.updated_at),
        }
    }
}

impl TryFrom<Model> for LedgerEntry {
    type Error = EngineError;

    fn try_from(model: Model) -> Result<Self, Self::Error> {
        Ok(Self {
            id: Uuid::parse_str(&model.id)
                .map_err(|_| EngineError::KeyNotFound("ledger entry not exists".to_string()))?,
            account_id: model.account_id,
            card_id: model.card_id,
            kind: EntryKind::try_from(model.kind.as_str())?,
            amount: Kwh::new(model.amount),
            previous_balance: Kwh::new(model.previous_balance),
            new_balance: Kwh::new(model.new_balance),
            status: EntryStatus::try_from(model.status.as_str())?,
            requested_by: model.requested_by,
            processed_by: model.processed_by,
            photo_file_id: model.photo_file_id,
            notes: model.notes,
            created_at: model.created_at,
            updated_at: model.updated_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signed_amount_follows_kind() {
        assert_eq!(signed_amount(EntryKind::Charge, Kwh::new(250)), Kwh::new(250));
        assert_eq!(signed_amount(EntryKind::Usage, Kwh::new(250)), Kwh::new(-250));
    }

    #[test]
    fn only_pending_is_open() {
        assert!(!EntryStatus::Pending.is_terminal());
        assert!(EntryStatus::Approved.is_terminal());
        assert!(EntryStatus::Rejected.is_terminal());
    }
}
