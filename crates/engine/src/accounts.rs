//! Accounts: the balance-bearing record of a registered Telegram identity.
//!
//! The primary key is the Telegram user id. `balance` is written only by the
//! ledger operations, always through a `version`-checked conditional update.

use std::fmt;

use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use crate::{EngineError, Kwh};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountStatus {
    Pending,
    Active,
    Blocked,
    Disabled,
}

impl AccountStatus {
    pub const ALL: [AccountStatus; 4] = [
        AccountStatus::Pending,
        AccountStatus::Active,
        AccountStatus::Blocked,
        AccountStatus::Disabled,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Active => "active",
            Self::Blocked => "blocked",
            Self::Disabled => "disabled",
        }
    }
}

impl fmt::Display for AccountStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for AccountStatus {
    type Error = EngineError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "pending" => Ok(Self::Pending),
            "active" => Ok(Self::Active),
            "blocked" => Ok(Self::Blocked),
            "disabled" => Ok(Self::Disabled),
            other => Err(EngineError::KeyNotFound(format!(
                "invalid account status: {other}"
            ))),
        }
    }
}

/// Domain view of an account row.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Account {
    pub id: i64,
    pub first_name: String,
    pub last_name: Option<String>,
    pub username: Option<String>,
    pub card_id: Option<String>,
    pub balance: Kwh,
    pub status: AccountStatus,
    pub is_admin: bool,
    pub invite_code_used: Option<String>,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

impl Account {
    pub fn is_active(&self) -> bool {
        self.status == AccountStatus::Active
    }

    /// "Mario Rossi", or just the first name.
    pub fn display_name(&self) -> String {
        match &self.last_name {
            Some(last) => format!("{} {last}", self.first_name),
            None => self.first_name.clone(),
        }
    }
}

/// Input for [`Engine::register_account`](crate::Engine::register_account).
#[derive(Clone, Debug, Default)]
pub struct NewAccount {
    pub id: i64,
    pub first_name: String,
    pub last_name: Option<String>,
    pub username: Option<String>,
    pub card_id: String,
    pub invite_code: Option<String>,
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "accounts")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: i64,
    pub first_name: String,
    pub last_name: Option<String>,
    pub username: Option<String>,
    pub card_id: Option<String>,
    pub balance: i64,
    pub status: String,
    pub is_admin: bool,
    pub invite_code_used: Option<String>,
    pub version: i64,
    pub created_at: DateTimeUtc,
    pub last_seen: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::ledger::Entity")]
    LedgerEntries,
}

impl Related<super::ledger::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::LedgerEntries.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl TryFrom<Model> for Account {
    type Error = EngineError;

    fn try_from(model: Model) -> Result<Self, Self::Error> {
        Ok(Self {
            id: model.id,
            first_name: model.first_name,
            last_name: model.last_name,
            username: model.username,
            card_id: model.card_id,
            balance: Kwh::new(model.balance),
            status: AccountStatus::try_from(model.status.as_str())?,
            is_admin: model.is_admin,
            invite_code_used: model.invite_code_used,
            version: model.version,
            created_at: model.created_at,
            last_seen: model.last_seen,
        })
    }
}
