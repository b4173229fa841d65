//! The module contains the error the engine can throw.
//!
//! Every variant belongs to one [`ErrorClass`], which is what callers at the
//! conversation boundary use to decide how to answer:
//!
//! - [`InvalidAmount`] / [`AmountTooLarge`] / [`InsufficientFunds`] /
//!   [`InvalidInvite`] / [`ExistingKey`] are validation failures.
//! - [`KeyNotFound`] / [`AlreadyProcessed`] / [`Conflict`] mean the referenced
//!   record is gone or already moved on.
//! - [`AccountNotActive`] carries the status that forbids the operation.
//! - [`Database`] wraps storage failures.
//!
//!  [`InvalidAmount`]: EngineError::InvalidAmount
//!  [`AmountTooLarge`]: EngineError::AmountTooLarge
//!  [`InsufficientFunds`]: EngineError::InsufficientFunds
//!  [`InvalidInvite`]: EngineError::InvalidInvite
//!  [`ExistingKey`]: EngineError::ExistingKey
//!  [`KeyNotFound`]: EngineError::KeyNotFound
//!  [`AlreadyProcessed`]: EngineError::AlreadyProcessed
//!  [`Conflict`]: EngineError::Conflict
//!  [`AccountNotActive`]: EngineError::AccountNotActive
//!  [`Database`]: EngineError::Database
use sea_orm::DbErr;
use thiserror::Error;

use crate::{AccountStatus, Kwh};

/// Engine custom errors.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),
    #[error("Amount exceeds the ceiling of {0}")]
    AmountTooLarge(Kwh),
    #[error("Insufficient funds: balance {balance}, requested {requested}")]
    InsufficientFunds { balance: Kwh, requested: Kwh },
    #[error("Account is {0}")]
    AccountNotActive(AccountStatus),
    #[error("\"{0}\" key not found!")]
    KeyNotFound(String),
    #[error("\"{0}\" already present!")]
    ExistingKey(String),
    #[error("Invalid invite code: {0}")]
    InvalidInvite(String),
    #[error("Entry {0} was already processed")]
    AlreadyProcessed(String),
    #[error("Concurrent update on account {0}, retries exhausted")]
    Conflict(i64),
    #[error(transparent)]
    Database(#[from] DbErr),
}

/// Coarse classification of [`EngineError`] used at the step boundary.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorClass {
    /// Malformed or out-of-range input. The caller may re-prompt.
    Validation,
    /// The referenced record no longer exists or is in the wrong state.
    State,
    /// The account status forbids the operation.
    AccountStatus,
    /// Storage failure.
    Persistence,
}

impl EngineError {
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::InvalidAmount(_)
            | Self::AmountTooLarge(_)
            | Self::InsufficientFunds { .. }
            | Self::ExistingKey(_)
            | Self::InvalidInvite(_) => ErrorClass::Validation,
            Self::KeyNotFound(_) | Self::AlreadyProcessed(_) | Self::Conflict(_) => {
                ErrorClass::State
            }
            Self::AccountNotActive(_) => ErrorClass::AccountStatus,
            Self::Database(_) => ErrorClass::Persistence,
        }
    }

    /// SQLite refused a lock because another connection is writing. The
    /// transaction was rolled back and can be run again.
    pub fn is_busy(&self) -> bool {
        match self {
            Self::Database(err) => {
                let message = err.to_string();
                message.contains("database is locked") || message.contains("database table is locked")
            }
            _ => false,
        }
    }
}

impl PartialEq for EngineError {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::InvalidAmount(a), Self::InvalidAmount(b)) => a == b,
            (Self::AmountTooLarge(a), Self::AmountTooLarge(b)) => a == b,
            (
                Self::InsufficientFunds {
                    balance: a,
                    requested: x,
                },
                Self::InsufficientFunds {
                    balance: b,
                    requested: y,
                },
            ) => a == b && x == y,
            (Self::AccountNotActive(a), Self::AccountNotActive(b)) => a == b,
            (Self::KeyNotFound(a), Self::KeyNotFound(b)) => a == b,
            (Self::ExistingKey(a), Self::ExistingKey(b)) => a == b,
            (Self::InvalidInvite(a), Self::InvalidInvite(b)) => a == b,
            (Self::AlreadyProcessed(a), Self::AlreadyProcessed(b)) => a == b,
            (Self::Conflict(a), Self::Conflict(b)) => a == b,
            (Self::Database(a), Self::Database(b)) => a.to_string() == b.to_string(),
            _ => false,
        }
    }
}
