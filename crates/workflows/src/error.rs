//! Errors raised inside a workflow step.
//!
//! None of them escapes [`Dispatcher::dispatch`](crate::Dispatcher::dispatch):
//! each is turned into a reply there, and persistence or delivery failures
//! are logged under a short correlation code that the actor also sees.

use chrono::{DateTime, Utc};
use engine::{AccountStatus, EngineError, ErrorClass};
use thiserror::Error;

use crate::MessengerError;

#[derive(Debug, Error)]
pub enum FlowError {
    /// Malformed input; the message is the re-prompt and the slot survives.
    #[error("{0}")]
    Validation(String),
    /// The referenced slot or record is gone or already moved on.
    #[error("{0}")]
    State(String),
    #[error("account is {0}")]
    AccountStatus(AccountStatus),
    #[error("admin only")]
    Forbidden,
    #[error(transparent)]
    Engine(EngineError),
    #[error(transparent)]
    Messenger(#[from] MessengerError),
    /// A CSV export could not be produced.
    #[error("export failed: {0}")]
    Export(String),
}

impl From<EngineError> for FlowError {
    fn from(err: EngineError) -> Self {
        match (err.class(), err) {
            (ErrorClass::AccountStatus, EngineError::AccountNotActive(status)) => {
                Self::AccountStatus(status)
            }
            (_, err) => Self::Engine(err),
        }
    }
}

impl From<csv::Error> for FlowError {
    fn from(err: csv::Error) -> Self {
        Self::Export(err.to_string())
    }
}

impl FlowError {
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::Validation(_) => ErrorClass::Validation,
            Self::State(_) => ErrorClass::State,
            Self::AccountStatus(_) | Self::Forbidden => ErrorClass::AccountStatus,
            Self::Engine(err) => err.class(),
            Self::Messenger(_) | Self::Export(_) => ErrorClass::Persistence,
        }
    }

    /// Whether the failure is logged with a correlation code.
    pub fn needs_code(&self) -> bool {
        self.class() == ErrorClass::Persistence
    }
}

/// `E` followed by six base-36 digits of the millisecond timestamp.
pub fn correlation_code(now: DateTime<Utc>) -> String {
    const DIGITS: &[u8; 36] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";
    let mut value = now.timestamp_millis().unsigned_abs() % 36u64.pow(6);
    let mut code = [b'0'; 6];
    for slot in code.iter_mut().rev() {
        *slot = DIGITS[(value % 36) as usize];
        value /= 36;
    }
    let mut out = String::with_capacity(7);
    out.push('E');
    out.extend(code.iter().map(|b| char::from(*b)));
    out
}
