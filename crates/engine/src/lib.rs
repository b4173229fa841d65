//! Persistence-backed domain for the kWh manager: accounts, the balance
//! ledger with its approval protocol, and registration invites.

pub use accounts::{Account, AccountStatus, NewAccount};
pub use error::{EngineError, ErrorClass};
pub use invites::{INVITE_CODE_LEN, Invite, generate_code};
pub use ledger::{EntryKind, EntryStatus, LedgerEntry};
pub use ops::{
    AccountStats, AccountTotals, ApprovalOutcome, Engine, EngineBuilder, HistoryQuery, RequestUsage,
};
pub use policy::LedgerPolicy;
pub use quantity::Kwh;
pub use util::{sanitize_card_id, sanitize_invite_code};

mod accounts;
mod error;
mod invites;
mod ledger;
mod ops;
mod policy;
mod quantity;
mod util;

type ResultEngine<T> = Result<T, EngineError>;
