use sea_orm::DatabaseConnection;

use crate::{LedgerPolicy, ResultEngine};

mod accounts;
mod approvals;
mod invites;
mod ledger;
mod stats;

pub use approvals::ApprovalOutcome;
pub use ledger::{HistoryQuery, RequestUsage};
pub use stats::{AccountStats, AccountTotals};

/// Run a block inside a DB transaction, committing on success and rolling back on error.
///
/// Evaluates to the block's result. Errors raised inside the block or by the
/// commit come back as the value instead of returning from the caller, so
/// retry loops can inspect them.
macro_rules! with_tx {
    ($self:expr, |$tx:ident| $body:expr) => {
        async {
            let $tx = $self.database.begin().await?;
            let result: $crate::ResultEngine<_> = $body;
            let value = result?;
            $tx.commit().await?;
            Ok::<_, $crate::EngineError>(value)
        }
        .await
    };
}

pub(crate) use with_tx;

#[derive(Debug)]
pub struct Engine {
    database: DatabaseConnection,
    policy: LedgerPolicy,
}

impl Engine {
    /// Return a builder for `Engine`. Help to build the struct.
    pub fn builder() -> EngineBuilder {
        EngineBuilder::default()
    }

    pub fn policy(&self) -> &LedgerPolicy {
        &self.policy
    }
}

/// The builder for `Engine`
#[derive(Default)]
pub struct EngineBuilder {
    database: DatabaseConnection,
    policy: LedgerPolicy,
}

impl EngineBuilder {
    /// Pass the required database
    pub fn database(mut self, db: DatabaseConnection) -> EngineBuilder {
        self.database = db;
        self
    }

    /// Override the default ceilings and thresholds.
    pub fn policy(mut self, policy: LedgerPolicy) -> EngineBuilder {
        self.policy = policy;
        self
    }

    /// Construct `Engine`
    pub async fn build(self) -> ResultEngine<Engine> {
        Ok(Engine {
            database: self.database,
            policy: self.policy,
        })
    }
}
