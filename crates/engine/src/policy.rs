use crate::Kwh;

/// Limits applied by the ledger operations.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LedgerPolicy {
    /// Largest single usage request.
    pub usage_ceiling: Kwh,
    /// Largest single recharge.
    pub recharge_ceiling: Kwh,
    /// Balances strictly below this trigger a warning.
    pub low_balance_threshold: Kwh,
    pub invite_expiry_days: i64,
    /// Attempts for a version-checked balance write before giving up.
    pub max_retries: u32,
}

impl Default for LedgerPolicy {
    fn default() -> Self {
        Self {
            usage_ceiling: Kwh::whole(10_000),
            recharge_ceiling: Kwh::whole(10_000),
            low_balance_threshold: Kwh::whole(20),
            invite_expiry_days: 7,
            max_retries: 3,
        }
    }
}

impl LedgerPolicy {
    pub fn is_low(&self, balance: Kwh) -> bool {
        balance < self.low_balance_threshold
    }
}
