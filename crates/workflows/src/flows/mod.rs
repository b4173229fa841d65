//! The step handlers of every workflow kind, as `impl Dispatcher` blocks.

mod admin;
mod approvals;
mod commands;
mod history;
mod invite;
mod low_balance;
mod recharge;
mod registration;
mod usage;
