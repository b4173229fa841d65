//! Initial schema.
//!
//! - `accounts`: one row per registered Telegram identity, carrying the kWh
//!   balance and the optimistic-concurrency `version`
//! - `ledger_entries`: charge/usage records with their approval status
//! - `invites`: single-use registration codes

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

// ─────────────────────────────────────────────────────────────────────────────
// Table identifiers
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Iden)]
enum Accounts {
    Table,
    Id,
    FirstName,
    LastName,
    Username,
    CardId,
    Balance,
    Status,
    IsAdmin,
    InviteCodeUsed,
    Version,
    CreatedAt,
    LastSeen,
}

#[derive(Iden)]
enum LedgerEntries {
    Table,
    Id,
    AccountId,
    CardId,
    Kind,
    Amount,
    PreviousBalance,
    NewBalance,
    Status,
    RequestedBy,
    ProcessedBy,
    PhotoFileId,
    Notes,
    CreatedAt,
    UpdatedAt,
}

#[derive(Iden)]
enum Invites {
    Table,
    Code,
    CreatedBy,
    Notes,
    IsActive,
    UsedBy,
    UsedAt,
    ExpiresAt,
    CreatedAt,
}

// ─────────────────────────────────────────────────────────────────────────────
// Migration implementation
// ─────────────────────────────────────────────────────────────────────────────

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // ───────────────────────────────────────────────────────────────────
        // 1. Accounts
        // ───────────────────────────────────────────────────────────────────
        manager
            .create_table(
                Table::create()
                    .table(Accounts::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Accounts::Id)
                            .big_integer()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Accounts::FirstName).string().not_null())
                    .col(ColumnDef::new(Accounts::LastName).string())
                    .col(ColumnDef::new(Accounts::Username).string())
                    .col(ColumnDef::new(Accounts::CardId).string())
                    .col(
                        ColumnDef::new(Accounts::Balance)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(Accounts::Status)
                            .string()
                            .not_null()
                            .default("pending"),
                    )
                    .col(
                        ColumnDef::new(Accounts::IsAdmin)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(ColumnDef::new(Accounts::InviteCodeUsed).string())
                    .col(
                        ColumnDef::new(Accounts::Version)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(Accounts::CreatedAt).timestamp().not_null())
                    .col(ColumnDef::new(Accounts::LastSeen).timestamp().not_null())
                    .to_owned(),
            )
            .await?;

        // SQLite treats NULLs as distinct, so accounts without a card coexist.
        manager
            .create_index(
                Index::create()
                    .name("idx-accounts-card_id-unique")
                    .table(Accounts::Table)
                    .col(Accounts::CardId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx-accounts-username")
                    .table(Accounts::Table)
                    .col(Accounts::Username)
                    .to_owned(),
            )
            .await?;

        // ───────────────────────────────────────────────────────────────────
        // 2. Ledger entries
        // ───────────────────────────────────────────────────────────────────
        manager
            .create_table(
                Table::create()
                    .table(LedgerEntries::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(LedgerEntries::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(LedgerEntries::AccountId)
                            .big_integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(LedgerEntries::CardId).string())
                    .col(ColumnDef::new(LedgerEntries::Kind).string().not_null())
                    .col(ColumnDef::new(LedgerEntries::Amount).big_integer().not_null())
                    .col(
                        ColumnDef::new(LedgerEntries::PreviousBalance)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(LedgerEntries::NewBalance)
                            .big_integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(LedgerEntries::Status).string().not_null())
                    .col(
                        ColumnDef::new(LedgerEntries::RequestedBy)
                            .big_integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(LedgerEntries::ProcessedBy).big_integer())
                    .col(ColumnDef::new(LedgerEntries::PhotoFileId).string())
                    .col(ColumnDef::new(LedgerEntries::Notes).string())
                    .col(
                        ColumnDef::new(LedgerEntries::CreatedAt)
                            .timestamp()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(LedgerEntries::UpdatedAt)
                            .timestamp()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx-ledger_entries-account_id-created_at")
                    .table(LedgerEntries::Table)
                    .col(LedgerEntries::AccountId)
                    .col(LedgerEntries::CreatedAt)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx-ledger_entries-kind-status-created_at")
                    .table(LedgerEntries::Table)
                    .col(LedgerEntries::Kind)
                    .col(LedgerEntries::Status)
                    .col(LedgerEntries::CreatedAt)
                    .to_owned(),
            )
            .await?;

        // ───────────────────────────────────────────────────────────────────
        // 3. Invites
        // ───────────────────────────────────────────────────────────────────
        manager
            .create_table(
                Table::create()
                    .table(Invites::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Invites::Code)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Invites::CreatedBy).big_integer().not_null())
                    .col(ColumnDef::new(Invites::Notes).string())
                    .col(
                        ColumnDef::new(Invites::IsActive)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(ColumnDef::new(Invites::UsedBy).big_integer())
                    .col(ColumnDef::new(Invites::UsedAt).timestamp())
                    .col(ColumnDef::new(Invites::ExpiresAt).timestamp().not_null())
                    .col(ColumnDef::new(Invites::CreatedAt).timestamp().not_null())
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Drop in reverse order of creation (respecting FK dependencies)
        manager
            .drop_table(Table::drop().table(Invites::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(LedgerEntries::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Accounts::Table).to_owned())
            .await?;
        Ok(())
    }
}
