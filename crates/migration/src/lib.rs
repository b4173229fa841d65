pub use sea_orm_migration::prelude::*;

mod m20261001_000000_init;

/// Database used by the operator binaries when `DATABASE_URL` is unset.
pub const DEFAULT_DATABASE_URL: &str = "sqlite:./kwh.db?mode=rwc";

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![Box::new(m20261001_000000_init::Migration)]
    }
}
