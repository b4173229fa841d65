use std::sync::Arc;

use migration::{Migrator, MigratorTrait};
use settings::Database;
use telegram_bot::TelegramMessenger;
use workflows::IdleReaper;

mod settings;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let settings = settings::Settings::new()?;
    let mut tasks = tokio::task::JoinSet::new();

    tracing_subscriber::fmt()
        .with_env_filter(format!(
            "kwh_manager={level},workflows={level},telegram_bot={level},engine={level}",
            level = settings.app.level
        ))
        .init();

    let Some(telegram) = settings.telegram else {
        tracing::error!("no telegram settings found, nothing to run");
        return Ok(());
    };

    let policy = settings.ledger.policy()?;
    let workflow_settings = settings.workflows.settings(telegram.admin_chat_id)?;

    let db = parse_database(&settings.database).await?;
    let engine = engine::Engine::builder()
        .database(db)
        .policy(policy)
        .build()
        .await?;
    tracing::info!(
        usage_ceiling = %policy.usage_ceiling,
        recharge_ceiling = %policy.recharge_ceiling,
        low_balance_threshold = %policy.low_balance_threshold,
        "ledger ready"
    );

    let dispatcher = workflows::Dispatcher::builder()
        .engine(Arc::new(engine))
        .messenger(Arc::new(TelegramMessenger::new(&telegram.token)))
        .settings(workflow_settings)
        .build()?;
    let dispatcher = Arc::new(dispatcher);

    let reaper = IdleReaper::new(dispatcher.clone()).spawn();

    tasks.spawn(async move {
        tracing::info!("Found telegram settings...");
        match telegram_bot::Bot::builder()
            .token(&telegram.token)
            .dispatcher(dispatcher)
            .admin_chat_id(telegram.admin_chat_id)
            .build()
        {
            Ok(bot) => bot.run().await,
            Err(err) => tracing::error!("failed to initialize telegram bot: {err}"),
        }
    });

    while tasks.join_next().await.is_some() {
        tasks.shutdown().await;
    }
    reaper.abort();

    Ok(())
}

async fn parse_database(
    config: &settings::Database,
) -> Result<sea_orm::DatabaseConnection, Box<dyn std::error::Error + Send + Sync>> {
    let url = match config {
        Database::Memory => String::from("sqlite::memory:"),
        Database::Sqlite(path) => format!("sqlite:{}?mode=rwc", path),
    };

    let database = sea_orm::Database::connect(url).await?;
    Migrator::up(&database, None).await?;
    Ok(database)
}
