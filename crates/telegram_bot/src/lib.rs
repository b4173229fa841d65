//! Telegram bot.
//!
//! The bot is a thin transport: updates become [`workflows::ActorEvent`]s
//! handed to the conversation dispatcher, replies go out through
//! [`TelegramMessenger`].

use std::sync::Arc;

use teloxide::prelude::*;

pub use messenger::TelegramMessenger;

mod commands;
mod handlers;
mod messenger;

#[derive(Clone)]
pub struct ConfigParameters {
    dispatcher: Arc<workflows::Dispatcher>,
}

pub struct Bot {
    token: String,
    dispatcher: Arc<workflows::Dispatcher>,
    admin_chat_id: Option<i64>,
}

impl Bot {
    pub fn builder() -> BotBuilder {
        BotBuilder::default()
    }

    pub async fn run(&self) {
        tracing::info!("Starting telegram bot...");

        let bot = teloxide::Bot::new(&self.token);
        if let Err(err) = commands::publish(&bot, self.admin_chat_id).await {
            tracing::warn!("failed to publish command menus: {err}");
        }

        let parameters = ConfigParameters {
            dispatcher: self.dispatcher.clone(),
        };

        let handler = dptree::entry()
            .branch(Update::filter_message().endpoint(handlers::handle_message))
            .branch(Update::filter_callback_query().endpoint(handlers::handle_callback));

        Dispatcher::builder(bot, handler)
            .dependencies(dptree::deps![parameters])
            .default_handler(|upd| async move {
                tracing::warn!("Unhandled update: {:?}", upd);
            })
            .error_handler(LoggingErrorHandler::with_custom_text(
                "An error has occurred in the dispatcher",
            ))
            .enable_ctrlc_handler()
            .build()
            .dispatch()
            .await;
    }
}

#[derive(Default)]
pub struct BotBuilder {
    token: String,
    dispatcher: Option<Arc<workflows::Dispatcher>>,
    admin_chat_id: Option<i64>,
}

impl BotBuilder {
    pub fn token(mut self, token: &str) -> BotBuilder {
        self.token = token.to_string();
        self
    }

    pub fn dispatcher(mut self, dispatcher: Arc<workflows::Dispatcher>) -> BotBuilder {
        self.dispatcher = Some(dispatcher);
        self
    }

    pub fn admin_chat_id(mut self, chat_id: Option<i64>) -> BotBuilder {
        self.admin_chat_id = chat_id;
        self
    }

    pub fn build(self) -> Result<Bot, String> {
        tracing::info!("Initializing telegram bot...");
        if self.token.is_empty() {
            return Err("telegram token is missing".to_string());
        }
        let dispatcher = self
            .dispatcher
            .ok_or_else(|| "workflow dispatcher is missing".to_string())?;
        Ok(Bot {
            token: self.token,
            dispatcher,
            admin_chat_id: self.admin_chat_id,
        })
    }
}
