//! [`Messenger`] on top of the Telegram Bot API.

use async_trait::async_trait;
use teloxide::{
    RequestError,
    prelude::*,
    types::{
        CallbackQueryId, FileId, InlineKeyboardButton, InlineKeyboardMarkup, InputFile,
        KeyboardButton, KeyboardMarkup, KeyboardRemove, ReplyMarkup,
    },
};
use workflows::{Document, Keyboard, Messenger, MessengerError, OutboundMessage};

#[derive(Clone)]
pub struct TelegramMessenger {
    bot: Bot,
}

impl TelegramMessenger {
    pub fn new(token: &str) -> Self {
        Self {
            bot: Bot::new(token),
        }
    }
}

fn delivery(chat_id: i64, err: RequestError) -> MessengerError {
    MessengerError::Delivery {
        chat_id,
        reason: err.to_string(),
    }
}

fn reply_markup(keyboard: Keyboard) -> Option<ReplyMarkup> {
    match keyboard {
        Keyboard::None => None,
        Keyboard::Inline(rows) => Some(
            InlineKeyboardMarkup::new(rows.into_iter().map(|row| {
                row.into_iter()
                    .map(|button| InlineKeyboardButton::callback(button.text, button.data))
                    .collect::<Vec<_>>()
            }))
            .into(),
        ),
        Keyboard::Reply(rows) => Some(
            KeyboardMarkup::new(
                rows.into_iter()
                    .map(|row| row.into_iter().map(KeyboardButton::new).collect::<Vec<_>>()),
            )
            .resize_keyboard()
            .one_time_keyboard()
            .into(),
        ),
        Keyboard::Remove => Some(KeyboardRemove::new().into()),
    }
}

#[async_trait]
impl Messenger for TelegramMessenger {
    async fn send_text(
        &self,
        chat_id: i64,
        message: OutboundMessage,
    ) -> Result<(), MessengerError> {
        let request = self.bot.send_message(ChatId(chat_id), message.text);
        let sent = match reply_markup(message.keyboard) {
            Some(markup) => request.reply_markup(markup).await,
            None => request.await,
        };
        sent.map(|_| ()).map_err(|err| delivery(chat_id, err))
    }

    async fn send_document(&self, chat_id: i64, document: Document) -> Result<(), MessengerError> {
        let file = InputFile::memory(document.content).file_name(document.file_name);
        let request = self.bot.send_document(ChatId(chat_id), file);
        let sent = match document.caption {
            Some(caption) => request.caption(caption).await,
            None => request.await,
        };
        sent.map(|_| ()).map_err(|err| delivery(chat_id, err))
    }

    async fn send_photo(
        &self,
        chat_id: i64,
        file_id: &str,
        caption: Option<&str>,
    ) -> Result<(), MessengerError> {
        let file = InputFile::file_id(FileId(file_id.to_string()));
        let request = self.bot.send_photo(ChatId(chat_id), file);
        let sent = match caption {
            Some(caption) => request.caption(caption).await,
            None => request.await,
        };
        sent.map(|_| ()).map_err(|err| delivery(chat_id, err))
    }

    async fn answer_button(
        &self,
        callback_id: &str,
        text: Option<&str>,
    ) -> Result<(), MessengerError> {
        let request = self
            .bot
            .answer_callback_query(CallbackQueryId(callback_id.to_string()));
        let answered = match text {
            Some(text) => request.text(text).await,
            None => request.await,
        };
        answered
            .map(|_| ())
            .map_err(|err| MessengerError::Acknowledge(err.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use workflows::Button;

    use super::*;

    #[test]
    fn keyboards_map_onto_telegram_markup() {
        assert!(reply_markup(Keyboard::None).is_none());
        assert!(matches!(
            reply_markup(Keyboard::Remove),
            Some(ReplyMarkup::KeyboardRemove(_))
        ));

        let inline = reply_markup(Keyboard::Inline(vec![vec![
            Button::new("✅ Conferma", "confirm_recharge_1"),
            Button::new("❌ Annulla", "cancel_recharge_1"),
        ]]));
        match inline {
            Some(ReplyMarkup::InlineKeyboard(markup)) => {
                assert_eq!(markup.inline_keyboard.len(), 1);
                assert_eq!(markup.inline_keyboard[0].len(), 2);
            }
            _ => panic!("expected an inline keyboard"),
        }

        let reply = reply_markup(Keyboard::Reply(vec![vec!["❌ Annulla".to_string()]]));
        match reply {
            Some(ReplyMarkup::Keyboard(markup)) => {
                assert_eq!(markup.keyboard[0][0].text, "❌ Annulla");
            }
            _ => panic!("expected a reply keyboard"),
        }
    }
}
