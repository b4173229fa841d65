use teloxide::{
    prelude::*,
    types::{CallbackQuery, User},
};
use workflows::{ActorEvent, Profile};

use crate::ConfigParameters;

pub(crate) async fn handle_message(msg: Message, cfg: ConfigParameters) -> ResponseResult<()> {
    let Some(from) = msg.from.as_ref() else {
        return Ok(());
    };
    let Some(actor_id) = actor_id(from) else {
        tracing::warn!("telegram user id {} out of range", from.id.0);
        return Ok(());
    };

    let event = if let Some(text) = msg.text() {
        // Group chats (the admin chat) only talk to the bot through commands.
        if !msg.chat.is_private() && !text.starts_with('/') {
            return Ok(());
        }
        ActorEvent::text(actor_id, profile(from), text)
    } else if let Some(sizes) = msg.photo() {
        if !msg.chat.is_private() {
            return Ok(());
        }
        let Some(largest) = sizes.iter().max_by_key(|size| size.width * size.height) else {
            return Ok(());
        };
        ActorEvent::photo(actor_id, profile(from), largest.file.id.to_string())
    } else {
        return Ok(());
    };

    let outcome = cfg.dispatcher.dispatch(event).await;
    tracing::debug!(actor_id, ?outcome, "message dispatched");
    Ok(())
}

pub(crate) async fn handle_callback(q: CallbackQuery, cfg: ConfigParameters) -> ResponseResult<()> {
    let Some(actor_id) = actor_id(&q.from) else {
        tracing::warn!("telegram user id {} out of range", q.from.id.0);
        return Ok(());
    };
    let Some(data) = q.data.as_deref() else {
        return Ok(());
    };

    let event = ActorEvent::button(actor_id, profile(&q.from), q.id.to_string(), data);
    let outcome = cfg.dispatcher.dispatch(event).await;
    tracing::debug!(actor_id, ?outcome, "button dispatched");
    Ok(())
}

fn actor_id(user: &User) -> Option<i64> {
    i64::try_from(user.id.0).ok()
}

fn profile(user: &User) -> Profile {
    Profile {
        first_name: user.first_name.clone(),
        last_name: user.last_name.clone(),
        username: user.username.clone(),
    }
}
