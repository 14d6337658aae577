//! Telegram update handlers.
//!
//! The teloxide endpoints only translate updates into plain requests; the
//! command and callback logic runs against the ports held by [`AppState`].

use std::sync::Arc;

use teloxide::{
    prelude::*,
    types::{CallbackQuery, Message},
};

use tgm_core::domain::{Caller, Chat, ChatKind, MessageId};

use crate::router::AppState;

mod callback;
mod commands;

/// A slash command as received in a chat.
#[derive(Clone, Debug)]
pub(crate) struct CommandRequest {
    pub caller: Option<Caller>,
    pub chat: Chat,
    pub message_id: MessageId,
    pub text: String,
    pub reply: Option<RepliedMessage>,
}

/// The message a command was sent in reply to.
#[derive(Clone, Debug)]
pub(crate) struct RepliedMessage {
    pub message_id: MessageId,
    pub author: Option<Caller>,
}

/// A button press on one of the bot's inline keyboards.
#[derive(Clone, Debug)]
pub(crate) struct CallbackRequest {
    pub id: String,
    pub caller: Caller,
    pub data: String,
    /// Chat and message carrying the keyboard; absent for inline-mode messages.
    pub origin: Option<(Chat, MessageId)>,
}

/// `None` when the Telegram id does not fit the signed id space.
pub(crate) fn caller_of(user: &teloxide::types::User) -> Option<Caller> {
    caller_from_parts(user.id.0, user.username.clone())
}

fn caller_from_parts(id: u64, username: Option<String>) -> Option<Caller> {
    let id = i64::try_from(id).ok()?;
    Some(Caller::new(id, username))
}

pub(crate) fn chat_of(chat: &teloxide::types::Chat) -> Chat {
    let kind = if chat.is_group() {
        ChatKind::Group
    } else if chat.is_supergroup() {
        ChatKind::Supergroup
    } else if chat.is_channel() {
        ChatKind::Channel
    } else {
        ChatKind::Private
    };
    Chat::new(chat.id.0, kind)
}

pub async fn handle_callback(q: CallbackQuery, state: Arc<AppState>) -> ResponseResult<()> {
    let Some(caller) = caller_of(&q.from) else {
        tracing::warn!(
            user_id = q.from.id.0,
            "callback from an out-of-range user id"
        );
        callback::answer(&state, &q.id, None).await;
        return Ok(());
    };
    let req = CallbackRequest {
        id: q.id.clone(),
        caller,
        data: q.data.clone().unwrap_or_default(),
        origin: q
            .message
            .as_ref()
            .map(|m| (chat_of(&m.chat), MessageId(m.id.0))),
    };
    callback::handle_callback(&state, req).await;
    Ok(())
}

pub async fn handle_message(msg: Message, state: Arc<AppState>) -> ResponseResult<()> {
    let Some(text) = msg.text() else {
        return Ok(());
    };
    if !text.starts_with('/') {
        return Ok(());
    }

    let req = CommandRequest {
        caller: msg.from().and_then(caller_of),
        chat: chat_of(&msg.chat),
        message_id: MessageId(msg.id.0),
        text: text.to_string(),
        reply: msg.reply_to_message().map(|r| RepliedMessage {
            message_id: MessageId(r.id.0),
            author: r.from().and_then(caller_of),
        }),
    };
    commands::handle_command(&state, req).await;
    Ok(())
}
