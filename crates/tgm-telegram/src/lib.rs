//! Telegram adapter (teloxide).
//!
//! This crate implements the `tgm-core` messaging and membership ports over
//! the Telegram Bot API and wires the guard pipelines into a dispatcher.

use async_trait::async_trait;

use teloxide::{
    prelude::*,
    types::{
        ChatMemberKind, ChatPermissions, InlineKeyboardButton, InlineKeyboardMarkup, ParseMode,
    },
};

use tokio::time::sleep;

pub mod handlers;
pub mod router;

use tgm_core::{
    domain::{ChatId, MemberStatus, MessageId, MessageRef, UserId},
    errors::Error,
    messaging::{
        port::MessagingPort,
        types::{ButtonAction, InlineButton, InlineKeyboard},
    },
    ports::MembershipPort,
    Result,
};

/// Bot API client serving both outbound messages and chat membership calls.
#[derive(Clone)]
pub struct TelegramMessenger {
    bot: Bot,
}

impl TelegramMessenger {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }

    fn tg_chat(chat_id: ChatId) -> teloxide::types::ChatId {
        teloxide::types::ChatId(chat_id.0)
    }

    fn tg_msg_id(message_id: MessageId) -> teloxide::types::MessageId {
        teloxide::types::MessageId(message_id.0)
    }

    fn tg_user(user_id: UserId) -> Result<teloxide::types::UserId> {
        u64::try_from(user_id.0)
            .map(teloxide::types::UserId)
            .map_err(|_| Error::InvalidArgument(format!("not a Telegram user id: {user_id}")))
    }

    fn map_err(e: teloxide::RequestError) -> Error {
        Error::External(format!("telegram error: {e}"))
    }

    async fn with_retry<T, Fut>(&self, mut op: impl FnMut() -> Fut) -> Result<T>
    where
        Fut: std::future::IntoFuture<Output = std::result::Result<T, teloxide::RequestError>>,
        Fut::IntoFuture: Send,
    {
        const MAX_RETRIES: usize = 1;
        let mut attempts = 0usize;
        loop {
            match op().await {
                Ok(v) => return Ok(v),
                Err(teloxide::RequestError::RetryAfter(d)) if attempts < MAX_RETRIES => {
                    attempts += 1;
                    tracing::debug!(retry_after = ?d, "telegram rate limit, retrying");
                    sleep(d).await;
                }
                Err(other) => return Err(Self::map_err(other)),
            }
        }
    }
}

fn to_button(button: InlineButton) -> Result<InlineKeyboardButton> {
    Ok(match button.action {
        ButtonAction::Callback(data) => InlineKeyboardButton::callback(button.label, data),
        ButtonAction::Url(url) => {
            let parsed = reqwest::Url::parse(&url).map_err(|e| {
                Error::InvalidArgument(format!("invalid button url {url}: {e}"))
            })?;
            InlineKeyboardButton::url(button.label, parsed)
        }
        ButtonAction::SwitchInlineQuery(query) => {
            InlineKeyboardButton::switch_inline_query(button.label, query)
        }
    })
}

pub(crate) fn to_markup(keyboard: InlineKeyboard) -> Result<InlineKeyboardMarkup> {
    let rows = keyboard
        .rows
        .into_iter()
        .filter(|r| !r.is_empty())
        .map(|r| r.into_iter().map(to_button).collect::<Result<Vec<_>>>())
        .collect::<Result<Vec<_>>>()?;
    Ok(InlineKeyboardMarkup::new(rows))
}

pub(crate) fn member_status(kind: &ChatMemberKind) -> MemberStatus {
    match kind {
        ChatMemberKind::Owner(_) => MemberStatus::Creator,
        ChatMemberKind::Administrator(_) => MemberStatus::Administrator,
        ChatMemberKind::Member => MemberStatus::Member,
        ChatMemberKind::Restricted(_) => MemberStatus::Restricted,
        ChatMemberKind::Left => MemberStatus::Left,
        ChatMemberKind::Banned(_) => MemberStatus::Banned,
    }
}

#[async_trait]
impl MessagingPort for TelegramMessenger {
    async fn send_html(&self, chat_id: ChatId, html: &str) -> Result<MessageRef> {
        let msg = self
            .with_retry(|| {
                self.bot
                    .send_message(Self::tg_chat(chat_id), html.to_string())
                    .parse_mode(ParseMode::Html)
            })
            .await?;

        Ok(MessageRef {
            chat_id,
            message_id: MessageId(msg.id.0),
        })
    }

    async fn edit_html(&self, msg: MessageRef, html: &str) -> Result<()> {
        self.with_retry(|| {
            self.bot
                .edit_message_text(
                    Self::tg_chat(msg.chat_id),
                    Self::tg_msg_id(msg.message_id),
                    html.to_string(),
                )
                .parse_mode(ParseMode::Html)
        })
        .await?;
        Ok(())
    }

    async fn delete_message(&self, msg: MessageRef) -> Result<()> {
        self.with_retry(|| {
            self.bot
                .delete_message(Self::tg_chat(msg.chat_id), Self::tg_msg_id(msg.message_id))
        })
        .await?;
        Ok(())
    }

    async fn send_inline_keyboard(
        &self,
        chat_id: ChatId,
        html: &str,
        keyboard: InlineKeyboard,
    ) -> Result<MessageRef> {
        let markup = to_markup(keyboard)?;

        let msg = self
            .with_retry(|| {
                self.bot
                    .send_message(Self::tg_chat(chat_id), html.to_string())
                    .parse_mode(ParseMode::Html)
                    .reply_markup(markup.clone())
            })
            .await?;

        Ok(MessageRef {
            chat_id,
            message_id: MessageId(msg.id.0),
        })
    }

    async fn edit_inline_keyboard(
        &self,
        msg: MessageRef,
        html: &str,
        keyboard: InlineKeyboard,
    ) -> Result<()> {
        let markup = to_markup(keyboard)?;

        self.with_retry(|| {
            self.bot
                .edit_message_text(
                    Self::tg_chat(msg.chat_id),
                    Self::tg_msg_id(msg.message_id),
                    html.to_string(),
                )
                .parse_mode(ParseMode::Html)
                .reply_markup(markup.clone())
        })
        .await?;
        Ok(())
    }

    async fn answer_callback_query(&self, callback_id: &str, text: Option<&str>) -> Result<()> {
        self.with_retry(|| {
            let mut req = self.bot.answer_callback_query(callback_id.to_string());
            if let Some(t) = text {
                req = req.text(t.to_string());
            }
            req
        })
        .await?;
        Ok(())
    }
}

#[async_trait]
impl MembershipPort for TelegramMessenger {
    async fn member_status(&self, chat_id: ChatId, user_id: UserId) -> Result<MemberStatus> {
        let user = Self::tg_user(user_id)?;
        let member = self
            .with_retry(|| self.bot.get_chat_member(Self::tg_chat(chat_id), user))
            .await?;
        Ok(member_status(&member.kind))
    }

    async fn kick_member(&self, chat_id: ChatId, user_id: UserId) -> Result<()> {
        let user = Self::tg_user(user_id)?;
        self.with_retry(|| self.bot.ban_chat_member(Self::tg_chat(chat_id), user))
            .await?;
        // Lift the ban right away so the user may rejoin.
        self.with_retry(|| {
            self.bot
                .unban_chat_member(Self::tg_chat(chat_id), user)
                .only_if_banned(true)
        })
        .await?;
        Ok(())
    }

    async fn mute_member(&self, chat_id: ChatId, user_id: UserId) -> Result<()> {
        let user = Self::tg_user(user_id)?;
        self.with_retry(|| {
            self.bot
                .restrict_chat_member(Self::tg_chat(chat_id), user, ChatPermissions::empty())
        })
        .await?;
        Ok(())
    }
}
