use async_trait::async_trait;

use crate::{
    domain::{ChatId, MemberStatus, UserId},
    Result,
};

/// Chat membership operations backed by the messenger's remote API.
///
/// Lookups are failable network calls; guards branch on the `Result` instead
/// of letting errors escape.
#[async_trait]
pub trait MembershipPort: Send + Sync {
    async fn member_status(&self, chat_id: ChatId, user_id: UserId) -> Result<MemberStatus>;

    /// Remove a member from the chat without a permanent ban.
    async fn kick_member(&self, chat_id: ChatId, user_id: UserId) -> Result<()>;

    /// Revoke a member's right to send messages.
    async fn mute_member(&self, chat_id: ChatId, user_id: UserId) -> Result<()>;
}
