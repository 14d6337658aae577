use async_trait::async_trait;

use super::{Decision, DenialReason, Guard, GuardContext, IdentityCheck};
use crate::domain::{MemberStatus, UserId};

/// Requires the caller to be creator or administrator of the current chat.
#[derive(Clone, Copy, Debug, Default)]
pub struct Admin;

#[async_trait]
impl Guard for Admin {
    fn name(&self) -> &'static str {
        "admin"
    }

    async fn evaluate(&self, ctx: &mut GuardContext<'_>) -> Decision {
        let (Some(caller), Some(chat)) = (ctx.caller, ctx.chat) else {
            return Decision::Deny(DenialReason::MissingIdentity(IdentityCheck::Admin));
        };

        match ctx.members.member_status(chat.id, caller.id).await {
            Ok(status) if status.is_admin() => Decision::Allow,
            Ok(_) => Decision::Deny(DenialReason::NotAdmin),
            Err(e) => {
                tracing::error!(error = %e, chat_id = chat.id.0, "error checking admin status");
                Decision::Deny(DenialReason::AdminLookupFailed(e.to_string()))
            }
        }
    }
}

/// Like [`Admin`], but only in group or supergroup chats. The chat kind is
/// checked before any remote lookup.
#[derive(Clone, Copy, Debug, Default)]
pub struct GroupAdmin;

#[async_trait]
impl Guard for GroupAdmin {
    fn name(&self) -> &'static str {
        "group_admin"
    }

    async fn evaluate(&self, ctx: &mut GuardContext<'_>) -> Decision {
        let (Some(caller), Some(chat)) = (ctx.caller, ctx.chat) else {
            return Decision::Deny(DenialReason::MissingIdentity(IdentityCheck::GroupAdmin));
        };

        if !chat.kind.is_group() {
            return Decision::Deny(DenialReason::NotGroupChat(chat.kind));
        }

        match ctx.members.member_status(chat.id, caller.id).await {
            Ok(status) if status.is_admin() => Decision::Allow,
            Ok(_) => Decision::Deny(DenialReason::NotGroupAdmin),
            Err(e) => {
                tracing::error!(error = %e, chat_id = chat.id.0, "error verifying group admin");
                Decision::Deny(DenialReason::AdminLookupFailed(e.to_string()))
            }
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum OwnerSource {
    Fixed(UserId),
    ChatCreator,
    Unconfigured,
}

/// Requires the caller to be a fixed owner, or the creator of the current
/// chat.
#[derive(Clone, Copy, Debug)]
pub struct Owner {
    source: OwnerSource,
}

impl Owner {
    pub fn fixed(owner_id: UserId) -> Self {
        Self {
            source: OwnerSource::Fixed(owner_id),
        }
    }

    /// Chat-scoped ownership. Only fit for actions whose effect stays inside
    /// the chat, since anyone can create a group of their own.
    pub fn chat_creator() -> Self {
        Self {
            source: OwnerSource::ChatCreator,
        }
    }

    /// The configured owner; denies everyone when none is configured.
    pub fn configured(owner_id: Option<UserId>) -> Self {
        Self {
            source: owner_id.map_or(OwnerSource::Unconfigured, OwnerSource::Fixed),
        }
    }
}

#[async_trait]
impl Guard for Owner {
    fn name(&self) -> &'static str {
        "owner"
    }

    async fn evaluate(&self, ctx: &mut GuardContext<'_>) -> Decision {
        let Some(caller) = ctx.caller else {
            return Decision::Deny(DenialReason::MissingIdentity(IdentityCheck::Ownership));
        };

        match self.source {
            OwnerSource::Fixed(owner_id) if caller.id == owner_id => return Decision::Allow,
            OwnerSource::Fixed(_) => return Decision::Deny(DenialReason::NotOwner),
            OwnerSource::Unconfigured => {
                tracing::warn!(
                    user_id = caller.id.0,
                    "owner-only action with no owner configured"
                );
                return Decision::Deny(DenialReason::NotOwner);
            }
            OwnerSource::ChatCreator => {}
        }

        let Some(chat) = ctx.chat else {
            return Decision::Deny(DenialReason::MissingIdentity(IdentityCheck::Ownership));
        };

        match ctx.members.member_status(chat.id, caller.id).await {
            Ok(MemberStatus::Creator) => Decision::Allow,
            Ok(_) => Decision::Deny(DenialReason::NotCreator),
            Err(e) => {
                tracing::error!(error = %e, chat_id = chat.id.0, "error verifying group creator");
                Decision::Deny(DenialReason::OwnershipLookupFailed(e.to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        domain::{Caller, Chat, ChatKind},
        guards::{testing::*, Pipeline},
    };

    #[tokio::test]
    async fn admin_accepts_creator_and_administrator_only() {
        let caller = Caller::new(1, None);
        let chat = Chat::new(-7, ChatKind::Group);
        let pipeline = Pipeline::new().with(Admin);
        for (status, ok) in [
            (MemberStatus::Creator, true),
            (MemberStatus::Administrator, true),
            (MemberStatus::Member, false),
            (MemberStatus::Restricted, false),
            (MemberStatus::Left, false),
            (MemberStatus::Banned, false),
        ] {
            let runner = runner(Arc::new(FakeMembers::with(-7, 1, status)));
            let res = check(&runner, &pipeline, Some(&caller), Some(&chat)).await;
            assert_eq!(res.is_ok(), ok, "{status:?}");
            if let Err(d) = res {
                assert_eq!(d.reason, DenialReason::NotAdmin);
            }
        }
    }

    #[tokio::test]
    async fn lookup_failure_becomes_generic_denial() {
        let caller = Caller::new(1, None);
        let chat = Chat::new(-7, ChatKind::Supergroup);
        let runner = runner(Arc::new(FakeMembers::failing()));

        for pipeline in [
            Pipeline::new().with(Admin),
            Pipeline::new().with(GroupAdmin),
        ] {
            let denial = check(&runner, &pipeline, Some(&caller), Some(&chat))
                .await
                .unwrap_err();
            assert!(matches!(denial.reason, DenialReason::AdminLookupFailed(_)));
            assert_eq!(denial.message(), "❌ Error verifying admin status.");
        }

        let pipeline = Pipeline::new().with(Owner::chat_creator());
        let denial = check(&runner, &pipeline, Some(&caller), Some(&chat))
            .await
            .unwrap_err();
        assert_eq!(denial.message(), "❌ Error verifying ownership.");
    }

    #[tokio::test]
    async fn admin_without_chat_cannot_be_verified() {
        let runner = runner(Arc::new(FakeMembers::default()));
        let caller = Caller::new(1, None);
        let denial = check(&runner, &Pipeline::new().with(Admin), Some(&caller), None)
            .await
            .unwrap_err();
        assert_eq!(denial.message(), "❌ Unable to verify admin status.");
    }

    #[tokio::test]
    async fn group_admin_rejects_private_chat_before_lookup() {
        let members = Arc::new(FakeMembers::with(5, 5, MemberStatus::Creator));
        let runner = runner(members.clone());
        let caller = Caller::new(5, None);
        let chat = Chat::new(5, ChatKind::Private);
        let pipeline = Pipeline::new().with(GroupAdmin);

        let denial = check(&runner, &pipeline, Some(&caller), Some(&chat))
            .await
            .unwrap_err();
        assert_eq!(denial.reason, DenialReason::NotGroupChat(ChatKind::Private));
        assert_eq!(
            denial.message(),
            "❌ This command can only be used in groups."
        );
        assert_eq!(members.lookup_count(), 0);
    }

    #[tokio::test]
    async fn group_admin_in_group() {
        let caller = Caller::new(2, None);
        let chat = Chat::new(-9, ChatKind::Group);
        let pipeline = Pipeline::new().with(GroupAdmin);

        let admin = FakeMembers::with(-9, 2, MemberStatus::Administrator);
        let admins = runner(Arc::new(admin));
        let res = check(&admins, &pipeline, Some(&caller), Some(&chat)).await;
        assert!(res.is_ok());

        let members = runner(Arc::new(FakeMembers::default()));
        let denial = check(&members, &pipeline, Some(&caller), Some(&chat))
            .await
            .unwrap_err();
        assert_eq!(
            denial.message(),
            "❌ You must be a group admin to use this command."
        );
    }

    #[tokio::test]
    async fn fixed_owner_compares_ids_without_lookup() {
        let members = Arc::new(FakeMembers::failing());
        let runner = runner(members.clone());
        let pipeline = Pipeline::new().with(Owner::fixed(UserId(100)));

        let owner = Caller::new(100, None);
        assert!(check(&runner, &pipeline, Some(&owner), None).await.is_ok());

        let other = Caller::new(101, None);
        let denial = check(&runner, &pipeline, Some(&other), None)
            .await
            .unwrap_err();
        assert_eq!(
            denial.message(),
            "❌ Only the owner can execute this command."
        );
        assert_eq!(members.lookup_count(), 0);
    }

    #[tokio::test]
    async fn chat_creator_owner_requires_creator_status() {
        let chat = Chat::new(-3, ChatKind::Supergroup);
        let runner = runner(Arc::new(FakeMembers::with(-3, 1, MemberStatus::Creator)));
        let pipeline = Pipeline::new().with(Owner::chat_creator());

        let creator = Caller::new(1, None);
        let res = check(&runner, &pipeline, Some(&creator), Some(&chat)).await;
        assert!(res.is_ok());

        let member = Caller::new(2, None);
        let denial = check(&runner, &pipeline, Some(&member), Some(&chat))
            .await
            .unwrap_err();
        assert_eq!(
            denial.message(),
            "❌ Only the group creator can execute this command."
        );

        let denial = check(&runner, &pipeline, Some(&creator), None)
            .await
            .unwrap_err();
        assert_eq!(
            denial.reason,
            DenialReason::MissingIdentity(IdentityCheck::Ownership)
        );
    }

    #[tokio::test]
    async fn unconfigured_owner_denies_even_chat_creators() {
        let members = Arc::new(FakeMembers::with(-3, 1, MemberStatus::Creator));
        let runner = runner(members.clone());
        let pipeline = Pipeline::new().with(Owner::configured(None));
        let chat = Chat::new(-3, ChatKind::Supergroup);
        let creator = Caller::new(1, None);

        let denial = check(&runner, &pipeline, Some(&creator), Some(&chat))
            .await
            .unwrap_err();
        assert_eq!(denial.reason, DenialReason::NotOwner);
        assert_eq!(members.lookup_count(), 0);

        let configured = Pipeline::new().with(Owner::configured(Some(UserId(1))));
        let res = check(&runner, &configured, Some(&creator), None).await;
        assert!(res.is_ok());
    }
}
