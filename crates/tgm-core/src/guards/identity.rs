use async_trait::async_trait;

use super::{Decision, DenialReason, Guard, GuardContext, IdentityCheck};

/// Requires a caller on the update and marks its session authenticated.
#[derive(Clone, Copy, Debug, Default)]
pub struct Authentication;

#[async_trait]
impl Guard for Authentication {
    fn name(&self) -> &'static str {
        "authentication"
    }

    async fn evaluate(&self, ctx: &mut GuardContext<'_>) -> Decision {
        let (Some(caller), Some(session)) = (ctx.caller, ctx.session.as_deref_mut()) else {
            return Decision::Deny(DenialReason::MissingIdentity(
                IdentityCheck::Authentication,
            ));
        };

        session.mark_authenticated(caller.username.clone());
        tracing::info!(
            user_id = caller.id.0,
            username = caller.display_name(),
            "caller authenticated"
        );
        Decision::Allow
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        domain::{Caller, UserId},
        guards::{testing::*, Pipeline},
    };

    #[tokio::test]
    async fn missing_caller_is_denied() {
        let runner = runner(Arc::new(FakeMembers::default()));
        let pipeline = Pipeline::new().with(Authentication);
        let denial = check(&runner, &pipeline, None, None).await.unwrap_err();
        assert_eq!(
            denial.reason,
            DenialReason::MissingIdentity(IdentityCheck::Authentication)
        );
        assert_eq!(
            denial.message(),
            "❌ Authentication failed. Please try again."
        );
    }

    #[tokio::test]
    async fn present_caller_is_recorded_in_session() {
        let runner = runner(Arc::new(FakeMembers::default()));
        let pipeline = Pipeline::new().with(Authentication);
        let caller = Caller::new(9, Some("carol".to_string()));
        check(&runner, &pipeline, Some(&caller), None)
            .await
            .unwrap();

        let s = runner.sessions().session(UserId(9)).await;
        assert!(s.is_authenticated());
        assert_eq!(s.username(), Some("carol"));
    }
}
