use async_trait::async_trait;

use super::{Decision, DenialReason, Guard, GuardContext, IdentityCheck};
use crate::domain::AccessLevel;

/// Requires the caller's stored access level to be at least `required`.
#[derive(Clone, Copy, Debug)]
pub struct RequireLevel {
    required: AccessLevel,
}

impl RequireLevel {
    pub fn new(required: AccessLevel) -> Self {
        Self { required }
    }
}

#[async_trait]
impl Guard for RequireLevel {
    fn name(&self) -> &'static str {
        "access_level"
    }

    async fn evaluate(&self, ctx: &mut GuardContext<'_>) -> Decision {
        let Some(session) = ctx.session.as_deref() else {
            return Decision::Deny(DenialReason::MissingIdentity(IdentityCheck::AccessLevel));
        };

        let actual = session.access_level();
        if actual < self.required {
            return Decision::Deny(DenialReason::InsufficientLevel {
                required: self.required,
                actual,
            });
        }
        tracing::debug!(
            user_id = session.user_id().0,
            level = actual.as_u8(),
            "access level check passed"
        );
        Decision::Allow
    }
}
