use async_trait::async_trait;

use super::{Decision, DenialReason, Guard, GuardContext, IdentityCheck};

/// Requires one named permission in the caller's permission set.
#[derive(Clone, Debug)]
pub struct Permission {
    required: String,
}

impl Permission {
    pub fn new(required: impl Into<String>) -> Self {
        Self {
            required: required.into(),
        }
    }
}

#[async_trait]
impl Guard for Permission {
    fn name(&self) -> &'static str {
        "permission"
    }

    async fn evaluate(&self, ctx: &mut GuardContext<'_>) -> Decision {
        let Some(session) = ctx.session.as_deref() else {
            return Decision::Deny(DenialReason::MissingIdentity(IdentityCheck::Permission));
        };

        if !session.has_permission(&self.required) {
            return Decision::Deny(DenialReason::MissingPermission(self.required.clone()));
        }
        tracing::debug!(
            user_id = session.user_id().0,
            permission = %self.required,
            "permission granted"
        );
        Decision::Allow
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Match {
    /// Every required permission must be held.
    All,
    /// At least one required permission must be held.
    Any,
}

/// Requires a set of permissions under an all/any policy.
#[derive(Clone, Debug)]
pub struct Permissions {
    required: Vec<String>,
    policy: Match,
}

impl Permissions {
    pub fn all<I, S>(required: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(required, Match::All)
    }

    pub fn any<I, S>(required: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(required, Match::Any)
    }

    fn new<I, S>(required: I, policy: Match) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut out: Vec<String> = Vec::new();
        for p in required {
            let p = p.into();
            if !out.contains(&p) {
                out.push(p);
            }
        }
        Self {
            required: out,
            policy,
        }
    }
}

#[async_trait]
impl Guard for Permissions {
    fn name(&self) -> &'static str {
        match self.policy {
            Match::All => "permissions_all",
            Match::Any => "permissions_any",
        }
    }

    async fn evaluate(&self, ctx: &mut GuardContext<'_>) -> Decision {
        let Some(session) = ctx.session.as_deref() else {
            return Decision::Deny(DenialReason::MissingIdentity(IdentityCheck::Permission));
        };

        match self.policy {
            Match::All => {
                let missing: Vec<String> = self
                    .required
                    .iter()
                    .filter(|p| !session.has_permission(p))
                    .cloned()
                    .collect();
                if missing.is_empty() {
                    Decision::Allow
                } else {
                    Decision::Deny(DenialReason::MissingPermissions(missing))
                }
            }
            Match::Any => {
                if self.required.iter().any(|p| session.has_permission(p)) {
                    Decision::Allow
                } else {
                    Decision::Deny(DenialReason::RequiresOneOf(self.required.clone()))
                }
            }
        }
    }
}
