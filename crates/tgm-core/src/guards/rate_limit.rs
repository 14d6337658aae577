use std::time::Duration;

use async_trait::async_trait;

use super::{Decision, DenialReason, Guard, GuardContext, IdentityCheck};

/// Sliding-window limit of `max_calls` per `period`, per caller and handler.
#[derive(Clone, Copy, Debug)]
pub struct RateLimit {
    max_calls: usize,
    period: Duration,
}

impl RateLimit {
    pub fn new(max_calls: usize, period: Duration) -> Self {
        Self { max_calls, period }
    }
}

#[async_trait]
impl Guard for RateLimit {
    fn name(&self) -> &'static str {
        "rate_limit"
    }

    async fn evaluate(&self, ctx: &mut GuardContext<'_>) -> Decision {
        let now = ctx.now;
        let handler = ctx.handler;
        let Some(session) = ctx.session.as_deref_mut() else {
            return Decision::Deny(DenialReason::MissingIdentity(IdentityCheck::RateLimit));
        };
        let user_id = session.user_id();

        let calls = session.call_history_mut(handler);
        calls.retain(|t| now.saturating_duration_since(*t) < self.period);

        if calls.len() >= self.max_calls {
            let oldest = calls.front().copied().unwrap_or(now);
            let retry_after = self
                .period
                .saturating_sub(now.saturating_duration_since(oldest));
            tracing::warn!(user_id = user_id.0, handler, "rate limit exceeded");
            return Decision::Deny(DenialReason::RateLimited { retry_after });
        }

        calls.push_back(now);
        Decision::Allow
    }
}
