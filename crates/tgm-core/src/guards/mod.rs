//! Guard pipeline: ordered preconditions evaluated before a handler runs.
//!
//! A [`Pipeline`] is a list of [`Guard`]s. The [`GuardRunner`] locks the
//! caller's session, evaluates the guards in order and stops at the first
//! denial. The handler is invoked by the adapter only when the runner returns
//! `Ok(())`.

use std::{fmt, sync::Arc, time::Duration, time::Instant};

use async_trait::async_trait;

use crate::{
    audit::{AuditEvent, AuditLogger},
    domain::{AccessLevel, Caller, Chat, ChatKind},
    formatting::code,
    ports::MembershipPort,
    session::{CallerSession, SessionStore},
};

mod action_log;
mod admin;
mod identity;
mod level;
mod permission;
mod rate_limit;

pub use action_log::ActionLog;
pub use admin::{Admin, GroupAdmin, Owner};
pub use identity::Authentication;
pub use level::RequireLevel;
pub use permission::{Permission, Permissions};
pub use rate_limit::RateLimit;

/// What is being invoked, and by whom.
#[derive(Clone, Copy, Debug)]
pub struct Invocation<'a> {
    pub caller: Option<&'a Caller>,
    pub chat: Option<&'a Chat>,
    /// Handler name; also the key for per-action rate-limit history.
    pub handler: &'a str,
}

/// Per-evaluation context handed to each guard.
pub struct GuardContext<'a> {
    pub caller: Option<&'a Caller>,
    pub chat: Option<&'a Chat>,
    pub handler: &'a str,
    pub session: Option<&'a mut CallerSession>,
    pub members: &'a dyn MembershipPort,
    pub audit: Option<&'a AuditLogger>,
    pub now: Instant,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny(DenialReason),
}

#[async_trait]
pub trait Guard: Send + Sync {
    /// Stable identifier used in logs and audit records.
    fn name(&self) -> &'static str;

    async fn evaluate(&self, ctx: &mut GuardContext<'_>) -> Decision;
}

/// Which check could not run because the caller or chat was missing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IdentityCheck {
    Authentication,
    Permission,
    Admin,
    GroupAdmin,
    AccessLevel,
    Ownership,
    RateLimit,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DenialReason {
    MissingIdentity(IdentityCheck),
    MissingPermission(String),
    /// Required permissions the caller lacks, in the order they were required.
    MissingPermissions(Vec<String>),
    RequiresOneOf(Vec<String>),
    NotAdmin,
    NotGroupChat(ChatKind),
    NotGroupAdmin,
    AdminLookupFailed(String),
    InsufficientLevel {
        required: AccessLevel,
        actual: AccessLevel,
    },
    NotOwner,
    NotCreator,
    OwnershipLookupFailed(String),
    RateLimited {
        retry_after: Duration,
    },
}

impl DenialReason {
    /// User-facing reply (Telegram HTML).
    pub fn message(&self) -> String {
        self.render(code)
    }

    /// User-facing reply without markup, for callback-query toasts.
    pub fn plain_message(&self) -> String {
        self.render(|s| s.to_string())
    }

    fn render(&self, code: impl Fn(&str) -> String) -> String {
        let list = |items: &[String]| {
            items
                .iter()
                .map(|s| code(s))
                .collect::<Vec<_>>()
                .join(", ")
        };

        match self {
            DenialReason::MissingIdentity(check) => match check {
                IdentityCheck::Authentication => "❌ Authentication failed. Please try again.",
                IdentityCheck::Permission | IdentityCheck::RateLimit => {
                    "❌ You are not authorized to perform this action."
                }
                IdentityCheck::Admin => "❌ Unable to verify admin status.",
                IdentityCheck::GroupAdmin => "❌ Could not verify group admin status.",
                IdentityCheck::AccessLevel => "❌ Unable to verify access level.",
                IdentityCheck::Ownership => "❌ Could not verify ownership.",
            }
            .to_string(),
            DenialReason::MissingPermission(p) => {
                format!(
                    "❌ You don't have permission to execute this command: {}",
                    code(p)
                )
            }
            DenialReason::MissingPermissions(missing) => {
                format!("❌ Missing permissions: {}", list(missing))
            }
            DenialReason::RequiresOneOf(any) => format!("❌ Requires one of: {}", list(any)),
            DenialReason::NotAdmin => "❌ You must be an admin to use this command.".to_string(),
            DenialReason::NotGroupChat(_) => {
                "❌ This command can only be used in groups.".to_string()
            }
            DenialReason::NotGroupAdmin => {
                "❌ You must be a group admin to use this command.".to_string()
            }
            DenialReason::AdminLookupFailed(_) => "❌ Error verifying admin status.".to_string(),
            DenialReason::InsufficientLevel { required, .. } => {
                format!("❌ This action requires {} access level.", required.label())
            }
            DenialReason::NotOwner => "❌ Only the owner can execute this command.".to_string(),
            DenialReason::NotCreator => {
                "❌ Only the group creator can execute this command.".to_string()
            }
            DenialReason::OwnershipLookupFailed(_) => "❌ Error verifying ownership.".to_string(),
            DenialReason::RateLimited { .. } => {
                "⏳ You're sending too many requests. Please wait a moment.".to_string()
            }
        }
    }
}

/// Plain-text form for logs and the audit trail.
impl fmt::Display for DenialReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DenialReason::MissingIdentity(check) => write!(f, "missing identity for {check:?}"),
            DenialReason::MissingPermission(p) => write!(f, "missing permission {p}"),
            DenialReason::MissingPermissions(ps) => {
                write!(f, "missing permissions {}", ps.join(", "))
            }
            DenialReason::RequiresOneOf(ps) => write!(f, "requires one of {}", ps.join(", ")),
            DenialReason::NotAdmin => f.write_str("not a chat admin"),
            DenialReason::NotGroupChat(kind) => write!(f, "not a group chat ({})", kind.as_str()),
            DenialReason::NotGroupAdmin => f.write_str("not a group admin"),
            DenialReason::AdminLookupFailed(e) => write!(f, "admin lookup failed: {e}"),
            DenialReason::InsufficientLevel { required, actual } => write!(
                f,
                "requires level {} ({}), has {}",
                required.as_u8(),
                required.label(),
                actual.as_u8()
            ),
            DenialReason::NotOwner => f.write_str("not the configured owner"),
            DenialReason::NotCreator => f.write_str("not the chat creator"),
            DenialReason::OwnershipLookupFailed(e) => write!(f, "ownership lookup failed: {e}"),
            DenialReason::RateLimited { retry_after } => {
                let secs = retry_after.as_secs_f64();
                write!(f, "rate limited, retry after {secs:.1}s")
            }
        }
    }
}

/// A denial attributed to the guard that produced it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Denial {
    pub guard: &'static str,
    pub reason: DenialReason,
}

impl Denial {
    pub fn message(&self) -> String {
        self.reason.message()
    }

    pub fn plain_message(&self) -> String {
        self.reason.plain_message()
    }
}

/// Ordered list of guards. Evaluation order is insertion order.
#[derive(Default)]
pub struct Pipeline {
    guards: Vec<Box<dyn Guard>>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, guard: impl Guard + 'static) -> Self {
        self.guards.push(Box::new(guard));
        self
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.guards.iter().map(|g| g.name()).collect()
    }
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

/// Shared collaborators needed to evaluate any pipeline.
#[derive(Clone)]
pub struct GuardRunner {
    sessions: Arc<SessionStore>,
    members: Arc<dyn MembershipPort>,
    audit: Option<Arc<AuditLogger>>,
}

impl GuardRunner {
    pub fn new(
        sessions: Arc<SessionStore>,
        members: Arc<dyn MembershipPort>,
        audit: Option<Arc<AuditLogger>>,
    ) -> Self {
        Self {
            sessions,
            members,
            audit,
        }
    }

    pub fn sessions(&self) -> &Arc<SessionStore> {
        &self.sessions
    }

    pub fn members(&self) -> &Arc<dyn MembershipPort> {
        &self.members
    }

    pub async fn check(
        &self,
        pipeline: &Pipeline,
        inv: &Invocation<'_>,
    ) -> std::result::Result<(), Denial> {
        self.check_at(pipeline, inv, Instant::now()).await
    }

    /// Evaluate `pipeline` at `now`. The caller's session stays locked until
    /// the last guard has run.
    pub async fn check_at(
        &self,
        pipeline: &Pipeline,
        inv: &Invocation<'_>,
        now: Instant,
    ) -> std::result::Result<(), Denial> {
        let mut session = match inv.caller {
            Some(c) => Some(self.sessions.session(c.id).await),
            None => None,
        };
        if let (Some(s), Some(chat)) = (session.as_deref_mut(), inv.chat) {
            if chat.kind.is_group() {
                s.note_chat(chat.id);
            }
        }

        let mut ctx = GuardContext {
            caller: inv.caller,
            chat: inv.chat,
            handler: inv.handler,
            session: session.as_deref_mut(),
            members: self.members.as_ref(),
            audit: self.audit.as_deref(),
            now,
        };

        for guard in &pipeline.guards {
            if let Decision::Deny(reason) = guard.evaluate(&mut ctx).await {
                let denial = Denial {
                    guard: guard.name(),
                    reason,
                };
                self.record_denial(&denial, inv);
                return Err(denial);
            }
        }

        Ok(())
    }

    fn record_denial(&self, denial: &Denial, inv: &Invocation<'_>) {
        tracing::warn!(
            guard = denial.guard,
            handler = inv.handler,
            user_id = inv.caller.map(|c| c.id.0),
            chat_id = inv.chat.map(|c| c.id.0),
            reason = %denial.reason,
            "guard denied"
        );

        if let Some(audit) = &self.audit {
            let ev = AuditEvent::denied(
                denial.guard,
                &denial.reason.to_string(),
                inv.caller,
                inv.chat,
                inv.handler,
            );
            if let Err(e) = audit.write(ev) {
                tracing::warn!(error = %e, "failed to write audit event");
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::{
        collections::HashMap,
        sync::atomic::{AtomicUsize, Ordering},
    };

    use super::*;
    use crate::{
        domain::{ChatId, MemberStatus, UserId},
        errors::Error,
        session::RoleGrants,
        Result,
    };

    /// Membership port answering from a fixed table.
    #[derive(Default)]
    pub struct FakeMembers {
        pub statuses: HashMap<(i64, i64), MemberStatus>,
        pub fail: bool,
        pub lookups: AtomicUsize,
    }

    impl FakeMembers {
        pub fn with(chat: i64, user: i64, status: MemberStatus) -> Self {
            let mut m = Self::default();
            m.statuses.insert((chat, user), status);
            m
        }

        pub fn failing() -> Self {
            Self {
                fail: true,
                ..Self::default()
            }
        }

        pub fn lookup_count(&self) -> usize {
            self.lookups.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl MembershipPort for FakeMembers {
        async fn member_status(&self, chat_id: ChatId, user_id: UserId) -> Result<MemberStatus> {
            self.lookups.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(Error::External("telegram error: timed out".to_string()));
            }
            Ok(self
                .statuses
                .get(&(chat_id.0, user_id.0))
                .copied()
                .unwrap_or(MemberStatus::Member))
        }

        async fn kick_member(&self, _chat_id: ChatId, _user_id: UserId) -> Result<()> {
            Ok(())
        }

        async fn mute_member(&self, _chat_id: ChatId, _user_id: UserId) -> Result<()> {
            Ok(())
        }
    }

    pub fn runner(members: Arc<FakeMembers>) -> GuardRunner {
        let sessions = Arc::new(SessionStore::new(
            RoleGrants::default(),
            Duration::from_secs(3600),
        ));
        GuardRunner::new(sessions, members, None)
    }

    pub async fn check(
        runner: &GuardRunner,
        pipeline: &Pipeline,
        caller: Option<&Caller>,
        chat: Option<&Chat>,
    ) -> std::result::Result<(), Denial> {
        let inv = Invocation {
            caller,
            chat,
            handler: "test_handler",
        };
        runner.check(pipeline, &inv).await
    }
}
