use async_trait::async_trait;

use super::{Decision, Guard, GuardContext};
use crate::audit::AuditEvent;

/// Emits an audit line for the invocation. Never denies.
#[derive(Clone, Debug)]
pub struct ActionLog {
    label: String,
}

impl ActionLog {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
        }
    }
}

#[async_trait]
impl Guard for ActionLog {
    fn name(&self) -> &'static str {
        "action_log"
    }

    async fn evaluate(&self, ctx: &mut GuardContext<'_>) -> Decision {
        tracing::info!(
            action = %self.label.to_uppercase(),
            user_id = ctx.caller.map(|c| c.id.0),
            username = ctx.caller.map(|c| c.display_name()).unwrap_or("unknown"),
            chat_id = ctx.chat.map(|c| c.id.0),
            handler = ctx.handler,
            "audit"
        );

        if let Some(audit) = ctx.audit {
            let ev = AuditEvent::action(&self.label, ctx.caller, ctx.chat, ctx.handler);
            if let Err(e) = audit.write(ev) {
                tracing::warn!(error = %e, "failed to write audit event");
            }
        }

        Decision::Allow
    }
}

#[cfg(test)]
mod tests {
    use std::{path::PathBuf, sync::Arc, time::Duration};

    use super::*;
    use crate::{
        audit::AuditLogger,
        domain::{Caller, Chat, ChatKind},
        guards::{testing::*, GuardRunner, Pipeline, Permission},
        session::{RoleGrants, SessionStore},
    };

    fn tmp_file(prefix: &str) -> PathBuf {
        let ts = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos();
        PathBuf::from(format!("/tmp/{prefix}-{}-{ts}.log", std::process::id()))
    }

    fn audited_runner(path: &PathBuf) -> GuardRunner {
        GuardRunner::new(
            Arc::new(SessionStore::new(
                RoleGrants::default(),
                Duration::from_secs(60),
            )),
            Arc::new(FakeMembers::default()),
            Some(Arc::new(AuditLogger::new(path.clone(), true))),
        )
    }

    #[tokio::test]
    async fn always_allows_even_without_identity() {
        let runner = runner(Arc::new(FakeMembers::default()));
        let pipeline = Pipeline::new().with(ActionLog::new("action"));
        assert!(check(&runner, &pipeline, None, None).await.is_ok());
    }

    #[tokio::test]
    async fn writes_action_and_denial_records() {
        let path = tmp_file("tgm-action-log");
        let runner = audited_runner(&path);
        let caller = Caller::new(8, Some("dave".to_string()));
        let chat = Chat::new(-1, ChatKind::Group);

        let pipeline = Pipeline::new()
            .with(ActionLog::new("moderation"))
            .with(Permission::new("ban_users"));
        assert!(check(&runner, &pipeline, Some(&caller), Some(&chat))
            .await
            .is_err());

        let written = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<serde_json::Value> = written
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["event"], "action");
        assert_eq!(lines[0]["action"], "MODERATION");
        assert_eq!(lines[0]["username"], "dave");
        assert_eq!(lines[0]["handler"], "test_handler");
        assert_eq!(lines[1]["event"], "denied");
        assert_eq!(lines[1]["guard"], "permission");
        assert_eq!(lines[1]["reason"], "missing permission ban_users");
        let _ = std::fs::remove_file(&path);
    }
}
