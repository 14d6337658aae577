use std::sync::Arc;

use teloxide::{dispatching::Dispatcher, dptree, prelude::*};

use tgm_core::{
    audit::AuditLogger,
    commands::GuardTable,
    config::Config,
    guards::GuardRunner,
    messaging::port::MessagingPort,
    session::{RoleGrants, SessionStore},
};

use crate::handlers;
use crate::TelegramMessenger;

#[derive(Clone)]
pub struct AppState {
    pub cfg: Arc<Config>,
    pub messenger: Arc<dyn MessagingPort>,
    pub runner: GuardRunner,
    pub guards: Arc<GuardTable>,
}

impl AppState {
    pub fn sessions(&self) -> &Arc<SessionStore> {
        self.runner.sessions()
    }
}

pub async fn run_polling(cfg: Arc<Config>) -> anyhow::Result<()> {
    let bot = Bot::new(cfg.telegram_bot_token.clone());

    match bot.get_me().await {
        Ok(me) => tracing::info!(username = %me.username(), "bot started"),
        Err(e) => tracing::warn!(error = %e, "failed to fetch bot identity"),
    }
    tracing::info!(
        owner_configured = cfg.owner_id.is_some(),
        admins = cfg.admin_users.len(),
        rate_limit_requests = cfg.rate_limit_requests,
        rate_limit_window_secs = cfg.rate_limit_window.as_secs(),
        "configuration loaded"
    );

    let telegram = Arc::new(TelegramMessenger::new(bot.clone()));

    let sessions = Arc::new(SessionStore::new(
        RoleGrants::from_config(&cfg),
        cfg.session_idle_ttl,
    ));
    sessions.clone().spawn_sweeper(cfg.session_sweep_interval);

    let audit = cfg.audit_log_path.as_ref().map(|path| {
        tracing::info!(path = %path.display(), json = cfg.audit_log_json, "audit log enabled");
        Arc::new(AuditLogger::new(path.clone(), cfg.audit_log_json))
    });

    let state = Arc::new(AppState {
        cfg: cfg.clone(),
        messenger: telegram.clone(),
        runner: GuardRunner::new(sessions, telegram, audit),
        guards: Arc::new(GuardTable::from_config(&cfg)),
    });

    let handler = dptree::entry()
        .branch(Update::filter_callback_query().endpoint(handlers::handle_callback))
        .branch(Update::filter_message().endpoint(handlers::handle_message));

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![state])
        .build()
        .dispatch()
        .await;

    Ok(())
}
