use tgm_core::{
    commands::CallbackGate,
    domain::{AccessLevel, Chat, MessageRef, UserId},
    formatting::{code, code_list},
    guards::Invocation,
    keyboards::{
        self, KeyboardBuilder, MemberAction, MenuAction, SettingsSection, BACK_TO_MAIN, CANCEL,
    },
    messaging::types::InlineKeyboard,
    Result,
};

use super::{
    commands::{MENU_TEXT, SETTINGS_TEXT},
    CallbackRequest,
};
use crate::router::AppState;

const MEMBERS_PER_PAGE: usize = 8;
const NO_MEMBERS_TEXT: &str =
    "👥 <b>Members</b>\n\nNobody has used the bot in this chat yet.\n\
Reply to a member's message with /member to manage them.";

pub(crate) async fn handle_callback(state: &AppState, req: CallbackRequest) {
    let toast = match run_callback(state, &req).await {
        Ok(toast) => toast,
        Err(e) => {
            tracing::warn!(data = %req.data, error = %e, "callback failed");
            Some("❌ Something went wrong. Please try again.".to_string())
        }
    };
    answer(state, &req.id, toast.as_deref()).await;
}

/// Answer a callback query so the client stops its loading indicator.
pub(crate) async fn answer(state: &AppState, callback_id: &str, toast: Option<&str>) {
    let res = state
        .messenger
        .answer_callback_query(callback_id, toast)
        .await;
    if let Err(e) = res {
        tracing::debug!(error = %e, "failed to answer callback query");
    }
}

/// Which pipeline gates `action`, and the handler name used for rate limits
/// and audit records. `None` for tokens the menus never emit.
fn gate_for(action: &MenuAction) -> Option<(CallbackGate, &'static str)> {
    Some(match action {
        MenuAction::MainMenu
        | MenuAction::Stats
        | MenuAction::Members
        | MenuAction::MembersPage(_)
        | MenuAction::Close
        | MenuAction::Cancel => (CallbackGate::Navigation, "menu"),
        MenuAction::Settings | MenuAction::SettingsSection(_) => {
            (CallbackGate::Settings, "settings")
        }
        MenuAction::Member { action, .. } => (
            CallbackGate::Member {
                action: *action,
                confirmed: false,
            },
            action.as_str(),
        ),
        MenuAction::Confirmed { action, .. } => (
            CallbackGate::Member {
                action: *action,
                confirmed: true,
            },
            action.as_str(),
        ),
        MenuAction::Group(_) | MenuAction::Unknown(_) => return None,
    })
}

/// Returns the toast to show on the pressed button, if any.
async fn run_callback(state: &AppState, req: &CallbackRequest) -> Result<Option<String>> {
    let Some((chat, message_id)) = &req.origin else {
        return Ok(None);
    };
    let msg = MessageRef {
        chat_id: chat.id,
        message_id: *message_id,
    };

    let action = keyboards::parse_callback(&req.data);
    let Some((gate, handler)) = gate_for(&action) else {
        tracing::debug!(data = %req.data, "ignoring unknown callback");
        return Ok(None);
    };
    let Some(pipeline) = state.guards.callback(gate) else {
        return Ok(None);
    };

    let inv = Invocation {
        caller: Some(&req.caller),
        chat: Some(chat),
        handler,
    };
    if let Err(denial) = state.runner.check(pipeline, &inv).await {
        return Ok(Some(denial.plain_message()));
    }

    let m = &state.messenger;
    match action {
        MenuAction::MainMenu => {
            m.edit_inline_keyboard(msg, MENU_TEXT, keyboards::main_menu())
                .await?
        }
        MenuAction::Stats => {
            let text = format!(
                "📊 <b>Statistics</b>\n\nActive caller sessions: {}",
                state.sessions().len().await
            );
            let back = keyboards::back_button(BACK_TO_MAIN);
            m.edit_inline_keyboard(msg, &text, back).await?
        }
        MenuAction::Members => {
            let (text, keyboard) = members_page(state, chat, 1).await;
            m.edit_inline_keyboard(msg, &text, keyboard).await?
        }
        MenuAction::MembersPage(page) => {
            let (text, keyboard) = members_page(state, chat, page).await;
            m.edit_inline_keyboard(msg, &text, keyboard).await?
        }
        MenuAction::Settings => {
            m.edit_inline_keyboard(msg, SETTINGS_TEXT, keyboards::settings())
                .await?
        }
        MenuAction::SettingsSection(section) => {
            let text = section_text(state, section);
            let back = keyboards::back_button("main_settings");
            m.edit_inline_keyboard(msg, &text, back).await?
        }
        MenuAction::Close => m.delete_message(msg).await?,
        MenuAction::Cancel => m.edit_html(msg, "❌ Cancelled.").await?,
        MenuAction::Member { action, user_id } => {
            return member_action(state, msg, action, user_id).await;
        }
        MenuAction::Confirmed { action, user_id } => {
            return confirmed_action(state, chat, msg, action, user_id).await;
        }
        MenuAction::Group(_) | MenuAction::Unknown(_) => {}
    }
    Ok(None)
}

/// One page of the members seen in `chat`, as a two-column grid of info
/// buttons followed by the page controls.
async fn members_page(state: &AppState, chat: &Chat, page: u32) -> (String, InlineKeyboard) {
    let members = state.sessions().members_of(chat.id).await;
    if members.is_empty() {
        let back = keyboards::back_button(BACK_TO_MAIN);
        return (NO_MEMBERS_TEXT.to_string(), back);
    }

    let pages = members.len().div_ceil(MEMBERS_PER_PAGE);
    let total = u32::try_from(pages).unwrap_or(u32::MAX);
    let page = page.clamp(1, total);
    let skip = (page as usize - 1) * MEMBERS_PER_PAGE;

    let buttons = members
        .iter()
        .skip(skip)
        .take(MEMBERS_PER_PAGE)
        .map(|(id, username)| {
            let label = match username {
                Some(name) => format!("@{name}"),
                None => id.to_string(),
            };
            (label, format!("info_{id}"))
        })
        .collect::<Vec<_>>();
    let actions = buttons
        .iter()
        .map(|(label, data)| (label.as_str(), data.as_str()))
        .collect::<Vec<_>>();

    let mut rows = keyboards::multi_action(&actions, 2).rows;
    if total > 1 {
        let base = format!("members_{page}");
        rows.extend(keyboards::pagination(page, total, &base).rows);
    }
    let mut b = KeyboardBuilder::new();
    for row in rows {
        b.add_button_row(row);
    }
    b.add_callback("⬅️ Back", BACK_TO_MAIN);

    let text = format!(
        "👥 <b>Members</b> ({})\n\nPick a member to see their access.",
        members.len()
    );
    (text, b.build())
}

async fn member_action(
    state: &AppState,
    msg: MessageRef,
    action: MemberAction,
    user_id: UserId,
) -> Result<Option<String>> {
    let target = code(&user_id.to_string());
    match action {
        MemberAction::Kick | MemberAction::Mute => {
            let text = format!("⚠️ {} {target}? Please confirm.", verb(action));
            let confirm = action.confirm_callback(user_id);
            state
                .messenger
                .edit_inline_keyboard(msg, &text, keyboards::confirmation(&confirm, CANCEL))
                .await?;
            Ok(None)
        }
        MemberAction::Info => {
            let text = {
                let session = state.sessions().session(user_id).await;
                let permissions = session.permissions().iter().collect::<Vec<_>>();
                format!(
                    "📋 <b>Member</b> {target}\n\nAccess level: {}\nPermissions: {}\nWarnings: {}",
                    session.access_level().label(),
                    if permissions.is_empty() {
                        "none".to_string()
                    } else {
                        code_list(&permissions)
                    },
                    session.warnings()
                )
            };
            state
                .messenger
                .edit_inline_keyboard(msg, &text, keyboards::member_actions(user_id))
                .await?;
            Ok(None)
        }
        MemberAction::Warn => {
            let warnings = state.sessions().session(user_id).await.add_warning();
            let text = format!("⚠️ {target} has been warned ({warnings} total).");
            state.messenger.send_html(msg.chat_id, &text).await?;
            Ok(Some(format!("Warning issued ({warnings} total)")))
        }
    }
}

async fn confirmed_action(
    state: &AppState,
    chat: &Chat,
    msg: MessageRef,
    action: MemberAction,
    user_id: UserId,
) -> Result<Option<String>> {
    let members = state.runner.members();
    let outcome = match action {
        MemberAction::Kick => members.kick_member(chat.id, user_id).await,
        MemberAction::Mute => members.mute_member(chat.id, user_id).await,
        MemberAction::Info | MemberAction::Warn => return Ok(None),
    };

    let target = code(&user_id.to_string());
    let text = match outcome {
        Ok(()) => {
            tracing::info!(
                action = action.as_str(),
                target_user = user_id.0,
                chat_id = chat.id.0,
                "member action executed"
            );
            format!("✅ {target} was {}.", past_tense(action))
        }
        Err(e) => {
            tracing::warn!(
                action = action.as_str(),
                target_user = user_id.0,
                error = %e,
                "member action failed"
            );
            format!("❌ Could not {} {target}.", action.as_str())
        }
    };
    state.messenger.edit_html(msg, &text).await?;
    Ok(None)
}

fn verb(action: MemberAction) -> &'static str {
    match action {
        MemberAction::Kick => "Kick",
        MemberAction::Mute => "Mute",
        MemberAction::Info => "Show",
        MemberAction::Warn => "Warn",
    }
}

fn past_tense(action: MemberAction) -> &'static str {
    match action {
        MemberAction::Kick => "kicked",
        MemberAction::Mute => "muted",
        MemberAction::Info => "shown",
        MemberAction::Warn => "warned",
    }
}

fn section_text(state: &AppState, section: SettingsSection) -> String {
    let cfg = &state.cfg;
    let body = match section {
        SettingsSection::Permissions => format!(
            "Granted to configured administrators: {}",
            code_list(&cfg.admin_permissions)
        ),
        SettingsSection::Messages => match &cfg.audit_log_path {
            Some(path) => format!(
                "Audit log: {} ({})",
                code(&path.display().to_string()),
                if cfg.audit_log_json { "JSON lines" } else { "text" }
            ),
            None => "Audit log: disabled".to_string(),
        },
        SettingsSection::Timers => format!(
            "Rate limit: {} requests per {}s\nSession idle timeout: {}s",
            cfg.rate_limit_requests,
            cfg.rate_limit_window.as_secs(),
            cfg.session_idle_ttl.as_secs()
        ),
        SettingsSection::Rules => AccessLevel::ALL
            .iter()
            .map(|l| format!("{} {}", l.as_u8(), l.label()))
            .collect::<Vec<_>>()
            .join("\n"),
    };
    format!("<b>{}</b>\n\n{body}", section.title())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tgm_core::domain::{Caller, ChatId, ChatKind, MessageId};

    use super::*;
    use crate::handlers::testing::{state, FakeMembers, RecordingMessenger, Sent, ADMIN, GROUP};

    const KEYBOARD_MSG: MessageRef = MessageRef {
        chat_id: ChatId(GROUP),
        message_id: MessageId(77),
    };

    fn press(from: i64, data: &str) -> CallbackRequest {
        CallbackRequest {
            id: format!("cb-{data}"),
            caller: Caller::new(from, Some(format!("user{from}"))),
            data: data.to_string(),
            origin: Some((Chat::new(GROUP, ChatKind::Supergroup), MessageId(77))),
        }
    }

    fn admin_state(messenger: &Arc<RecordingMessenger>) -> AppState {
        let members = Arc::new(FakeMembers::admin(GROUP, ADMIN));
        state(messenger.clone(), members)
    }

    #[tokio::test]
    async fn every_press_is_answered_even_when_unknown() {
        let messenger = Arc::new(RecordingMessenger::default());
        let st = state(messenger.clone(), Arc::new(FakeMembers::default()));

        handle_callback(&st, press(7, "bogus")).await;
        handle_callback(&st, press(7, "group_-100")).await;
        let mut req = press(7, "main_stats");
        req.origin = None;
        handle_callback(&st, req).await;

        assert_eq!(
            messenger.take(),
            vec![
                Sent::Answer("cb-bogus".to_string(), None),
                Sent::Answer("cb-group_-100".to_string(), None),
                Sent::Answer("cb-main_stats".to_string(), None),
            ]
        );
    }

    #[tokio::test]
    async fn navigation_requires_group_admin() {
        let messenger = Arc::new(RecordingMessenger::default());
        let st = admin_state(&messenger);

        handle_callback(&st, press(7, "main_members")).await;
        handle_callback(&st, press(ADMIN, "back_to_main")).await;

        let sent = messenger.take();
        assert_eq!(
            sent[0].text(),
            "❌ You must be a group admin to use this command."
        );
        assert_eq!(
            sent[1],
            Sent::EditKeyboard(KEYBOARD_MSG, MENU_TEXT.to_string(), keyboards::main_menu())
        );
    }

    #[tokio::test]
    async fn members_menu_lists_callers_seen_in_the_chat() {
        let messenger = Arc::new(RecordingMessenger::default());
        let st = admin_state(&messenger);

        // Nobody but the admin has been seen yet.
        handle_callback(&st, press(ADMIN, "main_members")).await;
        match &messenger.take()[0] {
            Sent::EditKeyboard(_, _, kb) => {
                assert_eq!(kb.labels(), vec![vec!["@user2"], vec!["⬅️ Back"]]);
                assert_eq!(kb.rows[0][0].callback_data(), Some("info_2"));
            }
            other => panic!("unexpected {other:?}"),
        }

        // Denied presses still mark the caller as seen in the group.
        for user in [11, 12] {
            handle_callback(&st, press(user, "main_stats")).await;
        }
        handle_callback(&st, press(ADMIN, "main_members")).await;
        let sent = messenger.take();
        match &sent[2] {
            Sent::EditKeyboard(_, text, kb) => {
                assert!(text.contains("(3)"));
                assert_eq!(
                    kb.labels(),
                    vec![
                        vec!["@user2", "@user11"],
                        vec!["@user12"],
                        vec!["⬅️ Back"],
                    ]
                );
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn member_list_pages_through_the_chat() {
        let messenger = Arc::new(RecordingMessenger::default());
        let st = admin_state(&messenger);
        for user in 100..110 {
            handle_callback(&st, press(user, "main_stats")).await;
        }
        messenger.take();

        // The admin plus ten others fill two pages.
        handle_callback(&st, press(ADMIN, "main_members")).await;
        handle_callback(&st, press(ADMIN, "members_1_next")).await;
        let sent = messenger.take();

        let first = match &sent[0] {
            Sent::EditKeyboard(_, _, kb) => kb.clone(),
            other => panic!("unexpected {other:?}"),
        };
        assert_eq!(first.rows.len(), 6);
        assert_eq!(first.labels()[4], vec!["📄 1/2", "Next ➡️"]);
        assert_eq!(first.rows[4][1].callback_data(), Some("members_1_next"));

        let second = match &sent[1] {
            Sent::EditKeyboard(_, _, kb) => kb.clone(),
            other => panic!("unexpected {other:?}"),
        };
        assert_eq!(second.labels()[0], vec!["@user107", "@user108"]);
        assert_eq!(second.labels()[2], vec!["⬅️ Previous", "📄 2/2"]);
    }

    #[tokio::test]
    async fn settings_section_shows_configuration() {
        let messenger = Arc::new(RecordingMessenger::default());
        let st = admin_state(&messenger);

        handle_callback(&st, press(ADMIN, "settings_timers")).await;
        let sent = messenger.take();
        assert!(sent[0].text().starts_with("<b>⏱️ Timers</b>"));
        assert!(sent[0].text().contains("2 requests per 60s"));
    }

    #[tokio::test]
    async fn kick_is_confirmed_before_it_runs() {
        let messenger = Arc::new(RecordingMessenger::default());
        let members = Arc::new(FakeMembers::admin(GROUP, ADMIN));
        let st = state(messenger.clone(), members.clone());

        handle_callback(&st, press(ADMIN, "kick_9")).await;
        let sent = messenger.take();
        assert_eq!(
            sent[0],
            Sent::EditKeyboard(
                KEYBOARD_MSG,
                "⚠️ Kick <code>9</code>? Please confirm.".to_string(),
                keyboards::confirmation("confirm_kick_9", CANCEL)
            )
        );
        assert!(members.kicked.lock().unwrap().is_empty());

        handle_callback(&st, press(ADMIN, "confirm_kick_9")).await;
        assert_eq!(
            messenger.take()[0],
            Sent::Edit(KEYBOARD_MSG, "✅ <code>9</code> was kicked.".to_string())
        );
        assert_eq!(
            *members.kicked.lock().unwrap(),
            vec![(ChatId(GROUP), UserId(9))]
        );
    }

    #[tokio::test]
    async fn mute_needs_restrict_permission() {
        let messenger = Arc::new(RecordingMessenger::default());
        let members = Arc::new(FakeMembers::admin(GROUP, 7));
        let st = state(messenger.clone(), members.clone());

        // Chat admin without the session permission.
        handle_callback(&st, press(7, "confirm_mute_9")).await;
        assert!(messenger.take()[0].text().contains("restrict_members"));
        assert!(members.muted.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn warn_requires_moderator_and_counts() {
        let messenger = Arc::new(RecordingMessenger::default());
        let st = state(messenger.clone(), Arc::new(FakeMembers::default()));

        handle_callback(&st, press(7, "warn_9")).await;
        assert_eq!(
            messenger.take()[0].text(),
            "❌ This action requires Moderator access level."
        );

        handle_callback(&st, press(ADMIN, "warn_9")).await;
        handle_callback(&st, press(ADMIN, "warn_9")).await;
        let sent = messenger.take();
        assert!(sent[2].text().contains("(2 total)"));
        assert_eq!(sent[3].text(), "Warning issued (2 total)");
        assert_eq!(st.sessions().session(UserId(9)).await.warnings(), 2);
    }
}
