use tgm_core::{
    commands::{
        help_text, info_text, parse_command, parse_level_args, parse_permission_args,
        welcome_text, BotCommand,
    },
    domain::{Caller, MessageRef},
    formatting::{code, code_list, escape_html},
    guards::Invocation,
    keyboards,
    session::CallerSession,
    Result,
};

use super::CommandRequest;
use crate::router::AppState;

pub(crate) const MENU_TEXT: &str = "📋 <b>Group Management</b>\n\nChoose an option:";
pub(crate) const SETTINGS_TEXT: &str = "⚙️ <b>Settings</b>\n\nChoose a section:";

pub(crate) async fn handle_command(state: &AppState, req: CommandRequest) {
    let (name, args) = parse_command(&req.text);
    let Some(cmd) = BotCommand::from_name(&name) else {
        tracing::debug!(command = %name, "ignoring unknown command");
        return;
    };

    if let Err(e) = run_command(state, cmd, &args, &req).await {
        tracing::warn!(command = cmd.name(), error = %e, "command failed");
    }
}

async fn run_command(
    state: &AppState,
    cmd: BotCommand,
    args: &str,
    req: &CommandRequest,
) -> Result<()> {
    let chat_id = req.chat.id;
    let Some(pipeline) = state.guards.command(cmd) else {
        return Ok(());
    };

    let inv = Invocation {
        caller: req.caller.as_ref(),
        chat: Some(&req.chat),
        handler: cmd.name(),
    };
    if let Err(denial) = state.runner.check(pipeline, &inv).await {
        state.messenger.send_html(chat_id, &denial.message()).await?;
        return Ok(());
    }

    let reply = match cmd {
        BotCommand::Start => welcome_text(),
        BotCommand::Help => help_text(),
        BotCommand::Info => info_text(),
        BotCommand::WhoAmI => {
            let Some(caller) = req.caller.as_ref() else {
                return Ok(());
            };
            let session = state.sessions().session(caller.id).await;
            whoami_text(caller, &session)
        }
        BotCommand::Menu => {
            state
                .messenger
                .send_inline_keyboard(chat_id, MENU_TEXT, keyboards::main_menu())
                .await?;
            return Ok(());
        }
        BotCommand::Settings => {
            state
                .messenger
                .send_inline_keyboard(chat_id, SETTINGS_TEXT, keyboards::settings())
                .await?;
            return Ok(());
        }
        BotCommand::Member => {
            let Some(target) = req.reply.as_ref().and_then(|r| r.author.as_ref()) else {
                state
                    .messenger
                    .send_html(chat_id, "↩️ Reply to a member's message with /member.")
                    .await?;
                return Ok(());
            };
            state
                .messenger
                .send_inline_keyboard(
                    chat_id,
                    &format!("👤 Managing {}", member_label(target)),
                    keyboards::member_actions(target.id),
                )
                .await?;
            return Ok(());
        }
        BotCommand::Delete => {
            let Some(replied) = req.reply.as_ref() else {
                let hint = "↩️ Reply to the message you want to delete with /delete.";
                state.messenger.send_html(chat_id, hint).await?;
                return Ok(());
            };
            let target = MessageRef {
                chat_id,
                message_id: replied.message_id,
            };
            if let Err(e) = state.messenger.delete_message(target).await {
                tracing::warn!(error = %e, "failed to delete replied message");
                state
                    .messenger
                    .send_html(chat_id, "❌ Could not delete that message.")
                    .await?;
                return Ok(());
            }
            let own = MessageRef {
                chat_id,
                message_id: req.message_id,
            };
            if let Err(e) = state.messenger.delete_message(own).await {
                tracing::debug!(error = %e, "failed to delete /delete command message");
            }
            return Ok(());
        }
        BotCommand::Grant | BotCommand::Revoke => match parse_permission_args(args) {
            Err(_) => usage_reply(cmd),
            Ok((user, permission)) => {
                let mut target = state.sessions().session(user).await;
                let (changed, verb, already) = if cmd == BotCommand::Grant {
                    (target.grant(&permission), "Granted", "has")
                } else {
                    (target.revoke(&permission), "Revoked", "lacks")
                };
                drop(target);
                tracing::info!(
                    target_user = user.0,
                    permission = %permission,
                    command = cmd.name(),
                    changed,
                    "permission updated"
                );
                let who = code(&user.to_string());
                if changed {
                    format!("✅ {verb} {} for {who}.", code(&permission))
                } else {
                    format!(
                        "ℹ️ Nothing to do: {who} already {already} {}.",
                        code(&permission)
                    )
                }
            }
        },
        BotCommand::SetLevel => match parse_level_args(args) {
            Err(_) => usage_reply(cmd),
            Ok((user, level)) => {
                state.sessions().session(user).await.set_access_level(level);
                tracing::info!(
                    target_user = user.0,
                    level = level.as_u8(),
                    "access level updated"
                );
                format!(
                    "✅ {} is now {} ({}).",
                    code(&user.to_string()),
                    level.label(),
                    level.as_u8()
                )
            }
        },
    };

    state.messenger.send_html(chat_id, &reply).await?;
    Ok(())
}

fn usage_reply(cmd: BotCommand) -> String {
    format!("❌ Usage: {}", cmd.usage())
}

pub(crate) fn member_label(member: &Caller) -> String {
    match &member.username {
        Some(name) => format!(
            "<b>@{}</b> ({})",
            escape_html(name),
            code(&member.id.to_string())
        ),
        None => code(&member.id.to_string()),
    }
}

pub(crate) fn whoami_text(caller: &Caller, session: &CallerSession) -> String {
    let permissions = session.permissions().iter().collect::<Vec<_>>();
    let permissions = if permissions.is_empty() {
        "none".to_string()
    } else {
        code_list(&permissions)
    };
    let level = session.access_level();
    format!(
        "👤 {}\n\nAccess level: {} ({})\nPermissions: {}\nWarnings: {}",
        member_label(caller),
        level.label(),
        level.as_u8(),
        permissions,
        session.warnings()
    )
}
