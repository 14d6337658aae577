//! Bot commands and the guard pipeline attached to each of them.

use std::collections::HashMap;

use crate::{
    config::Config,
    domain::{AccessLevel, UserId},
    errors::Error,
    guards::{
        ActionLog, Admin, Authentication, GroupAdmin, Owner, Permission, Permissions, Pipeline,
        RateLimit, RequireLevel,
    },
    keyboards::MemberAction,
    Result,
};

pub const BOT_VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BotCommand {
    Start,
    Help,
    Info,
    WhoAmI,
    Menu,
    Settings,
    Member,
    Delete,
    Grant,
    Revoke,
    SetLevel,
}

impl BotCommand {
    pub const ALL: [BotCommand; 11] = [
        BotCommand::Start,
        BotCommand::Help,
        BotCommand::Info,
        BotCommand::WhoAmI,
        BotCommand::Menu,
        BotCommand::Settings,
        BotCommand::Member,
        BotCommand::Delete,
        BotCommand::Grant,
        BotCommand::Revoke,
        BotCommand::SetLevel,
    ];

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.name() == name)
    }

    pub fn name(self) -> &'static str {
        match self {
            BotCommand::Start => "start",
            BotCommand::Help => "help",
            BotCommand::Info => "info",
            BotCommand::WhoAmI => "whoami",
            BotCommand::Menu => "menu",
            BotCommand::Settings => "settings",
            BotCommand::Member => "member",
            BotCommand::Delete => "delete",
            BotCommand::Grant => "grant",
            BotCommand::Revoke => "revoke",
            BotCommand::SetLevel => "setlevel",
        }
    }

    pub fn usage(self) -> &'static str {
        match self {
            BotCommand::Start => "/start - Start the bot",
            BotCommand::Help => "/help - Show this help message",
            BotCommand::Info => "/info - Get bot information",
            BotCommand::WhoAmI => "/whoami - Show your access level and permissions",
            BotCommand::Menu => "/menu - Open the group management menu (group admins)",
            BotCommand::Settings => "/settings - Group settings (Administrator level)",
            BotCommand::Member => "/member - Manage the author of the replied message",
            BotCommand::Delete => "/delete - Delete the replied message",
            BotCommand::Grant => {
                "/grant &lt;user_id&gt; &lt;permission&gt; - Grant a permission (owner)"
            }
            BotCommand::Revoke => {
                "/revoke &lt;user_id&gt; &lt;permission&gt; - Revoke a permission (owner)"
            }
            BotCommand::SetLevel => {
                "/setlevel &lt;user_id&gt; &lt;0-3&gt; - Set an access level (owner)"
            }
        }
    }
}

/// Split `/cmd@botname args` into a lower-cased command name and the trimmed rest.
pub fn parse_command(text: &str) -> (String, String) {
    let mut parts = text.trim().splitn(2, char::is_whitespace);
    let first = parts.next().unwrap_or("").trim();
    let rest = parts.next().unwrap_or("").trim().to_string();

    let cmd = first
        .trim_start_matches('/')
        .split('@')
        .next()
        .unwrap_or("")
        .to_lowercase();

    (cmd, rest)
}

pub fn welcome_text() -> String {
    "Welcome to Telegram Group Manager Bot! 🤖\n\nUse /help to see available commands.".to_string()
}

pub fn help_text() -> String {
    let mut out = String::from("<b>Available Commands:</b>\n");
    for cmd in BotCommand::ALL {
        out.push_str(cmd.usage());
        out.push('\n');
    }
    out
}

pub fn info_text() -> String {
    format!(
        "Telegram Group Manager Bot v{BOT_VERSION}\n\n\
A powerful bot for managing Telegram groups effectively."
    )
}

/// Arguments of `/grant` and `/revoke`.
pub fn parse_permission_args(args: &str) -> Result<(UserId, String)> {
    let mut it = args.split_whitespace();
    let (Some(user), Some(permission), None) = (it.next(), it.next(), it.next()) else {
        return Err(Error::InvalidArgument(
            "expected <user_id> <permission>".to_string(),
        ));
    };
    Ok((parse_user_id(user)?, permission.to_string()))
}

/// Arguments of `/setlevel`.
pub fn parse_level_args(args: &str) -> Result<(UserId, AccessLevel)> {
    let mut it = args.split_whitespace();
    let (Some(user), Some(level), None) = (it.next(), it.next(), it.next()) else {
        return Err(Error::InvalidArgument(
            "expected <user_id> <0-3>".to_string(),
        ));
    };
    let level = level
        .parse::<u8>()
        .ok()
        .and_then(AccessLevel::from_u8)
        .ok_or_else(|| {
            Error::InvalidArgument(format!("access level must be 0-3, got {level}"))
        })?;
    Ok((parse_user_id(user)?, level))
}

fn parse_user_id(s: &str) -> Result<UserId> {
    s.parse::<i64>()
        .map(UserId)
        .map_err(|_| Error::InvalidArgument(format!("not a user id: {s}")))
}

/// Which pipeline gates a menu callback.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CallbackGate {
    Navigation,
    Settings,
    Member {
        action: MemberAction,
        confirmed: bool,
    },
}

/// Guard pipelines for every command and menu callback, built once from config.
#[derive(Debug)]
pub struct GuardTable {
    commands: HashMap<BotCommand, Pipeline>,
    callbacks: HashMap<CallbackGate, Pipeline>,
}

impl GuardTable {
    pub fn from_config(cfg: &Config) -> Self {
        let limit = || RateLimit::new(cfg.rate_limit_requests, cfg.rate_limit_window);
        let owner = || Owner::configured(cfg.owner_id.map(UserId));

        let mut commands = HashMap::new();
        for cmd in [BotCommand::Start, BotCommand::Help, BotCommand::Info] {
            commands.insert(
                cmd,
                Pipeline::new()
                    .with(ActionLog::new("command"))
                    .with(limit()),
            );
        }
        commands.insert(BotCommand::WhoAmI, Pipeline::new().with(Authentication));
        commands.insert(
            BotCommand::Menu,
            Pipeline::new()
                .with(Authentication)
                .with(GroupAdmin)
                .with(limit()),
        );
        commands.insert(
            BotCommand::Settings,
            Pipeline::new()
                .with(Authentication)
                .with(RequireLevel::new(AccessLevel::Administrator)),
        );
        commands.insert(
            BotCommand::Member,
            Pipeline::new()
                .with(Authentication)
                .with(Permissions::any(["manage_members", "ban_users"])),
        );
        commands.insert(
            BotCommand::Delete,
            Pipeline::new()
                .with(Authentication)
                .with(Permission::new("delete_messages"))
                .with(Admin)
                .with(ActionLog::new("delete")),
        );
        for (cmd, label) in [
            (BotCommand::Grant, "grant"),
            (BotCommand::Revoke, "revoke"),
            (BotCommand::SetLevel, "set_level"),
        ] {
            commands.insert(
                cmd,
                Pipeline::new()
                    .with(Authentication)
                    .with(owner())
                    .with(ActionLog::new(label)),
            );
        }

        let mut callbacks = HashMap::new();
        callbacks.insert(
            CallbackGate::Navigation,
            Pipeline::new().with(Authentication).with(GroupAdmin),
        );
        callbacks.insert(
            CallbackGate::Settings,
            Pipeline::new()
                .with(Authentication)
                .with(GroupAdmin)
                .with(RequireLevel::new(AccessLevel::Administrator)),
        );
        for action in [
            MemberAction::Kick,
            MemberAction::Mute,
            MemberAction::Info,
            MemberAction::Warn,
        ] {
            for confirmed in [false, true] {
                callbacks.insert(
                    CallbackGate::Member { action, confirmed },
                    member_pipeline(action, confirmed),
                );
            }
        }

        Self {
            commands,
            callbacks,
        }
    }

    pub fn command(&self, cmd: BotCommand) -> Option<&Pipeline> {
        self.commands.get(&cmd)
    }

    pub fn callback(&self, gate: CallbackGate) -> Option<&Pipeline> {
        self.callbacks.get(&gate)
    }
}

fn member_pipeline(action: MemberAction, confirmed: bool) -> Pipeline {
    let p = Pipeline::new().with(Authentication);
    let p = match action {
        MemberAction::Kick => p.with(Admin).with(Permission::new("ban_users")),
        MemberAction::Mute => p.with(Admin).with(Permission::new("restrict_members")),
        MemberAction::Warn => p.with(RequireLevel::new(AccessLevel::Moderator)),
        MemberAction::Info => p.with(Permissions::any(["manage_members", "ban_users"])),
    };
    // Only executed actions are audited; the confirmation prompt is not.
    if confirmed || !action.needs_confirmation() {
        p.with(ActionLog::new(action.as_str()))
    } else {
        p
    }
}
