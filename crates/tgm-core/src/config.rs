use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::{errors::Error, Result};

pub const DEFAULT_ADMIN_PERMISSIONS: &[&str] = &[
    "delete_messages",
    "pin_messages",
    "manage_members",
    "ban_users",
    "restrict_members",
    "change_settings",
];

/// Typed configuration, read once at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub telegram_bot_token: String,

    // Role grants seeded into new caller sessions
    pub owner_id: Option<i64>,
    pub admin_users: Vec<i64>,
    pub admin_permissions: Vec<String>,

    // Rate limiting (per caller, per command)
    pub rate_limit_requests: usize,
    pub rate_limit_window: Duration,

    // Session lifecycle
    pub session_idle_ttl: Duration,
    pub session_sweep_interval: Duration,

    // Audit
    pub audit_log_path: Option<PathBuf>,
    pub audit_log_json: bool,
}

impl Config {
    pub fn load() -> Result<Self> {
        load_dotenv_if_present(Path::new(".env"));

        let telegram_bot_token = env_str("TELEGRAM_BOT_TOKEN").unwrap_or_default();
        if telegram_bot_token.trim().is_empty() {
            return Err(Error::Config(
                "TELEGRAM_BOT_TOKEN environment variable not set".to_string(),
            ));
        }

        let owner_id = match env_str("BOT_OWNER_ID").and_then(non_empty) {
            Some(raw) => Some(raw.trim().parse::<i64>().map_err(|_| {
                Error::Config(format!("BOT_OWNER_ID is not a numeric user id: {raw}"))
            })?),
            None => None,
        };
        let admin_users = parse_csv_i64(env_str("BOT_ADMIN_USERS"));
        let admin_permissions = parse_csv(env_str("BOT_ADMIN_PERMISSIONS")).unwrap_or_else(|| {
            DEFAULT_ADMIN_PERMISSIONS
                .iter()
                .map(|s| s.to_string())
                .collect()
        });

        let rate_limit_requests = env_usize("RATE_LIMIT_REQUESTS").unwrap_or(5).max(1);
        let rate_limit_window = Duration::from_secs(env_u64("RATE_LIMIT_WINDOW").unwrap_or(60));

        let session_idle_ttl = Duration::from_secs(env_u64("SESSION_IDLE_TTL").unwrap_or(86_400));
        let session_sweep_interval =
            Duration::from_secs(env_u64("SESSION_SWEEP_INTERVAL").unwrap_or(600).max(1));

        let audit_log_path = env_str("AUDIT_LOG_PATH")
            .and_then(non_empty)
            .map(PathBuf::from);
        let audit_log_json = env_bool("AUDIT_LOG_JSON").unwrap_or(true);

        Ok(Self {
            telegram_bot_token,
            owner_id,
            admin_users,
            admin_permissions,
            rate_limit_requests,
            rate_limit_window,
            session_idle_ttl,
            session_sweep_interval,
            audit_log_path,
            audit_log_json,
        })
    }

    /// Defaults for everything except the token; used by tests and embedders.
    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            telegram_bot_token: token.into(),
            owner_id: None,
            admin_users: Vec::new(),
            admin_permissions: DEFAULT_ADMIN_PERMISSIONS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            rate_limit_requests: 5,
            rate_limit_window: Duration::from_secs(60),
            session_idle_ttl: Duration::from_secs(86_400),
            session_sweep_interval: Duration::from_secs(600),
            audit_log_path: None,
            audit_log_json: true,
        }
    }
}

fn env_str(key: &str) -> Option<String> {
    env::var(key).ok()
}

fn load_dotenv_if_present(path: &Path) {
    let Ok(contents) = fs::read_to_string(path) else {
        return;
    };

    for raw in contents.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some((k, v)) = line.split_once('=') else {
            continue;
        };

        let key = k.trim();
        if key.is_empty() {
            continue;
        }
        if env::var_os(key).is_some() {
            continue; // do not override existing env
        }

        env::set_var(key, unquote(v.trim()));
    }
}

fn unquote(val: &str) -> &str {
    let quoted = val.len() >= 2
        && ((val.starts_with('"') && val.ends_with('"'))
            || (val.starts_with('\'') && val.ends_with('\'')));
    if quoted {
        &val[1..val.len() - 1]
    } else {
        val
    }
}

fn env_bool(key: &str) -> Option<bool> {
    env_str(key).map(|s| parse_bool(&s))
}

fn parse_bool(s: &str) -> bool {
    matches!(
        s.trim().to_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

fn env_u64(key: &str) -> Option<u64> {
    env_str(key).and_then(|s| s.trim().parse::<u64>().ok())
}

fn env_usize(key: &str) -> Option<usize> {
    env_str(key).and_then(|s| s.trim().parse::<usize>().ok())
}

fn parse_csv_i64(v: Option<String>) -> Vec<i64> {
    v.unwrap_or_default()
        .split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .filter_map(|s| s.parse::<i64>().ok())
        .collect()
}

fn parse_csv(v: Option<String>) -> Option<Vec<String>> {
    let v = v?;
    let out = v
        .split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .collect::<Vec<_>>();
    if out.is_empty() {
        None
    } else {
        Some(out)
    }
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}
