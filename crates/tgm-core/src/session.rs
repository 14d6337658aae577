use std::{
    collections::{BTreeSet, HashMap, VecDeque},
    sync::Arc,
    time::{Duration, Instant},
};

use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio::task::JoinHandle;

use crate::{
    config::Config,
    domain::{AccessLevel, ChatId, UserId},
};

/// Per-caller state kept in process memory.
#[derive(Debug)]
pub struct CallerSession {
    user_id: UserId,
    username: Option<String>,
    authenticated: bool,
    permissions: BTreeSet<String>,
    access_level: AccessLevel,
    call_history: HashMap<String, VecDeque<Instant>>,
    warnings: u32,
    /// Group chats the caller has invoked the bot in.
    chats: BTreeSet<ChatId>,
    last_seen: Instant,
}

impl CallerSession {
    fn new(user_id: UserId, access_level: AccessLevel, permissions: BTreeSet<String>) -> Self {
        Self {
            user_id,
            username: None,
            authenticated: false,
            permissions,
            access_level,
            call_history: HashMap::new(),
            warnings: 0,
            chats: BTreeSet::new(),
            last_seen: Instant::now(),
        }
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    pub fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    pub fn mark_authenticated(&mut self, username: Option<String>) {
        self.authenticated = true;
        self.username = username;
    }

    pub fn permissions(&self) -> &BTreeSet<String> {
        &self.permissions
    }

    pub fn has_permission(&self, permission: &str) -> bool {
        self.permissions.contains(permission)
    }

    /// Returns `true` if the permission was not held before.
    pub fn grant(&mut self, permission: &str) -> bool {
        self.permissions.insert(permission.to_string())
    }

    /// Returns `true` if the permission was held before.
    pub fn revoke(&mut self, permission: &str) -> bool {
        self.permissions.remove(permission)
    }

    pub fn access_level(&self) -> AccessLevel {
        self.access_level
    }

    pub fn set_access_level(&mut self, level: AccessLevel) {
        self.access_level = level;
    }

    /// Recorded call timestamps for one action, oldest first.
    pub fn call_history(&self, action: &str) -> Option<&VecDeque<Instant>> {
        self.call_history.get(action)
    }

    pub fn call_history_mut(&mut self, action: &str) -> &mut VecDeque<Instant> {
        self.call_history.entry(action.to_string()).or_default()
    }

    pub fn warnings(&self) -> u32 {
        self.warnings
    }

    pub fn add_warning(&mut self) -> u32 {
        self.warnings += 1;
        self.warnings
    }

    pub fn note_chat(&mut self, chat_id: ChatId) {
        self.chats.insert(chat_id);
    }

    pub fn seen_in(&self, chat_id: ChatId) -> bool {
        self.chats.contains(&chat_id)
    }

    pub fn last_seen(&self) -> Instant {
        self.last_seen
    }

    /// Whether anything worth keeping was set beyond the seeded role.
    fn is_customized(&self, level: AccessLevel, permissions: &BTreeSet<String>) -> bool {
        self.access_level != level || &self.permissions != permissions || self.warnings > 0
    }
}

/// Roles and permissions granted to callers when their session is created.
#[derive(Clone, Debug, Default)]
pub struct RoleGrants {
    pub owner_id: Option<UserId>,
    pub admins: Vec<UserId>,
    pub admin_permissions: Vec<String>,
}

impl RoleGrants {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            owner_id: cfg.owner_id.map(UserId),
            admins: cfg.admin_users.iter().copied().map(UserId).collect(),
            admin_permissions: cfg.admin_permissions.clone(),
        }
    }

    fn seed(&self, user_id: UserId) -> (AccessLevel, BTreeSet<String>) {
        let level = if self.owner_id == Some(user_id) {
            AccessLevel::SuperAdmin
        } else if self.admins.contains(&user_id) {
            AccessLevel::Administrator
        } else {
            return (AccessLevel::User, BTreeSet::new());
        };
        (level, self.admin_permissions.iter().cloned().collect())
    }
}

/// Session store keyed by caller id.
///
/// Each caller has its own lock; a guard pipeline holds it for the whole
/// evaluation so concurrent updates from one caller are serialized.
pub struct SessionStore {
    inner: Mutex<HashMap<UserId, Arc<Mutex<CallerSession>>>>,
    grants: RoleGrants,
    idle_ttl: Duration,
}

impl SessionStore {
    pub fn new(grants: RoleGrants, idle_ttl: Duration) -> Self {
        Self {
            inner: Mutex::new(HashMap::new()),
            grants,
            idle_ttl,
        }
    }

    /// Lock (creating if needed) the session for `user_id`.
    pub async fn session(&self, user_id: UserId) -> OwnedMutexGuard<CallerSession> {
        let lock = {
            let mut map = self.inner.lock().await;
            map.entry(user_id)
                .or_insert_with(|| {
                    let (level, perms) = self.grants.seed(user_id);
                    Arc::new(Mutex::new(CallerSession::new(user_id, level, perms)))
                })
                .clone()
        };
        let mut guard = lock.lock_owned().await;
        guard.last_seen = Instant::now();
        guard
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn evict_idle(&self) -> usize {
        self.evict_idle_at(Instant::now()).await
    }

    /// Drop sessions idle for at least the configured TTL. Sessions that are
    /// locked, referenced elsewhere, or hold grants, levels or warnings that
    /// differ from their seeded role are kept.
    pub async fn evict_idle_at(&self, now: Instant) -> usize {
        let mut map = self.inner.lock().await;
        let before = map.len();
        map.retain(|user_id, entry| {
            if Arc::strong_count(entry) > 1 {
                return true;
            }
            let Ok(s) = entry.try_lock() else {
                return true;
            };
            if now.saturating_duration_since(s.last_seen) < self.idle_ttl {
                return true;
            }
            let (level, permissions) = self.grants.seed(*user_id);
            s.is_customized(level, &permissions)
        });
        before - map.len()
    }

    /// Callers that have used the bot in `chat_id`, ordered by id.
    pub async fn members_of(&self, chat_id: ChatId) -> Vec<(UserId, Option<String>)> {
        let entries = {
            let map = self.inner.lock().await;
            map.values().cloned().collect::<Vec<_>>()
        };

        let mut out = Vec::new();
        for entry in entries {
            let s = entry.lock().await;
            if s.seen_in(chat_id) {
                out.push((s.user_id, s.username.clone()));
            }
        }
        out.sort_by_key(|(id, _)| *id);
        out
    }

    /// Periodically evict idle sessions for the lifetime of the process.
    pub fn spawn_sweeper(self: Arc<Self>, every: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            loop {
                ticker.tick().await;
                let evicted = self.evict_idle().await;
                if evicted > 0 {
                    tracing::debug!(evicted, "evicted idle caller sessions");
                }
            }
        })
    }
}
