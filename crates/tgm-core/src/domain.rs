use std::fmt;

/// Telegram user id (numeric).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UserId(pub i64);

/// Telegram chat id (numeric).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ChatId(pub i64);

/// Telegram message id (numeric).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MessageId(pub i32);

/// A stable reference to a Telegram message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MessageRef {
    pub chat_id: ChatId,
    pub message_id: MessageId,
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for ChatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The identity issuing a command, as reported by the update.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Caller {
    pub id: UserId,
    pub username: Option<String>,
}

impl Caller {
    pub fn new(id: i64, username: Option<String>) -> Self {
        Self {
            id: UserId(id),
            username,
        }
    }

    /// Handle used in logs and audit records.
    pub fn display_name(&self) -> &str {
        self.username.as_deref().unwrap_or("unknown")
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ChatKind {
    Private,
    Group,
    Supergroup,
    Channel,
}

impl ChatKind {
    pub fn is_group(self) -> bool {
        matches!(self, ChatKind::Group | ChatKind::Supergroup)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ChatKind::Private => "private",
            ChatKind::Group => "group",
            ChatKind::Supergroup => "supergroup",
            ChatKind::Channel => "channel",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Chat {
    pub id: ChatId,
    pub kind: ChatKind,
}

impl Chat {
    pub fn new(id: i64, kind: ChatKind) -> Self {
        Self {
            id: ChatId(id),
            kind,
        }
    }
}

/// Ordered role tier. A requirement of level L is met by any level >= L.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AccessLevel {
    #[default]
    User = 0,
    Moderator = 1,
    Administrator = 2,
    SuperAdmin = 3,
}

impl AccessLevel {
    pub const ALL: [AccessLevel; 4] = [
        AccessLevel::User,
        AccessLevel::Moderator,
        AccessLevel::Administrator,
        AccessLevel::SuperAdmin,
    ];

    pub fn from_u8(level: u8) -> Option<Self> {
        Self::ALL.get(level as usize).copied()
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }

    pub fn label(self) -> &'static str {
        match self {
            AccessLevel::User => "User",
            AccessLevel::Moderator => "Moderator",
            AccessLevel::Administrator => "Administrator",
            AccessLevel::SuperAdmin => "Super Admin",
        }
    }
}

/// Membership status of a user in a chat, as returned by the Bot API.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MemberStatus {
    Creator,
    Administrator,
    Member,
    Restricted,
    Left,
    Banned,
}

impl MemberStatus {
    pub fn is_admin(self) -> bool {
        matches!(self, MemberStatus::Creator | MemberStatus::Administrator)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn access_levels_are_totally_ordered() {
        for (i, a) in AccessLevel::ALL.iter().enumerate() {
            for (j, b) in AccessLevel::ALL.iter().enumerate() {
                assert_eq!(a >= b, i >= j);
            }
        }
        assert_eq!(AccessLevel::from_u8(2), Some(AccessLevel::Administrator));
        assert_eq!(AccessLevel::from_u8(4), None);
        assert_eq!(AccessLevel::SuperAdmin.label(), "Super Admin");
    }

    #[test]
    fn only_creator_and_administrator_are_admins() {
        assert!(MemberStatus::Creator.is_admin());
        assert!(MemberStatus::Administrator.is_admin());
        assert!(!MemberStatus::Member.is_admin());
        assert!(!MemberStatus::Restricted.is_admin());
    }
}
