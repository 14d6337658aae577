//! Inline keyboard builder and the bot's menu layouts.
//!
//! Every callback token emitted here is parsed back by [`parse_callback`], so
//! the two halves must change together.

use crate::{
    domain::UserId,
    messaging::types::{InlineButton, InlineKeyboard},
};

#[derive(Clone, Debug, Default)]
pub struct KeyboardBuilder {
    rows: Vec<Vec<InlineButton>>,
}

impl KeyboardBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a button to the current row, opening one if needed.
    pub fn add_button(&mut self, button: InlineButton) -> &mut Self {
        match self.rows.last_mut() {
            Some(row) => row.push(button),
            None => self.rows.push(vec![button]),
        }
        self
    }

    pub fn add_callback(&mut self, label: &str, data: impl Into<String>) -> &mut Self {
        self.add_button(InlineButton::callback(label, data))
    }

    /// Append a complete row. Empty input is ignored.
    pub fn add_button_row(&mut self, buttons: Vec<InlineButton>) -> &mut Self {
        if buttons.is_empty() {
            return self;
        }
        self.close_current_row();
        self.rows.push(buttons);
        self.rows.push(Vec::new());
        self
    }

    /// Start a new row. No-op when the current row is still empty.
    pub fn row(&mut self) -> &mut Self {
        self.close_current_row();
        self
    }

    pub fn clear(&mut self) -> &mut Self {
        self.rows.clear();
        self
    }

    pub fn build(&self) -> InlineKeyboard {
        InlineKeyboard::new(
            self.rows
                .iter()
                .filter(|r| !r.is_empty())
                .cloned()
                .collect(),
        )
    }

    fn close_current_row(&mut self) {
        if self.rows.last().is_some_and(|r| !r.is_empty()) {
            self.rows.push(Vec::new());
        }
    }
}

// ============== Menu Layouts ==============

pub const BACK_TO_MAIN: &str = "back_to_main";
pub const BACK_TO_MEMBERS: &str = "back_to_members";
pub const CANCEL: &str = "cancel";

pub fn main_menu() -> InlineKeyboard {
    let mut b = KeyboardBuilder::new();
    b.add_callback("📊 Statistics", "main_stats")
        .row()
        .add_callback("👥 Members", "main_members")
        .add_callback("⚙️ Settings", "main_settings")
        .row()
        .add_callback("❌ Close", "main_close");
    b.build()
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GroupEntry {
    pub id: i64,
    pub name: String,
}

/// One group per row, followed by a back button.
pub fn group_selection(groups: &[GroupEntry]) -> InlineKeyboard {
    let mut b = KeyboardBuilder::new();
    for g in groups {
        b.add_callback(&g.name, format!("group_{}", g.id)).row();
    }
    b.add_callback("⬅️ Back", BACK_TO_MAIN);
    b.build()
}

pub fn member_actions(user_id: UserId) -> InlineKeyboard {
    let mut b = KeyboardBuilder::new();
    b.add_callback("🚫 Kick", format!("kick_{user_id}"))
        .add_callback("🔇 Mute", format!("mute_{user_id}"))
        .row()
        .add_callback("📋 Info", format!("info_{user_id}"))
        .add_callback("⚠️ Warn", format!("warn_{user_id}"))
        .row()
        .add_callback("⬅️ Back", BACK_TO_MEMBERS);
    b.build()
}

pub fn confirmation(confirm_callback: &str, cancel_callback: &str) -> InlineKeyboard {
    let mut b = KeyboardBuilder::new();
    b.add_callback("✅ Confirm", confirm_callback)
        .add_callback("❌ Cancel", cancel_callback);
    b.build()
}

/// Single row: Previous (unless first page), position, Next (unless last page).
/// `page` is 1-indexed.
pub fn pagination(page: u32, total_pages: u32, base_callback: &str) -> InlineKeyboard {
    let mut buttons = Vec::with_capacity(3);
    if page > 1 {
        buttons.push(InlineButton::callback(
            "⬅️ Previous",
            format!("{base_callback}_prev"),
        ));
    }
    buttons.push(InlineButton::callback(
        format!("📄 {page}/{total_pages}"),
        format!("{base_callback}_info"),
    ));
    if page < total_pages {
        buttons.push(InlineButton::callback(
            "Next ➡️",
            format!("{base_callback}_next"),
        ));
    }

    let mut b = KeyboardBuilder::new();
    b.add_button_row(buttons);
    b.build()
}

pub fn settings() -> InlineKeyboard {
    let mut b = KeyboardBuilder::new();
    b.add_callback("🔐 Permissions", "settings_permissions")
        .row()
        .add_callback("📝 Messages", "settings_messages")
        .add_callback("⏱️ Timers", "settings_timers")
        .row()
        .add_callback("🎯 Rules", "settings_rules")
        .row()
        .add_callback("⬅️ Back", BACK_TO_MAIN);
    b.build()
}

pub fn yes_no(callback_prefix: &str) -> InlineKeyboard {
    let mut b = KeyboardBuilder::new();
    b.add_callback("✅ Yes", format!("{callback_prefix}_yes"))
        .add_callback("❌ No", format!("{callback_prefix}_no"));
    b.build()
}

pub fn back_button(callback_data: &str) -> InlineKeyboard {
    let mut b = KeyboardBuilder::new();
    b.add_callback("⬅️ Back", callback_data);
    b.build()
}

/// Lay out `(label, callback)` pairs left to right, `columns` per row.
pub fn multi_action(actions: &[(&str, &str)], columns: usize) -> InlineKeyboard {
    let columns = columns.max(1);
    let mut b = KeyboardBuilder::new();
    for (i, (label, data)) in actions.iter().enumerate() {
        b.add_callback(label, *data);
        if (i + 1) % columns == 0 {
            b.row();
        }
    }
    b.build()
}

// ============== Callback Tokens ==============

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SettingsSection {
    Permissions,
    Messages,
    Timers,
    Rules,
}

impl SettingsSection {
    pub fn title(self) -> &'static str {
        match self {
            SettingsSection::Permissions => "🔐 Permissions",
            SettingsSection::Messages => "📝 Messages",
            SettingsSection::Timers => "⏱️ Timers",
            SettingsSection::Rules => "🎯 Rules",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MemberAction {
    Kick,
    Mute,
    Info,
    Warn,
}

impl MemberAction {
    pub fn as_str(self) -> &'static str {
        match self {
            MemberAction::Kick => "kick",
            MemberAction::Mute => "mute",
            MemberAction::Info => "info",
            MemberAction::Warn => "warn",
        }
    }

    /// Destructive actions go through a confirmation keyboard first.
    pub fn needs_confirmation(self) -> bool {
        matches!(self, MemberAction::Kick | MemberAction::Mute)
    }

    pub fn confirm_callback(self, user_id: UserId) -> String {
        format!("confirm_{}_{user_id}", self.as_str())
    }
}

/// A parsed callback token from one of the menu keyboards.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MenuAction {
    MainMenu,
    Stats,
    Members,
    Settings,
    Close,
    Cancel,
    SettingsSection(SettingsSection),
    /// A page of the member list, 1-indexed.
    MembersPage(u32),
    Group(i64),
    Member {
        action: MemberAction,
        user_id: UserId,
    },
    Confirmed {
        action: MemberAction,
        user_id: UserId,
    },
    Unknown(String),
}

pub fn parse_callback(data: &str) -> MenuAction {
    match data {
        BACK_TO_MAIN => return MenuAction::MainMenu,
        "main_stats" => return MenuAction::Stats,
        "main_members" | BACK_TO_MEMBERS => return MenuAction::Members,
        "main_settings" => return MenuAction::Settings,
        "main_close" => return MenuAction::Close,
        CANCEL => return MenuAction::Cancel,
        "settings_permissions" => return MenuAction::SettingsSection(SettingsSection::Permissions),
        "settings_messages" => return MenuAction::SettingsSection(SettingsSection::Messages),
        "settings_timers" => return MenuAction::SettingsSection(SettingsSection::Timers),
        "settings_rules" => return MenuAction::SettingsSection(SettingsSection::Rules),
        _ => {}
    }

    if let Some(id) = data.strip_prefix("group_").and_then(|s| s.parse().ok()) {
        return MenuAction::Group(id);
    }

    if let Some(page) = data.strip_prefix("members_").and_then(parse_page_token) {
        return MenuAction::MembersPage(page);
    }

    if let Some(rest) = data.strip_prefix("confirm_") {
        if let Some((action, user_id)) = parse_member_token(rest) {
            if action.needs_confirmation() {
                return MenuAction::Confirmed { action, user_id };
            }
        }
        return MenuAction::Unknown(data.to_string());
    }

    match parse_member_token(data) {
        Some((action, user_id)) => MenuAction::Member { action, user_id },
        None => MenuAction::Unknown(data.to_string()),
    }
}

/// `{page}_{prev|info|next}` as emitted by [`pagination`] with a
/// `members_{page}` base.
fn parse_page_token(s: &str) -> Option<u32> {
    let (page, step) = s.split_once('_')?;
    let page = page.parse::<u32>().ok()?.max(1);
    match step {
        "prev" => Some(page.saturating_sub(1).max(1)),
        "info" => Some(page),
        "next" => Some(page.saturating_add(1)),
        _ => None,
    }
}

fn parse_member_token(s: &str) -> Option<(MemberAction, UserId)> {
    let (name, id) = s.split_once('_')?;
    let action = match name {
        "kick" => MemberAction::Kick,
        "mute" => MemberAction::Mute,
        "info" => MemberAction::Info,
        "warn" => MemberAction::Warn,
        _ => return None,
    };
    let id = id.parse::<i64>().ok()?;
    Some((action, UserId(id)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messaging::types::ButtonAction;

    #[test]
    fn builder_keeps_buttons_on_current_row_until_row_is_called() {
        let mut b = KeyboardBuilder::new();
        b.add_callback("a", "1")
            .add_callback("b", "2")
            .row()
            .row()
            .add_callback("c", "3");
        assert_eq!(b.build().labels(), vec![vec!["a", "b"], vec!["c"]]);
    }

    #[test]
    fn builder_button_row_is_closed_and_empty_rows_dropped() {
        let mut b = KeyboardBuilder::new();
        b.add_button_row(vec![]);
        assert!(b.build().is_empty());

        b.add_callback("x", "x")
            .add_button_row(vec![
                InlineButton::url("docs", "https://example.org"),
                InlineButton::switch_inline_query("share", "q"),
            ])
            .add_callback("y", "y");
        let kb = b.build();
        assert_eq!(
            kb.labels(),
            vec![vec!["x"], vec!["docs", "share"], vec!["y"]]
        );
        assert_eq!(
            kb.rows[1][0].action,
            ButtonAction::Url("https://example.org".to_string())
        );

        b.clear();
        assert!(b.build().rows.is_empty());
    }

    #[test]
    fn main_menu_and_settings_layouts() {
        assert_eq!(
            main_menu().labels(),
            vec![
                vec!["📊 Statistics"],
                vec!["👥 Members", "⚙️ Settings"],
                vec!["❌ Close"],
            ]
        );
        let s = settings();
        assert_eq!(s.rows.len(), 4);
        assert_eq!(s.rows[1].len(), 2);
        assert_eq!(s.rows[3][0].callback_data(), Some(BACK_TO_MAIN));
    }

    #[test]
    fn member_actions_embed_user_id() {
        let kb = member_actions(UserId(77));
        let data: Vec<_> = kb
            .rows
            .iter()
            .flatten()
            .filter_map(|b| b.callback_data())
            .collect();
        assert_eq!(
            data,
            vec!["kick_77", "mute_77", "info_77", "warn_77", BACK_TO_MEMBERS]
        );
    }

    #[test]
    fn pagination_hides_edges() {
        let first = pagination(1, 3, "p");
        assert_eq!(first.labels(), vec![vec!["📄 1/3", "Next ➡️"]]);

        let middle = pagination(2, 3, "p");
        assert_eq!(middle.rows[0].len(), 3);
        assert_eq!(middle.rows[0][0].callback_data(), Some("p_prev"));

        let last = pagination(3, 3, "p");
        assert_eq!(last.labels(), vec![vec!["⬅️ Previous", "📄 3/3"]]);
    }

    #[test]
    fn multi_action_wraps_by_columns() {
        let actions = [("a", "1"), ("b", "2"), ("c", "3")];
        assert_eq!(
            multi_action(&actions, 2).labels(),
            vec![vec!["a", "b"], vec!["c"]]
        );
        assert_eq!(multi_action(&actions, 0).rows.len(), 3);
    }

    #[test]
    fn group_selection_confirmation_and_small_keyboards() {
        let groups = vec![
            GroupEntry {
                id: -100,
                name: "Ops".to_string(),
            },
            GroupEntry {
                id: -200,
                name: "Dev".to_string(),
            },
        ];
        let kb = group_selection(&groups);
        assert_eq!(kb.labels(), vec![vec!["Ops"], vec!["Dev"], vec!["⬅️ Back"]]);
        assert_eq!(kb.rows[0][0].callback_data(), Some("group_-100"));

        assert_eq!(confirmation("ok", CANCEL).rows[0].len(), 2);
        assert_eq!(yes_no("ban").rows[0][1].callback_data(), Some("ban_no"));
        assert_eq!(back_button("x").rows[0][0].callback_data(), Some("x"));
    }

    #[test]
    fn callback_tokens_round_trip_through_parser() {
        assert_eq!(parse_callback("main_stats"), MenuAction::Stats);
        assert_eq!(parse_callback(BACK_TO_MEMBERS), MenuAction::Members);
        assert_eq!(
            parse_callback("settings_timers"),
            MenuAction::SettingsSection(SettingsSection::Timers)
        );
        assert_eq!(parse_callback("group_-100"), MenuAction::Group(-100));
        assert_eq!(
            parse_callback("warn_5"),
            MenuAction::Member {
                action: MemberAction::Warn,
                user_id: UserId(5)
            }
        );
        assert_eq!(
            parse_callback(&MemberAction::Kick.confirm_callback(UserId(9))),
            MenuAction::Confirmed {
                action: MemberAction::Kick,
                user_id: UserId(9)
            }
        );
        assert!(matches!(
            parse_callback("confirm_warn_9"),
            MenuAction::Unknown(_)
        ));
        assert!(matches!(parse_callback("kick_abc"), MenuAction::Unknown(_)));
    }

    #[test]
    fn member_page_tokens_step_from_their_base() {
        let kb = pagination(2, 3, "members_2");
        let pages: Vec<_> = kb.rows[0]
            .iter()
            .filter_map(|b| b.callback_data())
            .map(parse_callback)
            .collect();
        assert_eq!(
            pages,
            vec![
                MenuAction::MembersPage(1),
                MenuAction::MembersPage(2),
                MenuAction::MembersPage(3),
            ]
        );
        assert_eq!(parse_callback("members_1_prev"), MenuAction::MembersPage(1));
        assert_eq!(parse_callback("members_0_info"), MenuAction::MembersPage(1));
        assert!(matches!(
            parse_callback("members_2_last"),
            MenuAction::Unknown(_)
        ));
    }
}
