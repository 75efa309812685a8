// Copyright 2026 DungeonGate Contributors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Menu Engine: composes `banner.rs` and `line_editor.rs` into the
//! per-role top-level menus and the login/register/change-password
//! forms.

use std::path::Path;

use tracing::warn;

use crate::menu::banner::{render, BannerCache, BannerVars};
use crate::menu::line_editor::{read_keystroke, read_line, EchoMode, LineResult};
use crate::ssh::channel_io::ChannelIo;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuRole {
    Anonymous,
    User,
    Admin,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MenuAction {
    Login,
    Register,
    Watch,
    Credits,
    Quit,
    Play,
    EditProfile,
    Recordings,
    Statistics,
    Unlock,
    Delete,
    ResetPassword,
    AddAdmin,
    ServerStats,
    Disconnected,
}

fn default_template(role: MenuRole) -> &'static str {
    match role {
        MenuRole::Anonymous => {
            "=== DungeonGate $SERVERID ===\n$DATE $TIME $TIMEZONE  (up $UPTIME)\nv$VERSION\n\n\
             (l)ogin  (r)egister  (w)atch  (c)redits  (q)uit\n> "
        }
        MenuRole::User => {
            "=== DungeonGate $SERVERID ===\n$DATE $TIME $TIMEZONE  (up $UPTIME)\nv$VERSION\nWelcome, $USERNAME\n\n\
             (p)lay  (w)atch  (e)dit profile  (r)ecordings  (s)tatistics  (c)redits  (q)uit\n> "
        }
        MenuRole::Admin => {
            "=== DungeonGate $SERVERID [admin] ===\n$DATE $TIME $TIMEZONE  (up $UPTIME)\nv$VERSION\nWelcome, $USERNAME\n\n\
             (p)lay  (w)atch  (e)dit profile  (r)ecordings  (s)tatistics  (c)redits\n\
             (u)nlock  (d)elete  reset password(R)  (a)dd admin  server (S)tats  (q)uit\n> "
        }
    }
}

fn load_template(path: &Path, role: MenuRole) -> String {
    match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "banner template unreadable, using built-in default");
            default_template(role).to_string()
        }
    }
}

fn banner_key(role: MenuRole, username: &Option<String>) -> String {
    format!("{role:?}:{}", username.as_deref().unwrap_or(""))
}

#[allow(clippy::too_many_arguments)]
async fn render_menu_banner(
    channel: &mut ChannelIo,
    role: MenuRole,
    path: &Path,
    cache: &BannerCache,
    vars: &BannerVars,
    utf8: bool,
) -> anyhow::Result<()> {
    let key = banner_key(role, &vars.username);
    let template = load_template(path, role);
    let rendered = cache.get_or_render(&key, || render(&template, vars, utf8));
    channel.write_all(rendered.as_bytes()).await
}

fn parse_action(role: MenuRole, c: char) -> Option<MenuAction> {
    match (role, c) {
        (MenuRole::Anonymous, 'l') => Some(MenuAction::Login),
        (MenuRole::Anonymous, 'r') => Some(MenuAction::Register),
        (MenuRole::Anonymous, 'w') => Some(MenuAction::Watch),
        (MenuRole::Anonymous, 'c') => Some(MenuAction::Credits),
        (MenuRole::Anonymous, 'q') => Some(MenuAction::Quit),

        (MenuRole::User | MenuRole::Admin, 'p') => Some(MenuAction::Play),
        (MenuRole::User | MenuRole::Admin, 'w') => Some(MenuAction::Watch),
        (MenuRole::User | MenuRole::Admin, 'e') => Some(MenuAction::EditProfile),
        (MenuRole::User | MenuRole::Admin, 'r') => Some(MenuAction::Recordings),
        (MenuRole::User | MenuRole::Admin, 's') => Some(MenuAction::Statistics),
        (MenuRole::User | MenuRole::Admin, 'c') => Some(MenuAction::Credits),
        (MenuRole::User | MenuRole::Admin, 'q') => Some(MenuAction::Quit),

        (MenuRole::Admin, 'u') => Some(MenuAction::Unlock),
        (MenuRole::Admin, 'd') => Some(MenuAction::Delete),
        (MenuRole::Admin, 'R') => Some(MenuAction::ResetPassword),
        (MenuRole::Admin, 'a') => Some(MenuAction::AddAdmin),
        (MenuRole::Admin, 'S') => Some(MenuAction::ServerStats),
        _ => None,
    }
}

/// Renders the role's banner and reads a single keystroke, redrawing with a
/// one-second error flash on any input outside the legal set.
pub async fn prompt_menu(
    channel: &mut ChannelIo,
    role: MenuRole,
    path: &Path,
    cache: &BannerCache,
    vars: &BannerVars,
    utf8: bool,
) -> anyhow::Result<MenuAction> {
    loop {
        render_menu_banner(channel, role, path, cache, vars, utf8).await?;
        let Some(c) = read_keystroke(channel).await? else {
            return Ok(MenuAction::Disconnected);
        };
        if let Some(action) = parse_action(role, c) {
            return Ok(action);
        }
        channel.write_crlf("\nInvalid selection.\n").await?;
        tokio::time::sleep(std::time::Duration::from_secs(1)).await;
    }
}

/// Reads a numbered game-selection list; `None` on `q` or disconnect.
pub async fn prompt_game_selection(
    channel: &mut ChannelIo,
    games: &[(String, String)],
) -> anyhow::Result<Option<String>> {
    loop {
        let mut out = String::from("Select a game:\n");
        for (i, (_, name)) in games.iter().enumerate() {
            out.push_str(&format!("  {}) {}\n", i + 1, name));
        }
        out.push_str("(q) back\n> ");
        channel.write_crlf(&out).await?;

        let Some(c) = read_keystroke(channel).await? else { return Ok(None) };
        if c == 'q' {
            return Ok(None);
        }
        if let Some(digit) = c.to_digit(10) {
            let idx = digit as usize;
            if idx >= 1 && idx <= games.len() {
                return Ok(Some(games[idx - 1].0.clone()));
            }
        }
        channel.write_crlf("\nInvalid selection.\n").await?;
        tokio::time::sleep(std::time::Duration::from_secs(1)).await;
    }
}

pub struct LoginForm {
    pub username: String,
    pub password: String,
}

pub async fn prompt_login(channel: &mut ChannelIo) -> anyhow::Result<Option<LoginForm>> {
    channel.write_crlf("Username: ").await?;
    let username = match read_line(channel, EchoMode::Plain).await? {
        LineResult::Line(l) => l,
        LineResult::Cancelled | LineResult::Disconnected => return Ok(None),
    };
    channel.write_crlf("Password: ").await?;
    let password = match read_line(channel, EchoMode::Masked).await? {
        LineResult::Line(l) => l,
        LineResult::Cancelled | LineResult::Disconnected => return Ok(None),
    };
    Ok(Some(LoginForm { username, password }))
}

pub struct RegisterForm {
    pub username: String,
    pub password: String,
    pub email: String,
}

pub async fn prompt_register(channel: &mut ChannelIo) -> anyhow::Result<Option<RegisterForm>> {
    channel.write_crlf("Choose a username: ").await?;
    let username = match read_line(channel, EchoMode::Plain).await? {
        LineResult::Line(l) => l,
        _ => return Ok(None),
    };
    channel.write_crlf("Choose a password: ").await?;
    let password = match read_line(channel, EchoMode::Masked).await? {
        LineResult::Line(l) => l,
        _ => return Ok(None),
    };
    channel.write_crlf("Email (optional): ").await?;
    let email = match read_line(channel, EchoMode::OptionalPlain).await? {
        LineResult::Line(l) => l,
        _ => return Ok(None),
    };
    Ok(Some(RegisterForm { username, password, email }))
}

pub struct ChangePasswordForm {
    pub old_password: String,
    pub new_password: String,
}

pub async fn prompt_change_password(channel: &mut ChannelIo) -> anyhow::Result<Option<ChangePasswordForm>> {
    channel.write_crlf("Current password: ").await?;
    let old_password = match read_line(channel, EchoMode::Masked).await? {
        LineResult::Line(l) => l,
        _ => return Ok(None),
    };
    channel.write_crlf("New password: ").await?;
    let new_password = match read_line(channel, EchoMode::Masked).await? {
        LineResult::Line(l) => l,
        _ => return Ok(None),
    };
    Ok(Some(ChangePasswordForm { old_password, new_password }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn anonymous_actions_are_a_strict_subset() {
        assert_eq!(parse_action(MenuRole::Anonymous, 'l'), Some(MenuAction::Login));
        assert_eq!(parse_action(MenuRole::Anonymous, 'u'), None);
    }

    #[test]
    fn admin_adds_management_actions_over_user() {
        assert_eq!(parse_action(MenuRole::User, 'u'), None);
        assert_eq!(parse_action(MenuRole::Admin, 'u'), Some(MenuAction::Unlock));
        assert_eq!(parse_action(MenuRole::Admin, 'p'), Some(MenuAction::Play));
    }
}
