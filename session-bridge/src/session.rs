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

//! Per-connection session state machine: resolves identity, enforces the
//! forced password-change gate, runs the Menu Engine loop, and dispatches
//! into the Game I/O Proxy or Spectator Path. One task owns everything
//! about a session end to end and tears it all down on the way out.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Local;
use tokio::sync::mpsc;
use tracing::warn;
use uuid::Uuid;

use dungeongate_common::tty::TermSize;
use dungeongate_protocol::{
    authsvc::{
        AuthServiceReply, AuthServiceRequest, ChangePasswordRequest, DeleteUserAccountRequest,
        GetServerStatisticsRequest, PromoteUserToAdminRequest, ResetUserPasswordRequest,
        UnlockUserAccountRequest,
    },
    client::{AuthServiceClient, GameServiceClient},
    gamesvc::{
        GameServiceReply, GameServiceRequest, ListGamesRequest, StartGameSessionFlags,
        StartGameSessionRequest,
    },
};

use crate::admission::{AdmissionController, Admitted};
use crate::auth::{AuthAdapter, Identity};
use crate::config::Config;
use crate::gameio::{self, ProxyExit, TerminalEvent};
use crate::menu::banner::{BannerCache, BannerVars};
use crate::menu::engine::{self, MenuAction, MenuRole};
use crate::menu::line_editor::clamp_term_size;
use crate::service_unavailable;
use crate::spectator;
use crate::ssh::channel_io::{ChannelEvent, ChannelIo};

/// Shared, connection-independent dependencies every session task needs:
/// the two RPC clients, the banner cache, admission accounting, and the
/// handful of values (server id, version, start time) banners substitute.
pub struct SessionDeps {
    pub config: Arc<Config>,
    pub auth_client: AuthServiceClient,
    pub game_client: GameServiceClient,
    pub game_io_addr: SocketAddr,
    pub banner_cache: BannerCache,
    pub admission: Arc<AdmissionController>,
    pub server_id: String,
    pub version: String,
    pub started_at: Instant,
}

impl SessionDeps {
    fn banner_vars(&self, identity: &Identity) -> BannerVars {
        let now = Local::now();
        BannerVars {
            server_id: self.server_id.clone(),
            version: self.version.clone(),
            uptime: self.started_at.elapsed(),
            username: if identity.is_authenticated() { Some(identity.username.clone()) } else { None },
            date: now.format("%Y-%m-%d").to_string(),
            time: now.format("%H:%M:%S").to_string(),
            timezone: now.format("%Z").to_string(),
        }
    }

    fn role_for(&self, identity: &Identity) -> MenuRole {
        if !identity.is_authenticated() {
            MenuRole::Anonymous
        } else if identity.is_admin {
            MenuRole::Admin
        } else {
            MenuRole::User
        }
    }

    fn banner_path(&self, role: MenuRole) -> &Path {
        match role {
            MenuRole::Anonymous => &self.config.menu.banners.main_anon,
            MenuRole::User => &self.config.menu.banners.main_user,
            MenuRole::Admin => &self.config.menu.banners.main_admin,
        }
    }
}

/// Entry point handed off from `shell_request`. Owns `channel` and
/// `admitted` for the lifetime of the connection; always releases
/// admission accounting and closes the channel on the way out, whichever
/// branch below returned.
pub async fn run(
    mut channel: ChannelIo,
    deps: Arc<SessionDeps>,
    mut identity: Identity,
    env: HashMap<String, String>,
    term_type: String,
    admitted: Admitted,
) {
    if let Err(e) = run_inner(&mut channel, &deps, &mut identity, &env, &term_type).await {
        warn!(error = %e, "session ended with an error");
    }
    deps.admission.release(admitted);
    channel.close().await;
}

async fn run_inner(
    channel: &mut ChannelIo,
    deps: &Arc<SessionDeps>,
    identity: &mut Identity,
    env: &HashMap<String, String>,
    term_type: &str,
) -> anyhow::Result<()> {
    let auth_adapter = AuthAdapter {
        client: &deps.auth_client,
        shared_password: deps.config.ssh.ssh_password.as_deref(),
        allowed_username: deps.config.ssh.allowed_username.as_deref(),
    };

    // A DGAUTH retry at shell time, only if auth_password (or auth_none)
    // left the identity anonymous.
    if !identity.is_authenticated() {
        *identity = auth_adapter.resolve(&identity.username, "", env).await;
    }
    if identity.is_authenticated() {
        auth_adapter.refresh_user_info(identity).await;
    }

    let mut breaker = service_unavailable::CircuitBreaker::new(
        deps.config.circuit_breaker_threshold.0,
        deps.config.circuit_breaker_timeout.0.as_duration(),
    );

    loop {
        if !deps.auth_client.is_healthy().await || !deps.game_client.is_healthy().await {
            match service_unavailable::run(channel, &deps.auth_client, &deps.game_client, &mut breaker).await? {
                service_unavailable::Outcome::Recovered => {}
                service_unavailable::Outcome::UserQuit | service_unavailable::Outcome::TimedOut => {
                    return Ok(())
                }
            }
        }

        if identity.requires_password_change() {
            if !force_password_change(channel, deps, identity).await? {
                return Ok(());
            }
            continue;
        }

        let role = deps.role_for(identity);
        let vars = deps.banner_vars(identity);
        let banner_path = deps.banner_path(role).to_path_buf();
        let action =
            engine::prompt_menu(channel, role, &banner_path, &deps.banner_cache, &vars, true).await?;

        match action {
            MenuAction::Disconnected | MenuAction::Quit => return Ok(()),
            MenuAction::Login => handle_login(channel, &auth_adapter, identity, env).await?,
            MenuAction::Register => handle_register(channel, &auth_adapter, identity).await?,
            MenuAction::Play => play_game(channel, deps, identity, term_type).await?,
            MenuAction::Watch => watch_game(channel, deps, identity, term_type).await?,
            MenuAction::EditProfile => handle_edit_profile(channel, deps, identity).await?,
            MenuAction::Recordings | MenuAction::Statistics | MenuAction::Credits => {
                channel.write_crlf("\nNot available in this session.\n").await?;
                tokio::time::sleep(Duration::from_secs(1)).await;
            }
            MenuAction::Unlock
            | MenuAction::Delete
            | MenuAction::ResetPassword
            | MenuAction::AddAdmin
            | MenuAction::ServerStats => {
                run_admin_action(channel, deps, identity, action).await?;
            }
        }
    }
}

async fn handle_login(
    channel: &mut ChannelIo,
    auth_adapter: &AuthAdapter<'_>,
    identity: &mut Identity,
    env: &HashMap<String, String>,
) -> anyhow::Result<()> {
    let Some(form) = engine::prompt_login(channel).await? else { return Ok(()) };
    let resolved = auth_adapter.resolve(&form.username, &form.password, env).await;
    if resolved.is_authenticated() {
        *identity = resolved;
        auth_adapter.refresh_user_info(identity).await;
    } else {
        channel.write_crlf("\nLogin failed.\n").await?;
        tokio::time::sleep(Duration::from_secs(2)).await;
    }
    Ok(())
}

async fn handle_register(
    channel: &mut ChannelIo,
    auth_adapter: &AuthAdapter<'_>,
    identity: &mut Identity,
) -> anyhow::Result<()> {
    let Some(form) = engine::prompt_register(channel).await? else { return Ok(()) };
    match auth_adapter.register(&form.username, &form.password, &form.email).await {
        Ok(new_identity) => *identity = new_identity,
        Err(e) => {
            channel.write_crlf(&format!("\nRegistration failed: {e}\n")).await?;
            tokio::time::sleep(Duration::from_secs(2)).await;
        }
    }
    Ok(())
}

async fn handle_edit_profile(
    channel: &mut ChannelIo,
    deps: &Arc<SessionDeps>,
    identity: &mut Identity,
) -> anyhow::Result<()> {
    let Some(form) = engine::prompt_change_password(channel).await? else { return Ok(()) };
    change_password(channel, deps, identity, &form.old_password, &form.new_password).await
}

async fn change_password(
    channel: &mut ChannelIo,
    deps: &Arc<SessionDeps>,
    identity: &Identity,
    old_password: &str,
    new_password: &str,
) -> anyhow::Result<()> {
    let Some(token) = identity.access_token.clone() else {
        channel.write_crlf("\nYou must be logged in to change your password.\n").await?;
        return Ok(());
    };
    let reply = deps
        .auth_client
        .call(AuthServiceRequest::ChangePassword(ChangePasswordRequest {
            token,
            old_password: old_password.to_string(),
            new_password: new_password.to_string(),
        }))
        .await?;
    match reply {
        AuthServiceReply::ChangePassword(r) if r.success => {
            channel.write_crlf("\nPassword changed.\n").await?;
        }
        AuthServiceReply::ChangePassword(r) => {
            channel.write_crlf(&format!("\nChange failed: {}\n", r.error.unwrap_or_default())).await?;
        }
        other => anyhow::bail!("expected ChangePassword reply, got {other:?}"),
    }
    tokio::time::sleep(Duration::from_secs(1)).await;
    Ok(())
}

/// Forces the change-password flow before any other menu action is
/// accepted, when the identity carries a "require password change"
/// marker. Returns `false` if the user cancels/disconnects out of the
/// forced flow.
async fn force_password_change(
    channel: &mut ChannelIo,
    deps: &Arc<SessionDeps>,
    identity: &mut Identity,
) -> anyhow::Result<bool> {
    channel.write_crlf("\nYou must change your password before continuing.\n").await?;
    let Some(form) = engine::prompt_change_password(channel).await? else { return Ok(false) };
    change_password(channel, deps, identity, &form.old_password, &form.new_password).await?;
    auth_adapter_refresh(deps, identity).await;
    Ok(true)
}

async fn auth_adapter_refresh(deps: &Arc<SessionDeps>, identity: &mut Identity) {
    let adapter = AuthAdapter {
        client: &deps.auth_client,
        shared_password: deps.config.ssh.ssh_password.as_deref(),
        allowed_username: deps.config.ssh.allowed_username.as_deref(),
    };
    adapter.refresh_user_info(identity).await;
}

async fn list_games(deps: &Arc<SessionDeps>) -> anyhow::Result<Vec<(String, String)>> {
    let reply = deps
        .game_client
        .call(GameServiceRequest::ListGames(ListGamesRequest {
            enabled_only: true,
            limit: 100,
            offset: 0,
        }))
        .await?;
    match reply {
        GameServiceReply::ListGames(r) => Ok(r.games.into_iter().map(|g| (g.game_id, g.name)).collect()),
        other => anyhow::bail!("expected ListGames reply, got {other:?}"),
    }
}

async fn play_game(
    channel: &mut ChannelIo,
    deps: &Arc<SessionDeps>,
    identity: &Identity,
    term_type: &str,
) -> anyhow::Result<()> {
    let games = match list_games(deps).await {
        Ok(games) => games,
        Err(e) => {
            channel.write_crlf(&format!("\nCould not load game list: {e}\n")).await?;
            return Ok(());
        }
    };
    if games.is_empty() {
        channel.write_crlf("\nNo games are currently available.\n").await?;
        return Ok(());
    }
    let Some(game_id) = engine::prompt_game_selection(channel, &games).await? else { return Ok(()) };

    let term_size = clamp_term_size(
        channel.current_term_size(),
        deps.config.max_terminal_cols,
        deps.config.max_terminal_rows,
    );

    // Dial the Game I/O stream concurrently with `StartGameSession` (spec
    // §4.4 step 1: open the stream before the call returns, so the
    // connection is already up by the time the game process — spawned as
    // a side effect of this very call — starts writing its splash
    // screen). We don't yet know `session_id` to send `Connect`, but the
    // TCP handshake and version negotiation are done either way.
    let (stream_result, reply) = tokio::join!(
        dungeongate_protocol::client::GameIoStream::connect(deps.game_io_addr),
        deps.game_client.call(GameServiceRequest::StartGameSession(StartGameSessionRequest {
            user_id: identity.user_id,
            username: identity.username.clone(),
            game_id,
            term_size,
            flags: StartGameSessionFlags::default(),
        })),
    );

    let session_id = match reply {
        Ok(GameServiceReply::StartGameSession(r)) if r.success => {
            r.session.map(|s| s.session_id)
        }
        Ok(GameServiceReply::StartGameSession(r)) => {
            channel
                .write_crlf(&format!("\nFailed to start game session: {}\n", r.error.unwrap_or_default()))
                .await?;
            tokio::time::sleep(Duration::from_secs(2)).await;
            None
        }
        Ok(other) => anyhow::bail!("expected StartGameSession reply, got {other:?}"),
        Err(e) => {
            channel.write_crlf(&format!("\nFailed to start game session: {e}\n")).await?;
            tokio::time::sleep(Duration::from_secs(2)).await;
            None
        }
    };
    let Some(session_id) = session_id else { return Ok(()) };

    let stream = match stream_result {
        Ok(stream) => stream,
        Err(e) => {
            channel.write_crlf(&format!("\nFailed to connect to game host: {e}\n")).await?;
            tokio::time::sleep(Duration::from_secs(2)).await;
            return Ok(());
        }
    };

    run_game_io_and_report(channel, stream, session_id, term_size, term_type, None).await
}

async fn watch_game(
    channel: &mut ChannelIo,
    deps: &Arc<SessionDeps>,
    identity: &Identity,
    term_type: &str,
) -> anyhow::Result<()> {
    let Some(session_id) = spectator::choose_session(channel, &deps.game_client).await? else {
        return Ok(());
    };

    // Session id is already known here, so dial the stream concurrently
    // with `AddSpectator` for the same reason as `play_game`: the stream
    // is ready the instant the spectator subscription is confirmed.
    let (stream_result, add_result) = tokio::join!(
        dungeongate_protocol::client::GameIoStream::connect(deps.game_io_addr),
        spectator::add_spectator(&deps.game_client, session_id, identity.user_id, &identity.username),
    );

    if let Err(e) = add_result {
        channel.write_crlf(&format!("\nCould not join as spectator: {e}\n")).await?;
        tokio::time::sleep(Duration::from_secs(2)).await;
        return Ok(());
    }
    let stream = match stream_result {
        Ok(stream) => stream,
        Err(e) => {
            channel.write_crlf(&format!("\nFailed to connect to game host: {e}\n")).await?;
            tokio::time::sleep(Duration::from_secs(2)).await;
            spectator::remove_spectator(&deps.game_client, session_id, identity.user_id).await;
            return Ok(());
        }
    };

    let term_size = clamp_term_size(
        channel.current_term_size(),
        deps.config.max_terminal_cols,
        deps.config.max_terminal_rows,
    );
    let result =
        run_game_io_and_report(channel, stream, session_id, term_size, term_type, Some(identity.user_id)).await;
    spectator::remove_spectator(&deps.game_client, session_id, identity.user_id).await;
    result
}

/// Runs the Game I/O Proxy pump and prints the "Game ended" teardown
/// message for the outcomes that warrant it.
async fn run_game_io_and_report(
    channel: &mut ChannelIo,
    stream: dungeongate_protocol::client::GameIoStream,
    session_id: Uuid,
    term_size: TermSize,
    term_type: &str,
    spectator_user_id: Option<i32>,
) -> anyhow::Result<()> {
    let exit = run_game_io_proxy(channel, stream, session_id, term_size, term_type, spectator_user_id).await;
    match exit {
        Ok(ProxyExit::ProcessExited) | Ok(ProxyExit::SessionTerminated) => {
            channel.write_all(b"\x1b[2J\x1b[H").await?;
            channel.write_crlf("Game ended.\n").await?;
            tokio::time::sleep(Duration::from_secs(2)).await;
            Ok(())
        }
        Ok(ProxyExit::CallerDisconnected) | Ok(ProxyExit::TransportError) => Ok(()),
        Err(e) => {
            channel.write_crlf(&format!("\nConnection to game host lost: {e}\n")).await?;
            tokio::time::sleep(Duration::from_secs(1)).await;
            Ok(())
        }
    }
}

/// Loans `channel`'s read side to a forwarder task for the duration of the
/// proxy pump's two concurrent pumps, then reclaims it so the menu loop
/// can keep reading from the same SSH channel afterward.
async fn run_game_io_proxy(
    channel: &mut ChannelIo,
    stream: dungeongate_protocol::client::GameIoStream,
    session_id: Uuid,
    term_size: TermSize,
    term_type: &str,
    spectator_user_id: Option<i32>,
) -> anyhow::Result<ProxyExit> {
    let spectator = spectator_user_id.is_some();
    let events = channel.take_events();
    let resize_rx = channel.term_size.clone();

    let (tx_in, rx_in) = mpsc::channel::<TerminalEvent>(64);
    let (tx_out, mut rx_out) = mpsc::channel::<Vec<u8>>(64);

    let forward_handle = tokio::spawn(forward_events(events, resize_rx, tx_in, spectator));

    let writer = channel.writer();
    let output_handle = tokio::spawn(async move {
        while let Some(bytes) = rx_out.recv().await {
            if writer.write_all(&bytes).await.is_err() {
                break;
            }
        }
    });

    let result =
        gameio::run(stream, session_id, term_size, term_type, spectator_user_id, rx_in, tx_out).await;

    let events = forward_handle.await.unwrap_or_else(|_| {
        let (_tx, rx) = mpsc::channel(1);
        rx
    });
    channel.restore_events(events);
    let _ = output_handle.await;

    result
}

/// Forwards SSH channel activity into the Game I/O Proxy's terminal-event
/// channel until the caller disconnects (`Eof`) or the proxy pump's input
/// receiver is dropped (it returned). Returns the loaned `events` receiver
/// to its owner on every exit path.
async fn forward_events(
    mut events: mpsc::Receiver<ChannelEvent>,
    mut resize: tokio::sync::watch::Receiver<TermSize>,
    tx: mpsc::Sender<TerminalEvent>,
    spectator: bool,
) -> mpsc::Receiver<ChannelEvent> {
    loop {
        tokio::select! {
            event = events.recv() => {
                match event {
                    None => return events,
                    Some(ChannelEvent::Eof) => {
                        let _ = tx.send(TerminalEvent::Disconnect).await;
                        return events;
                    }
                    Some(ChannelEvent::Data(bytes)) => {
                        if spectator && bytes.first() == Some(&b'q') {
                            let _ = tx.send(TerminalEvent::Disconnect).await;
                            return events;
                        }
                        if tx.send(TerminalEvent::Input(bytes)).await.is_err() {
                            return events;
                        }
                    }
                }
            }
            changed = resize.changed() => {
                if changed.is_err() {
                    continue;
                }
                let size = *resize.borrow();
                if tx.send(TerminalEvent::Resize(size)).await.is_err() {
                    return events;
                }
            }
        }
    }
}

async fn prompt_target_username(channel: &mut ChannelIo) -> anyhow::Result<Option<String>> {
    channel.write_crlf("Target username: ").await?;
    match crate::menu::line_editor::read_line(channel, crate::menu::line_editor::EchoMode::Plain).await? {
        crate::menu::line_editor::LineResult::Line(l) if !l.is_empty() => Ok(Some(l)),
        _ => Ok(None),
    }
}

async fn run_admin_action(
    channel: &mut ChannelIo,
    deps: &Arc<SessionDeps>,
    identity: &Identity,
    action: MenuAction,
) -> anyhow::Result<()> {
    let Some(admin_token) = identity.access_token.clone() else {
        channel.write_crlf("\nAdmin actions require an authenticated session.\n").await?;
        return Ok(());
    };

    if matches!(action, MenuAction::ServerStats) {
        let reply = deps
            .auth_client
            .call(AuthServiceRequest::GetServerStatistics(GetServerStatisticsRequest { admin_token }))
            .await?;
        match reply {
            AuthServiceReply::GetServerStatistics(r) => {
                channel
                    .write_crlf(&format!(
                        "\nusers: {}  games played: {}  active sessions: {}\n",
                        r.total_users, r.total_games_played, r.active_sessions
                    ))
                    .await?;
            }
            other => anyhow::bail!("expected GetServerStatistics reply, got {other:?}"),
        }
        tokio::time::sleep(Duration::from_secs(2)).await;
        return Ok(());
    }

    let Some(username) = prompt_target_username(channel).await? else { return Ok(()) };

    let request = match action {
        MenuAction::Unlock => AuthServiceRequest::UnlockUserAccount(UnlockUserAccountRequest { admin_token, username }),
        MenuAction::Delete => AuthServiceRequest::DeleteUserAccount(DeleteUserAccountRequest { admin_token, username }),
        MenuAction::AddAdmin => {
            AuthServiceRequest::PromoteUserToAdmin(PromoteUserToAdminRequest { admin_token, username })
        }
        MenuAction::ResetPassword => {
            channel.write_crlf("New password: ").await?;
            let new_password = match crate::menu::line_editor::read_line(
                channel,
                crate::menu::line_editor::EchoMode::Masked,
            )
            .await?
            {
                crate::menu::line_editor::LineResult::Line(l) => l,
                _ => return Ok(()),
            };
            AuthServiceRequest::ResetUserPassword(ResetUserPasswordRequest { admin_token, username, new_password })
        }
        _ => unreachable!("run_admin_action called with a non-admin action"),
    };

    let reply = deps.auth_client.call(request).await?;
    let (success, error) = match reply {
        AuthServiceReply::UnlockUserAccount(r)
        | AuthServiceReply::DeleteUserAccount(r)
        | AuthServiceReply::ResetUserPassword(r)
        | AuthServiceReply::PromoteUserToAdmin(r) => (r.success, r.error),
        other => anyhow::bail!("expected an admin action reply, got {other:?}"),
    };
    if success {
        channel.write_crlf("\nDone.\n").await?;
    } else {
        channel.write_crlf(&format!("\nFailed: {}\n", error.unwrap_or_default())).await?;
    }
    tokio::time::sleep(Duration::from_secs(1)).await;
    Ok(())
}
