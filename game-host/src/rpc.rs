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

//! The Game I/O Endpoint: a single TCP listener carrying both the unary
//! Game Service RPCs and the long-lived `StreamGameIO` attachment,
//! dispatched via `dungeongate_protocol::transport`'s
//! `GameHostRequest`/`GameHostReply` envelope. An accept loop spawns one
//! task per connection, an outer header determining which inner handler
//! runs.

use std::collections::HashMap;
use std::io::Read;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use dungeongate_common::consts::PTY_READ_CHUNK;
use dungeongate_protocol::{
    codec::{read_frame, write_frame},
    gameio::{GameIoEvent, GameIoRequest, GameIoResponse},
    gamesvc::{
        GameInfo, GameServiceReply, GameServiceRequest, GetGameSessionReply, HealthReply,
        ListGameSessionsReply, ListGamesReply, RemoveSpectatorReply, ResizeTerminalReply,
        StartGameSessionReply, StopGameSessionReply, AddSpectatorReply,
    },
    transport::{GameHostReply, GameHostRequest},
    version::VersionHeader,
};

use crate::{
    adapters::{expand_username_token, AdapterRegistry, GameAdapter},
    config::Config,
    fanout::Fanout,
    pty,
    registry::{self, Registry, Status},
};

pub struct AppState {
    pub registry: Arc<Registry>,
    pub config: Config,
    pub adapters: AdapterRegistry,
}

impl AppState {
    pub fn new(config: Config) -> Arc<Self> {
        Arc::new(AppState {
            registry: Registry::new(config.max_ptys),
            config,
            adapters: AdapterRegistry::new(),
        })
    }
}

#[instrument(skip_all, fields(%addr))]
pub async fn serve(addr: SocketAddr, state: Arc<AppState>) -> anyhow::Result<()> {
    let listener = TcpListener::bind(addr).await.context("binding game service listener")?;
    info!("game service listening");
    loop {
        let (stream, peer) = listener.accept().await.context("accepting game service connection")?;
        let state = state.clone();
        tokio::spawn(async move {
            if let Err(e) = handle_conn(stream, state).await {
                warn!(%peer, error = %e, "game service connection ended with an error");
            }
        });
    }
}

async fn handle_conn(mut stream: TcpStream, state: Arc<AppState>) -> anyhow::Result<()> {
    write_frame(&mut stream, &VersionHeader::current()).await.context("writing version header")?;
    let request: GameHostRequest = read_frame(&mut stream).await.context("reading first frame")?;
    match request {
        GameHostRequest::Unary(req) => {
            let reply = handle_unary(&state, req).await;
            write_frame(&mut stream, &GameHostReply::Unary(reply)).await.context("writing unary reply")?;
        }
        GameHostRequest::Io(req) => {
            handle_io(stream, &state, req).await?;
        }
    }
    Ok(())
}

async fn handle_unary(state: &Arc<AppState>, request: GameServiceRequest) -> GameServiceReply {
    match request {
        GameServiceRequest::StartGameSession(req) => {
            GameServiceReply::StartGameSession(start_game_session(state, req).await)
        }
        GameServiceRequest::GetGameSession(req) => {
            let session = state.registry.get(req.session_id);
            GameServiceReply::GetGameSession(GetGameSessionReply { session: session.map(|s| s.to_wire()) })
        }
        GameServiceRequest::StopGameSession(req) => {
            let reply = match state.registry.get(req.session_id) {
                None => StopGameSessionReply { success: false, error: Some("no such session".to_string()) },
                Some(session) => {
                    {
                        let mut st = session.state.lock().unwrap();
                        st.status = Status::Ending;
                    }
                    let result = if req.force { session.pty.force_terminate().await } else { session.pty.close() };
                    match result {
                        Ok(()) => StopGameSessionReply { success: true, error: None },
                        Err(e) => StopGameSessionReply { success: false, error: Some(e.to_string()) },
                    }
                }
            };
            GameServiceReply::StopGameSession(reply)
        }
        GameServiceRequest::ListGameSessions(req) => {
            use dungeongate_protocol::gamesvc::ListGameSessionsFilter;
            let mut sessions = match req.filter {
                ListGameSessionsFilter::All => state.registry.list(),
                ListGameSessionsFilter::User { user_id } => state.registry.list_for_user(user_id),
                ListGameSessionsFilter::Status { status } => state
                    .registry
                    .list()
                    .into_iter()
                    .filter(|s| {
                        let st = s.state.lock().unwrap();
                        dungeongate_protocol::gamesvc::SessionStatus::from(st.status) == status
                    })
                    .collect(),
            };
            let total = sessions.len() as u32;
            sessions.sort_by_key(|s| s.started_at_unix_secs);
            let page: Vec<_> = sessions
                .into_iter()
                .skip(req.offset as usize)
                .take(req.limit as usize)
                .map(|s| s.to_wire())
                .collect();
            GameServiceReply::ListGameSessions(ListGameSessionsReply { sessions: page, total })
        }
        GameServiceRequest::ResizeTerminal(req) => {
            let reply = match state.registry.get(req.session_id) {
                None => ResizeTerminalReply { success: false, error: Some("no such session".to_string()) },
                Some(session) => match session.pty.resize(req.new_size) {
                    Ok(()) => {
                        session.state.lock().unwrap().term_size = req.new_size;
                        session.touch();
                        ResizeTerminalReply { success: true, error: None }
                    }
                    Err(e) => ResizeTerminalReply { success: false, error: Some(e.to_string()) },
                },
            };
            GameServiceReply::ResizeTerminal(reply)
        }
        GameServiceRequest::AddSpectator(req) => {
            let reply = match state.registry.get(req.session_id) {
                None => AddSpectatorReply { success: false, error: Some("no such session".to_string()) },
                Some(session) => {
                    session.fanout.register_spectator(req.spectator_user_id, req.username);
                    AddSpectatorReply { success: true, error: None }
                }
            };
            GameServiceReply::AddSpectator(reply)
        }
        GameServiceRequest::RemoveSpectator(req) => {
            let reply = match state.registry.get(req.session_id) {
                None => RemoveSpectatorReply { success: false, error: Some("no such session".to_string()) },
                Some(session) => {
                    session.fanout.unregister_spectator(req.spectator_user_id);
                    RemoveSpectatorReply { success: true, error: None }
                }
            };
            GameServiceReply::RemoveSpectator(reply)
        }
        GameServiceRequest::ListGames(req) => {
            let mut games: Vec<GameInfo> = state
                .config
                .games
                .iter()
                .filter(|(_, def)| !req.enabled_only || def.enabled)
                .map(|(id, def)| GameInfo { game_id: id.clone(), name: def.name.clone(), enabled: def.enabled })
                .collect();
            games.sort_by(|a, b| a.game_id.cmp(&b.game_id));
            let total = games.len() as u32;
            let page: Vec<_> = games.into_iter().skip(req.offset as usize).take(req.limit as usize).collect();
            GameServiceReply::ListGames(ListGamesReply { games: page, total })
        }
        GameServiceRequest::Health(_) => GameServiceReply::Health(HealthReply {
            healthy: true,
            active_sessions: state.registry.len() as u32,
        }),
    }
}

async fn start_game_session(
    state: &Arc<AppState>,
    req: dungeongate_protocol::gamesvc::StartGameSessionRequest,
) -> StartGameSessionReply {
    // Reconnect: a player who dropped their SSH connection and picks
    // `play` again for the same game resumes the session already in the
    // registry instead of getting a second child process for the same
    // user+game. `Connect` on the resumed session id then replays output
    // from the existing PTY rather than starting a fresh one.
    if let Some(existing) = state.registry.list_for_user(req.user_id).into_iter().find(|s| {
        s.game_id == req.game_id && !matches!(s.state.lock().unwrap().status, Status::Ended)
    }) {
        existing.touch();
        {
            let mut st = existing.state.lock().unwrap();
            st.term_size = req.term_size;
        }
        if let Err(e) = existing.pty.resize(req.term_size) {
            warn!(session_id = %existing.session_id, error = %e, "resize on reconnect failed");
        }
        return StartGameSessionReply { success: true, error: None, session: Some(existing.to_wire()) };
    }

    let Some(game_def) = state.config.games.get(&req.game_id).cloned() else {
        return StartGameSessionReply {
            success: false,
            error: Some(format!("unknown game id '{}'", req.game_id)),
            session: None,
        };
    };
    if !game_def.enabled {
        return StartGameSessionReply {
            success: false,
            error: Some(format!("game '{}' is disabled", req.game_id)),
            session: None,
        };
    }

    let adapter = state.adapters.resolve(&game_def, &req.game_id);

    let mut env: HashMap<String, String> =
        game_def.env.iter().map(|(k, v)| (k.clone(), expand_username_token(v, &req.username))).collect();
    adapter.setup_env(&mut env, &req.username);

    let cmd = adapter.prepare(&game_def, &env);
    let term_size = req.term_size;

    let spawn_result = tokio::task::spawn_blocking(move || pty::spawn(cmd, term_size)).await;
    let (pty_handle, reader) = match spawn_result {
        Ok(Ok(pair)) => pair,
        Ok(Err(e)) => {
            return StartGameSessionReply { success: false, error: Some(e.to_string()), session: None }
        }
        Err(e) => {
            return StartGameSessionReply { success: false, error: Some(e.to_string()), session: None }
        }
    };

    if let Some(bytes) = adapter.initial_input() {
        if let Err(e) = pty_handle.write_input(&bytes) {
            warn!(error = %e, "failed to write initial input to pty");
        }
    }

    let session_id = Uuid::new_v4();
    let fanout = Fanout::new();
    let session = registry::new_session(
        session_id,
        req.user_id,
        req.username.clone(),
        req.game_id.clone(),
        term_size,
        pty_handle.clone(),
        fanout.clone(),
    );
    if let Err(e) = state.registry.insert(session.clone()) {
        let _ = pty_handle.force_terminate().await;
        return StartGameSessionReply { success: false, error: Some(e.to_string()), session: None };
    }
    {
        let mut st = session.state.lock().unwrap();
        st.status = Status::Active;
    }

    spawn_output_pump(reader, fanout, pty_handle, state.registry.clone(), session_id, adapter, &game_def);

    StartGameSessionReply { success: true, error: None, session: Some(session.to_wire()) }
}

/// One dedicated blocking thread per session, reading the pty's master side
/// in `PTY_READ_CHUNK`-sized chunks and broadcasting each (adapter-filtered)
/// chunk to the fan-out, until EOF marks the child as exited. Grounded on
/// spec §4.4's "a copy is made before hand-off so reused read buffers cannot
/// race with slow consumers" note: `to_vec()` on every chunk guarantees that.
fn spawn_output_pump(
    mut reader: Box<dyn Read + Send>,
    fanout: Arc<Fanout>,
    pty_handle: pty::PtyHandle,
    registry: Arc<Registry>,
    session_id: Uuid,
    adapter: Arc<dyn GameAdapter>,
    game_def: &crate::config::GameDef,
) {
    let cleanup_game_def = game_def.clone();
    let cleanup_username = registry.get(session_id).map(|s| s.username.clone()).unwrap_or_default();
    tokio::task::spawn_blocking(move || {
        let mut buf = vec![0u8; PTY_READ_CHUNK];
        loop {
            match reader.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => {
                    let chunk = adapter.filter_output(buf[..n].to_vec());
                    fanout.broadcast(&chunk);
                    if let Some(session) = registry.get(session_id) {
                        session.touch();
                    }
                }
                Err(e) => {
                    warn!(session_id = %session_id, error = %e, "pty read error, ending pump");
                    break;
                }
            }
        }
        info!(session_id = %session_id, "game process exited, tearing down session");
        fanout.close_all();
        if let Some(session) = registry.get(session_id) {
            session.state.lock().unwrap().status = Status::Ended;
        }
        let _ = pty_handle.try_wait();
        adapter.cleanup(&cleanup_game_def, &cleanup_username);
        registry.remove(session_id);
    });
}

/// Handles a `StreamGameIO` attachment end to end: `Connect`, then an
/// interleaved loop of inbound `Input`/`Resize`/`Disconnect` frames and
/// outbound fan-out chunks, until either side closes the stream.
async fn handle_io(mut stream: TcpStream, state: &Arc<AppState>, first: GameIoRequest) -> anyhow::Result<()> {
    let GameIoRequest::Connect { session_id, term_size, spectator, spectator_user_id, .. } = first else {
        write_frame(
            &mut stream,
            &GameHostReply::Io(GameIoResponse::Connected {
                success: false,
                error: Some("first frame on a StreamGameIO attachment must be Connect".to_string()),
                pty_id: None,
            }),
        )
        .await?;
        return Ok(());
    };

    let Some(session) = state.registry.get(session_id) else {
        write_frame(
            &mut stream,
            &GameHostReply::Io(GameIoResponse::Connected {
                success: false,
                error: Some("no such session".to_string()),
                pty_id: None,
            }),
        )
        .await?;
        return Ok(());
    };

    if !spectator {
        session.state.lock().unwrap().player_attached = true;
        if let Err(e) = session.pty.resize(term_size) {
            warn!(%session_id, error = %e, "failed to apply negotiated term size on connect");
        }
    }

    write_frame(
        &mut stream,
        &GameHostReply::Io(GameIoResponse::Connected { success: true, error: None, pty_id: Some(session_id) }),
    )
    .await?;

    let mut subscription = session.fanout.subscribe(!spectator, spectator_user_id);
    let result = pump_io(&mut stream, &session, &mut subscription.rx, spectator).await;
    session.fanout.unsubscribe(subscription.id);
    if !spectator {
        session.state.lock().unwrap().player_attached = false;
    }
    result
}

async fn pump_io(
    stream: &mut TcpStream,
    session: &Arc<registry::GameSession>,
    rx: &mut mpsc::Receiver<Vec<u8>>,
    spectator: bool,
) -> anyhow::Result<()> {
    loop {
        tokio::select! {
            frame = read_frame::<GameIoRequest, TcpStream>(stream) => {
                match frame {
                    Ok(GameIoRequest::Input { bytes, .. }) => {
                        if !spectator {
                            session.pty.write_input(&bytes)?;
                            session.touch();
                        }
                    }
                    Ok(GameIoRequest::Resize { new_size, .. }) => {
                        session.pty.resize(new_size)?;
                        session.state.lock().unwrap().term_size = new_size;
                    }
                    Ok(GameIoRequest::Disconnect { .. }) => return Ok(()),
                    Ok(GameIoRequest::Connect { .. }) => {
                        warn!("unexpected second Connect frame on an active StreamGameIO attachment");
                    }
                    Err(_) => return Ok(()),
                }
            }
            chunk = rx.recv() => {
                match chunk {
                    Some(bytes) => write_frame(stream, &GameHostReply::Io(GameIoResponse::Output { bytes })).await?,
                    None => {
                        write_frame(
                            stream,
                            &GameHostReply::Io(GameIoResponse::Event {
                                event: GameIoEvent::ProcessExit,
                                message: "game process exited".to_string(),
                            }),
                        )
                        .await?;
                        return Ok(());
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dungeongate_common::tty::TermSize;

    fn test_state() -> Arc<AppState> {
        let mut config = Config::default();
        config.games.insert(
            "nethack".to_string(),
            crate::config::GameDef {
                name: "NetHack".to_string(),
                exec_path: "true".to_string(),
                args: vec![],
                env: HashMap::new(),
                working_dir: None,
                enabled: true,
                adapter: None,
            },
        );
        AppState::new(config)
    }

    fn start_req(user_id: i32, game_id: &str, term_size: TermSize) -> dungeongate_protocol::gamesvc::StartGameSessionRequest {
        dungeongate_protocol::gamesvc::StartGameSessionRequest {
            user_id,
            username: "alice".to_string(),
            game_id: game_id.to_string(),
            term_size,
            flags: Default::default(),
        }
    }

    #[tokio::test]
    async fn start_game_session_spawns_a_new_session() {
        let state = test_state();
        let reply = start_game_session(&state, start_req(1, "nethack", TermSize { cols: 80, rows: 24 })).await;
        assert!(reply.success, "{:?}", reply.error);
        assert!(reply.session.is_some());
        assert_eq!(state.registry.len(), 1);
    }

    #[tokio::test]
    async fn start_game_session_rejects_unknown_game() {
        let state = test_state();
        let reply = start_game_session(&state, start_req(1, "no-such-game", TermSize::default())).await;
        assert!(!reply.success);
        assert!(reply.error.is_some());
    }

    #[tokio::test]
    async fn reconnect_reuses_existing_session_instead_of_spawning_a_second_one() {
        let state = test_state();
        let first = start_game_session(&state, start_req(1, "nethack", TermSize { cols: 80, rows: 24 })).await;
        let first_id = first.session.unwrap().session_id;
        assert_eq!(state.registry.len(), 1);

        let second =
            start_game_session(&state, start_req(1, "nethack", TermSize { cols: 120, rows: 40 })).await;
        assert!(second.success);
        let second_id = second.session.unwrap().session_id;

        assert_eq!(first_id, second_id, "reconnect must resume the same session id");
        assert_eq!(state.registry.len(), 1, "reconnect must not spawn a second PTY");
        let session = state.registry.get(first_id).unwrap();
        assert_eq!(session.state.lock().unwrap().term_size, TermSize { cols: 120, rows: 40 });
    }

    #[tokio::test]
    async fn resize_terminal_updates_session_state() {
        use dungeongate_protocol::gamesvc::ResizeTerminalRequest;
        let state = test_state();
        let started = start_game_session(&state, start_req(1, "nethack", TermSize { cols: 80, rows: 24 })).await;
        let session_id = started.session.unwrap().session_id;

        let reply = handle_unary(
            &state,
            GameServiceRequest::ResizeTerminal(ResizeTerminalRequest {
                session_id,
                new_size: TermSize { cols: 132, rows: 43 },
            }),
        )
        .await;
        match reply {
            GameServiceReply::ResizeTerminal(r) => assert!(r.success),
            other => panic!("expected ResizeTerminal reply, got {other:?}"),
        }
        let session = state.registry.get(session_id).unwrap();
        assert_eq!(session.state.lock().unwrap().term_size, TermSize { cols: 132, rows: 43 });
    }

    #[tokio::test]
    async fn list_games_filters_disabled_when_requested() {
        let mut config = Config::default();
        config.games.insert(
            "nethack".to_string(),
            crate::config::GameDef {
                name: "NetHack".to_string(),
                exec_path: "true".to_string(),
                args: vec![],
                env: HashMap::new(),
                working_dir: None,
                enabled: true,
                adapter: None,
            },
        );
        config.games.insert(
            "slashem".to_string(),
            crate::config::GameDef {
                name: "Slash'EM".to_string(),
                exec_path: "true".to_string(),
                args: vec![],
                env: HashMap::new(),
                working_dir: None,
                enabled: false,
                adapter: None,
            },
        );
        let state = AppState::new(config);
        let reply = handle_unary(
            &state,
            GameServiceRequest::ListGames(dungeongate_protocol::gamesvc::ListGamesRequest {
                enabled_only: true,
                limit: 100,
                offset: 0,
            }),
        )
        .await;
        match reply {
            GameServiceReply::ListGames(r) => {
                assert_eq!(r.games.len(), 1);
                assert_eq!(r.games[0].game_id, "nethack");
            }
            other => panic!("expected ListGames reply, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn health_reports_active_session_count() {
        let state = test_state();
        let _ = start_game_session(&state, start_req(1, "nethack", TermSize { cols: 80, rows: 24 })).await;
        let reply =
            handle_unary(&state, GameServiceRequest::Health(dungeongate_protocol::gamesvc::HealthRequest)).await;
        match reply {
            GameServiceReply::Health(r) => {
                assert!(r.healthy);
                assert_eq!(r.active_sessions, 1);
            }
            other => panic!("expected Health reply, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn add_spectator_registers_in_session_fanout() {
        use dungeongate_protocol::gamesvc::AddSpectatorRequest;
        let state = test_state();
        let started = start_game_session(&state, start_req(1, "nethack", TermSize { cols: 80, rows: 24 })).await;
        let session_id = started.session.unwrap().session_id;

        let reply = handle_unary(
            &state,
            GameServiceRequest::AddSpectator(AddSpectatorRequest {
                session_id,
                spectator_user_id: 2,
                username: "bob".to_string(),
            }),
        )
        .await;
        match reply {
            GameServiceReply::AddSpectator(r) => assert!(r.success, "{:?}", r.error),
            other => panic!("expected AddSpectator reply, got {other:?}"),
        }
        let session = state.registry.get(session_id).unwrap();
        assert_eq!(session.fanout.registered_spectators().get(&2), Some(&"bob".to_string()));
    }

    #[tokio::test]
    async fn add_spectator_on_unknown_session_fails() {
        use dungeongate_protocol::gamesvc::AddSpectatorRequest;
        let state = test_state();
        let reply = handle_unary(
            &state,
            GameServiceRequest::AddSpectator(AddSpectatorRequest {
                session_id: Uuid::new_v4(),
                spectator_user_id: 2,
                username: "bob".to_string(),
            }),
        )
        .await;
        match reply {
            GameServiceReply::AddSpectator(r) => assert!(!r.success),
            other => panic!("expected AddSpectator reply, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn remove_spectator_evicts_the_registered_user() {
        use dungeongate_protocol::gamesvc::{AddSpectatorRequest, RemoveSpectatorRequest};
        let state = test_state();
        let started = start_game_session(&state, start_req(1, "nethack", TermSize { cols: 80, rows: 24 })).await;
        let session_id = started.session.unwrap().session_id;
        let session = state.registry.get(session_id).unwrap();
        let mut sub = session.fanout.subscribe(false, Some(2));

        handle_unary(
            &state,
            GameServiceRequest::AddSpectator(AddSpectatorRequest {
                session_id,
                spectator_user_id: 2,
                username: "bob".to_string(),
            }),
        )
        .await;

        let reply = handle_unary(
            &state,
            GameServiceRequest::RemoveSpectator(RemoveSpectatorRequest { session_id, spectator_user_id: 2 }),
        )
        .await;
        match reply {
            GameServiceReply::RemoveSpectator(r) => assert!(r.success, "{:?}", r.error),
            other => panic!("expected RemoveSpectator reply, got {other:?}"),
        }
        assert!(session.fanout.registered_spectators().is_empty());
        assert!(sub.rx.recv().await.is_none(), "evicted spectator's subscription must close");
    }
}
