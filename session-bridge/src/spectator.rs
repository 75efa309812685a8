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

//! Spectator Path: the "Spectate" menu and its session-watching
//! differences. Discovers active sessions via the Game Service's
//! `ListGameSessions`, assigns the `SPECTATOR_KEYS` ring, and issues
//! `AddSpectator`/`RemoveSpectator` around the shared `gameio::run` pump.

use std::time::{Duration, Instant};

use rand::Rng;
use tracing::warn;
use uuid::Uuid;

use dungeongate_common::consts::SPECTATOR_KEYS;
use dungeongate_protocol::{
    client::GameServiceClient,
    gamesvc::{
        AddSpectatorRequest, GameServiceReply, GameServiceRequest, ListGameSessionsFilter,
        ListGameSessionsRequest, RemoveSpectatorRequest, SessionInfo, SessionStatus,
    },
};

use crate::ssh::channel_io::{ChannelEvent, ChannelIo};

const HELP_TEXT: &str = "\nSelect a session by its letter, '*' for random, 'q' to go back.\n\n";

/// Maps index → key per spec §8: `a..z` for the first 26, `A..Z` after
/// that. A list longer than 52 sessions simply runs out of keys; those
/// entries are unreachable by keystroke (display-only) rather than
/// wrapping back to an already-assigned key.
fn key_for_index(idx: usize) -> Option<char> {
    SPECTATOR_KEYS.chars().nth(idx)
}

fn key_to_index(c: char) -> Option<usize> {
    SPECTATOR_KEYS.find(c)
}

async fn query_active_sessions(game_client: &GameServiceClient) -> anyhow::Result<Vec<SessionInfo>> {
    let reply = game_client
        .call(GameServiceRequest::ListGameSessions(ListGameSessionsRequest {
            filter: ListGameSessionsFilter::Status { status: SessionStatus::Active },
            limit: SPECTATOR_KEYS.len() as u32,
            offset: 0,
        }))
        .await?;
    match reply {
        GameServiceReply::ListGameSessions(r) => Ok(r.sessions),
        other => anyhow::bail!("expected ListGameSessions reply, got {other:?}"),
    }
}

async fn render_list(channel: &mut ChannelIo, sessions: &[SessionInfo]) -> anyhow::Result<()> {
    let now = now_unix();
    let mut out = String::from("\r\n=== Active sessions ===\r\n");
    if sessions.is_empty() {
        out.push_str("(none)\r\n");
    }
    for (i, s) in sessions.iter().enumerate() {
        let Some(key) = key_for_index(i) else { break };
        let idle = (now - s.last_activity_unix_secs).max(0);
        out.push_str(&format!(
            "  {key}) {:<12} {:<10} idle {idle}s  ({} watching)\r\n",
            s.username, s.game_id, s.spectator_count
        ));
    }
    out.push_str("(*) random  (?) help  (q) back\r\n> ");
    channel.write_all(out.as_bytes()).await
}

fn now_unix() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

/// Drives the Spectate menu (spec §4.3): auto-refreshes idle times every
/// second, re-queries the back process every 30 seconds, and resolves a
/// keystroke into a chosen session id, or `None` on quit/disconnect.
pub async fn choose_session(
    channel: &mut ChannelIo,
    game_client: &GameServiceClient,
) -> anyhow::Result<Option<Uuid>> {
    let mut sessions = query_active_sessions(game_client).await?;
    let mut last_query = Instant::now();
    render_list(channel, &sessions).await?;

    let mut ticker = tokio::time::interval(Duration::from_secs(1));
    ticker.tick().await; // first tick fires immediately; consume it

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if last_query.elapsed() >= Duration::from_secs(30) {
                    match query_active_sessions(game_client).await {
                        Ok(fresh) => sessions = fresh,
                        Err(e) => warn!(error = %e, "failed to refresh spectate list"),
                    }
                    last_query = Instant::now();
                }
                render_list(channel, &sessions).await?;
            }
            event = channel.next_event() => {
                match event {
                    None => return Ok(None),
                    Some(ChannelEvent::Data(bytes)) => {
                        let Some(&b) = bytes.first() else { continue };
                        match b as char {
                            'q' => return Ok(None),
                            '?' => { channel.write_all(HELP_TEXT.as_bytes()).await?; }
                            '*' => {
                                if let Some(s) = pick_random(&sessions) {
                                    return Ok(Some(s));
                                }
                            }
                            c => {
                                if let Some(idx) = key_to_index(c) {
                                    if let Some(s) = sessions.get(idx) {
                                        return Ok(Some(s.session_id));
                                    }
                                }
                            }
                        }
                    }
                    Some(_) => {}
                }
            }
        }
    }
}

fn pick_random(sessions: &[SessionInfo]) -> Option<Uuid> {
    if sessions.is_empty() {
        return None;
    }
    let idx = rand::thread_rng().gen_range(0..sessions.len());
    Some(sessions[idx].session_id)
}

pub async fn add_spectator(
    game_client: &GameServiceClient,
    session_id: Uuid,
    spectator_user_id: i32,
    username: &str,
) -> anyhow::Result<()> {
    let reply = game_client
        .call(GameServiceRequest::AddSpectator(AddSpectatorRequest {
            session_id,
            spectator_user_id,
            username: username.to_string(),
        }))
        .await?;
    match reply {
        GameServiceReply::AddSpectator(r) if r.success => Ok(()),
        GameServiceReply::AddSpectator(r) => anyhow::bail!("AddSpectator rejected: {:?}", r.error),
        other => anyhow::bail!("expected AddSpectator reply, got {other:?}"),
    }
}

pub async fn remove_spectator(game_client: &GameServiceClient, session_id: Uuid, spectator_user_id: i32) {
    let reply = game_client
        .call(GameServiceRequest::RemoveSpectator(RemoveSpectatorRequest {
            session_id,
            spectator_user_id,
        }))
        .await;
    if let Err(e) = reply {
        warn!(error = %e, "RemoveSpectator call failed, session will age out on its own");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_twenty_six_keys_are_lowercase() {
        assert_eq!(key_for_index(0), Some('a'));
        assert_eq!(key_for_index(25), Some('z'));
        assert_eq!(key_for_index(26), Some('A'));
    }

    #[test]
    fn key_to_index_round_trips() {
        for i in 0..52 {
            let key = key_for_index(i).unwrap();
            assert_eq!(key_to_index(key), Some(i));
        }
    }
}
