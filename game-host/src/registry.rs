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

//! Session Registry — the back process's authoritative map of logical game
//! sessions, keyed by `Uuid` and carrying a five-state status machine
//! (`Starting`, `Active`, `Paused`, `Ending`, `Ended`).

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
    time::{SystemTime, UNIX_EPOCH},
};

use anyhow::anyhow;
use uuid::Uuid;

use dungeongate_common::tty::TermSize;
use dungeongate_protocol::gamesvc::{SessionInfo, SessionStatus as WireStatus};

use crate::{fanout::Fanout, pty::PtyHandle};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Starting,
    Active,
    Paused,
    Ending,
    Ended,
}

impl From<Status> for WireStatus {
    fn from(s: Status) -> Self {
        match s {
            Status::Starting => WireStatus::Starting,
            Status::Active => WireStatus::Active,
            Status::Paused => WireStatus::Paused,
            Status::Ending => WireStatus::Ending,
            Status::Ended => WireStatus::Ended,
        }
    }
}

/// The mutable part of a GameSession: everything that changes across its
/// lifetime. Guarded by a per-session mutex so fan-out iteration and RPC
/// handlers never have to hold the whole registry's lock for long.
pub struct SessionState {
    pub status: Status,
    pub term_size: TermSize,
    pub last_activity_unix_secs: i64,
    pub player_attached: bool,
}

/// An immutable identity plus the mutable state, the PTY handle, and the
/// fan-out this session owns. `Arc`'d so the registry, the reaper, and
/// in-flight RPC handlers can all hold a reference without holding the
/// registry lock.
pub struct GameSession {
    pub session_id: Uuid,
    pub user_id: i32,
    pub username: String,
    pub game_id: String,
    pub started_at_unix_secs: i64,
    pub state: Mutex<SessionState>,
    pub pty: PtyHandle,
    pub fanout: Arc<Fanout>,
}

impl GameSession {
    pub fn to_wire(&self) -> SessionInfo {
        let state = self.state.lock().unwrap();
        SessionInfo {
            session_id: self.session_id,
            user_id: self.user_id,
            username: self.username.clone(),
            game_id: self.game_id.clone(),
            term_size: state.term_size,
            status: state.status.into(),
            started_at_unix_secs: self.started_at_unix_secs,
            last_activity_unix_secs: state.last_activity_unix_secs,
            spectator_count: self.fanout.spectator_count() as u32,
        }
    }

    pub fn touch(&self) {
        let mut state = self.state.lock().unwrap();
        state.last_activity_unix_secs = now_unix();
    }
}

pub fn now_unix() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

/// The authoritative map of sessions. One per `game-host` process.
pub struct Registry {
    sessions: Mutex<HashMap<Uuid, Arc<GameSession>>>,
    max_ptys: usize,
}

impl Registry {
    pub fn new(max_ptys: usize) -> Arc<Self> {
        Arc::new(Registry { sessions: Mutex::new(HashMap::new()), max_ptys })
    }

    pub fn insert(&self, session: Arc<GameSession>) -> anyhow::Result<()> {
        let mut sessions = self.sessions.lock().unwrap();
        if sessions.len() >= self.max_ptys {
            return Err(anyhow!("max_ptys ({}) reached", self.max_ptys));
        }
        sessions.insert(session.session_id, session);
        Ok(())
    }

    pub fn get(&self, session_id: Uuid) -> Option<Arc<GameSession>> {
        self.sessions.lock().unwrap().get(&session_id).cloned()
    }

    pub fn remove(&self, session_id: Uuid) -> Option<Arc<GameSession>> {
        self.sessions.lock().unwrap().remove(&session_id)
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn list(&self) -> Vec<Arc<GameSession>> {
        self.sessions.lock().unwrap().values().cloned().collect()
    }

    pub fn list_for_user(&self, user_id: i32) -> Vec<Arc<GameSession>> {
        self.sessions
            .lock()
            .unwrap()
            .values()
            .filter(|s| s.user_id == user_id)
            .cloned()
            .collect()
    }

    pub fn list_active(&self) -> Vec<Arc<GameSession>> {
        self.sessions
            .lock()
            .unwrap()
            .values()
            .filter(|s| {
                let state = s.state.lock().unwrap();
                matches!(state.status, Status::Starting | Status::Active | Status::Paused)
            })
            .cloned()
            .collect()
    }

    /// Idle candidates for the reaper: ended status excluded (already
    /// terminal), no attached player stream, last activity older than the
    /// caller-supplied cutoff.
    pub fn idle_candidates(&self, cutoff_unix_secs: i64) -> Vec<Arc<GameSession>> {
        self.sessions
            .lock()
            .unwrap()
            .values()
            .filter(|s| {
                let state = s.state.lock().unwrap();
                state.status != Status::Ended
                    && !state.player_attached
                    && state.last_activity_unix_secs < cutoff_unix_secs
            })
            .cloned()
            .collect()
    }
}

pub fn new_session(
    session_id: Uuid,
    user_id: i32,
    username: String,
    game_id: String,
    term_size: TermSize,
    pty: PtyHandle,
    fanout: Arc<Fanout>,
) -> Arc<GameSession> {
    Arc::new(GameSession {
        session_id,
        user_id,
        username,
        game_id,
        started_at_unix_secs: now_unix(),
        state: Mutex::new(SessionState {
            status: Status::Starting,
            term_size,
            last_activity_unix_secs: now_unix(),
            player_attached: false,
        }),
        pty,
        fanout,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{fanout::Fanout, pty::PtyHandle};

    fn dummy_session(id: Uuid) -> Arc<GameSession> {
        new_session(
            id,
            1,
            "alice".to_string(),
            "nethack".to_string(),
            TermSize::default(),
            PtyHandle::dummy_for_test(),
            Fanout::new(),
        )
    }

    #[test]
    fn insert_and_get_round_trips() {
        let registry = Registry::new(10);
        let id = Uuid::new_v4();
        registry.insert(dummy_session(id)).unwrap();
        assert!(registry.get(id).is_some());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn insert_rejects_over_max_ptys() {
        let registry = Registry::new(1);
        registry.insert(dummy_session(Uuid::new_v4())).unwrap();
        let result = registry.insert(dummy_session(Uuid::new_v4()));
        assert!(result.is_err());
    }

    #[test]
    fn remove_is_idempotent_in_effect() {
        let registry = Registry::new(10);
        let id = Uuid::new_v4();
        registry.insert(dummy_session(id)).unwrap();
        assert!(registry.remove(id).is_some());
        assert!(registry.remove(id).is_none());
    }

    #[test]
    fn idle_candidates_excludes_attached_player() {
        let registry = Registry::new(10);
        let id = Uuid::new_v4();
        let session = dummy_session(id);
        {
            let mut state = session.state.lock().unwrap();
            state.player_attached = true;
            state.last_activity_unix_secs = 0;
        }
        registry.insert(session).unwrap();
        assert!(registry.idle_candidates(now_unix()).is_empty());
    }
}
