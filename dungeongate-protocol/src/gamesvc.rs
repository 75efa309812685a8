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

//! Unary Game Service RPC request/reply types: a flat one-struct-per-call
//! style rather than a single giant request/response enum pair, so
//! `game-host`'s dispatcher can match on an outer `GameServiceRequest` enum
//! while call-sites still get concretely typed replies.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use dungeongate_common::tty::TermSize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionStatus {
    Starting,
    Active,
    Paused,
    Ending,
    Ended,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionInfo {
    pub session_id: Uuid,
    pub user_id: i32,
    pub username: String,
    pub game_id: String,
    pub term_size: TermSize,
    pub status: SessionStatus,
    pub started_at_unix_secs: i64,
    pub last_activity_unix_secs: i64,
    pub spectator_count: u32,
}

/// Reserved for future call-site options. `game-host` always resumes an
/// existing session for the same user+game rather than spawning a second
/// one, so there is currently no "don't resume, force a fresh session"
/// path for `resume` to gate.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StartGameSessionFlags {
    #[serde(default)]
    pub resume: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartGameSessionRequest {
    pub user_id: i32,
    pub username: String,
    pub game_id: String,
    pub term_size: TermSize,
    #[serde(default)]
    pub flags: StartGameSessionFlags,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartGameSessionReply {
    pub success: bool,
    pub error: Option<String>,
    pub session: Option<SessionInfo>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetGameSessionRequest {
    pub session_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetGameSessionReply {
    pub session: Option<SessionInfo>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StopGameSessionRequest {
    pub session_id: Uuid,
    pub reason: String,
    pub force: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StopGameSessionReply {
    pub success: bool,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ListGameSessionsFilter {
    User { user_id: i32 },
    Status { status: SessionStatus },
    All,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListGameSessionsRequest {
    pub filter: ListGameSessionsFilter,
    pub limit: u32,
    pub offset: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListGameSessionsReply {
    pub sessions: Vec<SessionInfo>,
    pub total: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResizeTerminalRequest {
    pub session_id: Uuid,
    pub new_size: TermSize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResizeTerminalReply {
    pub success: bool,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddSpectatorRequest {
    pub session_id: Uuid,
    pub spectator_user_id: i32,
    pub username: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddSpectatorReply {
    pub success: bool,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoveSpectatorRequest {
    pub session_id: Uuid,
    pub spectator_user_id: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoveSpectatorReply {
    pub success: bool,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameInfo {
    pub game_id: String,
    pub name: String,
    pub enabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListGamesRequest {
    pub enabled_only: bool,
    pub limit: u32,
    pub offset: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListGamesReply {
    pub games: Vec<GameInfo>,
    pub total: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthRequest;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReply {
    pub healthy: bool,
    pub active_sessions: u32,
}

/// Outer dispatch enum the back's `rpc.rs` matches on for the unary half of
/// the Game I/O Endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum GameServiceRequest {
    StartGameSession(StartGameSessionRequest),
    GetGameSession(GetGameSessionRequest),
    StopGameSession(StopGameSessionRequest),
    ListGameSessions(ListGameSessionsRequest),
    ResizeTerminal(ResizeTerminalRequest),
    AddSpectator(AddSpectatorRequest),
    RemoveSpectator(RemoveSpectatorRequest),
    ListGames(ListGamesRequest),
    Health(HealthRequest),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum GameServiceReply {
    StartGameSession(StartGameSessionReply),
    GetGameSession(GetGameSessionReply),
    StopGameSession(StopGameSessionReply),
    ListGameSessions(ListGameSessionsReply),
    ResizeTerminal(ResizeTerminalReply),
    AddSpectator(AddSpectatorReply),
    RemoveSpectator(RemoveSpectatorReply),
    ListGames(ListGamesReply),
    Health(HealthReply),
}
