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

use std::time::Duration;

/// Wire-protocol version. Bumped whenever a breaking change is made to any
/// of the enums in `dungeongate-protocol`; carried in every `VersionHeader`.
pub const PROTOCOL_VERSION: u32 = 1;

/// Default listen port for the Game I/O Endpoint (unary RPCs + `StreamGameIO`).
pub const DEFAULT_GAME_SERVICE_PORT: u16 = 9190;

/// Default listen port for the SSH Listener.
pub const DEFAULT_SSH_PORT: u16 = 2222;

/// Chunk size used when copying PTY output before handing it to the fan-out,
/// per spec's 4KiB copy-before-handoff note.
pub const PTY_READ_CHUNK: usize = 4 * 1024;

/// Bounded per-subscriber mailbox capacity for the stream fan-out.
pub const SUBSCRIBER_QUEUE_CAPACITY: usize = 100;

/// Poll interval for the handful of places that still need a ticker rather
/// than a pure `tokio::select!` wakeup.
pub const JOIN_POLL_DURATION: Duration = Duration::from_millis(100);

/// Grace period between SIGTERM and SIGKILL when force-terminating a PTY's
/// child process.
pub const FORCE_TERMINATE_GRACE: Duration = Duration::from_secs(5);

/// Spectator key ring: lowercase, then uppercase, rolling over per spec's
/// 26/27-session key-assignment boundary behavior.
pub const SPECTATOR_KEYS: &str = "abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// Default terminal size used when a PTY is created with no negotiated size
/// (e.g. an empty resize payload).
pub const DEFAULT_COLS: u16 = 80;
pub const DEFAULT_ROWS: u16 = 24;
