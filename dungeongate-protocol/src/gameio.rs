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

//! `StreamGameIO` wire types — the bidirectional per-attachment stream: a
//! tagged enum carrying raw bytes plus out-of-band control variants,
//! splitting cleanly into "data frame" and "control frame" cases.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use dungeongate_common::tty::TermSize;

/// A request frame sent from `session-bridge` to `game-host` on a
/// `StreamGameIO` stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum GameIoRequest {
    /// Opens the stream's association with a session. Sent once, first,
    /// before any `Input`/`Resize` frame.
    Connect {
        session_id: Uuid,
        term_size: TermSize,
        term_type: String,
        /// `true` for a spectator attachment: the back tracks this stream
        /// as a Subscriber with role=spectator and never feeds its `Input`
        /// frames (which the front never sends anyway) into the PTY.
        spectator: bool,
        /// The spectating user's id, carried so the back can tag its
        /// `Subscriber` with the same identity `AddSpectator` registered
        /// and `RemoveSpectator` can later evict by. Always `None` for a
        /// player attachment.
        spectator_user_id: Option<i32>,
    },
    /// Player keystrokes. Never sent on a spectator attachment — the front
    /// consumes spectator input locally for the `q` quit key only.
    Input { session_id: Uuid, bytes: Vec<u8> },
    /// A negotiated new terminal size, forwarded from an SSH
    /// `window-change` request.
    Resize { session_id: Uuid, new_size: TermSize },
    /// Explicit detach. Detaches the stream from the session without
    /// ending it — the child process and PTY are untouched.
    Disconnect { session_id: Uuid, reason: String },
}

/// A response frame sent from `game-host` to `session-bridge`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum GameIoResponse {
    /// Answers a `Connect` request. The back MUST send this before any
    /// `Output` frame for the same session.
    Connected {
        success: bool,
        error: Option<String>,
        pty_id: Option<Uuid>,
    },
    /// Raw PTY output, already passed through the game adapter's output
    /// filter.
    Output { bytes: Vec<u8> },
    /// An out-of-band notification distinct from ordinary output.
    Event { event: GameIoEvent, message: String },
    /// The back has torn down this stream's subscription; the front should
    /// treat this exactly like a transport end-of-stream.
    Disconnected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GameIoEvent {
    ProcessExit,
    SessionTerminated,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connect_request_round_trips_through_bincode() {
        let req = GameIoRequest::Connect {
            session_id: Uuid::nil(),
            term_size: TermSize::new(80, 24),
            term_type: "xterm-256color".to_string(),
            spectator: false,
            spectator_user_id: None,
        };
        let encoded = bincode::serialize(&req).unwrap();
        let decoded: GameIoRequest = bincode::deserialize(&encoded).unwrap();
        match decoded {
            GameIoRequest::Connect { term_size, spectator, spectator_user_id, .. } => {
                assert_eq!(term_size, TermSize::new(80, 24));
                assert!(!spectator);
                assert_eq!(spectator_user_id, None);
            }
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn spectator_connect_request_carries_user_id() {
        let req = GameIoRequest::Connect {
            session_id: Uuid::nil(),
            term_size: TermSize::new(80, 24),
            term_type: "xterm-256color".to_string(),
            spectator: true,
            spectator_user_id: Some(42),
        };
        let encoded = bincode::serialize(&req).unwrap();
        let decoded: GameIoRequest = bincode::deserialize(&encoded).unwrap();
        match decoded {
            GameIoRequest::Connect { spectator, spectator_user_id, .. } => {
                assert!(spectator);
                assert_eq!(spectator_user_id, Some(42));
            }
            _ => panic!("wrong variant"),
        }
    }
}
