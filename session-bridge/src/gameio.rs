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

//! Game I/O Proxy: opens a `StreamGameIO` attachment to `game-host` and
//! shuffles bytes between it and the SSH channel for the lifetime of a
//! play or spectate session. One task per direction plus a supervisor,
//! built on `tokio::select!` over the protocol crate's `GameIoStream` and
//! an mpsc channel carrying terminal events.

use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use dungeongate_common::tty::TermSize;
use dungeongate_protocol::client::GameIoStream;
use dungeongate_protocol::gameio::{GameIoEvent, GameIoRequest, GameIoResponse};

/// Events the SSH channel handler forwards into the proxy loop. Spec §4.4
/// step 4's "two concurrent pumps" is realized here as one `tokio::select!`
/// arm reading from this channel, the other reading from `GameIoStream`.
#[derive(Debug)]
pub enum TerminalEvent {
    Input(Vec<u8>),
    Resize(TermSize),
    Disconnect,
}

/// Why the proxy loop ended, so the caller (session.rs) knows whether to
/// fall back to the "Game ended" teardown flow (spec §4.4 step 6) or a plain
/// disconnect.
#[derive(Debug, PartialEq, Eq)]
pub enum ProxyExit {
    ProcessExited,
    SessionTerminated,
    CallerDisconnected,
    TransportError,
}

/// Runs the proxy until the game process exits, the session is torn down
/// remotely, or the caller disconnects. `output` receives bytes the SSH
/// channel should write to the client; `input` is fed by the SSH channel's
/// own reader.
///
/// Takes an already-connected `stream` rather than dialing `game-host`
/// itself: spec §4.4 step 1 calls for opening the stream before issuing
/// `StartGameSession`, specifically to avoid losing output the game
/// process prints before `Connect` is bound. The caller (`session.rs`)
/// dials this connection concurrently with the `StartGameSession`/
/// `AddSpectator` unary call so the TCP handshake and version negotiation
/// are already paid for by the time a session id is in hand and `Connect`
/// can be sent.
pub async fn run(
    mut stream: GameIoStream,
    session_id: Uuid,
    term_size: TermSize,
    term_type: &str,
    spectator_user_id: Option<i32>,
    mut input: mpsc::Receiver<TerminalEvent>,
    output: mpsc::Sender<Vec<u8>>,
) -> anyhow::Result<ProxyExit> {
    let spectator = spectator_user_id.is_some();
    stream
        .send(GameIoRequest::Connect {
            session_id,
            term_size,
            term_type: term_type.to_string(),
            spectator,
            spectator_user_id,
        })
        .await?;

    match stream.recv().await? {
        GameIoResponse::Connected { success: true, .. } => {}
        GameIoResponse::Connected { success: false, error, .. } => {
            anyhow::bail!("game host refused Connect: {}", error.unwrap_or_default());
        }
        other => anyhow::bail!("expected Connected, got {other:?}"),
    }

    debug!(%session_id, spectator, "game io proxy attached");

    loop {
        tokio::select! {
            event = input.recv() => {
                match event {
                    Some(TerminalEvent::Input(bytes)) => {
                        if !spectator {
                            stream.send(GameIoRequest::Input { session_id, bytes }).await?;
                        }
                    }
                    Some(TerminalEvent::Resize(new_size)) => {
                        stream.send(GameIoRequest::Resize { session_id, new_size }).await?;
                    }
                    Some(TerminalEvent::Disconnect) | None => {
                        let _ = stream
                            .send(GameIoRequest::Disconnect { session_id, reason: "client disconnected".to_string() })
                            .await;
                        return Ok(ProxyExit::CallerDisconnected);
                    }
                }
            }
            reply = stream.recv() => {
                match reply {
                    Ok(GameIoResponse::Output { bytes }) => {
                        if output.send(bytes).await.is_err() {
                            return Ok(ProxyExit::CallerDisconnected);
                        }
                    }
                    Ok(GameIoResponse::Event { event: GameIoEvent::ProcessExit, message }) => {
                        info!(%session_id, %message, "game process exited");
                        return Ok(ProxyExit::ProcessExited);
                    }
                    Ok(GameIoResponse::Event { event: GameIoEvent::SessionTerminated, message }) => {
                        info!(%session_id, %message, "session terminated remotely");
                        return Ok(ProxyExit::SessionTerminated);
                    }
                    Ok(GameIoResponse::Disconnected) => {
                        return Ok(ProxyExit::SessionTerminated);
                    }
                    Ok(GameIoResponse::Connected { .. }) => {
                        warn!("unexpected duplicate Connected frame, ignoring");
                    }
                    Err(e) => {
                        warn!(error = %e, "game io stream error");
                        return Ok(ProxyExit::TransportError);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn proxy_exit_variants_are_distinct() {
        assert_ne!(ProxyExit::ProcessExited, ProxyExit::CallerDisconnected);
        assert_ne!(ProxyExit::SessionTerminated, ProxyExit::TransportError);
    }
}
