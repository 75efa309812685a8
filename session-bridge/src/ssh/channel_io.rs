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

//! Bridges one SSH `session` channel to the rest of `session-bridge`'s
//! state machine (`crate::session`). `russh::server::Handler` callbacks fire
//! on the shared connection event loop, so `shell_request` hands off to a
//! dedicated task holding a `ChannelIo`: reads arrive over an mpsc channel
//! fed by `Handler::data`, writes go straight out through a cloned
//! `server::Handle`. Grounded on
//! `examples/other_examples/1731a3ea_pawurb-tuihost-rs__src-handler.rs.rs`'s
//! `shell_request`, which spawns exactly this kind of output task, adapted
//! to also own the input side instead of only the PTY-to-channel direction.

use russh::server::Handle;
use russh::{ChannelId, CryptoVec};
use tokio::sync::{mpsc, watch};

use dungeongate_common::tty::TermSize;

#[derive(Debug)]
pub enum ChannelEvent {
    Data(Vec<u8>),
    Eof,
}

/// Window size updates arrive on their own `watch` channel rather than
/// interleaved into `events`: `window_change_request` fires as an
/// independent `Handler` callback, and `watch` naturally gives "latest
/// value wins" semantics for the concurrent-resize collapse spec §5
/// describes, with no risk of a resize being queued behind a backlog of
/// unread input bytes.
pub struct ChannelIo {
    pub handle: Handle,
    pub channel_id: ChannelId,
    pub events: mpsc::Receiver<ChannelEvent>,
    pub term_size: watch::Receiver<TermSize>,
}

/// The write half of a `ChannelIo`, cheaply cloneable so the Game I/O
/// Proxy's stream→SSH pump (spec §4.4 step 4) can write concurrently with
/// whatever is draining `events` on the read side.
#[derive(Clone)]
pub struct ChannelWriter {
    handle: Handle,
    channel_id: ChannelId,
}

impl ChannelWriter {
    pub async fn write_all(&self, bytes: &[u8]) -> anyhow::Result<()> {
        self.handle
            .data(self.channel_id, CryptoVec::from_slice(bytes))
            .await
            .map_err(|_| anyhow::anyhow!("SSH channel closed"))
    }

    /// CRLF-normalizes `text` before writing, per spec §6's "all terminal
    /// output uses CRLF line endings."
    pub async fn write_crlf(&self, text: &str) -> anyhow::Result<()> {
        let mut out = Vec::with_capacity(text.len());
        for c in text.chars() {
            if c == '\n' {
                out.push(b'\r');
            }
            let mut buf = [0u8; 4];
            out.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
        }
        self.write_all(&out).await
    }

    pub async fn close(&self) {
        let _ = self.handle.close(self.channel_id).await;
    }
}

impl ChannelIo {
    pub fn writer(&self) -> ChannelWriter {
        ChannelWriter { handle: self.handle.clone(), channel_id: self.channel_id }
    }

    pub async fn write_all(&self, bytes: &[u8]) -> anyhow::Result<()> {
        self.writer().write_all(bytes).await
    }

    pub async fn write_crlf(&self, text: &str) -> anyhow::Result<()> {
        self.writer().write_crlf(text).await
    }

    pub async fn close(&self) {
        self.writer().close().await
    }

    pub async fn next_event(&mut self) -> Option<ChannelEvent> {
        self.events.recv().await
    }

    /// Loans the read side out to a concurrent forwarder (used while the
    /// Game I/O Proxy pump runs) — see `take_events`/`restore_events`.
    pub fn take_events(&mut self) -> mpsc::Receiver<ChannelEvent> {
        let (_tx, placeholder) = mpsc::channel(1);
        std::mem::replace(&mut self.events, placeholder)
    }

    pub fn restore_events(&mut self, events: mpsc::Receiver<ChannelEvent>) {
        self.events = events;
    }

    pub fn current_term_size(&self) -> TermSize {
        *self.term_size.borrow()
    }
}
