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

//! The `russh::server::Handler` implementation: one `SshHandler` per
//! accepted TCP connection, constructed by `listener.rs` after Admission
//! has already accepted the peer. Implements the handful of callbacks a
//! shell session actually needs (auth, pty/env/window-change requests,
//! shell request, channel data/eof/close) and rejects or ignores the
//! rest, feeding accepted channels into `ChannelIo`'s channel-event/
//! watch-channel pair.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use russh::server::{Auth, Msg, Session};
use russh::{Channel, ChannelId, Disconnect};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use dungeongate_common::tty::TermSize;

use crate::admission::Admitted;
use crate::auth::{AuthAdapter, Identity};
use crate::session::SessionDeps;
use crate::ssh::channel_io::{ChannelEvent, ChannelIo};

/// One per accepted connection. Everything here is single-threaded from
/// `russh`'s perspective (the library drives one handler per connection on
/// its own task), so no locking is needed until `shell_request` hands the
/// channel off to `crate::session::run`.
pub struct SshHandler {
    pub peer_addr: SocketAddr,
    pub deps: Arc<SessionDeps>,
    pub admitted: Option<Admitted>,
    identity: Identity,
    env: HashMap<String, String>,
    term_type: String,
    channel_id: Option<ChannelId>,
    channel_tx: Option<mpsc::Sender<ChannelEvent>>,
    pending_rx: Option<mpsc::Receiver<ChannelEvent>>,
    resize_tx: Option<watch::Sender<TermSize>>,
}

impl SshHandler {
    pub fn new(peer_addr: SocketAddr, deps: Arc<SessionDeps>, admitted: Admitted) -> Self {
        SshHandler {
            peer_addr,
            deps,
            admitted: Some(admitted),
            identity: Identity::anonymous(),
            env: HashMap::new(),
            term_type: "xterm".to_string(),
            channel_id: None,
            channel_tx: None,
            pending_rx: None,
            resize_tx: None,
        }
    }

    fn auth_adapter(&self) -> AuthAdapter<'_> {
        AuthAdapter {
            client: &self.deps.auth_client,
            shared_password: self.deps.config.ssh.ssh_password.as_deref(),
            allowed_username: self.deps.config.ssh.allowed_username.as_deref(),
        }
    }

    fn username_allowed(&self, user: &str) -> bool {
        self.deps.config.ssh.allowed_username.as_deref().map(|u| u == user).unwrap_or(true)
    }
}

/// Admission already decremented this handler's counter once, in
/// `crate::session::run`'s teardown; if the connection never reaches
/// `shell_request` (auth rejected, channel never opened), this is the only
/// place that accounting gets released.
impl Drop for SshHandler {
    fn drop(&mut self) {
        if let Some(admitted) = self.admitted.take() {
            self.deps.admission.release(admitted);
        }
    }
}

#[async_trait::async_trait]
impl russh::server::Handler for SshHandler {
    type Error = anyhow::Error;

    async fn auth_none(&mut self, user: &str) -> Result<Auth, Self::Error> {
        if self.deps.config.ssh.allow_anonymous && self.username_allowed(user) {
            debug!(%user, peer = %self.peer_addr, "auth_none accepted, anonymous");
            self.identity = Identity::anonymous();
            self.identity.username = user.to_string();
            Ok(Auth::Accept)
        } else {
            Ok(Auth::Reject { proceed_with_methods: None })
        }
    }

    async fn auth_password(&mut self, user: &str, password: &str) -> Result<Auth, Self::Error> {
        if !self.deps.config.ssh.password_auth {
            return Ok(Auth::Reject { proceed_with_methods: None });
        }
        let identity = self.auth_adapter().resolve(user, password, &HashMap::new()).await;
        if identity.is_authenticated() {
            info!(username = %identity.username, peer = %self.peer_addr, "authenticated via password");
            self.identity = identity;
            Ok(Auth::Accept)
        } else if self.deps.config.ssh.allow_anonymous && self.username_allowed(user) {
            self.identity = identity;
            Ok(Auth::Accept)
        } else {
            warn!(%user, peer = %self.peer_addr, "password auth rejected");
            Ok(Auth::Reject { proceed_with_methods: None })
        }
    }

    async fn auth_publickey(
        &mut self,
        user: &str,
        _key: &russh_keys::key::PublicKey,
    ) -> Result<Auth, Self::Error> {
        if self.deps.config.ssh.public_key_auth && self.username_allowed(user) {
            self.identity = Identity::anonymous();
            self.identity.username = user.to_string();
            Ok(Auth::Accept)
        } else {
            Ok(Auth::Reject { proceed_with_methods: None })
        }
    }

    async fn channel_open_session(
        &mut self,
        channel: Channel<Msg>,
        _session: &mut Session,
    ) -> Result<bool, Self::Error> {
        let (tx, rx) = mpsc::channel(64);
        self.channel_id = Some(channel.id());
        self.channel_tx = Some(tx);
        self.pending_rx = Some(rx);
        Ok(true)
    }

    async fn pty_request(
        &mut self,
        id: ChannelId,
        term: &str,
        cx: u32,
        cy: u32,
        _px: u32,
        _py: u32,
        _modes: &[(russh::Pty, u32)],
        session: &mut Session,
    ) -> Result<(), Self::Error> {
        self.term_type = term.to_string();
        let cols = if cx == 0 || cx > u16::MAX as u32 { 80 } else { cx as u16 };
        let rows = if cy == 0 || cy > u16::MAX as u32 { 24 } else { cy as u16 };
        let (tx, _rx) = watch::channel(TermSize::new(cols, rows));
        self.resize_tx = Some(tx);
        session.channel_success(id);
        Ok(())
    }

    async fn env_request(
        &mut self,
        _id: ChannelId,
        variable_name: &str,
        variable_value: &str,
        _session: &mut Session,
    ) -> Result<(), Self::Error> {
        self.env.insert(variable_name.to_string(), variable_value.to_string());
        Ok(())
    }

    async fn window_change_request(
        &mut self,
        _id: ChannelId,
        cx: u32,
        cy: u32,
        _px: u32,
        _py: u32,
        _session: &mut Session,
    ) -> Result<(), Self::Error> {
        if let Some(tx) = &self.resize_tx {
            let cols = if cx == 0 || cx > u16::MAX as u32 { return Ok(()) } else { cx as u16 };
            let rows = if cy == 0 || cy > u16::MAX as u32 { return Ok(()) } else { cy as u16 };
            let _ = tx.send(TermSize::new(cols, rows));
        }
        Ok(())
    }

    async fn shell_request(&mut self, id: ChannelId, session: &mut Session) -> Result<(), Self::Error> {
        let Some(channel_id) = self.channel_id else {
            session.channel_failure(id);
            return Ok(());
        };
        let Some(events) = self.pending_rx.take() else {
            session.channel_failure(id);
            return Ok(());
        };
        let Some(admitted) = self.admitted.take() else {
            session.channel_failure(id);
            return Ok(());
        };

        let resize_rx = match &self.resize_tx {
            Some(tx) => tx.subscribe(),
            None => {
                let (tx, rx) = watch::channel(TermSize::default());
                self.resize_tx = Some(tx);
                rx
            }
        };

        let channel_io = ChannelIo { handle: session.handle(), channel_id, events, term_size: resize_rx };

        session.channel_success(id);

        info!(username = %self.identity.username, peer = %self.peer_addr, "shell requested, handing off to session runner");
        tokio::spawn(crate::session::run(
            channel_io,
            Arc::clone(&self.deps),
            self.identity.clone(),
            self.env.clone(),
            self.term_type.clone(),
            admitted,
        ));
        Ok(())
    }

    async fn data(&mut self, _id: ChannelId, data: &[u8], _session: &mut Session) -> Result<(), Self::Error> {
        if let Some(tx) = &self.channel_tx {
            let _ = tx.send(ChannelEvent::Data(data.to_vec())).await;
        }
        Ok(())
    }

    async fn channel_eof(&mut self, id: ChannelId, session: &mut Session) -> Result<(), Self::Error> {
        if let Some(tx) = &self.channel_tx {
            let _ = tx.send(ChannelEvent::Eof).await;
        }
        session.close(id);
        Ok(())
    }

    async fn channel_close(&mut self, _id: ChannelId, _session: &mut Session) -> Result<(), Self::Error> {
        self.channel_tx = None;
        Ok(())
    }

    async fn exec_request(&mut self, _id: ChannelId, _data: &[u8], session: &mut Session) -> Result<(), Self::Error> {
        session.disconnect(Disconnect::ByApplication, "exec not permitted", "en");
        Ok(())
    }

    async fn subsystem_request(&mut self, _id: ChannelId, _name: &str, session: &mut Session) -> Result<(), Self::Error> {
        session.disconnect(Disconnect::ByApplication, "subsystem not permitted", "en");
        Ok(())
    }

    async fn tcpip_forward(&mut self, _address: &str, _port: &mut u32, _session: &mut Session) -> Result<bool, Self::Error> {
        Ok(false)
    }

    async fn channel_open_direct_tcpip(
        &mut self,
        _channel: Channel<Msg>,
        _host_to_connect: &str,
        _port_to_connect: u32,
        _originator_address: &str,
        _originator_port: u32,
        _session: &mut Session,
    ) -> Result<bool, Self::Error> {
        Ok(false)
    }
}

