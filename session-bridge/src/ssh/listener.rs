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

//! The manual TCP accept loop: Admission runs on every accepted socket
//! before a single SSH protocol byte is read, so a rejected peer never
//! reaches `russh`'s handshake at all. Built on a bare
//! `TcpListener::bind`/`accept`/`server::run_stream` loop rather than
//! `russh`'s own `Server`-trait listen loop, since that's what admission
//! gating before the handshake requires.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::admission::AdmissionDecision;
use crate::session::SessionDeps;
use crate::ssh::handler::SshHandler;
use crate::ssh::host_key;

const SWEEP_INTERVAL: Duration = Duration::from_secs(5 * 60);

fn build_server_config(deps: &SessionDeps) -> anyhow::Result<Arc<russh::server::Config>> {
    let key = host_key::load_or_generate(&deps.config.ssh.host_key_path)?;
    let mut config = russh::server::Config::default();
    config.keys.push(key);
    config.connection_timeout = Some(deps.config.connection_timeout.as_duration());
    config.auth_rejection_time = Duration::from_secs(1);
    Ok(Arc::new(config))
}

/// Binds `ssh.address:ssh.port`, then loops forever: accept, admit, and on
/// acceptance spawn a `russh::server::run_stream` task driven by a fresh
/// `SshHandler`. A rejected connection is closed immediately by dropping
/// the socket, without ever constructing a `Handler`.
pub async fn serve(deps: Arc<SessionDeps>) -> anyhow::Result<()> {
    let admission = Arc::clone(&deps.admission);
    let bind_addr = deps.config.ssh.bind_addr()?;
    let listener = TcpListener::bind(bind_addr)
        .await
        .with_context(|| format!("binding SSH listener on {bind_addr}"))?;
    info!(address = %bind_addr, "SSH listener bound");

    let server_config = build_server_config(&deps)?;

    let sweep_admission = Arc::clone(&admission);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(SWEEP_INTERVAL);
        loop {
            ticker.tick().await;
            sweep_admission.sweep();
        }
    });

    loop {
        let (socket, peer_addr) = match listener.accept().await {
            Ok(pair) => pair,
            Err(e) => {
                warn!(error = %e, "accept failed");
                continue;
            }
        };

        let (decision, admitted) = admission.admit(peer_addr.ip());
        let admitted = match decision {
            AdmissionDecision::Accepted => admitted.expect("Accepted decision always carries a handle"),
            other => {
                info!(peer = %peer_addr, decision = ?other, "connection rejected by admission");
                drop(socket);
                continue;
            }
        };

        let _ = socket.set_nodelay(true);

        let deps = Arc::clone(&deps);
        let config = Arc::clone(&server_config);
        tokio::spawn(async move {
            let handler = SshHandler::new(peer_addr, deps, admitted);
            if let Err(e) = russh::server::run_stream(config, socket, handler).await {
                warn!(peer = %peer_addr, error = %e, "SSH connection ended with an error");
            }
        });
    }
}
