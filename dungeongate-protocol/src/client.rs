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

//! Thin async TCP clients shared by both RPC surfaces `session-bridge`
//! consumes: the Auth Service and the Game I/O Endpoint. Grounded on the
//! teacher's `libshpool::protocol::Client::new`, which dials, reads the
//! daemon's `VersionHeader`, and hands back a ready-to-use client; the
//! per-call unary helpers and the long-lived `GameIoStream` are this
//! workspace's generalization of that same dial-then-handshake shape to a
//! TCP transport and to a dedicated streaming RPC.

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{anyhow, Context};
use tokio::net::TcpStream;
use tracing::warn;

use crate::{
    authsvc::{AuthServiceReply, AuthServiceRequest},
    codec::{read_frame, write_frame},
    gameio::{GameIoRequest, GameIoResponse},
    gamesvc::{GameServiceReply, GameServiceRequest},
    transport::{GameHostReply, GameHostRequest},
    version::{self, VersionHeader},
};

async fn handshake(stream: &mut TcpStream) -> anyhow::Result<()> {
    let peer_version: VersionHeader = read_frame(stream).await.context("reading version header")?;
    match version::check(&peer_version)? {
        version::VersionCheck::Ok => {}
        version::VersionCheck::Mismatch { warning } => warn!("{}", warning),
    }
    Ok(())
}

/// One-shot client for the Auth Service's unary RPC surface. A new
/// connection is opened per call, matching the auth service's role as an
/// external, independently-scaled collaborator rather than a long-lived
/// session peer.
pub struct AuthServiceClient {
    addr: SocketAddr,
    call_timeout: Duration,
}

impl AuthServiceClient {
    pub fn new(addr: SocketAddr, call_timeout: Duration) -> Self {
        AuthServiceClient { addr, call_timeout }
    }

    pub async fn call(&self, request: AuthServiceRequest) -> anyhow::Result<AuthServiceReply> {
        tokio::time::timeout(self.call_timeout, self.call_inner(request))
            .await
            .context("auth service call timed out")?
    }

    async fn call_inner(&self, request: AuthServiceRequest) -> anyhow::Result<AuthServiceReply> {
        let mut stream = TcpStream::connect(self.addr)
            .await
            .context("connecting to auth service")?;
        handshake(&mut stream).await?;
        write_frame(&mut stream, &request).await.context("writing auth request")?;
        let reply: AuthServiceReply = read_frame(&mut stream).await.context("reading auth reply")?;
        Ok(reply)
    }

    /// Health is inferred from whether `ValidateToken("")` yields any
    /// response at all versus a transport error.
    pub async fn is_healthy(&self) -> bool {
        self.call(AuthServiceRequest::ValidateToken(
            crate::authsvc::ValidateTokenRequest { token: String::new() },
        ))
        .await
        .is_ok()
    }
}

/// One-shot client for the Game Service's unary RPC surface.
pub struct GameServiceClient {
    addr: SocketAddr,
    call_timeout: Duration,
}

impl GameServiceClient {
    pub fn new(addr: SocketAddr, call_timeout: Duration) -> Self {
        GameServiceClient { addr, call_timeout }
    }

    pub async fn call(&self, request: GameServiceRequest) -> anyhow::Result<GameServiceReply> {
        tokio::time::timeout(self.call_timeout, self.call_inner(request))
            .await
            .context("game service call timed out")?
    }

    async fn call_inner(&self, request: GameServiceRequest) -> anyhow::Result<GameServiceReply> {
        let mut stream = TcpStream::connect(self.addr)
            .await
            .context("connecting to game service")?;
        handshake(&mut stream).await?;
        write_frame(&mut stream, &GameHostRequest::Unary(request))
            .await
            .context("writing game service request")?;
        let reply: GameHostReply = read_frame(&mut stream).await.context("reading game service reply")?;
        match reply {
            GameHostReply::Unary(r) => Ok(r),
            GameHostReply::Io(_) => Err(anyhow!("expected a unary reply, got an Io frame")),
        }
    }

    pub async fn is_healthy(&self) -> bool {
        self.call(GameServiceRequest::Health(crate::gamesvc::HealthRequest))
            .await
            .is_ok()
    }
}

/// A long-lived `StreamGameIO` attachment, opened once per play/spectate
/// session and held for the lifetime of the Game I/O Proxy pump (spec
/// §4.4). Unlike the unary clients this owns its socket across many
/// send/recv calls.
pub struct GameIoStream {
    stream: TcpStream,
}

impl GameIoStream {
    pub async fn connect(addr: SocketAddr) -> anyhow::Result<Self> {
        let mut stream = TcpStream::connect(addr).await.context("connecting to game host")?;
        handshake(&mut stream).await?;
        Ok(GameIoStream { stream })
    }

    pub async fn send(&mut self, request: GameIoRequest) -> anyhow::Result<()> {
        write_frame(&mut self.stream, &GameHostRequest::Io(request))
            .await
            .context("writing game io request")
    }

    pub async fn recv(&mut self) -> anyhow::Result<GameIoResponse> {
        let reply: GameHostReply = read_frame(&mut self.stream).await.context("reading game io reply")?;
        match reply {
            GameHostReply::Io(r) => Ok(r),
            GameHostReply::Unary(_) => Err(anyhow!("expected an Io reply, got a Unary frame")),
        }
    }
}
