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

//! `session-bridge` — the front process SSH clients connect to: Admission,
//! the SSH Listener, and the Menu Engine, all dialing out to `game-host`
//! for everything session- and game-process-related. A `clap` CLI over a
//! TOML config file, `tracing`/`tracing-subscriber`'s `EnvFilter` for
//! logging, and a signal watch for graceful shutdown.

mod admission;
mod auth;
mod config;
mod gameio;
mod menu;
mod service_unavailable;
mod session;
mod signals;
mod spectator;
mod ssh;

use std::sync::Arc;
use std::time::Instant;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use dungeongate_protocol::client::{AuthServiceClient, GameServiceClient};

use crate::admission::AdmissionController;
use crate::menu::banner::BannerCache;
use crate::session::SessionDeps;

#[derive(Parser, Debug)]
#[clap(version, author, about = "session-bridge fronts SSH connections and hands games off to game-host")]
struct Args {
    #[clap(short, long, help = "a toml file containing configuration")]
    config_file: Option<String>,
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let args = Args::parse();
    let cfg = config::read_config(&args.config_file)?;
    info!(
        address = %cfg.ssh.address,
        port = cfg.ssh.port,
        max_connections = cfg.max_connections,
        "starting session-bridge"
    );

    let call_timeout = cfg.stream_timeout.as_duration();
    let auth_client = AuthServiceClient::new(cfg.auth_service.address, call_timeout);
    let game_client = GameServiceClient::new(cfg.game_service.address, call_timeout);
    let game_io_addr = cfg.game_service.address;
    let admission = Arc::new(AdmissionController::new(cfg.max_connections, cfg.max_connections_per_ip));

    let deps = Arc::new(SessionDeps {
        config: Arc::new(cfg),
        auth_client,
        game_client,
        game_io_addr,
        banner_cache: BannerCache::new(),
        admission,
        server_id: hostname(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        started_at: Instant::now(),
    });

    let mut shutdown = signals::install()?;
    let serve_task = tokio::spawn(ssh::listener::serve(deps));

    tokio::select! {
        result = serve_task => {
            result.context_or_log("SSH listener task")?;
        }
        _ = shutdown.changed() => {
            info!("shutting down session-bridge");
        }
    }

    Ok(())
}

fn hostname() -> String {
    std::env::var("HOSTNAME")
        .or_else(|_| std::env::var("HOST"))
        .unwrap_or_else(|_| "session-bridge".to_string())
}

trait JoinResultExt<T> {
    fn context_or_log(self, what: &str) -> anyhow::Result<T>;
}

impl<T> JoinResultExt<T> for Result<anyhow::Result<T>, tokio::task::JoinError> {
    fn context_or_log(self, what: &str) -> anyhow::Result<T> {
        match self {
            Ok(inner) => inner,
            Err(e) => Err(anyhow::anyhow!("{what} panicked: {e}")),
        }
    }
}
