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

//! `game-host` — the back process fronting the PTY Manager, Session
//! Registry, and Game I/O Endpoint. A `clap` CLI over a TOML config file,
//! `tracing`/`tracing-subscriber`'s `EnvFilter` for logging, and a signal
//! watch for graceful shutdown.

mod adapters;
mod config;
mod fanout;
mod pty;
mod reaper;
mod registry;
mod rpc;
mod signals;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[clap(version, author, about = "game-host runs the PTY manager and game session registry")]
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
    info!(address = %cfg.game_service.address, max_ptys = cfg.max_ptys, "starting game-host");

    let idle_timeout = cfg.idle_timeout.as_duration();
    let addr = cfg.game_service.address;
    let state = rpc::AppState::new(cfg);

    let mut shutdown = signals::install()?;
    let registry = state.registry.clone();

    let serve_task = tokio::spawn(async move { rpc::serve(addr, state).await });
    let reaper_task =
        tokio::spawn(async move { reaper::run(registry, idle_timeout, std::time::Duration::from_secs(30)).await });

    tokio::select! {
        result = serve_task => {
            result.context_or_log("game service task")?;
        }
        _ = reaper_task => {
            info!("reaper task ended unexpectedly");
        }
        _ = shutdown.changed() => {
            info!("shutting down game-host");
        }
    }

    Ok(())
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
