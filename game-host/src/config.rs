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

//! `game-host`'s configuration surface: a `#[derive(Deserialize)]` struct
//! with fields defaulted at the point of use, loaded from a TOML file with
//! `toml::from_str`.

use std::{collections::HashMap, fs, net::SocketAddr, path::PathBuf};

use anyhow::Context;
use serde::Deserialize;
use tracing::{info, instrument};

use dungeongate_common::duration::HumanDuration;

#[instrument(skip_all)]
pub fn read_config(config_file: &Option<String>) -> anyhow::Result<Config> {
    let mut config = Config::default();
    if let Some(path) = config_file {
        info!("parsing explicitly passed in config ({})", path);
        let raw = fs::read_to_string(path).context("reading game-host config toml")?;
        config = toml::from_str(&raw).context("parsing game-host config file")?;
    }
    Ok(config)
}

#[derive(Debug, Deserialize, Clone)]
pub struct GameServiceConfig {
    #[serde(default = "default_game_service_address")]
    pub address: SocketAddr,
}

impl Default for GameServiceConfig {
    fn default() -> Self {
        GameServiceConfig { address: default_game_service_address() }
    }
}

fn default_game_service_address() -> SocketAddr {
    format!("0.0.0.0:{}", dungeongate_common::DEFAULT_GAME_SERVICE_PORT)
        .parse()
        .expect("valid default game service address")
}

/// One entry in the game registry this back process hosts: `game-host`'s
/// local view of "which binaries am I allowed to fork", the minimum needed
/// to make `StartGameSession` actionable without a database client.
#[derive(Debug, Deserialize, Clone)]
pub struct GameDef {
    pub name: String,
    pub exec_path: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: HashMap<String, String>,
    #[serde(default)]
    pub working_dir: Option<PathBuf>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Selects the per-game adapter capability set from `adapters.rs`;
    /// falls back to the default adapter for unknown tags.
    #[serde(default)]
    pub adapter: Option<String>,
}

fn default_enabled() -> bool {
    true
}

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub game_service: GameServiceConfig,

    /// `max_ptys`, default 500.
    #[serde(default = "default_max_ptys")]
    pub max_ptys: usize,

    /// `idle_timeout`, default 1h. Sessions with no attached player stream
    /// past this threshold are swept by `reaper.rs`.
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout: HumanDuration,

    /// `stream_timeout`, default 10s.
    #[serde(default = "default_stream_timeout")]
    pub stream_timeout: HumanDuration,

    #[serde(default)]
    pub games: HashMap<String, GameDef>,
}

fn default_max_ptys() -> usize {
    500
}

fn default_idle_timeout() -> HumanDuration {
    HumanDuration(std::time::Duration::from_secs(3600))
}

fn default_stream_timeout() -> HumanDuration {
    HumanDuration(std::time::Duration::from_secs(10))
}

impl Default for Config {
    fn default() -> Self {
        Config {
            game_service: GameServiceConfig::default(),
            max_ptys: default_max_ptys(),
            idle_timeout: default_idle_timeout(),
            stream_timeout: default_stream_timeout(),
            games: HashMap::new(),
        }
    }
}
