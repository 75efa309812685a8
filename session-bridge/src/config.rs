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

//! `session-bridge`'s configuration surface: the front process's config
//! keys. Same shape as `game-host::config`: a `#[derive(Deserialize)]`
//! tree loaded via `toml::from_str`, each field defaulted at the point of
//! use.

use std::{fs, net::SocketAddr, path::PathBuf};

use anyhow::Context;
use serde::Deserialize;
use tracing::{info, instrument};

use dungeongate_common::duration::HumanDuration;

#[instrument(skip_all)]
pub fn read_config(config_file: &Option<String>) -> anyhow::Result<Config> {
    let mut config = Config::default();
    if let Some(path) = config_file {
        info!("parsing explicitly passed in config ({})", path);
        let raw = fs::read_to_string(path).context("reading session-bridge config toml")?;
        config = toml::from_str(&raw).context("parsing session-bridge config file")?;
    }
    Ok(config)
}

#[derive(Debug, Deserialize, Clone)]
pub struct SshConfig {
    #[serde(default = "default_ssh_address")]
    pub address: String,
    #[serde(default = "default_ssh_port")]
    pub port: u16,
    #[serde(default = "default_host_key_path")]
    pub host_key_path: PathBuf,
    #[serde(default = "default_true")]
    pub password_auth: bool,
    #[serde(default)]
    pub public_key_auth: bool,
    #[serde(default = "default_true")]
    pub allow_anonymous: bool,
    /// Empty/absent means "allow all usernames".
    #[serde(default)]
    pub allowed_username: Option<String>,
    /// The shared-password shortcut. Unset disables the shortcut entirely.
    #[serde(default)]
    pub ssh_password: Option<String>,
    #[serde(default = "default_ssh_idle_timeout")]
    pub idle_timeout: HumanDuration,
}

fn default_ssh_address() -> String {
    "0.0.0.0".to_string()
}

fn default_ssh_port() -> u16 {
    dungeongate_common::DEFAULT_SSH_PORT
}

fn default_host_key_path() -> PathBuf {
    PathBuf::from("/var/lib/dungeongate/ssh_host_key")
}

fn default_true() -> bool {
    true
}

fn default_ssh_idle_timeout() -> HumanDuration {
    HumanDuration(std::time::Duration::from_secs(3600))
}

impl Default for SshConfig {
    fn default() -> Self {
        SshConfig {
            address: default_ssh_address(),
            port: default_ssh_port(),
            host_key_path: default_host_key_path(),
            password_auth: true,
            public_key_auth: false,
            allow_anonymous: true,
            allowed_username: None,
            ssh_password: None,
            idle_timeout: default_ssh_idle_timeout(),
        }
    }
}

impl SshConfig {
    pub fn bind_addr(&self) -> anyhow::Result<SocketAddr> {
        format!("{}:{}", self.address, self.port)
            .parse()
            .with_context(|| format!("invalid ssh.{{address,port}} ({}:{})", self.address, self.port))
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServiceAddr {
    pub address: SocketAddr,
}

#[derive(Debug, Deserialize, Clone)]
pub struct MenuBannersConfig {
    #[serde(default = "default_banner_path_main_anon")]
    pub main_anon: PathBuf,
    #[serde(default = "default_banner_path_main_user")]
    pub main_user: PathBuf,
    #[serde(default = "default_banner_path_main_admin")]
    pub main_admin: PathBuf,
    #[serde(default = "default_banner_path_watch_menu")]
    pub watch_menu: PathBuf,
    #[serde(default = "default_banner_path_service_unavailable")]
    pub service_unavailable: PathBuf,
}

fn default_banner_path_main_anon() -> PathBuf {
    PathBuf::from("/etc/dungeongate/banners/main_anon.txt")
}
fn default_banner_path_main_user() -> PathBuf {
    PathBuf::from("/etc/dungeongate/banners/main_user.txt")
}
fn default_banner_path_main_admin() -> PathBuf {
    PathBuf::from("/etc/dungeongate/banners/main_admin.txt")
}
fn default_banner_path_watch_menu() -> PathBuf {
    PathBuf::from("/etc/dungeongate/banners/watch_menu.txt")
}
fn default_banner_path_service_unavailable() -> PathBuf {
    PathBuf::from("/etc/dungeongate/banners/service_unavailable.txt")
}

impl Default for MenuBannersConfig {
    fn default() -> Self {
        MenuBannersConfig {
            main_anon: default_banner_path_main_anon(),
            main_user: default_banner_path_main_user(),
            main_admin: default_banner_path_main_admin(),
            watch_menu: default_banner_path_watch_menu(),
            service_unavailable: default_banner_path_service_unavailable(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct MenuConfig {
    #[serde(default)]
    pub banners: MenuBannersConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub ssh: SshConfig,
    pub game_service: ServiceAddr,
    pub auth_service: ServiceAddr,

    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    #[serde(default = "default_max_connections_per_ip")]
    pub max_connections_per_ip: u32,
    #[serde(default = "default_connection_timeout")]
    pub connection_timeout: HumanDuration,
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout: HumanDuration,
    /// Carried for config-schema completeness. The burst-rate predicate
    /// itself is the hardcoded, non-sliding 5-attempts/1s window in
    /// `admission.rs`, deliberately not generalized to this key.
    #[serde(default = "default_rate_limit_window")]
    pub rate_limit_window: HumanDuration,
    #[serde(default = "default_max_terminal_cols")]
    pub max_terminal_cols: u16,
    #[serde(default = "default_max_terminal_rows")]
    pub max_terminal_rows: u16,
    #[serde(default = "default_stream_timeout")]
    pub stream_timeout: HumanDuration,
    #[serde(default)]
    pub circuit_breaker_threshold: CircuitBreakerThreshold,
    #[serde(default)]
    pub circuit_breaker_timeout: CircuitBreakerTimeout,
    #[serde(default = "default_health_check_interval")]
    pub health_check_interval: HumanDuration,
    #[serde(default = "default_health_check_timeout")]
    pub health_check_timeout: HumanDuration,
    /// Reserved for a background dependency-retry cadence distinct from the
    /// Service Unavailability screen's literal one-second countdown tick;
    /// not currently consulted by `service_unavailable.rs`.
    #[serde(default = "default_idle_retry_interval")]
    pub idle_retry_interval: HumanDuration,

    #[serde(default)]
    pub menu: MenuConfig,
}

#[derive(Debug, Deserialize, Clone, Copy)]
pub struct CircuitBreakerThreshold(pub u32);
impl Default for CircuitBreakerThreshold {
    fn default() -> Self {
        CircuitBreakerThreshold(3)
    }
}

#[derive(Debug, Deserialize, Clone, Copy)]
pub struct CircuitBreakerTimeout(pub HumanDuration);
impl Default for CircuitBreakerTimeout {
    fn default() -> Self {
        CircuitBreakerTimeout(HumanDuration(std::time::Duration::from_secs(30)))
    }
}

fn default_max_connections() -> usize {
    1000
}
fn default_max_connections_per_ip() -> u32 {
    10
}
fn default_connection_timeout() -> HumanDuration {
    HumanDuration(std::time::Duration::from_secs(30))
}
fn default_idle_timeout() -> HumanDuration {
    HumanDuration(std::time::Duration::from_secs(3600))
}
fn default_rate_limit_window() -> HumanDuration {
    HumanDuration(std::time::Duration::from_secs(60))
}
fn default_max_terminal_cols() -> u16 {
    200
}
fn default_max_terminal_rows() -> u16 {
    100
}
fn default_stream_timeout() -> HumanDuration {
    HumanDuration(std::time::Duration::from_secs(10))
}
fn default_health_check_interval() -> HumanDuration {
    HumanDuration(std::time::Duration::from_secs(30))
}
fn default_health_check_timeout() -> HumanDuration {
    HumanDuration(std::time::Duration::from_secs(5))
}
fn default_idle_retry_interval() -> HumanDuration {
    HumanDuration(std::time::Duration::from_secs(5))
}

impl Default for Config {
    fn default() -> Self {
        Config {
            ssh: SshConfig::default(),
            game_service: ServiceAddr {
                address: format!("127.0.0.1:{}", dungeongate_common::DEFAULT_GAME_SERVICE_PORT)
                    .parse()
                    .expect("valid default game service address"),
            },
            auth_service: ServiceAddr {
                address: "127.0.0.1:9191".parse().expect("valid default auth service address"),
            },
            max_connections: default_max_connections(),
            max_connections_per_ip: default_max_connections_per_ip(),
            connection_timeout: default_connection_timeout(),
            idle_timeout: default_idle_timeout(),
            rate_limit_window: default_rate_limit_window(),
            max_terminal_cols: default_max_terminal_cols(),
            max_terminal_rows: default_max_terminal_rows(),
            stream_timeout: default_stream_timeout(),
            circuit_breaker_threshold: CircuitBreakerThreshold::default(),
            circuit_breaker_timeout: CircuitBreakerTimeout::default(),
            health_check_interval: default_health_check_interval(),
            health_check_timeout: default_health_check_timeout(),
            idle_retry_interval: default_idle_retry_interval(),
            menu: MenuConfig::default(),
        }
    }
}
