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

//! Per-game adapter capability set: a `{setup, prepare, initial_input,
//! filter_output, cleanup}` trait keyed by game id, with a default adapter
//! for unknown ids, so `nethack` and future games can each override only
//! the steps they need to (env setup, command construction, an initial
//! nudge into the process, output pass-through, exit bookkeeping).

use std::collections::HashMap;
use std::sync::Arc;

use portable_pty::CommandBuilder;

use crate::config::GameDef;

/// Expands `${USERNAME}` tokens in configured environment values, the one
/// substitution spec §4.5 calls out by name. Unknown `${...}` tokens are
/// left untouched rather than erroring, since an adapter's `env` table is
/// operator-authored config, not untrusted input.
pub fn expand_username_token(value: &str, username: &str) -> String {
    value.replace("${USERNAME}", username)
}

/// The five hook points spec §9 names. Every method has a default no-op (or
/// identity, for `filter_output`) implementation so a new adapter only has
/// to override what actually differs from generic behavior.
pub trait GameAdapter: Send + Sync {
    /// Contributes adapter-specific environment variables/working dir on
    /// top of whatever the `GameDef` config already set.
    fn setup_env(&self, _env: &mut HashMap<String, String>, _username: &str) {}

    /// Builds the command to spawn, given the resolved `GameDef`. The
    /// default adapter just runs `exec_path` with its configured `args`.
    fn prepare(&self, game: &GameDef, env: &HashMap<String, String>) -> CommandBuilder {
        let mut cmd = CommandBuilder::new(&game.exec_path);
        cmd.args(&game.args);
        if let Some(dir) = &game.working_dir {
            cmd.cwd(dir);
        }
        for (key, value) in env {
            cmd.env(key, value);
        }
        cmd
    }

    /// A keystroke sequence fed into the pty immediately after spawn, e.g.
    /// to dismiss a splash screen. `None` means send nothing.
    fn initial_input(&self) -> Option<Vec<u8>> {
        None
    }

    /// Transforms one 4 KiB output chunk before it reaches the fan-out.
    /// Identity by default.
    fn filter_output(&self, chunk: Vec<u8>) -> Vec<u8> {
        chunk
    }

    /// Runs after the child process has exited, e.g. to remove per-session
    /// scratch files. No-op by default.
    fn cleanup(&self, _game: &GameDef, _username: &str) {}
}

/// Used for any `game_id` without a more specific registration.
pub struct DefaultAdapter;

impl GameAdapter for DefaultAdapter {}

/// NetHack's canonical environment (`HACKDIR`, `NETHACKDIR`,
/// `NETHACKOPTIONS`, `TERM`, `USER`, `HOME`) and an initial Enter to dismiss
/// its splash screen, per spec §4.5's worked example.
pub struct NethackAdapter;

impl GameAdapter for NethackAdapter {
    fn setup_env(&self, env: &mut HashMap<String, String>, username: &str) {
        env.entry("USER".to_string()).or_insert_with(|| username.to_string());
        env.entry("TERM".to_string()).or_insert_with(|| "xterm-256color".to_string());
        if let Some(hackdir) = env.get("HACKDIR").cloned() {
            env.entry("NETHACKDIR".to_string()).or_insert(hackdir);
        }
    }

    fn initial_input(&self) -> Option<Vec<u8>> {
        Some(b"\r".to_vec())
    }
}

/// Selects an adapter by `GameDef::adapter` (falling back to `game_id` for
/// untagged defs), defaulting to `DefaultAdapter` for anything unknown.
pub struct AdapterRegistry {
    adapters: HashMap<String, Arc<dyn GameAdapter>>,
    default: Arc<dyn GameAdapter>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        let mut adapters: HashMap<String, Arc<dyn GameAdapter>> = HashMap::new();
        adapters.insert("nethack".to_string(), Arc::new(NethackAdapter));
        AdapterRegistry { adapters, default: Arc::new(DefaultAdapter) }
    }

    /// Returns an owned, `'static` handle so callers (notably the output
    /// pump, which runs on its own blocking thread) can hold it without
    /// borrowing from the registry.
    pub fn resolve(&self, game: &GameDef, game_id: &str) -> Arc<dyn GameAdapter> {
        let key = game.adapter.as_deref().unwrap_or(game_id);
        self.adapters.get(key).cloned().unwrap_or_else(|| self.default.clone())
    }
}

impl Default for AdapterRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn game_def() -> GameDef {
        GameDef {
            name: "NetHack".to_string(),
            exec_path: "/usr/games/nethack".to_string(),
            args: vec![],
            env: HashMap::new(),
            working_dir: None,
            enabled: true,
            adapter: None,
        }
    }

    #[test]
    fn unknown_game_id_falls_back_to_default() {
        let registry = AdapterRegistry::new();
        let game = game_def();
        let adapter = registry.resolve(&game, "some-unregistered-game");
        assert!(adapter.initial_input().is_none());
    }

    #[test]
    fn nethack_sends_initial_enter() {
        let registry = AdapterRegistry::new();
        let game = game_def();
        let adapter = registry.resolve(&game, "nethack");
        assert_eq!(adapter.initial_input(), Some(b"\r".to_vec()));
    }

    #[test]
    fn username_token_expands() {
        let expanded = expand_username_token("${USERNAME}/games/record", "alice");
        assert_eq!(expanded, "alice/games/record");
    }
}
