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

//! Idle-session reaper: a periodic sweep that terminates sessions which
//! have sat past their idle timeout. Sessions are keyed by `Uuid` (never
//! reused), and the registry's lock makes "is this still the idle session
//! I found a moment ago" a single atomic `get`-under-lock, so a plain
//! periodic sweep over `Registry::idle_candidates` is enough — no
//! generation counter or min-heap needed to guard against a reused key.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, span, warn, Level};

use crate::registry::{now_unix, Registry};

pub async fn run(registry: Arc<Registry>, idle_timeout: Duration, poll_interval: Duration) {
    let _s = span!(Level::INFO, "reaper").entered();
    let mut ticker = tokio::time::interval(poll_interval);
    loop {
        ticker.tick().await;
        let cutoff = now_unix() - idle_timeout.as_secs() as i64;
        // Each termination carries a five-second SIGTERM grace period;
        // spawn them so one slow-to-die session doesn't hold up the rest
        // of this sweep's reaping.
        for session in registry.idle_candidates(cutoff) {
            let registry = registry.clone();
            tokio::spawn(async move {
                info!(session_id = %session.session_id, "reaping idle session");
                if let Err(e) = session.pty.force_terminate().await {
                    warn!(session_id = %session.session_id, error = %e, "error force-terminating idle session");
                }
                registry.remove(session.session_id);
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{fanout::Fanout, pty::PtyHandle, registry};
    use dungeongate_common::tty::TermSize;
    use uuid::Uuid;

    #[tokio::test]
    async fn sweeps_idle_session_after_one_tick() {
        let reg = Registry::new(10);
        let id = Uuid::new_v4();
        let session = registry::new_session(
            id,
            1,
            "alice".to_string(),
            "nethack".to_string(),
            TermSize::default(),
            PtyHandle::dummy_for_test(),
            Fanout::new(),
        );
        {
            let mut state = session.state.lock().unwrap();
            state.last_activity_unix_secs = 0;
        }
        reg.insert(session).unwrap();

        let reg_clone = reg.clone();
        let handle = tokio::spawn(async move {
            run(reg_clone, Duration::from_secs(1), Duration::from_millis(10)).await;
        });

        tokio::time::sleep(Duration::from_millis(100)).await;
        handle.abort();

        assert!(reg.get(id).is_none());
    }
}
