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

//! Graceful shutdown on `SIGTERM`/`SIGINT`: conditional-shutdown-then-arm
//! registration so a second signal forces an immediate exit, built on
//! `tokio::signal::unix` since this binary is tokio-native end to end.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Context;
use signal_hook::consts::{SIGINT, SIGTERM};
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::watch;
use tracing::info;

/// Registers `SIGTERM`/`SIGINT` handlers and returns a watch receiver that
/// fires once when the first signal arrives. A second signal bypasses the
/// watch entirely and forces an immediate `exit(1)`, so mashing ^C never
/// leaves the process stuck mid-graceful-shutdown.
pub fn install() -> anyhow::Result<watch::Receiver<bool>> {
    let term_now = Arc::new(AtomicBool::new(false));
    let (tx, rx) = watch::channel(false);

    spawn_watcher(SIGTERM, term_now.clone(), tx.clone())?;
    spawn_watcher(SIGINT, term_now, tx)?;

    Ok(rx)
}

fn spawn_watcher(raw_sig: i32, term_now: Arc<AtomicBool>, tx: watch::Sender<bool>) -> anyhow::Result<()> {
    let mut stream = signal(SignalKind::from_raw(raw_sig)).context("registering signal handler")?;
    tokio::spawn(async move {
        loop {
            stream.recv().await;
            if term_now.swap(true, Ordering::SeqCst) {
                info!("second shutdown signal received, exiting immediately");
                std::process::exit(1);
            }
            info!("received shutdown signal");
            let _ = tx.send(true);
        }
    });
    Ok(())
}
