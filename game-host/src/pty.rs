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

//! PTY Manager: `CreatePTY`/`Setsize`/`Close`/`ForceTerminate` over
//! `portable-pty`'s `native_pty_system` + `openpty` + `spawn_command`
//! shape; blocking PTY calls run via
//! `tokio::task::spawn_blocking`.

use std::io::{Read, Write};
use std::sync::{Arc, Mutex};

use anyhow::Context;
use portable_pty::{native_pty_system, Child, CommandBuilder, ExitStatus, MasterPty, PtySize};

use dungeongate_common::consts::FORCE_TERMINATE_GRACE;
use dungeongate_common::tty::TermSize;

fn to_pty_size(size: TermSize) -> PtySize {
    PtySize { rows: size.rows, cols: size.cols, pixel_width: 0, pixel_height: 0 }
}

struct Inner {
    master: Mutex<Box<dyn MasterPty + Send>>,
    writer: Mutex<Box<dyn Write + Send>>,
    child: Mutex<Box<dyn Child + Send + Sync>>,
}

/// A handle to one spawned game process's pty. Cheaply `Clone`able; every
/// clone shares the same underlying master/writer/child through `Arc`.
#[derive(Clone)]
pub struct PtyHandle {
    inner: Arc<Inner>,
}

/// `CreatePTY`: opens a pty sized to `size` and spawns `cmd` in the slave.
/// Blocking end to end; run inside `tokio::task::spawn_blocking`.
pub fn spawn(cmd: CommandBuilder, size: TermSize) -> anyhow::Result<(PtyHandle, Box<dyn Read + Send>)> {
    let pty_system = native_pty_system();
    let pair = pty_system.openpty(to_pty_size(size)).context("opening pty")?;
    let reader = pair.master.try_clone_reader().context("cloning pty reader")?;
    let writer = pair.master.take_writer().context("taking pty writer")?;
    let child = pair.slave.spawn_command(cmd).context("spawning command in pty slave")?;
    // The slave fd must close once the child inherits its own copy, or
    // reads past the child's exit block forever waiting on a writer that
    // will never arrive.
    drop(pair.slave);
    let handle = PtyHandle {
        inner: Arc::new(Inner {
            master: Mutex::new(pair.master),
            writer: Mutex::new(writer),
            child: Mutex::new(child),
        }),
    };
    Ok((handle, reader))
}

impl PtyHandle {
    /// Forwards player/spectator input into the pty's master side.
    pub fn write_input(&self, bytes: &[u8]) -> anyhow::Result<()> {
        let mut writer = self.inner.writer.lock().unwrap();
        writer.write_all(bytes).context("writing pty input")?;
        writer.flush().context("flushing pty input")
    }

    /// `Setsize`.
    pub fn resize(&self, size: TermSize) -> anyhow::Result<()> {
        let master = self.inner.master.lock().unwrap();
        master.resize(to_pty_size(size)).context("resizing pty")
    }

    /// `Close`: drops the write half so the child sees EOF on its stdin and
    /// can exit on its own, without forcibly killing it. `portable-pty`
    /// exposes no softer "ask nicely" primitive than that.
    pub fn close(&self) -> anyhow::Result<()> {
        let mut writer = self.inner.writer.lock().unwrap();
        *writer = Box::new(std::io::sink());
        Ok(())
    }

    /// `ForceTerminate`: SIGTERM, a five-second grace period, then SIGKILL
    /// if the child is still alive, then closes the pty. Matches
    /// spec's "sends SIGTERM, waits five seconds, sends SIGKILL if still
    /// alive, then closes the PTY" exactly, rather than `Child::kill`'s
    /// unconditional SIGKILL.
    pub async fn force_terminate(&self) -> anyhow::Result<()> {
        let pid = {
            let child = self.inner.child.lock().unwrap();
            child.process_id()
        };
        match pid {
            Some(pid) => {
                let _ = nix::sys::signal::kill(
                    nix::unistd::Pid::from_raw(pid as i32),
                    nix::sys::signal::Signal::SIGTERM,
                );
                tokio::time::sleep(FORCE_TERMINATE_GRACE).await;
                let still_alive = {
                    let mut child = self.inner.child.lock().unwrap();
                    matches!(child.try_wait(), Ok(None))
                };
                if still_alive {
                    let mut child = self.inner.child.lock().unwrap();
                    child.kill().context("SIGKILL after SIGTERM grace period expired")?;
                }
            }
            None => {
                // Already reaped or the platform can't report a pid; fall
                // back to the unconditional kill so this still terminates.
                let mut child = self.inner.child.lock().unwrap();
                child.kill().context("killing pty child with no reported pid")?;
            }
        }
        self.close()
    }

    pub fn try_wait(&self) -> anyhow::Result<Option<ExitStatus>> {
        let mut child = self.inner.child.lock().unwrap();
        child.try_wait().context("polling pty child")
    }
}

#[cfg(test)]
impl PtyHandle {
    /// Spawns a trivial, already-exiting process so registry/fanout tests
    /// have a real `PtyHandle` to hang off of without caring about actual
    /// game I/O.
    pub fn dummy_for_test() -> PtyHandle {
        let cmd = CommandBuilder::new("true");
        let (handle, _reader) = spawn(cmd, TermSize::default()).expect("spawn dummy pty for test");
        handle
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spawn_true_exits_cleanly() {
        let cmd = CommandBuilder::new("true");
        let (handle, _reader) = spawn(cmd, TermSize::default()).unwrap();
        // Give the child a moment; `try_wait` is non-blocking so this may
        // legitimately observe `None` once before the exit status lands.
        std::thread::sleep(std::time::Duration::from_millis(200));
        let status = handle.try_wait().unwrap();
        assert!(status.is_some());
    }

    #[test]
    fn close_does_not_error_after_exit() {
        let handle = PtyHandle::dummy_for_test();
        std::thread::sleep(std::time::Duration::from_millis(200));
        assert!(handle.close().is_ok());
    }
}
