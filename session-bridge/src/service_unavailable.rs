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

//! Service Unavailability: shown when Admission accepted a connection but
//! a downstream dependency fails its health probe. Built on the same
//! "ticker + channel event select" shape as `spectator.rs`'s
//! auto-refreshing list, with a `circuit_breaker_{threshold,timeout}`
//! pair tracking consecutive probe failures.

use std::time::{Duration, Instant};

use tracing::info;

use dungeongate_protocol::client::{AuthServiceClient, GameServiceClient};

use crate::ssh::channel_io::{ChannelEvent, ChannelIo};

const TOTAL_TIMEOUT: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Recovered,
    UserQuit,
    TimedOut,
}

/// Tracks consecutive dependency-probe failures; trips after `threshold` in
/// a row and stays tripped for `timeout` before allowing another probe
/// attempt to count toward recovery. Backed by the
/// `circuit_breaker_{threshold,timeout}` config keys.
pub struct CircuitBreaker {
    threshold: u32,
    timeout: Duration,
    consecutive_failures: u32,
    tripped_at: Option<Instant>,
}

impl CircuitBreaker {
    pub fn new(threshold: u32, timeout: Duration) -> Self {
        CircuitBreaker { threshold, timeout, consecutive_failures: 0, tripped_at: None }
    }

    pub fn record(&mut self, healthy: bool) {
        if healthy {
            self.consecutive_failures = 0;
            self.tripped_at = None;
        } else {
            self.consecutive_failures += 1;
            if self.consecutive_failures >= self.threshold {
                self.tripped_at = Some(Instant::now());
            }
        }
    }

    pub fn is_tripped(&self) -> bool {
        match self.tripped_at {
            Some(at) => at.elapsed() < self.timeout,
            None => false,
        }
    }
}

fn format_countdown(remaining: Duration) -> String {
    let secs = remaining.as_secs();
    format!("{}m {}s", secs / 60, secs % 60)
}

async fn probe(auth_client: &AuthServiceClient, game_client: &GameServiceClient) -> bool {
    auth_client.is_healthy().await && game_client.is_healthy().await
}

/// Renders the countdown banner, re-probing both dependencies every second,
/// until either both recover, the user presses `q`, or five minutes
/// elapse. `breaker` still tracks consecutive failures/trip state for
/// whoever reports on it, but never skips a tick's probe: the countdown's
/// whole point is catching recovery as soon as it happens, so a tripped
/// breaker backing off the probe itself would directly work against the
/// "re-probes each service on each tick" behavior this screen promises.
pub async fn run(
    channel: &mut ChannelIo,
    auth_client: &AuthServiceClient,
    game_client: &GameServiceClient,
    breaker: &mut CircuitBreaker,
) -> anyhow::Result<Outcome> {
    let start = Instant::now();
    let mut ticker = tokio::time::interval(Duration::from_secs(1));

    loop {
        let elapsed = start.elapsed();
        if elapsed >= TOTAL_TIMEOUT {
            channel
                .write_crlf("\nService still unavailable after 5 minutes. Disconnecting.\n")
                .await?;
            info!("service unavailable countdown expired, disconnecting");
            return Ok(Outcome::TimedOut);
        }

        let healthy = probe(auth_client, game_client).await;
        let was_tripped = breaker.is_tripped();
        breaker.record(healthy);
        if healthy {
            return Ok(Outcome::Recovered);
        }
        if !was_tripped && breaker.is_tripped() {
            tracing::warn!("circuit breaker tripped after repeated dependency probe failures");
        }

        let remaining = TOTAL_TIMEOUT - elapsed;
        let banner = format!(
            "\r\x1b[K=== Service temporarily unavailable ===\r\nRetrying... disconnecting in {}\r\n(q) disconnect now\r\n",
            format_countdown(remaining)
        );
        channel.write_all(banner.as_bytes()).await?;

        tokio::select! {
            _ = ticker.tick() => {}
            event = channel.next_event() => {
                match event {
                    None => return Ok(Outcome::UserQuit),
                    Some(ChannelEvent::Data(bytes)) if bytes.first() == Some(&b'q') => {
                        return Ok(Outcome::UserQuit);
                    }
                    _ => {}
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trips_after_threshold_consecutive_failures() {
        let mut cb = CircuitBreaker::new(3, Duration::from_secs(30));
        assert!(!cb.is_tripped());
        cb.record(false);
        cb.record(false);
        assert!(!cb.is_tripped());
        cb.record(false);
        assert!(cb.is_tripped());
    }

    #[test]
    fn a_success_resets_the_failure_count() {
        let mut cb = CircuitBreaker::new(2, Duration::from_secs(30));
        cb.record(false);
        cb.record(true);
        cb.record(false);
        assert!(!cb.is_tripped());
    }

    #[test]
    fn countdown_formats_minutes_and_seconds() {
        assert_eq!(format_countdown(Duration::from_secs(301)), "5m 1s");
        assert_eq!(format_countdown(Duration::from_secs(5)), "0m 5s");
    }
}
