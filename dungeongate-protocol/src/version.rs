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

//! Connection-opening version header. Every stream this workspace opens
//! across the front/back boundary starts with the back writing one of
//! these so a version-skewed front gets a warning instead of a confusing
//! parse failure.

use std::cmp;

use anyhow::anyhow;
use serde::{Deserialize, Serialize};

use dungeongate_common::consts::PROTOCOL_VERSION;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionHeader {
    pub version: u32,
}

impl VersionHeader {
    pub fn current() -> Self {
        VersionHeader { version: PROTOCOL_VERSION }
    }
}

#[derive(Debug)]
pub enum VersionCheck {
    Ok,
    Mismatch { warning: String },
}

/// Compares a peer's advertised protocol version against our own.
pub fn check(peer: &VersionHeader) -> anyhow::Result<VersionCheck> {
    match peer.version.cmp(&PROTOCOL_VERSION) {
        cmp::Ordering::Equal => Ok(VersionCheck::Ok),
        cmp::Ordering::Less => Ok(VersionCheck::Mismatch {
            warning: format!(
                "peer protocol (version {}) is older than ours (version {})",
                peer.version, PROTOCOL_VERSION
            ),
        }),
        cmp::Ordering::Greater => Ok(VersionCheck::Mismatch {
            warning: format!(
                "peer protocol (version {}) is newer than ours (version {})",
                peer.version, PROTOCOL_VERSION
            ),
        }),
    }
}

pub fn mismatch_is_fatal(_check: &VersionCheck) -> anyhow::Result<()> {
    // Same-major wire format has been stable across this protocol's only
    // version to date; a mismatch is surfaced as a warning, never refused.
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equal_versions_are_ok() {
        let peer = VersionHeader::current();
        matches!(check(&peer).unwrap(), VersionCheck::Ok);
    }

    #[test]
    fn older_peer_is_a_mismatch() {
        let peer = VersionHeader { version: 0 };
        match check(&peer).unwrap() {
            VersionCheck::Mismatch { warning } => assert!(warning.contains("older")),
            VersionCheck::Ok => panic!("expected mismatch"),
        }
    }
}
