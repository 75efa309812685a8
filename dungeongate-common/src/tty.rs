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

//! Terminal size: the column/row extent negotiated over SSH and carried
//! across the `session-bridge`/`game-host` wire, applied to a pty via
//! `portable-pty`'s own resize call rather than a raw ioctl here.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TermSize {
    pub cols: u16,
    pub rows: u16,
}

impl Default for TermSize {
    fn default() -> Self {
        TermSize {
            cols: crate::consts::DEFAULT_COLS,
            rows: crate::consts::DEFAULT_ROWS,
        }
    }
}

impl TermSize {
    pub fn new(cols: u16, rows: u16) -> Self {
        TermSize { cols, rows }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_80x24() {
        assert_eq!(TermSize::default(), TermSize::new(80, 24));
    }
}
