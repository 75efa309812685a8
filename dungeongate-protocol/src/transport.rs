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

//! The outer envelope multiplexing the Game I/O Endpoint's unary RPCs and
//! its `StreamGameIO` stream over one TCP listener: a tag distinguishing
//! otherwise independently-typed payloads on a single socket type. A
//! connection either carries exactly one `Unary` request/reply pair and
//! then closes, or an open-ended sequence of `Io` request/response frames
//! for the lifetime of a player/spectator attachment.

use serde::{Deserialize, Serialize};

use crate::{gameio::{GameIoRequest, GameIoResponse}, gamesvc::{GameServiceReply, GameServiceRequest}};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum GameHostRequest {
    Unary(GameServiceRequest),
    Io(GameIoRequest),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum GameHostReply {
    Unary(GameServiceReply),
    Io(GameIoResponse),
}
