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

//! Length-prefixed async framing used by every stream this workspace opens
//! between `session-bridge` and `game-host`, built on `tokio::io::{AsyncRead,
//! AsyncWrite}` + `bincode` since both binaries talk over a tokio TCP
//! stream.
//!
//! Wire format:
//!
//! ```text
//! 4 bytes: length prefix, little endian u32
//! N bytes: bincode-encoded payload
//! ```

use anyhow::{anyhow, Context};
use serde::{de::DeserializeOwned, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Frames larger than this are refused rather than trusted blindly off the
/// wire; a malformed or malicious length prefix should not cause an
/// unbounded allocation.
pub const MAX_FRAME_LEN: u32 = 16 * 1024 * 1024;

/// Encodes `value` and writes it to `w` as a single length-prefixed frame.
pub async fn write_frame<T, W>(w: &mut W, value: &T) -> anyhow::Result<()>
where
    T: Serialize,
    W: AsyncWrite + Unpin,
{
    let payload = bincode::serialize(value).context("encoding frame payload")?;
    let len = u32::try_from(payload.len()).context("frame payload too large for u32 length")?;
    w.write_u32_le(len).await.context("writing frame length")?;
    w.write_all(&payload).await.context("writing frame payload")?;
    w.flush().await.context("flushing frame")?;
    Ok(())
}

/// Reads one length-prefixed frame from `r` and decodes it as `T`.
pub async fn read_frame<T, R>(r: &mut R) -> anyhow::Result<T>
where
    T: DeserializeOwned,
    R: AsyncRead + Unpin,
{
    let len = r.read_u32_le().await.context("reading frame length")?;
    if len > MAX_FRAME_LEN {
        return Err(anyhow!(
            "frame of size {} exceeds max frame length of {} bytes",
            len,
            MAX_FRAME_LEN
        ));
    }
    let mut buf = vec![0u8; len as usize];
    r.read_exact(&mut buf).await.context("reading frame payload")?;
    let value = bincode::deserialize(&buf).context("decoding frame payload")?;
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Sample {
        a: u32,
        b: String,
    }

    #[tokio::test]
    async fn round_trips_a_frame() {
        let mut buf = Vec::new();
        let value = Sample { a: 7, b: "hello".to_string() };
        write_frame(&mut buf, &value).await.unwrap();

        let mut cursor = std::io::Cursor::new(buf);
        let decoded: Sample = read_frame(&mut cursor).await.unwrap();
        assert_eq!(decoded, value);
    }

    #[tokio::test]
    async fn rejects_oversized_length_prefix() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&(MAX_FRAME_LEN + 1).to_le_bytes());
        let mut cursor = std::io::Cursor::new(buf);
        let result: anyhow::Result<Sample> = read_frame(&mut cursor).await;
        assert!(result.is_err());
    }
}
