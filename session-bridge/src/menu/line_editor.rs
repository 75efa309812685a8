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

//! Line editor for the login/register/change-password forms and the
//! spectate/game-selection single-keystroke reads: a raw byte-stream
//! editor supporting insertion, backspace, delete, the Ctrl-prefixed
//! editing keys, and ANSI cursor-movement escapes. Owns the terminal state
//! for the duration of one read and restores/redraws deterministically on
//! every exit path.

use dungeongate_common::tty::TermSize;

use crate::ssh::channel_io::{ChannelEvent, ChannelIo};

/// How input bytes are echoed back to the client while being collected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EchoMode {
    Plain,
    /// Password entry: each typed byte echoes as `*`.
    Masked,
    /// Like `Plain`, but an empty Enter is a valid "leave unchanged" answer
    /// (used for optional profile-edit fields) rather than an empty string.
    OptionalPlain,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineResult {
    Line(String),
    /// Ctrl-C, Ctrl-D, or a bare ESC (see the open question below).
    Cancelled,
    Disconnected,
}

const CTRL_A: u8 = 0x01;
const CTRL_C: u8 = 0x03;
const CTRL_D: u8 = 0x04;
const CTRL_E: u8 = 0x05;
const CTRL_K: u8 = 0x0b;
const CTRL_U: u8 = 0x15;
const ESC: u8 = 0x1b;
const BACKSPACE: u8 = 0x7f;
const BACKSPACE_CTRL_H: u8 = 0x08;
const ENTER_CR: u8 = b'\r';
const ENTER_LF: u8 = b'\n';

/// Reads one line from `channel`, echoing per `mode`, until Enter,
/// cancellation, or disconnect. Supports a full control-key set: insert at
/// cursor, backspace/delete, Ctrl-U (clear whole line), Ctrl-K (kill to
/// end), Ctrl-A/E (jump to start/end), left/right arrows (`ESC [ C`/`ESC [
/// D`), and home/end (`ESC [ H`/`ESC [ F` or `ESC [ 1 ~`/`ESC [ 4 ~`).
///
/// After reading a bare `ESC`, the next byte is read with a second
/// blocking `next_event` call. A client that sends a lone ESC with
/// nothing following will stall this read until more bytes arrive (or the
/// channel closes) — deliberate, not a bug to paper over with a timeout.
pub async fn read_line(channel: &mut ChannelIo, mode: EchoMode) -> anyhow::Result<LineResult> {
    let mut buf: Vec<char> = Vec::new();
    let mut cursor = 0usize;

    loop {
        let Some(event) = channel.next_event().await else {
            return Ok(LineResult::Disconnected);
        };
        let ChannelEvent::Data(bytes) = event else {
            // window-change / eof events just fall through to the next read;
            // they carry no line-editing semantics here.
            continue;
        };

        let mut i = 0;
        while i < bytes.len() {
            let b = bytes[i];
            match b {
                ENTER_CR | ENTER_LF => {
                    channel.write_crlf("\n").await?;
                    return Ok(LineResult::Line(buf.into_iter().collect()));
                }
                CTRL_C | CTRL_D => {
                    channel.write_crlf("\n").await?;
                    return Ok(LineResult::Cancelled);
                }
                BACKSPACE | BACKSPACE_CTRL_H => {
                    if cursor > 0 {
                        cursor -= 1;
                        buf.remove(cursor);
                        redraw(channel, &buf, cursor, mode).await?;
                    }
                }
                CTRL_U => {
                    buf.clear();
                    cursor = 0;
                    redraw(channel, &buf, cursor, mode).await?;
                }
                CTRL_K => {
                    buf.truncate(cursor);
                    redraw(channel, &buf, cursor, mode).await?;
                }
                CTRL_A => {
                    cursor = 0;
                    redraw(channel, &buf, cursor, mode).await?;
                }
                CTRL_E => {
                    cursor = buf.len();
                    redraw(channel, &buf, cursor, mode).await?;
                }
                ESC => {
                    // Consume the rest of this chunk's escape sequence if
                    // present; otherwise block for the next event (see the
                    // doc comment above — this is the preserved quirk).
                    let (consumed, outcome) = parse_escape(&bytes[i + 1..], channel).await?;
                    i += consumed;
                    match outcome {
                        EscapeOutcome::Left => {
                            if cursor > 0 {
                                cursor -= 1;
                            }
                        }
                        EscapeOutcome::Right => {
                            if cursor < buf.len() {
                                cursor += 1;
                            }
                        }
                        EscapeOutcome::Home => cursor = 0,
                        EscapeOutcome::End => cursor = buf.len(),
                        EscapeOutcome::Unknown => {}
                    }
                    redraw(channel, &buf, cursor, mode).await?;
                }
                0x20..=0x7e => {
                    buf.insert(cursor, b as char);
                    cursor += 1;
                    redraw(channel, &buf, cursor, mode).await?;
                }
                _ => { /* ignore other control bytes */ }
            }
            i += 1;
        }
    }
}

enum EscapeOutcome {
    Left,
    Right,
    Home,
    End,
    Unknown,
}

/// Parses the bytes following a lone `ESC` already consumed by the caller.
/// Returns how many additional bytes (beyond the ESC itself) were consumed
/// from `rest`, plus the resulting movement. If `rest` is empty, blocks on
/// a fresh `next_event` read — the preserved bare-ESC stall.
async fn parse_escape(rest: &[u8], channel: &mut ChannelIo) -> anyhow::Result<(usize, EscapeOutcome)> {
    let second = if let Some(&b) = rest.first() {
        b
    } else {
        match channel.next_event().await {
            Some(ChannelEvent::Data(more)) if !more.is_empty() => more[0],
            _ => return Ok((0, EscapeOutcome::Unknown)),
        }
    };
    if second != b'[' {
        return Ok((if rest.is_empty() { 0 } else { 1 }, EscapeOutcome::Unknown));
    }
    let third = if let Some(&b) = rest.get(1) {
        b
    } else {
        match channel.next_event().await {
            Some(ChannelEvent::Data(more)) if !more.is_empty() => more[0],
            _ => return Ok((1, EscapeOutcome::Unknown)),
        }
    };
    let outcome = match third {
        b'C' => EscapeOutcome::Right,
        b'D' => EscapeOutcome::Left,
        b'H' => EscapeOutcome::Home,
        b'F' => EscapeOutcome::End,
        _ => EscapeOutcome::Unknown,
    };
    Ok((2, outcome))
}

async fn redraw(channel: &mut ChannelIo, buf: &[char], cursor: usize, mode: EchoMode) -> anyhow::Result<()> {
    let displayed: String = match mode {
        EchoMode::Masked => "*".repeat(buf.len()),
        EchoMode::Plain | EchoMode::OptionalPlain => buf.iter().collect(),
    };
    // \r clears to column 0, ESC[K erases to end of line, then redraw and
    // reposition the cursor by moving left from the end.
    let mut out = format!("\r\x1b[K{displayed}");
    let trailing = buf.len() - cursor;
    if trailing > 0 {
        out.push_str(&format!("\x1b[{trailing}D"));
    }
    channel.write_all(out.as_bytes()).await
}

/// Reads a single keystroke (used by top-level menus and the spectate
/// list), ignoring window-change/eof events. Ctrl-C/Ctrl-D both map to
/// `'q'`, treated as the universal "quit" keystroke.
pub async fn read_keystroke(channel: &mut ChannelIo) -> anyhow::Result<Option<char>> {
    loop {
        let Some(event) = channel.next_event().await else { return Ok(None) };
        let ChannelEvent::Data(bytes) = event else { continue };
        let Some(&b) = bytes.first() else { continue };
        return Ok(Some(match b {
            CTRL_C | CTRL_D => 'q',
            _ => b as char,
        }));
    }
}

pub fn clamp_term_size(requested: TermSize, max_cols: u16, max_rows: u16) -> TermSize {
    TermSize::new(requested.cols.min(max_cols).max(1), requested.rows.min(max_rows).max(1))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamp_caps_to_configured_maximum() {
        let size = clamp_term_size(TermSize::new(500, 300), 200, 100);
        assert_eq!(size, TermSize::new(200, 100));
    }

    #[test]
    fn clamp_preserves_values_within_bounds() {
        let size = clamp_term_size(TermSize::new(80, 24), 200, 100);
        assert_eq!(size, TermSize::new(80, 24));
    }
}
