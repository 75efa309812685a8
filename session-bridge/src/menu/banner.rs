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

//! Banner rendering: a pure function of (template bytes, variable map,
//! UTF-8 flag), cached by key for a bounded TTL, in the same
//! `Mutex<HashMap<...>>` idiom as `admission.rs`'s per-IP tracker.

use std::{
    collections::HashMap,
    sync::Mutex,
    time::{Duration, Instant},
};

use chrono::Utc;

const CACHE_TTL: Duration = Duration::from_secs(300);
const CACHE_MAX_ENTRIES: usize = 50;

/// The fixed token set substituted in a single pass. `$USERNAME` is
/// included only when the identity is authenticated. `date`/`time`/
/// `timezone` are resolved once by the caller (typically from
/// `chrono::Local::now()` at the point a menu is about to be shown) rather
/// than read live inside `render`, so `render` stays a pure function of
/// `(template, vars, utf8)` — two calls with the same `BannerVars` always
/// produce the same bytes, regardless of how much wall-clock time passed
/// between them.
#[derive(Debug, Clone, Default)]
pub struct BannerVars {
    pub server_id: String,
    pub version: String,
    pub uptime: Duration,
    pub username: Option<String>,
    pub date: String,
    pub time: String,
    pub timezone: String,
}

impl BannerVars {
    fn token_map(&self) -> HashMap<&'static str, String> {
        let mut map = HashMap::new();
        map.insert("$SERVERID", self.server_id.clone());
        map.insert("$DATE", self.date.clone());
        map.insert("$TIME", self.time.clone());
        map.insert("$UPTIME", format_uptime(self.uptime));
        map.insert("$VERSION", self.version.clone());
        map.insert("$TIMEZONE", self.timezone.clone());
        if let Some(username) = &self.username {
            map.insert("$USERNAME", username.clone());
        }
        map
    }
}

fn format_uptime(d: Duration) -> String {
    let total_secs = d.as_secs();
    let days = total_secs / 86_400;
    let hours = (total_secs % 86_400) / 3600;
    let mins = (total_secs % 3600) / 60;
    let secs = total_secs % 60;
    if days > 0 {
        format!("{days}d {hours}h {mins}m")
    } else if hours > 0 {
        format!("{hours}h {mins}m {secs}s")
    } else {
        format!("{mins}m {secs}s")
    }
}

/// CRLF-normalizes template bytes, then substitutes every occurrence of
/// each `$TOKEN` (longest-key-first so `$SERVERID` isn't shadowed by a
/// shorter false match) in a single left-to-right pass.
fn substitute(template: &str, vars: &HashMap<&'static str, String>) -> String {
    let mut tokens: Vec<&&'static str> = vars.keys().collect();
    tokens.sort_by_key(|t| std::cmp::Reverse(t.len()));

    let mut out = String::with_capacity(template.len());
    let bytes = template.as_bytes();
    let mut i = 0;
    'outer: while i < bytes.len() {
        if bytes[i] == b'$' {
            for token in &tokens {
                if template[i..].starts_with(*token) {
                    out.push_str(&vars[*token]);
                    i += token.len();
                    continue 'outer;
                }
            }
        }
        let ch = template[i..].chars().next().unwrap();
        out.push(ch);
        i += ch.len_utf8();
    }
    out
}

fn normalize_crlf(template: &str) -> String {
    let mut out = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\r' {
            if chars.peek() == Some(&'\n') {
                chars.next();
            }
            out.push_str("\r\n");
        } else if c == '\n' {
            out.push_str("\r\n");
        } else {
            out.push(c);
        }
    }
    out
}

/// A fixed table of Unicode code points with ASCII fallbacks, used when the
/// client's negotiated terminal can't be trusted to render UTF-8 (spec
/// §4.3's "Unicode-fallback pass"). Not exhaustive — covers the
/// box-drawing, punctuation, and arrow glyphs banner templates in this
/// project actually use.
const ASCII_FALLBACKS: &[(char, &str)] = &[
    ('─', "-"), ('│', "|"), ('┌', "+"), ('┐', "+"), ('└', "+"), ('┘', "+"),
    ('├', "+"), ('┤', "+"), ('┬', "+"), ('┴', "+"), ('┼', "+"),
    ('═', "="), ('║', "|"), ('╔', "+"), ('╗', "+"), ('╚', "+"), ('╝', "+"),
    ('→', "->"), ('←', "<-"), ('↑', "^"), ('↓', "v"),
    ('“', "\""), ('”', "\""), ('‘', "'"), ('’', "'"), ('…', "..."), ('—', "--"),
    ('★', "*"), ('✓', "v"), ('✗', "x"),
];

fn ascii_fallback(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if c.is_ascii() {
            out.push(c);
        } else if let Some((_, replacement)) = ASCII_FALLBACKS.iter().find(|(k, _)| *k == c) {
            out.push_str(replacement);
        } else {
            out.push('?');
        }
    }
    out
}

/// Renders `template` against `vars`, CRLF-normalized and, when `utf8` is
/// false, passed through the ASCII-fallback table. A pure function of its
/// three inputs.
pub fn render(template: &str, vars: &BannerVars, utf8: bool) -> String {
    let normalized = normalize_crlf(template);
    let substituted = substitute(&normalized, &vars.token_map());
    if utf8 {
        substituted
    } else {
        ascii_fallback(&substituted)
    }
}

struct CacheEntry {
    rendered: String,
    rendered_at: Instant,
}

/// Caches rendered banners by an arbitrary key (typically the banner path
/// plus a coarse variant tag like the identity's auth state), bounded to
/// `CACHE_MAX_ENTRIES` with a five-minute TTL.
pub struct BannerCache {
    entries: Mutex<HashMap<String, CacheEntry>>,
}

impl BannerCache {
    pub fn new() -> Self {
        BannerCache { entries: Mutex::new(HashMap::new()) }
    }

    /// Returns a cached render for `key` if present and younger than the
    /// TTL, else renders fresh via `render_fn`, caches it, and returns it.
    pub fn get_or_render(&self, key: &str, render_fn: impl FnOnce() -> String) -> String {
        let mut entries = self.entries.lock().unwrap();
        if let Some(entry) = entries.get(key) {
            if entry.rendered_at.elapsed() < CACHE_TTL {
                return entry.rendered.clone();
            }
        }
        let rendered = render_fn();
        if entries.len() >= CACHE_MAX_ENTRIES && !entries.contains_key(key) {
            if let Some(oldest_key) = entries
                .iter()
                .min_by_key(|(_, v)| v.rendered_at)
                .map(|(k, _)| k.clone())
            {
                entries.remove(&oldest_key);
            }
        }
        entries.insert(
            key.to_string(),
            CacheEntry { rendered: rendered.clone(), rendered_at: Instant::now() },
        );
        rendered
    }
}

impl Default for BannerCache {
    fn default() -> Self {
        Self::new()
    }
}

pub fn now_unix() -> i64 {
    Utc::now().timestamp()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_known_tokens_and_crlf_normalizes() {
        let vars = BannerVars {
            server_id: "dg-1".to_string(),
            version: "1.0.0".to_string(),
            uptime: Duration::from_secs(3725),
            date: "2026-07-26".to_string(),
            time: "09:00:00".to_string(),
            timezone: "UTC".to_string(),
            ..Default::default()
        };
        let out = render("Welcome to $SERVERID v$VERSION\nUptime: $UPTIME\n$DATE $TIME $TIMEZONE\n", &vars, true);
        assert!(out.contains("Welcome to dg-1 v1.0.0\r\n"));
        assert!(out.contains("Uptime: 1h 2m 5s\r\n"));
        assert!(out.contains("2026-07-26 09:00:00 UTC\r\n"));
        assert!(!out.contains('\n')
            || out.match_indices('\n').all(|(i, _)| out.as_bytes()[i - 1] == b'\r'));
    }

    #[test]
    fn username_only_substituted_when_present() {
        let anon_vars = BannerVars::default();
        assert_eq!(render("hi $USERNAME", &anon_vars, true), "hi $USERNAME");

        let mut auth_vars = BannerVars::default();
        auth_vars.username = Some("alice".to_string());
        assert_eq!(render("hi $USERNAME", &auth_vars, true), "hi alice");
    }

    #[test]
    fn same_inputs_render_byte_identical_output() {
        let vars = BannerVars {
            server_id: "dg".to_string(),
            date: "2026-07-26".to_string(),
            time: "09:00:00".to_string(),
            timezone: "UTC".to_string(),
            ..Default::default()
        };
        let a = render("$SERVERID $DATE $TIME $TIMEZONE", &vars, true);
        // A real clock boundary between calls must not change the output:
        // render only ever consumes what's already in `vars`.
        std::thread::sleep(Duration::from_millis(1100));
        let b = render("$SERVERID $DATE $TIME $TIMEZONE", &vars, true);
        assert_eq!(a, b);
    }

    #[test]
    fn ascii_fallback_rewrites_box_drawing() {
        let vars = BannerVars::default();
        let out = render("┌───┐", &vars, false);
        assert_eq!(out, "+---+");
    }

    #[test]
    fn cache_returns_same_string_without_rerendering() {
        let cache = BannerCache::new();
        let mut calls = 0;
        let a = cache.get_or_render("k", || {
            calls += 1;
            "rendered".to_string()
        });
        let b = cache.get_or_render("k", || {
            calls += 1;
            "rendered-again".to_string()
        });
        assert_eq!(a, b);
        assert_eq!(calls, 1);
    }
}
