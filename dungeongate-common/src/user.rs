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

//! OS user lookup, used by the PTY manager to resolve `${USERNAME}` and
//! `${HOME}` style tokens in a game's environment template. Ported from the
//! teacher's `daemon/user.rs`, which does the same `getpwuid` dance to find
//! the caller's login shell and home directory.

use std::ffi::CStr;

use anyhow::anyhow;

#[derive(Debug, Clone)]
pub struct Info {
    pub default_shell: String,
    pub home_dir: String,
    pub user: String,
}

/// Looks up passwd information for the process's real uid.
pub fn info() -> anyhow::Result<Info> {
    // Safety: the passwd pointer returned by getpwuid is a pointer into
    // static/thread-local libc storage; we copy every field we need into
    // owned Strings before returning and never retain the pointer.
    unsafe {
        *nix::libc::__errno_location() = 0;
        let passwd = nix::libc::getpwuid(nix::unistd::getuid().as_raw());
        let errno = nix::errno::errno();
        if passwd.is_null() {
            if errno != 0 {
                return Err(anyhow!(
                    "error getting passwd entry: {:?}",
                    nix::errno::from_i32(errno)
                ));
            }
            return Err(anyhow!("no passwd entry for current uid"));
        }

        Ok(Info {
            default_shell: String::from(String::from_utf8_lossy(
                CStr::from_ptr((*passwd).pw_shell).to_bytes(),
            )),
            home_dir: String::from(String::from_utf8_lossy(
                CStr::from_ptr((*passwd).pw_dir).to_bytes(),
            )),
            user: String::from(String::from_utf8_lossy(
                CStr::from_ptr((*passwd).pw_name).to_bytes(),
            )),
        })
    }
}

/// Looks up passwd information for an arbitrary username, used when the
/// game-host process is running as root and spawning a PTY on behalf of a
/// specific player account.
pub fn info_for(username: &str) -> anyhow::Result<Info> {
    use std::ffi::CString;

    let cname = CString::new(username).map_err(|_| anyhow!("username contains a NUL byte"))?;
    unsafe {
        *nix::libc::__errno_location() = 0;
        let passwd = nix::libc::getpwnam(cname.as_ptr());
        let errno = nix::errno::errno();
        if passwd.is_null() {
            if errno != 0 {
                return Err(anyhow!(
                    "error getting passwd entry for '{}': {:?}",
                    username,
                    nix::errno::from_i32(errno)
                ));
            }
            return Err(anyhow!("no such user '{}'", username));
        }

        Ok(Info {
            default_shell: String::from(String::from_utf8_lossy(
                CStr::from_ptr((*passwd).pw_shell).to_bytes(),
            )),
            home_dir: String::from(String::from_utf8_lossy(
                CStr::from_ptr((*passwd).pw_dir).to_bytes(),
            )),
            user: String::from(String::from_utf8_lossy(
                CStr::from_ptr((*passwd).pw_name).to_bytes(),
            )),
        })
    }
}
