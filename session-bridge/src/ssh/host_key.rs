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

//! Host key persistence: a 2048-bit RSA key, generated once and loaded
//! thereafter, written with `0600` permissions inside a `0700` parent
//! directory.

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

use anyhow::{Context, Result};
use russh_keys::key::{KeyPair, SignatureHash};
use tracing::{info, warn};

const RSA_BITS: usize = 2048;

pub fn load_or_generate(path: &Path) -> Result<KeyPair> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent).with_context(|| format!("creating {}", parent.display()))?;
            fs::set_permissions(parent, fs::Permissions::from_mode(0o700))
                .with_context(|| format!("setting 0700 on {}", parent.display()))?;
        }
    }

    match russh_keys::load_secret_key(path, None) {
        Ok(key) => {
            info!(path = %path.display(), "loaded existing SSH host key");
            Ok(key)
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "no usable host key on disk, generating one");
            let key = KeyPair::generate_rsa(RSA_BITS, SignatureHash::SHA2_256)
                .context("generating RSA host key")?;
            write_key(path, &key)?;
            info!(path = %path.display(), "generated new 2048-bit RSA host key");
            Ok(key)
        }
    }
}

fn write_key(path: &Path, key: &KeyPair) -> Result<()> {
    let mut pem = Vec::new();
    russh_keys::encode_pkcs8_pem(key, &mut pem).context("encoding host key as PKCS8 PEM")?;
    fs::write(path, &pem).with_context(|| format!("writing {}", path.display()))?;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600))
        .with_context(|| format!("setting 0600 on {}", path.display()))?;
    Ok(())
}
