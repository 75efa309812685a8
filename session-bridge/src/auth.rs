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

//! Auth Adapter: turns SSH-level credentials into an Identity via the
//! external auth service, trying the shared-password shortcut, then
//! login, then a `DGAUTH` env retry, before falling back to anonymous.
//! Uses `dungeongate_protocol::{authsvc, client::AuthServiceClient}`.

use std::collections::HashMap;

use tracing::{info, warn};

use dungeongate_protocol::{
    authsvc::{
        AuthServiceReply, AuthServiceRequest, GetUserInfoRequest, LoginRequest, RegisterRequest, UserInfo,
    },
    client::AuthServiceClient,
};

/// An Identity: either anonymous (no user id/token) or authenticated.
/// `user_id` is derived from the auth service's string id — parsed
/// numerically when possible, else a stable hash, since the Game Service
/// RPC surface carries session ownership as `i32`.
#[derive(Debug, Clone)]
pub struct Identity {
    pub user_id: i32,
    pub username: String,
    pub is_admin: bool,
    pub access_token: Option<String>,
    pub auth_method: AuthMethod,
    pub metadata: HashMap<String, String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMethod {
    Anonymous,
    SharedPassword,
    Login,
    DgauthEnv,
}

impl Identity {
    pub fn anonymous() -> Self {
        Identity {
            user_id: 0,
            username: "anonymous".to_string(),
            is_admin: false,
            access_token: None,
            auth_method: AuthMethod::Anonymous,
            metadata: HashMap::new(),
        }
    }

    pub fn is_authenticated(&self) -> bool {
        !matches!(self.auth_method, AuthMethod::Anonymous)
    }

    pub fn requires_password_change(&self) -> bool {
        self.metadata.get("force_password_change").map(|v| v == "true").unwrap_or(false)
    }
}

fn numeric_user_id(id: &str) -> i32 {
    id.parse::<i32>().unwrap_or_else(|_| {
        // stable, deterministic fallback for non-numeric ids (e.g. UUIDs)
        let mut hash: i64 = 0;
        for byte in id.bytes() {
            hash = hash.wrapping_mul(31).wrapping_add(byte as i64);
        }
        (hash.unsigned_abs() % i32::MAX as u64) as i32
    })
}

fn identity_from_user_info(user: UserInfo, token: String, method: AuthMethod) -> Identity {
    Identity {
        user_id: numeric_user_id(&user.id),
        username: user.username,
        is_admin: user.is_admin,
        access_token: Some(token),
        auth_method: method,
        metadata: user.metadata,
    }
}

pub struct AuthAdapter<'a> {
    pub client: &'a AuthServiceClient,
    pub shared_password: Option<&'a str>,
    pub allowed_username: Option<&'a str>,
}

impl<'a> AuthAdapter<'a> {
    /// Implements the four-step resolution order: shared password, login,
    /// `DGAUTH` env retry, anonymous fallback. `env` is the `env`-request
    /// variable bag the SSH channel accumulated, consulted only if
    /// password auth produced no identity.
    pub async fn resolve(
        &self,
        username: &str,
        password: &str,
        env: &HashMap<String, String>,
    ) -> Identity {
        // 1. shared-password shortcut
        if let Some(shared) = self.shared_password {
            if password == shared && self.allowed_username.map(|u| u == username).unwrap_or(true) {
                info!(%username, "authenticated via shared password shortcut");
                let mut identity = Identity::anonymous();
                identity.username = username.to_string();
                identity.auth_method = AuthMethod::SharedPassword;
                return identity;
            }
        }

        // 2. external Login
        if !password.is_empty() {
            if let Some(identity) = self.try_login(username, password, AuthMethod::Login).await {
                return identity;
            }
        }

        // 3. DGAUTH env retry
        if let Some(dgauth) = env.get("DGAUTH") {
            if let Some((user, pass)) = dgauth.split_once(':') {
                if let Some(identity) = self.try_login(user, pass, AuthMethod::DgauthEnv).await {
                    return identity;
                }
            } else {
                warn!("DGAUTH env value is not in 'user:pass' form, ignoring");
            }
        }

        // 4. anonymous fallback
        let mut identity = Identity::anonymous();
        identity.username = username.to_string();
        identity
    }

    async fn try_login(&self, username: &str, password: &str, method: AuthMethod) -> Option<Identity> {
        let reply = self
            .client
            .call(AuthServiceRequest::Login(LoginRequest {
                username: username.to_string(),
                password: password.to_string(),
            }))
            .await;
        match reply {
            Ok(AuthServiceReply::Login(login)) if login.success => {
                let token = login.access_token?;
                let user = login.user?;
                Some(identity_from_user_info(user, token, method))
            }
            Ok(AuthServiceReply::Login(login)) => {
                info!(%username, error_code = ?login.error_code, "login failed");
                None
            }
            Ok(_) => {
                warn!("auth service returned an unexpected reply variant for Login");
                None
            }
            Err(e) => {
                warn!(error = %e, "auth service unreachable during login");
                None
            }
        }
    }

    /// A subsequent `GetUserInfo(token)` call populates admin status.
    pub async fn refresh_user_info(&self, identity: &mut Identity) {
        let Some(token) = identity.access_token.clone() else { return };
        let reply = self.client.call(AuthServiceRequest::GetUserInfo(GetUserInfoRequest { token })).await;
        if let Ok(AuthServiceReply::GetUserInfo(r)) = reply {
            if r.success {
                if let Some(user) = r.user {
                    identity.is_admin = user.is_admin;
                    identity.metadata = user.metadata;
                }
            }
        }
    }

    pub async fn register(&self, username: &str, password: &str, email: &str) -> Result<Identity, String> {
        let reply = self
            .client
            .call(AuthServiceRequest::Register(RegisterRequest {
                username: username.to_string(),
                password: password.to_string(),
                email: email.to_string(),
            }))
            .await;
        match reply {
            Ok(AuthServiceReply::Register(r)) if r.success => {
                let token = r.access_token.ok_or("registration succeeded with no access token")?;
                let user = r.user.ok_or("registration succeeded with no user info")?;
                Ok(identity_from_user_info(user, token, AuthMethod::Login))
            }
            Ok(AuthServiceReply::Register(r)) => {
                Err(format!("registration failed: {:?}", r.error_code))
            }
            Ok(_) => Err("auth service returned an unexpected reply variant for Register".to_string()),
            Err(e) => Err(format!("auth service unreachable: {e}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_ids_parse_directly() {
        assert_eq!(numeric_user_id("42"), 42);
    }

    #[test]
    fn non_numeric_ids_hash_deterministically() {
        let a = numeric_user_id("user-uuid-1234");
        let b = numeric_user_id("user-uuid-1234");
        assert_eq!(a, b);
    }

    #[test]
    fn anonymous_identity_is_not_authenticated() {
        assert!(!Identity::anonymous().is_authenticated());
    }

    #[test]
    fn requires_password_change_reads_metadata() {
        let mut identity = Identity::anonymous();
        identity.metadata.insert("force_password_change".to_string(), "true".to_string());
        assert!(identity.requires_password_change());
    }
}
