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

//! Auth Service RPC request/reply types: one named struct pair per call
//! (`LoginRequest`/`LoginReply`, `RegisterRequest`/`RegisterReply`, ...),
//! the same per-call style as `gamesvc.rs`.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserInfo {
    pub id: String,
    pub username: String,
    pub is_admin: bool,
    /// Free-form metadata bag (e.g. "require password change" marker) the
    /// auth service attaches to an account; `force_password_change` is one
    /// such marker, named explicitly since the front process checks for it.
    pub metadata: std::collections::HashMap<String, String>,
}

impl UserInfo {
    pub fn requires_password_change(&self) -> bool {
        self.metadata
            .get("force_password_change")
            .map(|v| v == "true")
            .unwrap_or(false)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuthErrorCode {
    InvalidCredentials,
    AccountLocked,
    UsernameTaken,
    InvalidUsername,
    PasswordTooShort,
    TokenExpired,
    Unknown,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginReply {
    pub success: bool,
    pub access_token: Option<String>,
    pub user: Option<UserInfo>,
    pub error_code: Option<AuthErrorCode>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub password: String,
    pub email: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterReply {
    pub success: bool,
    pub access_token: Option<String>,
    pub user: Option<UserInfo>,
    pub error_code: Option<AuthErrorCode>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidateTokenRequest {
    pub token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidateTokenReply {
    pub valid: bool,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetUserInfoRequest {
    pub token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetUserInfoReply {
    pub success: bool,
    pub user: Option<UserInfo>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangePasswordRequest {
    pub token: String,
    pub old_password: String,
    pub new_password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangePasswordReply {
    pub success: bool,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnlockUserAccountRequest {
    pub admin_token: String,
    pub username: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteUserAccountRequest {
    pub admin_token: String,
    pub username: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResetUserPasswordRequest {
    pub admin_token: String,
    pub username: String,
    pub new_password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromoteUserToAdminRequest {
    pub admin_token: String,
    pub username: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminActionReply {
    pub success: bool,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetServerStatisticsRequest {
    pub admin_token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetServerStatisticsReply {
    pub total_users: u32,
    pub total_games_played: u64,
    pub active_sessions: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum AuthServiceRequest {
    Login(LoginRequest),
    Register(RegisterRequest),
    ValidateToken(ValidateTokenRequest),
    GetUserInfo(GetUserInfoRequest),
    ChangePassword(ChangePasswordRequest),
    UnlockUserAccount(UnlockUserAccountRequest),
    DeleteUserAccount(DeleteUserAccountRequest),
    ResetUserPassword(ResetUserPasswordRequest),
    PromoteUserToAdmin(PromoteUserToAdminRequest),
    GetServerStatistics(GetServerStatisticsRequest),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum AuthServiceReply {
    Login(LoginReply),
    Register(RegisterReply),
    ValidateToken(ValidateTokenReply),
    GetUserInfo(GetUserInfoReply),
    ChangePassword(ChangePasswordReply),
    UnlockUserAccount(AdminActionReply),
    DeleteUserAccount(AdminActionReply),
    ResetUserPassword(AdminActionReply),
    PromoteUserToAdmin(AdminActionReply),
    GetServerStatistics(GetServerStatisticsReply),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn requires_password_change_reads_metadata_flag() {
        let mut metadata = std::collections::HashMap::new();
        metadata.insert("force_password_change".to_string(), "true".to_string());
        let user = UserInfo {
            id: "u1".to_string(),
            username: "alice".to_string(),
            is_admin: false,
            metadata,
        };
        assert!(user.requires_password_change());
    }

    #[test]
    fn defaults_to_not_requiring_password_change() {
        let user = UserInfo {
            id: "u1".to_string(),
            username: "alice".to_string(),
            is_admin: false,
            metadata: Default::default(),
        };
        assert!(!user.requires_password_change());
    }
}
