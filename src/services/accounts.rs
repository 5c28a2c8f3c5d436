//! User accounts and token issuance

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

use super::normalize_email;
use crate::auth::{
    check_password_policy, hash_password, verify_password, JwtValidator, Role, TokenInput,
};
use crate::db::schemas::UserDoc;
use crate::store::UserStore;
use crate::types::{FieldOpsError, Result};

const INVALID_CREDENTIALS: &str = "Invalid email or password";

// =============================================================================
// Request/Response Types
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub message: String,
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in: u64,
    pub role: Role,
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default, alias = "fullName")]
    pub full_name: Option<String>,
    #[serde(default, alias = "phoneNumber")]
    pub phone_number: Option<String>,
    #[serde(default)]
    pub controller_email: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub message: String,
    pub user_id: String,
    pub email: String,
    pub role: Role,
}

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    #[serde(default)]
    pub refresh_token: String,
}

#[derive(Debug, Serialize)]
pub struct RefreshResponse {
    pub access_token: String,
    pub expires_in: u64,
}

#[derive(Debug, Deserialize)]
pub struct ValidateRequest {
    #[serde(default)]
    pub token: String,
}

#[derive(Debug, Serialize)]
pub struct ValidateResponse {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

// =============================================================================
// Service
// =============================================================================

#[derive(Clone)]
pub struct AccountService {
    users: Arc<dyn UserStore>,
    jwt: Arc<JwtValidator>,
}

impl AccountService {
    pub fn new(users: Arc<dyn UserStore>, jwt: Arc<JwtValidator>) -> Self {
        Self { users, jwt }
    }

    pub fn jwt(&self) -> &JwtValidator {
        &self.jwt
    }

    /// Check credentials and issue an access/refresh token pair. Every
    /// failure reports the same message.
    pub async fn login(&self, req: LoginRequest) -> Result<LoginResponse> {
        if req.email.trim().is_empty() || req.password.is_empty() {
            return Err(FieldOpsError::BadRequest(
                "Email and password are required".into(),
            ));
        }

        let email = normalize_email(&req.email);
        let user = match self.users.find_user(&email).await? {
            Some(u) if u.is_active => u,
            _ => {
                warn!(email = %email, "Login failed: unknown or inactive user");
                return Err(FieldOpsError::Unauthorized(INVALID_CREDENTIALS.into()));
            }
        };

        if !verify_password(&req.password, &user.password_hash)? {
            warn!(email = %email, "Login failed: wrong password");
            return Err(FieldOpsError::Unauthorized(INVALID_CREDENTIALS.into()));
        }

        let input = TokenInput {
            user_id: user.id_hex(),
            email: user.email.clone(),
            role: user.role,
        };
        let access_token = self.jwt.generate_token(input.clone())?;
        let refresh_token = self.jwt.generate_refresh_token(input)?;

        info!(email = %email, role = %user.role, "User logged in");

        Ok(LoginResponse {
            message: "Login successful".into(),
            access_token,
            refresh_token,
            expires_in: self.jwt.access_expiry_seconds(),
            role: user.role,
            email: user.email,
        })
    }

    pub async fn register(&self, req: RegisterRequest) -> Result<RegisterResponse> {
        if req.email.trim().is_empty() || req.password.is_empty() {
            return Err(FieldOpsError::BadRequest(
                "Email and password are required".into(),
            ));
        }
        if !req.email.contains('@') {
            return Err(FieldOpsError::BadRequest("Invalid email address".into()));
        }
        check_password_policy(&req.password)?;

        let role = match req.role.as_deref().filter(|r| !r.trim().is_empty()) {
            Some(raw) => raw.parse::<Role>().map_err(FieldOpsError::BadRequest)?,
            None => Role::default(),
        };

        let mut user = UserDoc::new(&req.email, hash_password(&req.password)?, role);
        user.full_name = req.full_name.unwrap_or_default().trim().to_string();
        user.phone_number = req.phone_number.unwrap_or_default().trim().to_string();
        user.controller_email = req
            .controller_email
            .as_deref()
            .map(normalize_email)
            .filter(|e| !e.is_empty());

        let email = user.email.clone();
        let id = self.users.insert_user(user).await?;

        info!(email = %email, role = %role, "User registered");

        Ok(RegisterResponse {
            message: "User registered successfully".into(),
            user_id: id.to_hex(),
            email,
            role,
        })
    }

    pub fn refresh(&self, req: RefreshRequest) -> Result<RefreshResponse> {
        if req.refresh_token.trim().is_empty() {
            return Err(FieldOpsError::BadRequest("refresh_token is required".into()));
        }
        let access_token = self.jwt.refresh_access_token(req.refresh_token.trim())?;
        Ok(RefreshResponse {
            access_token,
            expires_in: self.jwt.access_expiry_seconds(),
        })
    }

    pub fn validate_token(&self, req: ValidateRequest) -> ValidateResponse {
        let result = self.jwt.verify_token(req.token.trim());
        match result.claims {
            Some(claims) => ValidateResponse {
                valid: true,
                user_id: Some(claims.user_id),
                role: Some(claims.role),
                error: None,
            },
            None => ValidateResponse {
                valid: false,
                user_id: None,
                role: None,
                error: result.error,
            },
        }
    }

    /// Public profile; never includes the password hash
    pub async fn get_user(&self, email: &str) -> Result<UserDoc> {
        self.users
            .find_user(&normalize_email(email))
            .await?
            .ok_or_else(|| FieldOpsError::NotFound("User not found".into()))
    }
}
