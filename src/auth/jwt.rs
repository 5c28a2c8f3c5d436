//! JWT token handling
//!
//! Access tokens authenticate API calls; refresh tokens only mint new
//! access tokens. Both are HS256-signed with the configured secret.

use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::auth::Role;
use crate::types::FieldOpsError;

/// Distinguishes access tokens from refresh tokens
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    Access,
    Refresh,
}

/// Payload stored in JWT token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// User document id (hex ObjectId)
    pub user_id: String,
    /// User email
    pub email: String,
    /// Role granted
    pub role: Role,
    /// Access or refresh
    #[serde(rename = "type")]
    pub token_type: TokenType,
    /// Issued at (Unix timestamp)
    pub iat: u64,
    /// Expiration time (Unix timestamp)
    pub exp: u64,
}

/// Input for creating a new token
#[derive(Debug, Clone)]
pub struct TokenInput {
    pub user_id: String,
    pub email: String,
    pub role: Role,
}

impl From<&Claims> for TokenInput {
    fn from(claims: &Claims) -> Self {
        Self {
            user_id: claims.user_id.clone(),
            email: claims.email.clone(),
            role: claims.role,
        }
    }
}

/// Result of token validation
#[derive(Debug)]
pub struct TokenValidationResult {
    pub valid: bool,
    pub claims: Option<Claims>,
    pub error: Option<String>,
}

impl TokenValidationResult {
    pub fn valid(claims: Claims) -> Self {
        Self {
            valid: true,
            claims: Some(claims),
            error: None,
        }
    }

    pub fn invalid(error: impl Into<String>) -> Self {
        Self {
            valid: false,
            claims: None,
            error: Some(error.into()),
        }
    }
}

/// JWT validator and generator
#[derive(Clone)]
pub struct JwtValidator {
    secret: String,
    access_expiry_seconds: u64,
    refresh_expiry_seconds: u64,
}

impl JwtValidator {
    /// Create a new JWT validator
    ///
    /// Returns an error if the secret is empty or too short
    pub fn new(
        secret: String,
        access_expiry_seconds: u64,
        refresh_expiry_seconds: u64,
    ) -> Result<Self, FieldOpsError> {
        if secret.is_empty() {
            return Err(FieldOpsError::Config(
                "JWT_SECRET is required in production mode".into(),
            ));
        }

        if secret.len() < 32 {
            return Err(FieldOpsError::Config(
                "JWT_SECRET must be at least 32 characters".into(),
            ));
        }

        Ok(Self {
            secret,
            access_expiry_seconds,
            refresh_expiry_seconds,
        })
    }

    /// Access token lifetime in seconds
    pub fn access_expiry_seconds(&self) -> u64 {
        self.access_expiry_seconds
    }

    /// Generate an access token
    pub fn generate_token(&self, input: TokenInput) -> Result<String, FieldOpsError> {
        self.sign(input, TokenType::Access, self.access_expiry_seconds)
    }

    /// Generate a refresh token
    pub fn generate_refresh_token(&self, input: TokenInput) -> Result<String, FieldOpsError> {
        self.sign(input, TokenType::Refresh, self.refresh_expiry_seconds)
    }

    fn sign(
        &self,
        input: TokenInput,
        token_type: TokenType,
        expiry_seconds: u64,
    ) -> Result<String, FieldOpsError> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|e| FieldOpsError::Auth(format!("System time error: {}", e)))?
            .as_secs();

        let claims = Claims {
            user_id: input.user_id,
            email: input.email,
            role: input.role,
            token_type,
            iat: now,
            exp: now + expiry_seconds,
        };

        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.secret.as_bytes()),
        )
        .map_err(|e| FieldOpsError::Auth(format!("Failed to generate token: {}", e)))
    }

    /// Verify and decode a JWT token
    pub fn verify_token(&self, token: &str) -> TokenValidationResult {
        let validation = Validation::default();

        match decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &validation,
        ) {
            Ok(token_data) => TokenValidationResult::valid(token_data.claims),
            Err(err) => {
                use jsonwebtoken::errors::ErrorKind;
                let error_msg = match err.kind() {
                    ErrorKind::ExpiredSignature => "Token expired",
                    ErrorKind::InvalidToken => "Invalid token",
                    ErrorKind::InvalidSignature => "Invalid signature",
                    _ => "Token validation failed",
                };
                TokenValidationResult::invalid(error_msg)
            }
        }
    }

    /// Verify a refresh token and mint a new access token from it
    pub fn refresh_access_token(&self, refresh_token: &str) -> Result<String, FieldOpsError> {
        let result = self.verify_token(refresh_token);
        let claims = match result.claims {
            Some(c) => c,
            None => {
                return Err(FieldOpsError::Unauthorized(
                    "Invalid or expired refresh token".into(),
                ))
            }
        };

        if claims.token_type != TokenType::Refresh {
            return Err(FieldOpsError::Unauthorized(
                "Invalid or expired refresh token".into(),
            ));
        }

        self.generate_token(TokenInput::from(&claims))
    }
}

/// Extract token from Authorization header.
/// Supports "Bearer <token>" format and raw tokens.
pub fn extract_token_from_header(auth_header: Option<&str>) -> Option<&str> {
    let header = auth_header?;

    if let Some(token) = header.strip_prefix("Bearer ") {
        let token = token.trim();
        if !token.is_empty() {
            return Some(token);
        }
    }

    if !header.contains(' ') {
        let token = header.trim();
        if !token.is_empty() {
            return Some(token);
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_validator() -> JwtValidator {
        JwtValidator::new(
            "test-secret-that-is-at-least-32-characters-long".into(),
            3600,
            7 * 24 * 3600,
        )
        .unwrap()
    }

    fn controller() -> TokenInput {
        TokenInput {
            user_id: "64b7f0c2a1b2c3d4e5f60718".into(),
            email: "controller@example.com".into(),
            role: Role::Controller,
        }
    }

    #[test]
    fn test_generate_and_verify_token() {
        let validator = test_validator();

        let token = validator.generate_token(controller()).unwrap();
        let result = validator.verify_token(&token);
        assert!(result.valid);

        let claims = result.claims.unwrap();
        assert_eq!(claims.email, "controller@example.com");
        assert_eq!(claims.role, Role::Controller);
        assert_eq!(claims.token_type, TokenType::Access);
    }

    #[test]
    fn test_token_kind_claim_is_named_type() {
        let claims = Claims {
            user_id: "u1".into(),
            email: "t@example.com".into(),
            role: Role::FieldWorker,
            token_type: TokenType::Refresh,
            iat: 0,
            exp: 1,
        };
        let v = serde_json::to_value(&claims).unwrap();
        assert_eq!(v["type"], "refresh");
        assert!(v.get("token_type").is_none());

        let parsed: Claims = serde_json::from_value(serde_json::json!({
            "user_id": "u1",
            "email": "t@example.com",
            "role": "controller",
            "type": "access",
            "iat": 0,
            "exp": 1,
        }))
        .unwrap();
        assert_eq!(parsed.token_type, TokenType::Access);
    }

    #[test]
    fn test_invalid_token() {
        let result = test_validator().verify_token("invalid-token");
        assert!(!result.valid);
        assert!(result.error.is_some());
    }

    #[test]
    fn test_wrong_secret() {
        let other = JwtValidator::new(
            "different-secret-that-is-at-least-32-characters".into(),
            3600,
            3600,
        )
        .unwrap();

        let token = test_validator().generate_token(controller()).unwrap();
        assert!(!other.verify_token(&token).valid);
    }

    #[test]
    fn test_refresh_flow() {
        let validator = test_validator();
        let refresh = validator.generate_refresh_token(controller()).unwrap();

        let access = validator.refresh_access_token(&refresh).unwrap();
        let claims = validator.verify_token(&access).claims.unwrap();
        assert_eq!(claims.token_type, TokenType::Access);
        assert_eq!(claims.role, Role::Controller);
    }

    #[test]
    fn test_access_token_cannot_refresh() {
        let validator = test_validator();
        let access = validator.generate_token(controller()).unwrap();
        assert!(validator.refresh_access_token(&access).is_err());
    }

    #[test]
    fn test_extract_token_from_header() {
        assert_eq!(extract_token_from_header(Some("Bearer abc123")), Some("abc123"));
        assert_eq!(extract_token_from_header(Some("abc123")), Some("abc123"));
        assert_eq!(extract_token_from_header(None), None);
        assert_eq!(extract_token_from_header(Some("Bearer ")), None);
        assert_eq!(extract_token_from_header(Some("Basic abc123")), None);
    }

    #[test]
    fn test_secret_validation() {
        assert!(JwtValidator::new("short".into(), 3600, 3600).is_err());
        assert!(JwtValidator::new("".into(), 3600, 3600).is_err());
        assert!(JwtValidator::new("this-secret-is-at-least-32-chars-long".into(), 3600, 3600).is_ok());
    }
}
