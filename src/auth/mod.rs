//! Authentication and authorization for fieldops
//!
//! Provides:
//! - JWT access/refresh token generation and validation
//! - Role levels for route authorization
//! - Password hashing with Argon2

pub mod jwt;
pub mod password;
pub mod permissions;

pub use jwt::{extract_token_from_header, Claims, JwtValidator, TokenInput, TokenType, TokenValidationResult};
pub use password::{check_password_policy, hash_password, verify_password, MIN_PASSWORD_LEN};
pub use permissions::{required_role, Role};
