//! JWT token handling for API callers
//!
//! Tokens are signed with HS256 and carry the caller's capabilities.
//! The report API requires the shop-management capability.

use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::types::StatsError;

/// Payload stored in JWT token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Caller identifier (user login or service name)
    pub sub: String,
    /// Capabilities granted to the caller
    #[serde(default)]
    pub capabilities: Vec<String>,
    /// Issued at (Unix timestamp)
    pub iat: u64,
    /// Expiration time (Unix timestamp)
    pub exp: u64,
}

impl Claims {
    pub fn has_capability(&self, capability: &str) -> bool {
        self.capabilities.iter().any(|c| c == capability)
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
    expiry_seconds: u64,
}

impl JwtValidator {
    /// Create a new JWT validator
    ///
    /// Returns an error if the secret is empty or too short
    pub fn new(secret: String, expiry_seconds: u64) -> Result<Self, StatsError> {
        if secret.is_empty() {
            return Err(StatsError::Config("JWT_SECRET is required".into()));
        }

        if secret.len() < 32 {
            return Err(StatsError::Config(
                "JWT_SECRET must be at least 32 characters".into(),
            ));
        }

        Ok(Self {
            secret,
            expiry_seconds,
        })
    }

    /// Issue a token for a caller
    pub fn generate_token(
        &self,
        subject: impl Into<String>,
        capabilities: Vec<String>,
    ) -> Result<String, StatsError> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|e| StatsError::Internal(format!("System time error: {}", e)))?
            .as_secs();

        let claims = Claims {
            sub: subject.into(),
            capabilities,
            iat: now,
            exp: now + self.expiry_seconds,
        };

        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.secret.as_bytes()),
        )?;

        Ok(token)
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
        )
        .unwrap()
    }

    #[test]
    fn test_generate_and_verify_token() {
        let validator = test_validator();

        let token = validator
            .generate_token("shop-admin", vec!["manage_shop_settings".into()])
            .unwrap();
        let result = validator.verify_token(&token);
        assert!(result.valid);

        let claims = result.claims.unwrap();
        assert_eq!(claims.sub, "shop-admin");
        assert!(claims.has_capability("manage_shop_settings"));
        assert!(!claims.has_capability("edit_posts"));
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
        )
        .unwrap();

        let token = test_validator().generate_token("a", vec![]).unwrap();
        assert!(!other.verify_token(&token).valid);
    }

    #[test]
    fn test_extract_token_from_header() {
        assert_eq!(
            extract_token_from_header(Some("Bearer abc123")),
            Some("abc123")
        );
        assert_eq!(extract_token_from_header(Some("abc123")), Some("abc123"));
        assert_eq!(extract_token_from_header(None), None);
        assert_eq!(extract_token_from_header(Some("")), None);
        assert_eq!(extract_token_from_header(Some("Bearer ")), None);
        assert_eq!(extract_token_from_header(Some("Basic abc123")), None);
    }

    #[test]
    fn test_secret_validation() {
        assert!(JwtValidator::new("short".into(), 3600).is_err());
        assert!(JwtValidator::new("".into(), 3600).is_err());
        assert!(JwtValidator::new("this-secret-is-at-least-32-chars-long".into(), 3600).is_ok());
    }
}
