//! Authentication and authorization for the report API
//!
//! Callers present a bearer JWT whose claims must include the
//! shop-management capability. Local development can disable the check.

pub mod jwt;

pub use jwt::{extract_token_from_header, Claims, JwtValidator, TokenValidationResult};

use tracing::debug;

use crate::types::{Result, StatsError};

/// Capability required for every protected endpoint
pub const MANAGE_CAPABILITY: &str = "manage_shop_settings";

/// Request gate for protected endpoints
#[derive(Clone)]
pub enum AccessPolicy {
    /// Bearer token with the management capability
    Jwt(JwtValidator),
    /// Every request allowed. Local development only.
    Open,
}

impl AccessPolicy {
    /// Check an `Authorization` header value. Missing or invalid tokens are
    /// unauthorized; valid tokens without the capability are forbidden.
    pub fn authorize(&self, auth_header: Option<&str>) -> Result<Option<Claims>> {
        let validator = match self {
            Self::Open => return Ok(None),
            Self::Jwt(validator) => validator,
        };

        let token = extract_token_from_header(auth_header)
            .ok_or_else(|| StatsError::Unauthorized("Missing bearer token".into()))?;

        let result = validator.verify_token(token);
        let claims = match result.claims {
            Some(claims) if result.valid => claims,
            _ => {
                return Err(StatsError::Unauthorized(
                    result.error.unwrap_or_else(|| "Invalid token".into()),
                ))
            }
        };

        if !claims.has_capability(MANAGE_CAPABILITY) {
            debug!(sub = %claims.sub, "Caller lacks {}", MANAGE_CAPABILITY);
            return Err(StatsError::Forbidden(format!(
                "Capability {} required",
                MANAGE_CAPABILITY
            )));
        }

        Ok(Some(claims))
    }

    pub fn is_open(&self) -> bool {
        matches!(self, Self::Open)
    }
}
