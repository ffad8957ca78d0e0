//! Authentication and the transition authorization gate.
//!
//! The auth provider is external; this module only verifies its HS256 bearer
//! tokens and reads the single role claim the order lifecycle needs. Every
//! status mutation is authorized here, centrally; no viewer surface carries
//! its own role check.

use async_trait::async_trait;
use axum::{extract::FromRequestParts, http::header, http::request::Parts};
use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

use crate::errors::ServiceError;
use crate::models::OrderStatus;
use crate::AppState;

/// Role claim carried in the token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Role {
    Admin,
    Kitchen,
    Customer,
}

impl Role {
    /// Whether this role may move an order into `target`.
    ///
    /// Cancellation is an administrative override; forward advances belong to
    /// the kitchen and to admins. Customers never mutate status.
    pub fn may_set(self, target: OrderStatus) -> bool {
        match self {
            Role::Admin => true,
            Role::Kitchen => target != OrderStatus::Cancelled,
            Role::Customer => false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// User id.
    pub sub: Uuid,
    pub role: Role,
    pub exp: i64,
}

/// The authenticated caller, as handlers see it.
#[derive(Debug, Clone, Copy)]
pub struct AuthUser {
    pub user_id: Uuid,
    pub role: Role,
}

#[derive(Clone)]
pub struct AuthService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl AuthService {
    pub fn new(secret: &str) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
        }
    }

    pub fn verify(&self, token: &str) -> Result<AuthUser, ServiceError> {
        let data = decode::<Claims>(
            token,
            &self.decoding_key,
            &Validation::new(Algorithm::HS256),
        )
        .map_err(|e| ServiceError::Unauthorized(format!("Invalid token: {e}")))?;

        Ok(AuthUser {
            user_id: data.claims.sub,
            role: data.claims.role,
        })
    }

    /// Issues a token. Used by tests and local tooling; production tokens
    /// come from the auth provider sharing the same secret.
    pub fn issue(&self, user_id: Uuid, role: Role, ttl_secs: i64) -> Result<String, ServiceError> {
        let claims = Claims {
            sub: user_id,
            role,
            exp: Utc::now().timestamp() + ttl_secs,
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| ServiceError::Internal(format!("Failed to sign token: {e}")))
    }
}

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ServiceError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let header_value = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| {
                ServiceError::Unauthorized("Missing Authorization header".to_string())
            })?;

        let token = header_value.strip_prefix("Bearer ").ok_or_else(|| {
            ServiceError::Unauthorized("Authorization header must be a Bearer token".to_string())
        })?;

        state.auth.verify(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kitchen_may_advance_but_not_cancel() {
        assert!(Role::Kitchen.may_set(OrderStatus::Preparing));
        assert!(Role::Kitchen.may_set(OrderStatus::Delivered));
        assert!(!Role::Kitchen.may_set(OrderStatus::Cancelled));
    }

    #[test]
    fn only_admin_cancels_and_customers_never_mutate() {
        assert!(Role::Admin.may_set(OrderStatus::Cancelled));
        for status in crate::models::FORWARD_SEQUENCE {
            assert!(!Role::Customer.may_set(status));
        }
        assert!(!Role::Customer.may_set(OrderStatus::Cancelled));
    }

    #[test]
    fn token_round_trip() {
        let auth = AuthService::new("test-secret");
        let user_id = Uuid::new_v4();
        let token = auth.issue(user_id, Role::Kitchen, 3600).unwrap();
        let user = auth.verify(&token).unwrap();
        assert_eq!(user.user_id, user_id);
        assert_eq!(user.role, Role::Kitchen);
    }

    #[test]
    fn expired_token_is_rejected() {
        let auth = AuthService::new("test-secret");
        let token = auth.issue(Uuid::new_v4(), Role::Admin, -120).unwrap();
        assert!(auth.verify(&token).is_err());
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let issuer = AuthService::new("secret-a");
        let verifier = AuthService::new("secret-b");
        let token = issuer.issue(Uuid::new_v4(), Role::Admin, 3600).unwrap();
        assert!(verifier.verify(&token).is_err());
    }
}
