//! Explicit request authorization. Token issuance lives outside this crate;
//! the trusted edge proxy injects the authenticated identity as headers, and
//! handlers check an explicit capability before touching the orchestrator.

use axum::{extract::FromRequestParts, http::request::Parts};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::ServiceError;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_ROLE_HEADER: &str = "x-user-role";

/// Capability set. `Manager` subsumes `Client`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Client,
    Manager,
}

impl Role {
    pub fn parse(value: &str) -> Option<Role> {
        match value.to_ascii_lowercase().as_str() {
            "client" => Some(Role::Client),
            "manager" => Some(Role::Manager),
            _ => None,
        }
    }

    /// Whether this role satisfies the required capability.
    pub fn allows(self, required: Role) -> bool {
        match (self, required) {
            (Role::Manager, _) => true,
            (Role::Client, Role::Client) => true,
            (Role::Client, Role::Manager) => false,
        }
    }
}

/// Authenticated request identity.
#[derive(Debug, Clone, Copy)]
pub struct AuthContext {
    pub user_id: Uuid,
    pub role: Role,
}

impl AuthContext {
    pub fn require(&self, required: Role) -> Result<(), ServiceError> {
        if self.role.allows(required) {
            Ok(())
        } else {
            Err(ServiceError::Forbidden(format!(
                "requires {:?} capability",
                required
            )))
        }
    }
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for AuthContext
where
    S: Send + Sync,
{
    type Rejection = ServiceError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_id = parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| Uuid::parse_str(v).ok())
            .ok_or_else(|| ServiceError::Unauthorized("missing or invalid user id".into()))?;

        let role = match parts.headers.get(USER_ROLE_HEADER) {
            None => Role::Client,
            Some(value) => value
                .to_str()
                .ok()
                .and_then(Role::parse)
                .ok_or_else(|| ServiceError::Unauthorized("unknown role".into()))?,
        };

        Ok(AuthContext { user_id, role })
    }
}
