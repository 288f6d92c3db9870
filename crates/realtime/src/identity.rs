//! Session token decoding and routing identity derivation.
//!
//! The front-end holds the access token issued by the auth service; the
//! signature and expiry are that service's concern, so the payload is only
//! decoded here, never verified. The token's `sub` claim is an object:
//!
//! ```json
//! { "sub": { "role": "employee", "id": 42, "company_id": 7 } }
//! ```

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use hrms_core::roles::Role;
use hrms_core::types::DbId;
use serde::{Deserialize, Serialize};

/// The claims the real-time channel reads from a session token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionClaims {
    pub sub: SessionSubject,
}

/// The signed-in principal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSubject {
    /// Role name; only `admin`, `light_admin` and `employee` may connect.
    pub role: String,
    /// User or employee id.
    pub id: DbId,
    /// The company the principal belongs to; used for server-side rooms.
    pub company_id: DbId,
}

/// The key a user's connection is addressed by on the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutingIdentity {
    role: Role,
    user_id: DbId,
    company_id: DbId,
    key: String,
}

impl RoutingIdentity {
    /// Derive `{role}_{id}` from decoded claims.
    ///
    /// Returns `None` when the role is outside the closed set, in which case
    /// no connection may be attempted.
    pub fn from_claims(claims: &SessionClaims) -> Option<Self> {
        let role: Role = claims.sub.role.parse().ok()?;
        Some(Self {
            role,
            user_id: claims.sub.id,
            company_id: claims.sub.company_id,
            key: format!("{}_{}", role.as_str(), claims.sub.id),
        })
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn user_id(&self) -> DbId {
        self.user_id
    }

    pub fn company_id(&self) -> DbId {
        self.company_id
    }
}

/// Errors produced while turning a session token into a [`RoutingIdentity`].
#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    /// The token is not a three-part JWT with a readable header.
    #[error("Malformed session token: {0}")]
    Malformed(#[from] jsonwebtoken::errors::Error),

    /// The payload segment is not valid base64url.
    #[error("Session token payload is not base64url: {0}")]
    Encoding(#[from] base64::DecodeError),

    /// The payload does not carry the expected claims.
    #[error("Session token claims are invalid: {0}")]
    Claims(#[from] serde_json::Error),

    /// The role cannot hold a real-time session.
    #[error("Role '{0}' cannot open a real-time session")]
    UnsupportedRole(String),
}

/// Decode the claims of a session token without verifying its signature.
pub fn decode_session_token(token: &str) -> Result<SessionClaims, IdentityError> {
    let header = jsonwebtoken::decode_header(token)?;

    // decode_header has already required three segments.
    let payload = token.split('.').nth(1).unwrap_or_default();
    let bytes = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('='))?;
    let claims: SessionClaims = serde_json::from_slice(&bytes)?;

    tracing::trace!(alg = ?header.alg, role = %claims.sub.role, "Decoded session token");
    Ok(claims)
}

/// Decode `token` and derive the routing identity it grants.
pub fn resolve_identity(token: &str) -> Result<RoutingIdentity, IdentityError> {
    let claims = decode_session_token(token)?;
    RoutingIdentity::from_claims(&claims)
        .ok_or_else(|| IdentityError::UnsupportedRole(claims.sub.role.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use jsonwebtoken::{encode, EncodingKey, Header};

    fn token_for(role: &str, id: DbId, company_id: DbId) -> String {
        let claims = SessionClaims {
            sub: SessionSubject {
                role: role.to_string(),
                id,
                company_id,
            },
        };
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(b"auth-service-secret"),
        )
        .expect("encoding should succeed")
    }

    #[test]
    fn employee_identity() {
        let identity = resolve_identity(&token_for("employee", 42, 7)).unwrap();
        assert_eq!(identity.key(), "employee_42");
        assert_eq!(identity.company_id(), 7);
        assert_eq!(identity.role(), Role::Employee);
        assert_eq!(identity.user_id(), 42);
    }

    #[test]
    fn admin_roles_are_accepted() {
        assert_eq!(resolve_identity(&token_for("admin", 1, 3)).unwrap().key(), "admin_1");
        assert_eq!(
            resolve_identity(&token_for("light_admin", 9, 3)).unwrap().key(),
            "light_admin_9"
        );
    }

    #[test]
    fn role_outside_the_set_yields_no_identity() {
        let claims = decode_session_token(&token_for("manager", 5, 7)).unwrap();
        assert!(RoutingIdentity::from_claims(&claims).is_none());

        let err = resolve_identity(&token_for("manager", 5, 7)).unwrap_err();
        assert_matches!(err, IdentityError::UnsupportedRole(role) if role == "manager");
    }

    #[test]
    fn signature_is_not_checked() {
        let token = token_for("employee", 42, 7);
        let (unsigned, _signature) = token.rsplit_once('.').unwrap();
        let tampered = format!("{unsigned}.bm90LWEtc2lnbmF0dXJl");
        assert_eq!(resolve_identity(&tampered).unwrap().key(), "employee_42");
    }

    #[test]
    fn garbage_is_malformed() {
        assert_matches!(resolve_identity("not-a-token"), Err(IdentityError::Malformed(_)));
        assert_matches!(resolve_identity(""), Err(IdentityError::Malformed(_)));
    }

    #[test]
    fn payload_without_subject_is_rejected() {
        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
        let payload = URL_SAFE_NO_PAD.encode(br#"{"sub":"42"}"#);
        let token = format!("{header}.{payload}.c2ln");
        assert_matches!(resolve_identity(&token), Err(IdentityError::Claims(_)));
    }

    #[test]
    fn payload_that_is_not_base64_is_rejected() {
        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
        let token = format!("{header}.%%%.c2ln");
        assert_matches!(resolve_identity(&token), Err(IdentityError::Encoding(_)));
    }
}
