//! Bearer-token authentication.
//!
//! Tokens are HS256 JWTs signed with `JWT_SECRET`. Signing and
//! verification use `hmac` + `sha2` directly; the claims carry the user id
//! for chat tokens and an `isAdmin` flag for admin tokens.
//!
//! Requests authenticate with `Authorization: Bearer <token>`. The scheme
//! is matched case-insensitively (`bearer` is accepted).

use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use thiserror::Error;

use crate::server::{AppError, AppState};

type HmacSha256 = Hmac<Sha256>;

const HEADER: &str = r#"{"alg":"HS256","typ":"JWT"}"#;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Claims {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default)]
    pub is_admin: bool,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum AuthError {
    #[error("Token required")]
    Missing,
    #[error("Invalid token")]
    Malformed,
    #[error("Invalid token")]
    BadSignature,
    #[error("Token expired")]
    Expired,
    #[error("Admin access denied")]
    NotAdmin,
}

#[derive(Deserialize)]
struct Header {
    alg: String,
}

/// Issue a token valid for `ttl_secs` from now.
pub fn sign(
    secret: &str,
    user_id: Option<&str>,
    email: Option<&str>,
    is_admin: bool,
    ttl_secs: i64,
) -> anyhow::Result<String> {
    let now = chrono::Utc::now().timestamp();
    let claims = Claims {
        user_id: user_id.map(str::to_string),
        email: email.map(str::to_string),
        is_admin,
        iat: now,
        exp: now + ttl_secs,
    };
    encode(secret, &claims)
}

/// Encode arbitrary claims; exposed for tests that need past expiries.
pub fn encode(secret: &str, claims: &Claims) -> anyhow::Result<String> {
    let header = URL_SAFE_NO_PAD.encode(HEADER);
    let payload = URL_SAFE_NO_PAD.encode(serde_json::to_vec(claims)?);
    let signing_input = format!("{}.{}", header, payload);

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())?;
    mac.update(signing_input.as_bytes());
    let signature = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());

    Ok(format!("{}.{}", signing_input, signature))
}

/// Verify signature and expiry, returning the claims.
pub fn verify(secret: &str, token: &str, now: i64) -> Result<Claims, AuthError> {
    let (signing_input, signature) = token.rsplit_once('.').ok_or(AuthError::Malformed)?;
    let (header, payload) = signing_input
        .split_once('.')
        .ok_or(AuthError::Malformed)?;
    if payload.contains('.') {
        return Err(AuthError::Malformed);
    }

    let header: Header = URL_SAFE_NO_PAD
        .decode(header)
        .ok()
        .and_then(|bytes| serde_json::from_slice(&bytes).ok())
        .ok_or(AuthError::Malformed)?;
    if header.alg != "HS256" {
        return Err(AuthError::Malformed);
    }

    let signature = URL_SAFE_NO_PAD
        .decode(signature)
        .map_err(|_| AuthError::Malformed)?;
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| AuthError::BadSignature)?;
    mac.update(signing_input.as_bytes());
    mac.verify_slice(&signature)
        .map_err(|_| AuthError::BadSignature)?;

    let claims: Claims = URL_SAFE_NO_PAD
        .decode(payload)
        .ok()
        .and_then(|bytes| serde_json::from_slice(&bytes).ok())
        .ok_or(AuthError::Malformed)?;

    if claims.exp <= now {
        return Err(AuthError::Expired);
    }
    Ok(claims)
}

/// Extract the token from an `Authorization` header value.
pub fn bearer_token(header_value: &str) -> Option<&str> {
    let (scheme, token) = header_value.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    if token.is_empty() {
        None
    } else {
        Some(token)
    }
}

fn claims_from_parts(parts: &Parts, state: &AppState) -> Result<Claims, AppError> {
    let value = parts
        .headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or(AuthError::Missing)?;
    let token = bearer_token(value).ok_or(AuthError::Malformed)?;
    let secret = state
        .config
        .secrets
        .jwt_secret()
        .map_err(AppError::internal)?;
    Ok(verify(secret, token, chrono::Utc::now().timestamp())?)
}

/// An authenticated chat user.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: String,
    pub email: Option<String>,
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let claims = claims_from_parts(parts, state)?;
        let user_id = claims.user_id.ok_or(AuthError::Malformed)?;
        Ok(AuthUser {
            user_id,
            email: claims.email,
        })
    }
}

/// A caller holding an admin token.
#[derive(Debug, Clone)]
pub struct AdminUser {
    pub email: Option<String>,
}

impl FromRequestParts<AppState> for AdminUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let claims = claims_from_parts(parts, state)?;
        if !claims.is_admin {
            return Err(AuthError::NotAdmin.into());
        }
        Ok(AdminUser {
            email: claims.email,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "test-secret";

    #[test]
    fn test_sign_then_verify() {
        let token = sign(SECRET, Some("u1"), Some("a@b.c"), false, 60).unwrap();
        let claims = verify(SECRET, &token, chrono::Utc::now().timestamp()).unwrap();
        assert_eq!(claims.user_id.as_deref(), Some("u1"));
        assert_eq!(claims.email.as_deref(), Some("a@b.c"));
        assert!(!claims.is_admin);
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let token = sign(SECRET, Some("u1"), None, false, 60).unwrap();
        assert_eq!(
            verify("other", &token, chrono::Utc::now().timestamp()),
            Err(AuthError::BadSignature)
        );
    }

    #[test]
    fn test_tampered_payload_rejected() {
        let token = sign(SECRET, Some("u1"), None, false, 60).unwrap();
        let mut parts: Vec<&str> = token.split('.').collect();
        let forged = URL_SAFE_NO_PAD.encode(r#"{"userId":"admin","isAdmin":true,"iat":0,"exp":9999999999}"#);
        parts[1] = &forged;
        let forged_token = parts.join(".");
        assert_eq!(
            verify(SECRET, &forged_token, chrono::Utc::now().timestamp()),
            Err(AuthError::BadSignature)
        );
    }

    #[test]
    fn test_expired_rejected() {
        let claims = Claims {
            user_id: Some("u1".into()),
            email: None,
            is_admin: false,
            iat: 100,
            exp: 200,
        };
        let token = encode(SECRET, &claims).unwrap();
        assert_eq!(verify(SECRET, &token, 201), Err(AuthError::Expired));
        assert!(verify(SECRET, &token, 199).is_ok());
    }

    #[test]
    fn test_garbage_is_malformed() {
        assert_eq!(verify(SECRET, "abc", 0), Err(AuthError::Malformed));
        assert_eq!(verify(SECRET, "a.b.c.d", 0), Err(AuthError::Malformed));
        assert_eq!(verify(SECRET, "!!.??.##", 0), Err(AuthError::Malformed));
    }

    #[test]
    fn test_bearer_scheme_is_case_insensitive() {
        assert_eq!(bearer_token("Bearer abc"), Some("abc"));
        assert_eq!(bearer_token("bearer abc"), Some("abc"));
        assert_eq!(bearer_token("BEARER   abc "), Some("abc"));
        assert_eq!(bearer_token("Basic abc"), None);
        assert_eq!(bearer_token("Bearer"), None);
        assert_eq!(bearer_token("Bearer "), None);
    }
}
