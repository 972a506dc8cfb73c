//! Account registration and password login.
//!
//! Passwords are hashed with bcrypt at `[auth] bcrypt_cost`. Hashing and
//! verification are CPU-bound, so both run on the blocking thread pool.
//! The token issued after login carries the account id as `userId`, which
//! is the owner key of every chat session.

use std::sync::Arc;

use anyhow::Context;
use serde::Deserialize;
use tracing::{info, instrument, warn};

use crate::error::AccountError;
use crate::models::UserProfile;
use crate::store::users::{normalize_email, NewUser, UserStore};

/// Body of `POST /register`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

pub struct AccountService {
    users: Arc<dyn UserStore>,
    bcrypt_cost: u32,
}

impl AccountService {
    pub fn new(users: Arc<dyn UserStore>, bcrypt_cost: u32) -> Self {
        Self { users, bcrypt_cost }
    }

    /// Create an account. Email and password are required; the email must be unused.
    #[instrument(skip_all)]
    pub async fn register(&self, req: RegisterRequest) -> Result<UserProfile, AccountError> {
        let email = req
            .email
            .as_deref()
            .map(normalize_email)
            .filter(|e| !e.is_empty());
        let password = req.password.filter(|p| !p.is_empty());
        let (Some(email), Some(password)) = (email, password) else {
            return Err(AccountError::MissingFields);
        };

        if self.users.find_by_email(&email).await?.is_some() {
            return Err(AccountError::EmailTaken);
        }

        let password_hash = hash_password(password, self.bcrypt_cost).await?;
        let user = self
            .users
            .create_user(NewUser {
                first_name: non_blank(req.first_name),
                last_name: non_blank(req.last_name),
                email,
                password_hash,
            })
            .await?;

        info!(user = %user.id, "registered account");
        Ok(UserProfile::from(&user))
    }

    /// Check credentials. Unknown email and wrong password fail the same way.
    #[instrument(skip_all)]
    pub async fn login(&self, email: &str, password: &str) -> Result<UserProfile, AccountError> {
        let Some(user) = self.users.find_by_email(email).await? else {
            warn!("login for unknown email");
            return Err(AccountError::InvalidCredentials);
        };
        if !verify_password(password.to_string(), user.password_hash.clone()).await? {
            warn!(user = %user.id, "login with wrong password");
            return Err(AccountError::InvalidCredentials);
        }
        Ok(UserProfile::from(&user))
    }

    pub async fn profile(&self, user_id: &str) -> Result<UserProfile, AccountError> {
        self.users
            .find_by_id(user_id)
            .await?
            .map(|u| UserProfile::from(&u))
            .ok_or(AccountError::UnknownUser)
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

async fn hash_password(password: String, cost: u32) -> Result<String, AccountError> {
    let hash = tokio::task::spawn_blocking(move || bcrypt::hash(password, cost))
        .await
        .context("password hashing task failed")?
        .context("hashing password")?;
    Ok(hash)
}

async fn verify_password(password: String, hash: String) -> Result<bool, AccountError> {
    let ok = tokio::task::spawn_blocking(move || bcrypt::verify(password, &hash))
        .await
        .context("password verification task failed")?
        .context("verifying password")?;
    Ok(ok)
}
