use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use serde::Serialize;
use uuid::Uuid;

use super::domain::{Credentials, UserId};

/// Opaque bearer token issued at sign-in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccessToken {
    pub token: String,
    pub user_id: UserId,
}

/// Authentication identities, kept apart from profile records.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn register(&self, credentials: &Credentials) -> Result<UserId, IdentityError>;
    async fn sign_in(&self, credentials: &Credentials) -> Result<AccessToken, IdentityError>;
    async fn verify(&self, token: &str) -> Result<UserId, IdentityError>;
    async fn sign_out(&self, token: &str) -> Result<(), IdentityError>;
    async fn send_password_reset(&self, email: &str) -> Result<(), IdentityError>;
    async fn delete(&self, user_id: &UserId) -> Result<(), IdentityError>;
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdentityError {
    #[error("email address is already registered")]
    EmailInUse,
    #[error("email or password is incorrect")]
    InvalidCredentials,
    #[error("session token is invalid or expired")]
    InvalidToken,
    #[error("no identity exists for user {0}")]
    UnknownUser(UserId),
    #[error("identity provider unavailable: {0}")]
    Unavailable(String),
}

struct IdentityRecord {
    user_id: UserId,
    password: String,
}

#[derive(Default)]
struct IdentityState {
    by_email: HashMap<String, IdentityRecord>,
    tokens: HashMap<String, UserId>,
    reset_outbox: Vec<String>,
}

/// Process-local identity provider for development and tests. Passwords are held in memory
/// as given, so never point it at real credentials.
#[derive(Default)]
pub struct InMemoryIdentityProvider {
    state: Mutex<IdentityState>,
}

impl InMemoryIdentityProvider {
    fn lock(&self) -> Result<MutexGuard<'_, IdentityState>, IdentityError> {
        self.state
            .lock()
            .map_err(|_| IdentityError::Unavailable("identity lock poisoned".to_string()))
    }

    /// Addresses a password reset was requested for, oldest first.
    pub fn password_reset_requests(&self) -> Vec<String> {
        self.lock()
            .map(|state| state.reset_outbox.clone())
            .unwrap_or_default()
    }

    pub fn contains(&self, user_id: &UserId) -> bool {
        self.lock()
            .map(|state| {
                state
                    .by_email
                    .values()
                    .any(|record| &record.user_id == user_id)
            })
            .unwrap_or(false)
    }
}

fn normalize(email: &str) -> String {
    email.trim().to_ascii_lowercase()
}

#[async_trait]
impl IdentityProvider for InMemoryIdentityProvider {
    async fn register(&self, credentials: &Credentials) -> Result<UserId, IdentityError> {
        let mut state = self.lock()?;
        let email = normalize(&credentials.email);
        if state.by_email.contains_key(&email) {
            return Err(IdentityError::EmailInUse);
        }
        let user_id = UserId::generate();
        state.by_email.insert(
            email,
            IdentityRecord {
                user_id: user_id.clone(),
                password: credentials.password.clone(),
            },
        );
        Ok(user_id)
    }

    async fn sign_in(&self, credentials: &Credentials) -> Result<AccessToken, IdentityError> {
        let mut state = self.lock()?;
        let user_id = match state.by_email.get(&normalize(&credentials.email)) {
            Some(record) if record.password == credentials.password => record.user_id.clone(),
            _ => return Err(IdentityError::InvalidCredentials),
        };
        let token = Uuid::new_v4().simple().to_string();
        state.tokens.insert(token.clone(), user_id.clone());
        Ok(AccessToken { token, user_id })
    }

    async fn verify(&self, token: &str) -> Result<UserId, IdentityError> {
        self.lock()?
            .tokens
            .get(token)
            .cloned()
            .ok_or(IdentityError::InvalidToken)
    }

    async fn sign_out(&self, token: &str) -> Result<(), IdentityError> {
        self.lock()?
            .tokens
            .remove(token)
            .map(|_| ())
            .ok_or(IdentityError::InvalidToken)
    }

    async fn send_password_reset(&self, email: &str) -> Result<(), IdentityError> {
        let mut state = self.lock()?;
        let email = normalize(email);
        // Unknown addresses are accepted silently so callers cannot enumerate accounts.
        if state.by_email.contains_key(&email) {
            state.reset_outbox.push(email);
        }
        Ok(())
    }

    async fn delete(&self, user_id: &UserId) -> Result<(), IdentityError> {
        let mut state = self.lock()?;
        let email = state
            .by_email
            .iter()
            .find(|(_, record)| &record.user_id == user_id)
            .map(|(email, _)| email.clone())
            .ok_or_else(|| IdentityError::UnknownUser(user_id.clone()))?;
        state.by_email.remove(&email);
        state.tokens.retain(|_, owner| owner != user_id);
        Ok(())
    }
}
