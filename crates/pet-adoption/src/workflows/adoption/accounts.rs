use std::sync::Arc;

use chrono::Utc;
use tracing::{error, info, instrument, warn};

use super::domain::{
    validate_email, Credentials, NewUser, UserAccount, UserId, UserPatch, UserRole,
};
use super::identity::{AccessToken, IdentityProvider};
use super::repository::{
    AdoptionRepository, Document, DocumentKey, Precondition, RepositoryError, WriteBatch,
};
use super::service::AdoptionError;
use super::session::Session;
use super::transaction::run_transaction;
use crate::config::WorkflowConfig;

/// Profile records plus the identity calls that bracket their lifetime.
pub struct AccountService<R, I> {
    repository: Arc<R>,
    identity: Arc<I>,
    config: WorkflowConfig,
}

impl<R, I> AccountService<R, I>
where
    R: AdoptionRepository + 'static,
    I: IdentityProvider + 'static,
{
    pub fn new(repository: Arc<R>, identity: Arc<I>, config: WorkflowConfig) -> Self {
        Self {
            repository,
            identity,
            config,
        }
    }

    /// Self-service registration; new accounts are adopters.
    pub async fn register(&self, new_user: NewUser) -> Result<UserAccount, AdoptionError> {
        self.create_account(new_user, UserRole::Adopter).await
    }

    /// Create an admin outside the session model, used at startup.
    pub async fn bootstrap_admin(&self, new_user: NewUser) -> Result<UserAccount, AdoptionError> {
        self.create_account(new_user, UserRole::Admin).await
    }

    #[instrument(name = "accounts.create", skip(self, new_user), fields(role = ?role))]
    async fn create_account(
        &self,
        new_user: NewUser,
        role: UserRole,
    ) -> Result<UserAccount, AdoptionError> {
        new_user.validate()?;

        let user_id = self.identity.register(&new_user.credentials()).await?;
        let account = new_user.into_account(user_id.clone(), role, Utc::now());

        let stored = self
            .repository
            .commit(WriteBatch::new().put(Document::User(account.clone()), Precondition::Absent))
            .await;

        if let Err(store_error) = stored {
            // Without a profile the identity is unusable; take it back out.
            if let Err(rollback) = self.identity.delete(&user_id).await {
                error!(user_id = %user_id, %rollback, "orphaned identity after failed registration");
            }
            return Err(store_error.into());
        }

        info!(user_id = %account.id, "account registered");
        Ok(account)
    }

    pub async fn sign_in(
        &self,
        credentials: Credentials,
    ) -> Result<(AccessToken, Session), AdoptionError> {
        credentials.validate()?;
        let token = self.identity.sign_in(&credentials).await?;
        let account = self.load(&token.user_id).await?;
        Ok((token, Session::for_account(&account)))
    }

    /// Resolve a bearer token into a session backed by the current profile.
    pub async fn authenticate(&self, token: &str) -> Result<Session, AdoptionError> {
        let user_id = self.identity.verify(token).await?;
        let account = self.load(&user_id).await.map_err(|error| match error {
            AdoptionError::UserNotFound(_) => AdoptionError::Unauthenticated,
            other => other,
        })?;
        Ok(Session::for_account(&account))
    }

    pub async fn sign_out(&self, token: &str) -> Result<(), AdoptionError> {
        Ok(self.identity.sign_out(token).await?)
    }

    pub async fn request_password_reset(&self, email: &str) -> Result<(), AdoptionError> {
        validate_email(email)?;
        Ok(self.identity.send_password_reset(email).await?)
    }

    pub async fn get_profile(
        &self,
        session: &Session,
        user_id: &UserId,
    ) -> Result<UserAccount, AdoptionError> {
        session.require_access(user_id)?;
        self.load(user_id).await
    }

    pub async fn update_profile(
        &self,
        session: &Session,
        user_id: &UserId,
        patch: UserPatch,
    ) -> Result<UserAccount, AdoptionError> {
        session.require_access(user_id)?;
        patch.validate()?;

        run_transaction(
            "update_profile",
            self.config.max_transaction_attempts,
            || self.try_update(user_id, &patch),
        )
        .await
    }

    async fn try_update(
        &self,
        user_id: &UserId,
        patch: &UserPatch,
    ) -> Result<UserAccount, AdoptionError> {
        let current = self
            .repository
            .fetch_user(user_id)
            .await?
            .ok_or_else(|| AdoptionError::UserNotFound(user_id.clone()))?;

        let mut account = current.value;
        patch.apply(&mut account, Utc::now());
        self.repository
            .commit(WriteBatch::new().put(
                Document::User(account.clone()),
                Precondition::Version(current.version),
            ))
            .await
            .map_err(|error| missing_user(error, user_id))?;
        Ok(account)
    }

    /// Remove the profile, then the identity.
    ///
    /// The two live in different systems and cannot share a transaction. If the identity
    /// delete fails the profile is written back so the account stays usable, and the
    /// identity error is returned.
    #[instrument(name = "accounts.delete", skip(self, session), fields(user_id = %user_id))]
    pub async fn delete_account(
        &self,
        session: &Session,
        user_id: &UserId,
    ) -> Result<(), AdoptionError> {
        session.require_access(user_id)?;

        let profile = run_transaction(
            "delete_account",
            self.config.max_transaction_attempts,
            || self.try_remove_profile(user_id),
        )
        .await?;

        if let Err(identity_error) = self.identity.delete(user_id).await {
            warn!(%identity_error, "identity delete failed; restoring profile");
            let restore = self
                .repository
                .commit(WriteBatch::new().put(Document::User(profile), Precondition::Absent))
                .await;
            if let Err(restore_error) = restore {
                error!(%restore_error, "profile restore failed; identity left without a profile");
            }
            return Err(identity_error.into());
        }

        info!("account deleted");
        Ok(())
    }

    /// Delete the profile at the version read, returning what was removed.
    async fn try_remove_profile(&self, user_id: &UserId) -> Result<UserAccount, AdoptionError> {
        let current = self
            .repository
            .fetch_user(user_id)
            .await?
            .ok_or_else(|| AdoptionError::UserNotFound(user_id.clone()))?;
        self.repository
            .commit(WriteBatch::new().delete(
                DocumentKey::User(user_id.clone()),
                Precondition::Version(current.version),
            ))
            .await
            .map_err(|error| missing_user(error, user_id))?;
        Ok(current.value)
    }

    async fn load(&self, user_id: &UserId) -> Result<UserAccount, AdoptionError> {
        self.repository
            .fetch_user(user_id)
            .await?
            .map(|versioned| versioned.value)
            .ok_or_else(|| AdoptionError::UserNotFound(user_id.clone()))
    }
}

fn missing_user(error: RepositoryError, user_id: &UserId) -> AdoptionError {
    match error {
        RepositoryError::NotFound { .. } => AdoptionError::UserNotFound(user_id.clone()),
        other => AdoptionError::Repository(other),
    }
}
