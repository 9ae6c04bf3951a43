use std::sync::Arc;

use super::accounts::AccountService;
use super::domain::{ApplicationId, ApplicationStatus, PetId, PetStatus, UserId, ValidationError};
use super::identity::{IdentityError, IdentityProvider};
use super::pets::PetCatalog;
use super::repository::{AdoptionRepository, RepositoryError};
use super::workflow::AdoptionWorkflow;
use crate::config::WorkflowConfig;

/// Pet catalog, adoption workflow, and account services sharing one store.
pub struct AdoptionServices<R, I> {
    pub pets: PetCatalog<R>,
    pub workflow: AdoptionWorkflow<R>,
    pub accounts: AccountService<R, I>,
}

impl<R, I> AdoptionServices<R, I>
where
    R: AdoptionRepository + 'static,
    I: IdentityProvider + 'static,
{
    pub fn new(repository: Arc<R>, identity: Arc<I>, config: WorkflowConfig) -> Self {
        Self {
            pets: PetCatalog::new(repository.clone(), config),
            workflow: AdoptionWorkflow::new(repository.clone(), config),
            accounts: AccountService::new(repository, identity, config),
        }
    }
}

/// Error raised by the adoption services.
#[derive(Debug, thiserror::Error)]
pub enum AdoptionError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("pet {0} not found")]
    PetNotFound(PetId),
    #[error("application {0} not found")]
    ApplicationNotFound(ApplicationId),
    #[error("user {0} not found")]
    UserNotFound(UserId),
    #[error("pet {pet_id} is no longer available (currently {status})")]
    PetUnavailable { pet_id: PetId, status: PetStatus },
    #[error("application {application_id} was already {status}")]
    ApplicationFinalized {
        application_id: ApplicationId,
        status: ApplicationStatus,
    },
    #[error("sign-in required")]
    Unauthenticated,
    #[error("forbidden: {reason}")]
    Forbidden { reason: &'static str },
    #[error("{operation} gave up after {attempts} contended attempts")]
    RetryExhausted {
        operation: &'static str,
        attempts: u32,
    },
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error(transparent)]
    Identity(#[from] IdentityError),
}

impl AdoptionError {
    /// Conflicts the caller should present as "no longer available" rather than a failure.
    pub fn is_unavailable_pet(&self) -> bool {
        matches!(self, AdoptionError::PetUnavailable { .. })
    }

    /// Stable machine-readable tag for API payloads.
    pub fn code(&self) -> &'static str {
        match self {
            AdoptionError::Validation(_) => "validation_failed",
            AdoptionError::PetNotFound(_) => "pet_not_found",
            AdoptionError::ApplicationNotFound(_) => "application_not_found",
            AdoptionError::UserNotFound(_) => "user_not_found",
            AdoptionError::PetUnavailable { .. } => "pet_unavailable",
            AdoptionError::ApplicationFinalized { .. } => "application_finalized",
            AdoptionError::Unauthenticated => "unauthenticated",
            AdoptionError::Forbidden { .. } => "forbidden",
            AdoptionError::RetryExhausted { .. } => "retry_exhausted",
            AdoptionError::Repository(RepositoryError::Conflict { .. }) => "already_exists",
            AdoptionError::Repository(RepositoryError::NotFound { .. }) => "not_found",
            AdoptionError::Repository(RepositoryError::Contention { .. }) => "contention",
            AdoptionError::Repository(RepositoryError::Unavailable(_)) => "store_unavailable",
            AdoptionError::Identity(IdentityError::EmailInUse) => "email_in_use",
            AdoptionError::Identity(IdentityError::InvalidCredentials) => "invalid_credentials",
            AdoptionError::Identity(IdentityError::InvalidToken) => "invalid_token",
            AdoptionError::Identity(IdentityError::UnknownUser(_)) => "unknown_user",
            AdoptionError::Identity(IdentityError::Unavailable(_)) => "identity_unavailable",
        }
    }
}
