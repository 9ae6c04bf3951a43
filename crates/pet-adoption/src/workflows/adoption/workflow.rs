use std::sync::Arc;

use chrono::Utc;
use tracing::{info, instrument, warn};

use super::domain::{
    AdoptionApplication, ApplicationId, ApplicationStatus, NewApplication, PetId, PetStatus,
    UserId, ValidationError,
};
use super::repository::{
    AdoptionRepository, ApplicationFilter, Collection, Document, Precondition, RepositoryError,
    WriteBatch,
};
use super::service::AdoptionError;
use super::session::Session;
use super::subscription::ApplicationSubscription;
use super::transaction::run_transaction;
use crate::config::{RejectionPolicy, WorkflowConfig};

/// Moves pets between availability states as applications are submitted and decided.
///
/// Submitting flips an AVAILABLE pet to PENDING and records the application in one commit
/// guarded by the pet's version, so concurrent submitters for the same pet cannot both win.
/// Decisions are committed together with their effect on the pet.
pub struct AdoptionWorkflow<R> {
    repository: Arc<R>,
    config: WorkflowConfig,
}

impl<R> AdoptionWorkflow<R>
where
    R: AdoptionRepository + 'static,
{
    pub fn new(repository: Arc<R>, config: WorkflowConfig) -> Self {
        Self { repository, config }
    }

    pub fn config(&self) -> &WorkflowConfig {
        &self.config
    }

    #[instrument(
        name = "workflow.submit_application",
        skip(self, session, application),
        fields(pet_id = %pet_id, applicant = %application.applicant_id)
    )]
    pub async fn submit_application(
        &self,
        session: &Session,
        application: NewApplication,
        pet_id: &PetId,
    ) -> Result<AdoptionApplication, AdoptionError> {
        application.validate()?;
        session.require_access(&application.applicant_id)?;

        let outcome = run_transaction(
            "submit_application",
            self.config.max_transaction_attempts,
            || self.try_submit(&application, pet_id),
        )
        .await;

        match &outcome {
            Ok(record) => info!(application_id = %record.id, "application submitted; pet pending"),
            Err(error) if error.is_unavailable_pet() => info!(%error, "submission lost the pet"),
            Err(error) => warn!(%error, "submission failed"),
        }
        outcome
    }

    async fn try_submit(
        &self,
        application: &NewApplication,
        pet_id: &PetId,
    ) -> Result<AdoptionApplication, AdoptionError> {
        let pet = self
            .repository
            .fetch_pet(pet_id)
            .await?
            .ok_or_else(|| AdoptionError::PetNotFound(pet_id.clone()))?;

        if pet.value.status != PetStatus::Available {
            return Err(AdoptionError::PetUnavailable {
                pet_id: pet_id.clone(),
                status: pet.value.status,
            });
        }

        let mut pending_pet = pet.value;
        pending_pet.status = PetStatus::Pending;

        let mut record = AdoptionApplication {
            id: ApplicationId::generate(),
            pet_id: pet_id.clone(),
            applicant_id: application.applicant_id.clone(),
            applicant_name: application.applicant_name.trim().to_string(),
            message: application.message.clone(),
            status: ApplicationStatus::Pending,
            submitted_at: Utc::now(),
        };

        let batch = WriteBatch::new()
            .put(
                Document::Pet(pending_pet),
                Precondition::Version(pet.version),
            )
            .put(
                Document::Application(record.clone()),
                Precondition::Absent,
            );

        let receipt = self
            .repository
            .commit(batch)
            .await
            .map_err(|error| not_found_as(error, pet_id, &record.id))?;
        record.submitted_at = receipt.committed_at;
        Ok(record)
    }

    /// Record an admin decision. APPROVED and REJECTED are terminal; a decided application
    /// is never reopened.
    #[instrument(
        name = "workflow.update_application_status",
        skip(self, session),
        fields(application_id = %application_id, status = %status)
    )]
    pub async fn update_application_status(
        &self,
        session: &Session,
        application_id: &ApplicationId,
        status: ApplicationStatus,
    ) -> Result<AdoptionApplication, AdoptionError> {
        session.require_admin()?;
        if !status.is_terminal() {
            return Err(ValidationError::NonTerminalDecision { status }.into());
        }

        let decided = run_transaction(
            "update_application_status",
            self.config.max_transaction_attempts,
            || self.try_decide(application_id, status),
        )
        .await?;

        info!(pet_id = %decided.pet_id, "application decided");
        Ok(decided)
    }

    async fn try_decide(
        &self,
        application_id: &ApplicationId,
        status: ApplicationStatus,
    ) -> Result<AdoptionApplication, AdoptionError> {
        let current = self
            .repository
            .fetch_application(application_id)
            .await?
            .ok_or_else(|| AdoptionError::ApplicationNotFound(application_id.clone()))?;

        if current.value.status.is_terminal() {
            return Err(AdoptionError::ApplicationFinalized {
                application_id: application_id.clone(),
                status: current.value.status,
            });
        }

        let mut decided = current.value;
        decided.status = status;
        let mut batch = WriteBatch::new().put(
            Document::Application(decided.clone()),
            Precondition::Version(current.version),
        );

        let pet_status = match status {
            ApplicationStatus::Approved => Some(PetStatus::Adopted),
            ApplicationStatus::Rejected => self.release_target(&decided).await?,
            ApplicationStatus::Pending => None,
        };

        if let Some(pet_status) = pet_status {
            match self.repository.fetch_pet(&decided.pet_id).await? {
                Some(pet) => {
                    let mut pet_update = pet.value;
                    pet_update.status = pet_status;
                    batch = batch.put(
                        Document::Pet(pet_update),
                        Precondition::Version(pet.version),
                    );
                }
                None => warn!(pet_id = %decided.pet_id, "decided application references a removed pet"),
            }
        }

        self.repository
            .commit(batch)
            .await
            .map_err(|error| match error {
                // The pet vanished after it was read; the next attempt decides without it.
                RepositoryError::NotFound { collection, id }
                    if collection == Collection::Pets.name() =>
                {
                    AdoptionError::Repository(RepositoryError::Contention { collection, id })
                }
                other => not_found_as(other, &decided.pet_id, application_id),
            })?;
        Ok(decided)
    }

    /// Status a rejection moves the pet to, if any.
    async fn release_target(
        &self,
        rejected: &AdoptionApplication,
    ) -> Result<Option<PetStatus>, AdoptionError> {
        if self.config.rejection_policy == RejectionPolicy::KeepPending {
            return Ok(None);
        }

        let pet = match self.repository.fetch_pet(&rejected.pet_id).await? {
            Some(pet) if pet.value.status == PetStatus::Pending => pet,
            _ => return Ok(None),
        };

        let siblings = self
            .repository
            .list_applications(&ApplicationFilter::Pet(pet.value.id.clone()))
            .await?;
        let still_pending = siblings.iter().any(|application| {
            application.id != rejected.id && application.status == ApplicationStatus::Pending
        });

        Ok(if still_pending {
            None
        } else {
            Some(PetStatus::Available)
        })
    }

    /// Read one application. Adopters only see their own.
    pub async fn get_application(
        &self,
        session: &Session,
        application_id: &ApplicationId,
    ) -> Result<AdoptionApplication, AdoptionError> {
        let application = self
            .repository
            .fetch_application(application_id)
            .await?
            .map(|versioned| versioned.value)
            .ok_or_else(|| AdoptionError::ApplicationNotFound(application_id.clone()))?;
        session.require_access(&application.applicant_id)?;
        Ok(application)
    }

    /// One-shot query; newest first.
    pub async fn list_applications(
        &self,
        session: &Session,
        filter: ApplicationFilter,
    ) -> Result<Vec<AdoptionApplication>, AdoptionError> {
        authorize_filter(session, &filter)?;
        Ok(self.repository.list_applications(&filter).await?)
    }

    /// Live query over one applicant's submissions.
    pub async fn applications_for_user(
        &self,
        session: &Session,
        user_id: &UserId,
    ) -> Result<ApplicationSubscription, AdoptionError> {
        self.subscribe(session, ApplicationFilter::Applicant(user_id.clone()))
            .await
    }

    /// Live query over every application.
    pub async fn all_applications(
        &self,
        session: &Session,
    ) -> Result<ApplicationSubscription, AdoptionError> {
        self.subscribe(session, ApplicationFilter::All).await
    }

    async fn subscribe(
        &self,
        session: &Session,
        filter: ApplicationFilter,
    ) -> Result<ApplicationSubscription, AdoptionError> {
        authorize_filter(session, &filter)?;
        let subscription = ApplicationSubscription::start(
            self.repository.clone(),
            filter,
            self.config.subscription_buffer,
        )
        .await?;
        Ok(subscription)
    }
}

fn authorize_filter(session: &Session, filter: &ApplicationFilter) -> Result<(), AdoptionError> {
    match filter {
        ApplicationFilter::Applicant(user_id) => session.require_access(user_id),
        ApplicationFilter::All | ApplicationFilter::Pet(_) => session.require_admin(),
    }
}

fn not_found_as(
    error: RepositoryError,
    pet_id: &PetId,
    application_id: &ApplicationId,
) -> AdoptionError {
    match error {
        RepositoryError::NotFound { collection, .. }
            if collection == Collection::Pets.name() =>
        {
            AdoptionError::PetNotFound(pet_id.clone())
        }
        RepositoryError::NotFound { collection, .. }
            if collection == Collection::AdoptionApplications.name() =>
        {
            AdoptionError::ApplicationNotFound(application_id.clone())
        }
        other => AdoptionError::Repository(other),
    }
}
