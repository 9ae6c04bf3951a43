use std::sync::Arc;

use chrono::Utc;
use tracing::{info, instrument};

use super::domain::{NewPet, Pet, PetId, PetPatch};
use super::repository::{
    AdoptionRepository, Document, DocumentKey, PetQuery, Precondition, RepositoryError,
    WriteBatch,
};
use super::service::AdoptionError;
use super::session::Session;
use super::transaction::run_transaction;
use crate::config::WorkflowConfig;

/// CRUD over pet listings. Writes are admin-only.
pub struct PetCatalog<R> {
    repository: Arc<R>,
    config: WorkflowConfig,
}

impl<R> PetCatalog<R>
where
    R: AdoptionRepository + 'static,
{
    pub fn new(repository: Arc<R>, config: WorkflowConfig) -> Self {
        Self { repository, config }
    }

    #[instrument(name = "pets.create", skip(self, session, new_pet), fields(lister = %session.user_id))]
    pub async fn create_pet(&self, session: &Session, new_pet: NewPet) -> Result<Pet, AdoptionError> {
        session.require_admin()?;
        new_pet.validate()?;

        let pet = new_pet.into_pet(session.user_id.clone(), Utc::now());
        self.repository
            .commit(WriteBatch::new().put(Document::Pet(pet.clone()), Precondition::Absent))
            .await?;

        info!(pet_id = %pet.id, "pet listed");
        Ok(pet)
    }

    pub async fn get_pet(&self, pet_id: &PetId) -> Result<Pet, AdoptionError> {
        self.repository
            .fetch_pet(pet_id)
            .await?
            .map(|versioned| versioned.value)
            .ok_or_else(|| AdoptionError::PetNotFound(pet_id.clone()))
    }

    /// Newest listings first.
    pub async fn list_pets(&self, query: PetQuery) -> Result<Vec<Pet>, AdoptionError> {
        Ok(self.repository.list_pets(query).await?)
    }

    /// Versioned edit so a concurrent status change from the workflow is never overwritten.
    #[instrument(name = "pets.update", skip(self, session, patch), fields(pet_id = %pet_id))]
    pub async fn update_pet(
        &self,
        session: &Session,
        pet_id: &PetId,
        patch: PetPatch,
    ) -> Result<Pet, AdoptionError> {
        session.require_admin()?;
        patch.validate()?;

        run_transaction("update_pet", self.config.max_transaction_attempts, || {
            self.try_update(pet_id, &patch)
        })
        .await
    }

    async fn try_update(&self, pet_id: &PetId, patch: &PetPatch) -> Result<Pet, AdoptionError> {
        let current = self
            .repository
            .fetch_pet(pet_id)
            .await?
            .ok_or_else(|| AdoptionError::PetNotFound(pet_id.clone()))?;

        let mut pet = current.value;
        patch.apply(&mut pet);
        self.repository
            .commit(WriteBatch::new().put(
                Document::Pet(pet.clone()),
                Precondition::Version(current.version),
            ))
            .await
            .map_err(|error| missing_pet(error, pet_id))?;
        Ok(pet)
    }

    /// Applications that reference the pet are kept as history.
    #[instrument(name = "pets.delete", skip(self, session), fields(pet_id = %pet_id))]
    pub async fn delete_pet(&self, session: &Session, pet_id: &PetId) -> Result<(), AdoptionError> {
        session.require_admin()?;

        self.repository
            .commit(
                WriteBatch::new().delete(DocumentKey::Pet(pet_id.clone()), Precondition::Exists),
            )
            .await
            .map_err(|error| missing_pet(error, pet_id))?;

        info!("pet listing removed");
        Ok(())
    }
}

fn missing_pet(error: RepositoryError, pet_id: &PetId) -> AdoptionError {
    match error {
        RepositoryError::NotFound { .. } => AdoptionError::PetNotFound(pet_id.clone()),
        other => AdoptionError::Repository(other),
    }
}
