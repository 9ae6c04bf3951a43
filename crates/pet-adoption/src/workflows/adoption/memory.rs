use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::broadcast;
use tracing::debug;

use super::domain::{AdoptionApplication, ApplicationId, Pet, PetId, UserAccount, UserId};
use super::repository::{
    AdoptionRepository, ApplicationFilter, ChangeEvent, ChangeKind, CommitReceipt, Document,
    DocumentKey, PetQuery, Precondition, RepositoryError, Versioned, Write, WriteBatch,
};

const DEFAULT_CHANGE_CAPACITY: usize = 256;

/// Process-local document store. A single lock serialises commits, which gives batches the
/// same all-or-nothing, check-then-write isolation a hosted document store provides.
pub struct InMemoryAdoptionRepository {
    state: Mutex<StoreState>,
    changes: broadcast::Sender<ChangeEvent>,
}

#[derive(Default)]
struct StoreState {
    pets: HashMap<PetId, Versioned<Pet>>,
    applications: HashMap<ApplicationId, Versioned<AdoptionApplication>>,
    users: HashMap<UserId, Versioned<UserAccount>>,
}

impl StoreState {
    fn version_of(&self, key: &DocumentKey) -> Option<u64> {
        match key {
            DocumentKey::Pet(id) => self.pets.get(id).map(|slot| slot.version),
            DocumentKey::Application(id) => self.applications.get(id).map(|slot| slot.version),
            DocumentKey::User(id) => self.users.get(id).map(|slot| slot.version),
        }
    }

    fn check(&self, write: &Write) -> Result<(), RepositoryError> {
        let key = write.key();
        let current = self.version_of(&key);
        match (write.precondition(), current) {
            (Precondition::None, _) => Ok(()),
            (Precondition::Exists, Some(_)) => Ok(()),
            (Precondition::Exists, None) => Err(RepositoryError::not_found(&key)),
            (Precondition::Absent, None) => Ok(()),
            (Precondition::Absent, Some(_)) => Err(RepositoryError::conflict(&key)),
            (Precondition::Version(_), None) => Err(RepositoryError::not_found(&key)),
            (Precondition::Version(expected), Some(actual)) if expected == actual => Ok(()),
            (Precondition::Version(_), Some(_)) => Err(RepositoryError::contention(&key)),
        }
    }

    fn apply(&mut self, write: Write, receipt: CommitReceipt) -> Option<ChangeEvent> {
        let key = write.key();
        let kind = match write {
            Write::Put { document, .. } => match document {
                Document::Pet(pet) => upsert(&mut self.pets, pet.id.clone(), pet),
                Document::Application(mut application) => {
                    if !self.applications.contains_key(&application.id) {
                        application.submitted_at = receipt.committed_at;
                    }
                    upsert(
                        &mut self.applications,
                        application.id.clone(),
                        application,
                    )
                }
                Document::User(account) => upsert(&mut self.users, account.id.clone(), account),
            },
            Write::Delete { key, .. } => {
                let removed = match &key {
                    DocumentKey::Pet(id) => self.pets.remove(id).is_some(),
                    DocumentKey::Application(id) => self.applications.remove(id).is_some(),
                    DocumentKey::User(id) => self.users.remove(id).is_some(),
                };
                if !removed {
                    return None;
                }
                ChangeKind::Deleted
            }
        };

        Some(ChangeEvent {
            collection: key.collection(),
            document_id: key.id().to_string(),
            kind,
        })
    }
}

fn upsert<K, T>(map: &mut HashMap<K, Versioned<T>>, id: K, value: T) -> ChangeKind
where
    K: std::hash::Hash + Eq,
{
    match map.get_mut(&id) {
        Some(slot) => {
            slot.version += 1;
            slot.value = value;
            ChangeKind::Updated
        }
        None => {
            map.insert(id, Versioned { version: 1, value });
            ChangeKind::Created
        }
    }
}

impl Default for InMemoryAdoptionRepository {
    fn default() -> Self {
        Self::with_change_capacity(DEFAULT_CHANGE_CAPACITY)
    }
}

impl InMemoryAdoptionRepository {
    pub fn with_change_capacity(capacity: usize) -> Self {
        let (changes, _) = broadcast::channel(capacity.max(1));
        Self {
            state: Mutex::new(StoreState::default()),
            changes,
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, StoreState>, RepositoryError> {
        self.state
            .lock()
            .map_err(|_| RepositoryError::Unavailable("store lock poisoned".to_string()))
    }
}

#[async_trait]
impl AdoptionRepository for InMemoryAdoptionRepository {
    async fn fetch_pet(&self, id: &PetId) -> Result<Option<Versioned<Pet>>, RepositoryError> {
        Ok(self.lock()?.pets.get(id).cloned())
    }

    async fn list_pets(&self, query: PetQuery) -> Result<Vec<Pet>, RepositoryError> {
        let state = self.lock()?;
        let mut pets: Vec<Pet> = state
            .pets
            .values()
            .map(|slot| &slot.value)
            .filter(|pet| query.matches(pet))
            .cloned()
            .collect();
        pets.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
        Ok(pets)
    }

    async fn fetch_application(
        &self,
        id: &ApplicationId,
    ) -> Result<Option<Versioned<AdoptionApplication>>, RepositoryError> {
        Ok(self.lock()?.applications.get(id).cloned())
    }

    async fn list_applications(
        &self,
        filter: &ApplicationFilter,
    ) -> Result<Vec<AdoptionApplication>, RepositoryError> {
        let state = self.lock()?;
        let mut applications: Vec<AdoptionApplication> = state
            .applications
            .values()
            .map(|slot| &slot.value)
            .filter(|application| filter.matches(application))
            .cloned()
            .collect();
        applications.sort_by(|a, b| {
            b.submitted_at
                .cmp(&a.submitted_at)
                .then(a.id.cmp(&b.id))
        });
        Ok(applications)
    }

    async fn fetch_user(
        &self,
        id: &UserId,
    ) -> Result<Option<Versioned<UserAccount>>, RepositoryError> {
        Ok(self.lock()?.users.get(id).cloned())
    }

    async fn commit(&self, batch: WriteBatch) -> Result<CommitReceipt, RepositoryError> {
        let (receipt, events) = {
            let mut state = self.lock()?;
            for write in batch.writes() {
                state.check(write)?;
            }
            // Stamped under the lock so commit times follow commit order.
            let receipt = CommitReceipt {
                committed_at: Utc::now(),
            };
            let events = batch
                .into_writes()
                .into_iter()
                .filter_map(|write| state.apply(write, receipt))
                .collect::<Vec<_>>();
            (receipt, events)
        };

        debug!(writes = events.len(), "committed batch");
        for event in events {
            // No subscribers is not an error.
            let _ = self.changes.send(event);
        }

        Ok(receipt)
    }

    fn changes(&self) -> broadcast::Receiver<ChangeEvent> {
        self.changes.subscribe()
    }
}
