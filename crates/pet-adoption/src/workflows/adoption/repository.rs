use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use super::domain::{
    AdoptionApplication, ApplicationId, Pet, PetId, PetStatus, UserAccount, UserId,
};

/// A document together with the version it was read at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Versioned<T> {
    pub version: u64,
    pub value: T,
}

/// The three collections backing the adoption workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Collection {
    Pets,
    AdoptionApplications,
    Users,
}

impl Collection {
    pub const fn name(self) -> &'static str {
        match self {
            Collection::Pets => "pets",
            Collection::AdoptionApplications => "adoption_applications",
            Collection::Users => "users",
        }
    }
}

/// Address of a single document.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DocumentKey {
    Pet(PetId),
    Application(ApplicationId),
    User(UserId),
}

impl DocumentKey {
    pub fn collection(&self) -> Collection {
        match self {
            DocumentKey::Pet(_) => Collection::Pets,
            DocumentKey::Application(_) => Collection::AdoptionApplications,
            DocumentKey::User(_) => Collection::Users,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            DocumentKey::Pet(id) => &id.0,
            DocumentKey::Application(id) => &id.0,
            DocumentKey::User(id) => &id.0,
        }
    }
}

/// Document payload written by a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Document {
    Pet(Pet),
    Application(AdoptionApplication),
    User(UserAccount),
}

impl Document {
    pub fn key(&self) -> DocumentKey {
        match self {
            Document::Pet(pet) => DocumentKey::Pet(pet.id.clone()),
            Document::Application(application) => {
                DocumentKey::Application(application.id.clone())
            }
            Document::User(account) => DocumentKey::User(account.id.clone()),
        }
    }
}

/// Condition a write requires of the document's current state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Precondition {
    None,
    Exists,
    Absent,
    Version(u64),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Write {
    Put {
        document: Document,
        precondition: Precondition,
    },
    Delete {
        key: DocumentKey,
        precondition: Precondition,
    },
}

impl Write {
    pub fn key(&self) -> DocumentKey {
        match self {
            Write::Put { document, .. } => document.key(),
            Write::Delete { key, .. } => key.clone(),
        }
    }

    pub fn precondition(&self) -> Precondition {
        match self {
            Write::Put { precondition, .. } | Write::Delete { precondition, .. } => *precondition,
        }
    }
}

/// Ordered writes committed all-or-nothing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteBatch {
    writes: Vec<Write>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(mut self, document: Document, precondition: Precondition) -> Self {
        self.writes.push(Write::Put {
            document,
            precondition,
        });
        self
    }

    pub fn delete(mut self, key: DocumentKey, precondition: Precondition) -> Self {
        self.writes.push(Write::Delete { key, precondition });
        self
    }

    pub fn writes(&self) -> &[Write] {
        &self.writes
    }

    pub fn into_writes(self) -> Vec<Write> {
        self.writes
    }

    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommitReceipt {
    pub committed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Created,
    Updated,
    Deleted,
}

/// Emitted once per committed write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    pub collection: Collection,
    pub document_id: String,
    pub kind: ChangeKind,
}

/// Pet listing query.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PetQuery {
    #[serde(default)]
    pub status: Option<PetStatus>,
}

impl PetQuery {
    pub fn matches(&self, pet: &Pet) -> bool {
        self.status.map_or(true, |status| pet.status == status)
    }
}

/// Application listing query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplicationFilter {
    All,
    Applicant(UserId),
    Pet(PetId),
}

impl ApplicationFilter {
    pub fn matches(&self, application: &AdoptionApplication) -> bool {
        match self {
            ApplicationFilter::All => true,
            ApplicationFilter::Applicant(user) => &application.applicant_id == user,
            ApplicationFilter::Pet(pet) => &application.pet_id == pet,
        }
    }
}

/// Document store contract the workflow runs against.
///
/// `commit` is the only write path. Either every precondition in the batch holds and every
/// write lands, or the store is left untouched. Applications created by a batch carry the
/// commit time as `submitted_at`.
#[async_trait]
pub trait AdoptionRepository: Send + Sync {
    async fn fetch_pet(&self, id: &PetId) -> Result<Option<Versioned<Pet>>, RepositoryError>;
    async fn list_pets(&self, query: PetQuery) -> Result<Vec<Pet>, RepositoryError>;
    async fn fetch_application(
        &self,
        id: &ApplicationId,
    ) -> Result<Option<Versioned<AdoptionApplication>>, RepositoryError>;
    /// Newest first.
    async fn list_applications(
        &self,
        filter: &ApplicationFilter,
    ) -> Result<Vec<AdoptionApplication>, RepositoryError>;
    async fn fetch_user(
        &self,
        id: &UserId,
    ) -> Result<Option<Versioned<UserAccount>>, RepositoryError>;
    async fn commit(&self, batch: WriteBatch) -> Result<CommitReceipt, RepositoryError>;
    /// Change feed covering every collection.
    fn changes(&self) -> broadcast::Receiver<ChangeEvent>;
}

/// Error enumeration for repository failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RepositoryError {
    #[error("{collection}/{id} already exists")]
    Conflict { collection: &'static str, id: String },
    #[error("{collection}/{id} not found")]
    NotFound { collection: &'static str, id: String },
    #[error("{collection}/{id} changed since it was read")]
    Contention { collection: &'static str, id: String },
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}

impl RepositoryError {
    pub(crate) fn conflict(key: &DocumentKey) -> Self {
        Self::Conflict {
            collection: key.collection().name(),
            id: key.id().to_string(),
        }
    }

    pub(crate) fn not_found(key: &DocumentKey) -> Self {
        Self::NotFound {
            collection: key.collection().name(),
            id: key.id().to_string(),
        }
    }

    pub(crate) fn contention(key: &DocumentKey) -> Self {
        Self::Contention {
            collection: key.collection().name(),
            id: key.id().to_string(),
        }
    }

    pub fn is_contention(&self) -> bool {
        matches!(self, RepositoryError::Contention { .. })
    }
}

