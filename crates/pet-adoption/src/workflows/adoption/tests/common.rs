use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::response::Response;
use serde_json::Value;
use tokio::sync::broadcast;

use crate::config::WorkflowConfig;
use crate::workflows::adoption::domain::{
    AdoptionApplication, ApplicationId, Credentials, NewApplication, NewPet, NewUser, Pet,
    PetGender, PetId, UserAccount, UserId, UserRole,
};
use crate::workflows::adoption::identity::{
    AccessToken, IdentityError, IdentityProvider, InMemoryIdentityProvider,
};
use crate::workflows::adoption::memory::InMemoryAdoptionRepository;
use crate::workflows::adoption::repository::{
    AdoptionRepository, ApplicationFilter, ChangeEvent, CommitReceipt, PetQuery,
    RepositoryError, Versioned, WriteBatch,
};
use crate::workflows::adoption::{AdoptionServices, Session};

pub(super) type MemoryServices = AdoptionServices<InMemoryAdoptionRepository, InMemoryIdentityProvider>;

pub(super) struct Harness {
    pub(super) services: Arc<MemoryServices>,
    pub(super) repository: Arc<InMemoryAdoptionRepository>,
    pub(super) identity: Arc<InMemoryIdentityProvider>,
}

pub(super) fn build_services() -> Harness {
    build_services_with(WorkflowConfig::default())
}

pub(super) fn build_services_with(config: WorkflowConfig) -> Harness {
    let repository = Arc::new(InMemoryAdoptionRepository::default());
    let identity = Arc::new(InMemoryIdentityProvider::default());
    let services = Arc::new(AdoptionServices::new(
        repository.clone(),
        identity.clone(),
        config,
    ));
    Harness {
        services,
        repository,
        identity,
    }
}

pub(super) fn admin_session() -> Session {
    Session::new(UserId("admin-1".to_string()), UserRole::Admin)
}

pub(super) fn adopter_session(id: &str) -> Session {
    Session::new(UserId(id.to_string()), UserRole::Adopter)
}

pub(super) fn new_pet(name: &str) -> NewPet {
    NewPet {
        name: name.to_string(),
        breed: "Beagle".to_string(),
        pet_type: "Dog".to_string(),
        age: 3,
        gender: PetGender::Male,
        description: "Friendly and house-trained".to_string(),
        image_url: None,
    }
}

pub(super) fn new_application(session: &Session, name: &str) -> NewApplication {
    NewApplication {
        applicant_id: session.user_id.clone(),
        applicant_name: name.to_string(),
        message: "We have a fenced yard.".to_string(),
    }
}

pub(super) fn new_user(email: &str) -> NewUser {
    NewUser {
        username: email.split('@').next().unwrap_or("user").to_string(),
        first_name: "Ada".to_string(),
        last_name: "Lovelace".to_string(),
        email: email.to_string(),
        contact: "555-0100".to_string(),
        password: "hunter22".to_string(),
        profile_image_url: None,
    }
}

pub(super) fn credentials(email: &str) -> Credentials {
    Credentials {
        email: email.to_string(),
        password: "hunter22".to_string(),
    }
}

pub(super) async fn seed_pet(services: &MemoryServices, name: &str) -> Pet {
    services
        .pets
        .create_pet(&admin_session(), new_pet(name))
        .await
        .expect("admin can list pets")
}

pub(super) async fn submit(
    services: &MemoryServices,
    session: &Session,
    pet_id: &PetId,
) -> AdoptionApplication {
    services
        .workflow
        .submit_application(session, new_application(session, "Ada Lovelace"), pet_id)
        .await
        .expect("submission succeeds")
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}

/// Store that is always offline.
pub(super) struct UnavailableRepository {
    changes: broadcast::Sender<ChangeEvent>,
}

impl Default for UnavailableRepository {
    fn default() -> Self {
        let (changes, _) = broadcast::channel(1);
        Self { changes }
    }
}

fn offline() -> RepositoryError {
    RepositoryError::Unavailable("database offline".to_string())
}

#[async_trait]
impl AdoptionRepository for UnavailableRepository {
    async fn fetch_pet(&self, _id: &PetId) -> Result<Option<Versioned<Pet>>, RepositoryError> {
        Err(offline())
    }

    async fn list_pets(&self, _query: PetQuery) -> Result<Vec<Pet>, RepositoryError> {
        Err(offline())
    }

    async fn fetch_application(
        &self,
        _id: &ApplicationId,
    ) -> Result<Option<Versioned<AdoptionApplication>>, RepositoryError> {
        Err(offline())
    }

    async fn list_applications(
        &self,
        _filter: &ApplicationFilter,
    ) -> Result<Vec<AdoptionApplication>, RepositoryError> {
        Err(offline())
    }

    async fn fetch_user(
        &self,
        _id: &UserId,
    ) -> Result<Option<Versioned<UserAccount>>, RepositoryError> {
        Err(offline())
    }

    async fn commit(&self, _batch: WriteBatch) -> Result<CommitReceipt, RepositoryError> {
        Err(offline())
    }

    fn changes(&self) -> broadcast::Receiver<ChangeEvent> {
        self.changes.subscribe()
    }
}

/// Reads from a real store but loses every commit race.
#[derive(Default)]
pub(super) struct ContendedRepository {
    pub(super) inner: InMemoryAdoptionRepository,
    commits: AtomicU32,
}

impl ContendedRepository {
    pub(super) fn commit_attempts(&self) -> u32 {
        self.commits.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AdoptionRepository for ContendedRepository {
    async fn fetch_pet(&self, id: &PetId) -> Result<Option<Versioned<Pet>>, RepositoryError> {
        self.inner.fetch_pet(id).await
    }

    async fn list_pets(&self, query: PetQuery) -> Result<Vec<Pet>, RepositoryError> {
        self.inner.list_pets(query).await
    }

    async fn fetch_application(
        &self,
        id: &ApplicationId,
    ) -> Result<Option<Versioned<AdoptionApplication>>, RepositoryError> {
        self.inner.fetch_application(id).await
    }

    async fn list_applications(
        &self,
        filter: &ApplicationFilter,
    ) -> Result<Vec<AdoptionApplication>, RepositoryError> {
        self.inner.list_applications(filter).await
    }

    async fn fetch_user(
        &self,
        id: &UserId,
    ) -> Result<Option<Versioned<UserAccount>>, RepositoryError> {
        self.inner.fetch_user(id).await
    }

    async fn commit(&self, batch: WriteBatch) -> Result<CommitReceipt, RepositoryError> {
        self.commits.fetch_add(1, Ordering::SeqCst);
        let key = batch
            .writes()
            .first()
            .map(|write| write.key())
            .expect("batch has writes");
        Err(RepositoryError::Contention {
            collection: key.collection().name(),
            id: key.id().to_string(),
        })
    }

    fn changes(&self) -> broadcast::Receiver<ChangeEvent> {
        self.inner.changes()
    }
}

/// Store that lands one extra batch just ahead of the next commit, as another client would.
#[derive(Default)]
pub(super) struct InterleavedRepository {
    pub(super) inner: InMemoryAdoptionRepository,
    interleaved: Mutex<Option<WriteBatch>>,
}

impl InterleavedRepository {
    pub(super) fn interleave(&self, batch: WriteBatch) {
        *self.interleaved.lock().expect("interleave lock") = Some(batch);
    }
}

#[async_trait]
impl AdoptionRepository for InterleavedRepository {
    async fn fetch_pet(&self, id: &PetId) -> Result<Option<Versioned<Pet>>, RepositoryError> {
        self.inner.fetch_pet(id).await
    }

    async fn list_pets(&self, query: PetQuery) -> Result<Vec<Pet>, RepositoryError> {
        self.inner.list_pets(query).await
    }

    async fn fetch_application(
        &self,
        id: &ApplicationId,
    ) -> Result<Option<Versioned<AdoptionApplication>>, RepositoryError> {
        self.inner.fetch_application(id).await
    }

    async fn list_applications(
        &self,
        filter: &ApplicationFilter,
    ) -> Result<Vec<AdoptionApplication>, RepositoryError> {
        self.inner.list_applications(filter).await
    }

    async fn fetch_user(
        &self,
        id: &UserId,
    ) -> Result<Option<Versioned<UserAccount>>, RepositoryError> {
        self.inner.fetch_user(id).await
    }

    async fn commit(&self, batch: WriteBatch) -> Result<CommitReceipt, RepositoryError> {
        let pending = self.interleaved.lock().expect("interleave lock").take();
        if let Some(other) = pending {
            self.inner.commit(other).await?;
        }
        self.inner.commit(batch).await
    }

    fn changes(&self) -> broadcast::Receiver<ChangeEvent> {
        self.inner.changes()
    }
}

/// Identity provider whose deletes always fail.
#[derive(Default)]
pub(super) struct StickyIdentityProvider {
    pub(super) inner: InMemoryIdentityProvider,
}

#[async_trait]
impl IdentityProvider for StickyIdentityProvider {
    async fn register(&self, credentials: &Credentials) -> Result<UserId, IdentityError> {
        self.inner.register(credentials).await
    }

    async fn sign_in(&self, credentials: &Credentials) -> Result<AccessToken, IdentityError> {
        self.inner.sign_in(credentials).await
    }

    async fn verify(&self, token: &str) -> Result<UserId, IdentityError> {
        self.inner.verify(token).await
    }

    async fn sign_out(&self, token: &str) -> Result<(), IdentityError> {
        self.inner.sign_out(token).await
    }

    async fn send_password_reset(&self, email: &str) -> Result<(), IdentityError> {
        self.inner.send_password_reset(email).await
    }

    async fn delete(&self, _user_id: &UserId) -> Result<(), IdentityError> {
        Err(IdentityError::Unavailable("identity service timed out".to_string()))
    }
}
