use metrics_exporter_prometheus::PrometheusHandle;
use pet_adoption::config::{AdminBootstrap, WorkflowConfig};
use pet_adoption::workflows::adoption::{
    AdoptionError, AdoptionServices, InMemoryAdoptionRepository, InMemoryIdentityProvider,
    NewUser, UserAccount,
};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

pub(crate) type MemoryServices =
    AdoptionServices<InMemoryAdoptionRepository, InMemoryIdentityProvider>;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// Services backed by the process-local store and identity provider.
pub(crate) fn in_memory_services(config: WorkflowConfig) -> Arc<MemoryServices> {
    Arc::new(AdoptionServices::new(
        Arc::new(InMemoryAdoptionRepository::default()),
        Arc::new(InMemoryIdentityProvider::default()),
        config,
    ))
}

pub(crate) async fn bootstrap_admin(
    services: &MemoryServices,
    admin: &AdminBootstrap,
) -> Result<UserAccount, AdoptionError> {
    let username = admin
        .email
        .split('@')
        .next()
        .filter(|local| !local.is_empty())
        .unwrap_or("admin")
        .to_string();

    services
        .accounts
        .bootstrap_admin(NewUser {
            username,
            first_name: "Shelter".to_string(),
            last_name: "Admin".to_string(),
            email: admin.email.clone(),
            contact: String::new(),
            password: admin.password.clone(),
            profile_image_url: None,
        })
        .await
}
