use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::domain::{
    AdoptionApplication, ApplicationId, ApplicationStatus, Credentials, NewApplication, NewPet,
    NewUser, Pet, PetId, PetPatch, UserAccount, UserId, UserPatch, UserRole,
};
use super::identity::{IdentityError, IdentityProvider};
use super::repository::{AdoptionRepository, ApplicationFilter, PetQuery, RepositoryError};
use super::service::{AdoptionError, AdoptionServices};
use super::session::Session;

type SharedServices<R, I> = Arc<AdoptionServices<R, I>>;

/// Router builder exposing the pet catalog, adoption workflow, and account endpoints.
pub fn adoption_router<R, I>(services: SharedServices<R, I>) -> Router
where
    R: AdoptionRepository + 'static,
    I: IdentityProvider + 'static,
{
    Router::new()
        .route("/api/v1/users", post(register_handler::<R, I>))
        .route(
            "/api/v1/users/:user_id",
            get(get_user_handler::<R, I>)
                .patch(update_user_handler::<R, I>)
                .delete(delete_user_handler::<R, I>),
        )
        .route(
            "/api/v1/sessions",
            post(sign_in_handler::<R, I>).delete(sign_out_handler::<R, I>),
        )
        .route(
            "/api/v1/password-resets",
            post(password_reset_handler::<R, I>),
        )
        .route(
            "/api/v1/pets",
            get(list_pets_handler::<R, I>).post(create_pet_handler::<R, I>),
        )
        .route(
            "/api/v1/pets/:pet_id",
            get(get_pet_handler::<R, I>)
                .patch(update_pet_handler::<R, I>)
                .delete(delete_pet_handler::<R, I>),
        )
        .route(
            "/api/v1/pets/:pet_id/applications",
            post(submit_handler::<R, I>),
        )
        .route(
            "/api/v1/applications",
            get(list_applications_handler::<R, I>),
        )
        .route(
            "/api/v1/applications/:application_id",
            get(get_application_handler::<R, I>),
        )
        .route(
            "/api/v1/applications/:application_id/status",
            put(decide_handler::<R, I>),
        )
        .with_state(services)
}

impl IntoResponse for AdoptionError {
    fn into_response(self) -> Response {
        let status = match &self {
            AdoptionError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AdoptionError::PetNotFound(_)
            | AdoptionError::ApplicationNotFound(_)
            | AdoptionError::UserNotFound(_)
            | AdoptionError::Repository(RepositoryError::NotFound { .. })
            | AdoptionError::Identity(IdentityError::UnknownUser(_)) => StatusCode::NOT_FOUND,
            AdoptionError::PetUnavailable { .. }
            | AdoptionError::ApplicationFinalized { .. }
            | AdoptionError::Repository(RepositoryError::Conflict { .. })
            | AdoptionError::Repository(RepositoryError::Contention { .. })
            | AdoptionError::Identity(IdentityError::EmailInUse) => StatusCode::CONFLICT,
            AdoptionError::Unauthenticated
            | AdoptionError::Identity(IdentityError::InvalidCredentials)
            | AdoptionError::Identity(IdentityError::InvalidToken) => StatusCode::UNAUTHORIZED,
            AdoptionError::Forbidden { .. } => StatusCode::FORBIDDEN,
            AdoptionError::RetryExhausted { .. }
            | AdoptionError::Repository(RepositoryError::Unavailable(_))
            | AdoptionError::Identity(IdentityError::Unavailable(_)) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
        };

        let payload = json!({
            "error": self.to_string(),
            "code": self.code(),
        });
        (status, Json(payload)).into_response()
    }
}

async fn session_from<R, I>(
    services: &AdoptionServices<R, I>,
    headers: &HeaderMap,
) -> Result<Session, AdoptionError>
where
    R: AdoptionRepository + 'static,
    I: IdentityProvider + 'static,
{
    let token = bearer_token(headers).ok_or(AdoptionError::Unauthenticated)?;
    services.accounts.authenticate(token).await
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

#[derive(Debug, Serialize)]
pub(crate) struct SessionView {
    pub(crate) token: String,
    pub(crate) user_id: UserId,
    pub(crate) role: UserRole,
}

#[derive(Debug, Deserialize)]
pub(crate) struct PasswordResetRequest {
    pub(crate) email: String,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct ApplicationListQuery {
    #[serde(default)]
    pub(crate) applicant: Option<UserId>,
    #[serde(default)]
    pub(crate) pet: Option<PetId>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct StatusUpdate {
    pub(crate) status: ApplicationStatus,
}

pub(crate) async fn register_handler<R, I>(
    State(services): State<SharedServices<R, I>>,
    Json(new_user): Json<NewUser>,
) -> Result<(StatusCode, Json<UserAccount>), AdoptionError>
where
    R: AdoptionRepository + 'static,
    I: IdentityProvider + 'static,
{
    let account = services.accounts.register(new_user).await?;
    Ok((StatusCode::CREATED, Json(account)))
}

pub(crate) async fn sign_in_handler<R, I>(
    State(services): State<SharedServices<R, I>>,
    Json(credentials): Json<Credentials>,
) -> Result<Json<SessionView>, AdoptionError>
where
    R: AdoptionRepository + 'static,
    I: IdentityProvider + 'static,
{
    let (token, session) = services.accounts.sign_in(credentials).await?;
    Ok(Json(SessionView {
        token: token.token,
        user_id: session.user_id,
        role: session.role,
    }))
}

pub(crate) async fn sign_out_handler<R, I>(
    State(services): State<SharedServices<R, I>>,
    headers: HeaderMap,
) -> Result<StatusCode, AdoptionError>
where
    R: AdoptionRepository + 'static,
    I: IdentityProvider + 'static,
{
    let token = bearer_token(&headers).ok_or(AdoptionError::Unauthenticated)?;
    services.accounts.sign_out(token).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub(crate) async fn password_reset_handler<R, I>(
    State(services): State<SharedServices<R, I>>,
    Json(request): Json<PasswordResetRequest>,
) -> Result<StatusCode, AdoptionError>
where
    R: AdoptionRepository + 'static,
    I: IdentityProvider + 'static,
{
    services
        .accounts
        .request_password_reset(&request.email)
        .await?;
    Ok(StatusCode::ACCEPTED)
}

pub(crate) async fn get_user_handler<R, I>(
    State(services): State<SharedServices<R, I>>,
    Path(user_id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<UserAccount>, AdoptionError>
where
    R: AdoptionRepository + 'static,
    I: IdentityProvider + 'static,
{
    let session = session_from(&services, &headers).await?;
    let account = services
        .accounts
        .get_profile(&session, &UserId(user_id))
        .await?;
    Ok(Json(account))
}

pub(crate) async fn update_user_handler<R, I>(
    State(services): State<SharedServices<R, I>>,
    Path(user_id): Path<String>,
    headers: HeaderMap,
    Json(patch): Json<UserPatch>,
) -> Result<Json<UserAccount>, AdoptionError>
where
    R: AdoptionRepository + 'static,
    I: IdentityProvider + 'static,
{
    let session = session_from(&services, &headers).await?;
    let account = services
        .accounts
        .update_profile(&session, &UserId(user_id), patch)
        .await?;
    Ok(Json(account))
}

pub(crate) async fn delete_user_handler<R, I>(
    State(services): State<SharedServices<R, I>>,
    Path(user_id): Path<String>,
    headers: HeaderMap,
) -> Result<StatusCode, AdoptionError>
where
    R: AdoptionRepository + 'static,
    I: IdentityProvider + 'static,
{
    let session = session_from(&services, &headers).await?;
    services
        .accounts
        .delete_account(&session, &UserId(user_id))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub(crate) async fn list_pets_handler<R, I>(
    State(services): State<SharedServices<R, I>>,
    Query(query): Query<PetQuery>,
) -> Result<Json<Vec<Pet>>, AdoptionError>
where
    R: AdoptionRepository + 'static,
    I: IdentityProvider + 'static,
{
    Ok(Json(services.pets.list_pets(query).await?))
}

pub(crate) async fn create_pet_handler<R, I>(
    State(services): State<SharedServices<R, I>>,
    headers: HeaderMap,
    Json(new_pet): Json<NewPet>,
) -> Result<(StatusCode, Json<Pet>), AdoptionError>
where
    R: AdoptionRepository + 'static,
    I: IdentityProvider + 'static,
{
    let session = session_from(&services, &headers).await?;
    let pet = services.pets.create_pet(&session, new_pet).await?;
    Ok((StatusCode::CREATED, Json(pet)))
}

pub(crate) async fn get_pet_handler<R, I>(
    State(services): State<SharedServices<R, I>>,
    Path(pet_id): Path<String>,
) -> Result<Json<Pet>, AdoptionError>
where
    R: AdoptionRepository + 'static,
    I: IdentityProvider + 'static,
{
    Ok(Json(services.pets.get_pet(&PetId(pet_id)).await?))
}

pub(crate) async fn update_pet_handler<R, I>(
    State(services): State<SharedServices<R, I>>,
    Path(pet_id): Path<String>,
    headers: HeaderMap,
    Json(patch): Json<PetPatch>,
) -> Result<Json<Pet>, AdoptionError>
where
    R: AdoptionRepository + 'static,
    I: IdentityProvider + 'static,
{
    let session = session_from(&services, &headers).await?;
    let pet = services
        .pets
        .update_pet(&session, &PetId(pet_id), patch)
        .await?;
    Ok(Json(pet))
}

pub(crate) async fn delete_pet_handler<R, I>(
    State(services): State<SharedServices<R, I>>,
    Path(pet_id): Path<String>,
    headers: HeaderMap,
) -> Result<StatusCode, AdoptionError>
where
    R: AdoptionRepository + 'static,
    I: IdentityProvider + 'static,
{
    let session = session_from(&services, &headers).await?;
    services.pets.delete_pet(&session, &PetId(pet_id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub(crate) async fn submit_handler<R, I>(
    State(services): State<SharedServices<R, I>>,
    Path(pet_id): Path<String>,
    headers: HeaderMap,
    Json(application): Json<NewApplication>,
) -> Result<(StatusCode, Json<AdoptionApplication>), AdoptionError>
where
    R: AdoptionRepository + 'static,
    I: IdentityProvider + 'static,
{
    let session = session_from(&services, &headers).await?;
    let record = services
        .workflow
        .submit_application(&session, application, &PetId(pet_id))
        .await?;
    Ok((StatusCode::CREATED, Json(record)))
}

pub(crate) async fn list_applications_handler<R, I>(
    State(services): State<SharedServices<R, I>>,
    Query(query): Query<ApplicationListQuery>,
    headers: HeaderMap,
) -> Result<Json<Vec<AdoptionApplication>>, AdoptionError>
where
    R: AdoptionRepository + 'static,
    I: IdentityProvider + 'static,
{
    let session = session_from(&services, &headers).await?;
    let filter = match (query.applicant, query.pet) {
        (Some(applicant), _) => ApplicationFilter::Applicant(applicant),
        (None, Some(pet)) => ApplicationFilter::Pet(pet),
        (None, None) if session.is_admin() => ApplicationFilter::All,
        (None, None) => ApplicationFilter::Applicant(session.user_id.clone()),
    };
    let applications = services
        .workflow
        .list_applications(&session, filter)
        .await?;
    Ok(Json(applications))
}

pub(crate) async fn get_application_handler<R, I>(
    State(services): State<SharedServices<R, I>>,
    Path(application_id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<AdoptionApplication>, AdoptionError>
where
    R: AdoptionRepository + 'static,
    I: IdentityProvider + 'static,
{
    let session = session_from(&services, &headers).await?;
    let application = services
        .workflow
        .get_application(&session, &ApplicationId(application_id))
        .await?;
    Ok(Json(application))
}

pub(crate) async fn decide_handler<R, I>(
    State(services): State<SharedServices<R, I>>,
    Path(application_id): Path<String>,
    headers: HeaderMap,
    Json(update): Json<StatusUpdate>,
) -> Result<Json<AdoptionApplication>, AdoptionError>
where
    R: AdoptionRepository + 'static,
    I: IdentityProvider + 'static,
{
    let session = session_from(&services, &headers).await?;
    let application = services
        .workflow
        .update_application_status(&session, &ApplicationId(application_id), update.status)
        .await?;
    Ok(Json(application))
}
