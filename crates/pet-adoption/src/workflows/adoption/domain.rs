use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier wrapper for pet listings.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PetId(pub String);

impl PetId {
    pub fn generate() -> Self {
        Self(format!("pet-{}", Uuid::new_v4().simple()))
    }
}

/// Identifier wrapper for adoption applications.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ApplicationId(pub String);

impl ApplicationId {
    pub fn generate() -> Self {
        Self(format!("app-{}", Uuid::new_v4().simple()))
    }
}

/// Identifier issued by the identity provider; profile records reuse it as their key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub String);

impl UserId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

macro_rules! display_id {
    ($($id:ty),*) => {
        $(impl fmt::Display for $id {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        })*
    };
}

display_id!(PetId, ApplicationId, UserId);

/// Availability of a listed pet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PetStatus {
    Available,
    Pending,
    Adopted,
}

impl PetStatus {
    pub const fn label(self) -> &'static str {
        match self {
            PetStatus::Available => "AVAILABLE",
            PetStatus::Pending => "PENDING",
            PetStatus::Adopted => "ADOPTED",
        }
    }
}

impl fmt::Display for PetStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PetGender {
    Male,
    Female,
    Unknown,
}

/// An adoptable animal listed by an admin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pet {
    pub id: PetId,
    pub name: String,
    pub breed: String,
    pub pet_type: String,
    pub age: u8,
    pub gender: PetGender,
    pub description: String,
    pub image_url: Option<String>,
    pub status: PetStatus,
    /// Lister attribution; advisory only.
    pub listed_by: UserId,
    pub created_at: DateTime<Utc>,
}

/// Fields an admin supplies when listing a pet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewPet {
    pub name: String,
    pub breed: String,
    pub pet_type: String,
    pub age: u8,
    pub gender: PetGender,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub image_url: Option<String>,
}

impl NewPet {
    pub fn validate(&self) -> Result<(), ValidationError> {
        require("name", &self.name)?;
        require("breed", &self.breed)?;
        require("pet_type", &self.pet_type)?;
        Ok(())
    }

    pub(crate) fn into_pet(self, listed_by: UserId, created_at: DateTime<Utc>) -> Pet {
        Pet {
            id: PetId::generate(),
            name: self.name.trim().to_string(),
            breed: self.breed.trim().to_string(),
            pet_type: self.pet_type.trim().to_string(),
            age: self.age,
            gender: self.gender,
            description: self.description,
            image_url: self.image_url,
            status: PetStatus::Available,
            listed_by,
            created_at,
        }
    }
}

/// Partial edit of a listing. Status is owned by the adoption workflow and cannot be patched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PetPatch {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub breed: Option<String>,
    #[serde(default)]
    pub pet_type: Option<String>,
    #[serde(default)]
    pub age: Option<u8>,
    #[serde(default)]
    pub gender: Option<PetGender>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
}

impl PetPatch {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if let Some(name) = &self.name {
            require("name", name)?;
        }
        if let Some(breed) = &self.breed {
            require("breed", breed)?;
        }
        if let Some(pet_type) = &self.pet_type {
            require("pet_type", pet_type)?;
        }
        Ok(())
    }

    pub(crate) fn apply(&self, pet: &mut Pet) {
        if let Some(name) = &self.name {
            pet.name = name.trim().to_string();
        }
        if let Some(breed) = &self.breed {
            pet.breed = breed.trim().to_string();
        }
        if let Some(pet_type) = &self.pet_type {
            pet.pet_type = pet_type.trim().to_string();
        }
        if let Some(age) = self.age {
            pet.age = age;
        }
        if let Some(gender) = self.gender {
            pet.gender = gender;
        }
        if let Some(description) = &self.description {
            pet.description = description.clone();
        }
        if let Some(image_url) = &self.image_url {
            pet.image_url = Some(image_url.clone());
        }
    }
}

/// Lifecycle of an adoption application. APPROVED and REJECTED are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ApplicationStatus {
    Pending,
    Approved,
    Rejected,
}

impl ApplicationStatus {
    pub const fn label(self) -> &'static str {
        match self {
            ApplicationStatus::Pending => "PENDING",
            ApplicationStatus::Approved => "APPROVED",
            ApplicationStatus::Rejected => "REJECTED",
        }
    }

    pub const fn is_terminal(self) -> bool {
        matches!(self, ApplicationStatus::Approved | ApplicationStatus::Rejected)
    }
}

impl fmt::Display for ApplicationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A request by a user to adopt a specific pet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdoptionApplication {
    pub id: ApplicationId,
    pub pet_id: PetId,
    pub applicant_id: UserId,
    pub applicant_name: String,
    pub message: String,
    pub status: ApplicationStatus,
    /// Assigned by the store when the application is committed.
    pub submitted_at: DateTime<Utc>,
}

/// Applicant-supplied part of an application; the pet comes from the submission target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewApplication {
    pub applicant_id: UserId,
    pub applicant_name: String,
    #[serde(default)]
    pub message: String,
}

impl NewApplication {
    pub fn validate(&self) -> Result<(), ValidationError> {
        require("applicant_id", &self.applicant_id.0)?;
        require("applicant_name", &self.applicant_name)?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UserRole {
    Adopter,
    Admin,
}

/// Profile record kept alongside, but separate from, the authentication identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserAccount {
    pub id: UserId,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub contact: String,
    pub role: UserRole,
    pub profile_image_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserAccount {
    pub fn display_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_string()
    }
}

pub const MIN_PASSWORD_LENGTH: usize = 6;

/// Registration payload.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewUser {
    pub username: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    pub email: String,
    #[serde(default)]
    pub contact: String,
    pub password: String,
    #[serde(default)]
    pub profile_image_url: Option<String>,
}

impl fmt::Debug for NewUser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NewUser")
            .field("username", &self.username)
            .field("email", &self.email)
            .finish_non_exhaustive()
    }
}

impl NewUser {
    pub fn validate(&self) -> Result<(), ValidationError> {
        require("username", &self.username)?;
        validate_email(&self.email)?;
        validate_password(&self.password)?;
        Ok(())
    }

    pub fn credentials(&self) -> Credentials {
        Credentials {
            email: self.email.trim().to_ascii_lowercase(),
            password: self.password.clone(),
        }
    }

    pub(crate) fn into_account(
        self,
        id: UserId,
        role: UserRole,
        now: DateTime<Utc>,
    ) -> UserAccount {
        UserAccount {
            id,
            username: self.username.trim().to_string(),
            first_name: self.first_name.trim().to_string(),
            last_name: self.last_name.trim().to_string(),
            email: self.email.trim().to_ascii_lowercase(),
            contact: self.contact.trim().to_string(),
            role,
            profile_image_url: self.profile_image_url,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Self-service profile edit. Role and email stay fixed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserPatch {
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub contact: Option<String>,
    #[serde(default)]
    pub profile_image_url: Option<String>,
}

impl UserPatch {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if let Some(username) = &self.username {
            require("username", username)?;
        }
        Ok(())
    }

    pub(crate) fn apply(&self, account: &mut UserAccount, now: DateTime<Utc>) {
        if let Some(username) = &self.username {
            account.username = username.trim().to_string();
        }
        if let Some(first_name) = &self.first_name {
            account.first_name = first_name.trim().to_string();
        }
        if let Some(last_name) = &self.last_name {
            account.last_name = last_name.trim().to_string();
        }
        if let Some(contact) = &self.contact {
            account.contact = contact.trim().to_string();
        }
        if let Some(url) = &self.profile_image_url {
            account.profile_image_url = Some(url.clone());
        }
        account.updated_at = now;
    }
}

/// Email/password pair presented to the identity provider.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl Credentials {
    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_email(&self.email)?;
        require("password", &self.password)?;
        Ok(())
    }
}

/// Input rejected before any I/O.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("{field} is required")]
    MissingField { field: &'static str },
    #[error("'{email}' is not a valid email address")]
    InvalidEmail { email: String },
    #[error("password must be at least {minimum} characters")]
    PasswordTooShort { minimum: usize },
    #[error("applications can only be decided as APPROVED or REJECTED, not {status}")]
    NonTerminalDecision { status: ApplicationStatus },
}

fn require(field: &'static str, value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        Err(ValidationError::MissingField { field })
    } else {
        Ok(())
    }
}

pub(crate) fn validate_email(email: &str) -> Result<(), ValidationError> {
    let trimmed = email.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::MissingField { field: "email" });
    }
    let valid = match trimmed.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty() && domain.contains('.') && !domain.starts_with('.')
        }
        None => false,
    };
    if valid {
        Ok(())
    } else {
        Err(ValidationError::InvalidEmail {
            email: trimmed.to_string(),
        })
    }
}

fn validate_password(password: &str) -> Result<(), ValidationError> {
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        Err(ValidationError::PasswordTooShort {
            minimum: MIN_PASSWORD_LENGTH,
        })
    } else {
        Ok(())
    }
}
