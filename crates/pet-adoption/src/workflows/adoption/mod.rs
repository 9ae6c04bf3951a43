//! Pet listings, adoption applications, and the user accounts that drive them.
//!
//! All state lives behind [`AdoptionRepository`]. Multi-document changes go through a single
//! guarded [`WriteBatch`] so a pet and the applications that reference it never disagree.

pub mod accounts;
pub mod domain;
pub mod identity;
pub mod memory;
pub mod pets;
pub mod repository;
pub mod router;
pub mod service;
pub mod session;
pub mod subscription;
pub(crate) mod transaction;
pub mod workflow;

#[cfg(test)]
mod tests;

pub use accounts::AccountService;
pub use domain::{
    AdoptionApplication, ApplicationId, ApplicationStatus, Credentials, NewApplication, NewPet,
    NewUser, Pet, PetGender, PetId, PetPatch, PetStatus, UserAccount, UserId, UserPatch,
    UserRole, ValidationError,
};
pub use identity::{AccessToken, IdentityError, IdentityProvider, InMemoryIdentityProvider};
pub use memory::InMemoryAdoptionRepository;
pub use pets::PetCatalog;
pub use repository::{
    AdoptionRepository, ApplicationFilter, ChangeEvent, ChangeKind, Collection, CommitReceipt,
    Document, DocumentKey, PetQuery, Precondition, RepositoryError, Versioned, Write,
    WriteBatch,
};
pub use router::adoption_router;
pub use service::{AdoptionError, AdoptionServices};
pub use session::Session;
pub use subscription::{ApplicationSnapshot, ApplicationSubscription};
pub use workflow::AdoptionWorkflow;
