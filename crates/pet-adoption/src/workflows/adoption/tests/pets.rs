use super::common::*;
use crate::workflows::adoption::domain::{PetId, PetPatch, PetStatus, ValidationError};
use crate::workflows::adoption::repository::PetQuery;
use crate::workflows::adoption::AdoptionError;

#[tokio::test]
async fn admins_list_pets_as_available() {
    let harness = build_services();
    let admin = admin_session();

    let pet = harness
        .services
        .pets
        .create_pet(&admin, new_pet("  Biscuit "))
        .await
        .expect("created");

    assert_eq!(pet.name, "Biscuit");
    assert_eq!(pet.status, PetStatus::Available);
    assert_eq!(pet.listed_by, admin.user_id);
    assert!(pet.id.0.starts_with("pet-"));
}

#[tokio::test]
async fn adopters_cannot_list_pets() {
    let harness = build_services();

    let error = harness
        .services
        .pets
        .create_pet(&adopter_session("user-ada"), new_pet("Biscuit"))
        .await
        .expect_err("admin only");

    assert!(matches!(error, AdoptionError::Forbidden { .. }));
}

#[tokio::test]
async fn listing_requires_a_name() {
    let harness = build_services();

    let error = harness
        .services
        .pets
        .create_pet(&admin_session(), new_pet(""))
        .await
        .expect_err("name required");

    assert!(matches!(
        error,
        AdoptionError::Validation(ValidationError::MissingField { field: "name" })
    ));
}

#[tokio::test]
async fn list_pets_filters_by_status() {
    let harness = build_services();
    let taken = seed_pet(&harness.services, "Biscuit").await;
    let free = seed_pet(&harness.services, "Mochi").await;
    submit(&harness.services, &adopter_session("user-ada"), &taken.id).await;

    let available = harness
        .services
        .pets
        .list_pets(PetQuery {
            status: Some(PetStatus::Available),
        })
        .await
        .expect("list");
    assert_eq!(available.len(), 1);
    assert_eq!(available[0].id, free.id);

    let everything = harness
        .services
        .pets
        .list_pets(PetQuery::default())
        .await
        .expect("list");
    assert_eq!(everything.len(), 2);
}

#[tokio::test]
async fn edits_leave_workflow_status_alone() {
    let harness = build_services();
    let pet = seed_pet(&harness.services, "Biscuit").await;
    submit(&harness.services, &adopter_session("user-ada"), &pet.id).await;

    let edited = harness
        .services
        .pets
        .update_pet(
            &admin_session(),
            &pet.id,
            PetPatch {
                description: Some("Loves long walks".to_string()),
                age: Some(4),
                ..PetPatch::default()
            },
        )
        .await
        .expect("edited");

    assert_eq!(edited.description, "Loves long walks");
    assert_eq!(edited.age, 4);
    assert_eq!(edited.status, PetStatus::Pending);
}

#[tokio::test]
async fn missing_pets_are_not_found() {
    let harness = build_services();
    let missing = PetId("pet-missing".to_string());

    let error = harness.services.pets.get_pet(&missing).await.expect_err("missing");
    assert!(matches!(error, AdoptionError::PetNotFound(_)));

    let error = harness
        .services
        .pets
        .update_pet(&admin_session(), &missing, PetPatch::default())
        .await
        .expect_err("missing");
    assert!(matches!(error, AdoptionError::PetNotFound(_)));

    let error = harness
        .services
        .pets
        .delete_pet(&admin_session(), &missing)
        .await
        .expect_err("missing");
    assert!(matches!(error, AdoptionError::PetNotFound(_)));
}

#[tokio::test]
async fn deleting_a_pet_keeps_its_applications() {
    let harness = build_services();
    let pet = seed_pet(&harness.services, "Biscuit").await;
    let application = submit(&harness.services, &adopter_session("user-ada"), &pet.id).await;

    harness
        .services
        .pets
        .delete_pet(&admin_session(), &pet.id)
        .await
        .expect("deleted");

    let kept = harness
        .services
        .workflow
        .get_application(&admin_session(), &application.id)
        .await
        .expect("history kept");
    assert_eq!(kept.pet_id, pet.id);

    let decided = harness
        .services
        .workflow
        .update_application_status(
            &admin_session(),
            &application.id,
            crate::workflows::adoption::ApplicationStatus::Approved,
        )
        .await
        .expect("decision still recorded");
    assert_eq!(
        decided.status,
        crate::workflows::adoption::ApplicationStatus::Approved
    );
}
