use std::sync::Arc;
use std::time::Duration;

use super::common::*;
use crate::config::{RejectionPolicy, WorkflowConfig};
use crate::workflows::adoption::domain::{ApplicationStatus, PetId, PetStatus, ValidationError};
use crate::workflows::adoption::identity::InMemoryIdentityProvider;
use crate::workflows::adoption::memory::InMemoryAdoptionRepository;
use crate::workflows::adoption::repository::{
    AdoptionRepository, ApplicationFilter, DocumentKey, Precondition, WriteBatch,
};
use crate::workflows::adoption::{AdoptionError, AdoptionServices, AdoptionWorkflow};

#[tokio::test]
async fn submit_marks_pet_pending_and_records_application() {
    let harness = build_services();
    let pet = seed_pet(&harness.services, "Biscuit").await;
    let adopter = adopter_session("user-ada");

    let application = submit(&harness.services, &adopter, &pet.id).await;

    assert_eq!(application.status, ApplicationStatus::Pending);
    assert_eq!(application.pet_id, pet.id);
    assert_eq!(application.applicant_id, adopter.user_id);

    let stored_pet = harness
        .repository
        .fetch_pet(&pet.id)
        .await
        .expect("read pet")
        .expect("pet exists");
    assert_eq!(stored_pet.value.status, PetStatus::Pending);

    let stored = harness
        .repository
        .fetch_application(&application.id)
        .await
        .expect("read application")
        .expect("application exists");
    assert_eq!(stored.value.submitted_at, application.submitted_at);
}

#[tokio::test]
async fn second_submission_sees_pet_unavailable() {
    let harness = build_services();
    let pet = seed_pet(&harness.services, "Biscuit").await;
    submit(&harness.services, &adopter_session("user-ada"), &pet.id).await;

    let late = adopter_session("user-grace");
    let error = harness
        .services
        .workflow
        .submit_application(&late, new_application(&late, "Grace Hopper"), &pet.id)
        .await
        .expect_err("pet already pending");

    assert!(error.is_unavailable_pet());
    match error {
        AdoptionError::PetUnavailable { pet_id, status } => {
            assert_eq!(pet_id, pet.id);
            assert_eq!(status, PetStatus::Pending);
        }
        other => panic!("expected unavailable pet, got {other:?}"),
    }

    let applications = harness
        .repository
        .list_applications(&ApplicationFilter::Pet(pet.id.clone()))
        .await
        .expect("list");
    assert_eq!(applications.len(), 1, "loser leaves no application behind");
}

#[tokio::test]
async fn submit_for_unknown_pet_is_not_found() {
    let harness = build_services();
    let adopter = adopter_session("user-ada");

    let error = harness
        .services
        .workflow
        .submit_application(
            &adopter,
            new_application(&adopter, "Ada"),
            &PetId("pet-missing".to_string()),
        )
        .await
        .expect_err("no such pet");

    assert!(matches!(error, AdoptionError::PetNotFound(_)));
}

#[tokio::test]
async fn submit_requires_applicant_name() {
    let harness = build_services();
    let pet = seed_pet(&harness.services, "Biscuit").await;
    let adopter = adopter_session("user-ada");

    let error = harness
        .services
        .workflow
        .submit_application(&adopter, new_application(&adopter, "   "), &pet.id)
        .await
        .expect_err("name is required");

    assert!(matches!(
        error,
        AdoptionError::Validation(ValidationError::MissingField {
            field: "applicant_name"
        })
    ));
}

#[tokio::test]
async fn adopters_cannot_apply_on_behalf_of_others() {
    let harness = build_services();
    let pet = seed_pet(&harness.services, "Biscuit").await;
    let adopter = adopter_session("user-ada");
    let someone_else = adopter_session("user-grace");

    let error = harness
        .services
        .workflow
        .submit_application(
            &adopter,
            new_application(&someone_else, "Grace"),
            &pet.id,
        )
        .await
        .expect_err("forbidden");

    assert!(matches!(error, AdoptionError::Forbidden { .. }));
}

#[tokio::test]
async fn approval_adopts_the_pet() {
    let harness = build_services();
    let pet = seed_pet(&harness.services, "Biscuit").await;
    let application = submit(&harness.services, &adopter_session("user-ada"), &pet.id).await;

    let decided = harness
        .services
        .workflow
        .update_application_status(&admin_session(), &application.id, ApplicationStatus::Approved)
        .await
        .expect("approve");

    assert_eq!(decided.status, ApplicationStatus::Approved);
    let pet = harness.services.pets.get_pet(&pet.id).await.expect("pet");
    assert_eq!(pet.status, PetStatus::Adopted);
}

#[tokio::test]
async fn decided_applications_are_final() {
    let harness = build_services();
    let pet = seed_pet(&harness.services, "Biscuit").await;
    let application = submit(&harness.services, &adopter_session("user-ada"), &pet.id).await;
    let admin = admin_session();

    harness
        .services
        .workflow
        .update_application_status(&admin, &application.id, ApplicationStatus::Rejected)
        .await
        .expect("reject");

    let error = harness
        .services
        .workflow
        .update_application_status(&admin, &application.id, ApplicationStatus::Approved)
        .await
        .expect_err("rejected applications stay rejected");

    match error {
        AdoptionError::ApplicationFinalized { status, .. } => {
            assert_eq!(status, ApplicationStatus::Rejected)
        }
        other => panic!("expected finalized application, got {other:?}"),
    }
    let pet = harness.services.pets.get_pet(&pet.id).await.expect("pet");
    assert_ne!(pet.status, PetStatus::Adopted);
}

#[tokio::test]
async fn pending_is_not_a_decision() {
    let harness = build_services();
    let pet = seed_pet(&harness.services, "Biscuit").await;
    let application = submit(&harness.services, &adopter_session("user-ada"), &pet.id).await;

    let error = harness
        .services
        .workflow
        .update_application_status(&admin_session(), &application.id, ApplicationStatus::Pending)
        .await
        .expect_err("pending is not terminal");

    assert!(matches!(
        error,
        AdoptionError::Validation(ValidationError::NonTerminalDecision { .. })
    ));
}

#[tokio::test]
async fn adopters_cannot_decide() {
    let harness = build_services();
    let pet = seed_pet(&harness.services, "Biscuit").await;
    let adopter = adopter_session("user-ada");
    let application = submit(&harness.services, &adopter, &pet.id).await;

    let error = harness
        .services
        .workflow
        .update_application_status(&adopter, &application.id, ApplicationStatus::Approved)
        .await
        .expect_err("admin only");

    assert!(matches!(error, AdoptionError::Forbidden { .. }));
}

#[tokio::test]
async fn deciding_unknown_application_is_not_found() {
    let harness = build_services();

    let error = harness
        .services
        .workflow
        .update_application_status(
            &admin_session(),
            &crate::workflows::adoption::ApplicationId("app-missing".to_string()),
            ApplicationStatus::Approved,
        )
        .await
        .expect_err("missing");

    assert!(matches!(error, AdoptionError::ApplicationNotFound(_)));
}

#[tokio::test]
async fn rejection_keeps_pet_pending_by_default() {
    let harness = build_services();
    let pet = seed_pet(&harness.services, "Biscuit").await;
    let application = submit(&harness.services, &adopter_session("user-ada"), &pet.id).await;

    harness
        .services
        .workflow
        .update_application_status(&admin_session(), &application.id, ApplicationStatus::Rejected)
        .await
        .expect("reject");

    let pet = harness.services.pets.get_pet(&pet.id).await.expect("pet");
    assert_eq!(pet.status, PetStatus::Pending);
}

#[tokio::test]
async fn rejection_releases_pet_under_release_policy() {
    let harness = build_services_with(WorkflowConfig {
        rejection_policy: RejectionPolicy::ReleasePet,
        ..WorkflowConfig::default()
    });
    let pet = seed_pet(&harness.services, "Biscuit").await;
    let application = submit(&harness.services, &adopter_session("user-ada"), &pet.id).await;

    harness
        .services
        .workflow
        .update_application_status(&admin_session(), &application.id, ApplicationStatus::Rejected)
        .await
        .expect("reject");

    let released = harness.services.pets.get_pet(&pet.id).await.expect("pet");
    assert_eq!(released.status, PetStatus::Available);

    let second = submit(&harness.services, &adopter_session("user-grace"), &pet.id).await;
    assert_eq!(second.status, ApplicationStatus::Pending);
}

#[tokio::test]
async fn contended_submissions_give_up_after_configured_attempts() {
    let repository = Arc::new(ContendedRepository::default());
    let config = WorkflowConfig {
        max_transaction_attempts: 3,
        ..WorkflowConfig::default()
    };
    let pet = new_pet("Biscuit").into_pet(admin_session().user_id, chrono::Utc::now());
    repository
        .inner
        .commit(crate::workflows::adoption::WriteBatch::new().put(
            crate::workflows::adoption::Document::Pet(pet.clone()),
            crate::workflows::adoption::Precondition::Absent,
        ))
        .await
        .expect("seed pet");

    let workflow = AdoptionWorkflow::new(repository.clone(), config);
    let adopter = adopter_session("user-ada");
    let error = workflow
        .submit_application(&adopter, new_application(&adopter, "Ada"), &pet.id)
        .await
        .expect_err("never commits");

    assert!(matches!(
        error,
        AdoptionError::RetryExhausted {
            operation: "submit_application",
            attempts: 3
        }
    ));
    assert_eq!(repository.commit_attempts(), 3);
}

#[tokio::test]
async fn get_application_hides_other_applicants_records() {
    let harness = build_services();
    let pet = seed_pet(&harness.services, "Biscuit").await;
    let application = submit(&harness.services, &adopter_session("user-ada"), &pet.id).await;

    let error = harness
        .services
        .workflow
        .get_application(&adopter_session("user-grace"), &application.id)
        .await
        .expect_err("not theirs");
    assert!(matches!(error, AdoptionError::Forbidden { .. }));

    let seen = harness
        .services
        .workflow
        .get_application(&admin_session(), &application.id)
        .await
        .expect("admins see everything");
    assert_eq!(seen, application);
}

#[tokio::test]
async fn listing_all_applications_requires_admin() {
    let harness = build_services();

    let error = harness
        .services
        .workflow
        .list_applications(&adopter_session("user-ada"), ApplicationFilter::All)
        .await
        .expect_err("admin only");
    assert!(matches!(error, AdoptionError::Forbidden { .. }));

    let error = harness
        .services
        .workflow
        .all_applications(&adopter_session("user-ada"))
        .await
        .err()
        .expect("admin only subscription");
    assert!(matches!(error, AdoptionError::Forbidden { .. }));
}

#[tokio::test]
async fn subscriptions_deliver_initial_set_then_updates() {
    let harness = build_services();
    let pet = seed_pet(&harness.services, "Biscuit").await;
    let ada = adopter_session("user-ada");

    let mut subscription = harness
        .services
        .workflow
        .applications_for_user(&ada, &ada.user_id)
        .await
        .expect("subscribe");
    let initial = subscription
        .next()
        .await
        .expect("initial delivery")
        .expect("query succeeds");
    assert!(initial.is_empty());

    let application = submit(&harness.services, &ada, &pet.id).await;

    let update = tokio::time::timeout(Duration::from_secs(2), subscription.next())
        .await
        .expect("update arrives")
        .expect("subscription open")
        .expect("query succeeds");
    assert_eq!(update.len(), 1);
    assert_eq!(update[0].id, application.id);
    assert!(subscription.is_active());

    subscription.cancel();
}

#[tokio::test]
async fn applicant_subscriptions_only_carry_their_records() {
    let harness = build_services();
    let first = seed_pet(&harness.services, "Biscuit").await;
    let second = seed_pet(&harness.services, "Mochi").await;
    let ada = adopter_session("user-ada");
    let grace = adopter_session("user-grace");

    let mut subscription = harness
        .services
        .workflow
        .applications_for_user(&ada, &ada.user_id)
        .await
        .expect("subscribe");
    let _initial = subscription.next().await.expect("initial");

    submit(&harness.services, &grace, &first.id).await;
    let mine = submit(&harness.services, &ada, &second.id).await;

    let mut latest = Vec::new();
    while latest.is_empty() {
        latest = tokio::time::timeout(Duration::from_secs(2), subscription.next())
            .await
            .expect("update arrives")
            .expect("subscription open")
            .expect("query succeeds");
    }
    assert!(latest.iter().all(|application| application.applicant_id == ada.user_id));
    assert_eq!(latest[0].id, mine.id);
}

#[tokio::test]
async fn decisions_go_through_when_the_pet_is_removed_in_between() {
    let repository = Arc::new(InterleavedRepository::default());
    let services = AdoptionServices::new(
        repository.clone(),
        Arc::new(InMemoryIdentityProvider::default()),
        WorkflowConfig::default(),
    );
    let pet = services
        .pets
        .create_pet(&admin_session(), new_pet("Biscuit"))
        .await
        .expect("listed");
    let ada = adopter_session("user-ada");
    let application = services
        .workflow
        .submit_application(&ada, new_application(&ada, "Ada Lovelace"), &pet.id)
        .await
        .expect("submitted");

    repository.interleave(
        WriteBatch::new().delete(DocumentKey::Pet(pet.id.clone()), Precondition::Exists),
    );
    let decided = services
        .workflow
        .update_application_status(&admin_session(), &application.id, ApplicationStatus::Approved)
        .await
        .expect("decided without the pet");

    assert_eq!(decided.status, ApplicationStatus::Approved);
    assert!(repository.fetch_pet(&pet.id).await.expect("read").is_none());
    let stored = repository
        .fetch_application(&application.id)
        .await
        .expect("read")
        .expect("application kept");
    assert_eq!(stored.value.status, ApplicationStatus::Approved);
}

async fn wait_for_release(repository: &Arc<InMemoryAdoptionRepository>, baseline: usize) {
    for _ in 0..100 {
        if Arc::strong_count(repository) == baseline {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!(
        "listener still holds the store ({} references, expected {baseline})",
        Arc::strong_count(repository)
    );
}

#[tokio::test]
async fn cancelled_and_dropped_subscriptions_release_the_store() {
    let harness = build_services();
    let ada = adopter_session("user-ada");
    let baseline = Arc::strong_count(&harness.repository);

    let subscription = harness
        .services
        .workflow
        .applications_for_user(&ada, &ada.user_id)
        .await
        .expect("subscribe");
    assert_eq!(Arc::strong_count(&harness.repository), baseline + 1);
    subscription.cancel();
    wait_for_release(&harness.repository, baseline).await;

    let subscription = harness
        .services
        .workflow
        .applications_for_user(&ada, &ada.user_id)
        .await
        .expect("subscribe again");
    assert_eq!(Arc::strong_count(&harness.repository), baseline + 1);
    drop(subscription);
    wait_for_release(&harness.repository, baseline).await;
}

#[tokio::test]
async fn lagging_subscribers_catch_up_with_the_full_result_set() {
    let repository = Arc::new(InMemoryAdoptionRepository::with_change_capacity(1));
    let services = AdoptionServices::new(
        repository,
        Arc::new(InMemoryIdentityProvider::default()),
        WorkflowConfig::default(),
    );
    let mut pets = Vec::new();
    for name in ["Biscuit", "Mochi", "Pepper", "Juniper", "Olive"] {
        pets.push(seed_pet(&services, name).await);
    }

    let mut subscription = services
        .workflow
        .all_applications(&admin_session())
        .await
        .expect("subscribe");
    let _initial = subscription.next().await.expect("initial");

    for (index, pet) in pets.iter().enumerate() {
        submit(&services, &adopter_session(&format!("user-{index}")), &pet.id).await;
    }

    let mut latest = Vec::new();
    while latest.len() < pets.len() {
        latest = tokio::time::timeout(Duration::from_secs(2), subscription.next())
            .await
            .expect("update arrives")
            .expect("subscription open")
            .expect("query succeeds");
    }
    assert_eq!(latest.len(), pets.len());
}
