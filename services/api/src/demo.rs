use crate::infra::{bootstrap_admin, in_memory_services, MemoryServices};
use clap::Args;
use pet_adoption::config::{AdminBootstrap, RejectionPolicy, WorkflowConfig};
use pet_adoption::error::AppError;
use pet_adoption::workflows::adoption::{
    AdoptionApplication, AdoptionError, ApplicationStatus, Credentials, NewApplication, NewPet,
    NewUser, Pet, PetGender, PetQuery, PetStatus, Session,
};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::warn;

const DEMO_PASSWORD: &str = "adopt-me-please";

type Attempt = (String, Result<AdoptionApplication, AdoptionError>);

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// How many adopters race for the first pet.
    #[arg(long, default_value_t = 3)]
    pub(crate) applicants: usize,
    /// Return rejected pets to the catalog instead of leaving them pending.
    #[arg(long)]
    pub(crate) release_rejected: bool,
}

pub(crate) async fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let config = WorkflowConfig {
        rejection_policy: if args.release_rejected {
            RejectionPolicy::ReleasePet
        } else {
            RejectionPolicy::KeepPending
        },
        ..WorkflowConfig::default()
    };
    let services = in_memory_services(config);

    println!("Pet Adoption Walkthrough");
    println!("========================");

    bootstrap_admin(
        &services,
        &AdminBootstrap {
            email: "admin@shelter.test".to_string(),
            password: DEMO_PASSWORD.to_string(),
        },
    )
    .await?;
    let admin = sign_in(&services, "admin@shelter.test").await?;

    let biscuit = services
        .pets
        .create_pet(&admin, demo_pet("Biscuit", "Beagle", "Dog"))
        .await?;
    let mochi = services
        .pets
        .create_pet(&admin, demo_pet("Mochi", "Siamese", "Cat"))
        .await?;
    println!();
    println!("Listed pets");
    render_pets(&services.pets.list_pets(PetQuery::default()).await?);

    let mut adopters = Vec::new();
    for index in 1..=args.applicants.max(1) {
        let email = format!("adopter{index}@shelter.test");
        let account = services
            .accounts
            .register(NewUser {
                username: format!("adopter{index}"),
                first_name: "Adopter".to_string(),
                last_name: index.to_string(),
                email: email.clone(),
                contact: String::new(),
                password: DEMO_PASSWORD.to_string(),
                profile_image_url: None,
            })
            .await?;
        let session = sign_in(&services, &email).await?;
        adopters.push((session, account.display_name()));
    }

    let mut feed = services.workflow.all_applications(&admin).await?;
    if let Some(Ok(initial)) = feed.next().await {
        println!();
        println!("Admin application feed opened ({} applications)", initial.len());
    }

    println!();
    println!(
        "{} adopters apply for {} at the same time",
        adopters.len(),
        biscuit.name
    );
    let mut attempts = Vec::new();
    for (session, name) in adopters.iter().cloned() {
        let services = services.clone();
        let pet_id = biscuit.id.clone();
        attempts.push(tokio::spawn(async move {
            let application = NewApplication {
                applicant_id: session.user_id.clone(),
                applicant_name: name.clone(),
                message: format!("{name} would love to meet this pet."),
            };
            let outcome = services
                .workflow
                .submit_application(&session, application, &pet_id)
                .await;
            (name, outcome)
        }));
    }

    let mut winner: Option<AdoptionApplication> = None;
    for attempt in attempts {
        let Some((name, outcome)) = join_attempt(attempt).await else {
            continue;
        };
        match outcome {
            Ok(application) => {
                println!("  - {name}: accepted ({})", application.id);
                winner = Some(application);
            }
            Err(err) if err.is_unavailable_pet() => println!("  - {name}: {err}"),
            Err(err) => return Err(err.into()),
        }
    }

    if let Ok(Some(Ok(snapshot))) =
        tokio::time::timeout(Duration::from_millis(500), feed.next()).await
    {
        println!("Admin feed update: {} application(s)", snapshot.len());
        render_applications(&snapshot);
    }

    if let Some(application) = winner {
        let decided = services
            .workflow
            .update_application_status(&admin, &application.id, ApplicationStatus::Approved)
            .await?;
        let pet = services.pets.get_pet(&decided.pet_id).await?;
        println!();
        println!(
            "Approved {} for {}; {} is now {}",
            decided.id, decided.applicant_name, pet.name, pet.status
        );
    }

    if let Some((session, name)) = adopters.first() {
        let application = services
            .workflow
            .submit_application(
                session,
                NewApplication {
                    applicant_id: session.user_id.clone(),
                    applicant_name: name.clone(),
                    message: String::new(),
                },
                &mochi.id,
            )
            .await?;
        services
            .workflow
            .update_application_status(&admin, &application.id, ApplicationStatus::Rejected)
            .await?;
        let pet = services.pets.get_pet(&mochi.id).await?;
        println!(
            "Rejected {} for {}; {} is now {}",
            application.id, name, pet.name, pet.status
        );
        if pet.status == PetStatus::Pending {
            println!("  (rerun with --release-rejected to return rejected pets to the catalog)");
        }
    }

    feed.cancel();

    println!();
    println!("Final catalog");
    render_pets(&services.pets.list_pets(PetQuery::default()).await?);
    Ok(())
}

async fn join_attempt(attempt: JoinHandle<Attempt>) -> Option<Attempt> {
    match attempt.await {
        Ok(result) => Some(result),
        Err(join_error) => {
            warn!(%join_error, "adoption attempt did not finish");
            None
        }
    }
}

async fn sign_in(services: &MemoryServices, email: &str) -> Result<Session, AppError> {
    let (_, session) = services
        .accounts
        .sign_in(Credentials {
            email: email.to_string(),
            password: DEMO_PASSWORD.to_string(),
        })
        .await?;
    Ok(session)
}

fn demo_pet(name: &str, breed: &str, pet_type: &str) -> NewPet {
    NewPet {
        name: name.to_string(),
        breed: breed.to_string(),
        pet_type: pet_type.to_string(),
        age: 2,
        gender: PetGender::Unknown,
        description: format!("{name} is waiting for a home."),
        image_url: None,
    }
}

fn render_pets(pets: &[Pet]) {
    if pets.is_empty() {
        println!("  (none)");
        return;
    }
    for pet in pets {
        println!(
            "  - {:<10} {:<8} {:<10} {}",
            pet.name, pet.pet_type, pet.breed, pet.status
        );
    }
}

fn render_applications(applications: &[AdoptionApplication]) {
    for application in applications {
        println!(
            "  - {} {} for pet {} [{}]",
            application.id, application.applicant_name, application.pet_id, application.status
        );
    }
}
