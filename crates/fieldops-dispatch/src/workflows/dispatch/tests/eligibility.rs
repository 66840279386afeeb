use super::common::*;
use std::sync::Arc;
use std::time::Duration;

use crate::workflows::dispatch::domain::{JobStatus, VerificationStatus, WorkStatus};
use crate::workflows::dispatch::eligibility::{EligibilityEvaluator, IneligibilityReason};
use crate::workflows::dispatch::memory::{InMemoryDispatchStore, InMemoryTechnicianDirectory};
use crate::workflows::dispatch::service::JobAction;

fn evaluator(
    world: &World,
) -> EligibilityEvaluator<InMemoryDispatchStore, InMemoryTechnicianDirectory> {
    EligibilityEvaluator::new(world.store.clone(), world.directory.clone())
}

#[tokio::test]
async fn ready_technician_is_eligible_with_no_reasons() {
    let world = World::new(Duration::ZERO);
    world.ready_technician("tech-a", Some(HUB)).await;

    let report = evaluator(&world).evaluate(&tech("tech-a")).await;

    assert!(report.eligible);
    assert!(report.reasons.is_empty());
}

#[tokio::test]
async fn every_failing_check_is_reported_in_checklist_order() {
    let world = World::new(Duration::ZERO);
    let mut profile = ready_profile("tech-a", Some(HUB));
    profile.training_completed = false;
    profile.work_status = WorkStatus::Suspended;
    profile.is_online = false;
    world
        .directory
        .upsert(profile, VerificationStatus::default())
        .await;

    let report = evaluator(&world).evaluate(&tech("tech-a")).await;

    assert!(!report.eligible);
    assert_eq!(
        report.codes(),
        vec!["kyc", "bank", "training", "work_status", "offline"]
    );
}

#[tokio::test]
async fn assigned_active_job_marks_technician_busy() {
    let world = World::new(Duration::ZERO);
    world.ready_technician("tech-a", Some(HUB)).await;
    world.insert_job("job-1", Some(HUB)).await;
    world.offer("job-1", &["tech-a"]).await;
    world
        .service
        .respond_to_job(&job_id("job-1"), &tech("tech-a"), JobAction::Accept)
        .await
        .expect("accept succeeds");
    world
        .store
        .advance_job(&job_id("job-1"), JobStatus::InProgress)
        .await
        .expect("job advanced");

    let report = evaluator(&world).evaluate(&tech("tech-a")).await;

    assert!(report.is_busy());
    assert_eq!(report.codes(), vec!["active_job"]);
}

#[tokio::test]
async fn completed_job_no_longer_blocks_eligibility() {
    let world = World::new(Duration::ZERO);
    world.ready_technician("tech-a", Some(HUB)).await;
    world.insert_job("job-1", Some(HUB)).await;
    world.offer("job-1", &["tech-a"]).await;
    world
        .service
        .respond_to_job(&job_id("job-1"), &tech("tech-a"), JobAction::Accept)
        .await
        .expect("accept succeeds");
    world
        .store
        .advance_job(&job_id("job-1"), JobStatus::Completed)
        .await
        .expect("job completed");

    let report = evaluator(&world).evaluate(&tech("tech-a")).await;

    assert!(report.eligible);
}

#[tokio::test]
async fn activation_ignores_offline_but_keeps_account_checks() {
    let world = World::new(Duration::ZERO);
    let mut profile = ready_profile("tech-a", None);
    profile.is_online = false;
    world
        .directory
        .upsert(
            profile,
            VerificationStatus {
                kyc_approved: true,
                bank_verified: false,
            },
        )
        .await;

    let evaluator = evaluator(&world);
    let report = evaluator.evaluate(&tech("tech-a")).await;
    let activation = evaluator.activation(&tech("tech-a")).await;

    assert_eq!(report.codes(), vec!["bank", "offline"]);
    assert_eq!(activation.codes(), vec!["bank"]);
    assert!(!activation.has(&IneligibilityReason::Offline));
}

#[tokio::test]
async fn offline_only_technician_is_activated() {
    let world = World::new(Duration::ZERO);
    let mut profile = ready_profile("tech-a", None);
    profile.is_online = false;
    world.directory.upsert(profile, verified()).await;

    let activation = evaluator(&world).activation(&tech("tech-a")).await;

    assert!(activation.eligible);
}

#[tokio::test]
async fn unknown_technician_is_ineligible_with_lookup_failures() {
    let world = World::new(Duration::ZERO);

    let report = evaluator(&world).evaluate(&tech("ghost")).await;

    assert!(!report.eligible);
    assert!(report.codes().contains(&"lookup_failed"));
}

#[tokio::test]
async fn store_outage_fails_closed() {
    let world = World::new(Duration::ZERO);
    world.ready_technician("tech-a", Some(HUB)).await;
    world.store.set_unavailable(true);

    let report = evaluator(&world).evaluate(&tech("tech-a")).await;

    assert!(!report.eligible);
    assert!(report.reasons.iter().any(|reason| matches!(
        reason,
        IneligibilityReason::LookupFailed { collaborator, .. } if *collaborator == "jobs"
    )));
}

#[tokio::test]
async fn evaluate_profile_agrees_with_evaluate() {
    let world = World::new(Duration::ZERO);
    let mut profile = ready_profile("tech-a", Some(HUB));
    profile.work_status = WorkStatus::Trained;
    world.directory.upsert(profile.clone(), verified()).await;

    let evaluator = Arc::new(evaluator(&world));
    let by_id = evaluator.evaluate(&tech("tech-a")).await;
    let by_profile = evaluator.evaluate_profile(&profile).await;

    assert_eq!(by_id, by_profile);
    assert_eq!(by_profile.codes(), vec!["work_status"]);
}
