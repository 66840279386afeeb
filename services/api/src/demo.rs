use crate::infra::LoggingNotifier;
use clap::Args;
use fieldops_dispatch::config::DispatchConfig;
use fieldops_dispatch::error::AppError;
use fieldops_dispatch::workflows::dispatch::{
    CustomerId, DispatchError, DispatchService, GeoPoint, InMemoryDispatchStore,
    InMemoryTechnicianDirectory, JobAction, JobId, JobRequest, TechnicianId, TechnicianProfile,
    VerificationStatus, WorkStatus,
};
use std::sync::Arc;
use std::time::Duration;

const DEPOT: GeoPoint = GeoPoint {
    lat: 12.9716,
    lng: 77.5946,
};

#[derive(Args, Debug)]
pub(crate) struct DemoArgs {
    /// Number of technicians placed around the depot (the nearest one stays offline)
    #[arg(long, default_value_t = 5)]
    pub(crate) technicians: usize,
    /// Spacing between technicians, in kilometers
    #[arg(long, default_value_t = 1.5)]
    pub(crate) spacing_km: f64,
    /// Rematch cooldown applied to location pings during the demo
    #[arg(long, default_value_t = 30)]
    pub(crate) cooldown_secs: u64,
}

type DemoService =
    DispatchService<InMemoryDispatchStore, InMemoryTechnicianDirectory, LoggingNotifier>;

fn north_of_depot(km: f64) -> GeoPoint {
    GeoPoint {
        lat: DEPOT.lat + km / 111.2,
        lng: DEPOT.lng,
    }
}

fn technician(index: usize) -> TechnicianId {
    TechnicianId(format!("tech-{index:02}"))
}

pub(crate) async fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let DemoArgs {
        technicians,
        spacing_km,
        cooldown_secs,
    } = args;

    let directory = Arc::new(InMemoryTechnicianDirectory::default());
    let notifier = Arc::new(LoggingNotifier::default());
    let config = DispatchConfig {
        rematch_cooldown: Duration::from_secs(cooldown_secs),
        ..DispatchConfig::default()
    };
    let service: Arc<DemoService> = Arc::new(DispatchService::new(
        Arc::new(InMemoryDispatchStore::default()),
        directory.clone(),
        notifier.clone(),
        config,
    ));

    println!("Field dispatch demo");
    println!(
        "- search radius {:.1} km | feed radius {:.1} km | rematch cooldown {}s",
        service.config().search_radius_m / 1_000.0,
        service.config().feed_radius_m / 1_000.0,
        cooldown_secs
    );

    for index in 0..technicians {
        directory
            .upsert(
                TechnicianProfile {
                    technician_id: technician(index),
                    training_completed: true,
                    work_status: WorkStatus::Approved,
                    is_online: index != 0,
                    location: Some(north_of_depot(index as f64 * spacing_km)),
                },
                VerificationStatus {
                    kyc_approved: true,
                    bank_verified: true,
                },
            )
            .await;
    }

    println!("\nTechnician eligibility");
    for index in 0..technicians {
        let view = service.eligibility(&technician(index)).await;
        let status = if view.evaluation.eligible {
            "eligible".to_string()
        } else {
            format!("blocked ({})", view.evaluation.codes().join(", "))
        };
        println!("  - {}: {}", technician(index), status);
    }

    let opened = service
        .open_job(JobRequest {
            job_id: Some(JobId("job-demo-1".to_string())),
            customer_id: CustomerId("cust-demo".to_string()),
            service_type: "refrigerator_repair".to_string(),
            location: Some(DEPOT),
        })
        .await?;
    println!(
        "\nOpened {} ({}) -> offered to {} technician(s)",
        opened.job.id,
        opened.job.status.label(),
        opened.offered.len()
    );
    for offered in &opened.offered {
        println!("  - {offered}");
    }

    println!("\nAccept race");
    let tasks: Vec<_> = opened
        .offered
        .iter()
        .cloned()
        .map(|who| {
            let service = service.clone();
            let job = opened.job.id.clone();
            tokio::spawn(async move {
                let result = service.respond_to_job(&job, &who, JobAction::Accept).await;
                (who, result)
            })
        })
        .collect();

    for task in tasks {
        let (who, result) = match task.await {
            Ok(joined) => joined,
            Err(err) => {
                println!("  - accept task failed: {err}");
                continue;
            }
        };
        match result {
            Ok(outcome) => println!(
                "  - {who}: assigned ({} offers expired)",
                outcome.expired.len()
            ),
            Err(DispatchError::Conflict { kind, .. }) => {
                println!("  - {who}: {}", kind.code())
            }
            Err(err) => println!("  - {who}: error {err}"),
        }
    }

    let history = service.job_history(&opened.job.id).await?;
    println!("\nOffer ledger for {}", opened.job.id);
    for row in &history {
        println!("  - {}: {:?}", row.technician_id, row.state);
    }
    println!("  notifications delivered: {}", notifier.delivered());

    let late = technician(technicians);
    directory
        .upsert(
            TechnicianProfile {
                technician_id: late.clone(),
                training_completed: true,
                work_status: WorkStatus::Approved,
                is_online: true,
                location: None,
            },
            VerificationStatus {
                kyc_approved: true,
                bank_verified: true,
            },
        )
        .await;
    service
        .open_job(JobRequest {
            job_id: Some(JobId("job-demo-2".to_string())),
            customer_id: CustomerId("cust-demo".to_string()),
            service_type: "washing_machine_repair".to_string(),
            location: Some(north_of_depot(2.0)),
        })
        .await?;

    println!("\nLocation pings from {late}");
    for ping in [north_of_depot(1.0), north_of_depot(1.2)] {
        let outcome = service.location_update(&late, ping.lat, ping.lng).await?;
        println!(
            "  - ({:.4}, {:.4}): rematched={} new offers={:?}",
            ping.lat, ping.lng, outcome.match_calculation, outcome.newly_broadcast
        );
    }

    Ok(())
}
