//! Job dispatch: eligibility, geospatial candidate selection, the broadcast
//! ledger, race-safe assignment and location-triggered rematching.
//!
//! Components take their collaborators as `Arc` trait implementations; the
//! in-memory store in [`memory`] backs the service binary and the tests.

pub mod candidates;
pub mod committer;
pub mod domain;
pub mod eligibility;
pub mod geo;
pub mod ledger;
pub mod memory;
pub mod rematch;
pub mod repository;
pub mod router;
pub mod service;

#[cfg(test)]
mod tests;

pub use candidates::{CandidateSelector, JobMatch, JobSearch, SearchScope, SelectionError};
pub use committer::{
    AcceptError, AcceptOutcome, AssignmentCommitter, ConflictKind, NotificationReport,
};
pub use domain::{
    Broadcast, BroadcastState, CustomerId, Job, JobId, JobRequest, JobStatus, TechnicianId,
    TechnicianProfile, VerificationStatus, WorkStatus,
};
pub use eligibility::{EligibilityEvaluator, EligibilityReport, IneligibilityReason};
pub use geo::{GeoPoint, EARTH_RADIUS_M};
pub use ledger::BroadcastLedger;
pub use memory::{InMemoryDispatchStore, InMemoryTechnicianDirectory, MemorySnapshot};
pub use rematch::{LocationRematcher, RematchOutcome};
pub use repository::{
    AssignmentNotice, AssignmentStore, BestEffort, BroadcastRepository, JobRepository,
    NotificationError, NotificationTransport, ProfileDirectory, RepositoryError,
    VerificationDirectory,
};
pub use router::{dispatch_router, TECHNICIAN_HEADER};
pub use service::{
    BroadcastOutcome, DispatchError, DispatchService, EligibilityView, JobAction,
};
