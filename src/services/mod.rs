pub mod reconciliation;
pub mod scheduler;

pub use reconciliation::{
    ReconciliationJob, ReconciliationReport, ReconciliationSettings, ReconciliationTask, Reconciler,
};
pub use scheduler::{CronLock, Job, JobScheduler, JobStatus, LockOutcome, ScheduledJob};
