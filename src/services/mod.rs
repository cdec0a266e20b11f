pub mod reconciler;

pub use reconciler::{ReconcileOutcome, Reconciler, SchedulerConfig, SchedulerState};
