/// Admission control, rendering and the alert handler
pub mod gate;
pub mod handler;
pub mod policy;
pub mod renderer;
pub mod scheduler;

pub use gate::{AdmissionGate, ADMISSION_WINDOW};
pub use handler::{AlertHandler, AlertOutcome};
pub use policy::{AlertPolicy, DEFAULT_MAX_PER_HOUR};
pub use renderer::{AlertPayload, AlertRenderer};
pub use scheduler::{ManualScheduler, ScheduledTask, Scheduler, TokioScheduler};
