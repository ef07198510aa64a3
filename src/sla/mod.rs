//! Service-level tracking: acknowledgement and feedback deadlines

pub mod engine;
pub mod event;
pub mod mail;
pub mod policy;
pub mod scheduler;

pub use engine::{
    compute_due_dates, status, DeadlineReport, DeadlineStatus, DueDates, SlaEngine, SlaStatus,
    SlaStatusReport, SweepSummary,
};
pub use event::{SlaEvent, SlaEventKind, SlaEventStatus};
pub use mail::{HttpMailer, LogMailer, Mailer, Notification};
pub use policy::{load_policy, OrgPolicy, DEFAULT_ACK_DAYS, DEFAULT_FEEDBACK_DAYS};
pub use scheduler::spawn_sla_scheduler;
