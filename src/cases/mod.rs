//! Cases: records, the status state machine, intake and handler operations

pub mod handling;
pub mod intake;
pub mod model;
pub mod status;

pub use handling::{CaseService, HandlerThread};
pub(crate) use handling::{case_thread, load_org_case};
pub use intake::{CaseReceipt, IntakeService, NewReport};
pub use model::{
    normalize_body, validate_attachments, AttachmentRef, Case, CaseLogEntry, CaseStatus,
    CaseSummary, Message, ReportChannel, ReporterMode, SenderKind, MAX_ATTACHMENTS,
    MAX_ATTACHMENT_BYTES, MAX_MESSAGE_CHARS,
};
pub use status::plan_transition;
