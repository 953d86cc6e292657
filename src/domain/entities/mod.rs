pub mod attachment_record;
pub mod commands;
pub mod entity_record;
pub mod mutation_record;
pub mod sync_report;

pub use attachment_record::AttachmentRecord;
pub use commands::{AttachmentDraft, EntityWrite};
pub use entity_record::EntityRecord;
pub use mutation_record::MutationRecord;
pub use sync_report::{EngineStatus, SyncReport, SyncState};
