pub mod attachment;
pub mod entity_kind;
pub mod local_id;
pub mod mutation;
pub mod payload;

pub use attachment::{AttachmentKind, UploadStatus};
pub use entity_kind::EntityKind;
pub use local_id::LocalId;
pub use mutation::{MutationOperation, MutationStatus};
pub use payload::MutationPayload;
