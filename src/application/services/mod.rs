pub mod entity_service;
pub mod sync_service;
pub mod upload_service;

pub use entity_service::EntityService;
pub use sync_service::{SyncHandle, SyncRequest, SyncService};
pub use upload_service::{UploadReport, UploadService};
